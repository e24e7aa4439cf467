pub mod events;
pub mod health;

pub use events::EventStatus;
pub use health::{BreakerState, ComponentHealth, DeepHealthResponse, HealthSnapshot};
