#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![forbid(unsafe_code)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

pub mod breaker;
pub mod chain;
pub mod config;
pub mod entities;
pub mod events;
pub mod framework;
pub mod handlers;
pub mod health;
pub mod processors;
pub mod store;
pub mod supervisor;
pub mod utils;
