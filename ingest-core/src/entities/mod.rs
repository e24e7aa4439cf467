pub mod blockchain_event;
pub mod listener_checkpoint;

use ledger_ingest_sdk::objects::EventStatus as SdkEventStatus;

/// Ledger row status for database operations.
///
/// This is the sqlx::Type version. For API/DTO use, see `ledger_ingest_sdk::objects::EventStatus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(rename_all = "lowercase", type_name = "blockchain_event_status")]
pub enum EventStatus {
    Pending,
    Processed,
    Failed,
}

impl From<EventStatus> for SdkEventStatus {
    fn from(value: EventStatus) -> Self {
        match value {
            EventStatus::Pending => SdkEventStatus::Pending,
            EventStatus::Processed => SdkEventStatus::Processed,
            EventStatus::Failed => SdkEventStatus::Failed,
        }
    }
}

impl From<SdkEventStatus> for EventStatus {
    fn from(value: SdkEventStatus) -> Self {
        match value {
            SdkEventStatus::Pending => EventStatus::Pending,
            SdkEventStatus::Processed => EventStatus::Processed,
            SdkEventStatus::Failed => EventStatus::Failed,
        }
    }
}
