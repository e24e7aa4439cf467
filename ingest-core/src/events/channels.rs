//! Event channel factories and handles.

use super::types::IngestTick;
use tokio::sync::mpsc;

/// Default buffer size for event channels.
///
/// Ticks only wake the consumer, so a full buffer can drop them safely.
pub const DEFAULT_CHANNEL_BUFFER: usize = 16;

/// Sender handle for IngestTick events.
pub type IngestTickSender = mpsc::Sender<IngestTick>;
/// Receiver handle for IngestTick events.
pub type IngestTickReceiver = mpsc::Receiver<IngestTick>;

/// Create a new IngestTick channel.
///
/// The poller holds the sender; the retry scheduler the receiver.
pub fn ingest_tick_channel() -> (IngestTickSender, IngestTickReceiver) {
    mpsc::channel(DEFAULT_CHANNEL_BUFFER)
}
