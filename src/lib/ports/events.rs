use std::future::Future;

use crate::domain::events::{LoggedEvent, SequencerMarker};

/// Decoded logs of one block range.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventBatch {
    pub from_block: u64,
    pub to_block: u64,
    /// `Sequencer` markers in chain order.
    pub markers: Vec<SequencerMarker>,
    pub events: Vec<LoggedEvent>,
}

impl EventBatch {
    pub fn is_empty(&self) -> bool {
        self.markers.is_empty() && self.events.is_empty()
    }
}

/// Port for reading protocol events from a chain.
///
/// Implementations:
/// - `EthereumEventSource` (alloy JSON-RPC provider)
/// - `MockEventSource` (in-process chain for tests and the demo)
pub trait EventSource: Send + Sync {
    /// Latest block number the source can serve.
    fn head_block(&self) -> impl Future<Output = Result<u64, EventSourceError>> + Send;

    /// All protocol logs in `from..=to`, decoded.
    fn fetch(
        &self,
        from: u64,
        to: u64,
    ) -> impl Future<Output = Result<EventBatch, EventSourceError>> + Send;
}

#[derive(Debug, thiserror::Error)]
pub enum EventSourceError {
    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("failed to decode log at block {block_number} index {log_index}: {reason}")]
    Decode {
        block_number: u64,
        log_index: u64,
        reason: String,
    },
}
