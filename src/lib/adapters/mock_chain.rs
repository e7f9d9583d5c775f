use alloy::primitives::{keccak256, B256};
use tokio::sync::Mutex;

use crate::domain::events::{EventMeta, LoggedEvent, SequencerMarker, UnirepEvent};
use crate::ports::events::{EventBatch, EventSource, EventSourceError};

#[derive(Default)]
struct MockChain {
    head: u64,
    events: Vec<LoggedEvent>,
    markers: Vec<SequencerMarker>,
    failures_pending: usize,
}

impl MockChain {
    fn mine(&mut self) -> u64 {
        self.head += 1;
        self.head
    }
}

/// In-process chain implementing `EventSource` for tests and the demo.
///
/// Every emitted event lands in its own transaction, followed by the `Sequencer` marker
/// a contract would emit for it.
pub struct MockEventSource {
    chain: Mutex<MockChain>,
}

impl MockEventSource {
    pub fn new() -> Self {
        Self {
            chain: Mutex::new(MockChain::default()),
        }
    }

    /// Mine a block holding one transaction per event. Returns each event's metadata.
    pub async fn emit_block(&self, events: Vec<UnirepEvent>) -> Vec<EventMeta> {
        let mut chain = self.chain.lock().await;
        let block_number = chain.mine();
        let mut metas = Vec::with_capacity(events.len());
        for (tx_index, event) in events.into_iter().enumerate() {
            let transaction_hash =
                keccak256([block_number.to_be_bytes(), (tx_index as u64).to_be_bytes()].concat());
            let meta = EventMeta {
                block_number,
                log_index: 2 * tx_index as u64,
                transaction_hash,
            };
            chain.markers.push(SequencerMarker {
                meta: EventMeta {
                    log_index: meta.log_index + 1,
                    ..meta
                },
                event_type: event.kind() as u8,
            });
            chain.events.push(LoggedEvent { meta, event });
            metas.push(meta);
        }
        metas
    }

    /// Mine a block with a single event.
    pub async fn emit(&self, event: impl Into<UnirepEvent>) -> EventMeta {
        let metas = self.emit_block(vec![event.into()]).await;
        metas[0]
    }

    /// Mine a block holding only a raw marker, without its event.
    pub async fn emit_marker(&self, event_type: u8) -> EventMeta {
        let mut chain = self.chain.lock().await;
        let block_number = chain.mine();
        let meta = EventMeta {
            block_number,
            log_index: 0,
            transaction_hash: keccak256(block_number.to_be_bytes()),
        };
        chain.markers.push(SequencerMarker { meta, event_type });
        meta
    }

    /// Mine an empty block.
    pub async fn mine_empty(&self) -> u64 {
        self.chain.lock().await.mine()
    }

    /// Make the next `count` source calls fail with an RPC error.
    pub async fn fail_next(&self, count: usize) {
        self.chain.lock().await.failures_pending = count;
    }

    pub async fn head(&self) -> u64 {
        self.chain.lock().await.head
    }

    fn take_failure(chain: &mut MockChain) -> Result<(), EventSourceError> {
        if chain.failures_pending > 0 {
            chain.failures_pending -= 1;
            return Err(EventSourceError::Rpc("mock: injected failure".into()));
        }
        Ok(())
    }
}

impl Default for MockEventSource {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSource for MockEventSource {
    async fn head_block(&self) -> Result<u64, EventSourceError> {
        let mut chain = self.chain.lock().await;
        Self::take_failure(&mut chain)?;
        Ok(chain.head)
    }

    async fn fetch(&self, from: u64, to: u64) -> Result<EventBatch, EventSourceError> {
        let mut chain = self.chain.lock().await;
        Self::take_failure(&mut chain)?;
        let in_range = |meta: &EventMeta| (from..=to).contains(&meta.block_number);
        Ok(EventBatch {
            from_block: from,
            to_block: to,
            markers: chain
                .markers
                .iter()
                .filter(|m| in_range(&m.meta))
                .copied()
                .collect(),
            events: chain
                .events
                .iter()
                .filter(|e| in_range(&e.meta))
                .cloned()
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::poseidon::field;
    use crate::domain::events::{EventKind, UserSignedUp};

    fn sign_up(commitment: u64) -> UserSignedUp {
        UserSignedUp {
            epoch: 1,
            identity_commitment: field(commitment),
            hashed_leaf: field(commitment + 1),
        }
    }

    #[tokio::test]
    async fn test_emit_adds_event_and_marker() {
        let chain = MockEventSource::new();
        let meta = chain.emit(sign_up(1)).await;
        assert_eq!(meta.block_number, 1);

        let batch = chain.fetch(1, 1).await.unwrap();
        assert_eq!(batch.events.len(), 1);
        assert_eq!(batch.markers.len(), 1);
        assert_eq!(batch.markers[0].event_type, EventKind::UserSignedUp as u8);
        assert!(batch.markers[0].meta.position() > batch.events[0].meta.position());
    }

    #[tokio::test]
    async fn test_fetch_respects_range() {
        let chain = MockEventSource::new();
        chain.emit(sign_up(1)).await;
        chain.mine_empty().await;
        chain.emit(sign_up(2)).await;

        assert_eq!(chain.head_block().await.unwrap(), 3);
        assert_eq!(chain.fetch(2, 3).await.unwrap().events.len(), 1);
        assert!(chain.fetch(2, 2).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_block_with_many_transactions() {
        let chain = MockEventSource::new();
        let metas = chain
            .emit_block(vec![sign_up(1).into(), sign_up(2).into()])
            .await;
        assert_eq!(metas[0].block_number, metas[1].block_number);
        assert_ne!(metas[0].transaction_hash, metas[1].transaction_hash);
        assert!(metas[0].log_index < metas[1].log_index);
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let chain = MockEventSource::new();
        chain.fail_next(1).await;
        assert!(matches!(
            chain.head_block().await,
            Err(EventSourceError::Rpc(_))
        ));
        assert!(chain.head_block().await.is_ok());
    }

    #[tokio::test]
    async fn test_raw_marker() {
        let chain = MockEventSource::new();
        chain.emit_marker(9).await;
        let batch = chain.fetch(1, 1).await.unwrap();
        assert!(batch.events.is_empty());
        assert_eq!(batch.markers[0].event_type, 9);
    }
}
