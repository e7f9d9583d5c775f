use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{Notify, RwLock};

use crate::adapters::json_file::{self, PersistError};
use crate::domain::settings::Settings;
use crate::ports::events::{EventSource, EventSourceError};
use crate::sequencer::{EventSequencer, ReplaySummary, SequencerError};
use crate::unirep_state::{StateError, UnirepState};

/// Default maximum block range per fetch (avoids RPC limits).
pub const DEFAULT_BATCH_SIZE: u64 = 500;

/// Replayed state together with the last block it covers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub as_of_block: u64,
    pub state: UnirepState,
}

#[derive(Debug, Clone)]
pub struct IndexerOptions {
    pub batch_size: u64,
    pub poll_interval: Duration,
    /// Where to persist a snapshot after every committed batch.
    pub state_file: Option<PathBuf>,
}

impl Default for IndexerOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            poll_interval: Duration::from_secs(4),
            state_file: None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum IndexerError {
    #[error(transparent)]
    Source(#[from] EventSourceError),

    #[error("replay of blocks {from}..={to} failed: {source}")]
    Replay {
        from: u64,
        to: u64,
        #[source]
        source: SequencerError,
    },

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Persist(#[from] PersistError),
}

struct IndexerState {
    unirep: UnirepState,
    sequencer: EventSequencer,
    last_block: u64,
}

/// Pulls event batches from an [`EventSource`], replays them and serves snapshots.
///
/// Single writer: every batch is applied under the write lock, readers get clones.
pub struct Indexer<E: EventSource> {
    source: E,
    options: IndexerOptions,
    state: RwLock<IndexerState>,
    progress: Notify,
    caught_up_flag: AtomicBool,
}

impl<E: EventSource> Indexer<E> {
    /// Fresh state that starts reading at `deployment_block`.
    pub fn new(
        source: E,
        settings: Settings,
        deployment_block: u64,
        options: IndexerOptions,
    ) -> Result<Self, IndexerError> {
        let snapshot = StateSnapshot {
            as_of_block: deployment_block.saturating_sub(1),
            state: UnirepState::new(settings)?,
        };
        Ok(Self::from_snapshot(source, snapshot, options))
    }

    pub fn from_snapshot(source: E, snapshot: StateSnapshot, options: IndexerOptions) -> Self {
        Self {
            source,
            options,
            state: RwLock::new(IndexerState {
                unirep: snapshot.state,
                sequencer: EventSequencer::new(),
                last_block: snapshot.as_of_block,
            }),
            progress: Notify::new(),
            caught_up_flag: AtomicBool::new(false),
        }
    }

    /// Resume from the configured state file if one exists, else start fresh.
    pub fn resume(
        source: E,
        settings: Settings,
        deployment_block: u64,
        options: IndexerOptions,
    ) -> Result<Self, IndexerError> {
        let persisted = match &options.state_file {
            Some(path) => json_file::load::<StateSnapshot>(path)?,
            None => None,
        };
        match persisted {
            Some(snapshot) => {
                snapshot.state.settings_store().offer(&settings);
                tracing::info!(as_of_block = snapshot.as_of_block, "resuming from state file");
                Ok(Self::from_snapshot(source, snapshot, options))
            }
            None => Self::new(source, settings, deployment_block, options),
        }
    }

    pub fn source(&self) -> &E {
        &self.source
    }

    pub async fn last_block(&self) -> u64 {
        self.state.read().await.last_block
    }

    /// Consistent copy of the state as of the last committed batch.
    pub async fn snapshot(&self) -> StateSnapshot {
        let state = self.state.read().await;
        StateSnapshot {
            as_of_block: state.last_block,
            state: state.unirep.clone(),
        }
    }

    /// Fetch and replay `from..=to` as one atomic batch.
    pub async fn process_range(&self, from: u64, to: u64) -> Result<ReplaySummary, IndexerError> {
        // No lock held during I/O.
        let batch = self.source.fetch(from, to).await?;

        let mut guard = self.state.write().await;
        let IndexerState {
            unirep,
            sequencer,
            last_block,
        } = &mut *guard;

        let summary = sequencer
            .replay_batch(unirep, &batch.markers, batch.events)
            .map_err(|source| IndexerError::Replay { from, to, source })?;
        *last_block = to;

        if let Some(path) = &self.options.state_file {
            json_file::save(
                path,
                &StateSnapshot {
                    as_of_block: to,
                    state: unirep.clone(),
                },
            )?;
        }
        drop(guard);

        if summary.applied > 0 {
            tracing::info!(from, to, applied = summary.applied, "indexer: batch replayed");
        } else {
            tracing::debug!(from, to, "indexer: empty batch");
        }
        self.progress.notify_waiters();
        Ok(summary)
    }

    /// One poll iteration. Returns `true` when blocks were processed.
    async fn step(&self) -> Result<bool, IndexerError> {
        let head = self.source.head_block().await?;
        let last = self.last_block().await;

        if last >= head {
            if !self.caught_up_flag.swap(true, Ordering::AcqRel) {
                tracing::info!(block = last, "indexer: caught up");
            }
            self.progress.notify_waiters();
            return Ok(false);
        }

        let from = last + 1;
        let to = head.min(from + self.options.batch_size.max(1) - 1);
        self.process_range(from, to).await?;
        Ok(true)
    }

    /// Process historical ranges until the source head is reached. Returns the last block.
    pub async fn catch_up(&self) -> Result<u64, IndexerError> {
        while self.step().await? {}
        Ok(self.last_block().await)
    }

    /// Like [`catch_up`](Self::catch_up) but stops at `target` when it is below the head.
    pub async fn catch_up_to(&self, target: u64) -> Result<u64, IndexerError> {
        let end = self.source.head_block().await?.min(target);
        let mut last = self.last_block().await;
        while last < end {
            let from = last + 1;
            let to = end.min(from + self.options.batch_size.max(1) - 1);
            self.process_range(from, to).await?;
            last = to;
        }
        Ok(last)
    }

    /// Catch up, then keep polling. RPC errors are retried after `poll_interval`;
    /// decode, replay and persistence errors stop the loop and are returned.
    pub async fn run(&self) -> Result<(), IndexerError> {
        loop {
            match self.step().await {
                Ok(true) => continue,
                Ok(false) => {}
                Err(IndexerError::Source(e @ EventSourceError::Rpc(_))) => {
                    tracing::warn!("indexer: source error, retrying: {e}");
                }
                Err(e) => {
                    tracing::error!("indexer: stopping: {e}");
                    return Err(e);
                }
            }
            tokio::time::sleep(self.options.poll_interval).await;
        }
    }

    // ── Consumer API ──

    /// Block until the indexer has reached the source head at least once.
    pub async fn wait_until_caught_up(&self) {
        loop {
            let notified = self.progress.notified();
            if self.caught_up_flag.load(Ordering::Acquire) {
                return;
            }
            notified.await;
        }
    }

    /// Block until every block up to `block` has been committed.
    pub async fn wait_for_block(&self, block: u64) {
        loop {
            let notified = self.progress.notified();
            if self.last_block().await >= block {
                return;
            }
            notified.await;
        }
    }
}
