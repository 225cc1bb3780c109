//! Ordered, fire-and-forget persistence writes

use std::{fmt, sync::Arc};

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::{
    state::{TimerConfig, TimerState},
    store::TimerStore,
};

/// One unit of work for the writer task
pub enum PersistJob {
    TimerState {
        store: Arc<dyn TimerStore>,
        snapshot: TimerState,
    },
    Config {
        store: Arc<dyn TimerStore>,
        config: TimerConfig,
    },
    /// Acknowledged once every job queued before it has finished
    Flush(oneshot::Sender<()>),
}

impl fmt::Debug for PersistJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TimerState { store, snapshot } => f
                .debug_struct("TimerState")
                .field("store", &store.describe())
                .field("revision", &snapshot.revision)
                .finish(),
            Self::Config { store, config } => f
                .debug_struct("Config")
                .field("store", &store.describe())
                .field("config", config)
                .finish(),
            Self::Flush(_) => f.write_str("Flush"),
        }
    }
}

pub type PersistSender = mpsc::UnboundedSender<PersistJob>;
pub type PersistReceiver = mpsc::UnboundedReceiver<PersistJob>;

pub fn persist_channel() -> (PersistSender, PersistReceiver) {
    mpsc::unbounded_channel()
}

/// Background task that applies queued writes one at a time, in order
pub async fn persist_writer_task(mut jobs: PersistReceiver) {
    info!("Starting persistence writer task");

    while let Some(job) = jobs.recv().await {
        match job {
            PersistJob::TimerState { store, snapshot } => {
                match store.save_timer_state(&snapshot).await {
                    Ok(()) => debug!(
                        "Saved timer state rev {} to {}",
                        snapshot.revision,
                        store.describe()
                    ),
                    Err(e) => warn!(
                        "Failed to save timer state rev {} to {}: {}",
                        snapshot.revision,
                        store.describe(),
                        e
                    ),
                }
            }
            PersistJob::Config { store, config } => match store.save_config(&config).await {
                Ok(()) => debug!("Saved configuration to {}", store.describe()),
                Err(e) => warn!("Failed to save configuration to {}: {}", store.describe(), e),
            },
            PersistJob::Flush(done) => {
                // The requester may have stopped waiting.
                let _ = done.send(());
            }
        }
    }

    info!("Persistence writer task stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn writes_land_in_order_and_flush_waits_for_them() {
        let (tx, rx) = persist_channel();
        tokio::spawn(persist_writer_task(rx));

        let memory = Arc::new(MemoryStore::new());
        let store: Arc<dyn TimerStore> = memory.clone();
        let config = TimerConfig::default();

        for revision in 1..=5 {
            let mut snapshot = TimerState::new(&config);
            snapshot.revision = revision;
            tx.send(PersistJob::TimerState {
                store: Arc::clone(&store),
                snapshot,
            })
            .unwrap();
        }

        let (done_tx, done_rx) = oneshot::channel();
        tx.send(PersistJob::Flush(done_tx)).unwrap();
        done_rx.await.unwrap();

        assert_eq!(memory.timer_state_writes(), 5);
        assert_eq!(memory.timer_state().unwrap().revision, 5);
    }

    #[tokio::test]
    async fn failed_writes_do_not_stop_the_queue() {
        let (tx, rx) = persist_channel();
        tokio::spawn(persist_writer_task(rx));

        let memory = Arc::new(MemoryStore::new());
        let store: Arc<dyn TimerStore> = memory.clone();
        memory.set_failing(true);
        tx.send(PersistJob::Config {
            store: Arc::clone(&store),
            config: TimerConfig::default(),
        })
        .unwrap();

        let (done_tx, done_rx) = oneshot::channel();
        tx.send(PersistJob::Flush(done_tx)).unwrap();
        done_rx.await.unwrap();
        assert!(memory.config_value().is_none());

        memory.set_failing(false);
        tx.send(PersistJob::Config {
            store,
            config: TimerConfig::default(),
        })
        .unwrap();
        let (done_tx, done_rx) = oneshot::channel();
        tx.send(PersistJob::Flush(done_tx)).unwrap();
        done_rx.await.unwrap();
        assert!(memory.config_value().is_some());
    }
}
