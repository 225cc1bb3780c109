//! Main timer service state management

use std::{
    sync::{Arc, Mutex, MutexGuard},
    time::{Duration, Instant},
};
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::{oneshot, watch};
use tracing::{debug, info, warn};

use super::{
    rehydrate::{recover, Recovery},
    Phase, StoredConfig, TimerConfig, TimerMachine, TimerState, TimerView,
};
use crate::{
    services::Chime,
    store::{Identity, TimerStore},
    tasks::persist_writer::{PersistJob, PersistSender},
    timing::{Clock, Visibility},
};

/// How long a reload waits for its own parked snapshot to reach the store
const RELOAD_FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum TimerError {
    #[error("timer is not ready yet")]
    NotReady,
    #[error("failed to lock {what}: {message}")]
    LockPoisoned { what: &'static str, message: String },
}

/// Collaborators the timer service is built from
pub struct TimerDeps {
    pub clock: Arc<dyn Clock>,
    pub chime: Arc<dyn Chime>,
    pub store: Arc<dyn TimerStore>,
    pub identity: Identity,
    pub persist_tx: PersistSender,
}

/// Timer service shared by the HTTP handlers and the clock driver
///
/// Every mutation happens synchronously under one lock; the matching
/// persistence write is queued before the lock is released, so writes are
/// issued in transition order and never block the caller.
pub struct AppState {
    clock: Arc<dyn Clock>,
    chime: Arc<dyn Chime>,
    /// `None` until rehydration has produced a trustworthy snapshot
    machine: Mutex<Option<TimerMachine>>,
    store: Mutex<Arc<dyn TimerStore>>,
    identity: Mutex<Identity>,
    persist_tx: PersistSender,
    /// Serializes rehydration and identity switches
    rehydrate_lock: tokio::sync::Mutex<()>,
    /// Latest snapshot, `None` while not ready
    pub timer_update_tx: watch::Sender<Option<TimerState>>,
    pub visibility_tx: watch::Sender<Visibility>,
    /// Server metadata
    pub start_time: Instant,
    pub port: u16,
    pub host: String,
    /// Last action tracking
    pub last_action: Mutex<Option<String>>,
    pub last_action_time: Mutex<Option<DateTime<Utc>>>,
}

impl AppState {
    pub fn new(deps: TimerDeps, port: u16, host: String, visibility: Visibility) -> Self {
        let (timer_update_tx, _) = watch::channel(None);
        let (visibility_tx, _) = watch::channel(visibility);

        Self {
            clock: deps.clock,
            chime: deps.chime,
            machine: Mutex::new(None),
            store: Mutex::new(deps.store),
            identity: Mutex::new(deps.identity),
            persist_tx: deps.persist_tx,
            rehydrate_lock: tokio::sync::Mutex::new(()),
            timer_update_tx,
            visibility_tx,
            start_time: Instant::now(),
            port,
            host,
            last_action: Mutex::new(None),
            last_action_time: Mutex::new(None),
        }
    }

    /// Begin or resume the countdown; a no-op while already running
    pub fn start(&self) -> Result<TimerView, TimerError> {
        let (started, view) = self.update_timer("start", |machine, now| {
            let started = machine.start(now);
            (started, started)
        })?;
        if started {
            info!("Timer started: {} ({}s left)", view.phase_label, view.seconds_remaining);
        } else {
            debug!("Start ignored, timer already running");
        }
        Ok(view)
    }

    /// Freeze the countdown; a no-op while already paused
    pub fn pause(&self) -> Result<TimerView, TimerError> {
        let (paused, view) = self.update_timer("pause", |machine, now| {
            let paused = machine.pause(now);
            (paused, paused)
        })?;
        if paused {
            info!("Timer paused: {} ({}s left)", view.phase_label, view.seconds_remaining);
        } else {
            debug!("Pause ignored, timer not running");
        }
        Ok(view)
    }

    pub fn reset(&self) -> Result<TimerView, TimerError> {
        let ((), view) = self.update_timer("reset", |machine, _| {
            machine.reset();
            ((), true)
        })?;
        info!("Timer reset to {} ({}s)", view.phase_label, view.seconds_remaining);
        Ok(view)
    }

    /// Advance to the next phase and land paused
    pub fn skip(&self) -> Result<TimerView, TimerError> {
        let (phase, view) = self.update_timer("skip", |machine, _| (machine.skip(), true))?;
        info!("Skipped to {:?}, cycle {}", phase, view.cycle_count);
        Ok(view)
    }

    /// Natural phase end, invoked by the clock driver
    ///
    /// Rechecks under the lock that the countdown really is due, so a stale
    /// or duplicate tick cannot advance the cycle twice. Plays the chime
    /// after the transition is committed.
    pub fn complete_phase_if_due(&self) -> Result<Option<Phase>, TimerError> {
        let (completed, view) = self.update_timer("complete", |machine, now| {
            if !machine.is_due(now) {
                return (None, false);
            }
            let next = machine.complete_phase(now);
            (next, next.is_some())
        })?;

        if let Some(phase) = completed {
            info!(
                "Phase complete, now {:?} for {}s (cycle {})",
                phase, view.seconds_remaining, view.cycle_count
            );
            if let Err(e) = self.chime.play() {
                warn!("Failed to play completion chime: {}", e);
            }
        }
        Ok(completed)
    }

    /// Validate and adopt new configuration values
    ///
    /// Invalid fields keep their last-known-good value.
    pub fn update_config(&self, raw: &StoredConfig) -> Result<TimerView, TimerError> {
        let rejected = raw.rejected_fields();
        if !rejected.is_empty() {
            warn!("Ignoring invalid configuration fields: {:?}", rejected);
        }

        let mut guard = self.lock_machine()?;
        let machine = guard.as_mut().ok_or(TimerError::NotReady)?;
        let now = self.clock.now_ms();

        let config = raw.resolve(machine.config());
        if config == *machine.config() {
            debug!("Configuration unchanged, nothing to write");
            return Ok(machine.view(now));
        }
        let snapshot_changed = machine.apply_config(config);
        let store = self.current_store()?;
        self.enqueue(PersistJob::Config {
            store: Arc::clone(&store),
            config,
        });
        if snapshot_changed {
            self.persist_and_publish(store, machine.state().clone());
        }
        let view = machine.view(now);
        drop(guard);

        self.record_action("config");
        info!("Configuration updated: {:?}", config);
        Ok(view)
    }

    pub fn config(&self) -> Result<TimerConfig, TimerError> {
        let guard = self.lock_machine()?;
        guard
            .as_ref()
            .map(|machine| *machine.config())
            .ok_or(TimerError::NotReady)
    }

    pub fn view(&self) -> Result<TimerView, TimerError> {
        let guard = self.lock_machine()?;
        let now = self.clock.now_ms();
        guard
            .as_ref()
            .map(|machine| machine.view(now))
            .ok_or(TimerError::NotReady)
    }

    pub fn is_ready(&self) -> bool {
        self.lock_machine().map(|guard| guard.is_some()).unwrap_or(false)
    }

    pub fn identity(&self) -> Result<Identity, TimerError> {
        self.identity
            .lock()
            .map(|identity| identity.clone())
            .map_err(|e| poisoned("identity", e))
    }

    pub fn visibility(&self) -> Visibility {
        *self.visibility_tx.borrow()
    }

    pub fn set_visibility(&self, visibility: Visibility) {
        let changed = self.visibility_tx.send_if_modified(|current| {
            if *current == visibility {
                return false;
            }
            *current = visibility;
            true
        });
        if changed {
            info!("Visibility changed to {:?}", visibility);
        }
    }

    /// Load configuration and timer snapshot from the active store
    pub async fn rehydrate(&self) -> Result<Recovery, TimerError> {
        let _serial = self.rehydrate_lock.lock().await;
        if self.park_current()? {
            self.await_parked_write().await;
        }
        self.load_from_store().await
    }

    /// Stop and persist the current timer, then adopt another identity's records
    pub async fn switch_identity(
        &self,
        identity: Identity,
        store: Arc<dyn TimerStore>,
    ) -> Result<Recovery, TimerError> {
        let _serial = self.rehydrate_lock.lock().await;
        let previous = self.identity()?;
        info!("Switching identity from {:?} to {:?}", previous.uid(), identity.uid());

        // Queued against the previous store; every job carries its own target.
        let parked = self.park_current()?;
        if parked && previous.same_owner(&identity) {
            self.await_parked_write().await;
        }

        {
            let mut current = self
                .store
                .lock()
                .map_err(|e| poisoned("store", e))?;
            *current = Arc::clone(&store);
        }
        {
            let mut current = self
                .identity
                .lock()
                .map_err(|e| poisoned("identity", e))?;
            *current = identity.clone();
        }

        self.record_action("identity");

        if previous.is_authenticated() && !identity.is_authenticated() {
            info!("Signed out, resetting local records to defaults");
            let config = TimerConfig::default();
            let state = TimerState::new(&config);
            self.enqueue(PersistJob::Config {
                store: Arc::clone(&store),
                config,
            });
            self.enqueue(PersistJob::TimerState {
                store,
                snapshot: state.clone(),
            });
            self.install(config, state)?;
            return Ok(Recovery::Fresh);
        }

        self.load_from_store().await
    }

    /// Wait until every write queued so far has been attempted
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        self.enqueue(PersistJob::Flush(done_tx));
        if done_rx.await.is_err() {
            warn!("Persistence writer is gone, pending writes may be lost");
        }
    }

    /// Like [`AppState::flush`], but gives up after `limit`; false if it gave up
    pub async fn flush_within(&self, limit: Duration) -> bool {
        tokio::time::timeout(limit, self.flush()).await.is_ok()
    }

    /// Calculate server uptime as a formatted string
    pub fn get_uptime(&self) -> String {
        let duration = self.start_time.elapsed();
        let hours = duration.as_secs() / 3600;
        let minutes = (duration.as_secs() % 3600) / 60;
        let seconds = duration.as_secs() % 60;

        if hours > 0 {
            format!("{}h {}m {}s", hours, minutes, seconds)
        } else if minutes > 0 {
            format!("{}m {}s", minutes, seconds)
        } else {
            format!("{}s", seconds)
        }
    }

    /// Get last action information
    pub fn get_last_action(&self) -> (Option<String>, Option<DateTime<Utc>>) {
        let last_action = self.last_action.lock().ok().and_then(|a| a.clone());
        let last_action_time = self.last_action_time.lock().ok().and_then(|t| *t);
        (last_action, last_action_time)
    }

    /// Apply a mutation under the lock; persist and publish if it changed anything
    fn update_timer<F, R>(&self, action: &str, updater: F) -> Result<(R, TimerView), TimerError>
    where
        F: FnOnce(&mut TimerMachine, i64) -> (R, bool),
    {
        let mut guard = self.lock_machine()?;
        let machine = guard.as_mut().ok_or(TimerError::NotReady)?;
        let now = self.clock.now_ms();

        let (result, changed) = updater(machine, now);
        if changed {
            let store = self.current_store()?;
            self.persist_and_publish(store, machine.state().clone());
        }
        let view = machine.view(now);
        drop(guard);

        if changed {
            self.record_action(action);
        }
        Ok((result, view))
    }

    /// Pause any running countdown, persist it, and mark the timer not ready
    ///
    /// Returns true if a paused snapshot was queued.
    fn park_current(&self) -> Result<bool, TimerError> {
        let mut parked = false;
        let mut guard = self.lock_machine()?;
        if let Some(mut machine) = guard.take() {
            if machine.pause(self.clock.now_ms()) {
                info!(
                    "Stopped running timer at {}s before reload",
                    machine.state().seconds_remaining
                );
                let store = self.current_store()?;
                self.enqueue(PersistJob::TimerState {
                    store,
                    snapshot: machine.state().clone(),
                });
                parked = true;
            }
        }
        self.timer_update_tx.send_replace(None);
        Ok(parked)
    }

    /// Before reading back a store we just queued a write for
    async fn await_parked_write(&self) {
        if !self.flush_within(RELOAD_FLUSH_TIMEOUT).await {
            warn!(
                "Parked snapshot not written after {:?}, reloading anyway",
                RELOAD_FLUSH_TIMEOUT
            );
        }
    }

    async fn load_from_store(&self) -> Result<Recovery, TimerError> {
        let store = self.current_store()?;
        let defaults = TimerConfig::default();

        let config = match store.load_config().await {
            Ok(Some(raw)) => {
                let rejected = raw.rejected_fields();
                if !rejected.is_empty() {
                    warn!("Stored configuration has invalid fields {:?}, using defaults for them", rejected);
                }
                raw.resolve(&defaults)
            }
            Ok(None) => defaults,
            Err(e) => {
                warn!("Failed to load configuration from {}: {}", store.describe(), e);
                defaults
            }
        };

        let stored = match store.load_timer_state().await {
            Ok(stored) => stored,
            Err(e) => {
                warn!("Failed to load timer state from {}: {}", store.describe(), e);
                None
            }
        };

        let (state, recovery) = recover(stored.as_ref(), &config, self.clock.now_ms());
        self.install(config, state)?;

        info!("Timer ready from {} ({:?})", store.describe(), recovery);
        Ok(recovery)
    }

    /// Publish a snapshot and make the timer ready
    fn install(&self, config: TimerConfig, state: TimerState) -> Result<(), TimerError> {
        let mut guard = self.lock_machine()?;
        self.timer_update_tx.send_replace(Some(state.clone()));
        *guard = Some(TimerMachine::from_parts(config, state));
        Ok(())
    }

    fn persist_and_publish(&self, store: Arc<dyn TimerStore>, snapshot: TimerState) {
        self.timer_update_tx.send_replace(Some(snapshot.clone()));
        self.enqueue(PersistJob::TimerState { store, snapshot });
    }

    fn enqueue(&self, job: PersistJob) {
        if let Err(e) = self.persist_tx.send(job) {
            warn!("Persistence writer is gone, dropping {:?}", e.0);
        }
    }

    fn current_store(&self) -> Result<Arc<dyn TimerStore>, TimerError> {
        self.store
            .lock()
            .map(|store| Arc::clone(&store))
            .map_err(|e| poisoned("store", e))
    }

    fn lock_machine(&self) -> Result<MutexGuard<'_, Option<TimerMachine>>, TimerError> {
        self.machine.lock().map_err(|e| poisoned("timer", e))
    }

    fn record_action(&self, action: &str) {
        if let Ok(mut last_action) = self.last_action.lock() {
            *last_action = Some(action.to_string());
        }
        if let Ok(mut last_time) = self.last_action_time.lock() {
            *last_time = Some(Utc::now());
        }
    }
}

fn poisoned(what: &'static str, error: impl std::fmt::Display) -> TimerError {
    TimerError::LockPoisoned {
        what,
        message: error.to_string(),
    }
}
