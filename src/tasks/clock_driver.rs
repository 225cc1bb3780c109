//! Clock driver: detects phase completion and keeps the status line current

use std::sync::{Arc, Mutex, Weak};
use tracing::{debug, error, info, warn};

use crate::{
    services::StatusLine,
    state::AppState,
    timing::{Scheduler, TickHandle, Visibility},
};

/// The single tick loop a driver may own
#[derive(Debug, Clone, Copy)]
struct ActiveLoop {
    handle: TickHandle,
    generation: u64,
    visibility: Visibility,
}

#[derive(Debug)]
struct DriverInner {
    visibility: Visibility,
    active: Option<ActiveLoop>,
    generation: u64,
    shut_down: bool,
}

/// Owns at most one tick loop at a time, sized to the current visibility
///
/// Each loop carries a generation number. Ticks from a loop that has since
/// been replaced or cancelled are ignored, so a regime switch can never
/// trigger a completion twice.
pub struct ClockDriver {
    state: Arc<AppState>,
    scheduler: Arc<dyn Scheduler>,
    status: Arc<dyn StatusLine>,
    inner: Mutex<DriverInner>,
    this: Weak<ClockDriver>,
}

impl ClockDriver {
    pub fn new(
        state: Arc<AppState>,
        scheduler: Arc<dyn Scheduler>,
        status: Arc<dyn StatusLine>,
    ) -> Arc<Self> {
        let visibility = state.visibility();
        Arc::new_cyclic(|this| Self {
            state,
            scheduler,
            status,
            inner: Mutex::new(DriverInner {
                visibility,
                active: None,
                generation: 0,
                shut_down: false,
            }),
            this: this.clone(),
        })
    }

    /// Reconcile the tick loop with the timer: one loop while running, none otherwise
    pub fn sync(&self) {
        let running = match self.state.view() {
            Ok(view) => {
                self.status.set(&view.status_line);
                view.running
            }
            Err(_) => false,
        };

        let Ok(mut inner) = self.inner.lock() else {
            error!("Clock driver lock poisoned");
            return;
        };
        if inner.shut_down {
            return;
        }

        match (running, inner.active) {
            (true, Some(active)) if active.visibility == inner.visibility => {}
            (true, _) => self.install(&mut inner),
            (false, Some(_)) => self.cancel(&mut inner),
            (false, None) => {}
        }
    }

    /// Switch tick regime; the old loop is cancelled before the new one starts
    pub fn set_visibility(&self, visibility: Visibility) {
        let Ok(mut inner) = self.inner.lock() else {
            error!("Clock driver lock poisoned");
            return;
        };
        if inner.shut_down || inner.visibility == visibility {
            return;
        }

        info!("Clock driver switching to {:?} regime", visibility);
        inner.visibility = visibility;
        if inner.active.is_some() {
            self.install(&mut inner);
        }
    }

    /// Cancel any loop and ignore everything afterwards
    pub fn shutdown(&self) {
        let Ok(mut inner) = self.inner.lock() else {
            return;
        };
        self.cancel(&mut inner);
        inner.shut_down = true;
        debug!("Clock driver shut down");
    }

    /// Regime of the installed loop, if any
    pub fn active_regime(&self) -> Option<Visibility> {
        self.inner
            .lock()
            .ok()
            .and_then(|inner| inner.active.map(|active| active.visibility))
    }

    fn tick(&self, generation: u64) {
        {
            let Ok(inner) = self.inner.lock() else {
                return;
            };
            let current = inner.active.map(|active| active.generation);
            if inner.shut_down || current != Some(generation) {
                return;
            }
        }

        let view = match self.state.view() {
            Ok(view) => view,
            Err(_) => {
                // Identity switch in progress; the next snapshot will resync.
                self.stop_loop(generation);
                return;
            }
        };
        self.status.set(&view.status_line);

        if !view.running {
            self.stop_loop(generation);
            return;
        }
        if view.seconds_remaining > 0 {
            return;
        }

        // Retire this loop before the transition so it cannot fire again.
        self.stop_loop(generation);
        match self.state.complete_phase_if_due() {
            Ok(Some(phase)) => debug!("Tick completed phase, next {:?}", phase),
            Ok(None) => debug!("Tick found nothing due"),
            Err(e) => warn!("Failed to complete phase: {}", e),
        }
        self.sync();
    }

    fn stop_loop(&self, generation: u64) {
        let Ok(mut inner) = self.inner.lock() else {
            return;
        };
        if inner.active.map(|active| active.generation) == Some(generation) {
            self.cancel(&mut inner);
        }
    }

    fn install(&self, inner: &mut DriverInner) {
        self.cancel(inner);

        inner.generation += 1;
        let generation = inner.generation;
        let visibility = inner.visibility;
        let driver = self.this.clone();
        let handle = self.scheduler.register_tick(
            visibility.tick_period(),
            Arc::new(move || {
                if let Some(driver) = driver.upgrade() {
                    driver.tick(generation);
                }
            }),
        );

        inner.active = Some(ActiveLoop {
            handle,
            generation,
            visibility,
        });
        debug!("Installed {:?} tick loop (generation {})", visibility, generation);
    }

    fn cancel(&self, inner: &mut DriverInner) {
        if let Some(active) = inner.active.take() {
            self.scheduler.cancel_tick(active.handle);
            debug!("Cancelled tick loop (generation {})", active.generation);
        }
    }
}

/// Background task that feeds timer and visibility changes to the driver
pub async fn clock_driver_task(driver: Arc<ClockDriver>, state: Arc<AppState>) {
    info!("Starting clock driver task");

    let mut timer_rx = state.timer_update_tx.subscribe();
    let mut visibility_rx = state.visibility_tx.subscribe();

    driver.set_visibility(*visibility_rx.borrow_and_update());
    driver.sync();

    loop {
        tokio::select! {
            changed = timer_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let ready = timer_rx.borrow_and_update().is_some();
                debug!("Clock driver saw timer update (ready={})", ready);
                driver.sync();
            }
            changed = visibility_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let visibility = *visibility_rx.borrow_and_update();
                driver.set_visibility(visibility);
            }
        }
    }

    driver.shutdown();
    info!("Clock driver task stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        services::{Chime, ChimeError},
        state::{Phase, TimerDeps},
        store::{Identity, MemoryStore},
        tasks::persist_writer::{persist_channel, persist_writer_task},
        timing::{ManualClock, ManualScheduler},
    };
    use serde_json::json;
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };

    const T0: i64 = 1_700_000_000_000;

    #[derive(Default)]
    struct RecordingStatus {
        lines: Mutex<Vec<String>>,
    }

    impl RecordingStatus {
        fn last(&self) -> Option<String> {
            self.lines.lock().unwrap().last().cloned()
        }
    }

    impl StatusLine for RecordingStatus {
        fn set(&self, line: &str) {
            self.lines.lock().unwrap().push(line.to_string());
        }
    }

    #[derive(Default)]
    struct CountingChime {
        plays: AtomicUsize,
    }

    impl Chime for CountingChime {
        fn play(&self) -> Result<(), ChimeError> {
            self.plays.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Rig {
        state: Arc<AppState>,
        clock: Arc<ManualClock>,
        scheduler: Arc<ManualScheduler>,
        status: Arc<RecordingStatus>,
        chime: Arc<CountingChime>,
        driver: Arc<ClockDriver>,
    }

    async fn rig_with(store: MemoryStore) -> Rig {
        let (persist_tx, persist_rx) = persist_channel();
        tokio::spawn(persist_writer_task(persist_rx));

        let clock = Arc::new(ManualClock::new(T0));
        let chime = Arc::new(CountingChime::default());
        let state = Arc::new(AppState::new(
            TimerDeps {
                clock: clock.clone(),
                chime: chime.clone(),
                store: Arc::new(store),
                identity: Identity::Anonymous,
                persist_tx,
            },
            0,
            "127.0.0.1".to_string(),
            Visibility::Foreground,
        ));
        state.rehydrate().await.expect("rehydrate");

        let scheduler = Arc::new(ManualScheduler::new());
        let status = Arc::new(RecordingStatus::default());
        let driver = ClockDriver::new(state.clone(), scheduler.clone(), status.clone());
        Rig {
            state,
            clock,
            scheduler,
            status,
            chime,
            driver,
        }
    }

    async fn rig() -> Rig {
        rig_with(MemoryStore::new()).await
    }

    #[tokio::test]
    async fn paused_timer_has_no_loop_but_shows_status() {
        let rig = rig().await;
        rig.driver.sync();
        assert_eq!(rig.scheduler.active_count(), 0);
        assert_eq!(rig.status.last().as_deref(), Some("15:00 - Focus"));
    }

    #[tokio::test]
    async fn running_timer_gets_exactly_one_loop() {
        let rig = rig().await;
        rig.state.start().unwrap();
        rig.driver.sync();
        rig.driver.sync();
        assert_eq!(rig.scheduler.active_periods(), vec![Duration::from_millis(16)]);

        rig.state.pause().unwrap();
        rig.driver.sync();
        assert_eq!(rig.scheduler.active_count(), 0);
    }

    #[tokio::test]
    async fn ticks_update_the_status_line() {
        let rig = rig().await;
        rig.state.start().unwrap();
        rig.driver.sync();

        rig.clock.advance(Duration::from_secs(61));
        rig.scheduler.fire();
        assert_eq!(rig.status.last().as_deref(), Some("13:59 - Focus"));
    }

    #[tokio::test]
    async fn visibility_change_replaces_the_loop() {
        let rig = rig().await;
        rig.state.start().unwrap();
        rig.driver.sync();

        rig.driver.set_visibility(Visibility::Background);
        assert_eq!(rig.scheduler.active_periods(), vec![Duration::from_secs(1)]);
        assert_eq!(rig.driver.active_regime(), Some(Visibility::Background));

        rig.driver.set_visibility(Visibility::Foreground);
        assert_eq!(rig.scheduler.active_periods(), vec![Duration::from_millis(16)]);
    }

    #[tokio::test]
    async fn completion_chimes_once_and_reinstalls_a_loop() {
        let rig = rig().await;
        rig.state.start().unwrap();
        rig.driver.sync();

        rig.clock.advance(Duration::from_secs(900));
        rig.scheduler.fire();
        rig.scheduler.fire();

        assert_eq!(rig.chime.plays.load(Ordering::SeqCst), 1);
        let view = rig.state.view().unwrap();
        assert_eq!(view.phase, Phase::ShortBreak);
        assert!(view.running);
        assert_eq!(rig.scheduler.active_count(), 1);
        assert_eq!(rig.status.last().as_deref(), Some("05:00 - Short Break"));
    }

    #[tokio::test]
    async fn stale_tick_from_a_replaced_loop_is_ignored() {
        let rig = rig().await;
        rig.state.start().unwrap();
        rig.driver.sync();
        let stale_generation = rig.driver.inner.lock().unwrap().active.unwrap().generation;

        rig.driver.set_visibility(Visibility::Background);
        rig.clock.advance(Duration::from_secs(900));
        rig.driver.tick(stale_generation);
        assert_eq!(rig.chime.plays.load(Ordering::SeqCst), 0);

        rig.scheduler.fire();
        assert_eq!(rig.chime.plays.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn missed_ticks_do_not_drift() {
        let rig = rig().await;
        rig.state.start().unwrap();
        rig.driver.sync();

        // Nothing fires for ten minutes, as if the process were suspended.
        rig.clock.advance(Duration::from_secs(600));
        rig.scheduler.fire();
        assert_eq!(rig.state.view().unwrap().seconds_remaining, 300);
        assert_eq!(rig.status.last().as_deref(), Some("05:00 - Focus"));
    }

    #[tokio::test]
    async fn shutdown_cancels_and_stays_quiet() {
        let rig = rig().await;
        rig.state.start().unwrap();
        rig.driver.sync();

        rig.driver.shutdown();
        assert_eq!(rig.scheduler.active_count(), 0);

        rig.driver.sync();
        rig.driver.set_visibility(Visibility::Background);
        assert_eq!(rig.scheduler.active_count(), 0);
    }

    #[tokio::test]
    async fn resumed_snapshot_keeps_counting_after_reload() {
        let store = MemoryStore::with_records(
            None,
            Some(json!({
                "phase": "focus",
                "running": true,
                "secondsRemaining": 900,
                "endTimestamp": T0 + 3_000,
                "cycleCount": 0
            })),
        );
        let rig = rig_with(store).await;
        rig.driver.sync();
        assert_eq!(rig.scheduler.active_count(), 1);

        rig.clock.advance(Duration::from_secs(3));
        rig.scheduler.fire();
        assert_eq!(rig.state.view().unwrap().phase, Phase::ShortBreak);
        assert_eq!(rig.chime.plays.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn task_follows_watch_channels() {
        let rig = rig().await;
        let task = tokio::spawn(clock_driver_task(rig.driver.clone(), rig.state.clone()));

        rig.state.start().unwrap();
        for _ in 0..50 {
            if rig.scheduler.active_count() == 1 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(rig.scheduler.active_count(), 1);

        rig.state.set_visibility(Visibility::Background);
        for _ in 0..50 {
            if rig.driver.active_regime() == Some(Visibility::Background) {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(rig.scheduler.active_periods(), vec![Duration::from_secs(1)]);

        task.abort();
    }
}
