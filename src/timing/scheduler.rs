//! Periodic tick registration
//!
//! A [`Scheduler`] runs a callback on a fixed period until the returned
//! [`TickHandle`] is cancelled. The tokio implementation drives real timers;
//! the manual one lets callers fire ticks themselves.

use std::{
    collections::{BTreeMap, HashMap},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};
use tokio::{
    runtime::Handle,
    task::JoinHandle,
    time::{interval, MissedTickBehavior},
};
use tracing::{debug, warn};

/// Callback invoked on every tick
pub type TickFn = Arc<dyn Fn() + Send + Sync>;

/// Identifies one registered tick loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TickHandle(u64);

pub trait Scheduler: Send + Sync {
    /// Start calling `tick` every `period`, first call as soon as possible
    fn register_tick(&self, period: Duration, tick: TickFn) -> TickHandle;

    /// Stop a tick loop; unknown or already cancelled handles are ignored
    fn cancel_tick(&self, handle: TickHandle);
}

/// Scheduler that spawns one tokio task per tick loop
#[derive(Debug)]
pub struct TokioScheduler {
    runtime: Handle,
    next_id: AtomicU64,
    loops: Mutex<HashMap<u64, JoinHandle<()>>>,
}

impl TokioScheduler {
    /// Must be called from within a tokio runtime
    pub fn new() -> Self {
        Self::with_handle(Handle::current())
    }

    pub fn with_handle(runtime: Handle) -> Self {
        Self {
            runtime,
            next_id: AtomicU64::new(1),
            loops: Mutex::new(HashMap::new()),
        }
    }
}

impl Scheduler for TokioScheduler {
    fn register_tick(&self, period: Duration, tick: TickFn) -> TickHandle {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let task = self.runtime.spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                tick();
            }
        });

        match self.loops.lock() {
            Ok(mut loops) => {
                loops.insert(id, task);
            }
            Err(e) => {
                warn!("Tick registry lock poisoned, aborting new tick loop: {}", e);
                task.abort();
            }
        }

        debug!("Registered tick loop {} every {:?}", id, period);
        TickHandle(id)
    }

    fn cancel_tick(&self, handle: TickHandle) {
        let task = match self.loops.lock() {
            Ok(mut loops) => loops.remove(&handle.0),
            Err(e) => {
                warn!("Tick registry lock poisoned while cancelling: {}", e);
                None
            }
        };

        if let Some(task) = task {
            task.abort();
            debug!("Cancelled tick loop {}", handle.0);
        }
    }
}

impl Drop for TokioScheduler {
    fn drop(&mut self) {
        if let Ok(mut loops) = self.loops.lock() {
            for (_, task) in loops.drain() {
                task.abort();
            }
        }
    }
}

/// Scheduler whose ticks only happen when [`ManualScheduler::fire`] is called
#[derive(Default)]
pub struct ManualScheduler {
    next_id: AtomicU64,
    loops: Mutex<BTreeMap<TickHandle, (Duration, TickFn)>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Periods of all currently registered loops, in registration order
    pub fn active_periods(&self) -> Vec<Duration> {
        self.loops
            .lock()
            .map(|loops| loops.values().map(|(period, _)| *period).collect())
            .unwrap_or_default()
    }

    pub fn active_count(&self) -> usize {
        self.loops.lock().map(|loops| loops.len()).unwrap_or(0)
    }

    /// Run one tick of every registered loop; returns how many ran
    pub fn fire(&self) -> usize {
        // Callbacks may register or cancel loops, so none can run under the lock.
        let ticks: Vec<TickFn> = match self.loops.lock() {
            Ok(loops) => loops.values().map(|(_, tick)| Arc::clone(tick)).collect(),
            Err(_) => return 0,
        };

        for tick in &ticks {
            tick();
        }
        ticks.len()
    }
}

impl Scheduler for ManualScheduler {
    fn register_tick(&self, period: Duration, tick: TickFn) -> TickHandle {
        let handle = TickHandle(self.next_id.fetch_add(1, Ordering::SeqCst));
        if let Ok(mut loops) = self.loops.lock() {
            loops.insert(handle, (period, tick));
        }
        handle
    }

    fn cancel_tick(&self, handle: TickHandle) {
        if let Ok(mut loops) = self.loops.lock() {
            loops.remove(&handle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counter() -> (Arc<AtomicUsize>, TickFn) {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        (count, Arc::new(move || {
            seen.fetch_add(1, Ordering::SeqCst);
        }))
    }

    #[test]
    fn manual_scheduler_fires_only_registered_loops() {
        let scheduler = ManualScheduler::new();
        let (count, tick) = counter();

        let handle = scheduler.register_tick(Duration::from_secs(1), tick);
        assert_eq!(scheduler.fire(), 1);
        assert_eq!(scheduler.fire(), 1);
        assert_eq!(count.load(Ordering::SeqCst), 2);

        scheduler.cancel_tick(handle);
        assert_eq!(scheduler.fire(), 0);
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert!(scheduler.active_periods().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn tokio_scheduler_ticks_until_cancelled() {
        let scheduler = TokioScheduler::new();
        let (count, tick) = counter();

        let handle = scheduler.register_tick(Duration::from_secs(1), tick);
        tokio::time::sleep(Duration::from_millis(2_500)).await;
        let before_cancel = count.load(Ordering::SeqCst);
        assert_eq!(before_cancel, 3);

        scheduler.cancel_tick(handle);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(count.load(Ordering::SeqCst), before_cancel);
    }
}
