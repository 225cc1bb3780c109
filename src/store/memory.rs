//! In-process store for embedding and tests

use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Mutex,
};

use async_trait::async_trait;
use serde_json::Value;

use super::{StoreError, TimerStore};
use crate::state::{StoredConfig, StoredTimerState, TimerConfig, TimerState};

/// Keeps both records as raw JSON so malformed contents can be simulated
#[derive(Debug, Default)]
pub struct MemoryStore {
    config: Mutex<Option<Value>>,
    timer_state: Mutex<Option<Value>>,
    failing: AtomicBool,
    timer_state_writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(config: Option<Value>, timer_state: Option<Value>) -> Self {
        Self {
            config: Mutex::new(config),
            timer_state: Mutex::new(timer_state),
            ..Self::default()
        }
    }

    /// Make every subsequent call fail
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn config_value(&self) -> Option<Value> {
        self.config.lock().ok().and_then(|guard| guard.clone())
    }

    pub fn timer_state_value(&self) -> Option<Value> {
        self.timer_state.lock().ok().and_then(|guard| guard.clone())
    }

    /// Decoded timer snapshot, if one is stored and well-formed
    pub fn timer_state(&self) -> Option<TimerState> {
        self.timer_state_value()
            .and_then(|value| serde_json::from_value(value).ok())
    }

    pub fn timer_state_writes(&self) -> usize {
        self.timer_state_writes.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store set to fail".to_string()));
        }
        Ok(())
    }

    fn slot_read(slot: &Mutex<Option<Value>>) -> Result<Option<Value>, StoreError> {
        slot.lock()
            .map(|guard| guard.clone())
            .map_err(|e| StoreError::Unavailable(format!("memory store lock poisoned: {e}")))
    }

    fn slot_write(slot: &Mutex<Option<Value>>, value: Value) -> Result<(), StoreError> {
        let mut guard = slot
            .lock()
            .map_err(|e| StoreError::Unavailable(format!("memory store lock poisoned: {e}")))?;
        *guard = Some(value);
        Ok(())
    }
}

#[async_trait]
impl TimerStore for MemoryStore {
    fn describe(&self) -> String {
        "in-memory store".to_string()
    }

    async fn load_config(&self) -> Result<Option<StoredConfig>, StoreError> {
        self.check()?;
        match Self::slot_read(&self.config)? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    async fn save_config(&self, config: &TimerConfig) -> Result<(), StoreError> {
        self.check()?;
        Self::slot_write(&self.config, serde_json::to_value(config)?)
    }

    async fn load_timer_state(&self) -> Result<Option<StoredTimerState>, StoreError> {
        self.check()?;
        match Self::slot_read(&self.timer_state)? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    async fn save_timer_state(&self, state: &TimerState) -> Result<(), StoreError> {
        self.check()?;
        Self::slot_write(&self.timer_state, serde_json::to_value(state)?)?;
        self.timer_state_writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
