//! State management module
//!
//! This module contains the timer's records, its phase state machine,
//! snapshot recovery, and the shared service that ties them to persistence.

pub mod app_state;
pub mod machine;
pub mod rehydrate;
pub mod timer_config;
pub mod timer_state;

// Re-export main types
pub use app_state::{AppState, TimerDeps, TimerError};
pub use machine::{format_clock, TimerMachine, TimerView};
pub use rehydrate::{recover, Recovery};
pub use timer_config::{StoredConfig, TimerConfig};
pub use timer_state::{Phase, StoredTimerState, TimerState};
