//! Pomodoro Keeper - a wall-clock accurate Pomodoro timer daemon
//!
//! The timer cycles through focus, short break and long break phases. The
//! countdown is always derived from an absolute end timestamp, so it stays
//! correct across throttled ticks, restarts and identity switches.

pub mod api;
pub mod config;
pub mod services;
pub mod state;
pub mod store;
pub mod tasks;
pub mod timing;
pub mod utils;

// Re-export commonly used types
pub use api::create_router;
pub use config::Config;
pub use state::{AppState, Phase, TimerConfig, TimerState};
pub use utils::signals::shutdown_signal;
