//! Time sources and tick scheduling
//!
//! The timer core never reads the system clock or arms timers directly; it
//! goes through these seams so it can be driven deterministically.

pub mod clock;
pub mod scheduler;

use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use clock::{seconds_until, Clock, ManualClock, SystemClock};
pub use scheduler::{ManualScheduler, Scheduler, TickFn, TickHandle, TokioScheduler};

/// Whether someone is currently looking at the countdown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Visibility {
    Foreground,
    Background,
}

impl Visibility {
    pub fn from_visible(visible: bool) -> Self {
        if visible {
            Self::Foreground
        } else {
            Self::Background
        }
    }

    /// Tick period for this regime: frame rate while watched, one second otherwise
    pub fn tick_period(self) -> Duration {
        match self {
            Self::Foreground => Duration::from_millis(16),
            Self::Background => Duration::from_secs(1),
        }
    }
}
