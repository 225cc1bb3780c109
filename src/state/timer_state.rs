//! Timer snapshot structure and its stored form

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::TimerConfig;

/// One countdown segment of the Pomodoro cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    Focus,
    ShortBreak,
    LongBreak,
}

impl Phase {
    /// Human-readable label used in the status line
    pub fn label(self) -> &'static str {
        match self {
            Self::Focus => "Focus",
            Self::ShortBreak => "Short Break",
            Self::LongBreak => "Long Break",
        }
    }

    pub fn duration_seconds(self, config: &TimerConfig) -> u64 {
        match self {
            Self::Focus => config.focus_seconds(),
            Self::ShortBreak => config.break_seconds(),
            Self::LongBreak => config.long_break_seconds(),
        }
    }

    /// Parse a stored phase name, including the legacy `break`
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "focus" => Some(Self::Focus),
            "shortBreak" | "break" => Some(Self::ShortBreak),
            "longBreak" => Some(Self::LongBreak),
            _ => None,
        }
    }
}

/// The single authoritative snapshot of the countdown
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerState {
    pub phase: Phase,
    pub running: bool,
    /// Authoritative while paused; a fallback while running
    pub seconds_remaining: u64,
    /// Epoch milliseconds at which the countdown hits zero, only while running
    pub end_timestamp: Option<i64>,
    pub cycle_count: u32,
    /// Incremented on every persisted mutation
    #[serde(default)]
    pub revision: u64,
}

impl TimerState {
    /// Fresh paused focus phase
    pub fn new(config: &TimerConfig) -> Self {
        Self {
            phase: Phase::Focus,
            running: false,
            seconds_remaining: config.focus_seconds(),
            end_timestamp: None,
            cycle_count: 0,
            revision: 0,
        }
    }

    /// Paused at the given position of a phase
    pub fn paused(phase: Phase, seconds_remaining: u64, cycle_count: u32) -> Self {
        Self {
            phase,
            running: false,
            seconds_remaining,
            end_timestamp: None,
            cycle_count,
            revision: 0,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running && self.end_timestamp.is_some()
    }
}

/// Timer snapshot exactly as found in a store
///
/// Accepts the older key names (`mode`, `isRunning`, `timeLeft`, `endTime`)
/// and loosely typed values; interpretation happens during rehydration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredTimerState {
    #[serde(default, alias = "mode")]
    pub phase: Option<Value>,
    #[serde(default, alias = "isRunning")]
    pub running: Option<Value>,
    #[serde(default, alias = "timeLeft")]
    pub seconds_remaining: Option<Value>,
    #[serde(default, alias = "endTime")]
    pub end_timestamp: Option<Value>,
    #[serde(default)]
    pub cycle_count: Option<Value>,
    #[serde(default)]
    pub revision: Option<Value>,
}

impl StoredTimerState {
    pub fn phase(&self) -> Option<Phase> {
        self.phase.as_ref()?.as_str().and_then(Phase::parse)
    }

    pub fn running(&self) -> bool {
        matches!(self.running, Some(Value::Bool(true)))
    }

    pub fn seconds_remaining(&self) -> Option<u64> {
        non_negative_integer(self.seconds_remaining.as_ref())
    }

    pub fn end_timestamp(&self) -> Option<i64> {
        match self.end_timestamp.as_ref()? {
            Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.round() as i64)),
            _ => None,
        }
    }

    pub fn cycle_count(&self) -> Option<u32> {
        non_negative_integer(self.cycle_count.as_ref()).and_then(|n| u32::try_from(n).ok())
    }

    pub fn revision(&self) -> u64 {
        non_negative_integer(self.revision.as_ref()).unwrap_or(0)
    }
}

fn non_negative_integer(value: Option<&Value>) -> Option<u64> {
    match value? {
        Value::Number(n) => n.as_u64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && *f >= 0.0)
                .map(|f| f.round() as u64)
        }),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    }
}
