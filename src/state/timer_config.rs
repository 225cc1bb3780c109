//! Timer configuration record and its validation

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const DEFAULT_FOCUS_MINUTES: u32 = 15;
pub const DEFAULT_BREAK_MINUTES: u32 = 5;
pub const DEFAULT_LONG_BREAK_MINUTES: u32 = 15;
pub const DEFAULT_INTERVALS_BEFORE_LONG_BREAK: u32 = 4;

/// Largest accepted value for any configuration field (one day of minutes)
pub const MAX_CONFIG_VALUE: u32 = 24 * 60;

/// Phase lengths and the long-break cadence, owned by one identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerConfig {
    pub focus_minutes: u32,
    pub break_minutes: u32,
    pub long_break_minutes: u32,
    pub intervals_before_long_break: u32,
}

impl TimerConfig {
    pub fn new() -> Self {
        Self {
            focus_minutes: DEFAULT_FOCUS_MINUTES,
            break_minutes: DEFAULT_BREAK_MINUTES,
            long_break_minutes: DEFAULT_LONG_BREAK_MINUTES,
            intervals_before_long_break: DEFAULT_INTERVALS_BEFORE_LONG_BREAK,
        }
    }

    pub fn focus_seconds(&self) -> u64 {
        u64::from(self.focus_minutes) * 60
    }

    pub fn break_seconds(&self) -> u64 {
        u64::from(self.break_minutes) * 60
    }

    pub fn long_break_seconds(&self) -> u64 {
        u64::from(self.long_break_minutes) * 60
    }
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration exactly as found in a store or request body
///
/// Every field is optional and untyped so that a partially written or
/// hand-edited record still yields whatever valid values it does contain.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub focus_minutes: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub break_minutes: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub long_break_minutes: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intervals_before_long_break: Option<Value>,
}

impl StoredConfig {
    /// Take every valid field, falling back field by field to `fallback`
    pub fn resolve(&self, fallback: &TimerConfig) -> TimerConfig {
        TimerConfig {
            focus_minutes: positive_minutes(self.focus_minutes.as_ref())
                .unwrap_or(fallback.focus_minutes),
            break_minutes: positive_minutes(self.break_minutes.as_ref())
                .unwrap_or(fallback.break_minutes),
            long_break_minutes: positive_minutes(self.long_break_minutes.as_ref())
                .unwrap_or(fallback.long_break_minutes),
            intervals_before_long_break: positive_minutes(
                self.intervals_before_long_break.as_ref(),
            )
            .unwrap_or(fallback.intervals_before_long_break),
        }
    }

    /// Names of fields that are present but would be rejected
    pub fn rejected_fields(&self) -> Vec<&'static str> {
        [
            ("focusMinutes", &self.focus_minutes),
            ("breakMinutes", &self.break_minutes),
            ("longBreakMinutes", &self.long_break_minutes),
            ("intervalsBeforeLongBreak", &self.intervals_before_long_break),
        ]
        .into_iter()
        .filter(|(_, value)| value.is_some() && positive_minutes(value.as_ref()).is_none())
        .map(|(name, _)| name)
        .collect()
    }
}

impl From<TimerConfig> for StoredConfig {
    fn from(config: TimerConfig) -> Self {
        Self {
            focus_minutes: Some(Value::from(config.focus_minutes)),
            break_minutes: Some(Value::from(config.break_minutes)),
            long_break_minutes: Some(Value::from(config.long_break_minutes)),
            intervals_before_long_break: Some(Value::from(config.intervals_before_long_break)),
        }
    }
}

/// Accept integers in `1..=MAX_CONFIG_VALUE`, as JSON numbers or numeric strings
fn positive_minutes(value: Option<&Value>) -> Option<u32> {
    let number = match value? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };

    if !number.is_finite() || number.fract() != 0.0 {
        return None;
    }
    if number < 1.0 || number > f64::from(MAX_CONFIG_VALUE) {
        return None;
    }
    Some(number as u32)
}
