//! Rebuilding a timer snapshot from stored records

use tracing::{debug, info};

use super::{Phase, StoredTimerState, TimerConfig, TimerState};
use crate::timing::seconds_until;

/// How a stored snapshot was interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    /// Nothing usable was stored
    Fresh,
    /// Stored as paused; restored at its remaining time
    Paused,
    /// Stored as running and still in the future; countdown continues
    Resumed,
    /// Stored as running but its end passed unobserved; parked at zero
    Expired,
}

/// Reconstruct the snapshot implied by `stored` at `now_ms`
///
/// A phase that ended while nobody was watching is left at zero in that
/// same phase rather than advanced, so missed phases never cascade.
pub fn recover(
    stored: Option<&StoredTimerState>,
    config: &TimerConfig,
    now_ms: i64,
) -> (TimerState, Recovery) {
    let Some(stored) = stored else {
        return (TimerState::new(config), Recovery::Fresh);
    };

    let phase = stored.phase().unwrap_or(Phase::Focus);
    let cycle_limit = config.intervals_before_long_break.saturating_sub(1);
    let cycle_count = stored.cycle_count().unwrap_or(0).min(cycle_limit);
    let revision = stored.revision();

    let (mut state, recovery) = match (stored.running(), stored.end_timestamp()) {
        (true, Some(end_ms)) => {
            let left = seconds_until(end_ms, now_ms);
            if left > 0 {
                let state = TimerState {
                    phase,
                    running: true,
                    seconds_remaining: left,
                    end_timestamp: Some(now_ms.saturating_add(left as i64 * 1000)),
                    cycle_count,
                    revision: 0,
                };
                (state, Recovery::Resumed)
            } else {
                (TimerState::paused(phase, 0, cycle_count), Recovery::Expired)
            }
        }
        _ => match stored.seconds_remaining() {
            Some(seconds) => (
                TimerState::paused(phase, seconds, cycle_count),
                Recovery::Paused,
            ),
            None => {
                debug!("Stored timer state has no usable remaining time");
                (
                    TimerState::paused(phase, phase.duration_seconds(config), cycle_count),
                    Recovery::Fresh,
                )
            }
        },
    };

    state.revision = revision;
    info!(
        "Recovered timer as {:?}: phase={:?}, remaining={}s, cycle={}",
        recovery, state.phase, state.seconds_remaining, state.cycle_count
    );
    (state, recovery)
}
