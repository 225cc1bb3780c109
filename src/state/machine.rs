//! Pomodoro phase state machine
//!
//! [`TimerMachine`] is synchronous and clock-free: every operation that
//! depends on the current instant takes it as `now_ms`. Remaining time while
//! running is always derived from the stored end timestamp, so missed ticks
//! never drift the countdown.

use serde::Serialize;

use super::{Phase, TimerConfig, TimerState};
use crate::timing::seconds_until;

/// Focus phase, running countdown, and cycle bookkeeping for one identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerMachine {
    config: TimerConfig,
    state: TimerState,
}

/// Read-only view of the timer at one instant
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerView {
    pub phase: Phase,
    pub phase_label: &'static str,
    pub running: bool,
    pub seconds_remaining: u64,
    pub cycle_count: u32,
    pub phase_duration_seconds: u64,
    pub progress_fraction: f64,
    pub end_timestamp: Option<i64>,
    pub status_line: String,
    pub revision: u64,
}

impl TimerMachine {
    /// Fresh machine in a paused focus phase
    pub fn new(config: TimerConfig) -> Self {
        let state = TimerState::new(&config);
        Self { config, state }
    }

    pub fn from_parts(config: TimerConfig, state: TimerState) -> Self {
        Self { config, state }
    }

    pub fn config(&self) -> &TimerConfig {
        &self.config
    }

    pub fn state(&self) -> &TimerState {
        &self.state
    }

    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }

    /// Begin counting down from `secondsRemaining`; no-op if already running
    pub fn start(&mut self, now_ms: i64) -> bool {
        if self.state.running {
            return false;
        }

        self.state.end_timestamp = Some(end_after(now_ms, self.state.seconds_remaining));
        self.state.running = true;
        self.bump_revision();
        true
    }

    /// Freeze the countdown at its current value; no-op if already paused
    pub fn pause(&mut self, now_ms: i64) -> bool {
        if !self.state.running {
            return false;
        }

        self.state.seconds_remaining = self.seconds_left(now_ms);
        self.state.running = false;
        self.state.end_timestamp = None;
        self.bump_revision();
        true
    }

    /// Back to a fresh, paused focus phase with the cycle counter cleared
    pub fn reset(&mut self) {
        let revision = self.state.revision;
        self.state = TimerState::new(&self.config);
        self.state.revision = revision;
        self.bump_revision();
    }

    /// Move to the next phase and land paused there
    pub fn skip(&mut self) -> Phase {
        self.advance_phase();
        self.state.running = false;
        self.state.end_timestamp = None;
        self.bump_revision();
        self.state.phase
    }

    /// Natural end of a running phase: advance and keep running
    ///
    /// Returns `None` when the timer is not running, which is how a late or
    /// duplicate completion signal is absorbed.
    pub fn complete_phase(&mut self, now_ms: i64) -> Option<Phase> {
        if !self.state.running {
            return None;
        }

        self.advance_phase();
        self.state.running = true;
        self.state.end_timestamp = Some(end_after(now_ms, self.state.seconds_remaining));
        self.bump_revision();
        Some(self.state.phase)
    }

    /// True when running and the countdown has reached zero at `now_ms`
    pub fn is_due(&self, now_ms: i64) -> bool {
        self.state.running && self.seconds_left(now_ms) == 0
    }

    /// Remaining whole seconds at `now_ms`
    pub fn seconds_left(&self, now_ms: i64) -> u64 {
        match (self.state.running, self.state.end_timestamp) {
            (true, Some(end_ms)) => seconds_until(end_ms, now_ms),
            _ => self.state.seconds_remaining,
        }
    }

    pub fn phase_duration_seconds(&self) -> u64 {
        self.state.phase.duration_seconds(&self.config)
    }

    /// Remaining time over phase length, clamped to `[0, 1]`
    pub fn progress_fraction(&self, now_ms: i64) -> f64 {
        let total = self.phase_duration_seconds();
        if total == 0 {
            return 0.0;
        }
        (self.seconds_left(now_ms) as f64 / total as f64).clamp(0.0, 1.0)
    }

    /// `MM:SS - <PhaseLabel>`
    pub fn status_line(&self, now_ms: i64) -> String {
        format!(
            "{} - {}",
            format_clock(self.seconds_left(now_ms)),
            self.state.phase.label()
        )
    }

    pub fn view(&self, now_ms: i64) -> TimerView {
        TimerView {
            phase: self.state.phase,
            phase_label: self.state.phase.label(),
            running: self.state.running,
            seconds_remaining: self.seconds_left(now_ms),
            cycle_count: self.state.cycle_count,
            phase_duration_seconds: self.phase_duration_seconds(),
            progress_fraction: self.progress_fraction(now_ms),
            end_timestamp: self.state.end_timestamp,
            status_line: self.status_line(now_ms),
            revision: self.state.revision,
        }
    }

    /// Swap in a new configuration without disturbing a running countdown
    ///
    /// While paused, a changed duration for the current phase re-seeds the
    /// remaining time. Returns true if the snapshot itself changed.
    pub fn apply_config(&mut self, config: TimerConfig) -> bool {
        let previous_duration = self.phase_duration_seconds();
        self.config = config;
        let mut changed = false;

        let limit = self.config.intervals_before_long_break.saturating_sub(1);
        if self.state.cycle_count > limit {
            self.state.cycle_count = limit;
            changed = true;
        }

        let duration = self.phase_duration_seconds();
        if !self.state.running && duration != previous_duration {
            self.state.seconds_remaining = duration;
            changed = true;
        }

        if changed {
            self.bump_revision();
        }
        changed
    }

    /// Shared transition rule for skip and natural completion
    fn advance_phase(&mut self) {
        let last_cycle = self.config.intervals_before_long_break.saturating_sub(1);
        let (phase, cycle_count) = match self.state.phase {
            Phase::Focus if self.state.cycle_count < last_cycle => {
                (Phase::ShortBreak, self.state.cycle_count + 1)
            }
            Phase::Focus => (Phase::LongBreak, 0),
            Phase::ShortBreak => (Phase::Focus, self.state.cycle_count),
            Phase::LongBreak => (Phase::Focus, 0),
        };

        self.state.phase = phase;
        self.state.cycle_count = cycle_count;
        self.state.seconds_remaining = phase.duration_seconds(&self.config);
    }

    fn bump_revision(&mut self) {
        self.state.revision = self.state.revision.wrapping_add(1);
    }
}

/// Zero-padded `MM:SS`; minutes grow past two digits when needed
pub fn format_clock(seconds: u64) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

fn end_after(now_ms: i64, seconds: u64) -> i64 {
    let millis = i64::try_from(seconds.saturating_mul(1000)).unwrap_or(i64::MAX);
    now_ms.saturating_add(millis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const T0: i64 = 1_700_000_000_000;

    fn machine() -> TimerMachine {
        TimerMachine::new(TimerConfig::default())
    }

    fn arb_phase() -> impl Strategy<Value = Phase> {
        prop_oneof![
            Just(Phase::Focus),
            Just(Phase::ShortBreak),
            Just(Phase::LongBreak),
        ]
    }

    #[test]
    fn start_sets_end_timestamp_from_remaining_time() {
        let mut timer = machine();
        assert!(timer.start(T0));
        assert!(timer.is_running());
        assert_eq!(timer.state().end_timestamp, Some(T0 + 900_000));
        assert_eq!(timer.seconds_left(T0 + 60_000), 840);
    }

    #[test]
    fn start_while_running_is_a_no_op() {
        let mut timer = machine();
        timer.start(T0);
        let before = timer.clone();
        assert!(!timer.start(T0 + 10_000));
        assert_eq!(timer, before);
    }

    #[test]
    fn pause_rounds_to_nearest_second() {
        let mut timer = machine();
        timer.start(T0);
        assert!(timer.pause(T0 + 10_400));
        assert_eq!(timer.state().seconds_remaining, 890);
        assert_eq!(timer.state().end_timestamp, None);
        assert!(!timer.state().running);
    }

    #[test]
    fn pause_after_end_clamps_to_zero() {
        let mut timer = machine();
        timer.start(T0);
        timer.pause(T0 + 1_000_000);
        assert_eq!(timer.state().seconds_remaining, 0);
    }

    #[test]
    fn four_completions_reach_the_long_break() {
        let mut timer = machine();
        let mut now = T0;
        let mut phases = Vec::new();
        let mut cycles = Vec::new();

        timer.start(now);
        for _ in 0..4 {
            // Finish focus.
            now += timer.seconds_left(now) as i64 * 1000;
            assert!(timer.is_due(now));
            phases.push(timer.complete_phase(now).unwrap());
            cycles.push(timer.state().cycle_count);
            assert!(timer.is_running());

            // Finish the break that followed, unless it was the long one.
            if timer.state().phase == Phase::ShortBreak {
                now += timer.seconds_left(now) as i64 * 1000;
                assert_eq!(timer.complete_phase(now), Some(Phase::Focus));
            }
        }

        assert_eq!(
            phases,
            vec![Phase::ShortBreak, Phase::ShortBreak, Phase::ShortBreak, Phase::LongBreak]
        );
        assert_eq!(cycles, vec![1, 2, 3, 0]);
    }

    #[test]
    fn completion_restarts_with_next_phase_duration() {
        let mut timer = machine();
        timer.start(T0);
        let end = T0 + 900_000;
        timer.complete_phase(end);
        assert_eq!(timer.state().phase, Phase::ShortBreak);
        assert_eq!(timer.state().end_timestamp, Some(end + 300_000));
        assert_eq!(timer.seconds_left(end), 300);
    }

    #[test]
    fn completion_while_paused_is_ignored() {
        let mut timer = machine();
        assert_eq!(timer.complete_phase(T0), None);
        assert_eq!(timer.state().phase, Phase::Focus);
    }

    #[test]
    fn repeated_skip_walks_the_cycle() {
        let mut timer = machine();
        let visited: Vec<(Phase, u32)> = (0..8)
            .map(|_| {
                timer.skip();
                (timer.state().phase, timer.state().cycle_count)
            })
            .collect();

        assert_eq!(
            visited,
            vec![
                (Phase::ShortBreak, 1),
                (Phase::Focus, 1),
                (Phase::ShortBreak, 2),
                (Phase::Focus, 2),
                (Phase::ShortBreak, 3),
                (Phase::Focus, 3),
                (Phase::LongBreak, 0),
                (Phase::Focus, 0),
            ]
        );
    }

    #[test]
    fn skip_from_running_lands_paused_with_full_duration() {
        let mut timer = machine();
        timer.start(T0);
        assert_eq!(timer.skip(), Phase::ShortBreak);
        assert!(!timer.state().running);
        assert_eq!(timer.state().end_timestamp, None);
        assert_eq!(timer.state().seconds_remaining, 300);
    }

    #[test]
    fn single_interval_goes_straight_to_long_break() {
        let mut timer = TimerMachine::new(TimerConfig {
            intervals_before_long_break: 1,
            ..TimerConfig::default()
        });
        assert_eq!(timer.skip(), Phase::LongBreak);
        assert_eq!(timer.state().cycle_count, 0);
    }

    #[test]
    fn progress_and_status_line() {
        let mut timer = machine();
        assert_eq!(timer.progress_fraction(T0), 1.0);
        assert_eq!(timer.status_line(T0), "15:00 - Focus");

        timer.start(T0);
        assert_eq!(timer.progress_fraction(T0 + 450_000), 0.5);
        assert_eq!(timer.status_line(T0 + 841_000), "00:59 - Focus");

        timer.skip();
        assert_eq!(timer.status_line(T0), "05:00 - Short Break");
    }

    #[test]
    fn progress_is_clamped_when_remaining_exceeds_duration() {
        let config = TimerConfig::default();
        let timer = TimerMachine::from_parts(config, TimerState::paused(Phase::Focus, 5_000, 0));
        assert_eq!(timer.progress_fraction(T0), 1.0);
    }

    #[test]
    fn format_clock_handles_long_phases() {
        assert_eq!(format_clock(0), "00:00");
        assert_eq!(format_clock(61), "01:01");
        assert_eq!(format_clock(120 * 60), "120:00");
    }

    #[test]
    fn every_mutation_bumps_revision() {
        let mut timer = machine();
        timer.start(T0);
        timer.pause(T0 + 1_000);
        timer.skip();
        timer.reset();
        assert_eq!(timer.state().revision, 4);

        // No-ops leave it alone.
        timer.pause(T0);
        assert_eq!(timer.state().revision, 4);
    }

    #[test]
    fn config_change_reseeds_paused_phase_only() {
        let mut timer = machine();
        let longer = TimerConfig {
            focus_minutes: 25,
            ..TimerConfig::default()
        };
        assert!(timer.apply_config(longer));
        assert_eq!(timer.state().seconds_remaining, 1_500);

        timer.start(T0);
        let shorter = TimerConfig {
            focus_minutes: 10,
            ..TimerConfig::default()
        };
        timer.apply_config(shorter);
        assert_eq!(timer.state().end_timestamp, Some(T0 + 1_500_000));
        assert_eq!(timer.seconds_left(T0), 1_500);
    }

    #[test]
    fn config_change_clamps_cycle_count() {
        let mut timer = TimerMachine::from_parts(
            TimerConfig::default(),
            TimerState::paused(Phase::ShortBreak, 120, 3),
        );
        let fewer = TimerConfig {
            intervals_before_long_break: 2,
            ..TimerConfig::default()
        };
        assert!(timer.apply_config(fewer));
        assert_eq!(timer.state().cycle_count, 1);
        assert_eq!(timer.state().seconds_remaining, 120);
    }

    proptest! {
        #[test]
        fn countdown_tracks_wall_clock(duration in 1u64..10_000, wait_fraction in 0.0f64..1.0) {
            let wait_ms = (duration as f64 * 1000.0 * wait_fraction) as i64;
            let mut timer = TimerMachine::from_parts(
                TimerConfig::default(),
                TimerState::paused(Phase::Focus, duration, 0),
            );
            timer.start(T0);

            let expected = duration as f64 - wait_ms as f64 / 1000.0;
            let reported = timer.seconds_left(T0 + wait_ms) as f64;
            prop_assert!((reported - expected).abs() <= 1.0);
        }

        #[test]
        fn pausing_twice_equals_pausing_once(duration in 1u64..10_000, wait_ms in 0i64..20_000_000) {
            let mut once = TimerMachine::from_parts(
                TimerConfig::default(),
                TimerState::paused(Phase::Focus, duration, 0),
            );
            once.start(T0);
            let mut twice = once.clone();

            once.pause(T0 + wait_ms);
            twice.pause(T0 + wait_ms);
            twice.pause(T0 + wait_ms + 5_000);

            prop_assert_eq!(once.state().seconds_remaining, twice.state().seconds_remaining);
            prop_assert!(!twice.state().running);
        }

        #[test]
        fn reset_always_yields_fresh_focus(
            phase in arb_phase(),
            running in any::<bool>(),
            seconds in 0u64..10_000,
            cycle in 0u32..4,
            focus in 1u32..120,
        ) {
            let config = TimerConfig { focus_minutes: focus, ..TimerConfig::default() };
            let mut state = TimerState::paused(phase, seconds, cycle);
            if running {
                state.running = true;
                state.end_timestamp = Some(T0 + seconds as i64 * 1000);
            }
            let mut timer = TimerMachine::from_parts(config, state);

            timer.reset();

            let after = timer.state();
            prop_assert_eq!(after.phase, Phase::Focus);
            prop_assert!(!after.running);
            prop_assert_eq!(after.seconds_remaining, u64::from(focus) * 60);
            prop_assert_eq!(after.cycle_count, 0);
            prop_assert_eq!(after.end_timestamp, None);
        }
    }
}
