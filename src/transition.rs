//! Transition controller
//!
//! Every audible state change goes through a gain envelope on the master
//! stage, never a direct jump. Overlapping requests are resolved with
//! monotonically increasing epochs: an async step captures a token when it
//! starts and checks it again before it takes effect.

use crate::dsp::AudioParam;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Level treated as silence by the fades (never exactly zero).
pub const SILENCE_FLOOR: f32 = 0.01;
/// Fade-out before a track swap (also used at natural end of track).
pub const LOAD_FADE_OUT: Duration = Duration::from_millis(300);
/// Exponential fade-in when playback starts.
pub const PLAY_FADE_IN: Duration = Duration::from_millis(800);
/// Fade-out before pausing.
pub const PAUSE_FADE_OUT: Duration = Duration::from_millis(200);
/// Dip before a seek jump.
pub const SEEK_MUTE: Duration = Duration::from_millis(30);
/// Recovery after a seek jump.
pub const SEEK_RESTORE: Duration = Duration::from_millis(150);

/// Monotonic sequence counter.
#[derive(Debug, Clone, Default)]
pub struct Epoch {
    counter: Arc<AtomicU64>,
}

/// Snapshot of an [`Epoch`] taken when an operation started.
#[derive(Debug, Clone)]
pub struct EpochToken {
    counter: Arc<AtomicU64>,
    value: u64,
}

impl Epoch {
    /// Fresh counter at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new operation, superseding every earlier token.
    pub fn begin(&self) -> EpochToken {
        let value = self.counter.fetch_add(1, Ordering::AcqRel) + 1;
        EpochToken {
            counter: self.counter.clone(),
            value,
        }
    }

    /// Latest issued value.
    pub fn current(&self) -> u64 {
        self.counter.load(Ordering::Acquire)
    }
}

impl EpochToken {
    /// Sequence value captured by this token.
    pub fn value(&self) -> u64 {
        self.value
    }

    /// Whether no newer operation has started since this token was issued.
    pub fn is_current(&self) -> bool {
        self.counter.load(Ordering::Acquire) == self.value
    }
}

/// Gain envelopes on the master stage.
#[derive(Debug, Clone)]
pub struct TransitionController {
    master: AudioParam,
}

impl TransitionController {
    /// Controller driving `master`.
    pub fn new(master: AudioParam) -> Self {
        Self { master }
    }

    /// The master gain parameter.
    pub fn master(&self) -> &AudioParam {
        &self.master
    }

    /// Linear fade from the current level to the silence floor.
    ///
    /// Returns the time the fade completes.
    pub fn fade_out(&self, now: f64, duration: Duration) -> f64 {
        let end = now + duration.as_secs_f64();
        self.master.cancel_and_hold_at_time(now);
        self.master.linear_ramp_to_value_at_time(SILENCE_FLOOR, end);
        end
    }

    /// Drop any envelope and sit at the silence floor from `now`.
    pub fn hold_silent(&self, now: f64) {
        self.master.cancel_scheduled_values(now);
        self.master.set_value_at_time(SILENCE_FLOOR, now);
    }

    /// Exponential entrance from the silence floor to unity.
    pub fn fade_in(&self, now: f64, duration: Duration) -> f64 {
        let end = now + duration.as_secs_f64();
        self.master.cancel_scheduled_values(now);
        self.master.set_value_at_time(SILENCE_FLOOR, now);
        self.master.exponential_ramp_to_value_at_time(1.0, end);
        end
    }

    /// Exponential rise from the level held at `now` to unity, for an element
    /// that is already audible.
    pub fn rise(&self, now: f64, duration: Duration) -> f64 {
        let end = now + duration.as_secs_f64();
        self.master.cancel_and_hold_at_time(now);
        self.master.exponential_ramp_to_value_at_time(1.0, end);
        end
    }

    /// Quick linear recovery from the current level to unity.
    pub fn restore(&self, now: f64, duration: Duration) -> f64 {
        let end = now + duration.as_secs_f64();
        self.master.cancel_and_hold_at_time(now);
        self.master.linear_ramp_to_value_at_time(1.0, end);
        end
    }

    /// Reset to unity at `now` (after a pause has silenced the element).
    pub fn reset_unity(&self, now: f64) {
        self.master.cancel_scheduled_values(now);
        self.master.set_value_at_time(1.0, now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_newer_token_supersedes_older() {
        let epoch = Epoch::new();
        let first = epoch.begin();
        let second = epoch.begin();
        assert!(!first.is_current());
        assert!(second.is_current());
        assert!(second.value() > first.value());
        assert_eq!(epoch.current(), second.value());
    }

    #[test]
    fn test_fade_in_envelope() {
        let ctl = TransitionController::new(AudioParam::new(1.0));
        let end = ctl.fade_in(2.0, PLAY_FADE_IN);
        assert_relative_eq!(end, 2.8, epsilon = 1e-9);
        assert_relative_eq!(ctl.master().value_at(2.0), SILENCE_FLOOR, epsilon = 1e-6);
        let mid = ctl.master().value_at(2.4);
        assert!(mid > SILENCE_FLOOR && mid < 0.2, "exponential curve stays low early: {mid}");
        assert_relative_eq!(ctl.master().value_at(2.8), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_rise_never_drops_below_held_level() {
        let ctl = TransitionController::new(AudioParam::new(1.0));
        ctl.fade_out(0.0, PAUSE_FADE_OUT);
        let level = ctl.master().value_at(0.1);
        ctl.rise(0.1, PLAY_FADE_IN);
        assert_relative_eq!(ctl.master().value_at(0.1), level, epsilon = 1e-6);
        assert!(ctl.master().value_at(0.3) > level);
        assert_relative_eq!(ctl.master().value_at(0.9), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_fade_out_starts_from_current_level() {
        let ctl = TransitionController::new(AudioParam::new(1.0));
        ctl.fade_in(0.0, PLAY_FADE_IN);
        // Interrupt the entrance halfway
        let level = ctl.master().value_at(0.4);
        ctl.fade_out(0.4, LOAD_FADE_OUT);
        assert_relative_eq!(ctl.master().value_at(0.4), level, epsilon = 1e-6);
        assert_relative_eq!(ctl.master().value_at(0.7), SILENCE_FLOOR, epsilon = 1e-6);
        assert!(ctl.master().value_at(0.55) < level);
    }
}
