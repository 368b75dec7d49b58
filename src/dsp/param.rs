//! Scheduled parameter automation
//!
//! Every audible parameter of the playback graph (master gain, pre-amp, EQ band
//! gains, spatializer position) is an [`AudioParam`]: a shared timeline of
//! automation events. The control side only ever *schedules* changes; the render
//! thread evaluates the timeline at context time while it fills a quantum.
//!
//! The event model mirrors the Web Audio automation model:
//! - `SetValue` jumps at a time
//! - `LinearRamp` / `ExponentialRamp` end at a time, starting from the previous event
//! - `SetTarget` approaches a target exponentially from a start time

use parking_lot::Mutex;
use std::sync::Arc;

/// Smallest magnitude an exponential ramp is allowed to reach.
const EXPONENTIAL_FLOOR: f32 = 1.0e-4;

/// One automation event on a parameter timeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AutomationEvent {
    /// Jump to `value` at `time`.
    SetValue {
        /// Context time in seconds
        time: f64,
        /// Target value
        value: f32,
    },
    /// Linear ramp reaching `value` at `time`.
    LinearRamp {
        /// End time in seconds
        time: f64,
        /// Value reached at `time`
        value: f32,
    },
    /// Exponential ramp reaching `value` at `time`.
    ExponentialRamp {
        /// End time in seconds
        time: f64,
        /// Value reached at `time`
        value: f32,
    },
    /// First-order approach to `target` beginning at `time`.
    SetTarget {
        /// Start time in seconds
        time: f64,
        /// Asymptotic target
        target: f32,
        /// Time constant in seconds
        time_constant: f64,
    },
}

impl AutomationEvent {
    /// Time at which the event is anchored (end time for ramps, start time otherwise).
    pub fn time(&self) -> f64 {
        match *self {
            AutomationEvent::SetValue { time, .. }
            | AutomationEvent::LinearRamp { time, .. }
            | AutomationEvent::ExponentialRamp { time, .. }
            | AutomationEvent::SetTarget { time, .. } => time,
        }
    }
}

/// Automation timeline owned by an [`AudioParam`].
#[derive(Debug, Clone)]
pub struct ParamTimeline {
    default_value: f32,
    min_value: f32,
    max_value: f32,
    events: Vec<AutomationEvent>,
}

impl ParamTimeline {
    fn new(default_value: f32, min_value: f32, max_value: f32) -> Self {
        Self {
            default_value,
            min_value,
            max_value,
            events: Vec::new(),
        }
    }

    /// Insert keeping events sorted by time; equal times keep insertion order.
    fn insert(&mut self, event: AutomationEvent) {
        let t = event.time();
        let idx = self.events.partition_point(|e| e.time() <= t);
        self.events.insert(idx, event);
    }

    fn value_at(&self, t: f64) -> f32 {
        let mut prev_time = 0.0f64;
        let mut prev_value = self.default_value;
        // Active set-target curve: (start, start value, target, time constant)
        let mut target: Option<(f64, f32, f32, f64)> = None;

        for event in &self.events {
            if event.time() > t {
                let value = match *event {
                    AutomationEvent::LinearRamp { time, value } => {
                        let start = held(prev_value, target, prev_time);
                        linear(prev_time, start, time, value, t)
                    }
                    AutomationEvent::ExponentialRamp { time, value } => {
                        let start = held(prev_value, target, prev_time);
                        exponential(prev_time, start, time, value, t)
                    }
                    _ => held(prev_value, target, t),
                };
                return value.clamp(self.min_value, self.max_value);
            }

            match *event {
                AutomationEvent::SetValue { time, value }
                | AutomationEvent::LinearRamp { time, value }
                | AutomationEvent::ExponentialRamp { time, value } => {
                    prev_time = time;
                    prev_value = value;
                    target = None;
                }
                AutomationEvent::SetTarget {
                    time,
                    target: goal,
                    time_constant,
                } => {
                    let start = held(prev_value, target, time);
                    prev_time = time;
                    prev_value = start;
                    target = Some((time, start, goal, time_constant));
                }
            }
        }

        held(prev_value, target, t).clamp(self.min_value, self.max_value)
    }

    fn cancel_from(&mut self, t: f64) {
        self.events.retain(|e| e.time() < t);
    }

    /// Collapse events that are entirely in the past into a single anchor.
    fn prune(&mut self, now: f64) {
        let passed = self.events.partition_point(|e| e.time() <= now);
        if passed == 0 {
            return;
        }
        let last = self.events[passed - 1];
        let anchor_time = last.time();
        let anchor_value = self.value_at(anchor_time);

        let mut head = vec![AutomationEvent::SetValue {
            time: anchor_time,
            value: anchor_value,
        }];
        if let AutomationEvent::SetTarget { .. } = last {
            head.push(last);
        }
        self.events.splice(0..passed, head);

        if self.events.len() == 1 {
            if let AutomationEvent::SetValue { value, .. } = self.events[0] {
                self.default_value = value;
                self.events.clear();
            }
        }
    }
}

/// Value between events: constant, or following an active set-target curve.
fn held(prev_value: f32, target: Option<(f64, f32, f32, f64)>, t: f64) -> f32 {
    match target {
        Some((start, v0, goal, tau)) if t > start => {
            if tau <= 0.0 {
                goal
            } else {
                let k = (-(t - start) / tau).exp() as f32;
                goal + (v0 - goal) * k
            }
        }
        Some((_, v0, _, _)) => v0,
        None => prev_value,
    }
}

fn linear(t0: f64, v0: f32, t1: f64, v1: f32, t: f64) -> f32 {
    if t1 <= t0 {
        return v1;
    }
    let frac = ((t - t0) / (t1 - t0)).clamp(0.0, 1.0) as f32;
    v0 + (v1 - v0) * frac
}

fn exponential(t0: f64, v0: f32, t1: f64, v1: f32, t: f64) -> f32 {
    if t1 <= t0 {
        return v1;
    }
    // Sign change or zero endpoints: hold the start value until the ramp ends.
    if v0 == 0.0 || v1 == 0.0 || (v0 < 0.0) != (v1 < 0.0) {
        return if t >= t1 { v1 } else { v0 };
    }
    let frac = ((t - t0) / (t1 - t0)).clamp(0.0, 1.0);
    (v0 as f64 * (v1 as f64 / v0 as f64).powf(frac)) as f32
}

/// Shared, automatable parameter.
///
/// Cloning the handle shares the same timeline, so the graph node and the
/// engine's command surface both address one parameter.
#[derive(Debug, Clone)]
pub struct AudioParam {
    inner: Arc<Mutex<ParamTimeline>>,
}

impl AudioParam {
    /// Create a parameter with a default value and no range restriction.
    pub fn new(default_value: f32) -> Self {
        Self::with_range(default_value, f32::MIN, f32::MAX)
    }

    /// Create a parameter whose computed value is clamped to `[min, max]`.
    pub fn with_range(default_value: f32, min_value: f32, max_value: f32) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ParamTimeline::new(
                default_value,
                min_value,
                max_value,
            ))),
        }
    }

    /// Drop all automation and set the intrinsic value immediately.
    pub fn set_value(&self, value: f32) {
        let mut tl = self.inner.lock();
        tl.events.clear();
        tl.default_value = value;
    }

    /// Schedule a jump to `value` at context time `time`.
    pub fn set_value_at_time(&self, value: f32, time: f64) {
        self.inner
            .lock()
            .insert(AutomationEvent::SetValue { time, value });
    }

    /// Schedule a linear ramp that reaches `value` at `end_time`.
    pub fn linear_ramp_to_value_at_time(&self, value: f32, end_time: f64) {
        self.inner.lock().insert(AutomationEvent::LinearRamp {
            time: end_time,
            value,
        });
    }

    /// Schedule an exponential ramp that reaches `value` at `end_time`.
    ///
    /// Zero is not reachable exponentially; targets are floored to a tiny
    /// positive magnitude with the sign preserved.
    pub fn exponential_ramp_to_value_at_time(&self, value: f32, end_time: f64) {
        let value = if value.abs() < EXPONENTIAL_FLOOR {
            EXPONENTIAL_FLOOR.copysign(if value == 0.0 { 1.0 } else { value })
        } else {
            value
        };
        self.inner.lock().insert(AutomationEvent::ExponentialRamp {
            time: end_time,
            value,
        });
    }

    /// Schedule a first-order approach to `target` starting at `start_time`.
    pub fn set_target_at_time(&self, target: f32, start_time: f64, time_constant: f64) {
        self.inner.lock().insert(AutomationEvent::SetTarget {
            time: start_time,
            target,
            time_constant: time_constant.max(0.0),
        });
    }

    /// Remove every event anchored at or after `time`.
    pub fn cancel_scheduled_values(&self, time: f64) {
        self.inner.lock().cancel_from(time);
    }

    /// Freeze the parameter at whatever value it has at `time` and drop later events.
    pub fn cancel_and_hold_at_time(&self, time: f64) {
        let mut tl = self.inner.lock();
        let held = tl.value_at(time);
        tl.cancel_from(time);
        tl.insert(AutomationEvent::SetValue { time, value: held });
    }

    /// Computed value at context time `time`.
    pub fn value_at(&self, time: f64) -> f32 {
        self.inner.lock().value_at(time)
    }

    /// Fill `out` with per-sample values starting at `start` with spacing `dt`.
    pub fn fill_values(&self, start: f64, dt: f64, out: &mut [f32]) {
        let tl = self.inner.lock();
        if tl.events.is_empty() {
            out.fill(tl.default_value.clamp(tl.min_value, tl.max_value));
            return;
        }
        for (i, slot) in out.iter_mut().enumerate() {
            *slot = tl.value_at(start + i as f64 * dt);
        }
    }

    /// Discard automation that can no longer influence values at or after `now`.
    pub fn prune(&self, now: f64) {
        self.inner.lock().prune(now);
    }

    /// Number of pending automation events.
    pub fn event_count(&self) -> usize {
        self.inner.lock().events.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn default_value_without_events() {
        let p = AudioParam::new(0.5);
        assert_eq!(p.value_at(0.0), 0.5);
        assert_eq!(p.value_at(100.0), 0.5);
    }

    #[test]
    fn linear_ramp_interpolates_from_previous_event() {
        let p = AudioParam::new(1.0);
        p.set_value_at_time(1.0, 1.0);
        p.linear_ramp_to_value_at_time(0.0, 2.0);
        assert_relative_eq!(p.value_at(1.0), 1.0);
        assert_relative_eq!(p.value_at(1.5), 0.5, epsilon = 1e-6);
        assert_relative_eq!(p.value_at(2.0), 0.0);
        assert_relative_eq!(p.value_at(3.0), 0.0);
    }

    #[test]
    fn exponential_ramp_hits_endpoints() {
        let p = AudioParam::new(1.0);
        p.set_value_at_time(0.01, 0.0);
        p.exponential_ramp_to_value_at_time(1.0, 0.8);
        assert_relative_eq!(p.value_at(0.0), 0.01, epsilon = 1e-6);
        assert_relative_eq!(p.value_at(0.4), 0.1, epsilon = 1e-4);
        assert_relative_eq!(p.value_at(0.8), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn set_target_converges() {
        let p = AudioParam::new(0.0);
        p.set_target_at_time(6.0, 0.0, 0.02);
        assert!(p.value_at(0.02) > 3.5 && p.value_at(0.02) < 4.0);
        assert_relative_eq!(p.value_at(0.5), 6.0, epsilon = 1e-4);
    }

    #[test]
    fn cancel_and_hold_freezes_midway() {
        let p = AudioParam::new(0.0);
        p.set_value_at_time(0.0, 0.0);
        p.linear_ramp_to_value_at_time(1.0, 1.0);
        p.cancel_and_hold_at_time(0.25);
        assert_relative_eq!(p.value_at(0.25), 0.25, epsilon = 1e-6);
        assert_relative_eq!(p.value_at(0.9), 0.25, epsilon = 1e-6);
    }

    #[test]
    fn cancel_scheduled_values_drops_future_events() {
        let p = AudioParam::new(1.0);
        p.set_value_at_time(0.2, 5.0);
        p.cancel_scheduled_values(4.0);
        assert_eq!(p.value_at(6.0), 1.0);
        assert_eq!(p.event_count(), 0);
    }

    #[test]
    fn prune_keeps_values_stable() {
        let p = AudioParam::new(1.0);
        for i in 0..100 {
            p.set_value_at_time(i as f32, i as f64 * 0.01);
        }
        let before = p.value_at(0.5);
        p.prune(0.5);
        assert!(p.event_count() < 60);
        assert_eq!(p.value_at(0.5), before);
        assert_eq!(p.value_at(0.99), 99.0);
    }

    #[test]
    fn range_is_clamped() {
        let p = AudioParam::with_range(0.0, -12.0, 12.0);
        p.set_value(40.0);
        assert_eq!(p.value_at(0.0), 12.0);
    }
}
