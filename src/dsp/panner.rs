//! Positional (3D) spatializer
//!
//! Places a mono downmix of the input at a point around a listener sitting at
//! the origin and facing -Z. Three cues are rendered:
//!
//! - inverse distance attenuation
//! - equal-power interaural level difference from the azimuth
//! - interaural time difference (far ear delayed by up to ~0.66 ms)
//!
//! Position is read once per render quantum; gains and delays are then
//! interpolated across the quantum so a moving source never zips.

use super::param::AudioParam;
use std::f32::consts::FRAC_PI_4;

/// Largest interaural delay in seconds (head radius / speed of sound, roughly).
pub const MAX_ITD_SECONDS: f32 = 0.00066;

/// Reference distance of the inverse distance model.
pub const REF_DISTANCE: f32 = 1.0;

/// Rolloff factor of the inverse distance model.
pub const ROLLOFF_FACTOR: f32 = 1.0;

const DELAY_LINE_LEN: usize = 128;

/// Point in listener space.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vec3 {
    /// Left (-) / right (+)
    pub x: f32,
    /// Down (-) / up (+)
    pub y: f32,
    /// Front (-) / back (+)
    pub z: f32,
}

impl Vec3 {
    /// The listener position.
    pub const ORIGIN: Vec3 = Vec3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    /// Construct a point.
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Euclidean length.
    pub fn length(&self) -> f32 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }
}

/// Inverse distance gain.
pub fn distance_gain(distance: f32) -> f32 {
    let d = distance.max(REF_DISTANCE);
    REF_DISTANCE / (REF_DISTANCE + ROLLOFF_FACTOR * (d - REF_DISTANCE))
}

/// Per-ear gains and delays (in samples) for a source position.
#[derive(Debug, Clone, Copy, PartialEq)]
struct EarState {
    gain_l: f32,
    gain_r: f32,
    delay_l: f32,
    delay_r: f32,
}

impl EarState {
    fn for_position(p: Vec3, max_itd_samples: f32) -> Self {
        let horizontal = (p.x * p.x + p.z * p.z).sqrt();
        // Lateral component in [-1, 1]; 0 straight ahead, behind, above or below.
        let pan = if horizontal > 1.0e-6 {
            let azimuth = p.x.atan2(-p.z);
            let elevation_scale = horizontal / p.length().max(1.0e-6);
            azimuth.sin() * elevation_scale
        } else {
            0.0
        };
        // sin(π) is not exactly zero; keep front and back balanced.
        let pan = if pan.abs() < 1.0e-6 { 0.0 } else { pan };
        let attenuation = distance_gain(p.length());
        let angle = (pan + 1.0) * FRAC_PI_4;
        let itd = pan.abs() * max_itd_samples;
        Self {
            gain_l: angle.cos() * attenuation,
            gain_r: angle.sin() * attenuation,
            delay_l: if pan > 0.0 { itd } else { 0.0 },
            delay_r: if pan < 0.0 { itd } else { 0.0 },
        }
    }
}

/// Source position as three automatable coordinates.
#[derive(Debug, Clone)]
pub struct PositionParams {
    /// X coordinate
    pub x: AudioParam,
    /// Y coordinate
    pub y: AudioParam,
    /// Z coordinate
    pub z: AudioParam,
}

impl PositionParams {
    fn new() -> Self {
        Self {
            x: AudioParam::new(0.0),
            y: AudioParam::new(0.0),
            z: AudioParam::new(0.0),
        }
    }

    /// Jump to `p` at context time `time`.
    pub fn set_at_time(&self, p: Vec3, time: f64) {
        self.x.set_value_at_time(p.x, time);
        self.y.set_value_at_time(p.y, time);
        self.z.set_value_at_time(p.z, time);
    }

    /// Ramp linearly from wherever the source is at `now` to `p` at `end_time`.
    pub fn ramp_to(&self, p: Vec3, now: f64, end_time: f64) {
        for (param, v) in [(&self.x, p.x), (&self.y, p.y), (&self.z, p.z)] {
            param.cancel_and_hold_at_time(now);
            param.linear_ramp_to_value_at_time(v, end_time);
        }
    }

    /// Computed position at `time`.
    pub fn at(&self, time: f64) -> Vec3 {
        Vec3::new(
            self.x.value_at(time),
            self.y.value_at(time),
            self.z.value_at(time),
        )
    }

    fn prune(&self, now: f64) {
        self.x.prune(now);
        self.y.prune(now);
        self.z.prune(now);
    }
}

/// Spatializer node processing interleaved stereo.
pub struct Spatializer {
    position: PositionParams,
    max_itd_samples: f32,
    delay_line: [f32; DELAY_LINE_LEN],
    write_pos: usize,
    current: EarState,
}

impl Spatializer {
    /// Create a spatializer with the source at the origin.
    pub fn new(sample_rate: u32) -> Self {
        let max_itd_samples = (MAX_ITD_SECONDS * sample_rate as f32).min((DELAY_LINE_LEN - 2) as f32);
        Self {
            position: PositionParams::new(),
            max_itd_samples,
            delay_line: [0.0; DELAY_LINE_LEN],
            write_pos: 0,
            current: EarState::for_position(Vec3::ORIGIN, max_itd_samples),
        }
    }

    /// Position parameters (shared handles).
    pub fn position(&self) -> &PositionParams {
        &self.position
    }

    /// Largest interaural delay in samples at this sample rate.
    pub fn max_itd_samples(&self) -> f32 {
        self.max_itd_samples
    }

    fn read_delayed(&self, delay: f32) -> f32 {
        // write_pos points at the slot after the newest sample
        let pos = self.write_pos as f32 - 1.0 - delay;
        let pos = pos.rem_euclid(DELAY_LINE_LEN as f32);
        let i0 = pos.floor() as usize % DELAY_LINE_LEN;
        let i1 = (i0 + 1) % DELAY_LINE_LEN;
        let frac = pos - pos.floor();
        self.delay_line[i0] * (1.0 - frac) + self.delay_line[i1] * frac
    }

    /// Spatialize one block in place.
    pub fn process(&mut self, block_start: f64, buffer: &mut [f32]) {
        let target = EarState::for_position(self.position.at(block_start), self.max_itd_samples);
        self.position.prune(block_start);

        let frames = buffer.len() / 2;
        if frames == 0 {
            return;
        }
        let start = self.current;
        let step = 1.0 / frames as f32;

        for (i, frame) in buffer.chunks_exact_mut(2).enumerate() {
            let mono = 0.5 * (frame[0] + frame[1]);
            self.delay_line[self.write_pos] = mono;
            self.write_pos = (self.write_pos + 1) % DELAY_LINE_LEN;

            let k = (i + 1) as f32 * step;
            let gain_l = start.gain_l + (target.gain_l - start.gain_l) * k;
            let gain_r = start.gain_r + (target.gain_r - start.gain_r) * k;
            let delay_l = start.delay_l + (target.delay_l - start.delay_l) * k;
            let delay_r = start.delay_r + (target.delay_r - start.delay_r) * k;

            frame[0] = self.read_delayed(delay_l) * gain_l;
            frame[1] = self.read_delayed(delay_r) * gain_r;
        }
        self.current = target;
    }

    /// Jump the ear state to the position at `time` so the next block does not
    /// glide in from wherever the node was last used.
    pub fn snap_to(&mut self, time: f64) {
        self.current = EarState::for_position(self.position.at(time), self.max_itd_samples);
    }

    /// Clear the delay line.
    pub fn reset(&mut self) {
        self.delay_line = [0.0; DELAY_LINE_LEN];
        self.write_pos = 0;
    }
}

impl std::fmt::Debug for Spatializer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Spatializer")
            .field("max_itd_samples", &self.max_itd_samples)
            .field("current", &self.current)
            .finish()
    }
}
