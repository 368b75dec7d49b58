//! Signal graph manager
//!
//! Fixed-topology node chain:
//!
//! ```text
//! source → eq[0..6] → (spatializer) → pre-amp → compressor → master → analyser → destination
//! ```
//!
//! The spatializer is only in the path while a spatial mode is active or its
//! crossfade is still running. The topology is never patched incrementally:
//! [`SignalGraph::rebuild`] drops every connection and lays the chain out
//! again from the current mode.
//!
//! Entering or leaving a spatial mode crossfades the dry and spatialized
//! signals over the same ramp the pre-amp compensation follows, so the
//! product stays at the loudness of whichever path is audible.

pub mod context;

pub use context::{AudioContext, ContextState, Visibility};

use crate::dsp::{
    distance_gain, AnalyserHandle, Analyser, AudioParam, Compressor, Equalizer, PositionParams,
    Spatializer, EQ_BAND_COUNT,
};
use crate::spatial::SpatialMode;
use tracing::debug;

/// Highest pre-amp gain the user volume maps to.
pub const PRE_AMP_MAX: f32 = 1.6;

/// Ceiling of the spatial loudness compensation (+12 dB).
pub const MAX_SPATIAL_COMPENSATION: f32 = 3.981_072;

/// Glide used when the pre-amp level changes; also the bypass crossfade length.
const PRE_AMP_RAMP_SECONDS: f64 = 0.05;

/// Equal-power pan gain of a centred source (-3 dB per ear).
const CENTRE_PAN_GAIN: f32 = std::f32::consts::FRAC_1_SQRT_2;

/// Node identity inside the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeId {
    /// Media element output
    Source,
    /// Equalizer band by index
    Eq(u8),
    /// 3D spatializer
    Spatializer,
    /// Volume / boost stage
    PreAmp,
    /// Dynamics compressor
    Compressor,
    /// Fade envelope stage
    Master,
    /// Visualization tap
    Analyser,
    /// Context output
    Destination,
}

/// Parameter handles the control side schedules against.
#[derive(Debug, Clone)]
pub struct GraphParams {
    /// Master gain (fade envelopes)
    pub master: AudioParam,
    /// Pre-amplifier gain
    pub pre_amp: AudioParam,
    /// Equalizer band gains in dB
    pub eq: Vec<AudioParam>,
    /// Spatializer source position
    pub position: PositionParams,
}

/// Loudness compensation applied to the pre-amp for a spatial mode.
///
/// Undoes the distance attenuation at the mode's nominal radius and the
/// centre pan loss, capped at [`MAX_SPATIAL_COMPENSATION`].
pub fn spatial_compensation(mode: SpatialMode) -> f32 {
    if !mode.is_enabled() {
        return 1.0;
    }
    let loss = distance_gain(mode.nominal_radius()) * CENTRE_PAN_GAIN;
    (1.0 / loss).min(MAX_SPATIAL_COMPENSATION)
}

/// The playback graph.
pub struct SignalGraph {
    sample_rate: u32,
    mode: SpatialMode,
    connections: Vec<(NodeId, NodeId)>,
    route: Vec<NodeId>,
    equalizer: Equalizer,
    spatializer: Spatializer,
    pre_amp: AudioParam,
    compressor: Compressor,
    master: AudioParam,
    analyser: AnalyserHandle,
    analyser_enabled: bool,
    volume_gain: f32,
    /// 0 = dry, 1 = spatialized
    spatial_mix: AudioParam,
    /// Compensation of the last enabled mode; weights the wet path while fading
    wet_compensation: f32,
    gains: Vec<f32>,
    mix: Vec<f32>,
    dry: Vec<f32>,
}

impl SignalGraph {
    /// Construct every node and wire the chain with spatial mode off.
    pub fn new(sample_rate: u32) -> Self {
        let mut graph = Self {
            sample_rate,
            mode: SpatialMode::Off,
            connections: Vec::new(),
            route: Vec::new(),
            equalizer: Equalizer::new(sample_rate),
            spatializer: Spatializer::new(sample_rate),
            pre_amp: AudioParam::with_range(1.0, 0.0, PRE_AMP_MAX * MAX_SPATIAL_COMPENSATION),
            compressor: Compressor::new(sample_rate),
            master: AudioParam::with_range(1.0, 0.0, 1.0),
            analyser: Analyser::new().into_handle(),
            analyser_enabled: true,
            volume_gain: 1.0,
            spatial_mix: AudioParam::with_range(0.0, 0.0, 1.0),
            wet_compensation: 1.0,
            gains: Vec::new(),
            mix: Vec::new(),
            dry: Vec::new(),
        };
        graph.rebuild(0.0);
        graph
    }

    /// Sample rate the nodes were built for.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Handles for scheduling automation without touching the graph.
    pub fn params(&self) -> GraphParams {
        GraphParams {
            master: self.master.clone(),
            pre_amp: self.pre_amp.clone(),
            eq: (0..EQ_BAND_COUNT)
                .filter_map(|i| self.equalizer.gain_param(i).cloned())
                .collect(),
            position: self.spatializer.position().clone(),
        }
    }

    /// Shared analyser handle.
    pub fn analyser(&self) -> AnalyserHandle {
        self.analyser.clone()
    }

    /// Current spatial mode.
    pub fn spatial_mode(&self) -> SpatialMode {
        self.mode
    }

    /// Record the spatial mode. Takes effect on the next [`rebuild`](Self::rebuild).
    pub fn set_spatial_mode(&mut self, mode: SpatialMode) {
        self.mode = mode;
    }

    /// Whether the analyser tap is fed.
    pub fn analyser_enabled(&self) -> bool {
        self.analyser_enabled
    }

    /// Enable or disable the analyser tap (disabled for cross-origin-restricted sources).
    pub fn set_analyser_enabled(&mut self, enabled: bool) {
        if !enabled {
            self.analyser.lock().clear();
        }
        self.analyser_enabled = enabled;
    }

    /// Gains the equalizer filters currently implement.
    pub fn applied_eq_gains(&self) -> [f32; EQ_BAND_COUNT] {
        self.equalizer.applied_gains()
    }

    /// Current compressor gain reduction in dB.
    pub fn compressor_reduction(&self) -> f32 {
        self.compressor.reduction()
    }

    /// Current connections, in the order they were made.
    pub fn connections(&self) -> &[(NodeId, NodeId)] {
        &self.connections
    }

    /// Nodes a sample passes through, source to destination.
    pub fn route(&self) -> &[NodeId] {
        &self.route
    }

    /// Set the user volume (0..1, mapped onto the pre-amp's boost range).
    pub fn set_volume(&mut self, volume: f32, now: f64) {
        let v = if volume.is_finite() {
            volume.clamp(0.0, 1.0)
        } else {
            1.0 / PRE_AMP_MAX
        };
        self.volume_gain = v * PRE_AMP_MAX;
        self.apply_pre_amp(now);
    }

    fn apply_pre_amp(&self, now: f64) {
        let target = self.volume_gain * spatial_compensation(self.mode);
        self.pre_amp.cancel_and_hold_at_time(now);
        self.pre_amp
            .linear_ramp_to_value_at_time(target, now + PRE_AMP_RAMP_SECONDS);
    }

    /// Whether the spatialized path contributes anything at or after `time`.
    fn spatial_audible(&self, time: f64) -> bool {
        self.mode.is_enabled() || self.spatial_mix.value_at(time) > 0.0
    }

    fn wire(&mut self, with_spatializer: bool, now: f64) {
        if with_spatializer && !self.route.contains(&NodeId::Spatializer) {
            self.spatializer.snap_to(now);
        }
        self.connections.clear();

        let mut chain = Vec::with_capacity(EQ_BAND_COUNT + 7);
        chain.push(NodeId::Source);
        chain.extend((0..EQ_BAND_COUNT as u8).map(NodeId::Eq));
        if with_spatializer {
            chain.push(NodeId::Spatializer);
        } else {
            self.spatializer.reset();
        }
        chain.extend([
            NodeId::PreAmp,
            NodeId::Compressor,
            NodeId::Master,
            NodeId::Analyser,
            NodeId::Destination,
        ]);

        self.connections
            .extend(chain.windows(2).map(|pair| (pair[0], pair[1])));
        self.route = chain;
    }

    /// Disconnect everything and reconnect the fixed chain for the current mode.
    ///
    /// Also applies the spatial loudness compensation on the pre-amp and starts
    /// the dry/spatialized crossfade. A spatializer being faded out stays
    /// connected until the crossfade ends. Calling it again without a state
    /// change yields the same connectivity.
    pub fn rebuild(&mut self, now: f64) {
        let mix_target = if self.mode.is_enabled() {
            self.wet_compensation = spatial_compensation(self.mode);
            1.0
        } else {
            0.0
        };
        self.spatial_mix.cancel_and_hold_at_time(now);
        self.spatial_mix
            .linear_ramp_to_value_at_time(mix_target, now + PRE_AMP_RAMP_SECONDS);
        self.wire(self.spatial_audible(now), now);
        self.apply_pre_amp(now);

        debug!(
            mode = %self.mode,
            connections = self.connections.len(),
            "signal graph rebuilt"
        );
    }

    /// Run one block of interleaved stereo (already holding source audio)
    /// through the route. `block_start` is the context time of the first frame.
    pub fn process(&mut self, block_start: f64, buffer: &mut [f32]) {
        let frames = buffer.len() / 2;
        let dt = 1.0 / self.sample_rate as f64;
        if self.gains.len() < frames {
            self.gains.resize(frames, 0.0);
        }

        for index in 0..self.route.len() {
            match self.route[index] {
                NodeId::Source | NodeId::Destination => {}
                NodeId::Eq(band) => {
                    self.equalizer
                        .process_band(band as usize, block_start, buffer)
                }
                NodeId::Spatializer => self.spatialize(block_start, dt, buffer),
                NodeId::PreAmp => {
                    apply_gain(&self.pre_amp, block_start, dt, &mut self.gains, buffer)
                }
                NodeId::Compressor => self.compressor.process(buffer),
                NodeId::Master => {
                    apply_gain(&self.master, block_start, dt, &mut self.gains, buffer)
                }
                NodeId::Analyser => {
                    if self.analyser_enabled {
                        // Never stall the render path on a reader.
                        if let Some(mut analyser) = self.analyser.try_lock() {
                            analyser.feed(buffer);
                        }
                    }
                }
            }
        }

        let block_end = block_start + frames as f64 * dt;
        if self.route.contains(&NodeId::Spatializer) && !self.spatial_audible(block_end) {
            self.wire(false, block_end);
            debug!("spatializer crossfade finished; bypassed");
        }
    }

    /// Spatialize in place, blending with the dry signal while the mix ramps.
    ///
    /// Each path is weighted by its own compensation and divided by the one the
    /// pre-amp currently applies, so after the pre-amp both sit at matched
    /// loudness.
    fn spatialize(&mut self, block_start: f64, dt: f64, buffer: &mut [f32]) {
        let frames = buffer.len() / 2;
        if self.mix.len() < frames {
            self.mix.resize(frames, 0.0);
        }
        let mix = &mut self.mix[..frames];
        self.spatial_mix.fill_values(block_start, dt, mix);
        self.spatial_mix.prune(block_start);

        if mix.iter().all(|&m| m >= 1.0) {
            self.spatializer.process(block_start, buffer);
            return;
        }

        self.dry.clear();
        self.dry.extend_from_slice(buffer);
        self.spatializer.process(block_start, buffer);

        let wet_comp = self.wet_compensation;
        for ((wet, dry), &m) in buffer
            .chunks_exact_mut(2)
            .zip(self.dry.chunks_exact(2))
            .zip(mix.iter())
        {
            let applied = 1.0 + (wet_comp - 1.0) * m;
            let dry_w = (1.0 - m) / applied;
            let wet_w = m * wet_comp / applied;
            wet[0] = dry[0] * dry_w + wet[0] * wet_w;
            wet[1] = dry[1] * dry_w + wet[1] * wet_w;
        }
    }

    /// Clear node memory (filters, delay line, detector) on a source change.
    pub fn reset_state(&mut self) {
        self.equalizer.reset();
        self.spatializer.reset();
        self.compressor.reset();
    }
}

fn apply_gain(param: &AudioParam, start: f64, dt: f64, scratch: &mut [f32], buffer: &mut [f32]) {
    let frames = buffer.len() / 2;
    let gains = &mut scratch[..frames];
    param.fill_values(start, dt, gains);
    param.prune(start);
    for (frame, g) in buffer.chunks_exact_mut(2).zip(gains.iter()) {
        frame[0] *= g;
        frame[1] *= g;
    }
}

impl std::fmt::Debug for SignalGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalGraph")
            .field("mode", &self.mode)
            .field("route", &self.route)
            .field("analyser_enabled", &self.analyser_enabled)
            .finish()
    }
}
