//! Spatial motion engine
//!
//! Spatial modes are parametric paths around the listener. While a track is
//! playing with a mode other than [`SpatialMode::Off`], the [`MotionDriver`]
//! samples the path at context time and schedules the spatializer position.
//! It is ticked from two places:
//!
//! - the host's animation frame hook while foregrounded
//! - a background interval while the host is hidden, since frame callbacks
//!   stop there and the image would otherwise freeze on one side

use crate::dsp::{PositionParams, Vec3};
use crate::graph::{AudioContext, ContextState, Visibility};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

/// Duration of the glide back to center when motion is switched off.
pub const CENTER_RAMP_SECONDS: f64 = 0.1;

/// Spatial motion preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SpatialMode {
    /// Spatializer bypassed
    #[default]
    #[serde(rename = "off")]
    Off,
    /// Horizontal circle, radius 3
    #[serde(rename = "8d")]
    EightD,
    /// Wider circle with a slow vertical bob
    #[serde(rename = "16d")]
    SixteenD,
    /// Widest, fastest, axes at slightly different rates
    #[serde(rename = "32d")]
    ThirtyTwoD,
}

impl SpatialMode {
    /// All modes, off first.
    pub const ALL: [SpatialMode; 4] = [
        SpatialMode::Off,
        SpatialMode::EightD,
        SpatialMode::SixteenD,
        SpatialMode::ThirtyTwoD,
    ];

    /// Whether the spatializer is part of the signal path.
    pub fn is_enabled(self) -> bool {
        self != SpatialMode::Off
    }

    /// Nominal orbit radius (distance used for loudness compensation).
    pub fn nominal_radius(self) -> f32 {
        match self {
            SpatialMode::Off => 0.0,
            SpatialMode::EightD => 3.0,
            SpatialMode::SixteenD => 5.0,
            SpatialMode::ThirtyTwoD => 8.0,
        }
    }

    /// Position on the mode's path at context time `t` seconds.
    pub fn position_at(self, t: f64) -> Vec3 {
        match self {
            SpatialMode::Off => Vec3::ORIGIN,
            SpatialMode::EightD => {
                let a = t * 0.8;
                Vec3::new((a.sin() * 3.0) as f32, 0.0, (a.cos() * 3.0) as f32)
            }
            SpatialMode::SixteenD => {
                let a = t * 1.2;
                Vec3::new(
                    (a.sin() * 5.0) as f32,
                    ((t * 0.5).sin() * 2.0) as f32,
                    (a.cos() * 5.0) as f32,
                )
            }
            SpatialMode::ThirtyTwoD => {
                let a = t * 2.0;
                Vec3::new(
                    (a.sin() * 8.0) as f32,
                    ((t * 1.5).cos() * 4.0) as f32,
                    ((a * 1.1).cos() * 8.0) as f32,
                )
            }
        }
    }

    fn to_u8(self) -> u8 {
        match self {
            SpatialMode::Off => 0,
            SpatialMode::EightD => 1,
            SpatialMode::SixteenD => 2,
            SpatialMode::ThirtyTwoD => 3,
        }
    }

    fn from_u8(v: u8) -> Self {
        match v {
            1 => SpatialMode::EightD,
            2 => SpatialMode::SixteenD,
            3 => SpatialMode::ThirtyTwoD,
            _ => SpatialMode::Off,
        }
    }
}

impl fmt::Display for SpatialMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SpatialMode::Off => "off",
            SpatialMode::EightD => "8d",
            SpatialMode::SixteenD => "16d",
            SpatialMode::ThirtyTwoD => "32d",
        };
        f.write_str(s)
    }
}

impl FromStr for SpatialMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" | "none" => Ok(SpatialMode::Off),
            "8d" => Ok(SpatialMode::EightD),
            "16d" => Ok(SpatialMode::SixteenD),
            "32d" => Ok(SpatialMode::ThirtyTwoD),
            other => Err(format!("unknown spatial mode '{other}' (expected off, 8d, 16d or 32d)")),
        }
    }
}

/// Mode and activity flags shared between the engine and the driver.
#[derive(Debug, Default)]
struct MotionState {
    mode: AtomicU8,
    playing: AtomicBool,
}

/// Pushes path positions into the spatializer.
#[derive(Debug, Clone)]
pub struct MotionDriver {
    context: AudioContext,
    position: PositionParams,
    state: Arc<MotionState>,
}

impl MotionDriver {
    /// Driver for the given context and spatializer position.
    pub fn new(context: AudioContext, position: PositionParams) -> Self {
        Self {
            context,
            position,
            state: Arc::new(MotionState::default()),
        }
    }

    /// Current mode.
    pub fn mode(&self) -> SpatialMode {
        SpatialMode::from_u8(self.state.mode.load(Ordering::Acquire))
    }

    /// Switch modes. Switching to off glides the source back to the center.
    pub fn set_mode(&self, mode: SpatialMode) {
        self.state.mode.store(mode.to_u8(), Ordering::Release);
        if mode == SpatialMode::Off {
            let now = self.context.current_time();
            self.position
                .ramp_to(Vec3::ORIGIN, now, now + CENTER_RAMP_SECONDS);
        }
    }

    /// Tell the driver whether media is actively playing.
    pub fn set_playing(&self, playing: bool) {
        self.state.playing.store(playing, Ordering::Release);
    }

    /// Whether media is flagged as playing.
    pub fn is_playing(&self) -> bool {
        self.state.playing.load(Ordering::Acquire)
    }

    /// Schedule the current path position. Returns `false` when idle or when
    /// the context is suspended (its clock is frozen).
    pub fn tick(&self) -> bool {
        let mode = self.mode();
        if !mode.is_enabled() || !self.is_playing() {
            return false;
        }
        if self.context.state() == ContextState::Suspended {
            return false;
        }
        let t = self.context.current_time();
        self.position.set_at_time(mode.position_at(t), t);
        true
    }

    /// Start the background ticker on the current tokio runtime.
    ///
    /// The ticker only acts while the host reports [`Visibility::Hidden`].
    /// Returns `None` outside a runtime.
    pub fn spawn_background(&self, period: Duration) -> Option<JoinHandle<()>> {
        let handle = tokio::runtime::Handle::try_current().ok()?;
        let driver = self.clone();
        debug!(period_ms = period.as_millis() as u64, "starting background motion ticker");
        Some(handle.spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                if driver.context.visibility() == Visibility::Hidden {
                    driver.tick();
                }
            }
        }))
    }
}
