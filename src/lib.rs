//! Harmonix music player core
//!
//! Resolves free-text queries into playable tracks by racing catalog mirrors,
//! and plays them through a fixed signal graph: six-band equalizer, optional
//! 8D/16D/32D spatializer, pre-amp, compressor, master gain and analyser.
//! Every audible transition (load, play, pause, seek) is an envelope on the
//! master gain, and overlapping requests are settled by epoch tokens so only
//! the newest one takes effect.
//!
//! # Features
//! - Track resolution with mirror racing and secondary/placeholder fallbacks
//! - Sample-scheduled parameter automation (Web Audio style)
//! - Click-free crossfades, fade-in, pause fade and seek mute
//! - Animated spatial motion with background ticking while hidden
//! - Analyser tap and visualizer sampler
//! - Generative-text helpers with deterministic fallbacks
//!
//! # Crate feature flags
//! - `decode` (default): HTTP/file media loader with symphonia decoding
//! - `export` (default): offline render to WAV (`hound`)
//! - `visualization` (default): visualizer sampler and terminal spectrum line
//! - `streaming` (opt-in): real-time output through rodio
//!
//! # Quick start
//! ```no_run
//! # #[cfg(feature = "decode")]
//! # async fn demo() -> harmonix::Result<()> {
//! use harmonix::{EngineConfig, HttpMediaLoader, PlaybackEngine, ResolverConfig, SpatialMode, TrackResolver};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let resolver = TrackResolver::new(ResolverConfig::default())?;
//! let tracks = resolver.resolve("lofi", 5).await;
//!
//! let loader = HttpMediaLoader::new(Duration::from_secs(30))?;
//! let engine = PlaybackEngine::new(EngineConfig::default(), Arc::new(loader));
//! engine.play_track(&tracks[0], SpatialMode::EightD).await?;
//! let mut renderer = engine.renderer();
//! let mut block = vec![0.0f32; 256];
//! renderer.render(&mut block);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod assist;
pub mod config;
pub mod dsp;
pub mod engine;
pub mod error;
#[cfg(feature = "export")]
pub mod export;
pub mod graph;
pub mod media;
pub mod resolver;
pub mod spatial;
#[cfg(feature = "streaming")]
pub mod streaming;
pub mod track;
pub mod transition;
#[cfg(feature = "visualization")]
pub mod visualizer;

pub use error::{AssistError, HarmonixError, MediaError, PlaybackError, ResolveError, Result};

pub use assist::{ArtistInfo, Assistant, TextAssistant};
pub use config::{AppConfig, AssistConfig, EngineConfig, ResolverConfig, DEMO_TRACK_URL};
pub use dsp::{AudioParam, EqPreset, EQ_BAND_COUNT, EQ_FREQUENCIES};
pub use engine::{
    EngineEvent, Lifecycle, LoadOutcome, MediaAction, MediaMetadata, MediaSessionHandlers,
    PlaybackEngine, Renderer, TransportState,
};
#[cfg(feature = "export")]
pub use export::render_to_wav;
pub use graph::{AudioContext, ContextState, SignalGraph, Visibility};
#[cfg(feature = "decode")]
pub use media::HttpMediaLoader;
pub use media::{CorsMode, DecodedAudio, MediaLoader};
pub use resolver::TrackResolver;
pub use spatial::SpatialMode;
#[cfg(feature = "streaming")]
pub use streaming::{AudioDevice, FrameRing, RenderLoop, StreamConfig};
pub use track::TrackDescriptor;
#[cfg(feature = "visualization")]
pub use visualizer::VisualizerSampler;
