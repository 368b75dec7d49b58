//! Signal processing building blocks of the playback graph
//!
//! Each node processes interleaved stereo `f32` blocks in place; every
//! parameter that changes over time is an [`param::AudioParam`] timeline read
//! by the render thread.

pub mod analyser;
pub mod compressor;
pub mod equalizer;
pub mod panner;
pub mod param;

pub use analyser::{Analyser, AnalyserHandle, FFT_SIZE, FREQUENCY_BIN_COUNT};
pub use compressor::{Compressor, CompressorSettings};
pub use equalizer::{EqPreset, Equalizer, EQ_BAND_COUNT, EQ_FREQUENCIES, EQ_MAX_DB, EQ_MIN_DB};
pub use panner::{distance_gain, PositionParams, Spatializer, Vec3};
pub use param::{AudioParam, AutomationEvent};
