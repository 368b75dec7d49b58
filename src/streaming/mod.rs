//! Real-time output to the system audio device
//!
//! A producer thread pulls interleaved stereo blocks from the engine's
//! [`Renderer`](crate::engine::Renderer) into a [`FrameRing`]; the rodio
//! source drains it on the device thread. Memory use is bounded by the ring.

pub mod audio_device;
pub mod realtime;
pub mod ring_buffer;

pub use audio_device::AudioDevice;
pub use realtime::{PlaybackStats, RenderLoop};
pub use ring_buffer::{FrameRing, RingBufferError};

/// Producer backoff when the ring is full, in microseconds
pub const BUFFER_BACKOFF_MICROS: u64 = 100;

/// Configuration for streaming playback
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamConfig {
    /// Ring size in frames
    pub ring_frames: usize,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Interleaved channel count (the engine renders stereo)
    pub channels: u16,
}

impl StreamConfig {
    /// Ring = 4096 frames ≈ 93ms @ 44.1kHz
    pub fn low_latency(sample_rate: u32) -> Self {
        StreamConfig {
            ring_frames: 4096,
            sample_rate,
            channels: 2,
        }
    }

    /// Ring = 16384 frames ≈ 372ms @ 44.1kHz, for hosts prone to stalls
    pub fn stable(sample_rate: u32) -> Self {
        StreamConfig {
            ring_frames: 16384,
            ..Self::low_latency(sample_rate)
        }
    }

    /// Buffered latency in milliseconds when the ring is full
    pub fn latency_ms(&self) -> f32 {
        self.ring_frames as f32 / self.sample_rate.max(1) as f32 * 1000.0
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self::stable(44100)
    }
}
