//! Media sources
//!
//! A [`MediaLoader`] turns a URL into decoded stereo audio. The
//! [`MediaElement`] is the single "now playing" source the engine feeds into
//! the signal graph: it tracks the source URL, the playhead and the
//! paused/ended flags, and resamples to the context rate on the fly.

#[cfg(feature = "decode")]
mod loader;

#[cfg(feature = "decode")]
pub use loader::{decode_bytes, HttpMediaLoader};

use crate::error::MediaError;
use async_trait::async_trait;
use std::sync::Arc;

/// Cross-origin requirement for a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CorsMode {
    /// Source must allow anonymous cross-origin reads (needed for analysis)
    #[default]
    Anonymous,
    /// Playback-only; no cross-origin requirement
    None,
}

/// Decoded audio: interleaved stereo at the source's sample rate.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    sample_rate: u32,
    samples: Vec<f32>,
}

impl DecodedAudio {
    /// Wrap interleaved stereo samples.
    pub fn new(sample_rate: u32, samples: Vec<f32>) -> Self {
        let mut samples = samples;
        // Odd trailing sample cannot form a frame
        samples.truncate(samples.len() & !1);
        Self {
            sample_rate: sample_rate.max(1),
            samples,
        }
    }

    /// Build from interleaved audio with any channel count.
    ///
    /// Mono is duplicated to both sides; more than two channels keep the first two.
    pub fn from_interleaved(sample_rate: u32, channels: usize, data: &[f32]) -> Self {
        let samples = match channels {
            0 => Vec::new(),
            1 => data.iter().flat_map(|&s| [s, s]).collect(),
            2 => data.to_vec(),
            n => data
                .chunks_exact(n)
                .flat_map(|frame| [frame[0], frame[1]])
                .collect(),
        };
        Self::new(sample_rate, samples)
    }

    /// Source sample rate.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of stereo frames.
    pub fn frames(&self) -> usize {
        self.samples.len() / 2
    }

    /// Duration in seconds.
    pub fn duration(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }

    /// Interleaved samples.
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }
}

/// Opens media URLs.
#[async_trait]
pub trait MediaLoader: Send + Sync {
    /// Fetch and decode `url`.
    async fn open(&self, url: &str, cors: CorsMode) -> Result<DecodedAudio, MediaError>;
}

/// The one playback slot.
#[derive(Debug, Default)]
pub struct MediaElement {
    src: Option<String>,
    cors: CorsMode,
    audio: Option<Arc<DecodedAudio>>,
    /// Playhead in source frames (fractional)
    position: f64,
    paused: bool,
    ended: bool,
}

impl MediaElement {
    /// Empty, paused element.
    pub fn new() -> Self {
        Self {
            paused: true,
            ..Default::default()
        }
    }

    /// Current source URL.
    pub fn src(&self) -> Option<&str> {
        self.src.as_deref()
    }

    /// Cross-origin mode of the current source.
    pub fn cors(&self) -> CorsMode {
        self.cors
    }

    /// Whether decoded audio is attached.
    pub fn has_audio(&self) -> bool {
        self.audio.is_some()
    }

    /// Attach a freshly loaded source; the element is paused at zero.
    pub fn set_source(&mut self, url: &str, cors: CorsMode, audio: Arc<DecodedAudio>) {
        self.src = Some(url.to_string());
        self.cors = cors;
        self.audio = Some(audio);
        self.position = 0.0;
        self.paused = true;
        self.ended = false;
    }

    /// Drop the source (failed load).
    pub fn clear(&mut self) {
        self.audio = None;
        self.position = 0.0;
        self.paused = true;
        self.ended = false;
    }

    /// Start advancing. Playing an ended element restarts it.
    pub fn play(&mut self) {
        if self.ended {
            self.position = 0.0;
            self.ended = false;
        }
        self.paused = false;
    }

    /// Stop advancing.
    pub fn pause(&mut self) {
        self.paused = true;
    }

    /// Whether the playhead is held.
    pub fn paused(&self) -> bool {
        self.paused
    }

    /// Whether the playhead reached the end.
    pub fn ended(&self) -> bool {
        self.ended
    }

    /// Whether audio is audibly advancing.
    pub fn is_playing(&self) -> bool {
        !self.paused && !self.ended && self.audio.is_some()
    }

    /// Playhead in seconds.
    pub fn current_time(&self) -> f64 {
        match &self.audio {
            Some(a) => self.position / a.sample_rate() as f64,
            None => 0.0,
        }
    }

    /// Source duration in seconds, 0 when nothing is loaded.
    pub fn duration(&self) -> f64 {
        self.audio.as_ref().map_or(0.0, |a| a.duration())
    }

    /// Move the playhead to `seconds`, clamped to the source.
    pub fn seek(&mut self, seconds: f64) {
        if let Some(a) = &self.audio {
            let t = seconds.clamp(0.0, a.duration());
            self.position = t * a.sample_rate() as f64;
            self.ended = false;
        }
    }

    /// Render into interleaved stereo `out` at `output_rate`.
    ///
    /// Writes silence while paused. Returns `true` if the element reached its
    /// end during this call.
    pub fn read(&mut self, out: &mut [f32], output_rate: u32) -> bool {
        let Some(audio) = self.audio.as_ref().filter(|_| !self.paused && !self.ended) else {
            out.fill(0.0);
            return false;
        };

        let samples = audio.samples();
        let frames = audio.frames();
        let step = audio.sample_rate() as f64 / output_rate.max(1) as f64;
        let mut reached_end = false;

        for frame in out.chunks_exact_mut(2) {
            let i = self.position as usize;
            if i >= frames {
                frame[0] = 0.0;
                frame[1] = 0.0;
                reached_end = true;
                continue;
            }
            let frac = (self.position - i as f64) as f32;
            let j = (i + 1).min(frames - 1);
            frame[0] = samples[2 * i] + (samples[2 * j] - samples[2 * i]) * frac;
            frame[1] = samples[2 * i + 1] + (samples[2 * j + 1] - samples[2 * i + 1]) * frac;
            self.position += step;
        }

        if reached_end || self.position >= frames as f64 {
            self.position = frames as f64;
            self.ended = true;
            self.paused = true;
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn ramp(frames: usize, rate: u32) -> Arc<DecodedAudio> {
        let samples = (0..frames).flat_map(|i| [i as f32, -(i as f32)]).collect();
        Arc::new(DecodedAudio::new(rate, samples))
    }

    #[test]
    fn test_channel_normalization() {
        let mono = DecodedAudio::from_interleaved(8_000, 1, &[0.1, 0.2]);
        assert_eq!(mono.samples(), &[0.1, 0.1, 0.2, 0.2]);
        let surround = DecodedAudio::from_interleaved(8_000, 3, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(surround.samples(), &[1.0, 2.0, 4.0, 5.0]);
    }

    #[test]
    fn test_paused_element_outputs_silence() {
        let mut el = MediaElement::new();
        el.set_source("a", CorsMode::Anonymous, ramp(100, 100));
        let mut out = [1.0f32; 8];
        assert!(!el.read(&mut out, 100));
        assert!(out.iter().all(|&s| s == 0.0));
        assert_eq!(el.current_time(), 0.0);
    }

    #[test]
    fn test_rate_conversion_interpolates() {
        let mut el = MediaElement::new();
        el.set_source("a", CorsMode::Anonymous, ramp(100, 100));
        el.play();
        let mut out = [0.0f32; 8];
        el.read(&mut out, 200);
        assert_eq!(&out, &[0.0, 0.0, 0.5, -0.5, 1.0, -1.0, 1.5, -1.5]);
        assert_relative_eq!(el.current_time(), 0.02);
    }

    #[test]
    fn test_end_of_source_sets_ended() {
        let mut el = MediaElement::new();
        el.set_source("a", CorsMode::Anonymous, ramp(4, 100));
        el.play();
        let mut out = [0.0f32; 16];
        assert!(el.read(&mut out, 100));
        assert!(el.ended());
        assert!(el.paused());
        el.play();
        assert!(!el.ended());
        assert_eq!(el.current_time(), 0.0);
    }

    #[test]
    fn test_seek_clamps() {
        let mut el = MediaElement::new();
        el.set_source("a", CorsMode::Anonymous, ramp(100, 100));
        el.seek(0.5);
        assert_relative_eq!(el.current_time(), 0.5);
        el.seek(30.0);
        assert_relative_eq!(el.current_time(), 1.0);
    }
}
