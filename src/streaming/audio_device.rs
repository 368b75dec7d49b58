//! System audio output through rodio

use super::FrameRing;
use crate::{HarmonixError, Result};
use rodio::{OutputStream, Sink, Source};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Frames pulled from the ring per refill.
const REFILL_FRAMES: usize = 1024;

/// rodio source replaying whatever the render loop queued.
struct RingSource {
    ring: Arc<FrameRing>,
    sample_rate: u32,
    finished: Arc<AtomicBool>,
    block: Vec<f32>,
    cursor: usize,
    filled: usize,
}

impl RingSource {
    fn new(ring: Arc<FrameRing>, sample_rate: u32, finished: Arc<AtomicBool>) -> Self {
        let block = vec![0.0; REFILL_FRAMES * ring.channels()];
        Self {
            ring,
            sample_rate,
            finished,
            block,
            cursor: 0,
            filled: 0,
        }
    }

    fn refill(&mut self) {
        let channels = self.ring.channels();
        let frames = self.ring.pop(&mut self.block);
        self.filled = if frames == 0 {
            // Keep the device fed; one silent frame, then poll again.
            self.block[..channels].fill(0.0);
            channels
        } else {
            frames * channels
        };
        self.cursor = 0;
    }
}

impl Source for RingSource {
    fn current_frame_len(&self) -> Option<usize> {
        Some(self.filled.saturating_sub(self.cursor).max(1))
    }

    fn channels(&self) -> u16 {
        self.ring.channels() as u16
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn total_duration(&self) -> Option<Duration> {
        None
    }
}

impl Iterator for RingSource {
    type Item = f32;

    fn next(&mut self) -> Option<f32> {
        if self.finished.load(Ordering::Relaxed) {
            return None;
        }
        if self.cursor >= self.filled {
            self.refill();
        }
        let sample = self.block[self.cursor];
        self.cursor += 1;
        Some(sample)
    }
}

/// Default output device fed from a [`FrameRing`].
pub struct AudioDevice {
    _stream: OutputStream,
    sink: Sink,
    finished: Arc<AtomicBool>,
}

impl AudioDevice {
    /// Open the default output device and start draining `ring` at
    /// `sample_rate`.
    pub fn open(sample_rate: u32, ring: Arc<FrameRing>) -> Result<Self> {
        let (stream, handle) = OutputStream::try_default()
            .map_err(|e| HarmonixError::AudioDeviceError(format!("no output stream: {e}")))?;
        let sink = Sink::try_new(&handle)
            .map_err(|e| HarmonixError::AudioDeviceError(format!("no sink: {e}")))?;

        let finished = Arc::new(AtomicBool::new(false));
        sink.append(RingSource::new(ring, sample_rate, Arc::clone(&finished)));
        Ok(Self {
            _stream: stream,
            sink,
            finished,
        })
    }

    /// Hold the device; queued frames stay in the ring.
    pub fn pause(&self) {
        self.sink.pause();
    }

    /// Resume draining.
    pub fn resume(&self) {
        self.sink.play();
    }

    /// Whether the device is draining.
    pub fn is_running(&self) -> bool {
        !self.sink.is_paused() && !self.finished.load(Ordering::Relaxed)
    }

    /// End the source instead of playing silence forever.
    pub fn finish(&self) {
        self.finished.store(true, Ordering::Relaxed);
    }
}

impl Drop for AudioDevice {
    fn drop(&mut self) {
        self.finish();
        self.sink.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source() -> (RingSource, Arc<FrameRing>, Arc<AtomicBool>) {
        let ring = Arc::new(FrameRing::new(4096, 2).unwrap());
        let finished = Arc::new(AtomicBool::new(false));
        let src = RingSource::new(ring.clone(), 44100, finished.clone());
        (src, ring, finished)
    }

    #[test]
    fn test_source_reports_format() {
        let (src, _, _) = source();
        assert_eq!(src.sample_rate(), 44100);
        assert_eq!(src.channels(), 2);
        assert!(src.total_duration().is_none());
    }

    #[test]
    fn test_silent_frame_on_underrun() {
        let (mut src, ring, _) = source();
        assert_eq!(src.next(), Some(0.0));
        assert_eq!(src.next(), Some(0.0));
        assert_eq!(ring.underruns(), 1, "one refill covers a whole frame");
    }

    #[test]
    fn test_drains_ring_in_order() {
        let (mut src, ring, _) = source();
        ring.push(&[0.1, 0.2, 0.3, 0.4]);
        let got: Vec<f32> = (0..4).filter_map(|_| src.next()).collect();
        assert_eq!(got, vec![0.1, 0.2, 0.3, 0.4]);
    }

    #[test]
    fn test_finished_ends_stream() {
        let (mut src, _, finished) = source();
        assert!(src.next().is_some());
        finished.store(true, Ordering::Relaxed);
        assert_eq!(src.next(), None);
    }

    #[test]
    fn test_device_when_backend_available() {
        let ring = Arc::new(FrameRing::new(4096, 2).unwrap());
        match AudioDevice::open(44100, ring) {
            Ok(device) => {
                device.pause();
                assert!(!device.is_running());
                device.resume();
                device.finish();
                assert!(!device.is_running());
            }
            Err(err) => eprintln!("Skipping audio device test (backend unavailable): {err}"),
        }
    }
}
