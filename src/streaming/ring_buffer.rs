//! Frame ring between the render thread and the device callback
//!
//! One producer, one consumer. The ring stores whole interleaved frames, so a
//! reader can never observe half a stereo pair. Storage sits behind a
//! `parking_lot::Mutex`; the frame counters are atomics so the fill level can
//! be polled without taking the lock.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Largest ring accepted, in samples (512 MB of `f32`).
const MAX_SAMPLES: usize = 512 * 1024 * 1024 / std::mem::size_of::<f32>();

/// Ring construction failure.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum RingBufferError {
    /// Zero frames requested
    #[error("ring capacity must be at least one frame")]
    ZeroCapacity,
    /// Zero channels requested
    #[error("ring needs at least one channel")]
    NoChannels,
    /// The rounded capacity does not fit the size limit
    #[error("ring of {frames} frames x {channels} channels exceeds the size limit")]
    TooLarge {
        /// Frames after rounding
        frames: usize,
        /// Channels per frame
        channels: usize,
    },
}

/// Fixed-capacity ring of interleaved frames.
#[derive(Debug)]
pub struct FrameRing {
    samples: Mutex<Vec<f32>>,
    channels: usize,
    capacity: usize,
    mask: usize,
    written: AtomicUsize,
    read: AtomicUsize,
    underruns: AtomicUsize,
}

impl FrameRing {
    /// Ring holding `frames` frames (rounded up to a power of two) of
    /// `channels` samples each.
    pub fn new(frames: usize, channels: u16) -> Result<Self, RingBufferError> {
        if frames == 0 {
            return Err(RingBufferError::ZeroCapacity);
        }
        let channels = channels as usize;
        if channels == 0 {
            return Err(RingBufferError::NoChannels);
        }
        let capacity = frames.next_power_of_two();
        if capacity.saturating_mul(channels) > MAX_SAMPLES {
            return Err(RingBufferError::TooLarge {
                frames: capacity,
                channels,
            });
        }

        Ok(Self {
            samples: Mutex::new(vec![0.0; capacity * channels]),
            channels,
            capacity,
            mask: capacity - 1,
            written: AtomicUsize::new(0),
            read: AtomicUsize::new(0),
            underruns: AtomicUsize::new(0),
        })
    }

    /// Capacity in frames.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Samples per frame.
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Frames waiting for the consumer.
    pub fn queued(&self) -> usize {
        let written = self.written.load(Ordering::Acquire);
        let read = self.read.load(Ordering::Acquire);
        written.wrapping_sub(read)
    }

    /// Frames the producer can still push. One slot always stays free.
    pub fn free(&self) -> usize {
        self.capacity - self.queued() - 1
    }

    /// Push whole frames from `interleaved`; a trailing partial frame is
    /// ignored. Returns the number of frames stored.
    pub fn push(&self, interleaved: &[f32]) -> usize {
        let count = (interleaved.len() / self.channels).min(self.free());
        if count == 0 {
            return 0;
        }
        let start = self.written.load(Ordering::Acquire);
        {
            let mut samples = self.samples.lock();
            for (slot, offset, frames) in self.segments(start, count) {
                let dst = slot * self.channels;
                let src = offset * self.channels;
                let len = frames * self.channels;
                samples[dst..dst + len].copy_from_slice(&interleaved[src..src + len]);
            }
        }
        self.written
            .store(start.wrapping_add(count), Ordering::Release);
        count
    }

    /// Pop whole frames into `out`. Returns the number of frames copied.
    ///
    /// Finding the ring empty counts as an underrun.
    pub fn pop(&self, out: &mut [f32]) -> usize {
        let count = (out.len() / self.channels).min(self.queued());
        if count == 0 {
            if out.len() >= self.channels {
                self.underruns.fetch_add(1, Ordering::Relaxed);
            }
            return 0;
        }
        let start = self.read.load(Ordering::Acquire);
        {
            let samples = self.samples.lock();
            for (slot, offset, frames) in self.segments(start, count) {
                let src = slot * self.channels;
                let dst = offset * self.channels;
                let len = frames * self.channels;
                out[dst..dst + len].copy_from_slice(&samples[src..src + len]);
            }
        }
        self.read.store(start.wrapping_add(count), Ordering::Release);
        count
    }

    /// Contiguous `(slot, offset, frames)` runs covering `count` frames from
    /// the running position `start`. `offset` is the frame offset on the
    /// caller's side. Two runs when the range wraps.
    fn segments(
        &self,
        start: usize,
        count: usize,
    ) -> impl Iterator<Item = (usize, usize, usize)> {
        let first = start & self.mask;
        let head = count.min(self.capacity - first);
        let tail = count - head;
        std::iter::once((first, 0, head)).chain((tail > 0).then_some((0, head, tail)))
    }

    /// Drop everything queued.
    pub fn clear(&self) {
        let _guard = self.samples.lock();
        let written = self.written.load(Ordering::Acquire);
        self.read.store(written, Ordering::Release);
    }

    /// Whether nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.queued() == 0
    }

    /// Times the consumer found the ring empty.
    pub fn underruns(&self) -> usize {
        self.underruns.load(Ordering::Relaxed)
    }

    /// Fill level, 0.0 to 1.0
    pub fn fill_ratio(&self) -> f32 {
        self.queued() as f32 / self.capacity as f32
    }
}
