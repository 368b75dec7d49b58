//! Producer thread: engine renderer into the frame ring

use super::{FrameRing, StreamConfig, BUFFER_BACKOFF_MICROS};
use crate::engine::Renderer;
use crate::{HarmonixError, Result};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info};

/// Producer health counters
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PlaybackStats {
    /// Times the producer waited for the device to make room
    pub full_waits: usize,
    /// Frames pushed into the ring
    pub frames_rendered: usize,
    /// Times the device found the ring empty
    pub underruns: usize,
    /// Fill level after the last push
    pub fill_ratio: f32,
}

/// Background thread keeping the ring topped up from a [`Renderer`].
pub struct RenderLoop {
    ring: Arc<FrameRing>,
    stats: Arc<Mutex<PlaybackStats>>,
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl RenderLoop {
    /// Start rendering one quantum at a time whenever the ring has room
    /// for it.
    pub fn start(
        mut renderer: Renderer,
        config: StreamConfig,
        quantum_frames: usize,
    ) -> Result<Self> {
        if config.channels != renderer.channels() {
            return Err(HarmonixError::ConfigError(format!(
                "stream expects {} channels, renderer produces {}",
                config.channels,
                renderer.channels()
            )));
        }
        let ring = Arc::new(FrameRing::new(config.ring_frames, config.channels)?);
        let stats = Arc::new(Mutex::new(PlaybackStats::default()));
        let running = Arc::new(AtomicBool::new(true));

        let quantum = quantum_frames.clamp(1, ring.capacity() - 1);
        let thread = {
            let ring = Arc::clone(&ring);
            let stats = Arc::clone(&stats);
            let running = Arc::clone(&running);
            std::thread::Builder::new()
                .name("harmonix-render".into())
                .spawn(move || {
                    let mut block = vec![0.0f32; quantum * ring.channels()];
                    while running.load(Ordering::Relaxed) {
                        if ring.free() < quantum {
                            stats.lock().full_waits += 1;
                            std::thread::sleep(Duration::from_micros(BUFFER_BACKOFF_MICROS));
                            continue;
                        }
                        renderer.render(&mut block);
                        let pushed = ring.push(&block);
                        let mut s = stats.lock();
                        s.frames_rendered += pushed;
                        s.fill_ratio = ring.fill_ratio();
                    }
                    debug!("render loop stopped");
                })?
        };
        info!(
            latency_ms = config.latency_ms(),
            quantum, "render loop started"
        );

        Ok(Self {
            ring,
            stats,
            running,
            thread: Some(thread),
        })
    }

    /// Ring for the audio device.
    pub fn ring(&self) -> Arc<FrameRing> {
        Arc::clone(&self.ring)
    }

    /// Snapshot of the counters.
    pub fn stats(&self) -> PlaybackStats {
        PlaybackStats {
            underruns: self.ring.underruns(),
            ..*self.stats.lock()
        }
    }

    /// Stop the producer thread and wait for it.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for RenderLoop {
    fn drop(&mut self) {
        self.stop();
        let stats = self.stats();
        debug!(
            frames = stats.frames_rendered,
            underruns = stats.underruns,
            "render loop dropped"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::engine::PlaybackEngine;
    use crate::error::MediaError;
    use crate::media::{CorsMode, DecodedAudio, MediaLoader};
    use async_trait::async_trait;

    struct NoMedia;

    #[async_trait]
    impl MediaLoader for NoMedia {
        async fn open(
            &self,
            url: &str,
            _cors: CorsMode,
        ) -> std::result::Result<DecodedAudio, MediaError> {
            Err(MediaError::Unsupported(url.to_string()))
        }
    }

    #[test]
    fn test_loop_fills_ring_and_stops() {
        let engine = PlaybackEngine::new(EngineConfig::low_latency(44100), Arc::new(NoMedia));
        let config = StreamConfig::low_latency(44100);
        let mut rl = RenderLoop::start(engine.renderer(), config, 128).unwrap();
        let ring = rl.ring();
        for _ in 0..200 {
            if ring.free() < 128 {
                break;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        assert!(ring.queued() > 0);
        rl.stop();
        assert!(rl.stats().frames_rendered >= ring.queued());
    }

    #[test]
    fn test_channel_mismatch_rejected() {
        let engine = PlaybackEngine::new(EngineConfig::low_latency(44100), Arc::new(NoMedia));
        let config = StreamConfig {
            channels: 1,
            ..StreamConfig::low_latency(44100)
        };
        assert!(matches!(
            RenderLoop::start(engine.renderer(), config, 128),
            Err(HarmonixError::ConfigError(_))
        ));
    }
}
