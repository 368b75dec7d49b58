//! Render side of the engine
//!
//! A [`Renderer`] is handed to whatever pulls audio: the streaming producer
//! thread or the offline WAV exporter. Each quantum it pulls from the media
//! element, runs the signal graph and advances the context clock. Locks are
//! taken one at a time (media, then graph), never nested.

use super::events::EngineEvent;
use super::session::TransportState;
use super::Inner;
use crate::graph::ContextState;
use std::sync::Arc;

/// Pull-based audio source for the engine's output.
pub struct Renderer {
    inner: Arc<Inner>,
    last_reported: Option<f64>,
    drive_motion: bool,
}

impl Renderer {
    pub(super) fn new(inner: Arc<Inner>) -> Self {
        Self {
            inner,
            last_reported: None,
            drive_motion: false,
        }
    }

    /// Push spatial positions from the render clock every quantum, for hosts
    /// without display frames (CLI playback, offline export).
    pub fn with_motion(mut self) -> Self {
        self.drive_motion = true;
        self
    }

    /// Output sample rate.
    pub fn sample_rate(&self) -> u32 {
        self.inner.config.sample_rate
    }

    /// Output channel count (always interleaved stereo).
    pub fn channels(&self) -> u16 {
        2
    }

    /// Fill `out` (interleaved stereo) with the next frames of output.
    ///
    /// Before the context exists, and while it is suspended, the output is
    /// silence and the clock holds.
    pub fn render(&mut self, out: &mut [f32]) {
        let Some(core) = self.inner.core.get() else {
            out.fill(0.0);
            return;
        };
        let quantum = self.inner.config.render_quantum.max(1) * 2;
        let sample_rate = self.inner.config.sample_rate;
        let update_interval = self.inner.config.time_update_ms as f64 / 1000.0;

        for block in out.chunks_mut(quantum) {
            if core.context.state() == ContextState::Suspended {
                block.fill(0.0);
                continue;
            }
            if self.drive_motion {
                core.motion.tick();
            }
            let block_start = core.context.current_time();

            let (ended, playing, position, duration) = {
                let mut media = core.media.lock();
                let ended = media.read(block, sample_rate);
                (
                    ended,
                    media.is_playing(),
                    media.current_time(),
                    media.duration(),
                )
            };

            core.graph.lock().process(block_start, block);
            core.context.advance((block.len() / 2) as u64);

            if ended {
                core.motion.set_playing(false);
                self.last_reported = None;
                {
                    let mut session = self.inner.session.lock();
                    if matches!(session.state, TransportState::Playing | TransportState::Paused) {
                        session.state = TransportState::Ended;
                    }
                }
                self.inner.events.emit(EngineEvent::TimeUpdate { position, duration });
                self.inner.events.emit(EngineEvent::Ended);
            } else if playing {
                let due = match self.last_reported {
                    None => true,
                    Some(last) => position < last || position - last >= update_interval,
                };
                if due {
                    self.last_reported = Some(position);
                    self.inner
                        .events
                        .emit(EngineEvent::TimeUpdate { position, duration });
                }
            }
        }
    }
}

impl std::fmt::Debug for Renderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Renderer")
            .field("sample_rate", &self.inner.config.sample_rate)
            .field("last_reported", &self.last_reported)
            .field("drive_motion", &self.drive_motion)
            .finish()
    }
}
