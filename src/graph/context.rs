//! Audio context: clock, lifecycle and runtime state
//!
//! The context clock is the number of frames rendered divided by the sample
//! rate. It only advances while the context is running, which is what makes
//! scheduled automation line up with what is actually heard.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Whether the render side is allowed to advance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    /// Rendering and advancing the clock
    Running,
    /// Host policy paused rendering; output is silence and the clock holds
    Suspended,
}

/// Foreground/background state reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    /// Frame callbacks are delivered
    Visible,
    /// Frame callbacks are throttled or stopped
    Hidden,
}

#[derive(Debug)]
struct Shared {
    sample_rate: u32,
    frames: AtomicU64,
    running: AtomicBool,
    hidden: AtomicBool,
    resume_count: AtomicU64,
    // Serializes state transitions issued from the control side.
    transitions: Mutex<()>,
}

/// Shared audio context handle.
#[derive(Debug, Clone)]
pub struct AudioContext {
    shared: Arc<Shared>,
}

impl AudioContext {
    /// Create a running context at `sample_rate`.
    pub fn new(sample_rate: u32) -> Self {
        Self {
            shared: Arc::new(Shared {
                sample_rate,
                frames: AtomicU64::new(0),
                running: AtomicBool::new(true),
                hidden: AtomicBool::new(false),
                resume_count: AtomicU64::new(0),
                transitions: Mutex::new(()),
            }),
        }
    }

    /// Sample rate in Hz.
    pub fn sample_rate(&self) -> u32 {
        self.shared.sample_rate
    }

    /// Context time in seconds.
    pub fn current_time(&self) -> f64 {
        self.shared.frames.load(Ordering::Acquire) as f64 / self.shared.sample_rate as f64
    }

    /// Frames rendered so far.
    pub fn current_frame(&self) -> u64 {
        self.shared.frames.load(Ordering::Acquire)
    }

    /// Advance the clock by `frames`. Called by the renderer only.
    pub(crate) fn advance(&self, frames: u64) {
        self.shared.frames.fetch_add(frames, Ordering::AcqRel);
    }

    /// Current runtime state.
    pub fn state(&self) -> ContextState {
        if self.shared.running.load(Ordering::Acquire) {
            ContextState::Running
        } else {
            ContextState::Suspended
        }
    }

    /// Stop rendering (host policy, e.g. background tab).
    pub fn suspend(&self) {
        let _guard = self.shared.transitions.lock();
        self.shared.running.store(false, Ordering::Release);
    }

    /// Resume rendering. Returns `true` if the context was suspended.
    pub fn resume(&self) -> bool {
        let _guard = self.shared.transitions.lock();
        let was_suspended = !self.shared.running.swap(true, Ordering::AcqRel);
        if was_suspended {
            self.shared.resume_count.fetch_add(1, Ordering::Relaxed);
        }
        was_suspended
    }

    /// Number of suspended → running transitions.
    pub fn resume_count(&self) -> u64 {
        self.shared.resume_count.load(Ordering::Relaxed)
    }

    /// Host visibility.
    pub fn visibility(&self) -> Visibility {
        if self.shared.hidden.load(Ordering::Acquire) {
            Visibility::Hidden
        } else {
            Visibility::Visible
        }
    }

    /// Record host visibility; becoming visible resumes a suspended context.
    pub fn set_visibility(&self, visibility: Visibility) -> bool {
        self.shared
            .hidden
            .store(visibility == Visibility::Hidden, Ordering::Release);
        visibility == Visibility::Visible && self.state() == ContextState::Suspended && self.resume()
    }
}
