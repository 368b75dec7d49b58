//! Engine events and callback dispatch
//!
//! The render side pushes [`EngineEvent`]s into an unbounded channel (never
//! blocking); a dispatcher task on the tokio runtime drains it and invokes the
//! registered callbacks.

use crate::error::PlaybackError;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Events delivered to the UI layer.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// Playhead progressed
    TimeUpdate {
        /// Position in seconds
        position: f64,
        /// Duration of the current source in seconds
        duration: f64,
    },
    /// The current source played to its end
    Ended,
    /// A genuine playback error
    Error(PlaybackError),
}

type TimeCallback = Arc<dyn Fn(f64, f64) + Send + Sync>;
type EndedCallback = Arc<dyn Fn() + Send + Sync>;
type ErrorCallback = Arc<dyn Fn(&PlaybackError) + Send + Sync>;

/// Registered listeners. Cloning shares the listeners.
#[derive(Default, Clone)]
pub struct Callbacks {
    time_update: Vec<TimeCallback>,
    ended: Vec<EndedCallback>,
    error: Vec<ErrorCallback>,
}

impl Callbacks {
    pub(crate) fn add_time_update(&mut self, f: TimeCallback) {
        self.time_update.push(f);
    }

    pub(crate) fn add_ended(&mut self, f: EndedCallback) {
        self.ended.push(f);
    }

    pub(crate) fn add_error(&mut self, f: ErrorCallback) {
        self.error.push(f);
    }

    /// Invoke every listener interested in `event`.
    pub fn dispatch(&self, event: &EngineEvent) {
        match event {
            EngineEvent::TimeUpdate { position, duration } => {
                for f in &self.time_update {
                    f(*position, *duration);
                }
            }
            EngineEvent::Ended => {
                for f in &self.ended {
                    f();
                }
            }
            EngineEvent::Error(e) => {
                for f in &self.error {
                    f(e);
                }
            }
        }
    }
}

impl std::fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Callbacks")
            .field("time_update", &self.time_update.len())
            .field("ended", &self.ended.len())
            .field("error", &self.error.len())
            .finish()
    }
}

/// Sending half plus the receiver waiting for a dispatcher.
#[derive(Debug)]
pub(crate) struct EventBus {
    tx: mpsc::UnboundedSender<EngineEvent>,
    pending_rx: Mutex<Option<mpsc::UnboundedReceiver<EngineEvent>>>,
    callbacks: Arc<Mutex<Callbacks>>,
}

impl EventBus {
    pub(crate) fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            pending_rx: Mutex::new(Some(rx)),
            callbacks: Arc::new(Mutex::new(Callbacks::default())),
        }
    }

    pub(crate) fn emit(&self, event: EngineEvent) {
        // Receiver gone means nobody is listening any more.
        let _ = self.tx.send(event);
    }

    pub(crate) fn callbacks(&self) -> &Arc<Mutex<Callbacks>> {
        &self.callbacks
    }

    /// Take the receiver for manual polling; no dispatcher will run afterwards.
    pub(crate) fn take_receiver(&self) -> Option<mpsc::UnboundedReceiver<EngineEvent>> {
        self.pending_rx.lock().take()
    }

    /// Start the dispatcher on the current runtime, once. `on_event` runs
    /// before the callbacks for engine-internal bookkeeping.
    pub(crate) fn spawn_dispatcher<F>(&self, on_event: F) -> bool
    where
        F: Fn(&EngineEvent) + Send + 'static,
    {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return false;
        };
        let Some(mut rx) = self.pending_rx.lock().take() else {
            return false;
        };
        let callbacks = self.callbacks.clone();
        handle.spawn(async move {
            while let Some(event) = rx.recv().await {
                on_event(&event);
                // Listeners may register more listeners; never call them under the lock.
                let listeners = callbacks.lock().clone();
                listeners.dispatch(&event);
            }
        });
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_dispatch_routes_by_kind() {
        let hits = Arc::new(AtomicUsize::new(0));
        let mut cbs = Callbacks::default();
        let h = hits.clone();
        cbs.add_ended(Arc::new(move || {
            h.fetch_add(1, Ordering::SeqCst);
        }));
        let h = hits.clone();
        cbs.add_time_update(Arc::new(move |pos, _| {
            assert_eq!(pos, 1.5);
            h.fetch_add(10, Ordering::SeqCst);
        }));
        cbs.dispatch(&EngineEvent::Ended);
        cbs.dispatch(&EngineEvent::TimeUpdate {
            position: 1.5,
            duration: 3.0,
        });
        cbs.dispatch(&EngineEvent::Error(PlaybackError::NoSource));
        assert_eq!(hits.load(Ordering::SeqCst), 11);
    }

    #[tokio::test]
    async fn test_dispatcher_delivers_events() {
        let bus = EventBus::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        bus.callbacks().lock().add_ended(Arc::new(move || {
            let _ = tx.send(());
        }));
        assert!(bus.spawn_dispatcher(|_| {}));
        assert!(!bus.spawn_dispatcher(|_| {}), "only one dispatcher");
        bus.emit(EngineEvent::Ended);
        assert_eq!(rx.recv().await, Some(()));
    }

    #[tokio::test]
    async fn test_listener_registering_listener_does_not_block() {
        let bus = EventBus::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let callbacks = bus.callbacks().clone();
        bus.callbacks().lock().add_ended(Arc::new(move || {
            let tx = tx.clone();
            callbacks.lock().add_ended(Arc::new(move || {
                let _ = tx.send(());
            }));
        }));
        assert!(bus.spawn_dispatcher(|_| {}));
        bus.emit(EngineEvent::Ended);
        bus.emit(EngineEvent::Ended);
        assert_eq!(rx.recv().await, Some(()));
        assert_eq!(bus.callbacks().lock().ended.len(), 3);
    }
}
