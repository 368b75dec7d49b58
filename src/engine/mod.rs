//! Playback engine
//!
//! [`PlaybackEngine`] owns the audio context, the signal graph and the single
//! media element, and exposes the transport surface the UI drives: load,
//! play, pause, seek, spatial mode, equalizer and volume.
//!
//! Every command is safe to call at any time and in any order:
//!
//! - a load supersedes every earlier load (epoch tokens, checked after each
//!   suspension point)
//! - `play` waits for a pending load and is silently dropped when that load is
//!   overtaken
//! - a pause whose fade is still running does nothing once a newer transport
//!   command (play, load) arrives
//!
//! Audio is pulled through a [`Renderer`] obtained from [`PlaybackEngine::renderer`].

mod events;
mod render;
mod session;

pub use events::{Callbacks, EngineEvent};
pub use render::Renderer;
pub use session::{
    Artwork, MediaAction, MediaMetadata, MediaSessionHandlers, PlaybackSession, TransportState,
    ARTWORK_SIZES,
};

use crate::config::{EngineConfig, DEMO_TRACK_URL};
use crate::dsp::equalizer::{clamp_gain, EQ_SMOOTHING_SECONDS};
use crate::dsp::{AnalyserHandle, EqPreset, Vec3, EQ_BAND_COUNT};
use crate::error::{MediaError, PlaybackError};
use crate::graph::{AudioContext, ContextState, GraphParams, SignalGraph, Visibility};
use crate::media::{CorsMode, MediaElement, MediaLoader};
use crate::spatial::{MotionDriver, SpatialMode};
use crate::track::TrackDescriptor;
use crate::transition::{
    Epoch, TransitionController, LOAD_FADE_OUT, PAUSE_FADE_OUT, PLAY_FADE_IN, SEEK_MUTE,
    SEEK_RESTORE,
};
use events::EventBus;
use parking_lot::Mutex;
use std::sync::{Arc, OnceLock};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

/// Whether the audio context exists yet, and its state if it does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// No command has needed audio yet
    Uninitialized,
    /// Context running
    Running,
    /// Context suspended (autoplay policy, host backgrounding)
    Suspended,
}

/// Result of a completed `load_track`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The source is loaded and ready to play
    Loaded,
    /// A newer load overtook this one; nothing was applied
    Superseded,
}

/// Load readiness published to waiting `play` calls.
#[derive(Debug, Clone, PartialEq)]
enum Readiness {
    Empty,
    Loading(u64),
    Ready(u64),
    Failed(u64, MediaError),
}

/// Settings recorded before the context exists and applied at init.
#[derive(Debug, Clone, Copy)]
struct Settings {
    mode: SpatialMode,
    eq: [f32; EQ_BAND_COUNT],
    volume: f32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            mode: SpatialMode::Off,
            eq: [0.0; EQ_BAND_COUNT],
            volume: 1.0 / crate::graph::PRE_AMP_MAX,
        }
    }
}

/// Everything that only exists once audio has been initialized.
struct Core {
    context: AudioContext,
    graph: Mutex<SignalGraph>,
    params: GraphParams,
    analyser: AnalyserHandle,
    media: Mutex<MediaElement>,
    transitions: TransitionController,
    motion: MotionDriver,
    background: Mutex<Option<JoinHandle<()>>>,
}

impl Core {
    fn new(config: &EngineConfig, settings: Settings) -> Self {
        let context = AudioContext::new(config.sample_rate);
        let mut graph = SignalGraph::new(config.sample_rate);
        let params = graph.params();

        for (param, gain) in params.eq.iter().zip(settings.eq) {
            param.set_value(clamp_gain(gain));
        }
        graph.set_spatial_mode(settings.mode);
        graph.set_volume(settings.volume, 0.0);
        graph.rebuild(0.0);

        let motion = MotionDriver::new(context.clone(), params.position.clone());
        motion.set_mode(settings.mode);
        let background = motion.spawn_background(config.background_interval());

        Self {
            analyser: graph.analyser(),
            transitions: TransitionController::new(params.master.clone()),
            graph: Mutex::new(graph),
            media: Mutex::new(MediaElement::new()),
            context,
            params,
            motion,
            background: Mutex::new(background),
        }
    }
}

impl Drop for Core {
    fn drop(&mut self) {
        if let Some(handle) = self.background.lock().take() {
            handle.abort();
        }
    }
}

pub(crate) struct Inner {
    config: EngineConfig,
    loader: Arc<dyn MediaLoader>,
    core: OnceLock<Core>,
    settings: Mutex<Settings>,
    session: Mutex<PlaybackSession>,
    load_epoch: Epoch,
    transport_epoch: Epoch,
    seek_epoch: Epoch,
    readiness: watch::Sender<Readiness>,
    events: EventBus,
    media_session: Mutex<MediaSessionHandlers>,
    metadata: Mutex<Option<MediaMetadata>>,
}

/// The signal graph manager and transport.
#[derive(Clone)]
pub struct PlaybackEngine {
    inner: Arc<Inner>,
}

impl PlaybackEngine {
    /// Engine with the given configuration and media loader.
    ///
    /// Nothing audio-related is created until the first command needs it.
    pub fn new(config: EngineConfig, loader: Arc<dyn MediaLoader>) -> Self {
        let (readiness, _) = watch::channel(Readiness::Empty);
        Self {
            inner: Arc::new(Inner {
                config,
                loader,
                core: OnceLock::new(),
                settings: Mutex::new(Settings::default()),
                session: Mutex::new(PlaybackSession::default()),
                load_epoch: Epoch::new(),
                transport_epoch: Epoch::new(),
                seek_epoch: Epoch::new(),
                readiness,
                events: EventBus::new(),
                media_session: Mutex::new(MediaSessionHandlers::default()),
                metadata: Mutex::new(None),
            }),
        }
    }

    /// Engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    fn core(&self) -> &Core {
        self.inner.core.get_or_init(|| {
            let settings = *self.inner.settings.lock();
            let core = Core::new(&self.inner.config, settings);
            if self
                .inner
                .events
                .spawn_dispatcher(|event| trace!(?event, "dispatching engine event"))
            {
                debug!("event dispatcher started");
            }
            info!(
                sample_rate = self.inner.config.sample_rate,
                quantum_ms = self.inner.config.quantum_ms(),
                mode = %settings.mode,
                "audio initialized"
            );
            core
        })
    }

    /// Create the context and graph if they do not exist yet. Idempotent.
    pub fn ensure_initialized(&self) {
        self.core();
    }

    /// Initialization and context state.
    pub fn lifecycle(&self) -> Lifecycle {
        match self.inner.core.get() {
            None => Lifecycle::Uninitialized,
            Some(core) => match core.context.state() {
                ContextState::Running => Lifecycle::Running,
                ContextState::Suspended => Lifecycle::Suspended,
            },
        }
    }

    /// The audio context, once initialized.
    pub fn context(&self) -> Option<AudioContext> {
        self.inner.core.get().map(|c| c.context.clone())
    }

    /// Parameter handles of the graph, once initialized.
    pub fn graph_params(&self) -> Option<GraphParams> {
        self.inner.core.get().map(|c| c.params.clone())
    }

    /// Analyser handle for visualization, once initialized.
    pub fn analyser(&self) -> Option<AnalyserHandle> {
        self.inner.core.get().map(|c| c.analyser.clone())
    }

    /// Whether the current source feeds the analyser.
    pub fn analyser_enabled(&self) -> bool {
        self.inner
            .core
            .get()
            .is_some_and(|c| c.graph.lock().analyser_enabled())
    }

    /// A render handle pulling audio out of the graph.
    pub fn renderer(&self) -> Renderer {
        Renderer::new(self.inner.clone())
    }

    // ----- transport -----

    /// Load `url` into the media element, replacing whatever was there.
    ///
    /// A playing source is faded out first. When a newer load arrives before
    /// this one completes, nothing is applied and `Superseded` is returned.
    pub async fn load_track(&self, url: &str) -> Result<LoadOutcome, PlaybackError> {
        self.load_inner(url, None).await
    }

    async fn load_inner(
        &self,
        url: &str,
        track: Option<TrackDescriptor>,
    ) -> Result<LoadOutcome, PlaybackError> {
        let core = self.core();
        let token = self.inner.load_epoch.begin();
        self.inner.transport_epoch.begin();
        self.inner
            .readiness
            .send_replace(Readiness::Loading(token.value()));
        {
            let mut session = self.inner.session.lock();
            session.state = TransportState::Loading;
            session.load_epoch = token.value();
            session.src = Some(url.to_string());
            session.track = track;
        }
        debug!(url, epoch = token.value(), "load requested");

        // Requests issued back to back supersede each other before any fetch.
        tokio::task::yield_now().await;
        if !token.is_current() {
            return Ok(LoadOutcome::Superseded);
        }

        let audible = core.media.lock().is_playing();
        if audible {
            core.transitions
                .fade_out(core.context.current_time(), LOAD_FADE_OUT);
            tokio::time::sleep(LOAD_FADE_OUT).await;
            if !token.is_current() {
                debug!(url, "load superseded during fade-out");
                return Ok(LoadOutcome::Superseded);
            }
        }

        if core.context.resume() {
            debug!("audio context resumed for load");
        }
        core.transitions.hold_silent(core.context.current_time());
        core.media.lock().pause();
        core.motion.set_playing(false);

        let mut cors = CorsMode::Anonymous;
        let mut result = self.inner.loader.open(url, cors).await;
        if let Err(MediaError::CrossOriginDenied(reason)) = &result {
            if !token.is_current() {
                return Ok(LoadOutcome::Superseded);
            }
            warn!(url, reason = %reason, "cross-origin access denied; retrying without analysis");
            cors = CorsMode::None;
            result = self.inner.loader.open(url, cors).await;
        }

        if !token.is_current() {
            debug!(url, "load superseded while fetching");
            return Ok(LoadOutcome::Superseded);
        }

        match result {
            Ok(audio) => {
                let degraded = cors == CorsMode::None;
                {
                    let mut graph = core.graph.lock();
                    graph.set_analyser_enabled(!degraded);
                    graph.reset_state();
                }
                core.media.lock().set_source(url, cors, Arc::new(audio));
                {
                    let mut session = self.inner.session.lock();
                    session.state = TransportState::Paused;
                    session.degraded = degraded;
                }
                self.inner
                    .readiness
                    .send_replace(Readiness::Ready(token.value()));
                info!(url, degraded, "track loaded");
                Ok(LoadOutcome::Loaded)
            }
            Err(e) => {
                core.media.lock().clear();
                {
                    let mut session = self.inner.session.lock();
                    session.state = TransportState::Idle;
                    session.degraded = false;
                }
                self.inner
                    .readiness
                    .send_replace(Readiness::Failed(token.value(), e.clone()));
                warn!(url, error = %e, "track failed to load");
                let error = PlaybackError::Media(e);
                self.inner.events.emit(EngineEvent::Error(error.clone()));
                Err(error)
            }
        }
    }

    /// Wait until the most recent load settles. A load overtaken while
    /// waiting yields `Aborted`.
    async fn wait_ready(&self) -> Result<(), PlaybackError> {
        let mut rx = self.inner.readiness.subscribe();
        let mut waiting_on: Option<u64> = None;
        loop {
            let readiness = rx.borrow_and_update().clone();
            let current = waiting_on;
            let overtaken = move |epoch: u64| current.is_some_and(|w| w != epoch);
            match readiness {
                Readiness::Empty => return Err(PlaybackError::NoSource),
                Readiness::Ready(epoch) if overtaken(epoch) => return Err(PlaybackError::Aborted),
                Readiness::Ready(_) => return Ok(()),
                Readiness::Failed(epoch, _) if overtaken(epoch) => {
                    return Err(PlaybackError::Aborted)
                }
                Readiness::Failed(_, e) => return Err(PlaybackError::Media(e)),
                Readiness::Loading(epoch) => {
                    if overtaken(epoch) {
                        return Err(PlaybackError::Aborted);
                    }
                    waiting_on = Some(epoch);
                    if rx.changed().await.is_err() {
                        return Err(PlaybackError::Aborted);
                    }
                }
            }
        }
    }

    /// Start (or resume) playback with an 800 ms exponential entrance.
    ///
    /// Resumes a suspended context first. Waits for an in-flight load; if
    /// that load is overtaken the call returns `Ok` without playing.
    pub async fn play(&self) -> Result<(), PlaybackError> {
        let core = self.core();
        let transport = self.inner.transport_epoch.begin();
        if core.context.resume() {
            info!("audio context resumed");
        }

        match self.wait_ready().await {
            Ok(()) => {}
            Err(PlaybackError::Aborted) => {
                debug!("play overtaken by a newer load");
                return Ok(());
            }
            Err(e) => return Err(e),
        }
        if !transport.is_current() {
            debug!("play overtaken by a newer transport command");
            return Ok(());
        }

        let audible = {
            let mut media = core.media.lock();
            let audible = media.is_playing();
            media.play();
            audible
        };
        core.motion.set_playing(true);
        let now = core.context.current_time();
        if audible {
            // Already sounding (or mid pause fade): climb from where it is.
            core.transitions.rise(now, PLAY_FADE_IN);
        } else {
            core.transitions.fade_in(now, PLAY_FADE_IN);
        }
        self.inner.session.lock().state = TransportState::Playing;
        debug!("playing");
        Ok(())
    }

    /// Fade out over 200 ms, then pause the element and reset the master gain
    /// to unity. A newer transport command issued during the fade wins.
    pub async fn pause(&self) {
        let Some(core) = self.inner.core.get() else {
            return;
        };
        let transport = self.inner.transport_epoch.begin();
        {
            let mut session = self.inner.session.lock();
            if session.state == TransportState::Playing {
                session.state = TransportState::Paused;
            }
        }
        core.transitions
            .fade_out(core.context.current_time(), PAUSE_FADE_OUT);
        tokio::time::sleep(PAUSE_FADE_OUT).await;

        if !transport.is_current() {
            debug!("pause overtaken before the fade finished");
            return;
        }
        core.media.lock().pause();
        core.motion.set_playing(false);
        core.transitions.reset_unity(core.context.current_time());
        debug!("paused");
    }

    /// Move the playhead. Non-finite or negative positions are ignored.
    ///
    /// While audible, the output is muted for a moment around the jump.
    pub async fn seek(&self, seconds: f64) {
        if !seconds.is_finite() || seconds < 0.0 {
            debug!(seconds, "ignoring invalid seek");
            return;
        }
        let Some(core) = self.inner.core.get() else {
            return;
        };
        let (has_audio, media_playing) = {
            let media = core.media.lock();
            (media.has_audio(), media.is_playing())
        };
        if !has_audio {
            return;
        }
        let token = self.inner.seek_epoch.begin();
        let audible = media_playing && self.state() == TransportState::Playing;

        if audible {
            core.transitions
                .fade_out(core.context.current_time(), SEEK_MUTE);
            tokio::time::sleep(SEEK_MUTE).await;
            if !token.is_current() {
                return;
            }
        }

        core.media.lock().seek(seconds);
        if audible && self.state() == TransportState::Playing {
            core.transitions
                .restore(core.context.current_time(), SEEK_RESTORE);
        }
    }

    /// Resolve `track` to a URL, publish its metadata and load it. Applies
    /// `default_mode` when it is not off, then plays.
    pub async fn play_track(
        &self,
        track: &TrackDescriptor,
        default_mode: SpatialMode,
    ) -> Result<LoadOutcome, PlaybackError> {
        self.update_media_session(track);
        let url = track.playable_url(DEMO_TRACK_URL).to_string();
        let outcome = self.load_inner(&url, Some(track.clone())).await?;
        if outcome == LoadOutcome::Superseded {
            return Ok(outcome);
        }
        if default_mode.is_enabled() {
            self.set_spatial_mode(default_mode);
        }
        self.play().await?;
        Ok(outcome)
    }

    // ----- graph controls -----

    /// Switch spatial mode and rebuild the graph. No-op when unchanged.
    pub fn set_spatial_mode(&self, mode: SpatialMode) {
        {
            let mut settings = self.inner.settings.lock();
            if settings.mode == mode {
                return;
            }
            settings.mode = mode;
        }
        let Some(core) = self.inner.core.get() else {
            return;
        };
        core.motion.set_mode(mode);
        let now = core.context.current_time();
        let mut graph = core.graph.lock();
        graph.set_spatial_mode(mode);
        graph.rebuild(now);
        info!(%mode, "spatial mode changed");
    }

    /// Current spatial mode.
    pub fn spatial_mode(&self) -> SpatialMode {
        self.inner.settings.lock().mode
    }

    /// Current spatial source position, once initialized.
    pub fn spatial_position(&self) -> Option<Vec3> {
        let core = self.inner.core.get()?;
        Some(core.params.position.at(core.context.current_time()))
    }

    /// Set one equalizer band in dB (clamped to ±12). Returns `false` for an
    /// out-of-range band index.
    pub fn set_eq_band(&self, index: usize, gain_db: f32) -> bool {
        if index >= EQ_BAND_COUNT {
            debug!(index, "ignoring out-of-range eq band");
            return false;
        }
        let gain_db = clamp_gain(gain_db);
        self.inner.settings.lock().eq[index] = gain_db;
        if let Some(core) = self.inner.core.get() {
            let now = core.context.current_time();
            core.params.eq[index].set_target_at_time(gain_db, now, EQ_SMOOTHING_SECONDS);
        }
        true
    }

    /// Set every band at once. Extra values are ignored.
    pub fn set_eq_gains(&self, gains: &[f32]) {
        for (index, gain) in gains.iter().take(EQ_BAND_COUNT).enumerate() {
            self.set_eq_band(index, *gain);
        }
    }

    /// Apply a named preset to all bands.
    pub fn apply_preset(&self, preset: EqPreset) {
        debug!(preset = preset.name(), "applying eq preset");
        self.set_eq_gains(&preset.gains());
    }

    /// Requested band gains in dB.
    pub fn eq_gains(&self) -> [f32; EQ_BAND_COUNT] {
        self.inner.settings.lock().eq
    }

    /// Gains the filters are actually using right now.
    pub fn applied_eq_gains(&self) -> [f32; EQ_BAND_COUNT] {
        match self.inner.core.get() {
            Some(core) => core.graph.lock().applied_eq_gains(),
            None => self.eq_gains(),
        }
    }

    /// Set the user volume (0..1).
    pub fn set_volume(&self, volume: f32) {
        let volume = if volume.is_finite() {
            volume.clamp(0.0, 1.0)
        } else {
            return;
        };
        self.inner.settings.lock().volume = volume;
        if let Some(core) = self.inner.core.get() {
            let now = core.context.current_time();
            core.graph.lock().set_volume(volume, now);
        }
    }

    /// Current user volume.
    pub fn volume(&self) -> f32 {
        self.inner.settings.lock().volume
    }

    // ----- host integration -----

    /// Suspend the context (host backgrounding, autoplay policy).
    pub fn suspend(&self) {
        if let Some(core) = self.inner.core.get() {
            core.context.suspend();
            debug!("audio context suspended");
        }
    }

    /// Report host visibility. Becoming visible resumes a suspended context.
    pub fn set_visibility(&self, visibility: Visibility) {
        if let Some(core) = self.inner.core.get() {
            if core.context.set_visibility(visibility) {
                info!("audio context resumed on visibility change");
            }
        }
    }

    /// Foreground animation-frame hook: push the next spatial position.
    pub fn animation_frame(&self) -> bool {
        self.inner.core.get().is_some_and(|c| c.motion.tick())
    }

    // ----- queries -----

    /// Playhead position in seconds.
    pub fn current_time(&self) -> f64 {
        self.inner
            .core
            .get()
            .map_or(0.0, |c| c.media.lock().current_time())
    }

    /// Duration of the loaded source in seconds.
    pub fn duration(&self) -> f64 {
        self.inner
            .core
            .get()
            .map_or(0.0, |c| c.media.lock().duration())
    }

    /// Transport state.
    pub fn state(&self) -> TransportState {
        self.inner.session.lock().state
    }

    /// Snapshot of the now-playing slot.
    pub fn session(&self) -> PlaybackSession {
        self.inner.session.lock().clone()
    }

    /// Track started through `play_track`, if any.
    pub fn now_playing(&self) -> Option<TrackDescriptor> {
        self.inner.session.lock().track.clone()
    }

    // ----- events -----

    /// Listen for playhead progress `(position, duration)`.
    pub fn on_time_update<F>(&self, f: F)
    where
        F: Fn(f64, f64) + Send + Sync + 'static,
    {
        self.inner.events.callbacks().lock().add_time_update(Arc::new(f));
    }

    /// Listen for the end of the current source.
    pub fn on_ended<F>(&self, f: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.inner.events.callbacks().lock().add_ended(Arc::new(f));
    }

    /// Listen for playback errors.
    pub fn on_error<F>(&self, f: F)
    where
        F: Fn(&PlaybackError) + Send + Sync + 'static,
    {
        self.inner.events.callbacks().lock().add_error(Arc::new(f));
    }

    /// Take the raw event stream instead of callback dispatch.
    ///
    /// Only available before initialization; afterwards the dispatcher owns
    /// the stream and this returns `None`.
    pub fn take_events(&self) -> Option<mpsc::UnboundedReceiver<EngineEvent>> {
        self.inner.events.take_receiver()
    }

    // ----- media session -----

    /// Install the UI hooks for OS media controls.
    pub fn set_media_session_handlers(&self, handlers: MediaSessionHandlers) {
        *self.inner.media_session.lock() = handlers;
    }

    /// Publish `track` to OS media controls.
    pub fn update_media_session(&self, track: &TrackDescriptor) -> MediaMetadata {
        let metadata = MediaMetadata::for_track(track);
        *self.inner.metadata.lock() = Some(metadata.clone());
        metadata
    }

    /// Metadata currently published to OS media controls.
    pub fn media_metadata(&self) -> Option<MediaMetadata> {
        self.inner.metadata.lock().clone()
    }

    /// Handle an action coming from OS media controls.
    pub async fn handle_media_action(&self, action: MediaAction) {
        debug!(?action, "media session action");
        match action {
            MediaAction::Play => {
                if let Err(e) = self.play().await {
                    warn!(error = %e, "media session play failed");
                }
            }
            MediaAction::Pause => self.pause().await,
            MediaAction::SeekTo(seconds) => self.seek(seconds).await,
            MediaAction::NextTrack | MediaAction::PreviousTrack => {}
        }
        self.inner.media_session.lock().fire(action);
    }
}

impl std::fmt::Debug for PlaybackEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackEngine")
            .field("config", &self.inner.config)
            .field("lifecycle", &self.lifecycle())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
