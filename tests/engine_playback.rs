//! Engine driven end to end through the renderer, with an in-memory loader.

use approx::assert_relative_eq;
use async_trait::async_trait;
use harmonix::{
    CorsMode, DecodedAudio, EngineConfig, EngineEvent, EqPreset, LoadOutcome, MediaError,
    MediaLoader, PlaybackEngine, SpatialMode, TrackDescriptor, TransportState,
};
use std::sync::Arc;

const SAMPLE_RATE: u32 = 44_100;

/// Half a second of a quiet tone for any URL.
struct ToneLoader;

#[async_trait]
impl MediaLoader for ToneLoader {
    async fn open(&self, _url: &str, _cors: CorsMode) -> Result<DecodedAudio, MediaError> {
        let mono: Vec<f32> = (0..SAMPLE_RATE / 2)
            .map(|i| (i as f32 * 0.0627).sin() * 0.25)
            .collect();
        Ok(DecodedAudio::from_interleaved(SAMPLE_RATE, 1, &mono))
    }
}

fn engine() -> PlaybackEngine {
    PlaybackEngine::new(EngineConfig::offline(SAMPLE_RATE), Arc::new(ToneLoader))
}

fn track(url: &str) -> TrackDescriptor {
    TrackDescriptor {
        id: "t1".into(),
        title: "Tone".into(),
        artist: "Oscillator".into(),
        album: "Tests".into(),
        cover_url: "https://img.test/cover.jpg".into(),
        duration: 1,
        stream_url: url.into(),
        preview_url: None,
        quality: None,
    }
}

/// Render `seconds` of output in 1024-frame blocks; returns the last block.
fn render_for(renderer: &mut harmonix::Renderer, seconds: f64) -> Vec<f32> {
    let mut block = vec![0.0f32; 2048];
    let blocks = (seconds * SAMPLE_RATE as f64 / 1024.0).ceil() as usize;
    for _ in 0..blocks {
        renderer.render(&mut block);
    }
    block
}

#[tokio::test(start_paused = true)]
async fn play_track_runs_to_the_end() {
    let engine = engine();
    let mut events = engine.take_events().expect("receiver before init");

    let outcome = engine.play_track(&track("mem://tone"), SpatialMode::Off).await;
    assert_eq!(outcome, Ok(LoadOutcome::Loaded));
    assert_eq!(engine.state(), TransportState::Playing);
    assert_eq!(engine.now_playing().map(|t| t.title), Some("Tone".to_string()));
    assert_eq!(engine.media_metadata().map(|m| m.artist), Some("Oscillator".to_string()));

    let mut renderer = engine.renderer();
    render_for(&mut renderer, 1.0);

    let mut positions = Vec::new();
    let mut ended = false;
    while let Ok(event) = events.try_recv() {
        match event {
            EngineEvent::TimeUpdate { position, duration } => {
                assert_relative_eq!(duration, 0.5, epsilon = 1e-6);
                positions.push(position);
            }
            EngineEvent::Ended => ended = true,
            EngineEvent::Error(e) => panic!("unexpected error: {e}"),
        }
    }
    assert!(ended);
    assert!(!positions.is_empty());
    assert!(positions.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(engine.state(), TransportState::Ended);
}

#[tokio::test(start_paused = true)]
async fn spatial_motion_follows_the_orbit() {
    let engine = engine();
    engine
        .play_track(&track("mem://tone"), SpatialMode::EightD)
        .await
        .unwrap();
    assert_eq!(engine.spatial_mode(), SpatialMode::EightD);

    let mut renderer = engine.renderer().with_motion();
    render_for(&mut renderer, 0.25);

    let p = engine.spatial_position().unwrap();
    let radius = (p.x * p.x + p.y * p.y + p.z * p.z).sqrt();
    assert_relative_eq!(radius, 3.0, epsilon = 1e-3);
}

#[tokio::test(start_paused = true)]
async fn zero_volume_silences_output() {
    let engine = engine();
    engine.load_track("mem://tone").await.unwrap();
    engine.play().await.unwrap();
    engine.set_volume(0.0);

    let mut renderer = engine.renderer();
    render_for(&mut renderer, 0.1);
    let block = render_for(&mut renderer, 0.05);
    assert!(block.iter().all(|&s| s == 0.0));
}

#[tokio::test(start_paused = true)]
async fn preset_converges_in_the_filters() {
    let engine = engine();
    engine.ensure_initialized();
    engine.apply_preset(EqPreset::BassBoost);

    let mut renderer = engine.renderer();
    render_for(&mut renderer, 0.3);

    let applied = engine.applied_eq_gains();
    for (band, gain) in EqPreset::BassBoost.gains().iter().enumerate() {
        assert_relative_eq!(applied[band], *gain, epsilon = 0.05);
    }
}

#[tokio::test(start_paused = true)]
async fn settings_before_init_carry_over() {
    let engine = engine();
    engine.apply_preset(EqPreset::Vocal);
    engine.set_spatial_mode(SpatialMode::ThirtyTwoD);
    engine.set_volume(0.5);
    engine.ensure_initialized();

    assert_eq!(engine.spatial_mode(), SpatialMode::ThirtyTwoD);
    assert_relative_eq!(engine.volume(), 0.5);
    let params = engine.graph_params().unwrap();
    for (param, gain) in params.eq.iter().zip(EqPreset::Vocal.gains()) {
        assert_relative_eq!(param.value_at(0.0), gain);
    }
}
