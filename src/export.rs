//! Offline render of the playback graph to WAV

use crate::engine::Renderer;
use crate::Result;
use std::path::Path;
use tracing::info;

/// Frames rendered per write.
const EXPORT_BLOCK_FRAMES: usize = 4096;

/// What an export produced.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExportSummary {
    /// Stereo frames written
    pub frames: u64,
    /// Output sample rate
    pub sample_rate: u32,
    /// Largest absolute sample before quantization
    pub peak: f32,
}

impl ExportSummary {
    /// Length of the written audio in seconds.
    pub fn duration_secs(&self) -> f64 {
        self.frames as f64 / self.sample_rate as f64
    }
}

/// Render `seconds` of engine output into a 16-bit stereo WAV file.
///
/// # Examples
///
/// ```no_run
/// # async fn demo(engine: harmonix::PlaybackEngine) -> harmonix::Result<()> {
/// use harmonix::export::render_to_wav;
///
/// engine.load_track("song.mp3").await?;
/// engine.play().await?;
/// let mut renderer = engine.renderer();
/// render_to_wav(&mut renderer, "out.wav", 30.0)?;
/// # Ok(())
/// # }
/// ```
pub fn render_to_wav<P: AsRef<Path>>(
    renderer: &mut Renderer,
    output_path: P,
    seconds: f64,
) -> Result<ExportSummary> {
    let sample_rate = renderer.sample_rate();
    let total_frames = (seconds.max(0.0) * sample_rate as f64).round() as u64;
    let spec = hound::WavSpec {
        channels: renderer.channels(),
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(output_path.as_ref(), spec)
        .map_err(|e| format!("Failed to create WAV file: {e}"))?;

    info!(
        path = %output_path.as_ref().display(),
        frames = total_frames,
        "rendering to WAV"
    );

    let mut block = vec![0.0f32; EXPORT_BLOCK_FRAMES * 2];
    let mut remaining = total_frames;
    let mut peak = 0.0f32;
    while remaining > 0 {
        let frames = remaining.min(EXPORT_BLOCK_FRAMES as u64) as usize;
        let chunk = &mut block[..frames * 2];
        renderer.render(chunk);
        for &sample in chunk.iter() {
            peak = peak.max(sample.abs());
            writer
                .write_sample(to_i16(sample))
                .map_err(|e| format!("Failed to write sample: {e}"))?;
        }
        remaining -= frames as u64;
    }

    writer
        .finalize()
        .map_err(|e| format!("Failed to finalize WAV file: {e}"))?;

    Ok(ExportSummary {
        frames: total_frames,
        sample_rate,
        peak,
    })
}

fn to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}
