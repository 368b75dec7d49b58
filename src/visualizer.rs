//! Visualizer sampler
//!
//! Read-only tap on the analyser. Each display frame the host asks the
//! sampler for the current byte spectrum; silent frames are skipped
//! entirely, and a busy analyser (render thread holding it) simply drops the
//! frame. Nothing here can stall or alter playback.

use crate::dsp::{AnalyserHandle, FREQUENCY_BIN_COUNT};
use std::fmt::Write;

/// Low bins summed to decide whether anything is audible.
pub const SILENCE_PROBE_BINS: usize = 10;
/// Bar width relative to an even split of the canvas.
pub const BAR_WIDTH_FACTOR: f32 = 2.5;
/// Bar height per byte of magnitude.
pub const BAR_HEIGHT_SCALE: f32 = 1.8;
/// Bars taller than this get a glow.
pub const GLOW_THRESHOLD: f32 = 50.0;
/// Glow blur radius in pixels.
pub const GLOW_BLUR: f32 = 15.0;
/// Horizontal gap between bars in pixels.
pub const BAR_GAP: f32 = 1.0;

const FUCHSIA: (u8, u8, u8) = (217, 70, 239);
const CYAN: (u8, u8, u8) = (34, 211, 238);

/// Bar color with alpha in 0..1.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgba {
    /// Red
    pub r: u8,
    /// Green
    pub g: u8,
    /// Blue
    pub b: u8,
    /// Opacity, 0..1
    pub a: f32,
}

impl Rgba {
    fn with_alpha((r, g, b): (u8, u8, u8), a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// CSS `rgba(...)` string.
    pub fn to_css(&self) -> String {
        format!("rgba({}, {}, {}, {})", self.r, self.g, self.b, self.a)
    }
}

/// One bar of a laid-out frame. `y` is the top edge (canvas coordinates).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bar {
    /// Left edge
    pub x: f32,
    /// Top edge
    pub y: f32,
    /// Bar width
    pub width: f32,
    /// Bar height
    pub height: f32,
    /// Fill color
    pub color: Rgba,
    /// Shadow blur radius, 0 for no glow
    pub glow: f32,
}

/// Per-frame reader over the shared analyser.
#[derive(Debug)]
pub struct VisualizerSampler {
    analyser: AnalyserHandle,
    bins: Vec<u8>,
}

impl VisualizerSampler {
    /// Sampler reading from `analyser`.
    pub fn new(analyser: AnalyserHandle) -> Self {
        Self {
            analyser,
            bins: vec![0; FREQUENCY_BIN_COUNT],
        }
    }

    /// Current byte spectrum, or `None` when the frame should not be drawn
    /// (silence, or the analyser is busy).
    pub fn sample(&mut self) -> Option<&[u8]> {
        {
            let mut analyser = self.analyser.try_lock()?;
            analyser.byte_frequency_data(&mut self.bins);
        }
        if is_silent(&self.bins) {
            return None;
        }
        Some(&self.bins)
    }

    /// Sample and lay out bars for a `width` x `height` canvas.
    pub fn frame(&mut self, width: f32, height: f32) -> Option<Vec<Bar>> {
        let bins = self.sample()?;
        Some(layout_bars(bins, width, height))
    }
}

/// Whether the first few bins carry no energy at all.
pub fn is_silent(bins: &[u8]) -> bool {
    bins.iter()
        .take(SILENCE_PROBE_BINS)
        .map(|&b| b as u32)
        .sum::<u32>()
        == 0
}

/// Bars for `bins` on a `width` x `height` canvas, anchored to the bottom
/// edge, alternating fuchsia (even bins) and cyan (odd bins).
pub fn layout_bars(bins: &[u8], width: f32, height: f32) -> Vec<Bar> {
    if bins.is_empty() {
        return Vec::new();
    }
    let bar_width = width / bins.len() as f32 * BAR_WIDTH_FACTOR;
    let mut x = 0.0;
    bins.iter()
        .enumerate()
        .map(|(i, &v)| {
            let bar_height = v as f32 * BAR_HEIGHT_SCALE;
            let tone = if i % 2 == 0 { FUCHSIA } else { CYAN };
            let bar = Bar {
                x,
                y: height - bar_height,
                width: bar_width,
                height: bar_height,
                color: Rgba::with_alpha(tone, v as f32 / 255.0),
                glow: if bar_height > GLOW_THRESHOLD { GLOW_BLUR } else { 0.0 },
            };
            x += bar_width + BAR_GAP;
            bar
        })
        .collect()
}

const LEVELS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

/// One-line terminal spectrum: `bins` averaged down to `columns` cells.
pub fn spectrum_line(bins: &[u8], columns: usize) -> String {
    let mut line = String::with_capacity(columns * 3);
    if bins.is_empty() || columns == 0 {
        return line;
    }
    let per_column = bins.len().div_ceil(columns).max(1);
    for chunk in bins.chunks(per_column) {
        let avg = chunk.iter().map(|&b| b as u32).sum::<u32>() / chunk.len() as u32;
        if avg == 0 {
            line.push(' ');
        } else {
            let level = (avg as usize * LEVELS.len() / 256).min(LEVELS.len() - 1);
            write!(line, "{}", LEVELS[level]).ok();
        }
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::Analyser;
    use approx::assert_relative_eq;

    #[test]
    fn test_silence_skips_frame() {
        let mut sampler = VisualizerSampler::new(Analyser::new().into_handle());
        assert!(sampler.sample().is_none());
        assert!(sampler.frame(800.0, 600.0).is_none());
    }

    #[test]
    fn test_busy_analyser_drops_frame() {
        let handle = Analyser::new().into_handle();
        let mut sampler = VisualizerSampler::new(handle.clone());
        let _guard = handle.lock();
        assert!(sampler.sample().is_none());
    }

    #[test]
    fn test_probe_only_looks_at_low_bins() {
        let mut bins = vec![0u8; 128];
        bins[20] = 200;
        assert!(is_silent(&bins));
        bins[9] = 1;
        assert!(!is_silent(&bins));
    }

    #[test]
    fn test_bar_layout() {
        let bins = [255u8, 10, 0, 100];
        let bars = layout_bars(&bins, 400.0, 600.0);
        assert_eq!(bars.len(), 4);

        let w = 400.0 / 4.0 * 2.5;
        assert_relative_eq!(bars[0].width, w);
        assert_relative_eq!(bars[1].x, w + 1.0);
        assert_relative_eq!(bars[3].x, 3.0 * (w + 1.0));

        assert_relative_eq!(bars[0].height, 255.0 * 1.8);
        assert_relative_eq!(bars[0].y, 600.0 - 255.0 * 1.8);
        assert_eq!(bars[0].glow, GLOW_BLUR);
        assert_eq!(bars[1].glow, 0.0);

        assert_eq!((bars[0].color.r, bars[0].color.g, bars[0].color.b), FUCHSIA);
        assert_eq!((bars[1].color.r, bars[1].color.g, bars[1].color.b), CYAN);
        assert_relative_eq!(bars[0].color.a, 1.0);
        assert_eq!(bars[2].color.a, 0.0);
    }

    #[test]
    fn test_css_color() {
        let c = Rgba::with_alpha(CYAN, 0.5);
        assert_eq!(c.to_css(), "rgba(34, 211, 238, 0.5)");
    }

    #[test]
    fn test_spectrum_line_width() {
        let bins: Vec<u8> = (0..128).map(|i| (i * 2) as u8).collect();
        let line = spectrum_line(&bins, 32);
        assert_eq!(line.chars().count(), 32);
        assert!(line.ends_with('█'));
        assert_eq!(spectrum_line(&[0; 16], 4), "    ");
    }
}
