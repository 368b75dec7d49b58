//! Frequency analyser tap
//!
//! Keeps a rolling mono window of the master output and turns it into a byte
//! spectrum on request. The tap never alters the audible signal.

use parking_lot::Mutex;
use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::sync::Arc;

/// FFT length.
pub const FFT_SIZE: usize = 256;
/// Number of frequency bins exposed (half the FFT length).
pub const FREQUENCY_BIN_COUNT: usize = FFT_SIZE / 2;
/// Default smoothing between successive spectra.
pub const SMOOTHING_TIME_CONSTANT: f32 = 0.8;
/// Level mapped to byte 0.
pub const MIN_DECIBELS: f32 = -100.0;
/// Level mapped to byte 255.
pub const MAX_DECIBELS: f32 = -30.0;

/// Shared analyser handle.
pub type AnalyserHandle = Arc<Mutex<Analyser>>;

/// Blackman window coefficients for `n` points.
fn blackman(n: usize) -> Vec<f32> {
    let alpha = 0.16f32;
    let a0 = 0.5 * (1.0 - alpha);
    let a1 = 0.5;
    let a2 = 0.5 * alpha;
    (0..n)
        .map(|i| {
            let x = i as f32 / n as f32;
            a0 - a1 * (2.0 * std::f32::consts::PI * x).cos()
                + a2 * (4.0 * std::f32::consts::PI * x).cos()
        })
        .collect()
}

/// Spectrum analyser.
pub struct Analyser {
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    history: Vec<f32>,
    write_pos: usize,
    smoothed: Vec<f32>,
    scratch: Vec<Complex<f32>>,
    smoothing: f32,
}

impl Analyser {
    /// Create an analyser with the default tuning.
    pub fn new() -> Self {
        let mut planner = FftPlanner::<f32>::new();
        Self {
            fft: planner.plan_fft_forward(FFT_SIZE),
            window: blackman(FFT_SIZE),
            history: vec![0.0; FFT_SIZE],
            write_pos: 0,
            smoothed: vec![0.0; FREQUENCY_BIN_COUNT],
            scratch: vec![Complex::new(0.0, 0.0); FFT_SIZE],
            smoothing: SMOOTHING_TIME_CONSTANT,
        }
    }

    /// Wrap in a shared handle.
    pub fn into_handle(self) -> AnalyserHandle {
        Arc::new(Mutex::new(self))
    }

    /// Number of bins `byte_frequency_data` fills.
    pub fn frequency_bin_count(&self) -> usize {
        FREQUENCY_BIN_COUNT
    }

    /// Push a block of interleaved stereo into the analysis window.
    pub fn feed(&mut self, interleaved: &[f32]) {
        for frame in interleaved.chunks_exact(2) {
            self.history[self.write_pos] = 0.5 * (frame[0] + frame[1]);
            self.write_pos = (self.write_pos + 1) % FFT_SIZE;
        }
    }

    /// Fill the most recent window with silence.
    pub fn clear(&mut self) {
        self.history.fill(0.0);
        self.smoothed.fill(0.0);
    }

    /// Update the smoothed magnitudes from the current window.
    fn analyse(&mut self) {
        for i in 0..FFT_SIZE {
            let sample = self.history[(self.write_pos + i) % FFT_SIZE];
            self.scratch[i] = Complex::new(sample * self.window[i], 0.0);
        }
        self.fft.process(&mut self.scratch);

        let scale = 1.0 / FFT_SIZE as f32;
        for (bin, smoothed) in self.smoothed.iter_mut().enumerate() {
            let magnitude = self.scratch[bin].norm() * scale;
            *smoothed = self.smoothing * *smoothed + (1.0 - self.smoothing) * magnitude;
        }
    }

    /// Byte-scaled magnitude spectrum, one value per bin.
    ///
    /// Writes at most `out.len()` bins.
    pub fn byte_frequency_data(&mut self, out: &mut [u8]) {
        self.analyse();
        let range = MAX_DECIBELS - MIN_DECIBELS;
        for (slot, &mag) in out.iter_mut().zip(&self.smoothed) {
            let db = if mag > 0.0 {
                20.0 * mag.log10()
            } else {
                f32::NEG_INFINITY
            };
            let scaled = 255.0 * (db - MIN_DECIBELS) / range;
            *slot = scaled.clamp(0.0, 255.0) as u8;
        }
    }
}

impl Default for Analyser {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Analyser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Analyser")
            .field("fft_size", &FFT_SIZE)
            .field("smoothing", &self.smoothing)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_silence_produces_zero_bins() {
        let mut a = Analyser::new();
        a.feed(&[0.0; 512]);
        let mut bins = [0u8; FREQUENCY_BIN_COUNT];
        a.byte_frequency_data(&mut bins);
        assert!(bins.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_tone_peaks_at_its_bin() {
        let mut a = Analyser::new();
        // Bin 8 of a 256-point FFT at 44.1 kHz
        let freq = 8.0 * 44_100.0 / FFT_SIZE as f32;
        let block: Vec<f32> = (0..FFT_SIZE)
            .flat_map(|i| {
                let s = (2.0 * std::f32::consts::PI * freq * i as f32 / 44_100.0).sin() * 0.02;
                [s, s]
            })
            .collect();
        let mut bins = [0u8; FREQUENCY_BIN_COUNT];
        for _ in 0..20 {
            a.feed(&block);
            a.byte_frequency_data(&mut bins);
        }
        let peak = bins
            .iter()
            .enumerate()
            .max_by_key(|&(_, v)| *v)
            .map(|(i, _)| i);
        assert_eq!(peak, Some(8));
        assert!(bins[8] > 150, "bin 8 was {}", bins[8]);
        assert!(bins[60] < bins[8] / 2);
    }
}
