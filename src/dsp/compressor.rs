//! Soft-knee dynamics compressor
//!
//! Sits after the pre-amplifier and keeps boosted material from clipping.
//! Feed-forward design with a stereo-linked peak detector working in the log
//! domain.

/// Threshold in dBFS.
pub const THRESHOLD_DB: f32 = -12.0;
/// Knee width in dB.
pub const KNEE_DB: f32 = 30.0;
/// Compression ratio above the knee.
pub const RATIO: f32 = 12.0;
/// Attack time in seconds.
pub const ATTACK_SECONDS: f32 = 0.003;
/// Release time in seconds.
pub const RELEASE_SECONDS: f32 = 0.25;

/// Static parameters of a [`Compressor`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompressorSettings {
    /// Threshold in dBFS
    pub threshold_db: f32,
    /// Knee width in dB
    pub knee_db: f32,
    /// Ratio (input dB per output dB above threshold)
    pub ratio: f32,
    /// Attack time in seconds
    pub attack: f32,
    /// Release time in seconds
    pub release: f32,
}

impl Default for CompressorSettings {
    fn default() -> Self {
        Self {
            threshold_db: THRESHOLD_DB,
            knee_db: KNEE_DB,
            ratio: RATIO,
            attack: ATTACK_SECONDS,
            release: RELEASE_SECONDS,
        }
    }
}

impl CompressorSettings {
    /// Static gain curve: output level in dB for a given input level in dB.
    pub fn curve(&self, input_db: f32) -> f32 {
        let over = input_db - self.threshold_db;
        let half_knee = self.knee_db * 0.5;
        let slope = 1.0 / self.ratio - 1.0;
        if self.knee_db > 0.0 && over.abs() <= half_knee {
            input_db + slope * (over + half_knee).powi(2) / (2.0 * self.knee_db)
        } else if over > half_knee {
            self.threshold_db + over / self.ratio
        } else {
            input_db
        }
    }
}

fn smoothing_coefficient(seconds: f32, sample_rate: f32) -> f32 {
    if seconds <= 0.0 {
        0.0
    } else {
        (-1.0 / (seconds * sample_rate)).exp()
    }
}

/// Stereo compressor.
#[derive(Debug, Clone)]
pub struct Compressor {
    settings: CompressorSettings,
    attack_coeff: f32,
    release_coeff: f32,
    /// Smoothed gain reduction in dB (positive number)
    envelope_db: f32,
}

impl Compressor {
    /// Compressor with the default player tuning.
    pub fn new(sample_rate: u32) -> Self {
        Self::with_settings(sample_rate, CompressorSettings::default())
    }

    /// Compressor with explicit settings.
    pub fn with_settings(sample_rate: u32, settings: CompressorSettings) -> Self {
        let sr = sample_rate as f32;
        Self {
            settings,
            attack_coeff: smoothing_coefficient(settings.attack, sr),
            release_coeff: smoothing_coefficient(settings.release, sr),
            envelope_db: 0.0,
        }
    }

    /// Settings in use.
    pub fn settings(&self) -> &CompressorSettings {
        &self.settings
    }

    /// Current gain reduction in dB (zero or negative).
    pub fn reduction(&self) -> f32 {
        -self.envelope_db
    }

    /// Compress one block of interleaved stereo in place.
    pub fn process(&mut self, buffer: &mut [f32]) {
        for frame in buffer.chunks_exact_mut(2) {
            let peak = frame[0].abs().max(frame[1].abs());
            let level_db = if peak > 1.0e-6 {
                20.0 * peak.log10()
            } else {
                -120.0
            };
            let wanted = level_db - self.settings.curve(level_db);
            let coeff = if wanted > self.envelope_db {
                self.attack_coeff
            } else {
                self.release_coeff
            };
            self.envelope_db = coeff * self.envelope_db + (1.0 - coeff) * wanted;

            let gain = 10f32.powf(-self.envelope_db / 20.0);
            frame[0] *= gain;
            frame[1] *= gain;
        }
    }

    /// Forget the detector state.
    pub fn reset(&mut self) {
        self.envelope_db = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_curve_regions() {
        let s = CompressorSettings::default();
        // Well below the knee: unity
        assert_relative_eq!(s.curve(-60.0), -60.0);
        // Well above the knee: ratio applies
        assert_relative_eq!(s.curve(12.0), -12.0 + 24.0 / 12.0, epsilon = 1e-4);
        // Knee is continuous at its edges
        assert_relative_eq!(s.curve(-27.0), -27.0, epsilon = 1e-4);
        assert_relative_eq!(s.curve(3.0), -12.0 + 15.0 / 12.0, epsilon = 1e-4);
    }

    #[test]
    fn test_quiet_signal_untouched() {
        let mut c = Compressor::new(44_100);
        let mut buf = vec![0.01f32; 2048];
        c.process(&mut buf);
        assert!(c.reduction() > -0.01);
        assert_relative_eq!(buf[2047], 0.01, epsilon = 1e-4);
    }

    #[test]
    fn test_loud_signal_is_reduced() {
        let mut c = Compressor::new(44_100);
        let mut buf = vec![1.5f32; 44_100];
        c.process(&mut buf);
        assert!(c.reduction() < -10.0, "reduction was {}", c.reduction());
        assert!(buf[44_099] < 1.0, "output should stay below full scale");
    }

    #[test]
    fn test_release_recovers() {
        let mut c = Compressor::new(44_100);
        let mut loud = vec![1.0f32; 8_820];
        c.process(&mut loud);
        let mut quiet = vec![0.0f32; 88_200];
        c.process(&mut quiet);
        assert!(c.reduction() > -0.5);
    }
}
