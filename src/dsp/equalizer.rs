//! Six-band parametric equalizer
//!
//! A fixed bank of peaking biquads in series. Each band's gain is an
//! [`AudioParam`] so changes glide instead of stepping; coefficients are
//! recomputed at block rate when the smoothed gain has moved far enough to
//! matter.

use super::param::AudioParam;
use biquad::{Biquad, Coefficients, DirectForm2Transposed, ToHertz, Type};

/// Center frequencies of the six bands in Hz.
pub const EQ_FREQUENCIES: [f32; 6] = [60.0, 200.0, 500.0, 1000.0, 4000.0, 10000.0];

/// Number of equalizer bands.
pub const EQ_BAND_COUNT: usize = EQ_FREQUENCIES.len();

/// Lowest accepted band gain in dB.
pub const EQ_MIN_DB: f32 = -12.0;
/// Highest accepted band gain in dB.
pub const EQ_MAX_DB: f32 = 12.0;

/// Quality factor shared by every band.
pub const EQ_Q: f32 = 1.0;

/// Time constant of the gain glide in seconds.
pub const EQ_SMOOTHING_SECONDS: f64 = 0.02;

/// Coefficients are only rebuilt once the gain moved by more than this (dB).
const RECOMPUTE_THRESHOLD_DB: f32 = 0.01;

/// Named band-gain presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EqPreset {
    /// All bands at 0 dB
    Flat,
    /// Low shelf lift with a slight presence bump
    BassBoost,
    /// Rising high end
    TrebleBoost,
    /// Mid-range forward
    Vocal,
}

impl EqPreset {
    /// Every preset, in catalog order.
    pub const ALL: [EqPreset; 4] = [
        EqPreset::Flat,
        EqPreset::BassBoost,
        EqPreset::TrebleBoost,
        EqPreset::Vocal,
    ];

    /// Band gains in dB, lowest band first.
    pub fn gains(self) -> [f32; EQ_BAND_COUNT] {
        match self {
            EqPreset::Flat => [0.0; EQ_BAND_COUNT],
            EqPreset::BassBoost => [8.0, 6.0, 3.0, 0.0, 2.0, 4.0],
            EqPreset::TrebleBoost => [-2.0, 0.0, 2.0, 5.0, 8.0, 10.0],
            EqPreset::Vocal => [-2.0, -1.0, 4.0, 6.0, 3.0, 2.0],
        }
    }

    /// Catalog key of the preset.
    pub fn name(self) -> &'static str {
        match self {
            EqPreset::Flat => "flat",
            EqPreset::BassBoost => "bassBoost",
            EqPreset::TrebleBoost => "trebleBoost",
            EqPreset::Vocal => "vocal",
        }
    }

    /// Look up a preset by catalog key (case-insensitive, `-`/`_` ignored).
    pub fn from_name(name: &str) -> Option<Self> {
        let key: String = name
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .flat_map(char::to_lowercase)
            .collect();
        Self::ALL
            .into_iter()
            .find(|p| p.name().to_lowercase() == key)
    }
}

/// Clamp a requested band gain into the supported range.
///
/// Non-finite requests map to 0 dB.
pub fn clamp_gain(gain_db: f32) -> f32 {
    if gain_db.is_finite() {
        gain_db.clamp(EQ_MIN_DB, EQ_MAX_DB)
    } else {
        0.0
    }
}

fn peaking(sample_rate: f32, freq: f32, gain_db: f32) -> Option<Coefficients<f32>> {
    Coefficients::<f32>::from_params(Type::PeakingEQ(gain_db), sample_rate.hz(), freq.hz(), EQ_Q)
        .ok()
}

struct PeakingBand {
    freq: f32,
    gain: AudioParam,
    applied_db: f32,
    filters: Option<[DirectForm2Transposed<f32>; 2]>,
}

impl PeakingBand {
    fn new(sample_rate: f32, freq: f32) -> Self {
        // Above Nyquist the band is left out rather than producing an unstable filter.
        let filters = if freq < sample_rate * 0.5 {
            peaking(sample_rate, freq, 0.0).map(|c| {
                [
                    DirectForm2Transposed::<f32>::new(c),
                    DirectForm2Transposed::<f32>::new(c),
                ]
            })
        } else {
            None
        };
        Self {
            freq,
            gain: AudioParam::with_range(0.0, EQ_MIN_DB, EQ_MAX_DB),
            applied_db: 0.0,
            filters,
        }
    }

    fn refresh(&mut self, sample_rate: f32, target_db: f32) {
        if (target_db - self.applied_db).abs() <= RECOMPUTE_THRESHOLD_DB {
            return;
        }
        if let (Some(filters), Some(coeffs)) =
            (self.filters.as_mut(), peaking(sample_rate, self.freq, target_db))
        {
            for f in filters.iter_mut() {
                f.update_coefficients(coeffs);
            }
            self.applied_db = target_db;
        }
    }
}

/// Fixed six-band equalizer bank processing interleaved stereo.
pub struct Equalizer {
    sample_rate: f32,
    bands: Vec<PeakingBand>,
}

impl Equalizer {
    /// Build the bank at the given sample rate, all bands flat.
    pub fn new(sample_rate: u32) -> Self {
        let sr = sample_rate as f32;
        Self {
            sample_rate: sr,
            bands: EQ_FREQUENCIES
                .iter()
                .map(|&f| PeakingBand::new(sr, f))
                .collect(),
        }
    }

    /// Gain parameter of band `index`, if the index exists.
    pub fn gain_param(&self, index: usize) -> Option<&AudioParam> {
        self.bands.get(index).map(|b| &b.gain)
    }

    /// Gain the filter coefficients currently implement, per band.
    pub fn applied_gains(&self) -> [f32; EQ_BAND_COUNT] {
        let mut out = [0.0; EQ_BAND_COUNT];
        for (slot, band) in out.iter_mut().zip(&self.bands) {
            *slot = band.applied_db;
        }
        out
    }

    /// Glide band `index` toward `gain_db` starting at context time `now`.
    pub fn schedule_gain(&self, index: usize, gain_db: f32, now: f64) -> bool {
        match self.bands.get(index) {
            Some(band) => {
                band.gain
                    .set_target_at_time(clamp_gain(gain_db), now, EQ_SMOOTHING_SECONDS);
                true
            }
            None => false,
        }
    }

    /// Filter one block of interleaved stereo in place.
    ///
    /// `block_start` is the context time of the first frame; gains are
    /// sampled once per block.
    pub fn process(&mut self, block_start: f64, buffer: &mut [f32]) {
        for index in 0..self.bands.len() {
            self.process_band(index, block_start, buffer);
        }
    }

    /// Filter one block through a single band.
    pub fn process_band(&mut self, index: usize, block_start: f64, buffer: &mut [f32]) {
        let sr = self.sample_rate;
        let Some(band) = self.bands.get_mut(index) else {
            return;
        };
        let target = band.gain.value_at(block_start);
        band.refresh(sr, target);
        band.gain.prune(block_start);
        if band.applied_db == 0.0 {
            return;
        }
        if let Some([left, right]) = band.filters.as_mut() {
            for frame in buffer.chunks_exact_mut(2) {
                frame[0] = left.run(frame[0]);
                frame[1] = right.run(frame[1]);
            }
        }
    }

    /// Clear filter memory (used when the source changes).
    pub fn reset(&mut self) {
        for band in &mut self.bands {
            if let Some(filters) = band.filters.as_mut() {
                for f in filters.iter_mut() {
                    f.reset_state();
                }
            }
        }
    }
}

impl std::fmt::Debug for Equalizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Equalizer")
            .field("sample_rate", &self.sample_rate)
            .field("applied_gains", &self.applied_gains())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn run_blocks(eq: &mut Equalizer, seconds: f64) {
        let block = 128usize;
        let sr = eq.sample_rate as f64;
        let blocks = (seconds * sr / block as f64).ceil() as usize;
        let mut buf = vec![0.0f32; block * 2];
        for i in 0..blocks {
            let t = (i * block) as f64 / sr;
            eq.process(t, &mut buf);
        }
    }

    #[test]
    fn test_band_gain_converges_for_every_band() {
        for index in 0..EQ_BAND_COUNT {
            for &gain in &[-12.0f32, -6.5, 0.0, 3.0, 12.0] {
                let mut eq = Equalizer::new(44_100);
                assert!(eq.schedule_gain(index, gain, 0.0));
                run_blocks(&mut eq, 0.3);
                assert_relative_eq!(eq.applied_gains()[index], gain, epsilon = 0.02);
            }
        }
    }

    #[test]
    fn test_out_of_range_gain_is_clamped() {
        let mut eq = Equalizer::new(44_100);
        eq.schedule_gain(0, 30.0, 0.0);
        run_blocks(&mut eq, 0.3);
        assert_relative_eq!(eq.applied_gains()[0], EQ_MAX_DB, epsilon = 0.02);
        assert!(!eq.schedule_gain(6, 1.0, 0.0), "band 6 does not exist");
    }

    #[test]
    fn test_flat_bank_is_transparent() {
        let mut eq = Equalizer::new(44_100);
        let mut buf: Vec<f32> = (0..256).map(|i| ((i as f32) * 0.1).sin() * 0.5).collect();
        let original = buf.clone();
        eq.process(0.0, &mut buf);
        assert_eq!(buf, original);
    }

    #[test]
    fn test_boost_changes_signal() {
        let mut eq = Equalizer::new(44_100);
        eq.gain_param(0).unwrap().set_value(8.0);
        let mut buf: Vec<f32> = (0..8192)
            .flat_map(|i| {
                let s = (2.0 * std::f32::consts::PI * 60.0 * i as f32 / 44_100.0).sin() * 0.1;
                [s, s]
            })
            .collect();
        let input_peak = buf.iter().fold(0.0f32, |m, s| m.max(s.abs()));
        eq.process(0.0, &mut buf);
        let output_peak = buf[8192..].iter().fold(0.0f32, |m, s| m.max(s.abs()));
        assert!(output_peak > input_peak * 1.5, "60 Hz should be boosted");
    }

    #[test]
    fn test_preset_lookup() {
        assert_eq!(EqPreset::from_name("bassBoost"), Some(EqPreset::BassBoost));
        assert_eq!(EqPreset::from_name("bass-boost"), Some(EqPreset::BassBoost));
        assert_eq!(EqPreset::from_name("VOCAL"), Some(EqPreset::Vocal));
        assert_eq!(EqPreset::from_name("loudness"), None);
        assert_eq!(EqPreset::TrebleBoost.gains(), [-2.0, 0.0, 2.0, 5.0, 8.0, 10.0]);
    }
}
