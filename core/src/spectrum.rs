use crate::config::ProtocolConfig;
use crate::detector::FrequencyWindow;
use std::f32::consts::PI;

/// Windows with less mean power than this are treated as silence
const MIN_MEAN_POWER: f32 = 1e-8;

/// Share of a window's energy the strongest carrier must hold to count as a tone
const MIN_TONE_SHARE: f32 = 0.2;

/// Dominant-tone estimator over fixed analysis windows.
///
/// Rather than a full spectrum, measures Goertzel power at each protocol
/// carrier and reports the strongest one.
pub struct ToneEstimator {
    sample_rate: f32,
    window_samples: usize,
    carriers: Vec<f32>,
}

impl ToneEstimator {
    pub fn new(config: &ProtocolConfig) -> Self {
        let sample_rate = config.sample_rate as f32;
        let window_samples = ((config.analysis_window_s * sample_rate).round() as usize).max(1);
        Self {
            sample_rate,
            window_samples,
            carriers: config.all_frequencies(),
        }
    }

    pub fn window_samples(&self) -> usize {
        self.window_samples
    }

    /// Strongest carrier in the window, if it dominates
    pub fn estimate(&self, samples: &[f32]) -> Option<f32> {
        if samples.is_empty() {
            return None;
        }

        let n = samples.len() as f32;
        let energy: f32 = samples.iter().map(|s| s * s).sum();
        if energy / n < MIN_MEAN_POWER {
            return None;
        }

        let (freq, power) = self
            .carriers
            .iter()
            .map(|&freq| {
                let bin = nearest_bin(samples.len(), freq, self.sample_rate);
                (freq, bin_power(samples, bin))
            })
            .fold((0.0f32, 0.0f32), |best, cur| if cur.1 > best.1 { cur } else { best });

        // A pure on-bin tone yields power = energy * n / 2
        let share = power / (energy * n / 2.0);
        if share >= MIN_TONE_SHARE {
            Some(freq)
        } else {
            None
        }
    }

    /// Slice samples into analysis windows; a trailing partial window is kept
    pub fn windows(&self, samples: &[f32]) -> Vec<FrequencyWindow> {
        samples
            .chunks(self.window_samples)
            .map(|chunk| FrequencyWindow {
                frequency_hz: self.estimate(chunk),
                duration_s: chunk.len() as f32 / self.sample_rate,
            })
            .collect()
    }
}

/// DFT bin of an `n`-point window closest to `freq_hz`
fn nearest_bin(n: usize, freq_hz: f32, sample_rate: f32) -> f32 {
    (n as f32 * freq_hz / sample_rate).round()
}

/// |X[bin]|^2 by the Goertzel recurrence
fn bin_power(samples: &[f32], bin: f32) -> f32 {
    let (sin, cos) = (2.0 * PI * bin / samples.len() as f32).sin_cos();
    let (mut s1, mut s2) = (0.0f32, 0.0f32);
    for &x in samples {
        let s0 = x + 2.0 * cos * s1 - s2;
        s2 = s1;
        s1 = s0;
    }
    let re = s1 - s2 * cos;
    let im = s2 * sin;
    re * re + im * im
}
