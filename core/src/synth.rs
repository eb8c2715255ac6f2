use crate::config::ProtocolConfig;
use crate::modulator::ToneEvent;
use std::f32::consts::PI;

/// Peak amplitude of a rendered tone
const TONE_AMPLITUDE: f32 = 0.7;

/// Apply a smooth envelope to reduce spectral splatter near tone edges.
const EDGE_TAPER_RATIO: f32 = 0.08; // 8% of the tone on each side

/// Ensure we always have a minimum attack/decay regardless of tone length.
const MIN_TAPER_SAMPLES: usize = 16;

/// Renders a tone plan into mono PCM samples in [-1, 1]
pub struct Synthesizer {
    sample_rate: f32,
}

impl Synthesizer {
    pub fn new(config: &ProtocolConfig) -> Self {
        Self {
            sample_rate: config.sample_rate as f32,
        }
    }

    pub fn samples_for(&self, duration_s: f32) -> usize {
        (duration_s * self.sample_rate).round() as usize
    }

    /// One tapered sine tone
    pub fn tone(&self, tone: &ToneEvent) -> Vec<f32> {
        let len = self.samples_for(tone.duration_s);
        let angular_freq = 2.0 * PI * tone.frequency_hz / self.sample_rate;
        let window = raised_cosine_window(len, taper_length(len));

        (0..len)
            .map(|i| TONE_AMPLITUDE * window[i] * (angular_freq * i as f32).sin())
            .collect()
    }

    pub fn render(&self, tones: &[ToneEvent]) -> Vec<f32> {
        let mut samples = Vec::new();
        for tone in tones {
            samples.extend(self.tone(tone));
        }
        samples
    }

    pub fn silence(&self, duration_s: f32) -> Vec<f32> {
        vec![0.0; self.samples_for(duration_s)]
    }
}

fn taper_length(len: usize) -> usize {
    let taper = ((len as f32) * EDGE_TAPER_RATIO).round() as usize;
    taper.max(MIN_TAPER_SAMPLES).min(len / 2)
}

/// Generate a raised-cosine style window that softly ramps amplitude at both edges.
fn raised_cosine_window(len: usize, taper_len: usize) -> Vec<f32> {
    let taper = taper_len.min(len / 2);
    let mut window = vec![1.0; len];
    for i in 0..taper {
        // Smoothly increase from 0 to 1 using a sine-squared profile
        let progress = i as f32 / taper as f32;
        let value = (PI * progress / 2.0).sin().powi(2);
        window[i] = value;
        window[len - 1 - i] = value;
    }
    window
}
