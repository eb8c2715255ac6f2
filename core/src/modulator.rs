use crate::config::{Modulation, ProtocolConfig};
use crate::error::{LinkError, Result};
use crate::framing::FrameDescriptor;

/// One tone of the transmission plan
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToneEvent {
    pub frequency_hz: f32,
    pub duration_s: f32,
}

/// Maps frame units to tones.
///
/// Output is a tone plan only; turning it into samples is the job of
/// [`Synthesizer`](crate::synth::Synthesizer) or an external audio stack.
pub struct Modulator {
    modulation: Modulation,
    marker_hz: f32,
    preamble_duration_s: f32,
    data_duration_s: f32,
    carriers: Vec<f32>,
}

impl Modulator {
    pub fn new(config: &ProtocolConfig) -> Self {
        Self {
            modulation: config.modulation,
            marker_hz: config.marker_hz,
            preamble_duration_s: config.preamble_duration_s,
            data_duration_s: config.data_duration_s,
            carriers: config.data_frequencies(),
        }
    }

    /// Carrier for a data unit (bit or symbol value)
    pub fn frequency_for(&self, unit: u8) -> Result<f32> {
        self.carriers
            .get(unit as usize)
            .copied()
            .ok_or_else(|| LinkError::InvalidInput(format!("unit {} has no carrier", unit)))
    }

    pub fn modulate(&self, frame: &FrameDescriptor) -> Result<Vec<ToneEvent>> {
        if frame.modulation != self.modulation {
            return Err(LinkError::InvalidInput(format!(
                "frame built for {:?}, modulator configured for {:?}",
                frame.modulation, self.modulation
            )));
        }

        let mut tones = Vec::with_capacity(
            frame.preamble_repeats + frame.length_units.len() + frame.data_units.len(),
        );

        for _ in 0..frame.preamble_repeats {
            tones.push(ToneEvent {
                frequency_hz: self.marker_hz,
                duration_s: self.preamble_duration_s,
            });
        }

        for &unit in frame.length_units.iter().chain(frame.data_units.iter()) {
            tones.push(ToneEvent {
                frequency_hz: self.frequency_for(unit)?,
                duration_s: self.data_duration_s,
            });
        }

        Ok(tones)
    }
}

/// Air time of a tone plan in seconds
pub fn total_duration(tones: &[ToneEvent]) -> f32 {
    tones.iter().map(|t| t.duration_s).sum()
}
