use crate::crc::CrcEngine;
use crate::error::{LinkError, Result};
use crate::*;

/// How data units are carried on the air
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Modulation {
    /// One bit per tone: `bit0_hz` or `bit1_hz`
    #[default]
    Binary,
    /// One 4-bit symbol per tone, 16 carriers starting at `symbol_base_hz`
    Grouped,
}

impl Modulation {
    pub fn bits_per_unit(self) -> usize {
        match self {
            Modulation::Binary => 1,
            Modulation::Grouped => BITS_PER_SYMBOL,
        }
    }
}

/// Protocol parameters shared by sender and receiver.
///
/// Every component takes this by reference at construction, so both ends of a
/// link agree on carriers, timing and the generator as long as they are built
/// from the same value.
#[derive(Debug, Clone, PartialEq)]
pub struct ProtocolConfig {
    pub sample_rate: u32,
    pub marker_hz: f32,
    pub bit0_hz: f32,
    pub bit1_hz: f32,
    pub symbol_base_hz: f32,
    pub symbol_spacing_hz: f32,
    pub preamble_duration_s: f32,
    pub preamble_repeats: usize,
    pub data_duration_s: f32,
    pub generator: u32,
    pub crc_width: u32,
    pub max_errors: usize,
    pub max_frame_bits: usize,
    pub modulation: Modulation,
    /// Widest distance between an observed frequency and the carrier it is
    /// attributed to
    pub frequency_tolerance_hz: f32,
    /// Relative slack on tone durations seen by the detector
    pub timing_tolerance: f32,
    pub sync_timeout_s: f32,
    pub analysis_window_s: f32,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            sample_rate: SAMPLE_RATE,
            marker_hz: MARKER_FREQUENCY_HZ,
            bit0_hz: BIT0_FREQUENCY_HZ,
            bit1_hz: BIT1_FREQUENCY_HZ,
            symbol_base_hz: SYMBOL_BASE_FREQUENCY_HZ,
            symbol_spacing_hz: SYMBOL_SPACING_HZ,
            preamble_duration_s: PREAMBLE_TONE_DURATION_S,
            preamble_repeats: PREAMBLE_REPEATS,
            data_duration_s: DATA_TONE_DURATION_S,
            generator: CRC_GENERATOR,
            crc_width: CRC_WIDTH,
            max_errors: MAX_CORRECTABLE_ERRORS,
            max_frame_bits: MAX_FRAME_BITS,
            modulation: Modulation::Binary,
            frequency_tolerance_hz: 100.0,
            timing_tolerance: 0.25,
            sync_timeout_s: SYNC_TIMEOUT_S,
            analysis_window_s: ANALYSIS_WINDOW_S,
        }
    }
}

impl ProtocolConfig {
    /// Default parameters with 4-bit symbol grouping
    pub fn grouped() -> Self {
        Self {
            modulation: Modulation::Grouped,
            ..Self::default()
        }
    }

    /// Frequency of symbol `value` (0..=15)
    pub fn symbol_frequency(&self, value: u8) -> f32 {
        self.symbol_base_hz + value as f32 * self.symbol_spacing_hz
    }

    /// Carrier of every data unit for the active modulation, indexed by unit value
    pub fn data_frequencies(&self) -> Vec<f32> {
        match self.modulation {
            Modulation::Binary => vec![self.bit0_hz, self.bit1_hz],
            Modulation::Grouped => (0..SYMBOL_COUNT as u8)
                .map(|v| self.symbol_frequency(v))
                .collect(),
        }
    }

    /// Every carrier the protocol can put on the air, regardless of modulation
    pub fn all_frequencies(&self) -> Vec<f32> {
        let mut freqs = vec![self.marker_hz, self.bit0_hz, self.bit1_hz];
        freqs.extend((0..SYMBOL_COUNT as u8).map(|v| self.symbol_frequency(v)));
        freqs
    }

    /// Total marker time the receiver expects before the length field
    pub fn preamble_total_s(&self) -> f32 {
        self.preamble_duration_s * self.preamble_repeats as f32
    }

    /// Largest message payload that still fits a correctable block
    pub fn max_payload_bits(&self) -> usize {
        self.max_frame_bits.saturating_sub(self.crc_width as usize)
    }

    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("preamble_duration_s", self.preamble_duration_s),
            ("data_duration_s", self.data_duration_s),
            ("frequency_tolerance_hz", self.frequency_tolerance_hz),
            ("sync_timeout_s", self.sync_timeout_s),
            ("analysis_window_s", self.analysis_window_s),
            ("symbol_spacing_hz", self.symbol_spacing_hz),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(invalid(format!("{} must be positive, got {}", name, value)));
            }
        }

        if self.preamble_repeats == 0 {
            return Err(invalid("preamble_repeats must be at least 1".to_string()));
        }
        if !(self.timing_tolerance > 0.0 && self.timing_tolerance < 0.5) {
            return Err(invalid(format!(
                "timing_tolerance must lie in (0, 0.5), got {}",
                self.timing_tolerance
            )));
        }
        if self.sample_rate == 0 {
            return Err(invalid("sample_rate must be positive".to_string()));
        }

        // Carriers must be distinct and representable at the sample rate
        let nyquist = self.sample_rate as f32 / 2.0;
        let mut carriers = vec![self.marker_hz];
        carriers.extend(self.data_frequencies());
        for &freq in &carriers {
            if !(freq.is_finite() && freq > 0.0 && freq < nyquist) {
                return Err(invalid(format!(
                    "carrier {} Hz outside (0, {}) Hz",
                    freq, nyquist
                )));
            }
        }
        for (i, a) in carriers.iter().enumerate() {
            if carriers[i + 1..].iter().any(|b| a == b) {
                return Err(invalid(format!("carrier {} Hz assigned twice", a)));
            }
        }

        if self.crc_width == 0 || self.crc_width > 31 {
            return Err(invalid(format!("crc_width {} out of range 1..=31", self.crc_width)));
        }
        if self.generator == 0 || self.generator >> self.crc_width != 0 {
            return Err(invalid(format!(
                "generator {:#x} does not fit width {}",
                self.generator, self.crc_width
            )));
        }

        let max_length = (1usize << LENGTH_FIELD_BITS) - 1;
        if self.max_frame_bits <= self.crc_width as usize || self.max_frame_bits > max_length {
            return Err(invalid(format!(
                "max_frame_bits {} must lie in ({}, {}]",
                self.max_frame_bits, self.crc_width, max_length
            )));
        }

        let span = CrcEngine::new(self).guaranteed_span(self.max_errors, self.max_frame_bits);
        if span < self.max_frame_bits {
            return Err(invalid(format!(
                "generator {:#x} only guarantees {}-bit correction up to {} bits, max_frame_bits is {}",
                self.generator, self.max_errors, span, self.max_frame_bits
            )));
        }

        Ok(())
    }
}

fn invalid(message: String) -> LinkError {
    LinkError::InvalidConfig(message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = ProtocolConfig::default();
        config.validate().unwrap();
        assert_eq!(config.max_payload_bits(), MAX_PAYLOAD_BITS);
        ProtocolConfig::grouped().validate().unwrap();
    }

    #[test]
    fn test_symbol_frequencies_are_a_bijection() {
        let config = ProtocolConfig::grouped();
        let freqs = config.data_frequencies();
        assert_eq!(freqs.len(), SYMBOL_COUNT);
        for (i, a) in freqs.iter().enumerate() {
            for b in &freqs[i + 1..] {
                assert_ne!(a, b);
            }
            assert_ne!(*a, config.marker_hz);
        }
        assert_eq!(freqs[0], 4300.0);
        assert_eq!(freqs[15], 7300.0);
    }

    #[test]
    fn test_preamble_total() {
        let config = ProtocolConfig::default();
        assert!((config.preamble_total_s() - 0.12).abs() < 1e-6);
    }

    #[test]
    fn test_rejects_frame_longer_than_correction_span() {
        let config = ProtocolConfig {
            max_frame_bits: 37,
            ..ProtocolConfig::default()
        };
        match config.validate() {
            Err(LinkError::InvalidConfig(msg)) => assert!(msg.contains("31")),
            other => panic!("Expected InvalidConfig, got {:?}", other),
        }
    }

    #[test]
    fn test_rejects_carrier_above_nyquist() {
        let config = ProtocolConfig {
            sample_rate: 16000,
            ..ProtocolConfig::default()
        };
        assert!(matches!(config.validate(), Err(LinkError::InvalidConfig(_))));
    }

    #[test]
    fn test_rejects_duplicate_carriers() {
        let config = ProtocolConfig {
            bit1_hz: 4000.0,
            ..ProtocolConfig::default()
        };
        assert!(matches!(config.validate(), Err(LinkError::InvalidConfig(_))));
    }

    #[test]
    fn test_rejects_oversized_generator() {
        let config = ProtocolConfig {
            generator: 0xdd7,
            ..ProtocolConfig::default()
        };
        assert!(matches!(config.validate(), Err(LinkError::InvalidConfig(_))));
    }

    #[test]
    fn test_rejects_bad_timing_tolerance() {
        let config = ProtocolConfig {
            timing_tolerance: 0.5,
            ..ProtocolConfig::default()
        };
        assert!(matches!(config.validate(), Err(LinkError::InvalidConfig(_))));
    }
}
