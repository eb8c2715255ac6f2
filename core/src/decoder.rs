use crate::codec::{BitCodec, MessageFormat};
use crate::config::ProtocolConfig;
use crate::crc::CrcEngine;
use crate::error::{LinkError, Result};
use log::{debug, info};

/// A recovered message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded {
    pub message: String,
    /// Payload bits after correction, check bits removed
    pub payload_bits: Vec<u8>,
    /// Data-block indices the corrector flipped back (0-based, ascending)
    pub flipped: Vec<usize>,
    /// Padded-block indices of zero padding that arrived as 1; filled in by
    /// [`Receiver`](crate::link::Receiver), empty for bare blocks
    pub padding_flips: Vec<usize>,
}

/// Validates and corrects a received data block, then unpacks the payload
pub struct Decoder {
    crc: CrcEngine,
    codec: BitCodec,
    max_errors: usize,
}

impl Decoder {
    pub fn new(config: &ProtocolConfig, format: MessageFormat) -> Self {
        Self {
            crc: CrcEngine::new(config),
            codec: BitCodec::new(format),
            max_errors: config.max_errors,
        }
    }

    /// Decode a raw data block (payload ++ CRC).
    ///
    /// Every failure comes back as [`LinkError::DecodeFailure`] wrapping the
    /// cause; no best-guess message is ever returned.
    pub fn decode(&self, raw_bits: &[u8]) -> Result<Decoded> {
        self.try_decode(raw_bits)
            .map_err(|cause| LinkError::DecodeFailure(Box::new(cause)))
    }

    fn try_decode(&self, raw_bits: &[u8]) -> Result<Decoded> {
        if raw_bits.iter().any(|&b| b > 1) {
            return Err(LinkError::MalformedPayload(
                "received block holds values other than 0 and 1".to_string(),
            ));
        }

        let correction = self.crc.correct(raw_bits, self.max_errors)?;
        if correction.flipped.is_empty() {
            debug!("Data block passed CRC check");
        } else {
            info!(
                "Corrected {} bit error(s) at positions {:?}",
                correction.flipped.len(),
                correction.flipped
            );
        }

        let payload_len = correction.bits.len() - self.crc.width();
        let payload_bits = correction.bits[..payload_len].to_vec();
        let message = self.codec.bits_to_message(&payload_bits)?;

        Ok(Decoded {
            message,
            payload_bits,
            flipped: correction.flipped,
            padding_flips: Vec::new(),
        })
    }
}
