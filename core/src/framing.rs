use crate::codec::{ensure_bits, group_bits, pad_to_symbol, ungroup_symbols};
use crate::config::{Modulation, ProtocolConfig};
use crate::error::{LinkError, Result};
use crate::LENGTH_FIELD_BITS;

/// Everything the modulator needs to put one frame on the air.
///
/// Units are bits (0/1) in [`Modulation::Binary`] and 4-bit symbols (0..=15)
/// in [`Modulation::Grouped`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameDescriptor {
    pub modulation: Modulation,
    pub preamble_repeats: usize,
    /// Data-block length in bits, before padding
    pub data_len: usize,
    pub length_units: Vec<u8>,
    pub data_units: Vec<u8>,
}

impl FrameDescriptor {
    /// Data-block bits as they go on the air, padding included
    pub fn padded_bits(&self) -> Result<Vec<u8>> {
        match self.modulation {
            Modulation::Binary => {
                ensure_bits(&self.data_units)?;
                Ok(self.data_units.clone())
            }
            Modulation::Grouped => ungroup_symbols(&self.data_units),
        }
    }

    /// Flip on-air data bits (padding included). Applied in order, so a
    /// repeated index cancels out.
    pub fn flip_bits(&mut self, positions: &[usize]) -> Result<()> {
        let mut bits = self.padded_bits()?;
        for &pos in positions {
            if pos >= bits.len() {
                return Err(LinkError::InvalidInput(format!(
                    "flip position {} beyond {}-bit block",
                    pos,
                    bits.len()
                )));
            }
            bits[pos] ^= 1;
        }
        self.data_units = units_for(self.modulation, &bits)?;
        Ok(())
    }
}

/// Assembles preamble, length field and data block
#[derive(Debug, Clone)]
pub struct FrameBuilder {
    modulation: Modulation,
    preamble_repeats: usize,
    crc_width: usize,
    max_frame_bits: usize,
}

impl FrameBuilder {
    pub fn new(config: &ProtocolConfig) -> Self {
        Self {
            modulation: config.modulation,
            preamble_repeats: config.preamble_repeats,
            crc_width: config.crc_width as usize,
            max_frame_bits: config.max_frame_bits,
        }
    }

    /// Build the frame for an encoded data block (payload ++ CRC)
    pub fn build(&self, data_bits: &[u8]) -> Result<FrameDescriptor> {
        ensure_bits(data_bits)?;
        check_data_len(data_bits.len(), self.crc_width, self.max_frame_bits)?;

        let length_bits = encode_length(data_bits.len())?;
        let padded = match self.modulation {
            Modulation::Binary => data_bits.to_vec(),
            Modulation::Grouped => pad_to_symbol(data_bits),
        };

        Ok(FrameDescriptor {
            modulation: self.modulation,
            preamble_repeats: self.preamble_repeats,
            data_len: data_bits.len(),
            length_units: units_for(self.modulation, &length_bits)?,
            data_units: units_for(self.modulation, &padded)?,
        })
    }
}

fn units_for(modulation: Modulation, bits: &[u8]) -> Result<Vec<u8>> {
    match modulation {
        Modulation::Binary => Ok(bits.to_vec()),
        Modulation::Grouped => group_bits(bits),
    }
}

/// A data block must hold more than the check bits and fit the correction span
pub fn check_data_len(len: usize, crc_width: usize, max_frame_bits: usize) -> Result<()> {
    if len <= crc_width || len > max_frame_bits {
        return Err(LinkError::InvalidFrameLength(len));
    }
    Ok(())
}

/// Length field: unsigned, MSB first
pub fn encode_length(len: usize) -> Result<Vec<u8>> {
    if len >> LENGTH_FIELD_BITS != 0 {
        return Err(LinkError::InvalidFrameLength(len));
    }
    Ok((0..LENGTH_FIELD_BITS).rev().map(|shift| ((len >> shift) & 1) as u8).collect())
}

pub fn decode_length(bits: &[u8]) -> usize {
    bits.iter().fold(0usize, |acc, &b| (acc << 1) | b as usize)
}

/// Number of units carrying `bits` bits
pub fn units_needed(modulation: Modulation, bits: usize) -> usize {
    let per_unit = modulation.bits_per_unit();
    (bits + per_unit - 1) / per_unit
}
