use crate::error::{LinkError, Result};
use crate::BITS_PER_SYMBOL;

/// Text encodings understood by [`BitCodec`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MessageFormat {
    /// A literal bit string: one bit per `'0'`/`'1'` character
    #[default]
    Binary,
    /// Printable ASCII (0x20..=0x7E), 7 bits per character, MSB first
    Ascii,
}

impl MessageFormat {
    /// Number of bits each character occupies
    pub fn unit_width(self) -> usize {
        match self {
            MessageFormat::Binary => 1,
            MessageFormat::Ascii => 7,
        }
    }
}

/// Reversible message <-> bit conversion
#[derive(Debug, Clone, Copy, Default)]
pub struct BitCodec {
    format: MessageFormat,
}

impl BitCodec {
    pub fn new(format: MessageFormat) -> Self {
        Self { format }
    }

    pub fn format(&self) -> MessageFormat {
        self.format
    }

    /// Encode message text into bits
    pub fn message_to_bits(&self, message: &str) -> Result<Vec<u8>> {
        match self.format {
            MessageFormat::Binary => message
                .chars()
                .map(|c| match c {
                    '0' => Ok(0),
                    '1' => Ok(1),
                    other => Err(LinkError::InvalidInput(format!(
                        "'{}' is not a binary digit",
                        other
                    ))),
                })
                .collect(),
            MessageFormat::Ascii => {
                let mut bits = Vec::with_capacity(message.len() * 7);
                for c in message.chars() {
                    if !is_printable_ascii(c as u32) {
                        return Err(LinkError::InvalidInput(format!(
                            "{:?} is not printable ASCII",
                            c
                        )));
                    }
                    let code = c as u8;
                    bits.extend((0..7).rev().map(|shift| (code >> shift) & 1));
                }
                Ok(bits)
            }
        }
    }

    /// Decode bits back into message text
    pub fn bits_to_message(&self, bits: &[u8]) -> Result<String> {
        ensure_bits(bits).map_err(|_| {
            LinkError::MalformedPayload("payload holds values other than 0 and 1".to_string())
        })?;

        let width = self.format.unit_width();
        if bits.len() % width != 0 {
            return Err(LinkError::MalformedPayload(format!(
                "{} bits is not a multiple of the {}-bit character width",
                bits.len(),
                width
            )));
        }

        match self.format {
            MessageFormat::Binary => Ok(bits.iter().map(|&b| if b == 1 { '1' } else { '0' }).collect()),
            MessageFormat::Ascii => bits
                .chunks(width)
                .map(|unit| {
                    let code = unit.iter().fold(0u32, |acc, &b| (acc << 1) | b as u32);
                    if is_printable_ascii(code) {
                        Ok(code as u8 as char)
                    } else {
                        Err(LinkError::MalformedPayload(format!(
                            "character code {:#04x} is not printable ASCII",
                            code
                        )))
                    }
                })
                .collect(),
        }
    }
}

fn is_printable_ascii(code: u32) -> bool {
    (0x20..=0x7e).contains(&code)
}

/// Reject anything that is not a 0/1 bit
pub fn ensure_bits(bits: &[u8]) -> Result<()> {
    match bits.iter().position(|&b| b > 1) {
        Some(idx) => Err(LinkError::InvalidInput(format!(
            "value {} at index {} is not a bit",
            bits[idx], idx
        ))),
        None => Ok(()),
    }
}

/// Pack bits into big-endian 4-bit symbols
pub fn group_bits(bits: &[u8]) -> Result<Vec<u8>> {
    if bits.len() % BITS_PER_SYMBOL != 0 {
        return Err(LinkError::Alignment(bits.len()));
    }
    ensure_bits(bits)?;

    Ok(bits
        .chunks(BITS_PER_SYMBOL)
        .map(|nibble| nibble.iter().fold(0u8, |acc, &b| (acc << 1) | b))
        .collect())
}

/// Unpack 4-bit symbols into bits
pub fn ungroup_symbols(symbols: &[u8]) -> Result<Vec<u8>> {
    let mut bits = Vec::with_capacity(symbols.len() * BITS_PER_SYMBOL);
    for &symbol in symbols {
        if symbol > 0x0f {
            return Err(LinkError::InvalidInput(format!("symbol {} exceeds 4 bits", symbol)));
        }
        bits.extend((0..BITS_PER_SYMBOL).rev().map(|shift| (symbol >> shift) & 1));
    }
    Ok(bits)
}

/// Zero-pad to the next whole symbol
pub fn pad_to_symbol(bits: &[u8]) -> Vec<u8> {
    let mut padded = bits.to_vec();
    let remainder = bits.len() % BITS_PER_SYMBOL;
    if remainder != 0 {
        padded.resize(bits.len() + BITS_PER_SYMBOL - remainder, 0);
    }
    padded
}

/// Render bits as a `0`/`1` string
pub fn bits_to_string(bits: &[u8]) -> String {
    bits.iter().map(|&b| if b == 0 { '0' } else { '1' }).collect()
}
