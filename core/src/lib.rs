//! Acoustic FSK link with CRC-based two-bit error correction
//!
//! The sender turns a short message into a tone plan: a marker preamble, an
//! 8-bit length field and a CRC-protected data block, sent either one bit per
//! tone (4000/6000 Hz) or one 4-bit symbol per tone (16 carriers). The receiver
//! consumes per-window dominant-frequency estimates, locks onto the preamble,
//! recovers the block and corrects up to two flipped bits.

pub mod error;
pub mod config;
pub mod codec;
pub mod crc;
pub mod framing;
pub mod modulator;
pub mod detector;
pub mod decoder;
pub mod synth;
pub mod spectrum;
pub mod link;

pub use codec::{BitCodec, MessageFormat};
pub use config::{Modulation, ProtocolConfig};
pub use crc::{Correction, CrcEngine, FlipCandidates};
pub use decoder::{Decoded, Decoder};
pub use detector::{DetectorState, FrameDetector, FrequencyWindow, StopSignal};
pub use error::{LinkError, Result};
pub use framing::{FrameBuilder, FrameDescriptor};
pub use link::{FlipPlan, Receiver, Sender, Transmission};
pub use modulator::{Modulator, ToneEvent};
pub use spectrum::ToneEstimator;
pub use synth::Synthesizer;

// Audio configuration
pub const SAMPLE_RATE: u32 = 44100;
pub const ANALYSIS_WINDOW_S: f32 = 0.01;

// Carrier plan
pub const MARKER_FREQUENCY_HZ: f32 = 8000.0;
pub const BIT0_FREQUENCY_HZ: f32 = 4000.0;
pub const BIT1_FREQUENCY_HZ: f32 = 6000.0;
pub const SYMBOL_BASE_FREQUENCY_HZ: f32 = 4300.0;
pub const SYMBOL_SPACING_HZ: f32 = 200.0;
pub const SYMBOL_COUNT: usize = 16;
pub const BITS_PER_SYMBOL: usize = 4;

// Timing
pub const PREAMBLE_TONE_DURATION_S: f32 = 0.02;
pub const PREAMBLE_REPEATS: usize = 6;
pub const DATA_TONE_DURATION_S: f32 = 0.3;
pub const SYNC_TIMEOUT_S: f32 = 30.0;

// CRC configuration (normal notation, leading x^11 term implicit)
pub const CRC_GENERATOR: u32 = 0x5d7;
pub const CRC_WIDTH: u32 = 11;
pub const MAX_CORRECTABLE_ERRORS: usize = 2;

// Frame configuration
pub const LENGTH_FIELD_BITS: usize = 8;
pub const MAX_FRAME_BITS: usize = 31; // longest block with guaranteed 2-bit correction under 0x5d7
pub const MAX_PAYLOAD_BITS: usize = MAX_FRAME_BITS - CRC_WIDTH as usize; // 20
