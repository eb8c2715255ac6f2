use crate::codec::{BitCodec, MessageFormat};
use crate::config::ProtocolConfig;
use crate::crc::CrcEngine;
use crate::decoder::{Decoded, Decoder};
use crate::detector::{FrameDetector, FrequencyWindow, StopSignal};
use crate::error::{LinkError, Result};
use crate::framing::FrameBuilder;
use crate::modulator::{Modulator, ToneEvent};
use crate::spectrum::ToneEstimator;
use log::{debug, info};

/// Deliberate bit flips applied by the sender, for exercising the corrector
/// over a real channel.
///
/// Each fraction `f` in (0, 1] flips on-air bit `ceil(f * len) - 1` of the
/// padded data block; zero means "no flip".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlipPlan {
    fractions: Vec<f64>,
}

impl FlipPlan {
    pub fn none() -> Self {
        Self::default()
    }

    /// The sender's two real-valued parameters
    pub fn from_fractions(first: f64, second: f64) -> Self {
        Self {
            fractions: [first, second].into_iter().filter(|f| *f != 0.0).collect(),
        }
    }

    pub fn fractions(&self) -> &[f64] {
        &self.fractions
    }

    /// Bit indices to flip in a block of `len` bits. Out-of-range fractions
    /// are skipped.
    pub fn positions(&self, len: usize) -> Vec<usize> {
        self.fractions
            .iter()
            .filter(|f| f.is_finite())
            .filter_map(|f| {
                let idx = (f * len as f64).ceil() as i64 - 1;
                (idx >= 0 && (idx as usize) < len).then_some(idx as usize)
            })
            .collect()
    }
}

/// What the sender put on the air
#[derive(Debug, Clone)]
pub struct Transmission {
    /// Payload ++ CRC before any injected flips
    pub data_bits: Vec<u8>,
    /// Data block as transmitted, padding and injected flips included
    pub on_air_bits: Vec<u8>,
    /// Injected flip positions, in application order
    pub flipped: Vec<usize>,
    pub tones: Vec<ToneEvent>,
}

/// Sender side: message -> tone plan
pub struct Sender {
    codec: BitCodec,
    crc: CrcEngine,
    builder: FrameBuilder,
    modulator: Modulator,
    max_payload_bits: usize,
}

impl Sender {
    pub fn new(config: &ProtocolConfig, format: MessageFormat) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            codec: BitCodec::new(format),
            crc: CrcEngine::new(config),
            builder: FrameBuilder::new(config),
            modulator: Modulator::new(config),
            max_payload_bits: config.max_payload_bits(),
        })
    }

    pub fn transmit(&self, message: &str, flips: &FlipPlan) -> Result<Transmission> {
        let payload = self.codec.message_to_bits(message)?;
        if payload.is_empty() {
            return Err(LinkError::InvalidInput("message is empty".to_string()));
        }
        if payload.len() > self.max_payload_bits {
            return Err(LinkError::InvalidInput(format!(
                "message needs {} payload bits, at most {} fit a correctable frame",
                payload.len(),
                self.max_payload_bits
            )));
        }

        let data_bits = self.crc.encode(&payload)?;
        let mut frame = self.builder.build(&data_bits)?;

        let positions = flips.positions(frame.padded_bits()?.len());
        if !positions.is_empty() {
            info!("Injecting bit flips at positions {:?}", positions);
            frame.flip_bits(&positions)?;
        }

        let tones = self.modulator.modulate(&frame)?;
        debug!(
            "Framed {} payload bits into {}-bit block, {} tones",
            payload.len(),
            data_bits.len(),
            tones.len()
        );

        Ok(Transmission {
            data_bits,
            on_air_bits: frame.padded_bits()?,
            flipped: positions,
            tones,
        })
    }
}

/// Receiver side: frequency windows (or samples) -> message
pub struct Receiver {
    config: ProtocolConfig,
    decoder: Decoder,
    estimator: ToneEstimator,
}

impl Receiver {
    pub fn new(config: &ProtocolConfig, format: MessageFormat) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config: config.clone(),
            decoder: Decoder::new(config, format),
            estimator: ToneEstimator::new(config),
        })
    }

    /// Receive one frame from a stream of dominant-frequency estimates
    pub fn receive<I>(&self, windows: I, stop: &StopSignal) -> Result<Decoded>
    where
        I: IntoIterator<Item = FrequencyWindow>,
    {
        let mut detector = FrameDetector::new(&self.config);
        let raw = detector.run(windows, stop)?;
        let mut decoded = self.decoder.decode(&raw)?;
        decoded.padding_flips = detector.padding_flips().to_vec();
        Ok(decoded)
    }

    /// Receive one frame from mono PCM samples at the configured sample rate
    pub fn receive_samples(&self, samples: &[f32], stop: &StopSignal) -> Result<Decoded> {
        let windows = self.estimator.windows(samples);
        debug!("Analysing {} windows of {} samples", windows.len(), self.estimator.window_samples());
        self.receive(windows, stop)
    }
}
