use crate::codec::ungroup_symbols;
use crate::config::{Modulation, ProtocolConfig};
use crate::error::{LinkError, Result};
use crate::framing::{check_data_len, decode_length, units_needed};
use crate::LENGTH_FIELD_BITS;
use log::{debug, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Dominant frequency observed over one analysis window.
///
/// `frequency_hz` is `None` when the estimator saw no clear tone (silence or
/// broadband noise).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrequencyWindow {
    pub frequency_hz: Option<f32>,
    pub duration_s: f32,
}

impl FrequencyWindow {
    pub fn tone(frequency_hz: f32, duration_s: f32) -> Self {
        Self {
            frequency_hz: Some(frequency_hz),
            duration_s,
        }
    }

    pub fn silence(duration_s: f32) -> Self {
        Self {
            frequency_hz: None,
            duration_s,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorState {
    AwaitingPreamble,
    ReadingLength,
    ReadingData,
    Done,
}

/// External stop request for a receive session: an optional deadline and a
/// flag another thread can raise.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    deadline: Option<Instant>,
    cancelled: Arc<AtomicBool>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            deadline: Some(Instant::now() + timeout),
            cancelled: Arc::default(),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
            || self.deadline.map_or(false, |deadline| Instant::now() >= deadline)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tone {
    Marker,
    Unit(u8),
    Gap,
}

/// Time each tone held within one data-unit slot
#[derive(Debug, Clone)]
struct Slot {
    held_s: Vec<f32>,
    /// Gaps and stray marker windows
    lost_s: f32,
    filled_s: f32,
}

impl Slot {
    fn new(alphabet: usize) -> Self {
        Self {
            held_s: vec![0.0; alphabet],
            lost_s: 0.0,
            filled_s: 0.0,
        }
    }

    fn add(&mut self, tone: Tone, duration_s: f32) {
        match tone {
            Tone::Unit(value) => match self.held_s.get_mut(value as usize) {
                Some(held) => *held += duration_s,
                None => self.lost_s += duration_s,
            },
            Tone::Marker | Tone::Gap => self.lost_s += duration_s,
        }
        self.filled_s += duration_s;
    }

    /// Unit that held the slot longest; equal times go to the lower value
    fn winner(&self) -> Option<(u8, f32)> {
        self.held_s
            .iter()
            .enumerate()
            .fold(None, |best: Option<(u8, f32)>, (value, &held)| match best {
                Some((_, top)) if top >= held => best,
                _ if held > 0.0 => Some((value as u8, held)),
                _ => best,
            })
    }
}

/// Slots close this close to a full unit duration, absorbing float drift
const SLOT_EPSILON: f32 = 1e-4;

/// Receiver state machine: preamble lock, length field, data block.
pub struct FrameDetector {
    modulation: Modulation,
    /// (frequency, tone) sorted by frequency
    carriers: Vec<(f32, Tone)>,
    frequency_tolerance_hz: f32,
    preamble_total_s: f32,
    unit_duration_s: f32,
    timing_tolerance: f32,
    sync_timeout_s: f32,
    crc_width: usize,
    max_frame_bits: usize,

    alphabet: usize,

    state: DetectorState,
    scanned_s: f32,
    marker_run_s: f32,
    slot: Slot,
    units: Vec<u8>,
    declared_len: usize,
    frame: Option<Vec<u8>>,
    padding_flips: Vec<usize>,
}

impl FrameDetector {
    pub fn new(config: &ProtocolConfig) -> Self {
        let data_frequencies = config.data_frequencies();
        let alphabet = data_frequencies.len();
        let mut carriers: Vec<(f32, Tone)> = data_frequencies
            .into_iter()
            .enumerate()
            .map(|(value, freq)| (freq, Tone::Unit(value as u8)))
            .collect();
        carriers.push((config.marker_hz, Tone::Marker));
        carriers.sort_by(|a, b| a.0.total_cmp(&b.0));

        Self {
            modulation: config.modulation,
            carriers,
            frequency_tolerance_hz: config.frequency_tolerance_hz,
            preamble_total_s: config.preamble_total_s(),
            unit_duration_s: config.data_duration_s,
            timing_tolerance: config.timing_tolerance,
            sync_timeout_s: config.sync_timeout_s,
            crc_width: config.crc_width as usize,
            max_frame_bits: config.max_frame_bits,
            alphabet,
            state: DetectorState::AwaitingPreamble,
            scanned_s: 0.0,
            marker_run_s: 0.0,
            slot: Slot::new(alphabet),
            units: Vec::new(),
            declared_len: 0,
            frame: None,
            padding_flips: Vec::new(),
        }
    }

    pub fn state(&self) -> DetectorState {
        self.state
    }

    /// Data-block length announced by the length field, once read
    pub fn declared_len(&self) -> Option<usize> {
        match self.state {
            DetectorState::ReadingData | DetectorState::Done => Some(self.declared_len),
            _ => None,
        }
    }

    /// Padded-block indices of padding bits that arrived as 1 (grouped mode)
    pub fn padding_flips(&self) -> &[usize] {
        &self.padding_flips
    }

    /// Feed one analysis window
    pub fn push(&mut self, window: FrequencyWindow) -> Result<DetectorState> {
        if !(window.duration_s.is_finite() && window.duration_s > 0.0) {
            return Err(LinkError::InvalidInput(format!(
                "window duration {} is not positive",
                window.duration_s
            )));
        }

        let tone = self.classify(window.frequency_hz);
        match self.state {
            DetectorState::AwaitingPreamble => self.scan_preamble(tone, window.duration_s)?,
            DetectorState::ReadingLength | DetectorState::ReadingData => {
                self.read_units(tone, window.duration_s)?
            }
            DetectorState::Done => {}
        }
        Ok(self.state)
    }

    /// Drive the detector over a window stream until a frame is complete
    pub fn run<I>(&mut self, windows: I, stop: &StopSignal) -> Result<Vec<u8>>
    where
        I: IntoIterator<Item = FrequencyWindow>,
    {
        for window in windows {
            if stop.is_stopped() {
                debug!("Receive session stopped in state {:?}", self.state);
                return Err(LinkError::SyncTimeout);
            }
            if self.push(window)? == DetectorState::Done {
                break;
            }
        }
        self.finish()
    }

    /// The received data block, or why there is none
    pub fn finish(&mut self) -> Result<Vec<u8>> {
        match self.state {
            DetectorState::Done => self.frame.take().ok_or(LinkError::InsufficientData),
            DetectorState::AwaitingPreamble => Err(LinkError::SyncTimeout),
            DetectorState::ReadingLength | DetectorState::ReadingData => {
                Err(LinkError::InsufficientData)
            }
        }
    }

    /// Nearest carrier within tolerance; equidistant frequencies resolve to
    /// the lower carrier
    fn classify(&self, frequency_hz: Option<f32>) -> Tone {
        let Some(freq) = frequency_hz.filter(|f| f.is_finite()) else {
            return Tone::Gap;
        };

        let mut best: Option<(f32, Tone)> = None;
        for &(carrier, tone) in &self.carriers {
            let distance = (freq - carrier).abs();
            if best.map_or(true, |(d, _)| distance < d) {
                best = Some((distance, tone));
            }
        }

        match best {
            Some((distance, tone)) if distance <= self.frequency_tolerance_hz => tone,
            _ => Tone::Gap,
        }
    }

    fn scan_preamble(&mut self, tone: Tone, duration_s: f32) -> Result<()> {
        self.scanned_s += duration_s;

        if tone == Tone::Marker {
            self.marker_run_s += duration_s;
        } else if self.marker_run_s > 0.0 {
            let run_s = std::mem::take(&mut self.marker_run_s);
            let slack = self.preamble_total_s * self.timing_tolerance;
            if (run_s - self.preamble_total_s).abs() <= slack {
                debug!("Preamble locked after {:.3}s marker run", run_s);
                self.state = DetectorState::ReadingLength;
                // The window that ended the marker already belongs to the length field
                return self.read_units(tone, duration_s);
            }
            warn!(
                "Discarding {:.3}s marker run (expected {:.3}s)",
                run_s, self.preamble_total_s
            );
        }

        if self.scanned_s > self.sync_timeout_s {
            return Err(LinkError::SyncTimeout);
        }
        Ok(())
    }

    /// After lock the data units sit on a fixed grid of `unit_duration_s`
    /// slots starting at the first non-marker window. Each slot yields the
    /// unit that held it longest, so a stray window costs at most one unit.
    fn read_units(&mut self, tone: Tone, duration_s: f32) -> Result<()> {
        let slot_s = self.unit_duration_s;
        let mut remaining = duration_s;

        while remaining > 0.0 && self.state != DetectorState::Done {
            let take = remaining.min(slot_s - self.slot.filled_s);
            self.slot.add(tone, take);
            remaining -= take;

            if self.slot.filled_s >= slot_s * (1.0 - SLOT_EPSILON) {
                let unit = self.close_slot()?;
                self.accept_unit(unit)?;
            }
        }
        Ok(())
    }

    fn close_slot(&mut self) -> Result<u8> {
        let slot = std::mem::replace(&mut self.slot, Slot::new(self.alphabet));

        match slot.winner() {
            Some((unit, held_s)) if slot.lost_s <= slot.filled_s / 2.0 => {
                if held_s < slot.filled_s {
                    debug!(
                        "Unit {} held {:.3}s of a {:.3}s slot",
                        unit, held_s, slot.filled_s
                    );
                }
                Ok(unit)
            }
            _ => {
                warn!(
                    "Carrier lost for {:.3}s of a {:.3}s slot",
                    slot.lost_s, slot.filled_s
                );
                Err(LinkError::InsufficientData)
            }
        }
    }

    fn accept_unit(&mut self, unit: u8) -> Result<()> {
        self.units.push(unit);

        match self.state {
            DetectorState::ReadingLength => {
                if self.units.len() == units_needed(self.modulation, LENGTH_FIELD_BITS) {
                    let bits = self.units_to_bits()?;
                    let len = decode_length(&bits);
                    check_data_len(len, self.crc_width, self.max_frame_bits)?;
                    debug!("Length field announces {} data bits", len);
                    self.declared_len = len;
                    self.units.clear();
                    self.state = DetectorState::ReadingData;
                }
            }
            DetectorState::ReadingData => {
                if self.units.len() == units_needed(self.modulation, self.declared_len) {
                    let mut bits = self.units_to_bits()?;
                    self.padding_flips = (self.declared_len..bits.len())
                        .filter(|&idx| bits[idx] == 1)
                        .collect();
                    if !self.padding_flips.is_empty() {
                        warn!("Padding bits {:?} arrived non-zero", self.padding_flips);
                    }
                    bits.truncate(self.declared_len);
                    debug!("Received {}-bit data block", bits.len());
                    self.frame = Some(bits);
                    self.units.clear();
                    self.state = DetectorState::Done;
                }
            }
            DetectorState::AwaitingPreamble | DetectorState::Done => {}
        }
        Ok(())
    }

    fn units_to_bits(&self) -> Result<Vec<u8>> {
        match self.modulation {
            Modulation::Binary => Ok(self.units.clone()),
            Modulation::Grouped => ungroup_symbols(&self.units),
        }
    }
}
