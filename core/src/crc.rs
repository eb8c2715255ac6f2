use crate::codec::ensure_bits;
use crate::config::ProtocolConfig;
use crate::error::{LinkError, Result};
use log::debug;
use std::collections::HashSet;

/// Result of a successful correction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Correction {
    /// The frame with the located errors flipped back
    pub bits: Vec<u8>,
    /// Indices that were flipped, ascending (empty when the frame was clean)
    pub flipped: Vec<usize>,
}

/// CRC over bit sequences using a generator in normal notation.
///
/// `generator` holds the low `width` coefficients; the x^width term is
/// implicit. The default 0x5d7 at width 11 divides by
/// x^11 + x^10 + x^8 + x^7 + x^6 + x^4 + x^2 + x + 1.
#[derive(Debug, Clone)]
pub struct CrcEngine {
    generator: u32,
    width: usize,
    /// Full divisor, MSB first, `width + 1` bits
    divisor: Vec<u8>,
}

impl CrcEngine {
    pub fn new(config: &ProtocolConfig) -> Self {
        Self::with_generator(config.generator, config.crc_width)
    }

    pub fn with_generator(generator: u32, width: u32) -> Self {
        let full = (1u64 << width) | generator as u64;
        let divisor = (0..=width).rev().map(|shift| ((full >> shift) & 1) as u8).collect();
        Self {
            generator,
            width: width as usize,
            divisor,
        }
    }

    /// Number of check bits appended by [`encode`](Self::encode)
    pub fn width(&self) -> usize {
        self.width
    }

    /// Modulo-2 long division in place; the remainder ends up in the last `width` bits
    fn divide(&self, bits: &mut [u8]) {
        let steps = bits.len().saturating_sub(self.width);
        for i in 0..steps {
            if bits[i] == 1 {
                for (j, &coeff) in self.divisor.iter().enumerate() {
                    bits[i + j] ^= coeff;
                }
            }
        }
    }

    fn remainder_of(&self, bits: &[u8]) -> Vec<u8> {
        let mut work = bits.to_vec();
        self.divide(&mut work);
        work[work.len() - self.width..].to_vec()
    }

    /// CRC remainder of `payload` (payload shifted left by the generator degree)
    pub fn remainder(&self, payload: &[u8]) -> Result<Vec<u8>> {
        ensure_bits(payload)?;
        let mut augmented = payload.to_vec();
        augmented.resize(payload.len() + self.width, 0);
        Ok(self.remainder_of(&augmented))
    }

    /// Append the check bits so the result is divisible by the generator
    pub fn encode(&self, payload: &[u8]) -> Result<Vec<u8>> {
        let remainder = self.remainder(payload)?;
        let mut frame = payload.to_vec();
        frame.extend_from_slice(&remainder);
        Ok(frame)
    }

    /// Remainder of the whole received frame; all zeros means no detected error
    pub fn check_remainder(&self, frame: &[u8]) -> Result<Vec<u8>> {
        self.ensure_frame(frame)?;
        Ok(self.remainder_of(frame))
    }

    pub fn is_valid(&self, frame: &[u8]) -> bool {
        self.check_remainder(frame)
            .map(|r| r.iter().all(|&b| b == 0))
            .unwrap_or(false)
    }

    /// Locate and undo up to `max_errors` flipped bits.
    ///
    /// Candidate flip sets are tried by ascending size, and within a size in
    /// ascending index order; the first set that zeroes the remainder wins.
    pub fn correct(&self, frame: &[u8], max_errors: usize) -> Result<Correction> {
        self.ensure_frame(frame)?;

        if self.is_zero_remainder(frame) {
            return Ok(Correction {
                bits: frame.to_vec(),
                flipped: Vec::new(),
            });
        }

        let mut candidate = frame.to_vec();
        for flips in FlipCandidates::new(frame.len(), max_errors) {
            for &idx in &flips {
                candidate[idx] ^= 1;
            }
            if self.is_zero_remainder(&candidate) {
                debug!("Corrected {} bit(s) at {:?}", flips.len(), flips);
                return Ok(Correction {
                    bits: candidate,
                    flipped: flips,
                });
            }
            for &idx in &flips {
                candidate[idx] ^= 1;
            }
        }

        Err(LinkError::Uncorrectable { max_errors })
    }

    /// Longest frame length, at most `limit`, for which every error pattern of
    /// weight `1..=max_errors` leaves a distinct non-zero remainder.
    ///
    /// Up to that length [`correct`](Self::correct) always recovers the sent
    /// frame.
    pub fn guaranteed_span(&self, max_errors: usize, limit: usize) -> usize {
        if max_errors == 0 {
            return limit;
        }

        let mask = (1u64 << self.width) - 1;
        let mut seen: HashSet<u64> = HashSet::new();
        // syndromes[p] = x^p mod G
        let mut syndromes: Vec<u64> = Vec::with_capacity(limit);
        let mut power = 1u64;

        for len in 1..=limit {
            let newest = len - 1;
            syndromes.push(power & mask);
            power <<= 1;
            if power >> self.width & 1 == 1 {
                power ^= (1u64 << self.width) | self.generator as u64;
            }

            // Patterns that include the newest position
            let mut fresh = vec![syndromes[newest]];
            for others in FlipCandidates::new(newest, max_errors - 1) {
                let combined = others
                    .iter()
                    .fold(syndromes[newest], |acc, &p| acc ^ syndromes[p]);
                fresh.push(combined);
            }

            for syndrome in fresh {
                if syndrome == 0 || !seen.insert(syndrome) {
                    return newest;
                }
            }
        }

        limit
    }

    fn is_zero_remainder(&self, frame: &[u8]) -> bool {
        let mut work = frame.to_vec();
        self.divide(&mut work);
        work[work.len() - self.width..].iter().all(|&b| b == 0)
    }

    fn ensure_frame(&self, frame: &[u8]) -> Result<()> {
        if frame.len() <= self.width {
            return Err(LinkError::InvalidFrameLength(frame.len()));
        }
        ensure_bits(frame)
    }
}

/// Every set of `1..=max_flips` distinct indices below `len`, smallest sets
/// first, each size in lexicographic order.
#[derive(Debug, Clone)]
pub struct FlipCandidates {
    len: usize,
    max_flips: usize,
    current: Vec<usize>,
    exhausted: bool,
}

impl FlipCandidates {
    pub fn new(len: usize, max_flips: usize) -> Self {
        Self {
            len,
            max_flips,
            current: Vec::new(),
            exhausted: false,
        }
    }

    fn start_size(&mut self, size: usize) -> Option<Vec<usize>> {
        if size == 0 || size > self.max_flips || size > self.len {
            self.exhausted = true;
            return None;
        }
        self.current = (0..size).collect();
        Some(self.current.clone())
    }
}

impl Iterator for FlipCandidates {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.exhausted {
            return None;
        }
        if self.current.is_empty() {
            return self.start_size(1);
        }

        let size = self.current.len();
        for i in (0..size).rev() {
            if self.current[i] < self.len - size + i {
                self.current[i] += 1;
                for j in i + 1..size {
                    self.current[j] = self.current[j - 1] + 1;
                }
                return Some(self.current.clone());
            }
        }

        self.start_size(size + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> CrcEngine {
        CrcEngine::new(&ProtocolConfig::default())
    }

    fn pattern(value: u32, len: usize) -> Vec<u8> {
        (0..len).rev().map(|s| ((value >> s) & 1) as u8).collect()
    }

    fn flip(bits: &[u8], positions: &[usize]) -> Vec<u8> {
        let mut out = bits.to_vec();
        for &p in positions {
            out[p] ^= 1;
        }
        out
    }

    #[test]
    fn test_divisor_layout() {
        let crc = engine();
        assert_eq!(crc.width(), 11);
        assert_eq!(crc.divisor, vec![1, 1, 0, 1, 1, 1, 0, 1, 0, 1, 1, 1]);
    }

    #[test]
    fn test_known_remainder() {
        let crc = engine();
        let remainder = crc.remainder(&[1, 0, 1, 1]).unwrap();
        assert_eq!(remainder, vec![0, 0, 1, 1, 1, 1, 0, 0, 1, 0, 0]);
    }

    #[test]
    fn test_encoded_frame_is_divisible() {
        let crc = engine();
        for value in [0u32, 1, 0b1011, 0xabcde, 0xfffff] {
            let frame = crc.encode(&pattern(value, 20)).unwrap();
            assert_eq!(frame.len(), 31);
            assert!(crc.check_remainder(&frame).unwrap().iter().all(|&b| b == 0));
            assert!(crc.is_valid(&frame));
        }
    }

    #[test]
    fn test_clean_frame_passes_through() {
        let crc = engine();
        let frame = crc.encode(&[1, 1, 0, 1, 0, 0, 1]).unwrap();
        let correction = crc.correct(&frame, 2).unwrap();
        assert_eq!(correction.bits, frame);
        assert!(correction.flipped.is_empty());
    }

    #[test]
    fn test_concrete_single_flip_scenario() {
        let crc = engine();
        let payload = vec![1, 0, 1, 1];
        let frame = crc.encode(&payload).unwrap();
        assert_eq!(frame.len(), 15);

        let corrupted = flip(&frame, &[2]);
        assert!(!crc.is_valid(&corrupted));

        let correction = crc.correct(&corrupted, 2).unwrap();
        assert_eq!(correction.flipped, vec![2]);
        assert_eq!(&correction.bits[..4], &payload[..]);
    }

    #[test]
    fn test_correction_completeness_full_length() {
        let crc = engine();
        for value in [0u32, 0b1011_0011_1000_1111_0101, 0xfffff, 0x5a5a5] {
            let frame = crc.encode(&pattern(value, 20)).unwrap();
            for flips in FlipCandidates::new(frame.len(), 2) {
                let corrupted = flip(&frame, &flips);
                let correction = crc.correct(&corrupted, 2).unwrap();
                assert_eq!(correction.bits, frame, "flips {:?}", flips);
                assert_eq!(correction.flipped, flips);
            }
        }
    }

    #[test]
    fn test_correction_is_unique_within_budget() {
        let crc = engine();
        let frames = [0u32, 0b1011_0011_1000_1111_0101, 0xfffff, 0x5a5a5]
            .into_iter()
            .map(|value| crc.encode(&pattern(value, 20)).unwrap())
            // A shorter block exercises a different span of the generator
            .chain(std::iter::once(crc.encode(&[1, 0, 1, 1]).unwrap()));

        for frame in frames {
            for flips in FlipCandidates::new(frame.len(), 2) {
                let corrupted = flip(&frame, &flips);
                let matches: Vec<Vec<usize>> = FlipCandidates::new(frame.len(), 2)
                    .filter(|candidate| crc.is_valid(&flip(&corrupted, candidate)))
                    .collect();
                assert_eq!(matches, vec![flips.clone()], "frame {:?}", frame);
            }
        }
    }

    #[test]
    fn test_three_flips_are_reported_uncorrectable() {
        let crc = engine();
        let frame = crc.encode(&pattern(0xb38f5, 20)).unwrap();
        for flips in [[0usize, 1, 2], [1, 2, 3], [3, 9, 20], [0, 5, 10]] {
            let corrupted = flip(&frame, &flips);
            match crc.correct(&corrupted, 2) {
                Err(LinkError::Uncorrectable { max_errors: 2 }) => {}
                other => panic!("Expected Uncorrectable for {:?}, got {:?}", flips, other),
            }
        }
    }

    #[test]
    fn test_guaranteed_span_of_default_generator() {
        let crc = engine();
        assert_eq!(crc.guaranteed_span(2, 64), 31);
        assert_eq!(crc.guaranteed_span(2, 20), 20);
        assert!(crc.guaranteed_span(1, 200) > 31);
    }

    #[test]
    fn test_short_frame_rejected() {
        let crc = engine();
        assert!(matches!(
            crc.correct(&[0; 11], 2),
            Err(LinkError::InvalidFrameLength(11))
        ));
    }

    #[test]
    fn test_non_bit_values_rejected() {
        let crc = engine();
        assert!(matches!(crc.encode(&[1, 3, 0]), Err(LinkError::InvalidInput(_))));
    }

    #[test]
    fn test_flip_candidates_order() {
        let sets: Vec<Vec<usize>> = FlipCandidates::new(4, 2).collect();
        assert_eq!(
            sets,
            vec![
                vec![0],
                vec![1],
                vec![2],
                vec![3],
                vec![0, 1],
                vec![0, 2],
                vec![0, 3],
                vec![1, 2],
                vec![1, 3],
                vec![2, 3],
            ]
        );
    }

    #[test]
    fn test_flip_candidates_counts() {
        assert_eq!(FlipCandidates::new(31, 2).count(), 31 + 465);
        assert_eq!(FlipCandidates::new(5, 3).count(), 5 + 10 + 10);
        assert_eq!(FlipCandidates::new(0, 2).count(), 0);
        assert_eq!(FlipCandidates::new(5, 0).count(), 0);
        assert_eq!(FlipCandidates::new(2, 3).count(), 3);
    }
}
