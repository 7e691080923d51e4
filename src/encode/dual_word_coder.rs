// src/encode/dual_word_coder.rs

//! Arithmetic coder over two interleaved fixed-length codewords.
//!
//! Each slot holds an integer interval `[base, base + size]` of
//! `codeword_length`-bit values. Coding a bit splits the interval of one slot
//! in proportion to the probability; once a slot is down to a single value
//! that value is the codeword. Because every word has a fixed length, the
//! cost of terminating is known at all times: it is the number of pending
//! words times the word length.
//!
//! Small intervals quantize probabilities badly, so when the primary slot
//! gets small the bit may be routed to the secondary slot instead.
//!
//! Words are written in the order their slots were opened, which is also
//! the order in which the decoder opens its slots and reads them.

use crate::encode::coder::{BinaryCoder, rescale_probability};
use crate::iff::byte_stream::ByteStream;
use crate::model::probability::{ContextProbabilityModel, ModelConfig};
use crate::utils::error::{CodecError, Result};
use byteorder::{BigEndian, ByteOrder};
use log::{debug, trace};
use std::collections::VecDeque;

/// Pending words at which the primary slot is used regardless of its size,
/// so a starved primary slot cannot hold back output indefinitely.
const MAX_PENDING_WORDS: u64 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DualWordConfig {
    /// Bits per codeword, a multiple of 8.
    pub codeword_length: u32,
    pub precision_bits: u32,
    /// Interval size below which the secondary slot is considered.
    pub min_size: u64,
    /// Probability error tolerated on the primary slot, in percent.
    pub tolerance_percent: u32,
}

impl Default for DualWordConfig {
    fn default() -> Self {
        Self {
            codeword_length: 16,
            precision_bits: 15,
            min_size: 15,
            tolerance_percent: 5,
        }
    }
}

impl DualWordConfig {
    pub fn validate(&self) -> Result<()> {
        if self.codeword_length == 0 || self.codeword_length % 8 != 0 || self.codeword_length > 48
        {
            return Err(CodecError::config(format!(
                "codeword_length must be a multiple of 8 in 8..=48, got {}",
                self.codeword_length
            )));
        }
        if !(1..=16).contains(&self.precision_bits) {
            return Err(CodecError::config(format!(
                "precision_bits must be in 1..=16, got {}",
                self.precision_bits
            )));
        }
        if self.codeword_length + self.precision_bits > 64 {
            return Err(CodecError::config(
                "codeword_length + precision_bits exceeds 64 bits",
            ));
        }
        if self.tolerance_percent > 100 {
            return Err(CodecError::config(format!(
                "tolerance_percent must be at most 100, got {}",
                self.tolerance_percent
            )));
        }
        Ok(())
    }

    #[inline]
    fn word_bytes(&self) -> usize {
        (self.codeword_length / 8) as usize
    }

    #[inline]
    fn full_size(&self) -> u64 {
        (1u64 << self.codeword_length) - 1
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Slot {
    base: u64,
    /// Number of values in the interval, minus one.
    size: u64,
    /// Creation index of the word.
    id: u64,
    /// Codeword read from the stream; decoder only.
    value: u64,
}

/// Values assigned to a zero bit out of `size + 1`. At least one value is
/// left to each outcome.
#[inline]
fn split(size: u64, prob0: u32, precision_bits: u32) -> u64 {
    let count = ((size as u128 + 1) * prob0 as u128) >> precision_bits;
    (count as u64).clamp(1, size)
}

/// `|count0 / (size + 1) - prob0 / 2^precision|` as a fraction.
#[inline]
fn split_error(size: u64, prob0: u32, precision_bits: u32) -> (u128, u128) {
    let n = size as u128 + 1;
    let count0 = split(size, prob0, precision_bits) as u128;
    let num = (count0 << precision_bits).abs_diff(prob0 as u128 * n);
    (num, n << precision_bits)
}

/// Value of `[base, base + size]` with the most trailing zero bits.
fn cheapest_value(slot: &Slot, width: u32) -> u64 {
    let high = slot.base + slot.size;
    for zeros in (0..=width).rev() {
        let mask = (1u64 << zeros) - 1;
        let v = (slot.base + mask) & !mask;
        if v <= high {
            return v;
        }
    }
    slot.base
}

#[derive(Debug, Clone)]
pub struct DualWordCoder {
    config: DualWordConfig,
    stream: ByteStream,
    slots: [Slot; 2],
    next_id: u64,
    /// Encoder words from `slots[0].id` on; `None` while still open.
    pending: VecDeque<Option<u64>>,
    read_pos: usize,
    session_start: usize,
    model: ContextProbabilityModel,
}

impl DualWordCoder {
    pub fn new(contexts: usize, model: ModelConfig, config: DualWordConfig) -> Result<Self> {
        config.validate()?;
        let model = ContextProbabilityModel::new(contexts, model)?;
        debug!(
            "DualWordCoder: {} contexts, {}-bit words, precision {} bits",
            contexts, config.codeword_length, config.precision_bits
        );
        let mut coder = Self {
            config,
            stream: ByteStream::new(),
            slots: [Slot::default(); 2],
            next_id: 0,
            pending: VecDeque::new(),
            read_pos: 0,
            session_start: 0,
            model,
        };
        coder.reset_encoder();
        Ok(coder)
    }

    pub fn config(&self) -> &DualWordConfig {
        &self.config
    }

    fn reset_encoder(&mut self) {
        self.next_id = 0;
        self.pending.clear();
        self.slots[0] = self.open_encoder_slot();
        self.slots[1] = self.open_encoder_slot();
    }

    fn open_encoder_slot(&mut self) -> Slot {
        let id = self.next_id;
        self.next_id += 1;
        self.pending.push_back(None);
        Slot {
            base: 0,
            size: self.config.full_size(),
            id,
            value: 0,
        }
    }

    fn open_decoder_slot(&mut self) -> Slot {
        let id = self.next_id;
        self.next_id += 1;
        let n = self.config.word_bytes();
        let mut buf = [0u8; 8];
        for (i, byte) in buf[..n].iter_mut().enumerate() {
            *byte = self.stream.get_byte(self.read_pos + i).unwrap_or(0);
        }
        self.read_pos += n;
        Slot {
            base: 0,
            size: self.config.full_size(),
            id,
            value: BigEndian::read_uint(&buf[..n], n),
        }
    }

    fn write_word(&mut self, word: u64) {
        let n = self.config.word_bytes();
        let mut buf = [0u8; 8];
        BigEndian::write_uint(&mut buf[..n], word, n);
        for &byte in &buf[..n] {
            self.stream.put_byte(byte);
        }
        trace!("DualWordCoder: word {:#x} flushed", word);
    }

    /// Picks the slot that codes the next bit. Encoder and decoder see the
    /// same slot sizes, so they pick the same slot.
    fn route(&self, prob0: u32) -> usize {
        let primary = &self.slots[0];
        if primary.size >= self.config.min_size || self.next_id - primary.id >= MAX_PENDING_WORDS {
            return 0;
        }
        let p = self.config.precision_bits;
        let (e0, d0) = split_error(primary.size, prob0, p);
        if e0 * 100 <= self.config.tolerance_percent as u128 * d0 {
            return 0;
        }
        let (e1, d1) = split_error(self.slots[1].size, prob0, p);
        if e0 * d1 <= e1 * d0 { 0 } else { 1 }
    }

    /// Retires a collapsed slot. A collapsed primary is replaced by the
    /// secondary; the secondary is always reopened.
    fn retire_encoder_slot(&mut self, which: usize) {
        let slot = self.slots[which];
        let idx = (slot.id - self.slots[0].id) as usize;
        self.pending[idx] = Some(slot.base);
        if which == 0 {
            self.slots[0] = self.slots[1];
        }
        self.slots[1] = self.open_encoder_slot();

        while let Some(Some(word)) = self.pending.front().copied() {
            self.pending.pop_front();
            self.write_word(word);
        }
    }

    fn retire_decoder_slot(&mut self, which: usize) {
        if which == 0 {
            self.slots[0] = self.slots[1];
        }
        self.slots[1] = self.open_decoder_slot();
    }

    fn encode_split(&mut self, bit: bool, prob0: u32) {
        let prob0 = prob0.clamp(1, (1 << self.config.precision_bits) - 1);
        let which = self.route(prob0);
        let slot = &mut self.slots[which];
        let count0 = split(slot.size, prob0, self.config.precision_bits);
        if bit {
            slot.base += count0;
            slot.size -= count0;
        } else {
            slot.size = count0 - 1;
        }
        if slot.size == 0 {
            self.retire_encoder_slot(which);
        }
    }

    fn decode_split(&mut self, prob0: u32) -> bool {
        let prob0 = prob0.clamp(1, (1 << self.config.precision_bits) - 1);
        let which = self.route(prob0);
        let slot = &mut self.slots[which];
        let count0 = split(slot.size, prob0, self.config.precision_bits);
        let bit = slot.value.wrapping_sub(slot.base) >= count0;
        if bit {
            slot.base += count0;
            slot.size -= count0;
        } else {
            slot.size = count0 - 1;
        }
        if slot.size == 0 {
            self.retire_decoder_slot(which);
        }
        bit
    }

    #[inline]
    fn context_probability(&self, context: usize) -> u32 {
        rescale_probability(
            self.model.get_probability(context),
            self.model.config().precision_bits,
            self.config.precision_bits,
        )
    }
}

impl BinaryCoder for DualWordCoder {
    fn precision_bits(&self) -> u32 {
        self.config.precision_bits
    }

    fn encode_bit(&mut self, bit: bool) {
        self.encode_split(bit, 1 << (self.config.precision_bits - 1));
    }

    fn encode_bit_with_probability(&mut self, bit: bool, prob0: u32) {
        self.encode_split(bit, prob0);
    }

    fn encode_bit_with_context(&mut self, bit: bool, context: usize) {
        let prob0 = self.context_probability(context);
        self.encode_split(bit, prob0);
        self.model.update_symbol(bit, context);
    }

    fn decode_bit(&mut self) -> Result<bool> {
        Ok(self.decode_split(1 << (self.config.precision_bits - 1)))
    }

    fn decode_bit_with_probability(&mut self, prob0: u32) -> Result<bool> {
        Ok(self.decode_split(prob0))
    }

    fn decode_bit_with_context(&mut self, context: usize) -> Result<bool> {
        let prob0 = self.context_probability(context);
        let bit = self.decode_split(prob0);
        self.model.update_symbol(bit, context);
        Ok(bit)
    }

    fn terminate(&mut self) {
        let before = self.stream.len();
        let first = self.slots[0].id;
        for slot in self.slots {
            self.pending[(slot.id - first) as usize] =
                Some(cheapest_value(&slot, self.config.codeword_length));
        }
        while let Some(entry) = self.pending.pop_front() {
            self.write_word(entry.unwrap_or(0));
        }

        // Words are read with zero fill past the end.
        let mut end = self.stream.len();
        while end > self.session_start && self.stream.get_byte(end - 1) == Some(0) {
            end -= 1;
        }
        self.stream.truncate(end);

        debug!(
            "DualWordCoder: terminated, {} tail bytes, session {} bytes",
            self.stream.len() as isize - before as isize,
            self.stream.len() - self.session_start
        );
        self.reset_encoder();
    }

    fn restart_encoding(&mut self) {
        self.reset_encoder();
        self.session_start = self.stream.len();
        self.model.reset();
        debug!("DualWordCoder: encoding restarted at byte {}", self.session_start);
    }

    fn restart_decoding(&mut self) -> Result<()> {
        self.model.reset();
        self.pending.clear();
        self.next_id = 0;
        self.read_pos = 0;
        self.slots[0] = self.open_decoder_slot();
        self.slots[1] = self.open_decoder_slot();
        debug!("DualWordCoder: decoding restarted, {} bytes", self.stream.len());
        Ok(())
    }

    fn change_stream(&mut self, stream: ByteStream) -> ByteStream {
        debug!("DualWordCoder: stream swapped ({} bytes in)", stream.len());
        self.session_start = 0;
        std::mem::replace(&mut self.stream, stream)
    }

    fn stream(&self) -> &ByteStream {
        &self.stream
    }

    fn remaining_bytes(&self) -> usize {
        self.pending.len() * self.config.word_bytes()
    }

    fn context_count(&self) -> usize {
        self.model.context_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn coder(config: DualWordConfig) -> DualWordCoder {
        DualWordCoder::new(4, ModelConfig::default(), config).unwrap()
    }

    fn round_trip(config: DualWordConfig, bits: &[bool], probs: &[u32]) -> ByteStream {
        let mut enc = coder(config);
        enc.restart_encoding();
        for (&bit, &p) in bits.iter().zip(probs) {
            enc.encode_bit_with_probability(bit, p);
        }
        enc.terminate();
        let stream = enc.change_stream(ByteStream::new());

        let mut dec = coder(config);
        dec.change_stream(stream.clone());
        dec.restart_decoding().unwrap();
        for (i, &p) in probs.iter().enumerate() {
            assert_eq!(dec.decode_bit_with_probability(p).unwrap(), bits[i], "bit {}", i);
        }
        stream
    }

    #[test]
    fn test_split_keeps_both_outcomes() {
        assert_eq!(split(1, 1, 15), 1);
        assert_eq!(split(1, (1 << 15) - 1, 15), 1);
        assert_eq!(split(0xFFFF, 1 << 14, 15), 0x8000);
        assert_eq!(split(9, (1 << 15) - 1, 15), 9);
    }

    #[test]
    fn test_cheapest_value() {
        let slot = Slot { base: 0x1234, size: 0x0F00, ..Slot::default() };
        assert_eq!(cheapest_value(&slot, 16), 0x2000);
        let untouched = Slot { base: 0, size: 0xFFFF, ..Slot::default() };
        assert_eq!(cheapest_value(&untouched, 16), 0);
    }

    #[test]
    fn test_round_trip_random() {
        let mut rng = StdRng::seed_from_u64(1234);
        for len in [1usize, 5, 64, 1000, 6000] {
            let probs: Vec<u32> = (0..len).map(|_| rng.random_range(1..1 << 15)).collect();
            let bits: Vec<bool> = probs
                .iter()
                .map(|&p| rng.random_range(0..1u32 << 15) >= p)
                .collect();
            round_trip(DualWordConfig::default(), &bits, &probs);
        }
    }

    #[test]
    fn test_round_trip_other_word_lengths() {
        let mut rng = StdRng::seed_from_u64(77);
        for codeword_length in [8, 24, 32] {
            let config = DualWordConfig { codeword_length, ..DualWordConfig::default() };
            let probs: Vec<u32> = (0..2000).map(|_| rng.random_range(1..1 << 15)).collect();
            let bits: Vec<bool> = (0..2000).map(|_| rng.random_bool(0.4)).collect();
            round_trip(config, &bits, &probs);
        }
    }

    #[test]
    fn test_skewed_source_uses_secondary_slot() {
        // A small primary interval cannot express 1/1000, so those bits go
        // to the secondary slot.
        let bits: Vec<bool> = (0..20_000).map(|i| i % 1000 == 999).collect();
        let probs = vec![(1 << 15) - 32; bits.len()];
        let stream = round_trip(DualWordConfig::default(), &bits, &probs);
        assert!(stream.len() < bits.len() / 8 / 4, "{} bytes", stream.len());
    }

    #[test]
    fn test_remaining_bytes_tracks_pending_words() {
        let mut enc = coder(DualWordConfig::default());
        enc.restart_encoding();
        assert_eq!(enc.remaining_bytes(), 4);
        for _ in 0..100 {
            enc.encode_bit(true);
            assert_eq!(enc.remaining_bytes() % 2, 0);
            assert!(enc.remaining_bytes() >= 4);
            assert!(enc.remaining_bytes() <= MAX_PENDING_WORDS as usize * 2 + 2);
        }
        let before = enc.stream().len();
        let bound = enc.remaining_bytes();
        enc.terminate();
        assert!(enc.stream().len() - before <= bound);
    }

    #[test]
    fn test_empty_session_is_empty() {
        let mut enc = coder(DualWordConfig::default());
        enc.restart_encoding();
        enc.terminate();
        assert!(enc.stream().is_empty());
    }

    #[test]
    fn test_context_round_trip() {
        let bits: Vec<bool> = (0..4000).map(|i| i % 16 == 0).collect();
        let mut enc = coder(DualWordConfig::default());
        enc.restart_encoding();
        for &bit in &bits {
            enc.encode_bit_with_context(bit, 2);
        }
        enc.terminate();
        let stream = enc.change_stream(ByteStream::new());
        assert!(stream.len() < bits.len() / 8 / 2, "{} bytes", stream.len());

        let mut dec = coder(DualWordConfig::default());
        dec.change_stream(stream);
        dec.restart_decoding().unwrap();
        for &bit in &bits {
            assert_eq!(dec.decode_bit_with_context(2).unwrap(), bit);
        }
    }

    #[test]
    fn test_rejects_bad_configuration() {
        for config in [
            DualWordConfig { codeword_length: 12, ..DualWordConfig::default() },
            DualWordConfig { codeword_length: 0, ..DualWordConfig::default() },
            DualWordConfig { precision_bits: 0, ..DualWordConfig::default() },
            DualWordConfig { precision_bits: 17, ..DualWordConfig::default() },
            DualWordConfig { tolerance_percent: 101, ..DualWordConfig::default() },
        ] {
            assert!(matches!(
                DualWordCoder::new(1, ModelConfig::default(), config),
                Err(CodecError::Configuration(_))
            ));
        }
    }
}
