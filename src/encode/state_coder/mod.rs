// src/encode/state_coder/mod.rs

//! Table-driven binary arithmetic coder with per-context probability states.
//!
//! Every context carries a state index into a 64-entry probability table and
//! the value of its most probable symbol. The coder needs no external
//! probability model: adaptation is a table lookup after each decision and
//! renormalization after a least-probable decision is a single shift whose
//! width comes from [`table::RENORM_TABLE`].
//!
//! The encoder keeps a 9-bit range and a 32-bit low register. Completed
//! bytes are delayed while they equal `0xFF` so that a late carry can still
//! ripple into them.

pub mod table;

use crate::encode::coder::BinaryCoder;
use crate::iff::byte_stream::ByteStream;
use crate::utils::error::{CodecError, Result};
use log::debug;
use table::{
    LPS_TABLE, NEXT_STATE_LPS, NEXT_STATE_MPS, RENORM_TABLE, STATE_COUNT, STATE_THRESHOLDS,
};

/// Scale of the probabilities accepted by the probability entry points.
pub const PRECISION_BITS: u32 = 15;

/// Adaptive state of one context.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContextState {
    pub state: u8,
    pub mps: bool,
}

impl ContextState {
    /// Decodes a signed state code, see [`quantize_probability`].
    pub fn from_code(code: i32) -> Self {
        let state = (code.unsigned_abs().saturating_sub(1) as usize).min(STATE_COUNT - 1);
        Self {
            state: state as u8,
            mps: code > 0,
        }
    }

    #[inline]
    fn lps_width(&self, range: u32) -> u32 {
        LPS_TABLE[self.state as usize][((range >> 6) & 3) as usize] as u32
    }

    #[inline]
    fn after_mps(self) -> Self {
        Self {
            state: NEXT_STATE_MPS[self.state as usize],
            mps: self.mps,
        }
    }

    #[inline]
    fn after_lps(self) -> Self {
        Self {
            state: NEXT_STATE_LPS[self.state as usize],
            mps: if self.state == 0 { !self.mps } else { self.mps },
        }
    }
}

/// Maps `P(bit == 0)`, scaled by `2^precision_bits`, to the nearest state
/// code `±(state + 1)`. A negative code means zero is the most probable
/// symbol. Integer only, so encoder and decoder agree on every host.
pub fn quantize_probability(prob0: u32, precision_bits: u32) -> i32 {
    debug_assert!(precision_bits <= 32);
    let one = 1u64 << precision_bits;
    let p0 = (prob0 as u64).clamp(1, one - 1);
    let zero_is_mps = 2 * p0 >= one;
    let lps = if zero_is_mps { one - p0 } else { p0 };

    let scaled = (lps << 32) >> precision_bits;
    let state = STATE_THRESHOLDS
        .iter()
        .take_while(|&&t| scaled <= t as u64)
        .count() as i32;

    if zero_is_mps { -(state + 1) } else { state + 1 }
}

#[derive(Debug, Clone, Copy)]
struct EncoderRegisters {
    low: u32,
    range: u32,
    bits_left: i32,
    buffered_byte: u32,
    num_buffered: u32,
}

impl EncoderRegisters {
    fn new() -> Self {
        Self {
            low: 0,
            range: 510,
            bits_left: 23,
            buffered_byte: 0xFF,
            num_buffered: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct DecoderRegisters {
    value: u32,
    range: u32,
    bits_needed: i32,
    pos: usize,
}

#[derive(Debug, Clone)]
pub struct StateCoder {
    stream: ByteStream,
    contexts: Vec<ContextState>,
    enc: EncoderRegisters,
    dec: DecoderRegisters,
    session_start: usize,
}

impl StateCoder {
    pub fn new(contexts: usize) -> Result<Self> {
        if contexts == 0 {
            return Err(CodecError::config("a state coder needs at least one context"));
        }
        debug!("StateCoder: {} contexts", contexts);
        Ok(Self {
            stream: ByteStream::new(),
            contexts: vec![ContextState::default(); contexts],
            enc: EncoderRegisters::new(),
            dec: DecoderRegisters::default(),
            session_start: 0,
        })
    }

    pub fn context_state(&self, context: usize) -> ContextState {
        self.contexts[context]
    }

    /// Codes `bit` with the fixed state described by `code`. Nothing adapts.
    pub fn encode_bit_with_state(&mut self, bit: bool, code: i32) {
        self.encode_decision(bit, ContextState::from_code(code));
    }

    pub fn decode_bit_with_state(&mut self, code: i32) -> Result<bool> {
        Ok(self.decode_decision(ContextState::from_code(code)).0)
    }

    fn encode_decision(&mut self, bit: bool, ctx: ContextState) -> ContextState {
        let lps = ctx.lps_width(self.enc.range);
        self.enc.range -= lps;

        let next = if bit != ctx.mps {
            let shift = RENORM_TABLE[(lps >> 3) as usize] as i32;
            self.enc.low = (self.enc.low + self.enc.range) << shift;
            self.enc.range = lps << shift;
            self.enc.bits_left -= shift;
            ctx.after_lps()
        } else {
            if self.enc.range >= 256 {
                return ctx.after_mps();
            }
            self.enc.low <<= 1;
            self.enc.range <<= 1;
            self.enc.bits_left -= 1;
            ctx.after_mps()
        };
        self.test_and_write_out();
        next
    }

    fn encode_bypass(&mut self, bit: bool) {
        self.enc.low <<= 1;
        if bit {
            self.enc.low += self.enc.range;
        }
        self.enc.bits_left -= 1;
        self.test_and_write_out();
    }

    #[inline]
    fn test_and_write_out(&mut self) {
        if self.enc.bits_left < 12 {
            self.write_out();
        }
    }

    fn write_out(&mut self) {
        let e = &mut self.enc;
        let lead = e.low >> (24 - e.bits_left);
        e.bits_left += 8;
        e.low &= 0xFFFF_FFFF >> e.bits_left;

        if lead == 0xFF {
            e.num_buffered += 1;
        } else if e.num_buffered > 0 {
            let carry = lead >> 8;
            let byte = e.buffered_byte + carry;
            e.buffered_byte = lead & 0xFF;
            self.stream.put_byte(byte as u8);
            let run = ((0xFF + carry) & 0xFF) as u8;
            while e.num_buffered > 1 {
                self.stream.put_byte(run);
                e.num_buffered -= 1;
            }
        } else {
            e.num_buffered = 1;
            e.buffered_byte = lead;
        }
    }

    #[inline]
    fn read_byte(&mut self) -> u32 {
        let byte = self.stream.get_byte(self.dec.pos).unwrap_or(0);
        self.dec.pos += 1;
        byte as u32
    }

    fn decode_decision(&mut self, ctx: ContextState) -> (bool, ContextState) {
        let lps = ctx.lps_width(self.dec.range);
        self.dec.range -= lps;
        let scaled = self.dec.range << 7;

        if self.dec.value < scaled {
            if scaled < (256 << 7) {
                self.dec.range = scaled >> 6;
                self.dec.value = self.dec.value.wrapping_add(self.dec.value);
                self.dec.bits_needed += 1;
                if self.dec.bits_needed == 0 {
                    self.dec.bits_needed = -8;
                    let byte = self.read_byte();
                    self.dec.value = self.dec.value.wrapping_add(byte);
                }
            }
            (ctx.mps, ctx.after_mps())
        } else {
            let shift = RENORM_TABLE[(lps >> 3) as usize] as i32;
            self.dec.value = (self.dec.value - scaled) << shift;
            self.dec.range = lps << shift;
            self.dec.bits_needed += shift;
            if self.dec.bits_needed >= 0 {
                let byte = self.read_byte();
                self.dec.value = self.dec.value.wrapping_add(byte << self.dec.bits_needed);
                self.dec.bits_needed -= 8;
            }
            (!ctx.mps, ctx.after_lps())
        }
    }

    fn decode_bypass(&mut self) -> bool {
        self.dec.value = self.dec.value.wrapping_add(self.dec.value);
        self.dec.bits_needed += 1;
        if self.dec.bits_needed >= 0 {
            self.dec.bits_needed = -8;
            let byte = self.read_byte();
            self.dec.value = self.dec.value.wrapping_add(byte);
        }
        let scaled = self.dec.range << 7;
        if self.dec.value >= scaled {
            self.dec.value -= scaled;
            true
        } else {
            false
        }
    }
}

impl BinaryCoder for StateCoder {
    fn precision_bits(&self) -> u32 {
        PRECISION_BITS
    }

    fn encode_bit(&mut self, bit: bool) {
        self.encode_bypass(bit);
    }

    fn encode_bit_with_probability(&mut self, bit: bool, prob0: u32) {
        self.encode_bit_with_state(bit, quantize_probability(prob0, PRECISION_BITS));
    }

    fn encode_bit_with_context(&mut self, bit: bool, context: usize) {
        let next = self.encode_decision(bit, self.contexts[context]);
        self.contexts[context] = next;
    }

    fn decode_bit(&mut self) -> Result<bool> {
        Ok(self.decode_bypass())
    }

    fn decode_bit_with_probability(&mut self, prob0: u32) -> Result<bool> {
        self.decode_bit_with_state(quantize_probability(prob0, PRECISION_BITS))
    }

    fn decode_bit_with_context(&mut self, context: usize) -> Result<bool> {
        let (bit, next) = self.decode_decision(self.contexts[context]);
        self.contexts[context] = next;
        Ok(bit)
    }

    fn terminate(&mut self) {
        let before = self.stream.len();
        let e = &mut self.enc;
        let carry_bit = 32 - e.bits_left;

        // The value of [low, low + range) with the most trailing zeros. Eight
        // always fit since range >= 256.
        let high = e.low + e.range;
        for zeros in (8..=carry_bit).rev() {
            let mask = (1u32 << zeros) - 1;
            let v = (e.low + mask) & !mask;
            if v < high {
                e.low = v;
                break;
            }
        }

        if (e.low >> carry_bit) != 0 {
            self.stream.put_byte((e.buffered_byte + 1) as u8);
            while e.num_buffered > 1 {
                self.stream.put_byte(0x00);
                e.num_buffered -= 1;
            }
            e.low -= 1 << carry_bit;
        } else {
            if e.num_buffered > 0 {
                self.stream.put_byte(e.buffered_byte as u8);
            }
            while e.num_buffered > 1 {
                self.stream.put_byte(0xFF);
                e.num_buffered -= 1;
            }
        }

        let count = (24 - e.bits_left) as u32;
        let bits = (e.low >> 8) & ((1 << count) - 1);
        let aligned = bits << (16 - count);
        self.stream.put_byte((aligned >> 8) as u8);
        if count > 8 {
            self.stream.put_byte(aligned as u8);
        }

        // The decoder reads zeros past the end.
        let mut end = self.stream.len();
        while end > self.session_start && self.stream.get_byte(end - 1) == Some(0) {
            end -= 1;
        }
        self.stream.truncate(end);

        debug!(
            "StateCoder: terminated, {} tail bytes, session {} bytes",
            self.stream.len() as isize - before as isize,
            self.stream.len() - self.session_start
        );
        self.enc = EncoderRegisters::new();
    }

    fn restart_encoding(&mut self) {
        self.enc = EncoderRegisters::new();
        self.contexts.fill(ContextState::default());
        self.session_start = self.stream.len();
        debug!("StateCoder: encoding restarted at byte {}", self.session_start);
    }

    fn restart_decoding(&mut self) -> Result<()> {
        self.contexts.fill(ContextState::default());
        self.dec = DecoderRegisters {
            value: 0,
            range: 510,
            bits_needed: -8,
            pos: 0,
        };
        let hi = self.read_byte();
        let lo = self.read_byte();
        self.dec.value = (hi << 8) | lo;
        debug!("StateCoder: decoding restarted, {} bytes", self.stream.len());
        Ok(())
    }

    fn change_stream(&mut self, stream: ByteStream) -> ByteStream {
        debug!("StateCoder: stream swapped ({} bytes in)", stream.len());
        self.session_start = 0;
        std::mem::replace(&mut self.stream, stream)
    }

    fn stream(&self) -> &ByteStream {
        &self.stream
    }

    fn remaining_bytes(&self) -> usize {
        self.enc.num_buffered as usize + 2
    }

    fn context_count(&self) -> usize {
        self.contexts.len()
    }
}
