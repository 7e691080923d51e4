// src/encode/range_coder.rs

//! Multiplicative interval coder with MQ-style byte transfer.
//!
//! The encoder keeps a 16-bit range `A` and a 28-bit code register `C`:
//!
//! ```text
//!  bit 27     26 .. 19      18 .. 16    15 .. 0
//! [carry] [ next byte ] [ spacer ] [ fraction ]
//! ```
//!
//! Output goes through a one-byte delay `T` so a carry can still be added to
//! it. A transferred `0xFF` makes the following byte carry only seven bits,
//! so the stream never contains `0xFF` followed by a byte above `0x8F`; the
//! decoder treats such a pair as corruption. Decoding past the end of the
//! stream reads `1` bits, which is what `terminate` relies on to drop every
//! byte that is not needed.

use crate::encode::coder::{BinaryCoder, rescale_probability};
use crate::iff::byte_stream::ByteStream;
use crate::model::probability::{ContextProbabilityModel, ModelConfig};
use crate::utils::error::{CodecError, Result};
use log::debug;

/// Probabilities handed to this coder are scaled by `2^16`.
pub const PRECISION_BITS: u32 = 16;

const HALF: u32 = 0x8000;
const CARRY: u32 = 0x800_0000;
// Worst case: the pending byte plus two more.
const MAX_TERMINATION_BYTES: usize = 3;

/// Encoder registers. Kept `Copy` so termination can try candidates on a
/// scratch copy.
#[derive(Debug, Clone, Copy)]
struct Registers {
    a: u32,
    c: u32,
    /// Shifts left before the next transfer.
    t: u32,
    /// Pending output byte; carries can still reach it.
    pending: u8,
    /// `pending` is a real byte rather than the placeholder in front of the
    /// first one.
    primed: bool,
    /// The last byte moved to the stream was `0xFF`.
    stuffed: bool,
}

impl Registers {
    fn new() -> Self {
        Self {
            a: HALF,
            c: 0,
            t: 12,
            pending: 0,
            primed: false,
            stuffed: false,
        }
    }

    /// Resolves the carry into the pending byte, moves it out and loads the
    /// next one from `C`. Returns the byte to append, if it is a real one.
    fn transfer(&mut self) -> Option<u8> {
        if self.pending != 0xFF && self.c >= CARRY {
            self.pending += 1;
            self.c &= CARRY - 1;
        }
        let out = self.primed.then_some(self.pending);
        if self.pending == 0xFF {
            self.pending = (self.c >> 20) as u8;
            self.c &= 0xF_FFFF;
            self.t = 7;
        } else {
            self.pending = (self.c >> 19) as u8;
            self.c &= 0x7_FFFF;
            self.t = 8;
        }
        self.stuffed = out == Some(0xFF);
        self.primed = true;
        out
    }

    /// Lower bound of the interval, with the pending byte included, in units
    /// of the lowest bit of `C`.
    fn low(&self) -> u128 {
        ((self.pending as u128) << (27 - self.t)) + self.c as u128
    }

    /// Value read by a decoder when nothing past the bytes already moved out
    /// is present: all ones from the pending byte's first bit.
    fn fill_value(&self) -> u128 {
        let unit = 1u128 << (27 - self.t);
        match (self.primed, self.stuffed) {
            (false, _) => unit,
            (true, true) => unit << 7,
            (true, false) => unit << 8,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct DecoderRegisters {
    a: u32,
    c: u32,
    ct: u32,
    /// Position of the byte most recently loaded into `C`.
    pos: usize,
}

/// Splits `a` into the subrange assigned to a zero bit.
#[inline]
fn split(a: u32, prob0: u32) -> u32 {
    let p = prob0.clamp(1, (1 << PRECISION_BITS) - 1);
    ((a * p) >> PRECISION_BITS).clamp(1, a - 1)
}

/// JPEG2000-style range coder with an external windowed probability model.
#[derive(Debug, Clone)]
pub struct RangeCoder {
    stream: ByteStream,
    enc: Registers,
    dec: DecoderRegisters,
    session_start: usize,
    model: ContextProbabilityModel,
}

impl RangeCoder {
    pub fn new(contexts: usize, config: ModelConfig) -> Result<Self> {
        let model = ContextProbabilityModel::new(contexts, config)?;
        debug!(
            "RangeCoder: {} contexts, model precision {} bits, {:?}",
            contexts, config.precision_bits, config.strategy
        );
        Ok(Self {
            stream: ByteStream::new(),
            enc: Registers::new(),
            dec: DecoderRegisters::default(),
            session_start: 0,
            model,
        })
    }

    pub fn model(&self) -> &ContextProbabilityModel {
        &self.model
    }

    #[inline]
    fn context_probability(&self, context: usize) -> u32 {
        rescale_probability(
            self.model.get_probability(context),
            self.model.config().precision_bits,
            PRECISION_BITS,
        )
    }

    #[inline]
    fn byte_out(&mut self) {
        if let Some(byte) = self.enc.transfer() {
            self.stream.put_byte(byte);
        }
    }

    fn encode_split(&mut self, bit: bool, prob0: u32) {
        let a0 = split(self.enc.a, prob0);
        if bit {
            self.enc.c += a0;
            self.enc.a -= a0;
        } else {
            self.enc.a = a0;
        }
        while self.enc.a < HALF {
            self.enc.a <<= 1;
            self.enc.c <<= 1;
            self.enc.t -= 1;
            if self.enc.t == 0 {
                self.byte_out();
            }
        }
    }

    /// Loads the next byte into `C`. Past the end every byte reads as `0xFF`
    /// without advancing.
    fn byte_in(&mut self) -> Result<()> {
        let d = &mut self.dec;
        match self.stream.get_byte(d.pos) {
            None => {
                d.c = d.c.wrapping_add(0xFF00);
                d.ct = 8;
            }
            Some(0xFF) => match self.stream.get_byte(d.pos + 1) {
                None => {
                    d.c = d.c.wrapping_add(0xFF00);
                    d.ct = 8;
                }
                Some(next) if next > 0x8F => {
                    return Err(CodecError::StreamCorrupted { position: d.pos });
                }
                Some(next) => {
                    d.pos += 1;
                    d.c = d.c.wrapping_add((next as u32) << 9);
                    d.ct = 7;
                }
            },
            Some(_) => {
                d.pos += 1;
                let next = self.stream.get_byte(d.pos).unwrap_or(0xFF);
                d.c = d.c.wrapping_add((next as u32) << 8);
                d.ct = 8;
            }
        }
        Ok(())
    }

    fn decode_split(&mut self, prob0: u32) -> Result<bool> {
        let a0 = split(self.dec.a, prob0);
        let bit = if (self.dec.c >> 16) < a0 {
            self.dec.a = a0;
            false
        } else {
            self.dec.c = self.dec.c.wrapping_sub(a0 << 16);
            self.dec.a -= a0;
            true
        };
        while self.dec.a < HALF {
            if self.dec.ct == 0 {
                self.byte_in()?;
            }
            self.dec.a <<= 1;
            self.dec.c <<= 1;
            self.dec.ct -= 1;
        }
        Ok(bit)
    }

    /// Finds the fewest extra bytes whose all-ones continuation lies in
    /// `(low, low + A]`, in the coordinates of the current registers.
    fn shortest_tail(&self) -> Vec<u8> {
        let low = self.enc.low();
        let high = low + self.enc.a as u128;

        let fill = self.enc.fill_value();
        if low < fill && fill <= high {
            return Vec::new();
        }

        let mut sim = self.enc;
        let mut bytes = Vec::with_capacity(MAX_TERMINATION_BYTES);
        let mut shift = 0u32;
        for _ in 0..8 {
            shift += sim.t;
            sim.c <<= sim.t;
            if let Some(byte) = sim.transfer() {
                bytes.push(byte);
            }
            let low_s = low << shift;
            let high_s = high << shift;
            let prefix = low_s - sim.low();
            let candidate = prefix + (1u128 << 27);
            if low_s < candidate && candidate <= high_s {
                return bytes;
            }
        }
        debug_assert!(false, "termination search did not converge");
        bytes
    }

    /// Drops trailing bytes that read the same as the all-ones fill.
    fn trim_fill_bytes(&mut self) {
        let slice = self.stream.as_slice();
        let mut end = slice.len();
        loop {
            let tail = &slice[self.session_start..end];
            if tail.ends_with(&[0xFF, 0x7F]) {
                end -= 2;
            } else if tail.ends_with(&[0xFF]) {
                end -= 1;
            } else {
                break;
            }
        }
        self.stream.truncate(end);
    }
}

impl BinaryCoder for RangeCoder {
    fn precision_bits(&self) -> u32 {
        PRECISION_BITS
    }

    fn encode_bit(&mut self, bit: bool) {
        self.encode_split(bit, HALF);
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
        self.decode_split(HALF)
    }

    fn decode_bit_with_probability(&mut self, prob0: u32) -> Result<bool> {
        self.decode_split(prob0)
    }

    fn decode_bit_with_context(&mut self, context: usize) -> Result<bool> {
        let prob0 = self.context_probability(context);
        let bit = self.decode_split(prob0)?;
        self.model.update_symbol(bit, context);
        Ok(bit)
    }

    fn terminate(&mut self) {
        let before = self.stream.len();
        for byte in self.shortest_tail() {
            self.stream.put_byte(byte);
        }
        self.trim_fill_bytes();
        debug!(
            "RangeCoder: terminated, {} tail bytes, session {} bytes",
            self.stream.len() as isize - before as isize,
            self.stream.len() - self.session_start
        );
        self.enc = Registers::new();
    }

    fn restart_encoding(&mut self) {
        self.enc = Registers::new();
        self.session_start = self.stream.len();
        self.model.reset();
        debug!("RangeCoder: encoding restarted at byte {}", self.session_start);
    }

    fn restart_decoding(&mut self) -> Result<()> {
        self.model.reset();
        self.dec = DecoderRegisters {
            a: HALF,
            c: (self.stream.get_byte(0).unwrap_or(0xFF) as u32) << 16,
            ct: 0,
            pos: 0,
        };
        self.byte_in()?;
        self.dec.c <<= 7;
        self.dec.ct -= 7;
        debug!("RangeCoder: decoding restarted, {} bytes", self.stream.len());
        Ok(())
    }

    fn change_stream(&mut self, stream: ByteStream) -> ByteStream {
        debug!("RangeCoder: stream swapped ({} bytes in)", stream.len());
        self.session_start = 0;
        std::mem::replace(&mut self.stream, stream)
    }

    fn stream(&self) -> &ByteStream {
        &self.stream
    }

    fn remaining_bytes(&self) -> usize {
        MAX_TERMINATION_BYTES
    }

    fn context_count(&self) -> usize {
        self.model.context_count()
    }
}
