// src/encode/coder.rs

//! The bit-level coding contract shared by every coder variant.

use crate::encode::dual_word_coder::{DualWordCoder, DualWordConfig};
use crate::encode::range_coder::RangeCoder;
use crate::encode::state_coder::StateCoder;
use crate::iff::byte_stream::ByteStream;
use crate::model::probability::{ModelConfig, clamp_probability};
use crate::utils::error::Result;

/// A binary arithmetic coder.
///
/// A session is `restart_encoding`, any number of `encode_*` calls, then
/// `terminate`; or `restart_decoding` followed by the matching `decode_*`
/// calls in the same order. Probabilities are `P(bit == 0)` scaled by
/// `2^precision_bits()`; values at or past the extremes are clamped.
pub trait BinaryCoder {
    fn precision_bits(&self) -> u32;

    /// Codes a bit with probability one half.
    fn encode_bit(&mut self, bit: bool);
    fn encode_bit_with_probability(&mut self, bit: bool, prob0: u32);
    /// Codes a bit against the adaptive state of `context` and updates it.
    fn encode_bit_with_context(&mut self, bit: bool, context: usize);

    fn decode_bit(&mut self) -> Result<bool>;
    fn decode_bit_with_probability(&mut self, prob0: u32) -> Result<bool>;
    fn decode_bit_with_context(&mut self, context: usize) -> Result<bool>;

    /// Flushes the session so that the stream decodes to every coded bit.
    fn terminate(&mut self);
    /// Resets registers and adaptive state; following output is appended.
    fn restart_encoding(&mut self);
    /// Resets registers and adaptive state and primes the decoder from the
    /// beginning of the current stream.
    fn restart_decoding(&mut self) -> Result<()>;

    /// Installs `stream` and hands back the previous one.
    fn change_stream(&mut self, stream: ByteStream) -> ByteStream;
    fn stream(&self) -> &ByteStream;

    /// Upper bound on the bytes `terminate` would still append.
    fn remaining_bytes(&self) -> usize;
    fn context_count(&self) -> usize;
}

/// Selects the coder variant at construction time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoderKind {
    Range,
    State,
    DualWord,
}

impl CoderKind {
    pub const ALL: [CoderKind; 3] = [CoderKind::Range, CoderKind::State, CoderKind::DualWord];
}

/// Moves a probability between two precisions, keeping it inside
/// `[1, 2^to - 1]`.
#[inline]
pub(crate) fn rescale_probability(prob: u32, from_bits: u32, to_bits: u32) -> u32 {
    let raw = if to_bits >= from_bits {
        (prob as u64) << (to_bits - from_bits)
    } else {
        (prob as u64) >> (from_bits - to_bits)
    };
    clamp_probability(raw, to_bits)
}

/// One of the three coders, chosen at runtime.
#[derive(Debug, Clone)]
pub enum AnyCoder {
    Range(RangeCoder),
    State(StateCoder),
    DualWord(DualWordCoder),
}

impl AnyCoder {
    /// Builds a coder with `contexts` adaptive contexts. `model` sizes the
    /// probability model of the range and dual word coders, `dual` configures
    /// the dual word coder.
    pub fn new(
        kind: CoderKind,
        contexts: usize,
        model: ModelConfig,
        dual: DualWordConfig,
    ) -> Result<Self> {
        Ok(match kind {
            CoderKind::Range => AnyCoder::Range(RangeCoder::new(contexts, model)?),
            CoderKind::State => AnyCoder::State(StateCoder::new(contexts)?),
            CoderKind::DualWord => AnyCoder::DualWord(DualWordCoder::new(contexts, model, dual)?),
        })
    }

    pub fn kind(&self) -> CoderKind {
        match self {
            AnyCoder::Range(_) => CoderKind::Range,
            AnyCoder::State(_) => CoderKind::State,
            AnyCoder::DualWord(_) => CoderKind::DualWord,
        }
    }
}

macro_rules! dispatch {
    ($self:ident, $c:ident => $body:expr) => {
        match $self {
            AnyCoder::Range($c) => $body,
            AnyCoder::State($c) => $body,
            AnyCoder::DualWord($c) => $body,
        }
    };
}

impl BinaryCoder for AnyCoder {
    fn precision_bits(&self) -> u32 {
        dispatch!(self, c => c.precision_bits())
    }

    fn encode_bit(&mut self, bit: bool) {
        dispatch!(self, c => c.encode_bit(bit))
    }

    fn encode_bit_with_probability(&mut self, bit: bool, prob0: u32) {
        dispatch!(self, c => c.encode_bit_with_probability(bit, prob0))
    }

    fn encode_bit_with_context(&mut self, bit: bool, context: usize) {
        dispatch!(self, c => c.encode_bit_with_context(bit, context))
    }

    fn decode_bit(&mut self) -> Result<bool> {
        dispatch!(self, c => c.decode_bit())
    }

    fn decode_bit_with_probability(&mut self, prob0: u32) -> Result<bool> {
        dispatch!(self, c => c.decode_bit_with_probability(prob0))
    }

    fn decode_bit_with_context(&mut self, context: usize) -> Result<bool> {
        dispatch!(self, c => c.decode_bit_with_context(context))
    }

    fn terminate(&mut self) {
        dispatch!(self, c => c.terminate())
    }

    fn restart_encoding(&mut self) {
        dispatch!(self, c => c.restart_encoding())
    }

    fn restart_decoding(&mut self) -> Result<()> {
        dispatch!(self, c => c.restart_decoding())
    }

    fn change_stream(&mut self, stream: ByteStream) -> ByteStream {
        dispatch!(self, c => c.change_stream(stream))
    }

    fn stream(&self) -> &ByteStream {
        dispatch!(self, c => c.stream())
    }

    fn remaining_bytes(&self) -> usize {
        dispatch!(self, c => c.remaining_bytes())
    }

    fn context_count(&self) -> usize {
        dispatch!(self, c => c.context_count())
    }
}
