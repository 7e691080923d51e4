// src/model/symbol.rs

//! Multi-valued symbols as sequences of binary decisions.
//!
//! A symbol of an `N`-letter alphabet is coded as `ceil(log2(N))` bits, most
//! significant first. The probability of each bit comes from the cumulative
//! frequencies of the sub-range of symbols still possible: with the higher
//! bits fixed to `partial`, bit `i` splits `[partial, partial + 2^(i+1))` at
//! its midpoint.

use crate::encode::coder::BinaryCoder;
use crate::model::probability::clamp_probability;
use crate::utils::error::{CodecError, Result};
use log::debug;

/// Adaptive tables stop counting once their total reaches this value.
pub const MAX_ADAPTIVE_TOTAL: u32 = 1 << 24;

/// Cumulative symbol frequencies: `cumulative[s]` is the total frequency
/// of all symbols below `s`, so `cumulative[N]` is the grand total.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrequencyTable {
    cumulative: Vec<u32>,
    adaptive: bool,
}

impl FrequencyTable {
    /// A static table. The sequence must start at 0, never decrease and end
    /// on a power of two.
    pub fn from_cumulative(cumulative: Vec<u32>) -> Result<Self> {
        if cumulative.len() < 2 {
            return Err(CodecError::config("a frequency table needs at least one symbol"));
        }
        if cumulative[0] != 0 {
            return Err(CodecError::config("cumulative frequencies must start at 0"));
        }
        if cumulative.windows(2).any(|w| w[1] < w[0]) {
            return Err(CodecError::config("cumulative frequencies must not decrease"));
        }
        let total = cumulative[cumulative.len() - 1];
        if !total.is_power_of_two() {
            return Err(CodecError::config(format!(
                "frequency total {} is not a power of two",
                total
            )));
        }
        Ok(Self {
            cumulative,
            adaptive: false,
        })
    }

    /// A static table from raw counts, scaled up to the next power of two.
    /// Symbols with a nonzero count keep a nonzero frequency.
    pub fn from_counts(counts: &[u32]) -> Result<Self> {
        let sum: u64 = counts.iter().map(|&c| c as u64).sum();
        if sum == 0 {
            return Err(CodecError::config("frequency counts are all zero"));
        }
        if sum > 1 << 31 {
            return Err(CodecError::config("frequency counts exceed 2^31"));
        }
        let total = sum.next_power_of_two();

        // Scaling by total / sum >= 1 keeps every nonzero count nonzero.
        let mut scaled: Vec<u64> = counts.iter().map(|&c| c as u64 * total / sum).collect();
        let shortfall = total - scaled.iter().sum::<u64>();
        let largest = counts
            .iter()
            .enumerate()
            .max_by_key(|&(i, &c)| (c, usize::MAX - i))
            .map(|(i, _)| i);
        if let Some(largest) = largest {
            scaled[largest] += shortfall;
        }

        let mut cumulative = Vec::with_capacity(counts.len() + 1);
        let mut running = 0u64;
        cumulative.push(0);
        for s in scaled {
            running += s;
            cumulative.push(running as u32);
        }
        Self::from_cumulative(cumulative)
    }

    /// An adaptive table of `symbols` letters, each starting with count 1.
    pub fn adaptive(symbols: usize) -> Result<Self> {
        if symbols == 0 {
            return Err(CodecError::config("a frequency table needs at least one symbol"));
        }
        Ok(Self {
            cumulative: (0..=symbols as u32).collect(),
            adaptive: true,
        })
    }

    pub fn is_adaptive(&self) -> bool {
        self.adaptive
    }

    pub fn symbol_count(&self) -> usize {
        self.cumulative.len() - 1
    }

    pub fn total(&self) -> u32 {
        self.cumulative[self.cumulative.len() - 1]
    }

    /// Frequency of `symbol`, 0 outside the alphabet.
    pub fn frequency(&self, symbol: u32) -> u32 {
        let s = symbol as usize;
        if s < self.symbol_count() {
            self.cumulative[s + 1] - self.cumulative[s]
        } else {
            0
        }
    }

    /// Cumulative frequency below `symbol`, saturating at the total.
    #[inline]
    pub fn cumulative(&self, symbol: u64) -> u32 {
        let last = self.cumulative.len() - 1;
        self.cumulative[(symbol.min(last as u64)) as usize]
    }

    /// Counts one more occurrence of `symbol`. Static tables are left alone.
    pub fn record(&mut self, symbol: u32) {
        if !self.adaptive || self.total() >= MAX_ADAPTIVE_TOTAL {
            return;
        }
        let s = symbol as usize;
        if s >= self.symbol_count() {
            return;
        }
        for c in &mut self.cumulative[s + 1..] {
            *c += 1;
        }
    }
}

/// Codes symbols of one frequency table through any [`BinaryCoder`].
#[derive(Debug, Clone)]
pub struct SymbolBitDecomposer {
    table: FrequencyTable,
    bit_length: u32,
}

impl SymbolBitDecomposer {
    pub fn new(table: FrequencyTable) -> Self {
        let n = table.symbol_count();
        let bit_length = usize::BITS - (n - 1).leading_zeros();
        debug!(
            "SymbolBitDecomposer: {} symbols, {} bits per symbol",
            n, bit_length
        );
        Self { table, bit_length }
    }

    pub fn table(&self) -> &FrequencyTable {
        &self.table
    }

    /// `ceil(log2(symbol_count))`.
    pub fn bit_length(&self) -> u32 {
        self.bit_length
    }

    /// Probability that bit `bit` is 1 given the higher bits in `partial`,
    /// scaled by `2^precision_bits` and kept inside `[1, 2^precision_bits - 1]`.
    pub fn probability_for_bit(&self, partial: u32, bit: u32, precision_bits: u32) -> u32 {
        let lo = partial as u64;
        let mid = lo + (1u64 << bit);
        let hi = lo + (1u64 << (bit + 1));
        let c_lo = self.table.cumulative(lo) as u64;
        let c_mid = self.table.cumulative(mid) as u64;
        let c_hi = self.table.cumulative(hi) as u64;

        let span = c_hi - c_lo;
        if span == 0 {
            return 1 << (precision_bits - 1);
        }
        clamp_probability(((c_hi - c_mid) << precision_bits) / span, precision_bits)
    }

    pub fn encode_symbol<C: BinaryCoder + ?Sized>(
        &mut self,
        coder: &mut C,
        symbol: u32,
    ) -> Result<()> {
        if symbol as usize >= self.table.symbol_count() {
            return Err(CodecError::SymbolOutOfRange {
                symbol,
                count: self.table.symbol_count(),
            });
        }
        let precision = coder.precision_bits();
        let one = 1u32 << precision;
        let mut partial = 0u32;
        for i in (0..self.bit_length).rev() {
            let bit = (symbol >> i) & 1 != 0;
            let p1 = self.probability_for_bit(partial, i, precision);
            coder.encode_bit_with_probability(bit, one - p1);
            if bit {
                partial |= 1 << i;
            }
        }
        self.table.record(symbol);
        Ok(())
    }

    pub fn decode_symbol<C: BinaryCoder + ?Sized>(&mut self, coder: &mut C) -> Result<u32> {
        let precision = coder.precision_bits();
        let one = 1u32 << precision;
        let mut partial = 0u32;
        for i in (0..self.bit_length).rev() {
            let p1 = self.probability_for_bit(partial, i, precision);
            if coder.decode_bit_with_probability(one - p1)? {
                partial |= 1 << i;
            }
        }
        if partial as usize >= self.table.symbol_count() {
            return Err(CodecError::SymbolOutOfRange {
                symbol: partial,
                count: self.table.symbol_count(),
            });
        }
        self.table.record(partial);
        Ok(partial)
    }
}
