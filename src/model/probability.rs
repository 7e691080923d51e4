// src/model/probability.rs

//! Adaptive per-context probability estimation.
//!
//! Every context keeps a windowed count of the bits coded in it. The estimate
//! is `P(bit == 0)` scaled to `2^precision_bits`, and it is only refreshed once
//! per update period so the division is amortized. Counts older than about
//! one window are forgotten: whenever the total reaches two windows, the
//! zeros recorded in the older window are subtracted and the total drops by
//! one window.
//!
//! The division itself can be done three ways, see [`ProbabilityStrategy`].
//! Whatever the strategy, the estimate never reaches `0` or `2^precision_bits`;
//! the coders rely on that to avoid empty subintervals.

use crate::utils::error::{CodecError, Result};

/// Largest lookup table a configuration may ask for, in entries.
pub const MAX_LOOKUP_ENTRIES: u64 = 1 << 24;

/// How a context's counts are turned into a probability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProbabilityStrategy {
    /// Integer division of the windowed counts.
    #[default]
    Exact,
    /// A table indexed by both counts shifted right by `lut_quantizer`.
    Lookup,
    /// Counts are halved when the total reaches the window size; the estimate
    /// is refreshed whenever the total is a power of two, so it is a shift.
    Averaging,
}

/// Parameters shared by the encoder and the decoder of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelConfig {
    pub precision_bits: u32,
    /// `2^k - 1` for `Exact`/`Lookup`. Ignored by `Averaging`.
    pub update_period: u32,
    /// `2^k - 1` for `Exact`/`Lookup`, `2^k` for `Averaging`.
    pub window_size: u32,
    pub strategy: ProbabilityStrategy,
    /// Right shift applied to both counts before the table lookup.
    pub lut_quantizer: u32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            precision_bits: 15,
            update_period: 7,
            window_size: 1023,
            strategy: ProbabilityStrategy::Exact,
            lut_quantizer: 3,
        }
    }
}

impl ModelConfig {
    /// Checks the parameters once, at construction time.
    pub fn validate(&self) -> Result<()> {
        if !(2..=16).contains(&self.precision_bits) {
            return Err(CodecError::config(format!(
                "precision_bits must be in 2..=16, got {}",
                self.precision_bits
            )));
        }
        if self.window_size == 0 {
            return Err(CodecError::config("window_size must be positive"));
        }
        match self.strategy {
            ProbabilityStrategy::Exact | ProbabilityStrategy::Lookup => {
                if self.update_period == 0 || !(self.update_period + 1).is_power_of_two() {
                    return Err(CodecError::config(format!(
                        "update_period must be of the form 2^k - 1, got {}",
                        self.update_period
                    )));
                }
                if !(self.window_size + 1).is_power_of_two() {
                    return Err(CodecError::config(format!(
                        "window_size must be of the form 2^k - 1, got {}",
                        self.window_size
                    )));
                }
                if self.window_size > 1 << 20 {
                    return Err(CodecError::config("window_size above 2^20"));
                }
                // Totals cycle through [window, 2 * window) once warm; a longer
                // period would never refresh the estimate.
                if self.update_period > self.window_size {
                    return Err(CodecError::config(format!(
                        "update_period {} exceeds window_size {}",
                        self.update_period, self.window_size
                    )));
                }
            }
            ProbabilityStrategy::Averaging => {
                if !self.window_size.is_power_of_two() {
                    return Err(CodecError::config(format!(
                        "window_size must be a power of two for averaging, got {}",
                        self.window_size
                    )));
                }
            }
        }
        if self.strategy == ProbabilityStrategy::Lookup {
            if self.lut_quantizer > 15 {
                return Err(CodecError::config(format!(
                    "lut_quantizer must be at most 15, got {}",
                    self.lut_quantizer
                )));
            }
            let stride = self.lookup_stride() as u64;
            if stride * stride > MAX_LOOKUP_ENTRIES {
                return Err(CodecError::config(format!(
                    "lookup table of {} entries exceeds {}; raise lut_quantizer",
                    stride * stride,
                    MAX_LOOKUP_ENTRIES
                )));
            }
        }
        Ok(())
    }

    #[inline]
    pub fn one(&self) -> u32 {
        1 << self.precision_bits
    }

    /// Row length of the lookup table: quantized totals stay below two
    /// windows, the decay fires at exactly `2 * window`.
    fn lookup_stride(&self) -> usize {
        ((2 * self.window_size) >> self.lut_quantizer) as usize + 1
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct ContextStats {
    zeros: u32,
    total: u32,
    window_zeros: u32,
    probability: u32,
}

/// Windowed frequency estimator, one slot per context id.
#[derive(Debug, Clone)]
pub struct ContextProbabilityModel {
    config: ModelConfig,
    stats: Vec<ContextStats>,
    lut: Vec<u16>,
    lut_stride: usize,
}

impl ContextProbabilityModel {
    pub fn new(contexts: usize, config: ModelConfig) -> Result<Self> {
        if contexts == 0 {
            return Err(CodecError::config("a probability model needs at least one context"));
        }
        config.validate()?;

        let (lut, lut_stride) = if config.strategy == ProbabilityStrategy::Lookup {
            build_lookup_table(&config)
        } else {
            (Vec::new(), 0)
        };

        let half = config.one() >> 1;
        let stats = vec![
            ContextStats {
                probability: half,
                ..ContextStats::default()
            };
            contexts
        ];

        Ok(Self {
            config,
            stats,
            lut,
            lut_stride,
        })
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn context_count(&self) -> usize {
        self.stats.len()
    }

    /// Current estimate of `P(bit == 0)` for `context`.
    #[inline]
    pub fn get_probability(&self, context: usize) -> u32 {
        self.stats[context].probability
    }

    /// Records one coded bit. `bit == false` is the expected value.
    #[inline]
    pub fn update_symbol(&mut self, bit: bool, context: usize) {
        match self.config.strategy {
            ProbabilityStrategy::Averaging => self.update_averaging(bit, context),
            _ => self.update_windowed(bit, context),
        }
    }

    /// Forgets every statistic; used when a coder restarts.
    pub fn reset(&mut self) {
        let half = self.config.one() >> 1;
        for s in self.stats.iter_mut() {
            *s = ContextStats {
                probability: half,
                ..ContextStats::default()
            };
        }
    }

    /// `(zeros, total)` as currently held for `context`.
    pub fn counts(&self, context: usize) -> (u32, u32) {
        let s = &self.stats[context];
        (s.zeros, s.total)
    }

    fn update_windowed(&mut self, bit: bool, context: usize) {
        let window = self.config.window_size;
        let period = self.config.update_period;
        let s = &mut self.stats[context];

        if !bit {
            s.zeros += 1;
        }
        s.total += 1;

        if s.total == window {
            s.window_zeros = s.zeros;
        } else if s.total == 2 * window {
            s.zeros -= s.window_zeros;
            s.total -= window;
            s.window_zeros = s.zeros;
        }
        debug_assert!(s.zeros <= s.total);

        if s.total % period == period - 1 {
            let (zeros, total) = (s.zeros, s.total);
            let p = match self.config.strategy {
                ProbabilityStrategy::Lookup => self.lookup(zeros, total),
                _ => exact_probability(zeros, total, self.config.precision_bits),
            };
            self.stats[context].probability = p;
        }
    }

    fn update_averaging(&mut self, bit: bool, context: usize) {
        let window = self.config.window_size;
        let precision = self.config.precision_bits;
        let s = &mut self.stats[context];

        if !bit {
            s.zeros += 1;
        }
        s.total += 1;

        if s.total.is_power_of_two() {
            let shift = s.total.trailing_zeros();
            let raw = ((s.zeros as u64) << precision) >> shift;
            s.probability = clamp_probability(raw, precision);
        }
        if s.total >= window {
            s.zeros >>= 1;
            s.total >>= 1;
        }
    }

    #[inline]
    fn lookup(&self, zeros: u32, total: u32) -> u32 {
        let q = self.config.lut_quantizer;
        let z = (zeros >> q) as usize;
        let t = (total >> q) as usize;
        self.lut[t * self.lut_stride + z] as u32
    }
}

/// Clamps a raw scaled probability into `[1, 2^precision - 1]`.
#[inline]
pub fn clamp_probability(raw: u64, precision_bits: u32) -> u32 {
    let max = (1u64 << precision_bits) - 1;
    raw.clamp(1, max) as u32
}

#[inline]
fn exact_probability(zeros: u32, total: u32, precision_bits: u32) -> u32 {
    if total == 0 {
        return 1 << (precision_bits - 1);
    }
    clamp_probability(((zeros as u64) << precision_bits) / total as u64, precision_bits)
}

fn build_lookup_table(config: &ModelConfig) -> (Vec<u16>, usize) {
    let stride = config.lookup_stride();
    let max_total = (stride - 1) as u32;
    let mut lut = vec![0u16; stride * stride];
    let half = 1u64 << (config.precision_bits - 1);

    for t in 0..=max_total {
        for z in 0..=t {
            let p = if t == 0 {
                half as u32
            } else {
                clamp_probability(((z as u64) << config.precision_bits) / t as u64, config.precision_bits)
            };
            lut[t as usize * stride + z as usize] = p as u16;
        }
    }
    (lut, stride)
}
