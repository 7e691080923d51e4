// src/model/context.rs

//! Context ids from causal neighbor significance.
//!
//! A variant is a list of taps, each a `(band, row, column)` offset from the
//! sample being coded, and a flag saying whether the bitplane index is part
//! of the id. A tap is significant at bitplane `b` when the neighbor's
//! magnitude has a 1 at or above `b`. Tap `i` sets bit `i` of the id; taps
//! outside the grid are never significant.
//!
//! Every tap either precedes the current sample in raster order within its
//! band or lies in an earlier band, so the decoder sees the same bits the
//! encoder saw.

use crate::model::sample_grid::SampleGrid;
use crate::utils::error::{CodecError, Result};

/// Samples are 16 bits wide.
pub const MAX_BITPLANES: u32 = 16;
/// Taps of the widest variant; the id bits fit a `u16`.
pub const MAX_TAPS: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tap {
    pub band: isize,
    pub row: isize,
    pub column: isize,
}

const fn tap(band: isize, row: isize, column: isize) -> Tap {
    Tap { band, row, column }
}

const W: Tap = tap(0, 0, -1);
const N: Tap = tap(0, -1, 0);
const NW: Tap = tap(0, -1, -1);
const NE: Tap = tap(0, -1, 1);
const NN: Tap = tap(0, -2, 0);
const WW: Tap = tap(0, 0, -2);
const P1: Tap = tap(-1, 0, 0);
const P2: Tap = tap(-2, 0, 0);
const P1W: Tap = tap(-1, 0, -1);
const P1N: Tap = tap(-1, -1, 0);
const P1E: Tap = tap(-1, 0, 1);
const P1S: Tap = tap(-1, 1, 0);

#[derive(Debug, Clone, Copy)]
struct Variant {
    taps: &'static [Tap],
    with_bitplane: bool,
}

const VARIANTS: [Variant; 14] = [
    Variant { taps: &[], with_bitplane: false },
    Variant { taps: &[], with_bitplane: true },
    Variant { taps: &[W], with_bitplane: false },
    Variant { taps: &[W, N], with_bitplane: false },
    Variant { taps: &[W, N, NW], with_bitplane: false },
    Variant { taps: &[W, N, NW, NE], with_bitplane: false },
    Variant { taps: &[W, N, NW, NE, NN, WW], with_bitplane: false },
    Variant { taps: &[P1], with_bitplane: false },
    Variant { taps: &[W, N, P1], with_bitplane: false },
    Variant { taps: &[W, N, NW, NE, P1], with_bitplane: false },
    Variant { taps: &[W, N, NW, NE, P1, P2], with_bitplane: false },
    Variant { taps: &[W, N, NW, NE], with_bitplane: true },
    Variant { taps: &[W, N, NW, NE, P1], with_bitplane: true },
    Variant {
        taps: &[W, N, NW, NE, NN, WW, P1, P2, P1W, P1N, P1E, P1S],
        with_bitplane: true,
    },
];

/// Number of context-model variants.
pub const VARIANT_COUNT: usize = VARIANTS.len();

fn lookup(variant: usize) -> Result<&'static Variant> {
    VARIANTS.get(variant).ok_or_else(|| {
        CodecError::config(format!(
            "unknown context-model variant {} (expected 0..{})",
            variant, VARIANT_COUNT
        ))
    })
}

/// Number of distinct ids `variant` produces.
pub fn context_count(variant: usize) -> Result<usize> {
    let v = lookup(variant)?;
    let planes = if v.with_bitplane { MAX_BITPLANES as usize } else { 1 };
    Ok(planes << v.taps.len())
}

/// Derives context ids for one variant.
#[derive(Debug, Clone, Copy)]
pub struct ContextIndexer {
    variant: usize,
    taps: &'static [Tap],
    with_bitplane: bool,
}

impl ContextIndexer {
    pub fn new(variant: usize) -> Result<Self> {
        let v = lookup(variant)?;
        Ok(Self {
            variant,
            taps: v.taps,
            with_bitplane: v.with_bitplane,
        })
    }

    pub fn variant(&self) -> usize {
        self.variant
    }

    pub fn taps(&self) -> &'static [Tap] {
        self.taps
    }

    pub fn context_count(&self) -> usize {
        let planes = if self.with_bitplane { MAX_BITPLANES as usize } else { 1 };
        planes << self.taps.len()
    }

    /// Context id of bit `bitplane` of the sample at `(band, row, column)`.
    #[inline]
    pub fn context(
        &self,
        grid: &SampleGrid,
        band: usize,
        row: usize,
        column: usize,
        bitplane: u32,
    ) -> usize {
        debug_assert!(bitplane < MAX_BITPLANES);
        let mut bits: u16 = 0;
        for (i, t) in self.taps.iter().enumerate() {
            let neighbor = band.checked_add_signed(t.band).and_then(|b| {
                let r = row.checked_add_signed(t.row)?;
                let c = column.checked_add_signed(t.column)?;
                grid.get(b, r, c)
            });
            if neighbor.is_some_and(|m| m >> bitplane != 0) {
                bits |= 1 << i;
            }
        }
        if self.with_bitplane {
            ((bitplane as usize) << self.taps.len()) | bits as usize
        } else {
            bits as usize
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_context_counts() {
        let expected = [1, 16, 2, 4, 8, 16, 64, 2, 8, 32, 64, 256, 512, 65536];
        for (variant, &count) in expected.iter().enumerate() {
            assert_eq!(context_count(variant).unwrap(), count, "variant {}", variant);
            assert_eq!(ContextIndexer::new(variant).unwrap().context_count(), count);
        }
        assert!(VARIANTS.iter().all(|v| v.taps.len() <= MAX_TAPS));
    }

    #[test]
    fn test_unknown_variant() {
        assert!(matches!(context_count(14), Err(CodecError::Configuration(_))));
        assert!(ContextIndexer::new(99).is_err());
    }

    #[test]
    fn test_taps_are_causal() {
        for v in VARIANTS.iter() {
            for t in v.taps {
                let earlier_band = t.band < 0;
                let earlier_row = t.band == 0 && t.row < 0;
                let earlier_column = t.band == 0 && t.row == 0 && t.column < 0;
                assert!(earlier_band || earlier_row || earlier_column, "{:?}", t);
            }
        }
    }

    /// Builds, for every tap subset and bitplane, a grid in which exactly
    /// that subset is significant around an interior sample, and checks
    /// that every id appears exactly once.
    #[test]
    fn test_every_context_is_reachable() {
        let (band, row, column) = (2usize, 2usize, 2usize);
        for variant in 0..VARIANT_COUNT {
            let indexer = ContextIndexer::new(variant).unwrap();
            let taps = indexer.taps();
            let planes = if indexer.with_bitplane { MAX_BITPLANES } else { 1 };
            let mut seen = HashSet::new();
            for plane in 0..planes {
                for mask in 0u32..(1 << taps.len()) {
                    let mut grid = SampleGrid::new(3, 4, 4);
                    for (i, t) in taps.iter().enumerate() {
                        if mask & (1 << i) != 0 {
                            grid.set(
                                (band as isize + t.band) as usize,
                                (row as isize + t.row) as usize,
                                (column as isize + t.column) as usize,
                                1 << plane,
                            )
                            .unwrap();
                        }
                    }
                    let id = indexer.context(&grid, band, row, column, plane);
                    assert!(id < indexer.context_count());
                    assert!(seen.insert(id), "variant {} repeats id {}", variant, id);
                }
            }
            assert_eq!(seen.len(), indexer.context_count(), "variant {}", variant);
        }
    }

    #[test]
    fn test_out_of_grid_taps_are_insignificant() {
        let grid = SampleGrid::from_samples(2, 3, 3, vec![0xFFFF; 18]).unwrap();
        let full = ContextIndexer::new(13).unwrap();

        // Band 0, top-left corner: nothing exists around it.
        assert_eq!(full.context(&grid, 0, 0, 0, 4), 4 << 12);

        // Band 1, top-left corner: only P1, P1E, P1S exist.
        let id = full.context(&grid, 1, 0, 0, 0);
        assert_eq!(id, (1 << 6) | (1 << 10) | (1 << 11));

        // Band 0, last column of row 1: W, N, NW, WW exist; NE and NN do not.
        let id = full.context(&grid, 0, 1, 2, 0);
        assert_eq!(id, 0b0000_0010_0111);
    }

    #[test]
    fn test_significance_depends_on_bitplane() {
        let grid = SampleGrid::from_samples(1, 1, 2, vec![0b0100, 0]).unwrap();
        let west = ContextIndexer::new(2).unwrap();
        assert_eq!(west.context(&grid, 0, 0, 1, 2), 1);
        assert_eq!(west.context(&grid, 0, 0, 1, 1), 1);
        assert_eq!(west.context(&grid, 0, 0, 1, 3), 0);
        assert_eq!(west.context(&grid, 0, 0, 0, 0), 0);
    }
}
