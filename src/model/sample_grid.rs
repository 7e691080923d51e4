// src/model/sample_grid.rs

use crate::utils::error::{CodecError, Result};

/// Band-interleaved-by-line magnitudes: `bands x rows x columns` samples,
/// stored band after band in raster order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleGrid {
    bands: usize,
    rows: usize,
    columns: usize,
    samples: Vec<u16>,
}

impl SampleGrid {
    /// A grid of zero samples.
    pub fn new(bands: usize, rows: usize, columns: usize) -> Self {
        Self {
            bands,
            rows,
            columns,
            samples: vec![0; bands * rows * columns],
        }
    }

    pub fn from_samples(
        bands: usize,
        rows: usize,
        columns: usize,
        samples: Vec<u16>,
    ) -> Result<Self> {
        if samples.len() != bands * rows * columns {
            return Err(CodecError::config(format!(
                "{} samples do not fill a {}x{}x{} grid",
                samples.len(),
                bands,
                rows,
                columns
            )));
        }
        Ok(Self {
            bands,
            rows,
            columns,
            samples,
        })
    }

    pub fn bands(&self) -> usize {
        self.bands
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    #[inline]
    fn index(&self, band: usize, row: usize, column: usize) -> Option<usize> {
        (band < self.bands && row < self.rows && column < self.columns)
            .then(|| (band * self.rows + row) * self.columns + column)
    }

    /// The sample at the given position, `None` outside the grid.
    #[inline]
    pub fn get(&self, band: usize, row: usize, column: usize) -> Option<u16> {
        self.index(band, row, column).map(|i| self.samples[i])
    }

    pub fn set(&mut self, band: usize, row: usize, column: usize, value: u16) -> Result<()> {
        let i = self
            .index(band, row, column)
            .ok_or(CodecError::SampleOutOfRange { band, row, column })?;
        self.samples[i] = value;
        Ok(())
    }

    /// Sets bit `bitplane` of a sample; used while decoding plane by plane.
    pub(crate) fn set_bit(
        &mut self,
        band: usize,
        row: usize,
        column: usize,
        bitplane: u32,
    ) -> Result<()> {
        let i = self
            .index(band, row, column)
            .ok_or(CodecError::SampleOutOfRange { band, row, column })?;
        self.samples[i] |= 1 << bitplane;
        Ok(())
    }

    pub fn band_slice(&self, band: usize) -> Option<&[u16]> {
        let plane = self.rows * self.columns;
        (band < self.bands).then(|| &self.samples[band * plane..(band + 1) * plane])
    }

    pub(crate) fn clear_band(&mut self, band: usize) {
        let plane = self.rows * self.columns;
        if band < self.bands {
            self.samples[band * plane..(band + 1) * plane].fill(0);
        }
    }

    pub fn samples(&self) -> &[u16] {
        &self.samples
    }

    /// Number of bitplanes needed for the largest sample of the grid.
    pub fn dynamic_range(&self) -> u32 {
        bit_width(self.samples.iter().copied().max().unwrap_or(0))
    }

    /// Number of bitplanes needed for the largest sample of one band.
    pub fn band_dynamic_range(&self, band: usize) -> u32 {
        self.band_slice(band)
            .and_then(|s| s.iter().copied().max())
            .map_or(0, bit_width)
    }
}

#[inline]
fn bit_width(value: u16) -> u32 {
    u16::BITS - value.leading_zeros()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_and_bounds() {
        let mut grid = SampleGrid::new(2, 3, 4);
        grid.set(1, 2, 3, 77).unwrap();
        assert_eq!(grid.get(1, 2, 3), Some(77));
        assert_eq!(grid.samples()[23], 77);
        assert_eq!(grid.get(2, 0, 0), None);
        assert_eq!(grid.get(0, 3, 0), None);
        assert_eq!(grid.get(0, 0, 4), None);
        assert!(matches!(
            grid.set(0, 0, 4, 1),
            Err(CodecError::SampleOutOfRange { band: 0, row: 0, column: 4 })
        ));
    }

    #[test]
    fn test_from_samples_checks_length() {
        assert!(SampleGrid::from_samples(1, 2, 2, vec![0; 4]).is_ok());
        assert!(matches!(
            SampleGrid::from_samples(1, 2, 2, vec![0; 5]),
            Err(CodecError::Configuration(_))
        ));
    }

    #[test]
    fn test_dynamic_range() {
        let grid = SampleGrid::from_samples(2, 1, 3, vec![0, 1, 2, 0, 0x8000, 5]).unwrap();
        assert_eq!(grid.dynamic_range(), 16);
        assert_eq!(grid.band_dynamic_range(0), 2);
        assert_eq!(grid.band_dynamic_range(1), 16);
        assert_eq!(grid.band_dynamic_range(2), 0);
        assert_eq!(SampleGrid::new(1, 2, 2).dynamic_range(), 0);
    }

    #[test]
    fn test_band_slice_and_bits() {
        let mut grid = SampleGrid::new(2, 2, 2);
        grid.set_bit(1, 0, 1, 3).unwrap();
        grid.set_bit(1, 0, 1, 0).unwrap();
        assert_eq!(grid.band_slice(1), Some(&[0, 9, 0, 0][..]));
        grid.clear_band(1);
        assert_eq!(grid.band_slice(1), Some(&[0, 0, 0, 0][..]));
        assert_eq!(grid.band_slice(2), None);
    }
}
