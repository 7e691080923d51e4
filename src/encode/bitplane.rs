// src/encode/bitplane.rs

//! Bitplane coding of a sample grid, one band at a time.
//!
//! For each band, planes are coded from the most significant down and each
//! plane in raster order. Every bit goes through
//! [`BinaryCoder::encode_bit_with_context`] with the id the
//! [`ContextIndexer`] derives from the already coded neighborhood.
//!
//! [`BitplaneCoder::encode_image`] gives every band its own coder and its own
//! stream. The stream of a band starts with its plane count as five
//! equiprobable bits.

use crate::encode::coder::{AnyCoder, BinaryCoder, CoderKind};
use crate::encode::dual_word_coder::DualWordConfig;
use crate::iff::byte_stream::ByteStream;
use crate::model::context::{ContextIndexer, MAX_BITPLANES};
use crate::model::probability::ModelConfig;
use crate::model::sample_grid::SampleGrid;
use crate::utils::error::{CodecError, Result};
use log::{debug, info};

#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// Width of the per-band plane count header.
const PLANE_COUNT_BITS: u32 = 5;

#[derive(Debug, Clone, Copy)]
pub struct BitplaneCoder {
    indexer: ContextIndexer,
    dual_word: DualWordConfig,
}

impl BitplaneCoder {
    pub fn new(variant: usize) -> Result<Self> {
        Ok(Self {
            indexer: ContextIndexer::new(variant)?,
            dual_word: DualWordConfig::default(),
        })
    }

    /// Overrides the configuration used when images are coded with
    /// [`CoderKind::DualWord`].
    pub fn with_dual_word_config(mut self, config: DualWordConfig) -> Result<Self> {
        config.validate()?;
        self.dual_word = config;
        Ok(self)
    }

    pub fn indexer(&self) -> &ContextIndexer {
        &self.indexer
    }

    /// Contexts a coder driven by this pass must provide.
    pub fn context_count(&self) -> usize {
        self.indexer.context_count()
    }

    fn check_band(grid: &SampleGrid, band: usize, bitplanes: u32) -> Result<()> {
        if band >= grid.bands() {
            return Err(CodecError::SampleOutOfRange {
                band,
                row: 0,
                column: 0,
            });
        }
        if bitplanes > MAX_BITPLANES {
            return Err(CodecError::config(format!(
                "{} bitplanes requested, samples have {}",
                bitplanes, MAX_BITPLANES
            )));
        }
        Ok(())
    }

    /// Codes planes `bitplanes - 1` down to 0 of `band`.
    pub fn encode_band<C: BinaryCoder + ?Sized>(
        &self,
        grid: &SampleGrid,
        band: usize,
        bitplanes: u32,
        coder: &mut C,
    ) -> Result<()> {
        Self::check_band(grid, band, bitplanes)?;
        debug_assert!(coder.context_count() >= self.context_count());

        let samples = grid.band_slice(band).unwrap_or(&[]);
        let columns = grid.columns();
        for plane in (0..bitplanes).rev() {
            for row in 0..grid.rows() {
                for column in 0..columns {
                    let bit = (samples[row * columns + column] >> plane) & 1 != 0;
                    let context = self.indexer.context(grid, band, row, column, plane);
                    coder.encode_bit_with_context(bit, context);
                }
            }
        }
        Ok(())
    }

    /// Decodes planes `bitplanes - 1` down to 0 of `band` into `grid`. The
    /// band is cleared first; earlier bands must already be decoded.
    pub fn decode_band<C: BinaryCoder + ?Sized>(
        &self,
        grid: &mut SampleGrid,
        band: usize,
        bitplanes: u32,
        coder: &mut C,
    ) -> Result<()> {
        Self::check_band(grid, band, bitplanes)?;
        debug_assert!(coder.context_count() >= self.context_count());

        grid.clear_band(band);
        for plane in (0..bitplanes).rev() {
            for row in 0..grid.rows() {
                for column in 0..grid.columns() {
                    let context = self.indexer.context(grid, band, row, column, plane);
                    if coder.decode_bit_with_context(context)? {
                        grid.set_bit(band, row, column, plane)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn build_coder(&self, kind: CoderKind, model: ModelConfig) -> Result<AnyCoder> {
        AnyCoder::new(kind, self.context_count(), model, self.dual_word)
    }

    fn encode_band_stream(
        &self,
        grid: &SampleGrid,
        band: usize,
        kind: CoderKind,
        model: ModelConfig,
    ) -> Result<ByteStream> {
        let mut coder = self.build_coder(kind, model)?;
        coder.restart_encoding();

        let planes = grid.band_dynamic_range(band);
        for i in (0..PLANE_COUNT_BITS).rev() {
            coder.encode_bit((planes >> i) & 1 != 0);
        }
        self.encode_band(grid, band, planes, &mut coder)?;
        coder.terminate();

        let stream = coder.change_stream(ByteStream::new());
        info!(
            "Band {}: {} planes, {} samples, {} bytes ({:?} coder, variant {})",
            band,
            planes,
            grid.rows() * grid.columns(),
            stream.len(),
            kind,
            self.indexer.variant()
        );
        Ok(stream)
    }

    /// Codes every band of `grid` into its own stream.
    pub fn encode_image(
        &self,
        grid: &SampleGrid,
        kind: CoderKind,
        model: ModelConfig,
    ) -> Result<Vec<ByteStream>> {
        debug!(
            "Encoding {}x{}x{} grid",
            grid.bands(),
            grid.rows(),
            grid.columns()
        );

        #[cfg(feature = "rayon")]
        let streams = (0..grid.bands())
            .into_par_iter()
            .map(|band| self.encode_band_stream(grid, band, kind, model))
            .collect::<Result<Vec<_>>>()?;

        #[cfg(not(feature = "rayon"))]
        let streams = (0..grid.bands())
            .map(|band| self.encode_band_stream(grid, band, kind, model))
            .collect::<Result<Vec<_>>>()?;

        Ok(streams)
    }

    /// Rebuilds a `rows x columns` grid from one stream per band. Bands are
    /// decoded in order because inter-band contexts read earlier bands.
    pub fn decode_image(
        &self,
        streams: Vec<ByteStream>,
        rows: usize,
        columns: usize,
        kind: CoderKind,
        model: ModelConfig,
    ) -> Result<SampleGrid> {
        let mut grid = SampleGrid::new(streams.len(), rows, columns);
        let mut coder = self.build_coder(kind, model)?;
        for (band, stream) in streams.into_iter().enumerate() {
            coder.change_stream(stream);
            coder.restart_decoding()?;

            let mut planes = 0u32;
            for _ in 0..PLANE_COUNT_BITS {
                planes = (planes << 1) | coder.decode_bit()? as u32;
            }
            if planes > MAX_BITPLANES {
                return Err(CodecError::config(format!(
                    "band {} declares {} bitplanes",
                    band, planes
                )));
            }
            self.decode_band(&mut grid, band, planes, &mut coder)?;
            debug!("Band {}: {} planes decoded", band, planes);
        }
        Ok(grid)
    }
}
