//! # CCSDS Entropy Coding Library
//!
//! Binary arithmetic coders and the context modeling that drives them, for
//! lossless compression of multispectral sample data.
//!
//! This library is organized into several modules:
//! - `utils`: Error handling
//! - `iff`: The byte stream coders write to and read from
//! - `encode`: The three binary coders and the bitplane pass
//! - `model`: Adaptive probabilities, context ids, sample grids and symbol decomposition

// Re-export commonly used types at the crate root
pub use utils::error::{CodecError, Result};

// Core modules
pub mod utils {
    pub mod error;
}

pub mod iff {
    pub mod byte_stream;
}

pub mod encode {
    pub mod bitplane;
    pub mod coder;
    pub mod dual_word_coder;
    pub mod range_coder;
    pub mod state_coder;
}

pub mod model {
    pub mod context;
    pub mod probability;
    pub mod sample_grid;
    pub mod symbol;
}

// Public API exports
pub use crate::encode::bitplane::BitplaneCoder;
pub use crate::encode::coder::{AnyCoder, BinaryCoder, CoderKind};
pub use crate::encode::dual_word_coder::{DualWordCoder, DualWordConfig};
pub use crate::encode::range_coder::RangeCoder;
pub use crate::encode::state_coder::StateCoder;
pub use crate::iff::byte_stream::ByteStream;
pub use crate::model::context::{ContextIndexer, VARIANT_COUNT};
pub use crate::model::probability::{ContextProbabilityModel, ModelConfig, ProbabilityStrategy};
pub use crate::model::sample_grid::SampleGrid;
pub use crate::model::symbol::{FrequencyTable, SymbolBitDecomposer};

// Constants
pub const CODEC_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initializes the library. Coders carry no global state, so this only
/// checks that the default configurations are consistent.
pub fn init() -> Result<()> {
    ModelConfig::default().validate()?;
    DualWordConfig::default().validate()
}

/// Initializes the logging system.
///
/// The library only emits through the `log` facade; the binary embedding it
/// picks the logger.
pub fn init_logging() -> Result<()> {
    log::debug!("ccsds_entropy {} logging through the log facade", CODEC_VERSION);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init() {
        assert!(init().is_ok());
        assert!(init_logging().is_ok());
    }

    #[test]
    fn test_version() {
        assert_eq!(CODEC_VERSION, "0.9.0");
    }

    #[test]
    fn test_root_exports() {
        let coder = AnyCoder::new(
            CoderKind::Range,
            BitplaneCoder::new(3).unwrap().context_count(),
            ModelConfig::default(),
            DualWordConfig::default(),
        )
        .unwrap();
        assert_eq!(coder.context_count(), 4);
    }
}
