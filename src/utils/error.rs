use std::io;
use thiserror::Error;

/// Main error type for the entropy-coding core.
#[derive(Error, Debug)]
pub enum CodecError {
    /// The decoder met a marker-like pair (`0xFF` followed by a byte above
    /// `0x8F`) where a data byte was expected.
    #[error("Corrupted stream: marker-like byte pair at position {position}")]
    StreamCorrupted { position: usize },
    /// A construction-time parameter is out of its legal range.
    #[error("Configuration violation: {0}")]
    Configuration(String),
    /// A symbol outside the alphabet of a frequency table was coded.
    #[error("Symbol {symbol} outside alphabet of {count} symbols")]
    SymbolOutOfRange { symbol: u32, count: usize },
    /// A sample write fell outside the grid geometry.
    #[error("Sample position (band {band}, row {row}, column {column}) is outside the grid")]
    SampleOutOfRange {
        band: usize,
        row: usize,
        column: usize,
    },
    /// An I/O error occurred while persisting or loading a stream.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl CodecError {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        CodecError::Configuration(msg.into())
    }
}

/// A specialized `Result` type for coding operations.
pub type Result<T> = std::result::Result<T, CodecError>;
