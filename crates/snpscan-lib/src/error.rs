//! Library error type.
//!
//! The engine is fail-fast: every variant here is fatal to the run that
//! produced it. There is no retry and no per-record error channel.

use std::path::PathBuf;
use thiserror::Error;

/// Errors produced by the database engine and the scanner.
#[derive(Debug, Error)]
pub enum Error {
    /// Index parameters outside their supported ranges.
    #[error("unsupported index parameters: {0}")]
    BadParams(String),

    /// Failed to open a file.
    #[error("failed to open {path}: {source}")]
    Open {
        /// Path that could not be opened.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to read from a file.
    #[error("failed to read {path}: {source}")]
    Read {
        /// Path that could not be read.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to write a file.
    #[error("failed to write {path}: {source}")]
    Write {
        /// Path that could not be written.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The canonical database is malformed.
    #[error("corrupt canonical database: {0}")]
    CorruptDatabase(String),

    /// Canonical records are not sorted ascending by k-mer.
    #[error("corrupt canonical database: record {position} is out of k-mer order")]
    UnsortedDatabase {
        /// Index of the offending record.
        position: usize,
    },

    /// Two k-mers of the same SNP disagree on a jointly covered base.
    #[error("corrupt canonical database: conflicting bases for SNP {coord:#x} at k-mer offset {offset}")]
    SnpOverlayConflict {
        /// Coordinate of the SNP whose record conflicted.
        coord: u64,
        /// K-mer offset of the conflicting record.
        offset: u32,
    },

    /// More distinct SNPs than the 27-bit id space can address.
    #[error("canonical database holds more SNPs than the id space allows")]
    SnpIdOverflow,

    /// An L-mer range does not fit the packed (start, len) encoding.
    #[error("L-mer range overflow: start {start}, len {len}")]
    RangeOverflow {
        /// First position of the range in the sorted k-mer index.
        start: u64,
        /// Number of entries in the range.
        len: u64,
    },

    /// Post-build validation reconstructed a k-mer that differs from its source.
    #[error("index validation failed: reconstruction mismatch at record {position}")]
    ReconstructionMismatch {
        /// Index of the canonical record that failed to round-trip.
        position: usize,
    },

    /// A read sequence was still in progress when the input ended.
    #[error("truncated read sequence at end of file: {path}")]
    TruncatedFastq {
        /// Input file holding the truncated read.
        path: PathBuf,
    },
}

/// Result alias used throughout the library.
pub type Result<T> = std::result::Result<T, Error>;
