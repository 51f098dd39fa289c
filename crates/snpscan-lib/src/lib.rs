// snpscan: ultra-fast SNP genotyping by k-mer scan
//
// The engine behind the `snpscan` binary: a bit-packed, memory-mapped,
// bloom-filtered, L-mer-indexed SNP k-mer database plus the streaming FASTQ
// scanner that queries it.

#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

pub mod constants;
pub mod encoding;
pub mod kmer;
pub mod snp_table;
pub mod kmer_index;
pub mod lmer_index;
pub mod mmer_bloom;
pub mod canonical_db;
pub mod builder;
pub mod store;
pub mod scanner;
pub mod dispatcher;
pub mod error;

// Re-export the types a caller of the engine touches directly.
pub use constants::IndexParams;
pub use error::{Error, Result};
pub use scanner::{scan_file, scan_stream, ReadScanner, ScanReport, ScanStats};
pub use snp_table::SnpRecord;
pub use store::Database;
