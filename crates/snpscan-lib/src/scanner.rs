//! Streaming FASTQ scanner: the query hot path.
//!
//! Input is consumed as raw bytes in large chunks; the scanner tracks FASTQ
//! line state itself and never materializes records. Only every fourth line
//! (the read sequence) is examined. Sequences are split into tokens at
//! newlines and at any non-ACGT byte; each 31-base window of a token is
//! probed against the M-mer bloom first, and only survivors pay for the
//! full k-mer encode and the L-mer range scan.
//!
//! Matches are de-duplicated per *read*, not per token: a SNP seen in two
//! tokens of the same N-split read still counts once. The footprint set is
//! cleared at every newline of a sequence line.

use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use ahash::AHashSet;
use tracing::info;

use crate::constants::{K, MAX_TOKEN_LENGTH, MIN_TOKEN_LENGTH};
use crate::encoding::is_nucleotide;
use crate::error::{Error, Result};
use crate::kmer::{encode_kmer, encode_prefix};
use crate::kmer_index::{entry_offset, entry_snp_id};
use crate::lmer_index::{range_len, range_start};
use crate::mmer_bloom::test_bit;
use crate::store::Database;

/// Bytes per input read chunk.
pub const CHUNK_BYTES: usize = 32 << 20;

/// Progress is logged once per this many input lines.
const PROGRESS_UPDATE_INTERVAL: u64 = 5_000_000;

/// Counters accumulated over one scanned input.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ScanStats {
    /// Input lines consumed.
    pub lines: u64,
    /// Tokens long enough to be scanned.
    pub tokens: u64,
    /// 31-base windows probed against the bloom.
    pub positions: u64,
    /// Windows that passed the bloom and reached the range scan.
    pub bloom_hits: u64,
    /// Index entries compared during range scans.
    pub entries_compared: u64,
    /// De-duplicated matches recorded.
    pub matches: u64,
}

/// Result of scanning one input: sorted `(coordinate, read count)` rows
/// plus the counters.
#[derive(Debug)]
pub struct ScanReport {
    /// Output rows, ascending by coordinate.
    pub rows: Vec<(u64, u64)>,
    /// Scan counters.
    pub stats: ScanStats,
}

/// Incremental scanner over one byte stream.
pub struct ReadScanner<'db> {
    db: &'db Database,
    source: PathBuf,

    // Geometry, hoisted out of the hot loop.
    suffix_bits: u32,
    mmer_mask: u64,
    mmer_bases: usize,

    token: [u8; MAX_TOKEN_LENGTH],
    // Running length of the current token; may exceed MAX_TOKEN_LENGTH,
    // in which case only the first MAX_TOKEN_LENGTH bytes were retained.
    token_len: usize,
    line_count: u64,
    prev_byte: u8,

    matches: Vec<u32>,
    footprint: AHashSet<u32>,
    stats: ScanStats,
    started: Instant,
}

impl<'db> ReadScanner<'db> {
    /// Start a scanner for one input; `source` is used in logs and errors.
    pub fn new(db: &'db Database, source: &Path) -> Self {
        let params = db.params();
        Self {
            db,
            source: source.to_path_buf(),
            suffix_bits: params.suffix_bits(),
            mmer_mask: params.mmer_mask(),
            mmer_bases: params.mmer_bases(),
            token: [0; MAX_TOKEN_LENGTH],
            token_len: 0,
            line_count: 0,
            prev_byte: 0,
            matches: Vec::new(),
            footprint: AHashSet::new(),
            stats: ScanStats::default(),
            started: Instant::now(),
        }
    }

    /// Feed the next chunk of input bytes.
    pub fn consume(&mut self, chunk: &[u8]) {
        for &byte in chunk {
            // Invariant: line_count equals the number of newlines strictly
            // before the byte being examined.
            if self.prev_byte == b'\n' {
                self.line_count += 1;
                if (self.line_count + 1) % PROGRESS_UPDATE_INTERVAL == 0 {
                    info!(
                        "{} reads scanned after {:.0}s from {}",
                        (self.line_count + 3) / 4,
                        self.started.elapsed().as_secs_f64(),
                        self.source.display()
                    );
                }
            }
            self.prev_byte = byte;

            // Every 4 lines form a record; line 1 holds the read sequence.
            if self.line_count % 4 != 1 {
                continue;
            }

            let at_token_end = byte == b'\n' || !is_nucleotide(byte);
            if !at_token_end {
                if self.token_len < MAX_TOKEN_LENGTH {
                    self.token[self.token_len] = byte;
                }
                self.token_len += 1;
                continue;
            }

            if (MIN_TOKEN_LENGTH..=MAX_TOKEN_LENGTH).contains(&self.token_len) {
                self.scan_token();
            }
            // Out-of-bounds tokens are dropped silently.

            if byte == b'\n' {
                // Read boundary, not just a token boundary.
                self.footprint.clear();
            }
            self.token_len = 0;
        }
        self.stats.lines = self.line_count;
    }

    /// Probe every 31-base window of the buffered token.
    fn scan_token(&mut self) {
        self.stats.tokens += 1;

        let db = self.db;
        let snps = db.snps();
        let entries = db.kmer_index();
        let lmer_index = db.lmer_index();
        let bloom = db.bloom();

        for j in 0..=self.token_len - K {
            self.stats.positions += 1;

            // Cheap probe: only the bases covering the M-mer bits are
            // encoded; most windows stop here.
            let mmer =
                encode_prefix(&self.token[j..j + self.mmer_bases]) & self.mmer_mask;
            if !test_bit(bloom, mmer) {
                continue;
            }
            self.stats.bloom_hits += 1;

            let kmer = encode_kmer(&self.token[j..j + K]);
            let range = lmer_index[(kmer >> self.suffix_bits) as usize];
            let start = range_start(range) as usize;
            let len = range_len(range) as usize;

            for &entry in &entries[start..start + len] {
                self.stats.entries_compared += 1;
                let snp_id = entry_snp_id(entry);
                let db_kmer =
                    snps[snp_id as usize].reconstruct_kmer(entry_offset(entry));
                if kmer == db_kmer {
                    if self.footprint.insert(snp_id) {
                        self.matches.push(snp_id);
                        self.stats.matches += 1;
                    }
                } else if kmer < db_kmer {
                    // The range is sorted; nothing further can match.
                    break;
                }
            }
        }
    }

    /// Finish the scan: reject truncated input, then collapse the match
    /// list into sorted per-coordinate read counts.
    pub fn finish(mut self) -> Result<ScanReport> {
        if self.token_len != 0 {
            return Err(Error::TruncatedFastq { path: self.source });
        }
        self.stats.lines = self.line_count;

        let snps = self.db.snps();
        let mut coords: Vec<u64> = self
            .matches
            .iter()
            .map(|&snp_id| snps[snp_id as usize].coord)
            .collect();
        coords.sort_unstable();

        let mut rows: Vec<(u64, u64)> = Vec::new();
        for coord in coords {
            match rows.last_mut() {
                Some((last, count)) if *last == coord => *count += 1,
                _ => rows.push((coord, 1)),
            }
        }

        Ok(ScanReport { rows, stats: self.stats })
    }
}

/// Scan an entire byte stream in reusable chunks.
pub fn scan_stream<R: Read>(db: &Database, mut input: R, source: &Path) -> Result<ScanReport> {
    let mut scanner = ReadScanner::new(db, source);
    let mut buffer = vec![0u8; CHUNK_BYTES];
    loop {
        let n = input.read(&mut buffer).map_err(|io_err| Error::Read {
            path: source.to_path_buf(),
            source: io_err,
        })?;
        if n == 0 {
            break;
        }
        scanner.consume(&buffer[..n]);
    }
    scanner.finish()
}

/// Scan one FASTQ file.
pub fn scan_file(db: &Database, path: &Path) -> Result<ScanReport> {
    let file = File::open(path).map_err(|source| Error::Open {
        path: path.to_path_buf(),
        source,
    })?;
    scan_stream(db, file, path)
}

/// Emit report rows as `coord\tcount` lines.
pub fn write_rows<W: Write>(rows: &[(u64, u64)], mut out: W) -> std::io::Result<()> {
    for (coord, count) in rows {
        writeln!(out, "{coord}\t{count}")?;
    }
    Ok(())
}
