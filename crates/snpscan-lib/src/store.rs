//! Index persistence and the shared runtime database.
//!
//! Each index is persisted as a raw little-endian array of its element
//! type, no header, under a name derived from the canonical database path
//! and the parameter it depends on (so tables for different widths
//! coexist). At startup every file that exists with the expected size is
//! memory-mapped read-only (or read into RAM in preload mode); anything
//! missing or mis-sized is rebuilt from the canonical database and written
//! back. The SNP table and the k-mer index are built together, so they are
//! only ever loaded or rebuilt as a pair.

use std::fs::File;
use std::io::{Read, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::time::Instant;

use bytemuck::Pod;
use memmap2::Mmap;
use rayon::prelude::*;
use tracing::{info, warn};

use crate::builder::{build_indices, validate_reconstruction, RebuildPlan};
use crate::canonical_db::{CanonicalDb, RECORD_BYTES};
use crate::constants::IndexParams;
use crate::error::{Error, Result};
use crate::kmer_index::{entry_snp_id, KmerIndexEntry};
use crate::lmer_index::LmerRange;
use crate::snp_table::SnpRecord;

/// Backing memory of one persisted index.
enum IndexStorage<T: Pod> {
    Owned(Vec<T>),
    Mapped(Mmap, PhantomData<T>),
}

impl<T: Pod> IndexStorage<T> {
    #[inline]
    fn as_slice(&self) -> &[T] {
        match self {
            IndexStorage::Owned(values) => values,
            IndexStorage::Mapped(map, _) => bytemuck::cast_slice(&map[..]),
        }
    }
}

/// On-disk locations of the four optimized indices.
#[derive(Debug, Clone)]
pub struct IndexFiles {
    /// SNP table path.
    pub snps: PathBuf,
    /// Sorted k-mer index path.
    pub kmer_index: PathBuf,
    /// L-mer range table path.
    pub lmer_index: PathBuf,
    /// M-mer bloom path.
    pub bloom: PathBuf,
}

impl IndexFiles {
    /// Derive the index file names for a canonical database.
    pub fn for_db(db_path: &Path, params: &IndexParams) -> Self {
        let base = db_path.to_string_lossy();
        Self {
            snps: PathBuf::from(format!("{base}_optimized_db_snps.bin")),
            kmer_index: PathBuf::from(format!(
                "{base}_optimized_db_kmer_index_{}.bin",
                params.suffix_bits()
            )),
            lmer_index: PathBuf::from(format!(
                "{base}_optimized_db_lmer_index_{}.bin",
                params.lmer_bits()
            )),
            bloom: PathBuf::from(format!(
                "{base}_optimized_db_mmer_bloom_{}.bin",
                params.bloom_bits()
            )),
        }
    }
}

/// Load a persisted array, or report it absent.
///
/// `expected_len` of `None` accepts any whole number of elements. A size
/// mismatch is treated like a missing file: the index will be recomputed.
fn load_array<T: Pod>(
    path: &Path,
    expected_len: Option<usize>,
    preload: bool,
) -> Result<Option<IndexStorage<T>>> {
    let elem = std::mem::size_of::<T>();
    let file = match File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => return Err(Error::Open { path: path.to_path_buf(), source }),
    };
    let size = file
        .metadata()
        .map_err(|source| Error::Open { path: path.to_path_buf(), source })?
        .len() as usize;

    if size % elem != 0 || expected_len.is_some_and(|n| n * elem != size) {
        warn!(
            "{} has unexpected size {size}; it will be recomputed",
            path.display()
        );
        return Ok(None);
    }
    let len = size / elem;
    if len == 0 {
        return Ok(Some(IndexStorage::Owned(Vec::new())));
    }

    if !preload {
        // SAFETY: mapped read-only and never mutated through this process.
        match unsafe { Mmap::map(&file) } {
            Ok(map) => {
                info!("mapped {} ({size} bytes)", path.display());
                return Ok(Some(IndexStorage::Mapped(map, PhantomData)));
            }
            Err(err) => {
                warn!(
                    "memory-mapping {} failed ({err}); reading it into memory",
                    path.display()
                );
            }
        }
    }

    let mut values = vec![T::zeroed(); len];
    let mut file = file;
    file.read_exact(bytemuck::cast_slice_mut(&mut values))
        .map_err(|source| Error::Read { path: path.to_path_buf(), source })?;
    info!("loaded {} ({size} bytes)", path.display());
    Ok(Some(IndexStorage::Owned(values)))
}

/// Persist an array in its raw in-memory layout.
fn write_array<T: Pod>(path: &Path, values: &[T]) -> Result<()> {
    let started = Instant::now();
    let mut file = File::create(path).map_err(|source| Error::Write {
        path: path.to_path_buf(),
        source,
    })?;
    file.write_all(bytemuck::cast_slice(values))
        .map_err(|source| Error::Write { path: path.to_path_buf(), source })?;
    info!(
        "wrote {} ({} bytes) in {:.1}s",
        path.display(),
        values.len() * std::mem::size_of::<T>(),
        started.elapsed().as_secs_f64()
    );
    Ok(())
}

/// The four optimized indices, immutable and shared by every scanner
/// thread for the lifetime of the process.
pub struct Database {
    params: IndexParams,
    snps: IndexStorage<SnpRecord>,
    kmer_index: IndexStorage<KmerIndexEntry>,
    lmer_index: IndexStorage<LmerRange>,
    bloom: IndexStorage<u64>,
}

impl Database {
    /// Open the optimized database for `db_path`, rebuilding and persisting
    /// whatever is missing.
    pub fn open(db_path: &Path, params: IndexParams, preload: bool) -> Result<Self> {
        let started = Instant::now();
        let files = IndexFiles::for_db(db_path, &params);

        let db_size = std::fs::metadata(db_path)
            .map_err(|source| Error::Open { path: db_path.to_path_buf(), source })?
            .len() as usize;
        if db_size % RECORD_BYTES != 0 {
            return Err(Error::CorruptDatabase(format!(
                "size of {} is not a multiple of {RECORD_BYTES} bytes",
                db_path.display()
            )));
        }
        let n_records = db_size / RECORD_BYTES;

        let mut snps =
            load_array::<SnpRecord>(&files.snps, None, preload)?;
        let mut kmer_index =
            load_array::<KmerIndexEntry>(&files.kmer_index, Some(n_records), preload)?;
        let mut lmer_index =
            load_array::<LmerRange>(&files.lmer_index, Some(params.lmer_slots()), preload)?;
        let mut bloom =
            load_array::<u64>(&files.bloom, Some(params.bloom_words()), preload)?;

        // The pair is built together; half of it is worthless alone, and a
        // stale SNP table must not be trusted against a fresh index.
        if snps.is_some() != kmer_index.is_some() {
            snps = None;
            kmer_index = None;
        }
        if let (Some(s), Some(k)) = (&snps, &kmer_index) {
            if !snp_ids_in_bounds(k.as_slice(), s.as_slice().len()) {
                warn!(
                    "{} does not cover the ids of {}; both will be recomputed",
                    files.snps.display(),
                    files.kmer_index.display()
                );
                snps = None;
                kmer_index = None;
            }
        }

        let plan = RebuildPlan {
            snp_parts: snps.is_none(),
            lmer_index: lmer_index.is_none(),
            bloom: bloom.is_none(),
        };

        if !plan.is_empty() {
            info!("recomputing missing indices for {}", db_path.display());
            let canonical = CanonicalDb::open(db_path)?;
            let built = build_indices(&canonical, &params, &plan)?;

            if let (Some(s), Some(k)) = (&built.snps, &built.kmer_index) {
                validate_reconstruction(&canonical, s, k)?;
                write_array(&files.snps, s)?;
                write_array(&files.kmer_index, k)?;
            }
            if let Some(table) = &built.lmer_index {
                write_array(&files.lmer_index, table)?;
            }
            if let Some(words) = &built.bloom {
                write_array(&files.bloom, words)?;
            }

            snps = snps.or(built.snps.map(IndexStorage::Owned));
            kmer_index = kmer_index.or(built.kmer_index.map(IndexStorage::Owned));
            lmer_index = lmer_index.or(built.lmer_index.map(IndexStorage::Owned));
            bloom = bloom.or(built.bloom.map(IndexStorage::Owned));
        }

        info!(
            "database ready in {:.1}s ({n_records} k-mers)",
            started.elapsed().as_secs_f64()
        );

        Ok(Self {
            params,
            // All four are present here: loaded above or just built.
            snps: snps.expect("SNP table neither loaded nor built"),
            kmer_index: kmer_index.expect("k-mer index neither loaded nor built"),
            lmer_index: lmer_index.expect("L-mer index neither loaded nor built"),
            bloom: bloom.expect("bloom neither loaded nor built"),
        })
    }

    /// Assemble a database from in-memory parts.
    pub fn from_parts(
        params: IndexParams,
        snps: Vec<SnpRecord>,
        kmer_index: Vec<KmerIndexEntry>,
        lmer_index: Vec<LmerRange>,
        bloom: Vec<u64>,
    ) -> Self {
        Self {
            params,
            snps: IndexStorage::Owned(snps),
            kmer_index: IndexStorage::Owned(kmer_index),
            lmer_index: IndexStorage::Owned(lmer_index),
            bloom: IndexStorage::Owned(bloom),
        }
    }

    /// Index geometry.
    #[inline]
    pub fn params(&self) -> &IndexParams {
        &self.params
    }

    /// SNP table, indexed by SNP id.
    #[inline]
    pub fn snps(&self) -> &[SnpRecord] {
        self.snps.as_slice()
    }

    /// Sorted k-mer index.
    #[inline]
    pub fn kmer_index(&self) -> &[KmerIndexEntry] {
        self.kmer_index.as_slice()
    }

    /// Direct-address L-mer range table.
    #[inline]
    pub fn lmer_index(&self) -> &[LmerRange] {
        self.lmer_index.as_slice()
    }

    /// M-mer bloom words.
    #[inline]
    pub fn bloom(&self) -> &[u64] {
        self.bloom.as_slice()
    }
}

/// Cheap sweep guarding against a stale SNP table: every id referenced by
/// the k-mer index must be addressable.
fn snp_ids_in_bounds(entries: &[KmerIndexEntry], n_snps: usize) -> bool {
    entries
        .par_iter()
        .all(|&entry| (entry_snp_id(entry) as usize) < n_snps)
}
