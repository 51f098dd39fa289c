//! Canonical database access.
//!
//! The canonical database is a tightly packed sequence of 16-byte
//! little-endian records, `(snp_with_offset, kmer)`, sorted ascending by
//! `kmer`. Within `snp_with_offset` the low 8 bits carry the k-mer offset
//! and the high 56 bits the SNP coordinate. The file is memory-mapped
//! read-only; on platforms (or files) where mapping fails it is read fully
//! into memory instead.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use bytemuck::{Pod, Zeroable};
use memmap2::Mmap;

use crate::error::{Error, Result};

/// Bytes per canonical record.
pub const RECORD_BYTES: usize = 16;

const OFFSET_FIELD_BITS: u32 = 8;
const OFFSET_FIELD_MASK: u64 = (1 << OFFSET_FIELD_BITS) - 1;

/// One canonical record.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct CanonicalRecord {
    /// `(coord:56, offset:8)` packed field.
    pub snp_with_offset: u64,
    /// The 62-bit k-mer covering the SNP.
    pub kmer: u64,
}

impl CanonicalRecord {
    /// Canonical 56-bit SNP coordinate.
    #[inline]
    pub fn coord(&self) -> u64 {
        self.snp_with_offset >> OFFSET_FIELD_BITS
    }

    /// Position of the SNP within the k-mer.
    #[inline]
    pub fn offset(&self) -> u32 {
        (self.snp_with_offset & OFFSET_FIELD_MASK) as u32
    }
}

enum Backing {
    Mapped(Mmap),
    Owned(Vec<CanonicalRecord>),
}

/// Read-only view of a canonical database.
pub struct CanonicalDb {
    backing: Backing,
}

impl CanonicalDb {
    /// Map (or read) the canonical database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|source| Error::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let size = file
            .metadata()
            .map_err(|source| Error::Open { path: path.to_path_buf(), source })?
            .len() as usize;
        if size % RECORD_BYTES != 0 {
            return Err(Error::CorruptDatabase(format!(
                "size of {} is not a multiple of {RECORD_BYTES} bytes",
                path.display()
            )));
        }
        if size == 0 {
            return Ok(Self { backing: Backing::Owned(Vec::new()) });
        }

        // SAFETY: mapped read-only; the database is treated as immutable
        // for the lifetime of the process.
        match unsafe { Mmap::map(&file) } {
            Ok(map) => Ok(Self { backing: Backing::Mapped(map) }),
            Err(err) => {
                tracing::warn!(
                    "memory-mapping {} failed ({err}); reading it into memory",
                    path.display()
                );
                let mut records =
                    vec![CanonicalRecord::zeroed(); size / RECORD_BYTES];
                let mut file = file;
                file.read_exact(bytemuck::cast_slice_mut(&mut records))
                    .map_err(|source| Error::Read {
                        path: path.to_path_buf(),
                        source,
                    })?;
                Ok(Self { backing: Backing::Owned(records) })
            }
        }
    }

    /// Wrap records already in memory.
    pub fn from_records(records: Vec<CanonicalRecord>) -> Self {
        Self { backing: Backing::Owned(records) }
    }

    /// All records, in file order.
    #[inline]
    pub fn records(&self) -> &[CanonicalRecord] {
        match &self.backing {
            Backing::Mapped(map) => bytemuck::cast_slice(&map[..]),
            Backing::Owned(records) => records,
        }
    }

    /// Number of records.
    #[inline]
    pub fn len(&self) -> usize {
        self.records().len()
    }

    /// Whether the database holds no records.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(snp_with_offset: u64, kmer: u64) -> CanonicalRecord {
        CanonicalRecord { snp_with_offset, kmer }
    }

    #[test]
    fn coord_and_offset_split() {
        let record = rec((0xABCD << 8) | 17, 99);
        assert_eq!(record.coord(), 0xABCD);
        assert_eq!(record.offset(), 17);
    }

    #[test]
    fn from_records_exposes_file_order() {
        let records = vec![rec(1 << 8, 10), rec(2 << 8, 10), rec((3 << 8) | 30, 11)];
        let db = CanonicalDb::from_records(records.clone());
        assert_eq!(db.len(), 3);
        assert!(!db.is_empty());
        assert_eq!(db.records(), &records[..]);
    }
}
