//! Index builder and validator.
//!
//! A single forward pass over the canonical database derives whichever of
//! the four indices the caller marks for computation. The pass also
//! enforces the database's structural contract: k-mers within 62 bits and
//! sorted ascending, offsets below `K`, and agreement of every k-mer with
//! the bits other k-mers already contributed to the same SNP record.
//!
//! When the SNP table and k-mer index were built, [`validate_reconstruction`]
//! runs a second, parallel pass that rebuilds every k-mer from its index
//! entry and compares it with the canonical value. Any mismatch is fatal.

use ahash::AHashMap;
use rayon::prelude::*;
use tracing::info;

use crate::canonical_db::CanonicalDb;
use crate::constants::{IndexParams, K, KMER_MASK, MAX_SNP_ID};
use crate::error::{Error, Result};
use crate::kmer_index::{entry_offset, entry_snp_id, pack_entry, KmerIndexEntry};
use crate::lmer_index::{pack_range, LmerRange};
use crate::mmer_bloom::set_bit;
use crate::snp_table::{SnpRecord, SnpRecordDraft};

/// Which indices a build pass should produce.
///
/// The SNP table and the k-mer index are built together and must stay
/// consistent, so a single flag covers both.
#[derive(Debug, Clone, Copy)]
pub struct RebuildPlan {
    /// Rebuild the SNP table and the k-mer index.
    pub snp_parts: bool,
    /// Rebuild the L-mer range table.
    pub lmer_index: bool,
    /// Rebuild the M-mer bloom.
    pub bloom: bool,
}

impl RebuildPlan {
    /// Plan covering all four indices.
    pub fn everything() -> Self {
        Self { snp_parts: true, lmer_index: true, bloom: true }
    }

    /// Whether the plan requests no work at all.
    pub fn is_empty(&self) -> bool {
        !(self.snp_parts || self.lmer_index || self.bloom)
    }
}

/// Indices produced by [`build_indices`]; only the planned ones are present.
#[derive(Debug, Default)]
pub struct BuiltIndices {
    /// SNP table, indexed by SNP id.
    pub snps: Option<Vec<SnpRecord>>,
    /// Sorted k-mer index, one entry per canonical record.
    pub kmer_index: Option<Vec<KmerIndexEntry>>,
    /// Direct-address L-mer range table, `2^L` slots.
    pub lmer_index: Option<Vec<LmerRange>>,
    /// M-mer bloom words, `2^M` bits.
    pub bloom: Option<Vec<u64>>,
}

/// Derive the planned indices from the canonical database.
pub fn build_indices(
    db: &CanonicalDb,
    params: &IndexParams,
    plan: &RebuildPlan,
) -> Result<BuiltIndices> {
    let records = db.records();
    info!("building indices from {} canonical records", records.len());

    let mut drafts: Vec<SnpRecordDraft> = Vec::new();
    let mut snp_ids: AHashMap<u64, u32> = AHashMap::new();
    let mut entries: Vec<KmerIndexEntry> = if plan.snp_parts {
        Vec::with_capacity(records.len())
    } else {
        Vec::new()
    };
    let mut lmer_table: Vec<LmerRange> = if plan.lmer_index {
        vec![0; params.lmer_slots()]
    } else {
        Vec::new()
    };
    let mut bloom: Vec<u64> = if plan.bloom {
        vec![0; params.bloom_words()]
    } else {
        Vec::new()
    };

    let suffix_bits = params.suffix_bits();
    let mmer_mask = params.mmer_mask();

    let mut prev_kmer = 0u64;
    let mut prev_lmer = 0u64;
    let mut range_start = 0usize;

    for (position, record) in records.iter().enumerate() {
        let kmer = record.kmer;
        if kmer > KMER_MASK {
            return Err(Error::CorruptDatabase(format!(
                "record {position} holds a k-mer wider than 62 bits"
            )));
        }
        if position > 0 && kmer < prev_kmer {
            return Err(Error::UnsortedDatabase { position });
        }
        prev_kmer = kmer;

        if plan.snp_parts {
            let offset = record.offset();
            if offset >= K as u32 {
                return Err(Error::CorruptDatabase(format!(
                    "record {position} holds offset {offset} (max {})",
                    K - 1
                )));
            }
            let coord = record.coord();
            let snp_id = match snp_ids.get(&coord) {
                Some(&id) => id,
                None => {
                    if drafts.len() > MAX_SNP_ID as usize {
                        return Err(Error::SnpIdOverflow);
                    }
                    let id = drafts.len() as u32;
                    drafts.push(SnpRecordDraft::new(coord));
                    snp_ids.insert(coord, id);
                    id
                }
            };
            if !drafts[snp_id as usize].overlay(kmer, offset) {
                return Err(Error::SnpOverlayConflict { coord, offset });
            }
            entries.push(pack_entry(snp_id, offset));
        }

        if plan.bloom {
            set_bit(&mut bloom, kmer & mmer_mask);
        }

        if plan.lmer_index {
            // K-mers arrive sorted, so each prefix occupies one contiguous
            // run; a new run starts whenever the prefix changes.
            let lmer = kmer >> suffix_bits;
            if position > 0 && lmer != prev_lmer {
                range_start = position;
            }
            lmer_table[lmer as usize] =
                pack_range(range_start as u64, (position - range_start + 1) as u64)?;
            prev_lmer = lmer;
        }
    }

    if plan.snp_parts {
        info!("assigned {} SNP ids", drafts.len());
    }

    Ok(BuiltIndices {
        snps: plan
            .snp_parts
            .then(|| drafts.into_iter().map(SnpRecordDraft::into_record).collect()),
        kmer_index: plan.snp_parts.then_some(entries),
        lmer_index: plan.lmer_index.then_some(lmer_table),
        bloom: plan.bloom.then_some(bloom),
    })
}

/// Cross-validate a freshly built SNP table and k-mer index against their
/// source: every entry must reconstruct exactly the k-mer of its canonical
/// record, and every record must store matching copies of its SNP bits.
pub fn validate_reconstruction(
    db: &CanonicalDb,
    snps: &[SnpRecord],
    entries: &[KmerIndexEntry],
) -> Result<()> {
    if entries.len() != db.len() {
        return Err(Error::CorruptDatabase(format!(
            "k-mer index holds {} entries for {} canonical records",
            entries.len(),
            db.len()
        )));
    }

    snps.par_iter().enumerate().try_for_each(|(id, record)| {
        if record.overlay_is_consistent() {
            Ok(())
        } else {
            Err(Error::CorruptDatabase(format!(
                "SNP {id} stores diverging copies of its center bits"
            )))
        }
    })?;

    let records = db.records();
    (0..entries.len()).into_par_iter().try_for_each(|position| {
        let entry = entries[position];
        let rebuilt =
            snps[entry_snp_id(entry) as usize].reconstruct_kmer(entry_offset(entry));
        if rebuilt == records[position].kmer {
            Ok(())
        } else {
            Err(Error::ReconstructionMismatch { position })
        }
    })
}
