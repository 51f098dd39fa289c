//! Engine-wide constants and the runtime index parameters.

use crate::error::{Error, Result};

/// Database k-mers are 31-mers.
pub const K: usize = 31;

/// 2 bits encode each A/C/G/T letter.
pub const BITS_PER_BASE: usize = 2;

/// Number of bits encoding an entire k-mer.
pub const K2: u32 = (K * BITS_PER_BASE) as u32;

/// Mask selecting the 62 significant bits of a k-mer.
pub const KMER_MASK: u64 = (1u64 << K2) - 1;

/// Width of the SNP id field of a k-mer index entry.
pub const SNP_ID_BITS: u32 = 27;

/// Width of the offset field of a k-mer index entry.
pub const OFFSET_BITS: u32 = 5;

/// Largest representable SNP id.
pub const MAX_SNP_ID: u32 = (1 << SNP_ID_BITS) - 1;

/// Width of the start field of a packed L-mer range.
pub const RANGE_START_BITS: u32 = 48;

/// Width of the length field of a packed L-mer range.
pub const RANGE_LEN_BITS: u32 = 64 - RANGE_START_BITS;

/// Largest representable range start.
pub const MAX_RANGE_START: u64 = (1u64 << RANGE_START_BITS) - 1;

/// Largest representable range length.
pub const MAX_RANGE_LEN: u64 = (1u64 << RANGE_LEN_BITS) - 1;

/// Reads are split into tokens at wildcard bases; only the first
/// `MAX_TOKEN_LENGTH` bytes of a token are retained.
pub const MAX_TOKEN_LENGTH: usize = 500;

/// Tokens shorter than one k-mer carry no windows and are dropped.
pub const MIN_TOKEN_LENGTH: usize = K;

/// Default L-mer prefix width (bits). The reference configuration.
pub const DEFAULT_LMER_BITS: u32 = 30;

/// Default bloom address width (bits). The reference configuration.
pub const DEFAULT_BLOOM_BITS: u32 = 36;

/// Runtime index geometry: the L-mer prefix width and the bloom address
/// width. Both are fixed for the duration of a run; everything else
/// (suffix width, masks, table sizes) derives from them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexParams {
    lmer_bits: u32,
    bloom_bits: u32,
}

impl IndexParams {
    /// Validate and freeze a parameter pair.
    ///
    /// `lmer_bits` must lie in `[1, 32]` and `bloom_bits` in `[1, 63]`.
    /// A configuration with `lmer_bits < K2 - bloom_bits` is accepted but
    /// flagged, since the range scans then cover bits the bloom never
    /// filters on.
    pub fn new(lmer_bits: u32, bloom_bits: u32) -> Result<Self> {
        if lmer_bits == 0 || lmer_bits > 32 {
            return Err(Error::BadParams(format!(
                "L-mer width must be in [1, 32], got {lmer_bits}"
            )));
        }
        if bloom_bits == 0 || bloom_bits >= 64 {
            return Err(Error::BadParams(format!(
                "bloom width must be in [1, 63], got {bloom_bits}"
            )));
        }
        if lmer_bits + bloom_bits < K2 {
            tracing::warn!(
                "L-mer width {} below {} - {}; range scans will be longer than necessary",
                lmer_bits,
                K2,
                bloom_bits
            );
        }
        Ok(Self { lmer_bits, bloom_bits })
    }

    /// L-mer prefix width in bits.
    #[inline]
    pub fn lmer_bits(&self) -> u32 {
        self.lmer_bits
    }

    /// Bloom address width in bits.
    #[inline]
    pub fn bloom_bits(&self) -> u32 {
        self.bloom_bits
    }

    /// Width of the k-mer suffix below the L-mer prefix.
    #[inline]
    pub fn suffix_bits(&self) -> u32 {
        K2 - self.lmer_bits
    }

    /// Mask selecting the M-mer bits of a k-mer.
    #[inline]
    pub fn mmer_mask(&self) -> u64 {
        (1u64 << self.bloom_bits) - 1
    }

    /// L-mer prefix of a k-mer.
    #[inline]
    pub fn lmer_of(&self, kmer: u64) -> u64 {
        kmer >> self.suffix_bits()
    }

    /// M-mer (bloom address) of a k-mer.
    #[inline]
    pub fn mmer_of(&self, kmer: u64) -> u64 {
        kmer & self.mmer_mask()
    }

    /// Number of leading window bases that cover the M-mer bits; the
    /// scanner encodes only this many bases before probing the bloom.
    #[inline]
    pub fn mmer_bases(&self) -> usize {
        (self.bloom_bits as usize).div_ceil(BITS_PER_BASE).min(K)
    }

    /// Number of slots of the direct-address L-mer table.
    #[inline]
    pub fn lmer_slots(&self) -> usize {
        1usize << self.lmer_bits
    }

    /// Number of u64 words backing the bloom bit vector.
    #[inline]
    pub fn bloom_words(&self) -> usize {
        (1u64 << self.bloom_bits).div_ceil(64) as usize
    }
}

impl Default for IndexParams {
    fn default() -> Self {
        Self {
            lmer_bits: DEFAULT_LMER_BITS,
            bloom_bits: DEFAULT_BLOOM_BITS,
        }
    }
}
