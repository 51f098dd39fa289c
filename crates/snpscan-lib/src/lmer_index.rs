//! Direct-address L-mer range table.
//!
//! Slot `l` of the table holds a packed `(start:48, len:16)` range: the
//! contiguous run of positions in the sorted k-mer index whose k-mers carry
//! the L-bit prefix `l`. Absent prefixes keep the zero range (len 0).

use crate::constants::{MAX_RANGE_LEN, MAX_RANGE_START, RANGE_LEN_BITS};
use crate::error::{Error, Result};

/// Packed `(start, len)` range into the sorted k-mer index.
pub type LmerRange = u64;

/// Pack a range, rejecting values the fields cannot hold.
#[inline]
pub fn pack_range(start: u64, len: u64) -> Result<LmerRange> {
    if start > MAX_RANGE_START || len > MAX_RANGE_LEN {
        return Err(Error::RangeOverflow { start, len });
    }
    Ok((start << RANGE_LEN_BITS) | len)
}

/// First position of a range.
#[inline]
pub fn range_start(range: LmerRange) -> u64 {
    range >> RANGE_LEN_BITS
}

/// Number of entries in a range.
#[inline]
pub fn range_len(range: LmerRange) -> u64 {
    range & MAX_RANGE_LEN
}
