//! Bit-packed k-mer encoding.
//!
//! Base `i` of a window occupies bits `2i, 2i+1` of the packed value, so
//! the first base sits in the low bits. The ascending sort order of the
//! canonical database, the L-mer prefixes, and the M-mer bloom addresses
//! are all defined on this integer.

use crate::constants::K;
use crate::encoding::{decode_base, encode_base, INVALID_BASE};

/// Pack the leading bases of `buf` into an integer, base `i` at bits `2i`.
///
/// Callers must pass nucleotides only; feeding a non-ACGT byte here is a
/// programming error (the scanner splits tokens before this point).
#[inline]
pub fn encode_prefix(buf: &[u8]) -> u64 {
    debug_assert!(buf.len() <= 32);
    let mut code = 0u64;
    for (i, &base) in buf.iter().enumerate() {
        let b_code = encode_base(base);
        debug_assert_ne!(b_code, INVALID_BASE, "non-nucleotide byte {base:#04x}");
        code |= (b_code as u64) << (2 * i);
    }
    code
}

/// Pack a full 31-base window.
#[inline]
pub fn encode_kmer(buf: &[u8]) -> u64 {
    debug_assert!(buf.len() >= K);
    encode_prefix(&buf[..K])
}

/// Unpack a k-mer back into its 31 uppercase bases.
pub fn decode_kmer(code: u64) -> [u8; K] {
    let mut buf = [0u8; K];
    for (i, slot) in buf.iter_mut().enumerate() {
        *slot = decode_base((code >> (2 * i)) as u8);
    }
    buf
}
