//! Little-endian conversions over byte slices.
//!
//! Callers hand in slices that were already length-checked by the record
//! readers, so the fixed-size conversions below cannot fail in practice.

/// Iterates a byte slice as little-endian `u32` values, ignoring a ragged tail.
pub(crate) fn to_u32_iter(bytes: &[u8]) -> impl ExactSizeIterator<Item = u32> + '_ {
    bytes.chunks_exact(4).map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
}

/// Iterates a byte slice as little-endian `u32` values widened to `usize`.
pub(crate) fn to_usize_iter(bytes: &[u8]) -> impl ExactSizeIterator<Item = usize> + '_ {
    to_u32_iter(bytes).map(|value| value as usize)
}

#[inline]
pub(crate) fn to_f64(s: &[u8]) -> f64 {
    f64::from_le_bytes(array(s))
}

#[inline]
pub(crate) fn to_u64(s: &[u8]) -> u64 {
    u64::from_le_bytes(array(s))
}

#[inline]
pub(crate) fn to_u32(s: &[u8]) -> u32 {
    u32::from_le_bytes(array(s))
}

#[inline]
pub(crate) fn to_u16(s: &[u8]) -> u16 {
    u16::from_le_bytes(array(s))
}

#[inline]
pub(crate) fn to_usize(s: &[u8]) -> usize {
    to_u32(s) as usize
}

/// Copies the first `N` bytes into an array, zero-filling a short slice.
#[inline]
fn array<const N: usize>(s: &[u8]) -> [u8; N] {
    let mut bytes = [0u8; N];
    let size = N.min(s.len());
    bytes[..size].copy_from_slice(&s[..size]);
    bytes
}
