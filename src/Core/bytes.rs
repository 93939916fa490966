// Power-of-two and alignment arithmetic shared by every sizing computation.

/// Cache line size every trailer offset is derived from.
///
/// Two builds must agree on this value to share a buffer.
pub const CACHE_LINE_LENGTH: usize = 64;

/// True when `value` is a non-zero power of two.
#[inline]
pub const fn is_pow2(value: usize) -> bool {
    value > 0 && (value & (value - 1)) == 0
}

/// Rounds `value` up to the next multiple of `pow2_alignment`.
///
/// `pow2_alignment` must be a power of two.
#[inline]
pub const fn align(value: usize, pow2_alignment: usize) -> usize {
    debug_assert!(is_pow2(pow2_alignment));
    (value + (pow2_alignment - 1)) & !(pow2_alignment - 1)
}

/// Smallest power of two `>= value`. Zero maps to one.
#[inline]
pub const fn next_pow2(value: usize) -> usize {
    value.next_power_of_two()
}
