/// Aligns a number up to the next multiple of the specified alignment.
///
/// # Arguments
///
/// * `n` - The number to align up
/// * `alignment` - The alignment boundary (must be a power of 2 and non-zero)
///
/// # Examples
///
/// ```
/// use slotbuf_bytes::align::align_up;
///
/// assert_eq!(align_up(0, 8), 0);
/// assert_eq!(align_up(1, 8), 8);
/// assert_eq!(align_up(8, 8), 8);
/// assert_eq!(align_up(9, 8), 16);
/// ```
///
/// # Panics
///
/// This function will panic in debug builds if `alignment` is 0 or not a power of 2.
#[inline]
pub fn align_up(n: usize, alignment: usize) -> usize {
    debug_assert_ne!(alignment, 0);
    debug_assert!(alignment.is_power_of_two());
    (n + alignment - 1) & !(alignment - 1)
}

/// Checks if a number is aligned to the specified alignment boundary.
///
/// # Examples
///
/// ```
/// use slotbuf_bytes::align::is_aligned;
///
/// assert!(is_aligned(0, 8));
/// assert!(!is_aligned(7, 8));
/// assert!(is_aligned(16, 8));
/// ```
#[inline]
pub fn is_aligned(n: usize, alignment: usize) -> bool {
    debug_assert_ne!(alignment, 0);
    debug_assert!(alignment.is_power_of_two());
    (n & (alignment - 1)) == 0
}

/// Number of padding bytes to prepend to a back-filled buffer that already holds
/// `used` bytes, so that after prepending a further `additional` bytes the total
/// is a multiple of `alignment`.
///
/// Back-filled buffers measure positions from the end, so an item that starts
/// at distance `used + additional` from the end is aligned in the final buffer
/// as long as the end of the buffer itself is aligned.
///
/// # Examples
///
/// ```
/// use slotbuf_bytes::align::back_padding;
///
/// assert_eq!(back_padding(0, 0, 4), 0);
/// assert_eq!(back_padding(1, 0, 4), 3);
/// assert_eq!(back_padding(6, 4, 8), 6);
/// assert_eq!(back_padding(12, 4, 8), 0);
/// ```
#[inline]
pub fn back_padding(used: usize, additional: usize, alignment: usize) -> usize {
    debug_assert_ne!(alignment, 0);
    debug_assert!(alignment.is_power_of_two());
    used.wrapping_add(additional).wrapping_neg() & (alignment - 1)
}
