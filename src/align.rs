/// Boundary every address handed out by [`AlignedHeap`](crate::AlignedHeap) is aligned to.
pub const ALIGNMENT: usize = 16;

/// Rounds a value up to the next multiple of a power-of-two boundary.
///
/// With a single argument the boundary is [`ALIGNMENT`].
///
/// # Examples
///
/// ```rust
/// use alignbuf::align_up;
///
/// assert_eq!(align_up!(0), 0);
/// assert_eq!(align_up!(1), 16);
/// assert_eq!(align_up!(16), 16);
/// assert_eq!(align_up!(17), 32);
/// assert_eq!(align_up!(13, 8), 16);
/// ```
#[macro_export]
macro_rules! align_up {
  ($value:expr) => {
    $crate::align_up!($value, $crate::align::ALIGNMENT)
  };
  ($value:expr, $boundary:expr) => {
    ($value + $boundary - 1) & !($boundary - 1)
  };
}

/// Same as [`align_up!`] but returns `None` instead of wrapping when the
/// rounded value does not fit in a `usize`.
#[inline]
pub fn checked_align_up(
  value: usize,
  boundary: usize,
) -> Option<usize> {
  debug_assert!(boundary.is_power_of_two());
  value
    .checked_add(boundary - 1)
    .map(|v| v & !(boundary - 1))
}

/// Checks whether an address lies on an [`ALIGNMENT`] boundary.
#[inline]
pub fn is_aligned(address: usize) -> bool {
  address & (ALIGNMENT - 1) == 0
}
