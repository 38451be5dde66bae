/// Calculates the machine word alignment for the given size.
///
/// # Examples
///
/// ```rust
/// use rbuddy::align;
///
/// match std::mem::size_of::<usize>() {
///     8 => assert_eq!(align!(13), 16), // 64 bit machine.
///     4 => assert_eq!(align!(11), 12), // 32 bit machine.
///     _ => {},
/// };
/// ```
#[macro_export]
macro_rules! align {
  ($value:expr) => {
    ($value + ::core::mem::size_of::<usize>() - 1) & !(::core::mem::size_of::<usize>() - 1)
  };
}

/// Returns the smallest power of two greater than or equal to `n`.
///
/// `0` rounds up to `1`, and a value that already is a power of two comes
/// back unchanged. Returns `None` when the result does not fit in a `usize`.
///
/// ```rust
/// use rbuddy::next_pow2;
///
/// assert_eq!(next_pow2(0), Some(1));
/// assert_eq!(next_pow2(29), Some(32));
/// assert_eq!(next_pow2(64), Some(64));
/// ```
pub fn next_pow2(n: usize) -> Option<usize> {
  n.checked_next_power_of_two()
}
