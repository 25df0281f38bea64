//! Overflow-safe allocation size computation.
//!
//! Every heap and shared-memory allocation goes through
//! [`compute_allocation_size`] before any allocator or system call is made,
//! so pathological width x height x bytes-per-pixel combinations are rejected
//! up front instead of wrapping downstream size accounting.

use crate::error::{Error, Result};

/// Compute the byte count needed for a pixel buffer of `height` rows with
/// `row_bytes` bytes per row.
///
/// The stride must fit a signed 32-bit value, and the product
/// `height * row_bytes` is computed in 64 bits and must fit back into
/// `0..=i32::MAX`. This deliberately caps the maximum representable
/// allocation size.
///
/// # Errors
///
/// Returns [`Error::SizeOverflow`] if the stride does not fit `i32`, or if
/// the product is negative or exceeds `i32::MAX`.
///
/// # Example
///
/// ```rust
/// use pixref::size::compute_allocation_size;
///
/// assert_eq!(compute_allocation_size(400, 100).unwrap(), 40_000);
/// assert!(compute_allocation_size(i32::MAX as usize, 2).is_err());
/// ```
pub fn compute_allocation_size(row_bytes: usize, height: i32) -> Result<usize> {
    let row_bytes32 =
        i32::try_from(row_bytes).map_err(|_| Error::SizeOverflow { row_bytes, height })?;

    let big = i64::from(height) * i64::from(row_bytes32);
    if big < 0 || big > i64::from(i32::MAX) {
        return Err(Error::SizeOverflow { row_bytes, height });
    }

    Ok(big as usize)
}
