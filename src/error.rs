//! Error types for pixref.

use thiserror::Error;

/// Result type alias using pixref's Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for pixref operations.
///
/// Only recoverable conditions are represented here. Contract violations
/// (unknown color type at allocation, underivable alpha type during
/// reconfiguration) panic instead; see [`crate::Bitmap::reconfigure`].
#[derive(Error, Debug)]
pub enum Error {
    /// The requested stride x height product does not fit the bounded
    /// signed 32-bit range the allocator accepts.
    #[error("allocation size overflows the representable range: {row_bytes} bytes/row x {height} rows")]
    SizeOverflow {
        /// Requested row stride in bytes.
        row_bytes: usize,
        /// Requested height in rows.
        height: i32,
    },

    /// Pixel memory allocation failed.
    #[error("pixel allocation failed: {0}")]
    AllocationFailed(String),

    /// System call error (via rustix).
    #[error("system error: {0}")]
    System(#[from] rustix::io::Errno),
}
