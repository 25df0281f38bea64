//! # pixref
//!
//! Pixel memory ownership and lifecycle for rendering pipelines.
//!
//! pixref unifies three memory-acquisition strategies behind one bitmap
//! entity that canvas and GPU-upload collaborators treat uniformly:
//!
//! - **Heap**: zero-initialized process-local allocation
//! - **Shared**: anonymous shared memory (memfd) mappable across processes,
//!   sealed against new writable mappings once allocated
//! - **External**: caller-owned memory adopted with a release hook that
//!   fires exactly once at teardown
//!
//! The backend is fixed at construction. Reconfiguration can reinterpret
//! the same memory under a new width/height/format any number of times,
//! with overflow-safe size computation and color/alpha compatibility
//! enforcement; the locked-pixel state is primed eagerly so consumers read
//! the current (pointer, stride, palette) triple without an explicit lock
//! call.
//!
//! ## Quick Start
//!
//! ```rust
//! use pixref::{AlphaType, Bitmap, ColorType, ImageInfo, PixelRef};
//!
//! let info = ImageInfo::new(100, 100, ColorType::Rgba8888, AlphaType::Premul);
//! let bitmap = Bitmap::allocate_heap(&info)?;
//!
//! let locked = bitmap.lock_pixels();
//! assert_eq!(locked.row_bytes, 400);
//! assert!(!locked.addr.is_null());
//! # Ok::<(), pixref::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod bitmap;
pub mod error;
pub mod info;
pub mod palette;
pub mod size;
pub mod storage;

pub use bitmap::{Bitmap, LockedPixels, PixelRef};
pub use error::{Error, Result};
pub use info::{AlphaType, ColorType, ImageInfo};
pub use palette::{Palette, MAX_PALETTE_COLORS};
pub use storage::{ReleaseFn, StorageKind};
