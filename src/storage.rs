//! Pixel storage backends.
//!
//! A bitmap owns exactly one [`PixelStorage`], chosen at construction and
//! fixed for the object's lifetime. The variants are mutually exclusive and
//! closed, so per-backend behavior (allocate, access, tear down) is a short
//! enumerable match rather than an open trait hierarchy.
//!
//! The shared-memory backend is built on Linux memfd. After allocation the
//! descriptor is sealed with `F_SEAL_FUTURE_WRITE`: the creator's existing
//! read-write mapping stays writable, but no new writable mapping can be
//! established from the descriptor. This models a one-way write boundary
//! once the fd may be handed to other observers.

use crate::error::{Error, Result};
use rustix::fd::{AsFd, BorrowedFd, OwnedFd};
use rustix::fs::{MemfdFlags, SealFlags};
use rustix::mm::{MapFlags, ProtFlags};
use std::ffi::{c_void, CString};
use std::ptr::NonNull;
use tracing::trace;

/// Release callback for externally-owned pixel memory.
///
/// Invoked exactly once, with the adopted address and the original context
/// value, when the owning bitmap is destroyed.
///
/// # Safety
///
/// The callback is called from [`Drop`]; it must not panic and must only
/// touch the memory the context was constructed to describe.
pub type ReleaseFn = unsafe fn(addr: *mut u8, context: *mut c_void);

/// Tag identifying which backend a bitmap's storage uses.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StorageKind {
    /// Process-heap allocation.
    Heap,
    /// Anonymous shared memory (memfd), mappable across processes.
    Shared,
    /// Externally-owned memory with a caller-supplied release callback.
    External,
    /// Hardware-buffer backing. Reserved; has no active implementation and
    /// no allocator, and its pixel address is null.
    Hardware,
}

/// Owned pixel memory behind a bitmap.
///
/// The variant never changes after construction. Dropping the storage runs
/// exactly one backend-specific teardown path: the heap buffer is freed,
/// the shared region is unmapped and its descriptor closed, or the external
/// release callback fires with its original context.
pub(crate) enum PixelStorage {
    /// Zero-initialized buffer owned by the process heap.
    Heap(Box<[u8]>),
    /// Memory-mapped anonymous shared region.
    Shared {
        /// Start of the mapping.
        ptr: NonNull<u8>,
        /// The sealed memfd descriptor.
        fd: OwnedFd,
        /// Mapped byte size; fixed at allocation, never resized.
        size: usize,
    },
    /// Memory this crate does not own.
    External {
        /// Adopted pixel address.
        addr: *mut u8,
        /// Opaque value handed back to the release callback.
        context: *mut c_void,
        /// Invoked exactly once at teardown.
        release: ReleaseFn,
    },
    /// Reserved hardware-buffer variant.
    #[allow(dead_code)]
    Hardware,
}

impl PixelStorage {
    /// Allocate a zero-initialized heap buffer of `size` bytes.
    ///
    /// Heap exhaustion is surfaced as [`Error::AllocationFailed`] rather
    /// than an abort, so callers can fall back.
    pub(crate) fn new_heap(size: usize) -> Result<Self> {
        let mut data = Vec::new();
        data.try_reserve_exact(size)
            .map_err(|_| Error::AllocationFailed(format!("heap allocation of {size} bytes failed")))?;
        data.resize(size, 0);
        trace!(size, "allocated heap pixel storage");
        Ok(Self::Heap(data.into_boxed_slice()))
    }

    /// Create a named anonymous shared-memory region of `size` bytes,
    /// map it read-write, and seal the descriptor against future writable
    /// mappings.
    ///
    /// The sealing step is irreversible. If any step fails partway, the
    /// region is unmapped and the descriptor closed, so a descriptor never
    /// leaks a writable capability after a failed downgrade.
    pub(crate) fn new_shared(name: &str, size: usize) -> Result<Self> {
        if size == 0 {
            return Err(Error::AllocationFailed(
                "shared region size must be greater than 0".into(),
            ));
        }

        let cname = CString::new(name).map_err(|e| Error::AllocationFailed(e.to_string()))?;
        let fd = rustix::fs::memfd_create(
            &cname,
            MemfdFlags::CLOEXEC | MemfdFlags::ALLOW_SEALING,
        )?;

        // Set the size. Failure drops the fd, which closes it.
        rustix::fs::ftruncate(&fd, size as u64)?;

        // Map read-write with MAP_SHARED; this mapping stays writable after
        // the seal below.
        let ptr = unsafe {
            rustix::mm::mmap(
                std::ptr::null_mut(),
                size,
                ProtFlags::READ | ProtFlags::WRITE,
                MapFlags::SHARED,
                &fd,
                0,
            )?
        };

        let ptr = NonNull::new(ptr.cast::<u8>())
            .ok_or_else(|| Error::AllocationFailed("mmap returned null".into()))?;

        // One-way write boundary: from here on, no new writable mapping can
        // be established from the descriptor.
        if let Err(errno) = rustix::fs::fcntl_add_seals(&fd, SealFlags::FUTURE_WRITE) {
            unsafe {
                let _ = rustix::mm::munmap(ptr.as_ptr().cast(), size);
            }
            return Err(errno.into());
        }

        trace!(size, name, "allocated sealed shared pixel storage");
        Ok(Self::Shared { ptr, fd, size })
    }

    /// Raw pixel address for this backend.
    ///
    /// This is the single point where the backend variant resolves to a
    /// flat pointer. The reserved hardware variant reports null.
    pub(crate) fn as_ptr(&self) -> *mut u8 {
        match self {
            Self::Heap(data) => data.as_ptr() as *mut u8,
            Self::Shared { ptr, .. } => ptr.as_ptr(),
            Self::External { addr, .. } => *addr,
            Self::Hardware => std::ptr::null_mut(),
        }
    }

    /// Which backend this storage uses.
    pub(crate) fn kind(&self) -> StorageKind {
        match self {
            Self::Heap(_) => StorageKind::Heap,
            Self::Shared { .. } => StorageKind::Shared,
            Self::External { .. } => StorageKind::External,
            Self::Hardware => StorageKind::Hardware,
        }
    }

    /// The shared-memory descriptor, if this is the shared backend.
    pub(crate) fn shared_fd(&self) -> Option<BorrowedFd<'_>> {
        match self {
            Self::Shared { fd, .. } => Some(fd.as_fd()),
            _ => None,
        }
    }

    /// Exact byte size recorded at allocation, where the backend tracks one.
    pub(crate) fn allocated_size(&self) -> Option<usize> {
        match self {
            Self::Heap(data) => Some(data.len()),
            Self::Shared { size, .. } => Some(*size),
            _ => None,
        }
    }
}

impl Drop for PixelStorage {
    fn drop(&mut self) {
        match self {
            // Box frees the buffer.
            Self::Heap(_) => {}
            Self::Shared { ptr, size, .. } => {
                trace!(size = *size, "unmapping shared pixel storage");
                // Unmap, then the OwnedFd closes the descriptor.
                unsafe {
                    let _ = rustix::mm::munmap(ptr.as_ptr().cast(), *size);
                }
            }
            Self::External {
                addr,
                context,
                release,
            } => {
                // Drop runs at most once, so the callback fires exactly once.
                unsafe { (*release)(*addr, *context) }
            }
            Self::Hardware => {}
        }
    }
}
