//! The bitmap entity: one pixel storage backend, one mutable descriptor.
//!
//! A [`Bitmap`] owns exactly one [`StorageKind`] backend for its lifetime.
//! Reconfiguration may reinterpret the same memory under a new
//! width/height/format any number of times, but never changes the backend.
//! Consumers read pixels through the cached locked state, which is primed at
//! construction and refreshed by every reconfiguration, so first access is
//! cheap and no separate lock call is needed.
//!
//! "Locking" here means "resolve and cache the current pixel pointer", not
//! mutual exclusion. The crate provides no internal serialization; callers
//! that reconfigure concurrently with readers must serialize themselves.

use crate::error::Result;
use crate::info::{AlphaType, ColorType, ImageInfo};
use crate::palette::Palette;
use crate::size::compute_allocation_size;
use crate::storage::{PixelStorage, ReleaseFn, StorageKind};
use rustix::fd::BorrowedFd;
use std::ffi::c_void;
use std::sync::Arc;

/// The cached (pointer, stride, palette) triple a bitmap exposes on demand.
///
/// Obtaining this always succeeds; allocation failures are caught at
/// construction time, not at access time.
#[derive(Clone, Debug)]
pub struct LockedPixels {
    /// Current pixel address. Null only for the reserved hardware backend.
    pub addr: *mut u8,
    /// Current row stride in bytes.
    pub row_bytes: usize,
    /// Current palette table, present only for indexed color types.
    pub palette: Option<Arc<Palette>>,
}

/// Base pixel-reference contract a bitmap fulfills.
///
/// Canvas and upload collaborators consume pixel memory through this seam
/// without knowing which backend holds the bytes. Other pixel owners can
/// implement it and be adopted wholesale via [`Bitmap::from_pixel_ref`].
pub trait PixelRef {
    /// Logical format of the pixels.
    fn info(&self) -> &ImageInfo;

    /// Row stride in bytes.
    fn row_bytes(&self) -> usize;

    /// Resolve the current pixel pointer, stride, and palette.
    fn lock_pixels(&self) -> LockedPixels;
}

/// Cached pixel-access state, re-applied by every reconfiguration.
#[derive(Clone, Copy)]
struct PixelRec {
    addr: *mut u8,
    row_bytes: usize,
}

/// A reference-counted-friendly bitmap owning its pixel memory.
///
/// Constructed through one of the factories ([`Bitmap::allocate_heap`],
/// [`Bitmap::allocate_shared`], [`Bitmap::from_external`],
/// [`Bitmap::from_pixel_ref`]); share across threads with `Arc<Bitmap>`.
/// Destruction releases the owned backend resource exactly once.
pub struct Bitmap {
    /// Fixed at construction; never changes.
    storage: PixelStorage,
    info: ImageInfo,
    row_bytes: usize,
    palette: Option<Arc<Palette>>,
    pixels: PixelRec,
    has_hardware_mipmap: bool,
}

impl Bitmap {
    /// Allocate a heap bitmap at the descriptor's minimum stride.
    ///
    /// # Errors
    ///
    /// Returns an error if the size computation overflows or the heap
    /// allocation fails.
    ///
    /// # Panics
    ///
    /// Panics if the descriptor's color type is [`ColorType::Unknown`].
    pub fn allocate_heap(info: &ImageInfo) -> Result<Bitmap> {
        Self::allocate_heap_with(info, info.min_row_bytes(), None)
    }

    /// Allocate a heap bitmap with an explicit stride and optional palette.
    ///
    /// The pixel buffer is zero-initialized. The supplied `row_bytes` is
    /// authoritative and is not recomputed from the descriptor.
    ///
    /// # Errors
    ///
    /// Returns an error if the size computation overflows or the heap
    /// allocation fails.
    ///
    /// # Panics
    ///
    /// Panics if the descriptor's color type is [`ColorType::Unknown`].
    pub fn allocate_heap_with(
        info: &ImageInfo,
        row_bytes: usize,
        palette: Option<Arc<Palette>>,
    ) -> Result<Bitmap> {
        Self::allocate(info, row_bytes, palette, PixelStorage::new_heap)
    }

    /// Allocate a bitmap backed by anonymous shared memory.
    ///
    /// The region is created via memfd, mapped read-write, and then sealed
    /// so no new writable mapping can be established from the descriptor
    /// (see [`Bitmap::shared_fd`]). Write access remains available through
    /// this bitmap's own mapping.
    ///
    /// # Errors
    ///
    /// Returns an error if the size computation overflows, or if region
    /// creation, mapping, or sealing fails. Partial failures unwind fully;
    /// no descriptor or mapping leaks.
    ///
    /// # Panics
    ///
    /// Panics if the descriptor's color type is [`ColorType::Unknown`].
    pub fn allocate_shared(
        info: &ImageInfo,
        row_bytes: usize,
        palette: Option<Arc<Palette>>,
    ) -> Result<Bitmap> {
        Self::allocate(info, row_bytes, palette, |size| {
            PixelStorage::new_shared("bitmap", size)
        })
    }

    /// Adopt externally-owned pixel memory without allocating.
    ///
    /// `release` is invoked exactly once, with `addr` and the original
    /// `context`, when the bitmap is destroyed, regardless of how many
    /// reconfigurations happen in between.
    ///
    /// # Safety
    ///
    /// The caller must ensure `addr` points to at least
    /// `row_bytes * info.height()` bytes that stay valid until `release`
    /// is called, and that `release` is sound to call with `context` from
    /// any thread.
    pub unsafe fn from_external(
        addr: *mut u8,
        context: *mut c_void,
        release: ReleaseFn,
        info: &ImageInfo,
        row_bytes: usize,
        palette: Option<Arc<Palette>>,
    ) -> Bitmap {
        Self::new(
            PixelStorage::External {
                addr,
                context,
                release,
            },
            *info,
            row_bytes,
            palette,
        )
    }

    /// Adopt another pixel reference, retaining it until this bitmap drops.
    ///
    /// The `Arc` is held for the bitmap's lifetime and released exactly once
    /// at teardown, through the external backend's release path.
    pub fn from_pixel_ref(pixel_ref: Arc<dyn PixelRef + Send + Sync>) -> Bitmap {
        let locked = pixel_ref.lock_pixels();
        let info = *pixel_ref.info();
        let row_bytes = pixel_ref.row_bytes();

        // Double-box so the fat Arc pointer fits the thin context slot.
        let context = Box::into_raw(Box::new(pixel_ref)) as *mut c_void;

        // SAFETY: the retained Arc keeps the referenced pixels alive until
        // release_pixel_ref drops it at teardown.
        unsafe {
            Self::from_external(
                locked.addr,
                context,
                release_pixel_ref,
                &info,
                row_bytes,
                locked.palette,
            )
        }
    }

    /// Common allocation entry: size check, backend allocation, priming lock.
    fn allocate(
        info: &ImageInfo,
        row_bytes: usize,
        palette: Option<Arc<Palette>>,
        backend: impl FnOnce(usize) -> Result<PixelStorage>,
    ) -> Result<Bitmap> {
        assert!(
            info.color_type() != ColorType::Unknown,
            "unknown bitmap configuration"
        );

        // The caller's row_bytes is authoritative; never recompute it here.
        let size = compute_allocation_size(row_bytes, info.height())?;
        let storage = backend(size)?;
        Ok(Self::new(storage, *info, row_bytes, palette))
    }

    fn new(
        storage: PixelStorage,
        info: ImageInfo,
        row_bytes: usize,
        palette: Option<Arc<Palette>>,
    ) -> Self {
        let mut bitmap = Self {
            storage,
            info,
            row_bytes: 0,
            palette: None,
            pixels: PixelRec {
                addr: std::ptr::null_mut(),
                row_bytes: 0,
            },
            has_hardware_mipmap: false,
        };
        // Prime the locked-pixel state so first access is cheap.
        bitmap.reconfigure(info, row_bytes, palette);
        bitmap
    }

    /// Reinterpret this bitmap's memory under a new descriptor and stride.
    ///
    /// The backend never changes; only the descriptor, stride, and palette
    /// reference do. A palette is retained only when the new color type is
    /// [`ColorType::Index8`]; any other color type clears it. The alpha
    /// type is validated against the new color type and normalized to its
    /// canonical value where required (a non-opaque RGB565 becomes opaque).
    /// The cached pixel state is re-applied, so a subsequent
    /// [`PixelRef::lock_pixels`] reflects the new configuration immediately.
    ///
    /// # Panics
    ///
    /// Panics if no valid alpha type can be derived for the new color type.
    /// That signals a malformed descriptor from a trusted caller, not a
    /// recoverable condition.
    pub fn reconfigure(
        &mut self,
        new_info: ImageInfo,
        row_bytes: usize,
        mut palette: Option<Arc<Palette>>,
    ) {
        if !new_info.color_type().is_indexed() {
            palette = None;
        }

        let alpha_type = new_info
            .color_type()
            .validate_alpha_type(new_info.alpha_type())
            .unwrap_or_else(|| {
                panic!(
                    "no valid alpha type for color type {:?} (requested {:?})",
                    new_info.color_type(),
                    new_info.alpha_type()
                )
            });

        // Dropping the old Arc releases the previous palette reference.
        self.palette = palette;
        self.row_bytes = row_bytes;
        self.info = new_info.with_alpha_type(alpha_type);

        // Re-apply the (possibly unchanged) backend pointer and new stride
        // into the cached pixel-access state.
        self.pixels = PixelRec {
            addr: self.storage.as_ptr(),
            row_bytes,
        };
    }

    /// Reconfigure to a new descriptor at its minimum stride, no palette.
    pub fn reconfigure_info(&mut self, new_info: ImageInfo) {
        self.reconfigure(new_info, new_info.min_row_bytes(), None);
    }

    /// Update just the alpha type, leaving stride, backend, and palette
    /// untouched.
    ///
    /// Unlike [`Bitmap::reconfigure`], an alpha type that is invalid for the
    /// current color type is a silent no-op rather than a panic.
    pub fn set_alpha_type(&mut self, alpha_type: AlphaType) {
        if let Some(normalized) = self.info.color_type().validate_alpha_type(alpha_type) {
            self.info = self.info.with_alpha_type(normalized);
        }
    }

    /// Width in pixels.
    #[inline]
    pub fn width(&self) -> i32 {
        self.info.width()
    }

    /// Height in rows.
    #[inline]
    pub fn height(&self) -> i32 {
        self.info.height()
    }

    /// Which storage backend holds the pixels.
    #[inline]
    pub fn storage_kind(&self) -> StorageKind {
        self.storage.kind()
    }

    /// Current palette table, present only for indexed color types.
    #[inline]
    pub fn palette(&self) -> Option<&Arc<Palette>> {
        self.palette.as_ref()
    }

    /// The shared-memory descriptor, if this bitmap uses the shared backend.
    ///
    /// The descriptor is sealed: it can be passed to other processes for
    /// read-only mapping, but no new writable mapping can be made from it.
    #[inline]
    pub fn shared_fd(&self) -> Option<BorrowedFd<'_>> {
        self.storage.shared_fd()
    }

    /// Total bytes owned by the backend.
    ///
    /// The heap backend records its exact allocation size; other backends
    /// derive `row_bytes * height`.
    pub fn allocation_byte_count(&self) -> usize {
        match self.storage.kind() {
            StorageKind::Heap => self.storage.allocated_size().unwrap_or(0),
            _ => self.row_bytes * self.info.height().max(0) as usize,
        }
    }

    /// Bytes actually addressed by pixel data at the current stride.
    ///
    /// Smaller than [`Bitmap::allocation_byte_count`] when the stride is
    /// padded, since the last row counts only `width * bytes_per_pixel`.
    pub fn safe_byte_count(&self) -> usize {
        self.info.safe_size(self.row_bytes)
    }

    /// Whether a consumer has built hardware mipmaps for this bitmap.
    ///
    /// Informational only; set by GPU upload collaborators.
    #[inline]
    pub fn has_hardware_mipmap(&self) -> bool {
        self.has_hardware_mipmap
    }

    /// Record whether hardware mipmaps exist for this bitmap.
    #[inline]
    pub fn set_has_hardware_mipmap(&mut self, has_mipmap: bool) {
        self.has_hardware_mipmap = has_mipmap;
    }

    /// View the owned pixel bytes as a slice.
    ///
    /// The slice covers [`Bitmap::allocation_byte_count`] bytes.
    ///
    /// # Safety
    ///
    /// The caller must ensure no concurrent writer exists, and, for the
    /// external backend, that the adopted memory really spans that many
    /// bytes.
    pub unsafe fn as_slice(&self) -> &[u8] {
        // SAFETY: caller guarantees the memory is valid and unaliased.
        unsafe { std::slice::from_raw_parts(self.pixels.addr, self.allocation_byte_count()) }
    }
}

impl PixelRef for Bitmap {
    #[inline]
    fn info(&self) -> &ImageInfo {
        &self.info
    }

    #[inline]
    fn row_bytes(&self) -> usize {
        self.pixels.row_bytes
    }

    fn lock_pixels(&self) -> LockedPixels {
        LockedPixels {
            addr: self.pixels.addr,
            row_bytes: self.pixels.row_bytes,
            palette: self.palette.clone(),
        }
    }
}

/// Release path for [`Bitmap::from_pixel_ref`]: drops the retained Arc.
unsafe fn release_pixel_ref(_addr: *mut u8, context: *mut c_void) {
    // SAFETY: context was produced by Box::into_raw in from_pixel_ref and
    // this path runs exactly once, from PixelStorage's Drop.
    drop(unsafe { Box::from_raw(context as *mut Arc<dyn PixelRef + Send + Sync>) });
}

impl std::fmt::Debug for Bitmap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bitmap")
            .field("storage", &self.storage.kind())
            .field("info", &self.info)
            .field("row_bytes", &self.row_bytes)
            .field("palette", &self.palette.as_ref().map(|p| p.len()))
            .finish()
    }
}

// SAFETY: the heap and shared backends own their memory outright and the
// external backend's constructor is unsafe, with the caller promising the
// release callback and adopted memory are usable from any thread. The crate
// performs no unsynchronized interior mutation; reconfiguration requires
// &mut self.
unsafe impl Send for Bitmap {}
unsafe impl Sync for Bitmap {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::ffi::c_void;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn rgba(width: i32, height: i32) -> ImageInfo {
        ImageInfo::new(width, height, ColorType::Rgba8888, AlphaType::Premul)
    }

    fn indexed(width: i32, height: i32) -> ImageInfo {
        ImageInfo::new(width, height, ColorType::Index8, AlphaType::Premul)
    }

    #[test]
    fn test_heap_allocation_scenario() {
        // 100x100 at 4 bytes/pixel, stride 400 -> 40000 bytes, all zero.
        let bitmap = Bitmap::allocate_heap(&rgba(100, 100)).unwrap();

        assert_eq!(bitmap.storage_kind(), StorageKind::Heap);
        assert_eq!(bitmap.allocation_byte_count(), 40_000);
        assert_eq!(bitmap.row_bytes(), 400);

        let locked = bitmap.lock_pixels();
        assert!(!locked.addr.is_null());
        assert!(locked.palette.is_none());

        let pixels = unsafe { bitmap.as_slice() };
        assert_eq!(pixels.len(), 40_000);
        assert!(pixels.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_heap_allocation_padded_stride() {
        let bitmap = Bitmap::allocate_heap_with(&rgba(100, 100), 512, None).unwrap();
        assert_eq!(bitmap.allocation_byte_count(), 51_200);
        assert_eq!(bitmap.safe_byte_count(), 99 * 512 + 400);
    }

    #[test]
    fn test_oversized_request_fails_before_allocation() {
        let result = Bitmap::allocate_heap_with(&rgba(100, 2), i32::MAX as usize, None);
        assert!(matches!(result, Err(Error::SizeOverflow { .. })));
    }

    #[test]
    #[should_panic(expected = "unknown bitmap configuration")]
    fn test_unknown_color_type_is_fatal() {
        let info = ImageInfo::new(8, 8, ColorType::Unknown, AlphaType::Premul);
        let _ = Bitmap::allocate_heap_with(&info, 32, None);
    }

    #[test]
    fn test_shared_allocation() {
        let bitmap = Bitmap::allocate_shared(&rgba(64, 64), 256, None).unwrap();
        assert_eq!(bitmap.storage_kind(), StorageKind::Shared);
        assert!(bitmap.shared_fd().is_some());

        // Writable through the creator's own mapping.
        let locked = bitmap.lock_pixels();
        unsafe {
            *locked.addr = 7;
            assert_eq!(bitmap.as_slice()[0], 7);
        }
    }

    #[test]
    fn test_reconfigure_clears_palette_for_non_indexed() {
        let palette = Palette::shared(vec![0xFF00_0000; 4]);
        let bitmap =
            Bitmap::allocate_heap_with(&indexed(16, 16), 16, Some(Arc::clone(&palette))).unwrap();
        assert!(bitmap.palette().is_some());
        assert_eq!(Arc::strong_count(&palette), 2);

        let mut bitmap = bitmap;
        bitmap.reconfigure(rgba(8, 8), 32, Some(Arc::clone(&palette)));

        assert!(bitmap.palette().is_none());
        assert!(bitmap.lock_pixels().palette.is_none());
        assert_eq!(Arc::strong_count(&palette), 1);
    }

    #[test]
    fn test_reconfigure_retains_exact_palette() {
        let first = Palette::shared(vec![1, 2, 3]);
        let second = Palette::shared(vec![4, 5, 6]);

        let mut bitmap =
            Bitmap::allocate_heap_with(&indexed(16, 16), 16, Some(Arc::clone(&first))).unwrap();
        assert!(Arc::ptr_eq(bitmap.palette().unwrap(), &first));

        // Swapping palettes releases the old reference.
        bitmap.reconfigure(indexed(16, 16), 16, Some(Arc::clone(&second)));
        assert!(Arc::ptr_eq(bitmap.palette().unwrap(), &second));
        assert_eq!(Arc::strong_count(&first), 1);
        assert_eq!(Arc::strong_count(&second), 2);
    }

    #[test]
    fn test_reconfigure_normalizes_alpha() {
        let mut bitmap = Bitmap::allocate_heap(&rgba(8, 8)).unwrap();
        let info = ImageInfo::new(8, 8, ColorType::Rgb565, AlphaType::Premul);
        bitmap.reconfigure(info, 16, None);

        // Non-opaque RGB565 is normalized, never stored.
        assert_eq!(bitmap.info().alpha_type(), AlphaType::Opaque);
        assert_eq!(bitmap.info().color_type(), ColorType::Rgb565);
    }

    #[test]
    #[should_panic(expected = "no valid alpha type")]
    fn test_reconfigure_underivable_alpha_is_fatal() {
        let mut bitmap = Bitmap::allocate_heap(&rgba(8, 8)).unwrap();
        bitmap.reconfigure(
            ImageInfo::new(8, 8, ColorType::Rgba8888, AlphaType::Unknown),
            32,
            None,
        );
    }

    #[test]
    fn test_reconfigure_updates_locked_state() {
        let mut bitmap = Bitmap::allocate_heap_with(&rgba(100, 100), 512, None).unwrap();
        let before = bitmap.lock_pixels();

        bitmap.reconfigure(rgba(50, 50), 200, None);
        let after = bitmap.lock_pixels();

        // Same backend memory, new stride, no explicit lock call needed.
        assert_eq!(before.addr, after.addr);
        assert_eq!(after.row_bytes, 200);
        assert_eq!(bitmap.width(), 50);
        assert_eq!(bitmap.height(), 50);
    }

    #[test]
    fn test_set_alpha_type_valid() {
        let mut bitmap = Bitmap::allocate_heap(&rgba(8, 8)).unwrap();
        bitmap.set_alpha_type(AlphaType::Unpremul);
        assert_eq!(bitmap.info().alpha_type(), AlphaType::Unpremul);
    }

    #[test]
    fn test_set_alpha_type_invalid_is_noop() {
        let mut bitmap = Bitmap::allocate_heap(&rgba(8, 8)).unwrap();
        bitmap.set_alpha_type(AlphaType::Unknown);
        // Silent no-op, unlike the fatal full reconfiguration path.
        assert_eq!(bitmap.info().alpha_type(), AlphaType::Premul);
    }

    #[test]
    fn test_external_release_once_with_context() {
        unsafe fn bump(_addr: *mut u8, context: *mut c_void) {
            // SAFETY: context points at the counter below.
            let counter = unsafe { &*(context as *const AtomicUsize) };
            counter.fetch_add(1, Ordering::SeqCst);
        }

        let counter = AtomicUsize::new(0);
        let mut buf = [0u8; 256];

        let mut bitmap = unsafe {
            Bitmap::from_external(
                buf.as_mut_ptr(),
                &counter as *const _ as *mut c_void,
                bump,
                &rgba(8, 8),
                32,
                None,
            )
        };
        assert_eq!(bitmap.storage_kind(), StorageKind::External);

        // Reconfigurations never re-trigger or skip the release.
        bitmap.reconfigure(rgba(4, 4), 16, None);
        bitmap.reconfigure(rgba(2, 2), 8, None);
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        drop(bitmap);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_from_pixel_ref_retains_and_releases() {
        let inner = Arc::new(Bitmap::allocate_heap(&rgba(8, 8)).unwrap());
        let weak = Arc::downgrade(&inner);
        let inner_addr = inner.lock_pixels().addr;

        let adopted =
            Bitmap::from_pixel_ref(inner.clone() as Arc<dyn PixelRef + Send + Sync>);
        drop(inner);

        // The adopted bitmap keeps the source alive and sees its pixels.
        assert!(weak.upgrade().is_some());
        assert_eq!(adopted.lock_pixels().addr, inner_addr);
        assert_eq!(adopted.storage_kind(), StorageKind::External);

        drop(adopted);
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn test_hardware_mipmap_flag() {
        let mut bitmap = Bitmap::allocate_heap(&rgba(8, 8)).unwrap();
        assert!(!bitmap.has_hardware_mipmap());
        bitmap.set_has_hardware_mipmap(true);
        assert!(bitmap.has_hardware_mipmap());
    }

    #[test]
    fn test_debug_format() {
        let bitmap = Bitmap::allocate_heap(&rgba(8, 8)).unwrap();
        let debug = format!("{:?}", bitmap);
        assert!(debug.contains("Bitmap"));
        assert!(debug.contains("Heap"));
    }
}
