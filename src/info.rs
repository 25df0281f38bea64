//! Image descriptor types.
//!
//! [`ImageInfo`] describes the logical format of a bitmap (width, height,
//! color type, alpha type) independent of how the pixel bytes are stored.
//! The color/alpha compatibility rules live here so that an incompatible
//! pair (for example a non-opaque RGB565) can never be stored on a bitmap.

/// Pixel interpretation of a bitmap's bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ColorType {
    /// Uninitialized or unrecognized format. Allocation with this color
    /// type is a contract violation.
    Unknown,
    /// 8-bit alpha-only.
    Alpha8,
    /// 16-bit RGB, 5-6-5 packing. Fully opaque.
    Rgb565,
    /// 16-bit ARGB, 4 bits per channel.
    Argb4444,
    /// 32-bit RGBA, 8 bits per channel.
    Rgba8888,
    /// 32-bit BGRA, 8 bits per channel.
    Bgra8888,
    /// 8-bit index into a shared [`crate::Palette`].
    Index8,
    /// 8-bit grayscale. Fully opaque.
    Gray8,
    /// 64-bit RGBA, 16-bit half-float per channel.
    RgbaF16,
}

impl ColorType {
    /// Bytes each pixel of this color type occupies.
    #[inline]
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            ColorType::Unknown => 0,
            ColorType::Alpha8 | ColorType::Index8 | ColorType::Gray8 => 1,
            ColorType::Rgb565 | ColorType::Argb4444 => 2,
            ColorType::Rgba8888 | ColorType::Bgra8888 => 4,
            ColorType::RgbaF16 => 8,
        }
    }

    /// Whether pixels of this color type are indices into a palette table.
    #[inline]
    pub const fn is_indexed(self) -> bool {
        matches!(self, ColorType::Index8)
    }

    /// Validate `alpha_type` against this color type, normalizing it to the
    /// canonical value where the color type permits only one interpretation.
    ///
    /// Returns `None` when no valid alpha type can be derived. Opaque-only
    /// color types (`Rgb565`, `Gray8`) always normalize to
    /// [`AlphaType::Opaque`]; `Alpha8` has no color channels to
    /// unpremultiply, so `Unpremul` normalizes to `Premul`; alpha-carrying
    /// color types reject `Unknown`.
    pub fn validate_alpha_type(self, alpha_type: AlphaType) -> Option<AlphaType> {
        match self {
            ColorType::Unknown => Some(AlphaType::Unknown),
            ColorType::Rgb565 | ColorType::Gray8 => Some(AlphaType::Opaque),
            ColorType::Alpha8 => match alpha_type {
                AlphaType::Unknown => None,
                AlphaType::Unpremul => Some(AlphaType::Premul),
                other => Some(other),
            },
            ColorType::Argb4444
            | ColorType::Rgba8888
            | ColorType::Bgra8888
            | ColorType::Index8
            | ColorType::RgbaF16 => match alpha_type {
                AlphaType::Unknown => None,
                other => Some(other),
            },
        }
    }
}

/// How a bitmap's alpha channel is to be interpreted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AlphaType {
    /// Alpha interpretation not yet determined.
    Unknown,
    /// All pixels are fully opaque; the alpha channel (if any) is ignored.
    Opaque,
    /// Color channels are premultiplied by alpha.
    Premul,
    /// Color channels are independent of alpha.
    Unpremul,
}

/// Logical format of a bitmap: dimensions plus color and alpha type.
///
/// `ImageInfo` is a small `Copy` value object. It carries no ownership and
/// says nothing about where the pixel bytes live; see
/// [`crate::storage::StorageKind`] for that.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImageInfo {
    width: i32,
    height: i32,
    color_type: ColorType,
    alpha_type: AlphaType,
}

impl ImageInfo {
    /// Create a new descriptor.
    pub const fn new(width: i32, height: i32, color_type: ColorType, alpha_type: AlphaType) -> Self {
        Self {
            width,
            height,
            color_type,
            alpha_type,
        }
    }

    /// Width in pixels.
    #[inline]
    pub const fn width(&self) -> i32 {
        self.width
    }

    /// Height in rows.
    #[inline]
    pub const fn height(&self) -> i32 {
        self.height
    }

    /// Pixel color type.
    #[inline]
    pub const fn color_type(&self) -> ColorType {
        self.color_type
    }

    /// Alpha interpretation.
    #[inline]
    pub const fn alpha_type(&self) -> AlphaType {
        self.alpha_type
    }

    /// Copy of this descriptor with a different alpha type.
    #[inline]
    pub const fn with_alpha_type(self, alpha_type: AlphaType) -> Self {
        Self { alpha_type, ..self }
    }

    /// Minimum row stride: `width * bytes_per_pixel`.
    #[inline]
    pub fn min_row_bytes(&self) -> usize {
        self.width.max(0) as usize * self.color_type.bytes_per_pixel()
    }

    /// Byte count actually addressed by pixel data at the given stride.
    ///
    /// The last row counts only `width * bytes_per_pixel`, not the full
    /// stride, so this may be smaller than `row_bytes * height`.
    pub fn safe_size(&self, row_bytes: usize) -> usize {
        if self.height <= 0 {
            return 0;
        }
        (self.height as usize - 1) * row_bytes
            + self.width.max(0) as usize * self.color_type.bytes_per_pixel()
    }
}
