//! Shared color table for indexed color types.

use std::sync::Arc;

/// Maximum number of entries a palette may hold (8-bit indices).
pub const MAX_PALETTE_COLORS: usize = 256;

/// A lookup table mapping small integer pixel values to packed
/// premultiplied 32-bit colors.
///
/// Palettes are shared between bitmaps through [`Arc`]; either holder may
/// outlive the other, and the table is freed when the last reference drops.
/// Only bitmaps with [`crate::ColorType::Index8`] carry a palette.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Palette {
    colors: Vec<u32>,
}

impl Palette {
    /// Create a palette from packed premultiplied colors.
    ///
    /// # Panics
    ///
    /// Panics if more than [`MAX_PALETTE_COLORS`] entries are supplied.
    pub fn new(colors: Vec<u32>) -> Self {
        assert!(
            colors.len() <= MAX_PALETTE_COLORS,
            "palette holds at most {} colors, got {}",
            MAX_PALETTE_COLORS,
            colors.len()
        );
        Self { colors }
    }

    /// Create a shared palette directly.
    pub fn shared(colors: Vec<u32>) -> Arc<Self> {
        Arc::new(Self::new(colors))
    }

    /// Number of entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.colors.len()
    }

    /// True if the palette has no entries.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    /// All entries as a slice.
    #[inline]
    pub fn colors(&self) -> &[u32] {
        &self.colors
    }

    /// Look up a single entry.
    #[inline]
    pub fn get(&self, index: usize) -> Option<u32> {
        self.colors.get(index).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_palette_lookup() {
        let palette = Palette::new(vec![0xFF00_00FF, 0xFF00_FF00]);
        assert_eq!(palette.len(), 2);
        assert_eq!(palette.get(0), Some(0xFF00_00FF));
        assert_eq!(palette.get(1), Some(0xFF00_FF00));
        assert_eq!(palette.get(2), None);
    }

    #[test]
    #[should_panic(expected = "palette holds at most")]
    fn test_palette_too_large() {
        let _ = Palette::new(vec![0; MAX_PALETTE_COLORS + 1]);
    }

    #[test]
    fn test_palette_shared_ownership() {
        let palette = Palette::shared(vec![1, 2, 3]);
        let second = Arc::clone(&palette);
        assert_eq!(Arc::strong_count(&palette), 2);
        drop(second);
        assert_eq!(Arc::strong_count(&palette), 1);
    }
}
