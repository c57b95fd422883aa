//! 2bpp planar tile rows.
//!
//! A tile is 8x8 pixels stored in 16 bytes, two bytes per row. The first byte
//! of a row holds bit 0 of each pixel's colour index and the second byte holds
//! bit 1; the leftmost pixel is the most significant bit.

/// One decoded row of a tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileRow {
    lo: u8,
    hi: u8,
}

impl TileRow {
    pub fn new(lo: u8, hi: u8) -> Self {
        Self { lo, hi }
    }

    /// Colour index (0-3) of pixel `x` counted from the left edge.
    #[inline]
    pub fn color_index(&self, x: u8) -> u8 {
        let bit = 7 - (x & 7);
        (((self.hi >> bit) & 1) << 1) | ((self.lo >> bit) & 1)
    }

    /// Mirror the row horizontally.
    pub fn flipped(self) -> Self {
        Self {
            lo: self.lo.reverse_bits(),
            hi: self.hi.reverse_bits(),
        }
    }

    pub fn indices(&self) -> [u8; 8] {
        let mut out = [0; 8];
        for (x, slot) in out.iter_mut().enumerate() {
            *slot = self.color_index(x as u8);
        }
        out
    }
}
