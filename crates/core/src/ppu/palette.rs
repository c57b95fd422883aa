//! DMG monochrome palettes.
//!
//! BGP, OBP0 and OBP1 each pack four 2-bit shade numbers, one per colour
//! index, with index 0 in the lowest bits.

use crate::types::Rgb;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shade {
    White,
    LightGray,
    DarkGray,
    Black,
}

impl Shade {
    fn from_bits(bits: u8) -> Self {
        match bits & 3 {
            0 => Shade::White,
            1 => Shade::LightGray,
            2 => Shade::DarkGray,
            _ => Shade::Black,
        }
    }

    pub fn rgb(self) -> Rgb {
        match self {
            Shade::White => Rgb::new(255, 255, 255),
            Shade::LightGray => Rgb::new(170, 170, 170),
            Shade::DarkGray => Rgb::new(85, 85, 85),
            Shade::Black => Rgb::new(0, 0, 0),
        }
    }
}

/// A palette register value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DmgPalette(pub u8);

impl DmgPalette {
    pub fn shade(self, color_index: u8) -> Shade {
        Shade::from_bits(self.0 >> ((color_index & 3) * 2))
    }

    pub fn rgb(self, color_index: u8) -> Rgb {
        self.shade(color_index).rgb()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_palette() {
        // 0xE4 = 11 10 01 00
        let pal = DmgPalette(0xE4);
        assert_eq!(pal.shade(0), Shade::White);
        assert_eq!(pal.shade(1), Shade::LightGray);
        assert_eq!(pal.shade(2), Shade::DarkGray);
        assert_eq!(pal.shade(3), Shade::Black);
    }

    #[test]
    fn test_post_boot_palette() {
        let pal = DmgPalette(0xFC);
        assert_eq!(pal.rgb(0), Rgb::new(255, 255, 255));
        assert_eq!(pal.rgb(1), Rgb::new(0, 0, 0));
    }
}
