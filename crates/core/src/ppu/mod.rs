//! Building blocks for the DMG pixel pipeline: 2bpp tile rows and the
//! four-shade palette registers.

pub mod palette;
pub mod tile;

pub use palette::{DmgPalette, Shade};
pub use tile::TileRow;
