//! Video timing and the per-scanline pixel pipeline.
//!
//! Each visible line walks OAM search (dots 0-80), pixel transfer (81-252)
//! and HBlank (253-455); lines 144-153 are VBlank. A line is rendered in one
//! go when transfer begins, so mid-line register writes land on the next line.

use dmg_core::logging::{log, LogCategory, LogLevel};
use dmg_core::ppu::{DmgPalette, TileRow};
use dmg_core::types::{Frame, Rgb};
use serde::{Deserialize, Serialize};

use crate::interrupts::{Interrupt, Interrupts};

pub const SCREEN_WIDTH: usize = 160;
pub const SCREEN_HEIGHT: usize = 144;
pub const DOTS_PER_LINE: u32 = 456;
pub const LINES_PER_FRAME: u32 = 154;
pub const CYCLES_PER_FRAME: u32 = DOTS_PER_LINE * LINES_PER_FRAME;

pub const VRAM_SIZE: usize = 0x2000;
pub const OAM_SIZE: usize = 0xA0;

const OAM_SEARCH_END: u32 = 80;
const TRANSFER_END: u32 = 252;
const LAST_LINE: u8 = 153;
const MAX_SPRITES_PER_LINE: usize = 10;

// LCDC bits
const LCDC_ENABLE: u8 = 0x80;
const LCDC_WIN_TILEMAP: u8 = 0x40;
const LCDC_WIN_ENABLE: u8 = 0x20;
const LCDC_BG_WIN_TILES: u8 = 0x10;
const LCDC_BG_TILEMAP: u8 = 0x08;
const LCDC_OBJ_SIZE: u8 = 0x04;
const LCDC_OBJ_ENABLE: u8 = 0x02;
const LCDC_BG_WIN_ENABLE: u8 = 0x01;

// STAT bits
const STAT_COINCIDENCE: u8 = 0x04;
const STAT_HBLANK_INT: u8 = 0x08;
const STAT_VBLANK_INT: u8 = 0x10;
const STAT_OAM_INT: u8 = 0x20;
const STAT_LYC_INT: u8 = 0x40;
const STAT_WRITABLE: u8 = 0x78;

// OAM attribute bits
const ATTR_BEHIND_BG: u8 = 0x80;
const ATTR_FLIP_Y: u8 = 0x40;
const ATTR_FLIP_X: u8 = 0x20;
const ATTR_OBP1: u8 = 0x10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    HBlank = 0,
    VBlank = 1,
    OamSearch = 2,
    Transfer = 3,
}

impl Mode {
    /// STAT enable bit that requests an interrupt on entry, if any.
    fn stat_source(self) -> Option<u8> {
        match self {
            Mode::HBlank => Some(STAT_HBLANK_INT),
            Mode::VBlank => Some(STAT_VBLANK_INT),
            Mode::OamSearch => Some(STAT_OAM_INT),
            Mode::Transfer => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Layer {
    Background,
    Window,
    Sprite,
}

fn blank_frame() -> Frame {
    Frame::new(SCREEN_WIDTH as u32, SCREEN_HEIGHT as u32)
}

fn tint(color: Rgb, layer: Layer) -> Rgb {
    let dim = |c: u8| c / 3;
    match layer {
        Layer::Background => Rgb::new(dim(color.r), dim(color.g), color.b),
        Layer::Window => Rgb::new(dim(color.r), color.g, dim(color.b)),
        Layer::Sprite => Rgb::new(color.r, dim(color.g), dim(color.b)),
    }
}

/// Game Boy PPU state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ppu {
    vram: Vec<u8>,
    oam: Vec<u8>,

    /// LCD Control (0xFF40)
    pub lcdc: u8,
    /// Interrupt enables and the coincidence flag; mode bits come from `mode`.
    stat: u8,
    pub scy: u8,
    pub scx: u8,
    ly: u8,
    pub lyc: u8,
    pub bgp: u8,
    pub obp0: u8,
    pub obp1: u8,
    pub wy: u8,
    pub wx: u8,

    dot: u32,
    mode: Mode,

    #[serde(skip, default = "blank_frame")]
    frame: Frame,
    /// Copy of `frame` taken on entering line 144.
    #[serde(skip, default = "blank_frame")]
    completed: Frame,
    #[serde(skip)]
    screen_cleared: bool,
    #[serde(skip)]
    pub debug_colors: bool,
}

impl Default for Ppu {
    fn default() -> Self {
        Self::new()
    }
}

impl Ppu {
    pub fn new() -> Self {
        Self {
            vram: vec![0; VRAM_SIZE],
            oam: vec![0; OAM_SIZE],
            lcdc: 0,
            stat: 0,
            scy: 0,
            scx: 0,
            ly: 0,
            lyc: 0,
            bgp: 0,
            obp0: 0,
            obp1: 0,
            wy: 0,
            wx: 0,
            dot: 0,
            mode: Mode::OamSearch,
            frame: blank_frame(),
            completed: blank_frame(),
            screen_cleared: false,
            debug_colors: false,
        }
    }

    /// Register values after the boot program hands over (STAT reads 0x85).
    pub fn post_boot() -> Self {
        Self {
            lcdc: 0x91,
            stat: 0x04,
            bgp: 0xFC,
            obp0: 0xFF,
            obp1: 0xFF,
            mode: Mode::VBlank,
            ..Self::new()
        }
    }

    /// Buffer the pipeline is drawing into; mid-frame it holds rows from
    /// two frames.
    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    /// Last whole frame, latched at VBlank entry.
    pub fn completed_frame(&self) -> &Frame {
        &self.completed
    }

    pub fn ly(&self) -> u8 {
        self.ly
    }

    pub fn dot(&self) -> u32 {
        self.dot
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn lcd_enabled(&self) -> bool {
        self.lcdc & LCDC_ENABLE != 0
    }

    pub fn vram(&self) -> &[u8] {
        &self.vram
    }

    pub fn oam(&self) -> &[u8] {
        &self.oam
    }

    pub fn read_vram(&self, offset: u16) -> u8 {
        self.vram[offset as usize & (VRAM_SIZE - 1)]
    }

    pub fn write_vram(&mut self, offset: u16, val: u8) {
        self.vram[offset as usize & (VRAM_SIZE - 1)] = val;
    }

    pub fn read_oam(&self, offset: u16) -> u8 {
        self.oam.get(offset as usize).copied().unwrap_or(0xFF)
    }

    pub fn write_oam(&mut self, offset: u16, val: u8) {
        if let Some(slot) = self.oam.get_mut(offset as usize) {
            *slot = val;
        }
    }

    pub fn read_stat(&self) -> u8 {
        0x80 | (self.stat & (STAT_WRITABLE | STAT_COINCIDENCE)) | self.mode as u8
    }

    /// 0xFF40-0xFF4B, except DMA which the bus owns.
    pub fn read_register(&self, addr: u16) -> u8 {
        match addr {
            0xFF40 => self.lcdc,
            0xFF41 => self.read_stat(),
            0xFF42 => self.scy,
            0xFF43 => self.scx,
            0xFF44 => self.ly,
            0xFF45 => self.lyc,
            0xFF47 => self.bgp,
            0xFF48 => self.obp0,
            0xFF49 => self.obp1,
            0xFF4A => self.wy,
            0xFF4B => self.wx,
            _ => 0xFF,
        }
    }

    pub fn write_register(&mut self, addr: u16, val: u8) {
        match addr {
            0xFF40 => self.write_lcdc(val),
            0xFF41 => self.stat = (self.stat & !STAT_WRITABLE) | (val & STAT_WRITABLE),
            0xFF42 => self.scy = val,
            0xFF43 => self.scx = val,
            // LY is read-only
            0xFF44 => {}
            0xFF45 => self.lyc = val,
            0xFF47 => self.bgp = val,
            0xFF48 => self.obp0 = val,
            0xFF49 => self.obp1 = val,
            0xFF4A => self.wy = val,
            0xFF4B => self.wx = val,
            _ => {}
        }
    }

    fn write_lcdc(&mut self, val: u8) {
        let was_on = self.lcd_enabled();
        self.lcdc = val;
        match (was_on, self.lcd_enabled()) {
            (true, false) => {
                log(LogCategory::Ppu, LogLevel::Debug, || {
                    format!("LCD off at LY={}", self.ly)
                });
                self.power_down();
            }
            (false, true) => {
                log(LogCategory::Ppu, LogLevel::Debug, || "LCD on".to_string());
            }
            _ => {}
        }
    }

    fn power_down(&mut self) {
        self.dot = 0;
        self.ly = 0;
        self.mode = Mode::OamSearch;
        if !self.screen_cleared {
            self.frame.fill(Rgb::WHITE);
            self.completed.fill(Rgb::WHITE);
            self.screen_cleared = true;
        }
    }

    fn mode_for_dot(&self) -> Mode {
        if self.ly as usize >= SCREEN_HEIGHT {
            Mode::VBlank
        } else if self.dot <= OAM_SEARCH_END {
            Mode::OamSearch
        } else if self.dot <= TRANSFER_END {
            Mode::Transfer
        } else {
            Mode::HBlank
        }
    }

    /// Advance by `cycles` dots.
    pub fn step(&mut self, cycles: u32, interrupts: &mut Interrupts) {
        if !self.lcd_enabled() {
            self.power_down();
            return;
        }
        self.screen_cleared = false;

        let mode = self.mode_for_dot();
        if mode != self.mode {
            self.mode = mode;
            if mode == Mode::Transfer {
                self.render_line();
            }
            if let Some(source) = mode.stat_source() {
                if self.stat & source != 0 {
                    interrupts.request(Interrupt::LcdStat);
                }
            }
        }

        if self.ly == self.lyc {
            self.stat |= STAT_COINCIDENCE;
            if self.stat & STAT_LYC_INT != 0 {
                interrupts.request(Interrupt::LcdStat);
            }
        } else {
            self.stat &= !STAT_COINCIDENCE;
        }

        self.dot += cycles;
        while self.dot >= DOTS_PER_LINE {
            self.dot -= DOTS_PER_LINE;
            self.ly = if self.ly >= LAST_LINE { 0 } else { self.ly + 1 };
            if self.ly as usize == SCREEN_HEIGHT {
                self.completed.clone_from(&self.frame);
                interrupts.request(Interrupt::VBlank);
            }
        }
    }

    fn tile_row(&self, tile_addr: usize, row: usize) -> TileRow {
        let addr = (tile_addr + row * 2) & (VRAM_SIZE - 1);
        TileRow::new(self.vram[addr], self.vram[(addr + 1) & (VRAM_SIZE - 1)])
    }

    /// VRAM offset of a BG/window tile, honouring the signed 0x8800 mode.
    fn bg_tile_addr(&self, index: u8) -> usize {
        if self.lcdc & LCDC_BG_WIN_TILES != 0 {
            index as usize * 16
        } else {
            0x0800 + (index as i8 as i16 + 128) as usize * 16
        }
    }

    fn map_color_index(&self, map_base: usize, x: u8, y: u8) -> u8 {
        let map_addr = map_base + (y as usize / 8) * 32 + x as usize / 8;
        let tile = self.bg_tile_addr(self.vram[map_addr]);
        self.tile_row(tile, y as usize % 8).color_index(x % 8)
    }

    /// Render line LY into the frame.
    pub fn render_line(&mut self) {
        let line = self.ly;
        if line as usize >= SCREEN_HEIGHT {
            return;
        }

        // Colour index of the BG/window pixel under each column; sprites
        // flagged behind BG only show through index 0.
        let mut bg_index = [0u8; SCREEN_WIDTH];
        let mut row = [Rgb::WHITE; SCREEN_WIDTH];
        let bgp = DmgPalette(self.bgp);

        if self.lcdc & LCDC_BG_WIN_ENABLE != 0 {
            let bg_map = if self.lcdc & LCDC_BG_TILEMAP != 0 { 0x1C00 } else { 0x1800 };
            let win_map = if self.lcdc & LCDC_WIN_TILEMAP != 0 { 0x1C00 } else { 0x1800 };
            let window_on = self.lcdc & LCDC_WIN_ENABLE != 0 && line >= self.wy;

            for (x, (pixel, index)) in row.iter_mut().zip(bg_index.iter_mut()).enumerate() {
                let in_window = window_on && x + 7 >= self.wx as usize;
                let (color, layer) = if in_window {
                    let wx = (x + 7 - self.wx as usize) as u8;
                    (self.map_color_index(win_map, wx, line - self.wy), Layer::Window)
                } else {
                    let bx = (x as u8).wrapping_add(self.scx);
                    let by = line.wrapping_add(self.scy);
                    (self.map_color_index(bg_map, bx, by), Layer::Background)
                };
                *index = color;
                *pixel = self.shade(bgp, color, layer);
            }
        }

        if self.lcdc & LCDC_OBJ_ENABLE != 0 {
            self.render_sprites(line, &bg_index, &mut row);
        }

        self.frame.row_mut(line as u32).copy_from_slice(&row);
    }

    fn shade(&self, palette: DmgPalette, color: u8, layer: Layer) -> Rgb {
        let rgb = palette.rgb(color);
        if self.debug_colors {
            tint(rgb, layer)
        } else {
            rgb
        }
    }

    fn render_sprites(&self, line: u8, bg_index: &[u8; SCREEN_WIDTH], row: &mut [Rgb; SCREEN_WIDTH]) {
        let height: i16 = if self.lcdc & LCDC_OBJ_SIZE != 0 { 16 } else { 8 };
        let line = line as i16;

        let mut visible: Vec<&[u8]> = self
            .oam
            .chunks_exact(4)
            .filter(|entry| {
                let top = entry[0] as i16 - 16;
                line >= top && line < top + height
            })
            .take(MAX_SPRITES_PER_LINE)
            .collect();
        // Stable: equal X keeps OAM order.
        visible.sort_by_key(|entry| entry[1]);

        let mut claimed = [false; SCREEN_WIDTH];
        for entry in visible {
            let (y, x, tile, attrs) = (entry[0], entry[1], entry[2], entry[3]);
            let mut sprite_row = line - (y as i16 - 16);
            if attrs & ATTR_FLIP_Y != 0 {
                sprite_row = height - 1 - sprite_row;
            }
            let tile = if height == 16 { tile & 0xFE } else { tile };
            let mut pixels = self.tile_row(tile as usize * 16, sprite_row as usize);
            if attrs & ATTR_FLIP_X != 0 {
                pixels = pixels.flipped();
            }
            let palette = DmgPalette(if attrs & ATTR_OBP1 != 0 { self.obp1 } else { self.obp0 });

            for px in 0..8u8 {
                let screen_x = x as i16 - 8 + px as i16;
                if !(0..SCREEN_WIDTH as i16).contains(&screen_x) {
                    continue;
                }
                let sx = screen_x as usize;
                let color = pixels.color_index(px);
                if color == 0 || claimed[sx] {
                    continue;
                }
                claimed[sx] = true;
                if attrs & ATTR_BEHIND_BG != 0 && bg_index[sx] != 0 {
                    continue;
                }
                row[sx] = self.shade(palette, color, Layer::Sprite);
            }
        }
    }

    /// Adopt restored registers and memories, keeping host-side settings.
    pub fn restore(&mut self, saved: Ppu) {
        let debug_colors = self.debug_colors;
        let frame = std::mem::replace(&mut self.frame, blank_frame());
        let completed = std::mem::replace(&mut self.completed, blank_frame());
        *self = Ppu {
            frame,
            completed,
            debug_colors,
            screen_cleared: false,
            ..saved
        };
    }
}
