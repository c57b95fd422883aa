//! Game Boy memory bus
//!
//! Address decoding for the whole DMG memory map. The bus owns the small
//! I/O state it special-cases (joypad select, DMA, boot flag, IF/IE) and the
//! video and timer blocks whose registers it forwards; the scheduler steps
//! those blocks directly.
//!
//! # Memory Map
//!
//! ```text
//! $0000-$00FF  Boot program (until $FF50 is written)
//! $0000-$7FFF  Cartridge ROM and bank registers
//! $8000-$9FFF  Video RAM (8KB)
//! $A000-$BFFF  Cartridge RAM / RTC
//! $C000-$DFFF  Work RAM (8KB)
//! $E000-$FDFF  Echo of $C000-$DDFF
//! $FE00-$FE9F  OAM (40 sprites x 4 bytes)
//! $FEA0-$FEFF  Not usable: reads $FF, writes ignored
//! $FF00-$FF7F  I/O Registers
//! $FF80-$FFFE  High RAM
//! $FFFF        Interrupt Enable
//! ```
//!
//! Unhandled I/O addresses (serial, sound, wave RAM) are stored verbatim.

use dmg_core::cpu_lr35902::MemoryLr35902;
use dmg_core::logging::{log, LogCategory, LogLevel};

use crate::cartridge::Cartridge;
use crate::interrupts::{InterruptLines, Interrupts};
use crate::joypad::Joypad;
use crate::ppu::{Ppu, OAM_SIZE};
use crate::timer::Timer;

pub const WRAM_SIZE: usize = 0x2000;
pub const HRAM_SIZE: usize = 0x7F;
pub const IO_SIZE: usize = 0x80;

const REG_P1: u16 = 0xFF00;
const REG_IF: u16 = 0xFF0F;
const REG_DMA: u16 = 0xFF46;
const REG_BOOT: u16 = 0xFF50;

/// Sound registers NR10-NR52 after the boot program.
const POST_BOOT_SOUND: [(u16, u8); 19] = [
    (0xFF10, 0x80),
    (0xFF11, 0xBF),
    (0xFF12, 0xF3),
    (0xFF13, 0xFF),
    (0xFF14, 0xBF),
    (0xFF16, 0x3F),
    (0xFF17, 0x00),
    (0xFF18, 0xFF),
    (0xFF19, 0xBF),
    (0xFF1A, 0x7F),
    (0xFF1B, 0xFF),
    (0xFF1C, 0x9F),
    (0xFF1D, 0xFF),
    (0xFF1E, 0xBF),
    (0xFF20, 0xFF),
    (0xFF21, 0x00),
    (0xFF22, 0x00),
    (0xFF23, 0xBF),
    (0xFF24, 0x77),
];

const POST_BOOT_NR51: u8 = 0xF3;
const POST_BOOT_NR52: u8 = 0xF1;

/// Start-up program served at $0000 while the boot flag is clear.
///
/// Clears VRAM, programs the palettes, sound master and LCDC, loads the
/// documented register values and unmaps itself from $00FE so the next
/// fetch is the cartridge entry point at $0100.
const BOOT_PROGRAM: &[u8] = &[
    0x31, 0xFE, 0xFF, // LD SP,$FFFE
    0xAF, // XOR A
    0x21, 0xFF, 0x9F, // LD HL,$9FFF
    0x32, // clear: LD (HL-),A
    0xCB, 0x7C, // BIT 7,H
    0x20, 0xFB, // JR NZ,clear
    0x3E, 0xF1, 0xE0, 0x26, // NR52
    0x3E, 0xF3, 0xE0, 0x25, // NR51
    0x3E, 0x77, 0xE0, 0x24, // NR50
    0x3E, 0xFC, 0xE0, 0x47, // BGP
    0x3E, 0xFF, 0xE0, 0x48, 0xE0, 0x49, // OBP0, OBP1
    0x3E, 0x91, 0xE0, 0x40, // LCDC
    0x01, 0xB0, 0x01, // LD BC,$01B0
    0xC5, // PUSH BC
    0xF1, // POP AF
    0x01, 0x13, 0x00, // LD BC,$0013
    0x11, 0xD8, 0x00, // LD DE,$00D8
    0x21, 0x4D, 0x01, // LD HL,$014D
];

const fn build_boot_rom() -> [u8; 0x100] {
    let mut rom = [0u8; 0x100];
    let mut i = 0;
    while i < BOOT_PROGRAM.len() {
        rom[i] = BOOT_PROGRAM[i];
        i += 1;
    }
    // LDH ($50),A with A = $01
    rom[0xFE] = 0xE0;
    rom[0xFF] = 0x50;
    rom
}

pub const BOOT_ROM: [u8; 0x100] = build_boot_rom();

/// Game Boy memory bus
pub struct GbBus {
    wram: Vec<u8>,
    hram: Vec<u8>,
    /// Raw I/O space; registers owned by a component are not mirrored here.
    io: Vec<u8>,
    pub interrupts: Interrupts,
    boot_rom_mapped: bool,
    cartridge: Option<Box<dyn Cartridge>>,
    pub ppu: Ppu,
    pub timer: Timer,
    pub joypad: Joypad,
}

impl Default for GbBus {
    fn default() -> Self {
        Self::new()
    }
}

impl GbBus {
    /// Power-on state with the boot program mapped.
    pub fn new() -> Self {
        Self {
            wram: vec![0; WRAM_SIZE],
            hram: vec![0; HRAM_SIZE],
            io: vec![0; IO_SIZE],
            interrupts: Interrupts::default(),
            boot_rom_mapped: true,
            cartridge: None,
            ppu: Ppu::new(),
            timer: Timer::new(),
            joypad: Joypad::new(),
        }
    }

    /// Clear everything except the cartridge and host settings, then either
    /// map the boot program or jump straight to the post-boot I/O state.
    pub fn reset(&mut self, run_boot_rom: bool) {
        let cartridge = self.cartridge.take();
        let debug_colors = self.ppu.debug_colors;
        *self = Self::new();
        self.cartridge = cartridge;
        if !run_boot_rom {
            self.apply_post_boot();
        }
        self.ppu.debug_colors = debug_colors;
    }

    fn apply_post_boot(&mut self) {
        self.boot_rom_mapped = false;
        self.timer = Timer::post_boot();
        self.ppu = Ppu::post_boot();
        self.joypad = Joypad::post_boot();
        self.interrupts = Interrupts::default();
        self.interrupts.write_flag(0xE1);
        for (addr, val) in POST_BOOT_SOUND {
            self.io[io_index(addr)] = val;
        }
        self.io[io_index(0xFF25)] = POST_BOOT_NR51;
        self.io[io_index(0xFF26)] = POST_BOOT_NR52;
        self.io[io_index(REG_DMA)] = 0xFF;
        self.io[io_index(REG_BOOT)] = 0x01;
    }

    pub fn insert_cartridge(&mut self, cartridge: Box<dyn Cartridge>) {
        self.cartridge = Some(cartridge);
    }

    pub fn remove_cartridge(&mut self) -> Option<Box<dyn Cartridge>> {
        self.cartridge.take()
    }

    pub fn cartridge(&self) -> Option<&dyn Cartridge> {
        self.cartridge.as_deref()
    }

    pub fn cartridge_mut(&mut self) -> Option<&mut (dyn Cartridge + 'static)> {
        self.cartridge.as_deref_mut()
    }

    pub fn boot_rom_mapped(&self) -> bool {
        self.boot_rom_mapped
    }

    pub fn wram(&self) -> &[u8] {
        &self.wram
    }

    pub fn hram(&self) -> &[u8] {
        &self.hram
    }

    pub fn io(&self) -> &[u8] {
        &self.io
    }

    /// Overwrite RAM regions from a save state. Lengths are checked by the caller.
    pub(crate) fn restore_memory(&mut self, wram: &[u8], hram: &[u8], io: &[u8], boot_rom_mapped: bool) {
        self.wram.copy_from_slice(wram);
        self.hram.copy_from_slice(hram);
        self.io.copy_from_slice(io);
        self.boot_rom_mapped = boot_rom_mapped;
    }

    /// OAM DMA: copy 160 bytes from `page << 8` in one go.
    fn dma(&mut self, page: u8) {
        let src = (page as u16) << 8;
        for i in 0..OAM_SIZE as u16 {
            let byte = self.read(src.wrapping_add(i));
            self.ppu.write_oam(i, byte);
        }
        log(LogCategory::Bus, LogLevel::Debug, || {
            format!("OAM DMA from {:#06x}", src)
        });
    }

    fn read_io(&self, addr: u16) -> u8 {
        match addr {
            REG_P1 => self.joypad.read(),
            0xFF04..=0xFF07 => self.timer.read_register(addr),
            REG_IF => self.interrupts.read_flag(),
            REG_DMA => self.io[io_index(addr)],
            0xFF40..=0xFF4B => self.ppu.read_register(addr),
            REG_BOOT => 0xFE | (!self.boot_rom_mapped) as u8,
            _ => self.io[io_index(addr)],
        }
    }

    fn write_io(&mut self, addr: u16, val: u8) {
        match addr {
            REG_P1 => self.joypad.write(val),
            0xFF04..=0xFF07 => self.timer.write_register(addr, val),
            REG_IF => self.interrupts.write_flag(val),
            REG_DMA => {
                self.io[io_index(addr)] = val;
                self.dma(val);
            }
            0xFF40..=0xFF4B => self.ppu.write_register(addr, val),
            REG_BOOT => {
                if val != 0 && self.boot_rom_mapped {
                    self.boot_rom_mapped = false;
                    log(LogCategory::Bus, LogLevel::Debug, || "boot program unmapped".to_string());
                }
            }
            _ => self.io[io_index(addr)] = val,
        }
    }
}

fn io_index(addr: u16) -> usize {
    (addr - 0xFF00) as usize
}

impl MemoryLr35902 for GbBus {
    fn read(&self, addr: u16) -> u8 {
        match addr {
            0x0000..=0x00FF if self.boot_rom_mapped => BOOT_ROM[addr as usize],
            0x0000..=0x7FFF | 0xA000..=0xBFFF => self
                .cartridge
                .as_ref()
                .map_or(0xFF, |cart| cart.read(addr)),
            0x8000..=0x9FFF => self.ppu.read_vram(addr - 0x8000),
            0xC000..=0xDFFF => self.wram[(addr - 0xC000) as usize],
            0xE000..=0xFDFF => self.wram[(addr - 0xE000) as usize],
            0xFE00..=0xFE9F => self.ppu.read_oam(addr - 0xFE00),
            0xFEA0..=0xFEFF => 0xFF,
            0xFF00..=0xFF7F => self.read_io(addr),
            0xFF80..=0xFFFE => self.hram[(addr - 0xFF80) as usize],
            0xFFFF => self.interrupts.enable,
        }
    }

    fn write(&mut self, addr: u16, val: u8) {
        match addr {
            0x0000..=0x7FFF | 0xA000..=0xBFFF => {
                if let Some(cart) = self.cartridge.as_mut() {
                    cart.write(addr, val);
                }
            }
            0x8000..=0x9FFF => self.ppu.write_vram(addr - 0x8000, val),
            0xC000..=0xDFFF => self.wram[(addr - 0xC000) as usize] = val,
            0xE000..=0xFDFF => self.wram[(addr - 0xE000) as usize] = val,
            0xFE00..=0xFE9F => self.ppu.write_oam(addr - 0xFE00, val),
            0xFEA0..=0xFEFF => {}
            0xFF00..=0xFF7F => self.write_io(addr, val),
            0xFF80..=0xFFFE => self.hram[(addr - 0xFF80) as usize] = val,
            0xFFFF => self.interrupts.enable = val,
        }
    }
}

impl InterruptLines for GbBus {
    fn interrupts(&self) -> &Interrupts {
        &self.interrupts
    }

    fn interrupts_mut(&mut self) -> &mut Interrupts {
        &mut self.interrupts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cartridge::{self, tests::make_rom, HEADER_END};
    use dmg_core::cpu_lr35902::{CpuLr35902, Reg16};

    fn post_boot_bus() -> GbBus {
        let mut bus = GbBus::new();
        bus.reset(false);
        bus
    }

    #[test]
    fn test_boot_rom_layout() {
        assert!(BOOT_PROGRAM.len() < 0xFE);
        assert_eq!(&BOOT_ROM[0xFE..], &[0xE0, 0x50]);
    }

    #[test]
    fn test_boot_program_hands_over_at_0100() {
        let mut cpu = CpuLr35902::new(GbBus::new());
        cpu.regs.pc = 0;
        cpu.memory.write(0x8123, 0x55);

        let mut steps = 0;
        while cpu.regs.pc != 0x0100 {
            cpu.step().unwrap();
            steps += 1;
            assert!(steps < 100_000, "boot program did not finish");
        }

        assert!(!cpu.memory.boot_rom_mapped());
        assert_eq!(cpu.regs.get16(Reg16::AF), 0x01B0);
        assert_eq!(cpu.regs.get16(Reg16::BC), 0x0013);
        assert_eq!(cpu.regs.get16(Reg16::DE), 0x00D8);
        assert_eq!(cpu.regs.get16(Reg16::HL), 0x014D);
        assert_eq!(cpu.regs.sp, 0xFFFE);
        assert_eq!(cpu.memory.read(0x8123), 0x00);
        assert_eq!(cpu.memory.read(0xFF40), 0x91);
        assert_eq!(cpu.memory.read(0xFF47), 0xFC);
    }

    #[test]
    fn test_boot_flag_is_sticky() {
        let mut bus = GbBus::new();
        let mut rom = make_rom(0x00, 0, 0);
        rom[0x0000] = 0x42;
        bus.insert_cartridge(cartridge::load(rom, None).unwrap());

        assert_eq!(bus.read(0x0000), BOOT_ROM[0]);
        bus.write(0xFF50, 0x01);
        assert_eq!(bus.read(0x0000), 0x42);
        bus.write(0xFF50, 0x00);
        assert!(!bus.boot_rom_mapped());
        assert_eq!(bus.read(0x0000), 0x42);
    }

    #[test]
    fn test_rom_only_routing() {
        let mut rom = make_rom(0x00, 0, 0);
        for (i, byte) in rom.iter_mut().enumerate().skip(HEADER_END) {
            *byte = (i % 253) as u8;
        }
        let mut bus = post_boot_bus();
        bus.insert_cartridge(cartridge::load(rom.clone(), None).unwrap());

        bus.write(0x2000, 0x05);
        bus.write(0x7FFF, 0x99);
        for addr in [0x0000u16, 0x0150, 0x3FFF, 0x4000, 0x7FFF] {
            assert_eq!(bus.read(addr), rom[addr as usize]);
        }
        // No RAM on this cartridge.
        bus.write(0xA000, 0x12);
        assert_eq!(bus.read(0xA000), 0xFF);
    }

    #[test]
    fn test_no_cartridge_reads_ff() {
        let bus = post_boot_bus();
        assert_eq!(bus.read(0x0100), 0xFF);
        assert_eq!(bus.read(0xA000), 0xFF);
    }

    #[test]
    fn test_dma_copies_160_bytes() {
        let mut bus = post_boot_bus();
        for i in 0..0xA0u16 {
            bus.write(0x8000 + i, (i as u8).wrapping_mul(3));
        }
        bus.write(0xFF46, 0x80);
        for i in 0..0xA0u16 {
            assert_eq!(bus.read(0xFE00 + i), (i as u8).wrapping_mul(3));
        }
        assert_eq!(bus.read(0xFF46), 0x80);
    }

    #[test]
    fn test_div_write_resets() {
        let mut bus = post_boot_bus();
        bus.timer.step(1024, &mut bus.interrupts);
        assert_eq!(bus.read(0xFF04), 0xAF);
        bus.write(0xFF04, 0x77);
        assert_eq!(bus.read(0xFF04), 0x00);
    }

    #[test]
    fn test_echo_and_unusable() {
        let mut bus = post_boot_bus();
        bus.write(0xC123, 0x5A);
        assert_eq!(bus.read(0xE123), 0x5A);
        bus.write(0xFDFF, 0xA5);
        assert_eq!(bus.read(0xDDFF), 0xA5);

        bus.write(0xFEA0, 0x11);
        assert_eq!(bus.read(0xFEA0), 0xFF);
        assert_eq!(bus.read(0xFEFF), 0xFF);
    }

    #[test]
    fn test_hram_and_ie() {
        let mut bus = post_boot_bus();
        bus.write(0xFF80, 1);
        bus.write(0xFFFE, 2);
        bus.write(0xFFFF, 0x1F);
        assert_eq!(bus.read(0xFF80), 1);
        assert_eq!(bus.read(0xFFFE), 2);
        assert_eq!(bus.read(0xFFFF), 0x1F);
        assert_eq!(bus.interrupts().enable, 0x1F);
    }

    #[test]
    fn test_post_boot_io() {
        let bus = post_boot_bus();
        assert_eq!(bus.read(0xFF00), 0xCF);
        assert_eq!(bus.read(0xFF04), 0xAB);
        assert_eq!(bus.read(0xFF07), 0xF8);
        assert_eq!(bus.read(0xFF0F), 0xE1);
        assert_eq!(bus.read(0xFF40), 0x91);
        assert_eq!(bus.read(0xFF41), 0x85);
        assert_eq!(bus.read(0xFF47), 0xFC);
        assert_eq!(bus.read(0xFF48), 0xFF);
        assert_eq!(bus.read(0xFF49), 0xFF);
        assert_eq!(bus.read(0xFF10), 0x80);
        assert_eq!(bus.read(0xFF26), 0xF1);
        assert!(!bus.boot_rom_mapped());
    }

    #[test]
    fn test_if_high_bits_read_set() {
        let mut bus = post_boot_bus();
        bus.write(0xFF0F, 0x04);
        assert_eq!(bus.read(0xFF0F), 0xE4);
        assert_eq!(bus.interrupts().flag, 0x04);
    }

    #[test]
    fn test_unhandled_io_is_stored() {
        let mut bus = post_boot_bus();
        bus.write(0xFF01, 0x42);
        bus.write(0xFF30, 0x9C);
        assert_eq!(bus.read(0xFF01), 0x42);
        assert_eq!(bus.read(0xFF30), 0x9C);
    }

    #[test]
    fn test_reset_keeps_cartridge() {
        let mut bus = post_boot_bus();
        bus.insert_cartridge(cartridge::load(make_rom(0x00, 0, 0), None).unwrap());
        bus.ppu.debug_colors = true;
        bus.write(0xC000, 7);
        bus.reset(true);
        assert!(bus.cartridge().is_some());
        assert!(bus.boot_rom_mapped());
        assert!(bus.ppu.debug_colors);
        assert_eq!(bus.read(0xC000), 0);
    }
}
