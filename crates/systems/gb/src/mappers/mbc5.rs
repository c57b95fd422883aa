//! MBC5 (types 0x19-0x1E)
//!
//! Up to 8MiB ROM and 128KiB RAM.
//!
//! # Register Map
//!
//! - 0x0000-0x1FFF: RAM enable (low nibble 0xA enables)
//! - 0x2000-0x2FFF: ROM bank, low 8 bits
//! - 0x3000-0x3FFF: ROM bank, bit 8
//! - 0x4000-0x5FFF: RAM bank, 4 bits
//!
//! Unlike MBC1/MBC3, bank 0 may be mapped at 0x4000.

use crate::cartridge::{Cartridge, CartridgeError, CartridgeHeader, CartridgeState};

use super::{BankedRom, ExternalRam};

#[derive(Debug)]
pub struct Mbc5 {
    header: CartridgeHeader,
    rom: BankedRom,
    ram: ExternalRam,
    ram_enabled: bool,
    rom_bank: u16,
    ram_bank: u8,
}

impl Mbc5 {
    pub fn new(header: CartridgeHeader, rom: Vec<u8>, ram: ExternalRam) -> Self {
        Self {
            header,
            rom: BankedRom::new(rom),
            ram,
            ram_enabled: false,
            rom_bank: 1,
            ram_bank: 0,
        }
    }
}

impl Cartridge for Mbc5 {
    fn read(&self, addr: u16) -> u8 {
        match addr {
            0x0000..=0x3FFF => self.rom.read(0, addr),
            0x4000..=0x7FFF => self.rom.read(usize::from(self.rom_bank), addr),
            0xA000..=0xBFFF if self.ram_enabled => self.ram.read(usize::from(self.ram_bank), addr),
            _ => 0xFF,
        }
    }

    fn write(&mut self, addr: u16, val: u8) {
        match addr {
            0x0000..=0x1FFF => self.ram_enabled = val & 0x0F == 0x0A,
            0x2000..=0x2FFF => self.rom_bank = (self.rom_bank & 0x100) | u16::from(val),
            0x3000..=0x3FFF => self.rom_bank = (self.rom_bank & 0x0FF) | (u16::from(val & 0x01) << 8),
            0x4000..=0x5FFF => self.ram_bank = val & 0x0F,
            0xA000..=0xBFFF if self.ram_enabled => {
                self.ram.write(usize::from(self.ram_bank), addr, val);
            }
            _ => {}
        }
    }

    fn load_persistent_ram(&mut self) -> Result<(), CartridgeError> {
        self.ram.load_battery()
    }

    fn save_persistent_ram(&self) -> Result<(), CartridgeError> {
        self.ram.save_battery()
    }

    fn header(&self) -> &CartridgeHeader {
        &self.header
    }

    fn state(&self) -> CartridgeState {
        CartridgeState {
            rom_bank: self.rom_bank,
            ram_bank: self.ram_bank,
            ram_enabled: self.ram_enabled,
            mode: 0,
            ram: self.ram.bytes().to_vec(),
            rtc: Vec::new(),
        }
    }

    fn restore(&mut self, state: &CartridgeState) -> Result<(), CartridgeError> {
        self.ram.check(&state.ram)?;
        self.ram.replace(&state.ram);
        self.rom_bank = state.rom_bank & 0x1FF;
        self.ram_bank = state.ram_bank & 0x0F;
        self.ram_enabled = state.ram_enabled;
        Ok(())
    }
}
