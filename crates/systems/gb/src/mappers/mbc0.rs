//! ROM-only cartridges (types 0x00, 0x08, 0x09).
//!
//! 32KiB mapped straight through; writes to the ROM range do nothing. The
//! rare RAM variants expose up to 8KiB at 0xA000 with no enable register.

use crate::cartridge::{Cartridge, CartridgeError, CartridgeHeader, CartridgeState};

use super::{BankedRom, ExternalRam};

#[derive(Debug)]
pub struct Mbc0 {
    header: CartridgeHeader,
    rom: BankedRom,
    ram: ExternalRam,
}

impl Mbc0 {
    pub fn new(header: CartridgeHeader, rom: Vec<u8>, ram: ExternalRam) -> Self {
        Self {
            header,
            rom: BankedRom::new(rom),
            ram,
        }
    }
}

impl Cartridge for Mbc0 {
    fn read(&self, addr: u16) -> u8 {
        match addr {
            0x0000..=0x3FFF => self.rom.read(0, addr),
            0x4000..=0x7FFF => self.rom.read(1, addr),
            0xA000..=0xBFFF => self.ram.read(0, addr),
            _ => 0xFF,
        }
    }

    fn write(&mut self, addr: u16, val: u8) {
        if let 0xA000..=0xBFFF = addr {
            self.ram.write(0, addr, val);
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
            rom_bank: 1,
            ram_enabled: true,
            ram: self.ram.bytes().to_vec(),
            ..CartridgeState::default()
        }
    }

    fn restore(&mut self, state: &CartridgeState) -> Result<(), CartridgeError> {
        self.ram.check(&state.ram)?;
        self.ram.replace(&state.ram);
        Ok(())
    }
}
