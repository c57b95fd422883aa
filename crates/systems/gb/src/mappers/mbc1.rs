//! MBC1 (types 0x01-0x03)
//!
//! Up to 2MiB ROM and 32KiB RAM.
//!
//! # Register Map
//!
//! - 0x0000-0x1FFF: RAM enable (low nibble 0xA enables)
//! - 0x2000-0x3FFF: ROM bank, low 5 bits (0 selects 1)
//! - 0x4000-0x5FFF: RAM bank, or ROM bank bits 5-6
//! - 0x6000-0x7FFF: Banking mode (0 = ROM, 1 = RAM/advanced)
//!
//! In mode 1 the 2-bit register also selects the bank at 0x0000 and the RAM
//! bank; in mode 0 both are pinned to bank 0.

use crate::cartridge::{Cartridge, CartridgeError, CartridgeHeader, CartridgeState};

use super::{BankedRom, ExternalRam};

#[derive(Debug)]
pub struct Mbc1 {
    header: CartridgeHeader,
    rom: BankedRom,
    ram: ExternalRam,
    ram_enabled: bool,
    rom_bank: u8,
    upper_bits: u8,
    mode: u8,
}

impl Mbc1 {
    pub fn new(header: CartridgeHeader, rom: Vec<u8>, ram: ExternalRam) -> Self {
        Self {
            header,
            rom: BankedRom::new(rom),
            ram,
            ram_enabled: false,
            rom_bank: 1,
            upper_bits: 0,
            mode: 0,
        }
    }

    fn low_bank(&self) -> usize {
        if self.mode == 1 {
            usize::from(self.upper_bits) << 5
        } else {
            0
        }
    }

    fn high_bank(&self) -> usize {
        let low = match self.rom_bank & 0x1F {
            0 => 1,
            n => n,
        };
        usize::from(low) | (usize::from(self.upper_bits) << 5)
    }

    fn ram_bank(&self) -> usize {
        if self.mode == 1 {
            usize::from(self.upper_bits)
        } else {
            0
        }
    }
}

impl Cartridge for Mbc1 {
    fn read(&self, addr: u16) -> u8 {
        match addr {
            0x0000..=0x3FFF => self.rom.read(self.low_bank(), addr),
            0x4000..=0x7FFF => self.rom.read(self.high_bank(), addr),
            0xA000..=0xBFFF if self.ram_enabled => self.ram.read(self.ram_bank(), addr),
            _ => 0xFF,
        }
    }

    fn write(&mut self, addr: u16, val: u8) {
        match addr {
            0x0000..=0x1FFF => self.ram_enabled = val & 0x0F == 0x0A,
            0x2000..=0x3FFF => self.rom_bank = val & 0x1F,
            0x4000..=0x5FFF => self.upper_bits = val & 0x03,
            0x6000..=0x7FFF => self.mode = val & 0x01,
            0xA000..=0xBFFF if self.ram_enabled => {
                let bank = self.ram_bank();
                self.ram.write(bank, addr, val);
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
            rom_bank: u16::from(self.rom_bank),
            ram_bank: self.upper_bits,
            ram_enabled: self.ram_enabled,
            mode: self.mode,
            ram: self.ram.bytes().to_vec(),
            rtc: Vec::new(),
        }
    }

    fn restore(&mut self, state: &CartridgeState) -> Result<(), CartridgeError> {
        self.ram.check(&state.ram)?;
        self.ram.replace(&state.ram);
        self.rom_bank = state.rom_bank as u8 & 0x1F;
        self.upper_bits = state.ram_bank & 0x03;
        self.ram_enabled = state.ram_enabled;
        self.mode = state.mode & 0x01;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cartridge::tests::make_rom;
    use crate::mappers::{RamBankPolicy, RAM_BANK_SIZE, ROM_BANK_SIZE};

    /// 2MiB MBC1 with each bank's first byte set to its number.
    fn make_mbc1(ram_size: usize) -> Mbc1 {
        let mut rom = make_rom(0x03, 6, 3);
        for bank in 1..128 {
            rom[bank * ROM_BANK_SIZE] = bank as u8;
        }
        let header = CartridgeHeader::parse(&rom).unwrap();
        Mbc1::new(header, rom, ExternalRam::new(ram_size, RamBankPolicy::Wrap, None))
    }

    #[test]
    fn test_mbc1_default_banks() {
        let mbc = make_mbc1(0);
        assert_eq!(mbc.read(0x0000), 0);
        assert_eq!(mbc.read(0x4000), 1);
    }

    #[test]
    fn test_mbc1_rom_banking() {
        let mut mbc = make_mbc1(0);
        mbc.write(0x2000, 5);
        assert_eq!(mbc.read(0x4000), 5);
        mbc.write(0x2000, 0);
        assert_eq!(mbc.read(0x4000), 1);
        mbc.write(0x2000, 0x3F);
        assert_eq!(mbc.read(0x4000), 31);
    }

    #[test]
    fn test_mbc1_upper_rom_bits() {
        let mut mbc = make_mbc1(0);
        mbc.write(0x2000, 0x02);
        mbc.write(0x4000, 0x01);
        assert_eq!(mbc.read(0x4000), 34);
        assert_eq!(mbc.read(0x0000), 0);

        mbc.write(0x6000, 0x01);
        assert_eq!(mbc.read(0x0000), 32);
    }

    #[test]
    fn test_mbc1_ram_requires_enable() {
        let mut mbc = make_mbc1(0x8000);
        mbc.write(0xA000, 0x42);
        assert_eq!(mbc.read(0xA000), 0xFF);

        mbc.write(0x0000, 0x0A);
        mbc.write(0xA000, 0x42);
        assert_eq!(mbc.read(0xA000), 0x42);

        mbc.write(0x0000, 0x00);
        assert_eq!(mbc.read(0xA000), 0xFF);
    }

    #[test]
    fn test_mbc1_ram_banking_mode() {
        let mut mbc = make_mbc1(0x8000);
        mbc.write(0x0000, 0x0A);
        mbc.write(0x6000, 0x01);
        mbc.write(0x4000, 0x02);
        mbc.write(0xA000, 0x77);
        assert_eq!(mbc.state().ram[2 * RAM_BANK_SIZE], 0x77);

        // Mode 0 pins RAM to bank 0.
        mbc.write(0x6000, 0x00);
        assert_eq!(mbc.read(0xA000), 0x00);
    }

    #[test]
    fn test_mbc1_state_restore() {
        let mut mbc = make_mbc1(0x8000);
        mbc.write(0x2000, 7);
        mbc.write(0x0000, 0x0A);
        let saved = mbc.state();

        let mut other = make_mbc1(0x8000);
        other.restore(&saved).unwrap();
        assert_eq!(other.read(0x4000), 7);
        assert!(other.state().ram_enabled);

        let mut small = make_mbc1(0x2000);
        assert!(matches!(
            small.restore(&saved),
            Err(CartridgeError::RamSizeMismatch { expected: 0x2000, actual: 0x8000 })
        ));
        assert_eq!(small.read(0x4000), 1);
    }
}
