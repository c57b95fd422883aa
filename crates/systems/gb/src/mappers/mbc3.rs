//! MBC3 (types 0x0F-0x13)
//!
//! Up to 2MiB ROM, 32KiB RAM and, on 0x0F/0x10, a real-time clock.
//!
//! # Register Map
//!
//! - 0x0000-0x1FFF: RAM and RTC enable (low nibble 0xA enables)
//! - 0x2000-0x3FFF: ROM bank, 7 bits (0 selects 1)
//! - 0x4000-0x5FFF: RAM bank 0-3, or RTC register 0x08-0x0C
//! - 0x6000-0x7FFF: Latch clock data (write 0x00 then 0x01)
//!
//! The clock registers hold what the program writes; they do not advance
//! with wall-clock time. Reads return the copy taken by the last latch.

use crate::cartridge::{Cartridge, CartridgeError, CartridgeHeader, CartridgeState};

use super::{BankedRom, ExternalRam};

const RTC_REGISTERS: usize = 5;

#[derive(Debug)]
pub struct Mbc3 {
    header: CartridgeHeader,
    rom: BankedRom,
    ram: ExternalRam,
    enabled: bool,
    rom_bank: u8,
    /// 0x00-0x03 selects RAM, 0x08-0x0C selects a clock register
    select: u8,
    last_latch_write: u8,
    /// S, M, H, DL, DH
    rtc: [u8; RTC_REGISTERS],
    latched: [u8; RTC_REGISTERS],
}

impl Mbc3 {
    pub fn new(header: CartridgeHeader, rom: Vec<u8>, ram: ExternalRam) -> Self {
        Self {
            header,
            rom: BankedRom::new(rom),
            ram,
            enabled: false,
            rom_bank: 1,
            select: 0,
            last_latch_write: 0xFF,
            rtc: [0; RTC_REGISTERS],
            latched: [0; RTC_REGISTERS],
        }
    }

    fn rtc_index(&self) -> Option<usize> {
        match self.select {
            0x08..=0x0C => Some(usize::from(self.select - 0x08)),
            _ => None,
        }
    }
}

impl Cartridge for Mbc3 {
    fn read(&self, addr: u16) -> u8 {
        match addr {
            0x0000..=0x3FFF => self.rom.read(0, addr),
            0x4000..=0x7FFF => self.rom.read(usize::from(self.rom_bank), addr),
            0xA000..=0xBFFF if self.enabled => match self.rtc_index() {
                Some(reg) => self.latched[reg],
                None => self.ram.read(usize::from(self.select), addr),
            },
            _ => 0xFF,
        }
    }

    fn write(&mut self, addr: u16, val: u8) {
        match addr {
            0x0000..=0x1FFF => self.enabled = val & 0x0F == 0x0A,
            0x2000..=0x3FFF => {
                self.rom_bank = match val & 0x7F {
                    0 => 1,
                    n => n,
                }
            }
            0x4000..=0x5FFF => self.select = val,
            0x6000..=0x7FFF => {
                if self.last_latch_write == 0x00 && val == 0x01 {
                    self.latched = self.rtc;
                }
                self.last_latch_write = val;
            }
            0xA000..=0xBFFF if self.enabled => match self.rtc_index() {
                Some(reg) => self.rtc[reg] = val,
                None => {
                    let bank = usize::from(self.select);
                    self.ram.write(bank, addr, val);
                }
            },
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
            ram_bank: self.select,
            ram_enabled: self.enabled,
            mode: self.last_latch_write,
            ram: self.ram.bytes().to_vec(),
            rtc: self.rtc.iter().chain(self.latched.iter()).copied().collect(),
        }
    }

    fn restore(&mut self, state: &CartridgeState) -> Result<(), CartridgeError> {
        self.ram.check(&state.ram)?;
        if state.rtc.len() != RTC_REGISTERS * 2 {
            return Err(CartridgeError::RtcSizeMismatch {
                expected: RTC_REGISTERS * 2,
                actual: state.rtc.len(),
            });
        }
        self.ram.replace(&state.ram);
        self.rtc.copy_from_slice(&state.rtc[..RTC_REGISTERS]);
        self.latched.copy_from_slice(&state.rtc[RTC_REGISTERS..]);
        self.rom_bank = (state.rom_bank as u8 & 0x7F).max(1);
        self.select = state.ram_bank;
        self.enabled = state.ram_enabled;
        self.last_latch_write = state.mode;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cartridge::tests::make_rom;
    use crate::mappers::{RamBankPolicy, RAM_BANK_SIZE, ROM_BANK_SIZE};

    fn make_mbc3(ram_size: usize) -> Mbc3 {
        let mut rom = make_rom(0x10, 5, 3);
        for bank in 1..64 {
            rom[bank * ROM_BANK_SIZE] = bank as u8;
        }
        let header = CartridgeHeader::parse(&rom).unwrap();
        Mbc3::new(header, rom, ExternalRam::new(ram_size, RamBankPolicy::OpenBus, None))
    }

    #[test]
    fn test_mbc3_rom_banking() {
        let mut mbc = make_mbc3(0);
        assert_eq!(mbc.read(0x4000), 1);
        mbc.write(0x2000, 63);
        assert_eq!(mbc.read(0x4000), 63);
        mbc.write(0x2000, 0);
        assert_eq!(mbc.read(0x4000), 1);
    }

    #[test]
    fn test_mbc3_ram_banking() {
        let mut mbc = make_mbc3(0x8000);
        mbc.write(0x0000, 0x0A);
        for bank in 0..4u8 {
            mbc.write(0x4000, bank);
            mbc.write(0xA000, 0x10 + bank);
        }
        let ram = mbc.state().ram;
        for bank in 0..4 {
            assert_eq!(ram[bank * RAM_BANK_SIZE], 0x10 + bank as u8);
        }
    }

    #[test]
    fn test_mbc3_unmapped_bank_is_open_bus() {
        let mut mbc = make_mbc3(0x2000);
        mbc.write(0x0000, 0x0A);
        mbc.write(0x4000, 0x02);
        mbc.write(0xA000, 0x55);
        assert_eq!(mbc.read(0xA000), 0xFF);
        mbc.write(0x4000, 0x0D);
        assert_eq!(mbc.read(0xA000), 0xFF);
    }

    #[test]
    fn test_mbc3_rtc_latch() {
        let mut mbc = make_mbc3(0x2000);
        mbc.write(0x0000, 0x0A);
        mbc.write(0x4000, 0x08);
        mbc.write(0xA000, 42);
        assert_eq!(mbc.read(0xA000), 0);

        mbc.write(0x6000, 0x00);
        mbc.write(0x6000, 0x01);
        assert_eq!(mbc.read(0xA000), 42);
    }

    #[test]
    fn test_mbc3_disabled_reads_ff() {
        let mbc = make_mbc3(0x2000);
        assert_eq!(mbc.read(0xA000), 0xFF);
    }

    #[test]
    fn test_mbc3_restore_rejects_bad_rtc() {
        let mut mbc = make_mbc3(0x2000);
        let mut state = mbc.state();
        state.rtc.pop();
        assert!(matches!(
            mbc.restore(&state),
            Err(CartridgeError::RtcSizeMismatch { .. })
        ));
    }
}
