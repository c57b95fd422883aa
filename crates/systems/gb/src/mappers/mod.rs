//! Game Boy Memory Bank Controllers (MBCs)
//!
//! Each controller implements [`Cartridge`] on top of two shared pieces:
//! [`BankedRom`] for 16KiB ROM windows and [`ExternalRam`] for the 8KiB RAM
//! window plus its battery file.

mod mbc0;
mod mbc1;
mod mbc3;
mod mbc5;

use std::path::PathBuf;

pub use mbc0::Mbc0;
pub use mbc1::Mbc1;
pub use mbc3::Mbc3;
pub use mbc5::Mbc5;

use crate::cartridge::{self, Cartridge, CartridgeError, CartridgeHeader, Controller};

pub(crate) const ROM_BANK_SIZE: usize = 0x4000;
pub(crate) const RAM_BANK_SIZE: usize = 0x2000;

pub(crate) fn build(
    header: CartridgeHeader,
    rom: Vec<u8>,
    battery: Option<PathBuf>,
) -> Box<dyn Cartridge> {
    match header.controller {
        Controller::RomOnly => {
            let ram = ExternalRam::new(header.ram_size, RamBankPolicy::Wrap, battery);
            Box::new(Mbc0::new(header, rom, ram))
        }
        Controller::Mbc1 => {
            let ram = ExternalRam::new(header.ram_size, RamBankPolicy::Wrap, battery);
            Box::new(Mbc1::new(header, rom, ram))
        }
        Controller::Mbc3 { .. } => {
            let ram = ExternalRam::new(header.ram_size, RamBankPolicy::OpenBus, battery);
            Box::new(Mbc3::new(header, rom, ram))
        }
        Controller::Mbc5 => {
            let ram = ExternalRam::new(header.ram_size, RamBankPolicy::Wrap, battery);
            Box::new(Mbc5::new(header, rom, ram))
        }
    }
}

/// The cartridge ROM, addressed as 16KiB banks.
#[derive(Debug)]
pub struct BankedRom {
    data: Vec<u8>,
}

impl BankedRom {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    pub fn bank_count(&self) -> usize {
        self.data.len().div_ceil(ROM_BANK_SIZE).max(1)
    }

    /// Byte at `addr` (any CPU address, only the low 14 bits are used) in
    /// `bank`. Bank numbers past the end wrap, as unconnected address lines do.
    pub fn read(&self, bank: usize, addr: u16) -> u8 {
        let bank = bank % self.bank_count();
        let offset = bank * ROM_BANK_SIZE + (addr as usize & (ROM_BANK_SIZE - 1));
        self.data.get(offset).copied().unwrap_or(0xFF)
    }
}

/// What a controller does when the selected RAM bank does not exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RamBankPolicy {
    /// Fold the bank number onto the installed RAM.
    Wrap,
    /// Reads return 0xFF and writes are dropped.
    OpenBus,
}

/// Cartridge RAM with optional battery backing.
#[derive(Debug)]
pub struct ExternalRam {
    data: Vec<u8>,
    policy: RamBankPolicy,
    battery: Option<PathBuf>,
}

impl ExternalRam {
    pub fn new(size: usize, policy: RamBankPolicy, battery: Option<PathBuf>) -> Self {
        Self {
            data: vec![0; size],
            policy,
            battery,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    fn offset(&self, bank: usize, addr: u16) -> Option<usize> {
        if self.data.is_empty() {
            return None;
        }
        let offset = bank * RAM_BANK_SIZE + (addr as usize & (RAM_BANK_SIZE - 1));
        match self.policy {
            RamBankPolicy::Wrap => Some(offset % self.data.len()),
            RamBankPolicy::OpenBus => (offset < self.data.len()).then_some(offset),
        }
    }

    pub fn read(&self, bank: usize, addr: u16) -> u8 {
        self.offset(bank, addr).map_or(0xFF, |i| self.data[i])
    }

    pub fn write(&mut self, bank: usize, addr: u16, val: u8) {
        if let Some(i) = self.offset(bank, addr) {
            self.data[i] = val;
        }
    }

    pub fn check(&self, saved: &[u8]) -> Result<(), CartridgeError> {
        if saved.len() != self.data.len() {
            return Err(CartridgeError::RamSizeMismatch {
                expected: self.data.len(),
                actual: saved.len(),
            });
        }
        Ok(())
    }

    pub fn replace(&mut self, saved: &[u8]) {
        self.data.copy_from_slice(saved);
    }

    pub fn load_battery(&mut self) -> Result<(), CartridgeError> {
        let Some(path) = &self.battery else {
            return Ok(());
        };
        if let Some(saved) = cartridge::read_battery_file(path, self.data.len())? {
            self.data = saved;
        }
        Ok(())
    }

    pub fn save_battery(&self) -> Result<(), CartridgeError> {
        match &self.battery {
            Some(path) => cartridge::write_battery_file(path, &self.data),
            None => Ok(()),
        }
    }
}
