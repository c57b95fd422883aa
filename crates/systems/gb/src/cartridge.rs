//! Cartridge collaborator: header parsing, the bank-controller contract and
//! battery-backed RAM files.
//!
//! # Header fields
//!
//! ```text
//! $0134-$0143  Title (ASCII, zero padded)
//! $0147        Cartridge type (controller + RAM/battery/RTC flags)
//! $0148        ROM size code: 32KiB << code
//! $0149        RAM size code
//! ```

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use dmg_core::logging::{log, LogCategory, LogLevel};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::mappers;

#[derive(Debug, Error)]
pub enum CartridgeError {
    #[error("cartridge image is {0} bytes, too short to hold a header")]
    TooShort(usize),
    #[error("unsupported cartridge type {0:#04x}")]
    UnsupportedType(u8),
    #[error("unknown ROM size code {0:#04x}")]
    UnknownRomSize(u8),
    #[error("unknown RAM size code {0:#04x}")]
    UnknownRamSize(u8),
    #[error("header declares {declared} bytes of ROM but the image is {actual} bytes")]
    RomSizeMismatch { declared: usize, actual: usize },
    #[error("cartridge RAM is {expected} bytes but the saved RAM is {actual} bytes")]
    RamSizeMismatch { expected: usize, actual: usize },
    #[error("RTC state is {actual} bytes, expected {expected}")]
    RtcSizeMismatch { expected: usize, actual: usize },
    #[error("battery file {path}: {source}")]
    Battery {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Bank controller family named by the cartridge type byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Controller {
    RomOnly,
    Mbc1,
    Mbc3 { rtc: bool },
    Mbc5,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartridgeHeader {
    pub title: String,
    pub cart_type: u8,
    pub controller: Controller,
    pub battery: bool,
    pub rom_size: usize,
    pub ram_size: usize,
}

pub const HEADER_END: usize = 0x150;

impl CartridgeHeader {
    pub fn parse(image: &[u8]) -> Result<Self, CartridgeError> {
        if image.len() < HEADER_END {
            return Err(CartridgeError::TooShort(image.len()));
        }

        let cart_type = image[0x147];
        let (controller, battery) = match cart_type {
            0x00 | 0x08 => (Controller::RomOnly, false),
            0x09 => (Controller::RomOnly, true),
            0x01 | 0x02 => (Controller::Mbc1, false),
            0x03 => (Controller::Mbc1, true),
            0x0F | 0x10 => (Controller::Mbc3 { rtc: true }, true),
            0x11 | 0x12 => (Controller::Mbc3 { rtc: false }, false),
            0x13 => (Controller::Mbc3 { rtc: false }, true),
            0x19 | 0x1A | 0x1C | 0x1D => (Controller::Mbc5, false),
            0x1B | 0x1E => (Controller::Mbc5, true),
            other => return Err(CartridgeError::UnsupportedType(other)),
        };

        let rom_code = image[0x148];
        if rom_code > 0x08 {
            return Err(CartridgeError::UnknownRomSize(rom_code));
        }
        let rom_size = 0x8000usize << rom_code;
        if rom_size != image.len() {
            return Err(CartridgeError::RomSizeMismatch {
                declared: rom_size,
                actual: image.len(),
            });
        }

        let ram_size = match image[0x149] {
            0x00 => 0,
            0x01 => 0x800,
            0x02 => 0x2000,
            0x03 => 0x8000,
            0x04 => 0x20000,
            0x05 => 0x10000,
            other => return Err(CartridgeError::UnknownRamSize(other)),
        };

        let title = image[0x134..0x144]
            .iter()
            .take_while(|&&b| b != 0)
            .map(|&b| if b.is_ascii_graphic() || b == b' ' { b as char } else { '?' })
            .collect::<String>()
            .trim_end()
            .to_string();

        Ok(Self {
            title,
            cart_type,
            controller,
            battery,
            rom_size,
            ram_size,
        })
    }
}

/// Bank registers and RAM contents, as carried in a save state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartridgeState {
    pub rom_bank: u16,
    pub ram_bank: u8,
    pub ram_enabled: bool,
    /// MBC1 banking mode, or the last MBC3 latch write
    pub mode: u8,
    pub ram: Vec<u8>,
    /// MBC3 clock registers: live S, M, H, DL, DH then latched copies
    pub rtc: Vec<u8>,
}

/// Byte-level contract the memory bus sees. Addresses are CPU addresses:
/// 0x0000-0x7FFF for ROM and control registers, 0xA000-0xBFFF for RAM.
pub trait Cartridge: Send {
    fn read(&self, addr: u16) -> u8;
    fn write(&mut self, addr: u16, val: u8);

    /// Pull battery RAM from disk. A missing file is not an error.
    fn load_persistent_ram(&mut self) -> Result<(), CartridgeError>;
    /// Write battery RAM to disk. No-op without a battery.
    fn save_persistent_ram(&self) -> Result<(), CartridgeError>;

    fn header(&self) -> &CartridgeHeader;
    fn state(&self) -> CartridgeState;
    /// Replace bank registers and RAM. Leaves the cartridge untouched on error.
    fn restore(&mut self, state: &CartridgeState) -> Result<(), CartridgeError>;
}

/// Path of the battery file kept next to a ROM: `game.gb` -> `game.gb.ram`.
pub fn battery_path(rom_path: &Path) -> PathBuf {
    let mut name = rom_path.as_os_str().to_owned();
    name.push(".ram");
    PathBuf::from(name)
}

/// Validate the header and build the matching controller.
///
/// With `battery` set, cartridges that carry a battery persist their RAM to
/// that path; the file is read immediately.
pub fn load(image: Vec<u8>, battery: Option<PathBuf>) -> Result<Box<dyn Cartridge>, CartridgeError> {
    let header = CartridgeHeader::parse(&image)?;
    log(LogCategory::Cartridge, LogLevel::Info, || {
        format!(
            "\"{}\" type={:#04x} {:?} rom={}KiB ram={}KiB battery={}",
            header.title,
            header.cart_type,
            header.controller,
            header.rom_size / 1024,
            header.ram_size / 1024,
            header.battery
        )
    });

    let battery = battery.filter(|_| header.battery && header.ram_size > 0);
    let mut cart = mappers::build(header, image, battery);
    cart.load_persistent_ram()?;
    Ok(cart)
}

pub(crate) fn read_battery_file(path: &Path, expected: usize) -> Result<Option<Vec<u8>>, CartridgeError> {
    match fs::read(path) {
        Ok(data) if data.len() == expected => Ok(Some(data)),
        Ok(data) => Err(CartridgeError::RamSizeMismatch {
            expected,
            actual: data.len(),
        }),
        Err(err) if err.kind() == ErrorKind::NotFound => {
            log(LogCategory::Cartridge, LogLevel::Warn, || {
                format!("no battery save at {}, starting with blank RAM", path.display())
            });
            Ok(None)
        }
        Err(source) => Err(CartridgeError::Battery {
            path: path.to_path_buf(),
            source,
        }),
    }
}

pub(crate) fn write_battery_file(path: &Path, data: &[u8]) -> Result<(), CartridgeError> {
    fs::write(path, data).map_err(|source| CartridgeError::Battery {
        path: path.to_path_buf(),
        source,
    })?;
    log(LogCategory::Cartridge, LogLevel::Info, || {
        format!("saved {} bytes of battery RAM to {}", data.len(), path.display())
    });
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// A ROM image with a valid header for `cart_type`, `rom_code` and `ram_code`.
    pub fn make_rom(cart_type: u8, rom_code: u8, ram_code: u8) -> Vec<u8> {
        let mut rom = vec![0; 0x8000 << rom_code];
        rom[0x134..0x139].copy_from_slice(b"TESTS");
        rom[0x147] = cart_type;
        rom[0x148] = rom_code;
        rom[0x149] = ram_code;
        rom
    }

    #[test]
    fn test_parse_header() {
        let header = CartridgeHeader::parse(&make_rom(0x13, 2, 3)).unwrap();
        assert_eq!(header.title, "TESTS");
        assert_eq!(header.controller, Controller::Mbc3 { rtc: false });
        assert!(header.battery);
        assert_eq!(header.rom_size, 0x20000);
        assert_eq!(header.ram_size, 0x8000);
    }

    #[test]
    fn test_rom_size_mismatch() {
        let mut rom = make_rom(0x01, 1, 0);
        rom.truncate(0x8000);
        match CartridgeHeader::parse(&rom) {
            Err(CartridgeError::RomSizeMismatch { declared, actual }) => {
                assert_eq!(declared, 0x10000);
                assert_eq!(actual, 0x8000);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_short_image() {
        assert!(matches!(
            CartridgeHeader::parse(&[0; 0x100]),
            Err(CartridgeError::TooShort(0x100))
        ));
    }

    #[test]
    fn test_unknown_codes() {
        assert!(matches!(
            CartridgeHeader::parse(&make_rom(0x05, 0, 0)),
            Err(CartridgeError::UnsupportedType(0x05))
        ));
        assert!(matches!(
            CartridgeHeader::parse(&make_rom(0x00, 0, 0x07)),
            Err(CartridgeError::UnknownRamSize(0x07))
        ));
    }

    #[test]
    fn test_battery_path() {
        assert_eq!(battery_path(Path::new("/games/tetris.gb")), PathBuf::from("/games/tetris.gb.ram"));
    }

    #[test]
    fn test_rom_only_boundary() {
        let mut rom = make_rom(0x00, 0, 0);
        for (i, byte) in rom.iter_mut().enumerate().skip(HEADER_END) {
            *byte = (i % 251) as u8;
        }
        let mut cart = load(rom.clone(), None).unwrap();
        for addr in 0x0000..=0x7FFFu16 {
            cart.write(addr, 0xAA);
        }
        for addr in 0x0000..=0x7FFFu16 {
            assert_eq!(cart.read(addr), rom[addr as usize]);
        }
    }

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("dmg-cart-{}-{}", std::process::id(), name))
    }

    #[test]
    fn test_battery_roundtrip() {
        let path = temp_path("roundtrip.ram");
        let _ = fs::remove_file(&path);

        let mut cart = load(make_rom(0x03, 0, 2), Some(path.clone())).unwrap();
        cart.write(0x0000, 0x0A);
        cart.write(0xA123, 0x5A);
        cart.save_persistent_ram().unwrap();

        let reloaded = load(make_rom(0x03, 0, 2), Some(path.clone())).unwrap();
        assert_eq!(reloaded.state().ram[0x123], 0x5A);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_missing_battery_file_is_blank() {
        let path = temp_path("missing.ram");
        let _ = fs::remove_file(&path);
        let cart = load(make_rom(0x1B, 0, 2), Some(path)).unwrap();
        assert!(cart.state().ram.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_battery_size_mismatch() {
        let path = temp_path("short.ram");
        fs::write(&path, [0u8; 16]).unwrap();
        let result = load(make_rom(0x03, 0, 2), Some(path.clone()));
        assert!(matches!(
            result,
            Err(CartridgeError::RamSizeMismatch {
                expected: 0x2000,
                actual: 16
            })
        ));
        let _ = fs::remove_file(&path);
    }
}
