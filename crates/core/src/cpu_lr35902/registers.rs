//! LR35902 register file.
//!
//! Eight 8-bit registers that pair up as AF, BC, DE and HL, plus the stack
//! pointer and program counter. Only the upper nibble of F is backed by
//! hardware, so every path that writes F masks the low nibble away.

use serde::{Deserialize, Deserializer, Serialize};

/// Zero flag
pub const FLAG_Z: u8 = 0b1000_0000;
/// Subtract flag (used by DAA)
pub const FLAG_N: u8 = 0b0100_0000;
/// Half-carry flag (carry out of bit 3 / bit 11)
pub const FLAG_H: u8 = 0b0010_0000;
/// Carry flag
pub const FLAG_C: u8 = 0b0001_0000;

const FLAG_MASK: u8 = 0xF0;

/// 8-bit register selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reg8 {
    A,
    B,
    C,
    D,
    E,
    H,
    L,
}

/// 16-bit register selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reg16 {
    AF,
    BC,
    DE,
    HL,
    SP,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registers {
    pub a: u8,
    #[serde(deserialize_with = "deserialize_flags")]
    f: u8,
    pub b: u8,
    pub c: u8,
    pub d: u8,
    pub e: u8,
    pub h: u8,
    pub l: u8,
    pub sp: u16,
    pub pc: u16,
}

fn deserialize_flags<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u8, D::Error> {
    Ok(u8::deserialize(deserializer)? & FLAG_MASK)
}

impl Registers {
    /// Register contents left behind by the DMG boot program.
    pub fn post_boot() -> Self {
        let mut regs = Self::default();
        regs.set16(Reg16::AF, 0x01B0);
        regs.set16(Reg16::BC, 0x0013);
        regs.set16(Reg16::DE, 0x00D8);
        regs.set16(Reg16::HL, 0x014D);
        regs.sp = 0xFFFE;
        regs.pc = 0x0100;
        regs
    }

    pub fn f(&self) -> u8 {
        self.f
    }

    pub fn set_f(&mut self, val: u8) {
        self.f = val & FLAG_MASK;
    }

    pub fn get8(&self, reg: Reg8) -> u8 {
        match reg {
            Reg8::A => self.a,
            Reg8::B => self.b,
            Reg8::C => self.c,
            Reg8::D => self.d,
            Reg8::E => self.e,
            Reg8::H => self.h,
            Reg8::L => self.l,
        }
    }

    pub fn set8(&mut self, reg: Reg8, val: u8) {
        match reg {
            Reg8::A => self.a = val,
            Reg8::B => self.b = val,
            Reg8::C => self.c = val,
            Reg8::D => self.d = val,
            Reg8::E => self.e = val,
            Reg8::H => self.h = val,
            Reg8::L => self.l = val,
        }
    }

    pub fn get16(&self, reg: Reg16) -> u16 {
        match reg {
            Reg16::AF => u16::from_be_bytes([self.a, self.f]),
            Reg16::BC => u16::from_be_bytes([self.b, self.c]),
            Reg16::DE => u16::from_be_bytes([self.d, self.e]),
            Reg16::HL => u16::from_be_bytes([self.h, self.l]),
            Reg16::SP => self.sp,
        }
    }

    pub fn set16(&mut self, reg: Reg16, val: u16) {
        let [hi, lo] = val.to_be_bytes();
        match reg {
            Reg16::AF => {
                self.a = hi;
                self.set_f(lo);
            }
            Reg16::BC => {
                self.b = hi;
                self.c = lo;
            }
            Reg16::DE => {
                self.d = hi;
                self.e = lo;
            }
            Reg16::HL => {
                self.h = hi;
                self.l = lo;
            }
            Reg16::SP => self.sp = val,
        }
    }

    pub fn hl(&self) -> u16 {
        self.get16(Reg16::HL)
    }

    pub fn set_hl(&mut self, val: u16) {
        self.set16(Reg16::HL, val);
    }

    pub fn flag(&self, flag: u8) -> bool {
        self.f & flag != 0
    }

    pub fn set_flag(&mut self, flag: u8, on: bool) {
        if on {
            self.f |= flag & FLAG_MASK;
        } else {
            self.f &= !flag;
        }
    }

    /// Overwrite all four flags at once.
    pub fn set_flags(&mut self, z: bool, n: bool, h: bool, c: bool) {
        let mut f = 0;
        if z {
            f |= FLAG_Z;
        }
        if n {
            f |= FLAG_N;
        }
        if h {
            f |= FLAG_H;
        }
        if c {
            f |= FLAG_C;
        }
        self.f = f;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pair_roundtrip() {
        let mut regs = Registers::default();
        for reg in [Reg16::BC, Reg16::DE, Reg16::HL, Reg16::SP] {
            for val in 0..=u16::MAX {
                regs.set16(reg, val);
                assert_eq!(regs.get16(reg), val);
            }
        }
    }

    #[test]
    fn test_af_low_nibble_always_zero() {
        let mut regs = Registers::default();
        for val in 0..=u16::MAX {
            regs.set16(Reg16::AF, val);
            assert_eq!(regs.get16(Reg16::AF) & 0x000F, 0);
            assert_eq!(regs.get16(Reg16::AF), val & 0xFFF0);
        }
    }

    #[test]
    fn test_set_f_masks() {
        let mut regs = Registers::default();
        regs.set_f(0xFF);
        assert_eq!(regs.f(), 0xF0);
        regs.set_flag(0x0F, true);
        assert_eq!(regs.f(), 0xF0);
    }

    #[test]
    fn test_pairs_alias_halves() {
        let mut regs = Registers::default();
        regs.set16(Reg16::DE, 0xBEEF);
        assert_eq!(regs.d, 0xBE);
        assert_eq!(regs.e, 0xEF);
        regs.set8(Reg8::H, 0x12);
        regs.set8(Reg8::L, 0x34);
        assert_eq!(regs.hl(), 0x1234);
    }

    #[test]
    fn test_post_boot_values() {
        let regs = Registers::post_boot();
        assert_eq!(regs.get16(Reg16::AF), 0x01B0);
        assert_eq!(regs.get16(Reg16::BC), 0x0013);
        assert_eq!(regs.get16(Reg16::DE), 0x00D8);
        assert_eq!(regs.get16(Reg16::HL), 0x014D);
        assert_eq!(regs.sp, 0xFFFE);
        assert_eq!(regs.pc, 0x0100);
    }

    #[test]
    fn test_deserialize_masks_flags() {
        let json = r#"{"a":1,"f":255,"b":0,"c":0,"d":0,"e":0,"h":0,"l":0,"sp":0,"pc":0}"#;
        let regs: Registers = serde_json::from_str(json).unwrap();
        assert_eq!(regs.f(), 0xF0);
    }
}
