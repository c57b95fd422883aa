//! Flag-setting arithmetic over the register file.
//!
//! Half-carry and carry come from widened unsigned arithmetic on the
//! operands, including for subtraction.

use super::decode::{AluOp, RotOp};
use super::registers::{Registers, FLAG_C, FLAG_H, FLAG_N, FLAG_Z};

/// Apply an 8-bit ALU operation with `value` as the right-hand operand to A.
pub fn alu(regs: &mut Registers, op: AluOp, value: u8) {
    match op {
        AluOp::Add => regs.a = add(regs, value, false),
        AluOp::Adc => {
            let carry = regs.flag(FLAG_C);
            regs.a = add(regs, value, carry);
        }
        AluOp::Sub => regs.a = sub(regs, value, false),
        AluOp::Sbc => {
            let carry = regs.flag(FLAG_C);
            regs.a = sub(regs, value, carry);
        }
        AluOp::And => {
            regs.a &= value;
            regs.set_flags(regs.a == 0, false, true, false);
        }
        AluOp::Xor => {
            regs.a ^= value;
            regs.set_flags(regs.a == 0, false, false, false);
        }
        AluOp::Or => {
            regs.a |= value;
            regs.set_flags(regs.a == 0, false, false, false);
        }
        AluOp::Cp => {
            sub(regs, value, false);
        }
    }
}

fn add(regs: &mut Registers, value: u8, carry_in: bool) -> u8 {
    let a = u16::from(regs.a);
    let v = u16::from(value);
    let c = u16::from(carry_in);
    let result = a + v + c;
    let half = (a & 0x0F) + (v & 0x0F) + c > 0x0F;
    regs.set_flags(result & 0xFF == 0, false, half, result > 0xFF);
    result as u8
}

fn sub(regs: &mut Registers, value: u8, carry_in: bool) -> u8 {
    let a = u16::from(regs.a);
    let v = u16::from(value);
    let c = u16::from(carry_in);
    let result = a.wrapping_sub(v).wrapping_sub(c) & 0xFF;
    let half = (a & 0x0F) < (v & 0x0F) + c;
    regs.set_flags(result == 0, true, half, a < v + c);
    result as u8
}

pub fn inc(regs: &mut Registers, value: u8) -> u8 {
    let result = value.wrapping_add(1);
    regs.set_flag(FLAG_Z, result == 0);
    regs.set_flag(FLAG_N, false);
    regs.set_flag(FLAG_H, value & 0x0F == 0x0F);
    result
}

pub fn dec(regs: &mut Registers, value: u8) -> u8 {
    let result = value.wrapping_sub(1);
    regs.set_flag(FLAG_Z, result == 0);
    regs.set_flag(FLAG_N, true);
    regs.set_flag(FLAG_H, value & 0x0F == 0);
    result
}

/// ADD HL,rr. Z is preserved.
pub fn add_hl(regs: &mut Registers, value: u16) {
    let hl = u32::from(regs.hl());
    let v = u32::from(value);
    let result = hl + v;
    regs.set_flag(FLAG_N, false);
    regs.set_flag(FLAG_H, (hl & 0x0FFF) + (v & 0x0FFF) > 0x0FFF);
    regs.set_flag(FLAG_C, result > 0xFFFF);
    regs.set_hl(result as u16);
}

/// SP plus a signed offset, as used by `ADD SP,e8` and `LD HL,SP+e8`.
/// Flags come from the unsigned low-byte addition; Z and N are cleared.
pub fn sp_offset(regs: &mut Registers, offset: u8) -> u16 {
    let sp = regs.sp;
    let low = sp & 0x00FF;
    let off = u16::from(offset);
    let half = (low & 0x0F) + (off & 0x0F) > 0x0F;
    let carry = low + off > 0xFF;
    regs.set_flags(false, false, half, carry);
    sp.wrapping_add(offset as i8 as u16)
}

/// Decimal-adjust A after a BCD add or subtract.
pub fn daa(regs: &mut Registers) {
    let mut a = regs.a;
    let subtract = regs.flag(FLAG_N);
    let mut carry = regs.flag(FLAG_C);
    let half = regs.flag(FLAG_H);

    if subtract {
        if carry {
            a = a.wrapping_sub(0x60);
        }
        if half {
            a = a.wrapping_sub(0x06);
        }
    } else {
        if carry || a > 0x99 {
            a = a.wrapping_add(0x60);
            carry = true;
        }
        if half || a & 0x0F > 0x09 {
            a = a.wrapping_add(0x06);
        }
    }

    regs.a = a;
    regs.set_flags(a == 0, subtract, false, carry);
}

pub fn cpl(regs: &mut Registers) {
    regs.a = !regs.a;
    regs.set_flag(FLAG_N, true);
    regs.set_flag(FLAG_H, true);
}

pub fn scf(regs: &mut Registers) {
    let z = regs.flag(FLAG_Z);
    regs.set_flags(z, false, false, true);
}

pub fn ccf(regs: &mut Registers) {
    let z = regs.flag(FLAG_Z);
    let c = regs.flag(FLAG_C);
    regs.set_flags(z, false, false, !c);
}

/// CB-table shift/rotate. Sets Z from the result; N and H cleared.
pub fn rotate(regs: &mut Registers, op: RotOp, value: u8) -> u8 {
    let carry_in = regs.flag(FLAG_C);
    let (result, carry) = match op {
        RotOp::Rlc => (value.rotate_left(1), value & 0x80 != 0),
        RotOp::Rrc => (value.rotate_right(1), value & 0x01 != 0),
        RotOp::Rl => ((value << 1) | u8::from(carry_in), value & 0x80 != 0),
        RotOp::Rr => ((value >> 1) | (u8::from(carry_in) << 7), value & 0x01 != 0),
        RotOp::Sla => (value << 1, value & 0x80 != 0),
        RotOp::Sra => ((value >> 1) | (value & 0x80), value & 0x01 != 0),
        RotOp::Swap => (value.rotate_left(4), false),
        RotOp::Srl => (value >> 1, value & 0x01 != 0),
    };
    regs.set_flags(result == 0, false, false, carry);
    result
}

/// RLCA/RRCA/RLA/RRA: same as the CB forms but Z is always cleared.
pub fn rotate_a(regs: &mut Registers, op: RotOp) {
    regs.a = rotate(regs, op, regs.a);
    regs.set_flag(FLAG_Z, false);
}

pub fn bit(regs: &mut Registers, bit: u8, value: u8) {
    regs.set_flag(FLAG_Z, value & (1 << bit) == 0);
    regs.set_flag(FLAG_N, false);
    regs.set_flag(FLAG_H, true);
}
