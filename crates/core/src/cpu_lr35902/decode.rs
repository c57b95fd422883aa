//! Opcode decoding.
//!
//! Both tables are plain matches over every byte value with no wildcard arm,
//! so the compiler rejects a table that leaves an opcode unhandled.

use super::registers::{Reg16, Reg8};

/// An 8-bit operand slot: a register or the byte at (HL).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    Reg(Reg8),
    IndHl,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Condition {
    NotZero,
    Zero,
    NotCarry,
    Carry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AluOp {
    Add,
    Adc,
    Sub,
    Sbc,
    And,
    Xor,
    Or,
    Cp,
}

/// Shift/rotate group of the CB table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotOp {
    Rlc,
    Rrc,
    Rl,
    Rr,
    Sla,
    Sra,
    Swap,
    Srl,
}

/// Memory operand addressed through a register pair for `LD (rr),A` / `LD A,(rr)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Indirect {
    Bc,
    De,
    HlInc,
    HlDec,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    Nop,
    Stop,
    Halt,
    Di,
    Ei,
    Ld(Operand, Operand),
    LdImm(Operand),
    LdImm16(Reg16),
    StoreA(Indirect),
    LoadA(Indirect),
    StoreSp,
    StoreAAbs,
    LoadAAbs,
    StoreAHigh,
    LoadAHigh,
    StoreAHighC,
    LoadAHighC,
    LdSpHl,
    LdHlSpOffset,
    Push(Reg16),
    Pop(Reg16),
    Inc(Operand),
    Dec(Operand),
    Inc16(Reg16),
    Dec16(Reg16),
    AddHl(Reg16),
    AddSp,
    Alu(AluOp, Operand),
    AluImm(AluOp),
    Rlca,
    Rrca,
    Rla,
    Rra,
    Daa,
    Cpl,
    Scf,
    Ccf,
    Jr(Option<Condition>),
    Jp(Option<Condition>),
    JpHl,
    Call(Option<Condition>),
    Ret(Option<Condition>),
    Reti,
    Rst(u16),
    Prefix,
    Illegal(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CbInstruction {
    Rotate(RotOp, Operand),
    Bit(u8, Operand),
    Res(u8, Operand),
    Set(u8, Operand),
}

fn operand(bits: u8) -> Operand {
    match bits & 7 {
        0 => Operand::Reg(Reg8::B),
        1 => Operand::Reg(Reg8::C),
        2 => Operand::Reg(Reg8::D),
        3 => Operand::Reg(Reg8::E),
        4 => Operand::Reg(Reg8::H),
        5 => Operand::Reg(Reg8::L),
        6 => Operand::IndHl,
        _ => Operand::Reg(Reg8::A),
    }
}

/// Pair selected by bits 4-5 (BC, DE, HL, SP).
fn pair_sp(op: u8) -> Reg16 {
    match (op >> 4) & 3 {
        0 => Reg16::BC,
        1 => Reg16::DE,
        2 => Reg16::HL,
        _ => Reg16::SP,
    }
}

/// Pair selected by bits 4-5 for PUSH/POP (BC, DE, HL, AF).
fn pair_af(op: u8) -> Reg16 {
    match (op >> 4) & 3 {
        0 => Reg16::BC,
        1 => Reg16::DE,
        2 => Reg16::HL,
        _ => Reg16::AF,
    }
}

fn condition(op: u8) -> Condition {
    match (op >> 3) & 3 {
        0 => Condition::NotZero,
        1 => Condition::Zero,
        2 => Condition::NotCarry,
        _ => Condition::Carry,
    }
}

fn alu_op(op: u8) -> AluOp {
    match (op >> 3) & 7 {
        0 => AluOp::Add,
        1 => AluOp::Adc,
        2 => AluOp::Sub,
        3 => AluOp::Sbc,
        4 => AluOp::And,
        5 => AluOp::Xor,
        6 => AluOp::Or,
        _ => AluOp::Cp,
    }
}

fn rot_op(op: u8) -> RotOp {
    match (op >> 3) & 7 {
        0 => RotOp::Rlc,
        1 => RotOp::Rrc,
        2 => RotOp::Rl,
        3 => RotOp::Rr,
        4 => RotOp::Sla,
        5 => RotOp::Sra,
        6 => RotOp::Swap,
        _ => RotOp::Srl,
    }
}

/// Decode a base-table opcode.
pub fn decode(op: u8) -> Instruction {
    use Instruction::*;

    match op {
        0x00 => Nop,
        0x10 => Stop,
        0x08 => StoreSp,
        0x18 => Jr(None),
        0x20 | 0x28 | 0x30 | 0x38 => Jr(Some(condition(op))),
        0x01 | 0x11 | 0x21 | 0x31 => LdImm16(pair_sp(op)),
        0x09 | 0x19 | 0x29 | 0x39 => AddHl(pair_sp(op)),
        0x02 => StoreA(Indirect::Bc),
        0x12 => StoreA(Indirect::De),
        0x22 => StoreA(Indirect::HlInc),
        0x32 => StoreA(Indirect::HlDec),
        0x0A => LoadA(Indirect::Bc),
        0x1A => LoadA(Indirect::De),
        0x2A => LoadA(Indirect::HlInc),
        0x3A => LoadA(Indirect::HlDec),
        0x03 | 0x13 | 0x23 | 0x33 => Inc16(pair_sp(op)),
        0x0B | 0x1B | 0x2B | 0x3B => Dec16(pair_sp(op)),
        0x04 | 0x0C | 0x14 | 0x1C | 0x24 | 0x2C | 0x34 | 0x3C => Inc(operand(op >> 3)),
        0x05 | 0x0D | 0x15 | 0x1D | 0x25 | 0x2D | 0x35 | 0x3D => Dec(operand(op >> 3)),
        0x06 | 0x0E | 0x16 | 0x1E | 0x26 | 0x2E | 0x36 | 0x3E => LdImm(operand(op >> 3)),
        0x07 => Rlca,
        0x0F => Rrca,
        0x17 => Rla,
        0x1F => Rra,
        0x27 => Daa,
        0x2F => Cpl,
        0x37 => Scf,
        0x3F => Ccf,

        0x76 => Halt,
        0x40..=0x75 | 0x77..=0x7F => Ld(operand(op >> 3), operand(op)),
        0x80..=0xBF => Alu(alu_op(op), operand(op)),

        0xC0 | 0xC8 | 0xD0 | 0xD8 => Ret(Some(condition(op))),
        0xC9 => Ret(None),
        0xD9 => Reti,
        0xC1 | 0xD1 | 0xE1 | 0xF1 => Pop(pair_af(op)),
        0xC5 | 0xD5 | 0xE5 | 0xF5 => Push(pair_af(op)),
        0xC2 | 0xCA | 0xD2 | 0xDA => Jp(Some(condition(op))),
        0xC3 => Jp(None),
        0xE9 => JpHl,
        0xC4 | 0xCC | 0xD4 | 0xDC => Call(Some(condition(op))),
        0xCD => Call(None),
        0xC6 | 0xCE | 0xD6 | 0xDE | 0xE6 | 0xEE | 0xF6 | 0xFE => AluImm(alu_op(op)),
        0xC7 | 0xCF | 0xD7 | 0xDF | 0xE7 | 0xEF | 0xF7 | 0xFF => Rst(u16::from(op & 0x38)),
        0xCB => Prefix,
        0xE0 => StoreAHigh,
        0xF0 => LoadAHigh,
        0xE2 => StoreAHighC,
        0xF2 => LoadAHighC,
        0xEA => StoreAAbs,
        0xFA => LoadAAbs,
        0xE8 => AddSp,
        0xF8 => LdHlSpOffset,
        0xF9 => LdSpHl,
        0xF3 => Di,
        0xFB => Ei,

        0xD3 | 0xDB | 0xDD | 0xE3 | 0xE4 | 0xEB | 0xEC | 0xED | 0xF4 | 0xFC | 0xFD => Illegal(op),
    }
}

/// Decode the opcode that follows a 0xCB prefix.
pub fn decode_cb(op: u8) -> CbInstruction {
    let bit = (op >> 3) & 7;
    match op {
        0x00..=0x3F => CbInstruction::Rotate(rot_op(op), operand(op)),
        0x40..=0x7F => CbInstruction::Bit(bit, operand(op)),
        0x80..=0xBF => CbInstruction::Res(bit, operand(op)),
        0xC0..=0xFF => CbInstruction::Set(bit, operand(op)),
    }
}
