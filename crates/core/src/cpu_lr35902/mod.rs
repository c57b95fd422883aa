//! Sharp LR35902 CPU core (DMG Game Boy CPU)
//!
//! A Z80 relative with a reduced instruction set, a different flag layout and
//! a handful of Game Boy specific opcodes (LDH, SWAP, STOP). Cycle counts are
//! reported in 4.19 MHz clock cycles, so a NOP costs 4.
//!
//! The CPU does not service interrupts itself. `EI` only arms `ime_pending`;
//! the machine's interrupt controller promotes it to `ime` one step later and
//! performs the dispatch.

mod alu;
pub mod decode;
pub mod registers;

use crate::logging::{log, LogCategory, LogLevel};
use crate::Cpu;
use decode::{decode, decode_cb, CbInstruction, Condition, Indirect, Instruction, Operand};
pub use registers::{Reg16, Reg8, Registers, FLAG_C, FLAG_H, FLAG_N, FLAG_Z};

/// Memory interface trait for the LR35902 CPU
pub trait MemoryLr35902 {
    /// Read a byte from memory
    fn read(&self, addr: u16) -> u8;

    /// Write a byte to memory
    fn write(&mut self, addr: u16, val: u8);
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CpuError {
    #[error("illegal opcode {opcode:#04x} at {pc:#06x}")]
    IllegalOpcode { opcode: u8, pc: u16 },
}

/// Sharp LR35902 CPU state
#[derive(Debug)]
pub struct CpuLr35902<M: MemoryLr35902> {
    pub regs: Registers,
    /// Interrupt master enable
    pub ime: bool,
    /// Set by EI; becomes `ime` after the next instruction
    pub ime_pending: bool,
    pub halted: bool,
    /// Stopped by STOP, woken like HALT
    pub stopped: bool,
    /// Total cycles executed
    pub cycles: u64,
    pub memory: M,
}

impl<M: MemoryLr35902> CpuLr35902<M> {
    pub fn new(memory: M) -> Self {
        Self {
            regs: Registers::default(),
            ime: false,
            ime_pending: false,
            halted: false,
            stopped: false,
            cycles: 0,
            memory,
        }
    }

    /// Execute one instruction, or idle for 4 cycles while halted/stopped.
    pub fn step(&mut self) -> Result<u32, CpuError> {
        if self.halted || self.stopped {
            self.cycles += 4;
            return Ok(4);
        }

        let pc = self.regs.pc;
        let opcode = self.read_pc();
        let cycles = self.execute(opcode).map_err(|err| {
            log(LogCategory::Cpu, LogLevel::Error, || {
                format!("halting on opcode {:#04x} at {:#06x}", opcode, pc)
            });
            err
        })?;
        self.cycles += u64::from(cycles);
        Ok(cycles)
    }

    /// Push a 16-bit value: high byte at SP-1, low byte at SP-2.
    pub fn push_u16(&mut self, val: u16) {
        let [hi, lo] = val.to_be_bytes();
        self.regs.sp = self.regs.sp.wrapping_sub(1);
        self.memory.write(self.regs.sp, hi);
        self.regs.sp = self.regs.sp.wrapping_sub(1);
        self.memory.write(self.regs.sp, lo);
    }

    pub fn pop_u16(&mut self) -> u16 {
        let lo = self.memory.read(self.regs.sp);
        self.regs.sp = self.regs.sp.wrapping_add(1);
        let hi = self.memory.read(self.regs.sp);
        self.regs.sp = self.regs.sp.wrapping_add(1);
        u16::from_le_bytes([lo, hi])
    }

    fn read_pc(&mut self) -> u8 {
        let val = self.memory.read(self.regs.pc);
        self.regs.pc = self.regs.pc.wrapping_add(1);
        val
    }

    fn read_pc_u16(&mut self) -> u16 {
        let lo = self.read_pc();
        let hi = self.read_pc();
        u16::from_le_bytes([lo, hi])
    }

    fn read_operand(&self, operand: Operand) -> u8 {
        match operand {
            Operand::Reg(reg) => self.regs.get8(reg),
            Operand::IndHl => self.memory.read(self.regs.hl()),
        }
    }

    fn write_operand(&mut self, operand: Operand, val: u8) {
        match operand {
            Operand::Reg(reg) => self.regs.set8(reg, val),
            Operand::IndHl => self.memory.write(self.regs.hl(), val),
        }
    }

    /// Resolve (BC), (DE), (HL+) or (HL-), applying the HL post-step.
    fn indirect_addr(&mut self, target: Indirect) -> u16 {
        match target {
            Indirect::Bc => self.regs.get16(Reg16::BC),
            Indirect::De => self.regs.get16(Reg16::DE),
            Indirect::HlInc => {
                let hl = self.regs.hl();
                self.regs.set_hl(hl.wrapping_add(1));
                hl
            }
            Indirect::HlDec => {
                let hl = self.regs.hl();
                self.regs.set_hl(hl.wrapping_sub(1));
                hl
            }
        }
    }

    fn condition(&self, cond: Option<Condition>) -> bool {
        match cond {
            None => true,
            Some(Condition::NotZero) => !self.regs.flag(FLAG_Z),
            Some(Condition::Zero) => self.regs.flag(FLAG_Z),
            Some(Condition::NotCarry) => !self.regs.flag(FLAG_C),
            Some(Condition::Carry) => self.regs.flag(FLAG_C),
        }
    }

    /// Execute an already-fetched opcode, fetching any immediates from PC.
    /// Returns the cycle cost.
    pub fn execute(&mut self, opcode: u8) -> Result<u32, CpuError> {
        let instr = decode(opcode);
        let cycles = match instr {
            Instruction::Nop => 4,
            Instruction::Stop => {
                self.read_pc();
                self.stopped = true;
                log(LogCategory::Cpu, LogLevel::Trace, || {
                    format!("STOP at {:#06x}", self.regs.pc.wrapping_sub(2))
                });
                4
            }
            Instruction::Halt => {
                self.halted = true;
                log(LogCategory::Cpu, LogLevel::Trace, || {
                    format!("HALT at {:#06x}", self.regs.pc.wrapping_sub(1))
                });
                4
            }
            Instruction::Di => {
                self.ime = false;
                self.ime_pending = false;
                4
            }
            Instruction::Ei => {
                self.ime_pending = true;
                4
            }

            Instruction::Ld(dst, src) => {
                let val = self.read_operand(src);
                self.write_operand(dst, val);
                if dst == Operand::IndHl || src == Operand::IndHl {
                    8
                } else {
                    4
                }
            }
            Instruction::LdImm(dst) => {
                let val = self.read_pc();
                self.write_operand(dst, val);
                if dst == Operand::IndHl {
                    12
                } else {
                    8
                }
            }
            Instruction::LdImm16(reg) => {
                let val = self.read_pc_u16();
                self.regs.set16(reg, val);
                12
            }
            Instruction::StoreA(target) => {
                let addr = self.indirect_addr(target);
                self.memory.write(addr, self.regs.a);
                8
            }
            Instruction::LoadA(target) => {
                let addr = self.indirect_addr(target);
                self.regs.a = self.memory.read(addr);
                8
            }
            Instruction::StoreSp => {
                let addr = self.read_pc_u16();
                let [hi, lo] = self.regs.sp.to_be_bytes();
                self.memory.write(addr, lo);
                self.memory.write(addr.wrapping_add(1), hi);
                20
            }
            Instruction::StoreAAbs => {
                let addr = self.read_pc_u16();
                self.memory.write(addr, self.regs.a);
                16
            }
            Instruction::LoadAAbs => {
                let addr = self.read_pc_u16();
                self.regs.a = self.memory.read(addr);
                16
            }
            Instruction::StoreAHigh => {
                let addr = 0xFF00 | u16::from(self.read_pc());
                self.memory.write(addr, self.regs.a);
                12
            }
            Instruction::LoadAHigh => {
                let addr = 0xFF00 | u16::from(self.read_pc());
                self.regs.a = self.memory.read(addr);
                12
            }
            Instruction::StoreAHighC => {
                self.memory.write(0xFF00 | u16::from(self.regs.c), self.regs.a);
                8
            }
            Instruction::LoadAHighC => {
                self.regs.a = self.memory.read(0xFF00 | u16::from(self.regs.c));
                8
            }
            Instruction::LdSpHl => {
                self.regs.sp = self.regs.hl();
                8
            }
            Instruction::LdHlSpOffset => {
                let offset = self.read_pc();
                let val = alu::sp_offset(&mut self.regs, offset);
                self.regs.set_hl(val);
                12
            }
            Instruction::Push(reg) => {
                let val = self.regs.get16(reg);
                self.push_u16(val);
                16
            }
            Instruction::Pop(reg) => {
                let val = self.pop_u16();
                self.regs.set16(reg, val);
                12
            }

            Instruction::Inc(target) => {
                let val = self.read_operand(target);
                let result = alu::inc(&mut self.regs, val);
                self.write_operand(target, result);
                if target == Operand::IndHl {
                    12
                } else {
                    4
                }
            }
            Instruction::Dec(target) => {
                let val = self.read_operand(target);
                let result = alu::dec(&mut self.regs, val);
                self.write_operand(target, result);
                if target == Operand::IndHl {
                    12
                } else {
                    4
                }
            }
            Instruction::Inc16(reg) => {
                let val = self.regs.get16(reg).wrapping_add(1);
                self.regs.set16(reg, val);
                8
            }
            Instruction::Dec16(reg) => {
                let val = self.regs.get16(reg).wrapping_sub(1);
                self.regs.set16(reg, val);
                8
            }
            Instruction::AddHl(reg) => {
                let val = self.regs.get16(reg);
                alu::add_hl(&mut self.regs, val);
                8
            }
            Instruction::AddSp => {
                let offset = self.read_pc();
                self.regs.sp = alu::sp_offset(&mut self.regs, offset);
                16
            }
            Instruction::Alu(op, src) => {
                let val = self.read_operand(src);
                alu::alu(&mut self.regs, op, val);
                if src == Operand::IndHl {
                    8
                } else {
                    4
                }
            }
            Instruction::AluImm(op) => {
                let val = self.read_pc();
                alu::alu(&mut self.regs, op, val);
                8
            }
            Instruction::Rlca => {
                alu::rotate_a(&mut self.regs, decode::RotOp::Rlc);
                4
            }
            Instruction::Rrca => {
                alu::rotate_a(&mut self.regs, decode::RotOp::Rrc);
                4
            }
            Instruction::Rla => {
                alu::rotate_a(&mut self.regs, decode::RotOp::Rl);
                4
            }
            Instruction::Rra => {
                alu::rotate_a(&mut self.regs, decode::RotOp::Rr);
                4
            }
            Instruction::Daa => {
                alu::daa(&mut self.regs);
                4
            }
            Instruction::Cpl => {
                alu::cpl(&mut self.regs);
                4
            }
            Instruction::Scf => {
                alu::scf(&mut self.regs);
                4
            }
            Instruction::Ccf => {
                alu::ccf(&mut self.regs);
                4
            }

            Instruction::Jr(cond) => {
                let offset = self.read_pc() as i8;
                if self.condition(cond) {
                    self.regs.pc = self.regs.pc.wrapping_add(offset as u16);
                    12
                } else {
                    8
                }
            }
            Instruction::Jp(cond) => {
                let addr = self.read_pc_u16();
                if self.condition(cond) {
                    self.regs.pc = addr;
                    16
                } else {
                    12
                }
            }
            Instruction::JpHl => {
                self.regs.pc = self.regs.hl();
                4
            }
            Instruction::Call(cond) => {
                let addr = self.read_pc_u16();
                if self.condition(cond) {
                    self.push_u16(self.regs.pc);
                    self.regs.pc = addr;
                    24
                } else {
                    12
                }
            }
            Instruction::Ret(None) => {
                self.regs.pc = self.pop_u16();
                16
            }
            Instruction::Ret(cond) => {
                if self.condition(cond) {
                    self.regs.pc = self.pop_u16();
                    20
                } else {
                    8
                }
            }
            Instruction::Reti => {
                self.regs.pc = self.pop_u16();
                self.ime = true;
                16
            }
            Instruction::Rst(vector) => {
                self.push_u16(self.regs.pc);
                self.regs.pc = vector;
                16
            }
            Instruction::Prefix => {
                let cb = self.read_pc();
                self.execute_cb(cb)
            }
            Instruction::Illegal(opcode) => {
                return Err(CpuError::IllegalOpcode {
                    opcode,
                    pc: self.regs.pc.wrapping_sub(1),
                });
            }
        };
        Ok(cycles)
    }

    fn execute_cb(&mut self, opcode: u8) -> u32 {
        match decode_cb(opcode) {
            CbInstruction::Rotate(op, target) => {
                let val = self.read_operand(target);
                let result = alu::rotate(&mut self.regs, op, val);
                self.write_operand(target, result);
                if target == Operand::IndHl {
                    16
                } else {
                    8
                }
            }
            CbInstruction::Bit(bit, target) => {
                let val = self.read_operand(target);
                alu::bit(&mut self.regs, bit, val);
                if target == Operand::IndHl {
                    12
                } else {
                    8
                }
            }
            CbInstruction::Res(bit, target) => {
                let val = self.read_operand(target) & !(1 << bit);
                self.write_operand(target, val);
                if target == Operand::IndHl {
                    16
                } else {
                    8
                }
            }
            CbInstruction::Set(bit, target) => {
                let val = self.read_operand(target) | (1 << bit);
                self.write_operand(target, val);
                if target == Operand::IndHl {
                    16
                } else {
                    8
                }
            }
        }
    }
}

impl<M: MemoryLr35902> Cpu for CpuLr35902<M> {
    type Error = CpuError;

    fn reset(&mut self) {
        self.regs = Registers::post_boot();
        self.ime = false;
        self.ime_pending = false;
        self.halted = false;
        self.stopped = false;
        self.cycles = 0;
    }

    fn step(&mut self) -> Result<u32, CpuError> {
        CpuLr35902::step(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ArrayMemory([u8; 65536]);

    impl MemoryLr35902 for ArrayMemory {
        fn read(&self, addr: u16) -> u8 {
            self.0[addr as usize]
        }

        fn write(&mut self, addr: u16, val: u8) {
            self.0[addr as usize] = val;
        }
    }

    fn make_cpu() -> CpuLr35902<ArrayMemory> {
        CpuLr35902::new(ArrayMemory([0; 65536]))
    }

    fn load(cpu: &mut CpuLr35902<ArrayMemory>, addr: u16, program: &[u8]) {
        let start = addr as usize;
        cpu.memory.0[start..start + program.len()].copy_from_slice(program);
        cpu.regs.pc = addr;
    }

    #[test]
    fn test_nop() {
        let mut cpu = make_cpu();
        load(&mut cpu, 0, &[0x00]);
        assert_eq!(cpu.step(), Ok(4));
        assert_eq!(cpu.regs.pc, 1);
        assert_eq!(cpu.cycles, 4);
    }

    #[test]
    fn test_ld_bc_d16() {
        let mut cpu = make_cpu();
        load(&mut cpu, 0, &[0x01, 0x34, 0x12]);
        assert_eq!(cpu.step(), Ok(12));
        assert_eq!(cpu.regs.get16(Reg16::BC), 0x1234);
        assert_eq!(cpu.regs.pc, 3);
    }

    #[test]
    fn test_ld_r_r_and_hl() {
        let mut cpu = make_cpu();
        cpu.regs.set_hl(0xC000);
        cpu.regs.b = 0x99;
        load(&mut cpu, 0, &[0x70, 0x7E, 0x36, 0x55]); // LD (HL),B; LD A,(HL); LD (HL),0x55
        assert_eq!(cpu.step(), Ok(8));
        assert_eq!(cpu.memory.0[0xC000], 0x99);
        assert_eq!(cpu.step(), Ok(8));
        assert_eq!(cpu.regs.a, 0x99);
        assert_eq!(cpu.step(), Ok(12));
        assert_eq!(cpu.memory.0[0xC000], 0x55);
    }

    #[test]
    fn test_inc_dec() {
        let mut cpu = make_cpu();
        cpu.regs.b = 0xFF;
        load(&mut cpu, 0, &[0x04, 0x05]); // INC B; DEC B
        cpu.step().unwrap();
        assert_eq!(cpu.regs.b, 0x00);
        assert!(cpu.regs.flag(FLAG_Z));
        assert!(cpu.regs.flag(FLAG_H));
        cpu.step().unwrap();
        assert_eq!(cpu.regs.b, 0xFF);
        assert!(cpu.regs.flag(FLAG_N));
    }

    #[test]
    fn test_inc_hl_indirect() {
        let mut cpu = make_cpu();
        cpu.regs.set_hl(0xC000);
        cpu.memory.0[0xC000] = 0x0F;
        load(&mut cpu, 0, &[0x34]);
        assert_eq!(cpu.step(), Ok(12));
        assert_eq!(cpu.memory.0[0xC000], 0x10);
        assert!(cpu.regs.flag(FLAG_H));
    }

    #[test]
    fn test_add_instruction_flags() {
        let mut cpu = make_cpu();
        cpu.regs.a = 0x3A;
        cpu.regs.b = 0xC6;
        load(&mut cpu, 0, &[0x80]); // ADD A,B
        assert_eq!(cpu.step(), Ok(4));
        assert_eq!(cpu.regs.a, 0x00);
        assert!(cpu.regs.flag(FLAG_Z));
        assert!(cpu.regs.flag(FLAG_H));
        assert!(cpu.regs.flag(FLAG_C));
    }

    #[test]
    fn test_add_imm() {
        let mut cpu = make_cpu();
        cpu.regs.a = 0x10;
        load(&mut cpu, 0, &[0xC6, 0x20]);
        assert_eq!(cpu.step(), Ok(8));
        assert_eq!(cpu.regs.a, 0x30);
        assert!(!cpu.regs.flag(FLAG_C));
    }

    #[test]
    fn test_xor_a() {
        let mut cpu = make_cpu();
        cpu.regs.a = 0x5A;
        cpu.regs.set_f(0xF0);
        load(&mut cpu, 0, &[0xAF]);
        cpu.step().unwrap();
        assert_eq!(cpu.regs.a, 0);
        assert_eq!(cpu.regs.f(), FLAG_Z);
    }

    #[test]
    fn test_jp() {
        let mut cpu = make_cpu();
        load(&mut cpu, 0, &[0xC3, 0x34, 0x12]);
        assert_eq!(cpu.step(), Ok(16));
        assert_eq!(cpu.regs.pc, 0x1234);
    }

    #[test]
    fn test_jr_backwards() {
        let mut cpu = make_cpu();
        load(&mut cpu, 0x100, &[0x18, 0xFE]); // JR -2
        assert_eq!(cpu.step(), Ok(12));
        assert_eq!(cpu.regs.pc, 0x100);
    }

    #[test]
    fn test_conditional_jr() {
        let mut cpu = make_cpu();
        load(&mut cpu, 0, &[0x20, 0x10]); // JR NZ,+16
        cpu.regs.set_flag(FLAG_Z, true);
        assert_eq!(cpu.step(), Ok(8));
        assert_eq!(cpu.regs.pc, 2);

        cpu.regs.pc = 0;
        cpu.regs.set_flag(FLAG_Z, false);
        assert_eq!(cpu.step(), Ok(12));
        assert_eq!(cpu.regs.pc, 0x12);
    }

    #[test]
    fn test_call_ret() {
        let mut cpu = make_cpu();
        cpu.regs.sp = 0xD000;
        load(&mut cpu, 0x100, &[0xCD, 0x00, 0x02]); // CALL 0x200
        cpu.memory.0[0x200] = 0xC9; // RET
        assert_eq!(cpu.step(), Ok(24));
        assert_eq!(cpu.regs.pc, 0x200);
        assert_eq!(cpu.regs.sp, 0xCFFE);
        // High byte pushed first, so it sits at the higher address.
        assert_eq!(cpu.memory.0[0xCFFF], 0x01);
        assert_eq!(cpu.memory.0[0xCFFE], 0x03);

        assert_eq!(cpu.step(), Ok(16));
        assert_eq!(cpu.regs.pc, 0x103);
        assert_eq!(cpu.regs.sp, 0xD000);
    }

    #[test]
    fn test_conditional_ret_cycles() {
        let mut cpu = make_cpu();
        cpu.regs.sp = 0xD000;
        cpu.push_u16(0x4000);
        load(&mut cpu, 0, &[0xD8, 0xD0]); // RET C; RET NC
        assert_eq!(cpu.step(), Ok(8));
        assert_eq!(cpu.step(), Ok(20));
        assert_eq!(cpu.regs.pc, 0x4000);
    }

    #[test]
    fn test_push_pop_af_masks() {
        let mut cpu = make_cpu();
        cpu.regs.sp = 0xD000;
        cpu.regs.set16(Reg16::BC, 0x12FF);
        load(&mut cpu, 0, &[0xC5, 0xF1]); // PUSH BC; POP AF
        assert_eq!(cpu.step(), Ok(16));
        assert_eq!(cpu.step(), Ok(12));
        assert_eq!(cpu.regs.a, 0x12);
        assert_eq!(cpu.regs.f(), 0xF0);
        assert_eq!(cpu.regs.sp, 0xD000);
    }

    #[test]
    fn test_ld_hl_inc_dec() {
        let mut cpu = make_cpu();
        cpu.regs.a = 0x42;
        cpu.regs.set_hl(0xC000);
        load(&mut cpu, 0, &[0x22, 0x32, 0x2A]); // LD (HL+),A; LD (HL-),A; LD A,(HL+)
        cpu.step().unwrap();
        assert_eq!(cpu.memory.0[0xC000], 0x42);
        assert_eq!(cpu.regs.hl(), 0xC001);
        cpu.step().unwrap();
        assert_eq!(cpu.memory.0[0xC001], 0x42);
        assert_eq!(cpu.regs.hl(), 0xC000);
        cpu.regs.a = 0;
        cpu.step().unwrap();
        assert_eq!(cpu.regs.a, 0x42);
        assert_eq!(cpu.regs.hl(), 0xC001);
    }

    #[test]
    fn test_ld_a16_sp() {
        let mut cpu = make_cpu();
        cpu.regs.sp = 0xBEEF;
        load(&mut cpu, 0, &[0x08, 0x00, 0xC0]);
        assert_eq!(cpu.step(), Ok(20));
        assert_eq!(cpu.memory.0[0xC000], 0xEF);
        assert_eq!(cpu.memory.0[0xC001], 0xBE);
    }

    #[test]
    fn test_ldh() {
        let mut cpu = make_cpu();
        cpu.regs.a = 0x77;
        cpu.regs.c = 0x81;
        load(&mut cpu, 0, &[0xE0, 0x80, 0xF2]); // LDH (0x80),A; LD A,(C)
        cpu.memory.0[0xFF81] = 0x11;
        assert_eq!(cpu.step(), Ok(12));
        assert_eq!(cpu.memory.0[0xFF80], 0x77);
        assert_eq!(cpu.step(), Ok(8));
        assert_eq!(cpu.regs.a, 0x11);
    }

    #[test]
    fn test_add_sp_r8() {
        let mut cpu = make_cpu();
        cpu.regs.sp = 0xFFF8;
        load(&mut cpu, 0, &[0xE8, 0x08]);
        assert_eq!(cpu.step(), Ok(16));
        assert_eq!(cpu.regs.sp, 0x0000);
        assert!(cpu.regs.flag(FLAG_C));
        assert!(cpu.regs.flag(FLAG_H));
        assert!(!cpu.regs.flag(FLAG_Z));
    }

    #[test]
    fn test_ld_hl_sp_r8() {
        let mut cpu = make_cpu();
        cpu.regs.sp = 0xC010;
        load(&mut cpu, 0, &[0xF8, 0xF0]); // LD HL,SP-16
        assert_eq!(cpu.step(), Ok(12));
        assert_eq!(cpu.regs.hl(), 0xC000);
        assert_eq!(cpu.regs.sp, 0xC010);
    }

    #[test]
    fn test_rst() {
        let mut cpu = make_cpu();
        cpu.regs.sp = 0xD000;
        load(&mut cpu, 0x150, &[0xEF]); // RST 28h
        assert_eq!(cpu.step(), Ok(16));
        assert_eq!(cpu.regs.pc, 0x28);
        assert_eq!(cpu.pop_u16(), 0x151);
    }

    #[test]
    fn test_halt() {
        let mut cpu = make_cpu();
        load(&mut cpu, 0, &[0x76, 0x04]);
        cpu.step().unwrap();
        assert!(cpu.halted);
        assert_eq!(cpu.step(), Ok(4));
        assert_eq!(cpu.regs.pc, 1);
    }

    #[test]
    fn test_stop_consumes_padding() {
        let mut cpu = make_cpu();
        load(&mut cpu, 0, &[0x10, 0x00, 0x04]);
        cpu.step().unwrap();
        assert!(cpu.stopped);
        assert_eq!(cpu.regs.pc, 2);
    }

    #[test]
    fn test_ei_is_deferred() {
        let mut cpu = make_cpu();
        load(&mut cpu, 0, &[0xFB, 0xF3]); // EI; DI
        cpu.step().unwrap();
        assert!(!cpu.ime);
        assert!(cpu.ime_pending);
        cpu.step().unwrap();
        assert!(!cpu.ime);
        assert!(!cpu.ime_pending);
    }

    #[test]
    fn test_reti_enables_immediately() {
        let mut cpu = make_cpu();
        cpu.regs.sp = 0xD000;
        cpu.push_u16(0x1234);
        load(&mut cpu, 0, &[0xD9]);
        assert_eq!(cpu.step(), Ok(16));
        assert!(cpu.ime);
        assert_eq!(cpu.regs.pc, 0x1234);
    }

    #[test]
    fn test_cb_bit() {
        let mut cpu = make_cpu();
        cpu.regs.a = 0x80;
        cpu.regs.set_flag(FLAG_C, true);
        load(&mut cpu, 0, &[0xCB, 0x7F, 0xCB, 0x47]); // BIT 7,A; BIT 0,A
        assert_eq!(cpu.step(), Ok(8));
        assert!(!cpu.regs.flag(FLAG_Z));
        assert!(cpu.regs.flag(FLAG_H));
        cpu.step().unwrap();
        assert!(cpu.regs.flag(FLAG_Z));
        assert!(cpu.regs.flag(FLAG_C));
    }

    #[test]
    fn test_cb_hl_cycles() {
        let mut cpu = make_cpu();
        cpu.regs.set_hl(0xC000);
        cpu.memory.0[0xC000] = 0x01;
        load(&mut cpu, 0, &[0xCB, 0x46, 0xCB, 0xFE, 0xCB, 0x86]); // BIT 0,(HL); SET 7,(HL); RES 0,(HL)
        assert_eq!(cpu.step(), Ok(12));
        assert_eq!(cpu.step(), Ok(16));
        assert_eq!(cpu.memory.0[0xC000], 0x81);
        assert_eq!(cpu.step(), Ok(16));
        assert_eq!(cpu.memory.0[0xC000], 0x80);
    }

    #[test]
    fn test_cb_swap() {
        let mut cpu = make_cpu();
        cpu.regs.b = 0x12;
        load(&mut cpu, 0, &[0xCB, 0x30]);
        cpu.step().unwrap();
        assert_eq!(cpu.regs.b, 0x21);
    }

    #[test]
    fn test_illegal_opcode_is_error() {
        let mut cpu = make_cpu();
        load(&mut cpu, 0x200, &[0x00, 0xDD]);
        cpu.step().unwrap();
        assert_eq!(
            cpu.step(),
            Err(CpuError::IllegalOpcode {
                opcode: 0xDD,
                pc: 0x201
            })
        );
    }

    #[test]
    fn test_reset_uses_post_boot_state() {
        let mut cpu = make_cpu();
        cpu.halted = true;
        cpu.ime = true;
        Cpu::reset(&mut cpu);
        assert_eq!(cpu.regs, Registers::post_boot());
        assert!(!cpu.halted);
        assert!(!cpu.ime);
    }
}
