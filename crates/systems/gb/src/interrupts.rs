//! Interrupt controller.
//!
//! IF (0xFF0F) collects requests from the video unit, timer, serial port and
//! joypad; IE (0xFFFF) is written only by the program. The master enable
//! (IME) lives in the CPU because EI/DI/RETI manipulate it directly.
//!
//! | Bit | Source   | Vector |
//! |-----|----------|--------|
//! | 0   | VBlank   | 0x40   |
//! | 1   | LCD STAT | 0x48   |
//! | 2   | Timer    | 0x50   |
//! | 3   | Serial   | 0x58   |
//! | 4   | Joypad   | 0x60   |

use dmg_core::cpu_lr35902::{CpuLr35902, MemoryLr35902};
use dmg_core::logging::{log, LogCategory, LogLevel};
use serde::{Deserialize, Serialize};

/// Cycles spent pushing PC and jumping to a vector.
pub const DISPATCH_CYCLES: u32 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    VBlank,
    LcdStat,
    Timer,
    Serial,
    Joypad,
}

impl Interrupt {
    /// Highest priority first.
    pub const ALL: [Interrupt; 5] = [
        Interrupt::VBlank,
        Interrupt::LcdStat,
        Interrupt::Timer,
        Interrupt::Serial,
        Interrupt::Joypad,
    ];

    pub fn bit(self) -> u8 {
        1 << self as u8
    }

    pub fn vector(self) -> u16 {
        0x40 + 8 * self as u16
    }
}

/// IF and IE.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interrupts {
    pub flag: u8,
    pub enable: u8,
}

impl Interrupts {
    pub fn request(&mut self, interrupt: Interrupt) {
        self.flag |= interrupt.bit();
    }

    /// Requested and enabled sources, ignoring IME.
    pub fn pending(&self) -> u8 {
        self.flag & self.enable & 0x1F
    }

    /// IF as the CPU sees it: bits 5-7 always read 1.
    pub fn read_flag(&self) -> u8 {
        self.flag | 0xE0
    }

    pub fn write_flag(&mut self, val: u8) {
        self.flag = val & 0x1F;
    }
}

/// Gives the controller access to IF/IE on whatever bus the CPU drives.
pub trait InterruptLines {
    fn interrupts(&self) -> &Interrupts;
    fn interrupts_mut(&mut self) -> &mut Interrupts;
}

/// One controller step, run after every instruction.
///
/// Wakes a halted CPU when any enabled source is requested and a stopped one
/// only on a joypad request, promotes a pending EI, then dispatches at most
/// one interrupt. Returns the cycles
/// spent dispatching (0 or [`DISPATCH_CYCLES`]).
pub fn service<M>(cpu: &mut CpuLr35902<M>) -> u32
where
    M: MemoryLr35902 + InterruptLines,
{
    let pending = cpu.memory.interrupts().pending();
    if cpu.stopped && pending & Interrupt::Joypad.bit() != 0 {
        cpu.stopped = false;
    }
    if cpu.halted && pending != 0 {
        cpu.halted = false;
    }

    if cpu.ime_pending {
        cpu.ime_pending = false;
        if !cpu.ime {
            cpu.ime = true;
            return 0;
        }
    }

    if !cpu.ime || pending == 0 || cpu.stopped {
        return 0;
    }

    let Some(interrupt) = Interrupt::ALL
        .into_iter()
        .find(|i| pending & i.bit() != 0)
    else {
        return 0;
    };

    cpu.memory.interrupts_mut().flag &= !interrupt.bit();
    cpu.ime = false;
    let return_addr = cpu.regs.pc;
    cpu.push_u16(return_addr);
    cpu.regs.pc = interrupt.vector();
    log(LogCategory::Interrupts, LogLevel::Trace, || {
        format!("{:?} -> {:#06x} (from {:#06x})", interrupt, interrupt.vector(), return_addr)
    });
    DISPATCH_CYCLES
}
