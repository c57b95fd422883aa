//! Save-state aggregate.
//!
//! Everything the machine mutates is captured here as plain data: CPU
//! registers and latches, the bus RAM regions, interrupt/timer/video/joypad
//! blocks and the cartridge's bank registers and RAM. ROM contents are not
//! included; a state only restores onto the same cartridge.

use dmg_core::cpu_lr35902::Registers;
use serde::{Deserialize, Serialize};

use crate::bus::{HRAM_SIZE, IO_SIZE, WRAM_SIZE};
use crate::cartridge::CartridgeState;
use crate::interrupts::Interrupts;
use crate::joypad::Joypad;
use crate::ppu::{Ppu, DOTS_PER_LINE, LINES_PER_FRAME, OAM_SIZE, VRAM_SIZE};
use crate::timer::{Timer, DIV_PERIOD, MAX_TIMA_PERIOD};
use crate::GbError;

/// Quick-save slots held in memory by [`crate::GbSystem`].
pub const SAVE_SLOTS: usize = 4;

pub const STATE_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuState {
    pub regs: Registers,
    pub ime: bool,
    pub ime_pending: bool,
    pub halted: bool,
    pub stopped: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveState {
    pub version: u32,
    pub cpu: CpuState,
    pub wram: Vec<u8>,
    pub hram: Vec<u8>,
    pub io: Vec<u8>,
    pub boot_rom_mapped: bool,
    pub interrupts: Interrupts,
    pub timer: Timer,
    pub ppu: Ppu,
    pub joypad: Joypad,
    pub cartridge: Option<CartridgeState>,
}

fn check_len(what: &'static str, expected: usize, actual: usize) -> Result<(), GbError> {
    if expected == actual {
        Ok(())
    } else {
        Err(GbError::StateMismatch {
            what,
            expected,
            actual,
        })
    }
}

fn check_below(what: &'static str, value: u32, limit: u32) -> Result<(), GbError> {
    if value < limit {
        Ok(())
    } else {
        Err(GbError::StateOutOfRange { what, value, limit })
    }
}

impl SaveState {
    /// Reject states whose buffers cannot be applied wholesale or whose
    /// counters lie outside what stepping can produce.
    pub fn validate(&self) -> Result<(), GbError> {
        check_len("version", STATE_VERSION as usize, self.version as usize)?;
        check_len("work RAM", WRAM_SIZE, self.wram.len())?;
        check_len("high RAM", HRAM_SIZE, self.hram.len())?;
        check_len("I/O registers", IO_SIZE, self.io.len())?;
        check_len("video RAM", VRAM_SIZE, self.ppu.vram().len())?;
        check_len("OAM", OAM_SIZE, self.ppu.oam().len())?;
        check_below("video dot", self.ppu.dot(), DOTS_PER_LINE)?;
        check_below("LY", u32::from(self.ppu.ly()), LINES_PER_FRAME)?;
        let (div_cycles, tima_cycles) = self.timer.accumulators();
        check_below("divider accumulator", div_cycles, DIV_PERIOD)?;
        check_below("counter accumulator", tima_cycles, MAX_TIMA_PERIOD)?;
        Ok(())
    }

    pub fn to_json(&self) -> Result<String, GbError> {
        serde_json::to_string(self).map_err(GbError::StateFormat)
    }

    pub fn from_json(json: &str) -> Result<Self, GbError> {
        serde_json::from_str(json).map_err(GbError::StateFormat)
    }
}
