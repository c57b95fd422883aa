//! DIV/TIMA/TMA/TAC timer block.
//!
//! - `$FF04 (DIV)`: +1 every 256 cycles, any write clears it
//! - `$FF05 (TIMA)`: +1 every TAC-selected period while enabled
//! - `$FF06 (TMA)`: reload value after TIMA overflows
//! - `$FF07 (TAC)`: bit 2 enable, bits 1-0 clock select
//!
//! | TAC & 3 | Period (cycles) |
//! |---------|-----------------|
//! | 0       | 1024            |
//! | 1       | 16              |
//! | 2       | 64              |
//! | 3       | 256             |
//!
//! Both counters keep their own cycle accumulator so uneven instruction
//! lengths never lose ticks.

use dmg_core::logging::{log, LogCategory, LogLevel};
use serde::{Deserialize, Serialize};

use crate::interrupts::{Interrupt, Interrupts};

pub const DIV_PERIOD: u32 = 256;
/// Longest TAC-selected period.
pub const MAX_TIMA_PERIOD: u32 = 1024;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timer {
    div: u8,
    tima: u8,
    tma: u8,
    tac: u8,
    div_cycles: u32,
    tima_cycles: u32,
}

impl Timer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register values after the boot program hands over.
    pub fn post_boot() -> Self {
        Self {
            div: 0xAB,
            ..Self::default()
        }
    }

    fn period(&self) -> u32 {
        match self.tac & 0x03 {
            0 => MAX_TIMA_PERIOD,
            1 => 16,
            2 => 64,
            _ => 256,
        }
    }

    /// Cycles carried toward the next DIV and TIMA ticks.
    pub fn accumulators(&self) -> (u32, u32) {
        (self.div_cycles, self.tima_cycles)
    }

    fn enabled(&self) -> bool {
        self.tac & 0x04 != 0
    }

    pub fn read_register(&self, addr: u16) -> u8 {
        match addr {
            0xFF04 => self.div,
            0xFF05 => self.tima,
            0xFF06 => self.tma,
            0xFF07 => self.tac | 0xF8,
            _ => 0xFF,
        }
    }

    pub fn write_register(&mut self, addr: u16, val: u8) {
        match addr {
            0xFF04 => {
                self.div = 0;
                self.div_cycles = 0;
            }
            0xFF05 => self.tima = val,
            0xFF06 => self.tma = val,
            0xFF07 => self.tac = val & 0x07,
            _ => {}
        }
    }

    /// Advance by `cycles`, requesting the timer interrupt on each overflow.
    pub fn step(&mut self, cycles: u32, interrupts: &mut Interrupts) {
        self.div_cycles += cycles;
        while self.div_cycles >= DIV_PERIOD {
            self.div_cycles -= DIV_PERIOD;
            self.div = self.div.wrapping_add(1);
        }

        if !self.enabled() {
            return;
        }

        let period = self.period();
        self.tima_cycles += cycles;
        while self.tima_cycles >= period {
            self.tima_cycles -= period;
            self.tima = match self.tima.checked_add(1) {
                Some(next) => next,
                None => {
                    interrupts.request(Interrupt::Timer);
                    log(LogCategory::Timer, LogLevel::Trace, || {
                        format!("TIMA overflow, reload {:#04x}", self.tma)
                    });
                    self.tma
                }
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_div_increment() {
        let mut timer = Timer::new();
        let mut ints = Interrupts::default();
        timer.step(255, &mut ints);
        assert_eq!(timer.read_register(0xFF04), 0);
        timer.step(1, &mut ints);
        assert_eq!(timer.read_register(0xFF04), 1);
        timer.step(256 * 3 + 10, &mut ints);
        assert_eq!(timer.read_register(0xFF04), 4);
    }

    #[test]
    fn test_div_write_resets_accumulator() {
        let mut timer = Timer::new();
        let mut ints = Interrupts::default();
        timer.step(300, &mut ints);
        timer.write_register(0xFF04, 0x55);
        assert_eq!(timer.read_register(0xFF04), 0);
        timer.step(255, &mut ints);
        assert_eq!(timer.read_register(0xFF04), 0);
        timer.step(1, &mut ints);
        assert_eq!(timer.read_register(0xFF04), 1);
    }

    #[test]
    fn test_tima_disabled() {
        let mut timer = Timer::new();
        let mut ints = Interrupts::default();
        timer.write_register(0xFF07, 0x01);
        timer.step(1000, &mut ints);
        assert_eq!(timer.read_register(0xFF05), 0);
    }

    #[test]
    fn test_tima_periods() {
        for (select, period) in [(0u8, 1024u32), (1, 16), (2, 64), (3, 256)] {
            let mut timer = Timer::new();
            let mut ints = Interrupts::default();
            timer.write_register(0xFF07, 0x04 | select);
            timer.step(period - 1, &mut ints);
            assert_eq!(timer.read_register(0xFF05), 0);
            timer.step(1, &mut ints);
            assert_eq!(timer.read_register(0xFF05), 1);
        }
    }

    #[test]
    fn test_tima_overflow_and_interrupt() {
        let mut timer = Timer::new();
        let mut ints = Interrupts::default();
        timer.write_register(0xFF05, 0xFF);
        timer.write_register(0xFF06, 0x10);
        timer.write_register(0xFF07, 0x05);

        timer.step(16, &mut ints);
        assert_eq!(timer.read_register(0xFF05), 0x10);
        assert_eq!(ints.flag & Interrupt::Timer.bit(), Interrupt::Timer.bit());
    }

    #[test]
    fn test_tac_reads_high_bits() {
        let mut timer = Timer::new();
        timer.write_register(0xFF07, 0xFF);
        assert_eq!(timer.read_register(0xFF07), 0xFF);
        timer.write_register(0xFF07, 0x00);
        assert_eq!(timer.read_register(0xFF07), 0xF8);
    }
}
