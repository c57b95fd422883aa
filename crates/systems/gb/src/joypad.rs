//! Joypad matrix behind P1 (0xFF00).
//!
//! - Bit 5: select action buttons (0 = selected)
//! - Bit 4: select direction pad (0 = selected)
//! - Bits 3-0: Start/Down, Select/Up, B/Left, A/Right (0 = pressed)

use serde::{Deserialize, Serialize};

use crate::interrupts::{Interrupt, Interrupts};

const SELECT_DPAD: u8 = 0x10;
const SELECT_ACTION: u8 = 0x20;

/// Host-side view of the eight buttons.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ButtonState {
    pub right: bool,
    pub left: bool,
    pub up: bool,
    pub down: bool,
    pub a: bool,
    pub b: bool,
    pub select: bool,
    pub start: bool,
}

impl ButtonState {
    /// Bits: 0=Right, 1=Left, 2=Up, 3=Down, 4=A, 5=B, 6=Select, 7=Start
    pub fn from_bits(bits: u8) -> Self {
        let bit = |n: u8| bits & (1 << n) != 0;
        Self {
            right: bit(0),
            left: bit(1),
            up: bit(2),
            down: bit(3),
            a: bit(4),
            b: bit(5),
            select: bit(6),
            start: bit(7),
        }
    }

    pub fn bits(&self) -> u8 {
        [
            self.right,
            self.left,
            self.up,
            self.down,
            self.a,
            self.b,
            self.select,
            self.start,
        ]
        .iter()
        .enumerate()
        .fold(0, |acc, (n, &pressed)| acc | ((pressed as u8) << n))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Joypad {
    select: u8,
    buttons: ButtonState,
}

impl Default for Joypad {
    fn default() -> Self {
        Self::new()
    }
}

impl Joypad {
    pub fn new() -> Self {
        Self {
            select: SELECT_DPAD | SELECT_ACTION,
            buttons: ButtonState::default(),
        }
    }

    /// Both groups selected, nothing held: P1 reads 0xCF.
    pub fn post_boot() -> Self {
        Self {
            select: 0,
            buttons: ButtonState::default(),
        }
    }

    pub fn buttons(&self) -> ButtonState {
        self.buttons
    }

    fn dpad_selected(&self) -> bool {
        self.select & SELECT_DPAD == 0
    }

    fn action_selected(&self) -> bool {
        self.select & SELECT_ACTION == 0
    }

    pub fn read(&self) -> u8 {
        let pressed = self.buttons.bits();
        let mut lines = 0x0F;
        if self.dpad_selected() {
            lines &= !(pressed & 0x0F);
        }
        if self.action_selected() {
            lines &= !(pressed >> 4);
        }
        0xC0 | self.select | lines
    }

    pub fn write(&mut self, val: u8) {
        self.select = val & (SELECT_DPAD | SELECT_ACTION);
    }

    /// Latch new host input. A button going down while its group is
    /// selected requests the joypad interrupt.
    pub fn set_buttons(&mut self, state: ButtonState, interrupts: &mut Interrupts) {
        let newly_pressed = state.bits() & !self.buttons.bits();
        self.buttons = state;

        let dpad_edge = newly_pressed & 0x0F != 0 && self.dpad_selected();
        let action_edge = newly_pressed & 0xF0 != 0 && self.action_selected();
        if dpad_edge || action_edge {
            interrupts.request(Interrupt::Joypad);
        }
    }
}
