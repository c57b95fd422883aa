//! Game Boy (DMG) system implementation
//!
//! `GbSystem` owns the CPU, which owns the [`bus::GbBus`]; the bus in turn
//! owns video, timer, joypad and the cartridge. One call to
//! [`System::step_frame`] runs the scheduler for one video frame's worth of
//! cycles and lends out the finished picture.

use std::fs;
use std::path::{Path, PathBuf};

use dmg_core::cpu_lr35902::{CpuError, CpuLr35902, Registers};
use dmg_core::types::Frame;
use dmg_core::{Cpu, MountPointInfo, System};

pub mod audio;
pub mod bus;
pub mod cartridge;
pub mod config;
pub mod interrupts;
pub mod joypad;
mod mappers;
pub mod ppu;
pub mod save_state;
pub mod timer;

pub use audio::AudioSink;
pub use cartridge::{CartridgeError, CartridgeHeader};
pub use config::GbConfig;
pub use joypad::ButtonState;
pub use save_state::{SaveState, SAVE_SLOTS};

use bus::GbBus;
use ppu::CYCLES_PER_FRAME;
use save_state::{CpuState, STATE_VERSION};

const CARTRIDGE_MOUNT: &str = "Cartridge";

#[derive(thiserror::Error, Debug)]
pub enum GbError {
    #[error("No cartridge loaded")]
    NoCartridge,
    #[error("Invalid mount point")]
    InvalidMountPoint,
    #[error(transparent)]
    Cpu(#[from] CpuError),
    #[error(transparent)]
    Cartridge(#[from] CartridgeError),
    #[error("failed to read ROM {path}: {source}")]
    RomFile {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("no save state in slot {0}")]
    NoSaveState(usize),
    #[error("save slot {0} out of range (0-{max})", max = SAVE_SLOTS - 1)]
    InvalidSaveSlot(usize),
    #[error("save state {what} mismatch: expected {expected}, got {actual}")]
    StateMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("save state {what} {value} out of range (limit {limit})")]
    StateOutOfRange {
        what: &'static str,
        value: u32,
        limit: u32,
    },
    #[error("malformed save state: {0}")]
    StateFormat(serde_json::Error),
}

pub struct GbSystem {
    cpu: CpuLr35902<GbBus>,
    config: GbConfig,
    audio: Option<Box<dyn AudioSink>>,
    rom_path: Option<PathBuf>,
    slots: [Option<SaveState>; SAVE_SLOTS],
}

impl Default for GbSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl GbSystem {
    pub fn new() -> Self {
        Self::with_config(GbConfig::default())
    }

    pub fn with_config(config: GbConfig) -> Self {
        let mut sys = Self {
            cpu: CpuLr35902::new(GbBus::new()),
            config,
            audio: None,
            rom_path: None,
            slots: Default::default(),
        };
        sys.power_on();
        sys
    }

    pub fn config(&self) -> &GbConfig {
        &self.config
    }

    pub fn set_debug_colors(&mut self, enabled: bool) {
        self.config.debug_colors = enabled;
        self.cpu.memory.ppu.debug_colors = enabled;
    }

    fn power_on(&mut self) {
        let boot_rom = self.config.boot_rom;
        self.cpu.memory.reset(boot_rom);
        self.cpu.memory.ppu.debug_colors = self.config.debug_colors;
        self.cpu.reset();
        if boot_rom {
            self.cpu.regs = Registers::default();
        }
    }

    pub fn set_audio_sink(&mut self, sink: Box<dyn AudioSink>) {
        self.audio = Some(sink);
    }

    /// Latch this frame's buttons; call before [`System::step_frame`].
    pub fn set_button_states(&mut self, state: ButtonState) {
        let bus = &mut self.cpu.memory;
        bus.joypad.set_buttons(state, &mut bus.interrupts);
    }

    pub fn registers(&self) -> &Registers {
        &self.cpu.regs
    }

    /// Last completed frame.
    pub fn frame(&self) -> &Frame {
        self.cpu.memory.ppu.completed_frame()
    }

    pub fn cartridge_title(&self) -> Option<&str> {
        self.cpu
            .memory
            .cartridge()
            .map(|cart| cart.header().title.as_str())
    }

    fn insert_cartridge(&mut self, image: Vec<u8>, battery: Option<PathBuf>) -> Result<(), GbError> {
        let cart = cartridge::load(image, battery)?;
        self.cpu.memory.insert_cartridge(cart);
        self.slots = Default::default();
        self.power_on();
        Ok(())
    }

    /// Load a ROM from disk. With battery saves enabled its RAM is kept in
    /// `<path>.ram`.
    pub fn load_rom_file(&mut self, path: &Path) -> Result<(), GbError> {
        let image = fs::read(path).map_err(|source| GbError::RomFile {
            path: path.to_path_buf(),
            source,
        })?;
        let battery = self
            .config
            .battery_saves
            .then(|| cartridge::battery_path(path));
        self.insert_cartridge(image, battery)?;
        self.rom_path = Some(path.to_path_buf());
        Ok(())
    }

    pub fn rom_path(&self) -> Option<&Path> {
        self.rom_path.as_deref()
    }

    /// Flush battery RAM to disk, if the cartridge has any.
    pub fn save_battery(&self) -> Result<(), GbError> {
        let cart = self.cpu.memory.cartridge().ok_or(GbError::NoCartridge)?;
        cart.save_persistent_ram()?;
        Ok(())
    }

    pub fn snapshot(&self) -> SaveState {
        let bus = &self.cpu.memory;
        SaveState {
            version: STATE_VERSION,
            cpu: CpuState {
                regs: self.cpu.regs,
                ime: self.cpu.ime,
                ime_pending: self.cpu.ime_pending,
                halted: self.cpu.halted,
                stopped: self.cpu.stopped,
            },
            wram: bus.wram().to_vec(),
            hram: bus.hram().to_vec(),
            io: bus.io().to_vec(),
            boot_rom_mapped: bus.boot_rom_mapped(),
            interrupts: bus.interrupts,
            timer: bus.timer.clone(),
            ppu: bus.ppu.clone(),
            joypad: bus.joypad,
            cartridge: bus.cartridge().map(|cart| cart.state()),
        }
    }

    /// Replace the running state. Every buffer is checked and the cartridge
    /// restored first, so an error leaves the machine untouched.
    pub fn restore_state(&mut self, state: &SaveState) -> Result<(), GbError> {
        state.validate()?;
        match (&state.cartridge, self.cpu.memory.cartridge_mut()) {
            (Some(saved), Some(cart)) => cart.restore(saved)?,
            (Some(_), None) => return Err(GbError::NoCartridge),
            (None, Some(_)) => {
                return Err(GbError::StateMismatch {
                    what: "cartridge",
                    expected: 1,
                    actual: 0,
                })
            }
            (None, None) => {}
        }

        let bus = &mut self.cpu.memory;
        bus.restore_memory(&state.wram, &state.hram, &state.io, state.boot_rom_mapped);
        bus.interrupts = state.interrupts;
        bus.timer = state.timer.clone();
        bus.ppu.restore(state.ppu.clone());
        bus.joypad = state.joypad;

        self.cpu.regs = state.cpu.regs;
        self.cpu.ime = state.cpu.ime;
        self.cpu.ime_pending = state.cpu.ime_pending;
        self.cpu.halted = state.cpu.halted;
        self.cpu.stopped = state.cpu.stopped;
        Ok(())
    }

    pub fn save_slot(&mut self, slot: usize) -> Result<(), GbError> {
        let state = self.snapshot();
        let entry = self.slots.get_mut(slot).ok_or(GbError::InvalidSaveSlot(slot))?;
        *entry = Some(state);
        Ok(())
    }

    pub fn load_slot(&mut self, slot: usize) -> Result<(), GbError> {
        let state = self
            .slots
            .get(slot)
            .ok_or(GbError::InvalidSaveSlot(slot))?
            .clone()
            .ok_or(GbError::NoSaveState(slot))?;
        self.restore_state(&state)
    }

    pub fn has_slot(&self, slot: usize) -> bool {
        matches!(self.slots.get(slot), Some(Some(_)))
    }

    /// Feed elapsed cycles to everything clocked alongside the CPU.
    fn advance_peripherals(&mut self, cycles: u32) {
        let bus = &mut self.cpu.memory;
        bus.ppu.step(cycles, &mut bus.interrupts);
        bus.timer.step(cycles, &mut bus.interrupts);
        if let Some(sink) = self.audio.as_mut() {
            sink.advance(cycles);
        }
    }
}

impl System for GbSystem {
    type Error = GbError;

    fn reset(&mut self) {
        self.power_on();
    }

    fn step_frame(&mut self) -> Result<&Frame, Self::Error> {
        if self.cpu.memory.cartridge().is_none() {
            return Err(GbError::NoCartridge);
        }

        let mut total: u32 = 0;
        let mut last: u32 = 0;
        while total < CYCLES_PER_FRAME {
            total += self.cpu.step()?;
            // Includes any dispatch cycles from the previous iteration.
            self.advance_peripherals(total - last);
            last = total;

            total += interrupts::service(&mut self.cpu);
        }
        // A dispatch on the last iteration is still owed to the peripherals.
        if total > last {
            self.advance_peripherals(total - last);
        }

        Ok(self.cpu.memory.ppu.completed_frame())
    }

    fn save_state(&self) -> Result<serde_json::Value, Self::Error> {
        serde_json::to_value(self.snapshot()).map_err(GbError::StateFormat)
    }

    fn load_state(&mut self, v: &serde_json::Value) -> Result<(), Self::Error> {
        let state: SaveState = serde_json::from_value(v.clone()).map_err(GbError::StateFormat)?;
        self.restore_state(&state)
    }

    fn supports_save_states(&self) -> bool {
        true
    }

    fn mount_points(&self) -> Vec<MountPointInfo> {
        vec![MountPointInfo {
            id: CARTRIDGE_MOUNT.to_string(),
            name: "Cartridge Slot".to_string(),
            extensions: vec!["gb".to_string()],
            required: true,
        }]
    }

    fn mount(&mut self, mount_point_id: &str, data: &[u8]) -> Result<(), Self::Error> {
        if mount_point_id != CARTRIDGE_MOUNT {
            return Err(GbError::InvalidMountPoint);
        }
        self.rom_path = None;
        self.insert_cartridge(data.to_vec(), None)
    }

    fn unmount(&mut self, mount_point_id: &str) -> Result<(), Self::Error> {
        if mount_point_id != CARTRIDGE_MOUNT {
            return Err(GbError::InvalidMountPoint);
        }
        if let Some(cart) = self.cpu.memory.remove_cartridge() {
            cart.save_persistent_ram()?;
        }
        self.rom_path = None;
        self.slots = Default::default();
        Ok(())
    }

    fn is_mounted(&self, mount_point_id: &str) -> bool {
        mount_point_id == CARTRIDGE_MOUNT && self.cpu.memory.cartridge().is_some()
    }
}
