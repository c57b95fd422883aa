use anyhow::{bail, Context, Result};
use clap::Parser;
use dmg_core::logging::{LogCategory, LogConfig, LogLevel};
use dmg_core::types::Frame;
use dmg_core::System;
use dmg_gb::{ButtonState, GbConfig, GbSystem};
use log::{info, warn};
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "dmg", about = "Headless DMG runner")]
struct Args {
    /// Path to a ROM file
    rom: PathBuf,

    /// Number of frames to run
    #[arg(long, default_value_t = 60)]
    frames: u32,

    /// Start from the built-in boot program instead of the post-boot state
    #[arg(long, default_value_t = false)]
    boot_rom: bool,

    /// Tint background, window and sprite layers
    #[arg(long, default_value_t = false)]
    debug_colors: bool,

    /// Do not read or write `<rom>.ram`
    #[arg(long, default_value_t = false)]
    no_battery: bool,

    /// Input script: comma-separated `frame:mask` pairs, mask bits
    /// 0=Right 1=Left 2=Up 3=Down 4=A 5=B 6=Select 7=Start
    #[arg(long)]
    buttons: Option<String>,

    /// Write the last frame to this PNG file
    #[arg(long)]
    screenshot: Option<PathBuf>,

    /// Dump a save state to this file as JSON after the last frame
    #[arg(long)]
    save_state: Option<PathBuf>,

    /// Restore this JSON save state before the first frame
    #[arg(long)]
    load_state: Option<PathBuf>,

    /// JSON machine config; command-line switches override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Level for every emulator log category
    #[arg(long, default_value = "off")]
    log_level: LogLevel,

    #[arg(long)]
    log_cpu: Option<LogLevel>,
    #[arg(long)]
    log_bus: Option<LogLevel>,
    #[arg(long)]
    log_ppu: Option<LogLevel>,
    #[arg(long)]
    log_timer: Option<LogLevel>,
    #[arg(long)]
    log_interrupts: Option<LogLevel>,
    #[arg(long)]
    log_cartridge: Option<LogLevel>,

    /// Send emulator logs to this file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Suppress the per-run summary
    #[arg(long, default_value_t = false)]
    quiet: bool,
}

impl Args {
    fn machine_config(&self) -> Result<GbConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let json = fs::read_to_string(path)
                    .with_context(|| format!("reading config {}", path.display()))?;
                GbConfig::from_json(&json)
                    .with_context(|| format!("parsing config {}", path.display()))?
            }
            None => GbConfig::default(),
        };
        config.boot_rom |= self.boot_rom;
        config.debug_colors |= self.debug_colors;
        if self.no_battery {
            config.battery_saves = false;
        }
        Ok(config)
    }

    fn configure_logging(&self) -> Result<()> {
        let logs = LogConfig::global();
        logs.set_global_level(self.log_level);
        let overrides = [
            (LogCategory::Cpu, self.log_cpu),
            (LogCategory::Bus, self.log_bus),
            (LogCategory::Ppu, self.log_ppu),
            (LogCategory::Timer, self.log_timer),
            (LogCategory::Interrupts, self.log_interrupts),
            (LogCategory::Cartridge, self.log_cartridge),
        ];
        for (category, level) in overrides {
            if let Some(level) = level {
                logs.set_level(category, level);
            }
        }
        if let Some(path) = &self.log_file {
            logs.set_log_file(path)
                .with_context(|| format!("opening log file {}", path.display()))?;
        }
        Ok(())
    }
}

/// Parse `frame:mask` pairs, e.g. `10:0x80,12:0`. Masks accept decimal or
/// `0x` hex. The result is sorted by frame.
fn parse_button_script(script: &str) -> Result<Vec<(u32, u8)>> {
    let mut events = Vec::new();
    for entry in script.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let Some((frame, mask)) = entry.split_once(':') else {
            bail!("button entry '{}' is not frame:mask", entry);
        };
        let frame: u32 = frame
            .trim()
            .parse()
            .with_context(|| format!("bad frame number in '{}'", entry))?;
        let mask = mask.trim();
        let mask = match mask.strip_prefix("0x").or_else(|| mask.strip_prefix("0X")) {
            Some(hex) => u8::from_str_radix(hex, 16),
            None => mask.parse(),
        }
        .with_context(|| format!("bad button mask in '{}'", entry))?;
        events.push((frame, mask));
    }
    events.sort_by_key(|&(frame, _)| frame);
    Ok(events)
}

fn write_png(frame: &Frame, path: &Path) -> Result<()> {
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut encoder = png::Encoder::new(BufWriter::new(file), frame.width, frame.height);
    encoder.set_color(png::ColorType::Rgb);
    encoder.set_depth(png::BitDepth::Eight);
    let mut writer = encoder.write_header()?;
    writer.write_image_data(&frame.to_rgb_bytes())?;
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    args.configure_logging()?;

    let config = args.machine_config()?;
    let buttons = match &args.buttons {
        Some(script) => parse_button_script(script)?,
        None => Vec::new(),
    };

    let mut sys = GbSystem::with_config(config);
    sys.load_rom_file(&args.rom)
        .with_context(|| format!("loading ROM {}", args.rom.display()))?;
    info!(
        "loaded \"{}\" from {}",
        sys.cartridge_title().unwrap_or(""),
        args.rom.display()
    );

    if let Some(path) = &args.load_state {
        let json = fs::read_to_string(path)
            .with_context(|| format!("reading save state {}", path.display()))?;
        let state: serde_json::Value = serde_json::from_str(&json)
            .with_context(|| format!("parsing save state {}", path.display()))?;
        sys.load_state(&state)
            .with_context(|| format!("restoring save state {}", path.display()))?;
        info!("restored state from {}", path.display());
    }

    let mut pending = buttons.into_iter().peekable();
    for frame_no in 0..args.frames {
        while let Some(&(_, mask)) = pending.peek().filter(|(at, _)| *at <= frame_no) {
            sys.set_button_states(ButtonState::from_bits(mask));
            pending.next();
        }
        sys.step_frame()
            .with_context(|| format!("running frame {}", frame_no))?;
    }
    if pending.peek().is_some() {
        warn!("input script has events past frame {}", args.frames);
    }

    if let Some(path) = &args.screenshot {
        write_png(sys.frame(), path)?;
        info!("wrote screenshot {}", path.display());
    }

    if let Some(path) = &args.save_state {
        let state = sys.save_state().context("capturing save state")?;
        fs::write(path, serde_json::to_string_pretty(&state)?)
            .with_context(|| format!("writing save state {}", path.display()))?;
    }

    sys.save_battery().context("saving battery RAM")?;
    LogConfig::global().clear_log_file();

    if !args.quiet {
        let regs = sys.registers();
        println!(
            "Ran {} frame(s) of \"{}\": PC={:04X} SP={:04X}",
            args.frames,
            sys.cartridge_title().unwrap_or(""),
            regs.pc,
            regs.sp
        );
    }
    Ok(())
}
