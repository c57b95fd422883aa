//! Process-wide logging switches for the emulator core.
//!
//! Hot paths (instruction dispatch, scanline rendering) call [`log`] with a
//! closure; when the category is disabled the cost is one atomic load and the
//! message is never formatted.
//!
//! - **LogLevel**: Off < Error < Warn < Info < Debug < Trace
//! - **LogCategory**: one switch per hardware block
//! - **LogConfig**: global levels, per-category overrides, rate limit, optional file sink
//!
//! ```rust
//! use dmg_core::logging::{log, LogCategory, LogConfig, LogLevel};
//!
//! LogConfig::global().set_level(LogCategory::Ppu, LogLevel::Debug);
//! log(LogCategory::Ppu, LogLevel::Debug, || format!("LY={}", 144));
//! ```

use std::collections::VecDeque;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::str::FromStr;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::mpsc::{channel, Sender};
use std::sync::{Mutex, MutexGuard, OnceLock, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    Off = 0,
    Error = 1,
    Warn = 2,
    Info = 3,
    Debug = 4,
    Trace = 5,
}

impl LogLevel {
    fn from_u8(val: u8) -> Self {
        match val {
            1 => LogLevel::Error,
            2 => LogLevel::Warn,
            3 => LogLevel::Info,
            4 => LogLevel::Debug,
            5 => LogLevel::Trace,
            _ => LogLevel::Off,
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    /// Case-insensitive name or numeric level.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "off" | "0" => Ok(LogLevel::Off),
            "error" | "err" | "1" => Ok(LogLevel::Error),
            "warn" | "warning" | "2" => Ok(LogLevel::Warn),
            "info" | "3" => Ok(LogLevel::Info),
            "debug" | "4" => Ok(LogLevel::Debug),
            "trace" | "5" => Ok(LogLevel::Trace),
            other => Err(format!("unknown log level '{}'", other)),
        }
    }
}

/// Hardware block a message belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogCategory {
    /// Instruction execution, HALT/STOP, illegal opcodes
    Cpu,
    /// Address decoding, DMA, boot ROM unmapping
    Bus,
    /// Video timing, LCD on/off
    Ppu,
    /// Divider and counter overflow
    Timer,
    /// Interrupt requests and dispatch
    Interrupts,
    /// Header parsing, bank switching, battery RAM
    Cartridge,
}

const CATEGORY_COUNT: usize = 6;

impl LogCategory {
    pub const ALL: [LogCategory; CATEGORY_COUNT] = [
        LogCategory::Cpu,
        LogCategory::Bus,
        LogCategory::Ppu,
        LogCategory::Timer,
        LogCategory::Interrupts,
        LogCategory::Cartridge,
    ];

    fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            LogCategory::Cpu => "CPU",
            LogCategory::Bus => "BUS",
            LogCategory::Ppu => "PPU",
            LogCategory::Timer => "TIMER",
            LogCategory::Interrupts => "INT",
            LogCategory::Cartridge => "CART",
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Default)]
struct Window {
    stamps: VecDeque<Instant>,
    dropped: usize,
    last_report: Option<Instant>,
}

/// Sliding one-second window per category.
struct RateLimiter {
    max_per_second: AtomicUsize,
    windows: Mutex<[Window; CATEGORY_COUNT]>,
}

/// Outcome of a rate limit check: whether to emit, and how many earlier
/// messages were swallowed and should be reported now.
struct Admission {
    allowed: bool,
    dropped: Option<usize>,
}

impl RateLimiter {
    const WINDOW: Duration = Duration::from_secs(1);

    fn new(max_per_second: usize) -> Self {
        Self {
            max_per_second: AtomicUsize::new(max_per_second),
            windows: Mutex::new(Default::default()),
        }
    }

    fn admit(&self, category: LogCategory) -> Admission {
        let now = Instant::now();
        let mut windows = lock(&self.windows);
        let window = &mut windows[category.index()];

        while window
            .stamps
            .front()
            .is_some_and(|&front| now.duration_since(front) > Self::WINDOW)
        {
            window.stamps.pop_front();
        }

        if window.stamps.len() < self.max_per_second.load(Ordering::Relaxed) {
            window.stamps.push_back(now);
            let dropped = std::mem::take(&mut window.dropped);
            if dropped > 0 {
                window.last_report = Some(now);
                return Admission {
                    allowed: true,
                    dropped: Some(dropped),
                };
            }
            return Admission {
                allowed: true,
                dropped: None,
            };
        }

        window.dropped += 1;
        let report_due = window
            .last_report
            .map_or(true, |last| now.duration_since(last) >= Self::WINDOW);
        if report_due {
            window.last_report = Some(now);
            Admission {
                allowed: false,
                dropped: Some(std::mem::take(&mut window.dropped)),
            }
        } else {
            Admission {
                allowed: false,
                dropped: None,
            }
        }
    }
}

pub struct LogConfig {
    global_level: AtomicU8,
    category_levels: [AtomicU8; CATEGORY_COUNT],
    file_sink: Mutex<Option<Sender<String>>>,
    rate_limiter: RateLimiter,
}

impl LogConfig {
    /// All logging off, 60 messages per second per category.
    fn new() -> Self {
        Self {
            global_level: AtomicU8::new(LogLevel::Off as u8),
            category_levels: Default::default(),
            file_sink: Mutex::new(None),
            rate_limiter: RateLimiter::new(60),
        }
    }

    pub fn global() -> &'static Self {
        static INSTANCE: OnceLock<LogConfig> = OnceLock::new();
        INSTANCE.get_or_init(LogConfig::new)
    }

    /// Level used by every category without its own override.
    pub fn set_global_level(&self, level: LogLevel) {
        self.global_level.store(level as u8, Ordering::Relaxed);
    }

    pub fn global_level(&self) -> LogLevel {
        LogLevel::from_u8(self.global_level.load(Ordering::Relaxed))
    }

    /// Override one category. `LogLevel::Off` removes the override.
    pub fn set_level(&self, category: LogCategory, level: LogLevel) {
        self.category_levels[category.index()].store(level as u8, Ordering::Relaxed);
    }

    pub fn level(&self, category: LogCategory) -> LogLevel {
        LogLevel::from_u8(self.category_levels[category.index()].load(Ordering::Relaxed))
    }

    pub fn should_log(&self, category: LogCategory, level: LogLevel) -> bool {
        if level == LogLevel::Off {
            return false;
        }
        match self.level(category) {
            LogLevel::Off => level <= self.global_level(),
            enabled => level <= enabled,
        }
    }

    pub fn reset(&self) {
        self.set_global_level(LogLevel::Off);
        for category in LogCategory::ALL {
            self.set_level(category, LogLevel::Off);
        }
    }

    pub fn set_rate_limit(&self, max_per_second: usize) {
        self.rate_limiter
            .max_per_second
            .store(max_per_second, Ordering::Relaxed);
    }

    pub fn rate_limit(&self) -> usize {
        self.rate_limiter.max_per_second.load(Ordering::Relaxed)
    }

    /// Append messages to `path` from a background writer thread instead of stderr.
    pub fn set_log_file(&self, path: &Path) -> std::io::Result<()> {
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        let (sender, receiver) = channel::<String>();

        thread::Builder::new()
            .name("dmg-log-writer".to_string())
            .spawn(move || {
                for message in receiver {
                    if writeln!(file, "{}", message).is_err() {
                        break;
                    }
                }
                let _ = file.flush();
            })?;

        *lock(&self.file_sink) = Some(sender);
        Ok(())
    }

    /// Drop the file sink; the writer thread exits once its queue drains.
    pub fn clear_log_file(&self) {
        *lock(&self.file_sink) = None;
    }

    fn write_message(&self, message: String) {
        let sink = lock(&self.file_sink);
        match sink.as_ref() {
            Some(sender) => {
                if let Err(failed) = sender.send(message) {
                    eprintln!("{}", failed.0);
                }
            }
            None => eprintln!("{}", message),
        }
    }
}

/// Emit a message if `category` is enabled at `level`.
///
/// `message_fn` runs only when the message will actually be written, so
/// callers can format freely inside it. Each category is limited to the
/// configured number of messages per second; overflow is summarised in a
/// single "dropped" line.
pub fn log<F>(category: LogCategory, level: LogLevel, message_fn: F)
where
    F: FnOnce() -> String,
{
    let config = LogConfig::global();
    if !config.should_log(category, level) {
        return;
    }

    let admission = config.rate_limiter.admit(category);
    if let Some(count) = admission.dropped {
        config.write_message(format!(
            "[{}] rate limit exceeded, {} message(s) dropped",
            category.name(),
            count
        ));
    }
    if admission.allowed {
        config.write_message(format!(
            "[{}] {:?}: {}",
            category.name(),
            level,
            message_fn()
        ));
    }
}
