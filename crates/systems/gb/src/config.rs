use serde::{Deserialize, Serialize};

/// Machine options chosen by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GbConfig {
    /// Run the built-in boot program from 0x0000 instead of starting at
    /// 0x0100 with post-boot registers.
    pub boot_rom: bool,
    /// Tint background blue, window green and sprites red.
    pub debug_colors: bool,
    /// Keep battery RAM in `<rom>.ram` next to ROMs loaded from disk.
    pub battery_saves: bool,
}

impl Default for GbConfig {
    fn default() -> Self {
        Self {
            boot_rom: false,
            debug_colors: false,
            battery_saves: true,
        }
    }
}

impl GbConfig {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
