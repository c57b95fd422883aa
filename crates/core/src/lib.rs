//! Core emulator primitives and traits.

pub mod cpu_lr35902;
pub mod logging;
pub mod ppu;

pub mod types {
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
    pub struct Rgb {
        pub r: u8,
        pub g: u8,
        pub b: u8,
    }

    impl Rgb {
        pub const WHITE: Rgb = Rgb::new(255, 255, 255);

        pub const fn new(r: u8, g: u8, b: u8) -> Self {
            Self { r, g, b }
        }
    }

    /// A finished picture, row-major, one RGB triplet per pixel.
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct Frame {
        pub width: u32,
        pub height: u32,
        pub pixels: Vec<Rgb>,
    }

    impl Frame {
        /// A white frame.
        pub fn new(width: u32, height: u32) -> Self {
            Self {
                width,
                height,
                pixels: vec![Rgb::WHITE; (width * height) as usize],
            }
        }

        pub fn get(&self, x: u32, y: u32) -> Option<Rgb> {
            if x >= self.width || y >= self.height {
                return None;
            }
            self.pixels.get((y * self.width + x) as usize).copied()
        }

        pub fn row_mut(&mut self, y: u32) -> &mut [Rgb] {
            let start = (y * self.width) as usize;
            let end = start + self.width as usize;
            &mut self.pixels[start..end]
        }

        pub fn fill(&mut self, color: Rgb) {
            self.pixels.fill(color);
        }

        /// Packed `RGBRGB...` bytes, as image encoders expect.
        pub fn to_rgb_bytes(&self) -> Vec<u8> {
            self.pixels.iter().flat_map(|p| [p.r, p.g, p.b]).collect()
        }
    }
}

use serde_json::Value;

/// A CPU-like component that can be stepped; returns cycles consumed.
pub trait Cpu {
    type Error: std::error::Error + Send + Sync + 'static;

    fn reset(&mut self);
    fn step(&mut self) -> Result<u32, Self::Error>;
}

/// Description of a mount point (media slot) that a system supports
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountPointInfo {
    /// Unique identifier for this mount point (e.g., "Cartridge")
    pub id: String,
    /// User-friendly name for display
    pub name: String,
    /// File extensions accepted by this mount point
    pub extensions: Vec<String>,
    /// Whether this mount point is required for the system to function
    pub required: bool,
}

/// A high-level System trait tying components together.
///
/// Calls must be serialized by the host: one `step_frame` completes before
/// anything else touches the system.
pub trait System {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Reset to initial power-on state
    fn reset(&mut self);

    /// Emulate one frame and lend out the finished framebuffer.
    fn step_frame(&mut self) -> Result<&types::Frame, Self::Error>;

    /// Snapshot of everything except ROM contents.
    fn save_state(&self) -> Result<Value, Self::Error>;

    /// Replace the running state with a snapshot. On error nothing is changed.
    fn load_state(&mut self, v: &Value) -> Result<(), Self::Error>;

    /// Check if this system supports save/load state functionality
    fn supports_save_states(&self) -> bool {
        false
    }

    /// Get the list of mount points this system supports
    fn mount_points(&self) -> Vec<MountPointInfo>;

    /// Load media into a specific mount point
    fn mount(&mut self, mount_point_id: &str, data: &[u8]) -> Result<(), Self::Error>;

    /// Unload media from a specific mount point
    fn unmount(&mut self, mount_point_id: &str) -> Result<(), Self::Error>;

    /// Check if a mount point has media loaded
    fn is_mounted(&self, mount_point_id: &str) -> bool;
}

#[cfg(test)]
mod tests {
    use super::types::{Frame, Rgb};
    use super::*;

    #[test]
    fn test_frame_initialization() {
        let f = Frame::new(10, 10);
        assert_eq!(f.pixels.len(), 100);
        assert!(f.pixels.iter().all(|&p| p == Rgb::WHITE));
    }

    #[test]
    fn test_frame_rows() {
        let mut f = Frame::new(4, 3);
        f.row_mut(1)[2] = Rgb::new(1, 2, 3);
        assert_eq!(f.get(2, 1), Some(Rgb::new(1, 2, 3)));
        assert_eq!(f.get(4, 0), None);
        assert_eq!(&f.to_rgb_bytes()[18..21], &[1, 2, 3]);
    }

    struct MockSystem {
        frame: Frame,
    }

    impl System for MockSystem {
        type Error = std::convert::Infallible;

        fn reset(&mut self) {}

        fn step_frame(&mut self) -> Result<&Frame, Self::Error> {
            Ok(&self.frame)
        }

        fn save_state(&self) -> Result<serde_json::Value, Self::Error> {
            Ok(serde_json::json!({"mock": true, "version": 1}))
        }

        fn load_state(&mut self, _v: &serde_json::Value) -> Result<(), Self::Error> {
            Ok(())
        }

        fn mount_points(&self) -> Vec<MountPointInfo> {
            vec![MountPointInfo {
                id: "test".to_string(),
                name: "Test Slot".to_string(),
                extensions: vec!["bin".to_string()],
                required: false,
            }]
        }

        fn mount(&mut self, _mount_point_id: &str, _data: &[u8]) -> Result<(), Self::Error> {
            Ok(())
        }

        fn unmount(&mut self, _mount_point_id: &str) -> Result<(), Self::Error> {
            Ok(())
        }

        fn is_mounted(&self, _mount_point_id: &str) -> bool {
            false
        }
    }

    #[test]
    fn test_mock_system_defaults() {
        let mut sys = MockSystem {
            frame: Frame::new(2, 2),
        };
        assert!(!sys.supports_save_states());
        assert_eq!(sys.mount_points()[0].id, "test");
        let frame = sys.step_frame().unwrap();
        assert_eq!(frame.width, 2);
        assert_eq!(sys.save_state().unwrap()["version"], 1);
    }
}
