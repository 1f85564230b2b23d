//! Shared emulator building blocks: the SH2 interpreter, the event
//! scheduler, categorized logging and the traits a console front door
//! implements.

pub mod cpu_sh2;
pub mod logging;
pub mod scheduler;
pub mod wordops;

pub mod types {
    use serde::{Deserialize, Serialize};

    /// One video frame, ARGB8888 in row-major order.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Frame {
        pub width: u32,
        pub height: u32,
        pub pixels: Vec<u32>,
    }

    impl Frame {
        pub fn new(width: u32, height: u32) -> Self {
            Self {
                width,
                height,
                pixels: vec![0; (width * height) as usize],
            }
        }
    }
}

use serde_json::Value;

/// A processor that can be stepped one instruction at a time.
pub trait Cpu {
    fn reset(&mut self);
    /// Run until the next instruction retires; returns the cycles taken.
    fn step(&mut self) -> u32;
}

/// A media slot exposed by a system
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountPointInfo {
    /// Identifier passed to [`System::mount`], e.g. "BIOS"
    pub id: String,
    /// Display name
    pub name: String,
    /// Accepted file extensions, without the dot
    pub extensions: Vec<String>,
    /// The system cannot run without this slot filled
    pub required: bool,
}

/// Front door of an emulated machine.
pub trait System {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Power-cycle the machine. Mounted media stays mounted.
    fn reset(&mut self);

    /// Run until the video hardware finishes a frame.
    fn step_frame(&mut self) -> Result<types::Frame, Self::Error>;

    /// Debug snapshot of the machine state. Media contents are not included.
    fn save_state(&self) -> Value;

    fn load_state(&mut self, v: &Value) -> Result<(), serde_json::Error>;

    /// Whether `load_state(save_state())` reproduces the full machine.
    fn supports_save_states(&self) -> bool {
        false
    }

    fn mount_points(&self) -> Vec<MountPointInfo>;

    fn mount(&mut self, mount_point_id: &str, data: &[u8]) -> Result<(), Self::Error>;

    fn unmount(&mut self, mount_point_id: &str) -> Result<(), Self::Error>;

    fn is_mounted(&self, mount_point_id: &str) -> bool;
}
