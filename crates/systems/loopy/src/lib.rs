//! Casio Loopy emulation.
//!
//! The console is built around the Hitachi SH7021, an SH-2 core with
//! on-chip peripherals, using the `cpu_sh2` interpreter from `emu_core`:
//!
//! - **CPU**: SH7021 at 16 MHz, scheduled one cycle per scheduler unit
//! - **On-chip**: DMAC, two serial ports, INTC, ITU, PFC and 1 KiB of RAM
//! - **VDP**: scanline timing, registers, VRAM and the capture unit; the
//!   pixel pipeline sits behind [`LineRenderer`]
//! - **Sound**: MIDI over serial port 1 into a [`SoundSink`]
//! - **Printer**: BIOS print calls are captured as [`PrintJob`] values

mod bus;
mod cart;
mod config;
mod console;
mod expansion;
mod io;
mod ocpm;
mod printer;
mod sound;
mod vdp;

use emu_core::cpu_sh2::Sh2State;
use emu_core::logging::{log, LogCategory, LogLevel};
use emu_core::scheduler::process_slice;
use emu_core::{types::Frame, MountPointInfo, System};
use thiserror::Error;

pub use bus::LoopyBus;
pub use cart::Cartridge;
pub use config::{ControllerType, LoopyConfig};
pub use console::{Console, F_CPU};
pub use io::{mouse, pad};
pub use printer::PrintJob;
pub use sound::{NullSound, SoundSink};
pub use vdp::{argb1555_to_argb8888, BackdropRenderer, LineRenderer, Vdp};

const MOUNT_BIOS: &str = "BIOS";
const MOUNT_CART: &str = "Cartridge";

/// Smallest image that still holds the reset vectors
const MIN_BIOS_SIZE: usize = 8;

#[derive(Error, Debug)]
pub enum LoopyError {
    #[error("Invalid ROM: {0}")]
    InvalidRom(String),
    #[error("Invalid BIOS image ({0} bytes)")]
    InvalidBios(usize),
    #[error("No BIOS mounted")]
    NoBios,
    #[error("No cartridge mounted")]
    NoCartridge,
    #[error("Invalid mount point: {0}")]
    InvalidMountPoint(String),
    #[error("Emulation halted: {0}")]
    Fault(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Hardware paths the emulator does not model. Latched on the bus and
/// turned into [`LoopyError::Fault`] when running strict.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Unimplemented {
    #[error("serial port {port} mode {value:02X}, only asynchronous 8N1 is supported")]
    SerialMode { port: usize, value: u8 },
    #[error("timer mode {0:02X}")]
    TimerMode(u8),
    #[error("external clock on timer channel {channel}")]
    ExternalTimerClock { channel: usize },
}

/// Casio Loopy system implementation
pub struct LoopySystem {
    config: LoopyConfig,
    bios: Option<Vec<u8>>,
    cart: Option<Vec<u8>>,
    /// SRAM carried across a reset
    sram: Option<Vec<u8>>,
    sound: Option<Box<dyn SoundSink>>,
    renderer: Option<Box<dyn LineRenderer>>,
    console: Option<Console>,
}

impl LoopySystem {
    pub fn new(config: LoopyConfig) -> Self {
        Self {
            config,
            bios: None,
            cart: None,
            sram: None,
            sound: None,
            renderer: None,
            console: None,
        }
    }

    pub fn config(&self) -> &LoopyConfig {
        &self.config
    }

    /// Takes effect at the next reset or mount.
    pub fn set_config(&mut self, config: LoopyConfig) {
        self.config = config;
    }

    pub fn set_sound_sink(&mut self, sink: Box<dyn SoundSink>) {
        match self.console.as_mut() {
            Some(console) => console.bus_mut().sound.set_sink(sink),
            None => self.sound = Some(sink),
        }
    }

    pub fn set_renderer(&mut self, renderer: Box<dyn LineRenderer>) {
        match self.console.as_mut() {
            Some(console) => console.bus_mut().vdp.set_renderer(renderer),
            None => self.renderer = Some(renderer),
        }
    }

    pub fn console(&self) -> Option<&Console> {
        self.console.as_ref()
    }

    /// The running console, built from the mounted media on first use.
    pub fn console_mut(&mut self) -> Result<&mut Console, LoopyError> {
        if self.console.is_none() {
            let console = self.build_console()?;
            self.console = Some(console);
        }
        self.console.as_mut().ok_or(LoopyError::NoBios)
    }

    fn build_console(&mut self) -> Result<Console, LoopyError> {
        let bios = self.bios.clone().ok_or(LoopyError::NoBios)?;
        let data = self.cart.as_deref().ok_or(LoopyError::NoCartridge)?;
        let mut cart = Cartridge::load(data)?;

        if let Some(sram) = self.sram.take() {
            cart.load_sram(&sram);
        } else if let Some(path) = self.config.sram_path.as_deref() {
            match std::fs::read(path) {
                Ok(saved) => cart.load_sram(&saved),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                    log(LogCategory::Bus, LogLevel::Info, || {
                        format!("Loopy: no SRAM at {}, starting blank", path.display())
                    });
                }
                Err(err) => return Err(err.into()),
            }
        }
        cart.set_sram_persistence(self.config.sram_path.clone(), self.config.sram_commit_interval);

        let sound = self.sound.take().unwrap_or_else(|| Box::new(NullSound));
        let mut console = Console::new(bios, Some(cart), &self.config, sound);
        if let Some(renderer) = self.renderer.take() {
            console.bus_mut().vdp.set_renderer(renderer);
        }
        log(LogCategory::CPU, LogLevel::Info, || "Loopy: console powered on".to_string());
        Ok(console)
    }

    /// Drop the running console, keeping the sound sink and SRAM for the
    /// next one.
    fn power_off(&mut self) {
        if let Some(mut console) = self.console.take() {
            self.sound = Some(console.bus_mut().sound.take_sink());
            if let Some(cart) = console.bus_mut().cartridge_mut() {
                cart.commit_sram();
                self.sram = Some(cart.sram().to_vec());
            }
        }
    }

    pub fn set_pad_buttons(&mut self, buttons: u16) {
        if let Some(console) = self.console.as_mut() {
            console.bus_mut().io.set_pad_buttons(buttons);
        }
    }

    pub fn set_mouse_buttons(&mut self, buttons: u16) {
        if let Some(console) = self.console.as_mut() {
            console.bus_mut().io.set_mouse_buttons(buttons);
        }
    }

    pub fn move_mouse(&mut self, dx: i32, dy: i32) {
        if let Some(console) = self.console.as_mut() {
            console.bus_mut().io.move_mouse(dx, dy);
        }
    }

    pub fn take_print_jobs(&mut self) -> Vec<PrintJob> {
        self.console
            .as_mut()
            .map(|console| console.bus_mut().printer.take_jobs())
            .unwrap_or_default()
    }
}

impl Default for LoopySystem {
    fn default() -> Self {
        Self::new(LoopyConfig::default())
    }
}

fn halt_reason(console: &Console) -> String {
    if let Some(fault) = console.cpu.fault() {
        return fault.to_string();
    }
    console
        .bus()
        .unimplemented()
        .map_or_else(|| "unknown".to_string(), |what| what.to_string())
}

impl System for LoopySystem {
    type Error = LoopyError;

    fn reset(&mut self) {
        self.power_off();
    }

    fn step_frame(&mut self) -> Result<Frame, Self::Error> {
        let console = self.console_mut()?;
        let timer = console.cpu_timer();
        console.bus_mut().vdp.start_frame();

        while !console.bus().vdp.frame_ended() {
            let slice = console.bus().sched.min_slice_length();
            process_slice(console, timer, slice);
            if console.halted() {
                let reason = halt_reason(console);
                log(LogCategory::CPU, LogLevel::Error, || {
                    format!("Loopy: halted at PC={:08X}: {}", console.cpu.pc, reason)
                });
                return Err(LoopyError::Fault(reason));
            }
        }

        if let Some(cart) = console.bus_mut().cartridge_mut() {
            cart.sram_commit_check();
        }
        Ok(console.bus().vdp.frame())
    }

    fn save_state(&self) -> serde_json::Value {
        match self.console.as_ref() {
            Some(console) => {
                let vdp = console.bus().vdp();
                serde_json::json!({
                    "version": 1,
                    "cpu": console.cpu.snapshot(),
                    "cycles": console.cpu.cycles,
                    "vdp": {
                        "vcount": vdp.vcount(),
                        "hcount": vdp.hcount(),
                        "frame": vdp.frame_count(),
                    }
                })
            }
            None => serde_json::json!({ "version": 1 }),
        }
    }

    fn load_state(&mut self, v: &serde_json::Value) -> Result<(), serde_json::Error> {
        let (Some(cpu), Some(console)) = (v.get("cpu"), self.console.as_mut()) else {
            return Ok(());
        };
        let state: Sh2State = serde_json::from_value(cpu.clone())?;
        console.cpu.restore(&state);
        Ok(())
    }

    fn mount_points(&self) -> Vec<MountPointInfo> {
        vec![
            MountPointInfo {
                id: MOUNT_BIOS.to_string(),
                name: "BIOS ROM".to_string(),
                extensions: vec!["bin".to_string()],
                required: true,
            },
            MountPointInfo {
                id: MOUNT_CART.to_string(),
                name: "Cartridge Slot".to_string(),
                extensions: vec!["bin".to_string(), "loopy".to_string()],
                required: true,
            },
        ]
    }

    fn mount(&mut self, mount_point_id: &str, data: &[u8]) -> Result<(), Self::Error> {
        match mount_point_id {
            MOUNT_BIOS => {
                if data.len() < MIN_BIOS_SIZE {
                    return Err(LoopyError::InvalidBios(data.len()));
                }
                self.bios = Some(data.to_vec());
            }
            MOUNT_CART => {
                // Validate now so a bad image fails at mount time
                Cartridge::load(data)?;
                self.cart = Some(data.to_vec());
            }
            _ => return Err(LoopyError::InvalidMountPoint(mount_point_id.to_string())),
        }
        self.power_off();
        if mount_point_id == MOUNT_CART {
            self.sram = None;
        }
        Ok(())
    }

    fn unmount(&mut self, mount_point_id: &str) -> Result<(), Self::Error> {
        match mount_point_id {
            MOUNT_BIOS => self.bios = None,
            MOUNT_CART => self.cart = None,
            _ => return Err(LoopyError::InvalidMountPoint(mount_point_id.to_string())),
        }
        self.power_off();
        self.sram = None;
        Ok(())
    }

    fn is_mounted(&self, mount_point_id: &str) -> bool {
        match mount_point_id {
            MOUNT_BIOS => self.bios.is_some(),
            MOUNT_CART => self.cart.is_some(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cart::tests::make_rom;
    use crate::console::tests::tiny_bios;
    use crate::printer::ADDR_PRINT;

    fn make_system(config: LoopyConfig) -> LoopySystem {
        let mut sys = LoopySystem::new(config);
        sys.mount("BIOS", &tiny_bios()).unwrap();
        sys.mount("Cartridge", &make_rom(0x1234_5678, 0x0200_1FFF))
            .unwrap();
        sys
    }

    #[test]
    fn test_mount_points() {
        let sys = LoopySystem::default();
        let mounts = sys.mount_points();
        assert_eq!(mounts.len(), 2);
        assert_eq!(mounts[0].id, "BIOS");
        assert_eq!(mounts[1].extensions, vec!["bin", "loopy"]);
        assert!(mounts.iter().all(|m| m.required));
    }

    #[test]
    fn test_mount_validation() {
        let mut sys = LoopySystem::default();
        assert!(matches!(
            sys.mount("Floppy", &[0; 16]),
            Err(LoopyError::InvalidMountPoint(_))
        ));
        assert!(matches!(sys.mount("BIOS", &[0; 4]), Err(LoopyError::InvalidBios(4))));
        assert!(matches!(
            sys.mount("Cartridge", &[0; 4]),
            Err(LoopyError::InvalidRom(_))
        ));
        assert!(!sys.is_mounted("BIOS"));
        assert!(!sys.is_mounted("Cartridge"));
    }

    #[test]
    fn test_step_frame_requires_media() {
        let mut sys = LoopySystem::default();
        assert!(matches!(sys.step_frame(), Err(LoopyError::NoBios)));
        sys.mount("BIOS", &tiny_bios()).unwrap();
        assert!(matches!(sys.step_frame(), Err(LoopyError::NoCartridge)));
    }

    #[test]
    fn test_step_frame_produces_visible_area() {
        let mut sys = make_system(LoopyConfig::default());
        let frame = sys.step_frame().unwrap();
        assert_eq!((frame.width, frame.height), (256, 224));
        assert_eq!(frame.pixels.len(), 256 * 224);

        let frame = sys.step_frame().unwrap();
        assert_eq!(frame.height, 224);
        assert_eq!(sys.console().unwrap().bus().vdp().frame_count(), 2);
    }

    #[test]
    fn test_strict_fault_stops_frame() {
        let mut sys = make_system(LoopyConfig {
            strict: true,
            ..LoopyConfig::default()
        });
        sys.console_mut()
            .unwrap()
            .bus_mut()
            .latch_unimplemented(Unimplemented::TimerMode(7));
        match sys.step_frame() {
            Err(LoopyError::Fault(reason)) => assert!(reason.contains("timer mode 07")),
            other => panic!("expected a fault, got {:?}", other.map(|f| f.width)),
        }
    }

    #[test]
    fn test_reset_keeps_sram() {
        let mut sys = make_system(LoopyConfig::default());
        sys.console_mut()
            .unwrap()
            .bus_mut()
            .cartridge_mut()
            .unwrap()
            .sram[0] = 0x42;
        sys.reset();
        assert!(sys.console().is_none());
        let console = sys.console_mut().unwrap();
        assert_eq!(console.bus().cartridge().unwrap().sram()[0], 0x42);
        assert_eq!(console.cpu.pc, 0x100);
    }

    #[test]
    fn test_save_state_snapshot() {
        let mut sys = make_system(LoopyConfig::default());
        assert_eq!(sys.save_state()["version"], 1);
        sys.step_frame().unwrap();

        let state = sys.save_state();
        assert_eq!(state["vdp"]["frame"], 1);
        assert_eq!(state["cpu"]["gpr"][15], 0x0108_0000);
        assert!(!sys.supports_save_states());

        let mut other = make_system(LoopyConfig::default());
        other.console_mut().unwrap();
        other.load_state(&state).unwrap();
        assert_eq!(other.console().unwrap().cpu.snapshot(), sys.console().unwrap().cpu.snapshot());
    }

    #[test]
    fn test_mouse_cart_plugs_mouse() {
        let mut sys = LoopySystem::default();
        sys.mount("BIOS", &tiny_bios()).unwrap();
        sys.mount("Cartridge", &make_rom(0xA534_1F72, 0x0200_1FFF))
            .unwrap();
        assert!(sys.console_mut().unwrap().bus().io.is_mouse_plugged());

        sys.set_config(LoopyConfig {
            controller: ControllerType::Pad,
            ..LoopyConfig::default()
        });
        sys.reset();
        assert!(!sys.console_mut().unwrap().bus().io.is_mouse_plugged());
    }

    #[test]
    fn test_print_jobs_reach_frontend() {
        let mut sys = make_system(LoopyConfig::default());
        assert!(sys.take_print_jobs().is_empty());
        let console = sys.console_mut().unwrap();
        assert!(console.cpu.has_hook(ADDR_PRINT));
        console.bus_mut().printer.jobs.push(PrintJob {
            width: 1,
            height: 1,
            pixels: vec![0x7FFF],
        });
        assert_eq!(sys.take_print_jobs().len(), 1);
        assert!(sys.take_print_jobs().is_empty());
    }
}
