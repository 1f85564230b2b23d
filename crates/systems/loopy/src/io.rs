//! Console I/O block at 0x0405D000: controllers, printer sensors and the
//! print head thermistor.

use emu_core::logging::{log, LogCategory, LogLevel};

pub const IO_START: u32 = 0x0405_D000;
pub const IO_END: u32 = 0x0405_E000;

/// Pad buttons, in the bit layout the pad registers are built from
pub mod pad {
    pub const START: u16 = 0x0002;
    pub const A: u16 = 0x0004;
    pub const B: u16 = 0x0008;
    pub const C: u16 = 0x0010;
    pub const D: u16 = 0x0020;
    pub const L1: u16 = 0x0040;
    pub const R1: u16 = 0x0080;
    pub const LEFT: u16 = 0x0100;
    pub const RIGHT: u16 = 0x0200;
    pub const UP: u16 = 0x0400;
    pub const DOWN: u16 = 0x0800;
}

pub mod mouse {
    pub const LEFT: u16 = 0x1000;
    pub const RIGHT: u16 = 0x2000;
    pub const MIDDLE: u16 = 0x4000;
}

const MOUSE_COUNTER_MIN: i16 = -2048;
const MOUSE_COUNTER_MAX: i16 = 2047;

/// Sensors bit that software may latch
const SENSOR_LATCH: u16 = 0x0100;
const REGION_NTSC: u16 = 1;
/// Seal cartridge present: print mechanism idles with only sensor 2 high
const PRINT_MECH_IDLE: u16 = 0b100;
const SEAL_TYPE: u16 = 1;

const PRINT_HEAD_CELSIUS: i32 = 22;

#[derive(Debug, Default, Clone, Copy)]
struct PadState {
    plugged: bool,
    buttons: u16,
}

#[derive(Debug, Default, Clone, Copy)]
struct MouseState {
    plugged: bool,
    buttons: u16,
    counter_x: i16,
    counter_y: i16,
}

impl MouseState {
    fn button_bits(&self) -> u16 {
        let mb = ((!self.buttons) & 0x7000) | 0x8000;
        mb | (mb >> 8)
    }
}

#[derive(Debug, Default)]
pub struct LoopyIo {
    latched_sensors: u16,
    print_temp: u16,
    pad: PadState,
    mouse: MouseState,
    scan_pad: bool,
    scan_mouse: bool,
}

impl LoopyIo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read16(&mut self, addr: u32) -> u16 {
        let addr = addr & 0xFFE;
        let pad_active = self.scan_pad && self.pad.plugged;
        match addr {
            0x000 => self.print_temp,
            0x010 if pad_active => {
                let b = self.pad.buttons;
                ((b << 4) & 0x0F00) | (b & 0x000E) | 0x0001
            }
            0x012 if pad_active => (self.pad.buttons >> 8) & 0x000F,
            0x014 if pad_active => 0,
            0x010 | 0x012 | 0x014 if self.mouse.plugged => self.mouse.button_bits(),
            0x010 | 0x012 | 0x014 => 0,
            0x030 => self.latched_sensors,
            0x050 if self.scan_mouse && self.mouse.plugged => {
                let x = (self.mouse.counter_x as u16) & 0xFFF;
                self.mouse.counter_x = 0;
                x | ((!self.mouse.buttons) & 0x7000)
            }
            0x052 if self.scan_mouse && self.mouse.plugged => {
                let y = (self.mouse.counter_y as u16) & 0xFFF;
                self.mouse.counter_y = 0;
                y
            }
            0x050 | 0x052 => 0,
            _ => {
                log(LogCategory::Bus, LogLevel::Warn, || {
                    format!("IO: unmapped read16 {:03X}", addr)
                });
                0
            }
        }
    }

    pub fn write16(&mut self, addr: u32, value: u16) {
        let addr = addr & 0xFFE;
        match addr {
            0x030 => {
                self.latched_sensors =
                    (self.latched_sensors & !SENSOR_LATCH) | (value & SENSOR_LATCH);
            }
            _ => log(LogCategory::Bus, LogLevel::Warn, || {
                format!("IO: unmapped write16 {:03X}: {:04X}", addr, value)
            }),
        }
    }

    pub fn read8(&mut self, addr: u32) -> u8 {
        let half = self.read16(addr);
        if addr & 1 == 0 {
            (half >> 8) as u8
        } else {
            half as u8
        }
    }

    pub fn write8(&mut self, addr: u32, value: u8) {
        let half = self.read16(addr);
        let merged = if addr & 1 == 0 {
            (half & 0x00FF) | (u16::from(value) << 8)
        } else {
            (half & 0xFF00) | u16::from(value)
        };
        self.write16(addr, merged);
    }

    pub fn read32(&mut self, addr: u32) -> u32 {
        (u32::from(self.read16(addr)) << 16) | u32::from(self.read16(addr + 2))
    }

    pub fn write32(&mut self, addr: u32, value: u32) {
        self.write16(addr, (value >> 16) as u16);
        self.write16(addr + 2, value as u16);
    }

    pub fn set_controller_scan_mode(&mut self, scan_pad: bool, scan_mouse: bool) {
        self.scan_pad = scan_pad;
        self.scan_mouse = scan_mouse;
    }

    /// Only one controller port exists; the mouse wins when both are asked for.
    pub fn set_controller_plugged(&mut self, pad: bool, mouse: bool) {
        self.pad.plugged = pad && !mouse;
        self.mouse.plugged = mouse;
        if !mouse {
            self.mouse.counter_x = 0;
            self.mouse.counter_y = 0;
        }
    }

    pub fn is_mouse_plugged(&self) -> bool {
        self.mouse.plugged
    }

    /// Replace the held pad buttons (`pad::*` bits)
    pub fn set_pad_buttons(&mut self, buttons: u16) {
        if self.pad.plugged {
            self.pad.buttons = buttons;
        }
    }

    /// Replace the held mouse buttons (`mouse::*` bits)
    pub fn set_mouse_buttons(&mut self, buttons: u16) {
        if self.mouse.plugged {
            self.mouse.buttons = buttons;
        }
    }

    pub fn move_mouse(&mut self, dx: i32, dy: i32) {
        if !self.mouse.plugged {
            return;
        }
        let clamp = |counter: i16, delta: i32| {
            (i32::from(counter) + delta)
                .clamp(i32::from(MOUSE_COUNTER_MIN), i32::from(MOUSE_COUNTER_MAX)) as i16
        };
        self.mouse.counter_x = clamp(self.mouse.counter_x, dx);
        self.mouse.counter_y = clamp(self.mouse.counter_y, dy);
    }

    /// Sample the print head thermistor.
    pub fn update_print_temp(&mut self) {
        let bits = (PRINT_HEAD_CELSIUS * 16).clamp(0, 0x3FF) as u16;
        self.print_temp = bits << 6;
    }

    /// Latch the idle printer and board sensors.
    pub fn update_sensors(&mut self) {
        self.latched_sensors = (self.latched_sensors & SENSOR_LATCH)
            | ((SEAL_TYPE & 7) << 4)
            | ((PRINT_MECH_IDLE & 7) << 1)
            | REGION_NTSC;
    }
}
