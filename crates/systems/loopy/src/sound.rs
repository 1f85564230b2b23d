//! Sound subsystem boundary
//!
//! The sound chip itself lives behind [`SoundSink`]. The console only owns
//! the control register at 0x04080000, the MIDI byte stream coming out of
//! serial port 1, and a periodic time reference that lets the synthesizer
//! advance in step with emulated time.

use emu_core::logging::{log, LogCategory, LogLevel};

use crate::bus::LoopyBus;
use crate::console::{Console, F_CPU};

pub const CTRL_START: u32 = 0x0408_0000;
pub const CTRL_END: u32 = 0x0408_0004;

pub const TIMEREF_FREQUENCY: i64 = 1000;
const CYCLES_PER_TIMEREF: i64 = F_CPU / TIMEREF_FREQUENCY;

/// Receiver for everything the CPU sends to the sound hardware.
pub trait SoundSink {
    fn midi_in(&mut self, byte: u8);
    fn set_control(&mut self, value: u16);
    /// `period` seconds of emulated time have elapsed.
    fn time_reference(&mut self, period: f32);
}

/// Drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSound;

impl SoundSink for NullSound {
    fn midi_in(&mut self, _byte: u8) {}
    fn set_control(&mut self, _value: u16) {}
    fn time_reference(&mut self, _period: f32) {}
}

pub struct Sound {
    sink: Box<dyn SoundSink>,
    control: u16,
}

impl Sound {
    pub fn new(sink: Box<dyn SoundSink>) -> Self {
        Self { sink, control: 0 }
    }

    pub fn set_sink(&mut self, sink: Box<dyn SoundSink>) {
        self.sink = sink;
    }

    /// Detach the sink, leaving a silent one in its place.
    pub fn take_sink(&mut self) -> Box<dyn SoundSink> {
        std::mem::replace(&mut self.sink, Box::new(NullSound))
    }

    pub fn midi_in(&mut self, byte: u8) {
        log(LogCategory::Sound, LogLevel::Trace, || {
            format!("Sound: MIDI byte {:02X}", byte)
        });
        self.sink.midi_in(byte);
    }

    pub fn ctrl_read16(&self, _addr: u32) -> u16 {
        self.control
    }

    pub fn ctrl_read8(&self, addr: u32) -> u8 {
        if addr & 1 == 0 {
            (self.control >> 8) as u8
        } else {
            self.control as u8
        }
    }

    pub fn ctrl_read32(&self, addr: u32) -> u32 {
        (u32::from(self.ctrl_read16(addr)) << 16) | u32::from(self.ctrl_read16(addr + 2))
    }

    pub fn ctrl_write16(&mut self, _addr: u32, value: u16) {
        let value = value & 0xFFF;
        log(LogCategory::Sound, LogLevel::Debug, || {
            format!("Sound: control {:03X}", value)
        });
        self.control = value;
        self.sink.set_control(value);
    }

    pub fn ctrl_write8(&mut self, addr: u32, value: u8) {
        log(LogCategory::Stubs, LogLevel::Warn, || {
            format!("Sound: byte write to control {:08X}: {:02X}", addr, value)
        });
        let merged = if addr & 1 == 0 {
            (self.control & 0x00FF) | (u16::from(value) << 8)
        } else {
            (self.control & 0xFF00) | u16::from(value)
        };
        self.ctrl_write16(addr, merged);
    }

    pub fn ctrl_write32(&mut self, addr: u32, value: u32) {
        self.ctrl_write16(addr, (value >> 16) as u16);
        self.ctrl_write16(addr + 2, value as u16);
    }
}

/// Arm the next time reference tick.
pub fn schedule_timeref(bus: &mut LoopyBus, cycles_late: i64) {
    let timer = bus.cpu_timer;
    let delay = bus.sched.convert(timer, CYCLES_PER_TIMEREF - cycles_late);
    bus.sched.add_event(bus.funcs.timeref, delay, 0, timer);
}

/// Scheduler event: hand the synthesizer one time reference period.
pub fn timeref_event(console: &mut Console, _param: u64, cycles_late: i64) {
    let bus = console.bus_mut();
    schedule_timeref(bus, cycles_late);
    bus.sound
        .sink
        .time_reference(1.0 / TIMEREF_FREQUENCY as f32);
}
