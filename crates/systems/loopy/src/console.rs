//! Console: the SH2 wired to the Loopy bus, and the CPU timer runner

use emu_core::cpu_sh2::{CpuSh2, ExceptionKind};
use emu_core::logging::{log, LogCategory, LogLevel};
use emu_core::scheduler::{Scheduler, Timed, TimerId};

use crate::bus::LoopyBus;
use crate::cart::Cartridge;
use crate::config::{ControllerType, LoopyConfig};
use crate::ocpm::intc::IrqRequest;
use crate::printer::{self, Printer};
use crate::sound::{self, SoundSink};
use crate::vdp;

/// SH7021 core clock
pub const F_CPU: i64 = 16_000_000;

/// Cartridge entry point used when the BIOS boot is skipped
pub const CART_ENTRY: u32 = 0x0E00_0480;

/// Serial port wired to the sound chip's MIDI input
const MIDI_PORT: usize = 1;

pub struct Console {
    pub cpu: CpuSh2<LoopyBus>,
    strict: bool,
}

impl Console {
    pub fn new(
        bios: Vec<u8>,
        cart: Option<Cartridge>,
        config: &LoopyConfig,
        sound: Box<dyn SoundSink>,
    ) -> Self {
        let mouse_cart = cart.as_ref().is_some_and(Cartridge::is_mouse_cart);
        let mut bus = LoopyBus::new(bios, cart, sound, Printer::new(config.printer_enabled));

        let mouse = match config.controller {
            ControllerType::Auto => mouse_cart,
            ControllerType::Pad => false,
            ControllerType::Mouse => true,
        };
        bus.io.set_controller_plugged(!mouse, mouse);
        bus.ocpm.serial.set_byte_sink(MIDI_PORT, midi_sink);

        let mut cpu = CpuSh2::new(bus);
        printer::install_hooks(&mut cpu, config.skip_motor_move);
        if config.skip_bios {
            log(LogCategory::CPU, LogLevel::Info, || {
                format!("Console: skipping BIOS, entering cartridge at {:08X}", CART_ENTRY)
            });
            cpu.boot_at(CART_ENTRY, 0);
        } else {
            cpu.power_on();
        }

        let bus = &mut cpu.memory;
        sound::schedule_timeref(bus, 0);
        vdp::inc_vcount(bus, 0);

        Self {
            cpu,
            strict: config.strict,
        }
    }

    pub fn bus(&self) -> &LoopyBus {
        &self.cpu.memory
    }

    pub fn bus_mut(&mut self) -> &mut LoopyBus {
        &mut self.cpu.memory
    }

    pub fn cpu_timer(&self) -> TimerId {
        self.cpu.memory.cpu_timer
    }

    /// A latched fault or unimplemented path stops a strict console.
    pub fn halted(&self) -> bool {
        self.strict && (self.cpu.fault().is_some() || self.bus().has_unimplemented())
    }

    /// Hand the CPU the best INTC request that beats whatever it is
    /// already waiting on. A displaced interrupt goes back to the INTC.
    fn forward_interrupts(&mut self) {
        if !self.cpu.memory.ocpm.intc.has_pending() {
            return;
        }
        let current = match self.cpu.pending_exception() {
            None => None,
            Some(p) if p.kind == ExceptionKind::Interrupt => {
                // A re-raise of the held vector is the same request
                self.cpu.memory.ocpm.intc.discard(p.vector);
                Some(p.priority)
            }
            Some(_) => return,
        };
        let Some(request) = self.cpu.memory.ocpm.intc.take_above(current) else {
            return;
        };
        if let Some(old) = self.cpu.take_pending_exception() {
            self.cpu.memory.ocpm.intc.requeue(IrqRequest {
                vector: old.vector,
                priority: old.priority,
            });
        }
        self.cpu
            .request_exception(request.vector, request.priority, ExceptionKind::Interrupt);
    }
}

impl Timed for Console {
    fn scheduler(&mut self) -> &mut Scheduler<Self> {
        &mut self.cpu.memory.sched
    }
}

/// Runner for the CPU timer: one SH2 cycle per scheduler unit.
pub fn run_cpu(console: &mut Console, timer: TimerId) {
    while console.cpu.memory.sched.run_budget(timer) > 0 {
        if console.halted() {
            return;
        }
        console.forward_interrupts();
        console.cpu.clock();
        console.cpu.memory.sched.consume(timer, 1);
    }
}

fn midi_sink(console: &mut Console, byte: u8) {
    console.bus_mut().sound.midi_in(byte);
}
