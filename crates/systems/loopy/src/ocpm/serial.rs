//! Serial communication interface (SCI), two asynchronous ports
//!
//! Per port, stride 8 from 0xEC0:
//! - +0: SMR - mode
//! - +1: BRR - bit rate
//! - +2: SCR - control
//! - +3: TDR - transmit data
//! - +4: SSR - status
//! - +5: RDR - receive data
//!
//! Only transmission is modelled. Bytes are shifted out LSB first on a
//! scheduler event per bit; each completed byte goes to the port's byte
//! sink. Port 1 drives the sound chip's MIDI input.

use emu_core::logging::{log, LogCategory, LogLevel};

use crate::bus::LoopyBus;
use crate::console::Console;
use crate::ocpm::dmac::{self, Dreq};
use crate::Unimplemented;

pub const SERIAL_START: u32 = 0xEC0;
pub const SERIAL_END: u32 = 0xED0;

pub const PORT_COUNT: usize = 2;

/// Receives each byte a port finishes sending
pub type ByteSink = fn(&mut Console, u8);

const SSR_TDRE: u8 = 0x80;
const SMR_CLOCK_FACTOR: u8 = 0x03;

#[derive(Debug, Default, Clone, Copy)]
struct Mode {
    clock_factor: u8,
    mp_enable: bool,
    two_stop_bits: bool,
    odd_parity: bool,
    parity_enable: bool,
    seven_bit: bool,
    sync_mode: bool,
}

impl Mode {
    fn from_smr(value: u8) -> Self {
        Self {
            clock_factor: value & SMR_CLOCK_FACTOR,
            mp_enable: value & 0x04 != 0,
            two_stop_bits: value & 0x08 != 0,
            odd_parity: value & 0x10 != 0,
            parity_enable: value & 0x20 != 0,
            seven_bit: value & 0x40 != 0,
            sync_mode: value & 0x80 != 0,
        }
    }

    fn to_smr(self) -> u8 {
        self.clock_factor
            | u8::from(self.mp_enable) << 2
            | u8::from(self.two_stop_bits) << 3
            | u8::from(self.odd_parity) << 4
            | u8::from(self.parity_enable) << 5
            | u8::from(self.seven_bit) << 6
            | u8::from(self.sync_mode) << 7
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Ctrl {
    clock_mode: u8,
    tx_end_irq: bool,
    mp_irq: bool,
    rx_enable: bool,
    tx_enable: bool,
    rx_irq: bool,
    tx_irq: bool,
}

impl Ctrl {
    fn from_scr(value: u8) -> Self {
        Self {
            clock_mode: value & 0x3,
            tx_end_irq: value & 0x04 != 0,
            mp_irq: value & 0x08 != 0,
            rx_enable: value & 0x10 != 0,
            tx_enable: value & 0x20 != 0,
            rx_irq: value & 0x40 != 0,
            tx_irq: value & 0x80 != 0,
        }
    }

    fn to_scr(self) -> u8 {
        self.clock_mode
            | u8::from(self.tx_end_irq) << 2
            | u8::from(self.mp_irq) << 3
            | u8::from(self.rx_enable) << 4
            | u8::from(self.tx_enable) << 5
            | u8::from(self.rx_irq) << 6
            | u8::from(self.tx_irq) << 7
    }
}

pub struct Port {
    id: usize,
    mode: Mode,
    ctrl: Ctrl,
    bit_factor: u8,
    cycles_per_bit: i64,
    tx_empty: bool,
    tx_bits_left: u8,
    tx_shift_reg: u8,
    tx_buffer: u8,
    tx_prepared_data: u8,
    tx_dreq: Dreq,
    sink: Option<ByteSink>,
}

impl Port {
    fn new(id: usize) -> Self {
        let mut port = Self {
            id,
            mode: Mode::default(),
            ctrl: Ctrl::default(),
            bit_factor: 0xFF,
            cycles_per_bit: 0,
            tx_empty: true,
            tx_bits_left: 0,
            tx_shift_reg: 0,
            tx_buffer: 0,
            tx_prepared_data: 0,
            tx_dreq: if id == 0 { Dreq::Txi0 } else { Dreq::Txi1 },
            sink: None,
        };
        port.calc_cycles_per_bit();
        port
    }

    fn calc_cycles_per_bit(&mut self) {
        self.cycles_per_bit =
            (32i64 << (self.mode.clock_factor * 2)) * (i64::from(self.bit_factor) + 1);
    }

    pub fn cycles_per_bit(&self) -> i64 {
        self.cycles_per_bit
    }

    pub fn is_transmitting(&self) -> bool {
        self.tx_bits_left > 0
    }
}

pub struct Serial {
    ports: [Port; PORT_COUNT],
}

impl Serial {
    pub fn new() -> Self {
        Self {
            ports: [Port::new(0), Port::new(1)],
        }
    }

    pub fn port(&self, index: usize) -> &Port {
        &self.ports[index]
    }

    pub fn set_byte_sink(&mut self, port: usize, sink: ByteSink) {
        self.ports[port].sink = Some(sink);
    }

    pub fn read8(&self, addr: u32) -> u8 {
        let addr = addr & 0xF;
        let port = &self.ports[(addr >> 3) as usize];
        match addr & 0x7 {
            0 => port.mode.to_smr(),
            1 => port.bit_factor,
            2 => port.ctrl.to_scr(),
            3 => port.tx_buffer,
            // TODO: model the receive and error status bits
            4 => u8::from(port.tx_empty) << 7,
            reg => {
                log(LogCategory::Serial, LogLevel::Debug, || {
                    format!("Serial: read port{} reg{}", port.id, reg)
                });
                0
            }
        }
    }
}

impl Default for Serial {
    fn default() -> Self {
        Self::new()
    }
}

pub fn write8(bus: &mut LoopyBus, addr: u32, value: u8) {
    let addr = addr & 0xF;
    let index = (addr >> 3) as usize;
    let reg = addr & 0x7;

    match reg {
        0 => {
            log(LogCategory::Serial, LogLevel::Debug, || {
                format!("Serial: write port{} mode: {:02X}", index, value)
            });
            let port = &mut bus.ocpm.serial.ports[index];
            port.mode = Mode::from_smr(value);
            port.calc_cycles_per_bit();
            if value & !SMR_CLOCK_FACTOR != 0 {
                bus.latch_unimplemented(Unimplemented::SerialMode { port: index, value });
            }
        }
        1 => {
            let port = &mut bus.ocpm.serial.ports[index];
            port.bit_factor = value;
            port.calc_cycles_per_bit();
            let cycles = port.cycles_per_bit;
            log(LogCategory::Serial, LogLevel::Debug, || {
                format!(
                    "Serial: port{} baudrate {} bit/s",
                    index,
                    crate::console::F_CPU / cycles
                )
            });
        }
        2 => {
            log(LogCategory::Serial, LogLevel::Debug, || {
                format!("Serial: write port{} ctrl: {:02X}", index, value)
            });
            let port = &mut bus.ocpm.serial.ports[index];
            port.ctrl = Ctrl::from_scr(value);
            if !port.ctrl.tx_enable {
                port.tx_empty = true;
            }
            check_tx_dreqs(bus);
        }
        3 => {
            log(LogCategory::Serial, LogLevel::Trace, || {
                format!("Serial: write port{} data: {:02X}", index, value)
            });
            let port = &mut bus.ocpm.serial.ports[index];
            port.tx_buffer = value;
            if !(port.tx_empty && port.ctrl.tx_enable) {
                return;
            }
            // Data written by the DMAC marks the buffer full by itself
            if bus.ocpm.dmac.is_dma_access() {
                port.tx_empty = false;
                if port.tx_bits_left == 0 {
                    tx_start(bus, index);
                } else {
                    let dreq = port.tx_dreq;
                    dmac::clear_dreq(bus, dreq);
                }
            }
        }
        4 => {
            log(LogCategory::Serial, LogLevel::Debug, || {
                format!("Serial: write port{} status: {:02X}", index, value)
            });
            let port = &mut bus.ocpm.serial.ports[index];
            if port.tx_empty && value & SSR_TDRE == 0 {
                port.tx_empty = false;
                if port.tx_bits_left == 0 {
                    tx_start(bus, index);
                }
            }
        }
        _ => log(LogCategory::Serial, LogLevel::Warn, || {
            format!("Serial: write to read-only port{} reg{}: {:02X}", index, reg, value)
        }),
    }
}

/// Move the buffered byte into the shifter and start clocking it out.
fn tx_start(bus: &mut LoopyBus, index: usize) {
    let port = &mut bus.ocpm.serial.ports[index];
    port.tx_bits_left = 8;
    port.tx_shift_reg = port.tx_buffer;
    port.tx_empty = true;
    schedule_tx(bus, index, 0);
}

fn schedule_tx(bus: &mut LoopyBus, index: usize, cycles_late: i64) {
    let cycles = bus.ocpm.serial.ports[index].cycles_per_bit - cycles_late;
    let timer = bus.cpu_timer;
    let delay = bus.sched.convert(timer, cycles);
    bus.sched
        .add_event(bus.funcs.serial_tx, delay, index as u64, timer);
}

/// Raise TXI towards the DMAC on every port that can take another byte.
pub fn check_tx_dreqs(bus: &mut LoopyBus) {
    for index in 0..PORT_COUNT {
        let port = &bus.ocpm.serial.ports[index];
        if port.tx_empty && port.ctrl.tx_enable {
            let dreq = port.tx_dreq;
            dmac::send_dreq(bus, dreq);
        }
    }
}

/// Scheduler event: one bit has been shifted out.
pub fn tx_event(console: &mut Console, param: u64, cycles_late: i64) {
    let index = param as usize;
    let port = &mut console.bus_mut().ocpm.serial.ports[index];
    let bit = port.tx_shift_reg & 0x1;
    port.tx_shift_reg >>= 1;
    port.tx_prepared_data = (port.tx_prepared_data >> 1) | (bit << 7);
    port.tx_bits_left -= 1;

    if port.tx_bits_left > 0 {
        schedule_tx(console.bus_mut(), index, cycles_late);
        return;
    }

    let data = port.tx_prepared_data;
    let sink = port.sink;
    log(LogCategory::Serial, LogLevel::Debug, || {
        format!("Serial: port{} tx {:02X}", index, data)
    });
    if let Some(sink) = sink {
        sink(console, data);
    }

    let bus = console.bus_mut();
    if !bus.ocpm.serial.ports[index].tx_empty {
        tx_start(bus, index);
        check_tx_dreqs(bus);
    } else {
        log(LogCategory::Serial, LogLevel::Debug, || {
            format!("Serial: port{} finished tx", index)
        });
    }
}
