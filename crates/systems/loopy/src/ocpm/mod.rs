//! SH7021 on-chip peripheral modules
//!
//! The I/O block is mirrored across 0x05FFFE00..0x06000000; every access is
//! folded to a 12-bit register address (0xE00..0xFFF) before dispatch.
//! Serial, timer and INTC registers are byte addressable; DMAC registers
//! take 32-bit accesses. Everything else is halfword based.

pub mod dmac;
pub mod intc;
pub mod itu;
pub mod pfc;
pub mod serial;

use emu_core::logging::{log, LogCategory, LogLevel};
use emu_core::wordops::{load_be16, load_be32, store_be16, store_be32};

use crate::bus::LoopyBus;
use dmac::{Dmac, DMAC_END, DMAC_START};
use intc::{Intc, INTC_END, INTC_START};
use itu::{Itu, TIMER_END, TIMER_START};
use pfc::{Pfc, PFC_END, PFC_START};
use serial::{Serial, SERIAL_END, SERIAL_START};

pub const IO_START: u32 = 0x05FF_FE00;
pub const IO_END: u32 = 0x0600_0000;

pub const ORAM_START: u32 = 0x0F00_0000;
pub const ORAM_END: u32 = 0x1000_0000;
const ORAM_SIZE: usize = 0x400;

/// WDT TCSR: the BIOS pokes it constantly
const WDT_TCSR: u32 = 0xFB8;

pub struct Ocpm {
    pub dmac: Dmac,
    pub serial: Serial,
    pub intc: Intc,
    pub itu: Itu,
    pub pfc: Pfc,
    pub oram: Vec<u8>,
}

impl Ocpm {
    pub fn new() -> Self {
        Self {
            dmac: Dmac::new(),
            serial: Serial::new(),
            intc: Intc::new(),
            itu: Itu::new(),
            pfc: Pfc::new(),
            oram: vec![0; ORAM_SIZE],
        }
    }

    fn oram_index(addr: u32) -> usize {
        addr as usize & (ORAM_SIZE - 1)
    }

    pub fn oram_read8(&self, addr: u32) -> u8 {
        self.oram[Self::oram_index(addr)]
    }

    pub fn oram_read16(&self, addr: u32) -> u16 {
        load_be16(&self.oram, Self::oram_index(addr & !1))
    }

    pub fn oram_read32(&self, addr: u32) -> u32 {
        load_be32(&self.oram, Self::oram_index(addr & !3))
    }

    pub fn oram_write8(&mut self, addr: u32, value: u8) {
        self.oram[Self::oram_index(addr)] = value;
    }

    pub fn oram_write16(&mut self, addr: u32, value: u16) {
        store_be16(&mut self.oram, Self::oram_index(addr & !1), value);
    }

    pub fn oram_write32(&mut self, addr: u32, value: u32) {
        store_be32(&mut self.oram, Self::oram_index(addr & !3), value);
    }
}

impl Default for Ocpm {
    fn default() -> Self {
        Self::new()
    }
}

fn io_addr(addr: u32) -> u32 {
    (addr & 0x1FF) + 0xE00
}

fn in_range(addr: u32, start: u32, end: u32) -> bool {
    (start..end).contains(&addr)
}

pub fn io_read8(bus: &mut LoopyBus, addr: u32) -> u8 {
    let io = io_addr(addr);
    if in_range(io, SERIAL_START, SERIAL_END) {
        return bus.ocpm.serial.read8(io);
    }
    if in_range(io, TIMER_START, TIMER_END) {
        return itu::read8(bus, io);
    }
    if in_range(io, INTC_START, INTC_END) {
        return bus.ocpm.intc.read8(io);
    }

    let half = io_read16(bus, addr & !1);
    if io & 1 == 0 {
        (half >> 8) as u8
    } else {
        half as u8
    }
}

pub fn io_read16(bus: &mut LoopyBus, addr: u32) -> u16 {
    let io = io_addr(addr & !1);
    if in_range(io, TIMER_START, TIMER_END) {
        return itu::read16(bus, io);
    }
    if in_range(io, DMAC_START, DMAC_END) {
        return bus.ocpm.dmac.read16(io);
    }
    if in_range(io, INTC_START, INTC_END) {
        return bus.ocpm.intc.read16(io);
    }
    if in_range(io, PFC_START, PFC_END) {
        return bus.ocpm.pfc.read16(io);
    }

    log(LogCategory::Bus, LogLevel::Warn, || {
        format!("OCPM: unmapped read16 {:03X}", io)
    });
    0
}

pub fn io_read32(bus: &mut LoopyBus, addr: u32) -> u32 {
    let io = io_addr(addr);
    if in_range(io, DMAC_START, DMAC_END) {
        return bus.ocpm.dmac.read32(io);
    }
    let hi = io_read16(bus, addr);
    let lo = io_read16(bus, addr.wrapping_add(2));
    (u32::from(hi) << 16) | u32::from(lo)
}

pub fn io_write8(bus: &mut LoopyBus, addr: u32, value: u8) {
    let io = io_addr(addr);
    if in_range(io, SERIAL_START, SERIAL_END) {
        serial::write8(bus, io, value);
        return;
    }
    if in_range(io, TIMER_START, TIMER_END) {
        itu::write8(bus, io, value);
        return;
    }
    if in_range(io, INTC_START, INTC_END) {
        bus.ocpm.intc.write8(io, value);
        return;
    }

    let half = io_read16(bus, addr & !1);
    let merged = if io & 1 == 0 {
        (half & 0x00FF) | (u16::from(value) << 8)
    } else {
        (half & 0xFF00) | u16::from(value)
    };
    io_write16(bus, addr & !1, merged);
}

pub fn io_write16(bus: &mut LoopyBus, addr: u32, value: u16) {
    let io = io_addr(addr & !1);
    if in_range(io, TIMER_START, TIMER_END) {
        itu::write16(bus, io, value);
        return;
    }
    if in_range(io, DMAC_START, DMAC_END) {
        dmac::write16(bus, io, value);
        return;
    }
    if in_range(io, INTC_START, INTC_END) {
        bus.ocpm.intc.write16(io, value);
        return;
    }
    if in_range(io, PFC_START, PFC_END) {
        bus.ocpm.pfc.write16(io, value);
        return;
    }

    if io != WDT_TCSR {
        log(LogCategory::Bus, LogLevel::Warn, || {
            format!("OCPM: unmapped write16 {:03X}: {:04X}", io, value)
        });
    }
}

pub fn io_write32(bus: &mut LoopyBus, addr: u32, value: u32) {
    let io = io_addr(addr);
    if in_range(io, DMAC_START, DMAC_END) {
        dmac::write32(bus, io, value);
        return;
    }
    io_write16(bus, addr, (value >> 16) as u16);
    io_write16(bus, addr.wrapping_add(2), value as u16);
}
