//! On-chip DMA controller
//!
//! Four channels, each with SAR (+0x0), DAR (+0x4), TCR (+0xA) and CHCR
//! (+0xE) at a stride of 0x10. DMAOR sits at 0x08 in the block.
//!
//! Transfers run synchronously through the bus as soon as a channel is
//! enabled and its request line is high, checking the line again before
//! every element.

use emu_core::cpu_sh2::MemorySh2;
use emu_core::logging::{log, LogCategory, LogLevel};

use crate::bus::LoopyBus;
use crate::ocpm::intc::Source;

pub const DMAC_START: u32 = 0xF40;
pub const DMAC_END: u32 = 0xF80;

const CHANNEL_COUNT: usize = 4;
const NUM_DREQ: usize = 16;
const DMAOR: u32 = 0x08;
const DMAOR_ENABLE: u16 = 0x0001;

/// Request lines, indexed by CHCR.RS
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dreq {
    External = 0,
    ExternalSingleToDevice = 2,
    ExternalSingleFromDevice = 3,
    Rxi0 = 4,
    Txi0 = 5,
    Rxi1 = 6,
    Txi1 = 7,
    Imia0 = 8,
    Imia1 = 9,
    Imia2 = 10,
    Imia3 = 11,
    Auto = 12,
}

impl Dreq {
    pub fn imia(channel: usize) -> Option<Dreq> {
        match channel {
            0 => Some(Dreq::Imia0),
            1 => Some(Dreq::Imia1),
            2 => Some(Dreq::Imia2),
            3 => Some(Dreq::Imia3),
            _ => None,
        }
    }
}

/// Compare-match lines are pulses: one element per request.
fn is_edge_line(line: usize) -> bool {
    (Dreq::Imia0 as usize..=Dreq::Imia3 as usize).contains(&line)
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct ChannelCtrl {
    enable: bool,
    finished: bool,
    irq_enable: bool,
    transfer_16bit: bool,
    is_burst: bool,
    ack_bits: u16,
    mode: u16,
    src_step: u16,
    dst_step: u16,
}

impl ChannelCtrl {
    fn get(&self) -> u16 {
        u16::from(self.enable)
            | u16::from(self.finished) << 1
            | u16::from(self.irq_enable) << 2
            | u16::from(self.transfer_16bit) << 3
            | u16::from(self.is_burst) << 4
            | self.ack_bits << 5
            | self.mode << 8
            | self.src_step << 12
            | self.dst_step << 14
    }

    fn set(&mut self, value: u16) {
        self.enable = value & 0x1 != 0;
        // TE can only be cleared by software
        self.finished &= value & 0x2 != 0;
        self.irq_enable = value & 0x4 != 0;
        self.transfer_16bit = value & 0x8 != 0;
        self.is_burst = value & 0x10 != 0;
        self.ack_bits = (value >> 5) & 0x7;
        self.mode = (value >> 8) & 0xF;
        self.src_step = (value >> 12) & 0x3;
        self.dst_step = (value >> 14) & 0x3;
    }
}

fn step_for(mode: u16) -> i32 {
    match mode {
        1 => 1,
        2 => -1,
        _ => 0,
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Channel {
    pub src_addr: u32,
    pub dst_addr: u32,
    pub transfer_size: u32,
    ctrl: ChannelCtrl,
}

impl Channel {
    pub fn chcr(&self) -> u16 {
        self.ctrl.get()
    }
}

pub struct Dmac {
    channels: [Channel; CHANNEL_COUNT],
    dreqs: [bool; NUM_DREQ],
    dmaor: u16,
    in_transfer: bool,
}

impl Dmac {
    pub fn new() -> Self {
        let mut dreqs = [false; NUM_DREQ];
        // Auto-request mode always goes through
        dreqs[Dreq::Auto as usize] = true;
        Self {
            channels: [Channel::default(); CHANNEL_COUNT],
            dreqs,
            dmaor: 0,
            in_transfer: false,
        }
    }

    pub fn channel(&self, index: usize) -> &Channel {
        &self.channels[index]
    }

    /// True while a channel is moving data, so targets can tell DMA writes
    /// from CPU writes.
    pub fn is_dma_access(&self) -> bool {
        self.in_transfer
    }

    pub fn dreq(&self, dreq: Dreq) -> bool {
        self.dreqs[dreq as usize]
    }

    fn runnable(&self, index: usize) -> bool {
        let ctrl = &self.channels[index].ctrl;
        ctrl.enable && !ctrl.finished && self.dreqs[ctrl.mode as usize]
    }

    pub fn read16(&self, addr: u32) -> u16 {
        let addr = addr & 0x3F;
        if addr == DMAOR {
            return self.dmaor;
        }
        let chan = &self.channels[(addr >> 4) as usize];
        match addr & 0xF {
            0x0 => (chan.src_addr >> 16) as u16,
            0x2 => chan.src_addr as u16,
            0x4 => (chan.dst_addr >> 16) as u16,
            0x6 => chan.dst_addr as u16,
            0xA => chan.transfer_size as u16,
            0xE => chan.ctrl.get(),
            _ => {
                log(LogCategory::DMA, LogLevel::Warn, || {
                    format!("DMAC: unmapped read16 {:02X}", addr)
                });
                0
            }
        }
    }

    pub fn read32(&self, addr: u32) -> u32 {
        let addr = addr & 0x3F;
        let chan = &self.channels[(addr >> 4) as usize];
        match addr & 0xF {
            0x0 => chan.src_addr,
            0x4 => chan.dst_addr,
            _ => (u32::from(self.read16(addr)) << 16) | u32::from(self.read16(addr + 2)),
        }
    }

    /// Register write. Returns true when channel activation must be
    /// re-evaluated.
    fn write16_reg(&mut self, addr: u32, value: u16) -> bool {
        let addr = addr & 0x3F;
        if addr == DMAOR {
            log(LogCategory::DMA, LogLevel::Debug, || {
                format!("DMAC: write DMAOR: {:04X}", value)
            });
            self.dmaor = value;
            return true;
        }
        let chan = &mut self.channels[(addr >> 4) as usize];
        match addr & 0xF {
            0x0 => chan.src_addr = (chan.src_addr & 0xFFFF) | (u32::from(value) << 16),
            0x2 => chan.src_addr = (chan.src_addr & 0xFFFF_0000) | u32::from(value),
            0x4 => chan.dst_addr = (chan.dst_addr & 0xFFFF) | (u32::from(value) << 16),
            0x6 => chan.dst_addr = (chan.dst_addr & 0xFFFF_0000) | u32::from(value),
            0xA => {
                chan.transfer_size = if value == 0 { 0x10000 } else { u32::from(value) };
            }
            0xE => {
                chan.ctrl.set(value);
                return true;
            }
            _ => log(LogCategory::DMA, LogLevel::Warn, || {
                format!("DMAC: unmapped write16 {:02X}: {:04X}", addr, value)
            }),
        }
        false
    }

    fn write32_reg(&mut self, addr: u32, value: u32) -> bool {
        let addr = addr & 0x3F;
        let chan = &mut self.channels[(addr >> 4) as usize];
        match addr & 0xF {
            0x0 => chan.src_addr = value,
            0x4 => chan.dst_addr = value,
            _ => {
                let hi = self.write16_reg(addr, (value >> 16) as u16);
                let lo = self.write16_reg(addr + 2, value as u16);
                return hi || lo;
            }
        }
        false
    }
}

impl Default for Dmac {
    fn default() -> Self {
        Self::new()
    }
}

pub fn write16(bus: &mut LoopyBus, addr: u32, value: u16) {
    if bus.ocpm.dmac.write16_reg(addr, value) {
        check_activations(bus);
    }
}

pub fn write32(bus: &mut LoopyBus, addr: u32, value: u32) {
    if bus.ocpm.dmac.write32_reg(addr, value) {
        check_activations(bus);
    }
}

pub fn send_dreq(bus: &mut LoopyBus, dreq: Dreq) {
    bus.ocpm.dmac.dreqs[dreq as usize] = true;
    check_activations(bus);
}

pub fn clear_dreq(bus: &mut LoopyBus, dreq: Dreq) {
    bus.ocpm.dmac.dreqs[dreq as usize] = false;
    check_activations(bus);
}

/// Run every channel that is enabled with its request line high.
///
/// Requests raised by the targets of a running transfer are picked up by
/// the outer loop once that transfer returns.
pub fn check_activations(bus: &mut LoopyBus) {
    if bus.ocpm.dmac.in_transfer {
        return;
    }
    // TODO: honor the NMI and address-error flags in DMAOR
    while bus.ocpm.dmac.dmaor & DMAOR_ENABLE != 0 {
        let Some(index) = (0..CHANNEL_COUNT).find(|&i| bus.ocpm.dmac.runnable(i)) else {
            break;
        };
        run_channel(bus, index);
    }
}

fn run_channel(bus: &mut LoopyBus, index: usize) {
    let ctrl = bus.ocpm.dmac.channels[index].ctrl;
    let line = ctrl.mode as usize;
    let size_shift = u32::from(ctrl.transfer_16bit);
    let src_step = step_for(ctrl.src_step) << size_shift;
    let dst_step = step_for(ctrl.dst_step) << size_shift;

    log(LogCategory::DMA, LogLevel::Debug, || {
        let chan = &bus.ocpm.dmac.channels[index];
        format!(
            "DMAC: ch{} start {}-bit transfer src:{:08X} dst:{:08X} size:{:X} sstep:{} dstep:{}",
            index,
            8 << size_shift,
            chan.src_addr,
            chan.dst_addr,
            chan.transfer_size,
            src_step,
            dst_step
        )
    });

    bus.ocpm.dmac.in_transfer = true;
    loop {
        let chan = bus.ocpm.dmac.channels[index];
        if chan.transfer_size == 0 || !bus.ocpm.dmac.dreqs[line] {
            break;
        }

        if ctrl.transfer_16bit {
            let value = bus.read_halfword(chan.src_addr);
            bus.write_halfword(chan.dst_addr, value);
        } else {
            let value = bus.read_byte(chan.src_addr);
            bus.write_byte(chan.dst_addr, value);
        }

        let chan = &mut bus.ocpm.dmac.channels[index];
        chan.src_addr = chan.src_addr.wrapping_add_signed(src_step);
        chan.dst_addr = chan.dst_addr.wrapping_add_signed(dst_step);
        chan.transfer_size -= 1;

        if is_edge_line(line) {
            bus.ocpm.dmac.dreqs[line] = false;
        }
    }
    bus.ocpm.dmac.in_transfer = false;

    let chan = &mut bus.ocpm.dmac.channels[index];
    if chan.transfer_size == 0 {
        chan.ctrl.finished = true;
        log(LogCategory::DMA, LogLevel::Debug, || format!("DMAC: ch{} finished", index));
        if chan.ctrl.irq_enable {
            bus.ocpm.intc.raise(Source::Dei(index as u8));
        }
    }
}
