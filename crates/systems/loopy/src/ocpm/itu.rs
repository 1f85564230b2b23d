//! 16-bit integrated timer pulse unit (ITU)
//!
//! ## Memory Map
//!
//! - 0xF00: TSTR - counter start bits, one per channel
//! - 0xF01: TSNC - synchronous operation
//! - 0xF02: TMDR - mode
//! - 0xF03: TFCR - function control
//! - 0xF31: TOCR - output control
//!
//! Channel blocks at 0xF04, 0xF0E, 0xF18, 0xF22 and 0xF32:
//! - +0 TCR, +1 TIOR, +2 TIER, +3 TSR (8-bit)
//! - +4 TCNT, +6 GRA, +8 GRB (16-bit)
//! - +A BRA, +C BRB (channels 3 and 4 only)
//!
//! Counters are not ticked. Each channel remembers the counter value at
//! the last sync point and derives the current value from the scheduler
//! clock; the next compare match or overflow is a scheduler event.

use emu_core::logging::{log, LogCategory, LogLevel};
use emu_core::scheduler::EventHandle;

use crate::bus::LoopyBus;
use crate::console::Console;
use crate::ocpm::dmac::{self, Dreq};
use crate::ocpm::intc::{ItuIrq, Source};
use crate::Unimplemented;

pub const TIMER_START: u32 = 0xF00;
pub const TIMER_END: u32 = 0xF40;

pub const CHANNEL_COUNT: usize = 5;
const CHANNEL_BASES: [u32; CHANNEL_COUNT] = [0xF04, 0xF0E, 0xF18, 0xF22, 0xF32];

const TSTR: u32 = 0xF00;
const TSNC: u32 = 0xF01;
const TMDR: u32 = 0xF02;
const TFCR: u32 = 0xF03;
const TOCR: u32 = 0xF31;

const TSR_IMFA: u8 = 0x01;
const TSR_IMFB: u8 = 0x02;
const TSR_OVF: u8 = 0x04;

const COUNTER_RANGE: u64 = 0x10000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Reg {
    Tcr,
    Tior,
    Tier,
    Tsr,
    Tcnt,
    Gra,
    Grb,
    Bra,
    Brb,
}

/// Decode a channel register address into (channel, register, low byte).
fn decode(addr: u32) -> Option<(usize, Reg, bool)> {
    let (channel, base) = CHANNEL_BASES
        .iter()
        .enumerate()
        .rev()
        .find(|(_, base)| addr >= **base)?;
    let offset = addr - *base;
    let buffered = channel >= 3;
    let reg = match offset {
        0 => Reg::Tcr,
        1 => Reg::Tior,
        2 => Reg::Tier,
        3 => Reg::Tsr,
        4 | 5 => Reg::Tcnt,
        6 | 7 => Reg::Gra,
        8 | 9 => Reg::Grb,
        0xA | 0xB if buffered => Reg::Bra,
        0xC | 0xD if buffered => Reg::Brb,
        _ => return None,
    };
    Some((channel, reg, offset & 1 == 1))
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Channel {
    tcr: u8,
    tior: u8,
    tier: u8,
    tsr: u8,
    gra: u16,
    grb: u16,
    bra: u16,
    brb: u16,
    /// Counter value at `synced_at`
    counter: u16,
    /// CPU cycle of the last sync, aligned to the prescaler
    synced_at: i64,
    event: Option<EventHandle>,
    /// Flags the pending event will set
    event_flags: u8,
}

impl Channel {
    fn divider(&self) -> i64 {
        1 << (self.tcr & 0x3)
    }

    /// Value the counter clears after, if CCLR selects one
    fn clear_value(&self) -> Option<u16> {
        match (self.tcr >> 5) & 0x3 {
            1 => Some(self.gra),
            2 => Some(self.grb),
            _ => None,
        }
    }

    /// Advance the counter by `ticks` counts.
    fn advance(&mut self, ticks: u64) {
        let mut ticks = ticks;
        let counter = u64::from(self.counter);
        let top = self.clear_value().map(u64::from);

        match top {
            Some(top) if counter <= top => {
                self.counter = ((counter + ticks) % (top + 1)) as u16;
            }
            _ => {
                let to_wrap = COUNTER_RANGE - counter;
                if ticks < to_wrap {
                    self.counter = (counter + ticks) as u16;
                    return;
                }
                ticks -= to_wrap;
                let period = top.map_or(COUNTER_RANGE, |top| top + 1);
                self.counter = (ticks % period) as u16;
            }
        }
    }

    /// Counts until the counter next equals `value`.
    fn ticks_until(&self, value: u16) -> Option<u64> {
        let counter = u64::from(self.counter);
        let value = u64::from(value);
        let top = self.clear_value().map(u64::from);

        match top {
            Some(top) if counter <= top => {
                if value > top {
                    return None;
                }
                let d = (value + top + 1 - counter) % (top + 1);
                Some(if d == 0 { top + 1 } else { d })
            }
            _ => {
                if value > counter {
                    return Some(value - counter);
                }
                // Through the wrap, then within the clear range
                if top.is_some_and(|top| value > top) {
                    return None;
                }
                Some(COUNTER_RANGE - counter + value)
            }
        }
    }

    /// Counts until the counter next wraps from 0xFFFF to 0.
    fn ticks_until_overflow(&self) -> Option<u64> {
        match self.clear_value() {
            Some(top) if self.counter <= top => None,
            _ => Some(COUNTER_RANGE - u64::from(self.counter)),
        }
    }

    /// Distance to the next event and the flags it sets.
    fn next_event(&self) -> Option<(u64, u8)> {
        let candidates = [
            (self.ticks_until(self.gra), TSR_IMFA),
            (self.ticks_until(self.grb), TSR_IMFB),
            (self.ticks_until_overflow(), TSR_OVF),
        ];
        let ticks = candidates.iter().filter_map(|(t, _)| *t).min()?;
        let flags = candidates
            .iter()
            .filter(|(t, _)| *t == Some(ticks))
            .fold(0u8, |acc, (_, f)| acc | *f);
        Some((ticks, flags))
    }

    pub fn tsr(&self) -> u8 {
        self.tsr
    }
}

pub struct Itu {
    tstr: u8,
    tsnc: u8,
    tmdr: u8,
    tfcr: u8,
    tocr: u8,
    channels: [Channel; CHANNEL_COUNT],
}

impl Itu {
    pub fn new() -> Self {
        let mut channels = [Channel::default(); CHANNEL_COUNT];
        for chan in channels.iter_mut() {
            chan.gra = 0xFFFF;
            chan.grb = 0xFFFF;
        }
        for chan in channels.iter_mut().skip(3) {
            chan.bra = 0xFFFF;
            chan.brb = 0xFFFF;
        }
        Self {
            tstr: 0,
            tsnc: 0,
            tmdr: 0,
            tfcr: 0,
            tocr: 0xFF,
            channels,
        }
    }

    pub fn channel(&self, index: usize) -> &Channel {
        &self.channels[index]
    }

    fn is_running(&self, index: usize) -> bool {
        self.tstr & (1 << index) != 0
    }
}

impl Default for Itu {
    fn default() -> Self {
        Self::new()
    }
}

fn now_cycles(bus: &LoopyBus) -> i64 {
    let timer = bus.cpu_timer;
    bus.sched.now(timer) / bus.sched.convert(timer, 1)
}

/// Bring a channel's counter up to `cycle`.
fn sync_to(bus: &mut LoopyBus, index: usize, cycle: i64) {
    let running = bus.ocpm.itu.is_running(index);
    let chan = &mut bus.ocpm.itu.channels[index];
    if !running {
        chan.synced_at = cycle;
        return;
    }
    let div = chan.divider();
    let ticks = (cycle - chan.synced_at).max(0) / div;
    chan.advance(ticks as u64);
    chan.synced_at += ticks * div;
}

fn sync(bus: &mut LoopyBus, index: usize) {
    let now = now_cycles(bus);
    sync_to(bus, index, now);
}

/// Drop the pending event and schedule the next one from the synced state.
fn reschedule(bus: &mut LoopyBus, index: usize) {
    let timer = bus.cpu_timer;
    if let Some(handle) = bus.ocpm.itu.channels[index].event.take() {
        bus.sched.cancel_event(timer, handle);
    }
    if !bus.ocpm.itu.is_running(index) {
        return;
    }

    let chan = &bus.ocpm.itu.channels[index];
    let Some((ticks, flags)) = chan.next_event() else {
        return;
    };
    let target = chan.synced_at + ticks as i64 * chan.divider();
    let delay = bus.sched.convert(timer, target - now_cycles(bus));
    let handle = bus
        .sched
        .add_event(bus.funcs.itu, delay, index as u64, timer);

    let chan = &mut bus.ocpm.itu.channels[index];
    chan.event = Some(handle);
    chan.event_flags = flags;
}

/// Scheduler event: compare match or overflow on channel `param`.
pub fn itu_event(console: &mut Console, param: u64, cycles_late: i64) {
    let index = param as usize;
    let bus = console.bus_mut();
    let now = now_cycles(bus);
    sync_to(bus, index, now - cycles_late);

    let chan = &mut bus.ocpm.itu.channels[index];
    chan.event = None;
    let flags = chan.event_flags;
    chan.tsr |= flags;
    let tier = chan.tier;

    log(LogCategory::Timers, LogLevel::Trace, || {
        format!("ITU: ch{} event flags {:02X}", index, flags)
    });

    let channel = index as u8;
    if flags & TSR_IMFA != 0 {
        if tier & TSR_IMFA != 0 {
            bus.ocpm.intc.raise(Source::Itu(channel, ItuIrq::Imia));
        }
        if let Some(dreq) = Dreq::imia(index) {
            dmac::send_dreq(bus, dreq);
        }
    }
    if flags & TSR_IMFB != 0 && tier & TSR_IMFB != 0 {
        bus.ocpm.intc.raise(Source::Itu(channel, ItuIrq::Imib));
    }
    if flags & TSR_OVF != 0 && tier & TSR_OVF != 0 {
        bus.ocpm.intc.raise(Source::Itu(channel, ItuIrq::Ovi));
    }

    reschedule(bus, index);
}

pub fn read8(bus: &mut LoopyBus, addr: u32) -> u8 {
    let itu = &bus.ocpm.itu;
    match addr {
        TSTR => itu.tstr | 0xE0,
        TSNC => itu.tsnc | 0xE0,
        TMDR => itu.tmdr,
        TFCR => itu.tfcr,
        TOCR => itu.tocr,
        _ => match decode(addr) {
            Some((index, reg, low)) => {
                let value = read_reg(bus, index, reg);
                if low {
                    value as u8
                } else {
                    (value >> 8) as u8
                }
            }
            None => {
                log(LogCategory::Timers, LogLevel::Warn, || {
                    format!("ITU: unmapped read8 {:03X}", addr)
                });
                0
            }
        },
    }
}

pub fn read16(bus: &mut LoopyBus, addr: u32) -> u16 {
    match decode(addr) {
        Some((index, reg, _)) if is_wide(reg) => read_reg(bus, index, reg),
        _ => (u16::from(read8(bus, addr)) << 8) | u16::from(read8(bus, addr + 1)),
    }
}

fn is_wide(reg: Reg) -> bool {
    matches!(reg, Reg::Tcnt | Reg::Gra | Reg::Grb | Reg::Bra | Reg::Brb)
}

/// Narrow registers read back in the high byte of their halfword slot.
fn read_reg(bus: &mut LoopyBus, index: usize, reg: Reg) -> u16 {
    if reg == Reg::Tcnt {
        sync(bus, index);
    }
    let chan = &bus.ocpm.itu.channels[index];
    match reg {
        Reg::Tcr => u16::from(chan.tcr | 0x80) << 8,
        Reg::Tior => u16::from(chan.tior | 0x88) << 8,
        Reg::Tier => u16::from(chan.tier | 0xF8) << 8,
        Reg::Tsr => u16::from(chan.tsr | 0xF8) << 8,
        Reg::Tcnt => chan.counter,
        Reg::Gra => chan.gra,
        Reg::Grb => chan.grb,
        Reg::Bra => chan.bra,
        Reg::Brb => chan.brb,
    }
}

pub fn write8(bus: &mut LoopyBus, addr: u32, value: u8) {
    match addr {
        TSTR => write_tstr(bus, value),
        TSNC => bus.ocpm.itu.tsnc = value & 0x1F,
        TMDR => {
            bus.ocpm.itu.tmdr = value;
            if value & 0x1F != 0 {
                bus.latch_unimplemented(Unimplemented::TimerMode(value));
            }
        }
        TFCR => bus.ocpm.itu.tfcr = value,
        TOCR => bus.ocpm.itu.tocr = value,
        _ => match decode(addr) {
            Some((index, reg, low)) if is_wide(reg) => {
                let old = read_reg(bus, index, reg);
                let merged = if low {
                    (old & 0xFF00) | u16::from(value)
                } else {
                    (old & 0x00FF) | (u16::from(value) << 8)
                };
                write_reg(bus, index, reg, merged);
            }
            Some((index, reg, _)) => write_reg(bus, index, reg, u16::from(value) << 8),
            None => log(LogCategory::Timers, LogLevel::Warn, || {
                format!("ITU: unmapped write8 {:03X}: {:02X}", addr, value)
            }),
        },
    }
}

pub fn write16(bus: &mut LoopyBus, addr: u32, value: u16) {
    match decode(addr) {
        Some((index, reg, _)) if is_wide(reg) => write_reg(bus, index, reg, value),
        _ => {
            write8(bus, addr, (value >> 8) as u8);
            write8(bus, addr + 1, value as u8);
        }
    }
}

fn write_tstr(bus: &mut LoopyBus, value: u8) {
    let now = now_cycles(bus);
    for index in 0..CHANNEL_COUNT {
        sync_to(bus, index, now);
    }
    log(LogCategory::Timers, LogLevel::Debug, || {
        format!("ITU: write TSTR: {:02X}", value)
    });
    // Stopped channels were synced to now, so a start counts from here.
    // Running ones keep their prescaler phase.
    let changed = bus.ocpm.itu.tstr ^ (value & 0x1F);
    bus.ocpm.itu.tstr = value & 0x1F;
    for index in 0..CHANNEL_COUNT {
        if changed & (1 << index) != 0 {
            reschedule(bus, index);
        }
    }
}

fn write_reg(bus: &mut LoopyBus, index: usize, reg: Reg, value: u16) {
    sync(bus, index);
    let high = (value >> 8) as u8;
    let chan = &mut bus.ocpm.itu.channels[index];
    match reg {
        Reg::Tcr => {
            log(LogCategory::Timers, LogLevel::Debug, || {
                format!("ITU: write TCR{}: {:02X}", index, high)
            });
            chan.tcr = high & 0x7F;
            if high & 0x4 != 0 {
                bus.latch_unimplemented(Unimplemented::ExternalTimerClock {
                    channel: index,
                });
            }
        }
        Reg::Tior => chan.tior = high & 0x77,
        Reg::Tier => chan.tier = high & 0x07,
        // Flags clear where 0 is written
        Reg::Tsr => chan.tsr &= high | !0x07,
        Reg::Tcnt => chan.counter = value,
        Reg::Gra => chan.gra = value,
        Reg::Grb => chan.grb = value,
        Reg::Bra => chan.bra = value,
        Reg::Brb => chan.brb = value,
    }
    if !matches!(reg, Reg::Tsr | Reg::Tior | Reg::Tier | Reg::Bra | Reg::Brb) {
        reschedule(bus, index);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::tests::make_console;
    use emu_core::cpu_sh2::MemorySh2;
    use emu_core::scheduler::process_slice;

    fn run_cycles(console: &mut Console, cycles: i64) {
        let timer = console.bus().cpu_timer;
        process_slice(console, timer, cycles);
    }

    #[test]
    fn test_decode_channel_registers() {
        assert_eq!(decode(0xF04), Some((0, Reg::Tcr, false)));
        assert_eq!(decode(0xF13), Some((1, Reg::Tcnt, true)));
        assert_eq!(decode(0xF20), Some((2, Reg::Grb, false)));
        assert_eq!(decode(0xF2C), Some((3, Reg::Bra, false)));
        assert_eq!(decode(0xF3E), Some((4, Reg::Brb, false)));
        assert_eq!(decode(0xF0C), Some((0, Reg::Grb, false)));
        assert_eq!(decode(0xF30), None);
        assert_eq!(decode(0xF02), None);
    }

    #[test]
    fn test_counter_with_clear_on_gra() {
        let mut chan = Channel {
            tcr: 0x20,
            gra: 9,
            grb: 0xFFFF,
            ..Default::default()
        };
        assert_eq!(chan.ticks_until(9), Some(9));
        assert_eq!(chan.ticks_until_overflow(), None);
        assert_eq!(chan.next_event(), Some((9, TSR_IMFA)));

        chan.advance(9);
        assert_eq!(chan.counter, 9);
        chan.advance(1);
        assert_eq!(chan.counter, 0);
        chan.advance(25);
        assert_eq!(chan.counter, 5);
        assert_eq!(chan.ticks_until(9), Some(4));
    }

    #[test]
    fn test_free_running_overflow() {
        let mut chan = Channel {
            counter: 0xFFF0,
            gra: 0x10,
            grb: 0xFFF8,
            ..Default::default()
        };
        assert_eq!(chan.ticks_until(0xFFF8), Some(8));
        assert_eq!(chan.ticks_until_overflow(), Some(0x10));
        assert_eq!(chan.ticks_until(0x10), Some(0x20));
        chan.advance(0x12);
        assert_eq!(chan.counter, 2);
    }

    #[test]
    fn test_counter_reads_scheduler_time() {
        let mut console = make_console();
        let bus = console.bus_mut();
        write8(bus, 0xF04, 0x01); // phi/2
        write8(bus, TSTR, 0x01);
        run_cycles(&mut console, 100);
        assert_eq!(read16(console.bus_mut(), 0xF08), 50);

        // Stopped counters hold their value
        write8(console.bus_mut(), TSTR, 0x00);
        run_cycles(&mut console, 100);
        assert_eq!(read16(console.bus_mut(), 0xF08), 50);
    }

    #[test]
    fn test_starting_a_channel_keeps_others_in_phase() {
        let mut console = make_console();
        let bus = console.bus_mut();
        write8(bus, 0xF04, 0x03); // ch0 phi/8
        write8(bus, TSTR, 0x01);
        run_cycles(&mut console, 4);
        write8(console.bus_mut(), TSTR, 0x03);
        run_cycles(&mut console, 4);
        assert_eq!(read16(console.bus_mut(), 0xF08), 1);
        assert_eq!(read16(console.bus_mut(), 0xF12), 4);
    }

    #[test]
    fn test_compare_match_sets_flag_and_interrupt() {
        let mut console = make_console();
        let bus = console.bus_mut();
        bus.ocpm.intc.write16(0xF88, 0x00A0); // ITU0 priority 10
        write8(bus, 0xF04, 0x20); // clear on GRA, phi/1
        write16(bus, 0xF0A, 99);
        write8(bus, 0xF06, 0x01); // IMIEA
        write8(bus, TSTR, 0x01);

        run_cycles(&mut console, 98);
        assert_eq!(console.bus().ocpm.itu.channel(0).tsr() & TSR_IMFA, 0);
        run_cycles(&mut console, 2);
        assert_ne!(console.bus().ocpm.itu.channel(0).tsr() & TSR_IMFA, 0);

        let req = console.bus_mut().ocpm.intc.take_above(None).unwrap();
        assert_eq!(req.vector, 80);
        assert_eq!(req.priority, 10);

        // Period is GRA + 1
        run_cycles(&mut console, 50);
        assert_eq!(read16(console.bus_mut(), 0xF08), 50);
    }

    #[test]
    fn test_tsr_flags_clear_on_zero_write() {
        let mut console = make_console();
        let bus = console.bus_mut();
        write16(bus, 0xF0A, 4);
        write8(bus, TSTR, 0x01);
        run_cycles(&mut console, 5);
        let bus = console.bus_mut();
        assert_ne!(bus.ocpm.itu.channel(0).tsr() & TSR_IMFA, 0);
        write8(bus, 0xF07, !TSR_IMFA);
        assert_eq!(bus.ocpm.itu.channel(0).tsr() & TSR_IMFA, 0);
    }

    #[test]
    fn test_compare_match_requests_dma() {
        let mut console = make_console();
        let bus = console.bus_mut();
        bus.write_byte(0x0100_0000, 0x5A);
        let dmac = 0x05FF_FF40;
        bus.write_word(dmac, 0x0100_0000);
        bus.write_word(dmac + 4, 0x0100_0100);
        bus.write_halfword(dmac + 0x0A, 1);
        bus.write_halfword(dmac + 0x08, 1);
        bus.write_halfword(dmac + 0x0E, 0x5801); // IMIA0

        write16(bus, 0xF0A, 9);
        write8(bus, TSTR, 0x01);
        run_cycles(&mut console, 10);
        assert_eq!(console.bus_mut().read_byte(0x0100_0100), 0x5A);
    }
}
