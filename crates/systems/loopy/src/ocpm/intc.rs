//! Interrupt controller
//!
//! ## Registers
//!
//! - 0xF84: IPRA - IRQ0..IRQ3 priorities
//! - 0xF86: IPRB - IRQ4..IRQ7 priorities
//! - 0xF88: IPRC - DMAC0/1, DMAC2/3, ITU0, ITU1
//! - 0xF8A: IPRD - ITU2, ITU3, ITU4, SCI0
//! - 0xF8C: IPRE - SCI1, PRT/AD, WDT/REF
//! - 0xF8E: ICR
//!
//! Each IPR holds four 4-bit priority fields, highest nibble first. A source
//! with priority 0 is masked. Raised sources wait in a queue until the
//! console hands them to the CPU.

use emu_core::cpu_sh2::{NMI_PRIORITY, VECTOR_NMI};
use emu_core::logging::{log, LogCategory, LogLevel};

pub const INTC_START: u32 = 0xF84;
pub const INTC_END: u32 = 0xF90;

const IPR_COUNT: usize = 5;
const ICR_INDEX: usize = 5;

/// Serial interrupt kinds, in vector order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SciIrq {
    Eri = 0,
    Rxi = 1,
    Txi = 2,
    Tei = 3,
}

/// Timer interrupt kinds, in vector order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItuIrq {
    Imia = 0,
    Imib = 1,
    Ovi = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Nmi,
    Irq(u8),
    /// DMA transfer end, per channel
    Dei(u8),
    Itu(u8, ItuIrq),
    Sci(u8, SciIrq),
}

impl Source {
    pub fn vector(self) -> u32 {
        match self {
            Source::Nmi => VECTOR_NMI,
            Source::Irq(n) => 64 + u32::from(n),
            Source::Dei(n) => 72 + 2 * u32::from(n),
            Source::Itu(n, kind) => 80 + 4 * u32::from(n) + kind as u32,
            Source::Sci(port, kind) => 100 + 4 * u32::from(port) + kind as u32,
        }
    }

    /// (IPR index, nibble from the top) holding this source's priority
    fn priority_field(self) -> Option<(usize, u32)> {
        match self {
            Source::Nmi => None,
            Source::Irq(n) => Some((usize::from(n / 4), u32::from(n % 4))),
            Source::Dei(n) => Some((2, u32::from(n / 2))),
            Source::Itu(n @ 0..=1, _) => Some((2, 2 + u32::from(n))),
            Source::Itu(n, _) => Some((3, u32::from(n) - 2)),
            Source::Sci(0, _) => Some((3, 3)),
            Source::Sci(_, _) => Some((4, 0)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IrqRequest {
    pub vector: u32,
    pub priority: u8,
}

pub struct Intc {
    ipr: [u16; IPR_COUNT],
    icr: u16,
    queue: Vec<IrqRequest>,
}

impl Intc {
    pub fn new() -> Self {
        Self {
            ipr: [0; IPR_COUNT],
            icr: 0,
            queue: Vec::new(),
        }
    }

    pub fn priority(&self, source: Source) -> u8 {
        match source.priority_field() {
            None => NMI_PRIORITY,
            Some((reg, nibble)) => ((self.ipr[reg] >> (12 - nibble * 4)) & 0xF) as u8,
        }
    }

    /// Latch an interrupt request. Masked sources are dropped.
    pub fn raise(&mut self, source: Source) {
        let priority = self.priority(source);
        if priority == 0 {
            log(LogCategory::Interrupts, LogLevel::Trace, || {
                format!("INTC: {:?} masked", source)
            });
            return;
        }
        let vector = source.vector();
        log(LogCategory::Interrupts, LogLevel::Debug, || {
            format!("INTC: raise {:?} (vector {}, priority {})", source, vector, priority)
        });
        self.requeue(IrqRequest { vector, priority });
    }

    /// Put a request (back) in the queue. Duplicates of a vector collapse.
    pub fn requeue(&mut self, request: IrqRequest) {
        if !self.queue.iter().any(|r| r.vector == request.vector) {
            self.queue.push(request);
        }
    }

    /// Drop queued copies of a vector the CPU is already holding.
    pub fn discard(&mut self, vector: u32) {
        self.queue.retain(|r| r.vector != vector);
    }

    pub fn has_pending(&self) -> bool {
        !self.queue.is_empty()
    }

    /// Remove and return the highest-priority request that beats `current`.
    /// Ties go to the request raised first.
    pub fn take_above(&mut self, current: Option<u8>) -> Option<IrqRequest> {
        let floor = current.map_or(-1, i16::from);
        let (index, _) = self
            .queue
            .iter()
            .enumerate()
            .filter(|(_, r)| i16::from(r.priority) > floor)
            .min_by_key(|(i, r)| (std::cmp::Reverse(r.priority), *i))?;
        Some(self.queue.remove(index))
    }

    pub fn read16(&self, addr: u32) -> u16 {
        let index = ((addr & !1) - INTC_START) as usize / 2;
        match index {
            0..=4 => self.ipr[index],
            ICR_INDEX => self.icr,
            _ => {
                log(LogCategory::Interrupts, LogLevel::Warn, || {
                    format!("INTC: unmapped read16 {:03X}", addr)
                });
                0
            }
        }
    }

    pub fn write16(&mut self, addr: u32, value: u16) {
        let index = ((addr & !1) - INTC_START) as usize / 2;
        match index {
            0..=4 => {
                log(LogCategory::Interrupts, LogLevel::Debug, || {
                    format!("INTC: write IPR{}: {:04X}", (b'A' + index as u8) as char, value)
                });
                self.ipr[index] = value;
            }
            ICR_INDEX => self.icr = value,
            _ => log(LogCategory::Interrupts, LogLevel::Warn, || {
                format!("INTC: unmapped write16 {:03X}: {:04X}", addr, value)
            }),
        }
    }

    pub fn read8(&self, addr: u32) -> u8 {
        let half = self.read16(addr & !1);
        if addr & 1 == 0 {
            (half >> 8) as u8
        } else {
            half as u8
        }
    }

    pub fn write8(&mut self, addr: u32, value: u8) {
        let half = self.read16(addr & !1);
        let merged = if addr & 1 == 0 {
            (half & 0x00FF) | (u16::from(value) << 8)
        } else {
            (half & 0xFF00) | u16::from(value)
        };
        self.write16(addr & !1, merged);
    }
}

impl Default for Intc {
    fn default() -> Self {
        Self::new()
    }
}
