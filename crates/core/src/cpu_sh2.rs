//! Hitachi SH7021 (SH-2 family) CPU core
//!
//! The core models the one-deep fetch/execute pipeline of the SH7021:
//! every instruction executed is the one fetched on the previous ready
//! cycle, and the bus cost of a fetch decides when the pipeline becomes
//! ready again. Exceptions are latched as pending and dispatched only on a
//! ready cycle that is not the delay slot of a branch (or the slot after a
//! control register access, for interrupts).
//!
//! - 16 general-purpose 32-bit registers (R15 is the stack pointer)
//! - SR holds T, S, the 4-bit interrupt mask, Q and M
//! - Big-endian bus, accessed through [`MemorySh2`]
//!
//! Hooks can intercept execution at exact instruction addresses. They are
//! used by systems to replace BIOS routines with high-level emulation.

mod decode;
mod interpreter;
#[cfg(test)]
mod tests;

#[cfg(any(test, feature = "bench"))]
mod array_memory;
#[cfg(any(test, feature = "bench"))]
pub use array_memory::ArrayMemory;

pub use decode::{decode, decode_uncached, DecodeEntry, Op, DECODE_TABLE};

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::logging::{log, LogCategory, LogLevel};

/// Memory interface trait for the SH2 CPU
///
/// Reads take `&mut self` because many SH2 peripherals have read side
/// effects (clear-on-read counters, FIFO pops).
pub trait MemorySh2 {
    fn read_byte(&mut self, addr: u32) -> u8;
    fn read_halfword(&mut self, addr: u32) -> u16;
    fn read_word(&mut self, addr: u32) -> u32;
    fn write_byte(&mut self, addr: u32, val: u8);
    fn write_halfword(&mut self, addr: u32, val: u16);
    fn write_word(&mut self, addr: u32, val: u32);

    /// Bus cycles taken by a read at `addr`
    fn read_cycles(&self, _addr: u32) -> u32 {
        1
    }

    /// Bus cycles taken by a write at `addr`
    fn write_cycles(&self, addr: u32) -> u32 {
        self.read_cycles(addr)
    }
}

pub const SR_T: u32 = 0x0001;
pub const SR_S: u32 = 0x0002;
pub const SR_IMASK: u32 = 0x00F0;
pub const SR_Q: u32 = 0x0100;
pub const SR_M: u32 = 0x0200;
/// Bits of SR that exist in hardware
pub const SR_WRITABLE: u32 = 0x03F3;

pub const VECTOR_POWER_ON_PC: u32 = 0;
pub const VECTOR_GENERAL_ILLEGAL: u32 = 4;
pub const VECTOR_SLOT_ILLEGAL: u32 = 6;
pub const VECTOR_CPU_ADDRESS_ERROR: u32 = 9;
pub const VECTOR_DMA_ADDRESS_ERROR: u32 = 10;
pub const VECTOR_NMI: u32 = 11;

/// Priority used for NMI; above every maskable level
pub const NMI_PRIORITY: u8 = 16;

/// Class of a pending exception, which decides where it may be accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExceptionKind {
    Interrupt,
    AddressError,
    General,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingException {
    pub vector: u32,
    pub priority: u8,
    pub kind: ExceptionKind,
}

/// Conditions under which the core could not follow defined behavior.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CpuFault {
    #[error("illegal instruction {opcode:04X} at {addr:08X}")]
    IllegalInstruction { addr: u32, opcode: u16 },
    #[error("exception vector {0} out of range")]
    InvalidVector(u32),
    #[error("invalid {kind} register index {index} in {opcode:04X}")]
    InvalidRegisterIndex {
        kind: &'static str,
        index: u32,
        opcode: u16,
    },
}

/// Hook invoked before the instruction at the given address executes.
/// Returning true suppresses the instruction.
pub type HookFn<M> = fn(&mut CpuSh2<M>, u32) -> bool;

/// Register file snapshot used by save states
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sh2State {
    pub gpr: [u32; 16],
    pub pc: u32,
    pub pr: u32,
    pub mach: u32,
    pub macl: u32,
    pub gbr: u32,
    pub vbr: u32,
    pub sr: u32,
}

/// SH2 CPU state and execution engine
pub struct CpuSh2<M: MemorySh2> {
    pub gpr: [u32; 16],
    /// Address of the next fetch
    pub pc: u32,
    pub pr: u32,
    pub mach: u32,
    pub macl: u32,
    pub gbr: u32,
    pub vbr: u32,
    sr: u32,

    pub pipeline_instruction: u16,
    pub pipeline_src_addr: u32,
    pub pipeline_valid: bool,
    pub in_delay_slot: bool,
    pub in_nointerrupt_slot: bool,

    /// Cycles until the in-flight fetch completes
    fetch_cycles: u32,
    /// Extra latency of the last executed instruction
    exec_cycles: u32,
    /// Data access cycles accumulated by the instruction being executed
    access_cycles: u32,

    pending: Option<PendingException>,
    sleeping: bool,
    hooks: HashMap<u32, HookFn<M>>,
    fault: Option<CpuFault>,

    /// Total cycles clocked
    pub cycles: u64,

    /// Memory interface
    pub memory: M,
}

impl<M: MemorySh2> CpuSh2<M> {
    /// Create a new SH2 with the given memory interface
    pub fn new(memory: M) -> Self {
        Self {
            gpr: [0; 16],
            pc: 0,
            pr: 0,
            mach: 0,
            macl: 0,
            gbr: 0,
            vbr: 0,
            sr: SR_IMASK,
            pipeline_instruction: 0,
            pipeline_src_addr: 0,
            pipeline_valid: false,
            in_delay_slot: false,
            in_nointerrupt_slot: false,
            fetch_cycles: 0,
            exec_cycles: 0,
            access_cycles: 0,
            pending: None,
            sleeping: false,
            hooks: HashMap::new(),
            fault: None,
            cycles: 0,
            memory,
        }
    }

    /// Clear the register file and pipeline. Hooks stay registered.
    pub fn reset(&mut self) {
        self.gpr = [0; 16];
        self.pc = 0;
        self.pr = 0;
        self.mach = 0;
        self.macl = 0;
        self.gbr = 0;
        self.vbr = 0;
        self.sr = SR_IMASK;
        self.pipeline_instruction = 0;
        self.pipeline_src_addr = 0;
        self.pipeline_valid = false;
        self.in_delay_slot = false;
        self.in_nointerrupt_slot = false;
        self.fetch_cycles = 0;
        self.exec_cycles = 0;
        self.access_cycles = 0;
        self.pending = None;
        self.sleeping = false;
        self.fault = None;
        self.cycles = 0;
    }

    /// Power-on reset: PC and SP come from the vector table at address 0,
    /// then VBR is cleared and every interrupt level is masked.
    pub fn power_on(&mut self) {
        self.reset();
        self.pc = self.memory.read_word(VECTOR_POWER_ON_PC);
        self.gpr[15] = self.memory.read_word(VECTOR_POWER_ON_PC + 4);
        self.vbr = 0;
        self.sr |= SR_IMASK;
        log(LogCategory::CPU, LogLevel::Info, || {
            format!("SH2: power-on PC={:08X} SP={:08X}", self.pc, self.gpr[15])
        });
    }

    /// Start execution at `pc` with stack `sp` without reading the vectors.
    pub fn boot_at(&mut self, pc: u32, sp: u32) {
        self.reset();
        self.pc = pc;
        self.gpr[15] = sp;
    }

    pub fn sr(&self) -> u32 {
        self.sr
    }

    /// The only path that may change the interrupt mask.
    pub fn set_sr(&mut self, value: u32) {
        self.sr = value & SR_WRITABLE;
    }

    pub fn imask(&self) -> u8 {
        ((self.sr & SR_IMASK) >> 4) as u8
    }

    pub fn t(&self) -> bool {
        self.sr & SR_T != 0
    }

    pub fn set_t(&mut self, value: bool) {
        self.set_flag(SR_T, value);
    }

    fn flag(&self, bit: u32) -> bool {
        self.sr & bit != 0
    }

    fn set_flag(&mut self, bit: u32, value: bool) {
        debug_assert!(bit & SR_IMASK == 0);
        if value {
            self.sr |= bit;
        } else {
            self.sr &= !bit;
        }
    }

    /// Point the pipeline at `addr`, discarding the instruction already fetched.
    pub fn jump_to(&mut self, addr: u32) {
        self.pc = addr;
        self.pipeline_valid = false;
    }

    pub fn is_sleeping(&self) -> bool {
        self.sleeping
    }

    pub fn pending_exception(&self) -> Option<PendingException> {
        self.pending
    }

    /// Request an interrupt. An existing request of equal or higher priority
    /// is kept; the caller is expected to retry the lower one later.
    pub fn assert_irq(&mut self, vector: u32, priority: u8) {
        self.request_exception(vector, priority, ExceptionKind::Interrupt);
    }

    /// Withdraw the pending request, e.g. to requeue it behind a higher one.
    pub fn take_pending_exception(&mut self) -> Option<PendingException> {
        self.pending.take()
    }

    pub fn request_exception(&mut self, vector: u32, priority: u8, kind: ExceptionKind) {
        if let Some(current) = self.pending {
            if current.priority >= priority {
                return;
            }
        }
        self.pending = Some(PendingException {
            vector,
            priority,
            kind,
        });
    }

    /// Whether an exception of `kind` may be dispatched this cycle.
    pub fn can_execute_exception(&self, kind: ExceptionKind) -> bool {
        if !self.pipeline_valid {
            return false;
        }
        match kind {
            ExceptionKind::Interrupt => !self.in_delay_slot && !self.in_nointerrupt_slot,
            ExceptionKind::AddressError => !self.in_delay_slot,
            ExceptionKind::General => true,
        }
    }

    /// Install a hook at `addr`. A second hook at the same address
    /// replaces the first.
    pub fn add_hook(&mut self, addr: u32, hook: HookFn<M>) {
        self.hooks.insert(addr, hook);
    }

    pub fn remove_hook(&mut self, addr: u32) {
        self.hooks.remove(&addr);
    }

    pub fn has_hook(&self, addr: u32) -> bool {
        self.hooks.contains_key(&addr)
    }

    pub fn fault(&self) -> Option<&CpuFault> {
        self.fault.as_ref()
    }

    pub fn take_fault(&mut self) -> Option<CpuFault> {
        self.fault.take()
    }

    fn record_fault(&mut self, fault: CpuFault) {
        log(LogCategory::CPU, LogLevel::Error, || format!("SH2: {}", fault));
        if self.fault.is_none() {
            self.fault = Some(fault);
        }
    }

    /// Push SR and the address of the next unexecuted instruction, then
    /// vector through VBR.
    pub fn raise_exception(&mut self, vector: u32) {
        let ret = self.pc.wrapping_sub(2);
        self.raise_exception_with_return(vector, ret);
    }

    fn raise_exception_with_return(&mut self, vector: u32, return_addr: u32) {
        if vector > 0xFF {
            self.record_fault(CpuFault::InvalidVector(vector));
            return;
        }

        let sr = self.sr;
        self.gpr[15] = self.gpr[15].wrapping_sub(4);
        self.write32(self.gpr[15], sr);
        self.gpr[15] = self.gpr[15].wrapping_sub(4);
        self.write32(self.gpr[15], return_addr);

        let new_pc = self.read32(self.vbr.wrapping_add(vector * 4));
        log(LogCategory::CPU, LogLevel::Debug, || {
            format!(
                "SH2: exception {} from {:08X} -> {:08X}",
                vector, return_addr, new_pc
            )
        });
        self.jump_to(new_pc);
    }

    fn try_dispatch_exception(&mut self) {
        let Some(pending) = self.pending else {
            return;
        };
        if pending.kind == ExceptionKind::Interrupt && pending.priority <= self.imask() {
            return;
        }
        if !self.can_execute_exception(pending.kind) {
            return;
        }

        self.pending = None;
        self.sleeping = false;
        self.access_cycles = 0;
        self.raise_exception(pending.vector);
        self.exec_cycles = self.access_cycles;

        if pending.kind == ExceptionKind::Interrupt {
            // Only after the push, so the saved SR carries the old mask.
            let mask = u32::from(pending.priority.min(15));
            self.set_sr((self.sr & !SR_IMASK) | (mask << 4));
        }
    }

    /// Advance the core by one cycle. Returns true when an instruction
    /// (or a hook standing in for one) ran this cycle.
    pub fn clock(&mut self) -> bool {
        self.cycles += 1;
        self.fetch_cycles = self.fetch_cycles.saturating_sub(1);
        self.exec_cycles = self.exec_cycles.saturating_sub(1);
        if self.fetch_cycles > 0 || self.exec_cycles > 0 {
            return false;
        }

        self.try_dispatch_exception();
        if self.sleeping {
            return false;
        }

        let was_delay = self.in_delay_slot;
        let was_nointerrupt = self.in_nointerrupt_slot;

        let instr = self.pipeline_instruction;
        let src_addr = self.pipeline_src_addr;
        let valid = self.pipeline_valid;

        let fetch_addr = self.pc;
        self.pipeline_instruction = self.memory.read_halfword(fetch_addr);
        self.pipeline_src_addr = fetch_addr;
        self.pipeline_valid = true;
        self.fetch_cycles = self.memory.read_cycles(fetch_addr).max(1);
        self.pc = fetch_addr.wrapping_add(2);

        let mut ran = false;
        if valid {
            let suppressed = match self.hooks.get(&src_addr).copied() {
                Some(hook) => hook(self, src_addr),
                None => false,
            };
            if !suppressed && self.pipeline_valid {
                self.access_cycles = 0;
                self.execute(instr, src_addr);
                self.exec_cycles = self.exec_cycles.max(self.access_cycles);
            }
            ran = true;
        }

        if was_delay {
            self.in_delay_slot = false;
        }
        if was_nointerrupt {
            self.in_nointerrupt_slot = false;
        }
        ran
    }

    pub fn snapshot(&self) -> Sh2State {
        Sh2State {
            gpr: self.gpr,
            pc: self.pc,
            pr: self.pr,
            mach: self.mach,
            macl: self.macl,
            gbr: self.gbr,
            vbr: self.vbr,
            sr: self.sr,
        }
    }

    /// Restore registers; the pipeline refetches from the restored PC.
    pub fn restore(&mut self, state: &Sh2State) {
        self.gpr = state.gpr;
        self.pr = state.pr;
        self.mach = state.mach;
        self.macl = state.macl;
        self.gbr = state.gbr;
        self.vbr = state.vbr;
        self.set_sr(state.sr);
        self.jump_to(state.pc);
        self.in_delay_slot = false;
        self.in_nointerrupt_slot = false;
        self.sleeping = false;
    }
}

impl<M: MemorySh2> crate::Cpu for CpuSh2<M> {
    fn reset(&mut self) {
        self.power_on();
    }

    /// Clock until one instruction has run; returns the cycles taken.
    fn step(&mut self) -> u32 {
        let mut cycles = 0;
        while cycles < 64 {
            cycles += 1;
            if self.clock() {
                break;
            }
        }
        cycles
    }
}
