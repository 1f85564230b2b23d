//! Instruction semantics for the SH2 interpreter.

use super::decode::{decode, Op};
use super::{
    CpuFault, CpuSh2, MemorySh2, SR_M, SR_Q, SR_S, VECTOR_GENERAL_ILLEGAL, VECTOR_SLOT_ILLEGAL,
};
use crate::logging::{log, LogCategory, LogLevel};

/// Extra cycles for the multiplier, on top of bus time.
const MUL_LATENCY: u32 = 2;

// MAC.W without saturation keeps a 42-bit accumulator: MACH holds 10 bits.
const MACH_WIDTH_MASK: u32 = 0x3FF;
const MACH_SIGN_BIT: u32 = 0x200;

const MAC48_MAX: i64 = 0x0000_7FFF_FFFF_FFFF;
const MAC48_MIN: i64 = -0x0000_8000_0000_0000;

#[inline]
fn rn(instr: u16) -> usize {
    usize::from((instr >> 8) & 0xF)
}

#[inline]
fn rm(instr: u16) -> usize {
    usize::from((instr >> 4) & 0xF)
}

#[inline]
fn imm8(instr: u16) -> u32 {
    u32::from(instr & 0xFF)
}

#[inline]
fn simm8(instr: u16) -> u32 {
    (instr as u8) as i8 as i32 as u32
}

#[inline]
fn disp4(instr: u16) -> u32 {
    u32::from(instr & 0xF)
}

#[inline]
fn sext8(value: u8) -> u32 {
    value as i8 as i32 as u32
}

#[inline]
fn sext16(value: u16) -> u32 {
    value as i16 as i32 as u32
}

impl<M: MemorySh2> CpuSh2<M> {
    pub(super) fn read8(&mut self, addr: u32) -> u8 {
        self.access_cycles += self.memory.read_cycles(addr);
        self.memory.read_byte(addr)
    }

    pub(super) fn read16(&mut self, addr: u32) -> u16 {
        self.access_cycles += self.memory.read_cycles(addr);
        self.memory.read_halfword(addr)
    }

    pub(super) fn read32(&mut self, addr: u32) -> u32 {
        self.access_cycles += self.memory.read_cycles(addr);
        self.memory.read_word(addr)
    }

    pub(super) fn write8(&mut self, addr: u32, value: u8) {
        self.access_cycles += self.memory.write_cycles(addr);
        self.memory.write_byte(addr, value);
    }

    pub(super) fn write16(&mut self, addr: u32, value: u16) {
        self.access_cycles += self.memory.write_cycles(addr);
        self.memory.write_halfword(addr, value);
    }

    pub(super) fn write32(&mut self, addr: u32, value: u32) {
        self.access_cycles += self.memory.write_cycles(addr);
        self.memory.write_word(addr, value);
    }

    /// Branches inside a delay slot are slot-illegal.
    fn handle_jump(&mut self, dst: u32, delay_slot: bool) {
        if self.in_delay_slot {
            self.slot_illegal();
            return;
        }
        self.pc = dst;
        if delay_slot {
            self.in_delay_slot = true;
        } else {
            self.pipeline_valid = false;
        }
    }

    fn slot_illegal(&mut self) {
        log(LogCategory::CPU, LogLevel::Warn, || {
            format!("SH2: branch in delay slot, target {:08X}", self.pc)
        });
        let ret = self.pc.wrapping_sub(2);
        self.in_delay_slot = false;
        self.raise_exception_with_return(VECTOR_SLOT_ILLEGAL, ret);
    }

    fn illegal_instruction(&mut self, instr: u16, src_addr: u32) {
        self.record_fault(CpuFault::IllegalInstruction {
            addr: src_addr,
            opcode: instr,
        });
        if self.in_delay_slot {
            self.slot_illegal();
        } else {
            self.raise_exception_with_return(VECTOR_GENERAL_ILLEGAL, src_addr);
        }
    }

    fn get_control_reg(&mut self, index: usize, instr: u16) -> u32 {
        self.in_nointerrupt_slot = true;
        match index {
            0 => self.sr,
            1 => self.gbr,
            2 => self.vbr,
            _ => {
                self.bad_register_index("control", index, instr);
                0
            }
        }
    }

    fn set_control_reg(&mut self, index: usize, value: u32, instr: u16) {
        self.in_nointerrupt_slot = true;
        match index {
            0 => self.set_sr(value),
            1 => self.gbr = value,
            2 => self.vbr = value,
            _ => self.bad_register_index("control", index, instr),
        }
    }

    fn get_system_reg(&mut self, index: usize, instr: u16) -> u32 {
        self.in_nointerrupt_slot = true;
        match index {
            0 => self.mach,
            1 => self.macl,
            2 => self.pr,
            _ => {
                self.bad_register_index("system", index, instr);
                0
            }
        }
    }

    fn set_system_reg(&mut self, index: usize, value: u32, instr: u16) {
        self.in_nointerrupt_slot = true;
        match index {
            0 => self.mach = value,
            1 => self.macl = value,
            2 => self.pr = value,
            _ => self.bad_register_index("system", index, instr),
        }
    }

    fn bad_register_index(&mut self, kind: &'static str, index: usize, instr: u16) {
        self.record_fault(CpuFault::InvalidRegisterIndex {
            kind,
            index: index as u32,
            opcode: instr,
        });
        if self.in_delay_slot {
            self.slot_illegal();
        } else {
            // pc is two instructions past the one executing
            let ret = self.pc.wrapping_sub(4);
            self.raise_exception_with_return(VECTOR_GENERAL_ILLEGAL, ret);
        }
    }

    fn mac(&self) -> i64 {
        ((u64::from(self.mach) << 32) | u64::from(self.macl)) as i64
    }

    fn set_mac(&mut self, value: i64) {
        self.mach = (value >> 32) as u32;
        self.macl = value as u32;
    }

    /// One step of non-restoring division (DIV1).
    fn div1(&mut self, n: usize, m: usize) {
        let old_q = self.flag(SR_Q);
        let m_flag = self.flag(SR_M);
        let divisor = self.gpr[m];

        let mut q = self.gpr[n] & 0x8000_0000 != 0;
        let old = (self.gpr[n] << 1) | u32::from(self.t());

        let (result, carry) = if old_q == m_flag {
            let r = old.wrapping_sub(divisor);
            (r, r > old)
        } else {
            let r = old.wrapping_add(divisor);
            (r, r < old)
        };
        self.gpr[n] = result;

        q = if q { !carry } else { carry };
        if m_flag {
            q = !q;
        }
        self.set_flag(SR_Q, q);
        self.set_t(q == m_flag);
    }

    /// MAC.W: 16x16 multiply-accumulate from memory.
    fn mac_w(&mut self, n: usize, m: usize) {
        let value_n = self.read16(self.gpr[n]) as i16 as i64;
        self.gpr[n] = self.gpr[n].wrapping_add(2);
        let value_m = self.read16(self.gpr[m]) as i16 as i64;
        self.gpr[m] = self.gpr[m].wrapping_add(2);

        let product = value_n * value_m;
        if self.flag(SR_S) {
            let sum = i64::from(self.macl as i32) + product;
            let clamped = sum.clamp(i64::from(i32::MIN), i64::from(i32::MAX));
            self.macl = clamped as i32 as u32;
            if clamped != sum {
                self.mach |= 1;
            }
        } else {
            let acc = self.mac().wrapping_add(product);
            self.macl = acc as u32;
            self.mach = ((acc >> 32) as u32) & MACH_WIDTH_MASK;
            if self.mach & MACH_SIGN_BIT != 0 {
                self.mach |= !MACH_WIDTH_MASK;
            }
        }
        self.access_cycles += MUL_LATENCY;
    }

    /// MAC.L: 32x32 multiply-accumulate from memory, 48-bit saturating when S is set.
    fn mac_l(&mut self, n: usize, m: usize) {
        let value_n = self.read32(self.gpr[n]) as i32 as i64;
        self.gpr[n] = self.gpr[n].wrapping_add(4);
        let value_m = self.read32(self.gpr[m]) as i32 as i64;
        self.gpr[m] = self.gpr[m].wrapping_add(4);

        let product = value_n.wrapping_mul(value_m);
        let mut acc = self.mac().wrapping_add(product);
        if self.flag(SR_S) {
            acc = acc.clamp(MAC48_MIN, MAC48_MAX);
        }
        self.set_mac(acc);
        self.access_cycles += MUL_LATENCY;
    }

    /// Decode and execute one instruction fetched from `src_addr`.
    /// During execution `pc` holds the address of the next fetch.
    pub(super) fn execute(&mut self, instr: u16, src_addr: u32) {
        let Some(op) = decode(instr) else {
            self.illegal_instruction(instr, src_addr);
            return;
        };

        let n = rn(instr);
        let m = rm(instr);

        match op {
            Op::MovImm => self.gpr[n] = simm8(instr),
            Op::MovwPcrel => {
                let addr = self.pc.wrapping_add(imm8(instr) << 1);
                self.gpr[n] = sext16(self.read16(addr));
            }
            Op::MovlPcrel => {
                let addr = (self.pc & !3).wrapping_add(imm8(instr) << 2);
                self.gpr[n] = self.read32(addr);
            }
            Op::MovReg => self.gpr[n] = self.gpr[m],

            Op::MovbStore => {
                let (addr, value) = (self.gpr[n], self.gpr[m]);
                self.write8(addr, value as u8);
            }
            Op::MovwStore => {
                let (addr, value) = (self.gpr[n], self.gpr[m]);
                self.write16(addr, value as u16);
            }
            Op::MovlStore => {
                let (addr, value) = (self.gpr[n], self.gpr[m]);
                self.write32(addr, value);
            }
            Op::MovbLoad => self.gpr[n] = sext8(self.read8(self.gpr[m])),
            Op::MovwLoad => self.gpr[n] = sext16(self.read16(self.gpr[m])),
            Op::MovlLoad => self.gpr[n] = self.read32(self.gpr[m]),

            // The source is captured before the index register moves, which
            // matters when Rm == Rn.
            Op::MovbStoreDec => {
                let value = self.gpr[m] as u8;
                self.gpr[n] = self.gpr[n].wrapping_sub(1);
                self.write8(self.gpr[n], value);
            }
            Op::MovwStoreDec => {
                let value = self.gpr[m] as u16;
                self.gpr[n] = self.gpr[n].wrapping_sub(2);
                self.write16(self.gpr[n], value);
            }
            Op::MovlStoreDec => {
                let value = self.gpr[m];
                self.gpr[n] = self.gpr[n].wrapping_sub(4);
                self.write32(self.gpr[n], value);
            }

            // A load into the index register itself suppresses the increment.
            Op::MovbLoadInc => {
                self.gpr[n] = sext8(self.read8(self.gpr[m]));
                if m != n {
                    self.gpr[m] = self.gpr[m].wrapping_add(1);
                }
            }
            Op::MovwLoadInc => {
                self.gpr[n] = sext16(self.read16(self.gpr[m]));
                if m != n {
                    self.gpr[m] = self.gpr[m].wrapping_add(2);
                }
            }
            Op::MovlLoadInc => {
                self.gpr[n] = self.read32(self.gpr[m]);
                if m != n {
                    self.gpr[m] = self.gpr[m].wrapping_add(4);
                }
            }

            Op::MovbStoreDisp => {
                let addr = self.gpr[m].wrapping_add(disp4(instr));
                self.write8(addr, self.gpr[0] as u8);
            }
            Op::MovwStoreDisp => {
                let addr = self.gpr[m].wrapping_add(disp4(instr) << 1);
                self.write16(addr, self.gpr[0] as u16);
            }
            Op::MovlStoreDisp => {
                let addr = self.gpr[n].wrapping_add(disp4(instr) << 2);
                self.write32(addr, self.gpr[m]);
            }
            Op::MovbLoadDisp => {
                let addr = self.gpr[m].wrapping_add(disp4(instr));
                self.gpr[0] = sext8(self.read8(addr));
            }
            Op::MovwLoadDisp => {
                let addr = self.gpr[m].wrapping_add(disp4(instr) << 1);
                self.gpr[0] = sext16(self.read16(addr));
            }
            Op::MovlLoadDisp => {
                let addr = self.gpr[m].wrapping_add(disp4(instr) << 2);
                self.gpr[n] = self.read32(addr);
            }

            Op::MovbStoreR0 => {
                let addr = self.gpr[n].wrapping_add(self.gpr[0]);
                self.write8(addr, self.gpr[m] as u8);
            }
            Op::MovwStoreR0 => {
                let addr = self.gpr[n].wrapping_add(self.gpr[0]);
                self.write16(addr, self.gpr[m] as u16);
            }
            Op::MovlStoreR0 => {
                let addr = self.gpr[n].wrapping_add(self.gpr[0]);
                self.write32(addr, self.gpr[m]);
            }
            Op::MovbLoadR0 => {
                let addr = self.gpr[m].wrapping_add(self.gpr[0]);
                self.gpr[n] = sext8(self.read8(addr));
            }
            Op::MovwLoadR0 => {
                let addr = self.gpr[m].wrapping_add(self.gpr[0]);
                self.gpr[n] = sext16(self.read16(addr));
            }
            Op::MovlLoadR0 => {
                let addr = self.gpr[m].wrapping_add(self.gpr[0]);
                self.gpr[n] = self.read32(addr);
            }

            Op::MovbStoreGbr => {
                let addr = self.gbr.wrapping_add(imm8(instr));
                self.write8(addr, self.gpr[0] as u8);
            }
            Op::MovwStoreGbr => {
                let addr = self.gbr.wrapping_add(imm8(instr) << 1);
                self.write16(addr, self.gpr[0] as u16);
            }
            Op::MovlStoreGbr => {
                let addr = self.gbr.wrapping_add(imm8(instr) << 2);
                self.write32(addr, self.gpr[0]);
            }
            Op::MovbLoadGbr => {
                let addr = self.gbr.wrapping_add(imm8(instr));
                self.gpr[0] = sext8(self.read8(addr));
            }
            Op::MovwLoadGbr => {
                let addr = self.gbr.wrapping_add(imm8(instr) << 1);
                self.gpr[0] = sext16(self.read16(addr));
            }
            Op::MovlLoadGbr => {
                let addr = self.gbr.wrapping_add(imm8(instr) << 2);
                self.gpr[0] = self.read32(addr);
            }
            Op::Mova => self.gpr[0] = (self.pc & !3).wrapping_add(imm8(instr) << 2),

            Op::Movt => self.gpr[n] = u32::from(self.t()),
            Op::SwapB => {
                let v = self.gpr[m];
                self.gpr[n] = (v & 0xFFFF_0000) | ((v & 0xFF) << 8) | ((v >> 8) & 0xFF);
            }
            Op::SwapW => self.gpr[n] = self.gpr[m].rotate_left(16),
            Op::Xtrct => self.gpr[n] = (self.gpr[m] << 16) | (self.gpr[n] >> 16),

            Op::Add => self.gpr[n] = self.gpr[n].wrapping_add(self.gpr[m]),
            Op::AddImm => self.gpr[n] = self.gpr[n].wrapping_add(simm8(instr)),
            Op::Addc => {
                let sum = self.gpr[n].wrapping_add(self.gpr[m]);
                let old = self.gpr[n];
                self.gpr[n] = sum.wrapping_add(u32::from(self.t()));
                self.set_t(old > sum || sum > self.gpr[n]);
            }
            Op::Addv => {
                let (a, b) = (self.gpr[n], self.gpr[m]);
                let result = a.wrapping_add(b);
                // Same-signed operands whose sum changed sign.
                let overflow = (!(a ^ b) & (a ^ result)) & 0x8000_0000 != 0;
                self.gpr[n] = result;
                self.set_t(overflow);
            }
            Op::CmpEqImm => self.set_t(self.gpr[0] == simm8(instr)),
            Op::CmpEq => self.set_t(self.gpr[n] == self.gpr[m]),
            Op::CmpHs => self.set_t(self.gpr[n] >= self.gpr[m]),
            Op::CmpGe => self.set_t(self.gpr[n] as i32 >= self.gpr[m] as i32),
            Op::CmpHi => self.set_t(self.gpr[n] > self.gpr[m]),
            Op::CmpGt => self.set_t(self.gpr[n] as i32 > self.gpr[m] as i32),
            Op::CmpPl => self.set_t(self.gpr[n] as i32 > 0),
            Op::CmpPz => self.set_t(self.gpr[n] as i32 >= 0),
            Op::CmpStr => {
                let x = self.gpr[n] ^ self.gpr[m];
                let any_equal = (0..4).any(|i| (x >> (i * 8)) & 0xFF == 0);
                self.set_t(any_equal);
            }

            Op::Div1 => self.div1(n, m),
            Op::Div0s => {
                let q = self.gpr[n] & 0x8000_0000 != 0;
                let mm = self.gpr[m] & 0x8000_0000 != 0;
                self.set_flag(SR_Q, q);
                self.set_flag(SR_M, mm);
                self.set_t(q != mm);
            }
            Op::Div0u => {
                self.set_flag(SR_Q, false);
                self.set_flag(SR_M, false);
                self.set_t(false);
            }

            Op::ExtsB => self.gpr[n] = sext8(self.gpr[m] as u8),
            Op::ExtsW => self.gpr[n] = sext16(self.gpr[m] as u16),
            Op::ExtuB => self.gpr[n] = self.gpr[m] & 0xFF,
            Op::ExtuW => self.gpr[n] = self.gpr[m] & 0xFFFF,
            Op::MacW => self.mac_w(n, m),
            Op::MulsW => {
                let a = self.gpr[n] as u16 as i16 as i32;
                let b = self.gpr[m] as u16 as i16 as i32;
                self.macl = a.wrapping_mul(b) as u32;
                self.access_cycles += MUL_LATENCY;
            }
            Op::MuluW => {
                self.macl = (self.gpr[n] & 0xFFFF) * (self.gpr[m] & 0xFFFF);
                self.access_cycles += MUL_LATENCY;
            }

            Op::Negc => {
                let tmp = 0u32.wrapping_sub(self.gpr[m]);
                self.gpr[n] = tmp.wrapping_sub(u32::from(self.t()));
                self.set_t(0 < tmp || tmp < self.gpr[n]);
            }
            Op::Neg => self.gpr[n] = 0u32.wrapping_sub(self.gpr[m]),
            Op::Sub => self.gpr[n] = self.gpr[n].wrapping_sub(self.gpr[m]),
            Op::Subc => {
                let diff = self.gpr[n].wrapping_sub(self.gpr[m]);
                let old = self.gpr[n];
                self.gpr[n] = diff.wrapping_sub(u32::from(self.t()));
                self.set_t(old < diff || diff < self.gpr[n]);
            }

            Op::And => self.gpr[n] &= self.gpr[m],
            Op::AndImm => self.gpr[0] &= imm8(instr),
            Op::AndB => {
                let addr = self.gbr.wrapping_add(self.gpr[0]);
                let value = self.read8(addr) & instr as u8;
                self.write8(addr, value);
            }
            Op::Not => self.gpr[n] = !self.gpr[m],
            Op::Or => self.gpr[n] |= self.gpr[m],
            Op::OrImm => self.gpr[0] |= imm8(instr),
            Op::OrB => {
                let addr = self.gbr.wrapping_add(self.gpr[0]);
                let value = self.read8(addr) | instr as u8;
                self.write8(addr, value);
            }
            Op::Tst => self.set_t(self.gpr[n] & self.gpr[m] == 0),
            Op::TstImm => self.set_t(self.gpr[0] & imm8(instr) == 0),
            Op::Xor => self.gpr[n] ^= self.gpr[m],
            Op::XorImm => self.gpr[0] ^= imm8(instr),
            Op::XorB => {
                let addr = self.gbr.wrapping_add(self.gpr[0]);
                let value = self.read8(addr) ^ instr as u8;
                self.write8(addr, value);
            }

            Op::Rotl => {
                self.set_t(self.gpr[n] & 0x8000_0000 != 0);
                self.gpr[n] = self.gpr[n].rotate_left(1);
            }
            Op::Rotr => {
                self.set_t(self.gpr[n] & 1 != 0);
                self.gpr[n] = self.gpr[n].rotate_right(1);
            }
            Op::Rotcl => {
                let carry_out = self.gpr[n] & 0x8000_0000 != 0;
                self.gpr[n] = (self.gpr[n] << 1) | u32::from(self.t());
                self.set_t(carry_out);
            }
            Op::Rotcr => {
                let carry_out = self.gpr[n] & 1 != 0;
                self.gpr[n] = (self.gpr[n] >> 1) | (u32::from(self.t()) << 31);
                self.set_t(carry_out);
            }
            Op::Shal | Op::Shll => {
                self.set_t(self.gpr[n] & 0x8000_0000 != 0);
                self.gpr[n] <<= 1;
            }
            Op::Shar => {
                self.set_t(self.gpr[n] & 1 != 0);
                self.gpr[n] = ((self.gpr[n] as i32) >> 1) as u32;
            }
            Op::Shlr => {
                self.set_t(self.gpr[n] & 1 != 0);
                self.gpr[n] >>= 1;
            }
            Op::Shll2 => self.gpr[n] <<= 2,
            Op::Shlr2 => self.gpr[n] >>= 2,
            Op::Shll8 => self.gpr[n] <<= 8,
            Op::Shlr8 => self.gpr[n] >>= 8,
            Op::Shll16 => self.gpr[n] <<= 16,
            Op::Shlr16 => self.gpr[n] >>= 16,

            Op::Bf | Op::Bt | Op::BfS | Op::BtS => {
                let dst = self.pc.wrapping_add(simm8(instr) << 1);
                let taken = match op {
                    Op::Bt | Op::BtS => self.t(),
                    _ => !self.t(),
                };
                if taken {
                    self.handle_jump(dst, matches!(op, Op::BfS | Op::BtS));
                }
            }
            Op::Bra | Op::Bsr => {
                let disp = (((instr & 0xFFF) << 4) as i16 >> 4) as i32 as u32;
                let dst = self.pc.wrapping_add(disp << 1);
                if op == Op::Bsr {
                    self.pr = self.pc;
                }
                self.handle_jump(dst, true);
            }
            Op::Braf => {
                let dst = self.pc.wrapping_add(self.gpr[n]);
                self.handle_jump(dst, true);
            }
            Op::Bsrf => {
                let dst = self.pc.wrapping_add(self.gpr[n]);
                self.pr = self.pc;
                self.handle_jump(dst, true);
            }
            Op::Jmp => self.handle_jump(self.gpr[n], true),
            Op::Jsr => {
                let dst = self.gpr[n];
                self.pr = self.pc;
                self.handle_jump(dst, true);
            }
            Op::Rts => self.handle_jump(self.pr, true),

            Op::Clrmac => {
                self.mach = 0;
                self.macl = 0;
            }
            Op::Clrt => self.set_t(false),
            Op::Ldc => {
                let value = self.gpr[n];
                self.set_control_reg(m, value, instr);
            }
            Op::LdcL => {
                let value = self.read32(self.gpr[n]);
                self.set_control_reg(m, value, instr);
                self.gpr[n] = self.gpr[n].wrapping_add(4);
            }
            Op::Lds => {
                let value = self.gpr[n];
                self.set_system_reg(m, value, instr);
            }
            Op::LdsL => {
                let value = self.read32(self.gpr[n]);
                self.set_system_reg(m, value, instr);
                self.gpr[n] = self.gpr[n].wrapping_add(4);
            }
            Op::Nop => {}
            Op::Rte => {
                let new_pc = self.read32(self.gpr[15]);
                self.gpr[15] = self.gpr[15].wrapping_add(4);
                let new_sr = self.read32(self.gpr[15]);
                self.gpr[15] = self.gpr[15].wrapping_add(4);
                self.handle_jump(new_pc, true);
                self.set_sr(new_sr);
            }
            Op::Sett => self.set_t(true),
            Op::Stc => self.gpr[n] = self.get_control_reg(m, instr),
            Op::StcL => {
                self.gpr[n] = self.gpr[n].wrapping_sub(4);
                let value = self.get_control_reg(m, instr);
                self.write32(self.gpr[n], value);
            }
            Op::Sts => self.gpr[n] = self.get_system_reg(m, instr),
            Op::StsL => {
                self.gpr[n] = self.gpr[n].wrapping_sub(4);
                let value = self.get_system_reg(m, instr);
                self.write32(self.gpr[n], value);
            }

            Op::Subv => {
                let (a, b) = (self.gpr[n], self.gpr[m]);
                let result = a.wrapping_sub(b);
                let overflow = ((a ^ b) & (a ^ result)) & 0x8000_0000 != 0;
                self.gpr[n] = result;
                self.set_t(overflow);
            }
            Op::Dt => {
                self.gpr[n] = self.gpr[n].wrapping_sub(1);
                self.set_t(self.gpr[n] == 0);
            }
            Op::MulL => {
                self.macl = self.gpr[n].wrapping_mul(self.gpr[m]);
                self.access_cycles += MUL_LATENCY;
            }
            Op::DmulsL => {
                let product = i64::from(self.gpr[n] as i32) * i64::from(self.gpr[m] as i32);
                self.set_mac(product);
                self.access_cycles += MUL_LATENCY;
            }
            Op::DmuluL => {
                let product = u64::from(self.gpr[n]) * u64::from(self.gpr[m]);
                self.set_mac(product as i64);
                self.access_cycles += MUL_LATENCY;
            }
            Op::MacL => self.mac_l(n, m),
            Op::Trapa => {
                log(LogCategory::CPU, LogLevel::Trace, || {
                    format!("SH2: TRAPA #{:02X} at {:08X}", imm8(instr), src_addr)
                });
                self.raise_exception(imm8(instr));
            }
            Op::Sleep => self.sleeping = true,
            Op::TasB => {
                let addr = self.gpr[n];
                let value = self.read8(addr);
                self.set_t(value == 0);
                self.write8(addr, value | 0x80);
            }
            Op::TstB => {
                let addr = self.gbr.wrapping_add(self.gpr[0]);
                let value = self.read8(addr);
                self.set_t(value & instr as u8 == 0);
            }
        }
    }
}
