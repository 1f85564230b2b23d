//! SH2 opcode decoding.
//!
//! Decoding walks [`DECODE_TABLE`] front to back and takes the first entry
//! whose mask/pattern matches. The order of the table is significant and
//! must not be sorted: the SH-1 chain comes first in its historical order,
//! followed by the SH-2 additions.

use std::sync::OnceLock;

/// A decoded operation. Operand fields are extracted from the raw opcode
/// at execution time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    // Data transfer
    MovImm,
    MovwPcrel,
    MovlPcrel,
    MovReg,
    MovbStore,
    MovwStore,
    MovlStore,
    MovbLoad,
    MovwLoad,
    MovlLoad,
    MovbStoreDec,
    MovwStoreDec,
    MovlStoreDec,
    MovbLoadInc,
    MovwLoadInc,
    MovlLoadInc,
    MovbStoreDisp,
    MovwStoreDisp,
    MovlStoreDisp,
    MovbLoadDisp,
    MovwLoadDisp,
    MovlLoadDisp,
    MovbStoreR0,
    MovwStoreR0,
    MovlStoreR0,
    MovbLoadR0,
    MovwLoadR0,
    MovlLoadR0,
    MovbStoreGbr,
    MovwStoreGbr,
    MovlStoreGbr,
    MovbLoadGbr,
    MovwLoadGbr,
    MovlLoadGbr,
    Mova,
    Movt,
    SwapB,
    SwapW,
    Xtrct,
    // Arithmetic
    Add,
    AddImm,
    Addc,
    Addv,
    CmpEqImm,
    CmpEq,
    CmpHs,
    CmpGe,
    CmpHi,
    CmpGt,
    CmpPl,
    CmpPz,
    CmpStr,
    Div1,
    Div0s,
    Div0u,
    ExtsB,
    ExtsW,
    ExtuB,
    ExtuW,
    MacW,
    MulsW,
    MuluW,
    Negc,
    Neg,
    Sub,
    Subc,
    // Logic
    And,
    AndImm,
    AndB,
    Not,
    Or,
    OrImm,
    OrB,
    Tst,
    TstImm,
    Xor,
    XorImm,
    XorB,
    // Shift and rotate
    Rotl,
    Rotr,
    Rotcl,
    Rotcr,
    Shal,
    Shar,
    Shll,
    Shlr,
    Shll2,
    Shlr2,
    Shll8,
    Shlr8,
    Shll16,
    Shlr16,
    // Branch
    Bf,
    Bt,
    Bra,
    Bsr,
    Jmp,
    Jsr,
    Rts,
    // System control
    Clrmac,
    Clrt,
    Ldc,
    LdcL,
    Lds,
    LdsL,
    Nop,
    Rte,
    Sett,
    Stc,
    StcL,
    Sts,
    StsL,
    // SH-2 additions
    Subv,
    Dt,
    MulL,
    DmulsL,
    DmuluL,
    MacL,
    BfS,
    BtS,
    Braf,
    Bsrf,
    Trapa,
    Sleep,
    TasB,
    TstB,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeEntry {
    pub mask: u16,
    pub pattern: u16,
    pub op: Op,
}

impl DecodeEntry {
    pub fn matches(&self, instr: u16) -> bool {
        instr & self.mask == self.pattern
    }
}

const fn e(mask: u16, pattern: u16, op: Op) -> DecodeEntry {
    DecodeEntry { mask, pattern, op }
}

pub const DECODE_TABLE: &[DecodeEntry] = &[
    e(0xF000, 0xE000, Op::MovImm),
    e(0xF000, 0x9000, Op::MovwPcrel),
    e(0xF000, 0xD000, Op::MovlPcrel),
    e(0xF00F, 0x6003, Op::MovReg),
    e(0xF00F, 0x2000, Op::MovbStore),
    e(0xF00F, 0x2001, Op::MovwStore),
    e(0xF00F, 0x2002, Op::MovlStore),
    e(0xF00F, 0x6000, Op::MovbLoad),
    e(0xF00F, 0x6001, Op::MovwLoad),
    e(0xF00F, 0x6002, Op::MovlLoad),
    e(0xF00F, 0x2004, Op::MovbStoreDec),
    e(0xF00F, 0x2005, Op::MovwStoreDec),
    e(0xF00F, 0x2006, Op::MovlStoreDec),
    e(0xF00F, 0x6004, Op::MovbLoadInc),
    e(0xF00F, 0x6005, Op::MovwLoadInc),
    e(0xF00F, 0x6006, Op::MovlLoadInc),
    e(0xFF00, 0x8000, Op::MovbStoreDisp),
    e(0xFF00, 0x8100, Op::MovwStoreDisp),
    e(0xF000, 0x1000, Op::MovlStoreDisp),
    e(0xFF00, 0x8400, Op::MovbLoadDisp),
    e(0xFF00, 0x8500, Op::MovwLoadDisp),
    e(0xF000, 0x5000, Op::MovlLoadDisp),
    e(0xF00F, 0x0004, Op::MovbStoreR0),
    e(0xF00F, 0x0005, Op::MovwStoreR0),
    e(0xF00F, 0x0006, Op::MovlStoreR0),
    e(0xF00F, 0x000C, Op::MovbLoadR0),
    e(0xF00F, 0x000D, Op::MovwLoadR0),
    e(0xF00F, 0x000E, Op::MovlLoadR0),
    e(0xFF00, 0xC000, Op::MovbStoreGbr),
    e(0xFF00, 0xC100, Op::MovwStoreGbr),
    e(0xFF00, 0xC200, Op::MovlStoreGbr),
    e(0xFF00, 0xC400, Op::MovbLoadGbr),
    e(0xFF00, 0xC500, Op::MovwLoadGbr),
    e(0xFF00, 0xC600, Op::MovlLoadGbr),
    e(0xFF00, 0xC700, Op::Mova),
    e(0xF0FF, 0x0029, Op::Movt),
    e(0xF00F, 0x6008, Op::SwapB),
    e(0xF00F, 0x6009, Op::SwapW),
    e(0xF00F, 0x200D, Op::Xtrct),
    e(0xF00F, 0x300C, Op::Add),
    e(0xF000, 0x7000, Op::AddImm),
    e(0xF00F, 0x300E, Op::Addc),
    e(0xF00F, 0x300F, Op::Addv),
    e(0xFF00, 0x8800, Op::CmpEqImm),
    e(0xF00F, 0x3000, Op::CmpEq),
    e(0xF00F, 0x3002, Op::CmpHs),
    e(0xF00F, 0x3003, Op::CmpGe),
    e(0xF00F, 0x3006, Op::CmpHi),
    e(0xF00F, 0x3007, Op::CmpGt),
    e(0xF0FF, 0x4015, Op::CmpPl),
    e(0xF0FF, 0x4011, Op::CmpPz),
    e(0xF00F, 0x200C, Op::CmpStr),
    e(0xF00F, 0x3004, Op::Div1),
    e(0xF00F, 0x2007, Op::Div0s),
    e(0xFFFF, 0x0019, Op::Div0u),
    e(0xF00F, 0x600E, Op::ExtsB),
    e(0xF00F, 0x600F, Op::ExtsW),
    e(0xF00F, 0x600C, Op::ExtuB),
    e(0xF00F, 0x600D, Op::ExtuW),
    e(0xF00F, 0x400F, Op::MacW),
    e(0xF00F, 0x200F, Op::MulsW),
    e(0xF00F, 0x200E, Op::MuluW),
    e(0xF00F, 0x600A, Op::Negc),
    e(0xF00F, 0x600B, Op::Neg),
    e(0xF00F, 0x3008, Op::Sub),
    e(0xF00F, 0x300A, Op::Subc),
    e(0xF00F, 0x2009, Op::And),
    e(0xFF00, 0xC900, Op::AndImm),
    e(0xFF00, 0xCD00, Op::AndB),
    e(0xF00F, 0x6007, Op::Not),
    e(0xF00F, 0x200B, Op::Or),
    e(0xFF00, 0xCB00, Op::OrImm),
    e(0xFF00, 0xCF00, Op::OrB),
    e(0xF00F, 0x2008, Op::Tst),
    e(0xFF00, 0xC800, Op::TstImm),
    e(0xF00F, 0x200A, Op::Xor),
    e(0xFF00, 0xCA00, Op::XorImm),
    e(0xFF00, 0xCE00, Op::XorB),
    e(0xF0FF, 0x4004, Op::Rotl),
    e(0xF0FF, 0x4005, Op::Rotr),
    e(0xF0FF, 0x4024, Op::Rotcl),
    e(0xF0FF, 0x4025, Op::Rotcr),
    e(0xF0FF, 0x4020, Op::Shal),
    e(0xF0FF, 0x4021, Op::Shar),
    e(0xF0FF, 0x4000, Op::Shll),
    e(0xF0FF, 0x4001, Op::Shlr),
    e(0xF0FF, 0x4008, Op::Shll2),
    e(0xF0FF, 0x4009, Op::Shlr2),
    e(0xF0FF, 0x4018, Op::Shll8),
    e(0xF0FF, 0x4019, Op::Shlr8),
    e(0xF0FF, 0x4028, Op::Shll16),
    e(0xF0FF, 0x4029, Op::Shlr16),
    e(0xFF00, 0x8B00, Op::Bf),
    e(0xFF00, 0x8900, Op::Bt),
    e(0xF000, 0xA000, Op::Bra),
    e(0xF000, 0xB000, Op::Bsr),
    e(0xF0FF, 0x402B, Op::Jmp),
    e(0xF0FF, 0x400B, Op::Jsr),
    e(0xFFFF, 0x000B, Op::Rts),
    e(0xFFFF, 0x0028, Op::Clrmac),
    e(0xFFFF, 0x0008, Op::Clrt),
    e(0xF00F, 0x400E, Op::Ldc),
    e(0xF00F, 0x4007, Op::LdcL),
    e(0xF00F, 0x400A, Op::Lds),
    e(0xF00F, 0x4006, Op::LdsL),
    e(0xFFFF, 0x0009, Op::Nop),
    e(0xFFFF, 0x002B, Op::Rte),
    e(0xFFFF, 0x0018, Op::Sett),
    e(0xF00F, 0x0002, Op::Stc),
    e(0xF00F, 0x4003, Op::StcL),
    e(0xF00F, 0x000A, Op::Sts),
    e(0xF00F, 0x4002, Op::StsL),
    // SH-2 instructions missing from the SH-1 chain above
    e(0xF00F, 0x300B, Op::Subv),
    e(0xF0FF, 0x4010, Op::Dt),
    e(0xF00F, 0x0007, Op::MulL),
    e(0xF00F, 0x300D, Op::DmulsL),
    e(0xF00F, 0x3005, Op::DmuluL),
    e(0xF00F, 0x000F, Op::MacL),
    e(0xFF00, 0x8F00, Op::BfS),
    e(0xFF00, 0x8D00, Op::BtS),
    e(0xF0FF, 0x0023, Op::Braf),
    e(0xF0FF, 0x0003, Op::Bsrf),
    e(0xFF00, 0xC300, Op::Trapa),
    e(0xFFFF, 0x001B, Op::Sleep),
    e(0xF0FF, 0x401B, Op::TasB),
    e(0xFF00, 0xCC00, Op::TstB),
];

/// Decode by walking the table in order.
pub fn decode_uncached(instr: u16) -> Option<Op> {
    DECODE_TABLE
        .iter()
        .find(|entry| entry.matches(instr))
        .map(|entry| entry.op)
}

/// Decode through a lazily built 64K lookup table.
pub fn decode(instr: u16) -> Option<Op> {
    static CACHE: OnceLock<Vec<Option<Op>>> = OnceLock::new();
    let cache = CACHE.get_or_init(|| (0..=u16::MAX).map(decode_uncached).collect());
    cache[usize::from(instr)]
}
