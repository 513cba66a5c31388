//! Static instruction descriptor table.
//!
//! Every 16-bit opcode maps to at most one [`Descriptor`]. The table is
//! generated once from [`PATTERNS`]: each pattern is a 16-character bit
//! string where `0`/`1` are fixed bits and any letter is a field. The first
//! pattern whose fixed bits match, whose size field decodes, and whose
//! addressing-mode fields are legal for the instruction wins. Opcodes no
//! pattern accepts have no descriptor and dispatch as illegal.

use std::sync::OnceLock;

use crate::alu::Size;
use crate::ea::AddrMode;

/// Instruction family: the unit of dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Family {
    // data movement
    Move,
    Movea,
    Moveq,
    Lea,
    Pea,
    Exg,
    Swap,
    Ext,
    Clr,
    Movem,
    Link,
    Unlk,
    MoveToSr,
    MoveFromSr,
    MoveToCcr,
    MoveFromCcr,
    MoveUsp,
    Movec,
    Moves,
    // arithmetic
    Add,
    Adda,
    Addi,
    Addq,
    Addx,
    Sub,
    Suba,
    Subi,
    Subq,
    Subx,
    Cmp,
    Cmpa,
    Cmpi,
    Cmpm,
    Neg,
    Negx,
    Not,
    Tst,
    Tas,
    MulW,
    MulL,
    DivW,
    DivL,
    Abcd,
    Sbcd,
    Nbcd,
    // logic
    And,
    Andi,
    Or,
    Ori,
    Eor,
    Eori,
    /// ORI/ANDI/EORI to CCR.
    LogicToCcr,
    /// ORI/ANDI/EORI to SR.
    LogicToSr,
    // bits and shifts
    BitDynamic,
    BitStatic,
    ShiftRegister,
    ShiftMemory,
    // program control
    Bcc,
    Dbcc,
    Scc,
    Jmp,
    Jsr,
    Rts,
    Rtr,
    Rte,
    Rtd,
    Trap,
    Trapv,
    Chk,
    Stop,
    Reset,
    Nop,
    // line F
    Cache040,
    Pflush040,
    Ptest040,
    Move16,
    Pmmu030,
    FpuGeneral,
    FpuSave,
    FpuRestore,
    /// FPU opcode on a 68040 without FPU: format 4 line-F.
    FpuUnimplemented,
}

/// Hardware the instruction needs beyond the integer unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requires {
    Nothing,
    Fpu,
}

/// Decoded, immutable instruction description.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Descriptor {
    pub family: Family,
    pub size: Option<Size>,
    pub src_mode: u8,
    pub src_reg: u8,
    pub dst_mode: u8,
    pub dst_reg: u8,
    pub min_level: u8,
    pub max_level: u8,
    pub requires: Requires,
    /// Base cost in CPU clocks, before bus accesses are charged.
    pub cycles: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SizeRule {
    None,
    Fixed(Size),
    /// Bits 7-6: 00 byte, 01 word, 10 long.
    Standard,
    /// Bits 13-12 of MOVE.
    Move,
    /// Bit 6: 0 word, 1 long (MOVEM).
    Bit6,
    /// Bits 8-6 of EXT/EXTB: 010 word, 011 long, 111 long.
    Ext,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EaRule {
    /// No effective address in bits 5-0.
    None,
    Any,
    Data,
    DataNoImmediate,
    DataAlterable,
    MemoryAlterable,
    Alterable,
    Control,
    ControlAlterable,
    /// Control alterable or -(An) (MOVEM to memory, FSAVE).
    ControlOrPreDec,
    /// Control or (An)+ (MOVEM to registers, FRESTORE).
    ControlOrPostInc,
}

struct Pattern {
    bits: &'static str,
    family: Family,
    size: SizeRule,
    ea: EaRule,
    min_level: u8,
    max_level: u8,
    requires: Requires,
    cycles: u8,
}

const fn p(bits: &'static str, family: Family, size: SizeRule, ea: EaRule, cycles: u8) -> Pattern {
    Pattern {
        bits,
        family,
        size,
        ea,
        min_level: 0,
        max_level: 4,
        requires: Requires::Nothing,
        cycles,
    }
}

/// Pattern restricted to a CPU level range.
const fn pl(
    bits: &'static str,
    family: Family,
    size: SizeRule,
    ea: EaRule,
    min_level: u8,
    max_level: u8,
    cycles: u8,
) -> Pattern {
    Pattern {
        bits,
        family,
        size,
        ea,
        min_level,
        max_level,
        requires: Requires::Nothing,
        cycles,
    }
}

/// FPU pattern (coprocessor ID 1).
const fn pf(bits: &'static str, family: Family, ea: EaRule) -> Pattern {
    Pattern {
        bits,
        family,
        size: SizeRule::None,
        ea,
        min_level: 3,
        max_level: 4,
        requires: Requires::Fpu,
        cycles: 4,
    }
}

use EaRule as E;
use Family as F;
use SizeRule as S;

/// Opcode patterns, first match wins.
static PATTERNS: &[Pattern] = &[
    // 0000: immediates, bit operations, MOVES
    p("0000000000111100", F::LogicToCcr, S::Fixed(Size::Byte), E::None, 4),
    p("0000000001111100", F::LogicToSr, S::Fixed(Size::Word), E::None, 8),
    p("0000001000111100", F::LogicToCcr, S::Fixed(Size::Byte), E::None, 4),
    p("0000001001111100", F::LogicToSr, S::Fixed(Size::Word), E::None, 8),
    p("0000101000111100", F::LogicToCcr, S::Fixed(Size::Byte), E::None, 4),
    p("0000101001111100", F::LogicToSr, S::Fixed(Size::Word), E::None, 8),
    p("00000000sseeeeee", F::Ori, S::Standard, E::DataAlterable, 2),
    p("00000010sseeeeee", F::Andi, S::Standard, E::DataAlterable, 2),
    p("00000100sseeeeee", F::Subi, S::Standard, E::DataAlterable, 2),
    p("00000110sseeeeee", F::Addi, S::Standard, E::DataAlterable, 2),
    p("00001010sseeeeee", F::Eori, S::Standard, E::DataAlterable, 2),
    p("00001100sseeeeee", F::Cmpi, S::Standard, E::DataNoImmediate, 2),
    p("0000100000eeeeee", F::BitStatic, S::None, E::DataNoImmediate, 4),
    p("00001000bbeeeeee", F::BitStatic, S::None, E::DataAlterable, 4),
    pl("00001110sseeeeee", F::Moves, S::Standard, E::MemoryAlterable, 1, 4, 4),
    p("0000rrr100eeeeee", F::BitDynamic, S::None, E::Data, 4),
    p("0000rrr1bbeeeeee", F::BitDynamic, S::None, E::DataAlterable, 4),
    // 0001-0011: MOVE / MOVEA
    p("0010rrr001eeeeee", F::Movea, S::Fixed(Size::Long), E::Any, 2),
    p("0011rrr001eeeeee", F::Movea, S::Fixed(Size::Word), E::Any, 2),
    p("00ssdddddeeeeeee", F::Move, S::Move, E::Any, 2),
    // 0100: miscellaneous
    p("0100000011eeeeee", F::MoveFromSr, S::Fixed(Size::Word), E::DataAlterable, 4),
    pl("0100001011eeeeee", F::MoveFromCcr, S::Fixed(Size::Word), E::DataAlterable, 1, 4, 4),
    p("0100010011eeeeee", F::MoveToCcr, S::Fixed(Size::Word), E::Data, 4),
    p("0100011011eeeeee", F::MoveToSr, S::Fixed(Size::Word), E::Data, 8),
    p("01000000sseeeeee", F::Negx, S::Standard, E::DataAlterable, 2),
    p("01000010sseeeeee", F::Clr, S::Standard, E::DataAlterable, 2),
    p("01000100sseeeeee", F::Neg, S::Standard, E::DataAlterable, 2),
    p("01000110sseeeeee", F::Not, S::Standard, E::DataAlterable, 2),
    pl("0100100000001rrr", F::Link, S::Fixed(Size::Long), E::None, 2, 4, 6),
    p("0100100000eeeeee", F::Nbcd, S::Fixed(Size::Byte), E::DataAlterable, 6),
    p("0100100001000rrr", F::Swap, S::Fixed(Size::Long), E::None, 2),
    p("0100100001eeeeee", F::Pea, S::Fixed(Size::Long), E::Control, 4),
    p("0100100eee000rrr", F::Ext, S::Ext, E::None, 2),
    p("010010001seeeeee", F::Movem, S::Bit6, E::ControlOrPreDec, 4),
    p("010011001seeeeee", F::Movem, S::Bit6, E::ControlOrPostInc, 4),
    pl("0100110000eeeeee", F::MulL, S::Fixed(Size::Long), E::Data, 2, 4, 28),
    pl("0100110001eeeeee", F::DivL, S::Fixed(Size::Long), E::Data, 2, 4, 44),
    p("0100101011eeeeee", F::Tas, S::Fixed(Size::Byte), E::DataAlterable, 8),
    p("01001010sseeeeee", F::Tst, S::Standard, E::Any, 2),
    p("010011100100vvvv", F::Trap, S::None, E::None, 4),
    p("0100111001010rrr", F::Link, S::Fixed(Size::Word), E::None, 4),
    p("0100111001011rrr", F::Unlk, S::None, E::None, 4),
    p("010011100110drrr", F::MoveUsp, S::Fixed(Size::Long), E::None, 2),
    p("0100111001110000", F::Reset, S::None, E::None, 130),
    p("0100111001110001", F::Nop, S::None, E::None, 2),
    p("0100111001110010", F::Stop, S::None, E::None, 4),
    p("0100111001110011", F::Rte, S::None, E::None, 12),
    pl("0100111001110100", F::Rtd, S::None, E::None, 1, 4, 8),
    p("0100111001110101", F::Rts, S::None, E::None, 6),
    p("0100111001110110", F::Trapv, S::None, E::None, 2),
    p("0100111001110111", F::Rtr, S::None, E::None, 8),
    pl("010011100111101d", F::Movec, S::Fixed(Size::Long), E::None, 1, 4, 6),
    p("0100111010eeeeee", F::Jsr, S::None, E::Control, 4),
    p("0100111011eeeeee", F::Jmp, S::None, E::Control, 2),
    p("0100rrr110eeeeee", F::Chk, S::Fixed(Size::Word), E::Data, 4),
    pl("0100rrr100eeeeee", F::Chk, S::Fixed(Size::Long), E::Data, 2, 4, 4),
    p("0100rrr111eeeeee", F::Lea, S::Fixed(Size::Long), E::Control, 2),
    // 0101: ADDQ/SUBQ/Scc/DBcc
    p("0101cccc11001rrr", F::Dbcc, S::Fixed(Size::Word), E::None, 4),
    p("0101cccc11eeeeee", F::Scc, S::Fixed(Size::Byte), E::DataAlterable, 2),
    p("0101qqq0sseeeeee", F::Addq, S::Standard, E::Alterable, 2),
    p("0101qqq1sseeeeee", F::Subq, S::Standard, E::Alterable, 2),
    // 0110, 0111
    p("0110ccccdddddddd", F::Bcc, S::None, E::None, 4),
    p("0111rrr0dddddddd", F::Moveq, S::Fixed(Size::Long), E::None, 2),
    // 1000: OR/DIV/SBCD
    p("1000rrr011eeeeee", F::DivW, S::Fixed(Size::Word), E::Data, 38),
    p("1000rrr111eeeeee", F::DivW, S::Fixed(Size::Word), E::Data, 40),
    p("1000rrr10000mrrr", F::Sbcd, S::Fixed(Size::Byte), E::None, 6),
    p("1000rrr0sseeeeee", F::Or, S::Standard, E::Data, 2),
    p("1000rrr1sseeeeee", F::Or, S::Standard, E::MemoryAlterable, 2),
    // 1001: SUB
    p("1001rrrs11eeeeee", F::Suba, S::None, E::Any, 2),
    p("1001rrr1ss00mrrr", F::Subx, S::Standard, E::None, 2),
    p("1001rrr0sseeeeee", F::Sub, S::Standard, E::Any, 2),
    p("1001rrr1sseeeeee", F::Sub, S::Standard, E::MemoryAlterable, 2),
    // 1011: CMP/EOR
    p("1011rrrs11eeeeee", F::Cmpa, S::None, E::Any, 2),
    p("1011rrr1ss001rrr", F::Cmpm, S::Standard, E::None, 4),
    p("1011rrr0sseeeeee", F::Cmp, S::Standard, E::Any, 2),
    p("1011rrr1sseeeeee", F::Eor, S::Standard, E::DataAlterable, 2),
    // 1100: AND/MUL/ABCD/EXG
    p("1100rrr011eeeeee", F::MulW, S::Fixed(Size::Word), E::Data, 18),
    p("1100rrr111eeeeee", F::MulW, S::Fixed(Size::Word), E::Data, 18),
    p("1100rrr10000mrrr", F::Abcd, S::Fixed(Size::Byte), E::None, 6),
    p("1100rrr101000rrr", F::Exg, S::None, E::None, 2),
    p("1100rrr101001rrr", F::Exg, S::None, E::None, 2),
    p("1100rrr110001rrr", F::Exg, S::None, E::None, 2),
    p("1100rrr0sseeeeee", F::And, S::Standard, E::Data, 2),
    p("1100rrr1sseeeeee", F::And, S::Standard, E::MemoryAlterable, 2),
    // 1101: ADD
    p("1101rrrs11eeeeee", F::Adda, S::None, E::Any, 2),
    p("1101rrr1ss00mrrr", F::Addx, S::Standard, E::None, 2),
    p("1101rrr0sseeeeee", F::Add, S::Standard, E::Any, 2),
    p("1101rrr1sseeeeee", F::Add, S::Standard, E::MemoryAlterable, 2),
    // 1110: shifts and rotates
    p("11100ttd11eeeeee", F::ShiftMemory, S::Fixed(Size::Word), E::MemoryAlterable, 4),
    p("1110cccdssittrrr", F::ShiftRegister, S::Standard, E::None, 4),
    // 1111: 68040 cache, MMU and MOVE16
    pl("11110100cc0ssrrr", F::Cache040, S::None, E::None, 4, 4, 8),
    pl("11110100cc1ssrrr", F::Cache040, S::None, E::None, 4, 4, 8),
    pl("11110101000oorrr", F::Pflush040, S::None, E::None, 4, 4, 8),
    pl("1111010101r01rrr", F::Ptest040, S::None, E::None, 4, 4, 16),
    pl("1111011000100rrr", F::Move16, S::None, E::None, 4, 4, 12),
    pl("11110110000mmrrr", F::Move16, S::None, E::None, 4, 4, 12),
    // 1111: 68030 PMMU (coprocessor ID 0)
    pl("1111000000eeeeee", F::Pmmu030, S::None, E::Any, 3, 3, 8),
    // 1111: FPU (coprocessor ID 1)
    pf("1111001000eeeeee", F::FpuGeneral, E::Any),
    pf("1111001001eeeeee", F::FpuGeneral, E::Any),
    pf("111100101seeeeee", F::FpuGeneral, E::Any),
    pf("1111001100eeeeee", F::FpuSave, E::ControlOrPreDec),
    pf("1111001101eeeeee", F::FpuRestore, E::ControlOrPostInc),
];

/// Compile a pattern string into (mask, value).
fn compile(bits: &str) -> (u16, u16) {
    bits.bytes().fold((0u16, 0u16), |(mask, value), c| match c {
        b'0' => ((mask << 1) | 1, value << 1),
        b'1' => ((mask << 1) | 1, (value << 1) | 1),
        _ => (mask << 1, value << 1),
    })
}

fn decode_size(rule: SizeRule, opcode: u16) -> Result<Option<Size>, ()> {
    match rule {
        SizeRule::None => Ok(None),
        SizeRule::Fixed(size) => Ok(Some(size)),
        SizeRule::Standard => Size::from_bits(((opcode >> 6) & 3) as u8).map(Some).ok_or(()),
        SizeRule::Move => Size::from_move_bits(((opcode >> 12) & 3) as u8)
            .map(Some)
            .ok_or(()),
        SizeRule::Bit6 => Ok(Some(if opcode & 0x40 != 0 { Size::Long } else { Size::Word })),
        SizeRule::Ext => match (opcode >> 6) & 7 {
            0b010 => Ok(Some(Size::Word)),
            0b011 | 0b111 => Ok(Some(Size::Long)),
            _ => Err(()),
        },
    }
}

fn ea_allowed(rule: EaRule, mode: Option<AddrMode>, size: Option<Size>) -> bool {
    if rule == EaRule::None {
        return true;
    }
    let Some(mode) = mode else {
        return false;
    };
    // byte operations cannot address An
    if matches!(mode, AddrMode::AddrReg(_)) && size == Some(Size::Byte) {
        return false;
    }
    match rule {
        EaRule::None | EaRule::Any => true,
        EaRule::Data => mode.is_data(),
        EaRule::DataNoImmediate => mode.is_data() && mode != AddrMode::Immediate,
        EaRule::DataAlterable => mode.is_data_alterable(),
        EaRule::MemoryAlterable => mode.is_memory_alterable(),
        EaRule::Alterable => mode.is_alterable(),
        EaRule::Control => mode.is_control(),
        EaRule::ControlAlterable => mode.is_control() && mode.is_alterable(),
        EaRule::ControlOrPreDec => {
            (mode.is_control() && mode.is_alterable()) || matches!(mode, AddrMode::AddrIndPreDec(_))
        }
        EaRule::ControlOrPostInc => {
            mode.is_control() || matches!(mode, AddrMode::AddrIndPostInc(_))
        }
    }
}

fn try_pattern(pattern: &Pattern, mask: u16, value: u16, opcode: u16) -> Option<Descriptor> {
    if opcode & mask != value {
        return None;
    }
    let size = decode_size(pattern.size, opcode).ok()?;
    let src_mode = ((opcode >> 3) & 7) as u8;
    let src_reg = (opcode & 7) as u8;
    let dst_mode = ((opcode >> 6) & 7) as u8;
    let dst_reg = ((opcode >> 9) & 7) as u8;
    if !ea_allowed(pattern.ea, AddrMode::decode(src_mode, src_reg), size) {
        return None;
    }
    if pattern.family == Family::Move {
        let dst = AddrMode::decode(dst_mode, dst_reg);
        if !dst.is_some_and(AddrMode::is_data_alterable) {
            return None;
        }
    }
    Some(Descriptor {
        family: pattern.family,
        size,
        src_mode,
        src_reg,
        dst_mode,
        dst_reg,
        min_level: pattern.min_level,
        max_level: pattern.max_level,
        requires: pattern.requires,
        cycles: pattern.cycles,
    })
}

fn build() -> Vec<Option<Descriptor>> {
    let compiled: Vec<(u16, u16)> = PATTERNS.iter().map(|p| compile(p.bits)).collect();
    (0..=u16::MAX)
        .map(|opcode| {
            PATTERNS
                .iter()
                .zip(&compiled)
                .find_map(|(pattern, &(mask, value))| try_pattern(pattern, mask, value, opcode))
        })
        .collect()
}

/// The shared descriptor table (65536 entries), built on first use.
pub fn table() -> &'static [Option<Descriptor>] {
    static TABLE: OnceLock<Vec<Option<Descriptor>>> = OnceLock::new();
    TABLE.get_or_init(build)
}

/// Descriptor for one opcode, if any pattern accepts it.
#[must_use]
pub fn descriptor(opcode: u16) -> Option<Descriptor> {
    table()[usize::from(opcode)]
}
