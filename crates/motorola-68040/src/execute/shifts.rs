//! Shifts and rotates: ASx, LSx, ROXx, ROx on registers and memory.

use crate::alu::Size;
use crate::bus::PhysBus;
use crate::cpu::Cpu;
use crate::fault::Outcome;
use crate::flags::{C, Status, V, X};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ShiftKind {
    Arithmetic,
    Logical,
    RotateExtend,
    Rotate,
}

impl ShiftKind {
    fn from_bits(bits: u16) -> Self {
        match bits & 3 {
            0 => Self::Arithmetic,
            1 => Self::Logical,
            2 => Self::RotateExtend,
            _ => Self::Rotate,
        }
    }
}

/// Shift one bit at a time; counts are at most 63.
fn shift(kind: ShiftKind, left: bool, value: u32, count: u32, size: Size, sr: u16) -> (u32, u16) {
    let mask = size.mask();
    let msb = size.msb();
    let mut value = value & mask;
    let mut x = sr & X != 0;
    let mut carry = false;
    let mut overflow = false;

    for _ in 0..count {
        if left {
            let out = value & msb != 0;
            let fill = match kind {
                ShiftKind::Rotate => out,
                ShiftKind::RotateExtend => x,
                _ => false,
            };
            let next = ((value << 1) | u32::from(fill)) & mask;
            if kind == ShiftKind::Arithmetic && (next & msb != 0) != (value & msb != 0) {
                overflow = true;
            }
            value = next;
            carry = out;
        } else {
            let out = value & 1 != 0;
            let fill = match kind {
                ShiftKind::Arithmetic => value & msb != 0,
                ShiftKind::Rotate => out,
                ShiftKind::RotateExtend => x,
                ShiftKind::Logical => false,
            };
            value = (value >> 1) | if fill { msb } else { 0 };
            carry = out;
        }
        if kind != ShiftKind::Rotate {
            x = carry;
        }
    }

    let mut flags = Status::update_nz(sr, value, msb) & !(V | C);
    if count == 0 {
        if kind == ShiftKind::RotateExtend && sr & X != 0 {
            flags |= C;
        }
        return (value, flags);
    }
    flags = Status::set_if(flags, C, carry);
    flags = Status::set_if(flags, V, overflow);
    if kind != ShiftKind::Rotate {
        flags = Status::set_if(flags, X, x);
    }
    (value, flags)
}

impl Cpu {
    /// Encoding: 1110 ccc d ss i tt rrr. With i set the count is Dccc
    /// modulo 64, otherwise ccc (0 means 8).
    pub(super) fn exec_shift_register(&mut self) -> Outcome<()> {
        let size = self.op_size();
        let left = self.opcode & 0x0100 != 0;
        let kind = ShiftKind::from_bits(self.opcode >> 3);
        let field = self.reg_hi();
        let count = if self.opcode & 0x0020 != 0 {
            self.regs.d[field] % 64
        } else if field == 0 {
            8
        } else {
            field as u32
        };
        let r = self.reg_lo();
        let (result, sr) = shift(kind, left, self.regs.d[r], count, size, self.regs.sr);
        self.regs.d[r] = size.merge(self.regs.d[r], result);
        self.regs.sr = sr;
        self.extra_cycles += count;
        Ok(())
    }

    /// Memory form: one-bit word shift. Encoding: 1110 0tt d 11 <ea>.
    pub(super) fn exec_shift_memory(&mut self, bus: &mut dyn PhysBus) -> Outcome<()> {
        let left = self.opcode & 0x0100 != 0;
        let kind = ShiftKind::from_bits(self.opcode >> 9);
        let operand = self.resolve_ea(bus, Size::Word)?;
        let value = self.read_operand(bus, operand, Size::Word)?;
        let (result, sr) = shift(kind, left, value, 1, Size::Word, self.regs.sr);
        self.regs.sr = sr;
        self.write_operand(bus, operand, Size::Word, result)
    }
}

#[cfg(test)]
mod tests {
    use super::{ShiftKind, shift};
    use crate::alu::Size;
    use crate::flags::{C, N, V, X, Z};

    #[test]
    fn asl_detects_sign_change() {
        let (result, sr) = shift(ShiftKind::Arithmetic, true, 0x40, 1, Size::Byte, 0);
        assert_eq!(result, 0x80);
        assert_eq!(sr & (V | N), V | N);
        assert_eq!(sr & C, 0);
    }

    #[test]
    fn asr_keeps_sign() {
        let (result, sr) = shift(ShiftKind::Arithmetic, false, 0x8001, 1, Size::Word, 0);
        assert_eq!(result, 0xC000);
        assert_eq!(sr & (X | C), X | C);
    }

    #[test]
    fn lsr_to_zero() {
        let (result, sr) = shift(ShiftKind::Logical, false, 1, 1, Size::Long, 0);
        assert_eq!(result, 0);
        assert_eq!(sr & (Z | C | X), Z | C | X);
    }

    #[test]
    fn rotate_leaves_x_alone() {
        let (result, sr) = shift(ShiftKind::Rotate, true, 0x8000_0000, 1, Size::Long, 0);
        assert_eq!(result, 1);
        assert_eq!(sr & (C | X), C);
    }

    #[test]
    fn roxl_shifts_x_in() {
        let (result, sr) = shift(ShiftKind::RotateExtend, true, 0, 1, Size::Byte, X);
        assert_eq!(result, 1);
        assert_eq!(sr & X, 0);
    }

    #[test]
    fn zero_count_clears_carry_except_roxx() {
        let (_, sr) = shift(ShiftKind::Logical, true, 5, 0, Size::Long, C | X);
        assert_eq!(sr & (C | X), X);
        let (_, sr) = shift(ShiftKind::RotateExtend, true, 5, 0, Size::Long, X);
        assert_eq!(sr & C, C);
    }
}
