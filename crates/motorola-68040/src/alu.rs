//! Operand sizes and flag-producing arithmetic.
//!
//! Every helper takes the incoming SR and returns the result together with
//! the updated SR, so callers decide when (and whether) to commit flags.

use serde::{Deserialize, Serialize};

use crate::flags::{C, N, Status, V, X, Z};

/// Operand size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Size {
    Byte,
    Word,
    Long,
}

impl Size {
    /// Decode the common two-bit size field (00 = byte, 01 = word, 10 = long).
    #[must_use]
    pub const fn from_bits(bits: u8) -> Option<Self> {
        match bits & 3 {
            0 => Some(Self::Byte),
            1 => Some(Self::Word),
            2 => Some(Self::Long),
            _ => None,
        }
    }

    /// Decode the MOVE size field (01 = byte, 11 = word, 10 = long).
    #[must_use]
    pub const fn from_move_bits(bits: u8) -> Option<Self> {
        match bits & 3 {
            1 => Some(Self::Byte),
            3 => Some(Self::Word),
            2 => Some(Self::Long),
            _ => None,
        }
    }

    #[must_use]
    pub const fn bytes(self) -> u32 {
        match self {
            Self::Byte => 1,
            Self::Word => 2,
            Self::Long => 4,
        }
    }

    #[must_use]
    pub const fn mask(self) -> u32 {
        match self {
            Self::Byte => 0xFF,
            Self::Word => 0xFFFF,
            Self::Long => 0xFFFF_FFFF,
        }
    }

    #[must_use]
    pub const fn msb(self) -> u32 {
        match self {
            Self::Byte => 0x80,
            Self::Word => 0x8000,
            Self::Long => 0x8000_0000,
        }
    }

    #[must_use]
    pub const fn bits(self) -> u32 {
        self.bytes() * 8
    }

    /// Sign-extend a value of this size to 32 bits.
    #[must_use]
    pub const fn sign_extend(self, value: u32) -> u32 {
        match self {
            Self::Byte => value as u8 as i8 as i32 as u32,
            Self::Word => value as u16 as i16 as i32 as u32,
            Self::Long => value,
        }
    }

    /// Replace the low bytes of `dst` covered by this size with `value`.
    #[must_use]
    pub const fn merge(self, dst: u32, value: u32) -> u32 {
        (dst & !self.mask()) | (value & self.mask())
    }
}

/// ADD / ADDX. `extend` adds the X flag and uses the sticky-Z rule.
#[must_use]
pub fn add(src: u32, dst: u32, size: Size, sr: u16, extend: bool) -> (u32, u16) {
    let x = u32::from(extend && sr & X != 0);
    let mask = size.mask();
    let msb = size.msb();
    let (s, d) = (src & mask, dst & mask);
    let wide = u64::from(s) + u64::from(d) + u64::from(x);
    let result = (wide as u32) & mask;

    let carry = wide > u64::from(mask);
    let overflow = (!(s ^ d) & (s ^ result) & msb) != 0;
    let mut flags = sr & !(X | N | V | C);
    if extend {
        if result != 0 {
            flags &= !Z;
        }
    } else {
        flags = Status::set_if(flags, Z, result == 0);
    }
    flags = Status::set_if(flags, N, result & msb != 0);
    flags = Status::set_if(flags, V, overflow);
    if carry {
        flags |= X | C;
    }
    (result, flags)
}

/// SUB / SUBX: `dst - src`.
#[must_use]
pub fn sub(src: u32, dst: u32, size: Size, sr: u16, extend: bool) -> (u32, u16) {
    let x = u32::from(extend && sr & X != 0);
    let mask = size.mask();
    let msb = size.msb();
    let (s, d) = (src & mask, dst & mask);
    let result = d.wrapping_sub(s).wrapping_sub(x) & mask;

    let borrow = u64::from(s) + u64::from(x) > u64::from(d);
    let overflow = ((s ^ d) & (d ^ result) & msb) != 0;
    let mut flags = sr & !(X | N | V | C);
    if extend {
        if result != 0 {
            flags &= !Z;
        }
    } else {
        flags = Status::set_if(flags, Z, result == 0);
    }
    flags = Status::set_if(flags, N, result & msb != 0);
    flags = Status::set_if(flags, V, overflow);
    if borrow {
        flags |= X | C;
    }
    (result, flags)
}

/// CMP: like SUB but X is preserved and no result is kept.
#[must_use]
pub fn cmp(src: u32, dst: u32, size: Size, sr: u16) -> u16 {
    let (_, flags) = sub(src, dst, size, sr, false);
    (flags & !X) | (sr & X)
}

/// N and Z from the result, V and C cleared (MOVE, logic ops, TST).
#[must_use]
pub fn logic_flags(result: u32, size: Size, sr: u16) -> u16 {
    Status::clear_vc(Status::update_nz(sr, result, size.msb()))
}

/// BCD addition: `dst + src + extend`. Returns (result, carry, overflow).
#[must_use]
pub fn bcd_add(src: u8, dst: u8, extend: u8) -> (u8, bool, bool) {
    let low_sum = (dst & 0x0F) + (src & 0x0F) + extend;
    let corf: u16 = if low_sum > 9 { 6 } else { 0 };
    let uncorrected = u16::from(dst) + u16::from(src) + u16::from(extend);

    let low_carry = (low_sum + if low_sum > 9 { 6 } else { 0 }) >> 4;
    let carry = (dst >> 4) + (src >> 4) + low_carry > 9;

    let result = uncorrected + corf + if carry { 0x60 } else { 0 };
    let overflow = (!uncorrected & result & 0x80) != 0;
    (result as u8, carry, overflow)
}

/// BCD subtraction: `dst - src - extend`. Returns (result, borrow, overflow).
#[must_use]
pub fn bcd_sub(dst: u8, src: u8, extend: u8) -> (u8, bool, bool) {
    let uncorrected = dst.wrapping_sub(src).wrapping_sub(extend);
    let mut result = uncorrected;

    let low_borrowed = (dst & 0x0F) < (src & 0x0F).saturating_add(extend);
    if low_borrowed {
        result = result.wrapping_sub(6);
    }
    let high_borrowed = (dst >> 4) < (src >> 4) + u8::from(low_borrowed);
    if high_borrowed {
        result = result.wrapping_sub(0x60);
    }

    let borrow = high_borrowed || (low_borrowed && uncorrected < 6);
    let overflow = (uncorrected & !result & 0x80) != 0;
    (result, borrow, overflow)
}

/// Apply BCD results to SR: X/C from carry, V from overflow, sticky Z, N
/// from bit 7.
#[must_use]
pub fn bcd_flags(result: u8, carry: bool, overflow: bool, sr: u16) -> u16 {
    let mut flags = sr & !(X | C | V | N);
    if carry {
        flags |= X | C;
    }
    if result != 0 {
        flags &= !Z;
    }
    flags = Status::set_if(flags, V, overflow);
    Status::set_if(flags, N, result & 0x80 != 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_sets_carry_and_overflow() {
        let (r, sr) = add(1, 0x7F, Size::Byte, 0, false);
        assert_eq!(r, 0x80);
        assert_eq!(sr & (N | V | C), N | V);

        let (r, sr) = add(1, 0xFFFF, Size::Word, 0, false);
        assert_eq!(r, 0);
        assert_eq!(sr & (X | Z | C), X | Z | C);
    }

    #[test]
    fn addx_keeps_z_sticky() {
        let (_, sr) = add(0, 0, Size::Long, X | Z, true);
        // 0 + 0 + 1 = 1, nonzero clears Z
        assert_eq!(sr & Z, 0);
        let (_, sr) = add(0, 0, Size::Long, Z, true);
        assert_ne!(sr & Z, 0);
    }

    #[test]
    fn sub_borrows() {
        let (r, sr) = sub(1, 0, Size::Long, 0, false);
        assert_eq!(r, 0xFFFF_FFFF);
        assert_eq!(sr & (X | N | C), X | N | C);
    }

    #[test]
    fn cmp_preserves_x() {
        let sr = cmp(1, 0, Size::Byte, 0);
        assert_eq!(sr & X, 0);
        assert_ne!(sr & C, 0);
        let sr = cmp(0, 1, Size::Byte, X);
        assert_ne!(sr & X, 0);
        assert_eq!(sr & C, 0);
    }

    #[test]
    fn bcd_digits() {
        assert_eq!(bcd_add(0x45, 0x38, 0), (0x83, false, false));
        assert_eq!(bcd_add(0x55, 0x55, 0).0, 0x10);
        assert!(bcd_add(0x55, 0x55, 0).1);
        assert_eq!(bcd_sub(0x42, 0x15, 0).0, 0x27);
        let (r, borrow, _) = bcd_sub(0x00, 0x01, 0);
        assert_eq!(r, 0x99);
        assert!(borrow);
    }

    #[test]
    fn size_helpers() {
        assert_eq!(Size::Byte.sign_extend(0x80), 0xFFFF_FF80);
        assert_eq!(Size::Word.merge(0x1234_5678, 0xABCD), 0x1234_ABCD);
        assert_eq!(Size::from_move_bits(3), Some(Size::Word));
        assert_eq!(Size::from_bits(3), None);
    }
}
