//! 68030/68040 status register flags.
//!
//! The status register is 16 bits:
//! - Bits 0-4: Condition code register (CCR)
//!   - C (bit 0): Carry
//!   - V (bit 1): Overflow
//!   - Z (bit 2): Zero
//!   - N (bit 3): Negative
//!   - X (bit 4): Extend
//! - Bits 8-10: Interrupt mask
//! - Bit 12: Master/interrupt state (M)
//! - Bit 13: Supervisor mode (S)
//! - Bit 14: Trace on change of flow (T0)
//! - Bit 15: Trace on every instruction (T1)

/// Carry flag.
pub const C: u16 = 0x0001;
/// Overflow flag.
pub const V: u16 = 0x0002;
/// Zero flag.
pub const Z: u16 = 0x0004;
/// Negative flag.
pub const N: u16 = 0x0008;
/// Extend flag.
pub const X: u16 = 0x0010;

/// Interrupt mask field.
pub const IPL_MASK: u16 = 0x0700;
/// Master stack select.
pub const M: u16 = 0x1000;
/// Supervisor mode flag.
pub const S: u16 = 0x2000;
/// Trace on change of flow.
pub const T0: u16 = 0x4000;
/// Trace on every instruction.
pub const T1: u16 = 0x8000;
/// Both trace bits.
pub const TRACE_MASK: u16 = T1 | T0;

/// Mask for condition codes only (bits 0-4).
pub const CCR_MASK: u16 = 0x001F;
/// Mask for valid SR bits on the 68030/68040.
pub const SR_MASK: u16 = 0xF71F;

/// Status register helper functions.
pub struct Status;

impl Status {
    /// Update N and Z from a value of `bits` width (8, 16 or 32).
    #[must_use]
    pub fn update_nz(sr: u16, value: u32, msb: u32) -> u16 {
        let mask = msb | (msb - 1);
        let mut result = sr & !(N | Z);
        if value & mask == 0 {
            result |= Z;
        }
        if value & msb != 0 {
            result |= N;
        }
        result
    }

    /// Clear V and C flags (used by MOVE, AND, OR, EOR, etc).
    #[must_use]
    pub fn clear_vc(sr: u16) -> u16 {
        sr & !(V | C)
    }

    /// Set a flag if condition is true, clear if false.
    #[must_use]
    pub fn set_if(sr: u16, flag: u16, condition: bool) -> u16 {
        if condition { sr | flag } else { sr & !flag }
    }

    /// Evaluate a condition code (0-15).
    #[must_use]
    pub fn condition(sr: u16, cc: u8) -> bool {
        let c = sr & C != 0;
        let v = sr & V != 0;
        let z = sr & Z != 0;
        let n = sr & N != 0;
        match cc & 0x0F {
            0x0 => true,       // T
            0x1 => false,      // F
            0x2 => !c && !z,   // HI
            0x3 => c || z,     // LS
            0x4 => !c,         // CC/HS
            0x5 => c,          // CS/LO
            0x6 => !z,         // NE
            0x7 => z,          // EQ
            0x8 => !v,         // VC
            0x9 => v,          // VS
            0xA => !n,         // PL
            0xB => n,          // MI
            0xC => n == v,     // GE
            0xD => n != v,     // LT
            0xE => !z && n == v, // GT
            _ => z || n != v,  // LE
        }
    }
}
