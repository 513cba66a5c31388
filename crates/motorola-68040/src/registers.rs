//! 68030/68040 programmer-visible registers.
//!
//! - D0-D7: 8 data registers (32-bit)
//! - A0-A6: 7 address registers (32-bit)
//! - A7: whichever of USP / ISP / MSP the S and M bits select
//! - PC: Program counter (32-bit)
//! - SR: Status register (16-bit)
//! - VBR, SFC, DFC, CACR, CAAR: control registers reached through MOVEC
//!
//! MMU registers are owned by [`crate::mmu::Mmu`].

use serde::{Deserialize, Serialize};

use crate::flags::{CCR_MASK, IPL_MASK, M, S, T0, T1};

/// 68030/68040 register set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registers {
    /// Data registers D0-D7.
    pub d: [u32; 8],
    /// Address registers A0-A6 (A7 is handled via USP/ISP/MSP).
    pub a: [u32; 7],
    /// User stack pointer (A7 when S is clear).
    pub usp: u32,
    /// Interrupt stack pointer (A7 when S is set and M is clear).
    pub isp: u32,
    /// Master stack pointer (A7 when S and M are both set).
    pub msp: u32,
    /// Program counter.
    pub pc: u32,
    /// Status register.
    pub sr: u16,
    /// Vector base register.
    pub vbr: u32,
    /// Source function code for MOVES/PTEST/PFLUSH.
    pub sfc: u8,
    /// Destination function code for MOVES/PTEST/PFLUSH.
    pub dfc: u8,
    /// Cache control register.
    pub cacr: u32,
    /// Cache address register (68030 only).
    pub caar: u32,
}

impl Default for Registers {
    fn default() -> Self {
        Self::new()
    }
}

impl Registers {
    /// Create registers in reset state.
    ///
    /// After reset: supervisor mode on the interrupt stack, mask level 7,
    /// tracing off, VBR zero.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            d: [0; 8],
            a: [0; 7],
            usp: 0,
            isp: 0,
            msp: 0,
            pc: 0,
            sr: 0x2700,
            vbr: 0,
            sfc: 0,
            dfc: 0,
            cacr: 0,
            caar: 0,
        }
    }

    /// Get address register by index (0-7).
    /// A7 returns the active stack pointer.
    #[must_use]
    pub fn a(&self, n: usize) -> u32 {
        debug_assert!(n < 8);
        if n < 7 { self.a[n] } else { self.active_sp() }
    }

    /// Set address register by index (0-7).
    /// A7 sets the active stack pointer.
    pub fn set_a(&mut self, n: usize, value: u32) {
        debug_assert!(n < 8);
        if n < 7 {
            self.a[n] = value;
        } else {
            self.set_active_sp(value);
        }
    }

    /// Get the active stack pointer.
    #[must_use]
    pub const fn active_sp(&self) -> u32 {
        if !self.is_supervisor() {
            self.usp
        } else if self.is_master() {
            self.msp
        } else {
            self.isp
        }
    }

    /// Set the active stack pointer.
    pub fn set_active_sp(&mut self, value: u32) {
        if !self.is_supervisor() {
            self.usp = value;
        } else if self.is_master() {
            self.msp = value;
        } else {
            self.isp = value;
        }
    }

    /// Check if in supervisor mode.
    #[must_use]
    pub const fn is_supervisor(&self) -> bool {
        self.sr & S != 0
    }

    /// Check if the master stack is selected.
    #[must_use]
    pub const fn is_master(&self) -> bool {
        self.sr & M != 0
    }

    /// Get the interrupt mask level (0-7).
    #[must_use]
    pub const fn interrupt_mask(&self) -> u8 {
        ((self.sr & IPL_MASK) >> 8) as u8
    }

    /// Set the interrupt mask level (0-7).
    pub fn set_interrupt_mask(&mut self, level: u8) {
        self.sr = (self.sr & !IPL_MASK) | (u16::from(level & 0x07) << 8);
    }

    /// Trace on every instruction (T1).
    #[must_use]
    pub const fn trace_all(&self) -> bool {
        self.sr & T1 != 0
    }

    /// Trace on change of flow (T0).
    #[must_use]
    pub const fn trace_flow(&self) -> bool {
        self.sr & T0 != 0
    }

    /// Get the condition code register (low byte of SR).
    #[must_use]
    pub const fn ccr(&self) -> u8 {
        (self.sr & CCR_MASK) as u8
    }

    /// Set the condition code register (low byte of SR).
    pub fn set_ccr(&mut self, value: u8) {
        self.sr = (self.sr & 0xFF00) | (u16::from(value) & CCR_MASK);
    }

    /// Move the active stack pointer down by `bytes`, returning the new top.
    pub fn reserve_stack(&mut self, bytes: u32) -> u32 {
        let sp = self.active_sp().wrapping_sub(bytes);
        self.set_active_sp(sp);
        sp
    }

    /// Move the active stack pointer up by `bytes`.
    pub fn release_stack(&mut self, bytes: u32) {
        let sp = self.active_sp().wrapping_add(bytes);
        self.set_active_sp(sp);
    }
}

#[cfg(test)]
mod tests {
    use super::Registers;
    use crate::flags::{M, S};

    #[test]
    fn a7_follows_s_and_m() {
        let mut regs = Registers::new();
        regs.usp = 0x100;
        regs.isp = 0x200;
        regs.msp = 0x300;

        assert_eq!(regs.a(7), 0x200);
        regs.sr |= M;
        assert_eq!(regs.a(7), 0x300);
        regs.sr &= !S;
        assert_eq!(regs.a(7), 0x100);
    }

    #[test]
    fn stack_reservation_uses_the_active_pointer() {
        let mut regs = Registers::new();
        regs.isp = 0x1000;
        let top = regs.reserve_stack(8);
        assert_eq!(top, 0x0FF8);
        assert_eq!(regs.isp, 0x0FF8);
        regs.release_stack(8);
        assert_eq!(regs.isp, 0x1000);
    }

    #[test]
    fn interrupt_mask_round_trips_through_sr() {
        let mut regs = Registers::new();
        regs.set_interrupt_mask(3);
        assert_eq!(regs.interrupt_mask(), 3);
        assert_eq!(regs.sr & 0xF8FF, 0x2000);
    }
}
