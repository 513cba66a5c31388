//! NeXT system interrupt controller.
//!
//! Every interrupting source owns one bit of a 32-bit status register. A
//! mask register gates them, and the bit position fixes the IPL level
//! presented to the CPU: the CPU sees the highest level of any unmasked
//! pending bit.

/// Status register bits.
pub mod int {
    pub const NMI: u32 = 1 << 31;
    pub const POWER_FAIL: u32 = 1 << 30;
    pub const TIMER: u32 = 1 << 29;
    pub const ENET_TX_DMA: u32 = 1 << 28;
    pub const ENET_RX_DMA: u32 = 1 << 27;
    pub const SCSI_DMA: u32 = 1 << 26;
    pub const DISK_DMA: u32 = 1 << 25;
    pub const PRINTER_DMA: u32 = 1 << 24;
    pub const SOUND_OUT_DMA: u32 = 1 << 23;
    pub const SOUND_IN_DMA: u32 = 1 << 22;
    pub const SCC_DMA: u32 = 1 << 21;
    pub const DSP_DMA: u32 = 1 << 20;
    pub const M2R_DMA: u32 = 1 << 19;
    pub const R2M_DMA: u32 = 1 << 18;
    pub const SCC: u32 = 1 << 17;
    pub const REMOTE: u32 = 1 << 16;
    pub const BUS: u32 = 1 << 15;
    pub const DSP_L4: u32 = 1 << 14;
    pub const DISK: u32 = 1 << 13;
    pub const SCSI: u32 = 1 << 12;
    pub const PRINTER: u32 = 1 << 11;
    pub const ENET_TX: u32 = 1 << 10;
    pub const ENET_RX: u32 = 1 << 9;
    pub const SOUND_OVERRUN: u32 = 1 << 8;
    pub const PHONE: u32 = 1 << 7;
    pub const DSP_L3: u32 = 1 << 6;
    pub const VIDEO: u32 = 1 << 5;
    pub const MONITOR: u32 = 1 << 4;
    pub const KEYBOARD_MOUSE: u32 = 1 << 3;
    pub const POWER: u32 = 1 << 2;
    pub const SOFT2: u32 = 1 << 1;
    pub const SOFT1: u32 = 1 << 0;
}

/// Physical address of the status register.
pub const STATUS_ADDRESS: u32 = 0x0200_7000;
/// Physical address of the mask register.
pub const MASK_ADDRESS: u32 = 0x0200_7800;

/// Bits software may set and clear through the status register.
const SOFT_BITS: u32 = int::SOFT1 | int::SOFT2;

/// IPL level for a status bit.
const fn level_of(bit: u32) -> u8 {
    match bit {
        30..=31 => 7,
        18..=29 => 6,
        15..=17 => 5,
        14 => 4,
        2..=13 => 3,
        1 => 2,
        _ => 1,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InterruptController {
    status: u32,
    mask: u32,
}

impl InterruptController {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.status = 0;
        self.mask = 0;
    }

    pub fn raise(&mut self, bits: u32) {
        self.status |= bits;
    }

    pub fn lower(&mut self, bits: u32) {
        self.status &= !bits;
    }

    #[must_use]
    pub fn status(&self) -> u32 {
        self.status
    }

    #[must_use]
    pub fn mask(&self) -> u32 {
        self.mask
    }

    pub fn set_mask(&mut self, mask: u32) {
        self.mask = mask;
    }

    /// IPL presented to the CPU (0 = none).
    #[must_use]
    pub fn level(&self) -> u8 {
        let active = self.status & self.mask;
        if active == 0 {
            return 0;
        }
        level_of(31 - active.leading_zeros())
    }

    /// Byte read from the register block. `None` if `address` is not one
    /// of the two registers.
    #[must_use]
    pub fn read8(&self, address: u32) -> Option<u8> {
        let (register, shift) = self.locate(address)?;
        Some((register >> shift) as u8)
    }

    /// Byte write. The status register only accepts the software bits.
    /// Returns `false` if `address` is not one of the two registers.
    pub fn write8(&mut self, address: u32, value: u8) -> bool {
        let Some((_, shift)) = self.locate(address) else {
            return false;
        };
        let lane = 0xFFu32 << shift;
        let value = u32::from(value) << shift;
        if address & !3 == STATUS_ADDRESS {
            let writable = lane & SOFT_BITS;
            self.status = (self.status & !writable) | (value & writable);
        } else {
            self.mask = (self.mask & !lane) | value;
        }
        true
    }

    fn locate(&self, address: u32) -> Option<(u32, u32)> {
        let shift = (3 - (address & 3)) * 8;
        match address & !3 {
            STATUS_ADDRESS => Some((self.status, shift)),
            MASK_ADDRESS => Some((self.mask, shift)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn highest_unmasked_source_sets_the_level() {
        let mut ic = InterruptController::new();
        ic.raise(int::TIMER | int::SCSI);
        assert_eq!(ic.level(), 0, "everything masked");
        ic.set_mask(int::SCSI);
        assert_eq!(ic.level(), 3);
        ic.set_mask(int::SCSI | int::TIMER);
        assert_eq!(ic.level(), 6);
        ic.lower(int::TIMER);
        assert_eq!(ic.level(), 3);
    }

    #[test]
    fn level_table_edges() {
        assert_eq!(level_of(31), 7);
        assert_eq!(level_of(29), 6);
        assert_eq!(level_of(18), 6);
        assert_eq!(level_of(17), 5);
        assert_eq!(level_of(15), 5);
        assert_eq!(level_of(14), 4);
        assert_eq!(level_of(13), 3);
        assert_eq!(level_of(2), 3);
        assert_eq!(level_of(1), 2);
        assert_eq!(level_of(0), 1);
    }

    #[test]
    fn registers_are_big_endian() {
        let mut ic = InterruptController::new();
        assert!(ic.write8(MASK_ADDRESS, 0x20));
        assert!(ic.write8(MASK_ADDRESS + 3, 0x01));
        assert_eq!(ic.mask(), 0x2000_0001);
        ic.raise(int::TIMER);
        assert_eq!(ic.read8(STATUS_ADDRESS), Some(0x20));
        assert_eq!(ic.read8(STATUS_ADDRESS + 1), Some(0));
        assert_eq!(ic.read8(STATUS_ADDRESS + 4), None);
    }

    #[test]
    fn only_software_bits_are_writable_in_status() {
        let mut ic = InterruptController::new();
        ic.raise(int::TIMER);
        ic.write8(STATUS_ADDRESS, 0x00);
        ic.write8(STATUS_ADDRESS + 3, 0xFF);
        assert_eq!(ic.status(), int::TIMER | int::SOFT1 | int::SOFT2);
    }
}
