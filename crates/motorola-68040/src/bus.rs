//! Physical bus interface.
//!
//! Everything the CPU sees after address translation goes through
//! [`PhysBus`]: instruction fetches, operand accesses, exception frames and
//! the MMU's own descriptor reads and USED/MODIFIED write-backs. The bus is
//! big-endian and byte addressed; misaligned word and long accesses are
//! legal on the 68030/68040 and are the bus's business.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Function code values from the FC0-FC2 pins.
///
/// These distinguish access types for memory management and bus arbitration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FunctionCode {
    /// User data access (FC=1).
    UserData = 1,
    /// User program access (FC=2).
    UserProgram = 2,
    /// Supervisor data access (FC=5).
    SupervisorData = 5,
    /// Supervisor program access (FC=6).
    SupervisorProgram = 6,
    /// CPU space: interrupt acknowledge, coprocessor traffic (FC=7).
    CpuSpace = 7,
}

impl FunctionCode {
    /// Build a function code from supervisor flag and program/data flag.
    #[must_use]
    pub fn from_flags(supervisor: bool, program: bool) -> Self {
        match (supervisor, program) {
            (false, false) => Self::UserData,
            (false, true) => Self::UserProgram,
            (true, false) => Self::SupervisorData,
            (true, true) => Self::SupervisorProgram,
        }
    }

    /// Decode a raw 3-bit value as used in SFC/DFC and PFLUSH/PTEST.
    ///
    /// Reserved codes (0, 3, 4) map onto the nearest data space.
    #[must_use]
    pub fn from_bits(bits: u8) -> Self {
        match bits & 7 {
            2 => Self::UserProgram,
            5 | 4 => Self::SupervisorData,
            6 => Self::SupervisorProgram,
            7 => Self::CpuSpace,
            _ => Self::UserData,
        }
    }

    /// Returns the 3-bit value for the function code.
    #[must_use]
    pub fn bits(self) -> u8 {
        self as u8
    }

    #[must_use]
    pub fn is_supervisor(self) -> bool {
        self.bits() & 4 != 0
    }

    #[must_use]
    pub fn is_program(self) -> bool {
        self == Self::UserProgram || self == Self::SupervisorProgram
    }
}

/// A physical access that no device answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("bus error at physical address {address:#010X}")]
pub struct BusError {
    pub address: u32,
}

/// What the interrupting device returns during an interrupt acknowledge
/// cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptAck {
    /// Use the autovector for the level (24 + level).
    Autovector,
    /// Device supplied vector number.
    Vector(u8),
    /// No device responded (vector 24).
    Spurious,
    /// Device vector register was never programmed (vector 15).
    Uninitialized,
}

/// Physical memory and device access.
pub trait PhysBus {
    fn read8(&mut self, address: u32) -> Result<u8, BusError>;
    fn write8(&mut self, address: u32, value: u8) -> Result<(), BusError>;

    fn read16(&mut self, address: u32) -> Result<u16, BusError> {
        let hi = self.read8(address)?;
        let lo = self.read8(address.wrapping_add(1))?;
        Ok(u16::from_be_bytes([hi, lo]))
    }

    fn read32(&mut self, address: u32) -> Result<u32, BusError> {
        let hi = self.read16(address)?;
        let lo = self.read16(address.wrapping_add(2))?;
        Ok((u32::from(hi) << 16) | u32::from(lo))
    }

    fn write16(&mut self, address: u32, value: u16) -> Result<(), BusError> {
        let [hi, lo] = value.to_be_bytes();
        self.write8(address, hi)?;
        self.write8(address.wrapping_add(1), lo)
    }

    fn write32(&mut self, address: u32, value: u32) -> Result<(), BusError> {
        self.write16(address, (value >> 16) as u16)?;
        self.write16(address.wrapping_add(2), value as u16)
    }

    /// Interrupt acknowledge for `level`. NeXT hardware autovectors
    /// everything, so that is the default.
    fn interrupt_ack(&mut self, level: u8) -> InterruptAck {
        let _ = level;
        InterruptAck::Autovector
    }

    /// The RESET instruction asserted the external reset line.
    fn reset_devices(&mut self) {}
}

/// Flat big-endian RAM starting at physical address 0.
///
/// Accesses past the end are bus errors. Used by tests and small harnesses.
#[derive(Debug, Clone)]
pub struct FlatBus {
    memory: Vec<u8>,
}

impl FlatBus {
    #[must_use]
    pub fn new(size: usize) -> Self {
        Self {
            memory: vec![0; size],
        }
    }

    /// Copy `data` into memory at `address`.
    pub fn load(&mut self, address: u32, data: &[u8]) {
        let start = address as usize;
        let end = (start + data.len()).min(self.memory.len());
        if start < end {
            self.memory[start..end].copy_from_slice(&data[..end - start]);
        }
    }

    /// Store big-endian words at `address`.
    pub fn load_words(&mut self, address: u32, words: &[u16]) {
        for (i, word) in words.iter().enumerate() {
            self.load(address + 2 * i as u32, &word.to_be_bytes());
        }
    }

    pub fn poke32(&mut self, address: u32, value: u32) {
        self.load(address, &value.to_be_bytes());
    }

    #[must_use]
    pub fn peek16(&self, address: u32) -> u16 {
        let a = address as usize;
        match self.memory.get(a..a + 2) {
            Some(b) => u16::from_be_bytes([b[0], b[1]]),
            None => 0,
        }
    }

    #[must_use]
    pub fn peek32(&self, address: u32) -> u32 {
        (u32::from(self.peek16(address)) << 16) | u32::from(self.peek16(address + 2))
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.memory.len()
    }
}

impl PhysBus for FlatBus {
    fn read8(&mut self, address: u32) -> Result<u8, BusError> {
        self.memory
            .get(address as usize)
            .copied()
            .ok_or(BusError { address })
    }

    fn write8(&mut self, address: u32, value: u8) -> Result<(), BusError> {
        match self.memory.get_mut(address as usize) {
            Some(byte) => {
                *byte = value;
                Ok(())
            }
            None => Err(BusError { address }),
        }
    }
}
