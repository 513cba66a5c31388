//! Guest-visible exception conditions.
//!
//! Instruction handlers, the effective-address engine and the MMU return
//! [`Outcome`]; a failed access short-circuits with `?` back to
//! [`crate::Cpu::step`], which hands the [`Exception`] to the exception
//! engine. Nothing here ever reaches the embedder.

use serde::{Deserialize, Serialize};

use crate::alu::Size;
use crate::bus::FunctionCode;

/// Result of anything that can raise a guest exception.
pub type Outcome<T> = Result<T, Exception>;

/// Well-known vector numbers.
pub mod vector {
    pub const RESET_SSP: u8 = 0;
    pub const RESET_PC: u8 = 1;
    pub const ACCESS_FAULT: u8 = 2;
    pub const ADDRESS_ERROR: u8 = 3;
    pub const ILLEGAL: u8 = 4;
    pub const ZERO_DIVIDE: u8 = 5;
    pub const CHK: u8 = 6;
    pub const TRAPV: u8 = 7;
    pub const PRIVILEGE: u8 = 8;
    pub const TRACE: u8 = 9;
    pub const LINE_A: u8 = 10;
    pub const LINE_F: u8 = 11;
    pub const COPROCESSOR_PROTOCOL: u8 = 13;
    pub const FORMAT_ERROR: u8 = 14;
    pub const UNINITIALIZED: u8 = 15;
    pub const SPURIOUS: u8 = 24;
    pub const AUTOVECTOR_BASE: u8 = 24;
    pub const TRAP_BASE: u8 = 32;
    pub const MMU_CONFIGURATION: u8 = 56;
}

/// Width of the faulting bus transfer as reported in the SSW.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Width {
    Byte,
    Word,
    Long,
    /// 16-byte line transfer (MOVE16).
    Line,
}

impl From<Size> for Width {
    fn from(size: Size) -> Self {
        match size {
            Size::Byte => Self::Byte,
            Size::Word => Self::Word,
            Size::Long => Self::Long,
        }
    }
}

/// A failed memory access, either translation or physical.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessFault {
    /// Logical address of the failed transfer.
    pub address: u32,
    pub write: bool,
    pub width: Width,
    pub fc: FunctionCode,
    /// The MMU refused the access (as opposed to no device responding).
    pub atc: bool,
    /// Data being written, for write-back or data-output-buffer slots.
    pub data: u32,
    /// The access was an instruction fetch.
    pub instruction: bool,
    /// Part of a locked read-modify-write (TAS).
    pub locked: bool,
}

impl AccessFault {
    #[must_use]
    pub fn read(address: u32, width: Width, fc: FunctionCode, atc: bool) -> Self {
        Self {
            address,
            write: false,
            width,
            fc,
            atc,
            data: 0,
            instruction: fc.is_program(),
            locked: false,
        }
    }

    #[must_use]
    pub fn write(address: u32, width: Width, fc: FunctionCode, atc: bool, data: u32) -> Self {
        Self {
            address,
            write: true,
            width,
            fc,
            atc,
            data,
            instruction: false,
            locked: false,
        }
    }
}

/// Everything that diverts execution to an exception handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exception {
    /// Bus error or MMU fault (vector 2).
    Access(AccessFault),
    /// Instruction stream at an odd address (vector 3).
    AddressError {
        address: u32,
        fc: FunctionCode,
        write: bool,
    },
    /// Format 0; the stacked PC is the faulting instruction (illegal,
    /// privilege violation, line A/F, format error, MMU configuration).
    Fault(u8),
    /// Format 0; the stacked PC is the next instruction (TRAP #n).
    Trap(u8),
    /// Format 2 with the instruction address (CHK, CHK2, TRAPV, zero divide).
    InstructionTrap(u8),
    /// 68040 floating-point post-instruction exception (format 3).
    FpPostInstruction { vector: u8, ea: u32 },
    /// 68040 without FPU hit a floating-point opcode (format 4, line F).
    FpUnimplemented { ea: u32 },
    /// 68030 coprocessor mid-instruction exception (format 9).
    CoprocessorMidInstruction { vector: u8, ea: u32 },
}

impl Exception {
    /// Vector number this exception dispatches through.
    #[must_use]
    pub fn vector(&self) -> u8 {
        match *self {
            Self::Access(_) => vector::ACCESS_FAULT,
            Self::AddressError { .. } => vector::ADDRESS_ERROR,
            Self::Fault(v) | Self::Trap(v) | Self::InstructionTrap(v) => v,
            Self::FpPostInstruction { vector, .. }
            | Self::CoprocessorMidInstruction { vector, .. } => vector,
            Self::FpUnimplemented { .. } => vector::LINE_F,
        }
    }

    /// Bus and address errors are the exceptions whose own failure halts
    /// the CPU.
    #[must_use]
    pub fn is_bus_or_address(&self) -> bool {
        matches!(self, Self::Access(_) | Self::AddressError { .. })
    }
}

/// Per-fault record consumed by frame construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExceptionContext {
    pub vector: u8,
    /// Fault address (or the effective address for FP frames).
    pub address: u32,
    pub write: bool,
    pub width: Width,
    pub fc: FunctionCode,
    /// Address of the instruction that was executing.
    pub old_pc: u32,
    /// Value placed in the frame's PC slot.
    pub pc: u32,
    pub data: u32,
    pub atc: bool,
    pub instruction: bool,
    pub locked: bool,
    pub opcode: u16,
    /// Word after the opcode in the instruction stream, if it was fetched.
    pub stage_b: u16,
    /// SR to store in the frame.
    pub sr: u16,
    /// The faulting write completes on RTE instead of restarting the
    /// instruction.
    pub writeback: bool,
}

impl ExceptionContext {
    /// Context for an exception with no access information.
    #[must_use]
    pub fn new(vector: u8, pc: u32, sr: u16) -> Self {
        Self {
            vector,
            address: 0,
            write: false,
            width: Width::Word,
            fc: FunctionCode::SupervisorData,
            old_pc: pc,
            pc,
            data: 0,
            atc: false,
            instruction: false,
            locked: false,
            opcode: 0,
            stage_b: 0,
            sr,
            writeback: false,
        }
    }
}
