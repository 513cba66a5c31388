//! Errors that leave the CPU core.
//!
//! Guest-visible faults (bus errors, illegal opcodes, traps) never show up
//! here: they are handled by the exception engine and delivered to the guest
//! through its own vector table. Only conditions the guest cannot recover
//! from are surfaced to the embedding application.

use thiserror::Error;

use crate::model::{CpuModel, FpuModel};

/// Configuration-time fault: the requested model has no dispatch table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("no dispatch table for CPU {cpu:?} with FPU {fpu:?}")]
    UnsupportedModel { cpu: CpuModel, fpu: FpuModel },
}

/// Fatal CPU conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CpuError {
    /// A fault occurred while the CPU was already building or dispatching a
    /// bus/address error frame. The real part halts; the machine resets.
    #[error("double fault: vector {vector} at address {address:#010X} (pc {pc:#010X})")]
    DoubleFault { vector: u8, address: u32, pc: u32 },
    /// The CPU is halted and needs a reset before it can run again.
    #[error("CPU is halted")]
    Halted,
    #[error(transparent)]
    Configuration(#[from] ConfigError),
}
