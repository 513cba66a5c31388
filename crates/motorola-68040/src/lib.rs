//! Motorola 68030/68040 CPU core with paged MMU.
//!
//! Instructions are decoded through a per-model 65536-entry dispatch table
//! built from a single descriptor table. Every logical access runs through
//! the MMU pipeline (transparent translation, ATC, table walk) before it
//! reaches the [`PhysBus`]. Faults unwind with `?` to [`Cpu::step`], which
//! builds the model-specific exception frame (formats 0/1/2/3/4/7 on the
//! 68040, 0/1/2/9/A/B on the 68030) and vectors to the guest handler.

pub mod alu;
pub mod bus;
pub mod cpu;
pub mod decode;
pub mod dispatch;
mod ea;
pub mod error;
mod exceptions;
mod execute;
pub mod fault;
pub mod flags;
pub mod frame;
mod memory;
pub mod mmu;
pub mod model;
pub mod registers;
mod snapshot;

pub use alu::Size;
pub use bus::{BusError, FlatBus, FunctionCode, InterruptAck, PhysBus};
pub use cpu::{Cpu, QUERY_PATHS, RunState, STOP_CYCLES};
pub use dispatch::{DispatchTable, Handler};
pub use ea::{AddrMode, Operand};
pub use error::{ConfigError, CpuError};
pub use exceptions::{EXCEPTION_CYCLES, ExceptionState};
pub use execute::fpu::{FpuAccess, FpuBridge};
pub use fault::{AccessFault, Exception, ExceptionContext, Outcome, Width};
pub use flags::{C, N, Status, V, X, Z};
pub use frame::FrameFormat;
pub use mmu::{Mmu, MmuFlavor};
pub use model::{CpuCapabilities, CpuModel, FpuModel};
pub use registers::Registers;
pub use snapshot::CpuSnapshot;
