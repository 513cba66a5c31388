//! Serializable CPU state.
//!
//! A snapshot holds everything needed to resume at an instruction
//! boundary: registers, MMU registers and ATC, run state, interrupt inputs
//! and counters. The dispatch table is rebuilt from the model on restore;
//! an attached FPU bridge is left alone.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cpu::{Cpu, RunState};
use crate::error::ConfigError;
use crate::exceptions::ExceptionState;
use crate::mmu::Mmu;
use crate::model::{CpuModel, FpuModel};
use crate::registers::Registers;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuSnapshot {
    pub model: CpuModel,
    pub fpu_model: FpuModel,
    pub regs: Registers,
    pub mmu: Mmu,
    pub state: RunState,
    pub trace_pending: bool,
    pub trace_deferred: bool,
    pub ipl: u8,
    pub last_ipl: u8,
    pub nmi_latched: bool,
    pub cycles: u64,
    pub instructions: u64,
}

impl Cpu {
    #[must_use]
    pub fn snapshot(&self) -> CpuSnapshot {
        CpuSnapshot {
            model: self.model(),
            fpu_model: self.fpu_model(),
            regs: self.regs,
            mmu: self.mmu.clone(),
            state: self.state,
            trace_pending: self.trace_pending,
            trace_deferred: self.trace_deferred,
            ipl: self.ipl,
            last_ipl: self.last_ipl,
            nmi_latched: self.nmi_latched,
            cycles: self.cycles,
            instructions: self.instructions,
        }
    }

    /// Load a snapshot. Fails, leaving the CPU untouched, if the snapshot's
    /// model pairing is invalid.
    pub fn restore(&mut self, snapshot: &CpuSnapshot) -> Result<(), ConfigError> {
        if snapshot.model != self.model() || snapshot.fpu_model != self.fpu_model() {
            self.set_model(snapshot.model, snapshot.fpu_model)?;
        }
        self.regs = snapshot.regs;
        self.mmu = snapshot.mmu.clone();
        self.state = snapshot.state;
        self.exception_state = if snapshot.state == RunState::Halted {
            ExceptionState::DoubleFault
        } else {
            ExceptionState::Running
        };
        self.trace_pending = snapshot.trace_pending;
        self.trace_deferred = snapshot.trace_deferred;
        self.ipl = snapshot.ipl;
        self.last_ipl = snapshot.last_ipl;
        self.nmi_latched = snapshot.nmi_latched;
        self.cycles = snapshot.cycles;
        self.instructions = snapshot.instructions;
        self.fixups.clear();
        debug!(pc = format_args!("{:#010X}", self.regs.pc), "cpu: snapshot restored");
        Ok(())
    }
}
