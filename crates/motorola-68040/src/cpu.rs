//! The CPU aggregate and its instruction step.
//!
//! [`Cpu`] owns the register file, the MMU and the dispatch table for one
//! configured model. [`Cpu::step`] runs exactly one unit of work (an
//! instruction, an exception entry, or one idle slice while stopped) and
//! returns the clocks it took.

use std::fmt;

use emu_core::{Observable, Value};
use tracing::{debug, info};

use crate::bus::PhysBus;
use crate::decode;
use crate::dispatch::{DispatchTable, Handler};
use crate::ea::FixupLog;
use crate::error::{ConfigError, CpuError};
use crate::exceptions::{EXCEPTION_CYCLES, ExceptionState};
use crate::execute::fpu::FpuBridge;
use crate::fault::{Exception, vector};
use crate::flags::{C, N, V, X, Z};
use crate::mmu::{Mmu, MmuFlavor};
use crate::model::{CpuModel, FpuModel};
use crate::registers::Registers;

/// Clocks an idle STOP slice takes.
pub const STOP_CYCLES: u32 = 4;

/// Execution state outside exception processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum RunState {
    #[default]
    Running,
    /// STOP executed; waiting for an interrupt.
    Stopped,
    /// Double fault; only a reset recovers.
    Halted,
}

/// All paths accepted by [`Cpu::query`](Observable::query).
pub const QUERY_PATHS: &[&str] = &[
    "d0", "d1", "d2", "d3", "d4", "d5", "d6", "d7", "a0", "a1", "a2", "a3", "a4", "a5", "a6",
    "a7", "usp", "isp", "msp", "pc", "sr", "ccr", "vbr", "sfc", "dfc", "cacr", "flags.x",
    "flags.n", "flags.z", "flags.v", "flags.c", "flags.s", "flags.m", "int_mask", "halted",
    "stopped", "cycles", "instructions", "opcode", "model", "mmu.tcr", "mmu.urp", "mmu.srp",
    "mmu.mmusr", "mmu.walks", "mmu.enabled",
];

/// A 68030 or 68040 with its MMU.
pub struct Cpu {
    pub regs: Registers,
    pub mmu: Mmu,
    model: CpuModel,
    fpu_model: FpuModel,
    table: DispatchTable,
    fpu: Option<Box<dyn FpuBridge>>,
    pub(crate) opcode: u16,
    /// First extension word of the current instruction (68030 stage B),
    /// zero until one is fetched.
    pub(crate) stage_b: u16,
    /// Address of the instruction being executed.
    pub(crate) instr_pc: u32,
    /// SR when the instruction started.
    pub(crate) instr_sr: u16,
    pub(crate) fixups: FixupLog,
    /// Operand bus transfers this step.
    pub(crate) accesses: u32,
    /// Instruction-specific clocks on top of the descriptor's base cost.
    pub(crate) extra_cycles: u32,
    /// Set by anything that changes the flow of control (for T0).
    pub(crate) flow_changed: bool,
    /// Faulting writes restart the instruction instead of writing back.
    pub(crate) restart_writes: bool,
    pub(crate) state: RunState,
    pub(crate) exception_state: ExceptionState,
    pub(crate) trace_pending: bool,
    /// Trace held back until the handler's first instruction completes.
    pub(crate) trace_deferred: bool,
    pub(crate) ipl: u8,
    pub(crate) last_ipl: u8,
    pub(crate) nmi_latched: bool,
    pub(crate) cycles: u64,
    pub(crate) instructions: u64,
}

impl fmt::Debug for Cpu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cpu")
            .field("model", &self.model)
            .field("fpu_model", &self.fpu_model)
            .field("pc", &format_args!("{:#010X}", self.regs.pc))
            .field("sr", &format_args!("{:#06X}", self.regs.sr))
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

const fn flavor(model: CpuModel) -> MmuFlavor {
    match model {
        CpuModel::M68030 => MmuFlavor::Pmmu030,
        CpuModel::M68040 => MmuFlavor::Mmu040,
    }
}

impl Cpu {
    /// Create a CPU for a model pairing. Registers are in reset state but
    /// the reset vectors have not been read; call [`Cpu::reset`].
    pub fn new(model: CpuModel, fpu_model: FpuModel) -> Result<Self, ConfigError> {
        let table = DispatchTable::build(model, fpu_model)?;
        Ok(Self {
            regs: Registers::new(),
            mmu: Mmu::new(flavor(model)),
            model,
            fpu_model,
            table,
            fpu: None,
            opcode: 0,
            stage_b: 0,
            instr_pc: 0,
            instr_sr: 0x2700,
            fixups: FixupLog::default(),
            accesses: 0,
            extra_cycles: 0,
            flow_changed: false,
            restart_writes: false,
            state: RunState::Running,
            exception_state: ExceptionState::Running,
            trace_pending: false,
            trace_deferred: false,
            ipl: 0,
            last_ipl: 0,
            nmi_latched: false,
            cycles: 0,
            instructions: 0,
        })
    }

    #[must_use]
    pub fn model(&self) -> CpuModel {
        self.model
    }

    #[must_use]
    pub fn fpu_model(&self) -> FpuModel {
        self.fpu_model
    }

    #[must_use]
    pub fn dispatch(&self) -> &DispatchTable {
        &self.table
    }

    /// Switch CPU/FPU model. The register file is left alone; the MMU is
    /// reset if its register front end changes.
    pub fn set_model(&mut self, model: CpuModel, fpu_model: FpuModel) -> Result<(), ConfigError> {
        self.table = DispatchTable::build(model, fpu_model)?;
        self.model = model;
        self.fpu_model = fpu_model;
        self.mmu.set_flavor(flavor(model));
        info!(cpu = model.name(), ?fpu_model, "cpu: model changed");
        Ok(())
    }

    /// Attach the floating-point collaborator.
    pub fn attach_fpu(&mut self, bridge: Box<dyn FpuBridge>) {
        self.fpu = Some(bridge);
    }

    pub(crate) fn take_fpu(&mut self) -> Option<Box<dyn FpuBridge>> {
        self.fpu.take()
    }

    pub(crate) fn restore_fpu(&mut self, bridge: Box<dyn FpuBridge>) {
        self.fpu = Some(bridge);
    }

    /// Hard reset: SSP and PC from vectors 0 and 1, MMU off, ATC flushed.
    ///
    /// A bus error fetching the reset vectors leaves the CPU halted.
    pub fn reset(&mut self, bus: &mut dyn PhysBus) -> Result<(), CpuError> {
        self.regs = Registers::new();
        self.mmu.reset();
        self.state = RunState::Running;
        self.exception_state = ExceptionState::Running;
        self.trace_pending = false;
        self.trace_deferred = false;
        self.nmi_latched = false;
        self.fixups.clear();
        if let Some(fpu) = self.fpu.as_mut() {
            fpu.reset();
        }
        let vectors = bus
            .read32(u32::from(vector::RESET_SSP) * 4)
            .and_then(|ssp| Ok((ssp, bus.read32(u32::from(vector::RESET_PC) * 4)?)));
        match vectors {
            Ok((ssp, pc)) => {
                self.regs.isp = ssp;
                self.regs.pc = pc;
                self.instr_pc = pc;
                self.instr_sr = self.regs.sr;
                debug!(
                    ssp = format_args!("{ssp:#010X}"),
                    pc = format_args!("{pc:#010X}"),
                    "cpu: reset"
                );
                Ok(())
            }
            Err(err) => {
                self.state = RunState::Halted;
                self.exception_state = ExceptionState::DoubleFault;
                Err(CpuError::DoubleFault {
                    vector: vector::RESET_SSP,
                    address: err.address,
                    pc: 0,
                })
            }
        }
    }

    /// Drive the interrupt priority inputs (0 = none).
    pub fn set_ipl(&mut self, level: u8) {
        let level = level & 7;
        if level == 7 && self.last_ipl != 7 {
            self.nmi_latched = true;
        }
        self.last_ipl = level;
        self.ipl = level;
    }

    #[must_use]
    pub fn ipl(&self) -> u8 {
        self.ipl
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.state == RunState::Stopped
    }

    #[must_use]
    pub fn is_halted(&self) -> bool {
        self.state == RunState::Halted
    }

    #[must_use]
    pub fn run_state(&self) -> RunState {
        self.state
    }

    #[must_use]
    pub fn exception_state(&self) -> ExceptionState {
        self.exception_state
    }

    #[must_use]
    pub fn trace_pending(&self) -> bool {
        self.trace_pending
    }

    #[must_use]
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    #[must_use]
    pub fn instructions(&self) -> u64 {
        self.instructions
    }

    /// Address of the instruction most recently started.
    #[must_use]
    pub fn instruction_pc(&self) -> u32 {
        self.instr_pc
    }

    /// Interrupt level that should be taken now, if any.
    fn interrupt_level(&self) -> Option<u8> {
        if self.ipl == 7 && self.nmi_latched {
            return Some(7);
        }
        (self.ipl > self.regs.interrupt_mask()).then_some(self.ipl)
    }

    /// Run one instruction, exception entry or idle slice.
    ///
    /// Returns the clocks consumed. Guest faults are handled internally;
    /// only a double fault or a halted CPU reach the caller.
    pub fn step(&mut self, bus: &mut dyn PhysBus) -> Result<u32, CpuError> {
        if self.state == RunState::Halted {
            return Err(CpuError::Halted);
        }
        self.accesses = 0;
        self.extra_cycles = 0;
        let base = if self.trace_pending {
            self.trace_pending = false;
            self.raise(bus, Exception::InstructionTrap(vector::TRACE))?;
            EXCEPTION_CYCLES
        } else if let Some(level) = self.interrupt_level() {
            self.take_interrupt(bus, level)?;
            EXCEPTION_CYCLES
        } else if self.state == RunState::Stopped {
            STOP_CYCLES
        } else {
            self.execute_one(bus)?
        };
        let bus_cycles = u32::from(self.model.capabilities().bus_cycles);
        let cycles = base + self.extra_cycles + self.accesses * bus_cycles;
        self.cycles += u64::from(cycles);
        Ok(cycles)
    }

    fn execute_one(&mut self, bus: &mut dyn PhysBus) -> Result<u32, CpuError> {
        self.instr_pc = self.regs.pc;
        self.instr_sr = self.regs.sr;
        self.fixups.clear();
        self.flow_changed = false;
        self.restart_writes = false;
        self.stage_b = 0;
        let deferred = std::mem::take(&mut self.trace_deferred);

        let outcome = self.fetch_word(bus).and_then(|opcode| {
            self.opcode = opcode;
            self.execute(bus, opcode)
        });
        self.instructions += 1;
        let mut cycles = decode::descriptor(self.opcode).map_or(2, |d| u32::from(d.cycles));
        match outcome {
            Ok(()) => {
                let traced = self.instr_sr & crate::flags::T1 != 0
                    || (self.instr_sr & crate::flags::T0 != 0 && self.flow_changed);
                if traced {
                    self.trace_pending = true;
                }
            }
            Err(exception) => {
                self.raise(bus, exception)?;
                cycles += EXCEPTION_CYCLES;
            }
        }
        if deferred {
            self.trace_pending = true;
        }
        Ok(cycles)
    }

    fn execute(&mut self, bus: &mut dyn PhysBus, opcode: u16) -> crate::fault::Outcome<()> {
        match self.table.handler(opcode) {
            Handler::Illegal { vector } => Err(Exception::Fault(vector)),
            Handler::Execute(family) => self.execute_family(bus, family),
        }
    }
}

impl Observable for Cpu {
    fn query(&self, path: &str) -> Option<Value> {
        if let Some(rest) = path.strip_prefix('d') {
            if let Ok(n) = rest.parse::<usize>() {
                return (n < 8).then(|| self.regs.d[n].into());
            }
        }
        if let Some(rest) = path.strip_prefix('a') {
            if let Ok(n) = rest.parse::<usize>() {
                return (n < 8).then(|| self.regs.a(n).into());
            }
        }
        let sr = self.regs.sr;
        match path {
            "usp" => Some(self.regs.usp.into()),
            "isp" => Some(self.regs.isp.into()),
            "msp" => Some(self.regs.msp.into()),
            "pc" => Some(self.regs.pc.into()),
            "sr" => Some(Value::U16(sr)),
            "ccr" => Some(self.regs.ccr().into()),
            "vbr" => Some(self.regs.vbr.into()),
            "sfc" => Some(self.regs.sfc.into()),
            "dfc" => Some(self.regs.dfc.into()),
            "cacr" => Some(self.regs.cacr.into()),
            "flags.x" => Some((sr & X != 0).into()),
            "flags.n" => Some((sr & N != 0).into()),
            "flags.z" => Some((sr & Z != 0).into()),
            "flags.v" => Some((sr & V != 0).into()),
            "flags.c" => Some((sr & C != 0).into()),
            "flags.s" => Some(self.regs.is_supervisor().into()),
            "flags.m" => Some(self.regs.is_master().into()),
            "int_mask" => Some(self.regs.interrupt_mask().into()),
            "halted" => Some(self.is_halted().into()),
            "stopped" => Some(self.is_stopped().into()),
            "cycles" => Some(self.cycles.into()),
            "instructions" => Some(self.instructions.into()),
            "opcode" => Some(Value::U16(self.opcode)),
            "model" => Some(self.model.name().into()),
            "mmu.tcr" => Some(Value::U16(self.mmu.tcr())),
            "mmu.urp" => Some(self.mmu.urp().into()),
            "mmu.srp" => Some(self.mmu.srp().into()),
            "mmu.mmusr" => Some(self.mmu.mmusr().into()),
            "mmu.walks" => Some(self.mmu.walk_count().into()),
            "mmu.enabled" => Some(self.mmu.enabled().into()),
            _ => None,
        }
    }

    fn query_paths(&self) -> &'static [&'static str] {
        QUERY_PATHS
    }
}
