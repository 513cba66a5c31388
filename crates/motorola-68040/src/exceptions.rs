//! Exception processing.
//!
//! An [`Exception`] raised by an instruction becomes an
//! [`ExceptionContext`], then a model-specific frame on the supervisor
//! stack, then a jump through the vector table. A fault while doing that
//! is delivered as a nested bus error; a fault while delivering a bus or
//! address error halts the CPU.

use tracing::{debug, error, warn};

use crate::alu::Size;
use crate::bus::{FunctionCode, InterruptAck, PhysBus};
use crate::cpu::{Cpu, RunState};
use crate::error::CpuError;
use crate::flags::{M, S, SR_MASK, TRACE_MASK};
use crate::fault::{Exception, ExceptionContext, Outcome, Width, vector};
use crate::frame::{self, FrameFormat, WB_VALID, ssw030};

/// Clocks charged for taking any exception, on top of its bus traffic.
pub const EXCEPTION_CYCLES: u32 = 20;

/// Where the exception engine is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExceptionState {
    #[default]
    Running,
    Faulting,
    FrameBuilding,
    VectorDispatch,
    DoubleFault,
}

/// Vectors after which a pending trace survives into the handler.
fn keeps_trace(v: u8) -> bool {
    matches!(v, vector::ZERO_DIVIDE | vector::CHK | vector::TRAPV)
        || (vector::TRAP_BASE..vector::TRAP_BASE + 16).contains(&v)
}

fn fault_address(exception: &Exception) -> u32 {
    match *exception {
        Exception::Access(fault) => fault.address,
        Exception::AddressError { address, .. } => address,
        _ => 0,
    }
}

/// Exceptions that restart the faulting instruction from scratch.
fn restarts(exception: &Exception, writeback: bool) -> bool {
    match exception {
        Exception::Access(_) => !writeback,
        Exception::AddressError { .. } | Exception::Fault(_) | Exception::FpUnimplemented { .. } => {
            true
        }
        _ => false,
    }
}

fn wb_size(status: u16) -> Size {
    match (status >> 5) & 3 {
        1 => Size::Byte,
        2 => Size::Word,
        _ => Size::Long,
    }
}

impl Cpu {
    fn context(&self, exception: &Exception) -> ExceptionContext {
        let mut ctx = ExceptionContext {
            old_pc: self.instr_pc,
            opcode: self.opcode,
            stage_b: self.stage_b,
            ..ExceptionContext::new(exception.vector(), self.regs.pc, self.regs.sr)
        };
        match *exception {
            Exception::Access(fault) => {
                ctx.address = fault.address;
                ctx.write = fault.write;
                ctx.width = fault.width;
                ctx.fc = fault.fc;
                ctx.data = fault.data;
                ctx.atc = fault.atc;
                ctx.instruction = fault.instruction;
                ctx.locked = fault.locked;
                ctx.writeback = fault.write && !self.restart_writes;
            }
            Exception::AddressError { address, fc, write } => {
                ctx.address = address;
                ctx.fc = fc;
                ctx.write = write;
                ctx.width = Width::Word;
                ctx.instruction = fc.is_program();
            }
            Exception::InstructionTrap(_) => ctx.address = self.instr_pc,
            Exception::FpPostInstruction { ea, .. }
            | Exception::FpUnimplemented { ea }
            | Exception::CoprocessorMidInstruction { ea, .. } => ctx.address = ea,
            Exception::Fault(_) | Exception::Trap(_) => {}
        }
        if restarts(exception, ctx.writeback) {
            ctx.pc = self.instr_pc;
            ctx.sr = self.instr_sr;
        }
        ctx
    }

    /// Deliver an exception raised by the current instruction.
    pub(crate) fn raise(&mut self, bus: &mut dyn PhysBus, exception: Exception) -> Result<(), CpuError> {
        self.exception_state = ExceptionState::Faulting;
        let ctx = self.context(&exception);
        if restarts(&exception, ctx.writeback) {
            self.fixups.rollback(&mut self.regs);
            self.regs.sr = self.instr_sr;
        }
        if self.instr_sr & TRACE_MASK != 0 && keeps_trace(ctx.vector) {
            self.trace_deferred = true;
        }
        debug!(
            vector = ctx.vector,
            pc = format_args!("{:#010X}", ctx.old_pc),
            address = format_args!("{:#010X}", ctx.address),
            "exception: raise"
        );
        let result = self.enter(bus, &exception, &ctx);
        self.settle(bus, &exception, &ctx, result)
    }

    /// Finish exception processing, escalating a nested fault.
    fn settle(
        &mut self,
        bus: &mut dyn PhysBus,
        outer: &Exception,
        ctx: &ExceptionContext,
        result: Outcome<()>,
    ) -> Result<(), CpuError> {
        let Err(nested) = result else {
            self.exception_state = ExceptionState::Running;
            return Ok(());
        };
        if outer.is_bus_or_address() {
            self.exception_state = ExceptionState::DoubleFault;
            self.state = RunState::Halted;
            let address = fault_address(&nested);
            error!(
                vector = ctx.vector,
                address = format_args!("{address:#010X}"),
                pc = format_args!("{:#010X}", ctx.old_pc),
                "exception: double fault, CPU halted"
            );
            return Err(CpuError::DoubleFault {
                vector: ctx.vector,
                address,
                pc: ctx.old_pc,
            });
        }
        warn!(
            vector = ctx.vector,
            nested = nested.vector(),
            "exception: fault during exception processing"
        );
        let nested_ctx = ExceptionContext {
            sr: ctx.sr,
            pc: ctx.pc,
            old_pc: ctx.old_pc,
            writeback: false,
            ..self.context(&nested)
        };
        let result = self.enter(bus, &nested, &nested_ctx);
        self.settle(bus, &nested, &nested_ctx, result)
    }

    fn enter(&mut self, bus: &mut dyn PhysBus, exception: &Exception, ctx: &ExceptionContext) -> Outcome<()> {
        self.exception_state = ExceptionState::FrameBuilding;
        self.regs.sr = (self.regs.sr | S) & !TRACE_MASK;
        let format = frame::select(exception, self.model());
        self.push_frame(bus, format, ctx)?;
        self.exception_state = ExceptionState::VectorDispatch;
        self.jump_to_vector(bus, ctx.vector)
    }

    fn push_frame(&mut self, bus: &mut dyn PhysBus, format: FrameFormat, ctx: &ExceptionContext) -> Outcome<()> {
        let image = frame::image(format, ctx);
        let size = format.size();
        let sp = self.regs.reserve_stack(size);
        for offset in (0..size).step_by(4) {
            let value = frame::long_at(&image, offset as usize);
            self.write_fc(bus, sp.wrapping_add(offset), Size::Long, value, FunctionCode::SupervisorData)?;
        }
        Ok(())
    }

    fn jump_to_vector(&mut self, bus: &mut dyn PhysBus, vector: u8) -> Outcome<()> {
        let slot = self.regs.vbr.wrapping_add(u32::from(vector) * 4);
        let handler = self.read_fc(bus, slot, Size::Long, FunctionCode::SupervisorData)?;
        if handler & 1 != 0 {
            return Err(Exception::AddressError {
                address: handler,
                fc: FunctionCode::SupervisorProgram,
                write: false,
            });
        }
        self.regs.pc = handler;
        self.state = RunState::Running;
        Ok(())
    }

    /// Take an interrupt at `level`, acknowledging it on the bus.
    pub(crate) fn take_interrupt(&mut self, bus: &mut dyn PhysBus, level: u8) -> Result<(), CpuError> {
        if level == 7 {
            self.nmi_latched = false;
        }
        let vector = match bus.interrupt_ack(level) {
            InterruptAck::Autovector => vector::AUTOVECTOR_BASE + level,
            InterruptAck::Vector(v) => v,
            InterruptAck::Spurious => vector::SPURIOUS,
            InterruptAck::Uninitialized => vector::UNINITIALIZED,
        };
        debug!(level, vector, "exception: interrupt");
        self.state = RunState::Running;
        self.exception_state = ExceptionState::Faulting;
        let ctx = ExceptionContext::new(vector, self.regs.pc, self.regs.sr);
        let result = self.enter_interrupt(bus, level, &ctx);
        self.settle(bus, &Exception::Fault(vector), &ctx, result)
    }

    fn enter_interrupt(&mut self, bus: &mut dyn PhysBus, level: u8, ctx: &ExceptionContext) -> Outcome<()> {
        self.exception_state = ExceptionState::FrameBuilding;
        self.regs.sr = (self.regs.sr | S) & !TRACE_MASK;
        self.regs.set_interrupt_mask(level);
        self.push_frame(bus, FrameFormat::Normal, ctx)?;
        if self.regs.is_master() {
            let throwaway = ExceptionContext {
                sr: self.regs.sr,
                ..*ctx
            };
            self.regs.sr &= !M;
            self.push_frame(bus, FrameFormat::Throwaway, &throwaway)?;
        }
        self.exception_state = ExceptionState::VectorDispatch;
        self.jump_to_vector(bus, ctx.vector)
    }

    /// RTE: unwind one frame (two for a throwaway frame).
    pub(crate) fn exec_rte(&mut self, bus: &mut dyn PhysBus) -> Outcome<()> {
        self.require_supervisor()?;
        // write-back faults restart the RTE itself
        self.restart_writes = true;
        loop {
            let sp = self.regs.active_sp();
            let sr = self.read_fc(bus, sp, Size::Word, FunctionCode::SupervisorData)? as u16;
            let pc = self.read_fc(bus, sp.wrapping_add(2), Size::Long, FunctionCode::SupervisorData)?;
            let format_word = self.read_fc(bus, sp.wrapping_add(6), Size::Word, FunctionCode::SupervisorData)?;
            let model = self.model();
            let format = FrameFormat::from_nibble((format_word as u16) >> 12)
                .filter(|f| f.valid_for(model))
                .ok_or(Exception::Fault(vector::FORMAT_ERROR))?;
            match format {
                FrameFormat::AccessError => self.complete_writebacks(bus, sp)?,
                FrameFormat::ShortBusFault | FrameFormat::LongBusFault => {
                    self.rerun_data_fault(bus, sp)?;
                }
                _ => {}
            }
            self.regs.release_stack(format.size());
            self.regs.sr = sr & SR_MASK;
            if format == FrameFormat::Throwaway {
                continue;
            }
            self.regs.pc = pc;
            self.flow_changed = true;
            return Ok(());
        }
    }

    /// Format 7: perform valid write-backs, WB3 first.
    fn complete_writebacks(&mut self, bus: &mut dyn PhysBus, sp: u32) -> Outcome<()> {
        const SLOTS: [(u32, u32, u32); 3] = [(14, 24, 28), (16, 32, 36), (18, 40, 44)];
        for (status_at, address_at, data_at) in SLOTS {
            let status = self.read_fc(bus, sp.wrapping_add(status_at), Size::Word, FunctionCode::SupervisorData)? as u16;
            if status & WB_VALID == 0 {
                continue;
            }
            let address = self.read_fc(bus, sp.wrapping_add(address_at), Size::Long, FunctionCode::SupervisorData)?;
            let data = self.read_fc(bus, sp.wrapping_add(data_at), Size::Long, FunctionCode::SupervisorData)?;
            let fc = FunctionCode::from_bits((status & 7) as u8);
            debug!(address = format_args!("{address:#010X}"), status, "exception: write-back");
            self.write_fc(bus, address, wb_size(status), data, fc)?;
        }
        Ok(())
    }

    /// Format A/B: redo a faulted operand write from the data output buffer.
    fn rerun_data_fault(&mut self, bus: &mut dyn PhysBus, sp: u32) -> Outcome<()> {
        let ssw = self.read_fc(bus, sp.wrapping_add(0x0A), Size::Word, FunctionCode::SupervisorData)? as u16;
        if ssw & ssw030::DF == 0 || ssw & ssw030::RW != 0 {
            return Ok(());
        }
        let address = self.read_fc(bus, sp.wrapping_add(0x10), Size::Long, FunctionCode::SupervisorData)?;
        let data = self.read_fc(bus, sp.wrapping_add(0x18), Size::Long, FunctionCode::SupervisorData)?;
        let size = match (ssw >> ssw030::SIZE_SHIFT) & 3 {
            1 => Size::Byte,
            2 => Size::Word,
            _ => Size::Long,
        };
        let fc = FunctionCode::from_bits((ssw & ssw030::FC_MASK) as u8);
        self.write_fc(bus, address, size, data, fc)
    }
}
