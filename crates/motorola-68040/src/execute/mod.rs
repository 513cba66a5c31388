//! Instruction execution.
//!
//! One `exec_*` method per instruction family, spread over submodules by
//! instruction group. Handlers read their fields straight from
//! `self.opcode`, fetch extension words through the effective-address
//! engine and return an [`Outcome`]; a fault anywhere unwinds with `?`.

mod arith;
mod bits;
mod branches;
pub mod fpu;
mod logic;
mod mmu_ops;
mod movement;
mod shifts;
mod system;

use crate::alu::Size;
use crate::bus::PhysBus;
use crate::cpu::Cpu;
use crate::decode::{self, Family};
use crate::fault::{Exception, Outcome, vector};
use crate::flags::SR_MASK;

impl Cpu {
    /// Run the handler for a decoded family.
    pub(crate) fn execute_family(&mut self, bus: &mut dyn PhysBus, family: Family) -> Outcome<()> {
        match family {
            Family::Move => self.exec_move(bus),
            Family::Movea => self.exec_movea(bus),
            Family::Moveq => self.exec_moveq(),
            Family::Lea => self.exec_lea(bus),
            Family::Pea => self.exec_pea(bus),
            Family::Exg => self.exec_exg(),
            Family::Swap => self.exec_swap(),
            Family::Ext => self.exec_ext(),
            Family::Clr => self.exec_clr(bus),
            Family::Movem => self.exec_movem(bus),
            Family::Link => self.exec_link(bus),
            Family::Unlk => self.exec_unlk(bus),
            Family::MoveToSr => self.exec_move_to_sr(bus),
            Family::MoveFromSr => self.exec_move_from_sr(bus),
            Family::MoveToCcr => self.exec_move_to_ccr(bus),
            Family::MoveFromCcr => self.exec_move_from_ccr(bus),
            Family::MoveUsp => self.exec_move_usp(),
            Family::Movec => self.exec_movec(bus),
            Family::Moves => self.exec_moves(bus),
            Family::Add | Family::Sub => self.exec_add_sub(bus, family == Family::Add),
            Family::Adda | Family::Suba => self.exec_adda_suba(bus, family == Family::Adda),
            Family::Addi | Family::Subi => self.exec_addi_subi(bus, family == Family::Addi),
            Family::Addq | Family::Subq => self.exec_addq_subq(bus, family == Family::Addq),
            Family::Addx | Family::Subx => self.exec_addx_subx(bus, family == Family::Addx),
            Family::Cmp => self.exec_cmp(bus),
            Family::Cmpa => self.exec_cmpa(bus),
            Family::Cmpi => self.exec_cmpi(bus),
            Family::Cmpm => self.exec_cmpm(bus),
            Family::Neg | Family::Negx => self.exec_neg(bus, family == Family::Negx),
            Family::Not => self.exec_not(bus),
            Family::Tst => self.exec_tst(bus),
            Family::Tas => self.exec_tas(bus),
            Family::MulW => self.exec_mul_word(bus),
            Family::MulL => self.exec_mul_long(bus),
            Family::DivW => self.exec_div_word(bus),
            Family::DivL => self.exec_div_long(bus),
            Family::Abcd | Family::Sbcd => self.exec_abcd_sbcd(bus, family == Family::Abcd),
            Family::Nbcd => self.exec_nbcd(bus),
            Family::And | Family::Or => self.exec_and_or(bus, family == Family::And),
            Family::Eor => self.exec_eor(bus),
            Family::Andi | Family::Ori | Family::Eori => self.exec_logic_immediate(bus, family),
            Family::LogicToCcr => self.exec_logic_to_ccr(bus),
            Family::LogicToSr => self.exec_logic_to_sr(bus),
            Family::BitDynamic => self.exec_bit_dynamic(bus),
            Family::BitStatic => self.exec_bit_static(bus),
            Family::ShiftRegister => self.exec_shift_register(),
            Family::ShiftMemory => self.exec_shift_memory(bus),
            Family::Bcc => self.exec_bcc(bus),
            Family::Dbcc => self.exec_dbcc(bus),
            Family::Scc => self.exec_scc(bus),
            Family::Jmp => self.exec_jmp(bus),
            Family::Jsr => self.exec_jsr(bus),
            Family::Rts => self.exec_rts(bus),
            Family::Rtr => self.exec_rtr(bus),
            Family::Rte => self.exec_rte(bus),
            Family::Rtd => self.exec_rtd(bus),
            Family::Trap => Err(Exception::Trap(vector::TRAP_BASE + (self.opcode & 0xF) as u8)),
            Family::Trapv => self.exec_trapv(),
            Family::Chk => self.exec_chk(bus),
            Family::Stop => self.exec_stop(bus),
            Family::Reset => self.exec_reset(bus),
            Family::Nop => Ok(()),
            Family::Cache040 => self.exec_cache040(),
            Family::Pflush040 => self.exec_pflush040(),
            Family::Ptest040 => self.exec_ptest040(bus),
            Family::Move16 => self.exec_move16(bus),
            Family::Pmmu030 => self.exec_pmmu030(bus),
            Family::FpuGeneral => self.exec_fpu_general(bus),
            Family::FpuSave => self.exec_fsave(bus),
            Family::FpuRestore => self.exec_frestore(bus),
            Family::FpuUnimplemented => self.exec_fpu_unimplemented(bus),
        }
    }

    /// Operand size from the descriptor, long when it has none.
    pub(crate) fn op_size(&self) -> Size {
        decode::descriptor(self.opcode)
            .and_then(|d| d.size)
            .unwrap_or(Size::Long)
    }

    /// Data register number in bits 11-9.
    pub(crate) fn reg_hi(&self) -> usize {
        usize::from((self.opcode >> 9) & 7)
    }

    /// Register number in bits 2-0.
    pub(crate) fn reg_lo(&self) -> usize {
        usize::from(self.opcode & 7)
    }

    /// Immediate operand following the opcode (bytes occupy a full word).
    pub(crate) fn fetch_immediate(&mut self, bus: &mut dyn PhysBus, size: Size) -> Outcome<u32> {
        Ok(match size {
            Size::Byte => u32::from(self.fetch_word(bus)?) & 0xFF,
            Size::Word => u32::from(self.fetch_word(bus)?),
            Size::Long => self.fetch_long(bus)?,
        })
    }

    pub(crate) fn require_supervisor(&self) -> Outcome<()> {
        if self.regs.is_supervisor() {
            Ok(())
        } else {
            Err(Exception::Fault(vector::PRIVILEGE))
        }
    }

    /// Load SR, keeping only implemented bits. Clearing S or changing M
    /// switches the active stack pointer.
    pub(crate) fn set_sr(&mut self, value: u16) {
        self.regs.sr = value & SR_MASK;
    }

    /// Set PC and note the change of flow.
    pub(crate) fn jump(&mut self, target: u32) -> Outcome<()> {
        if target & 1 != 0 {
            return Err(Exception::AddressError {
                address: target,
                fc: self.program_fc(),
                write: false,
            });
        }
        self.regs.pc = target;
        self.flow_changed = true;
        Ok(())
    }
}
