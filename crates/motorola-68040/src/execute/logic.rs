//! Logic: AND, OR, EOR, NOT and the immediate forms, including the CCR
//! and SR variants.

use crate::alu::{self, Size};
use crate::bus::PhysBus;
use crate::cpu::Cpu;
use crate::decode::Family;
use crate::fault::{Exception, Outcome, vector};

#[derive(Debug, Clone, Copy)]
enum LogicOp {
    And,
    Or,
    Eor,
}

impl LogicOp {
    /// Operation selected by bits 11-9 of the immediate forms.
    fn from_immediate(opcode: u16) -> Option<Self> {
        match (opcode >> 9) & 7 {
            0b000 => Some(Self::Or),
            0b001 => Some(Self::And),
            0b101 => Some(Self::Eor),
            _ => None,
        }
    }

    fn apply(self, a: u32, b: u32) -> u32 {
        match self {
            Self::And => a & b,
            Self::Or => a | b,
            Self::Eor => a ^ b,
        }
    }
}

impl Cpu {
    /// AND/OR: bit 8 selects Dn op <ea> -> <ea>.
    pub(super) fn exec_and_or(&mut self, bus: &mut dyn PhysBus, is_and: bool) -> Outcome<()> {
        let op = if is_and { LogicOp::And } else { LogicOp::Or };
        let size = self.op_size();
        let reg = self.reg_hi();
        let operand = self.resolve_ea(bus, size)?;
        let value = self.read_operand(bus, operand, size)?;
        let result = op.apply(value, self.regs.d[reg]) & size.mask();
        self.regs.sr = alu::logic_flags(result, size, self.regs.sr);
        if self.opcode & 0x0100 != 0 {
            self.write_operand(bus, operand, size, result)
        } else {
            self.regs.d[reg] = size.merge(self.regs.d[reg], result);
            Ok(())
        }
    }

    pub(super) fn exec_eor(&mut self, bus: &mut dyn PhysBus) -> Outcome<()> {
        let size = self.op_size();
        let operand = self.resolve_ea(bus, size)?;
        let value = self.read_operand(bus, operand, size)?;
        let result = (value ^ self.regs.d[self.reg_hi()]) & size.mask();
        self.regs.sr = alu::logic_flags(result, size, self.regs.sr);
        self.write_operand(bus, operand, size, result)
    }

    pub(super) fn exec_not(&mut self, bus: &mut dyn PhysBus) -> Outcome<()> {
        let size = self.op_size();
        let operand = self.resolve_ea(bus, size)?;
        let result = !self.read_operand(bus, operand, size)? & size.mask();
        self.regs.sr = alu::logic_flags(result, size, self.regs.sr);
        self.write_operand(bus, operand, size, result)
    }

    /// ANDI/ORI/EORI to <ea>.
    pub(super) fn exec_logic_immediate(&mut self, bus: &mut dyn PhysBus, family: Family) -> Outcome<()> {
        let op = match family {
            Family::Andi => LogicOp::And,
            Family::Eori => LogicOp::Eor,
            _ => LogicOp::Or,
        };
        let size = self.op_size();
        let imm = self.fetch_immediate(bus, size)?;
        let operand = self.resolve_ea(bus, size)?;
        let value = self.read_operand(bus, operand, size)?;
        let result = op.apply(value, imm) & size.mask();
        self.regs.sr = alu::logic_flags(result, size, self.regs.sr);
        self.write_operand(bus, operand, size, result)
    }

    pub(super) fn exec_logic_to_ccr(&mut self, bus: &mut dyn PhysBus) -> Outcome<()> {
        let op = LogicOp::from_immediate(self.opcode).ok_or(Exception::Fault(vector::ILLEGAL))?;
        let imm = self.fetch_immediate(bus, Size::Byte)?;
        let ccr = op.apply(u32::from(self.regs.ccr()), imm);
        self.regs.set_ccr(ccr as u8);
        Ok(())
    }

    /// Privileged; may leave supervisor mode or set trace.
    pub(super) fn exec_logic_to_sr(&mut self, bus: &mut dyn PhysBus) -> Outcome<()> {
        self.require_supervisor()?;
        let op = LogicOp::from_immediate(self.opcode).ok_or(Exception::Fault(vector::ILLEGAL))?;
        let imm = self.fetch_immediate(bus, Size::Word)?;
        let sr = op.apply(u32::from(self.regs.sr), imm);
        self.set_sr(sr as u16);
        Ok(())
    }
}
