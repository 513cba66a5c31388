//! Single-bit operations: BTST, BCHG, BCLR, BSET.
//!
//! Bits 7-6 select the operation. On a data register the bit number is
//! taken modulo 32, on memory modulo 8 (byte operand).

use crate::alu::Size;
use crate::bus::PhysBus;
use crate::cpu::Cpu;
use crate::ea::Operand;
use crate::fault::Outcome;
use crate::flags::{Status, Z};

impl Cpu {
    pub(super) fn exec_bit_dynamic(&mut self, bus: &mut dyn PhysBus) -> Outcome<()> {
        let bit = self.regs.d[self.reg_hi()];
        self.bit_operation(bus, bit)
    }

    pub(super) fn exec_bit_static(&mut self, bus: &mut dyn PhysBus) -> Outcome<()> {
        let bit = u32::from(self.fetch_word(bus)? & 0xFF);
        self.bit_operation(bus, bit)
    }

    fn bit_operation(&mut self, bus: &mut dyn PhysBus, bit: u32) -> Outcome<()> {
        let operand = self.resolve_ea(bus, Size::Byte)?;
        let size = if matches!(operand, Operand::DataReg(_)) {
            Size::Long
        } else {
            Size::Byte
        };
        let mask = 1u32 << (bit % size.bits());
        let value = self.read_operand(bus, operand, size)?;
        self.regs.sr = Status::set_if(self.regs.sr, Z, value & mask == 0);
        let result = match (self.opcode >> 6) & 3 {
            0 => return Ok(()),
            1 => value ^ mask,
            2 => value & !mask,
            _ => value | mask,
        };
        self.write_operand(bus, operand, size, result)
    }
}
