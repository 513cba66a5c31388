//! Program control: Bcc/BRA/BSR, DBcc, Scc, JMP, JSR, RTS, RTR, RTD.

use crate::alu::Size;
use crate::bus::PhysBus;
use crate::cpu::Cpu;
use crate::fault::Outcome;
use crate::flags::Status;

/// Clocks a taken branch adds for the pipeline refill.
const TAKEN_CYCLES: u32 = 2;

impl Cpu {
    fn condition(&self) -> bool {
        Status::condition(self.regs.sr, ((self.opcode >> 8) & 0xF) as u8)
    }

    /// Displacement after the opcode: 8-bit inline, 0x00 for a word, 0xFF
    /// for a long.
    fn branch_displacement(&mut self, bus: &mut dyn PhysBus) -> Outcome<u32> {
        Ok(match self.opcode & 0xFF {
            0x00 => Size::Word.sign_extend(u32::from(self.fetch_word(bus)?)),
            0xFF => self.fetch_long(bus)?,
            byte => Size::Byte.sign_extend(u32::from(byte)),
        })
    }

    pub(super) fn exec_bcc(&mut self, bus: &mut dyn PhysBus) -> Outcome<()> {
        let base = self.instr_pc.wrapping_add(2);
        let displacement = self.branch_displacement(bus)?;
        let target = base.wrapping_add(displacement);
        match (self.opcode >> 8) & 0xF {
            // BRA
            0 => {}
            // BSR
            1 => {
                // the push is not the last step, so a faulting push reruns
                self.restart_writes = true;
                let ret = self.regs.pc;
                self.push(bus, Size::Long, ret)?;
            }
            _ if !self.condition() => return Ok(()),
            _ => {}
        }
        self.extra_cycles += TAKEN_CYCLES;
        self.jump(target)
    }

    /// DBcc: when the condition is false, decrement Dn.W and branch
    /// unless it became -1.
    pub(super) fn exec_dbcc(&mut self, bus: &mut dyn PhysBus) -> Outcome<()> {
        let base = self.instr_pc.wrapping_add(2);
        let displacement = Size::Word.sign_extend(u32::from(self.fetch_word(bus)?));
        if self.condition() {
            return Ok(());
        }
        let r = self.reg_lo();
        let count = (self.regs.d[r] as u16).wrapping_sub(1);
        self.regs.d[r] = Size::Word.merge(self.regs.d[r], u32::from(count));
        if count == 0xFFFF {
            return Ok(());
        }
        self.extra_cycles += TAKEN_CYCLES;
        self.jump(base.wrapping_add(displacement))
    }

    pub(super) fn exec_scc(&mut self, bus: &mut dyn PhysBus) -> Outcome<()> {
        let operand = self.resolve_ea(bus, Size::Byte)?;
        let value = if self.condition() { 0xFF } else { 0 };
        self.write_operand(bus, operand, Size::Byte, value)
    }

    pub(super) fn exec_jmp(&mut self, bus: &mut dyn PhysBus) -> Outcome<()> {
        let target = self.control_address(bus)?;
        self.jump(target)
    }

    pub(super) fn exec_jsr(&mut self, bus: &mut dyn PhysBus) -> Outcome<()> {
        let target = self.control_address(bus)?;
        self.restart_writes = true;
        let ret = self.regs.pc;
        self.push(bus, Size::Long, ret)?;
        self.jump(target)
    }

    pub(super) fn exec_rts(&mut self, bus: &mut dyn PhysBus) -> Outcome<()> {
        let target = self.pop(bus, Size::Long)?;
        self.jump(target)
    }

    pub(super) fn exec_rtr(&mut self, bus: &mut dyn PhysBus) -> Outcome<()> {
        let ccr = self.pop(bus, Size::Word)?;
        let target = self.pop(bus, Size::Long)?;
        self.regs.set_ccr(ccr as u8);
        self.jump(target)
    }

    /// RTD #d: return, then drop `d` bytes of arguments.
    pub(super) fn exec_rtd(&mut self, bus: &mut dyn PhysBus) -> Outcome<()> {
        let displacement = Size::Word.sign_extend(u32::from(self.fetch_word(bus)?));
        let target = self.pop(bus, Size::Long)?;
        let sp = self.regs.a(7);
        self.regs.set_a(7, sp.wrapping_add(displacement));
        self.jump(target)
    }
}

#[cfg(test)]
mod tests {
    use crate::bus::FlatBus;
    use crate::cpu::Cpu;
    use crate::fault::vector;
    use crate::model::{CpuModel, FpuModel};

    fn boot(program: &[u16]) -> (Cpu, FlatBus) {
        let mut bus = FlatBus::new(0x10000);
        bus.poke32(0, 0x8000);
        bus.poke32(4, 0x400);
        bus.load_words(0x400, program);
        let mut cpu = Cpu::new(CpuModel::M68040, FpuModel::Internal).unwrap();
        cpu.reset(&mut bus).unwrap();
        (cpu, bus)
    }

    #[test]
    fn bra_short_and_word() {
        // BRA.S *+6 ; then at 0x406: BRA.W back to 0x400
        let (mut cpu, mut bus) = boot(&[0x6004, 0x4E71, 0x4E71, 0x6000, 0xFFF8]);
        cpu.step(&mut bus).unwrap();
        assert_eq!(cpu.regs.pc, 0x406);
        cpu.step(&mut bus).unwrap();
        assert_eq!(cpu.regs.pc, 0x400);
    }

    #[test]
    fn bsr_and_rts_round_trip() {
        // BSR.S +2 ; NOP ; RTS
        let (mut cpu, mut bus) = boot(&[0x6102, 0x4E71, 0x4E75]);
        cpu.step(&mut bus).unwrap();
        assert_eq!(cpu.regs.pc, 0x404);
        assert_eq!(bus.peek32(0x7FFC), 0x402);
        cpu.step(&mut bus).unwrap();
        assert_eq!(cpu.regs.pc, 0x402);
        assert_eq!(cpu.regs.a(7), 0x8000);
    }

    #[test]
    fn beq_not_taken_falls_through() {
        // BEQ.S +4 with Z clear
        let (mut cpu, mut bus) = boot(&[0x6704]);
        cpu.step(&mut bus).unwrap();
        assert_eq!(cpu.regs.pc, 0x402);
    }

    #[test]
    fn dbf_counts_down_to_minus_one() {
        // loop: DBF D0,loop
        let (mut cpu, mut bus) = boot(&[0x51C8, 0xFFFE]);
        cpu.regs.d[0] = 0xAAAA_0002;
        for _ in 0..3 {
            cpu.step(&mut bus).unwrap();
        }
        assert_eq!(cpu.regs.d[0], 0xAAAA_FFFF);
        assert_eq!(cpu.regs.pc, 0x404);
    }

    #[test]
    fn seq_writes_all_ones() {
        // SEQ D1 with Z set
        let (mut cpu, mut bus) = boot(&[0x57C1]);
        cpu.regs.sr |= crate::flags::Z;
        cpu.step(&mut bus).unwrap();
        assert_eq!(cpu.regs.d[1] & 0xFF, 0xFF);
    }

    #[test]
    fn rtd_drops_arguments() {
        // RTD #8
        let (mut cpu, mut bus) = boot(&[0x4E74, 0x0008]);
        cpu.regs.set_a(7, 0x7FF0);
        bus.poke32(0x7FF0, 0x600);
        cpu.step(&mut bus).unwrap();
        assert_eq!(cpu.regs.pc, 0x600);
        assert_eq!(cpu.regs.a(7), 0x7FFC);
    }

    #[test]
    fn jmp_to_odd_address_is_an_address_error() {
        // JMP (A0)
        let (mut cpu, mut bus) = boot(&[0x4ED0]);
        bus.poke32(u32::from(vector::ADDRESS_ERROR) * 4, 0x2000);
        cpu.regs.a[0] = 0x1001;
        cpu.step(&mut bus).unwrap();
        assert_eq!(cpu.regs.pc, 0x2000);
    }
}
