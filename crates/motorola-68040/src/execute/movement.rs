//! Data movement: MOVE, MOVEA, MOVEQ, LEA, PEA, EXG, SWAP, EXT, CLR,
//! MOVEM, LINK, UNLK.

use crate::alu::{self, Size};
use crate::bus::PhysBus;
use crate::cpu::Cpu;
use crate::ea::AddrMode;
use crate::fault::{Exception, Outcome, vector};

impl Cpu {
    // ================================================================
    // MOVE / MOVEA / MOVEQ
    // ================================================================
    //
    // Encoding: 00SS DDD MMM mmm rrr
    //   destination register DDD and mode MMM are swapped relative to the
    //   source field.

    pub(super) fn exec_move(&mut self, bus: &mut dyn PhysBus) -> Outcome<()> {
        let size = self.op_size();
        let src = self.resolve_ea(bus, size)?;
        let value = self.read_operand(bus, src, size)?;
        let dst_mode = AddrMode::decode(((self.opcode >> 6) & 7) as u8, ((self.opcode >> 9) & 7) as u8)
            .ok_or(Exception::Fault(vector::ILLEGAL))?;
        let dst = self.resolve(bus, dst_mode, size)?;
        self.regs.sr = alu::logic_flags(value, size, self.regs.sr);
        self.write_operand(bus, dst, size, value)
    }

    pub(super) fn exec_movea(&mut self, bus: &mut dyn PhysBus) -> Outcome<()> {
        let size = self.op_size();
        let src = self.resolve_ea(bus, size)?;
        let value = size.sign_extend(self.read_operand(bus, src, size)?);
        self.regs.set_a(self.reg_hi(), value);
        Ok(())
    }

    pub(super) fn exec_moveq(&mut self) -> Outcome<()> {
        let value = Size::Byte.sign_extend(u32::from(self.opcode));
        self.regs.d[self.reg_hi()] = value;
        self.regs.sr = alu::logic_flags(value, Size::Long, self.regs.sr);
        Ok(())
    }

    pub(super) fn exec_lea(&mut self, bus: &mut dyn PhysBus) -> Outcome<()> {
        let address = self.control_address(bus)?;
        self.regs.set_a(self.reg_hi(), address);
        Ok(())
    }

    pub(super) fn exec_pea(&mut self, bus: &mut dyn PhysBus) -> Outcome<()> {
        let address = self.control_address(bus)?;
        self.push(bus, Size::Long, address)
    }

    // ================================================================
    // Register shuffles
    // ================================================================

    pub(super) fn exec_exg(&mut self) -> Outcome<()> {
        let (rx, ry) = (self.reg_hi(), self.reg_lo());
        match (self.opcode >> 3) & 0x1F {
            0b01000 => self.regs.d.swap(rx, ry),
            0b01001 => {
                let (x, y) = (self.regs.a(rx), self.regs.a(ry));
                self.regs.set_a(rx, y);
                self.regs.set_a(ry, x);
            }
            0b10001 => {
                let (x, y) = (self.regs.d[rx], self.regs.a(ry));
                self.regs.d[rx] = y;
                self.regs.set_a(ry, x);
            }
            _ => return Err(Exception::Fault(vector::ILLEGAL)),
        }
        Ok(())
    }

    pub(super) fn exec_swap(&mut self) -> Outcome<()> {
        let r = self.reg_lo();
        let value = self.regs.d[r].rotate_left(16);
        self.regs.d[r] = value;
        self.regs.sr = alu::logic_flags(value, Size::Long, self.regs.sr);
        Ok(())
    }

    /// EXT.W, EXT.L and EXTB.L.
    pub(super) fn exec_ext(&mut self) -> Outcome<()> {
        let r = self.reg_lo();
        let old = self.regs.d[r];
        let (value, size) = match (self.opcode >> 6) & 7 {
            0b010 => (Size::Word.merge(old, Size::Byte.sign_extend(old)), Size::Word),
            0b011 => (Size::Word.sign_extend(old), Size::Long),
            _ => (Size::Byte.sign_extend(old), Size::Long),
        };
        self.regs.d[r] = value;
        self.regs.sr = alu::logic_flags(value, size, self.regs.sr);
        Ok(())
    }

    pub(super) fn exec_clr(&mut self, bus: &mut dyn PhysBus) -> Outcome<()> {
        let size = self.op_size();
        let dst = self.resolve_ea(bus, size)?;
        self.regs.sr = alu::logic_flags(0, size, self.regs.sr);
        self.write_operand(bus, dst, size, 0)
    }

    // ================================================================
    // MOVEM
    // ================================================================
    //
    // Encoding: 0100 1D00 1S mmm rrr + register mask
    //   D = 1 memory to registers. The mask is reversed for -(An):
    //   bit 0 is A7 and bit 15 is D0.

    pub(super) fn exec_movem(&mut self, bus: &mut dyn PhysBus) -> Outcome<()> {
        let size = self.op_size();
        let to_registers = self.opcode & 0x0400 != 0;
        let mask = self.fetch_word(bus)?;
        let mode = AddrMode::from_opcode(self.opcode).ok_or(Exception::Fault(vector::ILLEGAL))?;
        // each transfer is restarted as a whole
        self.restart_writes = true;
        let step = size.bytes();

        match (mode, to_registers) {
            (AddrMode::AddrIndPreDec(r), false) => {
                let r = usize::from(r);
                let start = self.regs.a(r);
                self.fixups.record(r as u8, start);
                let mut address = start;
                for bit in 0..16 {
                    if mask & (1 << bit) == 0 {
                        continue;
                    }
                    let reg = 15 - bit;
                    address = address.wrapping_sub(step);
                    let value = if reg == 8 + r {
                        start.wrapping_sub(step)
                    } else {
                        self.movem_register(reg)
                    };
                    self.write_data(bus, address, size, value)?;
                }
                self.regs.set_a(r, address);
            }
            (AddrMode::AddrIndPostInc(r), true) => {
                let r = usize::from(r);
                let start = self.regs.a(r);
                self.fixups.record(r as u8, start);
                let address = self.movem_load(bus, mask, start, size)?;
                self.regs.set_a(r, address);
            }
            (_, true) => {
                let start = self.control_address(bus)?;
                self.movem_load(bus, mask, start, size)?;
            }
            (_, false) => {
                let mut address = self.control_address(bus)?;
                for reg in 0..16 {
                    if mask & (1 << reg) == 0 {
                        continue;
                    }
                    let value = self.movem_register(reg);
                    self.write_data(bus, address, size, value)?;
                    address = address.wrapping_add(step);
                }
            }
        }
        Ok(())
    }

    fn movem_register(&self, reg: usize) -> u32 {
        if reg < 8 { self.regs.d[reg] } else { self.regs.a(reg - 8) }
    }

    /// Load registers in mask order; words are sign-extended. Returns the
    /// address after the last transfer.
    fn movem_load(&mut self, bus: &mut dyn PhysBus, mask: u16, start: u32, size: Size) -> Outcome<u32> {
        let mut address = start;
        for reg in 0..16 {
            if mask & (1 << reg) == 0 {
                continue;
            }
            let value = size.sign_extend(self.read_data(bus, address, size)?);
            if reg < 8 {
                self.regs.d[reg] = value;
            } else {
                self.regs.set_a(reg - 8, value);
            }
            address = address.wrapping_add(size.bytes());
        }
        Ok(address)
    }

    // ================================================================
    // LINK / UNLK
    // ================================================================

    pub(super) fn exec_link(&mut self, bus: &mut dyn PhysBus) -> Outcome<()> {
        let r = self.reg_lo();
        let displacement = match self.op_size() {
            Size::Long => self.fetch_long(bus)?,
            _ => Size::Word.sign_extend(u32::from(self.fetch_word(bus)?)),
        };
        let frame = self.regs.a(r);
        // An and SP change after the push
        self.restart_writes = true;
        self.push(bus, Size::Long, frame)?;
        let sp = self.regs.a(7);
        self.fixups.record(r as u8, frame);
        self.regs.set_a(r, sp);
        self.regs.set_a(7, sp.wrapping_add(displacement));
        Ok(())
    }

    pub(super) fn exec_unlk(&mut self, bus: &mut dyn PhysBus) -> Outcome<()> {
        let r = self.reg_lo();
        let frame = self.regs.a(r);
        self.fixups.record(7, self.regs.a(7));
        self.fixups.record(r as u8, frame);
        let saved = self.read_data(bus, frame, Size::Long)?;
        self.regs.set_a(7, frame.wrapping_add(4));
        self.regs.set_a(r, saved);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::bus::FlatBus;
    use crate::cpu::Cpu;
    use crate::flags::{N, Z};
    use crate::model::{CpuModel, FpuModel};

    fn run(program: &[u16], setup: impl FnOnce(&mut Cpu)) -> (Cpu, FlatBus) {
        let mut bus = FlatBus::new(0x10000);
        bus.poke32(0, 0x8000);
        bus.poke32(4, 0x400);
        bus.load_words(0x400, program);
        let mut cpu = Cpu::new(CpuModel::M68040, FpuModel::Internal).unwrap();
        cpu.reset(&mut bus).unwrap();
        setup(&mut cpu);
        while cpu.regs.pc < 0x400 + 2 * program.len() as u32 {
            cpu.step(&mut bus).unwrap();
        }
        (cpu, bus)
    }

    #[test]
    fn moveq_sign_extends_and_sets_n() {
        // MOVEQ #-1,D2
        let (cpu, _) = run(&[0x74FF], |_| {});
        assert_eq!(cpu.regs.d[2], 0xFFFF_FFFF);
        assert_ne!(cpu.regs.sr & N, 0);
    }

    #[test]
    fn move_word_to_memory_and_back() {
        // MOVE.W D1,(A0) ; MOVE.W (A0),D2
        let (cpu, bus) = run(&[0x3081, 0x3410], |cpu| {
            cpu.regs.d[1] = 0xAAAA_1234;
            cpu.regs.a[0] = 0x2000;
        });
        assert_eq!(bus.peek16(0x2000), 0x1234);
        assert_eq!(cpu.regs.d[2] & 0xFFFF, 0x1234);
    }

    #[test]
    fn clr_sets_z() {
        // CLR.L D5
        let (cpu, _) = run(&[0x4285], |cpu| cpu.regs.d[5] = 7);
        assert_eq!(cpu.regs.d[5], 0);
        assert_ne!(cpu.regs.sr & Z, 0);
    }

    #[test]
    fn movem_predec_round_trip() {
        // MOVEM.L D0-D1/A1,-(A7) ; MOVEM.L (A7)+,D2-D3/A2
        let (cpu, bus) = run(&[0x48E7, 0xC040, 0x4CDF, 0x040C], |cpu| {
            cpu.regs.d[0] = 0x1111_1111;
            cpu.regs.d[1] = 0x2222_2222;
            cpu.regs.a[1] = 0x3333_3333;
        });
        assert_eq!(cpu.regs.d[2], 0x1111_1111);
        assert_eq!(cpu.regs.d[3], 0x2222_2222);
        assert_eq!(cpu.regs.a[2], 0x3333_3333);
        assert_eq!(cpu.regs.a(7), 0x8000);
        assert_eq!(bus.peek32(0x8000 - 12), 0x1111_1111);
    }

    #[test]
    fn link_and_unlk_restore_the_frame() {
        // LINK A6,#-8 ; UNLK A6
        let (cpu, _) = run(&[0x4E56, 0xFFF8, 0x4E5E], |cpu| cpu.regs.a[6] = 0xABCD);
        assert_eq!(cpu.regs.a[6], 0xABCD);
        assert_eq!(cpu.regs.a(7), 0x8000);
    }

    #[test]
    fn ext_variants() {
        // EXT.W D0 ; EXTB.L D1 ; EXT.L D2
        let (cpu, _) = run(&[0x4880, 0x49C1, 0x48C2], |cpu| {
            cpu.regs.d[0] = 0x1234_5680;
            cpu.regs.d[1] = 0x0000_0080;
            cpu.regs.d[2] = 0x0000_8000;
        });
        assert_eq!(cpu.regs.d[0], 0x1234_FF80);
        assert_eq!(cpu.regs.d[1], 0xFFFF_FF80);
        assert_eq!(cpu.regs.d[2], 0xFFFF_8000);
    }
}
