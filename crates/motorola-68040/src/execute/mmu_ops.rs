//! Cache, MMU and line-transfer instructions: CINV/CPUSH, PFLUSH and
//! PTEST (68040), MOVE16, and the 68030 PMMU coprocessor group.

use tracing::{debug, trace};

use crate::alu::Size;
use crate::bus::{FunctionCode, PhysBus};
use crate::cpu::Cpu;
use crate::ea::{AddrMode, Operand};
use crate::fault::{Exception, Outcome, Width, vector};
use crate::mmu::Access;
use crate::mmu::pmmu030::PmmuRegister;

const LINE_BYTES: u32 = 16;

impl Cpu {
    // ================================================================
    // 68040
    // ================================================================

    /// CINV/CPUSH. Caches are not modelled; the instruction only checks
    /// privilege.
    pub(super) fn exec_cache040(&mut self) -> Outcome<()> {
        self.require_supervisor()?;
        trace!(opcode = format_args!("{:#06X}", self.opcode), "cache: invalidate/push ignored");
        Ok(())
    }

    /// PFLUSH: bits 4-3 select 00 PFLUSHN (An), 01 PFLUSH (An),
    /// 10 PFLUSHAN, 11 PFLUSHA. The mode searched comes from DFC.
    pub(super) fn exec_pflush040(&mut self) -> Outcome<()> {
        self.require_supervisor()?;
        let supervisor = FunctionCode::from_bits(self.regs.dfc).is_supervisor();
        let address = self.regs.a(self.reg_lo());
        match (self.opcode >> 3) & 3 {
            0 => self.mmu.flush(address, supervisor, false),
            1 => self.mmu.flush(address, supervisor, true),
            2 => self.mmu.flush_all(false),
            _ => self.mmu.flush_all(true),
        }
        Ok(())
    }

    /// PTESTR/PTESTW (An): bit 5 set tests a read. Result in MMUSR.
    pub(super) fn exec_ptest040(&mut self, bus: &mut dyn PhysBus) -> Outcome<()> {
        self.require_supervisor()?;
        let write = self.opcode & 0x0020 == 0;
        let address = self.regs.a(self.reg_lo());
        let fc = FunctionCode::from_bits(self.regs.dfc);
        self.mmu.ptest(bus, address, fc, write);
        debug!(
            address = format_args!("{address:#010X}"),
            mmusr = format_args!("{:#010X}", self.mmu.mmusr()),
            "mmu: ptest"
        );
        Ok(())
    }

    /// MOVE16: copy one aligned 16-byte line.
    ///
    /// `1111 0110 0010 0xxx` + `1yyy 0000 0000 0000` is (Ax)+,(Ay)+.
    /// `1111 0110 000m mrrr` + absolute long is one of
    /// 00 (Ay)+,(xxx) / 01 (xxx),(Ay)+ / 10 (Ay),(xxx) / 11 (xxx),(Ay).
    pub(super) fn exec_move16(&mut self, bus: &mut dyn PhysBus) -> Outcome<()> {
        self.restart_writes = true;
        let ax = self.reg_lo();
        let (source, dest) = if self.opcode & 0x0020 != 0 {
            let ext = self.fetch_word(bus)?;
            let ay = usize::from((ext >> 12) & 7);
            let source = self.regs.a(ax);
            let dest = self.regs.a(ay);
            self.fixups.record(ax as u8, source);
            self.fixups.record(ay as u8, dest);
            self.regs.set_a(ax, source.wrapping_add(LINE_BYTES));
            if ay != ax {
                self.regs.set_a(ay, dest.wrapping_add(LINE_BYTES));
            }
            (source, dest)
        } else {
            let absolute = self.fetch_long(bus)?;
            let ay = self.regs.a(ax);
            let mode = (self.opcode >> 3) & 3;
            if mode < 2 {
                self.fixups.record(ax as u8, ay);
                self.regs.set_a(ax, ay.wrapping_add(LINE_BYTES));
            }
            if mode & 1 == 0 { (ay, absolute) } else { (absolute, ay) }
        };
        self.copy_line(bus, source & !(LINE_BYTES - 1), dest & !(LINE_BYTES - 1))
    }

    fn copy_line(&mut self, bus: &mut dyn PhysBus, source: u32, dest: u32) -> Outcome<()> {
        let as_line = |exception: Exception| match exception {
            Exception::Access(mut fault) => {
                fault.width = Width::Line;
                Exception::Access(fault)
            }
            other => other,
        };
        let mut line = [0u32; 4];
        for (i, slot) in line.iter_mut().enumerate() {
            *slot = self
                .read_data(bus, source.wrapping_add(4 * i as u32), Size::Long)
                .map_err(as_line)?;
        }
        for (i, value) in line.into_iter().enumerate() {
            self.write_data(bus, dest.wrapping_add(4 * i as u32), Size::Long, value)
                .map_err(as_line)?;
        }
        Ok(())
    }

    // ================================================================
    // 68030 PMMU
    // ================================================================
    //
    // Command word, bits 15-13:
    //   000/010/011  PMOVE
    //   001          PFLUSH / PLOAD
    //   100          PTEST

    pub(super) fn exec_pmmu030(&mut self, bus: &mut dyn PhysBus) -> Outcome<()> {
        self.require_supervisor()?;
        let command = self.fetch_word(bus)?;
        match command >> 13 {
            0b000 | 0b010 | 0b011 => self.pmove(bus, command),
            0b001 => self.pflush030(bus, command),
            0b100 => self.ptest030(bus, command),
            _ => Err(Exception::Fault(vector::LINE_F)),
        }
    }

    /// FC field of PFLUSH/PLOAD/PTEST: 10xxx immediate, 01rrr Dn,
    /// 00000 SFC, 00001 DFC.
    fn pmmu_fc(&self, field: u16) -> Outcome<FunctionCode> {
        let bits = match field & 0x1F {
            f if f & 0x18 == 0x10 => (f & 7) as u8,
            f if f & 0x18 == 0x08 => (self.regs.d[usize::from(f & 7)] & 7) as u8,
            0 => self.regs.sfc,
            1 => self.regs.dfc,
            _ => return Err(Exception::Fault(vector::LINE_F)),
        };
        Ok(FunctionCode::from_bits(bits))
    }

    fn pmove(&mut self, bus: &mut dyn PhysBus, command: u16) -> Outcome<()> {
        let reg = PmmuRegister::decode(command).ok_or(Exception::Fault(vector::LINE_F))?;
        let to_memory = command & 0x0200 != 0;
        let flush = command & 0x0100 == 0;
        let bytes = reg.bytes();

        if bytes == 8 {
            let address = self.pmove_address(bus)?;
            if to_memory {
                let value = self.mmu.pmmu_read(reg);
                self.write_data(bus, address, Size::Long, (value >> 32) as u32)?;
                self.write_data(bus, address.wrapping_add(4), Size::Long, value as u32)?;
                return Ok(());
            }
            let hi = self.read_data(bus, address, Size::Long)?;
            let lo = self.read_data(bus, address.wrapping_add(4), Size::Long)?;
            return self.pmmu_store(reg, (u64::from(hi) << 32) | u64::from(lo), flush);
        }

        let size = if bytes == 2 { Size::Word } else { Size::Long };
        let operand = self.resolve_ea(bus, size)?;
        if to_memory {
            let value = self.mmu.pmmu_read(reg) as u32;
            self.write_operand(bus, operand, size, value)
        } else {
            let value = self.read_operand(bus, operand, size)?;
            self.pmmu_store(reg, u64::from(value), flush)
        }
    }

    /// Address of a 64-bit PMOVE operand; (An)+ and -(An) step by 8.
    fn pmove_address(&mut self, bus: &mut dyn PhysBus) -> Outcome<u32> {
        match AddrMode::from_opcode(self.opcode) {
            Some(AddrMode::AddrIndPostInc(r)) => {
                let r = usize::from(r);
                let address = self.regs.a(r);
                self.fixups.record(r as u8, address);
                self.regs.set_a(r, address.wrapping_add(8));
                Ok(address)
            }
            Some(AddrMode::AddrIndPreDec(r)) => {
                let r = usize::from(r);
                let old = self.regs.a(r);
                self.fixups.record(r as u8, old);
                let address = old.wrapping_sub(8);
                self.regs.set_a(r, address);
                Ok(address)
            }
            _ => match self.resolve_ea(bus, Size::Long)? {
                Operand::Memory(address) => Ok(address),
                _ => Err(Exception::Fault(vector::LINE_F)),
            },
        }
    }

    /// A TC layout or root pointer the MMU cannot translate takes the
    /// configuration exception after the PMOVE.
    fn pmmu_store(&mut self, reg: PmmuRegister, value: u64, flush: bool) -> Outcome<()> {
        self.mmu
            .pmmu_write(reg, value, flush)
            .map_err(|_| Exception::Trap(vector::MMU_CONFIGURATION))?;
        debug!(?reg, value = format_args!("{value:#X}"), "pmmu: register written");
        Ok(())
    }

    /// Mode bits 12-10: 001 PFLUSHA, 100 PFLUSH fc, 110 PFLUSH fc,<ea>,
    /// 000 PLOAD.
    fn pflush030(&mut self, bus: &mut dyn PhysBus, command: u16) -> Outcome<()> {
        match (command >> 10) & 7 {
            0b001 => self.mmu.flush_all(true),
            0b100 => {
                // lines are tagged by S/U only, so a function-code flush
                // drops everything
                self.pmmu_fc(command)?;
                self.mmu.flush_all(true);
            }
            0b110 => {
                let fc = self.pmmu_fc(command)?;
                let address = self.control_address(bus)?;
                self.mmu.flush(address, fc.is_supervisor(), true);
            }
            0b000 => {
                let fc = self.pmmu_fc(command)?;
                let address = self.control_address(bus)?;
                let access = Access {
                    supervisor: fc.is_supervisor(),
                    program: fc.is_program(),
                    write: command & 0x0200 == 0,
                };
                // PLOAD only fills the ATC; a failed search is not a fault
                if let Err(fault) = self.mmu.translate(bus, address, access) {
                    trace!(?fault, "pmmu: pload found no translation");
                }
            }
            _ => return Err(Exception::Fault(vector::LINE_F)),
        }
        Ok(())
    }

    /// PTESTR/PTESTW fc,<ea>,#level. Bit 9 set tests a read.
    fn ptest030(&mut self, bus: &mut dyn PhysBus, command: u16) -> Outcome<()> {
        let fc = self.pmmu_fc(command)?;
        let address = self.control_address(bus)?;
        let write = command & 0x0200 == 0;
        self.mmu.ptest(bus, address, fc, write);
        debug!(
            address = format_args!("{address:#010X}"),
            mmusr = format_args!("{:#06X}", self.mmu.mmusr_030()),
            "pmmu: ptest"
        );
        Ok(())
    }
}
