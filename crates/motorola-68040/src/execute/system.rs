//! System control: SR/CCR/USP moves, MOVEC, MOVES, CHK, TRAPV, STOP,
//! RESET.

use tracing::{debug, trace};

use crate::alu::Size;
use crate::bus::{FunctionCode, PhysBus};
use crate::cpu::{Cpu, RunState};
use crate::ea::Operand;
use crate::fault::{Exception, Outcome, vector};
use crate::flags::{N, V};
use crate::model::CpuModel;

/// Writable CACR bits: 68030 (instruction/data cache control) and 68040
/// (DE, IE).
const CACR_MASK_030: u32 = 0x0000_3F1F;
const CACR_MASK_040: u32 = 0x8000_8000;

/// MOVEC control register codes.
mod control {
    pub const SFC: u16 = 0x000;
    pub const DFC: u16 = 0x001;
    pub const CACR: u16 = 0x002;
    pub const TC: u16 = 0x003;
    pub const ITT0: u16 = 0x004;
    pub const ITT1: u16 = 0x005;
    pub const DTT0: u16 = 0x006;
    pub const DTT1: u16 = 0x007;
    pub const USP: u16 = 0x800;
    pub const VBR: u16 = 0x801;
    pub const CAAR: u16 = 0x802;
    pub const MSP: u16 = 0x803;
    pub const ISP: u16 = 0x804;
    pub const MMUSR: u16 = 0x805;
    pub const URP: u16 = 0x806;
    pub const SRP: u16 = 0x807;
}

impl Cpu {
    // ================================================================
    // SR / CCR / USP
    // ================================================================

    pub(super) fn exec_move_to_sr(&mut self, bus: &mut dyn PhysBus) -> Outcome<()> {
        self.require_supervisor()?;
        let operand = self.resolve_ea(bus, Size::Word)?;
        let value = self.read_operand(bus, operand, Size::Word)?;
        self.set_sr(value as u16);
        Ok(())
    }

    /// Privileged from the 68010 on.
    pub(super) fn exec_move_from_sr(&mut self, bus: &mut dyn PhysBus) -> Outcome<()> {
        self.require_supervisor()?;
        let operand = self.resolve_ea(bus, Size::Word)?;
        let sr = u32::from(self.regs.sr);
        self.write_operand(bus, operand, Size::Word, sr)
    }

    pub(super) fn exec_move_to_ccr(&mut self, bus: &mut dyn PhysBus) -> Outcome<()> {
        let operand = self.resolve_ea(bus, Size::Word)?;
        let value = self.read_operand(bus, operand, Size::Word)?;
        self.regs.set_ccr(value as u8);
        Ok(())
    }

    pub(super) fn exec_move_from_ccr(&mut self, bus: &mut dyn PhysBus) -> Outcome<()> {
        let operand = self.resolve_ea(bus, Size::Word)?;
        let ccr = u32::from(self.regs.ccr());
        self.write_operand(bus, operand, Size::Word, ccr)
    }

    /// MOVE USP: bit 3 set copies USP to An.
    pub(super) fn exec_move_usp(&mut self) -> Outcome<()> {
        self.require_supervisor()?;
        let r = self.reg_lo();
        if self.opcode & 0x0008 != 0 {
            self.regs.set_a(r, self.regs.usp);
        } else {
            self.regs.usp = self.regs.a(r);
        }
        Ok(())
    }

    // ================================================================
    // MOVEC
    // ================================================================
    //
    // Extension word: A/D rrr cccccccccccc. Opcode bit 0 set moves the
    // general register into the control register.

    pub(super) fn exec_movec(&mut self, bus: &mut dyn PhysBus) -> Outcome<()> {
        self.require_supervisor()?;
        let ext = self.fetch_word(bus)?;
        let reg = usize::from(ext >> 12);
        let code = ext & 0x0FFF;
        if self.opcode & 1 != 0 {
            let value = if reg < 8 { self.regs.d[reg] } else { self.regs.a(reg - 8) };
            self.write_control(code, value)?;
            trace!(code = format_args!("{code:#05X}"), value = format_args!("{value:#010X}"), "movec: write");
        } else {
            let value = self.read_control(code)?;
            if reg < 8 {
                self.regs.d[reg] = value;
            } else {
                self.regs.set_a(reg - 8, value);
            }
        }
        Ok(())
    }

    fn read_control(&self, code: u16) -> Outcome<u32> {
        let caps = self.model().capabilities();
        let value = match code {
            control::SFC => u32::from(self.regs.sfc),
            control::DFC => u32::from(self.regs.dfc),
            control::CACR => self.regs.cacr,
            control::USP => self.regs.usp,
            control::VBR => self.regs.vbr,
            control::CAAR if caps.caar => self.regs.caar,
            control::MSP => self.regs.msp,
            control::ISP => self.regs.isp,
            control::TC if caps.movec_mmu => u32::from(self.mmu.tcr()),
            control::ITT0 if caps.movec_mmu => self.mmu.itt(0),
            control::ITT1 if caps.movec_mmu => self.mmu.itt(1),
            control::DTT0 if caps.movec_mmu => self.mmu.dtt(0),
            control::DTT1 if caps.movec_mmu => self.mmu.dtt(1),
            control::MMUSR if caps.movec_mmu => self.mmu.mmusr(),
            control::URP if caps.movec_mmu => self.mmu.urp(),
            control::SRP if caps.movec_mmu => self.mmu.srp(),
            _ => return Err(Exception::Fault(vector::ILLEGAL)),
        };
        Ok(value)
    }

    fn write_control(&mut self, code: u16, value: u32) -> Outcome<()> {
        let caps = self.model().capabilities();
        match code {
            control::SFC => self.regs.sfc = (value & 7) as u8,
            control::DFC => self.regs.dfc = (value & 7) as u8,
            control::CACR => {
                let mask = match self.model() {
                    CpuModel::M68030 => CACR_MASK_030,
                    CpuModel::M68040 => CACR_MASK_040,
                };
                self.regs.cacr = value & mask;
            }
            control::USP => self.regs.usp = value,
            control::VBR => self.regs.vbr = value,
            control::CAAR if caps.caar => self.regs.caar = value,
            control::MSP => self.regs.msp = value,
            control::ISP => self.regs.isp = value,
            control::TC if caps.movec_mmu => {
                self.mmu.set_tcr(value as u16);
                debug!(tcr = format_args!("{:#06X}", value as u16), "mmu: TC written");
            }
            control::ITT0 if caps.movec_mmu => self.mmu.set_itt(0, value),
            control::ITT1 if caps.movec_mmu => self.mmu.set_itt(1, value),
            control::DTT0 if caps.movec_mmu => self.mmu.set_dtt(0, value),
            control::DTT1 if caps.movec_mmu => self.mmu.set_dtt(1, value),
            control::MMUSR if caps.movec_mmu => self.mmu.set_mmusr(value),
            control::URP if caps.movec_mmu => self.mmu.set_urp(value),
            control::SRP if caps.movec_mmu => self.mmu.set_srp(value),
            _ => return Err(Exception::Fault(vector::ILLEGAL)),
        }
        Ok(())
    }

    // ================================================================
    // MOVES
    // ================================================================
    //
    // Extension word: A/D rrr d 00000000000. d set stores the register
    // through DFC, clear loads it through SFC.

    pub(super) fn exec_moves(&mut self, bus: &mut dyn PhysBus) -> Outcome<()> {
        self.require_supervisor()?;
        let size = self.op_size();
        let ext = self.fetch_word(bus)?;
        let reg = usize::from(ext >> 12);
        let Operand::Memory(address) = self.resolve_ea(bus, size)? else {
            return Err(Exception::Fault(vector::ILLEGAL));
        };
        if ext & 0x0800 != 0 {
            let value = if reg < 8 { self.regs.d[reg] } else { self.regs.a(reg - 8) };
            let fc = FunctionCode::from_bits(self.regs.dfc);
            self.write_fc(bus, address, size, value & size.mask(), fc)
        } else {
            let fc = FunctionCode::from_bits(self.regs.sfc);
            let value = self.read_fc(bus, address, size, fc)?;
            if reg < 8 {
                self.regs.d[reg] = size.merge(self.regs.d[reg], value);
            } else {
                self.regs.set_a(reg - 8, size.sign_extend(value));
            }
            Ok(())
        }
    }

    // ================================================================
    // Traps and processor control
    // ================================================================

    pub(super) fn exec_trapv(&mut self) -> Outcome<()> {
        if self.regs.sr & V != 0 {
            return Err(Exception::InstructionTrap(vector::TRAPV));
        }
        Ok(())
    }

    /// CHK <ea>,Dn: trap when Dn < 0 (N set) or Dn > bound (N clear).
    pub(super) fn exec_chk(&mut self, bus: &mut dyn PhysBus) -> Outcome<()> {
        let size = self.op_size();
        let operand = self.resolve_ea(bus, size)?;
        let bound = size.sign_extend(self.read_operand(bus, operand, size)?) as i32;
        let value = size.sign_extend(self.regs.d[self.reg_hi()]) as i32;
        if value < 0 {
            self.regs.sr |= N;
            return Err(Exception::InstructionTrap(vector::CHK));
        }
        if value > bound {
            self.regs.sr &= !N;
            return Err(Exception::InstructionTrap(vector::CHK));
        }
        Ok(())
    }

    /// STOP #imm: load SR and idle until an interrupt (or trace).
    pub(super) fn exec_stop(&mut self, bus: &mut dyn PhysBus) -> Outcome<()> {
        self.require_supervisor()?;
        let sr = self.fetch_word(bus)?;
        self.set_sr(sr);
        self.state = RunState::Stopped;
        debug!(sr = format_args!("{sr:#06X}"), "cpu: stopped");
        Ok(())
    }

    pub(super) fn exec_reset(&mut self, bus: &mut dyn PhysBus) -> Outcome<()> {
        self.require_supervisor()?;
        debug!("cpu: RESET asserted");
        bus.reset_devices();
        Ok(())
    }
}
