//! Floating-point coprocessor interface.
//!
//! The FPU itself lives outside this crate. General FPU opcodes are handed
//! to an attached [`FpuBridge`], which reaches CPU state through
//! [`FpuAccess`]; FSAVE and FRESTORE only handle the null frame here. An FPU
//! opcode on a 68040 without FPU traps with a format 4 frame.

use tracing::trace;

use crate::alu::Size;
use crate::bus::PhysBus;
use crate::cpu::Cpu;
use crate::ea::{AddrMode, Operand};
use crate::fault::{Exception, Outcome, vector};
use crate::registers::Registers;

/// CPU services available to the FPU while it executes an instruction.
pub trait FpuAccess {
    /// Next instruction extension word.
    fn fetch_word(&mut self) -> Outcome<u16>;
    /// Resolve the effective address in the opcode's low six bits.
    fn resolve(&mut self, size: Size) -> Outcome<Operand>;
    fn read(&mut self, operand: Operand, size: Size) -> Outcome<u32>;
    fn write(&mut self, operand: Operand, size: Size, value: u32) -> Outcome<()>;
    fn registers(&mut self) -> &mut Registers;
}

/// The floating-point unit, as seen by the CPU.
pub trait FpuBridge {
    fn reset(&mut self);

    /// Execute a general FPU instruction (coprocessor ID 1). Returning
    /// [`Exception::FpPostInstruction`] or
    /// [`Exception::CoprocessorMidInstruction`] raises the matching frame.
    fn execute(&mut self, opcode: u16, cpu: &mut dyn FpuAccess) -> Outcome<()>;
}

struct Port<'a, 'b> {
    cpu: &'a mut Cpu,
    bus: &'a mut (dyn PhysBus + 'b),
}

impl FpuAccess for Port<'_, '_> {
    fn fetch_word(&mut self) -> Outcome<u16> {
        self.cpu.fetch_word(self.bus)
    }

    fn resolve(&mut self, size: Size) -> Outcome<Operand> {
        self.cpu.resolve_ea(self.bus, size)
    }

    fn read(&mut self, operand: Operand, size: Size) -> Outcome<u32> {
        self.cpu.read_operand(self.bus, operand, size)
    }

    fn write(&mut self, operand: Operand, size: Size, value: u32) -> Outcome<()> {
        self.cpu.write_operand(self.bus, operand, size, value)
    }

    fn registers(&mut self) -> &mut Registers {
        &mut self.cpu.regs
    }
}

/// FSAVE null frame: version 0, size 0.
const NULL_FRAME: u32 = 0;

impl Cpu {
    pub(super) fn exec_fpu_general(&mut self, bus: &mut dyn PhysBus) -> Outcome<()> {
        let Some(mut fpu) = self.take_fpu() else {
            return Err(Exception::Fault(vector::LINE_F));
        };
        let opcode = self.opcode;
        let result = fpu.execute(opcode, &mut Port { cpu: self, bus });
        self.restore_fpu(fpu);
        result
    }

    /// FSAVE: the FPU is always idle between instructions, so the saved
    /// state is a null frame.
    pub(super) fn exec_fsave(&mut self, bus: &mut dyn PhysBus) -> Outcome<()> {
        self.require_supervisor()?;
        let operand = self.resolve_ea(bus, Size::Long)?;
        self.write_operand(bus, operand, Size::Long, NULL_FRAME)
    }

    /// FRESTORE: a null frame resets the FPU; any other frame is skipped
    /// over by its size byte.
    pub(super) fn exec_frestore(&mut self, bus: &mut dyn PhysBus) -> Outcome<()> {
        self.require_supervisor()?;
        let operand = self.resolve_ea(bus, Size::Long)?;
        let header = self.read_operand(bus, operand, Size::Long)?;
        if header >> 24 == 0 {
            if let Some(mut fpu) = self.take_fpu() {
                fpu.reset();
                self.restore_fpu(fpu);
            }
            trace!("fpu: null frame restored");
            return Ok(());
        }
        if let Some(AddrMode::AddrIndPostInc(r)) = AddrMode::from_opcode(self.opcode) {
            let r = usize::from(r);
            let skip = (header >> 16) & 0xFF;
            self.regs.set_a(r, self.regs.a(r).wrapping_add(skip));
        }
        Ok(())
    }

    /// 68040 without FPU: report the effective address in a format 4
    /// frame so a software package can emulate the instruction.
    pub(super) fn exec_fpu_unimplemented(&mut self, bus: &mut dyn PhysBus) -> Outcome<()> {
        // the command word precedes any EA extension words
        self.fetch_word(bus)?;
        let ea = match AddrMode::from_opcode(self.opcode) {
            Some(mode) if mode.is_control() => self.control_address(bus)?,
            Some(AddrMode::AddrIndPostInc(r) | AddrMode::AddrIndPreDec(r)) => self.regs.a(usize::from(r)),
            _ => 0,
        };
        Err(Exception::FpUnimplemented { ea })
    }
}

#[cfg(test)]
mod tests {
    use super::{FpuAccess, FpuBridge};
    use crate::bus::FlatBus;
    use crate::cpu::Cpu;
    use crate::fault::{Exception, Outcome};
    use crate::model::{CpuModel, FpuModel};

    /// Consumes the command word and copies it into D7.
    struct Recorder;

    impl FpuBridge for Recorder {
        fn reset(&mut self) {}

        fn execute(&mut self, _opcode: u16, cpu: &mut dyn FpuAccess) -> Outcome<()> {
            let command = cpu.fetch_word()?;
            cpu.registers().d[7] = u32::from(command);
            if command == 0xFFFF {
                return Err(Exception::FpPostInstruction { vector: 50, ea: 0x1234 });
            }
            Ok(())
        }
    }

    fn boot(model: CpuModel, fpu: FpuModel, program: &[u16]) -> (Cpu, FlatBus) {
        let mut bus = FlatBus::new(0x10000);
        bus.poke32(0, 0x8000);
        bus.poke32(4, 0x400);
        bus.load_words(0x400, program);
        let mut cpu = Cpu::new(model, fpu).unwrap();
        cpu.reset(&mut bus).unwrap();
        (cpu, bus)
    }

    #[test]
    fn general_op_without_bridge_is_line_f() {
        let (mut cpu, mut bus) = boot(CpuModel::M68040, FpuModel::Internal, &[0xF200, 0x0000]);
        bus.poke32(11 * 4, 0x3000);
        cpu.step(&mut bus).unwrap();
        assert_eq!(cpu.regs.pc, 0x3000);
    }

    #[test]
    fn bridge_reads_extension_words() {
        let (mut cpu, mut bus) = boot(CpuModel::M68030, FpuModel::M68882, &[0xF200, 0x5422]);
        cpu.attach_fpu(Box::new(Recorder));
        cpu.step(&mut bus).unwrap();
        assert_eq!(cpu.regs.d[7], 0x5422);
        assert_eq!(cpu.regs.pc, 0x404);
    }

    #[test]
    fn post_instruction_exception_uses_format_3() {
        let (mut cpu, mut bus) = boot(CpuModel::M68040, FpuModel::Internal, &[0xF200, 0xFFFF]);
        cpu.attach_fpu(Box::new(Recorder));
        bus.poke32(50 * 4, 0x3000);
        cpu.step(&mut bus).unwrap();
        assert_eq!(cpu.regs.pc, 0x3000);
        let sp = cpu.regs.a(7);
        assert_eq!(bus.peek16(sp + 6) >> 12, 3);
        assert_eq!(bus.peek32(sp + 8), 0x1234);
    }

    #[test]
    fn lc040_reports_unimplemented_with_the_ea() {
        // FMOVE.X (A0),FP0 on a 68040 without FPU
        let (mut cpu, mut bus) = boot(CpuModel::M68040, FpuModel::None, &[0xF210, 0x4800]);
        bus.poke32(11 * 4, 0x3000);
        cpu.regs.a[0] = 0x2468;
        cpu.step(&mut bus).unwrap();
        assert_eq!(cpu.regs.pc, 0x3000);
        let sp = cpu.regs.a(7);
        assert_eq!(bus.peek16(sp + 6) >> 12, 4);
        assert_eq!(bus.peek32(sp + 8), 0x2468);
        assert_eq!(bus.peek32(sp + 12), 0x400);
    }

    #[test]
    fn fsave_pushes_a_null_frame() {
        // FSAVE -(A7)
        let (mut cpu, mut bus) = boot(CpuModel::M68040, FpuModel::Internal, &[0xF327]);
        bus.poke32(0x7FFC, 0xDEAD_BEEF);
        cpu.step(&mut bus).unwrap();
        assert_eq!(cpu.regs.a(7), 0x7FFC);
        assert_eq!(bus.peek32(0x7FFC), 0);
    }
}
