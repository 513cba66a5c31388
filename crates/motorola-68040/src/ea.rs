//! Effective-address engine.
//!
//! Decodes the 6-bit mode/register field, fetches extension words (68000
//! style brief format and the 68020+ full format with memory indirection),
//! and resolves an [`Operand`]. Post-increment and pre-decrement side
//! effects are recorded in a [`FixupLog`] so a faulting instruction can be
//! rolled back and restarted.

use crate::alu::Size;
use crate::bus::PhysBus;
use crate::cpu::Cpu;
use crate::fault::{Exception, Outcome, vector};
use crate::registers::Registers;

/// Addressing mode for 68030/68040 instructions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddrMode {
    /// Data register direct: Dn
    DataReg(u8),
    /// Address register direct: An
    AddrReg(u8),
    /// Address register indirect: (An)
    AddrInd(u8),
    /// Address register indirect with postincrement: (An)+
    AddrIndPostInc(u8),
    /// Address register indirect with predecrement: -(An)
    AddrIndPreDec(u8),
    /// Address register indirect with displacement: d16(An)
    AddrIndDisp(u8),
    /// Address register indirect with index (brief or full format)
    AddrIndIndex(u8),
    /// Absolute short: (xxx).W
    AbsShort,
    /// Absolute long: (xxx).L
    AbsLong,
    /// Program counter with displacement: d16(PC)
    PcDisp,
    /// Program counter with index (brief or full format)
    PcIndex,
    /// Immediate: #<data>
    Immediate,
}

impl AddrMode {
    /// Decode addressing mode from mode/register fields.
    #[must_use]
    pub fn decode(mode: u8, reg: u8) -> Option<Self> {
        let reg = reg & 0x07;
        match mode & 0x07 {
            0 => Some(Self::DataReg(reg)),
            1 => Some(Self::AddrReg(reg)),
            2 => Some(Self::AddrInd(reg)),
            3 => Some(Self::AddrIndPostInc(reg)),
            4 => Some(Self::AddrIndPreDec(reg)),
            5 => Some(Self::AddrIndDisp(reg)),
            6 => Some(Self::AddrIndIndex(reg)),
            _ => match reg {
                0 => Some(Self::AbsShort),
                1 => Some(Self::AbsLong),
                2 => Some(Self::PcDisp),
                3 => Some(Self::PcIndex),
                4 => Some(Self::Immediate),
                _ => None,
            },
        }
    }

    /// Decode the low six bits of an opcode.
    #[must_use]
    pub fn from_opcode(opcode: u16) -> Option<Self> {
        Self::decode(((opcode >> 3) & 7) as u8, (opcode & 7) as u8)
    }

    #[must_use]
    pub fn is_data(self) -> bool {
        !matches!(self, Self::AddrReg(_))
    }

    #[must_use]
    pub fn is_memory(self) -> bool {
        !matches!(self, Self::DataReg(_) | Self::AddrReg(_))
    }

    #[must_use]
    pub fn is_alterable(self) -> bool {
        !matches!(self, Self::PcDisp | Self::PcIndex | Self::Immediate)
    }

    /// Check if this mode is a data alterable destination.
    #[must_use]
    pub fn is_data_alterable(self) -> bool {
        self.is_data() && self.is_alterable()
    }

    /// Check if this mode is memory alterable.
    #[must_use]
    pub fn is_memory_alterable(self) -> bool {
        self.is_memory() && self.is_alterable()
    }

    /// Control modes: memory operands without implicit size.
    #[must_use]
    pub fn is_control(self) -> bool {
        matches!(
            self,
            Self::AddrInd(_)
                | Self::AddrIndDisp(_)
                | Self::AddrIndIndex(_)
                | Self::AbsShort
                | Self::AbsLong
                | Self::PcDisp
                | Self::PcIndex
        )
    }
}

/// A resolved operand location.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    DataReg(usize),
    AddrReg(usize),
    Memory(u32),
    Immediate(u32),
}

/// Address-register values to restore if the instruction faults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FixupLog {
    entries: [(u8, u32); 3],
    len: usize,
}

impl FixupLog {
    pub fn clear(&mut self) {
        self.len = 0;
    }

    /// Remember the original value of An, once per instruction.
    pub fn record(&mut self, reg: u8, original: u32) {
        if self.entries[..self.len].iter().any(|&(r, _)| r == reg) {
            return;
        }
        if self.len < self.entries.len() {
            self.entries[self.len] = (reg, original);
            self.len += 1;
        }
    }

    /// Restore the recorded registers.
    pub fn rollback(&mut self, regs: &mut Registers) {
        for &(reg, value) in self.entries[..self.len].iter().rev() {
            regs.set_a(usize::from(reg), value);
        }
        self.len = 0;
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Step for (An)+ / -(An): bytes keep A7 word aligned.
fn step_for(reg: u8, size: Size) -> u32 {
    if reg == 7 && size == Size::Byte {
        2
    } else {
        size.bytes()
    }
}

impl Cpu {
    /// Resolve an addressing mode, fetching any extension words.
    pub(crate) fn resolve(
        &mut self,
        bus: &mut dyn PhysBus,
        mode: AddrMode,
        size: Size,
    ) -> Outcome<Operand> {
        Ok(match mode {
            AddrMode::DataReg(r) => Operand::DataReg(usize::from(r)),
            AddrMode::AddrReg(r) => Operand::AddrReg(usize::from(r)),
            AddrMode::AddrInd(r) => Operand::Memory(self.regs.a(usize::from(r))),
            AddrMode::AddrIndPostInc(r) => {
                let addr = self.regs.a(usize::from(r));
                self.fixups.record(r, addr);
                self.regs
                    .set_a(usize::from(r), addr.wrapping_add(step_for(r, size)));
                Operand::Memory(addr)
            }
            AddrMode::AddrIndPreDec(r) => {
                let old = self.regs.a(usize::from(r));
                self.fixups.record(r, old);
                let addr = old.wrapping_sub(step_for(r, size));
                self.regs.set_a(usize::from(r), addr);
                Operand::Memory(addr)
            }
            AddrMode::AddrIndDisp(r) => {
                let base = self.regs.a(usize::from(r));
                let disp = Size::Word.sign_extend(u32::from(self.fetch_word(bus)?));
                Operand::Memory(base.wrapping_add(disp))
            }
            AddrMode::AddrIndIndex(r) => {
                let base = self.regs.a(usize::from(r));
                Operand::Memory(self.indexed(bus, base)?)
            }
            AddrMode::AbsShort => {
                Operand::Memory(Size::Word.sign_extend(u32::from(self.fetch_word(bus)?)))
            }
            AddrMode::AbsLong => Operand::Memory(self.fetch_long(bus)?),
            AddrMode::PcDisp => {
                let base = self.regs.pc;
                let disp = Size::Word.sign_extend(u32::from(self.fetch_word(bus)?));
                Operand::Memory(base.wrapping_add(disp))
            }
            AddrMode::PcIndex => {
                let base = self.regs.pc;
                Operand::Memory(self.indexed(bus, base)?)
            }
            AddrMode::Immediate => Operand::Immediate(match size {
                Size::Byte => u32::from(self.fetch_word(bus)?) & 0xFF,
                Size::Word => u32::from(self.fetch_word(bus)?),
                Size::Long => self.fetch_long(bus)?,
            }),
        })
    }

    /// Resolve the low six bits of the current opcode.
    pub(crate) fn resolve_ea(&mut self, bus: &mut dyn PhysBus, size: Size) -> Outcome<Operand> {
        let mode = AddrMode::from_opcode(self.opcode).ok_or(Exception::Fault(vector::ILLEGAL))?;
        self.resolve(bus, mode, size)
    }

    /// Address of a control-mode operand (LEA, PEA, JMP, JSR, MOVEM ...).
    pub(crate) fn control_address(&mut self, bus: &mut dyn PhysBus) -> Outcome<u32> {
        match self.resolve_ea(bus, Size::Long)? {
            Operand::Memory(addr) => Ok(addr),
            _ => Err(Exception::Fault(vector::ILLEGAL)),
        }
    }

    /// Brief or full format extension word for d8(An,Xn) / (bd,An,Xn) / ([...]).
    fn indexed(&mut self, bus: &mut dyn PhysBus, base: u32) -> Outcome<u32> {
        let ext = self.fetch_word(bus)?;
        let index_reg = usize::from((ext >> 12) & 7);
        let raw = if ext & 0x8000 != 0 {
            self.regs.a(index_reg)
        } else {
            self.regs.d[index_reg]
        };
        let index = if ext & 0x0800 != 0 {
            raw
        } else {
            Size::Word.sign_extend(raw)
        };
        let index = index << ((ext >> 9) & 3);

        if ext & 0x0100 == 0 {
            let disp = Size::Byte.sign_extend(u32::from(ext));
            return Ok(base.wrapping_add(index).wrapping_add(disp));
        }

        // full format
        let base = if ext & 0x80 != 0 { 0 } else { base };
        let index = if ext & 0x40 != 0 { 0 } else { index };
        let bd = match (ext >> 4) & 3 {
            2 => Size::Word.sign_extend(u32::from(self.fetch_word(bus)?)),
            3 => self.fetch_long(bus)?,
            1 => 0,
            _ => return Err(Exception::Fault(vector::ILLEGAL)),
        };
        let selection = ext & 7;
        let suppress_index = ext & 0x40 != 0;
        if selection == 0 {
            return Ok(base.wrapping_add(bd).wrapping_add(index));
        }
        if suppress_index && selection > 3 {
            return Err(Exception::Fault(vector::ILLEGAL));
        }
        let od = match selection & 3 {
            2 => Size::Word.sign_extend(u32::from(self.fetch_word(bus)?)),
            3 => self.fetch_long(bus)?,
            1 => 0,
            _ => return Err(Exception::Fault(vector::ILLEGAL)),
        };
        let address = if selection < 4 {
            // pre-indexed
            let pointer = base.wrapping_add(bd).wrapping_add(index);
            self.read_data(bus, pointer, Size::Long)?.wrapping_add(od)
        } else {
            // post-indexed
            let pointer = base.wrapping_add(bd);
            self.read_data(bus, pointer, Size::Long)?
                .wrapping_add(index)
                .wrapping_add(od)
        };
        Ok(address)
    }

    pub(crate) fn read_operand(
        &mut self,
        bus: &mut dyn PhysBus,
        operand: Operand,
        size: Size,
    ) -> Outcome<u32> {
        match operand {
            Operand::DataReg(r) => Ok(self.regs.d[r] & size.mask()),
            Operand::AddrReg(r) => Ok(self.regs.a(r) & size.mask()),
            Operand::Memory(addr) => self.read_data(bus, addr, size),
            Operand::Immediate(value) => Ok(value & size.mask()),
        }
    }

    /// Write an operand. Data registers keep their upper bits; address
    /// registers take the full (already extended) value.
    pub(crate) fn write_operand(
        &mut self,
        bus: &mut dyn PhysBus,
        operand: Operand,
        size: Size,
        value: u32,
    ) -> Outcome<()> {
        match operand {
            Operand::DataReg(r) => {
                self.regs.d[r] = size.merge(self.regs.d[r], value);
                Ok(())
            }
            Operand::AddrReg(r) => {
                self.regs.set_a(r, value);
                Ok(())
            }
            Operand::Memory(addr) => self.write_data(bus, addr, size, value),
            Operand::Immediate(_) => Err(Exception::Fault(vector::ILLEGAL)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{AddrMode, FixupLog};
    use crate::registers::Registers;

    #[test]
    fn classifies_modes() {
        let pc_rel = AddrMode::decode(7, 2).unwrap();
        assert!(pc_rel.is_control() && !pc_rel.is_alterable());
        let an = AddrMode::decode(1, 3).unwrap();
        assert!(!an.is_data() && an.is_alterable());
        assert!(AddrMode::decode(7, 5).is_none());
        assert!(AddrMode::decode(3, 0).unwrap().is_memory_alterable());
        assert!(!AddrMode::decode(3, 0).unwrap().is_control());
    }

    #[test]
    fn fixups_restore_the_first_value_only() {
        let mut regs = Registers::new();
        let mut log = FixupLog::default();
        regs.a[2] = 0x100;
        log.record(2, 0x100);
        regs.a[2] = 0x104;
        log.record(2, 0x104);
        regs.a[2] = 0x108;
        log.rollback(&mut regs);
        assert_eq!(regs.a[2], 0x100);
        assert!(log.is_empty());
    }
}
