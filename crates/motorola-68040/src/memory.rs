//! Logical memory access.
//!
//! Every CPU-initiated access goes through here: MMU translation with the
//! function code implied by SR (or supplied by MOVES / write-backs), then
//! the physical bus. Transfers that straddle a page boundary while paging is
//! on are split into byte transfers so each part is translated on its own.
//! A split write that faults reruns its instruction instead of completing
//! through a write-back slot.

use tracing::debug;

use crate::alu::Size;
use crate::bus::{FunctionCode, PhysBus};
use crate::cpu::Cpu;
use crate::fault::{AccessFault, Exception, Outcome};
use crate::mmu::Access;

impl Cpu {
    pub(crate) fn data_fc(&self) -> FunctionCode {
        FunctionCode::from_flags(self.regs.is_supervisor(), false)
    }

    pub(crate) fn program_fc(&self) -> FunctionCode {
        FunctionCode::from_flags(self.regs.is_supervisor(), true)
    }

    fn crosses_page(&self, address: u32, size: Size) -> bool {
        if size == Size::Byte || !self.mmu.enabled() {
            return false;
        }
        let geometry = self.mmu.geometry();
        (address & geometry.offset_mask) + size.bytes() > geometry.page_size()
    }

    fn translate_for(
        &mut self,
        bus: &mut dyn PhysBus,
        address: u32,
        size: Size,
        fc: FunctionCode,
        write: Option<u32>,
    ) -> Outcome<u32> {
        let access = Access {
            supervisor: fc.is_supervisor(),
            program: fc.is_program(),
            write: write.is_some(),
        };
        self.mmu.translate(bus, address, access).map_err(|fault| {
            debug!(
                address = format_args!("{address:#010X}"),
                ?fault,
                write = write.is_some(),
                "mmu: access fault"
            );
            match write {
                Some(data) => Exception::Access(AccessFault::write(address, size.into(), fc, true, data)),
                None => Exception::Access(AccessFault::read(address, size.into(), fc, true)),
            }
        })
    }

    fn read_part(
        &mut self,
        bus: &mut dyn PhysBus,
        address: u32,
        size: Size,
        fc: FunctionCode,
    ) -> Outcome<u32> {
        let physical = self.translate_for(bus, address, size, fc, None)?;
        self.accesses += 1;
        let value = match size {
            Size::Byte => bus.read8(physical).map(u32::from),
            Size::Word => bus.read16(physical).map(u32::from),
            Size::Long => bus.read32(physical),
        };
        value.map_err(|_| Exception::Access(AccessFault::read(address, size.into(), fc, false)))
    }

    fn write_part(
        &mut self,
        bus: &mut dyn PhysBus,
        address: u32,
        size: Size,
        value: u32,
        fc: FunctionCode,
    ) -> Outcome<()> {
        let physical = self.translate_for(bus, address, size, fc, Some(value))?;
        self.accesses += 1;
        let result = match size {
            Size::Byte => bus.write8(physical, value as u8),
            Size::Word => bus.write16(physical, value as u16),
            Size::Long => bus.write32(physical, value),
        };
        result.map_err(|_| {
            Exception::Access(AccessFault::write(address, size.into(), fc, false, value))
        })
    }

    /// Read with an explicit function code (MOVES, RTE write-backs, frames).
    pub(crate) fn read_fc(
        &mut self,
        bus: &mut dyn PhysBus,
        address: u32,
        size: Size,
        fc: FunctionCode,
    ) -> Outcome<u32> {
        if !self.crosses_page(address, size) {
            return self.read_part(bus, address, size, fc);
        }
        let mut value = 0;
        for i in 0..size.bytes() {
            let byte = self.read_part(bus, address.wrapping_add(i), Size::Byte, fc)?;
            value = (value << 8) | byte;
        }
        Ok(value)
    }

    /// Write with an explicit function code.
    pub(crate) fn write_fc(
        &mut self,
        bus: &mut dyn PhysBus,
        address: u32,
        size: Size,
        value: u32,
        fc: FunctionCode,
    ) -> Outcome<()> {
        if !self.crosses_page(address, size) {
            return self.write_part(bus, address, size, value, fc);
        }
        let result = self.write_split(bus, address, size, value, fc);
        if result.is_err() {
            // split writes never complete through a write-back slot
            self.restart_writes = true;
        }
        result
    }

    /// Page-crossing write. Every byte is translated before any is stored,
    /// so a translation fault leaves memory untouched.
    fn write_split(
        &mut self,
        bus: &mut dyn PhysBus,
        address: u32,
        size: Size,
        value: u32,
        fc: FunctionCode,
    ) -> Outcome<()> {
        let bytes = size.bytes() as usize;
        let mut physical = [0u32; 4];
        for (i, slot) in physical.iter_mut().enumerate().take(bytes) {
            let part = address.wrapping_add(i as u32);
            *slot = self.translate_for(bus, part, size, fc, Some(value))?;
        }
        for (i, &target) in physical.iter().enumerate().take(bytes) {
            let byte = (value >> (8 * (bytes - 1 - i))) as u8;
            self.accesses += 1;
            let part = address.wrapping_add(i as u32);
            bus.write8(target, byte)
                .map_err(|_| Exception::Access(AccessFault::write(part, size.into(), fc, false, value)))?;
        }
        Ok(())
    }

    pub(crate) fn read_data(&mut self, bus: &mut dyn PhysBus, address: u32, size: Size) -> Outcome<u32> {
        let fc = self.data_fc();
        self.read_fc(bus, address, size, fc)
    }

    pub(crate) fn write_data(
        &mut self,
        bus: &mut dyn PhysBus,
        address: u32,
        size: Size,
        value: u32,
    ) -> Outcome<()> {
        let fc = self.data_fc();
        self.write_fc(bus, address, size, value, fc)
    }

    /// Fetch the next instruction word and advance PC.
    pub(crate) fn fetch_word(&mut self, bus: &mut dyn PhysBus) -> Outcome<u16> {
        let pc = self.regs.pc;
        let fc = self.program_fc();
        if pc & 1 != 0 {
            return Err(Exception::AddressError {
                address: pc,
                fc,
                write: false,
            });
        }
        let word = self.read_fc(bus, pc, Size::Word, fc)? as u16;
        if pc == self.instr_pc.wrapping_add(2) {
            self.stage_b = word;
        }
        self.regs.pc = pc.wrapping_add(2);
        Ok(word)
    }

    pub(crate) fn fetch_long(&mut self, bus: &mut dyn PhysBus) -> Outcome<u32> {
        let hi = self.fetch_word(bus)?;
        let lo = self.fetch_word(bus)?;
        Ok((u32::from(hi) << 16) | u32::from(lo))
    }

    /// Push onto the active stack. A7 is logged so a faulting push unwinds.
    pub(crate) fn push(&mut self, bus: &mut dyn PhysBus, size: Size, value: u32) -> Outcome<()> {
        let sp = self.regs.active_sp();
        self.fixups.record(7, sp);
        let sp = sp.wrapping_sub(size.bytes());
        self.regs.set_active_sp(sp);
        self.write_data(bus, sp, size, value)
    }

    /// Pop from the active stack.
    pub(crate) fn pop(&mut self, bus: &mut dyn PhysBus, size: Size) -> Outcome<u32> {
        let sp = self.regs.active_sp();
        let value = self.read_data(bus, sp, size)?;
        self.fixups.record(7, sp);
        self.regs.set_active_sp(sp.wrapping_add(size.bytes()));
        Ok(value)
    }
}
