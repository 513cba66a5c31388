//! Paged memory management unit.
//!
//! Translation runs in a fixed order:
//!
//! 1. MMU disabled: identity.
//! 2. Transparent translation registers (instruction or data pair).
//! 3. ATC probe. A write hit on a line that is not yet modified is a soft
//!    miss and goes to the table walk so MODIFIED lands in memory.
//! 4. Table walk from URP/SRP, fill one ATC line, check rights again.
//!
//! The 68030 PMMU registers are mapped onto the same pipeline by
//! [`pmmu030`]; both models use the same descriptor format and page
//! geometry.

pub mod atc;
pub mod pmmu030;
pub mod ttr;
pub mod walk;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::bus::{FunctionCode, PhysBus};
use atc::{Atc, AtcKind, AtcLine};
use ttr::TtMatch;
use walk::WalkFault;

/// TCR enable bit.
pub const TCR_ENABLE: u16 = 1 << 15;
/// TCR page size bit (set = 8K pages).
pub const TCR_PAGE_8K: u16 = 1 << 14;

const ROOT_MASK: u32 = 0xFFFF_FE00;

/// Page-size dependent constants, computed once per translation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageGeometry {
    /// log2(page size).
    pub shift: u32,
    /// Byte offset within a page.
    pub offset_mask: u32,
    /// Mask applied to the page-table index.
    pub index_mask: u32,
    /// Alignment mask of a page table address in a pointer descriptor.
    pub table_mask: u32,
}

impl PageGeometry {
    #[must_use]
    pub const fn new(eight_k: bool) -> Self {
        if eight_k {
            Self {
                shift: 13,
                offset_mask: 0x1FFF,
                index_mask: 0x1F,
                table_mask: 0xFFFF_FF80,
            }
        } else {
            Self {
                shift: 12,
                offset_mask: 0x0FFF,
                index_mask: 0x3F,
                table_mask: 0xFFFF_FF00,
            }
        }
    }

    #[must_use]
    pub const fn page_number(self, address: u32) -> u32 {
        address >> self.shift
    }

    #[must_use]
    pub const fn page_size(self) -> u32 {
        1 << self.shift
    }
}

/// Mode and direction of one access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Access {
    pub supervisor: bool,
    /// Instruction stream (program space) rather than data.
    pub program: bool,
    pub write: bool,
}

impl Access {
    #[must_use]
    pub fn fc(self) -> FunctionCode {
        FunctionCode::from_flags(self.supervisor, self.program)
    }

    fn kind(self) -> AtcKind {
        if self.program {
            AtcKind::Instruction
        } else {
            AtcKind::Data
        }
    }
}

/// Why a translation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranslationFault {
    /// Write to a write-protected page or transparent window.
    WriteProtected,
    /// User access to a supervisor-only page.
    Supervisor,
    /// Invalid descriptor on the walk path.
    Invalid,
    /// Bus error while reading or updating a descriptor.
    Bus { address: u32 },
}

impl From<WalkFault> for TranslationFault {
    fn from(fault: WalkFault) -> Self {
        match fault {
            WalkFault::Invalid { .. } => Self::Invalid,
            WalkFault::Bus { address } => Self::Bus { address },
        }
    }
}

/// Which register model the MMU presents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MmuFlavor {
    /// 68030 PMMU: TC/CRP/SRP/TT0/TT1 through PMOVE.
    Pmmu030,
    /// 68040: TCR/URP/SRP/ITTn/DTTn through MOVEC.
    Mmu040,
}

/// MMU registers and the ATC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mmu {
    flavor: MmuFlavor,
    tcr: u16,
    urp: u32,
    srp: u32,
    itt: [u32; 2],
    dtt: [u32; 2],
    mmusr: u32,
    atc: Atc,
    pub(crate) pmmu: pmmu030::PmmuRegisters,
    walks: u64,
}

impl Mmu {
    #[must_use]
    pub fn new(flavor: MmuFlavor) -> Self {
        Self {
            flavor,
            tcr: 0,
            urp: 0,
            srp: 0,
            itt: [0; 2],
            dtt: [0; 2],
            mmusr: 0,
            atc: Atc::new(),
            pmmu: pmmu030::PmmuRegisters::default(),
            walks: 0,
        }
    }

    /// Reset: translation off, windows off, ATC empty.
    pub fn reset(&mut self) {
        let walks = self.walks;
        *self = Self::new(self.flavor);
        self.walks = walks;
    }

    #[must_use]
    pub fn flavor(&self) -> MmuFlavor {
        self.flavor
    }

    pub fn set_flavor(&mut self, flavor: MmuFlavor) {
        if flavor != self.flavor {
            self.flavor = flavor;
            self.reset();
        }
    }

    #[must_use]
    pub fn enabled(&self) -> bool {
        match self.flavor {
            MmuFlavor::Mmu040 => self.tcr & TCR_ENABLE != 0,
            MmuFlavor::Pmmu030 => self.pmmu.enabled(),
        }
    }

    #[must_use]
    pub fn geometry(&self) -> PageGeometry {
        match self.flavor {
            MmuFlavor::Mmu040 => PageGeometry::new(self.tcr & TCR_PAGE_8K != 0),
            MmuFlavor::Pmmu030 => PageGeometry::new(self.pmmu.eight_k()),
        }
    }

    /// Number of table walks performed since creation.
    #[must_use]
    pub fn walk_count(&self) -> u64 {
        self.walks
    }

    #[must_use]
    pub fn atc(&self) -> &Atc {
        &self.atc
    }

    // --- 68040 register file -------------------------------------------

    #[must_use]
    pub fn tcr(&self) -> u16 {
        self.tcr
    }

    /// Write TCR. Any change of translation regime flushes the ATC.
    pub fn set_tcr(&mut self, value: u16) {
        self.tcr = value & (TCR_ENABLE | TCR_PAGE_8K);
        self.atc.flush_all(true);
        debug!(tcr = format_args!("{:#06X}", self.tcr), "mmu: TCR written, ATC flushed");
    }

    #[must_use]
    pub fn urp(&self) -> u32 {
        self.urp
    }

    pub fn set_urp(&mut self, value: u32) {
        self.urp = value & ROOT_MASK;
    }

    #[must_use]
    pub fn srp(&self) -> u32 {
        self.srp
    }

    pub fn set_srp(&mut self, value: u32) {
        self.srp = value & ROOT_MASK;
    }

    #[must_use]
    pub fn itt(&self, n: usize) -> u32 {
        self.itt[n & 1]
    }

    pub fn set_itt(&mut self, n: usize, value: u32) {
        self.itt[n & 1] = value & ttr::TTR_MASK;
        self.atc.flush_all(true);
    }

    #[must_use]
    pub fn dtt(&self, n: usize) -> u32 {
        self.dtt[n & 1]
    }

    pub fn set_dtt(&mut self, n: usize, value: u32) {
        self.dtt[n & 1] = value & ttr::TTR_MASK;
        self.atc.flush_all(true);
    }

    #[must_use]
    pub fn mmusr(&self) -> u32 {
        self.mmusr
    }

    pub fn set_mmusr(&mut self, value: u32) {
        self.mmusr = value;
    }

    /// Root pointer for a table search in the given mode.
    fn root(&self, supervisor: bool) -> u32 {
        match self.flavor {
            MmuFlavor::Mmu040 => {
                if supervisor {
                    self.srp
                } else {
                    self.urp
                }
            }
            MmuFlavor::Pmmu030 => self.pmmu.root(supervisor),
        }
    }

    fn transparent(&self, address: u32, access: Access) -> TtMatch {
        match self.flavor {
            MmuFlavor::Mmu040 => {
                let pair = if access.program { self.itt } else { self.dtt };
                ttr::match_pair(pair, address, access, false)
            }
            MmuFlavor::Pmmu030 => ttr::match_pair(self.pmmu.tt, address, access, true),
        }
    }

    // --- Translation ---------------------------------------------------

    /// Translate a logical address to a physical one.
    pub fn translate(
        &mut self,
        bus: &mut dyn PhysBus,
        address: u32,
        access: Access,
    ) -> Result<u32, TranslationFault> {
        if !self.enabled() {
            return Ok(address);
        }
        match self.transparent(address, access) {
            TtMatch::Hit => return Ok(address),
            TtMatch::WriteProtected => return Err(TranslationFault::WriteProtected),
            TtMatch::Miss => {}
        }

        let geometry = self.geometry();
        let tag = geometry.page_number(address);
        let kind = access.kind();

        let mut refill_way = None;
        if let Some((way, line)) = self.atc.lookup(kind, tag, access.supervisor) {
            Self::check_rights(line, access)?;
            if !access.write || line.modified {
                return Ok(line.physical | (address & geometry.offset_mask));
            }
            // soft miss: MODIFIED must reach the page descriptor
            refill_way = Some(way);
        }

        let line = self.walk(bus, address, access, geometry)?;
        self.atc.fill(kind, line, refill_way);
        Self::check_rights(line, access)?;
        Ok(line.physical | (address & geometry.offset_mask))
    }

    fn check_rights(line: AtcLine, access: Access) -> Result<(), TranslationFault> {
        if line.supervisor_only && !access.supervisor {
            return Err(TranslationFault::Supervisor);
        }
        if access.write && line.write_protected {
            return Err(TranslationFault::WriteProtected);
        }
        Ok(())
    }

    fn walk(
        &mut self,
        bus: &mut dyn PhysBus,
        address: u32,
        access: Access,
        geometry: PageGeometry,
    ) -> Result<AtcLine, TranslationFault> {
        self.walks += 1;
        let root = self.root(access.supervisor);
        let result = walk::walk(bus, root, address, access.supervisor, access.write, geometry)?;
        debug!(
            logical = format_args!("{address:#010X}"),
            physical = format_args!("{:#010X}", result.line.physical),
            "mmu: table walk"
        );
        Ok(result.line)
    }

    /// Flush ATC lines for the page containing `address` (PFLUSH/PFLUSHN).
    pub fn flush(&mut self, address: u32, supervisor: bool, global: bool) {
        let tag = self.geometry().page_number(address);
        self.atc.flush_page(tag, supervisor, global);
    }

    /// Flush the whole ATC (PFLUSHA/PFLUSHAN).
    pub fn flush_all(&mut self, global: bool) {
        self.atc.flush_all(global);
        debug!(global, "mmu: ATC flushed");
    }

    /// PTESTR/PTESTW: search the translation for `address`, load the ATC and
    /// report the result in MMUSR.
    ///
    /// MMUSR: physical page | B(11) | G(10) | U1U0(9:8) | S(7) | CM(6:5) |
    /// M(4) | W(2) | T(1) | R(0).
    pub fn ptest(&mut self, bus: &mut dyn PhysBus, address: u32, fc: FunctionCode, write: bool) {
        let access = Access {
            supervisor: fc.is_supervisor(),
            program: fc.is_program(),
            write,
        };
        self.mmusr = self.probe(bus, address, access);
    }

    fn probe(&mut self, bus: &mut dyn PhysBus, address: u32, access: Access) -> u32 {
        let read = Access { write: false, ..access };
        if self.transparent(address, read) != TtMatch::Miss {
            let write = Access { write: true, ..access };
            let protected = self.transparent(address, write) == TtMatch::WriteProtected;
            let w = if protected { walk::DESC_WRITE_PROTECT } else { 0 };
            return (address & 0xFFFF_F000) | w | 0x3;
        }
        let geometry = self.geometry();
        self.walks += 1;
        let root = self.root(access.supervisor);
        match walk::walk(bus, root, address, access.supervisor, access.write, geometry) {
            Ok(result) => {
                self.atc.replace(access.kind(), result.line);
                let desc = result.descriptor;
                let mut status = (result.line.physical & 0xFFFF_F000)
                    | (desc & (walk::DESC_GLOBAL | 0x0300 | walk::DESC_SUPERVISOR | 0x0060))
                    | 1;
                if result.line.modified {
                    status |= walk::DESC_MODIFIED;
                }
                if result.line.write_protected {
                    status |= walk::DESC_WRITE_PROTECT;
                }
                status
            }
            Err(WalkFault::Invalid { .. }) => 0,
            Err(WalkFault::Bus { .. }) => 1 << 11,
        }
    }

    /// Result of the last PTEST in the 68030 MMUSR layout.
    #[must_use]
    pub fn mmusr_030(&self) -> u16 {
        pmmu030::mmusr_from_040(self.mmusr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::FlatBus;

    const ROOT: u32 = 0x8000;

    fn mapped() -> (Mmu, FlatBus) {
        let mut bus = FlatBus::new(0x1_0000);
        bus.poke32(ROOT, 0x8200 | 2);
        bus.poke32(0x8200, 0x8400 | 2);
        // page 1 -> 0x2000, read only; page 2 -> 0x3000 writable
        bus.poke32(0x8404, 0x2000 | 0x4 | 1);
        bus.poke32(0x8408, 0x3000 | 1);
        let mut mmu = Mmu::new(MmuFlavor::Mmu040);
        mmu.set_srp(ROOT);
        mmu.set_urp(ROOT);
        mmu.set_tcr(TCR_ENABLE);
        (mmu, bus)
    }

    const READ: Access = Access {
        supervisor: true,
        program: false,
        write: false,
    };
    const WRITE: Access = Access {
        supervisor: true,
        program: false,
        write: true,
    };

    #[test]
    fn disabled_is_identity() {
        let mut mmu = Mmu::new(MmuFlavor::Mmu040);
        let mut bus = FlatBus::new(16);
        assert_eq!(mmu.translate(&mut bus, 0xDEAD_BEEF, WRITE), Ok(0xDEAD_BEEF));
        assert_eq!(mmu.walk_count(), 0);
    }

    #[test]
    fn repeat_translation_hits_the_atc() {
        let (mut mmu, mut bus) = mapped();
        assert_eq!(mmu.translate(&mut bus, 0x1234, READ), Ok(0x2234));
        assert_eq!(mmu.walk_count(), 1);
        assert_eq!(mmu.translate(&mut bus, 0x1FFC, READ), Ok(0x2FFC));
        assert_eq!(mmu.walk_count(), 1);
    }

    #[test]
    fn write_to_read_only_page_faults() {
        let (mut mmu, mut bus) = mapped();
        assert_eq!(
            mmu.translate(&mut bus, 0x1000, WRITE),
            Err(TranslationFault::WriteProtected)
        );
        assert_eq!(bus.peek32(0x8404) & walk::DESC_MODIFIED, 0);
    }

    #[test]
    fn first_write_after_read_is_a_soft_miss() {
        let (mut mmu, mut bus) = mapped();
        mmu.translate(&mut bus, 0x2000, READ).unwrap();
        assert_eq!(bus.peek32(0x8408) & walk::DESC_MODIFIED, 0);
        mmu.translate(&mut bus, 0x2000, WRITE).unwrap();
        assert_eq!(mmu.walk_count(), 2);
        assert_ne!(bus.peek32(0x8408) & walk::DESC_MODIFIED, 0);
        mmu.translate(&mut bus, 0x2004, WRITE).unwrap();
        assert_eq!(mmu.walk_count(), 2);
        assert_eq!(mmu.atc().valid_lines(), 1);
    }

    #[test]
    fn ttr_bypasses_the_tables() {
        let (mut mmu, mut bus) = mapped();
        mmu.set_dtt(0, 0x0000_C000);
        assert_eq!(mmu.translate(&mut bus, 0x1000, WRITE), Ok(0x1000));
        assert_eq!(mmu.walk_count(), 0);
    }

    #[test]
    fn tcr_write_flushes() {
        let (mut mmu, mut bus) = mapped();
        mmu.translate(&mut bus, 0x1000, READ).unwrap();
        mmu.set_tcr(TCR_ENABLE);
        assert_eq!(mmu.atc().valid_lines(), 0);
        mmu.set_urp(ROOT);
        mmu.translate(&mut bus, 0x1000, READ).unwrap();
        mmu.set_srp(ROOT);
        assert_eq!(mmu.atc().valid_lines(), 1);
    }

    #[test]
    fn ptest_reports_protection_and_residency() {
        let (mut mmu, mut bus) = mapped();
        mmu.ptest(&mut bus, 0x1000, FunctionCode::SupervisorData, false);
        assert_eq!(mmu.mmusr() & 0xFFFF_F000, 0x2000);
        assert_eq!(mmu.mmusr() & 0x5, 0x5);
        mmu.ptest(&mut bus, 0x9000, FunctionCode::SupervisorData, false);
        assert_eq!(mmu.mmusr() & 1, 0);
    }
}
