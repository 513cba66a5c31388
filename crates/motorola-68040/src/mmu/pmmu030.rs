//! 68030 PMMU register front end.
//!
//! The 68030 reaches its MMU through PMOVE with a command word:
//!
//! ```text
//! 000 ppp r f 00000000   TT0 (ppp=010) / TT1 (ppp=011)
//! 010 ppp r f 00000000   TC (000) / SRP (010) / CRP (011)
//! 011 000 r 0 00000000   MMUSR
//! ```
//!
//! `r` = 1 moves the register to memory, `f` suppresses the ATC flush.
//! Translation itself runs on the shared pipeline, which walks three levels
//! of short descriptors split 7/7/6 (4K pages) or 7/7/5 (8K pages). An
//! enabled TC must describe exactly that split, and CRP/SRP must point at
//! short descriptors (DT = 2); anything else is a configuration fault.

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{Mmu, PageGeometry};

const TC_ENABLE: u32 = 1 << 31;
const TC_SRE: u32 = 1 << 25;
const TC_FCL: u32 = 1 << 24;
const TC_PS_SHIFT: u32 = 20;
const TC_IS_SHIFT: u32 = 16;
/// Root and pointer levels (TIA, TIB) are always 7 bits wide.
const TC_TOP_LEVELS: u32 = 0x77;

/// Root pointer descriptor type for 4-byte (short) table descriptors.
const DT_SHORT: u64 = 2;

/// Whether an enabled TC matches the walk the pipeline performs: no
/// function-code level, no initial shift, TIA = TIB = 7, TIC = the page
/// index width and TID unused.
fn supported_layout(tc: u32) -> bool {
    let eight_k = match (tc >> TC_PS_SHIFT) & 0xF {
        0xC => false,
        0xD => true,
        _ => return false,
    };
    let tic = PageGeometry::new(eight_k).index_mask.count_ones();
    tc & TC_FCL == 0
        && (tc >> TC_IS_SHIFT) & 0xF == 0
        && (tc >> 8) & 0xFF == TC_TOP_LEVELS
        && (tc >> 4) & 0xF == tic
        && tc & 0xF == 0
}

fn root_pointer_ok(value: u64) -> bool {
    (value >> 32) & 3 == DT_SHORT
}

/// Raw 68030 MMU registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PmmuRegisters {
    pub tc: u32,
    pub crp: u64,
    pub srp: u64,
    pub tt: [u32; 2],
}

impl PmmuRegisters {
    #[must_use]
    pub fn enabled(&self) -> bool {
        self.tc & TC_ENABLE != 0
    }

    #[must_use]
    pub fn eight_k(&self) -> bool {
        (self.tc >> TC_PS_SHIFT) & 0xF == 0xD
    }

    /// Table address for a search: SRP for supervisor accesses when SRE is
    /// set, CRP otherwise.
    #[must_use]
    pub fn root(&self, supervisor: bool) -> u32 {
        let pointer = if supervisor && self.tc & TC_SRE != 0 {
            self.srp
        } else {
            self.crp
        };
        (pointer as u32) & 0xFFFF_FFF0
    }
}

/// Register selected by a PMOVE command word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PmmuRegister {
    Tc,
    Srp,
    Crp,
    Tt0,
    Tt1,
    Mmusr,
}

impl PmmuRegister {
    /// Decode the register field of a PMOVE command word.
    #[must_use]
    pub fn decode(command: u16) -> Option<Self> {
        let preg = (command >> 10) & 7;
        match command >> 13 {
            0b000 => match preg {
                0b010 => Some(Self::Tt0),
                0b011 => Some(Self::Tt1),
                _ => None,
            },
            0b010 => match preg {
                0b000 => Some(Self::Tc),
                0b010 => Some(Self::Srp),
                0b011 => Some(Self::Crp),
                _ => None,
            },
            0b011 if preg == 0 => Some(Self::Mmusr),
            _ => None,
        }
    }

    /// Operand size in bytes.
    #[must_use]
    pub fn bytes(self) -> u32 {
        match self {
            Self::Srp | Self::Crp => 8,
            Self::Mmusr => 2,
            Self::Tc | Self::Tt0 | Self::Tt1 => 4,
        }
    }
}

/// TC was enabled with a layout the pipeline cannot translate, or a root
/// pointer names a descriptor type it cannot walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigurationFault;

impl Mmu {
    /// PMOVE from an MMU register.
    #[must_use]
    pub fn pmmu_read(&self, reg: PmmuRegister) -> u64 {
        match reg {
            PmmuRegister::Tc => u64::from(self.pmmu.tc),
            PmmuRegister::Srp => self.pmmu.srp,
            PmmuRegister::Crp => self.pmmu.crp,
            PmmuRegister::Tt0 => u64::from(self.pmmu.tt[0]),
            PmmuRegister::Tt1 => u64::from(self.pmmu.tt[1]),
            PmmuRegister::Mmusr => u64::from(self.mmusr_030()),
        }
    }

    /// PMOVE to an MMU register.
    ///
    /// Enabling TC with any other layout than the 7/7/6 or 7/7/5 split
    /// leaves translation off and reports a configuration fault (vector 56).
    /// A CRP or SRP whose DT is not 2 is refused and also faults.
    pub fn pmmu_write(
        &mut self,
        reg: PmmuRegister,
        value: u64,
        flush: bool,
    ) -> Result<(), ConfigurationFault> {
        match reg {
            PmmuRegister::Tc => {
                let tc = value as u32;
                if tc & TC_ENABLE != 0 && !supported_layout(tc) {
                    warn!(tc = format_args!("{tc:#010X}"), "pmmu: unsupported TC layout");
                    self.pmmu.tc = tc & !TC_ENABLE;
                    self.atc.flush_all(true);
                    return Err(ConfigurationFault);
                }
                self.pmmu.tc = tc;
            }
            PmmuRegister::Srp | PmmuRegister::Crp if !root_pointer_ok(value) => {
                warn!(
                    ?reg,
                    value = format_args!("{value:#018X}"),
                    "pmmu: unsupported root pointer"
                );
                return Err(ConfigurationFault);
            }
            PmmuRegister::Srp => self.pmmu.srp = value,
            PmmuRegister::Crp => self.pmmu.crp = value,
            PmmuRegister::Tt0 => self.pmmu.tt[0] = value as u32 & super::ttr::TT030_MASK,
            PmmuRegister::Tt1 => self.pmmu.tt[1] = value as u32 & super::ttr::TT030_MASK,
            PmmuRegister::Mmusr => {
                self.mmusr = mmusr_to_040(value as u16);
                return Ok(());
            }
        }
        if flush {
            self.atc.flush_all(true);
        }
        Ok(())
    }
}

/// Convert a 68040-layout MMUSR to the 68030 layout:
/// B(15) L(14) S(13) W(11) I(10) M(9) T(6) N(2:0).
#[must_use]
pub fn mmusr_from_040(mmusr: u32) -> u16 {
    let mut status = 0u16;
    if mmusr & (1 << 11) != 0 {
        status |= 1 << 15;
    }
    if mmusr & (1 << 2) != 0 {
        status |= 1 << 11;
    }
    if mmusr & (1 << 4) != 0 {
        status |= 1 << 9;
    }
    if mmusr & (1 << 7) != 0 {
        status |= 1 << 13;
    }
    if mmusr & (1 << 1) != 0 {
        status |= 1 << 6;
    } else if mmusr & 1 != 0 {
        // resolved through three table levels
        status |= 3;
    } else {
        status |= 1 << 10;
    }
    status
}

fn mmusr_to_040(status: u16) -> u32 {
    let mut mmusr = 0;
    if status & (1 << 15) != 0 {
        mmusr |= 1 << 11;
    }
    if status & (1 << 11) != 0 {
        mmusr |= 1 << 2;
    }
    if status & (1 << 9) != 0 {
        mmusr |= 1 << 4;
    }
    if status & (1 << 13) != 0 {
        mmusr |= 1 << 7;
    }
    if status & (1 << 6) != 0 {
        mmusr |= 0x3;
    } else if status & (1 << 10) == 0 {
        mmusr |= 1;
    }
    mmusr
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mmu::MmuFlavor;

    #[test]
    fn decodes_pmove_registers() {
        assert_eq!(PmmuRegister::decode(0x4000), Some(PmmuRegister::Tc));
        assert_eq!(PmmuRegister::decode(0x4C00), Some(PmmuRegister::Crp));
        assert_eq!(PmmuRegister::decode(0x4800), Some(PmmuRegister::Srp));
        assert_eq!(PmmuRegister::decode(0x0800), Some(PmmuRegister::Tt0));
        assert_eq!(PmmuRegister::decode(0x0C00), Some(PmmuRegister::Tt1));
        assert_eq!(PmmuRegister::decode(0x6000), Some(PmmuRegister::Mmusr));
        assert_eq!(PmmuRegister::decode(0x4400), None);
    }

    #[test]
    fn tc_accepts_only_4k_and_8k_pages() {
        let mut mmu = Mmu::new(MmuFlavor::Pmmu030);
        assert!(mmu.pmmu_write(PmmuRegister::Tc, 0x80C0_7760, true).is_ok());
        assert!(mmu.enabled());
        assert_eq!(mmu.geometry().page_size(), 4096);
        assert!(mmu.pmmu_write(PmmuRegister::Tc, 0x80D0_7750, true).is_ok());
        assert_eq!(mmu.geometry().page_size(), 8192);
        assert_eq!(
            mmu.pmmu_write(PmmuRegister::Tc, 0x80A0_7780, true),
            Err(ConfigurationFault)
        );
        assert!(!mmu.enabled());
    }

    #[test]
    fn tc_must_match_the_walk_split() {
        let mut mmu = Mmu::new(MmuFlavor::Pmmu030);
        for tc in [
            0x80C0_0000_u32, // no index fields
            0x80C8_7760, // initial shift
            0x81C0_7760, // function-code lookup
            0x80C0_8650, // 8/6/6
            0x80C0_7750, // TIC short for 4K pages
            0x80D0_7760, // TIC too wide for 8K pages
            0x80C0_7764, // TID in use
        ] {
            assert_eq!(
                mmu.pmmu_write(PmmuRegister::Tc, u64::from(tc), true),
                Err(ConfigurationFault),
                "{tc:#010X}"
            );
            assert!(!mmu.enabled());
        }
        // disabled TC is stored as is
        assert!(mmu.pmmu_write(PmmuRegister::Tc, 0x00C0_0000, true).is_ok());
    }

    #[test]
    fn root_pointers_need_short_descriptors() {
        let mut mmu = Mmu::new(MmuFlavor::Pmmu030);
        assert!(mmu.pmmu_write(PmmuRegister::Crp, 0x7FFF_0002_0000_1000, true).is_ok());
        for dt in [0u64, 1, 3] {
            let value = 0x7FFF_0000_0000_2000 | (dt << 32);
            assert_eq!(mmu.pmmu_write(PmmuRegister::Crp, value, true), Err(ConfigurationFault));
            assert_eq!(mmu.pmmu_write(PmmuRegister::Srp, value, true), Err(ConfigurationFault));
        }
        // the refused value never lands
        assert_eq!(mmu.pmmu_read(PmmuRegister::Crp), 0x7FFF_0002_0000_1000);
        assert_eq!(mmu.pmmu_read(PmmuRegister::Srp), 0);
    }

    #[test]
    fn sre_selects_the_supervisor_root() {
        let mut regs = PmmuRegisters {
            crp: 0x7FFF_0002_0000_1000,
            srp: 0x7FFF_0002_0000_2000,
            ..PmmuRegisters::default()
        };
        assert_eq!(regs.root(true), 0x1000);
        regs.tc = TC_SRE;
        assert_eq!(regs.root(true), 0x2000);
        assert_eq!(regs.root(false), 0x1000);
    }

    #[test]
    fn mmusr_layouts_agree() {
        // resident, write protected, modified
        let status = mmusr_from_040(0x2015);
        assert_eq!(status, (1 << 11) | (1 << 9) | 3);
        assert_eq!(mmusr_from_040(0), 1 << 10);
        assert_eq!(mmusr_to_040(1 << 10), 0);
    }
}
