//! Per-model opcode dispatch table.
//!
//! Built from the shared descriptor table for one CPU/FPU pairing. Each of
//! the 65536 opcodes resolves to a [`Handler`]: either an instruction family
//! to execute, or the vector an illegal opcode raises.

use tracing::{debug, error};

use crate::decode::{self, Family, Requires};
use crate::error::ConfigError;
use crate::fault::vector;
use crate::model::{self, CpuModel, FpuModel};

/// What happens when an opcode is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handler {
    Execute(Family),
    Illegal { vector: u8 },
}

/// 65536-entry handler table for one CPU configuration.
#[derive(Debug, Clone)]
pub struct DispatchTable {
    handlers: Box<[Handler]>,
    cpu: CpuModel,
    fpu: FpuModel,
}

/// Vector for an opcode with no handler: line A and line F have their own.
#[must_use]
pub fn illegal_vector(opcode: u16) -> u8 {
    match opcode >> 12 {
        0xA => vector::LINE_A,
        0xF => vector::LINE_F,
        _ => vector::ILLEGAL,
    }
}

impl DispatchTable {
    /// Build the table for a CPU/FPU pairing.
    ///
    /// Rebuilding for the same pairing produces an identical table.
    pub fn build(cpu: CpuModel, fpu: FpuModel) -> Result<Self, ConfigError> {
        if let Err(err) = model::validate(cpu, fpu) {
            error!(%err, "dispatch: configuration fault");
            return Err(err);
        }
        let level = cpu.level();
        let handlers: Box<[Handler]> = decode::table()
            .iter()
            .enumerate()
            .map(|(opcode, descriptor)| {
                let opcode = opcode as u16;
                let Some(d) = descriptor else {
                    return Handler::Illegal {
                        vector: illegal_vector(opcode),
                    };
                };
                if level < d.min_level || level > d.max_level {
                    return Handler::Illegal {
                        vector: illegal_vector(opcode),
                    };
                }
                if d.requires == Requires::Fpu && !fpu.is_present() {
                    // LC040: FPU opcodes trap with a format 4 frame
                    return if cpu == CpuModel::M68040 {
                        Handler::Execute(Family::FpuUnimplemented)
                    } else {
                        Handler::Illegal {
                            vector: vector::LINE_F,
                        }
                    };
                }
                Handler::Execute(d.family)
            })
            .collect();
        debug!(cpu = cpu.name(), ?fpu, "dispatch: table built");
        Ok(Self { handlers, cpu, fpu })
    }

    #[must_use]
    pub fn handler(&self, opcode: u16) -> Handler {
        self.handlers[usize::from(opcode)]
    }

    #[must_use]
    pub fn cpu(&self) -> CpuModel {
        self.cpu
    }

    #[must_use]
    pub fn fpu(&self) -> FpuModel {
        self.fpu
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_filters_line_f_groups() {
        let m030 = DispatchTable::build(CpuModel::M68030, FpuModel::M68882).unwrap();
        let m040 = DispatchTable::build(CpuModel::M68040, FpuModel::Internal).unwrap();
        // PMOVE is 68030 only, PFLUSHA 68040 only
        assert_eq!(m030.handler(0xF000), Handler::Execute(Family::Pmmu030));
        assert_eq!(m040.handler(0xF000), Handler::Illegal { vector: 11 });
        assert_eq!(m040.handler(0xF518), Handler::Execute(Family::Pflush040));
        assert_eq!(m030.handler(0xF518), Handler::Illegal { vector: 11 });
    }

    #[test]
    fn missing_fpu_depends_on_model() {
        let m030 = DispatchTable::build(CpuModel::M68030, FpuModel::None).unwrap();
        let lc040 = DispatchTable::build(CpuModel::M68040, FpuModel::None).unwrap();
        assert_eq!(m030.handler(0xF200), Handler::Illegal { vector: 11 });
        assert_eq!(lc040.handler(0xF200), Handler::Execute(Family::FpuUnimplemented));
    }

    #[test]
    fn illegal_vectors_by_line() {
        let table = DispatchTable::build(CpuModel::M68040, FpuModel::Internal).unwrap();
        assert_eq!(table.handler(0x4AFC), Handler::Illegal { vector: 4 });
        assert_eq!(table.handler(0xA123), Handler::Illegal { vector: 10 });
        assert_eq!(table.handler(0x4E71), Handler::Execute(Family::Nop));
    }

    #[test]
    fn rebuild_is_idempotent_and_rejects_bad_pairings() {
        let a = DispatchTable::build(CpuModel::M68030, FpuModel::M68881).unwrap();
        let b = DispatchTable::build(CpuModel::M68030, FpuModel::M68881).unwrap();
        assert!((0..=u16::MAX).all(|op| a.handler(op) == b.handler(op)));
        assert!(DispatchTable::build(CpuModel::M68030, FpuModel::Internal).is_err());
    }
}
