//! Exception stack frame layouts.
//!
//! A frame is laid out as a big-endian byte image first and then pushed as
//! longwords, so the layout code never touches the bus and can be tested on
//! its own. Offsets are from the final stack pointer (the stacked SR).

use crate::fault::{Exception, ExceptionContext, Width};
use crate::model::CpuModel;

/// Largest frame (68030 long bus fault).
pub const MAX_FRAME: usize = 92;

/// Stack frame format, the high nibble of the format/vector word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameFormat {
    Normal = 0x0,
    Throwaway = 0x1,
    InstructionAddress = 0x2,
    FpPost = 0x3,
    FpUnimplemented = 0x4,
    AccessError = 0x7,
    CoprocessorMid = 0x9,
    ShortBusFault = 0xA,
    LongBusFault = 0xB,
}

impl FrameFormat {
    /// Decode a format nibble. Unknown nibbles have no layout.
    #[must_use]
    pub fn from_nibble(nibble: u16) -> Option<Self> {
        Some(match nibble & 0xF {
            0x0 => Self::Normal,
            0x1 => Self::Throwaway,
            0x2 => Self::InstructionAddress,
            0x3 => Self::FpPost,
            0x4 => Self::FpUnimplemented,
            0x7 => Self::AccessError,
            0x9 => Self::CoprocessorMid,
            0xA => Self::ShortBusFault,
            0xB => Self::LongBusFault,
            _ => return None,
        })
    }

    #[must_use]
    pub const fn nibble(self) -> u16 {
        self as u16
    }

    /// Frame size in bytes.
    #[must_use]
    pub const fn size(self) -> u32 {
        match self {
            Self::Normal | Self::Throwaway => 8,
            Self::InstructionAddress | Self::FpPost => 12,
            Self::FpUnimplemented => 16,
            Self::CoprocessorMid => 20,
            Self::ShortBusFault => 32,
            Self::AccessError => 60,
            Self::LongBusFault => 92,
        }
    }

    /// Whether RTE on this model accepts the format.
    #[must_use]
    pub const fn valid_for(self, model: CpuModel) -> bool {
        match self {
            Self::Normal | Self::Throwaway | Self::InstructionAddress => true,
            Self::FpPost | Self::FpUnimplemented | Self::AccessError => {
                matches!(model, CpuModel::M68040)
            }
            Self::CoprocessorMid | Self::ShortBusFault | Self::LongBusFault => {
                matches!(model, CpuModel::M68030)
            }
        }
    }
}

/// Pick the frame a model builds for an exception.
#[must_use]
pub fn select(exception: &Exception, model: CpuModel) -> FrameFormat {
    let m040 = model == CpuModel::M68040;
    match *exception {
        Exception::Access(fault) => match (m040, fault.write) {
            (true, _) => FrameFormat::AccessError,
            (false, true) => FrameFormat::ShortBusFault,
            (false, false) => FrameFormat::LongBusFault,
        },
        Exception::AddressError { .. } if m040 => FrameFormat::InstructionAddress,
        Exception::AddressError { .. } => FrameFormat::LongBusFault,
        Exception::Fault(_) | Exception::Trap(_) => FrameFormat::Normal,
        Exception::InstructionTrap(_) => FrameFormat::InstructionAddress,
        Exception::FpPostInstruction { .. } if m040 => FrameFormat::FpPost,
        Exception::FpUnimplemented { .. } if m040 => FrameFormat::FpUnimplemented,
        Exception::CoprocessorMidInstruction { .. } if !m040 => FrameFormat::CoprocessorMid,
        Exception::FpPostInstruction { .. }
        | Exception::FpUnimplemented { .. }
        | Exception::CoprocessorMidInstruction { .. } => FrameFormat::Normal,
    }
}

/// 68040 SSW bits.
pub mod ssw040 {
    pub const CP: u16 = 1 << 15;
    pub const CU: u16 = 1 << 14;
    pub const CT: u16 = 1 << 13;
    pub const CM: u16 = 1 << 12;
    pub const MA: u16 = 1 << 11;
    pub const ATC: u16 = 1 << 10;
    pub const LK: u16 = 1 << 9;
    /// Set for reads.
    pub const RW: u16 = 1 << 8;
    pub const SIZE_SHIFT: u16 = 5;
    pub const TT_SHIFT: u16 = 3;
    pub const TM_MASK: u16 = 7;
}

/// 68030 SSW bits.
pub mod ssw030 {
    pub const FC: u16 = 1 << 15;
    pub const FB: u16 = 1 << 14;
    pub const RC: u16 = 1 << 13;
    pub const RB: u16 = 1 << 12;
    pub const DF: u16 = 1 << 8;
    pub const RM: u16 = 1 << 7;
    /// Set for reads.
    pub const RW: u16 = 1 << 6;
    pub const SIZE_SHIFT: u16 = 4;
    pub const FC_MASK: u16 = 7;
}

/// Write-back status: valid bit plus size/TT/TM in SSW positions.
pub const WB_VALID: u16 = 0x80;

const fn size_040(width: Width) -> u16 {
    match width {
        Width::Long => 0,
        Width::Byte => 1,
        Width::Word => 2,
        Width::Line => 3,
    }
}

const fn size_030(width: Width) -> u16 {
    match width {
        Width::Byte => 1,
        Width::Word => 2,
        Width::Long | Width::Line => 0,
    }
}

/// 68040 special status word for an access error.
#[must_use]
pub fn ssw_040(ctx: &ExceptionContext) -> u16 {
    let mut ssw = u16::from(ctx.fc.bits()) & ssw040::TM_MASK;
    ssw |= size_040(ctx.width) << ssw040::SIZE_SHIFT;
    if !ctx.write {
        ssw |= ssw040::RW;
    }
    if ctx.atc {
        ssw |= ssw040::ATC;
    }
    if ctx.locked {
        ssw |= ssw040::LK;
    }
    ssw
}

/// 68030 special status word for a bus fault.
///
/// Instruction-stream faults mark stage B as faulted and rerun; data
/// faults set DF only when RTE is expected to redo the transfer.
#[must_use]
pub fn ssw_030(ctx: &ExceptionContext) -> u16 {
    let mut ssw = u16::from(ctx.fc.bits()) & ssw030::FC_MASK;
    ssw |= size_030(ctx.width) << ssw030::SIZE_SHIFT;
    if ctx.instruction {
        ssw |= ssw030::FB | ssw030::RB;
    } else if ctx.writeback {
        ssw |= ssw030::DF;
    }
    if !ctx.write {
        ssw |= ssw030::RW;
    }
    if ctx.locked {
        ssw |= ssw030::RM;
    }
    ssw
}

struct Image {
    bytes: [u8; MAX_FRAME],
}

impl Image {
    fn put16(&mut self, offset: usize, value: u16) {
        self.bytes[offset..offset + 2].copy_from_slice(&value.to_be_bytes());
    }

    fn put32(&mut self, offset: usize, value: u32) {
        self.bytes[offset..offset + 4].copy_from_slice(&value.to_be_bytes());
    }
}

/// Lay out a frame. Only the first `format.size()` bytes are meaningful.
#[must_use]
pub fn image(format: FrameFormat, ctx: &ExceptionContext) -> [u8; MAX_FRAME] {
    let mut img = Image {
        bytes: [0; MAX_FRAME],
    };
    img.put16(0, ctx.sr);
    img.put32(2, ctx.pc);
    img.put16(6, (format.nibble() << 12) | (u16::from(ctx.vector) << 2));
    match format {
        FrameFormat::Normal | FrameFormat::Throwaway => {}
        FrameFormat::InstructionAddress | FrameFormat::FpPost => img.put32(8, ctx.address),
        FrameFormat::FpUnimplemented => {
            img.put32(8, ctx.address);
            img.put32(12, ctx.old_pc);
        }
        FrameFormat::AccessError => {
            img.put32(8, ctx.address);
            img.put16(12, ssw_040(ctx));
            img.put32(20, ctx.address);
            if ctx.writeback {
                let status = WB_VALID
                    | (size_040(ctx.width) << ssw040::SIZE_SHIFT)
                    | (u16::from(ctx.fc.bits()) & ssw040::TM_MASK);
                img.put16(14, status);
                img.put32(24, ctx.address);
                img.put32(28, ctx.data);
            }
        }
        FrameFormat::CoprocessorMid => {
            img.put32(8, ctx.old_pc);
            img.put32(12, ctx.address);
        }
        FrameFormat::ShortBusFault | FrameFormat::LongBusFault => {
            img.put16(0x0A, ssw_030(ctx));
            // instruction pipe: stage C then stage B
            img.put16(0x0C, ctx.opcode);
            img.put16(0x0E, ctx.stage_b);
            img.put32(0x10, ctx.address);
            img.put32(0x18, ctx.data);
            if format == FrameFormat::LongBusFault {
                img.put32(0x24, ctx.old_pc.wrapping_add(4));
            }
        }
    }
    img.bytes
}

/// Read a big-endian word out of a frame image.
#[must_use]
pub fn word_at(image: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([image[offset], image[offset + 1]])
}

/// Read a big-endian long out of a frame image.
#[must_use]
pub fn long_at(image: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes([
        image[offset],
        image[offset + 1],
        image[offset + 2],
        image[offset + 3],
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::FunctionCode;
    use crate::fault::{AccessFault, vector};

    fn access_ctx(write: bool) -> ExceptionContext {
        ExceptionContext {
            address: 0x1000,
            write,
            width: Width::Long,
            fc: FunctionCode::UserData,
            old_pc: 0x400,
            data: 0xDEAD_BEEF,
            atc: true,
            opcode: 0x2080,
            stage_b: 0x0010,
            writeback: write,
            ..ExceptionContext::new(vector::ACCESS_FAULT, 0x404, 0x0000)
        }
    }

    #[test]
    fn access_faults_pick_model_frames() {
        let read = Exception::Access(AccessFault::read(0, Width::Word, FunctionCode::UserData, true));
        let write = Exception::Access(AccessFault::write(0, Width::Word, FunctionCode::UserData, true, 0));
        assert_eq!(select(&read, CpuModel::M68040), FrameFormat::AccessError);
        assert_eq!(select(&write, CpuModel::M68040), FrameFormat::AccessError);
        assert_eq!(select(&read, CpuModel::M68030), FrameFormat::LongBusFault);
        assert_eq!(select(&write, CpuModel::M68030), FrameFormat::ShortBusFault);
    }

    #[test]
    fn sizes_and_validity() {
        assert_eq!(FrameFormat::AccessError.size(), 60);
        assert_eq!(FrameFormat::LongBusFault.size(), 92);
        assert!(FrameFormat::AccessError.valid_for(CpuModel::M68040));
        assert!(!FrameFormat::AccessError.valid_for(CpuModel::M68030));
        assert!(FrameFormat::ShortBusFault.valid_for(CpuModel::M68030));
        assert_eq!(FrameFormat::from_nibble(0x5), None);
    }

    #[test]
    fn format7_write_lands_in_wb3() {
        let img = image(FrameFormat::AccessError, &access_ctx(true));
        assert_eq!(word_at(&img, 6), 0x7008);
        assert_eq!(long_at(&img, 20), 0x1000);
        let ssw = word_at(&img, 12);
        assert_eq!(ssw & ssw040::RW, 0);
        assert_ne!(ssw & ssw040::ATC, 0);
        assert_eq!(word_at(&img, 14), WB_VALID | 1);
        assert_eq!(long_at(&img, 24), 0x1000);
        assert_eq!(long_at(&img, 28), 0xDEAD_BEEF);
    }

    #[test]
    fn format7_read_has_no_writeback() {
        let img = image(FrameFormat::AccessError, &access_ctx(false));
        assert_ne!(word_at(&img, 12) & ssw040::RW, 0);
        assert_eq!(word_at(&img, 14), 0);
    }

    #[test]
    fn format_a_carries_the_data_output_buffer() {
        let img = image(FrameFormat::ShortBusFault, &access_ctx(true));
        assert_eq!(word_at(&img, 6), 0xA008);
        let ssw = word_at(&img, 0x0A);
        assert_ne!(ssw & ssw030::DF, 0);
        assert_eq!(ssw & ssw030::RW, 0);
        assert_eq!(word_at(&img, 0x0C), 0x2080);
        assert_eq!(word_at(&img, 0x0E), 0x0010);
        assert_eq!(long_at(&img, 0x10), 0x1000);
        assert_eq!(long_at(&img, 0x18), 0xDEAD_BEEF);
    }

    #[test]
    fn format4_carries_ea_and_faulting_pc() {
        let ctx = ExceptionContext {
            address: 0x3000,
            old_pc: 0x500,
            ..ExceptionContext::new(vector::LINE_F, 0x500, 0x2000)
        };
        let img = image(FrameFormat::FpUnimplemented, &ctx);
        assert_eq!(word_at(&img, 6), 0x402C);
        assert_eq!(long_at(&img, 8), 0x3000);
        assert_eq!(long_at(&img, 12), 0x500);
    }
}
