//! Arithmetic: ADD, SUB, CMP and their address/immediate/quick/extended
//! forms, NEG, NEGX, TST, TAS, multiply, divide and BCD.

use crate::alu::{self, Size};
use crate::bus::PhysBus;
use crate::cpu::Cpu;
use crate::ea::{AddrMode, Operand};
use crate::fault::{Exception, Outcome, vector};
use crate::flags::{C, N, Status, V, X, Z};

impl Cpu {
    // ================================================================
    // ADD / SUB  (0xD / 0x9)
    // ================================================================
    //
    // Encoding: TTTT RRR DSS MMMRRR
    //   D = 0: <ea> op Dn -> Dn;  D = 1: Dn op <ea> -> <ea>

    pub(super) fn exec_add_sub(&mut self, bus: &mut dyn PhysBus, is_add: bool) -> Outcome<()> {
        let size = self.op_size();
        let reg = self.reg_hi();
        let operand = self.resolve_ea(bus, size)?;
        let to_memory = self.opcode & 0x0100 != 0;
        let (src, dst) = if to_memory {
            (self.regs.d[reg], self.read_operand(bus, operand, size)?)
        } else {
            (self.read_operand(bus, operand, size)?, self.regs.d[reg])
        };
        let (result, sr) = if is_add {
            alu::add(src, dst, size, self.regs.sr, false)
        } else {
            alu::sub(src, dst, size, self.regs.sr, false)
        };
        self.regs.sr = sr;
        if to_memory {
            self.write_operand(bus, operand, size, result)
        } else {
            self.regs.d[reg] = size.merge(self.regs.d[reg], result);
            Ok(())
        }
    }

    /// ADDA/SUBA: bit 8 selects long; words are sign-extended. No flags.
    pub(super) fn exec_adda_suba(&mut self, bus: &mut dyn PhysBus, is_add: bool) -> Outcome<()> {
        let size = if self.opcode & 0x0100 != 0 { Size::Long } else { Size::Word };
        let operand = self.resolve_ea(bus, size)?;
        let src = size.sign_extend(self.read_operand(bus, operand, size)?);
        let reg = self.reg_hi();
        let dst = self.regs.a(reg);
        let result = if is_add { dst.wrapping_add(src) } else { dst.wrapping_sub(src) };
        self.regs.set_a(reg, result);
        Ok(())
    }

    pub(super) fn exec_addi_subi(&mut self, bus: &mut dyn PhysBus, is_add: bool) -> Outcome<()> {
        let size = self.op_size();
        let src = self.fetch_immediate(bus, size)?;
        let operand = self.resolve_ea(bus, size)?;
        let dst = self.read_operand(bus, operand, size)?;
        let (result, sr) = if is_add {
            alu::add(src, dst, size, self.regs.sr, false)
        } else {
            alu::sub(src, dst, size, self.regs.sr, false)
        };
        self.regs.sr = sr;
        self.write_operand(bus, operand, size, result)
    }

    /// ADDQ/SUBQ: data 1-8 in bits 11-9. On An the whole register is
    /// affected and flags are untouched.
    pub(super) fn exec_addq_subq(&mut self, bus: &mut dyn PhysBus, is_add: bool) -> Outcome<()> {
        let data = match (self.opcode >> 9) & 7 {
            0 => 8,
            n => u32::from(n),
        };
        let size = self.op_size();
        let operand = self.resolve_ea(bus, size)?;
        if let Operand::AddrReg(r) = operand {
            let value = self.regs.a(r);
            let result = if is_add { value.wrapping_add(data) } else { value.wrapping_sub(data) };
            self.regs.set_a(r, result);
            return Ok(());
        }
        let dst = self.read_operand(bus, operand, size)?;
        let (result, sr) = if is_add {
            alu::add(data, dst, size, self.regs.sr, false)
        } else {
            alu::sub(data, dst, size, self.regs.sr, false)
        };
        self.regs.sr = sr;
        self.write_operand(bus, operand, size, result)
    }

    /// ADDX/SUBX Dy,Dx or -(Ay),-(Ax).
    pub(super) fn exec_addx_subx(&mut self, bus: &mut dyn PhysBus, is_add: bool) -> Outcome<()> {
        let size = self.op_size();
        let (rx, ry) = (self.reg_hi() as u8, self.reg_lo() as u8);
        let (src_op, dst_op) = if self.opcode & 0x0008 != 0 {
            let src = self.resolve(bus, AddrMode::AddrIndPreDec(ry), size)?;
            let dst = self.resolve(bus, AddrMode::AddrIndPreDec(rx), size)?;
            (src, dst)
        } else {
            (Operand::DataReg(usize::from(ry)), Operand::DataReg(usize::from(rx)))
        };
        let src = self.read_operand(bus, src_op, size)?;
        let dst = self.read_operand(bus, dst_op, size)?;
        let (result, sr) = if is_add {
            alu::add(src, dst, size, self.regs.sr, true)
        } else {
            alu::sub(src, dst, size, self.regs.sr, true)
        };
        self.regs.sr = sr;
        self.write_operand(bus, dst_op, size, result)
    }

    // ================================================================
    // CMP family
    // ================================================================

    pub(super) fn exec_cmp(&mut self, bus: &mut dyn PhysBus) -> Outcome<()> {
        let size = self.op_size();
        let operand = self.resolve_ea(bus, size)?;
        let src = self.read_operand(bus, operand, size)?;
        let dst = self.regs.d[self.reg_hi()];
        self.regs.sr = alu::cmp(src, dst, size, self.regs.sr);
        Ok(())
    }

    pub(super) fn exec_cmpa(&mut self, bus: &mut dyn PhysBus) -> Outcome<()> {
        let size = if self.opcode & 0x0100 != 0 { Size::Long } else { Size::Word };
        let operand = self.resolve_ea(bus, size)?;
        let src = size.sign_extend(self.read_operand(bus, operand, size)?);
        let dst = self.regs.a(self.reg_hi());
        self.regs.sr = alu::cmp(src, dst, Size::Long, self.regs.sr);
        Ok(())
    }

    pub(super) fn exec_cmpi(&mut self, bus: &mut dyn PhysBus) -> Outcome<()> {
        let size = self.op_size();
        let src = self.fetch_immediate(bus, size)?;
        let operand = self.resolve_ea(bus, size)?;
        let dst = self.read_operand(bus, operand, size)?;
        self.regs.sr = alu::cmp(src, dst, size, self.regs.sr);
        Ok(())
    }

    /// CMPM (Ay)+,(Ax)+
    pub(super) fn exec_cmpm(&mut self, bus: &mut dyn PhysBus) -> Outcome<()> {
        let size = self.op_size();
        let src_op = self.resolve(bus, AddrMode::AddrIndPostInc(self.reg_lo() as u8), size)?;
        let src = self.read_operand(bus, src_op, size)?;
        let dst_op = self.resolve(bus, AddrMode::AddrIndPostInc(self.reg_hi() as u8), size)?;
        let dst = self.read_operand(bus, dst_op, size)?;
        self.regs.sr = alu::cmp(src, dst, size, self.regs.sr);
        Ok(())
    }

    // ================================================================
    // Single-operand
    // ================================================================

    pub(super) fn exec_neg(&mut self, bus: &mut dyn PhysBus, extend: bool) -> Outcome<()> {
        let size = self.op_size();
        let operand = self.resolve_ea(bus, size)?;
        let value = self.read_operand(bus, operand, size)?;
        let (result, sr) = alu::sub(value, 0, size, self.regs.sr, extend);
        self.regs.sr = sr;
        self.write_operand(bus, operand, size, result)
    }

    pub(super) fn exec_tst(&mut self, bus: &mut dyn PhysBus) -> Outcome<()> {
        let size = self.op_size();
        let operand = self.resolve_ea(bus, size)?;
        let value = self.read_operand(bus, operand, size)?;
        self.regs.sr = alu::logic_flags(value, size, self.regs.sr);
        Ok(())
    }

    /// TAS: locked read-modify-write setting bit 7.
    pub(super) fn exec_tas(&mut self, bus: &mut dyn PhysBus) -> Outcome<()> {
        let operand = self.resolve_ea(bus, Size::Byte)?;
        let lock = |e: Exception| match e {
            Exception::Access(mut fault) => {
                fault.locked = true;
                Exception::Access(fault)
            }
            other => other,
        };
        let value = self.read_operand(bus, operand, Size::Byte).map_err(lock)?;
        self.regs.sr = alu::logic_flags(value, Size::Byte, self.regs.sr);
        self.write_operand(bus, operand, Size::Byte, value | 0x80).map_err(lock)
    }

    // ================================================================
    // Multiply / divide
    // ================================================================

    /// MULU.W / MULS.W: bit 8 selects signed.
    pub(super) fn exec_mul_word(&mut self, bus: &mut dyn PhysBus) -> Outcome<()> {
        let operand = self.resolve_ea(bus, Size::Word)?;
        let src = self.read_operand(bus, operand, Size::Word)?;
        let reg = self.reg_hi();
        let dst = self.regs.d[reg] & 0xFFFF;
        let result = if self.opcode & 0x0100 != 0 {
            (Size::Word.sign_extend(src) as i32).wrapping_mul(Size::Word.sign_extend(dst) as i32) as u32
        } else {
            src * dst
        };
        self.regs.d[reg] = result;
        self.regs.sr = alu::logic_flags(result, Size::Long, self.regs.sr);
        Ok(())
    }

    /// MULU.L / MULS.L with 32- or 64-bit product.
    ///
    /// Extension: 0 Dl(3) S Q 0000000 Dh(3).
    pub(super) fn exec_mul_long(&mut self, bus: &mut dyn PhysBus) -> Outcome<()> {
        let ext = self.fetch_word(bus)?;
        let operand = self.resolve_ea(bus, Size::Long)?;
        let src = self.read_operand(bus, operand, Size::Long)?;
        let dl = usize::from((ext >> 12) & 7);
        let dh = usize::from(ext & 7);
        let signed = ext & 0x0800 != 0;
        let quad = ext & 0x0400 != 0;
        let dst = self.regs.d[dl];

        let product: u64 = if signed {
            (i64::from(src as i32) * i64::from(dst as i32)) as u64
        } else {
            u64::from(src) * u64::from(dst)
        };
        let low = product as u32;
        let high = (product >> 32) as u32;
        let mut sr = self.regs.sr & !(N | Z | V | C);
        if quad {
            self.regs.d[dh] = high;
            self.regs.d[dl] = low;
            sr = Status::set_if(sr, Z, product == 0);
            sr = Status::set_if(sr, N, high & 0x8000_0000 != 0);
        } else {
            let overflow = if signed {
                i64::from(low as i32) != product as i64
            } else {
                high != 0
            };
            self.regs.d[dl] = low;
            sr = alu::logic_flags(low, Size::Long, sr);
            sr = Status::set_if(sr, V, overflow);
        }
        self.regs.sr = sr;
        Ok(())
    }

    /// DIVU.W / DIVS.W: bit 8 selects signed. Overflow sets V and leaves
    /// the destination alone.
    pub(super) fn exec_div_word(&mut self, bus: &mut dyn PhysBus) -> Outcome<()> {
        let operand = self.resolve_ea(bus, Size::Word)?;
        let divisor = self.read_operand(bus, operand, Size::Word)?;
        if divisor == 0 {
            self.regs.sr &= !C;
            return Err(Exception::InstructionTrap(vector::ZERO_DIVIDE));
        }
        let reg = self.reg_hi();
        let dividend = self.regs.d[reg];
        let mut sr = self.regs.sr & !(V | C);
        let packed = if self.opcode & 0x0100 != 0 {
            let divisor = i64::from(Size::Word.sign_extend(divisor) as i32);
            let dividend = i64::from(dividend as i32);
            let quotient = dividend / divisor;
            let remainder = dividend % divisor;
            if quotient < i64::from(i16::MIN) || quotient > i64::from(i16::MAX) {
                None
            } else {
                Some(((remainder as u32 & 0xFFFF) << 16) | (quotient as u32 & 0xFFFF))
            }
        } else {
            let quotient = dividend / divisor;
            let remainder = dividend % divisor;
            (quotient <= 0xFFFF).then_some((remainder << 16) | quotient)
        };
        match packed {
            Some(value) => {
                self.regs.d[reg] = value;
                sr = Status::update_nz(sr, value, Size::Word.msb());
            }
            None => sr |= V,
        }
        self.regs.sr = sr;
        Ok(())
    }

    /// DIVU.L / DIVS.L / DIVUL / DIVSL.
    ///
    /// Extension: 0 Dq(3) S Q 0000000 Dr(3). Q selects a 64-bit dividend in
    /// Dr:Dq; otherwise the remainder goes to Dr when Dr differs from Dq.
    pub(super) fn exec_div_long(&mut self, bus: &mut dyn PhysBus) -> Outcome<()> {
        let ext = self.fetch_word(bus)?;
        let operand = self.resolve_ea(bus, Size::Long)?;
        let divisor = self.read_operand(bus, operand, Size::Long)?;
        if divisor == 0 {
            self.regs.sr &= !C;
            return Err(Exception::InstructionTrap(vector::ZERO_DIVIDE));
        }
        let dq = usize::from((ext >> 12) & 7);
        let dr = usize::from(ext & 7);
        let signed = ext & 0x0800 != 0;
        let quad = ext & 0x0400 != 0;
        let dividend = if quad {
            (u64::from(self.regs.d[dr]) << 32) | u64::from(self.regs.d[dq])
        } else if signed {
            i64::from(self.regs.d[dq] as i32) as u64
        } else {
            u64::from(self.regs.d[dq])
        };

        let result = if signed {
            let (n, d) = (dividend as i64, i64::from(divisor as i32));
            n.checked_div(d).and_then(|q| {
                let r = n.checked_rem(d)?;
                (i64::from(q as i32) == q).then_some((q as u32, r as u32))
            })
        } else {
            let d = u64::from(divisor);
            let q = dividend / d;
            (q <= u64::from(u32::MAX)).then_some((q as u32, (dividend % d) as u32))
        };
        let mut sr = self.regs.sr & !(V | C);
        match result {
            Some((quotient, remainder)) => {
                if dr != dq || quad {
                    self.regs.d[dr] = remainder;
                }
                self.regs.d[dq] = quotient;
                sr = Status::update_nz(sr, quotient, Size::Long.msb());
            }
            None => sr |= V,
        }
        self.regs.sr = sr;
        Ok(())
    }

    // ================================================================
    // BCD
    // ================================================================

    /// ABCD/SBCD Dy,Dx or -(Ay),-(Ax).
    pub(super) fn exec_abcd_sbcd(&mut self, bus: &mut dyn PhysBus, is_add: bool) -> Outcome<()> {
        let (rx, ry) = (self.reg_hi() as u8, self.reg_lo() as u8);
        let (src_op, dst_op) = if self.opcode & 0x0008 != 0 {
            let src = self.resolve(bus, AddrMode::AddrIndPreDec(ry), Size::Byte)?;
            let dst = self.resolve(bus, AddrMode::AddrIndPreDec(rx), Size::Byte)?;
            (src, dst)
        } else {
            (Operand::DataReg(usize::from(ry)), Operand::DataReg(usize::from(rx)))
        };
        let src = self.read_operand(bus, src_op, Size::Byte)? as u8;
        let dst = self.read_operand(bus, dst_op, Size::Byte)? as u8;
        let x = u8::from(self.regs.sr & X != 0);
        let (result, carry, overflow) = if is_add {
            alu::bcd_add(src, dst, x)
        } else {
            alu::bcd_sub(dst, src, x)
        };
        self.regs.sr = alu::bcd_flags(result, carry, overflow, self.regs.sr);
        self.write_operand(bus, dst_op, Size::Byte, u32::from(result))
    }

    pub(super) fn exec_nbcd(&mut self, bus: &mut dyn PhysBus) -> Outcome<()> {
        let operand = self.resolve_ea(bus, Size::Byte)?;
        let value = self.read_operand(bus, operand, Size::Byte)? as u8;
        let x = u8::from(self.regs.sr & X != 0);
        let (result, borrow, overflow) = alu::bcd_sub(0, value, x);
        self.regs.sr = alu::bcd_flags(result, borrow, overflow, self.regs.sr);
        self.write_operand(bus, operand, Size::Byte, u32::from(result))
    }
}

#[cfg(test)]
mod tests {
    use crate::bus::FlatBus;
    use crate::cpu::Cpu;
    use crate::flags::{C, V, X, Z};
    use crate::model::{CpuModel, FpuModel};

    fn run(program: &[u16], setup: impl FnOnce(&mut Cpu)) -> Cpu {
        let mut bus = FlatBus::new(0x10000);
        bus.poke32(0, 0x8000);
        bus.poke32(4, 0x400);
        bus.load_words(0x400, program);
        let mut cpu = Cpu::new(CpuModel::M68030, FpuModel::M68882).unwrap();
        cpu.reset(&mut bus).unwrap();
        setup(&mut cpu);
        for _ in program {
            if cpu.regs.pc >= 0x400 + 2 * program.len() as u32 {
                break;
            }
            cpu.step(&mut bus).unwrap();
        }
        cpu
    }

    #[test]
    fn add_long_carries() {
        // ADD.L D1,D0
        let cpu = run(&[0xD081], |cpu| {
            cpu.regs.d[0] = 0xFFFF_FFFF;
            cpu.regs.d[1] = 1;
        });
        assert_eq!(cpu.regs.d[0], 0);
        assert_eq!(cpu.regs.sr & (X | C | Z), X | C | Z);
    }

    #[test]
    fn addq_to_address_register_skips_flags() {
        // ADDQ.W #8,A0
        let cpu = run(&[0x5048], |cpu| {
            cpu.regs.a[0] = 0xFFFF_FFFC;
            cpu.regs.sr |= Z;
        });
        assert_eq!(cpu.regs.a[0], 4);
        assert_ne!(cpu.regs.sr & Z, 0);
    }

    #[test]
    fn cmpi_preserves_x() {
        // CMPI.B #5,D3
        let cpu = run(&[0x0C03, 0x0005], |cpu| {
            cpu.regs.d[3] = 5;
            cpu.regs.sr |= X;
        });
        assert_ne!(cpu.regs.sr & Z, 0);
        assert_ne!(cpu.regs.sr & X, 0);
    }

    #[test]
    fn divu_packs_remainder_and_quotient() {
        // DIVU.W D1,D0
        let cpu = run(&[0x80C1], |cpu| {
            cpu.regs.d[0] = 100;
            cpu.regs.d[1] = 7;
        });
        assert_eq!(cpu.regs.d[0], (2 << 16) | 14);
    }

    #[test]
    fn divu_overflow_leaves_destination() {
        // DIVU.W D1,D0
        let cpu = run(&[0x80C1], |cpu| {
            cpu.regs.d[0] = 0x0010_0000;
            cpu.regs.d[1] = 1;
        });
        assert_eq!(cpu.regs.d[0], 0x0010_0000);
        assert_ne!(cpu.regs.sr & V, 0);
    }

    #[test]
    fn muls_long_64_bit() {
        // MULS.L D1,D2:D0  (ext: Dl=0, signed, quad, Dh=2)
        let cpu = run(&[0x4C01, 0x0C02], |cpu| {
            cpu.regs.d[0] = 0xFFFF_FFFE;
            cpu.regs.d[1] = 3;
        });
        assert_eq!(cpu.regs.d[0], 0xFFFF_FFFA);
        assert_eq!(cpu.regs.d[2], 0xFFFF_FFFF);
    }

    #[test]
    fn abcd_registers() {
        // ABCD D1,D0
        let cpu = run(&[0xC101], |cpu| {
            cpu.regs.d[0] = 0x19;
            cpu.regs.d[1] = 0x01;
        });
        assert_eq!(cpu.regs.d[0] & 0xFF, 0x20);
    }
}
