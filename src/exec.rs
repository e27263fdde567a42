//! Execution units (C6)
//!
//! Each `Kind` arm is executed against the hart's register file, CSR
//! file and memory port. Execution never panics on architecturally
//! reachable input: divide-by-zero and `INT_MIN / -1` are special
//! cased per the ratified M-extension behaviour rather than left to
//! `wrapping_div`/`wrapping_rem`, which would otherwise panic on a
//! zero divisor.

use crate::bits::{as_signed, as_unsigned, sign_extend};
use crate::csr::CsrFile;
use crate::decode::*;
use crate::memory::{MemoryError, MemoryMap};
use crate::registers::Registers;
use crate::trap::Exception;

/// Outcome of executing one instruction: either the next pc (already
/// committed by the execution unit for branches/jumps, or left as
/// `pc + width` by the caller) or a trapped exception.
pub enum Outcome {
    Next(u32),
    Trap(Exception, u32),
}

pub struct ExecContext<'a> {
    pub regs: &'a mut Registers,
    pub csr: &'a mut CsrFile,
    pub memory: &'a mut MemoryMap,
    pub pc: u32,
    pub width: u32,
    pub zicsr_enabled: bool,
}

pub fn execute(kind: Kind, ctx: &mut ExecContext) -> Outcome {
    let pc = ctx.pc;
    let pc_plus_width = pc.wrapping_add(ctx.width);
    match kind {
        Kind::Illegal => Outcome::Trap(Exception::IllegalInstruction, pc),

        Kind::Lui { rd, imm } => {
            ctx.regs.write(rd, imm);
            Outcome::Next(pc_plus_width)
        }
        Kind::Auipc { rd, imm } => {
            ctx.regs.write(rd, pc.wrapping_add(imm));
            Outcome::Next(pc_plus_width)
        }
        Kind::Jal { rd, offset } => {
            let target = pc.wrapping_add(offset);
            if target % 2 != 0 {
                return Outcome::Trap(Exception::InstructionAddressMisaligned, pc);
            }
            ctx.regs.write(rd, pc_plus_width);
            Outcome::Next(target)
        }
        Kind::Jalr { rd, rs1, offset } => {
            let target = ctx.regs.read(rs1).wrapping_add(offset) & !1u32;
            if target % 2 != 0 {
                return Outcome::Trap(Exception::InstructionAddressMisaligned, pc);
            }
            ctx.regs.write(rd, pc_plus_width);
            Outcome::Next(target)
        }
        Kind::Branch { op, rs1, rs2, offset } => {
            let a = ctx.regs.read(rs1);
            let b = ctx.regs.read(rs2);
            let taken = match op {
                BranchOp::Beq => a == b,
                BranchOp::Bne => a != b,
                BranchOp::Blt => as_signed(a) < as_signed(b),
                BranchOp::Bge => as_signed(a) >= as_signed(b),
                BranchOp::Bltu => a < b,
                BranchOp::Bgeu => a >= b,
            };
            if taken {
                let target = pc.wrapping_add(offset);
                if target % 2 != 0 {
                    return Outcome::Trap(Exception::InstructionAddressMisaligned, pc);
                }
                Outcome::Next(target)
            } else {
                Outcome::Next(pc_plus_width)
            }
        }
        Kind::Load { op, rd, rs1, offset } => {
            let addr = ctx.regs.read(rs1).wrapping_add(offset);
            let (width, signed) = match op {
                LoadOp::Lb => (1, true),
                LoadOp::Lh => (2, true),
                LoadOp::Lw => (4, true),
                LoadOp::Lbu => (1, false),
                LoadOp::Lhu => (2, false),
            };
            match ctx.memory.load(addr, width) {
                Ok(raw) => {
                    let value = if signed && width < 4 {
                        sign_extend(raw, width * 8 - 1)
                    } else {
                        raw
                    };
                    ctx.regs.write(rd, value);
                    Outcome::Next(pc_plus_width)
                }
                Err(MemoryError::Misaligned { .. }) => {
                    Outcome::Trap(Exception::LoadAddressMisaligned, pc)
                }
                Err(_) => Outcome::Trap(Exception::LoadAccessFault, pc),
            }
        }
        Kind::Store { op, rs1, rs2, offset } => {
            let addr = ctx.regs.read(rs1).wrapping_add(offset);
            let width = match op {
                StoreOp::Sb => 1,
                StoreOp::Sh => 2,
                StoreOp::Sw => 4,
            };
            let value = ctx.regs.read(rs2);
            match ctx.memory.store(addr, width, value) {
                Ok(()) => Outcome::Next(pc_plus_width),
                Err(MemoryError::Misaligned { .. }) => {
                    Outcome::Trap(Exception::StoreAddressMisaligned, pc)
                }
                Err(_) => Outcome::Trap(Exception::StoreAccessFault, pc),
            }
        }
        Kind::RegImm { op, rd, rs1, imm } => {
            let a = ctx.regs.read(rs1);
            let result = match op {
                RegImmOp::Addi => a.wrapping_add(imm),
                RegImmOp::Slti => (as_signed(a) < as_signed(imm)) as u32,
                RegImmOp::Sltiu => (a < imm) as u32,
                RegImmOp::Xori => a ^ imm,
                RegImmOp::Ori => a | imm,
                RegImmOp::Andi => a & imm,
            };
            ctx.regs.write(rd, result);
            Outcome::Next(pc_plus_width)
        }
        Kind::Shift { op, rd, rs1, shamt } => {
            let a = ctx.regs.read(rs1);
            let amount = shamt & 0x1f;
            let result = match op {
                ShiftOp::Slli => a << amount,
                ShiftOp::Srli => a >> amount,
                ShiftOp::Srai => as_unsigned(as_signed(a) >> amount),
            };
            ctx.regs.write(rd, result);
            Outcome::Next(pc_plus_width)
        }
        Kind::RegReg { op, rd, rs1, rs2 } => {
            let a = ctx.regs.read(rs1);
            let b = ctx.regs.read(rs2);
            let amount = b & 0x1f;
            let result = match op {
                RegRegOp::Add => a.wrapping_add(b),
                RegRegOp::Sub => a.wrapping_sub(b),
                RegRegOp::Sll => a << amount,
                RegRegOp::Slt => (as_signed(a) < as_signed(b)) as u32,
                RegRegOp::Sltu => (a < b) as u32,
                RegRegOp::Xor => a ^ b,
                RegRegOp::Srl => a >> amount,
                RegRegOp::Sra => as_unsigned(as_signed(a) >> amount),
                RegRegOp::Or => a | b,
                RegRegOp::And => a & b,
            };
            ctx.regs.write(rd, result);
            Outcome::Next(pc_plus_width)
        }
        Kind::Fence | Kind::FenceI | Kind::Wfi => Outcome::Next(pc_plus_width),
        Kind::Ecall => Outcome::Trap(Exception::EnvironmentCallFromMMode, pc),
        Kind::Ebreak => Outcome::Trap(Exception::Breakpoint, pc),
        Kind::Mret => {
            let target = ctx.csr.mret();
            Outcome::Next(target)
        }

        Kind::Csr { op, rd, rs1, csr } => {
            let operand = ctx.regs.read(rs1);
            exec_csr(ctx, op, rd, operand, rs1 != 0, csr, pc, pc_plus_width)
        }
        Kind::CsrImm { op, rd, uimm, csr } => {
            exec_csr(ctx, op, rd, uimm, uimm != 0, csr, pc, pc_plus_width)
        }

        Kind::MulDiv { op, rd, rs1, rs2 } => {
            let a = ctx.regs.read(rs1);
            let b = ctx.regs.read(rs2);
            ctx.regs.write(rd, exec_muldiv(op, a, b));
            Outcome::Next(pc_plus_width)
        }

        Kind::ShAdd { shift, rd, rs1, rs2 } => {
            let a = ctx.regs.read(rs1);
            let b = ctx.regs.read(rs2);
            ctx.regs.write(rd, (a << shift).wrapping_add(b));
            Outcome::Next(pc_plus_width)
        }

        Kind::Bitwise { op, rd, rs1, rs2 } => {
            let a = ctx.regs.read(rs1);
            let b = ctx.regs.read(rs2);
            let result = match op {
                BitwiseOp::Andn => a & !b,
                BitwiseOp::Orn => a | !b,
                BitwiseOp::Xnor => !(a ^ b),
            };
            ctx.regs.write(rd, result);
            Outcome::Next(pc_plus_width)
        }
        Kind::Count { op, rd, rs1 } => {
            let a = ctx.regs.read(rs1);
            let result = match op {
                CountOp::Clz => a.leading_zeros(),
                CountOp::Ctz => a.trailing_zeros(),
                CountOp::Cpop => a.count_ones(),
            };
            ctx.regs.write(rd, result);
            Outcome::Next(pc_plus_width)
        }
        Kind::MinMax { op, rd, rs1, rs2 } => {
            let a = ctx.regs.read(rs1);
            let b = ctx.regs.read(rs2);
            let result = match op {
                MinMaxOp::Max => as_unsigned(as_signed(a).max(as_signed(b))),
                MinMaxOp::Maxu => a.max(b),
                MinMaxOp::Min => as_unsigned(as_signed(a).min(as_signed(b))),
                MinMaxOp::Minu => a.min(b),
            };
            ctx.regs.write(rd, result);
            Outcome::Next(pc_plus_width)
        }
        Kind::SignExtend { op, rd, rs1 } => {
            let a = ctx.regs.read(rs1);
            let result = match op {
                SignExtendOp::SextB => sign_extend(a & 0xff, 7),
                SignExtendOp::SextH => sign_extend(a & 0xffff, 15),
            };
            ctx.regs.write(rd, result);
            Outcome::Next(pc_plus_width)
        }
        Kind::Rotate { op, rd, rs1, rs2 } => {
            let a = ctx.regs.read(rs1);
            let amount = ctx.regs.read(rs2) & 0x1f;
            let result = match op {
                RotateOp::Rol => a.rotate_left(amount),
                RotateOp::Ror => a.rotate_right(amount),
            };
            ctx.regs.write(rd, result);
            Outcome::Next(pc_plus_width)
        }
        Kind::RotateImm { op, rd, rs1, shamt } => {
            let a = ctx.regs.read(rs1);
            let amount = shamt & 0x1f;
            let result = match op {
                RotateOp::Rol => a.rotate_left(amount),
                RotateOp::Ror => a.rotate_right(amount),
            };
            ctx.regs.write(rd, result);
            Outcome::Next(pc_plus_width)
        }
        Kind::OrcB { rd, rs1 } => {
            let a = ctx.regs.read(rs1);
            let mut result = 0u32;
            for i in 0..4 {
                let byte = (a >> (i * 8)) & 0xff;
                if byte != 0 {
                    result |= 0xffu32 << (i * 8);
                }
            }
            ctx.regs.write(rd, result);
            Outcome::Next(pc_plus_width)
        }
        Kind::Rev8 { rd, rs1 } => {
            let a = ctx.regs.read(rs1);
            ctx.regs.write(rd, a.swap_bytes());
            Outcome::Next(pc_plus_width)
        }

        Kind::CarrylessMul { op, rd, rs1, rs2 } => {
            let a = ctx.regs.read(rs1) as u64;
            let b = ctx.regs.read(rs2) as u64;
            let mut product: u64 = 0;
            for i in 0..32 {
                if (b >> i) & 1 != 0 {
                    product ^= a << i;
                }
            }
            let result = match op {
                ClmulOp::Clmul => product as u32,
                ClmulOp::Clmulh => (product >> 32) as u32,
                ClmulOp::Clmulr => (product >> 31) as u32,
            };
            ctx.regs.write(rd, result);
            Outcome::Next(pc_plus_width)
        }

        Kind::SingleBit { op, rd, rs1, rs2 } => {
            let a = ctx.regs.read(rs1);
            let index = ctx.regs.read(rs2) & 0x1f;
            ctx.regs.write(rd, exec_single_bit(op, a, index));
            Outcome::Next(pc_plus_width)
        }
        Kind::SingleBitImm { op, rd, rs1, shamt } => {
            let a = ctx.regs.read(rs1);
            ctx.regs.write(rd, exec_single_bit(op, a, shamt & 0x1f));
            Outcome::Next(pc_plus_width)
        }

        // Compressed forms expand directly into the same semantics as
        // their 32-bit counterparts.
        Kind::CAddi4spn { rd, imm } => {
            let sp = ctx.regs.read(2);
            ctx.regs.write(rd, sp.wrapping_add(imm));
            Outcome::Next(pc_plus_width)
        }
        Kind::CLw { rd, rs1, imm } => {
            let addr = ctx.regs.read(rs1).wrapping_add(imm);
            match ctx.memory.load(addr, 4) {
                Ok(value) => {
                    ctx.regs.write(rd, value);
                    Outcome::Next(pc_plus_width)
                }
                Err(MemoryError::Misaligned { .. }) => {
                    Outcome::Trap(Exception::LoadAddressMisaligned, pc)
                }
                Err(_) => Outcome::Trap(Exception::LoadAccessFault, pc),
            }
        }
        Kind::CSw { rs1, rs2, imm } => {
            let addr = ctx.regs.read(rs1).wrapping_add(imm);
            let value = ctx.regs.read(rs2);
            match ctx.memory.store(addr, 4, value) {
                Ok(()) => Outcome::Next(pc_plus_width),
                Err(MemoryError::Misaligned { .. }) => {
                    Outcome::Trap(Exception::StoreAddressMisaligned, pc)
                }
                Err(_) => Outcome::Trap(Exception::StoreAccessFault, pc),
            }
        }
        Kind::CNop => Outcome::Next(pc_plus_width),
        Kind::CAddi { rd_rs1, imm } => {
            let a = ctx.regs.read(rd_rs1);
            ctx.regs.write(rd_rs1, a.wrapping_add(imm));
            Outcome::Next(pc_plus_width)
        }
        Kind::CJal { offset } => {
            let target = pc.wrapping_add(offset);
            ctx.regs.write(1, pc_plus_width);
            Outcome::Next(target)
        }
        Kind::CLi { rd, imm } => {
            ctx.regs.write(rd, imm);
            Outcome::Next(pc_plus_width)
        }
        Kind::CAddi16sp { imm } => {
            let sp = ctx.regs.read(2);
            ctx.regs.write(2, sp.wrapping_add(imm));
            Outcome::Next(pc_plus_width)
        }
        Kind::CLui { rd, imm } => {
            ctx.regs.write(rd, imm);
            Outcome::Next(pc_plus_width)
        }
        Kind::CSrli { rd_rs1, shamt } => {
            let a = ctx.regs.read(rd_rs1);
            ctx.regs.write(rd_rs1, a >> (shamt & 0x1f));
            Outcome::Next(pc_plus_width)
        }
        Kind::CSrai { rd_rs1, shamt } => {
            let a = ctx.regs.read(rd_rs1);
            ctx.regs.write(rd_rs1, as_unsigned(as_signed(a) >> (shamt & 0x1f)));
            Outcome::Next(pc_plus_width)
        }
        Kind::CAndi { rd_rs1, imm } => {
            let a = ctx.regs.read(rd_rs1);
            ctx.regs.write(rd_rs1, a & imm);
            Outcome::Next(pc_plus_width)
        }
        Kind::CSub { rd_rs1, rs2 } => {
            let a = ctx.regs.read(rd_rs1);
            let b = ctx.regs.read(rs2);
            ctx.regs.write(rd_rs1, a.wrapping_sub(b));
            Outcome::Next(pc_plus_width)
        }
        Kind::CXor { rd_rs1, rs2 } => {
            let a = ctx.regs.read(rd_rs1);
            let b = ctx.regs.read(rs2);
            ctx.regs.write(rd_rs1, a ^ b);
            Outcome::Next(pc_plus_width)
        }
        Kind::COr { rd_rs1, rs2 } => {
            let a = ctx.regs.read(rd_rs1);
            let b = ctx.regs.read(rs2);
            ctx.regs.write(rd_rs1, a | b);
            Outcome::Next(pc_plus_width)
        }
        Kind::CAnd { rd_rs1, rs2 } => {
            let a = ctx.regs.read(rd_rs1);
            let b = ctx.regs.read(rs2);
            ctx.regs.write(rd_rs1, a & b);
            Outcome::Next(pc_plus_width)
        }
        Kind::CJ { offset } => Outcome::Next(pc.wrapping_add(offset)),
        Kind::CBeqz { rs1, offset } => {
            if ctx.regs.read(rs1) == 0 {
                Outcome::Next(pc.wrapping_add(offset))
            } else {
                Outcome::Next(pc_plus_width)
            }
        }
        Kind::CBnez { rs1, offset } => {
            if ctx.regs.read(rs1) != 0 {
                Outcome::Next(pc.wrapping_add(offset))
            } else {
                Outcome::Next(pc_plus_width)
            }
        }
        Kind::CSlli { rd_rs1, shamt } => {
            let a = ctx.regs.read(rd_rs1);
            ctx.regs.write(rd_rs1, a << (shamt & 0x1f));
            Outcome::Next(pc_plus_width)
        }
        Kind::CLwsp { rd, imm } => {
            let sp = ctx.regs.read(2);
            let addr = sp.wrapping_add(imm);
            match ctx.memory.load(addr, 4) {
                Ok(value) => {
                    ctx.regs.write(rd, value);
                    Outcome::Next(pc_plus_width)
                }
                Err(MemoryError::Misaligned { .. }) => {
                    Outcome::Trap(Exception::LoadAddressMisaligned, pc)
                }
                Err(_) => Outcome::Trap(Exception::LoadAccessFault, pc),
            }
        }
        Kind::CJr { rs1 } => Outcome::Next(ctx.regs.read(rs1) & !1u32),
        Kind::CMv { rd, rs2 } => {
            ctx.regs.write(rd, ctx.regs.read(rs2));
            Outcome::Next(pc_plus_width)
        }
        Kind::CEbreak => Outcome::Trap(Exception::Breakpoint, pc),
        Kind::CJalr { rs1 } => {
            let target = ctx.regs.read(rs1) & !1u32;
            ctx.regs.write(1, pc_plus_width);
            Outcome::Next(target)
        }
        Kind::CAdd { rd_rs1, rs2 } => {
            let a = ctx.regs.read(rd_rs1);
            let b = ctx.regs.read(rs2);
            ctx.regs.write(rd_rs1, a.wrapping_add(b));
            Outcome::Next(pc_plus_width)
        }
        Kind::CSwsp { rs2, imm } => {
            let sp = ctx.regs.read(2);
            let addr = sp.wrapping_add(imm);
            let value = ctx.regs.read(rs2);
            match ctx.memory.store(addr, 4, value) {
                Ok(()) => Outcome::Next(pc_plus_width),
                Err(MemoryError::Misaligned { .. }) => {
                    Outcome::Trap(Exception::StoreAddressMisaligned, pc)
                }
                Err(_) => Outcome::Trap(Exception::StoreAccessFault, pc),
            }
        }
    }
}

fn exec_single_bit(op: SingleBitOp, a: u32, index: u32) -> u32 {
    let bit = 1u32 << index;
    match op {
        SingleBitOp::Bclr => a & !bit,
        SingleBitOp::Bext => (a >> index) & 1,
        SingleBitOp::Binv => a ^ bit,
        SingleBitOp::Bset => a | bit,
    }
}

/// Divide-by-zero yields quotient = all-ones, remainder = dividend.
/// Signed overflow (`INT_MIN / -1`) yields quotient = dividend,
/// remainder = 0. Both are special-cased ahead of the division itself
/// since `wrapping_div`/`wrapping_rem` panic on a zero divisor.
fn exec_muldiv(op: MulDivOp, a: u32, b: u32) -> u32 {
    match op {
        MulDivOp::Mul => a.wrapping_mul(b),
        MulDivOp::Mulh => {
            let product = (as_signed(a) as i64).wrapping_mul(as_signed(b) as i64);
            (product >> 32) as u32
        }
        MulDivOp::Mulhsu => {
            let product = (as_signed(a) as i64).wrapping_mul(b as i64);
            (product >> 32) as u32
        }
        MulDivOp::Mulhu => {
            let product = (a as u64).wrapping_mul(b as u64);
            (product >> 32) as u32
        }
        MulDivOp::Div => {
            let (sa, sb) = (as_signed(a), as_signed(b));
            if sb == 0 {
                u32::MAX
            } else if sa == i32::MIN && sb == -1 {
                as_unsigned(i32::MIN)
            } else {
                as_unsigned(sa.wrapping_div(sb))
            }
        }
        MulDivOp::Divu => {
            if b == 0 {
                u32::MAX
            } else {
                a.wrapping_div(b)
            }
        }
        MulDivOp::Rem => {
            let (sa, sb) = (as_signed(a), as_signed(b));
            if sb == 0 {
                a
            } else if sa == i32::MIN && sb == -1 {
                0
            } else {
                as_unsigned(sa.wrapping_rem(sb))
            }
        }
        MulDivOp::Remu => {
            if b == 0 {
                a
            } else {
                a.wrapping_rem(b)
            }
        }
    }
}

/// csrrw/csrrwi write unconditionally; csrrs/csrrc/csrrsi/csrrci only
/// write when the effective write mask (rs1 or uimm) is nonzero. All
/// six variants write rd with the CSR's pre-write value.
fn exec_csr(
    ctx: &mut ExecContext,
    op: CsrOp,
    rd: u8,
    operand: u32,
    write_mask_nonzero: bool,
    addr: u32,
    pc: u32,
    pc_plus_width: u32,
) -> Outcome {
    if !ctx.zicsr_enabled {
        return Outcome::Trap(Exception::IllegalInstruction, pc);
    }
    let previous = match ctx.csr.read(addr) {
        Ok(v) => v,
        Err(_) => return Outcome::Trap(Exception::IllegalInstruction, pc),
    };
    let should_write = match op {
        CsrOp::Rw => true,
        CsrOp::Rs | CsrOp::Rc => write_mask_nonzero,
    };
    if should_write {
        let next = match op {
            CsrOp::Rw => operand,
            CsrOp::Rs => previous | operand,
            CsrOp::Rc => previous & !operand,
        };
        if ctx.csr.write(addr, next).is_err() {
            return Outcome::Trap(Exception::IllegalInstruction, pc);
        }
    }
    ctx.regs.write(rd, previous);
    Outcome::Next(pc_plus_width)
}
