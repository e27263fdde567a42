//! Bit-field extraction (C1)
//!
//! Every instruction format, standard and compressed, is built on top of
//! a single `extract_field` operator and a single `sign_extend`
//! operator, so that narrowing-cast bugs (the pattern spec.md §9 flags
//! in the original C sources) cannot hide behind an integer conversion.

/// Extract value[hi:lo] (verilog-style inclusive range) from `value`.
pub fn extract_field(value: u32, hi: u32, lo: u32) -> u32 {
    debug_assert!(hi < 32 && hi >= lo);
    let width = hi - lo + 1;
    let mask = if width == 32 { u32::MAX } else { (1u32 << width) - 1 };
    (value >> lo) & mask
}

/// Copy the bit at `sign_bit_position` of `value` into every higher bit,
/// producing a 32-bit two's-complement sign-extended value.
pub fn sign_extend(value: u32, sign_bit_position: u32) -> u32 {
    debug_assert!(sign_bit_position < 32);
    let sign_bit = (value >> sign_bit_position) & 1;
    if sign_bit == 1 {
        let high_mask = if sign_bit_position == 31 {
            0
        } else {
            !0u32 << (sign_bit_position + 1)
        };
        value | high_mask
    } else {
        value
    }
}

/// Reinterpret a u32 bit pattern as i32 without UB.
pub fn as_signed(value: u32) -> i32 {
    value as i32
}

/// Reinterpret an i32 bit pattern as u32 without UB.
pub fn as_unsigned(value: i32) -> u32 {
    value as u32
}

pub fn opcode(instr: u32) -> u32 {
    extract_field(instr, 6, 0)
}

pub fn funct3(instr: u32) -> u32 {
    extract_field(instr, 14, 12)
}

pub fn funct7(instr: u32) -> u32 {
    extract_field(instr, 31, 25)
}

pub fn funct12(instr: u32) -> u32 {
    extract_field(instr, 31, 20)
}

pub fn rd(instr: u32) -> u8 {
    extract_field(instr, 11, 7) as u8
}

pub fn rs1(instr: u32) -> u8 {
    extract_field(instr, 19, 15) as u8
}

pub fn rs2(instr: u32) -> u8 {
    extract_field(instr, 24, 20) as u8
}

pub fn shamt(instr: u32) -> u32 {
    extract_field(instr, 24, 20)
}

#[derive(Debug, Clone, Copy)]
pub struct Rtype {
    pub rd: u8,
    pub rs1: u8,
    pub rs2: u8,
    pub funct3: u32,
    pub funct7: u32,
}

pub fn decode_rtype(instr: u32) -> Rtype {
    Rtype {
        rd: rd(instr),
        rs1: rs1(instr),
        rs2: rs2(instr),
        funct3: funct3(instr),
        funct7: funct7(instr),
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Itype {
    pub rd: u8,
    pub rs1: u8,
    pub funct3: u32,
    /// sign-extended 12-bit immediate
    pub imm: u32,
}

pub fn decode_itype(instr: u32) -> Itype {
    let raw = extract_field(instr, 31, 20);
    Itype {
        rd: rd(instr),
        rs1: rs1(instr),
        funct3: funct3(instr),
        imm: sign_extend(raw, 11),
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Stype {
    pub rs1: u8,
    pub rs2: u8,
    pub funct3: u32,
    pub imm: u32,
}

pub fn decode_stype(instr: u32) -> Stype {
    let imm11_5 = extract_field(instr, 31, 25);
    let imm4_0 = extract_field(instr, 11, 7);
    let raw = (imm11_5 << 5) | imm4_0;
    Stype {
        rs1: rs1(instr),
        rs2: rs2(instr),
        funct3: funct3(instr),
        imm: sign_extend(raw, 11),
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Btype {
    pub rs1: u8,
    pub rs2: u8,
    pub funct3: u32,
    /// sign-extended, bit 0 always zero
    pub imm: u32,
}

pub fn decode_btype(instr: u32) -> Btype {
    let imm12 = extract_field(instr, 31, 31);
    let imm11 = extract_field(instr, 7, 7);
    let imm10_5 = extract_field(instr, 30, 25);
    let imm4_1 = extract_field(instr, 11, 8);
    let raw = (imm12 << 12) | (imm11 << 11) | (imm10_5 << 5) | (imm4_1 << 1);
    Btype {
        rs1: rs1(instr),
        rs2: rs2(instr),
        funct3: funct3(instr),
        imm: sign_extend(raw, 12),
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Utype {
    pub rd: u8,
    /// already shifted into bit position [31:12], low 12 bits zero
    pub imm: u32,
}

pub fn decode_utype(instr: u32) -> Utype {
    Utype {
        rd: rd(instr),
        imm: extract_field(instr, 31, 12) << 12,
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Jtype {
    pub rd: u8,
    /// sign-extended, bit 0 always zero
    pub imm: u32,
}

pub fn decode_jtype(instr: u32) -> Jtype {
    let imm20 = extract_field(instr, 31, 31);
    let imm19_12 = extract_field(instr, 19, 12);
    let imm11 = extract_field(instr, 20, 20);
    let imm10_1 = extract_field(instr, 30, 21);
    let raw = (imm20 << 20) | (imm19_12 << 12) | (imm11 << 11) | (imm10_1 << 1);
    Jtype {
        rd: rd(instr),
        imm: sign_extend(raw, 20),
    }
}

// --- Compressed (16-bit) instruction formats ---
//
// Register fields in the compressed encodings that only address x8-x15
// are stored as the 3-bit compressed index; `expand_creg` maps them onto
// the full 5-bit register space.

pub fn expand_creg(creg: u32) -> u8 {
    (creg + 8) as u8
}

pub fn c_funct3(instr: u16) -> u32 {
    ((instr >> 13) & 0b111) as u32
}

pub fn c_opcode(instr: u16) -> u32 {
    (instr & 0b11) as u32
}

#[derive(Debug, Clone, Copy)]
pub struct CrType {
    pub rd_rs1: u8,
    pub rs2: u8,
}

pub fn decode_cr(instr: u16) -> CrType {
    CrType {
        rd_rs1: ((instr >> 7) & 0x1f) as u8,
        rs2: ((instr >> 2) & 0x1f) as u8,
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CiType {
    pub rd_rs1: u8,
    /// raw 6-bit immediate, split low 5 / high 1, not yet sign-extended
    pub imm_raw: u32,
}

pub fn decode_ci(instr: u16) -> CiType {
    let imm_hi = ((instr >> 12) & 1) as u32;
    let imm_lo = ((instr >> 2) & 0x1f) as u32;
    CiType {
        rd_rs1: ((instr >> 7) & 0x1f) as u8,
        imm_raw: (imm_hi << 5) | imm_lo,
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CiwType {
    pub rd: u8,
    pub imm: u32,
}

/// c.addi4spn immediate: nzuimm[5:4|9:6|2|3] packed at instr[12:5]
pub fn decode_ciw(instr: u16) -> CiwType {
    let bits = ((instr >> 5) & 0xff) as u32;
    let nz_5_4 = (bits >> 6) & 0b11;
    let nz_9_6 = (bits >> 2) & 0b1111;
    let nz_2 = (bits >> 1) & 1;
    let nz_3 = bits & 1;
    let imm = (nz_9_6 << 6) | (nz_5_4 << 4) | (nz_3 << 3) | (nz_2 << 2);
    CiwType {
        rd: expand_creg(((instr >> 2) & 0b111) as u32),
        imm,
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ClType {
    pub rd: u8,
    pub rs1: u8,
    pub imm: u32,
}

/// c.lw immediate: uimm[5:3|2|6] packed at instr[12:10,6:5]
pub fn decode_cl(instr: u16) -> ClType {
    let imm5_3 = ((instr >> 10) & 0b111) as u32;
    let imm2 = ((instr >> 6) & 1) as u32;
    let imm6 = ((instr >> 5) & 1) as u32;
    let imm = (imm6 << 6) | (imm5_3 << 3) | (imm2 << 2);
    ClType {
        rd: expand_creg(((instr >> 2) & 0b111) as u32),
        rs1: expand_creg(((instr >> 7) & 0b111) as u32),
        imm,
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CsType {
    pub rs1: u8,
    pub rs2: u8,
    pub imm: u32,
}

/// c.sw shares CL's bit layout; the rd field position carries rs2
/// instead.
pub fn decode_cs(instr: u16) -> CsType {
    let cl = decode_cl(instr);
    CsType {
        rs1: cl.rs1,
        rs2: cl.rd,
        imm: cl.imm,
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CaType {
    pub rd_rs1: u8,
    pub rs2: u8,
}

pub fn decode_ca(instr: u16) -> CaType {
    CaType {
        rd_rs1: expand_creg(((instr >> 7) & 0b111) as u32),
        rs2: expand_creg(((instr >> 2) & 0b111) as u32),
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CbType {
    pub rd_rs1: u8,
    /// sign-extended branch offset (c.beqz/c.bnez) or raw shift operand bits
    pub imm: u32,
}

/// c.beqz/c.bnez immediate: imm[8|4:3|7:6|2:1|5] packed at instr[12,11:10,6:5,4:3,2]
pub fn decode_cb_branch(instr: u16) -> CbType {
    let imm8 = ((instr >> 12) & 1) as u32;
    let imm4_3 = ((instr >> 10) & 0b11) as u32;
    let imm7_6 = ((instr >> 5) & 0b11) as u32;
    let imm2_1 = ((instr >> 3) & 0b11) as u32;
    let imm5 = ((instr >> 2) & 1) as u32;
    let raw = (imm8 << 8) | (imm7_6 << 6) | (imm5 << 5) | (imm4_3 << 3) | (imm2_1 << 1);
    CbType {
        rd_rs1: expand_creg(((instr >> 7) & 0b111) as u32),
        imm: sign_extend(raw, 8),
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CjType {
    pub imm: u32,
}

/// c.j/c.jal immediate: imm[11|4|9:8|10|6|7|3:1|5] packed at instr[12:2]
pub fn decode_cj(instr: u16) -> CjType {
    let imm11 = ((instr >> 12) & 1) as u32;
    let imm4 = ((instr >> 11) & 1) as u32;
    let imm9_8 = ((instr >> 9) & 0b11) as u32;
    let imm10 = ((instr >> 8) & 1) as u32;
    let imm6 = ((instr >> 7) & 1) as u32;
    let imm7 = ((instr >> 6) & 1) as u32;
    let imm3_1 = ((instr >> 3) & 0b111) as u32;
    let imm5 = ((instr >> 2) & 1) as u32;
    let raw = (imm11 << 11)
        | (imm10 << 10)
        | (imm9_8 << 8)
        | (imm7 << 7)
        | (imm6 << 6)
        | (imm5 << 5)
        | (imm4 << 4)
        | (imm3_1 << 1);
    CjType {
        imm: sign_extend(raw, 11),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_field_basic() {
        assert_eq!(extract_field(0b1111_0000, 7, 4), 0b1111);
        assert_eq!(extract_field(0xffff_ffff, 31, 0), 0xffff_ffff);
        assert_eq!(extract_field(0x8000_0000, 31, 31), 1);
    }

    #[test]
    fn sign_extend_negative() {
        // 12-bit immediate 0xfff -> -1 as i32
        assert_eq!(sign_extend(0xfff, 11), 0xffff_ffff);
        assert_eq!(as_signed(sign_extend(0xfff, 11)), -1);
    }

    #[test]
    fn sign_extend_positive() {
        assert_eq!(sign_extend(0x7ff, 11), 0x7ff);
    }

    #[test]
    fn itype_addi_minus_one() {
        // addi x1, x0, -1: imm = 0xfff
        let instr = 0xFFF00093u32;
        let i = decode_itype(instr);
        assert_eq!(i.rd, 1);
        assert_eq!(i.rs1, 0);
        assert_eq!(as_signed(i.imm), -1);
    }

    #[test]
    fn jtype_reserved_bit_zero() {
        // every jal encoding has bit 0 forced to zero by construction
        let instr = 0xffff_ffef; // all-ones funct/reg fields, opcode=jal
        let j = decode_jtype(instr);
        assert_eq!(j.imm & 1, 0);
    }
}
