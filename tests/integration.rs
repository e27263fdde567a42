//! End-to-end scenarios from the core's testable-properties list:
//! concrete instruction sequences, each checked against the exact
//! architectural state they must produce.

use rv32emu_core::memory::ROM_ORIGIN;
use rv32emu_core::{csr, decode, Extensions, Hart, MemoryMap, NullObserver};

fn hart_with_program(words: &[u32]) -> Hart<NullObserver> {
    let mut memory = MemoryMap::default();
    for (i, word) in words.iter().enumerate() {
        memory.store(ROM_ORIGIN + (i as u32) * 4, 4, *word).unwrap();
    }
    Hart::new(memory, Extensions::all(), NullObserver)
}

#[test]
fn scenario_addi_positive() {
    let mut hart = hart_with_program(&[0x00500093]); // addi x1, x0, 5
    hart.step().unwrap();
    assert_eq!(hart.regs.read(1), 5);
    assert_eq!(hart.pc, 4);
}

#[test]
fn scenario_addi_negative_one() {
    let mut hart = hart_with_program(&[0xFFF00093]); // addi x1, x0, -1
    hart.step().unwrap();
    assert_eq!(hart.regs.read(1), 0xFFFF_FFFF);
    assert_eq!(hart.pc, 4);
}

#[test]
fn scenario_srli_then_srai() {
    // addi x1, x0, -1 ; srli x2, x1, 1
    let mut hart = hart_with_program(&[0xFFF00093, 0x0010D113]);
    hart.step().unwrap();
    hart.step().unwrap();
    assert_eq!(hart.regs.read(2), 0x7FFF_FFFF);

    // same setup, srai x2, x1, 1
    let mut hart = hart_with_program(&[0xFFF00093, 0x4010D113]);
    hart.step().unwrap();
    hart.step().unwrap();
    assert_eq!(hart.regs.read(2), 0xFFFF_FFFF);
}

#[test]
fn scenario_lui_then_addi() {
    let mut hart = hart_with_program(&[0xABCDE1B7, 0x12318193]);
    hart.step().unwrap();
    hart.step().unwrap();
    assert_eq!(hart.regs.read(3), 0xABCDE123);
}

#[test]
fn scenario_beq_not_taken_bne_taken() {
    // addi x1,x0,5 ; addi x2,x0,7 ; beq x1,x2,+8 ; bne x1,x2,+8
    let mut hart = hart_with_program(&[0x00500093, 0x00700113, 0x00208463, 0x00209463]);
    hart.step().unwrap(); // x1 = 5, pc=4
    hart.step().unwrap(); // x2 = 7, pc=8
    hart.step().unwrap(); // beq not taken, pc=12
    assert_eq!(hart.pc, 12);
    hart.step().unwrap(); // bne taken, pc=12+8=20
    assert_eq!(hart.pc, 20);
}

#[test]
fn scenario_ecall_traps_with_mtvec_configured() {
    let mut hart = hart_with_program(&[0x00000073]); // ecall
    hart.csr.write(csr::MTVEC, 0x100).unwrap();
    let mie_before = hart.csr.mstatus_mie();
    hart.step().unwrap();
    assert_eq!(hart.csr.mepc(), 0);
    assert_eq!(hart.csr.mcause(), 11);
    assert_eq!(hart.pc, 0x100);
    assert_eq!(hart.csr.mstatus_mpie(), mie_before);
    assert!(!hart.csr.mstatus_mie());
}

#[test]
fn scenario_store_then_load() {
    let hart = hart_with_program(&[]);
    let ram_base = hart.memory.ram_origin();
    let mut hart = hart;
    hart.memory.store(ram_base, 4, 0xDEAD_BEEF).unwrap();
    let loaded = hart.memory.load(ram_base, 4).unwrap();
    assert_eq!(loaded, 0xDEAD_BEEF);
}

#[test]
fn x0_is_always_zero_at_step_end() {
    let mut hart = hart_with_program(&[0x00100093]); // addi x1, x0, 1
    hart.step().unwrap();
    assert_eq!(hart.regs.read(0), 0);
}

#[test]
fn csr_round_trip_no_masking() {
    let mut hart = hart_with_program(&[]);
    hart.csr.write(csr::MSCRATCH, 0x1234).unwrap();
    assert_eq!(hart.csr.read(csr::MSCRATCH).unwrap(), 0x1234);
}

#[test]
fn div_by_zero_and_int_min_overflow() {
    // addi x1,x0,1 ; addi x2,x0,0 ; div x3,x1,x2 (x/0 -> all-ones)
    let mut hart = hart_with_program(&[0x00100093, 0x00000113, 0x0220C1B3]);
    hart.step().unwrap();
    hart.step().unwrap();
    hart.step().unwrap();
    assert_eq!(hart.regs.read(3), 0xFFFF_FFFF);
}

#[test]
fn compressed_addi_decodes_to_expected_kind() {
    // c.addi x1, 5: quadrant=01, funct3=000, rd_rs1=00001, imm bits.
    let encoding: u16 = 0b000_0_00001_00101_01;
    let descriptor = decode::decode(encoding, None, &Extensions::all());
    match descriptor.kind {
        decode::Kind::CAddi { rd_rs1, imm } => {
            assert_eq!(rd_rs1, 1);
            assert_eq!(imm, 5);
        }
        other => panic!("expected CAddi, got {other:?}"),
    }
    assert_eq!(descriptor.width, 2);
}

#[test]
fn compressed_disabled_falls_back_to_illegal() {
    let mut ext = Extensions::all();
    ext.c = false;
    let encoding: u16 = 0b000_0_00001_00101_01; // a c.addi encoding
    let descriptor = decode::decode(encoding, None, &ext);
    assert_eq!(descriptor.kind, decode::Kind::Illegal);
}
