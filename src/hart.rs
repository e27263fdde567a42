//! Hart state and the step loop (C8)

use log::{debug, trace, warn};

use crate::bits;
use crate::config::Extensions;
use crate::csr::CsrFile;
use crate::decode::{self, Kind};
use crate::exec::{self, ExecContext, Outcome};
use crate::hooks::{NullObserver, Observer, StepContext};
use crate::memory::{MemoryError, MemoryMap};
use crate::registers::Registers;
use crate::trap::{self, Exception};

/// A single RISC-V hart: architectural state plus the extension
/// configuration that gates which decoder tables and execution units
/// are consulted.
pub struct Hart<O: Observer = NullObserver> {
    pub pc: u32,
    pub pc_next: u32,
    pub regs: Registers,
    pub instr: u32,
    pub csr: CsrFile,
    pub memory: MemoryMap,
    pub extensions: Extensions,
    /// Set by dispatch when the current instruction produced an
    /// `Illegal` descriptor; consulted by the observer's `unknown`
    /// edge.
    pub hook_exists: bool,
    pub observer: O,
}

/// Why a step loop stopped calling `step`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The observer's `ecall` exit convention fired.
    Exited(i32),
    /// `Zicsr` is disabled and an exception was raised with nowhere to
    /// trap to; the host must stop (spec.md §4.7, §7).
    HostStop,
}

impl<O: Observer> Hart<O> {
    /// Create a hart with its reset state: registers zeroed, CSRs
    /// zeroed, `pc` at the reset vector (`ROM_ORIGIN`, the
    /// implementation's chosen convention per spec.md §3's open
    /// question; see DESIGN.md), and the stack pointer (`x2`)
    /// initialised to the top of RAM.
    pub fn new(memory: MemoryMap, extensions: Extensions, observer: O) -> Self {
        let reset_vector = crate::memory::ROM_ORIGIN;
        let mut regs = Registers::new();
        let sp = memory.ram_origin().wrapping_add(memory.ram_size());
        regs.write(2, sp);
        Hart {
            pc: reset_vector,
            pc_next: reset_vector,
            regs,
            instr: 0,
            csr: CsrFile::new(extensions),
            memory,
            extensions,
            hook_exists: false,
            observer,
        }
    }

    /// Advance the hart by exactly one instruction. Returns `Ok(None)`
    /// on a normal (non-terminating) step, `Ok(Some(reason))` when the
    /// observer's exit convention fired or the host must stop, or
    /// `Err` only to surface decode/fetch plumbing failures that are
    /// themselves architectural bugs (never on architecturally
    /// reachable input, per the ambient error-handling policy).
    pub fn step(&mut self) -> Result<Option<StopReason>, MemoryError> {
        let pc = self.pc;
        let first_halfword = match self.memory.load_halfword(pc) {
            Ok(hw) => hw,
            Err(_) => {
                self.trap_or_stop(pc, Exception::InstructionAccessFault, pc)?;
                return Ok(None);
            }
        };

        let is_standard = bits::c_opcode(first_halfword) == 0b11;
        if is_standard && pc % 4 != 0 {
            self.trap_or_stop(pc, Exception::InstructionAddressMisaligned, pc)?;
            return Ok(None);
        }

        let second_halfword = if is_standard {
            match self.memory.load_halfword(pc.wrapping_add(2)) {
                Ok(hw) => Some(hw),
                Err(_) => {
                    self.trap_or_stop(pc, Exception::InstructionAccessFault, pc)?;
                    return Ok(None);
                }
            }
        } else {
            None
        };

        let descriptor = decode::decode(first_halfword, second_halfword, &self.extensions);
        self.instr = match second_halfword {
            Some(hi) => ((hi as u32) << 16) | first_halfword as u32,
            None => first_halfword as u32,
        };
        trace!(pc = pc, instr = self.instr, width = descriptor.width; "fetch/decode");
        self.hook_exists = matches!(descriptor.kind, Kind::Illegal);
        self.pc_next = pc.wrapping_add(descriptor.width);

        let ctx = StepContext {
            pc,
            instr: self.instr,
            width: descriptor.width,
            kind: &descriptor.kind,
        };
        self.observer.before(&ctx);
        if self.hook_exists {
            self.observer.unknown(&ctx);
        }

        if let Kind::Ecall = descriptor.kind {
            let a7 = self.regs.read(17);
            let a0 = self.regs.read(10);
            if let Some(code) = self.observer.on_ecall(a7, a0) {
                return Ok(Some(StopReason::Exited(code)));
            }
        }

        let outcome = {
            let mut exec_ctx = ExecContext {
                regs: &mut self.regs,
                csr: &mut self.csr,
                memory: &mut self.memory,
                pc,
                width: descriptor.width,
                zicsr_enabled: self.extensions.zicsr,
            };
            exec::execute(descriptor.kind, &mut exec_ctx)
        };

        if matches!(descriptor.kind, Kind::Branch { .. } | Kind::CBeqz { .. } | Kind::CBnez { .. }) {
            debug!(pc = pc; "branch evaluated");
        }
        if matches!(descriptor.kind, Kind::Csr { .. } | Kind::CsrImm { .. }) {
            debug!(pc = pc; "csr write");
        }

        let stop = match outcome {
            Outcome::Next(next_pc) => {
                self.pc_next = next_pc;
                None
            }
            Outcome::Trap(exception, tval_pc) => {
                warn!(pc = pc, mcause = exception.code(), mtval = tval_pc; "exception raised");
                self.trap_or_stop(pc, exception, tval_pc)?
            }
        };

        let ctx = StepContext {
            pc,
            instr: self.instr,
            width: descriptor.width,
            kind: &descriptor.kind,
        };
        self.observer.after(&ctx);

        self.commit();
        Ok(stop)
    }

    fn trap_or_stop(
        &mut self,
        pc: u32,
        exception: Exception,
        tval: u32,
    ) -> Result<Option<StopReason>, MemoryError> {
        if self.extensions.zicsr {
            self.pc_next = trap::deliver(&mut self.csr, pc, exception, tval);
            Ok(None)
        } else {
            Ok(Some(StopReason::HostStop))
        }
    }

    /// Commit architectural effects: advance pc, re-zero x0, bump the
    /// cycle/instruction counters.
    fn commit(&mut self) {
        self.pc = self.pc_next;
        self.regs.write(0, 0);
        self.csr.increment_counters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hart_with_program(words: &[u32]) -> Hart<NullObserver> {
        let mut memory = MemoryMap::default();
        for (i, word) in words.iter().enumerate() {
            memory
                .store(crate::memory::ROM_ORIGIN + (i as u32) * 4, 4, *word)
                .unwrap();
        }
        Hart::new(memory, Extensions::all(), NullObserver)
    }

    #[test]
    fn addi_increments_pc_and_writes_register() {
        let mut hart = hart_with_program(&[0x00500093]); // addi x1, x0, 5
        hart.step().unwrap();
        assert_eq!(hart.regs.read(1), 5);
        assert_eq!(hart.pc, 4);
    }

    #[test]
    fn addi_negative_one_sign_extends() {
        let mut hart = hart_with_program(&[0xFFF00093]); // addi x1, x0, -1
        hart.step().unwrap();
        assert_eq!(hart.regs.read(1), 0xFFFF_FFFF);
        assert_eq!(hart.pc, 4);
    }

    #[test]
    fn x0_stays_zero_after_step() {
        let mut hart = hart_with_program(&[0x00500093]);
        hart.step().unwrap();
        assert_eq!(hart.regs.read(0), 0);
    }

    #[test]
    fn lui_then_addi_builds_constant() {
        // lui x3, 0xABCDE ; addi x3, x3, 0x123
        let mut hart = hart_with_program(&[0xABCDE1B7, 0x12318193]);
        hart.step().unwrap();
        hart.step().unwrap();
        assert_eq!(hart.regs.read(3), 0xABCDE123);
    }

    #[test]
    fn store_then_load_round_trip() {
        let mut hart = hart_with_program(&[]);
        let ram_base = hart.memory.ram_origin();
        hart.regs.write(5, 0xDEAD_BEEF);
        hart.regs.write(6, ram_base);
        let mut exec_ctx = ExecContext {
            regs: &mut hart.regs,
            csr: &mut hart.csr,
            memory: &mut hart.memory,
            pc: 0,
            width: 4,
            zicsr_enabled: true,
        };
        exec::execute(
            Kind::Store { op: decode::StoreOp::Sw, rs1: 6, rs2: 5, offset: 0 },
            &mut exec_ctx,
        );
        let outcome = exec::execute(
            Kind::Load { op: decode::LoadOp::Lw, rd: 7, rs1: 6, offset: 0 },
            &mut exec_ctx,
        );
        assert!(matches!(outcome, Outcome::Next(_)));
        assert_eq!(hart.regs.read(7), 0xDEAD_BEEF);
    }

    #[test]
    fn ecall_traps_to_mtvec() {
        let mut hart = hart_with_program(&[0x00000073]); // ecall
        hart.csr.write(crate::csr::MTVEC, 0x100).unwrap();
        hart.step().unwrap();
        assert_eq!(hart.csr.mepc(), 0);
        assert_eq!(hart.csr.mcause(), 11);
        assert_eq!(hart.pc, 0x100);
    }
}
