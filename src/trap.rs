//! Trap unit (C7)
//!
//! No `Interrupt` variant is modelled: this core has no interrupt
//! sources (Non-goal), so `mcause.interrupt` is always written as 0.
//! `mtvec.mode` vectored dispatch is parsed and stored by the CSR file
//! but never consulted here, per the open question this behaviour is
//! carried over from unchanged.

use thiserror::Error;

use crate::csr::CsrFile;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Exception {
    #[error("instruction address misaligned")]
    InstructionAddressMisaligned,
    #[error("instruction access fault")]
    InstructionAccessFault,
    #[error("illegal instruction")]
    IllegalInstruction,
    #[error("breakpoint")]
    Breakpoint,
    #[error("load address misaligned")]
    LoadAddressMisaligned,
    #[error("load access fault")]
    LoadAccessFault,
    #[error("store/AMO address misaligned")]
    StoreAddressMisaligned,
    #[error("store/AMO access fault")]
    StoreAccessFault,
    #[error("environment call from M-mode")]
    EnvironmentCallFromMMode,
}

impl Exception {
    /// The mcause exception code (mcause.interrupt is always 0 since
    /// this core models no interrupt sources).
    pub fn code(&self) -> u32 {
        match self {
            Exception::InstructionAddressMisaligned => 0,
            Exception::InstructionAccessFault => 1,
            Exception::IllegalInstruction => 2,
            Exception::Breakpoint => 3,
            Exception::LoadAddressMisaligned => 4,
            Exception::LoadAccessFault => 5,
            Exception::StoreAddressMisaligned => 6,
            Exception::StoreAccessFault => 7,
            Exception::EnvironmentCallFromMMode => 11,
        }
    }
}

impl From<Exception> for u32 {
    fn from(ex: Exception) -> u32 {
        ex.code()
    }
}

/// Deliver a trap: update mepc/mcause/mtval/mstatus and return the
/// address the next fetch should resume at (mtvec.base).
///
/// If `Zicsr` is disabled there is no CSR file to redirect through;
/// the caller is expected to treat this as the external host-stop
/// signal instead of calling this function (spec.md §4.7, §7).
pub fn deliver(csr: &mut CsrFile, pc: u32, exception: Exception, tval: u32) -> u32 {
    csr.enter_trap(pc, exception.code(), tval);
    csr.mtvec_base()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Extensions;

    #[test]
    fn ecall_trap_sets_mepc_mcause_and_redirects() {
        let mut csr = CsrFile::new(Extensions::all());
        csr.write(crate::csr::MTVEC, 0x100).unwrap();
        let next_pc = deliver(&mut csr, 0x40, Exception::EnvironmentCallFromMMode, 0);
        assert_eq!(csr.mepc(), 0x40);
        assert_eq!(csr.mcause(), 11);
        assert_eq!(next_pc, 0x100);
    }
}
