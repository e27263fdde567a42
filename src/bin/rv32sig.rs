//! Driver/CLI harness (§6, external to the core).
//!
//! Loads `dut-rom.bin`/`dut-ram.bin` into the memory map, reads the
//! signature address range from `dut-ram-signature_begin_end.txt`,
//! steps the hart up to a fixed budget, then writes `dut-ram-after.bin`
//! and the `DUT-rve.signature` compliance-test output. This is the
//! only place in the repository that touches the filesystem or a
//! process exit code; the core library itself performs no I/O.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use clap_num::maybe_hex;
use log::{info, warn};
use thiserror::Error;

use rv32emu_core::{Extensions, Hart, MemoryMap, NullObserver, RomWritePolicy, StopReason};

/// Run a RISC-V compliance signature test against the core emulator.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about)]
struct Args {
    /// Directory containing dut-rom.bin, dut-ram.bin and
    /// dut-ram-signature_begin_end.txt
    #[arg(default_value = ".")]
    dir: PathBuf,

    /// Override the reset vector (use 0x prefix for hexadecimal)
    #[arg(long, value_parser=maybe_hex::<u32>)]
    reset_vector: Option<u32>,
}

#[derive(Debug, Error)]
enum DriverError {
    #[error("missing RAM file: {0}")]
    MissingRam(String),
    #[error("missing ROM or signature file: {0}")]
    MissingRomOrSignature(String),
    #[error("malformed signature file: {0}")]
    MalformedSignature(String),
}

fn exit_code_for(err: &DriverError) -> u8 {
    match err {
        DriverError::MissingRam(_) => 1,
        DriverError::MissingRomOrSignature(_) => 2,
        DriverError::MalformedSignature(_) => 3,
    }
}

fn read_signature_range(path: &Path) -> Result<(u32, u32), DriverError> {
    let text = fs::read_to_string(path)
        .map_err(|_| DriverError::MissingRomOrSignature(path.display().to_string()))?;
    let mut words = text.split_whitespace();
    let begin = words
        .next()
        .ok_or_else(|| DriverError::MalformedSignature(path.display().to_string()))?;
    let end = words
        .next()
        .ok_or_else(|| DriverError::MalformedSignature(path.display().to_string()))?;
    let begin = u32::from_str_radix(begin.trim_start_matches("0x"), 16)
        .map_err(|_| DriverError::MalformedSignature(path.display().to_string()))?;
    let end = u32::from_str_radix(end.trim_start_matches("0x"), 16)
        .map_err(|_| DriverError::MalformedSignature(path.display().to_string()))?;
    Ok((begin, end))
}

fn run(args: Args) -> Result<(), DriverError> {
    let rom_path = args.dir.join("dut-rom.bin");
    let ram_path = args.dir.join("dut-ram.bin");
    let sig_path = args.dir.join("dut-ram-signature_begin_end.txt");

    let rom_bytes = fs::read(&rom_path)
        .map_err(|_| DriverError::MissingRomOrSignature(rom_path.display().to_string()))?;
    let ram_bytes = fs::read(&ram_path)
        .map_err(|_| DriverError::MissingRam(ram_path.display().to_string()))?;
    let (sig_begin, sig_end) = read_signature_range(&sig_path)?;

    let mut memory = MemoryMap::new(rom_bytes.len() as u32, ram_bytes.len() as u32)
        .with_rom_write_policy(RomWritePolicy::Ignore);
    memory.rom_mut()[..rom_bytes.len()].copy_from_slice(&rom_bytes);
    memory.ram_mut()[..ram_bytes.len()].copy_from_slice(&ram_bytes);

    let mut hart = Hart::new(memory, Extensions::default(), NullObserver);
    if let Some(reset_vector) = args.reset_vector {
        hart.pc = reset_vector;
        hart.pc_next = reset_vector;
    }

    let max_steps = 5 * (rom_bytes.len() as u64 / 4);
    let mut steps = 0u64;
    let mut exit_code = 0i32;
    while steps < max_steps {
        match hart.step() {
            Ok(Some(StopReason::Exited(code))) => {
                info!(code = code; "program requested exit");
                exit_code = code;
                break;
            }
            Ok(Some(StopReason::HostStop)) => {
                warn!(pc = hart.pc; "host stop requested, no Zicsr trap target configured");
                break;
            }
            Ok(None) => {}
            Err(err) => {
                warn!(pc = hart.pc, error:? = err; "memory port error during step");
                break;
            }
        }
        steps += 1;
    }
    let _ = exit_code;

    let ram_path_after = args.dir.join("dut-ram-after.bin");
    fs::write(&ram_path_after, hart.memory.ram())
        .map_err(|_| DriverError::MissingRam(ram_path_after.display().to_string()))?;

    let sig_path_out = args.dir.join("DUT-rve.signature");
    let ram_origin = hart.memory.ram_origin();
    let mut lines = Vec::new();
    let mut addr = sig_begin;
    while addr < sig_end {
        let offset = addr.wrapping_sub(ram_origin);
        let word = u32::from_le_bytes([
            hart.memory.ram()[offset as usize],
            hart.memory.ram()[offset as usize + 1],
            hart.memory.ram()[offset as usize + 2],
            hart.memory.ram()[offset as usize + 3],
        ]);
        lines.push(format!("{word:08x}"));
        addr += 4;
    }
    fs::write(&sig_path_out, lines.join("\n") + "\n")
        .map_err(|_| DriverError::MalformedSignature(sig_path_out.display().to_string()))?;

    Ok(())
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::from(0),
        Err(err) => {
            warn!(error:? = err; "driver failed");
            ExitCode::from(exit_code_for(&err))
        }
    }
}
