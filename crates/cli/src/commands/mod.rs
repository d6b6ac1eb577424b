//! CLI commands module.

use anyhow::{Context, Result};
use clap::Subcommand;
use serde::Serialize;
use std::fs;
use std::io;
use std::path::Path;
use zzvm_core::Image;
use zzvm_vm::{ContextSnapshot, StopReason, Vm, VmConfig, VmError};

mod asm;
mod disasm;
mod run;
mod trace;

/// What `Vm::execute` hands back.
pub(crate) type Outcome = std::result::Result<StopReason, VmError>;

#[derive(Subcommand)]
pub enum Commands {
    /// Run an image until HLT, then dump the context
    Run(run::RunArgs),
    /// Single-step an image, dumping the context after every instruction
    Trace(trace::TraceArgs),
    /// Assemble a source file into an image
    Asm(asm::AsmArgs),
    /// Disassemble the sections of an image
    Disasm(disasm::DisasmArgs),
}

pub fn run(cmd: Commands, config: VmConfig) -> Result<()> {
    match cmd {
        Commands::Run(args) => run::run(args, config),
        Commands::Trace(args) => trace::run(args, config),
        Commands::Asm(args) => asm::run(args),
        Commands::Disasm(args) => disasm::run(args),
    }
}

/// Read an encoded image from `path`, or from standard input when it is `-`.
pub(crate) fn read_image(path: &Path) -> Result<Image> {
    if path.as_os_str() == "-" {
        // Bytes after the image stay in the shared stdin buffer for SYS reads.
        return Image::read_from(io::stdin().lock()).context("Failed to read image from stdin");
    }

    let file =
        fs::File::open(path).with_context(|| format!("Failed to open image: {:?}", path))?;
    Image::read_from(io::BufReader::new(file))
        .with_context(|| format!("Failed to read image: {:?}", path))
}

/// Create a VM and load the image at `path` into it.
pub(crate) fn load_vm(path: &Path, config: VmConfig) -> Result<Vm> {
    let image = read_image(path)?;
    let mut vm = Vm::with_config(config);
    vm.load_image(&image)
        .with_context(|| format!("Failed to load image: {:?}", path))?;
    Ok(vm)
}

/// The stop reason of an execute call. API misuse carries none and is an error.
pub(crate) fn stop_reason(result: &Outcome) -> Result<StopReason> {
    match result {
        Ok(reason) => Ok(*reason),
        Err(e) => e.stop_reason().ok_or_else(|| anyhow::Error::new(e.clone())),
    }
}

/// Context dump in JSON form.
#[derive(Serialize)]
pub(crate) struct Report<'a> {
    pub stop_reason: StopReason,
    pub code: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub context: &'a ContextSnapshot,
}

impl<'a> Report<'a> {
    pub fn new(
        result: &Outcome,
        reason: StopReason,
        context: &'a ContextSnapshot,
    ) -> Self {
        Self {
            stop_reason: reason,
            code: reason.code(),
            error: result.as_ref().err().map(ToString::to_string),
            context,
        }
    }
}

/// Fail with a diagnostic when execution stopped on a fault.
pub(crate) fn check_outcome(result: Outcome, ip: u16) -> Result<()> {
    match result {
        Ok(_) => Ok(()),
        Err(e) => {
            let code = e.stop_reason().map(StopReason::code).unwrap_or_default();
            Err(anyhow::Error::new(e).context(format!(
                "Failed to execute at 0x{:04x}, stop reason {}",
                ip, code
            )))
        }
    }
}

#[cfg(test)]
pub(crate) mod test_util {
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;
    use zzvm_assembler::assemble;

    /// Assemble `source` and write the encoded image into `dir`.
    pub fn write_image(dir: &TempDir, name: &str, source: &str) -> PathBuf {
        let image = assemble(source).unwrap();
        let path = dir.path().join(name);
        fs::write(&path, image.encode().unwrap()).unwrap();
        path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use zzvm_core::Register;

    #[test]
    fn test_read_image_from_file() {
        let dir = TempDir::new().unwrap();
        let path = test_util::write_image(&dir, "prog.zz", ".sect TEXT\nMOVI R1, 7\nHLT");

        let image = read_image(&path).unwrap();
        assert_eq!(image.entry, 0x4000);
        assert_eq!(image.sections[0].data.len(), 8);
    }

    #[test]
    fn test_read_image_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = read_image(&dir.path().join("absent.zz")).unwrap_err();
        assert!(err.to_string().contains("Failed to open image"));
    }

    #[test]
    fn test_read_image_rejects_garbage() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.zz");
        fs::write(&path, "not an image at all, definitely not").unwrap();
        assert!(read_image(&path).is_err());
    }

    #[test]
    fn test_load_vm_sets_entry() {
        let dir = TempDir::new().unwrap();
        let path = test_util::write_image(&dir, "prog.zz", ".sect TEXT\n.entry $go\nNOP\ngo:\nHLT");

        let vm = load_vm(&path, VmConfig::with_seed(1)).unwrap();
        assert_eq!(vm.register(Register::IP).unwrap(), 0x4004);
    }

    #[test]
    fn test_stop_reason_mapping() {
        assert_eq!(stop_reason(&Ok(StopReason::Halt)).unwrap(), StopReason::Halt);
        assert_eq!(
            stop_reason(&Err(VmError::InvalidInstruction(0x1F))).unwrap(),
            StopReason::InvalidInstruction
        );
        assert!(stop_reason(&Err(VmError::InvalidState(zzvm_vm::VmState::Freed))).is_err());
    }

    #[test]
    fn test_check_outcome() {
        assert!(check_outcome(Ok(StopReason::Halt), 0x4000).is_ok());

        let err = check_outcome(Err(VmError::InvalidRegister(9)), 0x4008).unwrap_err();
        let text = format!("{:#}", err);
        assert!(text.contains("0x4008"));
        assert!(text.contains("stop reason -2"));
    }
}
