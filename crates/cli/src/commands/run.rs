//! Run an image to completion.

use super::{check_outcome, load_vm, stop_reason, Report};
use anyhow::Result;
use clap::Args;
use colored::Colorize;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use zzvm_core::Register;
use zzvm_vm::VmConfig;

#[derive(Args)]
pub struct RunArgs {
    /// Image file, `-` for standard input
    #[arg(default_value = "-")]
    image: PathBuf,

    /// Print the final context as JSON
    #[arg(long)]
    json: bool,
}

pub fn run(args: RunArgs, config: VmConfig) -> Result<()> {
    let stdout = io::stdout();
    run_image(&args.image, config, args.json, &mut stdout.lock())
}

/// Execute until HLT or a fault, then dump the context once to `out`.
pub(crate) fn run_image<W: Write>(
    path: &Path,
    config: VmConfig,
    json: bool,
    out: &mut W,
) -> Result<()> {
    let mut vm = load_vm(path, config)?;

    let outcome = vm.run();
    let reason = stop_reason(&outcome)?;
    let snapshot = vm.snapshot()?;

    if json {
        let report = Report::new(&outcome, reason, &snapshot);
        writeln!(out, "{}", serde_json::to_string_pretty(&report)?)?;
    } else {
        let status = if reason.is_success() {
            reason.to_string().green().bold()
        } else {
            reason.to_string().red().bold()
        };
        writeln!(out, "{} {}", "Stopped:".bold(), status)?;
        write!(out, "{}", snapshot)?;
    }

    let ip = snapshot.register(Register::IP);
    vm.destroy()?;
    check_outcome(outcome, ip)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_util::write_image;
    use tempfile::TempDir;

    fn run_source(source: &str, json: bool) -> (Result<()>, String) {
        let dir = TempDir::new().unwrap();
        let path = write_image(&dir, "prog.zz", source);
        let mut out = Vec::new();
        let result = run_image(&path, VmConfig::with_seed(3), json, &mut out);
        (result, String::from_utf8(out).unwrap())
    }

    #[test]
    fn test_run_dumps_context() {
        colored::control::set_override(false);
        let (result, text) = run_source(".sect TEXT\nMOVI R1, 0x1234\nPUSI 0xbeef\nHLT", false);

        assert!(result.is_ok());
        assert!(text.starts_with("Stopped: halt\n--- Registers ---\n"));
        assert!(text.contains("R1: 0x1234"));
        assert!(text.contains("SP: 0xffee"));
        assert!(text.contains("IP: 0x4008"));
        assert!(text.contains("0xffee: 0xbeef"));
    }

    #[test]
    fn test_run_json() {
        let (result, text) = run_source(".sect TEXT\nMOVI R2, 9\nHLT", true);
        assert!(result.is_ok());

        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["stop_reason"], "Halt");
        assert_eq!(value["code"], -4);
        assert!(value.get("error").is_none());
        assert_eq!(value["context"]["registers"][2]["name"], "R2");
        assert_eq!(value["context"]["registers"][2]["value"], 9);
    }

    #[test]
    fn test_run_fault_still_dumps() {
        let (result, text) = run_source(".sect TEXT\nNOP\n.db 1f, 00, 00, 00", true);

        let err = result.unwrap_err();
        assert!(format!("{:#}", err).contains("Invalid instruction: 0x1F"));

        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["stop_reason"], "InvalidInstruction");
        assert_eq!(value["code"], -3);
        assert_eq!(value["context"]["registers"][7]["value"], 0x4004);
    }
}
