//! Single-step an image.

use super::{check_outcome, load_vm, stop_reason, Report};
use anyhow::Result;
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use zzvm_core::Register;
use zzvm_vm::{StopReason, TraceStep, VmConfig};

#[derive(Args)]
pub struct TraceArgs {
    /// Image file, `-` for standard input
    #[arg(default_value = "-")]
    image: PathBuf,

    /// Print one JSON object per step
    #[arg(long)]
    json: bool,

    /// Stop after this many instructions
    #[arg(long)]
    max_steps: Option<u64>,
}

#[derive(Serialize)]
struct StepReport<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    step: Option<&'a TraceStep>,
    #[serde(flatten)]
    report: Report<'a>,
}

pub fn run(args: TraceArgs, config: VmConfig) -> Result<()> {
    let stdout = io::stdout();
    trace_image(
        &args.image,
        config,
        args.json,
        args.max_steps,
        &mut stdout.lock(),
    )?;
    Ok(())
}

/// Execute one instruction at a time, dumping the context after each.
///
/// Returns the number of steps taken.
pub(crate) fn trace_image<W: Write>(
    path: &Path,
    config: VmConfig,
    json: bool,
    max_steps: Option<u64>,
    out: &mut W,
) -> Result<u64> {
    let mut vm = load_vm(path, config)?;
    vm.enable_trace(true);

    let mut steps = 0;
    loop {
        if max_steps.is_some_and(|max| steps >= max) {
            break;
        }

        let outcome = vm.step();
        let reason = stop_reason(&outcome)?;
        let snapshot = vm.snapshot()?;
        let recorded = vm.take_trace();
        let step = recorded.last();
        steps += 1;

        if json {
            let line = StepReport {
                step,
                report: Report::new(&outcome, reason, &snapshot),
            };
            writeln!(out, "{}", serde_json::to_string(&line)?)?;
        } else {
            if let Some(step) = step {
                writeln!(out, "{}", format!("{:04x}: {}", step.ip, step.text).cyan())?;
            }
            writeln!(out, "{}", snapshot)?;
        }

        if reason != StopReason::Completed {
            let ip = snapshot.register(Register::IP);
            vm.destroy()?;
            check_outcome(outcome, ip)?;
            return Ok(steps);
        }
    }

    vm.destroy()?;
    Ok(steps)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_util::write_image;
    use tempfile::TempDir;

    const COUNTDOWN: &str = r#"
        .sect TEXT
            MOVI R1, 3
        loop:
            ADDI R1, R1, -1
            JZI R1, $done
            JMP $loop
        done:
            HLT
    "#;

    fn trace_source(source: &str, json: bool, max: Option<u64>) -> (Result<u64>, String) {
        let dir = TempDir::new().unwrap();
        let path = write_image(&dir, "prog.zz", source);
        let mut out = Vec::new();
        let result = trace_image(&path, VmConfig::with_seed(3), json, max, &mut out);
        (result, String::from_utf8(out).unwrap())
    }

    #[test]
    fn test_trace_counts_steps() {
        colored::control::set_override(false);
        let (result, text) = trace_source(COUNTDOWN, false, None);

        // MOVI, 3 x (ADDI, JZI), 2 x JMP, HLT
        assert_eq!(result.unwrap(), 10);
        assert_eq!(text.matches("--- Registers ---").count(), 10);
        assert!(text.starts_with("4000: MOV   R1, 0x0003\n"));
        assert!(text.contains("4008: JZ    R1, 0x4010"));
        assert!(text.contains("4010: HLT"));
    }

    #[test]
    fn test_trace_json_lines() {
        let (result, text) = trace_source(COUNTDOWN, true, None);
        assert_eq!(result.unwrap(), 10);

        let lines: Vec<serde_json::Value> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 10);
        assert_eq!(lines[0]["step"]["ip"], 0x4000);
        assert_eq!(lines[0]["stop_reason"], "Completed");
        assert_eq!(lines[0]["context"]["registers"][1]["value"], 3);
        assert_eq!(lines[9]["stop_reason"], "Halt");
    }

    #[test]
    fn test_trace_step_limit() {
        let (result, text) = trace_source(COUNTDOWN, true, Some(4));
        assert_eq!(result.unwrap(), 4);
        assert_eq!(text.lines().count(), 4);
    }

    #[test]
    fn test_trace_stops_on_fault() {
        let (result, text) = trace_source(".sect TEXT\nNOP\nMOVI IP, 0xfffa\nNOP", true, None);

        assert!(format!("{:#}", result.unwrap_err()).contains("Out of bounds"));
        let last: serde_json::Value = serde_json::from_str(text.lines().last().unwrap()).unwrap();
        assert_eq!(last["stop_reason"], "OutOfBounds");
        assert!(last.get("step").is_none());
    }
}
