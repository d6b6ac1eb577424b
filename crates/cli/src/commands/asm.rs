//! Assemble source into an image.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::fs;
use std::path::{Path, PathBuf};
use zzvm_assembler::assemble;

#[derive(Args)]
pub struct AsmArgs {
    /// Path to assembly source file
    source: PathBuf,

    /// Output path (defaults to the source path with a `.zz` extension)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Write plain bytes instead of the bit-letter encoding
    #[arg(long)]
    raw: bool,
}

pub fn run(args: AsmArgs) -> Result<()> {
    let output = args
        .output
        .clone()
        .unwrap_or_else(|| default_output(&args.source, args.raw));

    println!(
        "  Compiling: {}",
        args.source.display().to_string().bright_black()
    );

    let written = assemble_file(&args.source, &output, args.raw)?;

    println!(
        "{}  Wrote {} bytes to {}",
        "✓".green().bold(),
        written,
        output.display().to_string().bright_yellow()
    );
    Ok(())
}

/// `prog.s` becomes `prog.zz`, or `prog.bin` for raw output.
fn default_output(source: &Path, raw: bool) -> PathBuf {
    source.with_extension(if raw { "bin" } else { "zz" })
}

/// Assemble `source` into `output`. Returns the number of bytes written.
pub(crate) fn assemble_file(source: &Path, output: &Path, raw: bool) -> Result<usize> {
    let source_code = fs::read_to_string(source)
        .with_context(|| format!("Failed to read source file: {:?}", source))?;

    let image = assemble(&source_code).with_context(|| "Failed to compile assembly code")?;

    let bytes = if raw { image.to_raw()? } else { image.encode()? };
    fs::write(output, &bytes).with_context(|| format!("Failed to write image: {:?}", output))?;

    Ok(bytes.len())
}
