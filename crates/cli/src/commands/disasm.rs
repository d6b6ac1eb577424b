//! Disassemble an image.

use super::read_image;
use anyhow::Result;
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;
use zzvm_core::{Image, INSTRUCTION_SIZE};
use zzvm_vm::disassemble_range;

#[derive(Args)]
pub struct DisasmArgs {
    /// Image file, `-` for standard input
    #[arg(default_value = "-")]
    image: PathBuf,
}

pub fn run(args: DisasmArgs) -> Result<()> {
    let image = read_image(&args.image)?;

    println!("{} 0x{:04x}", "Entry:".bold(), image.entry);
    for line in render(&image) {
        println!("{}", line);
    }
    Ok(())
}

/// One header line per section followed by `address: bytes  text` lines.
fn render(image: &Image) -> Vec<String> {
    let mut lines = Vec::new();

    for (index, section) in image.sections.iter().enumerate() {
        lines.push(format!(
            "section #{} at 0x{:04x}, {} bytes",
            index,
            section.address,
            section.data.len()
        ));

        let chunks = section.data.chunks_exact(INSTRUCTION_SIZE);
        let tail = chunks.remainder();
        for ((address, text), bytes) in disassemble_range(section.address, &section.data)
            .into_iter()
            .zip(chunks)
        {
            lines.push(format!("  {:04x}:  {}  {}", address, hex::encode(bytes), text));
        }
        if !tail.is_empty() {
            let address = section
                .address
                .wrapping_add((section.data.len() - tail.len()) as u16);
            lines.push(format!("  {:04x}:  {}", address, hex::encode(tail)));
        }
    }

    lines
}
