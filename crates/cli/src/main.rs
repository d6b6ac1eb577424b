//! zzvm CLI entry point.

use clap::Parser;
use tracing::level_filters::LevelFilter;
use zzvm_vm::VmConfig;

mod commands;

#[derive(Parser)]
#[command(name = "zzvm")]
#[command(about = "Run, trace, assemble and disassemble zzvm images", long_about = None)]
struct Cli {
    /// Log level: off, error, warn, info, debug or trace
    #[arg(long, global = true, default_value = "warn")]
    log_level: LevelFilter,

    /// Seed for RAND (fresh entropy when omitted)
    #[arg(long, global = true)]
    seed: Option<u64>,

    #[command(subcommand)]
    command: Option<commands::Commands>,
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(cli.log_level)
        .with_writer(std::io::stderr)
        .init();

    let config = VmConfig {
        seed: cli.seed,
        ..VmConfig::default()
    };

    match cli.command {
        Some(cmd) => {
            if let Err(e) = commands::run(cmd, config) {
                eprintln!("Error: {:#}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("zzvm - a 16-bit register virtual machine");
            println!("Run 'zzvm --help' for usage information.");
        }
    }
}
