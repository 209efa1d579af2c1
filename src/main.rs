//! `srd` binary entry point.

use std::process::ExitCode;

use clap::Parser;
use colored::Colorize;
use signal_relay::cli_app::{self, Cli};

fn main() -> ExitCode {
    let cli = Cli::parse();
    match cli_app::run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{} {err}", "srd:".red().bold());
            ExitCode::from(1)
        }
    }
}
