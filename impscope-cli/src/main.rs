mod app;
mod commands;
mod output;

use anyhow::Context;
use clap::Parser;
use impscope::StopSignal;

use crate::app::{Cli, Command};

fn main() -> anyhow::Result<()> {
    // First Ctrl+C lets the refresh loop finish its pass, the second one exits
    let stop = StopSignal::new();
    let handler_stop = stop.clone();
    ctrlc::set_handler(move || {
        if handler_stop.is_stopped() {
            eprintln!("\nCancelled.");
            std::process::exit(130);
        }
        handler_stop.stop();
    })
    .context("failed to set Ctrl+C handler")?;

    let cli = Cli::parse();

    // Show impscope info+ on stderr unless --json; --verbose enables debug; RUST_LOG overrides
    if !cli.global.json {
        let level = if cli.global.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        };
        env_logger::Builder::new()
            .filter_module("impscope", level)
            .parse_default_env()
            .target(env_logger::Target::Stderr)
            .format_timestamp(None)
            .format_module_path(false)
            .format_target(false)
            .init();
    }

    match &cli.command {
        Command::Headers { path } => commands::headers::run(path, &cli.global),
        Command::Imports { path } => commands::imports::run(path, &cli.global),
        Command::Watch { path, refresh } => {
            commands::watch::run(path, refresh, &cli.global, &stop)
        }
        Command::SelfImage { refresh } => commands::self_image::run(refresh, &cli.global, &stop),
    }
}
