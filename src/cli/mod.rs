use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::args::{Cli, Command};
use crate::cli::commands::{backup, diff, exit_for_error, mount, promote};
use crate::config::dump::dump_config;
use crate::config::load::load_config;
use crate::signal_handler::{signal_handler, CancelToken};
use crate::types::RunMode;

const CONFIG_FILE: &str = "/etc/rotavault.yaml";
const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod args;
pub mod commands;

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(CONFIG_FILE));
    let run_mode = RunMode {
        dry_run: cli.dry_run,
        verbose: cli.verbose,
    };

    if let Command::DumpConfig = cli.command {
        let config = match load_config(&config_path) {
            Ok(config) => config,
            Err(err) => exit_for_error(&err),
        };
        let yaml = dump_config(&config).context("render configuration")?;
        print!("{}", yaml);
        return Ok(());
    }

    print_banner();
    let cancel = CancelToken::new();
    signal_handler(&cancel);

    let result = match &cli.command {
        Command::Backup(args) => backup::run_backup_command(&config_path, args, run_mode, &cancel),
        Command::Mount => mount::run_mount(&config_path, run_mode, &cancel).map(|_| 0),
        Command::Umount => mount::run_umount(&config_path, run_mode, &cancel).map(|_| 0),
        Command::Diff(args) => {
            diff::run_diff(&config_path, &args.source, &args.targets, run_mode, &cancel)
        }
        Command::Promote(args) => {
            promote::run_promote(&config_path, &args.lower, &args.upper, run_mode, &cancel)
                .map(|_| 0)
        }
        Command::DumpConfig => Ok(0),
    };

    match result {
        Ok(0) => Ok(()),
        Ok(code) => std::process::exit(code),
        Err(err) => exit_for_error(&err),
    }
}

fn print_banner() {
    println!("Rotavault {}", VERSION);
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
