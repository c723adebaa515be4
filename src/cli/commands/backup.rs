use std::path::Path;

use chrono::Local;
use tracing::info;

use crate::backup::rsync::SyncOutcome;
use crate::backup::replicate::ReplicaStatus;
use crate::backup::{BackupReport, BackupRequest, Orchestrator};
use crate::cli::args::BackupArgs;
use crate::cli::commands::host_for;
use crate::config::load::load_config;
use crate::error::Result;
use crate::signal_handler::CancelToken;
use crate::types::RunMode;
use crate::util::lock::acquire_run_lock;

pub fn run_backup_command(
    config_path: &Path,
    args: &BackupArgs,
    run_mode: RunMode,
    cancel: &CancelToken,
) -> Result<i32> {
    println!("started {}", Local::now().format("%d-%m-%Y %H:%M"));

    let config = load_config(config_path)?;
    if run_mode.verbose {
        println!(
            "loaded config {} with {} target(s)",
            config_path.display(),
            config.targets.len()
        );
    }
    let _lock = acquire_run_lock(&config.base.lock_file, run_mode)?;
    let host = host_for(&config, run_mode);

    let request = BackupRequest {
        intervals: &args.intervals,
        rsync_extra: &args.rsync_args,
        policy: args.policy(),
    };
    let report = Orchestrator::new(&config, &host, cancel).run(&request)?;
    print_report(&report);

    println!("finished {}", Local::now().format("%d-%m-%Y %H:%M"));
    Ok(if report.has_failures() { 1 } else { 0 })
}

fn print_report(report: &BackupReport) {
    if !report.ran_backup {
        println!("{}: rotated only", report.backup_interval);
        return;
    }
    println!("{}:", report.backup_interval);
    for target in &report.targets {
        let status = match &target.outcome {
            Ok(SyncOutcome::Complete) => "ok".to_string(),
            Ok(SyncOutcome::PartialTransfer(code)) => format!("partial (rsync exit {})", code),
            Err(err) => format!("FAILED: {}", err),
        };
        println!("  {}: {}", target.name, status);
    }
    for replica in &report.replicas.replicas {
        let status = match &replica.status {
            ReplicaStatus::Done => "ok".to_string(),
            ReplicaStatus::Failed(code) => format!("FAILED (exit {})", code),
            ReplicaStatus::Aborted(reason) => format!("FAILED: {}", reason),
        };
        println!("  copy {}: {}", replica.dest.display(), status);
    }
    if report.teardown_failures > 0 {
        info!("{} teardown step(s) failed", report.teardown_failures);
        println!("  teardown: {} failure(s)", report.teardown_failures);
    }
}
