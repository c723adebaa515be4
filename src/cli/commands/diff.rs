use std::path::{Path, PathBuf};

use tracing::{error, info};

use crate::backup::rsync::RsyncJob;
use crate::cli::commands::host_for;
use crate::config::load::load_config;
use crate::context::device::with_destination;
use crate::error::{Result, RotavaultError};
use crate::rotation::IntervalRotator;
use crate::signal_handler::CancelToken;
use crate::types::{RunMode, TeardownPolicy};
use crate::util::paths::path_arg;

const DIFF_ARGS: [&str; 3] = ["-v", "--progress", "--dry-run"];

/// Compare a stored generation against the live sources of `targets`.
pub fn run_diff(
    config_path: &Path,
    source: &str,
    targets: &[String],
    run_mode: RunMode,
    cancel: &CancelToken,
) -> Result<i32> {
    let config = load_config(config_path)?;
    let mut base = config.base.clone();
    // comparing never spins the drive down
    base.destination.suspend = false;
    let host = host_for(&config, run_mode);

    with_destination(&base, &host, TeardownPolicy::default(), cancel, || {
        let rotator = IntervalRotator::new(&host, &base.destination.root);
        let source_dir = resolve_source(&rotator, source)?;
        info!("using source directory: {}", source_dir.display());

        let mut failures = 0;
        for name in targets {
            cancel.check()?;
            let Some(target) = config.targets.iter().find(|t| &t.name == name) else {
                error!("no such target: {}", name);
                failures += 1;
                continue;
            };
            info!("comparing target: {}", target.name);
            let job = RsyncJob {
                target,
                source: format!("{}/", path_arg(&source_dir.join(target.dest_path()))),
                dest: target.source_spec(&target.source),
                link_dest: None,
                extra: DIFF_ARGS.iter().map(|s| s.to_string()).collect(),
            };
            if let Err(err) = job.run(&host, &base.rsync) {
                error!("{}", err);
                failures += 1;
            }
        }
        Ok(if failures > 0 { 1 } else { 0 })
    })
}

/// A generation directory below the root, or the newest generation of an
/// interval.
fn resolve_source(rotator: &IntervalRotator<'_>, source: &str) -> Result<PathBuf> {
    let direct = rotator.root().join(source);
    if direct.is_dir() {
        return Ok(direct);
    }
    match rotator.newest(source)? {
        Some((_, name)) => Ok(rotator.root().join(name)),
        None => Err(RotavaultError::message(format!(
            "no such source interval: {}",
            source
        ))),
    }
}
