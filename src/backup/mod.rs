use std::fmt;
use std::path::PathBuf;

use tracing::{debug, error, info, warn};

use crate::backup::replicate::{ReplicationReport, Replicator};
use crate::backup::rsync::SyncOutcome;
use crate::backup::transaction::BackupTransaction;
use crate::config::model::{Base, Interval, RuntimeConfig};
use crate::context::device::destination_contexts;
use crate::context::ContextStack;
use crate::error::{ConfigError, Result};
use crate::host::Host;
use crate::notify::device_missing_callback;
use crate::rotation::IntervalRotator;
use crate::signal_handler::CancelToken;
use crate::snapshot::SnapshotManager;
use crate::types::TeardownPolicy;

pub mod replicate;
pub mod rsync;
pub mod transaction;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    ResourcesAcquiring,
    SnapshotsActive,
    PerTargetSync,
    SnapshotsReleased,
    Replicating,
    ResourcesReleasing,
    Done,
    Failed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Idle => "idle",
            Phase::ResourcesAcquiring => "acquiring resources",
            Phase::SnapshotsActive => "snapshots active",
            Phase::PerTargetSync => "syncing targets",
            Phase::SnapshotsReleased => "snapshots released",
            Phase::Replicating => "replicating",
            Phase::ResourcesReleasing => "releasing resources",
            Phase::Done => "done",
            Phase::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug)]
pub struct TargetResult {
    pub name: String,
    pub outcome: std::result::Result<SyncOutcome, String>,
}

#[derive(Debug, Default)]
pub struct BackupReport {
    pub backup_interval: String,
    /// False when the run only rotated because the interval was not the
    /// lowest configured one.
    pub ran_backup: bool,
    pub targets: Vec<TargetResult>,
    pub replicas: ReplicationReport,
    pub teardown_failures: usize,
}

impl BackupReport {
    pub fn failed_targets(&self) -> usize {
        self.targets.iter().filter(|t| t.outcome.is_err()).count()
    }

    pub fn has_failures(&self) -> bool {
        self.failed_targets() > 0 || self.replicas.failed() > 0 || self.teardown_failures > 0
    }
}

pub struct BackupRequest<'a> {
    pub intervals: &'a [String],
    pub rsync_extra: &'a [String],
    pub policy: TeardownPolicy,
}

/// Requested intervals in configured order, lowest first. Unknown names are
/// a configuration error; duplicates collapse.
pub fn order_intervals<'c>(base: &'c Base, requested: &[String]) -> Result<Vec<&'c Interval>> {
    let mut positions = Vec::new();
    for name in requested {
        let position = base
            .interval_position(name)
            .ok_or_else(|| ConfigError::UnknownInterval(name.clone()))?;
        positions.push(position);
    }
    if positions.is_empty() {
        return Err(ConfigError::Invalid("no interval requested".to_string()).into());
    }
    positions.sort_unstable();
    positions.dedup();
    Ok(positions.into_iter().map(|p| &base.intervals[p]).collect())
}

pub struct Orchestrator<'a> {
    config: &'a RuntimeConfig,
    host: &'a Host,
    cancel: &'a CancelToken,
    phase: Phase,
}

impl<'a> Orchestrator<'a> {
    pub fn new(config: &'a RuntimeConfig, host: &'a Host, cancel: &'a CancelToken) -> Self {
        Self {
            config,
            host,
            cancel,
            phase: Phase::Idle,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    fn transition(&mut self, phase: Phase) {
        info!("phase: {} -> {}", self.phase, phase);
        self.phase = phase;
    }

    pub fn run(&mut self, request: &BackupRequest<'_>) -> Result<BackupReport> {
        let config = self.config;
        let base = &config.base;
        let intervals = order_intervals(base, request.intervals)?;

        self.transition(Phase::ResourcesAcquiring);
        let waiting = device_missing_callback(self.host, base.notify_user.clone());
        let contexts =
            destination_contexts(base, self.host, request.policy, Some(waiting), self.cancel);
        let stack = match ContextStack::enter(contexts, self.cancel) {
            Ok(stack) => stack,
            Err(err) => {
                self.transition(Phase::Failed);
                return Err(err);
            }
        };

        let result = self.run_entered(&intervals, request);

        self.transition(Phase::ResourcesReleasing);
        let teardown_failures = stack.exit(result.is_ok()).len();
        match result {
            Ok(mut report) => {
                report.teardown_failures = teardown_failures;
                self.transition(Phase::Done);
                Ok(report)
            }
            Err(err) => {
                self.transition(Phase::Failed);
                Err(err)
            }
        }
    }

    fn run_entered(
        &mut self,
        intervals: &[&Interval],
        request: &BackupRequest<'_>,
    ) -> Result<BackupReport> {
        let config = self.config;
        let base = &config.base;
        let rotator = IntervalRotator::new(self.host, &base.destination.root);
        let Some((backup, siblings)) = intervals.split_first() else {
            return Ok(BackupReport::default());
        };
        let mut report = BackupReport {
            backup_interval: backup.name.clone(),
            ..BackupReport::default()
        };

        rotator.shift(backup)?;
        if base.run_only_lowest && base.interval_position(&backup.name) != Some(0) {
            warn!(
                "nothing to do ({} is not the lowest interval configured)",
                backup.name
            );
            for sibling in siblings {
                rotator.shift(sibling)?;
            }
            return Ok(report);
        }

        report.targets = self.backup_pass(&rotator, backup, request.rsync_extra)?;
        report.ran_backup = true;

        for sibling in siblings {
            rotator.shift(sibling)?;
        }
        let source = rotator.generation_path(&backup.name, 0);
        let replicable = self.host.is_dry_run() || source.is_dir();
        if !siblings.is_empty() && !replicable {
            warn!("{} was not created, nothing to replicate", source.display());
        } else if !siblings.is_empty() {
            self.transition(Phase::Replicating);
            let dests: Vec<PathBuf> = siblings
                .iter()
                .map(|sibling| rotator.generation_path(&sibling.name, 0))
                .collect();
            report.replicas = Replicator::new(self.host, self.cancel).clone_into(&source, &dests);
        }
        self.cancel.check()?;
        Ok(report)
    }

    /// Sync every target into `<backup>.0`. Target failures are collected;
    /// snapshot failures and cancellation abort.
    fn backup_pass(
        &mut self,
        rotator: &IntervalRotator<'_>,
        backup: &Interval,
        rsync_extra: &[String],
    ) -> Result<Vec<TargetResult>> {
        let config = self.config;
        let base = &config.base;
        let generation = rotator.generation_path(&backup.name, 0);
        let link_generation = rotator
            .indices_for(&backup.name)?
            .into_iter()
            .find(|(index, _)| *index > 0)
            .map(|(_, name)| rotator.root().join(name));
        match &link_generation {
            Some(path) => info!("link-base generation: {}", path.display()),
            None => info!("no previous generation of {}, full copy", backup.name),
        }

        let mut snapshots = SnapshotManager::new(self.host, base.snapshots.as_ref()).acquire()?;
        self.transition(Phase::SnapshotsActive);
        if snapshots.is_empty() {
            debug!("reading sources directly, no snapshots taken");
        }
        self.transition(Phase::PerTargetSync);

        let mut results = Vec::new();
        let mut outcome = Ok(());
        for target in &config.targets {
            if let Err(err) = self.cancel.check() {
                outcome = Err(err);
                break;
            }
            info!("backing up {}", target.name);
            let source = if target.is_local() {
                snapshots.substitute(&target.source)
            } else {
                target.source_spec(&target.source)
            };
            let link_base = link_generation
                .as_ref()
                .map(|generation| generation.join(target.dest_path()))
                .filter(|path| path.is_dir());
            let transaction = BackupTransaction {
                host: self.host,
                rsync: &base.rsync,
                root: rotator.root(),
                target,
                source,
                dest: generation.join(target.dest_path()),
                link_base,
                extra: rsync_extra,
            };
            let result = transaction.execute().map_err(|err| {
                error!("target {} failed: {}", target.name, err);
                err.to_string()
            });
            results.push(TargetResult {
                name: target.name.clone(),
                outcome: result,
            });
        }

        snapshots.release();
        self.transition(Phase::SnapshotsReleased);
        outcome.map(|_| results)
    }
}
