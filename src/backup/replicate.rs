use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::Result;
use crate::host::Host;
use crate::signal_handler::CancelToken;
use crate::util::command::RunningProcess;

pub const POLL_TIMEOUT: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplicaStatus {
    Done,
    Failed(i32),
    /// Could not be started, or killed on cancellation.
    Aborted(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Replica {
    pub dest: PathBuf,
    pub status: ReplicaStatus,
}

#[derive(Debug, Default)]
pub struct ReplicationReport {
    /// In completion order.
    pub replicas: Vec<Replica>,
}

impl ReplicationReport {
    pub fn failed(&self) -> usize {
        self.replicas
            .iter()
            .filter(|replica| replica.status != ReplicaStatus::Done)
            .count()
    }
}

struct Pending {
    dest: PathBuf,
    process: Box<dyn RunningProcess>,
}

/// Populates sibling generations as hard-link copies of a fresh backup.
pub struct Replicator<'a> {
    host: &'a Host,
    cancel: &'a CancelToken,
    poll_timeout: Duration,
}

impl<'a> Replicator<'a> {
    pub fn new(host: &'a Host, cancel: &'a CancelToken) -> Self {
        Self {
            host,
            cancel,
            poll_timeout: POLL_TIMEOUT,
        }
    }

    /// Start one copy per destination and wait for all of them. Copies that
    /// fail are reported, never returned as errors.
    pub fn clone_into(&self, source: &Path, dests: &[PathBuf]) -> ReplicationReport {
        let mut report = ReplicationReport::default();
        let mut pending = Vec::new();
        for dest in dests {
            info!("copying {} to {}", source.display(), dest.display());
            match self.host.hard_link_copy_async(source, dest) {
                Ok(process) => pending.push(Pending {
                    dest: dest.clone(),
                    process,
                }),
                Err(err) => {
                    warn!("cannot start copy to {}: {}", dest.display(), err);
                    report.replicas.push(Replica {
                        dest: dest.clone(),
                        status: ReplicaStatus::Aborted(err.to_string()),
                    });
                }
            }
        }

        while !pending.is_empty() {
            if self.cancel.is_cancelled() {
                for mut job in pending.drain(..) {
                    warn!("killing copy to {}", job.dest.display());
                    job.process.kill();
                    report.replicas.push(Replica {
                        dest: job.dest,
                        status: ReplicaStatus::Aborted("interrupted".to_string()),
                    });
                }
                break;
            }
            let mut index = 0;
            while index < pending.len() {
                match self.poll(&mut pending[index]) {
                    Ok(None) => index += 1,
                    Ok(Some(status)) => {
                        let job = pending.remove(index);
                        report.replicas.push(Replica {
                            dest: job.dest,
                            status,
                        });
                    }
                    Err(err) => {
                        let mut job = pending.remove(index);
                        job.process.kill();
                        report.replicas.push(Replica {
                            dest: job.dest,
                            status: ReplicaStatus::Aborted(err.to_string()),
                        });
                    }
                }
            }
        }
        report
    }

    fn poll(&self, job: &mut Pending) -> Result<Option<ReplicaStatus>> {
        let Some(code) = job.process.poll(self.poll_timeout)? else {
            return Ok(None);
        };
        if code == 0 {
            debug!("copy to {} finished", job.dest.display());
            Ok(Some(ReplicaStatus::Done))
        } else {
            warn!("copy to {} exited with {}", job.dest.display(), code);
            Ok(Some(ReplicaStatus::Failed(code)))
        }
    }
}
