use std::path::{Path, PathBuf};

use tracing::{error, info, warn};

use crate::backup::rsync::{RsyncJob, SyncOutcome};
use crate::config::model::{RsyncConfig, Target};
use crate::error::Result;
use crate::host::Host;
use crate::util::paths::path_arg;

pub const NON_INCREMENTAL_DIR: &str = "non-incremental";

/// Syncs one target into a fresh generation. On failure the destination is
/// reset to a hard-link copy of the link-base, or removed when there is none.
pub struct BackupTransaction<'a> {
    pub host: &'a Host,
    pub rsync: &'a RsyncConfig,
    pub root: &'a Path,
    pub target: &'a Target,
    /// Local path (snapshot-substituted) or `host:/path/`, ending in `/`.
    pub source: String,
    pub dest: PathBuf,
    pub link_base: Option<PathBuf>,
    pub extra: &'a [String],
}

impl BackupTransaction<'_> {
    pub fn execute(&self) -> Result<SyncOutcome> {
        match self.sync() {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                warn!("error during transaction for {}, rolling back", self.target.name);
                self.rollback();
                Err(err)
            }
        }
    }

    fn sync(&self) -> Result<SyncOutcome> {
        self.host.create_dir_all(&self.dest)?;
        if let (false, Some(link_base)) = (self.rsync.link_dest, &self.link_base) {
            warn!("rsync --link-dest disabled, seeding with a hard-link copy");
            self.host.hard_link_copy(link_base, &self.dest)?;
        }

        let mut extra = self.extra.to_vec();
        for item in &self.target.exclude_from_incremental {
            extra.push("--exclude".to_string());
            extra.push(item.clone());
        }
        let mut outcome = RsyncJob {
            target: self.target,
            source: self.source.clone(),
            dest: path_arg(&self.dest),
            link_dest: self.link_base.as_deref(),
            extra,
        }
        .run(self.host, self.rsync)?;

        for item in &self.target.exclude_from_incremental {
            if let SyncOutcome::PartialTransfer(code) = self.sync_non_incremental(item)? {
                outcome = SyncOutcome::PartialTransfer(code);
            }
        }
        Ok(outcome)
    }

    /// Mirror `item` into `<root>/non-incremental/<dest>/` outside the
    /// rotated generations.
    fn sync_non_incremental(&self, item: &str) -> Result<SyncOutcome> {
        let rel = item.trim_start_matches('/');
        let dest = self
            .root
            .join(NON_INCREMENTAL_DIR)
            .join(&self.target.dest)
            .join(rel);
        if let Some(parent) = dest.parent() {
            if parent.exists() && !parent.is_dir() {
                info!("replacing non-directory {}", parent.display());
                self.host.remove_tree(parent)?;
            }
            self.host.create_dir_all(parent)?;
        }

        let mut source = format!("{}{}", self.source, rel);
        let source_is_dir = if self.target.is_local() {
            Path::new(&source).is_dir()
        } else {
            true
        };
        if dest.exists() && dest.is_dir() != source_is_dir {
            info!("type of {} changed, removing stale copy", dest.display());
            self.host.remove_tree(&dest)?;
        }
        let mut dest_arg = path_arg(&dest);
        if source_is_dir {
            source.push('/');
            dest_arg.push('/');
        }
        info!("syncing {} without history to {}", item, dest_arg);
        RsyncJob {
            target: self.target,
            source,
            dest: dest_arg,
            link_dest: None,
            extra: vec!["--delete".to_string()],
        }
        .run(self.host, self.rsync)
    }

    fn rollback(&self) {
        if let Err(err) = self.host.remove_tree(&self.dest) {
            error!("rollback: {}", err);
            return;
        }
        if let Some(link_base) = &self.link_base {
            if let Err(err) = self.host.hard_link_copy(link_base, &self.dest) {
                error!("rollback: {}", err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::model::{SshConfig, ToolsConfig};
    use crate::error::RotavaultError;
    use crate::util::testing::ScriptedExecutor;
    use std::fs;

    fn target(source: &str, non_incremental: &[&str]) -> Target {
        Target {
            name: "data".to_string(),
            host: None,
            source: source.to_string(),
            dest: "local/data".to_string(),
            excludes: Vec::new(),
            exclude_from_incremental: non_incremental.iter().map(|s| s.to_string()).collect(),
            ssh: SshConfig::default(),
            trickle: None,
            ionice: None,
        }
    }

    fn in_process_tools() -> ToolsConfig {
        ToolsConfig {
            cp: None,
            ..ToolsConfig::default()
        }
    }

    #[test]
    fn seeds_with_cp_when_link_dest_is_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let executor = ScriptedExecutor::new();
        let host = Host::new(executor.boxed(), ToolsConfig::default());
        let rsync = RsyncConfig {
            link_dest: false,
            ..RsyncConfig::default()
        };
        let target = target("/data/", &[]);
        let dest = dir.path().join("daily.0/local/data");
        let link_base = dir.path().join("daily.1/local/data");
        let outcome = BackupTransaction {
            host: &host,
            rsync: &rsync,
            root: dir.path(),
            target: &target,
            source: target.source.clone(),
            dest: dest.clone(),
            link_base: Some(link_base.clone()),
            extra: &[],
        }
        .execute()
        .unwrap();
        assert_eq!(outcome, SyncOutcome::Complete);
        let calls = executor.calls();
        assert_eq!(
            calls[0],
            format!("cp -al {}/. {}", link_base.display(), dest.display())
        );
        assert!(calls[1].starts_with("rsync -a "));
        assert!(!calls[1].contains("--link-dest"));
    }

    #[test]
    fn failed_sync_restores_link_base() {
        let dir = tempfile::tempdir().unwrap();
        let link_base = dir.path().join("daily.1/local/data");
        fs::create_dir_all(&link_base).unwrap();
        fs::write(link_base.join("kept"), "old").unwrap();

        let executor = ScriptedExecutor::new()
            .exit_code("rsync", 12)
            .on("rsync", |argv| {
                let dest = Path::new(argv.last().unwrap());
                fs::write(dest.join("partial"), "half").unwrap();
            });
        let host = Host::new(executor.boxed(), in_process_tools());
        let rsync = RsyncConfig::default();
        let target = target("/data/", &[]);
        let dest = dir.path().join("daily.0/local/data");
        let err = BackupTransaction {
            host: &host,
            rsync: &rsync,
            root: dir.path(),
            target: &target,
            source: target.source.clone(),
            dest: dest.clone(),
            link_base: Some(link_base),
            extra: &[],
        }
        .execute()
        .unwrap_err();
        assert!(matches!(err, RotavaultError::SyncFailed { code: 12, .. }));
        assert!(!dest.join("partial").exists());
        assert_eq!(fs::read_to_string(dest.join("kept")).unwrap(), "old");
    }

    #[test]
    fn failed_first_sync_leaves_no_destination() {
        let dir = tempfile::tempdir().unwrap();
        let executor = ScriptedExecutor::new().exit_code("rsync", 11);
        let host = Host::new(executor.boxed(), in_process_tools());
        let rsync = RsyncConfig::default();
        let target = target("/data/", &[]);
        let dest = dir.path().join("daily.0/local/data");
        let result = BackupTransaction {
            host: &host,
            rsync: &rsync,
            root: dir.path(),
            target: &target,
            source: target.source.clone(),
            dest: dest.clone(),
            link_base: None,
            extra: &[],
        }
        .execute();
        assert!(result.is_err());
        assert!(!dest.exists());
    }

    #[test]
    fn non_incremental_subtree_is_mirrored_separately() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("src");
        fs::create_dir_all(source.join("cache")).unwrap();
        let root = dir.path().join("backup");
        let stale = root.join(NON_INCREMENTAL_DIR).join("local/data/cache");
        fs::create_dir_all(stale.parent().unwrap()).unwrap();
        fs::write(&stale, "was a file").unwrap();

        let executor = ScriptedExecutor::new().exit_code("--delete -r", 24);
        let host = Host::new(executor.boxed(), in_process_tools());
        let rsync = RsyncConfig {
            args: vec!["-a".to_string()],
            ..RsyncConfig::default()
        };
        let source_arg = format!("{}/", source.display());
        let target = target(&source_arg, &["/cache"]);
        let outcome = BackupTransaction {
            host: &host,
            rsync: &rsync,
            root: &root,
            target: &target,
            source: source_arg.clone(),
            dest: root.join("daily.0/local/data"),
            link_base: None,
            extra: &[],
        }
        .execute()
        .unwrap();
        assert_eq!(outcome, SyncOutcome::PartialTransfer(24));
        assert!(!stale.exists());
        let calls = executor.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls[0].contains("--exclude /cache"));
        assert!(calls[1].ends_with(&format!(
            "--delete -r {}cache/ {}/",
            source_arg,
            stale.display()
        )));
    }
}
