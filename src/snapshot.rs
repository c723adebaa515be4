use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::config::model::SnapshotConfig;
use crate::error::{Result, RotavaultError};
use crate::host::Host;
use crate::util::paths::path_arg;

/// Snapshot name for a volume root: `/` becomes `__`.
pub fn snapshot_name(root: &str) -> String {
    root.replace('/', "__")
}

pub struct SnapshotManager<'a> {
    host: &'a Host,
    config: Option<&'a SnapshotConfig>,
}

impl<'a> SnapshotManager<'a> {
    pub fn new(host: &'a Host, config: Option<&'a SnapshotConfig>) -> Self {
        Self { host, config }
    }

    /// Snapshot every configured volume. On failure the snapshots already
    /// taken are deleted again.
    pub fn acquire(&self) -> Result<SnapshotSet<'a>> {
        let mut set = SnapshotSet::empty(self.host);
        let Some(config) = self.config else {
            debug!("no btrfs volumes configured");
            return Ok(set);
        };
        let dir = &config.directory;
        self.host.create_dir_all(dir).map_err(|err| RotavaultError::SnapshotFailed {
            volume: path_arg(dir),
            message: err.to_string(),
        })?;
        for root in &config.volumes {
            let snapshot = dir.join(snapshot_name(root));
            if let Err(err) = self.take(root, &snapshot) {
                set.release();
                return Err(RotavaultError::SnapshotFailed {
                    volume: root.clone(),
                    message: err.to_string(),
                });
            }
            set.taken.push((PathBuf::from(root), snapshot));
        }
        Ok(set)
    }

    fn take(&self, root: &str, snapshot: &Path) -> Result<()> {
        let btrfs = &self.host.tools().btrfs;
        if snapshot.is_dir() {
            info!("deleting old snapshot at {}", snapshot.display());
            self.host.check_call(&[
                btrfs.clone(),
                "subvolume".to_string(),
                "delete".to_string(),
                path_arg(snapshot),
            ])?;
        }
        info!("creating snapshot of {}", root);
        self.host.check_call(&[
            btrfs.clone(),
            "subvolume".to_string(),
            "snapshot".to_string(),
            "-r".to_string(),
            root.to_string(),
            path_arg(snapshot),
        ])
    }
}

/// Snapshots taken for one run. Deleted on [`SnapshotSet::release`] or drop.
pub struct SnapshotSet<'a> {
    host: &'a Host,
    taken: Vec<(PathBuf, PathBuf)>,
}

impl<'a> SnapshotSet<'a> {
    fn empty(host: &'a Host) -> Self {
        Self {
            host,
            taken: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.taken.is_empty()
    }

    pub fn substitute(&self, path: &str) -> String {
        substitute(&self.taken, path)
    }

    pub fn release(&mut self) {
        for (_, snapshot) in self.taken.drain(..) {
            let argv = [
                self.host.tools().btrfs.clone(),
                "subvolume".to_string(),
                "delete".to_string(),
                path_arg(&snapshot),
            ];
            if let Err(err) = self.host.check_call(&argv) {
                warn!("could not delete snapshot {}: {}", snapshot.display(), err);
            }
        }
    }
}

impl Drop for SnapshotSet<'_> {
    fn drop(&mut self) {
        self.release();
    }
}

/// Rewrite `path` to point into the snapshot of the longest volume root it
/// lies under. Roots match whole components only.
pub fn substitute(mapping: &[(PathBuf, PathBuf)], path: &str) -> String {
    let best = mapping
        .iter()
        .filter_map(|(root, snapshot)| {
            Path::new(path)
                .strip_prefix(root)
                .ok()
                .map(|rest| (root.components().count(), snapshot, rest))
        })
        .max_by_key(|(depth, _, _)| *depth);
    let Some((_, snapshot, rest)) = best else {
        return path.to_string();
    };
    let mut out = if rest.as_os_str().is_empty() {
        path_arg(snapshot)
    } else {
        path_arg(&snapshot.join(rest))
    };
    if path.ends_with('/') && !out.ends_with('/') {
        out.push('/');
    }
    debug!("snapshot substitution: {} => {}", path, out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::model::ToolsConfig;
    use crate::util::testing::ScriptedExecutor;

    fn mapping(pairs: &[(&str, &str)]) -> Vec<(PathBuf, PathBuf)> {
        pairs
            .iter()
            .map(|(a, b)| (PathBuf::from(a), PathBuf::from(b)))
            .collect()
    }

    #[test]
    fn longest_root_wins() {
        let map = mapping(&[("/", "/snap/root"), ("/home", "/snap/home")]);
        assert_eq!(substitute(&map, "/home/user/file"), "/snap/home/user/file");
        assert_eq!(substitute(&map, "/etc/"), "/snap/root/etc/");
        assert_eq!(substitute(&map, "/home/"), "/snap/home/");
    }

    #[test]
    fn roots_match_whole_components() {
        let map = mapping(&[("/home", "/snap/home")]);
        assert_eq!(substitute(&map, "/homer/file"), "/homer/file");
        assert_eq!(substitute(&map, "/var/log"), "/var/log");
        assert_eq!(substitute(&[], "/home/x"), "/home/x");
    }

    #[test]
    fn snapshots_are_taken_and_deleted() {
        let dir = tempfile::tempdir().unwrap();
        let config = SnapshotConfig {
            volumes: vec!["/".to_string(), "/home".to_string()],
            directory: dir.path().join("snapshots"),
        };
        let executor = ScriptedExecutor::new();
        let host = Host::new(executor.boxed(), ToolsConfig::default());
        let manager = SnapshotManager::new(&host, Some(&config));
        let mut set = manager.acquire().unwrap();
        let snap_dir = path_arg(&config.directory);
        assert_eq!(
            set.substitute("/home/alice/"),
            format!("{}/__home/alice/", snap_dir)
        );
        set.release();
        assert!(set.is_empty());
        assert_eq!(
            executor.calls(),
            vec![
                format!("btrfs subvolume snapshot -r / {}/__", snap_dir),
                format!("btrfs subvolume snapshot -r /home {}/__home", snap_dir),
                format!("btrfs subvolume delete {}/__", snap_dir),
                format!("btrfs subvolume delete {}/__home", snap_dir),
            ]
        );
    }

    #[test]
    fn failed_snapshot_cleans_up_earlier_ones() {
        let dir = tempfile::tempdir().unwrap();
        let config = SnapshotConfig {
            volumes: vec!["/".to_string(), "/home".to_string()],
            directory: dir.path().to_path_buf(),
        };
        let executor = ScriptedExecutor::new().exit_code("-r /home", 1);
        let host = Host::new(executor.boxed(), ToolsConfig::default());
        let err = SnapshotManager::new(&host, Some(&config))
            .acquire()
            .err()
            .unwrap();
        assert!(matches!(err, RotavaultError::SnapshotFailed { ref volume, .. } if volume == "/home"));
        let calls = executor.calls();
        assert_eq!(calls.len(), 3);
        assert!(calls[2].starts_with("btrfs subvolume delete "));
        assert!(calls[2].ends_with("/__"));
    }

    #[test]
    fn dropping_the_set_releases_snapshots() {
        let dir = tempfile::tempdir().unwrap();
        let config = SnapshotConfig {
            volumes: vec!["/srv".to_string()],
            directory: dir.path().to_path_buf(),
        };
        let executor = ScriptedExecutor::new();
        let host = Host::new(executor.boxed(), ToolsConfig::default());
        drop(SnapshotManager::new(&host, Some(&config)).acquire().unwrap());
        assert_eq!(executor.calls().len(), 2);
    }
}
