use std::fs;
use std::os::unix::fs::symlink;
use std::path::Path;

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::model::ToolsConfig;
use crate::error::{Result, RotavaultError};
use crate::util::command::{check_call, Executor, FinishedProcess, RunningProcess};
use crate::util::paths::path_arg;

/// Everything the engine does to the outside world: external commands
/// through the selected [`Executor`] and filesystem mutations that honour
/// dry-run.
pub struct Host {
    executor: Box<dyn Executor>,
    tools: ToolsConfig,
}

impl Host {
    pub fn new(executor: Box<dyn Executor>, tools: ToolsConfig) -> Self {
        Self { executor, tools }
    }

    pub fn tools(&self) -> &ToolsConfig {
        &self.tools
    }

    pub fn is_dry_run(&self) -> bool {
        self.executor.is_dry_run()
    }

    pub fn run(&self, argv: &[String]) -> Result<i32> {
        self.executor.run(argv)
    }

    pub fn check_call(&self, argv: &[String]) -> Result<()> {
        check_call(self.executor.as_ref(), argv)
    }

    pub fn spawn(&self, argv: &[String]) -> Result<Box<dyn RunningProcess>> {
        self.executor.spawn(argv)
    }

    pub fn remove_tree(&self, path: &Path) -> Result<()> {
        if let Some(rm) = &self.tools.rm {
            return self.check_call(&[rm.clone(), "-rf".to_string(), path_arg(path)]);
        }
        if self.is_dry_run() {
            info!("dry-run: rm -rf {}", path.display());
            return Ok(());
        }
        let meta = match fs::symlink_metadata(path) {
            Ok(meta) => meta,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(err) => {
                return Err(RotavaultError::message(format!("stat {}: {}", path.display(), err)))
            }
        };
        let result = if meta.is_dir() {
            fs::remove_dir_all(path)
        } else {
            fs::remove_file(path)
        };
        result.map_err(|e| RotavaultError::message(format!("delete {}: {}", path.display(), e)))
    }

    pub fn rename(&self, from: &Path, to: &Path) -> std::io::Result<()> {
        if self.is_dry_run() {
            info!("dry-run: mv {} {}", from.display(), to.display());
            return Ok(());
        }
        fs::rename(from, to)
    }

    pub fn create_dir_all(&self, path: &Path) -> Result<()> {
        if path.is_dir() {
            return Ok(());
        }
        if self.is_dry_run() {
            info!("dry-run: mkdir -p {}", path.display());
            return Ok(());
        }
        fs::create_dir_all(path)
            .map_err(|e| RotavaultError::message(format!("create {}: {}", path.display(), e)))
    }

    /// Populate `dest` with hard links to everything below `source`.
    pub fn hard_link_copy(&self, source: &Path, dest: &Path) -> Result<()> {
        self.create_dir_all(dest)?;
        match &self.tools.cp {
            Some(cp) => self.check_call(&cp_argv(cp, source, dest)),
            None if self.is_dry_run() => {
                info!("dry-run: link tree {} => {}", source.display(), dest.display());
                Ok(())
            }
            None => link_tree(source, dest),
        }
    }

    /// Like [`Host::hard_link_copy`] but returns while the copy is running.
    /// Without a cp tool the copy happens in-process before returning.
    pub fn hard_link_copy_async(
        &self,
        source: &Path,
        dest: &Path,
    ) -> Result<Box<dyn RunningProcess>> {
        self.create_dir_all(dest)?;
        match &self.tools.cp {
            Some(cp) => self.spawn(&cp_argv(cp, source, dest)),
            None if self.is_dry_run() => {
                info!("dry-run: link tree {} => {}", source.display(), dest.display());
                Ok(Box::new(FinishedProcess(0)))
            }
            None => match link_tree(source, dest) {
                Ok(()) => Ok(Box::new(FinishedProcess(0))),
                Err(err) => {
                    warn!("{}", err);
                    Ok(Box::new(FinishedProcess(1)))
                }
            },
        }
    }
}

fn cp_argv(cp: &str, source: &Path, dest: &Path) -> Vec<String> {
    vec![
        cp.to_string(),
        "-al".to_string(),
        format!("{}/.", source.display()),
        path_arg(dest),
    ]
}

fn link_tree(source: &Path, dest: &Path) -> Result<()> {
    let link_err = |path: &Path, e: std::io::Error| {
        RotavaultError::message(format!("link {}: {}", path.display(), e))
    };
    for entry in WalkDir::new(source).follow_links(false) {
        let entry = entry.map_err(|e| RotavaultError::message(format!("walk {}: {}", source.display(), e)))?;
        let src_path = entry.path();
        let rel = src_path.strip_prefix(source).unwrap_or(src_path);
        if rel.as_os_str().is_empty() {
            continue;
        }
        let target = dest.join(rel);
        let ft = entry.file_type();
        if ft.is_dir() {
            fs::create_dir_all(&target).map_err(|e| link_err(&target, e))?;
            match entry.metadata() {
                Ok(meta) => {
                    if let Err(e) = fs::set_permissions(&target, meta.permissions()) {
                        warn!("cannot copy permissions to {}: {}", target.display(), e);
                    }
                }
                Err(e) => warn!("cannot read permissions of {}: {}", src_path.display(), e),
            }
        } else if ft.is_symlink() {
            let link = fs::read_link(src_path).map_err(|e| link_err(src_path, e))?;
            symlink(&link, &target).map_err(|e| link_err(&target, e))?;
        } else if ft.is_file() {
            fs::hard_link(src_path, &target).map_err(|e| link_err(&target, e))?;
        } else {
            debug!("skip special file {}", src_path.display());
        }
    }
    Ok(())
}
