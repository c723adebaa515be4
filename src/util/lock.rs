use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Result, RotavaultError};
use crate::types::RunMode;

/// Pid file held for the duration of a run; removed on drop.
#[derive(Debug)]
pub struct LockGuard {
    path: PathBuf,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let _ = unlock_file(&self.path);
    }
}

/// Take the run lock at `path`. Dry runs never lock.
pub fn acquire_run_lock(path: &Path, run_mode: RunMode) -> Result<Option<LockGuard>> {
    if run_mode.dry_run {
        return Ok(None);
    }
    match lock_file(path) {
        Ok(true) => {
            debug!("locked {}", path.display());
            Ok(Some(LockGuard {
                path: path.to_path_buf(),
            }))
        }
        Ok(false) => Err(RotavaultError::Lock(format!(
            "another run holds {}",
            path.display()
        ))),
        Err(e) => Err(RotavaultError::Lock(format!(
            "failed to lock {}: {}",
            path.display(),
            e
        ))),
    }
}

/// Create the pid file, replacing it when the pid it names is gone.
fn lock_file(path: &Path) -> io::Result<bool> {
    for _ in 0..3 {
        match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(mut f) => {
                writeln!(f, "{}", std::process::id())?;
                return Ok(true);
            }
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                let pid = match fs::read_to_string(path) {
                    Ok(text) => text.trim().parse::<u32>().ok(),
                    Err(err) if err.kind() == io::ErrorKind::NotFound => continue,
                    Err(err) => return Err(err),
                };
                if let Some(pid) = pid {
                    if Path::new("/proc").join(pid.to_string()).exists() {
                        return Ok(false);
                    }
                }
                debug!("removing stale lock {}", path.display());
                match fs::remove_file(path) {
                    Ok(()) => continue,
                    Err(err) if err.kind() == io::ErrorKind::NotFound => continue,
                    Err(err) => return Err(err),
                }
            }
            Err(err) => return Err(err),
        }
    }
    Ok(false)
}

fn unlock_file(path: &Path) -> io::Result<()> {
    if let Ok(pid) = fs::read_to_string(path) {
        if pid.trim() == std::process::id().to_string() {
            fs::remove_file(path)?;
        }
    }
    Ok(())
}
