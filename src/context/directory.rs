use std::env;
use std::path::PathBuf;

use tracing::warn;

use crate::context::ResourceContext;
use crate::error::{Result, RotavaultError};

/// Work inside `target` while entered; the previous directory is restored on
/// release.
pub struct DirectoryContext {
    target: PathBuf,
    previous: Option<PathBuf>,
}

impl DirectoryContext {
    pub fn new(target: PathBuf) -> Self {
        Self {
            target,
            previous: None,
        }
    }
}

impl ResourceContext for DirectoryContext {
    fn acquire(&mut self) -> Result<()> {
        // the old cwd may be gone; then there is nothing to return to
        let previous = env::current_dir()
            .map_err(|e| warn!("cannot determine working directory: {}", e))
            .ok();
        env::set_current_dir(&self.target).map_err(|e| {
            RotavaultError::message(format!("chdir {}: {}", self.target.display(), e))
        })?;
        self.previous = previous;
        Ok(())
    }

    fn release(&mut self, _clean: bool) -> Result<()> {
        if let Some(previous) = self.previous.take() {
            if let Err(err) = env::set_current_dir(&previous) {
                warn!("cannot return to {}: {}", previous.display(), err);
            }
        }
        Ok(())
    }

    fn describe(&self) -> String {
        format!("chdir({})", self.target.display())
    }
}
