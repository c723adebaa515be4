use std::path::PathBuf;

use tracing::info;

use crate::context::ResourceContext;
use crate::error::Result;
use crate::host::Host;
use crate::util::paths::path_arg;

/// Spins the drive down when the run ends cleanly.
pub struct SuspendContext<'a> {
    host: &'a Host,
    device: PathBuf,
}

impl<'a> SuspendContext<'a> {
    pub fn new(host: &'a Host, device: PathBuf) -> Self {
        Self { host, device }
    }
}

impl ResourceContext for SuspendContext<'_> {
    fn acquire(&mut self) -> Result<()> {
        Ok(())
    }

    fn release(&mut self, clean: bool) -> Result<()> {
        if !clean {
            info!("not suspending {} after a failed run", self.device.display());
            return Ok(());
        }
        self.host.check_call(&[
            self.host.tools().hdparm.clone(),
            "-Y".to_string(),
            path_arg(&self.device),
        ])
    }

    fn describe(&self) -> String {
        format!("suspend({} on success)", self.device.display())
    }
}
