use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::context::ResourceContext;
use crate::error::Result;
use crate::host::Host;
use crate::mount::inspect::mountpoint_is_mounted;
use crate::types::TeardownPolicy;
use crate::util::paths::path_arg;

pub type MountProbe<'a> = Box<dyn Fn(&Path) -> Result<bool> + 'a>;

pub struct MountContext<'a> {
    host: &'a Host,
    device: PathBuf,
    mountpoint: PathBuf,
    options: Option<String>,
    policy: TeardownPolicy,
    mounted: bool,
    probe: MountProbe<'a>,
}

impl<'a> MountContext<'a> {
    pub fn new(
        host: &'a Host,
        device: PathBuf,
        mountpoint: PathBuf,
        options: Option<String>,
        policy: TeardownPolicy,
    ) -> Self {
        Self {
            host,
            device,
            mountpoint,
            options,
            policy,
            mounted: false,
            probe: Box::new(mountpoint_is_mounted),
        }
    }

    pub fn with_probe(mut self, probe: MountProbe<'a>) -> Self {
        self.probe = probe;
        self
    }
}

impl ResourceContext for MountContext<'_> {
    fn acquire(&mut self) -> Result<()> {
        if (self.probe)(&self.mountpoint)? {
            debug!("{} is already mounted", self.mountpoint.display());
            return Ok(());
        }
        let mut argv = vec![self.host.tools().mount.clone()];
        if let Some(options) = &self.options {
            argv.push("-o".to_string());
            argv.push(options.clone());
        }
        argv.push(path_arg(&self.device));
        argv.push(path_arg(&self.mountpoint));
        self.host.check_call(&argv)?;
        self.mounted = true;
        Ok(())
    }

    fn release(&mut self, _clean: bool) -> Result<()> {
        if !self.policy.should_release(self.mounted) {
            info!("leaving {} mounted", self.mountpoint.display());
            return Ok(());
        }
        self.host.check_call(&[
            self.host.tools().umount.clone(),
            path_arg(&self.mountpoint),
        ])?;
        self.mounted = false;
        Ok(())
    }

    fn describe(&self) -> String {
        format!(
            "mount({} on {})",
            self.device.display(),
            self.mountpoint.display()
        )
    }
}
