use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::context::wait::DeviceProbe;
use crate::context::ResourceContext;
use crate::error::Result;
use crate::host::Host;
use crate::mount::inspect::is_block_device;
use crate::types::TeardownPolicy;
use crate::util::paths::path_arg;

pub fn mapped_device(name: &str) -> PathBuf {
    Path::new("/dev/mapper").join(name)
}

/// Opens a LUKS container as `/dev/mapper/<name>` unless it is open already.
pub struct CryptoContext<'a> {
    host: &'a Host,
    device: PathBuf,
    name: String,
    keyfile: Option<PathBuf>,
    policy: TeardownPolicy,
    opened: bool,
    probe: DeviceProbe<'a>,
}

impl<'a> CryptoContext<'a> {
    pub fn new(
        host: &'a Host,
        device: PathBuf,
        name: String,
        keyfile: Option<PathBuf>,
        policy: TeardownPolicy,
    ) -> Self {
        Self {
            host,
            device,
            name,
            keyfile,
            policy,
            opened: false,
            probe: Box::new(is_block_device),
        }
    }

    pub fn with_probe(mut self, probe: DeviceProbe<'a>) -> Self {
        self.probe = probe;
        self
    }

    pub fn mapped_device(&self) -> PathBuf {
        mapped_device(&self.name)
    }
}

impl ResourceContext for CryptoContext<'_> {
    fn acquire(&mut self) -> Result<()> {
        if (self.probe)(&self.mapped_device()) {
            debug!("{} is already open", self.mapped_device().display());
            return Ok(());
        }
        let mut argv = vec![self.host.tools().cryptsetup.clone()];
        if let Some(keyfile) = &self.keyfile {
            argv.push("-d".to_string());
            argv.push(path_arg(keyfile));
        }
        argv.push("luksOpen".to_string());
        argv.push(path_arg(&self.device));
        argv.push(self.name.clone());
        self.host.check_call(&argv)?;
        self.opened = true;
        Ok(())
    }

    fn release(&mut self, _clean: bool) -> Result<()> {
        if !self.policy.should_release(self.opened) {
            info!("leaving {} open", self.mapped_device().display());
            return Ok(());
        }
        self.host.check_call(&[
            self.host.tools().cryptsetup.clone(),
            "luksClose".to_string(),
            self.name.clone(),
        ])?;
        self.opened = false;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("luks({} as {:?})", self.device.display(), self.name)
    }
}
