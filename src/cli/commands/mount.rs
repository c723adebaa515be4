use std::path::Path;

use tracing::info;

use crate::cli::commands::host_for;
use crate::config::load::load_config;
use crate::context::device::with_destination;
use crate::error::Result;
use crate::signal_handler::CancelToken;
use crate::types::{RunMode, TeardownPolicy};

/// Bring the destination up and leave it that way.
pub fn run_mount(config_path: &Path, run_mode: RunMode, cancel: &CancelToken) -> Result<()> {
    let config = load_config(config_path)?;
    let host = host_for(&config, run_mode);
    let keep = TeardownPolicy {
        umount_if_mounted: false,
        force_umount: false,
    };
    with_destination(&config.base, &host, keep, cancel, || {
        info!("{} is ready", config.base.destination.root.display());
        Ok(())
    })
}

/// Acquire-then-release with a forced teardown: unmounts, closes the LUKS
/// container and spins the drive down whoever set them up.
pub fn run_umount(config_path: &Path, run_mode: RunMode, cancel: &CancelToken) -> Result<()> {
    let config = load_config(config_path)?;
    let host = host_for(&config, run_mode);
    let force = TeardownPolicy {
        umount_if_mounted: true,
        force_umount: true,
    };
    with_destination(&config.base, &host, force, cancel, || Ok(()))
}
