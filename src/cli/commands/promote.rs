use std::path::Path;

use crate::cli::commands::host_for;
use crate::config::load::load_config;
use crate::config::model::{Base, Interval};
use crate::context::device::with_destination;
use crate::error::{ConfigError, Result};
use crate::rotation::IntervalRotator;
use crate::signal_handler::CancelToken;
use crate::types::{RunMode, TeardownPolicy};
use crate::util::lock::acquire_run_lock;

pub fn run_promote(
    config_path: &Path,
    lower: &str,
    upper: &str,
    run_mode: RunMode,
    cancel: &CancelToken,
) -> Result<()> {
    let config = load_config(config_path)?;
    let (lower, upper) = promotion_pair(&config.base, lower, upper)?;
    let _lock = acquire_run_lock(&config.base.lock_file, run_mode)?;
    let host = host_for(&config, run_mode);
    with_destination(
        &config.base,
        &host,
        TeardownPolicy::default(),
        cancel,
        || {
            let rotator = IntervalRotator::new(&host, &config.base.destination.root);
            rotator.shift(upper)?;
            rotator.shift_between(upper, lower)
        },
    )
}

/// Both intervals must be configured, `lower` before `upper`.
fn promotion_pair<'c>(
    base: &'c Base,
    lower: &str,
    upper: &str,
) -> Result<(&'c Interval, &'c Interval)> {
    let position = |name: &str| {
        base.interval_position(name)
            .ok_or_else(|| ConfigError::UnknownInterval(name.to_string()))
    };
    let (low, high) = (position(lower)?, position(upper)?);
    if low >= high {
        return Err(ConfigError::Invalid(format!(
            "{} must be configured below {} to be promoted into it",
            lower, upper
        ))
        .into());
    }
    Ok((&base.intervals[low], &base.intervals[high]))
}
