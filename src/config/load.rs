use std::collections::HashSet;
use std::fs::File;
use std::io::Read;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use crate::config::model::{
    Base, Config, Destination, Interval, RuntimeConfig, Target, TargetConfig, TargetOptions,
};
use crate::error::{ConfigError, Result, RotavaultError};
use crate::types::Retention;
use crate::util::paths::{is_safe_interval_name, is_safe_name};

const DEFAULT_LOCK_FILE: &str = "/var/run/rotavault.pid";
const DEFAULT_WAIT_TIMEOUT_SECS: u64 = 30;

pub fn load_config(path: &Path) -> Result<RuntimeConfig> {
    let mut contents = String::new();
    File::open(path)
        .and_then(|mut file| file.read_to_string(&mut contents))
        .map_err(|e| ConfigError::Parse(format!("read {}: {}", path.display(), e)))?;
    parse_config(&contents)
}

pub fn parse_config(contents: &str) -> Result<RuntimeConfig> {
    let cfg: Config =
        serde_yaml::from_str(contents).map_err(|e| ConfigError::Parse(e.to_string()))?;
    parse_runtime(cfg)
}

fn invalid(message: impl Into<String>) -> RotavaultError {
    ConfigError::Invalid(message.into()).into()
}

fn parse_runtime(cfg: Config) -> Result<RuntimeConfig> {
    let destination = parse_destination(&cfg)?;

    if cfg.intervals.is_empty() {
        return Err(invalid("at least one interval is required"));
    }
    let mut interval_names = HashSet::new();
    let mut intervals = Vec::new();
    for interval in cfg.intervals {
        if !is_safe_interval_name(&interval.name) {
            return Err(invalid(format!(
                "interval {} name must use only letters, digits, '-', '_'",
                interval.name
            )));
        }
        if !interval_names.insert(interval.name.clone()) {
            return Err(invalid(format!("duplicate interval {}", interval.name)));
        }
        intervals.push(Interval {
            name: interval.name,
            retention: Retention::from_keep(interval.keep),
        });
    }

    if let Some(snapshots) = &cfg.snapshots {
        if !snapshots.directory.is_absolute() {
            return Err(invalid("snapshot directory must be absolute"));
        }
        for volume in &snapshots.volumes {
            if !Path::new(volume).is_absolute() {
                return Err(invalid(format!("snapshot volume {} must be absolute", volume)));
            }
        }
    }

    let mut target_names = HashSet::new();
    let mut targets = Vec::new();
    for target in cfg.targets {
        if target.name.trim().is_empty() {
            return Err(invalid("target name is required"));
        }
        if !is_safe_name(&target.name) {
            return Err(invalid(format!(
                "target {} name must use only letters, digits, '.', '-', '_'",
                target.name
            )));
        }
        if !target_names.insert(target.name.clone()) {
            return Err(invalid(format!("duplicate target name {}", target.name)));
        }
        targets.push(resolve_target(target, &cfg.defaults)?);
    }

    Ok(RuntimeConfig {
        base: Base {
            destination,
            intervals,
            run_only_lowest: cfg.run_only_lowest,
            rsync: cfg.rsync,
            snapshots: cfg.snapshots,
            tools: cfg.tools,
            notify_user: cfg.notify.map(|notify| notify.user),
            lock_file: cfg
                .lock_file
                .unwrap_or_else(|| PathBuf::from(DEFAULT_LOCK_FILE)),
        },
        targets,
    })
}

fn parse_destination(cfg: &Config) -> Result<Destination> {
    let dest = &cfg.destination;
    if !dest.root.is_absolute() {
        return Err(invalid("destination root must be absolute"));
    }
    if dest.root == Path::new("/") {
        return Err(invalid("destination root must not be /"));
    }
    if dest.mount && dest.device.is_none() {
        return Err(invalid("destination mount requires a device"));
    }
    if dest.cryptsetup.is_some() && !dest.mount {
        return Err(invalid("destination cryptsetup requires mount"));
    }
    if dest.suspend && dest.device.is_none() {
        return Err(invalid("destination suspend requires a device"));
    }
    if let Some(crypt) = &dest.cryptsetup {
        if !is_safe_name(&crypt.name) {
            return Err(invalid(format!(
                "cryptsetup name {} must use only letters, digits, '.', '-', '_'",
                crypt.name
            )));
        }
    }
    Ok(Destination {
        root: dest.root.clone(),
        device: dest.device.clone(),
        mount: dest.mount,
        mount_options: dest.mount_options.clone(),
        cryptsetup: dest.cryptsetup.clone(),
        suspend: dest.suspend,
        wait_timeout: Duration::from_secs(dest.wait_timeout.unwrap_or(DEFAULT_WAIT_TIMEOUT_SECS)),
    })
}

fn resolve_target(target: TargetConfig, defaults: &TargetOptions) -> Result<Target> {
    if !Path::new(&target.source).is_absolute() {
        return Err(invalid(format!(
            "target {}: source path must be absolute (got \"{}\")",
            target.name, target.source
        )));
    }
    let source = if target.source.ends_with('/') {
        target.source.clone()
    } else {
        format!("{}/", target.source)
    };

    let dest = match target.dest {
        Some(dest) => dest,
        None => default_dest(target.host.as_deref(), &source),
    };
    let dest_path = Path::new(&dest);
    if dest.trim().is_empty() || dest_path.is_absolute() {
        return Err(invalid(format!(
            "target {}: destination path must be relative (got \"{}\")",
            target.name, dest
        )));
    }
    if dest_path.components().any(|c| matches!(c, Component::ParentDir)) {
        return Err(invalid(format!(
            "target {}: destination path must not contain ..",
            target.name
        )));
    }

    for item in &target.exclude_from_incremental {
        let path = Path::new(item);
        if !path.is_absolute() || path == Path::new("/") {
            return Err(invalid(format!(
                "target {}: excludeFromIncremental entry {} must be an absolute path below the source",
                target.name, item
            )));
        }
        if path.components().any(|c| matches!(c, Component::ParentDir)) {
            return Err(invalid(format!(
                "target {}: excludeFromIncremental entry {} must not contain ..",
                target.name, item
            )));
        }
    }

    let mut excludes = defaults.excludes.clone();
    excludes.extend(target.excludes);

    Ok(Target {
        name: target.name,
        host: target.host,
        source,
        dest,
        excludes,
        exclude_from_incremental: target.exclude_from_incremental,
        ssh: target.ssh.or_else(|| defaults.ssh.clone()).unwrap_or_default(),
        trickle: target.trickle.or_else(|| defaults.trickle.clone()),
        ionice: target.ionice.or_else(|| defaults.ionice.clone()),
    })
}

/// `<host or "local">/<source>`, used when a target has no explicit dest.
fn default_dest(host: Option<&str>, source: &str) -> String {
    let host = host
        .map(|h| h.rsplit('@').next().unwrap_or(h))
        .unwrap_or("local");
    let path = source.trim_matches('/');
    if path.is_empty() {
        host.to_string()
    } else {
        format!("{}/{}", host, path)
    }
}
