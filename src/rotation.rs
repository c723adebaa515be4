use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::config::model::Interval;
use crate::error::{Result, RotavaultError};
use crate::host::Host;
use crate::util::paths::list_entries;

pub fn dirname(interval: &str, index: u32) -> String {
    format!("{}.{}", interval, index)
}

/// Index 0 is the newest generation. Shifting moves generations up, highest
/// index first, and deletes what falls outside the retention.
pub struct IntervalRotator<'a> {
    host: &'a Host,
    root: PathBuf,
}

impl<'a> IntervalRotator<'a> {
    pub fn new(host: &'a Host, root: &Path) -> Self {
        Self {
            host,
            root: root.to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn generation_path(&self, interval: &str, index: u32) -> PathBuf {
        self.root.join(dirname(interval, index))
    }

    /// Existing generations of `interval`, lowest index first.
    pub fn indices_for(&self, interval: &str) -> Result<Vec<(u32, String)>> {
        let prefix = format!("{}.", interval);
        let mut indices = Vec::new();
        if self.host.is_dry_run() && !self.root.is_dir() {
            // a dry run does not mount the destination
            return Ok(indices);
        }
        for name in list_entries(&self.root)? {
            let Some(suffix) = name.strip_prefix(&prefix) else {
                continue;
            };
            match suffix.parse::<u32>() {
                Ok(index) if index.to_string() == suffix => indices.push((index, name)),
                _ => info!("unknown folder: {}", name),
            }
        }
        indices.sort();
        Ok(indices)
    }

    /// Newest existing generation, if any.
    pub fn newest(&self, interval: &str) -> Result<Option<(u32, String)>> {
        Ok(self.indices_for(interval)?.into_iter().next())
    }

    /// Make room for a new generation 0. Does nothing while index 0 is free.
    pub fn shift(&self, interval: &Interval) -> Result<()> {
        let mut indices = self.indices_for(&interval.name)?;
        if !indices.iter().any(|(index, _)| *index == 0) {
            debug!("{}: generation 0 is free, no rotation needed", interval.name);
            return Ok(());
        }

        indices.sort_by(|a, b| b.0.cmp(&a.0));
        for (index, name) in indices {
            let current = self.root.join(&name);
            if interval.retention.prunes(index) {
                info!("removing surplus folder: {}", name);
                self.host.remove_tree(&current).map_err(|e| {
                    RotavaultError::rotation(&interval.name, format!("delete {}: {}", name, e))
                })?;
                continue;
            }
            let next = dirname(&interval.name, index + 1);
            let next_path = self.root.join(&next);
            if !self.host.is_dry_run() && next_path.exists() {
                return Err(RotavaultError::rotation(
                    &interval.name,
                    format!("{} already exists", next),
                ));
            }
            info!("moving {} => {}", name, next);
            self.host.rename(&current, &next_path).map_err(|e| {
                RotavaultError::rotation(&interval.name, format!("rename {}: {}", name, e))
            })?;
        }
        Ok(())
    }

    /// Move the oldest retained generation of `lower` into `<upper>.0`.
    /// A missing source generation only warns.
    pub fn shift_between(&self, upper: &Interval, lower: &Interval) -> Result<()> {
        let Some(oldest) = lower.retention.oldest_index() else {
            warn!(
                "cannot shift {} into {}: {} keeps unlimited generations",
                lower.name, upper.name, lower.name
            );
            return Ok(());
        };
        let lower_name = dirname(&lower.name, oldest);
        let upper_name = dirname(&upper.name, 0);
        let upper_path = self.root.join(&upper_name);
        if !self.host.is_dry_run() && upper_path.exists() {
            return Err(RotavaultError::rotation(
                &upper.name,
                format!("{} already exists", upper_name),
            ));
        }
        info!("shifting up {} to {}", lower_name, upper_name);
        match self.host.rename(&self.root.join(&lower_name), &upper_path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                warn!("cannot shift {} -- it does not exist!", lower_name);
                Ok(())
            }
            Err(err) => Err(RotavaultError::rotation(
                &upper.name,
                format!("rename {}: {}", lower_name, err),
            )),
        }
    }
}
