use std::fmt;

#[derive(Debug, Clone, Copy, Default)]
pub struct RunMode {
    pub dry_run: bool,
    pub verbose: bool,
}

/// How many generations of an interval are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retention {
    Limited(u32),
    Unlimited,
}

impl Retention {
    /// `keep: 0` in the config file means unlimited.
    pub fn from_keep(keep: u32) -> Self {
        if keep == 0 {
            Retention::Unlimited
        } else {
            Retention::Limited(keep)
        }
    }

    pub fn as_keep(&self) -> u32 {
        match self {
            Retention::Limited(depth) => *depth,
            Retention::Unlimited => 0,
        }
    }

    /// True when a generation at `index` must be deleted instead of shifted.
    pub fn prunes(&self, index: u32) -> bool {
        match self {
            Retention::Limited(depth) => index >= depth.saturating_sub(1),
            Retention::Unlimited => false,
        }
    }

    /// Index of the oldest generation that survives a rotation.
    pub fn oldest_index(&self) -> Option<u32> {
        match self {
            Retention::Limited(depth) => Some(depth.saturating_sub(1)),
            Retention::Unlimited => None,
        }
    }
}

impl fmt::Display for Retention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Retention::Limited(depth) => write!(f, "{}", depth),
            Retention::Unlimited => f.write_str("unlimited"),
        }
    }
}

/// Whether device contexts are torn down at the end of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TeardownPolicy {
    pub umount_if_mounted: bool,
    pub force_umount: bool,
}

impl TeardownPolicy {
    /// Release only what this run acquired itself.
    pub fn release_acquired() -> Self {
        Self {
            umount_if_mounted: true,
            force_umount: false,
        }
    }

    pub fn should_release(&self, newly_acquired: bool) -> bool {
        (newly_acquired && self.umount_if_mounted) || self.force_umount
    }
}

impl Default for TeardownPolicy {
    fn default() -> Self {
        Self::release_acquired()
    }
}
