use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize, Serializer};

use crate::types::Retention;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub destination: DestinationConfig,
    pub intervals: Vec<IntervalConfig>,
    #[serde(default, rename = "runOnlyLowest")]
    pub run_only_lowest: bool,
    #[serde(default)]
    pub rsync: RsyncConfig,
    #[serde(default)]
    pub snapshots: Option<SnapshotConfig>,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub notify: Option<NotifyConfig>,
    #[serde(default, rename = "lockFile")]
    pub lock_file: Option<PathBuf>,
    #[serde(default)]
    pub defaults: TargetOptions,
    pub targets: Vec<TargetConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DestinationConfig {
    pub root: PathBuf,
    #[serde(default)]
    pub device: Option<PathBuf>,
    #[serde(default)]
    pub mount: bool,
    #[serde(default, rename = "mountOptions")]
    pub mount_options: Option<String>,
    #[serde(default)]
    pub cryptsetup: Option<CryptsetupConfig>,
    #[serde(default)]
    pub suspend: bool,
    #[serde(default, rename = "waitTimeout")]
    pub wait_timeout: Option<u64>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CryptsetupConfig {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keyfile: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IntervalConfig {
    pub name: String,
    pub keep: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RsyncConfig {
    #[serde(default = "default_rsync_args")]
    pub args: Vec<String>,
    #[serde(default = "default_true", rename = "linkDest")]
    pub link_dest: bool,
    #[serde(default, rename = "oneFileSystem")]
    pub one_file_system: bool,
    #[serde(default, rename = "remoteArgs", skip_serializing_if = "Vec::is_empty")]
    pub remote_args: Vec<String>,
}

impl Default for RsyncConfig {
    fn default() -> Self {
        Self {
            args: default_rsync_args(),
            link_dest: true,
            one_file_system: false,
            remote_args: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SnapshotConfig {
    pub volumes: Vec<String>,
    pub directory: PathBuf,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct NotifyConfig {
    pub user: String,
}

/// Paths of the external tools. `cp: null` switches hard-link copies to the
/// in-process implementation, `rm` set routes tree deletion through `rm -rf`.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ToolsConfig {
    #[serde(default = "default_rsync")]
    pub rsync: String,
    #[serde(default = "default_cp")]
    pub cp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rm: Option<String>,
    #[serde(default = "default_ssh")]
    pub ssh: String,
    #[serde(default = "default_trickle")]
    pub trickle: String,
    #[serde(default = "default_ionice")]
    pub ionice: String,
    #[serde(default = "default_cryptsetup")]
    pub cryptsetup: String,
    #[serde(default = "default_mount")]
    pub mount: String,
    #[serde(default = "default_umount")]
    pub umount: String,
    #[serde(default = "default_hdparm")]
    pub hdparm: String,
    #[serde(default = "default_btrfs")]
    pub btrfs: String,
    #[serde(default = "default_su")]
    pub su: String,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            rsync: default_rsync(),
            cp: default_cp(),
            rm: None,
            ssh: default_ssh(),
            trickle: default_trickle(),
            ionice: default_ionice(),
            cryptsetup: default_cryptsetup(),
            mount: default_mount(),
            umount: default_umount(),
            hdparm: default_hdparm(),
            btrfs: default_btrfs(),
            su: default_su(),
        }
    }
}

/// Options a target inherits from `defaults` unless it sets its own.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct TargetOptions {
    #[serde(default)]
    pub ssh: Option<SshConfig>,
    #[serde(default)]
    pub trickle: Option<TrickleConfig>,
    #[serde(default)]
    pub ionice: Option<IoniceConfig>,
    #[serde(default)]
    pub excludes: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq, Eq)]
pub struct SshConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct TrickleConfig {
    pub upstream: u32,
    pub downstream: u32,
    #[serde(default = "default_true")]
    pub standalone: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct IoniceConfig {
    pub class: u8,
    #[serde(default)]
    pub level: u8,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TargetConfig {
    pub name: String,
    #[serde(default)]
    pub host: Option<String>,
    pub source: String,
    #[serde(default)]
    pub dest: Option<String>,
    #[serde(default)]
    pub excludes: Vec<String>,
    #[serde(default, rename = "excludeFromIncremental")]
    pub exclude_from_incremental: Vec<String>,
    #[serde(default)]
    pub ssh: Option<SshConfig>,
    #[serde(default)]
    pub trickle: Option<TrickleConfig>,
    #[serde(default)]
    pub ionice: Option<IoniceConfig>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RuntimeConfig {
    pub base: Base,
    pub targets: Vec<Target>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Base {
    pub destination: Destination,
    pub intervals: Vec<Interval>,
    #[serde(rename = "runOnlyLowest")]
    pub run_only_lowest: bool,
    pub rsync: RsyncConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshots: Option<SnapshotConfig>,
    pub tools: ToolsConfig,
    #[serde(rename = "notifyUser", skip_serializing_if = "Option::is_none")]
    pub notify_user: Option<String>,
    #[serde(rename = "lockFile")]
    pub lock_file: PathBuf,
}

impl Base {
    pub fn interval(&self, name: &str) -> Option<&Interval> {
        self.intervals.iter().find(|interval| interval.name == name)
    }

    /// Position in the configured order; 0 is the lowest interval.
    pub fn interval_position(&self, name: &str) -> Option<usize> {
        self.intervals.iter().position(|interval| interval.name == name)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Destination {
    pub root: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<PathBuf>,
    pub mount: bool,
    #[serde(rename = "mountOptions", skip_serializing_if = "Option::is_none")]
    pub mount_options: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cryptsetup: Option<CryptsetupConfig>,
    pub suspend: bool,
    #[serde(rename = "waitTimeout", serialize_with = "serialize_secs")]
    pub wait_timeout: Duration,
}

#[derive(Debug, Clone, Serialize)]
pub struct Interval {
    pub name: String,
    #[serde(rename = "keep", serialize_with = "serialize_retention")]
    pub retention: Retention,
}

#[derive(Debug, Clone, Serialize)]
pub struct Target {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    pub source: String,
    pub dest: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub excludes: Vec<String>,
    #[serde(rename = "excludeFromIncremental", skip_serializing_if = "Vec::is_empty")]
    pub exclude_from_incremental: Vec<String>,
    pub ssh: SshConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trickle: Option<TrickleConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ionice: Option<IoniceConfig>,
}

impl Target {
    pub fn is_local(&self) -> bool {
        self.host.is_none()
    }

    /// Source as rsync expects it, `host:/path/` for remote targets.
    pub fn source_spec(&self, source: &str) -> String {
        match &self.host {
            Some(host) => format!("{}:{}", host, source),
            None => source.to_string(),
        }
    }

    pub fn dest_path(&self) -> &Path {
        Path::new(&self.dest)
    }
}

fn serialize_retention<S: Serializer>(retention: &Retention, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u32(retention.as_keep())
}

fn serialize_secs<S: Serializer>(duration: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(duration.as_secs())
}

fn default_true() -> bool {
    true
}

fn default_rsync_args() -> Vec<String> {
    ["-a", "-H", "--delete", "--numeric-ids"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_rsync() -> String {
    "rsync".to_string()
}

fn default_cp() -> Option<String> {
    Some("cp".to_string())
}

fn default_ssh() -> String {
    "ssh".to_string()
}

fn default_trickle() -> String {
    "trickle".to_string()
}

fn default_ionice() -> String {
    "ionice".to_string()
}

fn default_cryptsetup() -> String {
    "cryptsetup".to_string()
}

fn default_mount() -> String {
    "mount".to_string()
}

fn default_umount() -> String {
    "umount".to_string()
}

fn default_hdparm() -> String {
    "hdparm".to_string()
}

fn default_btrfs() -> String {
    "btrfs".to_string()
}

fn default_su() -> String {
    "su".to_string()
}
