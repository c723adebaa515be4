use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::types::TeardownPolicy;

#[derive(Parser, Debug)]
#[command(name = "rotavault", version, about = "Rotating hard-link backups with rsync")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Config file path
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,
    /// Log external commands instead of running them
    #[arg(long, short = 'n', global = true)]
    pub dry_run: bool,
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Back up into the lowest given interval and copy it into the others
    Backup(BackupArgs),
    /// Bring the destination up and leave it mounted
    Mount,
    /// Tear the destination down, even if this tool did not bring it up
    #[command(alias = "unmount")]
    Umount,
    /// Print the resolved configuration
    DumpConfig,
    /// Show what changed in the targets since a stored generation
    Diff(DiffArgs),
    /// Rotate UPPER and move the oldest generation of LOWER into it
    Promote(PromoteArgs),
}

#[derive(Args, Debug, Clone)]
pub struct BackupArgs {
    #[arg(required = true, value_name = "INTERVAL")]
    pub intervals: Vec<String>,
    /// Unmount the destination afterwards if this run mounted it (default)
    #[arg(long, conflicts_with = "no_umount")]
    pub umount: bool,
    /// Leave the destination mounted
    #[arg(long)]
    pub no_umount: bool,
    /// Unmount the destination afterwards even if it was already mounted
    #[arg(long)]
    pub force_umount: bool,
    /// Extra rsync arguments
    #[arg(last = true, value_name = "RSYNC_ARGS")]
    pub rsync_args: Vec<String>,
}

impl BackupArgs {
    pub fn policy(&self) -> TeardownPolicy {
        TeardownPolicy {
            umount_if_mounted: !self.no_umount,
            force_umount: self.force_umount,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct DiffArgs {
    /// Interval name (newest generation) or a generation directory
    pub source: String,
    #[arg(required = true, value_name = "TARGET")]
    pub targets: Vec<String>,
}

#[derive(Args, Debug, Clone)]
pub struct PromoteArgs {
    pub lower: String,
    pub upper: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backup_collects_intervals_and_rsync_args() {
        let cli = Cli::try_parse_from([
            "rotavault",
            "--dry-run",
            "backup",
            "daily",
            "weekly",
            "--no-umount",
            "--",
            "--bwlimit=1000",
        ])
        .unwrap();
        assert!(cli.dry_run);
        let Command::Backup(args) = cli.command else {
            panic!("expected backup");
        };
        assert_eq!(args.intervals, vec!["daily", "weekly"]);
        assert_eq!(args.rsync_args, vec!["--bwlimit=1000"]);
        assert_eq!(
            args.policy(),
            TeardownPolicy {
                umount_if_mounted: false,
                force_umount: false
            }
        );
    }

    #[test]
    fn backup_requires_an_interval() {
        assert!(Cli::try_parse_from(["rotavault", "backup"]).is_err());
        assert!(Cli::try_parse_from(["rotavault", "backup", "daily", "--umount", "--no-umount"]).is_err());
    }

    #[test]
    fn global_flags_follow_subcommands() {
        let cli = Cli::try_parse_from(["rotavault", "dump-config", "-c", "/tmp/r.yaml", "-v"]).unwrap();
        assert!(matches!(cli.command, Command::DumpConfig));
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/r.yaml")));
        assert!(cli.verbose);
    }
}
