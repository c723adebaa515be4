use std::path::Path;

use tracing::warn;

use crate::config::model::{RsyncConfig, Target, ToolsConfig};
use crate::error::{Result, RotavaultError};
use crate::host::Host;
use crate::util::command::shell_quote;
use crate::util::paths::path_arg;

/// rsync exit codes for "some files vanished or could not be transferred".
const PARTIAL_TRANSFER_CODES: [i32; 2] = [23, 24];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Complete,
    PartialTransfer(i32),
}

/// One rsync invocation for a target.
pub struct RsyncJob<'a> {
    pub target: &'a Target,
    pub source: String,
    pub dest: String,
    pub link_dest: Option<&'a Path>,
    pub extra: Vec<String>,
}

impl RsyncJob<'_> {
    pub fn argv(&self, tools: &ToolsConfig, rsync: &RsyncConfig) -> Vec<String> {
        let mut argv = Vec::new();
        if let Some(ionice) = &self.target.ionice {
            argv.push(tools.ionice.clone());
            argv.push("-c".to_string());
            argv.push(ionice.class.to_string());
            if ionice.class != 3 {
                argv.push("-n".to_string());
                argv.push(ionice.level.to_string());
            }
        }
        argv.push(tools.rsync.clone());
        if !self.target.is_local() {
            argv.push("-e".to_string());
            argv.push(remote_shell(tools, self.target));
        }
        if rsync.one_file_system {
            argv.push("-x".to_string());
        }
        if let (true, Some(link_dest)) = (rsync.link_dest, self.link_dest) {
            argv.push("--link-dest".to_string());
            argv.push(path_arg(link_dest));
        }
        argv.extend(rsync.args.iter().cloned());
        if !self.target.is_local() {
            argv.extend(rsync.remote_args.iter().cloned());
        }
        for exclude in &self.target.excludes {
            argv.push("--exclude".to_string());
            argv.push(exclude.clone());
        }
        argv.extend(self.extra.iter().cloned());
        argv.push("-r".to_string());
        argv.push(self.source.clone());
        argv.push(self.dest.clone());
        argv
    }

    pub fn run(&self, host: &Host, rsync: &RsyncConfig) -> Result<SyncOutcome> {
        let code = host.run(&self.argv(host.tools(), rsync))?;
        classify(&self.target.name, code)
    }
}

/// `ssh [-p port] [-i identity] args...`, wrapped by trickle when configured,
/// quoted into the single string rsync's `-e` expects.
pub fn remote_shell(tools: &ToolsConfig, target: &Target) -> String {
    let mut command = Vec::new();
    if let Some(trickle) = &target.trickle {
        command.push(tools.trickle.clone());
        if trickle.standalone {
            command.push("-s".to_string());
        }
        command.push("-d".to_string());
        command.push(trickle.downstream.to_string());
        command.push("-u".to_string());
        command.push(trickle.upstream.to_string());
    }
    command.push(tools.ssh.clone());
    if let Some(port) = target.ssh.port {
        command.push("-p".to_string());
        command.push(port.to_string());
    }
    if let Some(identity) = &target.ssh.identity {
        command.push("-i".to_string());
        command.push(path_arg(identity));
    }
    command.extend(target.ssh.args.iter().cloned());
    command
        .iter()
        .map(|arg| shell_quote(arg))
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn classify(target: &str, code: i32) -> Result<SyncOutcome> {
    match code {
        0 => Ok(SyncOutcome::Complete),
        code if PARTIAL_TRANSFER_CODES.contains(&code) => {
            warn!(
                "partial transfer for {} (rsync exit {}), continuing",
                target, code
            );
            Ok(SyncOutcome::PartialTransfer(code))
        }
        code => Err(RotavaultError::SyncFailed {
            target: target.to_string(),
            code,
        }),
    }
}
