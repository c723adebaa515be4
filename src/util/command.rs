use std::process::{Child, Command};
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::error::{Result, RotavaultError};
use crate::types::RunMode;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Runs external commands. Selected once at startup: [`RealExecutor`] or
/// [`DryRunExecutor`].
pub trait Executor: Send + Sync {
    /// Run to completion and return the exit code.
    fn run(&self, argv: &[String]) -> Result<i32>;

    /// Start without waiting.
    fn spawn(&self, argv: &[String]) -> Result<Box<dyn RunningProcess>>;

    fn is_dry_run(&self) -> bool {
        false
    }
}

/// Handle to a command started by [`Executor::spawn`].
pub trait RunningProcess: Send {
    /// Wait at most `timeout`; `None` while the process is still running.
    fn poll(&mut self, timeout: Duration) -> Result<Option<i32>>;

    fn kill(&mut self);
}

pub fn select_executor(run_mode: RunMode) -> Box<dyn Executor> {
    if run_mode.dry_run {
        info!("running in dry-run mode");
        Box::new(DryRunExecutor::default())
    } else {
        Box::new(RealExecutor)
    }
}

/// Run and fail with [`RotavaultError::CommandFailed`] on a non-zero exit.
pub fn check_call(executor: &dyn Executor, argv: &[String]) -> Result<()> {
    let code = executor.run(argv)?;
    if code != 0 {
        return Err(RotavaultError::CommandFailed {
            command: format_command(argv),
            code,
        });
    }
    Ok(())
}

pub fn format_command(argv: &[String]) -> String {
    argv.iter()
        .enumerate()
        .map(|(i, arg)| if i == 0 { arg.clone() } else { shell_quote(arg) })
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn shell_quote(arg: &str) -> String {
    let safe = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "@%+=:,./-_".contains(c));
    if safe {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', "'\"'\"'"))
    }
}

fn build_command(argv: &[String]) -> Result<Command> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| RotavaultError::message("empty command line"))?;
    let mut cmd = Command::new(program);
    cmd.args(args);
    Ok(cmd)
}

pub struct RealExecutor;

impl Executor for RealExecutor {
    fn run(&self, argv: &[String]) -> Result<i32> {
        debug!("executing: {}", format_command(argv));
        let status = build_command(argv)?
            .status()
            .map_err(|e| RotavaultError::message(format!("{}: {}", argv[0], e)))?;
        Ok(status.code().unwrap_or(1))
    }

    fn spawn(&self, argv: &[String]) -> Result<Box<dyn RunningProcess>> {
        debug!("starting: {}", format_command(argv));
        let child = build_command(argv)?
            .spawn()
            .map_err(|e| RotavaultError::message(format!("{}: {}", argv[0], e)))?;
        Ok(Box::new(ChildProcess {
            child,
            command: format_command(argv),
        }))
    }
}

struct ChildProcess {
    child: Child,
    command: String,
}

impl RunningProcess for ChildProcess {
    fn poll(&mut self, timeout: Duration) -> Result<Option<i32>> {
        let deadline = Instant::now() + timeout;
        loop {
            let status = self
                .child
                .try_wait()
                .map_err(|e| RotavaultError::message(format!("wait {}: {}", self.command, e)))?;
            if let Some(status) = status {
                return Ok(Some(status.code().unwrap_or(1)));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            thread::sleep(POLL_INTERVAL.min(deadline - now));
        }
    }

    fn kill(&mut self) {
        debug!("terminating: {}", self.command);
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Logs every command and reports success without running anything.
#[derive(Default)]
pub struct DryRunExecutor {
    recorded: Mutex<Vec<Vec<String>>>,
}

impl DryRunExecutor {
    pub fn recorded(&self) -> Vec<Vec<String>> {
        self.recorded.lock().map(|r| r.clone()).unwrap_or_default()
    }

    fn record(&self, argv: &[String]) {
        info!("dry-run: {}", format_command(argv));
        if let Ok(mut recorded) = self.recorded.lock() {
            recorded.push(argv.to_vec());
        }
    }
}

impl Executor for DryRunExecutor {
    fn run(&self, argv: &[String]) -> Result<i32> {
        self.record(argv);
        Ok(0)
    }

    fn spawn(&self, argv: &[String]) -> Result<Box<dyn RunningProcess>> {
        self.record(argv);
        Ok(Box::new(FinishedProcess(0)))
    }

    fn is_dry_run(&self) -> bool {
        true
    }
}

/// A process that has already exited with the given code.
pub struct FinishedProcess(pub i32);

impl RunningProcess for FinishedProcess {
    fn poll(&mut self, _timeout: Duration) -> Result<Option<i32>> {
        Ok(Some(self.0))
    }

    fn kill(&mut self) {}
}

pub fn argv<I, S>(parts: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    parts.into_iter().map(Into::into).collect()
}
