use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::Result;
use crate::util::command::{format_command, Executor, RunningProcess};

type Hook = Box<dyn Fn(&[String]) + Send>;

#[derive(Default)]
struct Script {
    calls: Vec<String>,
    codes: HashMap<String, i32>,
    delays: Vec<(String, u32)>,
    hooks: Vec<(String, Hook)>,
    completed: Vec<String>,
}

#[derive(Clone, Default)]
pub struct ScriptedExecutor {
    script: Arc<Mutex<Script>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every command whose line contains `needle` exits with `code`.
    pub fn exit_code(self, needle: &str, code: i32) -> Self {
        self.script.lock().unwrap().codes.insert(needle.to_string(), code);
        self
    }

    /// Spawned commands whose line contains `needle` stay running for `polls`
    /// polls.
    pub fn delay(self, needle: &str, polls: u32) -> Self {
        self.script.lock().unwrap().delays.push((needle.to_string(), polls));
        self
    }

    /// Run `hook` for every command whose line contains `needle`.
    pub fn on(self, needle: &str, hook: impl Fn(&[String]) + Send + 'static) -> Self {
        self.script
            .lock()
            .unwrap()
            .hooks
            .push((needle.to_string(), Box::new(hook)));
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.script.lock().unwrap().calls.clone()
    }

    /// Spawned command lines in the order they finished.
    pub fn completed(&self) -> Vec<String> {
        self.script.lock().unwrap().completed.clone()
    }

    pub fn boxed(&self) -> Box<dyn Executor> {
        Box::new(self.clone())
    }

    fn invoke(&self, argv: &[String]) -> (String, i32, u32) {
        let line = format_command(argv);
        let mut script = self.script.lock().unwrap();
        script.calls.push(line.clone());
        for (needle, hook) in &script.hooks {
            if line.contains(needle.as_str()) {
                hook(argv);
            }
        }
        let code = script
            .codes
            .iter()
            .find(|(needle, _)| line.contains(needle.as_str()))
            .map(|(_, code)| *code)
            .unwrap_or(0);
        let delay = script
            .delays
            .iter()
            .find(|(needle, _)| line.contains(needle.as_str()))
            .map(|(_, polls)| *polls)
            .unwrap_or(0);
        (line, code, delay)
    }
}

impl Executor for ScriptedExecutor {
    fn run(&self, argv: &[String]) -> Result<i32> {
        Ok(self.invoke(argv).1)
    }

    fn spawn(&self, argv: &[String]) -> Result<Box<dyn RunningProcess>> {
        let (line, code, polls_left) = self.invoke(argv);
        Ok(Box::new(ScriptedProcess {
            script: self.script.clone(),
            line,
            code,
            polls_left,
            killed: false,
        }))
    }
}

struct ScriptedProcess {
    script: Arc<Mutex<Script>>,
    line: String,
    code: i32,
    polls_left: u32,
    killed: bool,
}

impl RunningProcess for ScriptedProcess {
    fn poll(&mut self, _timeout: Duration) -> Result<Option<i32>> {
        if self.killed {
            return Ok(Some(-1));
        }
        if self.polls_left > 0 {
            self.polls_left -= 1;
            return Ok(None);
        }
        self.script.lock().unwrap().completed.push(self.line.clone());
        Ok(Some(self.code))
    }

    fn kill(&mut self) {
        self.killed = true;
        self.script
            .lock()
            .unwrap()
            .completed
            .push(format!("killed {}", self.line));
    }
}
