use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use crate::context::ResourceContext;
use crate::error::{Result, RotavaultError};
use crate::mount::inspect::is_block_device;
use crate::signal_handler::CancelToken;

pub const STEP_COUNT: u32 = 5;
const SLEEP_SLICE: Duration = Duration::from_millis(100);

/// Called with (elapsed, remaining) while the device is missing.
pub type WaitingCallback<'a> = Box<dyn Fn(Duration, Duration) + 'a>;
pub type DeviceProbe<'a> = Box<dyn Fn(&Path) -> bool + 'a>;

/// Waits up to `timeout` for a device node to appear, checking
/// [`STEP_COUNT`] times.
pub struct WaitContext<'a> {
    device: PathBuf,
    timeout: Duration,
    probe: DeviceProbe<'a>,
    waiting: Option<WaitingCallback<'a>>,
    cancel: CancelToken,
}

impl<'a> WaitContext<'a> {
    pub fn new(device: PathBuf, timeout: Duration, cancel: CancelToken) -> Self {
        Self {
            device,
            timeout,
            probe: Box::new(is_block_device),
            waiting: None,
            cancel,
        }
    }

    pub fn with_callback(mut self, callback: WaitingCallback<'a>) -> Self {
        self.waiting = Some(callback);
        self
    }

    pub fn with_probe(mut self, probe: DeviceProbe<'a>) -> Self {
        self.probe = probe;
        self
    }

    fn notify(&self, elapsed: Duration) {
        if let Some(callback) = &self.waiting {
            callback(elapsed, self.timeout.saturating_sub(elapsed));
        }
    }

    fn sleep(&self, duration: Duration) -> Result<()> {
        let deadline = Instant::now() + duration;
        loop {
            self.cancel.check()?;
            let now = Instant::now();
            if now >= deadline {
                return Ok(());
            }
            thread::sleep(SLEEP_SLICE.min(deadline - now));
        }
    }
}

impl ResourceContext for WaitContext<'_> {
    fn acquire(&mut self) -> Result<()> {
        if (self.probe)(&self.device) {
            return Ok(());
        }
        self.notify(Duration::ZERO);
        let step = self.timeout / STEP_COUNT;
        for i in 1..=STEP_COUNT {
            self.sleep(step)?;
            if (self.probe)(&self.device) {
                return Ok(());
            }
            if i < STEP_COUNT {
                self.notify(step * i);
            }
        }
        Err(RotavaultError::DeviceNotFound(self.device.clone()))
    }

    fn release(&mut self, _clean: bool) -> Result<()> {
        Ok(())
    }

    fn describe(&self) -> String {
        format!("wait-for({})", self.device.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};

    #[test]
    fn present_device_needs_no_wait() {
        let calls = RefCell::new(Vec::new());
        let mut context = WaitContext::new(
            PathBuf::from("/dev/sdb"),
            Duration::from_secs(30),
            CancelToken::new(),
        )
        .with_probe(Box::new(|_| true))
        .with_callback(Box::new(|elapsed, _| calls.borrow_mut().push(elapsed)));
        context.acquire().unwrap();
        drop(context);
        assert!(calls.borrow().is_empty());
    }

    #[test]
    fn missing_device_reports_each_step_then_fails() {
        let calls = RefCell::new(Vec::new());
        let mut context = WaitContext::new(
            PathBuf::from("/dev/sdz"),
            Duration::from_millis(50),
            CancelToken::new(),
        )
        .with_probe(Box::new(|_| false))
        .with_callback(Box::new(|elapsed, remaining| {
            calls.borrow_mut().push((elapsed, remaining))
        }));
        let err = context.acquire().unwrap_err();
        drop(context);
        assert!(matches!(err, RotavaultError::DeviceNotFound(ref p) if p == Path::new("/dev/sdz")));
        let calls = calls.into_inner();
        assert_eq!(calls.len(), STEP_COUNT as usize);
        assert_eq!(calls[0], (Duration::ZERO, Duration::from_millis(50)));
        assert_eq!(calls[1], (Duration::from_millis(10), Duration::from_millis(40)));
    }

    #[test]
    fn device_appearing_late_is_accepted() {
        let polls = Cell::new(0);
        let mut context = WaitContext::new(
            PathBuf::from("/dev/sdc"),
            Duration::from_millis(50),
            CancelToken::new(),
        )
        .with_probe(Box::new(|_| {
            polls.set(polls.get() + 1);
            polls.get() >= 3
        }));
        context.acquire().unwrap();
        drop(context);
        assert_eq!(polls.get(), 3);
    }

    #[test]
    fn cancellation_interrupts_waiting() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let mut context = WaitContext::new(
            PathBuf::from("/dev/sdz"),
            Duration::from_secs(3600),
            cancel,
        )
        .with_probe(Box::new(|_| false));
        assert!(matches!(context.acquire(), Err(RotavaultError::Cancelled)));
    }
}
