use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use signal_hook::{
    consts::{SIGINT, SIGTERM},
    iterator::Signals,
};
use tracing::{error, warn};

use crate::error::{Result, RotavaultError};

/// Shared flag set when the run has been interrupted.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(RotavaultError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// First SIGINT/SIGTERM cancels the token so the run unwinds its resources;
/// a second one exits immediately.
pub fn signal_handler(token: &CancelToken) {
    let token = token.clone();
    thread::spawn(move || {
        let mut signals = match Signals::new([SIGINT, SIGTERM]) {
            Ok(signals) => signals,
            Err(err) => {
                error!("signal handler setup failed: {}", err);
                return;
            }
        };
        for signal in signals.forever() {
            if token.is_cancelled() {
                error!("received signal {} again, exiting without cleanup", signal);
                std::process::exit(130);
            }
            warn!("received signal {}, cancelling run", signal);
            token.cancel();
        }
    });
}
