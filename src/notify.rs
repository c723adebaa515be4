use std::time::Duration;

use tracing::warn;

use crate::context::wait::WaitingCallback;
use crate::host::Host;
use crate::util::command::shell_quote;

/// Desktop notification shown to `user` through `su -c notify-send`.
pub fn notify_user(host: &Host, user: &str, message: &str) {
    let script = format!(
        "notify-send --urgency=critical --icon=dialog-warning-symbolic --expire-time=30000 {} {}",
        shell_quote("Backup problem"),
        shell_quote(message)
    );
    let argv = [
        host.tools().su.clone(),
        user.to_string(),
        "-c".to_string(),
        script,
    ];
    if let Err(err) = host.check_call(&argv) {
        warn!("cannot notify {}: {}", user, err);
    }
}

/// Wait callback for a missing destination device. Always logs; the first
/// report also notifies `user` when one is configured.
pub fn device_missing_callback<'a>(host: &'a Host, user: Option<String>) -> WaitingCallback<'a> {
    Box::new(move |elapsed: Duration, remaining: Duration| {
        warn!(
            "backup device not available, waiting {}s more",
            remaining.as_secs()
        );
        if elapsed.is_zero() {
            if let Some(user) = &user {
                let message = format!(
                    "Backup device not available. Please plug it in within {} seconds",
                    remaining.as_secs()
                );
                notify_user(host, user, &message);
            }
        }
    })
}
