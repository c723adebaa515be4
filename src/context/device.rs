use crate::config::model::Base;
use crate::context::wait::WaitingCallback;
use crate::context::{
    ContextStack, CryptoContext, DirectoryContext, MountContext, ResourceContext, SuspendContext,
    WaitContext,
};
use crate::error::Result;
use crate::host::Host;
use crate::notify::device_missing_callback;
use crate::signal_handler::CancelToken;
use crate::types::TeardownPolicy;

/// Contexts that make the destination root usable, in acquisition order:
/// wait for the device, spin-down on success, LUKS, mount, then change into
/// the root.
pub fn destination_contexts<'a>(
    base: &Base,
    host: &'a Host,
    policy: TeardownPolicy,
    waiting: Option<WaitingCallback<'a>>,
    cancel: &CancelToken,
) -> Vec<Box<dyn ResourceContext + 'a>> {
    let dest = &base.destination;
    let mut contexts: Vec<Box<dyn ResourceContext + 'a>> = Vec::new();
    if let (true, Some(device)) = (dest.mount, &dest.device) {
        let mut wait = WaitContext::new(device.clone(), dest.wait_timeout, cancel.clone());
        if let Some(callback) = waiting {
            wait = wait.with_callback(callback);
        }
        contexts.push(Box::new(wait));
        if dest.suspend && policy.umount_if_mounted {
            contexts.push(Box::new(SuspendContext::new(host, device.clone())));
        }
        let mut mount_device = device.clone();
        if let Some(crypt) = &dest.cryptsetup {
            let crypto = CryptoContext::new(
                host,
                device.clone(),
                crypt.name.clone(),
                crypt.keyfile.clone(),
                policy,
            );
            mount_device = crypto.mapped_device();
            contexts.push(Box::new(crypto));
        }
        contexts.push(Box::new(MountContext::new(
            host,
            mount_device,
            dest.root.clone(),
            dest.mount_options.clone(),
            policy,
        )));
    }
    if !host.is_dry_run() || dest.root.is_dir() {
        contexts.push(Box::new(DirectoryContext::new(dest.root.clone())));
    }
    contexts
}

/// Run `f` with the destination up, then tear it down according to
/// `policy`. The first teardown failure fails an otherwise successful call.
pub fn with_destination<T>(
    base: &Base,
    host: &Host,
    policy: TeardownPolicy,
    cancel: &CancelToken,
    f: impl FnOnce() -> Result<T>,
) -> Result<T> {
    let waiting = device_missing_callback(host, base.notify_user.clone());
    let contexts = destination_contexts(base, host, policy, Some(waiting), cancel);
    let stack = ContextStack::enter(contexts, cancel)?;
    let result = f();
    let mut failures = stack.exit(result.is_ok()).into_iter();
    match (result, failures.next()) {
        (Ok(_), Some(err)) => Err(err),
        (result, _) => result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::load::parse_config;
    use crate::config::model::ToolsConfig;
    use crate::util::testing::ScriptedExecutor;

    fn base(destination: &str) -> Base {
        let yaml = format!(
            "destination:\n{destination}\nintervals:\n  - name: daily\n    keep: 7\ntargets:\n  - name: etc\n    source: /etc/\n"
        );
        parse_config(&yaml).unwrap().base
    }

    fn describe(contexts: &[Box<dyn ResourceContext + '_>]) -> Vec<String> {
        contexts.iter().map(|c| c.describe()).collect()
    }

    #[test]
    fn plain_directory_needs_only_chdir() {
        let host = Host::new(ScriptedExecutor::new().boxed(), ToolsConfig::default());
        let base = base("  root: /srv/backup");
        let contexts = destination_contexts(
            &base,
            &host,
            TeardownPolicy::default(),
            None,
            &CancelToken::new(),
        );
        assert_eq!(describe(&contexts), vec!["chdir(/srv/backup)"]);
    }

    #[test]
    fn encrypted_suspended_disk_stacks_in_order() {
        let host = Host::new(ScriptedExecutor::new().boxed(), ToolsConfig::default());
        let base = base(
            "  root: /mnt/backup\n  device: /dev/sdb1\n  mount: true\n  suspend: true\n  cryptsetup:\n    name: backup",
        );
        let contexts = destination_contexts(
            &base,
            &host,
            TeardownPolicy::default(),
            None,
            &CancelToken::new(),
        );
        assert_eq!(
            describe(&contexts),
            vec![
                "wait-for(/dev/sdb1)",
                "suspend(/dev/sdb1 on success)",
                "luks(/dev/sdb1 as \"backup\")",
                "mount(/dev/mapper/backup on /mnt/backup)",
                "chdir(/mnt/backup)",
            ]
        );
    }

    #[test]
    fn with_destination_runs_inside_the_root() {
        let host = Host::new(ScriptedExecutor::new().boxed(), ToolsConfig::default());
        let dir = tempfile::tempdir().unwrap();
        let mut base = base("  root: /srv/backup");
        base.destination.root = dir.path().to_path_buf();
        let policy = TeardownPolicy::default();
        let value = with_destination(&base, &host, policy, &CancelToken::new(), || Ok(7)).unwrap();
        assert_eq!(value, 7);
        let err = with_destination(&base, &host, policy, &CancelToken::new(), || {
            Err::<(), _>(crate::error::RotavaultError::message("boom"))
        })
        .unwrap_err();
        assert_eq!(err.to_string(), "boom");
    }

    #[test]
    fn keeping_the_disk_mounted_skips_suspend() {
        let host = Host::new(ScriptedExecutor::new().boxed(), ToolsConfig::default());
        let base = base("  root: /mnt/backup\n  device: /dev/sdb1\n  mount: true\n  suspend: true");
        let policy = TeardownPolicy { umount_if_mounted: false, force_umount: false };
        let contexts = destination_contexts(&base, &host, policy, None, &CancelToken::new());
        assert_eq!(
            describe(&contexts),
            vec![
                "wait-for(/dev/sdb1)",
                "mount(/dev/sdb1 on /mnt/backup)",
                "chdir(/mnt/backup)",
            ]
        );
    }

    #[test]
    fn forced_umount_alone_does_not_suspend() {
        let host = Host::new(ScriptedExecutor::new().boxed(), ToolsConfig::default());
        let base = base("  root: /mnt/backup\n  device: /dev/sdb1\n  mount: true\n  suspend: true");
        let policy = TeardownPolicy { umount_if_mounted: false, force_umount: true };
        let contexts = destination_contexts(&base, &host, policy, None, &CancelToken::new());
        assert!(
            !describe(&contexts).iter().any(|name| name.starts_with("suspend")),
            "{:?}",
            describe(&contexts)
        );
    }
}
