pub mod crypto;
pub mod device;
pub mod directory;
pub mod mount;
pub mod suspend;
pub mod wait;

use tracing::{debug, error, warn};

use crate::error::{Result, RotavaultError};
use crate::signal_handler::CancelToken;

pub use crypto::CryptoContext;
pub use directory::DirectoryContext;
pub use mount::MountContext;
pub use suspend::SuspendContext;
pub use wait::WaitContext;

/// A resource acquired once and released once, in reverse order, by a
/// [`ContextStack`].
pub trait ResourceContext {
    fn acquire(&mut self) -> Result<()>;

    /// `clean` is false when the run, or a release before this one, failed.
    fn release(&mut self, clean: bool) -> Result<()>;

    fn describe(&self) -> String;
}

/// Contexts entered so far, released last-in first-out.
pub struct ContextStack<'a> {
    acquired: Vec<Box<dyn ResourceContext + 'a>>,
}

impl<'a> ContextStack<'a> {
    /// Enter `contexts` in order. When one fails, the ones already entered are
    /// released in reverse order before the failure is returned.
    pub fn enter(
        contexts: Vec<Box<dyn ResourceContext + 'a>>,
        cancel: &CancelToken,
    ) -> Result<Self> {
        let mut stack = ContextStack {
            acquired: Vec::with_capacity(contexts.len()),
        };
        for mut context in contexts {
            let name = context.describe();
            debug!("entering {}", name);
            if let Err(err) = cancel.check().and_then(|_| context.acquire()) {
                error!("cannot acquire {}: {}", name, err);
                stack.unwind(false);
                return Err(RotavaultError::AcquisitionFailed {
                    context: name,
                    source: Box::new(err),
                });
            }
            stack.acquired.push(context);
        }
        Ok(stack)
    }

    pub fn depth(&self) -> usize {
        self.acquired.len()
    }

    /// Release everything. Release failures are logged and returned; they
    /// never stop the remaining releases.
    pub fn exit(mut self, clean: bool) -> Vec<RotavaultError> {
        self.unwind(clean)
    }

    fn unwind(&mut self, mut clean: bool) -> Vec<RotavaultError> {
        let mut failures = Vec::new();
        while let Some(mut context) = self.acquired.pop() {
            let name = context.describe();
            debug!("leaving {}", name);
            if let Err(err) = context.release(clean) {
                let err = RotavaultError::ReleaseFailed {
                    context: name,
                    source: Box::new(err),
                };
                error!("{}", err);
                failures.push(err);
                clean = false;
            }
        }
        failures
    }
}

impl Drop for ContextStack<'_> {
    fn drop(&mut self) {
        if !self.acquired.is_empty() {
            warn!("context stack dropped while entered, releasing");
            self.unwind(false);
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    pub(crate) type Journal = Rc<RefCell<Vec<String>>>;

    pub(crate) struct Recording {
        pub name: &'static str,
        pub journal: Journal,
        pub fail_acquire: bool,
        pub fail_release: bool,
    }

    impl Recording {
        pub fn new(name: &'static str, journal: &Journal) -> Self {
            Self {
                name,
                journal: journal.clone(),
                fail_acquire: false,
                fail_release: false,
            }
        }

        pub fn boxed(self) -> Box<dyn ResourceContext> {
            Box::new(self)
        }
    }

    impl ResourceContext for Recording {
        fn acquire(&mut self) -> Result<()> {
            self.journal.borrow_mut().push(format!("acquire {}", self.name));
            if self.fail_acquire {
                return Err(RotavaultError::message(format!("{} unavailable", self.name)));
            }
            Ok(())
        }

        fn release(&mut self, clean: bool) -> Result<()> {
            let suffix = if clean { "" } else { " (unclean)" };
            self.journal
                .borrow_mut()
                .push(format!("release {}{}", self.name, suffix));
            if self.fail_release {
                return Err(RotavaultError::message(format!("{} busy", self.name)));
            }
            Ok(())
        }

        fn describe(&self) -> String {
            self.name.to_string()
        }
    }

    fn entries(journal: &Journal) -> Vec<String> {
        journal.borrow().clone()
    }

    #[test]
    fn exit_releases_in_reverse_order() {
        let journal = Journal::default();
        let stack = ContextStack::enter(
            vec![
                Recording::new("A", &journal).boxed(),
                Recording::new("B", &journal).boxed(),
                Recording::new("C", &journal).boxed(),
            ],
            &CancelToken::new(),
        )
        .unwrap();
        assert_eq!(stack.depth(), 3);
        assert!(stack.exit(true).is_empty());
        assert_eq!(
            entries(&journal),
            vec!["acquire A", "acquire B", "acquire C", "release C", "release B", "release A"]
        );
    }

    #[test]
    fn failed_acquire_rolls_back_only_entered_contexts() {
        let journal = Journal::default();
        let mut c = Recording::new("C", &journal);
        c.fail_acquire = true;
        let result = ContextStack::enter(
            vec![
                Recording::new("A", &journal).boxed(),
                Recording::new("B", &journal).boxed(),
                c.boxed(),
                Recording::new("D", &journal).boxed(),
            ],
            &CancelToken::new(),
        );
        match result {
            Err(RotavaultError::AcquisitionFailed { context, .. }) => assert_eq!(context, "C"),
            Err(other) => panic!("unexpected error {other}"),
            Ok(_) => panic!("stack entered despite failure"),
        }
        assert_eq!(
            entries(&journal),
            vec![
                "acquire A",
                "acquire B",
                "acquire C",
                "release B (unclean)",
                "release A (unclean)"
            ]
        );
    }

    #[test]
    fn release_failure_does_not_stop_unwinding() {
        let journal = Journal::default();
        let mut b = Recording::new("B", &journal);
        b.fail_release = true;
        let stack = ContextStack::enter(
            vec![
                Recording::new("A", &journal).boxed(),
                b.boxed(),
                Recording::new("C", &journal).boxed(),
            ],
            &CancelToken::new(),
        )
        .unwrap();
        let failures = stack.exit(true);
        assert_eq!(failures.len(), 1);
        assert!(matches!(
            &failures[0],
            RotavaultError::ReleaseFailed { context, .. } if context == "B"
        ));
        assert_eq!(
            entries(&journal)[3..],
            ["release C", "release B", "release A (unclean)"]
        );
    }

    #[test]
    fn cancellation_aborts_entry_and_rolls_back() {
        let journal = Journal::default();
        let cancel = CancelToken::new();
        cancel.cancel();
        let result = ContextStack::enter(vec![Recording::new("A", &journal).boxed()], &cancel);
        assert!(matches!(result, Err(ref err) if err.is_cancelled()));
        assert!(entries(&journal).is_empty());
    }

    #[test]
    fn dropping_an_entered_stack_releases_uncleanly() {
        let journal = Journal::default();
        {
            let _stack = ContextStack::enter(
                vec![
                    Recording::new("A", &journal).boxed(),
                    Recording::new("B", &journal).boxed(),
                ],
                &CancelToken::new(),
            )
            .unwrap();
        }
        assert_eq!(
            entries(&journal)[2..],
            ["release B (unclean)", "release A (unclean)"]
        );
    }
}
