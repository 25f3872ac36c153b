//! Cancellation shared by the tasks of one launcher.
//!
//! The launcher trips the token when a task fails; the pipeline hooks its
//! queue closes onto it so the remaining workers drain and exit.

use parking_lot::Mutex;
use std::panic::{catch_unwind, AssertUnwindSafe};
use tokio::sync::Notify;
use tracing::{info, warn};

type Hook = Box<dyn FnOnce() + Send>;

enum State {
    Active(Vec<Hook>),
    Cancelled(String),
}

/// Trips once; later calls keep the first reason.
pub struct CancellationToken {
    state: Mutex<State>,
    notify: Notify,
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self {
            state: Mutex::new(State::Active(Vec::new())),
            notify: Notify::new(),
        }
    }
}

impl CancellationToken {
    /// Creates an untripped token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Trips the token and runs the registered hooks.
    ///
    /// Returns false if the token was already tripped.
    pub fn cancel(&self, reason: impl Into<String>) -> bool {
        let reason = reason.into();
        let hooks = {
            let mut state = self.state.lock();
            match &mut *state {
                State::Cancelled(_) => return false,
                State::Active(hooks) => {
                    let hooks = std::mem::take(hooks);
                    *state = State::Cancelled(reason.clone());
                    hooks
                }
            }
        };

        info!(%reason, hooks = hooks.len(), "Cancelling pipeline tasks");
        for hook in hooks {
            run_hook(hook);
        }
        self.notify.notify_waiters();
        true
    }

    /// Runs `hook` once on cancellation, or now if already tripped.
    pub fn on_cancel(&self, hook: impl FnOnce() + Send + 'static) {
        {
            let mut state = self.state.lock();
            if let State::Active(hooks) = &mut *state {
                hooks.push(Box::new(hook));
                return;
            }
        }
        run_hook(Box::new(hook));
    }

    /// Returns whether the token was tripped.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(*self.state.lock(), State::Cancelled(_))
    }

    /// The reason given by the first [`cancel`](Self::cancel).
    #[must_use]
    pub fn reason(&self) -> Option<String> {
        match &*self.state.lock() {
            State::Cancelled(reason) => Some(reason.clone()),
            State::Active(_) => None,
        }
    }

    /// Resolves once the token is tripped.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

// A hook that panics must not keep the others from running.
fn run_hook(hook: Hook) {
    if catch_unwind(AssertUnwindSafe(hook)).is_err() {
        warn!("Cancellation hook panicked");
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("reason", &self.reason())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_first_reason_wins() {
        let token = CancellationToken::new();

        assert!(token.cancel("load[0] failed"));
        assert!(!token.cancel("load[1] failed"));
        assert_eq!(token.reason().as_deref(), Some("load[0] failed"));
    }

    #[test]
    fn test_hooks_run_once_and_late_hooks_run_immediately() {
        let token = CancellationToken::new();
        let closes = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&closes);
        token.on_cancel(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        token.cancel("a");
        token.cancel("b");
        assert_eq!(closes.load(Ordering::SeqCst), 1);

        let counter = Arc::clone(&closes);
        token.on_cancel(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(closes.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_panicking_hook_does_not_stop_others() {
        let token = CancellationToken::new();
        let ran = Arc::new(AtomicUsize::new(0));

        token.on_cancel(|| panic!("queue already gone"));
        let counter = Arc::clone(&ran);
        token.on_cancel(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        token.cancel("test");
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancelled_wakes_waiter() {
        let token = Arc::new(CancellationToken::new());
        let waiter = {
            let token = Arc::clone(&token);
            tokio::spawn(async move { token.cancelled().await })
        };

        tokio::task::yield_now().await;
        token.cancel("stop");
        waiter.await.unwrap();
    }
}
