//! Teardown handles
//!
//! A `TeardownHandle` stops snapshot delivery for exactly one subscription.
//! It wraps a one-shot closure so invoking it twice is harmless.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use thiserror::Error;

type TeardownFn = Box<dyn FnOnce() -> Result<(), TeardownError> + Send>;

/// Handle that stops one live subscription
///
/// The wrapped closure runs at most once. Later calls to [`invoke`] return
/// `Ok(())` without doing anything.
///
/// [`invoke`]: TeardownHandle::invoke
pub struct TeardownHandle {
    inner: Option<TeardownFn>,
}

impl TeardownHandle {
    /// Create a handle from a fallible teardown closure
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce() -> Result<(), TeardownError> + Send + 'static,
    {
        Self {
            inner: Some(Box::new(f)),
        }
    }

    /// Create a handle from a closure that cannot fail
    pub fn from_fn<F>(f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self::new(move || {
            f();
            Ok(())
        })
    }

    /// A handle with nothing to tear down
    pub fn noop() -> Self {
        Self { inner: None }
    }

    /// Chain another teardown after this one
    ///
    /// Both closures always run; the first error (or panic) wins.
    pub fn then(self, next: TeardownHandle) -> Self {
        let mut first = self;
        let mut second = next;
        Self::new(move || {
            let a = first.invoke();
            let b = second.invoke();
            a.and(b)
        })
    }

    /// Whether the teardown has already run
    pub fn is_spent(&self) -> bool {
        self.inner.is_none()
    }

    /// Run the teardown
    ///
    /// A panic inside the closure is caught and returned as
    /// [`TeardownError::Panicked`].
    pub fn invoke(&mut self) -> Result<(), TeardownError> {
        let Some(f) = self.inner.take() else {
            return Ok(());
        };

        match panic::catch_unwind(AssertUnwindSafe(f)) {
            Ok(result) => result,
            Err(payload) => Err(TeardownError::Panicked(panic_message(payload.as_ref()))),
        }
    }
}

impl fmt::Debug for TeardownHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TeardownHandle")
            .field("spent", &self.is_spent())
            .finish()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Errors raised while tearing a subscription down
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TeardownError {
    /// The teardown closure reported a failure
    #[error("Teardown failed: {0}")]
    Failed(String),

    /// The teardown closure panicked
    #[error("Teardown panicked: {0}")]
    Panicked(String),
}
