//! Consumer lifecycle state

use serde::Serialize;
use std::fmt;
use std::sync::{Mutex, MutexGuard};

/// Lifecycle of one feed consumer
///
/// `Idle → Subscribing → Live → Released`. `Subscribing → Released` happens
/// when teardown beats the first snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedState {
    /// Never activated
    Idle,
    /// Subscribed, waiting for the first snapshot
    Subscribing,
    /// At least one snapshot (or delivery error) has been handled
    Live,
    /// Activated without a session, or the subscription could not be set
    /// up; the view holds the empty default
    Unavailable,
    /// Torn down
    Released,
}

impl FeedState {
    /// Whether the consumer is still waiting for its first data
    pub fn is_loading(&self) -> bool {
        matches!(self, FeedState::Subscribing)
    }
}

impl fmt::Display for FeedState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FeedState::Idle => "idle",
            FeedState::Subscribing => "subscribing",
            FeedState::Live => "live",
            FeedState::Unavailable => "unavailable",
            FeedState::Released => "released",
        };
        f.write_str(s)
    }
}

/// Liveness guard for one activation
///
/// Every publish runs under the guard's lock and only while the activation
/// is alive. `revoke` takes the same lock, so once it returns no further
/// publish can happen.
#[derive(Debug)]
pub(crate) struct Activation {
    inner: Mutex<Inner>,
}

#[derive(Debug)]
struct Inner {
    alive: bool,
    state: FeedState,
}

impl Activation {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                alive: true,
                state: FeedState::Subscribing,
            }),
        }
    }

    /// Run `publish` if still alive, moving to `Live`. Returns whether it ran.
    pub fn publish<F: FnOnce()>(&self, publish: F) -> bool {
        let mut inner = self.lock();
        if !inner.alive {
            return false;
        }
        publish();
        inner.state = FeedState::Live;
        true
    }

    /// Stop all further publishes. Returns `true` if it was alive.
    pub fn revoke(&self) -> bool {
        let mut inner = self.lock();
        let was_alive = inner.alive;
        inner.alive = false;
        inner.state = FeedState::Released;
        was_alive
    }

    pub fn is_alive(&self) -> bool {
        self.lock().alive
    }

    pub fn state(&self) -> FeedState {
        self.lock().state
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}
