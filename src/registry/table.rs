//! Subscription registry
//!
//! Keyed table of live subscriptions. Guarantees at most one entry per key
//! and exactly-once teardown for every handle it accepts.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use super::handle::TeardownHandle;
use super::key::SubscriptionKey;

/// Identifies one registration under a key
///
/// Returned by [`SubscriptionRegistry::register_owned`]. Releasing with a
/// stale registration never touches the entry that replaced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Registration(u64);

#[derive(Debug)]
struct Entry {
    registration: Registration,
    teardown: TeardownHandle,
}

#[derive(Debug, Default)]
struct Table {
    entries: HashMap<SubscriptionKey, Entry>,
    next_registration: u64,
}

/// Registry of live subscriptions, keyed by logical identity
///
/// Owned explicitly (usually behind an `Arc`) and injected into consumers.
/// Teardown failures are logged and swallowed; no method here returns an
/// error.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    table: Mutex<Table>,
}

impl SubscriptionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a teardown handle under `key`
    ///
    /// If an entry already exists for `key`, its handle is invoked first and
    /// then replaced. Returns `true` when a previous entry was superseded.
    pub fn register(&self, key: SubscriptionKey, teardown: TeardownHandle) -> bool {
        self.insert(key, teardown).1
    }

    /// Register like [`register`](Self::register), returning the
    /// registration that [`release_if`](Self::release_if) checks against
    pub fn register_owned(&self, key: SubscriptionKey, teardown: TeardownHandle) -> Registration {
        self.insert(key, teardown).0
    }

    fn insert(&self, key: SubscriptionKey, teardown: TeardownHandle) -> (Registration, bool) {
        // Lookup and replace happen under one lock; the old handle runs after.
        let (registration, previous) = {
            let mut table = self.lock();
            let registration = Registration(table.next_registration);
            table.next_registration += 1;
            let previous = table.entries.insert(
                key.clone(),
                Entry {
                    registration,
                    teardown,
                },
            );
            (registration, previous)
        };

        match previous {
            Some(old) => {
                tracing::debug!(key = %key, "Replacing existing subscription");
                run_teardown(&key, old.teardown);
                (registration, true)
            }
            None => {
                tracing::debug!(key = %key, "Registered subscription");
                (registration, false)
            }
        }
    }

    /// Release the subscription registered under `key`
    ///
    /// No-op when nothing is registered. Returns `true` when an entry was
    /// removed, whether or not its teardown succeeded.
    pub fn release(&self, key: &SubscriptionKey) -> bool {
        let entry = self.lock().entries.remove(key);
        finish_release(key, entry)
    }

    /// Release `key` only if it is still held by `registration`
    ///
    /// The ownership check and the removal happen under one lock, so an
    /// entry that replaced `registration` is left alone.
    pub fn release_if(&self, key: &SubscriptionKey, registration: Registration) -> bool {
        let entry = {
            let mut table = self.lock();
            let owner = table.entries.get(key).map(|entry| entry.registration);
            match owner {
                Some(owner) if owner == registration => table.entries.remove(key),
                Some(_) => {
                    tracing::trace!(key = %key, "Entry owned by a newer registration, kept");
                    None
                }
                None => None,
            }
        };
        finish_release(key, entry)
    }

    /// Release every registered subscription
    ///
    /// Leaves the registry empty. Returns the number of teardowns that failed.
    pub fn release_all(&self) -> usize {
        let drained: Vec<_> = self.lock().entries.drain().collect();
        let total = drained.len();

        let failures = drained
            .into_iter()
            .map(|(key, entry)| run_teardown(&key, entry.teardown))
            .filter(|ok| !ok)
            .count();

        tracing::info!(released = total, failures, "Released all subscriptions");
        failures
    }

    /// Whether an entry exists for `key`
    pub fn is_active(&self, key: &SubscriptionKey) -> bool {
        self.lock().entries.contains_key(key)
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    /// Keys of all live entries, sorted
    pub fn keys(&self) -> Vec<SubscriptionKey> {
        let mut keys: Vec<_> = self.lock().entries.keys().cloned().collect();
        keys.sort();
        keys
    }

    fn lock(&self) -> MutexGuard<'_, Table> {
        // Teardowns never run under this lock, so a poisoned guard still
        // holds a consistent table.
        self.table.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Run the teardown of a removed entry, if any. Returns whether one existed.
fn finish_release(key: &SubscriptionKey, entry: Option<Entry>) -> bool {
    match entry {
        Some(entry) => {
            if run_teardown(key, entry.teardown) {
                tracing::debug!(key = %key, "Released subscription");
            }
            true
        }
        None => {
            tracing::trace!(key = %key, "Release of inactive key ignored");
            false
        }
    }
}

/// Invoke a removed handle, logging any failure. Returns `true` on success.
fn run_teardown(key: &SubscriptionKey, mut handle: TeardownHandle) -> bool {
    match handle.invoke() {
        Ok(()) => true,
        Err(e) => {
            tracing::error!(key = %key, error = %e, "Subscription teardown failed");
            false
        }
    }
}
