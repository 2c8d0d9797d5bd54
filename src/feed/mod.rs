//! Data-Sync Consumers
//!
//! One generic consumer turns a live gateway subscription into a view that
//! widgets can read. Widgets describe themselves with the [`Feed`] trait:
//! how to name their subscription, what to query, and how to turn a snapshot
//! into view state.
//!
//! ## Lifecycle
//!
//! - `activate`: derive the key, check the session, subscribe, register
//! - snapshots: projected in full into a fresh view and published
//! - delivery errors: logged, last good view kept
//! - `reconfigure`: while active, release the old key and activate the new one
//! - `deactivate` / drop: release the key; later snapshots are ignored

mod consumer;
mod state;

pub use consumer::FeedConsumer;
pub use state::FeedState;

use thiserror::Error;

use crate::gateway::{DocumentRef, GatewayError, Mutation, Query, Snapshot};
use crate::registry::SubscriptionKey;

/// A widget's description of the live data it shows
pub trait Feed: Send + Sync + 'static {
    /// Derived, renderable state
    type View: Clone + Send + Sync + 'static;

    /// Stable identity of the consumer (e.g. `activity`)
    fn identity(&self) -> &str;

    /// Configuration-dependent part of the key (e.g. `extended`)
    fn qualifier(&self) -> Option<&str> {
        None
    }

    /// Registry key for this configuration
    fn key(&self) -> SubscriptionKey {
        SubscriptionKey::derive(self.identity(), self.qualifier())
    }

    /// What to subscribe to
    fn query(&self) -> Query;

    /// Compute the full view from one snapshot
    fn project(&self, snapshot: &Snapshot) -> Self::View;

    /// View shown without a session, after a setup failure, or when a
    /// delivery error arrives before any data
    fn empty_view(&self) -> Self::View;

    /// Write to issue before publishing `snapshot`, such as creating a
    /// document the feed expects to exist
    fn initializer(&self, _snapshot: &Snapshot) -> Option<(DocumentRef, Mutation)> {
        None
    }
}

/// Errors surfaced by feed consumers
#[derive(Debug, Clone, Error)]
pub enum FeedError {
    /// The gateway refused to open the subscription
    #[error("Failed to subscribe '{key}': {source}")]
    Setup {
        key: SubscriptionKey,
        #[source]
        source: GatewayError,
    },
}
