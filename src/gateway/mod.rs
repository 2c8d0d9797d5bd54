//! Remote Data Gateway
//!
//! The backend surface consumed by the dashboard: live subscriptions,
//! one-shot reads and document writes.
//!
//! ## Architecture
//!
//! - **Gateway**: Trait implemented by every backend adapter
//! - **Subscription**: A snapshot stream paired with its teardown handle
//! - **MemoryGateway**: In-process backend with live listeners, used by the
//!   demo binary and the tests
//!
//! A subscription delivers an initial snapshot followed by zero or more
//! updates. Any item may be an error instead of data.

mod error;
mod memory;
#[cfg(test)]
pub(crate) mod testing;
mod types;

pub use error::{GatewayError, GatewayResult};
pub use memory::MemoryGateway;
pub use types::{
    is_server_timestamp, server_timestamp, CollectionQuery, Direction, Document,
    DocumentRef, DocumentSnapshot, FieldUpdate, Fields, Mutation, OrderBy, Query,
    QuerySnapshot, Snapshot,
};

use async_trait::async_trait;
use futures_util::Stream;
use std::fmt;
use std::pin::Pin;
use tokio::sync::mpsc;

use crate::registry::TeardownHandle;

/// Stream of snapshots (or delivery errors) for one subscription
pub type SnapshotStream = Pin<Box<dyn Stream<Item = GatewayResult<Snapshot>> + Send>>;

/// A live subscription: snapshots plus the handle that stops them
pub struct Subscription {
    pub snapshots: SnapshotStream,
    pub teardown: TeardownHandle,
}

impl Subscription {
    pub fn new(snapshots: SnapshotStream, teardown: TeardownHandle) -> Self {
        Self {
            snapshots,
            teardown,
        }
    }

    /// Build a subscription from a channel receiver
    ///
    /// The stream ends once every sender has been dropped.
    pub fn from_receiver(
        rx: mpsc::UnboundedReceiver<GatewayResult<Snapshot>>,
        teardown: TeardownHandle,
    ) -> Self {
        let snapshots = futures_util::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        });
        Self::new(Box::pin(snapshots), teardown)
    }

    pub fn into_parts(self) -> (SnapshotStream, TeardownHandle) {
        (self.snapshots, self.teardown)
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("teardown", &self.teardown)
            .finish_non_exhaustive()
    }
}

/// Backend providing live subscriptions and document writes
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Open a live subscription
    ///
    /// Fails synchronously when the subscription cannot be set up (for
    /// example on a malformed query).
    fn subscribe(&self, query: &Query) -> GatewayResult<Subscription>;

    /// Read the current state once
    async fn read_once(&self, query: &Query) -> GatewayResult<Snapshot>;

    /// Apply a write to one document
    async fn mutate(&self, target: &DocumentRef, mutation: Mutation) -> GatewayResult<()>;

    /// Create a document with a generated id in `collection`
    async fn add(&self, collection: &str, fields: Fields) -> GatewayResult<DocumentRef>;
}
