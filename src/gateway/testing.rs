//! Scripted gateway for tests
//!
//! Each `subscribe` call opens a channel the test drives by hand. Teardown
//! only counts invocations and leaves the channel open, so tests can deliver
//! snapshots after teardown the way a slow backend would.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

use super::{
    DocumentRef, Fields, Gateway, GatewayError, GatewayResult, Mutation, Query, Snapshot,
    Subscription,
};
use crate::registry::TeardownHandle;

pub(crate) struct ScriptedFeed {
    pub query: Query,
    pub sender: mpsc::UnboundedSender<GatewayResult<Snapshot>>,
    pub teardowns: Arc<AtomicUsize>,
}

#[derive(Default)]
pub(crate) struct ScriptedGateway {
    feeds: Mutex<Vec<ScriptedFeed>>,
    fail_subscribe: Mutex<Option<GatewayError>>,
    mutations: Mutex<Vec<(DocumentRef, Mutation)>>,
    added: Mutex<Vec<(String, Fields)>>,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_subscribe(&self, error: GatewayError) {
        *self.fail_subscribe.lock().unwrap() = Some(error);
    }

    /// Number of subscriptions opened so far
    pub fn subscriptions(&self) -> usize {
        self.feeds.lock().unwrap().len()
    }

    pub fn query(&self, index: usize) -> Query {
        self.feeds.lock().unwrap()[index].query.clone()
    }

    /// Push an item into subscription `index`, even after teardown
    pub fn push(&self, index: usize, item: GatewayResult<Snapshot>) {
        let feeds = self.feeds.lock().unwrap();
        let _ = feeds[index].sender.send(item);
    }

    /// How many times subscription `index` was torn down
    pub fn teardowns(&self, index: usize) -> usize {
        self.feeds.lock().unwrap()[index]
            .teardowns
            .load(Ordering::SeqCst)
    }

    pub fn mutations(&self) -> Vec<(DocumentRef, Mutation)> {
        self.mutations.lock().unwrap().clone()
    }

    pub fn added(&self) -> Vec<(String, Fields)> {
        self.added.lock().unwrap().clone()
    }
}

#[async_trait]
impl Gateway for ScriptedGateway {
    fn subscribe(&self, query: &Query) -> GatewayResult<Subscription> {
        if let Some(err) = self.fail_subscribe.lock().unwrap().clone() {
            return Err(err);
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let teardowns = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&teardowns);
        self.feeds.lock().unwrap().push(ScriptedFeed {
            query: query.clone(),
            sender: tx,
            teardowns,
        });

        Ok(Subscription::from_receiver(
            rx,
            TeardownHandle::from_fn(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        ))
    }

    async fn read_once(&self, _query: &Query) -> GatewayResult<Snapshot> {
        Err(GatewayError::Unavailable("scripted gateway has no data".to_string()))
    }

    async fn mutate(&self, target: &DocumentRef, mutation: Mutation) -> GatewayResult<()> {
        self.mutations.lock().unwrap().push((target.clone(), mutation));
        Ok(())
    }

    async fn add(&self, collection: &str, fields: Fields) -> GatewayResult<DocumentRef> {
        let mut added = self.added.lock().unwrap();
        added.push((collection.to_string(), fields));
        Ok(DocumentRef::new(collection, format!("doc-{}", added.len())))
    }
}
