//! In-memory gateway
//!
//! A process-local document store with live listeners. Every write touching
//! a watched document or collection pushes a fresh full snapshot to each
//! affected listener, in write order.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tokio::sync::mpsc;
use uuid::Uuid;

use super::error::{GatewayError, GatewayResult};
use super::types::{
    is_server_timestamp, CollectionQuery, Direction, Document, DocumentRef, DocumentSnapshot,
    FieldUpdate, Fields, Mutation, Query, QuerySnapshot, Snapshot,
};
use super::{Gateway, Subscription};
use crate::registry::TeardownHandle;

type ListenerId = u64;

/// In-process gateway backed by a document map
#[derive(Clone, Default)]
pub struct MemoryGateway {
    store: Arc<Mutex<Store>>,
}

#[derive(Default)]
struct Store {
    /// Collection → (document id → fields)
    collections: HashMap<String, BTreeMap<String, Fields>>,
    listeners: HashMap<ListenerId, Listener>,
    next_listener: ListenerId,
    /// When set, `subscribe` fails with this error
    reject_subscriptions: Option<GatewayError>,
}

struct Listener {
    query: Query,
    sender: mpsc::UnboundedSender<GatewayResult<Snapshot>>,
}

impl MemoryGateway {
    /// Create an empty gateway
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of open listeners
    pub fn listener_count(&self) -> usize {
        self.lock().listeners.len()
    }

    /// Make every following `subscribe` call fail with `error`
    ///
    /// Pass `None` to accept subscriptions again.
    pub fn reject_subscriptions(&self, error: Option<GatewayError>) {
        self.lock().reject_subscriptions = error;
    }

    /// Deliver `error` to every listener whose query reads `collection`
    ///
    /// Returns the number of listeners notified.
    pub fn fail_listeners(&self, collection: &str, error: GatewayError) -> usize {
        let store = self.lock();
        let mut notified = 0;
        for listener in store.listeners.values() {
            if listener.query.collection() == collection
                && listener.sender.send(Err(error.clone())).is_ok()
            {
                notified += 1;
            }
        }
        tracing::debug!(collection, notified, error = %error, "Injected listener error");
        notified
    }

    fn lock(&self) -> MutexGuard<'_, Store> {
        self.store.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Store {
    fn evaluate(&self, query: &Query) -> Snapshot {
        match query {
            Query::Document(reference) => Snapshot::Document(DocumentSnapshot {
                reference: reference.clone(),
                data: self
                    .collections
                    .get(&reference.collection)
                    .and_then(|docs| docs.get(&reference.id))
                    .cloned(),
            }),
            Query::Collection(q) => Snapshot::Query(self.evaluate_collection(q)),
        }
    }

    fn evaluate_collection(&self, query: &CollectionQuery) -> QuerySnapshot {
        let Some(docs) = self.collections.get(&query.collection) else {
            return QuerySnapshot::default();
        };

        let mut docs: Vec<Document> = docs
            .iter()
            .filter(|(_, data)| match &query.order_by {
                Some(order) => data.get(&order.field).is_some_and(|v| !v.is_null()),
                None => true,
            })
            .map(|(id, data)| Document {
                id: id.clone(),
                data: data.clone(),
            })
            .collect();

        if let Some(order) = &query.order_by {
            // Stable sort keeps id order among equal keys
            docs.sort_by(|a, b| {
                let ord = compare_values(a.get(&order.field), b.get(&order.field));
                match order.direction {
                    Direction::Asc => ord,
                    Direction::Desc => ord.reverse(),
                }
            });
        }

        if let Some(limit) = query.limit {
            docs.truncate(limit);
        }

        QuerySnapshot { docs }
    }

    fn apply(&mut self, target: &DocumentRef, mutation: Mutation) -> GatewayResult<()> {
        let now = Utc::now().timestamp_millis();

        match mutation {
            Mutation::Set(fields) => {
                self.collections
                    .entry(target.collection.clone())
                    .or_default()
                    .insert(target.id.clone(), resolve_server_timestamps(fields, now));
            }
            Mutation::Update(updates) => {
                let doc = self
                    .collections
                    .get_mut(&target.collection)
                    .and_then(|docs| docs.get_mut(&target.id))
                    .ok_or_else(|| GatewayError::NotFound(target.path()))?;

                for (field, update) in updates {
                    let value = match update {
                        FieldUpdate::Set(v) if is_server_timestamp(&v) => Value::from(now),
                        FieldUpdate::Set(v) => v,
                        FieldUpdate::Increment(amount) => {
                            let current = doc.get(&field).and_then(Value::as_f64).unwrap_or(0.0);
                            number(current + amount)
                        }
                        FieldUpdate::ServerTimestamp => Value::from(now),
                    };
                    doc.insert(field, value);
                }
            }
            Mutation::Delete => {
                if let Some(docs) = self.collections.get_mut(&target.collection) {
                    docs.remove(&target.id);
                }
            }
        }

        self.notify(target);
        Ok(())
    }

    fn notify(&mut self, target: &DocumentRef) {
        let mut closed = Vec::new();
        for (id, listener) in &self.listeners {
            if !listener.query.is_affected_by(target) {
                continue;
            }
            let snapshot = self.evaluate(&listener.query);
            if listener.sender.send(Ok(snapshot)).is_err() {
                closed.push(*id);
            }
        }

        // Receivers dropped without a teardown
        for id in closed {
            self.listeners.remove(&id);
        }
    }
}

#[async_trait]
impl Gateway for MemoryGateway {
    fn subscribe(&self, query: &Query) -> GatewayResult<Subscription> {
        query.validate()?;

        let mut store = self.lock();
        if let Some(err) = &store.reject_subscriptions {
            return Err(err.clone());
        }

        let (tx, rx) = mpsc::unbounded_channel();
        // Initial snapshot goes out before any later write can be delivered
        let _ = tx.send(Ok(store.evaluate(query)));

        let id = store.next_listener;
        store.next_listener += 1;
        store.listeners.insert(
            id,
            Listener {
                query: query.clone(),
                sender: tx,
            },
        );
        drop(store);

        tracing::debug!(listener = id, query = %query, "Listener attached");

        let store: Weak<Mutex<Store>> = Arc::downgrade(&self.store);
        let teardown = TeardownHandle::from_fn(move || {
            if let Some(store) = store.upgrade() {
                let mut store = store.lock().unwrap_or_else(|e| e.into_inner());
                if store.listeners.remove(&id).is_some() {
                    tracing::debug!(listener = id, "Listener detached");
                }
            }
        });

        Ok(Subscription::from_receiver(rx, teardown))
    }

    async fn read_once(&self, query: &Query) -> GatewayResult<Snapshot> {
        query.validate()?;
        Ok(self.lock().evaluate(query))
    }

    async fn mutate(&self, target: &DocumentRef, mutation: Mutation) -> GatewayResult<()> {
        Query::Document(target.clone()).validate()?;
        self.lock().apply(target, mutation)
    }

    async fn add(&self, collection: &str, fields: Fields) -> GatewayResult<DocumentRef> {
        let target = DocumentRef::new(collection, Uuid::new_v4().to_string());
        self.mutate(&target, Mutation::Set(fields)).await?;
        Ok(target)
    }
}

fn resolve_server_timestamps(fields: Fields, now: i64) -> Fields {
    fields
        .into_iter()
        .map(|(k, v)| {
            if is_server_timestamp(&v) {
                (k, Value::from(now))
            } else {
                (k, v)
            }
        })
        .collect()
}

/// Integral results stay integers so counters read back as `i64`
fn number(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        Value::from(n as i64)
    } else {
        Value::from(n)
    }
}

/// Ordering for sort keys: numbers, then strings, then booleans
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    fn rank(v: &Value) -> u8 {
        match v {
            Value::Number(_) => 0,
            Value::String(_) => 1,
            Value::Bool(_) => 2,
            _ => 3,
        }
    }

    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let x = x.as_f64().unwrap_or(0.0);
            let y = y.as_f64().unwrap_or(0.0);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(x), Some(y)) => rank(x).cmp(&rank(y)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
