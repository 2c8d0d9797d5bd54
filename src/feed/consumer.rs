//! Generic feed consumer
//!
//! Bridges one gateway subscription into a locally readable view, handling
//! setup, reconfiguration and teardown through the shared registry.

use futures_util::StreamExt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

use super::state::{Activation, FeedState};
use super::{Feed, FeedError};
use crate::gateway::{Gateway, SnapshotStream};
use crate::registry::{Registration, SubscriptionKey, SubscriptionRegistry, TeardownHandle};
use crate::session::SessionProvider;

/// Subscribes one [`Feed`] and keeps its view current
///
/// Activation must happen inside a Tokio runtime: snapshots are consumed by
/// a spawned task. Dropping the consumer deactivates it.
pub struct FeedConsumer<F: Feed> {
    registry: Arc<SubscriptionRegistry>,
    gateway: Arc<dyn Gateway>,
    sessions: Arc<dyn SessionProvider>,
    view: Arc<watch::Sender<F::View>>,
    publishes: Arc<AtomicU64>,
    current: Option<Active>,
    /// State reported while no activation is held
    resting: FeedState,
    setup_error: Option<FeedError>,
}

struct Active {
    key: SubscriptionKey,
    registration: Registration,
    activation: Arc<Activation>,
}

impl<F: Feed> FeedConsumer<F> {
    /// Create an idle consumer whose view starts at `initial`
    pub fn new(
        registry: Arc<SubscriptionRegistry>,
        gateway: Arc<dyn Gateway>,
        sessions: Arc<dyn SessionProvider>,
        initial: F::View,
    ) -> Self {
        let (tx, _) = watch::channel(initial);
        Self {
            registry,
            gateway,
            sessions,
            view: Arc::new(tx),
            publishes: Arc::new(AtomicU64::new(0)),
            current: None,
            resting: FeedState::Idle,
            setup_error: None,
        }
    }

    /// Activate with configuration `feed`
    ///
    /// Any current activation is released first, so this also serves as
    /// reconfiguration. Without a session the view falls back to the feed's
    /// empty default and nothing is subscribed.
    pub fn activate(&mut self, feed: F) -> FeedState {
        self.deactivate();
        self.setup_error = None;

        let key = feed.key();

        if self.sessions.current_session().is_none() {
            tracing::info!(key = %key, "No session, showing default view");
            self.view.send_replace(feed.empty_view());
            self.resting = FeedState::Unavailable;
            return self.resting;
        }

        let query = feed.query();
        let subscription = match self.gateway.subscribe(&query) {
            Ok(subscription) => subscription,
            Err(e) => {
                tracing::error!(key = %key, query = %query, error = %e, "Failed to set up subscription");
                self.view.send_replace(feed.empty_view());
                self.setup_error = Some(FeedError::Setup {
                    key,
                    source: e,
                });
                self.resting = FeedState::Unavailable;
                return self.resting;
            }
        };

        let (snapshots, gateway_teardown) = subscription.into_parts();
        let activation = Arc::new(Activation::new());

        let task = tokio::spawn(pump(
            Arc::new(feed),
            snapshots,
            Arc::clone(&activation),
            Arc::clone(&self.view),
            Arc::clone(&self.publishes),
            Arc::clone(&self.gateway),
            key.clone(),
        ));

        // Revoke first so nothing publishes while the gateway is detaching
        let guard = Arc::clone(&activation);
        let abort = task.abort_handle();
        let teardown = TeardownHandle::from_fn(move || {
            guard.revoke();
            abort.abort();
        })
        .then(gateway_teardown);

        let registration = self.registry.register_owned(key.clone(), teardown);
        tracing::debug!(key = %key, query = %query, "Feed activated");

        self.current = Some(Active {
            key,
            registration,
            activation,
        });
        FeedState::Subscribing
    }

    /// Switch a live consumer to a new configuration
    ///
    /// The old key is released before the new one is subscribed. A consumer
    /// that is not active (never activated, deactivated, or revoked through
    /// the registry) stays inactive; the next `activate` decides the
    /// configuration.
    pub fn reconfigure(&mut self, feed: F) -> FeedState {
        let Some(active) = self.current.as_ref().filter(|a| a.activation.is_alive()) else {
            tracing::debug!(key = %feed.key(), "Consumer inactive, not reconfiguring");
            return self.state();
        };
        tracing::debug!(from = %active.key, to = %feed.key(), "Reconfiguring feed");
        self.activate(feed)
    }

    /// Release the current subscription, if any
    ///
    /// Snapshots arriving afterwards are ignored.
    pub fn deactivate(&mut self) {
        let Some(active) = self.current.take() else {
            return;
        };

        // A superseded activation no longer owns the registry entry
        self.registry.release_if(&active.key, active.registration);
        active.activation.revoke();
        self.resting = FeedState::Released;
    }

    /// Current lifecycle state
    pub fn state(&self) -> FeedState {
        match &self.current {
            Some(active) => active.activation.state(),
            None => self.resting,
        }
    }

    /// Key of the current activation
    pub fn key(&self) -> Option<&SubscriptionKey> {
        self.current.as_ref().map(|a| &a.key)
    }

    /// Latest published view
    pub fn view(&self) -> F::View {
        self.view.borrow().clone()
    }

    /// Receiver notified on every published view
    pub fn watch(&self) -> watch::Receiver<F::View> {
        self.view.subscribe()
    }

    /// Number of views published by snapshot handling
    pub fn publish_count(&self) -> u64 {
        self.publishes.load(Ordering::SeqCst)
    }

    /// Error from the last failed activation, if any
    pub fn setup_error(&self) -> Option<&FeedError> {
        self.setup_error.as_ref()
    }
}

impl<F: Feed> Drop for FeedConsumer<F> {
    fn drop(&mut self) {
        self.deactivate();
    }
}

/// Drain the snapshot stream into the view until revoked
async fn pump<F: Feed>(
    feed: Arc<F>,
    mut snapshots: SnapshotStream,
    activation: Arc<Activation>,
    view: Arc<watch::Sender<F::View>>,
    publishes: Arc<AtomicU64>,
    gateway: Arc<dyn Gateway>,
    key: SubscriptionKey,
) {
    let mut have_good = false;

    while let Some(item) = snapshots.next().await {
        match item {
            Ok(snapshot) => {
                if let Some((target, mutation)) = feed.initializer(&snapshot) {
                    if activation.is_alive() {
                        tracing::info!(key = %key, document = %target, "Initializing missing document");
                        if let Err(e) = gateway.mutate(&target, mutation).await {
                            tracing::error!(key = %key, document = %target, error = %e, "Failed to initialize document");
                        }
                    }
                }

                let next = feed.project(&snapshot);
                let published = activation.publish(|| {
                    view.send_replace(next);
                    publishes.fetch_add(1, Ordering::SeqCst);
                });
                if !published {
                    tracing::debug!(key = %key, "Dropped snapshot after teardown");
                    return;
                }
                have_good = true;
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Snapshot delivery failed, keeping last good view");
                let published = activation.publish(|| {
                    // Never leave the consumer stuck loading
                    if !have_good {
                        view.send_replace(feed.empty_view());
                        publishes.fetch_add(1, Ordering::SeqCst);
                    }
                });
                if !published {
                    return;
                }
            }
        }
    }

    tracing::debug!(key = %key, "Snapshot stream ended");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::testing::ScriptedGateway;
    use crate::gateway::{
        DocumentRef, DocumentSnapshot, GatewayError, Mutation, Query, Snapshot,
    };
    use crate::session::{Session, SessionStore};
    use serde_json::{json, Value};
    use std::time::Duration;

    /// Reads the `count` field of `counters/{name}`
    struct CounterFeed {
        name: &'static str,
        mode: Option<&'static str>,
    }

    impl Feed for CounterFeed {
        type View = i64;

        fn identity(&self) -> &str {
            self.name
        }

        fn qualifier(&self) -> Option<&str> {
            self.mode
        }

        fn query(&self) -> Query {
            Query::Document(DocumentRef::new("counters", self.name))
        }

        fn project(&self, snapshot: &Snapshot) -> i64 {
            snapshot
                .as_document()
                .and_then(|d| d.data.as_ref())
                .and_then(|d| d.get("count"))
                .and_then(Value::as_i64)
                .unwrap_or(0)
        }

        fn empty_view(&self) -> i64 {
            0
        }

        fn initializer(&self, snapshot: &Snapshot) -> Option<(DocumentRef, Mutation)> {
            let doc = snapshot.as_document()?;
            (!doc.exists()).then(|| {
                (
                    doc.reference.clone(),
                    Mutation::Set(json!({"count": 0}).as_object().cloned().unwrap_or_default()),
                )
            })
        }
    }

    fn counter(name: &'static str) -> CounterFeed {
        CounterFeed { name, mode: None }
    }

    fn count_snapshot(name: &str, count: i64) -> Snapshot {
        Snapshot::Document(DocumentSnapshot {
            reference: DocumentRef::new("counters", name),
            data: json!({ "count": count }).as_object().cloned(),
        })
    }

    struct Harness {
        registry: Arc<SubscriptionRegistry>,
        gateway: Arc<ScriptedGateway>,
        sessions: Arc<SessionStore>,
    }

    impl Harness {
        fn signed_in() -> Self {
            Self {
                registry: Arc::new(SubscriptionRegistry::new()),
                gateway: Arc::new(ScriptedGateway::new()),
                sessions: Arc::new(SessionStore::signed_in(Session::new("user-1"))),
            }
        }

        fn signed_out() -> Self {
            let harness = Self::signed_in();
            harness.sessions.sign_out();
            harness
        }

        fn consumer(&self) -> FeedConsumer<CounterFeed> {
            FeedConsumer::new(
                Arc::clone(&self.registry),
                self.gateway.clone(),
                self.sessions.clone(),
                -1,
            )
        }
    }

    async fn next_view(rx: &mut watch::Receiver<i64>) -> i64 {
        tokio::time::timeout(Duration::from_secs(1), rx.changed())
            .await
            .expect("view update timed out")
            .unwrap();
        *rx.borrow_and_update()
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    #[tokio::test]
    async fn test_no_session_uses_default_and_skips_registry() {
        let h = Harness::signed_out();
        let mut consumer = h.consumer();

        assert_eq!(consumer.activate(counter("visits")), FeedState::Unavailable);
        assert_eq!(consumer.view(), 0);
        assert_eq!(h.gateway.subscriptions(), 0);
        assert!(!h.registry.is_active(&SubscriptionKey::new("visits")));
        assert!(h.registry.is_empty());
    }

    #[tokio::test]
    async fn test_snapshots_update_view() {
        let h = Harness::signed_in();
        let mut consumer = h.consumer();
        let mut rx = consumer.watch();

        assert_eq!(consumer.activate(counter("visits")), FeedState::Subscribing);
        assert!(h.registry.is_active(&SubscriptionKey::new("visits")));

        h.gateway.push(0, Ok(count_snapshot("visits", 3)));
        assert_eq!(next_view(&mut rx).await, 3);
        assert_eq!(consumer.state(), FeedState::Live);

        h.gateway.push(0, Ok(count_snapshot("visits", 7)));
        assert_eq!(next_view(&mut rx).await, 7);
        assert_eq!(consumer.publish_count(), 2);
    }

    #[tokio::test]
    async fn test_error_keeps_last_good_view() {
        let h = Harness::signed_in();
        let mut consumer = h.consumer();
        let mut rx = consumer.watch();
        consumer.activate(counter("visits"));

        h.gateway.push(0, Ok(count_snapshot("visits", 42)));
        assert_eq!(next_view(&mut rx).await, 42);

        h.gateway.push(0, Err(GatewayError::Unavailable("offline".to_string())));
        settle().await;

        assert_eq!(consumer.view(), 42);
        assert_eq!(consumer.state(), FeedState::Live);
        assert_eq!(consumer.publish_count(), 1);
    }

    #[tokio::test]
    async fn test_error_before_data_leaves_loading() {
        let h = Harness::signed_in();
        let mut consumer = h.consumer();
        let mut rx = consumer.watch();
        consumer.activate(counter("visits"));
        assert!(consumer.state().is_loading());

        h.gateway.push(0, Err(GatewayError::PermissionDenied("rules".to_string())));
        assert_eq!(next_view(&mut rx).await, 0);
        assert_eq!(consumer.state(), FeedState::Live);
    }

    #[tokio::test]
    async fn test_no_publish_after_release() {
        let h = Harness::signed_in();
        let mut consumer = h.consumer();
        consumer.activate(counter("visits"));

        consumer.deactivate();
        assert_eq!(consumer.state(), FeedState::Released);
        assert_eq!(h.gateway.teardowns(0), 1);

        // The backend keeps talking after teardown
        h.gateway.push(0, Ok(count_snapshot("visits", 99)));
        settle().await;

        assert_eq!(consumer.publish_count(), 0);
        assert_eq!(consumer.view(), -1);
        assert!(h.registry.is_empty());
    }

    #[tokio::test]
    async fn test_reconfigure_switches_keys() {
        let h = Harness::signed_in();
        let mut consumer = h.consumer();
        let normal = SubscriptionKey::new("activity-normal");
        let extended = SubscriptionKey::new("activity-extended");

        consumer.activate(CounterFeed {
            name: "activity",
            mode: Some("normal"),
        });
        assert!(h.registry.is_active(&normal));

        consumer.reconfigure(CounterFeed {
            name: "activity",
            mode: Some("extended"),
        });

        assert_eq!(h.gateway.teardowns(0), 1);
        assert_eq!(h.gateway.teardowns(1), 0);
        assert!(!h.registry.is_active(&normal));
        assert!(h.registry.is_active(&extended));
        assert_eq!(consumer.key(), Some(&extended));
    }

    #[tokio::test]
    async fn test_reconfigure_inactive_consumer_does_not_subscribe() {
        let h = Harness::signed_in();
        let mut consumer = h.consumer();

        let state = consumer.reconfigure(CounterFeed {
            name: "activity",
            mode: Some("extended"),
        });
        assert_eq!(state, FeedState::Idle);
        assert_eq!(h.gateway.subscriptions(), 0);
        assert!(h.registry.is_empty());

        consumer.activate(counter("visits"));
        consumer.deactivate();
        assert_eq!(consumer.reconfigure(counter("other")), FeedState::Released);
        assert_eq!(h.gateway.subscriptions(), 1);
        assert!(h.registry.is_empty());
    }

    #[tokio::test]
    async fn test_reconfigure_after_registry_flush_stays_released() {
        let h = Harness::signed_in();
        let mut consumer = h.consumer();
        consumer.activate(counter("visits"));

        h.registry.release_all();
        assert_eq!(consumer.reconfigure(counter("other")), FeedState::Released);
        assert_eq!(h.gateway.subscriptions(), 1);
        assert!(h.registry.is_empty());
    }

    #[tokio::test]
    async fn test_reregister_same_key_does_not_leak() {
        let h = Harness::signed_in();
        let mut first = h.consumer();
        let mut second = h.consumer();

        first.activate(counter("visits"));
        second.activate(counter("visits"));

        // Second registration tore the first subscription down
        assert_eq!(h.gateway.teardowns(0), 1);
        assert_eq!(first.state(), FeedState::Released);
        assert_eq!(h.registry.len(), 1);

        // Dropping the superseded consumer leaves the live entry alone
        drop(first);
        assert!(h.registry.is_active(&SubscriptionKey::new("visits")));
        assert_eq!(h.gateway.teardowns(1), 0);

        drop(second);
        assert_eq!(h.gateway.teardowns(1), 1);
        assert!(h.registry.is_empty());
    }

    #[tokio::test]
    async fn test_setup_failure_recorded() {
        let h = Harness::signed_in();
        h.gateway
            .fail_subscribe(GatewayError::InvalidQuery("bad path".to_string()));
        let mut consumer = h.consumer();

        assert_eq!(consumer.activate(counter("visits")), FeedState::Unavailable);
        assert_eq!(consumer.view(), 0);
        assert!(matches!(
            consumer.setup_error(),
            Some(FeedError::Setup { .. })
        ));
        assert!(h.registry.is_empty());
    }

    #[tokio::test]
    async fn test_registry_flush_revokes_consumer() {
        let h = Harness::signed_in();
        let mut consumer = h.consumer();
        consumer.activate(counter("visits"));

        h.registry.release_all();
        assert_eq!(consumer.state(), FeedState::Released);
        assert_eq!(h.gateway.teardowns(0), 1);

        h.gateway.push(0, Ok(count_snapshot("visits", 5)));
        settle().await;
        assert_eq!(consumer.publish_count(), 0);
    }

    #[tokio::test]
    async fn test_initializer_writes_missing_document() {
        let h = Harness::signed_in();
        let mut consumer = h.consumer();
        let mut rx = consumer.watch();
        consumer.activate(counter("visits"));

        h.gateway.push(
            0,
            Ok(Snapshot::Document(DocumentSnapshot {
                reference: DocumentRef::new("counters", "visits"),
                data: None,
            })),
        );
        assert_eq!(next_view(&mut rx).await, 0);

        let mutations = h.gateway.mutations();
        assert_eq!(mutations.len(), 1);
        assert_eq!(mutations[0].0, DocumentRef::new("counters", "visits"));
    }
}
