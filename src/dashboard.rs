//! Dashboard Shell
//!
//! Owns the subscription registry and the two dashboard widgets. It mounts
//! the widgets while a session exists and tears them down when the session
//! ends or the dashboard shuts down.

use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

use crate::config::{ConfigError, DashboardConfig, FeedsConfig};
use crate::feed::{FeedConsumer, FeedState};
use crate::gateway::{DocumentRef, Gateway};
use crate::registry::SubscriptionRegistry;
use crate::session::SessionProvider;
use crate::widgets::{
    add_revenue, log_activity, ActivityFeed, ActivityKind, ActivityLog, NewActivity, StatsFeed,
    StatsView, WidgetError,
};

/// Protected dashboard: stats cards plus the activity feed
pub struct Dashboard {
    registry: Arc<SubscriptionRegistry>,
    gateway: Arc<dyn Gateway>,
    sessions: Arc<dyn SessionProvider>,
    feeds: FeedsConfig,
    stats_document: DocumentRef,
    widgets: Mutex<Widgets>,
}

struct Widgets {
    stats: FeedConsumer<StatsFeed>,
    activity: FeedConsumer<ActivityFeed>,
    extended: bool,
}

impl Dashboard {
    /// Build a dashboard with a fresh registry
    pub fn new(
        gateway: Arc<dyn Gateway>,
        sessions: Arc<dyn SessionProvider>,
        feeds: FeedsConfig,
        dashboard: &DashboardConfig,
    ) -> Result<Self, ConfigError> {
        feeds.validate()?;
        let stats_document = feeds.stats_document_ref()?;
        let registry = Arc::new(SubscriptionRegistry::new());

        let widgets = Widgets {
            stats: FeedConsumer::new(
                Arc::clone(&registry),
                Arc::clone(&gateway),
                Arc::clone(&sessions),
                StatsView::default(),
            ),
            activity: FeedConsumer::new(
                Arc::clone(&registry),
                Arc::clone(&gateway),
                Arc::clone(&sessions),
                Vec::new(),
            ),
            extended: dashboard.extended_activity,
        };

        Ok(Self {
            registry,
            gateway,
            sessions,
            feeds,
            stats_document,
            widgets: Mutex::new(widgets),
        })
    }

    pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.registry
    }

    /// Activate both widgets
    pub async fn mount(&self) -> (FeedState, FeedState) {
        let mut w = self.widgets.lock().await;
        let stats = w.stats.activate(StatsFeed::new(self.stats_document.clone()));
        let feed = self.activity_feed(w.extended);
        let activity = w.activity.activate(feed);
        tracing::info!(stats = %stats, activity = %activity, "Dashboard mounted");
        (stats, activity)
    }

    /// Deactivate both widgets
    pub async fn unmount(&self) {
        let mut w = self.widgets.lock().await;
        w.stats.deactivate();
        w.activity.deactivate();
        tracing::info!("Dashboard unmounted");
    }

    /// Switch the activity widget between normal and extended mode
    ///
    /// Takes effect immediately while mounted. Otherwise the mode is stored
    /// and used by the next `mount`.
    pub async fn set_extended_activity(&self, extended: bool) -> FeedState {
        let mut w = self.widgets.lock().await;
        w.extended = extended;
        let feed = self.activity_feed(extended);
        w.activity.reconfigure(feed)
    }

    pub async fn stats(&self) -> StatsView {
        self.widgets.lock().await.stats.view()
    }

    pub async fn activity(&self) -> Vec<ActivityLog> {
        self.widgets.lock().await.activity.view()
    }

    pub async fn states(&self) -> (FeedState, FeedState) {
        let w = self.widgets.lock().await;
        (w.stats.state(), w.activity.state())
    }

    /// Receivers for the widgets' views
    pub async fn watch(
        &self,
    ) -> (watch::Receiver<StatsView>, watch::Receiver<Vec<ActivityLog>>) {
        let w = self.widgets.lock().await;
        (w.stats.watch(), w.activity.watch())
    }

    /// Add revenue to the stats document
    pub async fn add_revenue(&self, amount: f64) -> Result<(), WidgetError> {
        add_revenue(
            self.gateway.as_ref(),
            self.sessions.as_ref(),
            &self.stats_document,
            &self.feeds.activity_collection,
            amount,
        )
        .await
    }

    /// Record an activity for the signed-in user
    pub async fn log_activity(
        &self,
        title: &str,
        description: &str,
        kind: ActivityKind,
    ) -> Option<DocumentRef> {
        log_activity(
            self.gateway.as_ref(),
            self.sessions.as_ref(),
            &self.feeds.activity_collection,
            NewActivity::new(title, description, kind),
        )
        .await
    }

    /// Follow session changes: mount on sign-in, unmount on sign-out
    ///
    /// A session already present when this is called mounts right away.
    /// With `release_on_sign_out` unset, sign-out leaves the feeds running.
    pub fn follow_sessions(self: &Arc<Self>, release_on_sign_out: bool) -> JoinHandle<()> {
        let dashboard = Arc::clone(self);
        let mut rx = self.sessions.watch();

        tokio::spawn(async move {
            let signed_in = rx.borrow_and_update().is_some();
            if signed_in {
                dashboard.mount().await;
            }

            while rx.changed().await.is_ok() {
                let signed_in = rx.borrow_and_update().is_some();
                if signed_in {
                    dashboard.mount().await;
                } else if release_on_sign_out {
                    dashboard.unmount().await;
                }
            }
            tracing::debug!("Session source closed");
        })
    }

    /// Release every live subscription
    pub async fn shutdown(&self) {
        self.unmount().await;
        let failures = self.registry.release_all();
        if failures > 0 {
            tracing::warn!(failures, "Some subscriptions failed to tear down");
        }
        tracing::info!("Dashboard shut down");
    }

    fn activity_feed(&self, extended: bool) -> ActivityFeed {
        if extended {
            ActivityFeed::extended(self.feeds.activity_collection.clone())
                .limit(self.feeds.activity_extended_limit)
        } else {
            ActivityFeed::new(self.feeds.activity_collection.clone())
                .limit(self.feeds.activity_limit)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::MemoryGateway;
    use crate::registry::SubscriptionKey;
    use crate::session::{Session, SessionStore};
    use crate::widgets::StatKind;
    use std::time::Duration;

    fn build(sessions: Arc<SessionStore>) -> (Arc<Dashboard>, Arc<MemoryGateway>) {
        let gateway = Arc::new(MemoryGateway::new());
        let dashboard = Dashboard::new(
            gateway.clone(),
            sessions,
            FeedsConfig::default(),
            &DashboardConfig::default(),
        )
        .unwrap();
        (Arc::new(dashboard), gateway)
    }

    async fn eventually<F: Fn() -> bool>(check: F) {
        tokio::time::timeout(Duration::from_secs(1), async {
            while !check() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached");
    }

    #[tokio::test]
    async fn test_mount_without_session() {
        let sessions = Arc::new(SessionStore::new());
        let (dashboard, gateway) = build(sessions);

        let states = dashboard.mount().await;
        assert_eq!(states, (FeedState::Unavailable, FeedState::Unavailable));
        assert!(dashboard.registry().is_empty());
        assert_eq!(gateway.listener_count(), 0);
        assert_eq!(
            dashboard.stats().await.card(StatKind::Revenue).unwrap().value,
            "$0.00"
        );
    }

    #[tokio::test]
    async fn test_revenue_flows_to_both_widgets() {
        let sessions = Arc::new(SessionStore::signed_in(Session::new("user-1")));
        let (dashboard, _gateway) = build(sessions);
        let (mut stats_rx, mut activity_rx) = dashboard.watch().await;

        dashboard.mount().await;
        assert!(dashboard.registry().is_active(&SubscriptionKey::new("statsFeed")));
        assert!(dashboard
            .registry()
            .is_active(&SubscriptionKey::new("activity-normal")));

        // The stats document only exists once the feed has initialized it
        tokio::time::timeout(Duration::from_secs(1), async {
            while dashboard.add_revenue(99.5).await.is_err() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        let stats = tokio::time::timeout(
            Duration::from_secs(1),
            stats_rx.wait_for(|v| v.stat.revenue > 0.0),
        )
        .await
        .unwrap()
        .unwrap()
        .clone();
        assert_eq!(stats.card(StatKind::Revenue).unwrap().value, "$99.50");

        let activity = tokio::time::timeout(
            Duration::from_secs(1),
            activity_rx.wait_for(|entries| !entries.is_empty()),
        )
        .await
        .unwrap()
        .unwrap()
        .clone();
        assert_eq!(activity[0].title, "Revenue Added");
        assert_eq!(activity[0].description, "Added $99.50 in revenue");

        dashboard.shutdown().await;
        assert!(dashboard.registry().is_empty());
    }

    #[tokio::test]
    async fn test_extended_toggle() {
        let sessions = Arc::new(SessionStore::signed_in(Session::new("user-1")));
        let (dashboard, gateway) = build(sessions);
        dashboard.mount().await;

        dashboard.set_extended_activity(true).await;
        let registry = dashboard.registry();
        assert!(!registry.is_active(&SubscriptionKey::new("activity-normal")));
        assert!(registry.is_active(&SubscriptionKey::new("activity-extended")));
        assert_eq!(gateway.listener_count(), 2);

        dashboard.shutdown().await;
        assert_eq!(gateway.listener_count(), 0);
    }

    #[tokio::test]
    async fn test_follow_sessions() {
        let sessions = Arc::new(SessionStore::new());
        let (dashboard, gateway) = build(Arc::clone(&sessions));
        let follower = dashboard.follow_sessions(true);

        sessions.sign_in(Session::new("user-1"));
        let registry = Arc::clone(dashboard.registry());
        eventually(|| registry.len() == 2).await;

        sessions.sign_out();
        eventually(|| registry.is_empty()).await;
        eventually(|| gateway.listener_count() == 0).await;
        assert_eq!(
            dashboard.states().await,
            (FeedState::Released, FeedState::Released)
        );

        follower.abort();
    }

    #[tokio::test]
    async fn test_follow_sessions_mounts_existing_session() {
        let sessions = Arc::new(SessionStore::signed_in(Session::new("user-1")));
        let (dashboard, gateway) = build(sessions);
        let follower = dashboard.follow_sessions(true);

        let registry = Arc::clone(dashboard.registry());
        eventually(|| registry.len() == 2).await;
        assert_eq!(gateway.listener_count(), 2);

        dashboard.shutdown().await;
        follower.abort();
    }

    #[tokio::test]
    async fn test_extended_toggle_before_mount_is_deferred() {
        let sessions = Arc::new(SessionStore::signed_in(Session::new("user-1")));
        let (dashboard, gateway) = build(sessions);

        assert_eq!(dashboard.set_extended_activity(true).await, FeedState::Idle);
        assert!(dashboard.registry().is_empty());
        assert_eq!(gateway.listener_count(), 0);

        // The stored mode applies on mount
        dashboard.mount().await;
        let registry = dashboard.registry();
        assert!(registry.is_active(&SubscriptionKey::new("activity-extended")));
        assert!(!registry.is_active(&SubscriptionKey::new("activity-normal")));

        dashboard.shutdown().await;
        assert_eq!(gateway.listener_count(), 0);
    }

    #[tokio::test]
    async fn test_extended_toggle_after_shutdown_opens_nothing() {
        let sessions = Arc::new(SessionStore::signed_in(Session::new("user-1")));
        let (dashboard, gateway) = build(sessions);
        dashboard.mount().await;
        dashboard.shutdown().await;

        assert_eq!(
            dashboard.set_extended_activity(true).await,
            FeedState::Released
        );
        assert!(dashboard.registry().is_empty());
        assert_eq!(gateway.listener_count(), 0);

        dashboard.unmount().await;
        assert_eq!(
            dashboard.set_extended_activity(false).await,
            FeedState::Released
        );
        assert!(dashboard.registry().is_empty());
        assert_eq!(gateway.listener_count(), 0);
    }
}
