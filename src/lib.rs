//! # Dashsync
//!
//! Dashboard data sync - the subscription lifecycle core of a real-time
//! dashboard: a keyed registry of live subscriptions and the consumers that
//! turn backend snapshots into widget state.
//!
//! ## Features
//!
//! - **Exactly-once teardown**: At most one live subscription per key
//! - **Fail-safe**: Misbehaving teardowns are logged, never propagated
//! - **No late writes**: Snapshots arriving after teardown are dropped
//! - **Generic consumers**: One consumer drives every widget feed
//!
//! ## Modules
//!
//! - [`registry`]: Subscription lifecycle registry
//! - [`gateway`]: Backend surface and the in-memory gateway
//! - [`session`]: Session presence
//! - [`feed`]: Generic data-sync consumer
//! - [`widgets`]: Stats and activity feeds
//! - [`dashboard`]: Dashboard shell tying it together
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dashsync::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let gateway = Arc::new(MemoryGateway::new());
//!     let sessions = Arc::new(SessionStore::signed_in(Session::new("user-1")));
//!
//!     let registry = Arc::new(SubscriptionRegistry::new());
//!     let mut stats: FeedConsumer<StatsFeed> =
//!         FeedConsumer::new(registry.clone(), gateway, sessions, StatsView::default());
//!
//!     stats.activate(StatsFeed::default());
//!     let mut rx = stats.watch();
//!     rx.changed().await?;
//!
//!     for card in &rx.borrow().cards {
//!         println!("{}: {}", card.title, card.value);
//!     }
//!
//!     // Graceful shutdown
//!     registry.release_all();
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod dashboard;
pub mod feed;
pub mod gateway;
pub mod registry;
pub mod session;
pub mod widgets;

// Re-export top-level types for convenience
pub use registry::{
    Registration, SubscriptionKey, SubscriptionRegistry, TeardownError, TeardownHandle,
};

pub use gateway::{
    CollectionQuery, Direction, DocumentRef, Gateway, GatewayError, MemoryGateway, Mutation,
    Query, Snapshot, Subscription,
};

pub use session::{Session, SessionProvider, SessionStore};

pub use feed::{Feed, FeedConsumer, FeedError, FeedState};

pub use widgets::{
    ActivityFeed, ActivityKind, ActivityLog, AnalyticsStat, StatCard, StatKind, StatsFeed,
    StatsView, WidgetError,
};

pub use dashboard::Dashboard;

pub use config::{Config, ConfigError, DashboardConfig, FeedsConfig, LoggingConfig};
