//! Dashboard Widgets
//!
//! Feed definitions and write-side operations for the dashboard widgets:
//!
//! - [`StatsFeed`]: four stat cards over the analytics document
//! - [`ActivityFeed`]: recent activity, in normal and extended variants
//! - [`add_revenue`] / [`log_activity`]: writes issued by the dashboard

mod activity;
mod format;
mod stats;

pub use activity::{
    log_activity, ActivityFeed, ActivityKind, ActivityLog, NewActivity, DEFAULT_EXTENDED_LIMIT,
    DEFAULT_LIMIT,
};
pub use format::{format_currency, format_integer, format_percentage};
pub use stats::{add_revenue, parse_amount, AnalyticsStat, StatCard, StatKind, StatsFeed, StatsView};

use thiserror::Error;

use crate::gateway::GatewayError;

/// Errors from widget write operations
#[derive(Error, Debug)]
pub enum WidgetError {
    /// Amount is negative, not a number, or not finite
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Gateway rejected the write
    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),
}
