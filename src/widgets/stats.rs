//! Dashboard statistics feed
//!
//! Watches the single analytics document and renders it as four stat cards:
//! revenue (currency), active users and active sessions (integers) and
//! conversion rate (percentage).

use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use serde_json::Value;

use super::activity::{log_activity, ActivityKind, NewActivity};
use super::format::{format_currency, format_integer, format_percentage};
use super::WidgetError;
use crate::feed::Feed;
use crate::gateway::{
    server_timestamp, DocumentRef, Fields, Gateway, Mutation, Query, Snapshot,
};
use crate::session::SessionProvider;

/// Raw analytics counters as stored in the backend
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalyticsStat {
    pub revenue: f64,
    pub active_users: f64,
    pub active_sessions: f64,
    pub conversion_rate: f64,
    pub timestamp: DateTime<Utc>,
}

impl AnalyticsStat {
    /// All counters at zero, stamped now
    pub fn zero() -> Self {
        Self {
            revenue: 0.0,
            active_users: 0.0,
            active_sessions: 0.0,
            conversion_rate: 0.0,
            timestamp: Utc::now(),
        }
    }

    /// Read counters from document fields
    ///
    /// Missing or non-numeric counters read as 0; a missing timestamp reads
    /// as now.
    pub fn from_fields(fields: &Fields) -> Self {
        let number = |name: &str| fields.get(name).and_then(Value::as_f64).unwrap_or(0.0);

        Self {
            revenue: number("revenue"),
            active_users: number("activeUsers"),
            active_sessions: number("activeSessions"),
            conversion_rate: number("conversionRate"),
            timestamp: fields
                .get("timestamp")
                .and_then(Value::as_i64)
                .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
                .unwrap_or_else(Utc::now),
        }
    }

    /// Fields written when the document is first created
    fn initial_fields() -> Fields {
        let mut fields = Fields::new();
        fields.insert("revenue".to_string(), Value::from(0));
        fields.insert("activeUsers".to_string(), Value::from(0));
        fields.insert("activeSessions".to_string(), Value::from(0));
        fields.insert("conversionRate".to_string(), Value::from(0));
        fields.insert("timestamp".to_string(), server_timestamp());
        fields
    }
}

/// Which counter a card shows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatKind {
    Revenue,
    ActiveUsers,
    ActiveSessions,
    ConversionRate,
}

impl StatKind {
    pub const ALL: [StatKind; 4] = [
        StatKind::Revenue,
        StatKind::ActiveUsers,
        StatKind::ActiveSessions,
        StatKind::ConversionRate,
    ];

    pub fn title(&self) -> &'static str {
        match self {
            StatKind::Revenue => "Total Revenue",
            StatKind::ActiveUsers => "Active Users",
            StatKind::ActiveSessions => "Active Sessions",
            StatKind::ConversionRate => "Conversion Rate",
        }
    }

    fn description(&self) -> &'static str {
        match self {
            StatKind::Revenue => "Revenue recorded to date",
            StatKind::ActiveUsers => "Users active right now",
            StatKind::ActiveSessions => "Sessions currently open",
            StatKind::ConversionRate => "Visitors who converted",
        }
    }
}

/// One rendered stat card
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatCard {
    pub kind: StatKind,
    pub title: String,
    pub value: String,
    pub description: String,
}

impl StatCard {
    fn new(kind: StatKind, stat: &AnalyticsStat) -> Self {
        let value = match kind {
            StatKind::Revenue => format_currency(stat.revenue),
            StatKind::ActiveUsers => format_integer(stat.active_users),
            StatKind::ActiveSessions => format_integer(stat.active_sessions),
            StatKind::ConversionRate => format_percentage(stat.conversion_rate),
        };

        Self {
            kind,
            title: kind.title().to_string(),
            value,
            description: kind.description().to_string(),
        }
    }
}

/// View state of the stats widget
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsView {
    pub stat: AnalyticsStat,
    pub cards: Vec<StatCard>,
}

impl StatsView {
    pub fn from_stat(stat: AnalyticsStat) -> Self {
        let cards = StatKind::ALL
            .iter()
            .map(|kind| StatCard::new(*kind, &stat))
            .collect();
        Self { stat, cards }
    }

    pub fn card(&self, kind: StatKind) -> Option<&StatCard> {
        self.cards.iter().find(|c| c.kind == kind)
    }
}

impl Default for StatsView {
    fn default() -> Self {
        Self::from_stat(AnalyticsStat::zero())
    }
}

/// Feed over the analytics document
#[derive(Debug, Clone)]
pub struct StatsFeed {
    document: DocumentRef,
}

impl StatsFeed {
    pub fn new(document: DocumentRef) -> Self {
        Self { document }
    }

    pub fn document(&self) -> &DocumentRef {
        &self.document
    }
}

impl Default for StatsFeed {
    fn default() -> Self {
        Self::new(DocumentRef::new("analytics", "stats"))
    }
}

impl Feed for StatsFeed {
    type View = StatsView;

    fn identity(&self) -> &str {
        "statsFeed"
    }

    fn query(&self) -> Query {
        Query::Document(self.document.clone())
    }

    fn project(&self, snapshot: &Snapshot) -> StatsView {
        match snapshot.as_document().and_then(|d| d.data.as_ref()) {
            Some(fields) => StatsView::from_stat(AnalyticsStat::from_fields(fields)),
            None => StatsView::default(),
        }
    }

    fn empty_view(&self) -> StatsView {
        StatsView::default()
    }

    fn initializer(&self, snapshot: &Snapshot) -> Option<(DocumentRef, Mutation)> {
        let doc = snapshot.as_document()?;
        if doc.exists() {
            return None;
        }
        Some((doc.reference.clone(), Mutation::Set(AnalyticsStat::initial_fields())))
    }
}

/// Parse a revenue amount typed by the user
pub fn parse_amount(input: &str) -> Result<f64, WidgetError> {
    let amount: f64 = input
        .trim()
        .parse()
        .map_err(|_| WidgetError::InvalidAmount(input.to_string()))?;
    validate_amount(amount)?;
    Ok(amount)
}

fn validate_amount(amount: f64) -> Result<(), WidgetError> {
    if !amount.is_finite() || amount < 0.0 {
        return Err(WidgetError::InvalidAmount(amount.to_string()));
    }
    Ok(())
}

/// Add revenue to the analytics document and record the change
///
/// The activity entry is best effort: its failure is logged, not returned.
pub async fn add_revenue(
    gateway: &dyn Gateway,
    sessions: &dyn SessionProvider,
    stats: &DocumentRef,
    activity_collection: &str,
    amount: f64,
) -> Result<(), WidgetError> {
    validate_amount(amount)?;

    gateway
        .mutate(stats, Mutation::increment("revenue", amount))
        .await?;
    tracing::info!(document = %stats, amount, "Revenue added");

    log_activity(
        gateway,
        sessions,
        activity_collection,
        NewActivity::new(
            "Revenue Added",
            format!("Added ${:.2} in revenue", amount),
            ActivityKind::Activity,
        ),
    )
    .await;

    Ok(())
}
