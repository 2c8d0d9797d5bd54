//! Recent activity feed
//!
//! Lists the newest activity log entries, newest first. The extended
//! variant shows a longer list and is a separate logical subscription.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::feed::Feed;
use crate::gateway::{
    server_timestamp, CollectionQuery, Direction, Document, DocumentRef, Fields, Gateway,
    Query, Snapshot,
};
use crate::session::SessionProvider;

/// Default number of entries in the normal feed
pub const DEFAULT_LIMIT: usize = 5;

/// Default number of entries in the extended feed
pub const DEFAULT_EXTENDED_LIMIT: usize = 10;

/// Category of an activity entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityKind {
    User,
    Activity,
    Calendar,
}

impl ActivityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityKind::User => "user",
            ActivityKind::Activity => "activity",
            ActivityKind::Calendar => "calendar",
        }
    }
}

impl fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActivityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" => Ok(ActivityKind::User),
            "activity" => Ok(ActivityKind::Activity),
            "calendar" => Ok(ActivityKind::Calendar),
            other => Err(format!("unknown activity type '{}'", other)),
        }
    }
}

/// One entry of the activity log
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActivityLog {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub description: String,
    pub timestamp: DateTime<Utc>,
    pub kind: ActivityKind,
}

impl ActivityLog {
    /// Decode a stored document
    ///
    /// Returns `None` when the timestamp is missing or not a timestamp.
    /// Unknown types read as [`ActivityKind::Activity`].
    pub fn from_document(doc: &Document) -> Option<Self> {
        let timestamp = doc
            .get("timestamp")
            .and_then(Value::as_i64)
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())?;

        let text = |name: &str| {
            doc.get(name)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };

        let kind = doc
            .get("type")
            .and_then(Value::as_str)
            .and_then(|s| s.parse().ok())
            .unwrap_or(ActivityKind::Activity);

        Some(Self {
            id: doc.id.clone(),
            user_id: text("userId"),
            title: text("title"),
            description: text("description"),
            timestamp,
            kind,
        })
    }

    /// Short relative age, e.g. `3h ago`
    pub fn age(&self, now: DateTime<Utc>) -> String {
        let secs = (now - self.timestamp).num_seconds().max(0);
        match secs {
            0..=59 => "just now".to_string(),
            60..=3599 => format!("{}m ago", secs / 60),
            3600..=86_399 => format!("{}h ago", secs / 3600),
            _ => format!("{}d ago", secs / 86_400),
        }
    }
}

/// Feed over the activity log collection
#[derive(Debug, Clone)]
pub struct ActivityFeed {
    collection: String,
    extended: bool,
    limit: usize,
}

impl ActivityFeed {
    /// Normal feed over `collection` with the default limit
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            extended: false,
            limit: DEFAULT_LIMIT,
        }
    }

    /// Extended feed over `collection` with the default extended limit
    pub fn extended(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            extended: true,
            limit: DEFAULT_EXTENDED_LIMIT,
        }
    }

    /// Builder method: override the entry limit
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn is_extended(&self) -> bool {
        self.extended
    }
}

impl Feed for ActivityFeed {
    type View = Vec<ActivityLog>;

    fn identity(&self) -> &str {
        "activity"
    }

    fn qualifier(&self) -> Option<&str> {
        Some(if self.extended { "extended" } else { "normal" })
    }

    fn query(&self) -> Query {
        Query::Collection(
            CollectionQuery::new(self.collection.clone())
                .order_by("timestamp", Direction::Desc)
                .limit(self.limit),
        )
    }

    fn project(&self, snapshot: &Snapshot) -> Vec<ActivityLog> {
        snapshot
            .as_query()
            .map(|q| q.docs.iter().filter_map(ActivityLog::from_document).collect())
            .unwrap_or_default()
    }

    fn empty_view(&self) -> Vec<ActivityLog> {
        Vec::new()
    }
}

/// Activity to be recorded
#[derive(Debug, Clone)]
pub struct NewActivity {
    pub title: String,
    pub description: String,
    pub kind: ActivityKind,
}

impl NewActivity {
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        kind: ActivityKind,
    ) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            kind,
        }
    }
}

/// Record an activity for the signed-in user
///
/// Skipped without a session. Backend failures are logged and swallowed.
/// Returns the new document on success.
pub async fn log_activity(
    gateway: &dyn Gateway,
    sessions: &dyn SessionProvider,
    collection: &str,
    activity: NewActivity,
) -> Option<DocumentRef> {
    let Some(session) = sessions.current_session() else {
        tracing::info!(title = %activity.title, "No session, skipping activity logging");
        return None;
    };

    let mut fields = Fields::new();
    fields.insert("userId".to_string(), Value::from(session.user_id));
    fields.insert("title".to_string(), Value::from(activity.title.clone()));
    fields.insert("description".to_string(), Value::from(activity.description));
    fields.insert("type".to_string(), Value::from(activity.kind.as_str()));
    fields.insert("timestamp".to_string(), server_timestamp());

    match gateway.add(collection, fields).await {
        Ok(reference) => {
            tracing::info!(title = %activity.title, document = %reference, "Activity logged");
            Some(reference)
        }
        Err(e) => {
            tracing::error!(title = %activity.title, error = %e, "Failed to log activity");
            None
        }
    }
}
