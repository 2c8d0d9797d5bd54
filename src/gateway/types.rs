//! Gateway data types
//!
//! Queries, snapshots and mutations exchanged with the remote data gateway.
//! Document bodies are plain `serde_json` maps; the gateway owns their shape.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

use super::error::GatewayError;

/// Field map of one document
pub type Fields = Map<String, Value>;

/// Reference to a single document: `collection/id`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentRef {
    pub collection: String,
    pub id: String,
}

impl DocumentRef {
    pub fn new(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            id: id.into(),
        }
    }

    /// `collection/id` form
    pub fn path(&self) -> String {
        format!("{}/{}", self.collection, self.id)
    }
}

impl fmt::Display for DocumentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

impl FromStr for DocumentRef {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('/') {
            Some((collection, id))
                if !collection.is_empty() && !id.is_empty() && !id.contains('/') =>
            {
                Ok(Self::new(collection, id))
            }
            _ => Err(GatewayError::InvalidQuery(format!(
                "document path must look like 'collection/id', got '{}'",
                s
            ))),
        }
    }
}

/// Sort direction for collection queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Asc,
    Desc,
}

/// Ordering clause of a collection query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBy {
    pub field: String,
    pub direction: Direction,
}

/// Query over a whole collection
///
/// When `order_by` is set, documents lacking that field are excluded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionQuery {
    pub collection: String,
    pub order_by: Option<OrderBy>,
    pub limit: Option<usize>,
}

impl CollectionQuery {
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            order_by: None,
            limit: None,
        }
    }

    /// Builder method: order results by a field
    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order_by = Some(OrderBy {
            field: field.into(),
            direction,
        });
        self
    }

    /// Builder method: cap the number of results
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// What a subscription or one-shot read watches
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Query {
    /// A single document
    Document(DocumentRef),
    /// A collection, optionally ordered and limited
    Collection(CollectionQuery),
}

impl Query {
    /// Collection this query reads from
    pub fn collection(&self) -> &str {
        match self {
            Query::Document(r) => &r.collection,
            Query::Collection(q) => &q.collection,
        }
    }

    /// Whether a write to `target` can change this query's result
    pub fn is_affected_by(&self, target: &DocumentRef) -> bool {
        match self {
            Query::Document(r) => r == target,
            Query::Collection(q) => q.collection == target.collection,
        }
    }

    /// Reject queries no backend could serve
    pub fn validate(&self) -> Result<(), GatewayError> {
        if self.collection().is_empty() {
            return Err(GatewayError::InvalidQuery("empty collection name".to_string()));
        }
        match self {
            Query::Document(r) if r.id.is_empty() => {
                Err(GatewayError::InvalidQuery("empty document id".to_string()))
            }
            Query::Collection(CollectionQuery { limit: Some(0), .. }) => {
                Err(GatewayError::InvalidQuery("limit must be at least 1".to_string()))
            }
            Query::Collection(CollectionQuery {
                order_by: Some(o), ..
            }) if o.field.is_empty() => {
                Err(GatewayError::InvalidQuery("empty order_by field".to_string()))
            }
            _ => Ok(()),
        }
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Query::Document(r) => write!(f, "doc({})", r),
            Query::Collection(q) => {
                write!(f, "collection({})", q.collection)?;
                if let Some(o) = &q.order_by {
                    write!(f, " order by {} {:?}", o.field, o.direction)?;
                }
                if let Some(limit) = q.limit {
                    write!(f, " limit {}", limit)?;
                }
                Ok(())
            }
        }
    }
}

/// A document with its id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub data: Fields,
}

impl Document {
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.data.get(field)
    }
}

/// State of one watched document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentSnapshot {
    pub reference: DocumentRef,
    /// `None` when the document does not exist
    pub data: Option<Fields>,
}

impl DocumentSnapshot {
    pub fn exists(&self) -> bool {
        self.data.is_some()
    }
}

/// Result of a collection query, already ordered and limited
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct QuerySnapshot {
    pub docs: Vec<Document>,
}

impl QuerySnapshot {
    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }
}

/// One full data state delivered by the gateway
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Snapshot {
    Document(DocumentSnapshot),
    Query(QuerySnapshot),
}

impl Snapshot {
    pub fn as_document(&self) -> Option<&DocumentSnapshot> {
        match self {
            Snapshot::Document(d) => Some(d),
            Snapshot::Query(_) => None,
        }
    }

    pub fn as_query(&self) -> Option<&QuerySnapshot> {
        match self {
            Snapshot::Query(q) => Some(q),
            Snapshot::Document(_) => None,
        }
    }
}

/// Patch operation on one field
#[derive(Debug, Clone, PartialEq)]
pub enum FieldUpdate {
    /// Overwrite the field
    Set(Value),
    /// Add to a numeric field; a missing or non-numeric field counts as 0
    Increment(f64),
    /// Set the field to the gateway's current time (Unix millis)
    ServerTimestamp,
}

/// Write applied to one document
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    /// Create or fully replace the document
    Set(Fields),
    /// Patch an existing document; fails with `NotFound` if it is missing
    Update(Vec<(String, FieldUpdate)>),
    /// Remove the document
    Delete,
}

impl Mutation {
    /// Single-field increment patch
    pub fn increment(field: impl Into<String>, amount: f64) -> Self {
        Mutation::Update(vec![(field.into(), FieldUpdate::Increment(amount))])
    }
}

const SERVER_TIMESTAMP_KEY: &str = ".sv";
const SERVER_TIMESTAMP_VALUE: &str = "timestamp";

/// Placeholder resolved to the gateway's clock when a document is written
pub fn server_timestamp() -> Value {
    let mut placeholder = Map::new();
    placeholder.insert(
        SERVER_TIMESTAMP_KEY.to_string(),
        Value::String(SERVER_TIMESTAMP_VALUE.to_string()),
    );
    Value::Object(placeholder)
}

/// Whether `value` is the [`server_timestamp`] placeholder
pub fn is_server_timestamp(value: &Value) -> bool {
    value
        .as_object()
        .filter(|o| o.len() == 1)
        .and_then(|o| o.get(SERVER_TIMESTAMP_KEY))
        .and_then(Value::as_str)
        == Some(SERVER_TIMESTAMP_VALUE)
}
