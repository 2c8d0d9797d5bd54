//! Subscription keys

use serde::{Deserialize, Serialize};
use std::fmt;

/// Logical identity of a subscription slot
///
/// Keys are stable across remounts of the same logical consumer, so a
/// consumer that comes back registers under the key it used before.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionKey(String);

impl SubscriptionKey {
    /// Create a key from any string
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Derive a key from a consumer identity and an optional qualifier
    ///
    /// `derive("activity", Some("extended"))` yields `activity-extended`;
    /// without a qualifier the identity is used as is.
    pub fn derive(identity: &str, qualifier: Option<&str>) -> Self {
        match qualifier {
            Some(q) if !q.is_empty() => Self(format!("{}-{}", identity, q)),
            _ => Self(identity.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubscriptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SubscriptionKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for SubscriptionKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive() {
        assert_eq!(
            SubscriptionKey::derive("activity", Some("extended")).as_str(),
            "activity-extended"
        );
        assert_eq!(SubscriptionKey::derive("stats", None).as_str(), "stats");
        assert_eq!(SubscriptionKey::derive("stats", Some("")).as_str(), "stats");
    }

    #[test]
    fn test_display() {
        let key: SubscriptionKey = "statsFeed".into();
        assert_eq!(key.to_string(), "statsFeed");
    }
}
