//! Session surface
//!
//! Consumers only check whether an authenticated session is present. The
//! hosted auth provider sits behind [`SessionProvider`]; [`SessionStore`] is
//! the in-process implementation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Proof of an authenticated identity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub user_id: String,
    pub email: Option<String>,
    pub signed_in_at: DateTime<Utc>,
}

impl Session {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            email: None,
            signed_in_at: Utc::now(),
        }
    }

    /// Builder method: set the account email
    pub fn email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }
}

/// Source of the current session
pub trait SessionProvider: Send + Sync {
    /// The signed-in session, if any
    fn current_session(&self) -> Option<Session>;

    /// Receiver notified on every sign-in and sign-out
    ///
    /// Dropping the receiver stops notifications.
    fn watch(&self) -> watch::Receiver<Option<Session>>;
}

/// In-process session holder
pub struct SessionStore {
    tx: watch::Sender<Option<Session>>,
}

impl SessionStore {
    /// Create a store with nobody signed in
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx }
    }

    /// Create a store that starts signed in
    pub fn signed_in(session: Session) -> Self {
        let store = Self::new();
        store.sign_in(session);
        store
    }

    pub fn sign_in(&self, session: Session) {
        tracing::info!(user_id = %session.user_id, "Signed in");
        self.tx.send_replace(Some(session));
    }

    pub fn sign_out(&self) {
        if let Some(previous) = self.tx.send_replace(None) {
            tracing::info!(user_id = %previous.user_id, "Signed out");
        }
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionProvider for SessionStore {
    fn current_session(&self) -> Option<Session> {
        self.tx.borrow().clone()
    }

    fn watch(&self) -> watch::Receiver<Option<Session>> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_in_out() {
        let store = SessionStore::new();
        assert!(store.current_session().is_none());

        store.sign_in(Session::new("user-1").email("a@example.com"));
        let session = store.current_session().unwrap();
        assert_eq!(session.user_id, "user-1");
        assert_eq!(session.email.as_deref(), Some("a@example.com"));

        store.sign_out();
        assert!(store.current_session().is_none());
    }

    #[tokio::test]
    async fn test_watch_notifies() {
        let store = SessionStore::new();
        let mut rx = store.watch();

        store.sign_in(Session::new("user-2"));
        rx.changed().await.unwrap();
        assert_eq!(
            rx.borrow_and_update().as_ref().map(|s| s.user_id.clone()),
            Some("user-2".to_string())
        );

        store.sign_out();
        rx.changed().await.unwrap();
        assert!(rx.borrow().is_none());
    }
}
