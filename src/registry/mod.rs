//! Subscription Lifecycle Registry
//!
//! Single source of truth for which real-time subscriptions are live.
//!
//! ## Architecture
//!
//! - **SubscriptionKey**: Logical identity of a subscription slot
//! - **TeardownHandle**: One-shot, idempotent "stop delivering" operation
//! - **SubscriptionRegistry**: Key → handle table with last-writer-wins
//!   replacement and fail-safe teardown
//!
//! ## Example
//!
//! ```rust
//! use dashsync::registry::{SubscriptionKey, SubscriptionRegistry, TeardownHandle};
//!
//! let registry = SubscriptionRegistry::new();
//! let key = SubscriptionKey::new("statsFeed");
//!
//! registry.register(key.clone(), TeardownHandle::from_fn(|| println!("stopped")));
//! assert!(registry.is_active(&key));
//!
//! registry.release(&key);
//! assert!(!registry.is_active(&key));
//! ```

mod handle;
mod key;
mod table;

pub use handle::{TeardownError, TeardownHandle};
pub use key::SubscriptionKey;
pub use table::{Registration, SubscriptionRegistry};
