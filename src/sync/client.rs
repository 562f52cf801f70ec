use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

use crate::sync::query::Query;

/// Terminal failure of a query, surfaced as data on the result tuple —
/// never across the component boundary as a panic. Retry policy belongs to
/// the client implementation, not to callers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    #[error("unknown collection: {0}")]
    UnknownCollection(String),
    #[error("storage: {0}")]
    Storage(String),
}

impl From<rusqlite::Error> for SyncError {
    fn from(e: rusqlite::Error) -> Self {
        SyncError::Storage(e.to_string())
    }
}

/// One reactive snapshot of a query: entities keyed by id (iteration order
/// carries no meaning), plus the fetch-state flags.
#[derive(Debug, Clone, Default)]
pub struct QueryResult {
    pub results: BTreeMap<String, Value>,
    /// Any data, local or remote, still in flight.
    pub fetching: bool,
    /// Specifically awaiting server confirmation.
    pub fetching_remote: bool,
    pub error: Option<SyncError>,
}

impl QueryResult {
    /// State before the first snapshot has arrived.
    pub fn loading() -> Self {
        QueryResult {
            results: BTreeMap::new(),
            fetching: true,
            fetching_remote: true,
            error: None,
        }
    }
}

/// Snapshot callback. Invocations may come from outside the GTK main
/// context; UI listeners hop back via a glib channel.
pub type Listener = Arc<dyn Fn(QueryResult) + Send + Sync>;

/// A live query registration. Dropping it unsubscribes the listener, so a
/// subscription never outlives the UI element that owns it.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Subscription {
            cancel: Some(Box::new(cancel)),
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

/// The narrow seam to the sync engine. Reads are reactive subscriptions;
/// writes are fire-and-forget mutation entry points whose effects come back
/// through the subscriptions.
pub trait SyncClient: Send + Sync {
    /// Register a listener for `query`. The current snapshot is delivered
    /// before this returns; later snapshots follow each store change.
    fn subscribe(&self, query: Query, listener: Listener) -> Subscription;

    fn add_member(&self, user_id: &str, conversation_id: &str);

    fn remove_member(&self, user_id: &str, conversation_id: &str);

    fn send_message(&self, conversation_id: &str, sender_id: &str, text: &str);
}
