//! Reactive bindings between declarative queries and the UI.
//!
//! Each function here mirrors one view of the data the windows render: the
//! searchable conversation list, a single conversation with its member info,
//! the last-message snippet, the confirmed/pending message split, and the
//! invitable (non-member) users. Handles keep their subscription alive;
//! dropping a handle unsubscribes it.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use crate::sync::client::{Listener, QueryResult, Subscription, SyncClient, SyncError};
use crate::sync::models::{self, Conversation, Message, User};
use crate::sync::query::{query, Direction, Query, SyncStatus};

/// Change signal invoked on every new snapshot, possibly off the UI thread.
pub type Notify = Arc<dyn Fn() + Send + Sync>;

pub fn no_notify() -> Notify {
    Arc::new(|| {})
}

/// Notify that hops onto the GTK main context; the widget side drains the
/// receiver and re-reads its handles' snapshots there.
pub fn glib_notify(tx: &glib::Sender<()>) -> Notify {
    let tx = Mutex::new(tx.clone());
    Arc::new(move || {
        if let Ok(tx) = tx.lock() {
            let _ = tx.send(());
        }
    })
}

/// A bound query: holds the latest snapshot and the live subscription.
pub struct LiveQuery {
    state: Arc<Mutex<QueryResult>>,
    _sub: Subscription,
}

impl LiveQuery {
    fn bind(client: &dyn SyncClient, query: Query, notify: Notify) -> Self {
        let state = Arc::new(Mutex::new(QueryResult::loading()));
        let shared = Arc::clone(&state);
        let listener: Listener = Arc::new(move |result| {
            *shared.lock().expect("query state poisoned") = result;
            notify();
        });
        let sub = client.subscribe(query, listener);
        LiveQuery { state, _sub: sub }
    }

    fn snapshot(&self) -> QueryResult {
        self.state.lock().expect("query state poisoned").clone()
    }
}

fn decode<T: DeserializeOwned>(results: &BTreeMap<String, Value>) -> BTreeMap<String, T> {
    results
        .iter()
        .filter_map(|(id, value)| {
            serde_json::from_value(value.clone())
                .ok()
                .map(|entity| (id.clone(), entity))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Conversation list (sidebar), filtered by a name substring.

pub struct ConversationList {
    live: LiveQuery,
}

pub struct ConversationsSnapshot {
    pub conversations: BTreeMap<String, Conversation>,
    pub fetching: bool,
    pub fetching_remote: bool,
    pub error: Option<SyncError>,
}

impl ConversationList {
    pub fn snapshot(&self) -> ConversationsSnapshot {
        let r = self.live.snapshot();
        ConversationsSnapshot {
            conversations: decode(&r.results),
            fetching: r.fetching,
            fetching_remote: r.fetching_remote,
            error: r.error,
        }
    }
}

/// Conversations whose name contains `search` (case-insensitive).
pub fn watch_filtered_conversations(
    client: &dyn SyncClient,
    search: &str,
    notify: Notify,
) -> ConversationList {
    let q = query(models::CONVERSATIONS).filter_like("name", &format!("%{search}%"));
    ConversationList {
        live: LiveQuery::bind(client, q, notify),
    }
}

// ---------------------------------------------------------------------------
// A single conversation with its member info joined in.

pub struct ConversationView {
    live: LiveQuery,
    id: String,
}

pub struct ConversationSnapshot {
    pub conversation: Option<Conversation>,
    pub fetching: bool,
    pub fetching_remote: bool,
    pub error: Option<SyncError>,
}

impl ConversationView {
    pub fn snapshot(&self) -> ConversationSnapshot {
        let r = self.live.snapshot();
        ConversationSnapshot {
            conversation: r
                .results
                .get(&self.id)
                .and_then(|v| serde_json::from_value(v.clone()).ok()),
            fetching: r.fetching,
            fetching_remote: r.fetching_remote,
            error: r.error,
        }
    }
}

pub fn watch_conversation(client: &dyn SyncClient, id: &str, notify: Notify) -> ConversationView {
    let q = query(models::CONVERSATIONS)
        .filter_eq("id", json!(id))
        .limit(1)
        .include("membersInfo");
    ConversationView {
        live: LiveQuery::bind(client, q, notify),
        id: id.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Last-message snippet for a conversation card.

pub struct SnippetView {
    live: LiveQuery,
}

impl SnippetView {
    /// Text of the most recent message, or `None` when there is none yet.
    pub fn text(&self) -> Option<String> {
        let r = self.live.snapshot();
        r.results
            .values()
            .next()
            .and_then(|v| v.get("text"))
            .and_then(Value::as_str)
            .map(String::from)
    }
}

pub fn conversation_snippet(client: &dyn SyncClient, convo_id: &str, notify: Notify) -> SnippetView {
    let q = query(models::MESSAGES)
        .filter_eq("conversationId", json!(convo_id))
        .order("created_at", Direction::Desc)
        .limit(1);
    SnippetView {
        live: LiveQuery::bind(client, q, notify),
    }
}

// ---------------------------------------------------------------------------
// Message list, split into delivered and pending subsets.

pub struct MessageList {
    confirmed: LiveQuery,
    pending: LiveQuery,
}

pub struct MessagesSnapshot {
    pub messages: BTreeMap<String, Message>,
    /// Locally-echoed messages not yet acknowledged. Empty until the pending
    /// subscription produces its first snapshot, so callers can always
    /// iterate it.
    pub pending: BTreeMap<String, Message>,
    pub fetching: bool,
    pub fetching_remote: bool,
    pub error: Option<SyncError>,
}

impl MessageList {
    pub fn snapshot(&self) -> MessagesSnapshot {
        let delivered = self.confirmed.snapshot();
        let pending = self.pending.snapshot();
        MessagesSnapshot {
            messages: decode(&delivered.results),
            pending: decode(&pending.results),
            fetching: delivered.fetching,
            fetching_remote: delivered.fetching_remote,
            error: delivered.error,
        }
    }
}

/// Two independent bindings derived from one base query; they share ordering
/// but notify separately — callers interleave for display as needed.
pub fn watch_messages(client: &dyn SyncClient, convo_id: &str, notify: Notify) -> MessageList {
    let base = query(models::MESSAGES)
        .filter_eq("conversationId", json!(convo_id))
        .order("created_at", Direction::Desc)
        .include("sender");
    let confirmed = LiveQuery::bind(
        client,
        base.clone().sync_status(SyncStatus::Confirmed),
        notify.clone(),
    );
    let pending = LiveQuery::bind(client, base.sync_status(SyncStatus::Pending), notify);
    MessageList { confirmed, pending }
}

// ---------------------------------------------------------------------------
// Users not yet in a conversation (the invite list).

pub struct UserList {
    live: LiveQuery,
}

pub struct UsersSnapshot {
    pub users: BTreeMap<String, User>,
    pub fetching: bool,
    pub fetching_remote: bool,
    pub error: Option<SyncError>,
}

impl UserList {
    pub fn snapshot(&self) -> UsersSnapshot {
        let r = self.live.snapshot();
        UsersSnapshot {
            users: decode(&r.results),
            fetching: r.fetching,
            fetching_remote: r.fetching_remote,
            error: r.error,
        }
    }
}

/// Users outside the conversation's member set. An absent conversation
/// degrades to an empty exclusion set (every user), not an error. The
/// exclusion list is fixed at bind time; callers re-bind when the member set
/// changes, as the membership dialog does.
pub fn watch_non_members(
    client: &dyn SyncClient,
    conversation: Option<&Conversation>,
    notify: Notify,
) -> UserList {
    let excluded: Vec<Value> = conversation
        .map(|c| c.members.iter().map(|id| json!(id)).collect())
        .unwrap_or_default();
    let q = query(models::USERS).filter_nin("id", excluded);
    UserList {
        live: LiveQuery::bind(client, q, notify),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::local::LocalClient;
    use std::collections::BTreeSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn user(id: &str, name: &str) -> User {
        User {
            id: id.to_string(),
            name: name.to_string(),
        }
    }

    fn convo(id: &str, name: &str, members: &[&str]) -> Conversation {
        Conversation {
            id: id.to_string(),
            name: name.to_string(),
            members: members.iter().map(|m| m.to_string()).collect(),
            members_info: None,
        }
    }

    fn message(id: &str, convo: &str, sender: &str, text: &str, at: i64) -> Message {
        Message {
            id: id.to_string(),
            conversation_id: convo.to_string(),
            sender_id: sender.to_string(),
            text: text.to_string(),
            created_at: at,
            sender: None,
        }
    }

    fn counter() -> (Notify, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let shared = Arc::clone(&count);
        let notify: Notify = Arc::new(move || {
            shared.fetch_add(1, Ordering::SeqCst);
        });
        (notify, count)
    }

    #[test]
    fn filtered_conversations_match_name_substring() {
        let client = LocalClient::in_memory();
        client.upsert_conversation(&convo("c1", "General", &[]));
        client.upsert_conversation(&convo("c2", "Off-topic", &[]));
        let list = watch_filtered_conversations(&client, "gen", no_notify());
        let snap = snapshotted(&list);
        assert!(snap.contains_key("c1"), "case-insensitive substring matches");
        assert!(!snap.contains_key("c2"));

        let exact = watch_filtered_conversations(&client, "Gener", no_notify());
        assert!(snapshotted(&exact).contains_key("c1"), "matching case matches too");
    }

    fn snapshotted(list: &ConversationList) -> BTreeMap<String, Conversation> {
        list.snapshot().conversations
    }

    #[test]
    fn empty_search_matches_every_conversation() {
        let client = LocalClient::in_memory();
        client.upsert_conversation(&convo("c1", "General", &[]));
        client.upsert_conversation(&convo("c2", "Off-topic", &[]));
        let list = watch_filtered_conversations(&client, "", no_notify());
        assert_eq!(list.snapshot().conversations.len(), 2);
    }

    #[test]
    fn conversation_list_updates_reactively() {
        let client = LocalClient::in_memory();
        let (notify, count) = counter();
        let list = watch_filtered_conversations(&client, "gen", notify);
        assert_eq!(list.snapshot().conversations.len(), 0);
        let before = count.load(Ordering::SeqCst);
        client.upsert_conversation(&convo("c1", "General", &[]));
        assert!(count.load(Ordering::SeqCst) > before);
        assert!(list.snapshot().conversations.contains_key("c1"));
    }

    #[test]
    fn dropping_a_handle_tears_the_subscription_down() {
        let client = LocalClient::in_memory();
        let (notify, count) = counter();
        let list = watch_filtered_conversations(&client, "", notify);
        drop(list);
        let before = count.load(Ordering::SeqCst);
        client.upsert_conversation(&convo("c1", "General", &[]));
        assert_eq!(count.load(Ordering::SeqCst), before);
    }

    #[test]
    fn watch_conversation_joins_member_info() {
        let client = LocalClient::in_memory();
        client.upsert_user(&user("u1", "Avery"));
        client.upsert_user(&user("u2", "Sam"));
        client.upsert_conversation(&convo("c1", "General", &["u1", "u2"]));
        let view = watch_conversation(&client, "c1", no_notify());
        let snap = view.snapshot();
        let convo = snap.conversation.unwrap();
        let info = convo.members_info.unwrap();
        assert_eq!(info.len(), 2);
        assert_eq!(info["u1"].name, "Avery");
        assert!(snap.error.is_none());
    }

    #[test]
    fn watch_conversation_on_missing_id_is_empty_not_an_error() {
        let client = LocalClient::in_memory();
        let view = watch_conversation(&client, "nope", no_notify());
        let snap = view.snapshot();
        assert!(snap.conversation.is_none());
        assert!(snap.error.is_none());
    }

    #[test]
    fn snippet_is_the_newest_message_text() {
        let client = LocalClient::in_memory();
        client.insert_message(&message("m1", "c1", "u1", "first", 10), SyncStatus::Confirmed);
        client.insert_message(&message("m2", "c1", "u1", "latest", 20), SyncStatus::Confirmed);
        client.insert_message(&message("m3", "c2", "u1", "elsewhere", 30), SyncStatus::Confirmed);
        let snippet = conversation_snippet(&client, "c1", no_notify());
        assert_eq!(snippet.text().as_deref(), Some("latest"));
    }

    #[test]
    fn snippet_is_absent_without_messages() {
        let client = LocalClient::in_memory();
        let snippet = conversation_snippet(&client, "c1", no_notify());
        assert_eq!(snippet.text(), None);
    }

    #[test]
    fn message_split_partitions_the_full_set() {
        let client = LocalClient::in_memory();
        client.upsert_user(&user("u1", "Avery"));
        client.insert_message(&message("m1", "c1", "u1", "hi", 10), SyncStatus::Confirmed);
        client.insert_message(&message("m2", "c1", "u1", "there", 20), SyncStatus::Pending);
        client.insert_message(&message("m3", "c1", "u1", "all", 30), SyncStatus::Confirmed);

        let list = watch_messages(&client, "c1", no_notify());
        let snap = list.snapshot();

        let confirmed: BTreeSet<_> = snap.messages.keys().cloned().collect();
        let pending: BTreeSet<_> = snap.pending.keys().cloned().collect();
        assert!(confirmed.is_disjoint(&pending));
        let union: BTreeSet<_> = confirmed.union(&pending).cloned().collect();
        let all: BTreeSet<_> = ["m1", "m2", "m3"].iter().map(|s| s.to_string()).collect();
        assert_eq!(union, all);
        assert_eq!(snap.messages["m1"].sender.as_ref().unwrap().name, "Avery");
    }

    #[test]
    fn confirming_a_message_moves_it_between_subsets() {
        let client = LocalClient::in_memory();
        client.insert_message(&message("m1", "c1", "u1", "hi", 10), SyncStatus::Pending);
        let list = watch_messages(&client, "c1", no_notify());
        assert!(list.snapshot().messages.is_empty());
        assert!(list.snapshot().pending.contains_key("m1"));

        client.confirm_message("m1");
        let snap = list.snapshot();
        assert!(snap.messages.contains_key("m1"));
        assert!(snap.pending.is_empty());
    }

    #[test]
    fn pending_subset_defaults_to_empty() {
        let client = LocalClient::in_memory();
        let list = watch_messages(&client, "c1", no_notify());
        assert!(list.snapshot().pending.is_empty());
    }

    #[test]
    fn non_members_are_all_users_minus_the_member_set() {
        let client = LocalClient::in_memory();
        client.upsert_user(&user("u1", "Avery"));
        client.upsert_user(&user("u2", "Sam"));
        client.upsert_user(&user("u3", "Noa"));
        let convo = convo("c1", "General", &["u1", "u2"]);
        client.upsert_conversation(&convo);
        let list = watch_non_members(&client, Some(&convo), no_notify());
        let users = list.snapshot().users;
        assert_eq!(users.len(), 1);
        assert!(users.contains_key("u3"));
    }

    #[test]
    fn absent_conversation_degrades_to_all_users() {
        let client = LocalClient::in_memory();
        client.upsert_user(&user("u1", "Avery"));
        client.upsert_user(&user("u2", "Sam"));
        let list = watch_non_members(&client, None, no_notify());
        assert_eq!(list.snapshot().users.len(), 2);
    }

    #[test]
    fn non_members_rebind_reflects_a_membership_change() {
        let client = LocalClient::in_memory();
        client.upsert_user(&user("u1", "Avery"));
        client.upsert_user(&user("u3", "Noa"));
        client.upsert_conversation(&convo("c1", "General", &["u1"]));

        let view = watch_conversation(&client, "c1", no_notify());
        let before = watch_non_members(
            &client,
            view.snapshot().conversation.as_ref(),
            no_notify(),
        );
        assert!(before.snapshot().users.contains_key("u3"));

        client.add_member("u3", "c1");
        let after = watch_non_members(
            &client,
            view.snapshot().conversation.as_ref(),
            no_notify(),
        );
        assert!(!after.snapshot().users.contains_key("u3"));
    }
}
