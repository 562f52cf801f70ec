use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde_json::{json, Value};

use crate::storage;
use crate::sync::client::{Listener, QueryResult, Subscription, SyncClient, SyncError};
use crate::sync::models::{self, Conversation, Message, User};
use crate::sync::query::{Query, SyncStatus};

struct Stored {
    value: Value,
    status: SyncStatus,
}

struct Sub {
    id: u64,
    query: Query,
    listener: Listener,
}

struct Store {
    collections: HashMap<String, BTreeMap<String, Stored>>,
    subs: Vec<Sub>,
    next_sub_id: u64,
    next_msg_seq: u64,
}

impl Store {
    fn new() -> Self {
        let mut collections = HashMap::new();
        for name in models::COLLECTIONS {
            collections.insert(name.to_string(), BTreeMap::new());
        }
        Store {
            collections,
            subs: Vec::new(),
            next_sub_id: 0,
            next_msg_seq: 0,
        }
    }
}

/// In-process backend behind the `SyncClient` seam. Evaluates queries
/// against its entity store, re-notifies every subscriber after each
/// mutation, and write-throughs to the SQLite cache when persistence is on.
///
/// Sent messages enter the store tagged `pending`; the delivery ack that
/// flips them to `confirmed` runs on the shared runtime, so confirmed- and
/// pending-subset snapshots never arrive as one atomic unit.
#[derive(Clone)]
pub struct LocalClient {
    store: Arc<Mutex<Store>>,
    persist: bool,
    ack_delay: Option<Duration>,
}

impl LocalClient {
    /// Volatile store, manual delivery acks. What the tests run against.
    pub fn in_memory() -> Self {
        LocalClient {
            store: Arc::new(Mutex::new(Store::new())),
            persist: false,
            ack_delay: None,
        }
    }

    /// Store backed by the SQLite cache, with a simulated delivery ack.
    pub fn with_cache() -> Self {
        let client = LocalClient {
            store: Arc::new(Mutex::new(Store::new())),
            persist: true,
            ack_delay: Some(Duration::from_millis(400)),
        };
        match storage::load_all() {
            Ok(rows) => {
                let mut store = client.lock();
                for (collection, id, status, value) in rows {
                    if let Some(coll) = store.collections.get_mut(&collection) {
                        coll.insert(id, Stored { value, status });
                    }
                }
            }
            Err(e) => log::warn!("cache load failed, starting empty: {e}"),
        }
        client
    }

    fn lock(&self) -> MutexGuard<'_, Store> {
        self.store.lock().expect("store mutex poisoned")
    }

    pub fn is_empty(&self, collection: &str) -> bool {
        self.lock()
            .collections
            .get(collection)
            .is_none_or(|c| c.is_empty())
    }

    pub fn upsert_user(&self, user: &User) {
        self.upsert(models::USERS, &user.id, entity_json(user), SyncStatus::Confirmed);
    }

    pub fn upsert_conversation(&self, convo: &Conversation) {
        self.upsert(
            models::CONVERSATIONS,
            &convo.id,
            entity_json(convo),
            SyncStatus::Confirmed,
        );
    }

    pub fn insert_message(&self, msg: &Message, status: SyncStatus) {
        self.upsert(models::MESSAGES, &msg.id, entity_json(msg), status);
    }

    /// Delivery ack: move a message from the pending subset to confirmed.
    pub fn confirm_message(&self, id: &str) {
        let changed = {
            let mut store = self.lock();
            match store
                .collections
                .get_mut(models::MESSAGES)
                .and_then(|c| c.get_mut(id))
            {
                Some(stored) if stored.status == SyncStatus::Pending => {
                    stored.status = SyncStatus::Confirmed;
                    self.persist_entity(models::MESSAGES, id, SyncStatus::Confirmed, &stored.value);
                    true
                }
                _ => false,
            }
        };
        if changed {
            self.notify_all();
        }
    }

    fn upsert(&self, collection: &str, id: &str, value: Value, status: SyncStatus) {
        {
            let mut store = self.lock();
            let Some(coll) = store.collections.get_mut(collection) else {
                log::warn!("upsert into unknown collection {collection}");
                return;
            };
            self.persist_entity(collection, id, status, &value);
            coll.insert(id.to_string(), Stored { value, status });
        }
        self.notify_all();
    }

    fn persist_entity(&self, collection: &str, id: &str, status: SyncStatus, value: &Value) {
        if self.persist {
            if let Err(e) = storage::upsert_entity(collection, id, status, value) {
                log::warn!("cache write failed for {collection}/{id}: {e}");
            }
        }
    }

    fn notify_all(&self) {
        let batch: Vec<(Listener, QueryResult)> = {
            let store = self.lock();
            store
                .subs
                .iter()
                .map(|sub| (sub.listener.clone(), evaluate(&store, &sub.query)))
                .collect()
        };
        // Listeners run outside the lock so they may call back into the client.
        for (listener, result) in batch {
            listener(result);
        }
    }

    fn mutate_members(&self, conversation_id: &str, op: impl FnOnce(&mut Vec<Value>) -> bool) {
        let changed = {
            let mut store = self.lock();
            let Some(stored) = store
                .collections
                .get_mut(models::CONVERSATIONS)
                .and_then(|c| c.get_mut(conversation_id))
            else {
                log::warn!("membership change on unknown conversation {conversation_id}");
                return;
            };
            let Some(obj) = stored.value.as_object_mut() else {
                return;
            };
            let members = obj.entry("members").or_insert_with(|| json!([]));
            let Some(arr) = members.as_array_mut() else {
                return;
            };
            let changed = op(arr);
            if changed {
                self.persist_entity(
                    models::CONVERSATIONS,
                    conversation_id,
                    stored.status,
                    &stored.value,
                );
            }
            changed
        };
        if changed {
            self.notify_all();
        }
    }
}

impl SyncClient for LocalClient {
    fn subscribe(&self, query: Query, listener: Listener) -> Subscription {
        let (id, first) = {
            let mut store = self.lock();
            let id = store.next_sub_id;
            store.next_sub_id += 1;
            let first = evaluate(&store, &query);
            store.subs.push(Sub {
                id,
                query,
                listener: listener.clone(),
            });
            (id, first)
        };
        listener(first);
        let store = Arc::clone(&self.store);
        Subscription::new(move || {
            if let Ok(mut store) = store.lock() {
                store.subs.retain(|sub| sub.id != id);
            }
        })
    }

    fn add_member(&self, user_id: &str, conversation_id: &str) {
        let user = json!(user_id);
        self.mutate_members(conversation_id, move |members| {
            if members.contains(&user) {
                false
            } else {
                members.push(user);
                true
            }
        });
    }

    fn remove_member(&self, user_id: &str, conversation_id: &str) {
        let user = json!(user_id);
        self.mutate_members(conversation_id, move |members| {
            let before = members.len();
            members.retain(|m| m != &user);
            members.len() != before
        });
    }

    fn send_message(&self, conversation_id: &str, sender_id: &str, text: &str) {
        let id = {
            let mut store = self.lock();
            store.next_msg_seq += 1;
            format!("m-{}-{}", crate::utils::now_millis(), store.next_msg_seq)
        };
        let value = json!({
            "id": id,
            "conversationId": conversation_id,
            "senderId": sender_id,
            "text": text,
            "created_at": crate::utils::now_millis(),
        });
        self.upsert(models::MESSAGES, &id, value, SyncStatus::Pending);

        if let Some(delay) = self.ack_delay {
            let client = self.clone();
            crate::utils::spawn_async(async move {
                tokio::time::sleep(delay).await;
                client.confirm_message(&id);
            });
        }
    }
}

fn evaluate(store: &Store, query: &Query) -> QueryResult {
    let Some(coll) = store.collections.get(&query.collection) else {
        return QueryResult {
            results: BTreeMap::new(),
            fetching: false,
            fetching_remote: false,
            error: Some(SyncError::UnknownCollection(query.collection.clone())),
        };
    };
    let rows: Vec<Value> = coll
        .values()
        .filter(|s| query.sync_status.is_none_or(|tag| s.status == tag))
        .map(|s| s.value.clone())
        .collect();
    let mut rows = query.apply(rows);
    for name in &query.includes {
        // Relations not declared for this collection are silently skipped;
        // inclusion never produces a query-level error.
        if let Some(rel) = models::relation(&query.collection, name) {
            for row in rows.iter_mut() {
                attach_relation(store, rel, row);
            }
        }
    }
    let results = rows
        .into_iter()
        .filter_map(|row| {
            let id = row.get("id").and_then(Value::as_str)?.to_string();
            Some((id, row))
        })
        .collect();
    QueryResult {
        results,
        fetching: false,
        fetching_remote: false,
        error: None,
    }
}

fn entity_json<T: serde::Serialize>(entity: &T) -> Value {
    serde_json::to_value(entity).expect("entity serializes to JSON")
}

fn attach_relation(store: &Store, rel: &models::Relation, row: &mut Value) {
    let Some(target) = store.collections.get(rel.target) else {
        return;
    };
    if rel.many {
        let ids: Vec<String> = row
            .get(rel.source_field)
            .and_then(Value::as_array)
            .map(|a| a.iter().filter_map(Value::as_str).map(String::from).collect())
            .unwrap_or_default();
        let mut related = serde_json::Map::new();
        for id in ids {
            // Dangling references stay absent from the materialized map.
            if let Some(stored) = target.get(&id) {
                related.insert(id, stored.value.clone());
            }
        }
        if let Some(obj) = row.as_object_mut() {
            obj.insert(rel.name.to_string(), Value::Object(related));
        }
    } else {
        let related = row
            .get(rel.source_field)
            .and_then(Value::as_str)
            .and_then(|id| target.get(id))
            .map(|stored| stored.value.clone());
        if let (Some(obj), Some(related)) = (row.as_object_mut(), related) {
            obj.insert(rel.name.to_string(), related);
        }
    }
}
