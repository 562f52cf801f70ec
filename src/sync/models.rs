use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

pub const CONVERSATIONS: &str = "conversations";
pub const MESSAGES: &str = "messages";
pub const USERS: &str = "users";

pub const COLLECTIONS: &[&str] = &[CONVERSATIONS, MESSAGES, USERS];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
}

/// Read-only view of a conversation. `members_info` is populated only when
/// the `membersInfo` relation was included on the query that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub members: BTreeSet<String>,
    #[serde(rename = "membersInfo", default, skip_serializing_if = "Option::is_none")]
    pub members_info: Option<BTreeMap<String, User>>,
}

/// Read-only view of a message. `sender` is populated only when the `sender`
/// relation was included. The pending/confirmed tag is store metadata, not a
/// field on the entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    #[serde(rename = "conversationId")]
    pub conversation_id: String,
    #[serde(rename = "senderId")]
    pub sender_id: String,
    pub text: String,
    pub created_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<User>,
}

/// How a named relation attaches related entities to a query result.
pub struct Relation {
    pub name: &'static str,
    pub collection: &'static str,
    /// Field on the owning entity holding the reference (id) or references
    /// (array of ids, when `many`).
    pub source_field: &'static str,
    pub target: &'static str,
    pub many: bool,
}

pub const RELATIONS: &[Relation] = &[
    Relation {
        name: "membersInfo",
        collection: CONVERSATIONS,
        source_field: "members",
        target: USERS,
        many: true,
    },
    Relation {
        name: "sender",
        collection: MESSAGES,
        source_field: "senderId",
        target: USERS,
        many: false,
    },
];

pub fn relation(collection: &str, name: &str) -> Option<&'static Relation> {
    RELATIONS
        .iter()
        .find(|r| r.collection == collection && r.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn conversation_roundtrips_through_json() {
        let value = json!({
            "id": "c1",
            "name": "General",
            "members": ["u1", "u2"],
        });
        let convo: Conversation = serde_json::from_value(value).unwrap();
        assert_eq!(convo.id, "c1");
        assert!(convo.members.contains("u2"));
        assert!(convo.members_info.is_none());
    }

    #[test]
    fn included_members_info_deserializes() {
        let value = json!({
            "id": "c1",
            "name": "General",
            "members": ["u1"],
            "membersInfo": { "u1": { "id": "u1", "name": "Avery" } },
        });
        let convo: Conversation = serde_json::from_value(value).unwrap();
        let info = convo.members_info.unwrap();
        assert_eq!(info.get("u1").unwrap().name, "Avery");
    }

    #[test]
    fn relation_lookup_is_scoped_to_the_collection() {
        assert!(relation(CONVERSATIONS, "membersInfo").is_some());
        assert!(relation(MESSAGES, "membersInfo").is_none());
        assert!(relation(MESSAGES, "sender").is_some());
    }
}
