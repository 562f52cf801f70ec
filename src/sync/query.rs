use std::cmp::Ordering;

use serde_json::Value;

/// Sort direction for an `order` clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

/// Delivery-confirmation tag carried by the store for every entity.
/// Messages start out `Pending` (local echo) and become `Confirmed` once the
/// backend acknowledges delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    Pending,
    Confirmed,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Pending => "pending",
            SyncStatus::Confirmed => "confirmed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(SyncStatus::Pending),
            "confirmed" => Some(SyncStatus::Confirmed),
            _ => None,
        }
    }
}

/// A single predicate. `Like` is case-insensitive and supports SQL-style
/// `%` (any run) and `_` (any single char) wildcards.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(String, Value),
    Like(String, String),
    Nin(String, Vec<Value>),
}

impl Filter {
    pub fn matches(&self, entity: &Value) -> bool {
        match self {
            Filter::Eq(field, expected) => entity.get(field) == Some(expected),
            Filter::Like(field, pattern) => entity
                .get(field)
                .and_then(Value::as_str)
                .is_some_and(|text| like_match(pattern, text)),
            Filter::Nin(field, excluded) => match entity.get(field) {
                Some(v) => !excluded.contains(v),
                None => true,
            },
        }
    }
}

/// An immutable query specification against one named collection.
///
/// Builder methods consume `self` and return a new value, so deriving a
/// sub-query (e.g. the pending/confirmed split) never disturbs the base.
#[derive(Debug, Clone)]
pub struct Query {
    pub collection: String,
    pub filters: Vec<Filter>,
    pub order: Vec<(String, Direction)>,
    pub limit: Option<usize>,
    pub includes: Vec<String>,
    pub sync_status: Option<SyncStatus>,
}

pub fn query(collection: &str) -> Query {
    Query {
        collection: collection.to_string(),
        filters: Vec::new(),
        order: Vec::new(),
        limit: None,
        includes: Vec::new(),
        sync_status: None,
    }
}

impl Query {
    pub fn filter_eq(mut self, field: &str, value: Value) -> Self {
        self.filters.push(Filter::Eq(field.to_string(), value));
        self
    }

    pub fn filter_like(mut self, field: &str, pattern: &str) -> Self {
        self.filters
            .push(Filter::Like(field.to_string(), pattern.to_string()));
        self
    }

    pub fn filter_nin(mut self, field: &str, excluded: Vec<Value>) -> Self {
        self.filters.push(Filter::Nin(field.to_string(), excluded));
        self
    }

    pub fn order(mut self, field: &str, direction: Direction) -> Self {
        self.order.push((field.to_string(), direction));
        self
    }

    pub fn limit(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }

    pub fn include(mut self, relation: &str) -> Self {
        self.includes.push(relation.to_string());
        self
    }

    pub fn sync_status(mut self, status: SyncStatus) -> Self {
        self.sync_status = Some(status);
        self
    }

    /// Apply filters, ordering and limit to a set of candidate rows.
    /// Includes and the sync-status tag are resolved by the backend, which
    /// has the store context this layer does not.
    pub fn apply(&self, rows: Vec<Value>) -> Vec<Value> {
        let mut out: Vec<Value> = rows
            .into_iter()
            .filter(|row| self.filters.iter().all(|f| f.matches(row)))
            .collect();
        if !self.order.is_empty() {
            out.sort_by(|a, b| self.compare(a, b));
        }
        if let Some(limit) = self.limit {
            out.truncate(limit);
        }
        out
    }

    fn compare(&self, a: &Value, b: &Value) -> Ordering {
        for (field, direction) in &self.order {
            let av = a.get(field).unwrap_or(&Value::Null);
            let bv = b.get(field).unwrap_or(&Value::Null);
            let ord = compare_values(av, bv);
            let ord = match direction {
                Direction::Asc => ord,
                Direction::Desc => ord.reverse(),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }
}

// Total order over the value kinds we store: null < bool < number < string.
fn compare_values(a: &Value, b: &Value) -> Ordering {
    fn rank(v: &Value) -> u8 {
        match v {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            _ => 4,
        }
    }
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or(f64::NAN);
            let y = y.as_f64().unwrap_or(f64::NAN);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

fn like_match(pattern: &str, text: &str) -> bool {
    fn step(p: &[char], t: &[char]) -> bool {
        match p.first() {
            None => t.is_empty(),
            Some('%') => step(&p[1..], t) || (!t.is_empty() && step(p, &t[1..])),
            Some('_') => !t.is_empty() && step(&p[1..], &t[1..]),
            Some(c) => t.first() == Some(c) && step(&p[1..], &t[1..]),
        }
    }
    let p: Vec<char> = pattern.to_lowercase().chars().collect();
    let t: Vec<char> = text.to_lowercase().chars().collect();
    step(&p, &t)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn convo(id: &str, name: &str) -> Value {
        json!({ "id": id, "name": name })
    }

    #[test]
    fn like_matches_substring_same_case() {
        let q = query("conversations").filter_like("name", "%board%");
        let rows = q.apply(vec![convo("c1", "surfboard club"), convo("c2", "kitchen")]);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["id"], "c1");
    }

    #[test]
    fn like_is_case_insensitive() {
        let q = query("conversations").filter_like("name", "%BOARD%");
        let rows = q.apply(vec![convo("c1", "Surfboard Club"), convo("c2", "Kitchen")]);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["id"], "c1");
    }

    #[test]
    fn like_empty_search_matches_everything() {
        let q = query("conversations").filter_like("name", "%%");
        let rows = q.apply(vec![convo("c1", "a"), convo("c2", "")]);
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn like_underscore_matches_single_char() {
        let q = query("conversations").filter_like("name", "r_om");
        assert_eq!(q.apply(vec![convo("c1", "room"), convo("c2", "rooom")]).len(), 1);
    }

    #[test]
    fn like_ignores_non_string_fields() {
        let q = query("messages").filter_like("created_at", "%1%");
        assert!(q.apply(vec![json!({ "id": "m1", "created_at": 12 })]).is_empty());
    }

    #[test]
    fn nin_excludes_listed_ids() {
        let q = query("users").filter_nin("id", vec![json!("u1"), json!("u2")]);
        let rows = q.apply(vec![
            json!({ "id": "u1" }),
            json!({ "id": "u2" }),
            json!({ "id": "u3" }),
        ]);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["id"], "u3");
    }

    #[test]
    fn nin_with_empty_exclusion_matches_all() {
        let q = query("users").filter_nin("id", Vec::new());
        assert_eq!(q.apply(vec![json!({ "id": "u1" }), json!({ "id": "u2" })]).len(), 2);
    }

    #[test]
    fn order_desc_and_limit() {
        let q = query("messages").order("created_at", Direction::Desc).limit(1);
        let rows = q.apply(vec![
            json!({ "id": "m1", "created_at": 10 }),
            json!({ "id": "m2", "created_at": 30 }),
            json!({ "id": "m3", "created_at": 20 }),
        ]);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["id"], "m2");
    }

    #[test]
    fn missing_order_field_sorts_last_on_desc() {
        let q = query("messages").order("created_at", Direction::Desc);
        let rows = q.apply(vec![
            json!({ "id": "m1" }),
            json!({ "id": "m2", "created_at": 5 }),
        ]);
        assert_eq!(rows[0]["id"], "m2");
    }

    #[test]
    fn deriving_a_sub_query_leaves_the_base_untouched() {
        let base = query("messages").filter_eq("conversationId", json!("c1"));
        let split = base.clone().sync_status(SyncStatus::Pending);
        assert!(base.sync_status.is_none());
        assert_eq!(split.sync_status, Some(SyncStatus::Pending));
        assert_eq!(base.filters, split.filters);
    }
}
