use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

pub type Fields = serde_json::Map<String, Value>;

/// Keys owned by the record itself; user-supplied fields never override them.
pub const RESERVED_FIELDS: [&str; 3] = ["id", "created_at", "updated_at"];

/// Text fields scanned by free-text search.
pub const SEARCH_FIELDS: [&str; 7] = [
    "name",
    "title",
    "description",
    "specialty",
    "content",
    "address",
    "type",
];

/// One stored entity: a craftsman, a shop, an offer...
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub fields: Fields,
}

impl Record {
    /// Builds a fresh record with a generated id and both timestamps set to now.
    pub fn new(fields: Fields) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            fields: strip_reserved(fields),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Field rendered as text; numbers and booleans are stringified.
    pub fn get_str(&self, name: &str) -> Option<String> {
        match name {
            "id" => Some(self.id.clone()),
            _ => self.fields.get(name).and_then(value_as_string),
        }
    }

    pub fn get_bool(&self, name: &str) -> bool {
        match self.fields.get(name) {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
            _ => false,
        }
    }

    pub fn set(&mut self, name: &str, value: impl Into<Value>) {
        if !RESERVED_FIELDS.contains(&name) {
            self.fields.insert(name.to_string(), value.into());
        }
    }

    /// Overlays `fields` onto the record and bumps `updated_at`.
    pub fn merge(&mut self, fields: Fields) {
        for (key, value) in strip_reserved(fields) {
            self.fields.insert(key, value);
        }
        self.updated_at = Utc::now();
    }

    pub fn is_approved(&self) -> bool {
        self.get_bool("approved")
    }

    pub fn is_rejected(&self) -> bool {
        self.get_bool("rejected")
    }

    /// Neither approved nor rejected yet.
    pub fn is_pending_review(&self) -> bool {
        !self.is_approved() && !self.is_rejected()
    }

    /// Case-insensitive substring match over [`SEARCH_FIELDS`].
    /// `term` is expected to be lowercased already.
    pub fn matches_search(&self, term: &str) -> bool {
        SEARCH_FIELDS.iter().any(|field| {
            self.get_str(field)
                .map(|v| v.to_lowercase().contains(term))
                .unwrap_or(false)
        })
    }
}

pub fn value_as_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Names from `required` that are absent, null or blank in `fields`.
pub fn missing_fields(required: &[&str], fields: &Fields) -> Vec<String> {
    required
        .iter()
        .filter(|name| match fields.get(**name) {
            None | Some(Value::Null) => true,
            Some(Value::String(s)) => s.trim().is_empty(),
            Some(_) => false,
        })
        .map(|name| name.to_string())
        .collect()
}

fn strip_reserved(mut fields: Fields) -> Fields {
    for key in RESERVED_FIELDS {
        fields.remove(key);
    }
    fields
}
