use super::collection::Collection;
use super::record::Record;
use serde_json::json;
use std::collections::BTreeMap;

/// Equality filters plus an optional free-text term.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    pub filter: BTreeMap<String, String>,
    pub search: Option<String>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_filter(mut self, field: &str, value: impl Into<String>) -> Self {
        self.filter.insert(field.to_string(), value.into());
        self
    }

    /// Blank terms are ignored; the stored term is trimmed and lowercased.
    pub fn with_search(mut self, term: &str) -> Self {
        let term = term.trim().to_lowercase();
        self.search = if term.is_empty() { None } else { Some(term) };
        self
    }

    pub fn is_empty(&self) -> bool {
        self.filter.is_empty() && self.search.is_none()
    }

    /// Stable key for the cache: the collection name, followed by the
    /// parameters as JSON when there are any. JSON quoting keeps values
    /// holding `&` or `=` from running into the next parameter.
    pub fn cache_key(&self, collection: Collection) -> String {
        if self.is_empty() {
            return collection.as_str().to_string();
        }
        let params = json!({ "filter": self.filter, "search": self.search });
        format!("{}?{}", collection.as_str(), params)
    }

    pub fn matches(&self, record: &Record) -> bool {
        let filtered = self
            .filter
            .iter()
            .all(|(field, wanted)| record.get_str(field).as_deref() == Some(wanted.as_str()));
        filtered
            && self
                .search
                .as_deref()
                .map(|term| record.matches_search(term))
                .unwrap_or(true)
    }

    /// Keeps matching records, newest first.
    pub fn apply(&self, records: Vec<Record>) -> Vec<Record> {
        let mut records: Vec<Record> = records.into_iter().filter(|r| self.matches(r)).collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        records
    }
}
