use super::datastore::{not_found, DataStore};
use super::ensure_success;
use crate::error::{DirectoryError, Result};
use crate::models::{Collection, Fields, Query, Record};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::debug;

pub const DEFAULT_FIRESTORE_URL: &str = "https://firestore.googleapis.com/v1";
const PAGE_SIZE: &str = "300";

/// Firestore through its REST interface, one collection per directory kind.
pub struct FirestoreStore {
    client: Client,
    documents_url: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Document {
    name: String,
    #[serde(default)]
    fields: Map<String, Value>,
    create_time: Option<String>,
    update_time: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse {
    #[serde(default)]
    documents: Vec<Document>,
    next_page_token: Option<String>,
}

impl FirestoreStore {
    pub fn new(client: Client, base_url: &str, project_id: &str, api_key: &str) -> Self {
        Self {
            client,
            documents_url: format!(
                "{}/projects/{}/databases/(default)/documents",
                base_url.trim_end_matches('/'),
                project_id
            ),
            api_key: api_key.to_string(),
        }
    }

    fn collection_url(&self, collection: Collection) -> String {
        format!("{}/{}", self.documents_url, collection)
    }

    fn document_url(&self, collection: Collection, id: &str) -> String {
        format!("{}/{}/{}", self.documents_url, collection, id)
    }

    fn key(&self) -> (&'static str, &str) {
        ("key", self.api_key.as_str())
    }

    /// 404 from a document URL means the document, not the endpoint, is gone.
    async fn document(
        &self,
        response: reqwest::Response,
        collection: Collection,
        id: &str,
    ) -> Result<Record> {
        if response.status() == StatusCode::NOT_FOUND {
            return Err(not_found(collection, id));
        }
        let response = ensure_success(response, &format!("{}/{}", collection, id)).await?;
        let doc: Document = response.json().await?;
        decode_document(doc)
    }
}

#[async_trait]
impl DataStore for FirestoreStore {
    fn name(&self) -> &'static str {
        "firestore"
    }

    async fn list(&self, collection: Collection, _query: &Query) -> Result<Vec<Record>> {
        let mut records = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut request = self
                .client
                .get(self.collection_url(collection))
                .query(&[self.key(), ("pageSize", PAGE_SIZE)]);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }
            let response = request.send().await?;
            let response = ensure_success(response, &format!("list {}", collection)).await?;
            let page: ListResponse = response.json().await?;
            debug!("Firestore returned {} {} documents", page.documents.len(), collection);
            for doc in page.documents {
                records.push(decode_document(doc)?);
            }
            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => page_token = Some(token),
                None => return Ok(records),
            }
        }
    }

    async fn fetch(&self, collection: Collection, id: &str) -> Result<Record> {
        let response = self
            .client
            .get(self.document_url(collection, id))
            .query(&[self.key()])
            .send()
            .await?;
        self.document(response, collection, id).await
    }

    async fn insert(&self, collection: Collection, record: &Record) -> Result<Record> {
        let response = self
            .client
            .post(self.collection_url(collection))
            .query(&[self.key(), ("documentId", record.id.as_str())])
            .json(&json!({ "fields": encode_record(record)? }))
            .send()
            .await?;
        if response.status() == StatusCode::CONFLICT {
            // The id is generated per record, so a clash means an earlier
            // attempt of this same insert already committed.
            debug!("{}/{} already exists, reading it back", collection, record.id);
            return self.fetch(collection, &record.id).await;
        }
        self.document(response, collection, &record.id).await
    }

    async fn update(&self, collection: Collection, record: &Record) -> Result<Record> {
        let response = self
            .client
            .patch(self.document_url(collection, &record.id))
            .query(&[self.key(), ("currentDocument.exists", "true")])
            .json(&json!({ "fields": encode_record(record)? }))
            .send()
            .await?;
        self.document(response, collection, &record.id).await
    }

    async fn delete(&self, collection: Collection, id: &str) -> Result<()> {
        let response = self
            .client
            .delete(self.document_url(collection, id))
            .query(&[self.key(), ("currentDocument.exists", "true")])
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(not_found(collection, id));
        }
        ensure_success(response, &format!("delete {}/{}", collection, id)).await?;
        Ok(())
    }
}

/// Record as Firestore typed fields. The id lives in the document name.
fn encode_record(record: &Record) -> Result<Map<String, Value>> {
    let Value::Object(mut plain) = serde_json::to_value(record)? else {
        return Err(DirectoryError::InvalidResponse("record is not an object".into()));
    };
    plain.remove("id");
    Ok(plain
        .into_iter()
        .map(|(k, v)| (k, encode_value(v)))
        .collect())
}

fn encode_value(value: Value) -> Value {
    match value {
        Value::Null => json!({ "nullValue": null }),
        Value::Bool(b) => json!({ "booleanValue": b }),
        Value::Number(n) => match n.as_i64() {
            Some(i) => json!({ "integerValue": i.to_string() }),
            None => json!({ "doubleValue": n.as_f64().unwrap_or_default() }),
        },
        Value::String(s) => json!({ "stringValue": s }),
        Value::Array(items) => {
            json!({ "arrayValue": { "values": items.into_iter().map(encode_value).collect::<Vec<_>>() } })
        }
        Value::Object(map) => {
            let fields: Map<String, Value> =
                map.into_iter().map(|(k, v)| (k, encode_value(v))).collect();
            json!({ "mapValue": { "fields": fields } })
        }
    }
}

fn decode_value(typed: &Value) -> Value {
    let Some((kind, inner)) = typed.as_object().and_then(|o| o.iter().next()) else {
        return Value::Null;
    };
    match kind.as_str() {
        "stringValue" | "timestampValue" | "referenceValue" | "booleanValue" | "doubleValue" => {
            inner.clone()
        }
        "integerValue" => inner
            .as_str()
            .and_then(|s| s.parse::<i64>().ok())
            .map(Value::from)
            .unwrap_or_else(|| inner.clone()),
        "arrayValue" => Value::Array(
            inner
                .get("values")
                .and_then(Value::as_array)
                .map(|values| values.iter().map(decode_value).collect())
                .unwrap_or_default(),
        ),
        "mapValue" => Value::Object(decode_fields(inner.get("fields"))),
        _ => Value::Null,
    }
}

fn decode_fields(fields: Option<&Value>) -> Fields {
    fields
        .and_then(Value::as_object)
        .map(|map| map.iter().map(|(k, v)| (k.clone(), decode_value(v))).collect())
        .unwrap_or_default()
}

fn decode_document(doc: Document) -> Result<Record> {
    let id = doc
        .name
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| DirectoryError::InvalidResponse(format!("bad document name {}", doc.name)))?
        .to_string();

    let mut plain = decode_fields(Some(&Value::Object(doc.fields)));
    plain.insert("id".to_string(), Value::String(id));
    // Documents written by other clients may only carry server timestamps.
    if !plain.contains_key("created_at") {
        if let Some(t) = doc.create_time {
            plain.insert("created_at".to_string(), Value::String(t));
        }
    }
    if !plain.contains_key("updated_at") {
        if let Some(t) = doc.update_time {
            plain.insert("updated_at".to_string(), Value::String(t));
        }
    }
    Ok(serde_json::from_value(Value::Object(plain))?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_values_round_trip_through_a_document() {
        let record = Record::new(
            json!({"name": "Pump", "price": 120, "rating": 4.5, "approved": false, "tags": ["water"]})
                .as_object()
                .cloned()
                .unwrap(),
        );
        let fields = encode_record(&record).unwrap();
        assert_eq!(fields["price"], json!({"integerValue": "120"}));
        assert_eq!(fields["approved"], json!({"booleanValue": false}));
        assert!(!fields.contains_key("id"));

        let doc = Document {
            name: format!("projects/p/databases/(default)/documents/machines/{}", record.id),
            fields,
            create_time: None,
            update_time: None,
        };
        assert_eq!(decode_document(doc).unwrap(), record);
    }

    #[test]
    fn falls_back_to_server_timestamps() {
        let doc = Document {
            name: "projects/p/databases/(default)/documents/news/abc".to_string(),
            fields: json!({"title": {"stringValue": "Market day"}})
                .as_object()
                .cloned()
                .unwrap(),
            create_time: Some("2024-05-01T10:00:00Z".to_string()),
            update_time: Some("2024-05-02T10:00:00Z".to_string()),
        };
        let record = decode_document(doc).unwrap();
        assert_eq!(record.id, "abc");
        assert_eq!(record.get_str("title").as_deref(), Some("Market day"));
        assert!(record.updated_at > record.created_at);
    }
}
