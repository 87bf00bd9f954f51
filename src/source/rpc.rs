//! Client of the external JSON-RPC citekey service.
//!
//! One `item.search` call with an empty query returns every library item the service
//! knows. The response is read leniently: it may be a JSON-RPC envelope whose `result`
//! holds the items, or the items themselves, as an array or under an `items` key.

use crate::candidate::{CandidateRecord, RecordHandle};
use crate::{CitekeyError, Result};
use serde_json::{Map, Value, json};

/// Port the citekey service listens on by default.
pub const DEFAULT_RPC_PORT: u16 = 23119;
/// Path of the JSON-RPC endpoint by default.
pub const DEFAULT_RPC_PATH: &str = "better-bibtex/json-rpc";

const SEARCH_METHOD: &str = "item.search";

/// Request body of a full-library search.
pub fn search_request(id: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "method": SEARCH_METHOD,
        "params": [""],
        "id": id,
    })
}

#[cfg(feature = "rpc")]
pub use client::RpcSource;

#[cfg(feature = "rpc")]
mod client {
    use super::{parse_search_response, search_request};
    use crate::candidate::CandidateRecord;
    use crate::source::CandidateSource;
    use crate::{CitekeyError, Result};
    use async_trait::async_trait;
    use nanoid::nanoid;
    use tracing::debug;

    /// Candidate source backed by the external JSON-RPC service.
    ///
    /// No retries: a transport failure, a non-2xx status, a JSON-RPC `error`, or an
    /// unexpected body aborts the pass.
    #[derive(Debug, Clone)]
    pub struct RpcSource {
        client: reqwest::Client,
        endpoint: String,
    }

    impl RpcSource {
        pub fn new(endpoint: impl Into<String>) -> Self {
            Self {
                client: reqwest::Client::new(),
                endpoint: endpoint.into(),
            }
        }

        pub fn endpoint(&self) -> &str {
            &self.endpoint
        }
    }

    #[async_trait]
    impl CandidateSource for RpcSource {
        async fn gather(&self) -> Result<Vec<CandidateRecord>> {
            let id = nanoid!();
            debug!(endpoint = %self.endpoint, %id, "querying citekey service");

            let response = self
                .client
                .post(&self.endpoint)
                .json(&search_request(&id))
                .send()
                .await?;

            let status = response.status();
            let body = response.text().await?;
            if !status.is_success() {
                return Err(CitekeyError::RpcStatus {
                    status: status.as_u16(),
                    body,
                });
            }

            let records = parse_search_response(&body)?;
            debug!(records = records.len(), "citekey service answered");
            Ok(records)
        }

        fn name(&self) -> &'static str {
            "external-rpc"
        }
    }
}

/// Reads the body of an `item.search` response.
///
/// # Errors
///
/// - `CitekeyError::Json` if the body is not JSON
/// - `CitekeyError::Rpc` if it carries a JSON-RPC `error`
/// - `CitekeyError::RpcShape` if no item list can be found
pub fn parse_search_response(body: &str) -> Result<Vec<CandidateRecord>> {
    let value: Value = serde_json::from_str(body)?;

    if let Some(error) = value.get("error").filter(|error| !error.is_null()) {
        return Err(CitekeyError::Rpc {
            code: error.get("code").and_then(Value::as_i64).unwrap_or_default(),
            message: error
                .get("message")
                .and_then(Value::as_str)
                .map_or_else(|| error.to_string(), str::to_string),
        });
    }

    let payload = value.get("result").unwrap_or(&value);
    let items = match payload {
        Value::Array(items) => items,
        Value::Object(object) => match object.get("items") {
            Some(Value::Array(items)) => items,
            _ => {
                return Err(CitekeyError::RpcShape(
                    "expected an item array or an object with an `items` array".to_string(),
                ));
            }
        },
        other => {
            return Err(CitekeyError::RpcShape(format!(
                "expected an item array, found {}",
                json_kind(other)
            )));
        }
    };

    Ok(items.iter().filter_map(record_from_json).collect())
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Converts one service item into a record; `None` for anything but an object.
pub fn record_from_json(value: &Value) -> Option<CandidateRecord> {
    let item = value.as_object()?;

    Some(CandidateRecord {
        handle: RecordHandle(first_text(item, &["itemKey", "key", "id"]).unwrap_or_default()),
        title: first_text(item, &["title"]).unwrap_or_default(),
        date: first_text(item, &["date", "year"])
            .or_else(|| issued_year(item))
            .unwrap_or_default(),
        creators: creators(item),
        citekey: first_text(item, &["citekey", "citationKey", "citation-key"])
            .unwrap_or_default(),
    })
}

/// First of `keys` holding a non-blank string or a number.
fn first_text(item: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match item.get(*key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// CSL `issued`: `date-parts[0][0]`, else `literal`.
fn issued_year(item: &Map<String, Value>) -> Option<String> {
    let issued = item.get("issued")?;
    issued
        .pointer("/date-parts/0/0")
        .and_then(|year| match year {
            Value::Number(n) => Some(n.to_string()),
            Value::String(s) => Some(s.clone()),
            _ => None,
        })
        .or_else(|| issued.get("literal").and_then(Value::as_str).map(str::to_string))
}

/// Surnames from CSL `author` (`family`/`literal`) or from `creators`
/// (`lastName`/`name`).
fn creators(item: &Map<String, Value>) -> Vec<String> {
    let names = |key: &str, fields: &[&str]| -> Vec<String> {
        item.get(key)
            .and_then(Value::as_array)
            .map(|people| {
                people
                    .iter()
                    .filter_map(Value::as_object)
                    .filter_map(|person| first_text(person, fields))
                    .collect()
            })
            .unwrap_or_default()
    };

    let authors = names("author", &["family", "literal"]);
    if authors.is_empty() {
        names("creators", &["lastName", "name"])
    } else {
        authors
    }
}
