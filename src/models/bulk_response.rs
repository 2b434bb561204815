use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::bulk::OpKind;
use crate::error::{Error, Result};

/// Error payload of one failed bulk item.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ItemError {
    #[serde(rename = "type")]
    pub error_type: String,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Outcome of one bulk action, index-aligned with the action list that
/// produced the request.
#[derive(Debug, Clone)]
pub struct BulkOutcome {
    pub kind: OpKind,
    pub status: u16,
    pub index: Option<String>,
    pub id: Option<String>,
    pub result: Option<String>,
    pub error: Option<ItemError>,
}

impl BulkOutcome {
    pub fn is_error(&self) -> bool {
        self.error.is_some() || self.status >= 400
    }
}

/// Ordered per-action outcomes of one `_bulk` round trip. The i-th outcome
/// always describes the i-th action; anything else failed parsing.
#[derive(Debug, Clone)]
pub struct BulkResponseSet {
    took_ms: Option<u64>,
    outcomes: Vec<BulkOutcome>,
}

impl BulkResponseSet {
    /// Correlates the server's `items` array against the kinds of the actions
    /// that were sent, in order. The top-level `errors` flag is not trusted
    /// for anything; per-item status/error decide.
    pub fn from_json(kinds: &[OpKind], value: &Value) -> Result<Self> {
        let items = value
            .get("items")
            .and_then(Value::as_array)
            .ok_or_else(|| Error::MalformedBulkResponse("missing items array".to_string()))?;

        if items.len() != kinds.len() {
            return Err(Error::BulkItemMismatch {
                sent: kinds.len(),
                received: items.len(),
            });
        }

        let mut outcomes = Vec::with_capacity(items.len());
        for (position, (item, expected)) in items.iter().zip(kinds).enumerate() {
            outcomes.push(parse_item(position, item, *expected)?);
        }

        let set = Self {
            took_ms: value.get("took").and_then(Value::as_u64),
            outcomes,
        };
        if let Some(hint) = value.get("errors").and_then(Value::as_bool) {
            if hint != set.has_errors() {
                debug!(
                    hint,
                    derived = set.has_errors(),
                    "bulk errors flag disagrees with per-item inspection"
                );
            }
        }
        Ok(set)
    }

    pub fn took_ms(&self) -> Option<u64> {
        self.took_ms
    }

    pub fn outcomes(&self) -> &[BulkOutcome] {
        &self.outcomes
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// Derived from the items themselves, never from the response's
    /// top-level flag.
    pub fn has_errors(&self) -> bool {
        self.outcomes.iter().any(BulkOutcome::is_error)
    }
}

fn parse_item(position: usize, item: &Value, expected: OpKind) -> Result<BulkOutcome> {
    let object = item.as_object().ok_or_else(|| {
        Error::MalformedBulkResponse(format!("item {position} is not an object"))
    })?;
    let (key, inner) = match object.iter().next() {
        Some(entry) if object.len() == 1 => entry,
        _ => {
            return Err(Error::MalformedBulkResponse(format!(
                "item {position} must contain exactly one operation key"
            )))
        }
    };

    let kind = OpKind::from_wire(key).ok_or_else(|| {
        Error::MalformedBulkResponse(format!("item {position} has unknown operation '{key}'"))
    })?;
    if kind != expected {
        return Err(Error::MalformedBulkResponse(format!(
            "item {position} echoes '{key}' for a {expected} action"
        )));
    }

    let inner = inner.as_object().ok_or_else(|| {
        Error::MalformedBulkResponse(format!("item {position} payload is not an object"))
    })?;

    let status = inner.get("status").and_then(Value::as_u64);
    let error = match inner.get("error") {
        Some(value) if !value.is_null() => Some(
            serde_json::from_value::<ItemError>(value.clone()).unwrap_or_else(|_| ItemError {
                error_type: "unknown".to_string(),
                reason: value.as_str().map(str::to_string),
            }),
        ),
        _ => None,
    };

    if status.is_none() && error.is_none() {
        return Err(Error::MalformedBulkResponse(format!(
            "item {position} carries neither a status nor an error"
        )));
    }

    Ok(BulkOutcome {
        kind,
        // An error item without a status is still a failure; 0 keeps the
        // absence visible instead of inventing an HTTP code.
        status: status.unwrap_or(0) as u16,
        index: inner
            .get("_index")
            .and_then(Value::as_str)
            .map(str::to_string),
        id: inner.get("_id").and_then(Value::as_str).map(str::to_string),
        result: inner
            .get("result")
            .and_then(Value::as_str)
            .map(str::to_string),
        error,
    })
}
