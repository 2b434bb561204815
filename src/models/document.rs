use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Document-like input for bulk submission: a JSON source plus an optional
/// id. Without an id the server assigns one for index/create operations.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Document {
    #[serde(default)]
    pub id: Option<String>,
    pub source: Value,
}

impl Document {
    pub fn new(source: Value) -> Self {
        Self { id: None, source }
    }

    pub fn with_id(id: impl Into<String>, source: Value) -> Self {
        Self {
            id: Some(id.into()),
            source,
        }
    }
}
