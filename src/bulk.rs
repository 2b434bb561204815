use std::fmt;

use reqwest::Method;
use serde_json::{json, Value};
use tracing::debug;

use crate::client::EsClient;
use crate::error::{Error, Result};
use crate::models::bulk_response::BulkResponseSet;
use crate::models::document::Document;
use crate::transport::CONTENT_TYPE_NDJSON;

/// The four recognized bulk operation kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    Create,
    Index,
    Update,
    Delete,
}

impl OpKind {
    pub fn as_wire(&self) -> &'static str {
        match self {
            OpKind::Create => "create",
            OpKind::Index => "index",
            OpKind::Update => "update",
            OpKind::Delete => "delete",
        }
    }

    pub fn from_wire(value: &str) -> Option<Self> {
        match value {
            "create" => Some(OpKind::Create),
            "index" => Some(OpKind::Index),
            "update" => Some(OpKind::Update),
            "delete" => Some(OpKind::Delete),
            _ => None,
        }
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire())
    }
}

/// Per-action addressing and options, shared by every kind.
#[derive(Debug, Clone, Default)]
pub struct ActionMeta {
    pub index: String,
    pub id: Option<String>,
    pub routing: Option<String>,
    pub version: Option<i64>,
    pub retry_on_conflict: Option<u32>,
}

impl ActionMeta {
    pub fn new(index: impl Into<String>) -> Self {
        Self {
            index: index.into(),
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_routing(mut self, routing: impl Into<String>) -> Self {
        self.routing = Some(routing.into());
        self
    }

    pub fn with_version(mut self, version: i64) -> Self {
        self.version = Some(version);
        self
    }

    pub fn with_retry_on_conflict(mut self, retries: u32) -> Self {
        self.retry_on_conflict = Some(retries);
        self
    }
}

/// One queued document operation. Built by the caller (or derived from a
/// [`Document`]), appended in order, consumed once at send time.
#[derive(Debug, Clone)]
pub enum BulkAction {
    Create { meta: ActionMeta, doc: Value },
    Index { meta: ActionMeta, doc: Value },
    Update { meta: ActionMeta, doc: Value, doc_as_upsert: bool },
    Delete { meta: ActionMeta },
}

impl BulkAction {
    pub fn create(meta: ActionMeta, doc: Value) -> Self {
        BulkAction::Create { meta, doc }
    }

    pub fn index(meta: ActionMeta, doc: Value) -> Self {
        BulkAction::Index { meta, doc }
    }

    pub fn update(meta: ActionMeta, doc: Value) -> Self {
        BulkAction::Update {
            meta,
            doc,
            doc_as_upsert: false,
        }
    }

    pub fn upsert(meta: ActionMeta, doc: Value) -> Self {
        BulkAction::Update {
            meta,
            doc,
            doc_as_upsert: true,
        }
    }

    pub fn delete(meta: ActionMeta) -> Self {
        BulkAction::Delete { meta }
    }

    pub fn kind(&self) -> OpKind {
        match self {
            BulkAction::Create { .. } => OpKind::Create,
            BulkAction::Index { .. } => OpKind::Index,
            BulkAction::Update { .. } => OpKind::Update,
            BulkAction::Delete { .. } => OpKind::Delete,
        }
    }

    pub fn meta(&self) -> &ActionMeta {
        match self {
            BulkAction::Create { meta, .. }
            | BulkAction::Index { meta, .. }
            | BulkAction::Update { meta, .. }
            | BulkAction::Delete { meta } => meta,
        }
    }

    /// Renders this action as its wire lines: the control line, then the
    /// body line for kinds that carry one (delete does not).
    pub fn to_lines(&self) -> Result<Vec<String>> {
        let mut lines = vec![serde_json::to_string(&self.control_value())?];
        if let Some(body) = self.body_value() {
            lines.push(serde_json::to_string(&body)?);
        }
        Ok(lines)
    }

    fn control_value(&self) -> Value {
        let meta = self.meta();
        let mut fields = serde_json::Map::new();
        fields.insert("_index".to_string(), json!(meta.index));
        if let Some(id) = &meta.id {
            fields.insert("_id".to_string(), json!(id));
        }
        if let Some(routing) = &meta.routing {
            fields.insert("_routing".to_string(), json!(routing));
        }
        if let Some(version) = meta.version {
            fields.insert("_version".to_string(), json!(version));
        }
        if let Some(retries) = meta.retry_on_conflict {
            fields.insert("retry_on_conflict".to_string(), json!(retries));
        }
        let mut line = serde_json::Map::new();
        line.insert(self.kind().as_wire().to_string(), Value::Object(fields));
        Value::Object(line)
    }

    fn body_value(&self) -> Option<Value> {
        match self {
            BulkAction::Create { doc, .. } | BulkAction::Index { doc, .. } => Some(doc.clone()),
            BulkAction::Update {
                doc, doc_as_upsert, ..
            } => {
                let mut wrapper = serde_json::Map::new();
                wrapper.insert("doc".to_string(), doc.clone());
                if *doc_as_upsert {
                    wrapper.insert("doc_as_upsert".to_string(), json!(true));
                }
                Some(Value::Object(wrapper))
            }
            BulkAction::Delete { .. } => None,
        }
    }
}

/// Accumulates actions and sends them as one `_bulk` request, then matches
/// the batched response back to the actions in their original order.
pub struct Bulk<'a> {
    client: &'a EsClient,
    actions: Vec<BulkAction>,
}

impl<'a> Bulk<'a> {
    pub(crate) fn new(client: &'a EsClient) -> Self {
        Self {
            client,
            actions: Vec::new(),
        }
    }

    pub fn add_action(&mut self, action: BulkAction) -> &mut Self {
        self.actions.push(action);
        self
    }

    /// Queues each document as an index action, preserving caller order.
    pub fn add_documents<I>(&mut self, index: &str, docs: I) -> &mut Self
    where
        I: IntoIterator<Item = Document>,
    {
        self.add_documents_as(index, docs, OpKind::Index)
    }

    /// Queues each document as an action of the given kind. Conversion is
    /// faithful: a missing id stays missing and the server gets to judge it.
    pub fn add_documents_as<I>(&mut self, index: &str, docs: I, kind: OpKind) -> &mut Self
    where
        I: IntoIterator<Item = Document>,
    {
        for doc in docs {
            let mut meta = ActionMeta::new(index);
            if let Some(id) = doc.id {
                meta = meta.with_id(id);
            }
            let action = match kind {
                OpKind::Create => BulkAction::create(meta, doc.source),
                OpKind::Index => BulkAction::index(meta, doc.source),
                OpKind::Update => BulkAction::update(meta, doc.source),
                OpKind::Delete => BulkAction::delete(meta),
            };
            self.actions.push(action);
        }
        self
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn actions(&self) -> &[BulkAction] {
        &self.actions
    }

    /// Serializes the queued actions into one newline-delimited body,
    /// dispatches it, and correlates the response set. Per-item failures
    /// come back as data; only transport exhaustion and protocol breakage
    /// are `Err`.
    pub async fn send(self, query: &[(&str, &str)]) -> Result<BulkResponseSet> {
        if self.actions.is_empty() {
            return Err(Error::EmptyBulk);
        }

        let mut body = String::new();
        for action in &self.actions {
            for line in action.to_lines()? {
                body.push_str(&line);
                body.push('\n');
            }
        }
        let kinds: Vec<OpKind> = self.actions.iter().map(BulkAction::kind).collect();
        debug!(actions = kinds.len(), bytes = body.len(), "sending bulk request");

        let response = self
            .client
            .perform(
                Method::POST,
                "/_bulk",
                query,
                Some(body),
                Some(CONTENT_TYPE_NDJSON),
            )
            .await?;
        if !response.is_success() {
            return Err(Error::MalformedBulkResponse(format!(
                "bulk request rejected with HTTP {}",
                response.status()
            )));
        }
        BulkResponseSet::from_json(&kinds, &response.json()?)
    }
}
