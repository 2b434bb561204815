use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Certificate, Method};
use thiserror::Error;
use tracing::debug;

use crate::error::{Error, Result};
use crate::node::Node;

pub const CONTENT_TYPE_JSON: &str = "application/json";
pub const CONTENT_TYPE_NDJSON: &str = "application/x-ndjson";

/// One prepared request, bound to the node it was resolved against. A retried
/// dispatch rebuilds this against a fresh node with identical method, path,
/// query and body.
#[derive(Debug, Clone)]
pub struct Request {
    node: Arc<Node>,
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    body: Option<String>,
    content_type: String,
}

impl Request {
    pub fn new(
        node: Arc<Node>,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<String>,
        content_type: Option<&str>,
    ) -> Self {
        Self {
            node,
            method,
            path: path.to_string(),
            query: query
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            body,
            content_type: content_type.unwrap_or(CONTENT_TYPE_JSON).to_string(),
        }
    }

    pub fn node(&self) -> &Arc<Node> {
        &self.node
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query(&self) -> &[(String, String)] {
        &self.query
    }

    pub fn body(&self) -> Option<&str> {
        self.body.as_deref()
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// Full URL on the resolved node.
    pub fn url(&self) -> String {
        format!("{}{}", self.node.url(), self.path)
    }
}

/// Status plus raw body. A non-2xx status is still a response; only failures
/// below HTTP (refused connection, DNS, timeout) surface as `TransportError`.
#[derive(Debug, Clone)]
pub struct Response {
    status: u16,
    body: String,
}

impl Response {
    pub fn new(status: u16, body: String) -> Self {
        Self { status, body }
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::from_str(&self.body)?)
    }
}

/// Per-attempt network failure. The variant tells callers apart what kind of
/// outage hit the node; `category` feeds the pool's failure callback.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Request to {url} timed out: {message}")]
    Timeout { url: String, message: String },

    #[error("Failed to connect to {url}: {message}")]
    Connect { url: String, message: String },

    #[error("Failed to read response body from {url}: {message}")]
    Body { url: String, message: String },

    #[error("Transport failure for {url}: {message}")]
    Other { url: String, message: String },
}

impl TransportError {
    pub fn category(&self) -> &'static str {
        match self {
            TransportError::Timeout { .. } => "timeout",
            TransportError::Connect { .. } => "connect",
            TransportError::Body { .. } => "body",
            TransportError::Other { .. } => "other",
        }
    }

    pub fn url(&self) -> &str {
        match self {
            TransportError::Timeout { url, .. }
            | TransportError::Connect { url, .. }
            | TransportError::Body { url, .. }
            | TransportError::Other { url, .. } => url,
        }
    }

    fn from_reqwest(url: &str, error: reqwest::Error) -> Self {
        let url = url.to_string();
        let message = error.to_string();
        if error.is_timeout() {
            TransportError::Timeout { url, message }
        } else if error.is_connect() {
            TransportError::Connect { url, message }
        } else if error.is_body() || error.is_decode() {
            TransportError::Body { url, message }
        } else {
            TransportError::Other { url, message }
        }
    }
}

/// Executes a prepared request against its resolved node. The dispatcher only
/// needs this capability; swapping the HTTP stack (or mocking it in tests)
/// happens here.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &Request) -> std::result::Result<Response, TransportError>;
}

/// Default transport over a shared reqwest client.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self> {
        Self::builder().build()
    }

    pub fn builder() -> HttpTransportBuilder {
        HttpTransportBuilder::default()
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &Request) -> std::result::Result<Response, TransportError> {
        let url = request.url();
        let mut builder = self
            .client
            .request(request.method().clone(), &url)
            .timeout(request.node().timeout());
        if !request.query().is_empty() {
            builder = builder.query(request.query());
        }
        if let Some(body) = request.body() {
            builder = builder
                .header(CONTENT_TYPE, request.content_type())
                .body(body.to_string());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| TransportError::from_reqwest(&url, e))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| TransportError::from_reqwest(&url, e))?;
        debug!(%url, status, "transport round trip");
        Ok(Response::new(status, body))
    }
}

/// Mirrors how the target cluster is usually reached: plain client by
/// default, optionally a directory of PEM root certificates or an insecure
/// toggle for self-signed test clusters.
#[derive(Debug, Default)]
pub struct HttpTransportBuilder {
    root_certificates: Option<PathBuf>,
    insecure: bool,
    connect_timeout: Option<Duration>,
}

impl HttpTransportBuilder {
    pub fn root_certificates(mut self, dir: impl Into<PathBuf>) -> Self {
        self.root_certificates = Some(dir.into());
        self
    }

    pub fn insecure(mut self, insecure: bool) -> Self {
        self.insecure = insecure;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    pub fn build(self) -> Result<HttpTransport> {
        let mut builder = reqwest::Client::builder();
        if self.insecure {
            builder = builder.danger_accept_invalid_certs(true);
        }
        if let Some(path) = &self.root_certificates {
            for cert in load_certificates(path)? {
                builder = builder.add_root_certificate(cert);
            }
        }
        if let Some(timeout) = self.connect_timeout {
            builder = builder.connect_timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(HttpTransport { client })
    }
}

fn load_certificates(path: &Path) -> Result<Vec<Certificate>> {
    let mut certs = Vec::new();
    let entries = std::fs::read_dir(path)
        .map_err(|e| Error::Config(format!("cannot read certificate dir {path:?}: {e}")))?;
    for entry in entries {
        let entry = entry.map_err(|e| Error::Config(e.to_string()))?;
        let file_path = entry.path();
        if !file_path.is_file() {
            continue;
        }
        if let Ok(content) = std::fs::read(&file_path) {
            if let Ok(cert) = Certificate::from_pem(&content) {
                certs.push(cert);
            }
        }
    }
    Ok(certs)
}
