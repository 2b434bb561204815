//! HTTP client for an Elasticsearch-style search cluster: a node pool with
//! pluggable selection strategies, transparent failover across nodes, and
//! batched bulk document operations with per-item outcome correlation.

pub mod bulk;
pub mod client;
pub mod conf;
pub mod error;
pub mod models;
pub mod node;
pub mod pool;
pub mod strategy;
pub mod transport;

pub use bulk::{ActionMeta, Bulk, BulkAction, OpKind};
pub use client::{EsClient, EsClientBuilder};
pub use conf::{Config, NodeConf};
pub use error::{Error, Result};
pub use models::bulk_response::{BulkOutcome, BulkResponseSet, ItemError};
pub use models::document::Document;
pub use models::server_info::ServerInfo;
pub use node::Node;
pub use pool::{ConnectionPool, FailureInfo};
pub use strategy::{strategy_from_name, RoundRobinStrategy, SelectionStrategy, SimpleStrategy};
pub use transport::{
    HttpTransport, HttpTransportBuilder, Request, Response, Transport, TransportError,
};
