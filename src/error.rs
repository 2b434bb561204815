use thiserror::Error;

use crate::transport::TransportError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Unknown selection strategy: {0}")]
    UnknownStrategy(String),

    #[error("Connection pool was given no nodes")]
    EmptyPool,

    #[error("No enabled connection available")]
    NoConnectionAvailable,

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Bulk request has no actions")]
    EmptyBulk,

    #[error("Bulk response returned {received} items for {sent} actions")]
    BulkItemMismatch { sent: usize, received: usize },

    #[error("Malformed bulk response: {0}")]
    MalformedBulkResponse(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;
