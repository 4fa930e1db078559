//! Transports that deliver answers: a streaming primary and a one-shot secondary

use crate::streaming::ChunkStream;
use crate::types::{DocumentScope, Turn};
use async_trait::async_trait;
use serde::Serialize;

pub mod http;

pub use http::HttpTransport;

/// Request body shared by both transports
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TurnRequest {
    #[serde(rename = "message")]
    pub query: String,
    #[serde(rename = "document_ids")]
    pub document_scope: DocumentScope,
    pub stream: bool,
}

impl TurnRequest {
    pub fn streaming(turn: &Turn) -> Self {
        Self {
            query: turn.query.clone(),
            document_scope: turn.document_scope.clone(),
            stream: true,
        }
    }

    pub fn complete(turn: &Turn) -> Self {
        Self {
            stream: false,
            ..Self::streaming(turn)
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Stream read failed: {0}")]
    Read(String),

    #[error("Invalid stream data: {0}")]
    Decode(String),

    #[error("Malformed response body: {0}")]
    MalformedBody(String),

    #[error("Request rejected by server: {0}")]
    Rejected(String),
}

/// Opens incrementally readable answer streams
#[async_trait]
pub trait PrimaryTransport: Send + Sync {
    /// Open a streaming request. A non-success status or a body that cannot be
    /// read incrementally is reported as an error here, before any chunk.
    async fn open_stream(
        &self,
        request: &TurnRequest,
    ) -> Result<Box<dyn ChunkStream>, TransportError>;
}

/// Fetches a complete answer body in one request
#[async_trait]
pub trait SecondaryTransport: Send + Sync {
    async fn fetch_complete(&self, request: &TurnRequest) -> Result<String, TransportError>;
}
