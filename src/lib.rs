//! Client-side processing of streamed chat answers.
//!
//! A turn first asks the backend for a `data:` framed stream. Lines are
//! reassembled from arbitrary chunks, classified, and decoded into reasoning
//! fragments (shown progressively) or a final structured answer. If the stream
//! cannot be opened or breaks, the same query is sent to the non-streaming
//! endpoint and inline `<think>` spans are moved out of the answer. If that
//! fails too, the turn ends with a fixed error message.

pub mod config;
pub mod frame;
pub mod inline_tags;
pub mod logging;
pub mod orchestrator;
pub mod payload;
pub mod persistence;
pub mod reasoning;
pub mod streaming;
pub mod transport;
pub mod types;
pub mod ui;

#[cfg(test)]
mod test_utils;

pub use config::{ClientConfig, TransportConfig, TurnConfig};
pub use orchestrator::{Orchestrator, SubmitError};
pub use persistence::{ChatSessionStore, FileChatStore, InMemoryChatStore};
pub use transport::{HttpTransport, PrimaryTransport, SecondaryTransport, TransportError};
pub use types::{Citation, DocumentScope, ErrorKind, Turn, TurnId, TurnState};
pub use ui::{RenderError, RenderEvent, Renderer, TextRenderer};
