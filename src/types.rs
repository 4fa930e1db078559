use crate::reasoning::ReasoningBuffer;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use tracing::debug;

/// Identifier of a turn, unique per orchestrator
pub type TurnId = u64;

/// Maximum length of a citation excerpt before it gets truncated
pub const MAX_EXCERPT_CHARS: usize = 200;

/// Set of document identifiers an answer must be grounded in
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentScope(BTreeSet<String>);

impl DocumentScope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, document_id: impl Into<String>) -> bool {
        self.0.insert(document_id.into())
    }

    pub fn contains(&self, document_id: &str) -> bool {
        self.0.contains(document_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for DocumentScope {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// Source reference attached to a final answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    /// Position of the cited chunk within its document
    #[serde(default, alias = "chunk_index", deserialize_with = "null_as_default")]
    pub index: usize,
    /// Excerpt of the cited content
    #[serde(default, deserialize_with = "null_as_default")]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_id: Option<String>,
}

/// Read an explicit `null` the same way as a missing field
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl Citation {
    pub fn new(index: usize, content: impl Into<String>) -> Self {
        Self {
            index,
            content: content.into(),
            chunk_id: None,
        }
    }

    /// Shorten cited content to an excerpt of at most `MAX_EXCERPT_CHARS` characters
    pub fn excerpt(content: &str) -> String {
        match content.char_indices().nth(MAX_EXCERPT_CHARS) {
            Some((cut, _)) => format!("{}...", &content[..cut]),
            None => content.to_string(),
        }
    }
}

/// Lifecycle of a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnState {
    Idle,
    Streaming,
    StreamFailed,
    FallingBack,
    Completed,
    Failed,
}

impl TurnState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TurnState::Completed | TurnState::Failed)
    }

    /// Edges of the turn state machine
    pub fn can_transition_to(self, next: TurnState) -> bool {
        use TurnState::*;
        matches!(
            (self, next),
            (Idle, Streaming)
                | (Streaming, Completed)
                | (Streaming, StreamFailed)
                | (StreamFailed, FallingBack)
                | (FallingBack, Completed)
                | (FallingBack, Failed)
        )
    }
}

impl fmt::Display for TurnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TurnState::Idle => "idle",
            TurnState::Streaming => "streaming",
            TurnState::StreamFailed => "stream_failed",
            TurnState::FallingBack => "falling_back",
            TurnState::Completed => "completed",
            TurnState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Error taxonomy recorded on turns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The primary stream could not be established
    TransportOpenFailure,
    /// The primary stream broke after it was opened
    StreamReadFailure,
    /// The non-streaming call failed or returned a malformed body
    FallbackTransportFailure,
    /// A payload did not decode as a structured answer and was kept as a fragment.
    /// Never recorded on a turn.
    DecodeAmbiguity,
}

impl ErrorKind {
    /// Only fallback failures ever reach the user
    pub fn is_user_visible(self) -> bool {
        matches!(self, ErrorKind::FallbackTransportFailure)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::TransportOpenFailure => "transport_open_failure",
            ErrorKind::StreamReadFailure => "stream_read_failure",
            ErrorKind::FallbackTransportFailure => "fallback_transport_failure",
            ErrorKind::DecodeAmbiguity => "decode_ambiguity",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Invalid turn transition: {from} -> {to}")]
pub struct InvalidTransition {
    pub from: TurnState,
    pub to: TurnState,
}

/// One user query and its eventual answer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub id: TurnId,
    pub query: String,
    pub document_scope: DocumentScope,
    state: TurnState,
    /// Every state entered, in order
    transitions: Vec<TurnState>,
    reasoning: ReasoningBuffer,
    final_answer: Option<String>,
    citations: Vec<Citation>,
    error: Option<ErrorKind>,
    /// Why the primary stream was abandoned, if it was
    stream_failure: Option<ErrorKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    message_count: Option<u64>,
    created_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
}

impl Turn {
    pub fn new(
        id: TurnId,
        query: impl Into<String>,
        document_scope: DocumentScope,
        reasoning_capacity: usize,
    ) -> Self {
        Self {
            id,
            query: query.into(),
            document_scope,
            state: TurnState::Idle,
            transitions: vec![TurnState::Idle],
            reasoning: ReasoningBuffer::new(reasoning_capacity),
            final_answer: None,
            citations: Vec::new(),
            error: None,
            stream_failure: None,
            message_count: None,
            created_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn state(&self) -> TurnState {
        self.state
    }

    pub fn transitions(&self) -> &[TurnState] {
        &self.transitions
    }

    pub fn reasoning(&self) -> &ReasoningBuffer {
        &self.reasoning
    }

    pub fn reasoning_lines(&self) -> Vec<String> {
        self.reasoning.lines().map(str::to_string).collect()
    }

    pub fn final_answer(&self) -> Option<&str> {
        self.final_answer.as_deref()
    }

    pub fn citations(&self) -> &[Citation] {
        &self.citations
    }

    pub fn error(&self) -> Option<ErrorKind> {
        self.error
    }

    pub fn stream_failure(&self) -> Option<ErrorKind> {
        self.stream_failure
    }

    pub fn message_count(&self) -> Option<u64> {
        self.message_count
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    pub(crate) fn reasoning_mut(&mut self) -> &mut ReasoningBuffer {
        &mut self.reasoning
    }

    /// Move to `next`, refusing any edge the state machine does not have.
    /// Entering `Streaming` resets the reasoning buffer.
    pub(crate) fn transition(&mut self, next: TurnState) -> Result<(), InvalidTransition> {
        if !self.state.can_transition_to(next) {
            return Err(InvalidTransition {
                from: self.state,
                to: next,
            });
        }

        debug!("Turn {}: {} -> {}", self.id, self.state, next);
        self.state = next;
        self.transitions.push(next);

        if next == TurnState::Streaming {
            self.reasoning.reset();
        }
        if next.is_terminal() {
            self.finished_at = Some(Utc::now());
        }
        Ok(())
    }

    pub(crate) fn record_stream_failure(&mut self, kind: ErrorKind) {
        self.stream_failure = Some(kind);
    }

    /// Terminal success. `answer` is `None` for a stream that ended on the
    /// sentinel without ever delivering a structured payload.
    pub(crate) fn complete(
        &mut self,
        answer: Option<String>,
        citations: Vec<Citation>,
        message_count: Option<u64>,
    ) -> Result<(), InvalidTransition> {
        self.transition(TurnState::Completed)?;
        self.final_answer = answer;
        self.citations = citations;
        self.message_count = message_count;
        Ok(())
    }

    /// Terminal failure with a synthetic user-visible answer
    pub(crate) fn fail(&mut self, kind: ErrorKind, message: String) -> Result<(), InvalidTransition> {
        self.transition(TurnState::Failed)?;
        self.final_answer = Some(message);
        self.error = Some(kind);
        Ok(())
    }
}
