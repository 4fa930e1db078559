use crate::types::{Citation, ErrorKind, TurnId};
use thiserror::Error;

/// What the orchestrator pushes to whoever displays a turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderEvent {
    /// The reasoning buffer changed; `snapshot` replaces what was shown before
    Reasoning { turn_id: TurnId, snapshot: String },
    /// Terminal success. `answer` is `None` when the stream ended without one.
    Answer {
        turn_id: TurnId,
        answer: Option<String>,
        citations: Vec<Citation>,
    },
    /// Terminal failure with the message to show in place of an answer
    Error {
        turn_id: TurnId,
        message: String,
        kind: ErrorKind,
    },
}

impl RenderEvent {
    pub fn turn_id(&self) -> TurnId {
        match self {
            RenderEvent::Reasoning { turn_id, .. }
            | RenderEvent::Answer { turn_id, .. }
            | RenderEvent::Error { turn_id, .. } => *turn_id,
        }
    }
}

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Renderer unavailable: {0}")]
    Unavailable(String),
}

/// Display side of a turn. Calls never block the orchestrator for long and
/// failures are not fatal to the turn.
pub trait Renderer: Send + Sync {
    fn render(&self, event: &RenderEvent) -> Result<(), RenderError>;
}

/// Writes events as plain lines, e.g. for a command line front end
pub struct TextRenderer<W: std::io::Write + Send> {
    out: std::sync::Mutex<W>,
}

impl<W: std::io::Write + Send> TextRenderer<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: std::sync::Mutex::new(out),
        }
    }

    pub fn into_inner(self) -> Result<W, RenderError> {
        self.out
            .into_inner()
            .map_err(|e| RenderError::Unavailable(e.to_string()))
    }
}

impl<W: std::io::Write + Send> Renderer for TextRenderer<W> {
    fn render(&self, event: &RenderEvent) -> Result<(), RenderError> {
        let mut out = self
            .out
            .lock()
            .map_err(|e| RenderError::Unavailable(e.to_string()))?;

        match event {
            RenderEvent::Reasoning { snapshot, .. } => {
                for line in snapshot.lines() {
                    writeln!(out, "  > {line}")?;
                }
            }
            RenderEvent::Answer {
                answer, citations, ..
            } => {
                writeln!(out, "{}", answer.as_deref().unwrap_or(""))?;
                for citation in citations {
                    writeln!(
                        out,
                        "  [{}] {}",
                        citation.index,
                        Citation::excerpt(&citation.content)
                    )?;
                }
            }
            RenderEvent::Error { message, .. } => {
                writeln!(out, "{message}")?;
            }
        }
        out.flush()?;
        Ok(())
    }
}
