//! Per-turn state machine: stream first, fall back to one complete response,
//! and as a last resort answer with a fixed error message.

use crate::config::{ClientConfig, TurnConfig};
use crate::frame::{Frame, FrameKind};
use crate::inline_tags::extract_reasoning;
use crate::payload::{decode_complete_body, decode_payload, AnswerBody, DecodedPayload};
use crate::persistence::ChatSessionStore;
use crate::streaming::{line_stream, ChunkStream};
use crate::transport::{
    HttpTransport, PrimaryTransport, SecondaryTransport, TransportError, TurnRequest,
};
use crate::types::{DocumentScope, ErrorKind, InvalidTransition, Turn, TurnId, TurnState};
use crate::ui::{RenderEvent, Renderer};
use futures::StreamExt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};


#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("Query is empty")]
    EmptyQuery,

    #[error("Another turn is still in progress")]
    TurnInProgress,

    #[error("Turn {turn_id} was cancelled")]
    Cancelled { turn_id: TurnId },

    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),
}

/// Reasons a turn stops before reaching a terminal state
enum Interrupt {
    Cancelled,
    Invalid(InvalidTransition),
}

impl From<InvalidTransition> for Interrupt {
    fn from(e: InvalidTransition) -> Self {
        Interrupt::Invalid(e)
    }
}

/// How the answer of a turn arrives
enum Delivery {
    /// Incremental `data:` frames from the primary transport
    Frames(Box<dyn ChunkStream>),
    /// One complete body from the secondary transport
    Complete(AnswerBody),
}

enum Progress {
    Done,
    /// The stream broke before a terminal frame
    Broken,
}

/// Holds the single active-turn slot until dropped
struct ActiveTurnGuard<'a> {
    active: &'a AtomicBool,
}

impl<'a> ActiveTurnGuard<'a> {
    fn claim(active: &'a AtomicBool) -> Option<Self> {
        active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { active })
    }
}

impl Drop for ActiveTurnGuard<'_> {
    fn drop(&mut self) {
        self.active.store(false, Ordering::Release);
    }
}

pub struct Orchestrator {
    primary: Arc<dyn PrimaryTransport>,
    secondary: Arc<dyn SecondaryTransport>,
    renderer: Arc<dyn Renderer>,
    store: Arc<dyn ChatSessionStore>,
    config: TurnConfig,
    active: AtomicBool,
    next_turn_id: AtomicU64,
}

impl Orchestrator {
    pub fn new(
        primary: Arc<dyn PrimaryTransport>,
        secondary: Arc<dyn SecondaryTransport>,
        renderer: Arc<dyn Renderer>,
        store: Arc<dyn ChatSessionStore>,
        config: TurnConfig,
    ) -> Self {
        Self {
            primary,
            secondary,
            renderer,
            store,
            config,
            active: AtomicBool::new(false),
            next_turn_id: AtomicU64::new(1),
        }
    }

    /// Use one HTTP client for both transports
    pub fn with_http(
        config: &ClientConfig,
        renderer: Arc<dyn Renderer>,
        store: Arc<dyn ChatSessionStore>,
    ) -> Result<Self, TransportError> {
        let transport = Arc::new(HttpTransport::new(config.transport.clone())?);
        Ok(Self::new(
            transport.clone(),
            transport,
            renderer,
            store,
            config.turn.clone(),
        ))
    }

    pub fn is_busy(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Run one turn to its terminal state.
    ///
    /// Rejects the query while another turn is active. The finished turn is
    /// rendered, handed to the store and returned. A cancelled turn is dropped
    /// without any further notification.
    pub async fn submit(
        &self,
        query: &str,
        document_scope: DocumentScope,
        cancel: &CancellationToken,
    ) -> Result<Turn, SubmitError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(SubmitError::EmptyQuery);
        }

        let _guard = ActiveTurnGuard::claim(&self.active).ok_or(SubmitError::TurnInProgress)?;

        let turn_id = self.next_turn_id.fetch_add(1, Ordering::Relaxed);
        let mut turn = Turn::new(
            turn_id,
            query,
            document_scope,
            self.config.reasoning_capacity,
        );
        info!(
            "Turn {}: submitted with {} document(s) in scope",
            turn_id,
            turn.document_scope.len()
        );

        match self.run(&mut turn, cancel).await {
            Ok(()) => {}
            Err(Interrupt::Cancelled) => {
                info!("Turn {}: cancelled while {}", turn_id, turn.state());
                return Err(SubmitError::Cancelled { turn_id });
            }
            Err(Interrupt::Invalid(e)) => {
                error!("Turn {}: {}", turn_id, e);
                return Err(e.into());
            }
        }

        self.notify_terminal(&turn);

        if let Err(e) = self.store.append_turn(&turn) {
            error!("Turn {}: failed to store: {:#}", turn_id, e);
        }

        info!("Turn {}: finished as {}", turn_id, turn.state());
        Ok(turn)
    }

    async fn run(&self, turn: &mut Turn, cancel: &CancellationToken) -> Result<(), Interrupt> {
        turn.transition(TurnState::Streaming)?;

        let request = TurnRequest::streaming(turn);
        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Interrupt::Cancelled),
            opened = self.primary.open_stream(&request) => opened,
        };

        let failure = match opened {
            Ok(chunks) => match self.deliver(turn, Delivery::Frames(chunks), cancel).await? {
                Progress::Done => return Ok(()),
                Progress::Broken => ErrorKind::StreamReadFailure,
            },
            Err(e) => {
                warn!("Turn {}: could not open stream: {}", turn.id, e);
                ErrorKind::TransportOpenFailure
            }
        };

        turn.record_stream_failure(failure);
        turn.transition(TurnState::StreamFailed)?;
        self.fall_back(turn, cancel).await
    }

    async fn fall_back(&self, turn: &mut Turn, cancel: &CancellationToken) -> Result<(), Interrupt> {
        turn.transition(TurnState::FallingBack)?;

        let request = TurnRequest::complete(turn);
        let fetched = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Interrupt::Cancelled),
            fetched = self.secondary.fetch_complete(&request) => fetched,
        };

        match fetched.and_then(|body| decode_complete_body(&body)) {
            Ok(answer) => {
                self.deliver(turn, Delivery::Complete(answer), cancel).await?;
                Ok(())
            }
            Err(e) => {
                error!("Turn {}: fallback failed: {}", turn.id, e);
                turn.fail(
                    ErrorKind::FallbackTransportFailure,
                    self.config.fallback_error_message.clone(),
                )?;
                Ok(())
            }
        }
    }

    async fn deliver(
        &self,
        turn: &mut Turn,
        delivery: Delivery,
        cancel: &CancellationToken,
    ) -> Result<Progress, Interrupt> {
        match delivery {
            Delivery::Frames(chunks) => self.deliver_frames(turn, chunks, cancel).await,
            Delivery::Complete(body) => {
                let before = turn.reasoning().snapshot();
                let answer = extract_reasoning(&body.answer, turn.reasoning_mut());
                if turn.reasoning().snapshot() != before {
                    self.notify_reasoning(turn);
                }
                turn.complete(Some(answer), body.citations, body.message_count)?;
                Ok(Progress::Done)
            }
        }
    }

    async fn deliver_frames(
        &self,
        turn: &mut Turn,
        chunks: Box<dyn ChunkStream>,
        cancel: &CancellationToken,
    ) -> Result<Progress, Interrupt> {
        let lines = line_stream(chunks);
        futures::pin_mut!(lines);

        loop {
            let line = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Interrupt::Cancelled),
                line = lines.next() => line,
            };

            let line = match line {
                Some(Ok(line)) => line,
                Some(Err(e)) => {
                    warn!("Turn {}: stream broke: {}", turn.id, e);
                    return Ok(Progress::Broken);
                }
                None => {
                    warn!("Turn {}: stream ended without a final answer", turn.id);
                    return Ok(Progress::Broken);
                }
            };

            let payload = match Frame::classify(&line).kind {
                FrameKind::Ignored => {
                    trace!("Turn {}: ignoring line {:?}", turn.id, line);
                    continue;
                }
                FrameKind::Sentinel => {
                    debug!("Turn {}: end of stream before a structured answer", turn.id);
                    turn.complete(None, Vec::new(), None)?;
                    return Ok(Progress::Done);
                }
                FrameKind::Data(payload) => payload,
            };

            match decode_payload(payload) {
                DecodedPayload::Fragment(text) => {
                    if turn.reasoning_mut().append(&text) {
                        self.notify_reasoning(turn);
                    }
                }
                DecodedPayload::Structured(body) => {
                    turn.complete(Some(body.answer), body.citations, body.message_count)?;
                    return Ok(Progress::Done);
                }
                DecodedPayload::ServerError(message) => {
                    warn!("Turn {}: server reported: {}", turn.id, message);
                    return Ok(Progress::Broken);
                }
            }
        }
    }

    fn notify_reasoning(&self, turn: &Turn) {
        self.notify(RenderEvent::Reasoning {
            turn_id: turn.id,
            snapshot: turn.reasoning().snapshot(),
        });
    }

    fn notify_terminal(&self, turn: &Turn) {
        let event = match turn.error() {
            Some(kind) if kind.is_user_visible() => RenderEvent::Error {
                turn_id: turn.id,
                message: turn.final_answer().unwrap_or_default().to_string(),
                kind,
            },
            _ => RenderEvent::Answer {
                turn_id: turn.id,
                answer: turn.final_answer().map(str::to_string),
                citations: turn.citations().to_vec(),
            },
        };
        self.notify(event);
    }

    fn notify(&self, event: RenderEvent) {
        if let Err(e) = self.renderer.render(&event) {
            warn!("Turn {}: renderer failed: {}", event.turn_id(), e);
        }
    }
}
