use crate::persistence::ChatSessionStore;
use crate::streaming::ChunkStream;
use crate::transport::{PrimaryTransport, SecondaryTransport, TransportError, TurnRequest};
use crate::types::Turn;
use crate::ui::{RenderError, RenderEvent, Renderer};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// What happens once the scripted chunks are used up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    Eof,
    /// Connection reset
    Reset,
    /// Never returns, like a server that stopped sending
    Hang,
}

pub struct ScriptedChunkStream {
    chunks: VecDeque<Vec<u8>>,
    end: StreamEnd,
    reads: Arc<AtomicUsize>,
}

impl ScriptedChunkStream {
    pub fn new(chunks: Vec<&str>) -> Self {
        Self::from_bytes(chunks.into_iter().map(|c| c.as_bytes().to_vec()).collect())
    }

    pub fn from_bytes(chunks: Vec<Vec<u8>>) -> Self {
        Self {
            chunks: chunks.into(),
            end: StreamEnd::Eof,
            reads: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn then_reset(mut self) -> Self {
        self.end = StreamEnd::Reset;
        self
    }

    fn with_end(mut self, end: StreamEnd) -> Self {
        self.end = end;
        self
    }

    fn counting_into(mut self, reads: Arc<AtomicUsize>) -> Self {
        self.reads = reads;
        self
    }

    /// Number of `next_chunk` calls made so far
    pub fn reads(&self) -> Arc<AtomicUsize> {
        self.reads.clone()
    }
}

#[async_trait]
impl ChunkStream for ScriptedChunkStream {
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if let Some(chunk) = self.chunks.pop_front() {
            return Ok(Some(chunk));
        }

        match self.end {
            StreamEnd::Eof => Ok(None),
            StreamEnd::Reset => Err(TransportError::Read("connection reset by peer".to_string())),
            StreamEnd::Hang => futures::future::pending().await,
        }
    }
}

#[derive(Debug, Clone)]
pub enum PrimaryScript {
    /// Open fails with this status
    Refuse(u16),
    /// Open never completes
    HangOnOpen,
    Stream(Vec<String>, StreamEnd),
}

impl PrimaryScript {
    pub fn stream(chunks: &[&str]) -> Self {
        PrimaryScript::Stream(chunks.iter().map(|c| c.to_string()).collect(), StreamEnd::Eof)
    }

    pub fn stream_then(chunks: &[&str], end: StreamEnd) -> Self {
        PrimaryScript::Stream(chunks.iter().map(|c| c.to_string()).collect(), end)
    }
}

pub struct ScriptedPrimary {
    script: PrimaryScript,
    opens: AtomicUsize,
    reads: Arc<AtomicUsize>,
    requests: Mutex<Vec<TurnRequest>>,
}

impl ScriptedPrimary {
    pub fn new(script: PrimaryScript) -> Arc<Self> {
        Arc::new(Self {
            script,
            opens: AtomicUsize::new(0),
            reads: Arc::new(AtomicUsize::new(0)),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Chunk reads over every stream this transport handed out
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<TurnRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl PrimaryTransport for ScriptedPrimary {
    async fn open_stream(
        &self,
        request: &TurnRequest,
    ) -> Result<Box<dyn ChunkStream>, TransportError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());

        match &self.script {
            PrimaryScript::Refuse(status) => Err(TransportError::Status {
                status: *status,
                body: "Service Unavailable".to_string(),
            }),
            PrimaryScript::HangOnOpen => futures::future::pending().await,
            PrimaryScript::Stream(chunks, end) => Ok(Box::new(
                ScriptedChunkStream::new(chunks.iter().map(String::as_str).collect())
                    .with_end(*end)
                    .counting_into(self.reads.clone()),
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub enum SecondaryScript {
    Body(String),
    Status(u16),
    Hang,
}

pub struct ScriptedSecondary {
    script: SecondaryScript,
    calls: AtomicUsize,
    requests: Mutex<Vec<TurnRequest>>,
}

impl ScriptedSecondary {
    pub fn new(script: SecondaryScript) -> Arc<Self> {
        Arc::new(Self {
            script,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<TurnRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl SecondaryTransport for ScriptedSecondary {
    async fn fetch_complete(&self, request: &TurnRequest) -> Result<String, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());

        match &self.script {
            SecondaryScript::Body(body) => Ok(body.clone()),
            SecondaryScript::Status(status) => Err(TransportError::Status {
                status: *status,
                body: "Internal Server Error".to_string(),
            }),
            SecondaryScript::Hang => futures::future::pending().await,
        }
    }
}

/// Records every event; optionally fails each call after recording it
#[derive(Default)]
pub struct RecordingRenderer {
    events: Mutex<Vec<RenderEvent>>,
    failing: bool,
}

impl RecordingRenderer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            events: Mutex::new(Vec::new()),
            failing: true,
        })
    }

    pub fn events(&self) -> Vec<RenderEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn reasoning_snapshots(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                RenderEvent::Reasoning { snapshot, .. } => Some(snapshot),
                _ => None,
            })
            .collect()
    }
}

impl Renderer for RecordingRenderer {
    fn render(&self, event: &RenderEvent) -> Result<(), RenderError> {
        self.events.lock().unwrap().push(event.clone());
        if self.failing {
            return Err(RenderError::Unavailable("window closed".to_string()));
        }
        Ok(())
    }
}

/// Store that refuses everything
pub struct BrokenStore;

impl ChatSessionStore for BrokenStore {
    fn append_turn(&self, _turn: &Turn) -> Result<()> {
        anyhow::bail!("disk full")
    }
}
