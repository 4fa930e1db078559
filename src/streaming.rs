//! Line reassembly for chunked response bodies
//!
//! Chunks arrive with no framing guarantee: a line may be split anywhere,
//! including inside a multi-byte character. Bytes are buffered until a
//! newline is seen and only complete lines are decoded and handed on.

use crate::transport::TransportError;
use async_trait::async_trait;
use futures::stream::{self, Stream};
use reqwest::Response;
use tracing::debug;

/// Source of raw body chunks (live HTTP response or scripted test data)
#[async_trait]
pub trait ChunkStream: Send {
    /// Next chunk, `None` at end of body
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, TransportError>;
}

/// Real HTTP response chunk stream. Dropping it releases the connection.
pub struct HttpChunkStream {
    response: Response,
}

impl HttpChunkStream {
    pub fn new(response: Response) -> Self {
        Self { response }
    }
}

#[async_trait]
impl ChunkStream for HttpChunkStream {
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        match self.response.chunk().await {
            Ok(Some(chunk)) => Ok(Some(chunk.to_vec())),
            Ok(None) => Ok(None),
            Err(e) => Err(TransportError::Read(e.to_string())),
        }
    }
}

/// Buffers partial lines across chunk boundaries
#[derive(Debug, Clone, Default)]
pub struct LineBuffer {
    buffer: Vec<u8>,
    // bytes of `buffer` already known to contain no newline
    scanned: usize,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    /// Push a chunk and iterate over the lines it completes
    pub fn feed(&mut self, chunk: &[u8]) -> Lines<'_> {
        self.push(chunk);
        Lines { buffer: self }
    }

    /// Take the next complete line with its newline stripped
    pub fn next_line(&mut self) -> Option<Result<String, TransportError>> {
        let offset = match self.buffer[self.scanned..].iter().position(|b| *b == b'\n') {
            Some(offset) => offset,
            None => {
                self.scanned = self.buffer.len();
                return None;
            }
        };

        let end = self.scanned + offset;
        let mut line: Vec<u8> = self.buffer.drain(..=end).collect();
        line.pop();
        self.scanned = 0;

        Some(String::from_utf8(line).map_err(|e| TransportError::Decode(e.to_string())))
    }

    /// Bytes waiting for a newline
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// End of input: drop the unterminated remainder, returning its size
    pub fn finish(&mut self) -> usize {
        let discarded = self.buffer.len();
        self.buffer.clear();
        self.scanned = 0;
        discarded
    }
}

pub struct Lines<'a> {
    buffer: &'a mut LineBuffer,
}

impl Iterator for Lines<'_> {
    type Item = Result<String, TransportError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.buffer.next_line()
    }
}

/// Lazily turn a chunk source into complete lines.
///
/// A chunk is only requested once every line of the previous one has been
/// consumed, so dropping the stream early stops reading the body.
pub fn line_stream(
    chunks: Box<dyn ChunkStream>,
) -> impl Stream<Item = Result<String, TransportError>> + Send {
    stream::unfold(Some((chunks, LineBuffer::new())), |state| async move {
        let (mut chunks, mut lines) = state?;
        loop {
            if let Some(line) = lines.next_line() {
                return Some((line, Some((chunks, lines))));
            }

            match chunks.next_chunk().await {
                Ok(Some(chunk)) => lines.push(&chunk),
                Ok(None) => {
                    let discarded = lines.finish();
                    if discarded > 0 {
                        debug!("Discarding {} bytes of unterminated trailing data", discarded);
                    }
                    return None;
                }
                Err(e) => return Some((Err(e), None)),
            }
        }
    })
}
