use super::{PrimaryTransport, SecondaryTransport, TransportError, TurnRequest};
use crate::config::TransportConfig;
use crate::streaming::{ChunkStream, HttpChunkStream};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use std::time::Duration;
use tracing::debug;

/// Both transports over plain HTTP against the chat backend
pub struct HttpTransport {
    client: Client,
    config: TransportConfig,
}

impl HttpTransport {
    pub fn new(config: TransportConfig) -> Result<Self, TransportError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    fn get_url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn post(&self, path: &str, request: &TurnRequest) -> RequestBuilder {
        let url = self.get_url(path);
        debug!("POST {} (stream: {})", url, request.stream);

        let mut request_builder = self.client.post(url).json(request);
        if let Some(token) = &self.config.auth_token {
            request_builder = request_builder.bearer_auth(token);
        }
        request_builder
    }
}

/// Longest error text kept from a failed response
const ERROR_BODY_LIMIT: usize = 512;
/// How long a failed response may take to deliver its first bytes
const ERROR_BODY_WAIT: Duration = Duration::from_millis(500);

/// Turn a non-success status into an error carrying the start of the
/// response text. Only the first chunk is read: a failed stream response
/// may never finish its body.
async fn check_response_error(mut response: Response) -> Result<Response, TransportError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = match tokio::time::timeout(ERROR_BODY_WAIT, response.chunk()).await {
        Ok(Ok(Some(chunk))) => {
            String::from_utf8_lossy(&chunk[..chunk.len().min(ERROR_BODY_LIMIT)]).into_owned()
        }
        Ok(Ok(None)) => String::new(),
        Ok(Err(_)) | Err(_) => "Unknown error".to_string(),
    };
    Err(TransportError::Status {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl PrimaryTransport for HttpTransport {
    async fn open_stream(
        &self,
        request: &TurnRequest,
    ) -> Result<Box<dyn ChunkStream>, TransportError> {
        let response = self
            .post(&self.config.stream_path, request)
            .header("Accept", "text/event-stream")
            .send()
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        let response = check_response_error(response).await?;
        Ok(Box::new(HttpChunkStream::new(response)))
    }
}

#[async_trait]
impl SecondaryTransport for HttpTransport {
    async fn fetch_complete(&self, request: &TurnRequest) -> Result<String, TransportError> {
        let response = self
            .post(&self.config.complete_path, request)
            .header("Accept", "application/json")
            .timeout(Duration::from_secs(self.config.request_timeout_secs))
            .send()
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        let response = check_response_error(response).await?;
        response
            .text()
            .await
            .map_err(|e| TransportError::Read(e.to_string()))
    }
}
