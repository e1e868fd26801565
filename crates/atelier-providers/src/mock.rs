//! Mock LLM Provider for Testing
//!
//! A configurable mock provider that can simulate various LLM behaviors for
//! integration testing: precise control over streaming chunk boundaries,
//! stop reasons, and multi-turn response sequences.
//!
//! # Example
//!
//! ```rust,ignore
//! use atelier_providers::mock::{MockProvider, MockResponse};
//!
//! // Simple text-only response
//! let provider = MockProvider::new()
//!     .with_response(MockResponse::text("Hello, world!"));
//!
//! // Multi-chunk streaming response
//! let provider = MockProvider::new()
//!     .with_response(MockResponse::streaming(vec!["Hello, ", "world!"]));
//!
//! // Truncated response followed by its continuation
//! let provider = MockProvider::new()
//!     .with_response(MockResponse::truncated("<Artifact id=\"a\" titl"))
//!     .with_response(MockResponse::text("e=\"T\"></Artifact>"));
//! ```

use crate::{
    CompletionChunk, CompletionRequest, CompletionResponse, CompletionStream, LlmProvider, Usage,
};
use anyhow::Result;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// A mock response that can be configured for testing
#[derive(Debug, Clone)]
pub struct MockResponse {
    /// Chunks to stream
    pub chunks: Vec<MockChunk>,
    /// Usage stats to report
    pub usage: Usage,
}

/// A single chunk in a mock streaming response
#[derive(Debug, Clone)]
pub struct MockChunk {
    pub content: String,
    pub finished: bool,
    pub stop_reason: Option<String>,
}

impl MockChunk {
    /// Create a content chunk (not finished)
    pub fn content(text: &str) -> Self {
        Self {
            content: text.to_string(),
            finished: false,
            stop_reason: None,
        }
    }

    /// Create a final chunk with stop reason
    pub fn finished(stop_reason: &str) -> Self {
        Self {
            content: String::new(),
            finished: true,
            stop_reason: Some(stop_reason.to_string()),
        }
    }
}

impl MockResponse {
    /// Create a simple text-only response (single chunk + finish)
    pub fn text(content: &str) -> Self {
        Self {
            chunks: vec![MockChunk::content(content), MockChunk::finished("stop")],
            usage: usage_for(content.len()),
        }
    }

    /// Create a streaming text response with explicit chunk boundaries
    pub fn streaming(chunks: Vec<&str>) -> Self {
        let total_len: usize = chunks.iter().map(|c| c.len()).sum();
        let mut mock_chunks: Vec<MockChunk> = chunks.into_iter().map(MockChunk::content).collect();
        mock_chunks.push(MockChunk::finished("stop"));

        Self {
            chunks: mock_chunks,
            usage: usage_for(total_len),
        }
    }

    /// Create a response cut off by the output-length limit
    pub fn truncated(content: &str) -> Self {
        Self {
            chunks: vec![MockChunk::content(content), MockChunk::finished("length")],
            usage: usage_for(content.len()),
        }
    }

    /// Stream every character as its own chunk (worst-case chunk boundaries)
    pub fn char_by_char(content: &str) -> Self {
        let mut mock_chunks: Vec<MockChunk> = content
            .chars()
            .map(|c| MockChunk::content(&c.to_string()))
            .collect();
        mock_chunks.push(MockChunk::finished("stop"));

        Self {
            chunks: mock_chunks,
            usage: usage_for(content.len()),
        }
    }
}

fn usage_for(content_len: usize) -> Usage {
    Usage {
        prompt_tokens: 100,
        completion_tokens: content_len as u32 / 4,
        total_tokens: 100 + content_len as u32 / 4,
    }
}

/// Configurable mock provider.
///
/// Responses are consumed in FIFO order, one per `complete`/`stream` call,
/// so a test can script an entire multi-segment turn. Every request is
/// recorded for later inspection.
#[derive(Clone)]
pub struct MockProvider {
    name: String,
    model: String,
    responses: Arc<Mutex<VecDeque<MockResponse>>>,
    requests: Arc<Mutex<Vec<CompletionRequest>>>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            name: "mock".to_string(),
            model: "mock-model".to_string(),
            responses: Arc::new(Mutex::new(VecDeque::new())),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    /// Queue a response; responses are served in the order queued.
    pub fn with_response(self, response: MockResponse) -> Self {
        self.responses.lock().unwrap().push_back(response);
        self
    }

    /// All requests observed so far.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn next_response(&self, request: &CompletionRequest) -> Result<MockResponse> {
        self.requests.lock().unwrap().push(request.clone());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| anyhow::anyhow!("MockProvider has no more queued responses"))
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl LlmProvider for MockProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let response = self.next_response(&request)?;

        let content: String = response
            .chunks
            .iter()
            .map(|c| c.content.as_str())
            .collect();
        let stop_reason = response
            .chunks
            .iter()
            .rev()
            .find_map(|c| c.stop_reason.clone());

        Ok(CompletionResponse {
            content,
            usage: response.usage,
            model: self.model.clone(),
            stop_reason,
        })
    }

    async fn stream(&self, request: CompletionRequest) -> Result<CompletionStream> {
        let response = self.next_response(&request)?;
        let (tx, rx) = mpsc::channel(100);

        tokio::spawn(async move {
            let last = response.chunks.len().saturating_sub(1);
            for (i, chunk) in response.chunks.into_iter().enumerate() {
                let usage = if i == last {
                    Some(response.usage.clone())
                } else {
                    None
                };
                let out = CompletionChunk {
                    content: chunk.content,
                    finished: chunk.finished,
                    stop_reason: chunk.stop_reason,
                    usage,
                };
                if tx.send(Ok(out)).await.is_err() {
                    break;
                }
            }
        });

        Ok(ReceiverStream::new(rx))
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn max_tokens(&self) -> u32 {
        4096
    }

    fn temperature(&self) -> f32 {
        0.0
    }
}
