mod streaming;
pub mod mock;
pub mod openai;

pub use mock::{MockChunk, MockProvider, MockResponse};
pub use openai::OpenAiCompatibleProvider;
pub use streaming::{decode_utf8_streaming, make_final_chunk, make_text_chunk};

use anyhow::Result;
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;

/// Stop reasons that indicate the model hit its output-length limit and the
/// response was cut off mid-stream.
const LENGTH_LIMIT_STOP_REASONS: [&str; 2] = ["length", "max_tokens"];

/// Trait for LLM providers
#[async_trait::async_trait]
pub trait LlmProvider: Send + Sync {
    /// Generate a completion for the given messages
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse>;

    /// Stream a completion for the given messages
    async fn stream(&self, request: CompletionRequest) -> Result<CompletionStream>;

    /// Get the provider name
    fn name(&self) -> &str;

    /// Get the model name
    fn model(&self) -> &str;

    /// Get the configured max_tokens for this provider
    fn max_tokens(&self) -> u32;

    /// Get the configured temperature for this provider
    fn temperature(&self) -> f32;

    /// Fingerprint over the provider name and generation settings.
    ///
    /// Two providers with the same fingerprint are interchangeable for a
    /// request, so the registry caches resolved providers under this key.
    fn fingerprint(&self) -> String {
        settings_fingerprint(self.name(), self.model(), self.max_tokens(), self.temperature())
    }
}

/// Compute the cache key for a (provider, settings) combination.
pub fn settings_fingerprint(name: &str, model: &str, max_tokens: u32, temperature: f32) -> String {
    let mut hasher = Sha256::new();
    hasher.update(name.as_bytes());
    hasher.update(b"\0");
    hasher.update(model.as_bytes());
    hasher.update(b"\0");
    hasher.update(max_tokens.to_le_bytes());
    hasher.update(temperature.to_bits().to_le_bytes());
    let digest = hasher.finalize();
    hex::encode(&digest[..8])
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub messages: Vec<Message>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub stream: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
    #[serde(skip)]
    pub id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl Message {
    /// Generate a unique message ID in format HHMMSS-XXX
    /// where XXX are 3 random alphanumeric characters (upper and lowercase)
    fn generate_id() -> String {
        let now = chrono::Local::now();
        let timestamp = now.format("%H%M%S").to_string();

        let mut rng = rand::thread_rng();
        let random_chars: String = (0..3)
            .map(|_| {
                let chars = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";
                let idx = rng.gen_range(0..chars.len());
                chars[idx] as char
            })
            .collect();

        format!("{}-{}", timestamp, random_chars)
    }

    pub fn new(role: MessageRole, content: String) -> Self {
        Self {
            role,
            content,
            id: Self::generate_id(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageRole::System, content.into())
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content.into())
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content.into())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub content: String,
    pub usage: Usage,
    pub model: String,
    /// Stop reason from the API (e.g., "stop", "end_turn", "length")
    pub stop_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl Usage {
    /// Fold another usage record into this one (used when a turn spans
    /// multiple continuation segments).
    pub fn accumulate(&mut self, other: &Usage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.total_tokens += other.total_tokens;
    }
}

pub type CompletionStream = tokio_stream::wrappers::ReceiverStream<Result<CompletionChunk>>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionChunk {
    pub content: String,
    pub finished: bool,
    /// Stop reason from the API (e.g., "stop", "end_turn", "length", "max_tokens")
    pub stop_reason: Option<String>,
    pub usage: Option<Usage>,
}

impl CompletionChunk {
    /// Whether this chunk signals that output was cut off by a length limit.
    pub fn is_length_limited(&self) -> bool {
        match &self.stop_reason {
            Some(reason) => LENGTH_LIMIT_STOP_REASONS.contains(&reason.as_str()),
            None => false,
        }
    }
}

/// Whether a stop reason indicates truncation by a length limit.
pub fn is_length_limit_stop(stop_reason: Option<&str>) -> bool {
    stop_reason.map_or(false, |r| LENGTH_LIMIT_STOP_REASONS.contains(&r))
}

/// Provider registry for managing multiple LLM providers.
///
/// Providers are registered explicitly at startup (no runtime discovery) and
/// resolved by name. Every registered provider is also indexed by its
/// settings fingerprint so that repeat lookups for the same
/// provider+settings combination hit the cache.
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn LlmProvider>>,
    fingerprint_cache: HashMap<String, Arc<dyn LlmProvider>>,
    default_provider: String,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self {
            providers: HashMap::new(),
            fingerprint_cache: HashMap::new(),
            default_provider: String::new(),
        }
    }

    pub fn register<P: LlmProvider + 'static>(&mut self, provider: P) {
        let name = provider.name().to_string();
        let fingerprint = provider.fingerprint();
        let provider: Arc<dyn LlmProvider> = Arc::new(provider);

        self.fingerprint_cache.insert(fingerprint, provider.clone());
        self.providers.insert(name.clone(), provider);

        if self.default_provider.is_empty() {
            self.default_provider = name;
        }
    }

    pub fn set_default(&mut self, provider_name: &str) -> Result<()> {
        if !self.providers.contains_key(provider_name) {
            anyhow::bail!("Provider '{}' not found", provider_name);
        }
        self.default_provider = provider_name.to_string();
        Ok(())
    }

    pub fn default_provider(&self) -> &str {
        &self.default_provider
    }

    pub fn get(&self, provider_name: Option<&str>) -> Result<Arc<dyn LlmProvider>> {
        let name = provider_name.unwrap_or(&self.default_provider);
        self.providers
            .get(name)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("Provider '{}' not found", name))
    }

    /// Look up a provider by its settings fingerprint.
    pub fn get_cached(&self, fingerprint: &str) -> Option<Arc<dyn LlmProvider>> {
        self.fingerprint_cache.get(fingerprint).cloned()
    }

    pub fn list_providers(&self) -> Vec<&str> {
        self.providers.keys().map(|s| s.as_str()).collect()
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}
