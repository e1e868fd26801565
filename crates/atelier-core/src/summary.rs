//! Conversation summary pass.
//!
//! Before context selection, long conversations are condensed by a
//! non-streaming LLM call. The output is opaque structured markdown; it is
//! concatenated into subsequent prompts and never parsed beyond checking
//! that something came back.

use anyhow::Result;
use tracing::debug;

use atelier_providers::{CompletionRequest, LlmProvider, Message};

use crate::prompts;

/// Minimum tokens for summary requests to avoid API errors when the
/// provider is configured with a very small budget.
pub const SUMMARY_MIN_TOKENS: u32 = 1000;

/// Cap on summary output regardless of the provider's configured budget.
pub const SUMMARY_MAX_TOKENS: u32 = 10_000;

/// Clamp the summary budget into [SUMMARY_MIN_TOKENS, SUMMARY_MAX_TOKENS].
pub fn calculate_summary_max_tokens(provider_max_tokens: u32) -> u32 {
    provider_max_tokens
        .min(SUMMARY_MAX_TOKENS)
        .max(SUMMARY_MIN_TOKENS)
}

/// Build the summary request messages from conversation history.
pub fn build_summary_messages(history: &[Message]) -> Vec<Message> {
    let conversation_text = history
        .iter()
        .map(|m| format!("{:?}: {}", m.role, m.content))
        .collect::<Vec<_>>()
        .join("\n\n");

    vec![
        Message::system("You are a helpful assistant that creates concise summaries."),
        Message::user(format!(
            "{}\n\nConversation:\n{}",
            prompts::SUMMARY_PROMPT,
            conversation_text
        )),
    ]
}

/// Run the summary pass and return its markdown output.
pub async fn create_summary(provider: &dyn LlmProvider, history: &[Message]) -> Result<String> {
    let max_tokens = calculate_summary_max_tokens(provider.max_tokens());
    debug!(
        "Requesting conversation summary ({} messages, max_tokens {})",
        history.len(),
        max_tokens
    );

    let request = CompletionRequest {
        messages: build_summary_messages(history),
        max_tokens: Some(max_tokens),
        temperature: Some(0.0),
        stream: false,
    };

    let response = provider.complete(request).await?;
    if response.content.trim().is_empty() {
        anyhow::bail!("summary pass returned empty output");
    }

    Ok(response.content)
}
