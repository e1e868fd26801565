//! Chat-turn orchestration.
//!
//! A turn moves through `idle -> summarizing (if file context exists) ->
//! selecting-context -> generating -> (continuing while truncated) ->
//! complete`. The generation stream feeds the message parser; parser events
//! are drained into per-artifact action runners without blocking the parse
//! loop. Output truncated by the model's length limit triggers a bounded
//! continuation that reuses the same message id, so parser state and
//! artifact ids carry over and the action queue keeps its order.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use atelier_config::ChatConfig;
use atelier_providers::{
    is_length_limit_stop, CompletionRequest, Message, ProviderRegistry, Usage,
};

use crate::action_runner::{ActionRunner, RunnerContext};
use crate::context_selection::{parse_context_update, ContextBuffer, ContextSelectionError};
use crate::message_parser::{ChannelSink, ParserEvent, StreamingMessageParser};
use crate::{prompts, summary};

/// Phases of a chat turn, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    Idle,
    Summarizing,
    SelectingContext,
    Generating,
    Continuing,
    Complete,
}

/// Receiver for the annotated output stream relayed to the client.
/// All methods default to no-ops.
pub trait ClientSink: Send + Sync {
    fn on_text(&self, _text: &str) {}
    fn on_phase(&self, _phase: TurnPhase) {}
    fn on_usage(&self, _usage: &Usage) {}
}

/// A client sink that ignores everything.
pub struct NullClientSink;

impl ClientSink for NullClientSink {}

#[derive(Debug, thiserror::Error)]
pub enum TurnError {
    #[error("cannot continue response: maximum of {0} segments reached")]
    MaxSegmentsReached(u32),
    #[error("context selection failed: {0}")]
    ContextSelection(#[from] ContextSelectionError),
    #[error("turn cancelled")]
    Cancelled,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Input for one chat turn.
#[derive(Debug, Clone)]
pub struct TurnRequest {
    /// Identifier for the assistant message being generated. Stable across
    /// continuation segments of the same turn.
    pub message_id: String,
    /// The user's prompt for this turn.
    pub prompt: String,
    /// Prior conversation messages.
    pub history: Vec<Message>,
}

/// Result of a completed chat turn.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    /// Markup-stripped text suitable for display.
    pub display_text: String,
    /// The raw assistant response including markup.
    pub response_text: String,
    /// Token usage accumulated across all segments.
    pub usage: Usage,
    /// Number of generation segments used (1 = no continuation).
    pub segments: u32,
}

/// Orchestrates chat turns against one project.
///
/// Owns the context buffer and the per-artifact action runners, both of
/// which persist across turns so a "continue" follow-up reuses the same
/// artifact queue.
pub struct ChatTurn {
    providers: Arc<ProviderRegistry>,
    runner_ctx: RunnerContext,
    client: Arc<dyn ClientSink>,
    chat: ChatConfig,
    cancellation: CancellationToken,
    context: ContextBuffer,
    runners: HashMap<String, ActionRunner>,
    phase: TurnPhase,
}

impl ChatTurn {
    pub fn new(
        providers: Arc<ProviderRegistry>,
        runner_ctx: RunnerContext,
        client: Arc<dyn ClientSink>,
        chat: ChatConfig,
    ) -> Self {
        let context = ContextBuffer::new(chat.max_context_files);
        Self {
            providers,
            runner_ctx,
            client,
            chat,
            cancellation: CancellationToken::new(),
            context,
            runners: HashMap::new(),
            phase: TurnPhase::Idle,
        }
    }

    /// Token observed by the streaming loop; cancel it to stop the turn.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    pub fn phase(&self) -> TurnPhase {
        self.phase
    }

    pub fn context(&self) -> &ContextBuffer {
        &self.context
    }

    pub fn runner(&self, artifact_id: &str) -> Option<&ActionRunner> {
        self.runners.get(artifact_id)
    }

    fn set_phase(&mut self, phase: TurnPhase) {
        self.phase = phase;
        self.client.on_phase(phase);
    }

    fn cancel_runners(&self) {
        for runner in self.runners.values() {
            runner.cancel();
        }
    }

    /// Run one chat turn to completion.
    pub async fn run(&mut self, request: TurnRequest) -> Result<TurnOutcome, TurnError> {
        let provider = self.providers.get(None)?;
        let project_files = self.runner_ctx.fs.list()?;

        // Summary pass, only when file context already exists
        let mut summary_text = None;
        if self.chat.enable_summary && !self.context.is_empty() && !request.history.is_empty() {
            self.set_phase(TurnPhase::Summarizing);
            summary_text =
                Some(summary::create_summary(provider.as_ref(), &request.history).await?);
        }

        // Context selection pass
        if !project_files.is_empty() {
            self.set_phase(TurnPhase::SelectingContext);
            let selection_request = CompletionRequest {
                messages: vec![
                    Message::system(
                        "You select which project files belong in the context buffer.",
                    ),
                    Message::user(prompts::context_selection_prompt(
                        &project_files,
                        self.context.files(),
                        &request.prompt,
                    )),
                ],
                max_tokens: Some(1000),
                temperature: Some(0.0),
                stream: false,
            };
            let response = provider.complete(selection_request).await?;
            let update = parse_context_update(&response.content)?;
            let known: HashSet<String> = project_files.iter().cloned().collect();
            self.context.apply(&update, &known)?;
            debug!("Context buffer now holds {:?}", self.context.files());
        }

        let base_messages = self.build_messages(&request, summary_text.as_deref());

        // Generation, with bounded continuation on length-limit truncation
        self.set_phase(TurnPhase::Generating);

        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let mut parser = StreamingMessageParser::new(ChannelSink::new(events_tx));

        let mut accumulated = String::new();
        let mut display = String::new();
        let mut usage = Usage::default();
        let mut segments: u32 = 0;

        loop {
            segments += 1;

            let mut messages = base_messages.clone();
            if segments > 1 {
                messages.push(Message::assistant(accumulated.clone()));
                messages.push(Message::user(prompts::CONTINUE_PROMPT));
            }

            let mut stream = provider
                .stream(CompletionRequest {
                    messages,
                    max_tokens: None,
                    temperature: None,
                    stream: true,
                })
                .await?;

            let mut stop_reason: Option<String> = None;

            while let Some(chunk) = stream.next().await {
                if self.cancellation.is_cancelled() {
                    self.cancel_runners();
                    return Err(TurnError::Cancelled);
                }

                let chunk = chunk?;

                if !chunk.content.is_empty() {
                    accumulated.push_str(&chunk.content);
                    let new_text = parser.parse(&request.message_id, &accumulated);
                    if !new_text.is_empty() {
                        display.push_str(&new_text);
                        self.client.on_text(&new_text);
                    }
                    self.drain_events(&mut events_rx).await;
                }

                if let Some(chunk_usage) = &chunk.usage {
                    usage.accumulate(chunk_usage);
                }
                if chunk.finished {
                    stop_reason = chunk.stop_reason.clone();
                }
            }

            self.drain_events(&mut events_rx).await;

            if !is_length_limit_stop(stop_reason.as_deref()) {
                break;
            }
            if segments >= self.chat.max_response_segments {
                return Err(TurnError::MaxSegmentsReached(
                    self.chat.max_response_segments,
                ));
            }

            debug!(
                "Response truncated by length limit; continuing with segment {}",
                segments + 1
            );
            self.set_phase(TurnPhase::Continuing);
        }

        // Let queued actions drain before declaring the turn complete
        for runner in self.runners.values() {
            runner.wait_idle().await;
        }

        self.set_phase(TurnPhase::Complete);
        self.client.on_usage(&usage);

        Ok(TurnOutcome {
            display_text: display,
            response_text: accumulated,
            usage,
            segments,
        })
    }

    fn build_messages(&self, request: &TurnRequest, summary_text: Option<&str>) -> Vec<Message> {
        let root = self.runner_ctx.fs.root().to_string_lossy().to_string();
        let mut messages = vec![Message::system(prompts::system_prompt(&root))];

        if let Some(summary_text) = summary_text {
            messages.push(Message::user(format!(
                "Summary of the conversation so far:\n{}",
                summary_text
            )));
        }

        let mut context_block = String::new();
        for path in self.context.files() {
            match self.runner_ctx.fs.read(path) {
                Ok(content) => {
                    context_block.push_str(&format!("--- {} ---\n{}\n", path, content));
                }
                Err(e) => warn!("Failed to read context file '{}': {}", path, e),
            }
        }
        if !context_block.is_empty() {
            messages.push(Message::user(format!(
                "Current contents of the context buffer:\n{}",
                context_block
            )));
        }

        messages.extend(request.history.iter().cloned());
        messages.push(Message::user(request.prompt.clone()));
        messages
    }

    /// Route parser events into per-artifact runners. Execution happens on
    /// the runner's worker task; this never blocks on it.
    async fn drain_events(&mut self, events_rx: &mut mpsc::UnboundedReceiver<ParserEvent>) {
        while let Ok(event) = events_rx.try_recv() {
            match event {
                ParserEvent::ArtifactOpen(artifact) => {
                    debug!("Artifact '{}' opened: {}", artifact.id, artifact.title);
                    self.runners.entry(artifact.id.clone()).or_insert_with(|| {
                        ActionRunner::new(artifact.id.clone(), self.runner_ctx.clone())
                    });
                }
                ParserEvent::ArtifactClose(artifact) => {
                    debug!("Artifact '{}' closed", artifact.id);
                }
                ParserEvent::ActionOpen(data) => {
                    if let Some(runner) = self.runners.get_mut(&data.artifact_id) {
                        runner.add_action(&data).await;
                    } else {
                        warn!(
                            "Action open for unknown artifact '{}' in message {}",
                            data.artifact_id, data.message_id
                        );
                    }
                }
                ParserEvent::ActionStream(data) => {
                    if let Some(runner) = self.runners.get(&data.artifact_id) {
                        runner.run_action(&data, true).await;
                    }
                }
                ParserEvent::ActionClose(data) => {
                    if let Some(runner) = self.runners.get(&data.artifact_id) {
                        runner.run_action(&data, false).await;
                    }
                }
            }
        }
    }
}
