//! Core of the Atelier coding assistant: the streaming artifact parser, the
//! per-artifact action runner, the auxiliary LLM-pass grammars, and the
//! chat-turn orchestration that ties them together.

pub mod action_runner;
pub mod actions;
pub mod alerts;
pub mod attributes;
pub mod context_selection;
pub mod message_parser;
pub mod prompts;
pub mod summary;
pub mod turn;

pub use action_runner::{ActionEntry, ActionRunner, RunnerContext};
pub use actions::{ActionKind, ActionState, ActionTagError, SupabaseOperation};
pub use alerts::{ActionAlert, AlertSink, AlertSource, NullAlertSink};
pub use context_selection::{
    parse_context_update, ContextBuffer, ContextSelectionError, ContextUpdate, MAX_CONTEXT_FILES,
};
pub use message_parser::{
    ActionData, ArtifactData, ChannelSink, NullSink, ParserEvent, ParserOptions, ParserSink,
    StreamingMessageParser, INTERNAL_ARTIFACT_TYPE,
};
pub use turn::{
    ChatTurn, ClientSink, NullClientSink, TurnError, TurnOutcome, TurnPhase, TurnRequest,
};
