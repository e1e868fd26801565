//! Incremental parser for artifact markup in streamed assistant messages.
//!
//! Assistant responses embed `<Artifact ...>` blocks containing ordered
//! `<Action ...>` blocks. Text arrives in arbitrary chunks, so a tag's
//! bracket, name, attributes, or closing bracket may each be split across
//! chunk boundaries. The parser scans forward from a saved per-message
//! position, withholds output only while a prefix could still become a
//! recognized tag, and emits each open/close event exactly once no matter
//! how the input was chunked.
//!
//! **Important**: malformed or near-miss markup is never an error. A `<`
//! that diverges from every recognized tag name is flushed as plain text
//! from the divergence point, ordinary HTML passes through untouched, and
//! an unterminated tag at the end of the stream simply stays buffered until
//! more text arrives.

use std::collections::HashMap;

use tokio::sync::mpsc::UnboundedSender;
use tracing::warn;

use crate::actions::ActionKind;
use crate::attributes::extract_attribute;

const ARTIFACT_TAG_OPEN: &str = "<Artifact";
const ARTIFACT_TAG_CLOSE: &str = "</Artifact>";
const ACTION_TAG_OPEN: &str = "<Action";
const ACTION_TAG_CLOSE: &str = "</Action>";

/// Artifact `type` value reserved for internally-generated artifacts
/// (scaffold templates). Never surfaced in display output.
pub const INTERNAL_ARTIFACT_TYPE: &str = "bundled";

/// Data passed to artifact open/close callbacks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactData {
    pub message_id: String,
    pub id: String,
    pub title: String,
    pub artifact_type: Option<String>,
}

impl ArtifactData {
    /// Whether this artifact uses the reserved internal type.
    pub fn is_internal(&self) -> bool {
        self.artifact_type.as_deref() == Some(INTERNAL_ARTIFACT_TYPE)
    }
}

/// Data passed to action open/stream/close callbacks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionData {
    pub message_id: String,
    pub artifact_id: String,
    /// Artifact-scoped monotonically increasing identifier.
    pub action_id: u32,
    pub kind: ActionKind,
    /// Empty at open, partial at stream updates, final at close.
    pub content: String,
}

/// Callbacks invoked as tags are recognized. All methods default to no-ops
/// so implementors only override what they consume.
pub trait ParserSink: Send + Sync {
    fn on_artifact_open(&self, _data: &ArtifactData) {}
    fn on_artifact_close(&self, _data: &ArtifactData) {}
    fn on_action_open(&self, _data: &ActionData) {}
    fn on_action_stream(&self, _data: &ActionData) {}
    fn on_action_close(&self, _data: &ActionData) {}
}

/// A sink that ignores every event.
pub struct NullSink;

impl ParserSink for NullSink {}

/// Parser event in enum form, for sinks that forward over a channel.
#[derive(Debug, Clone, PartialEq)]
pub enum ParserEvent {
    ArtifactOpen(ArtifactData),
    ArtifactClose(ArtifactData),
    ActionOpen(ActionData),
    ActionStream(ActionData),
    ActionClose(ActionData),
}

/// Forwards parser events into an unbounded channel so the consumer can
/// drain them without blocking the parse loop (submit-and-continue).
pub struct ChannelSink {
    tx: UnboundedSender<ParserEvent>,
}

impl ChannelSink {
    pub fn new(tx: UnboundedSender<ParserEvent>) -> Self {
        Self { tx }
    }
}

impl ParserSink for ChannelSink {
    fn on_artifact_open(&self, data: &ArtifactData) {
        let _ = self.tx.send(ParserEvent::ArtifactOpen(data.clone()));
    }
    fn on_artifact_close(&self, data: &ArtifactData) {
        let _ = self.tx.send(ParserEvent::ArtifactClose(data.clone()));
    }
    fn on_action_open(&self, data: &ActionData) {
        let _ = self.tx.send(ParserEvent::ActionOpen(data.clone()));
    }
    fn on_action_stream(&self, data: &ActionData) {
        let _ = self.tx.send(ParserEvent::ActionStream(data.clone()));
    }
    fn on_action_close(&self, data: &ActionData) {
        let _ = self.tx.send(ParserEvent::ActionClose(data.clone()));
    }
}

/// Display and streaming options for the parser.
pub struct ParserOptions {
    /// Spliced into the display output where an artifact opens. `None`
    /// leaves nothing behind. Internal artifacts never get a placeholder.
    pub artifact_placeholder: Option<Box<dyn Fn(&ArtifactData) -> String + Send + Sync>>,
    /// Emit `on_action_stream` updates for file actions while their body is
    /// still streaming. Correctness never depends on these updates; they
    /// enable progressive writes for live preview.
    pub stream_file_actions: bool,
}

impl Default for ParserOptions {
    fn default() -> Self {
        Self {
            artifact_placeholder: None,
            stream_file_actions: true,
        }
    }
}

/// Per-message scan state. Created on the first `parse` call for a message
/// id; discarded when the parser is dropped or `reset`.
#[derive(Default)]
struct MessageState {
    /// Byte offset into the accumulated message text already consumed.
    position: usize,
    inside_artifact: bool,
    inside_action: bool,
    current_artifact: Option<ArtifactData>,
    current_action: Option<PendingAction>,
    /// Next action id, reset to 0 at each artifact open.
    action_id: u32,
}

struct PendingAction {
    kind: ActionKind,
    content: String,
}

/// Streaming message parser.
///
/// `parse` receives the *entire* accumulated text for a message id and
/// returns only the newly-produced display text, re-scanning from the saved
/// position. Callbacks fire exactly once per tag instance across any
/// chunking of the input.
pub struct StreamingMessageParser<S: ParserSink> {
    sink: S,
    options: ParserOptions,
    states: HashMap<String, MessageState>,
}

impl<S: ParserSink> StreamingMessageParser<S> {
    pub fn new(sink: S) -> Self {
        Self::with_options(sink, ParserOptions::default())
    }

    pub fn with_options(sink: S, options: ParserOptions) -> Self {
        Self {
            sink,
            options,
            states: HashMap::new(),
        }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Drop all per-message state.
    pub fn reset(&mut self) {
        self.states.clear();
    }

    /// Parse the accumulated `input` for `message_id`, returning the display
    /// text produced by this call (recognized markup stripped).
    pub fn parse(&mut self, message_id: &str, input: &str) -> String {
        // Take the state out of the map for the duration of the scan so the
        // borrow checker lets us call sink methods while mutating it.
        let mut state = self.states.remove(message_id).unwrap_or_default();
        let mut output = String::new();
        let mut i = state.position;

        while i < input.len() {
            if state.inside_artifact {
                if state.inside_action {
                    let Some(pending) = state.current_action.as_mut() else {
                        // Unreachable by construction; recover instead of
                        // corrupting the scan.
                        state.inside_action = false;
                        continue;
                    };
                    let artifact_id = state
                        .current_artifact
                        .as_ref()
                        .map(|a| a.id.clone())
                        .unwrap_or_default();

                    if let Some(rel) = input[i..].find(ACTION_TAG_CLOSE) {
                        let close = i + rel;
                        pending.content.push_str(&input[i..close]);

                        let mut content = pending.content.trim().to_string();
                        if pending.kind.is_file() {
                            content.push('\n');
                        }

                        let data = ActionData {
                            message_id: message_id.to_string(),
                            artifact_id,
                            action_id: state.action_id.saturating_sub(1),
                            kind: pending.kind.clone(),
                            content,
                        };
                        self.sink.on_action_close(&data);

                        state.inside_action = false;
                        state.current_action = None;
                        i = close + ACTION_TAG_CLOSE.len();
                    } else {
                        // Body still streaming; report partial content for
                        // file actions and wait for more input.
                        if self.options.stream_file_actions && pending.kind.is_file() {
                            let mut content = pending.content.clone();
                            content.push_str(&input[i..]);
                            let data = ActionData {
                                message_id: message_id.to_string(),
                                artifact_id,
                                action_id: state.action_id.saturating_sub(1),
                                kind: pending.kind.clone(),
                                content,
                            };
                            self.sink.on_action_stream(&data);
                        }
                        break;
                    }
                } else {
                    let action_open = input[i..].find(ACTION_TAG_OPEN).map(|rel| i + rel);
                    let artifact_close = input[i..].find(ARTIFACT_TAG_CLOSE).map(|rel| i + rel);

                    match (action_open, artifact_close) {
                        (Some(open), close) if close.map_or(true, |c| open < c) => {
                            let Some(end_rel) = input[open..].find('>') else {
                                // Opening action tag not fully buffered yet
                                break;
                            };
                            let tag_end = open + end_rel;
                            let tag = &input[open..=tag_end];

                            match ActionKind::from_tag(tag) {
                                Ok(kind) => {
                                    let artifact_id = state
                                        .current_artifact
                                        .as_ref()
                                        .map(|a| a.id.clone())
                                        .unwrap_or_default();
                                    let data = ActionData {
                                        message_id: message_id.to_string(),
                                        artifact_id,
                                        action_id: state.action_id,
                                        kind: kind.clone(),
                                        content: String::new(),
                                    };
                                    state.action_id += 1;
                                    state.current_action = Some(PendingAction {
                                        kind,
                                        content: String::new(),
                                    });
                                    state.inside_action = true;
                                    self.sink.on_action_open(&data);
                                }
                                Err(e) => {
                                    warn!(
                                        "Skipping malformed action tag in message {}: {}",
                                        message_id, e
                                    );
                                }
                            }
                            i = tag_end + 1;
                        }
                        (_, Some(close)) => {
                            if let Some(artifact) = state.current_artifact.take() {
                                self.sink.on_artifact_close(&artifact);
                            }
                            state.inside_artifact = false;
                            i = close + ARTIFACT_TAG_CLOSE.len();
                        }
                        // Neither tag complete yet; text between tags inside
                        // an artifact is not display output, so just wait.
                        _ => break,
                    }
                }
            } else {
                let Some(c) = input[i..].chars().next() else {
                    break;
                };

                if c == '<' && !input[i + 1..].starts_with('/') {
                    match self.scan_artifact_open(message_id, &mut state, input, i, &mut output) {
                        ScanOutcome::Advanced(next) => i = next,
                        ScanOutcome::NeedMoreInput => break,
                    }
                } else {
                    output.push(c);
                    i += c.len_utf8();
                }
            }
        }

        state.position = i;
        self.states.insert(message_id.to_string(), state);
        output
    }

    /// Attempt to recognize `<Artifact ...>` starting at byte offset `i`
    /// (which holds `<`). Flushes plain text to `output` on divergence.
    fn scan_artifact_open(
        &self,
        message_id: &str,
        state: &mut MessageState,
        input: &str,
        i: usize,
        output: &mut String,
    ) -> ScanOutcome {
        let bytes = input.as_bytes();
        let tag = ARTIFACT_TAG_OPEN.as_bytes();

        let mut j = i;
        let mut matched = 0;

        while j < bytes.len() && matched < tag.len() {
            if bytes[j] == tag[matched] {
                matched += 1;
                j += 1;
            } else {
                // Diverged: flush up to and including the divergent
                // character, then resume scanning right after it.
                let char_len = input[j..].chars().next().map(|c| c.len_utf8()).unwrap_or(1);
                output.push_str(&input[i..j + char_len]);
                return ScanOutcome::Advanced(j + char_len);
            }
        }

        if matched < tag.len() {
            // Ran out of input on a still-valid prefix; wait for more.
            return ScanOutcome::NeedMoreInput;
        }

        // Full tag name matched; it must be followed by '>' or whitespace,
        // otherwise this is a longer, unrecognized name (e.g. <Artifactt>).
        match input[j..].chars().next() {
            None => return ScanOutcome::NeedMoreInput,
            Some(next) if next != '>' && next != ' ' => {
                output.push_str(&input[i..j]);
                return ScanOutcome::Advanced(j);
            }
            Some(_) => {}
        }

        let Some(end_rel) = input[j..].find('>') else {
            // Attributes still streaming
            return ScanOutcome::NeedMoreInput;
        };
        let tag_end = j + end_rel;

        let artifact = parse_artifact_tag(message_id, &input[i..=tag_end]);

        if !artifact.is_internal() {
            if let Some(placeholder) = &self.options.artifact_placeholder {
                output.push_str(&placeholder(&artifact));
            }
        }

        self.sink.on_artifact_open(&artifact);
        state.inside_artifact = true;
        state.action_id = 0;
        state.current_artifact = Some(artifact);

        ScanOutcome::Advanced(tag_end + 1)
    }
}

enum ScanOutcome {
    /// Continue scanning from this byte offset.
    Advanced(usize),
    /// A prefix could still become a recognized tag; stop and keep the
    /// position before it.
    NeedMoreInput,
}

fn parse_artifact_tag(message_id: &str, tag: &str) -> ArtifactData {
    let id = extract_attribute(tag, "id").unwrap_or_else(|| {
        warn!("Artifact tag missing 'id' attribute in message {}", message_id);
        String::new()
    });
    let title = extract_attribute(tag, "title").unwrap_or_else(|| {
        warn!(
            "Artifact tag missing 'title' attribute in message {}",
            message_id
        );
        String::new()
    });
    let artifact_type = extract_attribute(tag, "type");

    ArtifactData {
        message_id: message_id.to_string(),
        id,
        title,
        artifact_type,
    }
}
