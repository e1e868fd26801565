//! End-to-end chat-turn orchestration tests using the mock provider.

mod support;

use std::sync::{Arc, Mutex};

use atelier_config::ChatConfig;
use atelier_core::{
    ChatTurn, ClientSink, ContextSelectionError, TurnError, TurnPhase, TurnRequest,
};
use atelier_providers::{Message, MockProvider, MockResponse, ProviderRegistry, Usage};
use support::TestEnv;

/// Client sink recording relayed text and phase transitions.
#[derive(Clone, Default)]
struct RecordingClient {
    text: Arc<Mutex<String>>,
    phases: Arc<Mutex<Vec<TurnPhase>>>,
}

impl RecordingClient {
    fn text(&self) -> String {
        self.text.lock().unwrap().clone()
    }

    fn phases(&self) -> Vec<TurnPhase> {
        self.phases.lock().unwrap().clone()
    }
}

impl ClientSink for RecordingClient {
    fn on_text(&self, text: &str) {
        self.text.lock().unwrap().push_str(text);
    }

    fn on_phase(&self, phase: TurnPhase) {
        self.phases.lock().unwrap().push(phase);
    }

    fn on_usage(&self, _usage: &Usage) {}
}

fn chat_config() -> ChatConfig {
    ChatConfig {
        max_response_segments: 2,
        max_context_files: 5,
        enable_summary: true,
    }
}

fn registry_with(provider: MockProvider) -> Arc<ProviderRegistry> {
    let mut registry = ProviderRegistry::new();
    registry.register(provider);
    Arc::new(registry)
}

fn request(prompt: &str) -> TurnRequest {
    TurnRequest {
        message_id: "msg-1".to_string(),
        prompt: prompt.to_string(),
        history: Vec::new(),
    }
}

#[tokio::test]
async fn test_turn_executes_artifact_actions() {
    // Split the response at awkward points, including mid-tag
    let provider = MockProvider::new().with_response(MockResponse::streaming(vec![
        "Setting up. <Arti",
        r#"fact id="demo-app" title="Demo"><Action type="file" filePath="package.json">{"na"#,
        r#"me":"demo"}</Action><Action type="shell">npm ins"#,
        "tall</Action></Artifact> Done.",
    ]));

    let env = TestEnv::new();
    let client = RecordingClient::default();
    let mut turn = ChatTurn::new(
        registry_with(provider.clone()),
        env.ctx.clone(),
        Arc::new(client.clone()),
        chat_config(),
    );

    let outcome = turn.run(request("scaffold a demo app")).await.unwrap();

    assert_eq!(outcome.display_text, "Setting up.  Done.");
    assert_eq!(outcome.segments, 1);
    assert_eq!(client.text(), "Setting up.  Done.");

    // File written (with the trailing newline rule), then the shell command
    assert_eq!(
        env.fs.content("package.json").as_deref(),
        Some("{\"name\":\"demo\"}\n")
    );
    let entries = env.entries();
    let write_pos = entries.iter().position(|e| e == "write:package.json");
    let run_pos = entries.iter().position(|e| e == "run-start:npm install");
    assert!(write_pos.is_some() && run_pos.is_some());
    assert!(write_pos < run_pos, "file write must precede the shell command");

    // No file context, no history: straight to generating
    assert_eq!(
        client.phases(),
        vec![TurnPhase::Generating, TurnPhase::Complete]
    );
    assert_eq!(provider.request_count(), 1);
}

#[tokio::test]
async fn test_truncated_turn_continues_in_second_segment() {
    let provider = MockProvider::new()
        .with_response(MockResponse::truncated(
            r#"Part one <Artifact id="app" title="T"><Action type="file" filePath="a.txt">hel"#,
        ))
        .with_response(MockResponse::text("lo</Action></Artifact> end"));

    let env = TestEnv::new();
    let mut turn = ChatTurn::new(
        registry_with(provider.clone()),
        env.ctx.clone(),
        Arc::new(RecordingClient::default()),
        chat_config(),
    );

    let outcome = turn.run(request("write a file")).await.unwrap();

    assert_eq!(outcome.segments, 2);
    assert_eq!(outcome.display_text, "Part one  end");
    // The file closed in segment two with content spanning the boundary
    assert_eq!(env.fs.content("a.txt").as_deref(), Some("hello\n"));

    // The continuation request carries the partial response and the
    // continuation instruction
    let requests = provider.requests();
    assert_eq!(requests.len(), 2);
    let continuation = &requests[1].messages;
    let last = continuation.last().unwrap();
    assert!(last.content.contains("Continue your prior response"));
    let assistant = &continuation[continuation.len() - 2];
    assert!(assistant.content.contains("Part one"));
}

#[tokio::test]
async fn test_segment_cap_is_fatal() {
    let provider = MockProvider::new()
        .with_response(MockResponse::truncated("one"))
        .with_response(MockResponse::truncated("two"));

    let env = TestEnv::new();
    let mut turn = ChatTurn::new(
        registry_with(provider),
        env.ctx.clone(),
        Arc::new(RecordingClient::default()),
        chat_config(),
    );

    let err = turn.run(request("hi")).await.unwrap_err();
    assert!(matches!(err, TurnError::MaxSegmentsReached(2)));
}

#[tokio::test]
async fn test_context_selection_feeds_generation() {
    let provider = MockProvider::new()
        .with_response(MockResponse::text(
            r#"<updateContextBuffer><includeFile path="src/App.tsx"/></updateContextBuffer>"#,
        ))
        .with_response(MockResponse::text("No changes needed."));

    let env = TestEnv::with_project_files(&[
        ("src/App.tsx", "export const App = () => null;"),
        ("src/main.tsx", "import './App';"),
    ]);
    let client = RecordingClient::default();
    let mut turn = ChatTurn::new(
        registry_with(provider.clone()),
        env.ctx.clone(),
        Arc::new(client.clone()),
        chat_config(),
    );

    let outcome = turn.run(request("review the app")).await.unwrap();

    assert_eq!(outcome.display_text, "No changes needed.");
    assert_eq!(turn.context().files(), ["src/App.tsx"]);
    assert_eq!(
        client.phases(),
        vec![
            TurnPhase::SelectingContext,
            TurnPhase::Generating,
            TurnPhase::Complete
        ]
    );

    // The generation request includes the selected file's contents
    let requests = provider.requests();
    assert_eq!(requests.len(), 2);
    assert!(requests[1]
        .messages
        .iter()
        .any(|m| m.content.contains("export const App")));
}

#[tokio::test]
async fn test_missing_selection_block_aborts_turn() {
    let provider = MockProvider::new().with_response(MockResponse::text("no block here"));

    let env = TestEnv::with_project_files(&[("src/App.tsx", "x")]);
    let mut turn = ChatTurn::new(
        registry_with(provider),
        env.ctx.clone(),
        Arc::new(RecordingClient::default()),
        chat_config(),
    );

    let err = turn.run(request("hi")).await.unwrap_err();
    assert!(matches!(
        err,
        TurnError::ContextSelection(ContextSelectionError::MissingBlock)
    ));
}

#[tokio::test]
async fn test_empty_selection_aborts_turn() {
    let provider = MockProvider::new().with_response(MockResponse::text(
        r#"<updateContextBuffer><includeFile path="src/ghost.tsx"/></updateContextBuffer>"#,
    ));

    let env = TestEnv::with_project_files(&[("src/App.tsx", "x")]);
    let mut turn = ChatTurn::new(
        registry_with(provider),
        env.ctx.clone(),
        Arc::new(RecordingClient::default()),
        chat_config(),
    );

    let err = turn.run(request("hi")).await.unwrap_err();
    assert!(matches!(
        err,
        TurnError::ContextSelection(ContextSelectionError::EmptySelection)
    ));
}

#[tokio::test]
async fn test_cancellation_stops_the_stream() {
    let provider = MockProvider::new().with_response(MockResponse::char_by_char(
        "a long response that will be interrupted",
    ));

    let env = TestEnv::new();
    let mut turn = ChatTurn::new(
        registry_with(provider),
        env.ctx.clone(),
        Arc::new(RecordingClient::default()),
        chat_config(),
    );

    turn.cancellation_token().cancel();
    let err = turn.run(request("hi")).await.unwrap_err();
    assert!(matches!(err, TurnError::Cancelled));
}

#[tokio::test]
async fn test_summary_runs_once_context_exists() {
    // Turn 1: selection + generation. Turn 2: summary + selection + generation.
    let provider = MockProvider::new()
        .with_response(MockResponse::text(
            r#"<updateContextBuffer><includeFile path="src/App.tsx"/></updateContextBuffer>"#,
        ))
        .with_response(MockResponse::text("First turn done."))
        .with_response(MockResponse::text("## Summary\n- reviewed the app"))
        .with_response(MockResponse::text(
            r#"<updateContextBuffer><includeFile path="src/main.tsx"/></updateContextBuffer>"#,
        ))
        .with_response(MockResponse::text("Second turn done."));

    let env = TestEnv::with_project_files(&[
        ("src/App.tsx", "export const App = () => null;"),
        ("src/main.tsx", "import './App';"),
    ]);
    let client = RecordingClient::default();
    let mut turn = ChatTurn::new(
        registry_with(provider.clone()),
        env.ctx.clone(),
        Arc::new(client.clone()),
        chat_config(),
    );

    turn.run(request("review the app")).await.unwrap();

    let second = TurnRequest {
        message_id: "msg-2".to_string(),
        prompt: "now extend it".to_string(),
        history: vec![
            Message::user("review the app"),
            Message::assistant("First turn done."),
        ],
    };
    turn.run(second).await.unwrap();

    assert_eq!(provider.request_count(), 5);
    // Request 3 (index 2) is the summary pass
    let summary_request = &provider.requests()[2];
    assert!(summary_request.messages[1].content.contains("review the app"));

    // The second turn's generation request carries the summary text
    let generation_request = &provider.requests()[4];
    assert!(generation_request
        .messages
        .iter()
        .any(|m| m.content.contains("reviewed the app")));

    // Both selected files are now in the buffer
    assert_eq!(turn.context().files(), ["src/App.tsx", "src/main.tsx"]);
}
