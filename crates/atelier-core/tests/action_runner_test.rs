//! Action runner semantics: ordering, start-is-last, last-write-wins,
//! failure alerts, and cancellation.

mod support;

use atelier_core::{ActionKind, ActionRunner, ActionState, AlertSource, SupabaseOperation};
use support::{action, TestEnv};

fn file(path: &str) -> ActionKind {
    ActionKind::File {
        file_path: path.to_string(),
    }
}

/// Declare and immediately finalize an action, as the parser does for a
/// fully-buffered open/close pair.
async fn add_and_run(runner: &mut ActionRunner, data: &atelier_core::ActionData) {
    runner.add_action(data).await;
    runner.run_action(data, false).await;
}

#[tokio::test]
async fn test_actions_execute_in_declaration_order() {
    let env = TestEnv::new();
    let mut runner = ActionRunner::new("demo".to_string(), env.ctx.clone());

    add_and_run(&mut runner, &action("demo", 0, file("package.json"), "{}")).await;
    add_and_run(&mut runner, &action("demo", 1, ActionKind::Shell, "npm install")).await;
    add_and_run(&mut runner, &action("demo", 2, ActionKind::Start, "sleep 2")).await;
    runner.wait_idle().await;

    // The file write lands before the shell command starts, and the shell
    // command finishes before anything after it.
    assert_eq!(
        env.entries(),
        vec![
            "write:package.json",
            "run-start:npm install",
            "run-end:npm install",
        ]
    );

    // The start action registered a dev server for the artifact
    let info = env.dev_servers.get("demo").expect("dev server registered");
    assert_eq!(info.command, "sleep 2");

    let entries = runner.action_entries().await;
    assert_eq!(entries.len(), 3);
    assert!(entries
        .iter()
        .all(|(_, entry)| entry.state == ActionState::Complete));

    let _ = std::process::Command::new("kill")
        .arg(info.pid.to_string())
        .output();
}

#[tokio::test]
async fn test_no_action_scheduled_after_start() {
    let env = TestEnv::new();
    let mut runner = ActionRunner::new("demo".to_string(), env.ctx.clone());

    add_and_run(&mut runner, &action("demo", 0, ActionKind::Start, "sleep 2")).await;
    add_and_run(&mut runner, &action("demo", 1, ActionKind::Shell, "echo late")).await;
    runner.wait_idle().await;

    // The late shell action was refused at declaration time
    let entries = runner.action_entries().await;
    assert_eq!(entries.len(), 1);
    assert!(env.entries().iter().all(|e| !e.contains("echo late")));

    if let Some(info) = env.dev_servers.get("demo") {
        let _ = std::process::Command::new("kill")
            .arg(info.pid.to_string())
            .output();
    }
}

#[tokio::test]
async fn test_duplicate_file_path_last_write_wins() {
    let env = TestEnv::new();
    let mut runner = ActionRunner::new("demo".to_string(), env.ctx.clone());

    add_and_run(&mut runner, &action("demo", 0, file("index.js"), "first")).await;
    add_and_run(&mut runner, &action("demo", 1, file("index.js"), "second")).await;
    runner.wait_idle().await;

    // Two write calls reached the filesystem; the second content stuck
    let writes: Vec<_> = env
        .entries()
        .into_iter()
        .filter(|e| e == "write:index.js")
        .collect();
    assert_eq!(writes.len(), 2);
    assert_eq!(env.fs.content("index.js").as_deref(), Some("second"));
}

#[tokio::test]
async fn test_failed_command_produces_alert_and_turn_continues() {
    let env = TestEnv::with_failing_command("npm test");
    let mut runner = ActionRunner::new("demo".to_string(), env.ctx.clone());

    add_and_run(&mut runner, &action("demo", 0, ActionKind::Shell, "npm test")).await;
    add_and_run(&mut runner, &action("demo", 1, file("after.txt"), "still ran")).await;
    runner.wait_idle().await;

    let alerts = env.alerts.collected();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].source, AlertSource::Shell);
    assert!(alerts[0].description.contains("boom"));
    // The failed action's content rides along for corrective resubmission
    assert_eq!(alerts[0].content, "npm test");

    // The failure did not stop the following action
    assert_eq!(env.fs.content("after.txt").as_deref(), Some("still ran"));

    let entries = runner.action_entries().await;
    assert!(matches!(entries[0].1.state, ActionState::Failed { .. }));
    assert_eq!(entries[1].1.state, ActionState::Complete);
}

#[tokio::test]
async fn test_streamed_file_writes_are_best_effort() {
    let env = TestEnv::new();
    let mut runner = ActionRunner::new("demo".to_string(), env.ctx.clone());

    let open = action("demo", 0, file("src/app.ts"), "");
    runner.add_action(&open).await;

    // Progressive content as the parser streams the body
    runner
        .run_action(&action("demo", 0, file("src/app.ts"), "const x"), true)
        .await;
    runner
        .run_action(&action("demo", 0, file("src/app.ts"), "const x = 1;"), true)
        .await;
    // Authoritative content at action close
    runner
        .run_action(&action("demo", 0, file("src/app.ts"), "const x = 1;\n"), false)
        .await;
    runner.wait_idle().await;

    assert_eq!(env.fs.content("src/app.ts").as_deref(), Some("const x = 1;\n"));

    let entries = runner.action_entries().await;
    assert_eq!(entries[0].1.state, ActionState::Complete);
}

#[tokio::test]
async fn test_streaming_ignored_for_non_file_actions() {
    let env = TestEnv::new();
    let mut runner = ActionRunner::new("demo".to_string(), env.ctx.clone());

    let data = action("demo", 0, ActionKind::Shell, "npm ins");
    runner.add_action(&data).await;
    runner.run_action(&data, true).await;
    runner.wait_idle().await;

    // Nothing ran from the partial command
    assert!(env.entries().is_empty());

    runner
        .run_action(&action("demo", 0, ActionKind::Shell, "npm install"), false)
        .await;
    runner.wait_idle().await;
    assert_eq!(
        env.entries(),
        vec!["run-start:npm install", "run-end:npm install"]
    );
}

#[tokio::test]
async fn test_duplicate_final_submission_executes_once() {
    let env = TestEnv::new();
    let mut runner = ActionRunner::new("demo".to_string(), env.ctx.clone());

    let data = action("demo", 0, ActionKind::Shell, "npm install");
    runner.add_action(&data).await;
    runner.run_action(&data, false).await;
    runner.run_action(&data, false).await;
    runner.wait_idle().await;

    assert_eq!(
        env.entries(),
        vec!["run-start:npm install", "run-end:npm install"]
    );
}

#[tokio::test]
async fn test_cancellation_aborts_queued_actions() {
    let env = TestEnv::new();
    let mut runner = ActionRunner::new("demo".to_string(), env.ctx.clone());

    let first = action("demo", 0, ActionKind::Shell, "echo one");
    let second = action("demo", 1, ActionKind::Shell, "echo two");
    runner.add_action(&first).await;
    runner.add_action(&second).await;

    runner.cancel();
    runner.run_action(&first, false).await;
    runner.run_action(&second, false).await;
    runner.wait_idle().await;

    // Nothing was dispatched after cancellation was observed
    assert!(env.entries().is_empty());
    let entries = runner.action_entries().await;
    assert!(entries
        .iter()
        .all(|(_, entry)| entry.state == ActionState::Aborted));
}

#[tokio::test]
async fn test_supabase_migration_writes_under_migrations_dir() {
    let env = TestEnv::new();
    let mut runner = ActionRunner::new("demo".to_string(), env.ctx.clone());

    let kind = ActionKind::Supabase {
        operation: SupabaseOperation::Migration,
        file_path: Some("001_init.sql".to_string()),
        project_id: None,
    };
    add_and_run(&mut runner, &action("demo", 0, kind, "create table todos ();")).await;
    runner.wait_idle().await;

    assert_eq!(
        env.fs.content("supabase/migrations/001_init.sql").as_deref(),
        Some("create table todos ();")
    );

    // A path already under the migrations dir is not double-prefixed
    let kind = ActionKind::Supabase {
        operation: SupabaseOperation::Migration,
        file_path: Some("supabase/migrations/002_more.sql".to_string()),
        project_id: None,
    };
    let mut runner2 = ActionRunner::new("demo2".to_string(), env.ctx.clone());
    add_and_run(&mut runner2, &action("demo2", 0, kind, "alter table todos;")).await;
    runner2.wait_idle().await;

    assert!(env.fs.content("supabase/migrations/002_more.sql").is_some());
}

#[tokio::test]
async fn test_supabase_query_goes_to_database() {
    let env = TestEnv::new();
    let mut runner = ActionRunner::new("demo".to_string(), env.ctx.clone());

    let kind = ActionKind::Supabase {
        operation: SupabaseOperation::Query,
        file_path: None,
        project_id: None,
    };
    add_and_run(&mut runner, &action("demo", 0, kind, "select 1;")).await;
    runner.wait_idle().await;

    assert_eq!(env.entries(), vec!["query:select 1;"]);
}

#[tokio::test]
async fn test_supabase_query_failure_alerts() {
    let mut env = TestEnv::new();
    support::failing_database(&mut env);
    let mut runner = ActionRunner::new("demo".to_string(), env.ctx.clone());

    let kind = ActionKind::Supabase {
        operation: SupabaseOperation::Query,
        file_path: None,
        project_id: None,
    };
    add_and_run(&mut runner, &action("demo", 0, kind, "select 1;")).await;
    runner.wait_idle().await;

    let alerts = env.alerts.collected();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].source, AlertSource::Supabase);
}

#[tokio::test]
async fn test_start_not_reinvoked_when_already_running() {
    let env = TestEnv::new();

    // A dev server for this artifact is already alive
    let existing = env
        .dev_servers
        .start("demo", "sleep 5", std::path::Path::new("."))
        .unwrap();

    let mut runner = ActionRunner::new("demo".to_string(), env.ctx.clone());
    add_and_run(&mut runner, &action("demo", 0, ActionKind::Start, "sleep 60")).await;
    runner.wait_idle().await;

    // The registry still holds the original process; no second spawn
    let info = env.dev_servers.get("demo").unwrap();
    assert_eq!(info.command, "sleep 5");
    assert_eq!(info.pid, existing.pid);

    let entries = runner.action_entries().await;
    assert_eq!(entries[0].1.state, ActionState::Complete);

    let _ = std::process::Command::new("kill")
        .arg(existing.pid.to_string())
        .output();
}
