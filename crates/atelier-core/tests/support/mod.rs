//! Shared mock collaborators for action runner and turn tests.
//!
//! All mocks append to a shared chronological journal so tests can assert
//! cross-collaborator ordering (e.g. a file write landing before a shell
//! command starts).

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use atelier_core::{
    ActionAlert, ActionData, ActionKind, AlertSink, RunnerContext,
};
use atelier_runtime::{
    CommandRunner, DatabaseExecutor, DevServerRegistry, ExecutionResult, OutputReceiver,
    ProjectFs, UnconfiguredDatabase,
};

pub type Journal = Arc<Mutex<Vec<String>>>;

pub fn new_journal() -> Journal {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn journal_entries(journal: &Journal) -> Vec<String> {
    journal.lock().unwrap().clone()
}

/// In-memory `ProjectFs` that records writes to the journal.
pub struct MockFs {
    root: PathBuf,
    pub files: Mutex<HashMap<String, String>>,
    journal: Journal,
}

impl MockFs {
    pub fn new(journal: Journal) -> Self {
        Self {
            root: std::env::temp_dir(),
            files: Mutex::new(HashMap::new()),
            journal,
        }
    }

    pub fn with_files(journal: Journal, files: &[(&str, &str)]) -> Self {
        let fs = Self::new(journal);
        {
            let mut lock = fs.files.lock().unwrap();
            for (path, content) in files {
                lock.insert(path.to_string(), content.to_string());
            }
        }
        fs
    }

    pub fn content(&self, path: &str) -> Option<String> {
        self.files.lock().unwrap().get(path).cloned()
    }
}

impl ProjectFs for MockFs {
    fn write(&self, path: &str, content: &str) -> anyhow::Result<()> {
        self.journal.lock().unwrap().push(format!("write:{}", path));
        self.files
            .lock()
            .unwrap()
            .insert(path.to_string(), content.to_string());
        Ok(())
    }

    fn read(&self, path: &str) -> anyhow::Result<String> {
        self.files
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no such file: {}", path))
    }

    fn list(&self) -> anyhow::Result<Vec<String>> {
        let mut files: Vec<String> = self.files.lock().unwrap().keys().cloned().collect();
        files.sort();
        Ok(files)
    }

    fn create_dir_all(&self, _path: &str) -> anyhow::Result<()> {
        Ok(())
    }

    fn remove(&self, path: &str) -> anyhow::Result<()> {
        self.files.lock().unwrap().remove(path);
        Ok(())
    }

    fn root(&self) -> &Path {
        &self.root
    }
}

/// Command runner that journals start/end and can be told to fail.
pub struct MockCommands {
    journal: Journal,
    fail_commands: Vec<String>,
}

impl MockCommands {
    pub fn new(journal: Journal) -> Self {
        Self {
            journal,
            fail_commands: Vec::new(),
        }
    }

    pub fn failing_on(journal: Journal, command: &str) -> Self {
        Self {
            journal,
            fail_commands: vec![command.to_string()],
        }
    }
}

#[async_trait::async_trait]
impl CommandRunner for MockCommands {
    async fn run(
        &self,
        command: &str,
        _working_dir: &Path,
        receiver: &dyn OutputReceiver,
    ) -> anyhow::Result<ExecutionResult> {
        self.journal
            .lock()
            .unwrap()
            .push(format!("run-start:{}", command));

        // Yield long enough that an accidentally-parallel runner would
        // interleave journal entries.
        tokio::time::sleep(Duration::from_millis(20)).await;
        receiver.on_output_line("ok");

        self.journal
            .lock()
            .unwrap()
            .push(format!("run-end:{}", command));

        if self.fail_commands.iter().any(|f| f == command) {
            Ok(ExecutionResult {
                stdout: String::new(),
                stderr: "boom".to_string(),
                exit_code: 1,
                success: false,
            })
        } else {
            Ok(ExecutionResult {
                stdout: "ok".to_string(),
                stderr: String::new(),
                exit_code: 0,
                success: true,
            })
        }
    }
}

/// Database executor that journals queries and can be told to fail.
pub struct MockDatabase {
    journal: Journal,
    pub fail: bool,
}

impl MockDatabase {
    pub fn new(journal: Journal) -> Self {
        Self {
            journal,
            fail: false,
        }
    }
}

#[async_trait::async_trait]
impl DatabaseExecutor for MockDatabase {
    async fn execute_query(&self, sql: &str) -> anyhow::Result<()> {
        self.journal.lock().unwrap().push(format!("query:{}", sql));
        if self.fail {
            anyhow::bail!("database unavailable")
        }
        Ok(())
    }
}

/// Alert sink that records alerts.
#[derive(Clone, Default)]
pub struct MockAlerts {
    pub alerts: Arc<Mutex<Vec<ActionAlert>>>,
}

impl MockAlerts {
    pub fn collected(&self) -> Vec<ActionAlert> {
        self.alerts.lock().unwrap().clone()
    }
}

impl AlertSink for MockAlerts {
    fn on_alert(&self, alert: &ActionAlert) {
        self.alerts.lock().unwrap().push(alert.clone());
    }
}

pub struct SilentOutput;

impl OutputReceiver for SilentOutput {
    fn on_output_line(&self, _line: &str) {}
}

/// Assembled mock environment for runner/turn tests.
pub struct TestEnv {
    pub journal: Journal,
    pub fs: Arc<MockFs>,
    pub alerts: MockAlerts,
    pub dev_servers: Arc<DevServerRegistry>,
    pub ctx: RunnerContext,
}

impl TestEnv {
    pub fn new() -> Self {
        Self::build(None, &[])
    }

    pub fn with_failing_command(command: &str) -> Self {
        Self::build(Some(command), &[])
    }

    pub fn with_project_files(files: &[(&str, &str)]) -> Self {
        Self::build(None, files)
    }

    fn build(fail_command: Option<&str>, files: &[(&str, &str)]) -> Self {
        let journal = new_journal();
        let fs = Arc::new(MockFs::with_files(journal.clone(), files));
        let alerts = MockAlerts::default();
        let dev_servers = Arc::new(DevServerRegistry::new());

        let commands: Arc<dyn CommandRunner> = match fail_command {
            Some(command) => Arc::new(MockCommands::failing_on(journal.clone(), command)),
            None => Arc::new(MockCommands::new(journal.clone())),
        };

        let ctx = RunnerContext {
            fs: fs.clone(),
            commands,
            dev_servers: dev_servers.clone(),
            database: Arc::new(MockDatabase::new(journal.clone())),
            alerts: Arc::new(alerts.clone()),
            output: Arc::new(SilentOutput),
            migrations_dir: "supabase/migrations".to_string(),
        };

        Self {
            journal,
            fs,
            alerts,
            dev_servers,
            ctx,
        }
    }

    pub fn entries(&self) -> Vec<String> {
        journal_entries(&self.journal)
    }
}

/// Build an `ActionData` as the parser would emit it.
pub fn action(artifact_id: &str, action_id: u32, kind: ActionKind, content: &str) -> ActionData {
    ActionData {
        message_id: "message_1".to_string(),
        artifact_id: artifact_id.to_string(),
        action_id,
        kind,
        content: content.to_string(),
    }
}

/// Swap the database for one that fails queries.
pub fn failing_database(env: &mut TestEnv) {
    let mut db = MockDatabase::new(env.journal.clone());
    db.fail = true;
    env.ctx.database = Arc::new(db);
}

/// An `UnconfiguredDatabase` context helper, for completeness checks.
pub fn unconfigured_database(env: &mut TestEnv) {
    env.ctx.database = Arc::new(UnconfiguredDatabase);
}
