//! Registry for long-running dev-server processes.
//!
//! `start` actions spawn a detached process and record it here. The action
//! runner consults the registry before spawning so an equivalent server is
//! never started twice for the same project.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct ProcessInfo {
    pub name: String,
    pub pid: u32,
    pub command: String,
    pub working_dir: PathBuf,
}

/// Tracks named long-running processes spawned by `start` actions.
pub struct DevServerRegistry {
    processes: Mutex<HashMap<String, ProcessInfo>>,
}

impl DevServerRegistry {
    pub fn new() -> Self {
        Self {
            processes: Mutex::new(HashMap::new()),
        }
    }

    /// Spawn `command` as a detached process and register it under `name`.
    ///
    /// The child is fully detached (no piped stdio, not killed on drop) so
    /// it outlives the turn that started it.
    pub fn start(&self, name: &str, command: &str, working_dir: &Path) -> Result<ProcessInfo> {
        use std::process::Stdio;

        let child = tokio::process::Command::new("bash")
            .arg("-c")
            .arg(command)
            .current_dir(working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("failed to spawn '{}'", command))?;

        let pid = child.id().unwrap_or(0);
        let info = ProcessInfo {
            name: name.to_string(),
            pid,
            command: command.to_string(),
            working_dir: working_dir.to_path_buf(),
        };

        info!("Started dev server '{}' (pid {}): {}", name, pid, command);
        self.processes
            .lock()
            .unwrap()
            .insert(name.to_string(), info.clone());

        Ok(info)
    }

    /// Whether a process registered under `name` is still alive.
    pub fn is_running(&self, name: &str) -> bool {
        let pid = match self.processes.lock().unwrap().get(name) {
            Some(info) => info.pid,
            None => return false,
        };

        if pid == 0 {
            return false;
        }

        // Signal 0 probes for existence without touching the process.
        let alive = std::process::Command::new("kill")
            .args(["-0", &pid.to_string()])
            .output()
            .map(|output| output.status.success())
            .unwrap_or(false);

        debug!("Liveness probe for '{}' (pid {}): {}", name, pid, alive);
        alive
    }

    /// The registered process for `name`, if any.
    pub fn get(&self, name: &str) -> Option<ProcessInfo> {
        self.processes.lock().unwrap().get(name).cloned()
    }
}

impl Default for DevServerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
