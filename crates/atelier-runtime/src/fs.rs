//! Project-scoped filesystem access.
//!
//! All paths handed to the action runner are relative to a project root.
//! `resolve` is the single containment gate: absolute paths and `..`
//! traversal that would escape the root are rejected before any I/O.

use anyhow::{bail, Context, Result};
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Directories skipped when listing project files.
const IGNORED_DIRS: [&str; 4] = [".git", "node_modules", "target", "dist"];

/// Filesystem collaborator scoped to a single project.
pub trait ProjectFs: Send + Sync {
    /// Write `content` to the file at project-relative `path`, creating
    /// parent directories as needed. Last write wins.
    fn write(&self, path: &str, content: &str) -> Result<()>;

    /// Read the file at project-relative `path`.
    fn read(&self, path: &str) -> Result<String>;

    /// List all project-relative file paths (sorted, ignored dirs skipped).
    fn list(&self) -> Result<Vec<String>>;

    /// Create a directory (and parents) at project-relative `path`.
    fn create_dir_all(&self, path: &str) -> Result<()>;

    /// Remove the file or directory at project-relative `path`.
    fn remove(&self, path: &str) -> Result<()>;

    /// The project root on the host.
    fn root(&self) -> &Path;
}

/// `ProjectFs` backed by a directory on the local disk.
pub struct LocalProjectFs {
    root: PathBuf,
}

impl LocalProjectFs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve a project-relative path, rejecting escapes from the root.
    ///
    /// Absolute paths are only accepted when they already point inside the
    /// root (the model sometimes emits the full sandbox path); `..`
    /// components are rejected outright.
    pub fn resolve(&self, path: &str) -> Result<PathBuf> {
        let candidate = Path::new(path);

        let relative = if candidate.is_absolute() {
            match candidate.strip_prefix(&self.root) {
                Ok(stripped) => stripped,
                Err(_) => bail!(
                    "path '{}' is outside the project root {:?}",
                    path,
                    self.root
                ),
            }
        } else {
            candidate
        };

        for component in relative.components() {
            match component {
                Component::Normal(_) | Component::CurDir => {}
                Component::ParentDir => {
                    bail!("path '{}' escapes the project root", path)
                }
                Component::RootDir | Component::Prefix(_) => {
                    bail!("path '{}' is not a valid project path", path)
                }
            }
        }

        Ok(self.root.join(relative))
    }

    fn collect_files(&self, dir: &Path, out: &mut Vec<String>) -> Result<()> {
        for entry in std::fs::read_dir(dir)
            .with_context(|| format!("failed to read directory {:?}", dir))?
        {
            let entry = entry?;
            let path = entry.path();
            let name = entry.file_name();
            let name = name.to_string_lossy();

            if path.is_dir() {
                if IGNORED_DIRS.contains(&name.as_ref()) {
                    continue;
                }
                self.collect_files(&path, out)?;
            } else if let Ok(relative) = path.strip_prefix(&self.root) {
                out.push(relative.to_string_lossy().replace('\\', "/"));
            }
        }
        Ok(())
    }
}

impl ProjectFs for LocalProjectFs {
    fn write(&self, path: &str, content: &str) -> Result<()> {
        let full = self.resolve(path)?;
        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create parent directories for {:?}", full))?;
        }
        debug!("Writing {} bytes to {:?}", content.len(), full);
        std::fs::write(&full, content).with_context(|| format!("failed to write {:?}", full))
    }

    fn read(&self, path: &str) -> Result<String> {
        let full = self.resolve(path)?;
        std::fs::read_to_string(&full).with_context(|| format!("failed to read {:?}", full))
    }

    fn list(&self) -> Result<Vec<String>> {
        let mut files = Vec::new();
        if self.root.exists() {
            self.collect_files(&self.root, &mut files)?;
        }
        files.sort();
        Ok(files)
    }

    fn create_dir_all(&self, path: &str) -> Result<()> {
        let full = self.resolve(path)?;
        std::fs::create_dir_all(&full)
            .with_context(|| format!("failed to create directory {:?}", full))
    }

    fn remove(&self, path: &str) -> Result<()> {
        let full = self.resolve(path)?;
        if full.is_dir() {
            std::fs::remove_dir_all(&full)
                .with_context(|| format!("failed to remove directory {:?}", full))
        } else {
            std::fs::remove_file(&full).with_context(|| format!("failed to remove {:?}", full))
        }
    }

    fn root(&self) -> &Path {
        &self.root
    }
}
