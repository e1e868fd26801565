//! Context-selection mini-grammar and the bounded context buffer.
//!
//! A dedicated LLM pass decides which project files are loaded into the
//! prompt. Its output contract is strict: exactly one `<updateContextBuffer>`
//! block containing zero or more self-closing `<includeFile path="..."/>` /
//! `<excludeFile path="..."/>` tags. A missing block or a selection that
//! nets to zero files is a hard failure for the pass; an unknown include
//! path is logged and ignored.

use std::collections::HashSet;

use tracing::warn;

use crate::attributes::extract_attribute;

/// Maximum number of files held in the context buffer. When the buffer is
/// full, the model must exclude a file before including a new one; the
/// orchestrator never auto-evicts.
pub const MAX_CONTEXT_FILES: usize = 5;

const BLOCK_OPEN: &str = "<updateContextBuffer>";
const BLOCK_CLOSE: &str = "</updateContextBuffer>";

/// Parsed include/exclude directives from a selection response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContextUpdate {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContextSelectionError {
    #[error("model output did not contain an <updateContextBuffer> block")]
    MissingBlock,
    #[error("context selection returned no files")]
    EmptySelection,
}

/// Extract the include/exclude directives from a selection-pass response.
/// The block is located with a bounded match; anything outside it is
/// ignored.
pub fn parse_context_update(response: &str) -> Result<ContextUpdate, ContextSelectionError> {
    let start = response
        .find(BLOCK_OPEN)
        .ok_or(ContextSelectionError::MissingBlock)?;
    let body_start = start + BLOCK_OPEN.len();
    let end = response[body_start..]
        .find(BLOCK_CLOSE)
        .ok_or(ContextSelectionError::MissingBlock)?;
    let block = &response[body_start..body_start + end];

    Ok(ContextUpdate {
        include: collect_paths(block, "includeFile"),
        exclude: collect_paths(block, "excludeFile"),
    })
}

/// Collect `path` attributes from self-closing `<tag .../>` entries.
fn collect_paths(block: &str, tag: &str) -> Vec<String> {
    let open = format!("<{}", tag);
    let mut paths = Vec::new();
    let mut search = 0;

    while let Some(rel) = block[search..].find(&open) {
        let tag_start = search + rel;
        let Some(end_rel) = block[tag_start..].find("/>") else {
            break;
        };
        let tag_text = &block[tag_start..tag_start + end_rel + 2];
        if let Some(path) = extract_attribute(tag_text, "path") {
            paths.push(path);
        }
        search = tag_start + end_rel + 2;
    }

    paths
}

/// The bounded set of project files currently loaded into the prompt.
#[derive(Debug, Clone)]
pub struct ContextBuffer {
    files: Vec<String>,
    capacity: usize,
}

impl ContextBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            files: Vec::new(),
            capacity,
        }
    }

    pub fn files(&self) -> &[String] {
        &self.files
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Apply a selection update. Excludes are processed first so the model
    /// can free a slot and refill it within one update. Includes naming
    /// unknown files are ignored with a warning; includes past capacity are
    /// ignored with a warning. A buffer that nets to empty is an error:
    /// an empty context is never a valid outcome.
    pub fn apply(
        &mut self,
        update: &ContextUpdate,
        known_files: &HashSet<String>,
    ) -> Result<(), ContextSelectionError> {
        for path in &update.exclude {
            self.files.retain(|existing| existing != path);
        }

        for path in &update.include {
            if !known_files.contains(path) {
                warn!("Ignoring includeFile for unknown path '{}'", path);
                continue;
            }
            if self.files.iter().any(|existing| existing == path) {
                continue;
            }
            if self.files.len() >= self.capacity {
                warn!(
                    "Context buffer full ({} files); ignoring includeFile '{}'",
                    self.capacity, path
                );
                continue;
            }
            self.files.push(path.clone());
        }

        if self.files.is_empty() {
            return Err(ContextSelectionError::EmptySelection);
        }

        Ok(())
    }
}

impl Default for ContextBuffer {
    fn default() -> Self {
        Self::new(MAX_CONTEXT_FILES)
    }
}
