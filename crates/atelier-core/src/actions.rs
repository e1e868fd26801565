//! Typed actions carried inside an artifact.
//!
//! The wire format tags each action with a `type` attribute; parsing turns
//! that loosely-typed tag into an `ActionKind` so the runner can match
//! exhaustively and the compiler flags any newly-added variant that a
//! handler forgot.

use serde::{Deserialize, Serialize};

use crate::attributes::extract_attribute;

/// Supabase sub-operation carried by `type="supabase"` actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SupabaseOperation {
    Migration,
    Query,
}

/// The typed payload of an action tag. The action body (file content, shell
/// command, SQL) streams in separately and is finalized at the closing tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ActionKind {
    File {
        file_path: String,
    },
    Shell,
    Build,
    Start,
    Supabase {
        operation: SupabaseOperation,
        file_path: Option<String>,
        project_id: Option<String>,
    },
}

/// Why an action tag could not be turned into an `ActionKind`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActionTagError {
    #[error("action tag is missing the 'type' attribute")]
    MissingType,
    #[error("unknown action type '{0}'")]
    UnknownType(String),
    #[error("file action is missing the 'filePath' attribute")]
    MissingFilePath,
    #[error("supabase action is missing the 'operation' attribute")]
    MissingOperation,
    #[error("unknown supabase operation '{0}'")]
    UnknownOperation(String),
    #[error("supabase migration is missing the 'filePath' attribute")]
    MissingMigrationPath,
}

impl ActionKind {
    /// Build an `ActionKind` from the raw text of a fully-buffered opening
    /// action tag.
    pub fn from_tag(tag: &str) -> Result<Self, ActionTagError> {
        let action_type = extract_attribute(tag, "type").ok_or(ActionTagError::MissingType)?;

        match action_type.as_str() {
            "file" => {
                let file_path =
                    extract_attribute(tag, "filePath").ok_or(ActionTagError::MissingFilePath)?;
                Ok(ActionKind::File { file_path })
            }
            "shell" => Ok(ActionKind::Shell),
            "build" => Ok(ActionKind::Build),
            "start" => Ok(ActionKind::Start),
            "supabase" => {
                let operation =
                    extract_attribute(tag, "operation").ok_or(ActionTagError::MissingOperation)?;
                let file_path = extract_attribute(tag, "filePath");
                let project_id = extract_attribute(tag, "projectId");

                let operation = match operation.as_str() {
                    "migration" => {
                        if file_path.is_none() {
                            return Err(ActionTagError::MissingMigrationPath);
                        }
                        SupabaseOperation::Migration
                    }
                    "query" => SupabaseOperation::Query,
                    other => return Err(ActionTagError::UnknownOperation(other.to_string())),
                };

                Ok(ActionKind::Supabase {
                    operation,
                    file_path,
                    project_id,
                })
            }
            other => Err(ActionTagError::UnknownType(other.to_string())),
        }
    }

    pub fn is_file(&self) -> bool {
        matches!(self, ActionKind::File { .. })
    }

    pub fn is_start(&self) -> bool {
        matches!(self, ActionKind::Start)
    }

    /// The wire-format `type` attribute value for this kind.
    pub fn label(&self) -> &'static str {
        match self {
            ActionKind::File { .. } => "file",
            ActionKind::Shell => "shell",
            ActionKind::Build => "build",
            ActionKind::Start => "start",
            ActionKind::Supabase { .. } => "supabase",
        }
    }
}

/// Lifecycle state of a queued action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ActionState {
    Pending,
    Running,
    Complete,
    Failed { error: String },
    Aborted,
}

impl ActionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ActionState::Complete | ActionState::Failed { .. } | ActionState::Aborted
        )
    }
}
