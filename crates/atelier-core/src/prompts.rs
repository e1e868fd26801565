//! Prompt templates for the chat turn and its auxiliary passes.

use crate::context_selection::MAX_CONTEXT_FILES;

/// Injected as a user message when a response was cut off by the output
/// length limit and generation continues in a new segment.
pub const CONTINUE_PROMPT: &str = "Continue your prior response. IMPORTANT: Immediately begin \
from where you left off without any interruptions.\n\
Do not repeat any content, including artifact and action tags.";

/// Instruction line for the summary pass.
pub const SUMMARY_PROMPT: &str = "create a concise markdown summary of the conversation so far, \
preserving decisions, file names, commands that were run, and unresolved questions";

/// System prompt carrying the artifact emission contract.
pub fn system_prompt(cwd: &str) -> String {
    format!(
        r#"You are Atelier, an expert senior software engineer building and editing a web project inside a sandboxed workspace.

<response_requirements>
  1. Respond with valid Markdown. The artifact and action tags described below are the only
     extra markup allowed; emit them raw, never escaped and never inside code fences.
  2. Emit exactly ONE <Artifact id="kebab-case-id" title="Human Title"> block per response,
     containing one or more <Action ...> blocks. When editing an existing artifact, reuse its
     id verbatim.
  3. Allowed action types: "file", "shell", "build", "start", "supabase".
     - "file" requires a filePath attribute with a relative path; the action body is the FULL
       content of that file.
     - "shell" and "build" bodies are the command to run (chain with &&).
     - "start" launches the dev server and MUST be the last action in the artifact. Never
       restart a dev server that is already running.
     - "supabase" requires operation="migration" (with a filePath under supabase/migrations)
       or operation="query". A migration file and the query applying the same change must
       contain identical SQL.
  4. Close every <Action> with </Action> and the artifact with </Artifact>.
  5. Write package.json first with ALL dependencies, install once, and start the dev server
     with a single "start" action at the end.
</response_requirements>

<artifact_context>
  The current working directory is `{cwd}`.
</artifact_context>"#
    )
}

/// Prompt for the context-selection pass.
pub fn context_selection_prompt(
    project_files: &[String],
    current_buffer: &[String],
    user_prompt: &str,
) -> String {
    let buffer_text = if current_buffer.is_empty() {
        "(empty)".to_string()
    } else {
        current_buffer.join("\n")
    };

    format!(
        r#"You maintain the context buffer: the set of project files (at most {MAX_CONTEXT_FILES}) loaded into the prompt for the next response.

Current buffer:
{buffer_text}

Project files:
{files}

User request:
{user_prompt}

Respond with exactly one <updateContextBuffer> block containing zero or more self-closing
<includeFile path="..."/> and <excludeFile path="..."/> tags. Only reference paths from the
project file list. When the buffer is full you must exclude a file before including a new
one. The buffer must not end up empty."#,
        files = project_files.join("\n"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_prompt_embeds_cwd() {
        let prompt = system_prompt("/home/project");
        assert!(prompt.contains("/home/project"));
        assert!(prompt.contains("<Artifact"));
        assert!(prompt.contains("</Action>"));
    }

    #[test]
    fn test_selection_prompt_lists_files_and_buffer() {
        let prompt = context_selection_prompt(
            &["src/App.tsx".to_string(), "src/main.tsx".to_string()],
            &["src/App.tsx".to_string()],
            "add a button",
        );
        assert!(prompt.contains("src/main.tsx"));
        assert!(prompt.contains("add a button"));
        assert!(prompt.contains("<updateContextBuffer>"));
    }
}
