//! Shared utilities for streaming SSE response parsing.
//!
//! Common helpers used by provider adapters for handling Server-Sent Events
//! (SSE) streaming responses.

use crate::{CompletionChunk, Usage};

/// Try to decode bytes as UTF-8, handling incomplete sequences at the end.
/// Returns the decoded string and leaves any incomplete bytes in the buffer.
pub fn decode_utf8_streaming(byte_buffer: &mut Vec<u8>) -> Option<String> {
    match std::str::from_utf8(byte_buffer) {
        Ok(s) => {
            let result = s.to_string();
            byte_buffer.clear();
            Some(result)
        }
        Err(e) => {
            let valid_up_to = e.valid_up_to();
            if valid_up_to > 0 {
                let valid_bytes: Vec<u8> = byte_buffer.drain(..valid_up_to).collect();
                // Safe: we just validated these bytes
                Some(String::from_utf8(valid_bytes).unwrap())
            } else {
                None // No valid UTF-8 yet, wait for more bytes
            }
        }
    }
}

/// Create a final completion chunk carrying the stop reason and usage.
pub fn make_final_chunk(stop_reason: Option<String>, usage: Option<Usage>) -> CompletionChunk {
    CompletionChunk {
        content: String::new(),
        finished: true,
        stop_reason,
        usage,
    }
}

/// Create a text content chunk (not finished).
pub fn make_text_chunk(content: String) -> CompletionChunk {
    CompletionChunk {
        content,
        finished: false,
        stop_reason: None,
        usage: None,
    }
}
