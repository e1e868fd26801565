//! Attribute extraction from a fully-buffered opening tag.
//!
//! The wire grammar only ever uses double-quoted `key="value"` pairs, so a
//! single bounded pattern per lookup is sufficient. Extraction runs once per
//! tag, after the tag scanner has buffered the whole opening tag.

use regex::Regex;

/// Extract the value of `name="..."` from the raw text of an opening tag.
/// Returns `None` when the attribute is absent or the value is not
/// double-quoted.
pub fn extract_attribute(tag: &str, name: &str) -> Option<String> {
    let pattern = format!(r#"{}="([^"]*)""#, regex::escape(name));
    let re = Regex::new(&pattern).ok()?;
    re.captures(tag)
        .and_then(|captures| captures.get(1))
        .map(|m| m.as_str().to_string())
}
