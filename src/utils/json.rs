use log::debug;
use regex::Regex;
use serde::de::DeserializeOwned;
use std::sync::LazyLock;

use crate::core::error::GenerationError;

static FENCED_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"```(?:json)?\s*([\s\S]*?)\s*```").expect("valid fenced block regex")
});

pub fn strip_code_blocks(s: &str) -> String {
    let s = s.trim();
    if s.starts_with("```json") {
        s.trim_start_matches("```json")
            .trim_end_matches("```")
            .trim()
            .to_string()
    } else if s.starts_with("```") {
        s.trim_start_matches("```")
            .trim_end_matches("```")
            .trim()
            .to_string()
    } else {
        s.to_string()
    }
}

/// Pulls the JSON payload out of a model reply: the first fenced block if
/// there is one, otherwise everything from the first `{` or `[`.
pub fn extract_json(reply: &str) -> String {
    if let Some(caps) = FENCED_BLOCK.captures(reply) {
        if let Some(body) = caps.get(1) {
            return body.as_str().trim().to_string();
        }
    }

    let stripped = strip_code_blocks(reply);
    match stripped.find(['{', '[']) {
        Some(start) => stripped[start..].trim().to_string(),
        None => stripped,
    }
}

/// Closes whatever the text left open: an unterminated string, then any
/// unbalanced braces and brackets in nesting order. A dangling trailing comma
/// is dropped first.
pub fn repair_json(text: &str) -> String {
    let mut stack = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for c in text.chars() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => stack.push('}'),
            '[' => stack.push(']'),
            '}' | ']' => {
                if stack.last() == Some(&c) {
                    stack.pop();
                }
            }
            _ => {}
        }
    }

    let mut repaired = text.trim_end().to_string();
    if in_string {
        if escaped {
            repaired.pop();
        }
        repaired.push('"');
    } else if repaired.ends_with(',') {
        repaired.pop();
    }
    while let Some(closer) = stack.pop() {
        repaired.push(closer);
    }
    repaired
}

/// Parses a model reply, making one repair attempt before giving up.
pub fn parse_with_repair<T: DeserializeOwned>(reply: &str) -> Result<T, GenerationError> {
    let text = extract_json(reply);
    match serde_json::from_str(&text) {
        Ok(value) => Ok(value),
        Err(first_error) => {
            let repaired = repair_json(&text);
            if repaired == text {
                return Err(GenerationError::Malformed(first_error));
            }
            debug!("Parse failed ({}), retrying with repaired JSON", first_error);
            serde_json::from_str(&repaired).map_err(GenerationError::Malformed)
        }
    }
}
