//! Response extractor: recovers tool calls from free-form model text.
//!
//! Models are asked to answer with `{"tool_name": ..., "arguments": {...}}`
//! when they need live data, but in practice the object arrives wrapped in
//! prose, inside `<think>` scratch blocks, with single quotes, or several at
//! once. Extraction is best-effort: it never fails loudly, it just finds
//! nothing.

use std::sync::LazyLock;

use lalabot_core::tool::ToolCall;
use regex::Regex;
use serde_json::Value;
use thiserror::Error;

static THINK_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<think>.*?</think>").expect("think pattern is valid")
});

/// Why a recovered block was not accepted as a batch of tool calls.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExtractError {
    #[error("block is not valid JSON: {0}")]
    Malformed(String),

    #[error("block holds no tool calls")]
    Empty,

    #[error("block must be an object or an array of objects")]
    UnexpectedShape,

    #[error("item {index} has no string `tool_name`")]
    MissingToolName { index: usize },
}

/// Remove every `<think>…</think>` section, across newlines.
pub fn strip_think(text: &str) -> String {
    THINK_BLOCK.replace_all(text, "").into_owned()
}

/// Turn single-quoted literals into JSON strings.
///
/// Every `'` becomes `"`, so an apostrophe inside a string value breaks the
/// value it belongs to.
pub fn normalize_quotes(text: &str) -> String {
    text.replace('\'', "\"")
}

/// Find every top-level JSON object or array embedded in `text`.
///
/// Returns `None` when there is none, the fragment verbatim when there is
/// exactly one, and the fragments joined into one JSON array otherwise.
pub fn extract_candidate_blocks(text: &str) -> Option<String> {
    let text = normalize_quotes(&strip_think(text));
    let spans = scan_fragments(&text);

    match spans.len() {
        0 => None,
        1 => Some(spans[0].to_string()),
        _ => Some(format!("[{}]", spans.join(","))),
    }
}

/// Left-to-right scan. A failed decode advances one character, so broken
/// braces never hide a valid fragment that starts inside them.
fn scan_fragments(text: &str) -> Vec<&str> {
    let mut spans = Vec::new();
    let mut pos = 0;

    while let Some(ch) = text[pos..].chars().next() {
        if ch == '{' || ch == '[' {
            let mut values = serde_json::Deserializer::from_str(&text[pos..]).into_iter::<Value>();
            if let Some(Ok(_)) = values.next() {
                let end = pos + values.byte_offset();
                spans.push(&text[pos..end]);
                pos = end;
                continue;
            }
        }
        pos += ch.len_utf8();
    }

    spans
}

/// Validate a recovered block as a batch of tool calls.
///
/// An object is a batch of one; an array is taken as-is. One bad item
/// rejects the whole batch.
pub fn parse_tool_calls(block: &str) -> Result<Vec<ToolCall>, ExtractError> {
    let value: Value =
        serde_json::from_str(block).map_err(|e| ExtractError::Malformed(e.to_string()))?;

    let items = match value {
        Value::Object(_) => vec![value],
        Value::Array(items) => items,
        _ => return Err(ExtractError::UnexpectedShape),
    };
    if items.is_empty() {
        return Err(ExtractError::Empty);
    }

    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| {
            let Value::Object(mut fields) = item else {
                return Err(ExtractError::UnexpectedShape);
            };
            let Some(Value::String(tool_name)) = fields.remove("tool_name") else {
                return Err(ExtractError::MissingToolName { index });
            };
            let arguments = match fields.remove("arguments") {
                Some(Value::Object(arguments)) => arguments,
                _ => serde_json::Map::new(),
            };
            Ok(ToolCall {
                tool_name,
                arguments,
            })
        })
        .collect()
}
