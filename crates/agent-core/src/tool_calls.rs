//! Tool-Call Normalizer
//!
//! Produces the canonical tool-call list for a response. Structured calls
//! from the API are preferred; when there are none, the response text is
//! scanned for embedded invoke markup that some models emit instead:
//!
//! ```text
//! <｜DSML｜function_calls>
//! <｜DSML｜invoke name="read_file">
//! <｜DSML｜parameter name="path">notes.md</｜DSML｜parameter>
//! </｜DSML｜invoke>
//! </｜DSML｜function_calls>
//! ```
//!
//! Tag prefixes around `invoke`/`parameter` are ignored. The grammar is not
//! frame-safe, so scanning only happens on finalized text. Nested invoke
//! blocks and tags left open are handled best-effort: the first closing tag
//! ends a block, and unmatched markers are stripped from the visible text.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Number, Value};

use crate::message::ToolCallRequest;

static INVOKE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<[^>]*invoke\s+name="([^"]+)"[^>]*>(.*?)</[^>]*invoke>"#).expect("static regex")
});

static PARAMETER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<[^>]*parameter\s+name="([^"]+)"[^>]*>(.*?)</[^>]*parameter>"#)
        .expect("static regex")
});

static NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[+-]?\d+(\.\d+)?$").expect("static regex"));

/// Stripped from visible text, in this order
static MARKUP: LazyLock<[Regex; 4]> = LazyLock::new(|| {
    [
        r"(?s)<[^>]*function_calls[^>]*>.*?</[^>]*function_calls>",
        r"(?s)<[^>]*invoke[^>]*>.*?</[^>]*invoke>",
        r"(?s)<[^>]*parameter[^>]*>.*?</[^>]*parameter>",
        r"</?[^>]*DSML[^>]*>",
    ]
    .map(|pattern| Regex::new(pattern).expect("static regex"))
});

/// Calls recovered from response text
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EmbeddedCalls {
    pub calls: Vec<ToolCallRequest>,

    /// Response text with all invoke markup removed
    pub cleaned_text: String,
}

/// Id for a call the provider did not name: `tool_call_<millis>_<index>`.
/// Only unique within one response.
pub fn synthesize_id(index: usize) -> String {
    format!("tool_call_{}_{index}", chrono::Utc::now().timestamp_millis())
}

/// Give every structured call an id
pub fn normalize(calls: Vec<ToolCallRequest>) -> Vec<ToolCallRequest> {
    calls
        .into_iter()
        .enumerate()
        .map(|(index, mut call)| {
            if call.id.is_empty() {
                call.id = synthesize_id(index);
            }
            call
        })
        .collect()
}

/// Scan text for invoke blocks.
///
/// Returns no calls (and the text untouched apart from stray markers) when
/// nothing matches.
pub fn extract_embedded(text: &str) -> EmbeddedCalls {
    let calls = INVOKE
        .captures_iter(text)
        .enumerate()
        .map(|(index, invoke)| {
            let body = invoke.get(2).map_or("", |m| m.as_str());
            let arguments: Map<String, Value> = PARAMETER
                .captures_iter(body)
                .map(|param| (param[1].to_string(), coerce(param[2].trim())))
                .collect();

            ToolCallRequest::new(
                synthesize_id(index),
                &invoke[1],
                Value::Object(arguments).to_string(),
            )
        })
        .collect();

    EmbeddedCalls {
        calls,
        cleaned_text: strip_markup(text),
    }
}

/// Remove invoke markup, including malformed fragments, from text
pub fn strip_markup(text: &str) -> String {
    MARKUP.iter().fold(text.to_string(), |acc, pattern| {
        pattern.replace_all(&acc, "").into_owned()
    })
}

/// Structured calls first, embedded markup second.
///
/// Returns the calls and the text to show the user: the cleaned text when the
/// calls came from markup, the original text otherwise.
pub fn resolve(text: String, structured: Vec<ToolCallRequest>) -> (String, Vec<ToolCallRequest>) {
    if !structured.is_empty() {
        return (text, normalize(structured));
    }

    let embedded = extract_embedded(&text);
    if embedded.calls.is_empty() {
        (text, Vec::new())
    } else {
        tracing::debug!(count = embedded.calls.len(), "Recovered tool calls from response text");
        (embedded.cleaned_text, embedded.calls)
    }
}

/// Argument object for a call; blank or invalid JSON becomes `{}`
pub fn parse_arguments(raw: &str) -> Value {
    let raw = raw.trim();
    if raw.is_empty() {
        return Value::Object(Map::new());
    }

    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Null) => Value::Object(Map::new()),
        Ok(value) => value,
        Err(e) => {
            tracing::debug!(error = %e, "Tool arguments are not valid JSON; using {{}}");
            Value::Object(Map::new())
        }
    }
}

/// `true`/`false` become booleans, numerals become numbers, anything else stays text
fn coerce(raw: &str) -> Value {
    if raw.eq_ignore_ascii_case("true") {
        return Value::Bool(true);
    }
    if raw.eq_ignore_ascii_case("false") {
        return Value::Bool(false);
    }
    if NUMBER.is_match(raw) {
        let number = if raw.contains('.') {
            raw.parse::<f64>().ok().and_then(Number::from_f64)
        } else {
            raw.parse::<i64>()
                .map(Number::from)
                .ok()
                .or_else(|| raw.parse::<f64>().ok().and_then(Number::from_f64))
        };
        if let Some(number) = number {
            return Value::Number(number);
        }
    }
    Value::String(raw.to_string())
}
