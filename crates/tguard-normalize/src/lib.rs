//! Best-effort recovery of a canonical [`AnalysisResult`] from the model's
//! reply text.
//!
//! The model is instructed to answer with a strict JSON object but does not
//! reliably do so: the object may arrive wrapped in a fenced code block,
//! surrounded by prose, or not at all. Recovery runs an ordered chain of
//! parsing strategies — direct parse, fenced-block capture, brace-span
//! capture — and falls back to a degraded literal-text result when all of
//! them fail. Every function here is pure; identical input text always
//! yields an identical result.

use serde_json::Value;

use tguard_protocol::analysis::{AnalysisResult, Risk, Severity};
use tguard_protocol::gemini::GenerateContentResponse;


/// Which kind of document produced the model reply. Key details are only
/// part of the document-image output shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Document,
    PageText,
}

const DEFAULT_SUMMARY: &str = "Analysis complete.";
const DEGRADED_SUMMARY_CHARS: usize = 500;

/// Pulls the model's answer text out of the upstream response envelope.
///
/// `None` means the envelope carried no usable text at all, which the
/// boundary reports as an invalid upstream response.
pub fn candidate_text(response: &GenerateContentResponse) -> Option<&str> {
    response
        .candidates
        .first()?
        .content
        .parts
        .first()?
        .text
        .as_deref()
        .filter(|text| !text.is_empty())
}

/// Converts reply text into the canonical result.
///
/// Malformed JSON is not an error: exhaustion of the parse chain degrades
/// to the raw text as summary with no risks.
pub fn normalize_text(text: &str, kind: DocumentKind) -> AnalysisResult {
    match recover_json(text) {
        Some(value) => normalize_value(&value, kind),
        None => AnalysisResult {
            summary: truncate_chars(text, DEGRADED_SUMMARY_CHARS).to_string(),
            key_details: None,
            risks: Vec::new(),
        },
    }
}

/// Ordered parse chain. Each stage is an explicit `Option`; the first
/// success wins. After a captured substring fails to parse, no further
/// capture is attempted — that case degrades.
fn recover_json(text: &str) -> Option<Value> {
    if let Ok(value) = serde_json::from_str(text) {
        return Some(value);
    }
    let captured = capture_fenced_block(text).or_else(|| capture_brace_span(text))?;
    serde_json::from_str(captured).ok()
}

/// Content between the first pair of triple-backtick fences, with an
/// optional `json` tag after the opening fence.
fn capture_fenced_block(text: &str) -> Option<&str> {
    let start = text.find("```")?;
    let rest = &text[start + 3..];
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let rest = rest.strip_prefix('\n').unwrap_or(rest);
    let end = rest.find("```")?;
    let block = &rest[..end];
    Some(block.strip_suffix('\n').unwrap_or(block))
}

/// Span from the first `{` to the last `}`.
fn capture_brace_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end >= start).then(|| &text[start..=end])
}

/// Shapes a successfully parsed value into the canonical result.
///
/// Every field read here comes from an uncontrolled source, so each is
/// treated as optional and coerced rather than accessed directly.
pub fn normalize_value(value: &Value, kind: DocumentKind) -> AnalysisResult {
    let summary = value
        .get("summary")
        .and_then(Value::as_str)
        .unwrap_or(DEFAULT_SUMMARY)
        .to_string();

    let risks = value
        .get("risks")
        .and_then(Value::as_array)
        .map(|items| items.iter().map(coerce_risk).collect())
        .unwrap_or_default();

    let key_details = match kind {
        DocumentKind::Document => value.get("keyDetails").and_then(Value::as_array).map(
            |items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            },
        ),
        DocumentKind::PageText => None,
    };

    AnalysisResult {
        summary,
        key_details,
        risks,
    }
}

/// Coerces one risk element. Severity is lower-cased with `low` as the
/// default for absent or unrecognized values; the description is taken
/// from `description`, then the legacy `risk` field, then the stringified
/// element, in that priority order.
fn coerce_risk(value: &Value) -> Risk {
    let severity = value
        .get("severity")
        .and_then(Value::as_str)
        .and_then(Severity::parse_loose)
        .unwrap_or_default();

    let description = value
        .get("description")
        .and_then(Value::as_str)
        .or_else(|| value.get("risk").and_then(Value::as_str))
        .map(str::to_string)
        .unwrap_or_else(|| match value.as_str() {
            Some(text) => text.to_string(),
            None => value.to_string(),
        });

    Risk {
        severity,
        description,
    }
}

fn truncate_chars(text: &str, limit: usize) -> &str {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
