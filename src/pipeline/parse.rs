//! Best-effort recovery of the JSON payload from a model reply.
//!
//! Models wrap their JSON in prose or ```json fences often enough that a strict
//! parse of the whole reply is useless. Two greedy spans are tried, in order:
//!
//! 1. the outermost `{ ... }` (first `{` to last `}`)
//! 2. the outermost `[{ ... }]`
//!
//! Each candidate is parsed with `serde_json`; nothing is ever evaluated. If
//! neither parses, the caller gets `None` and falls back to the raw text.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::debug;

/// Replacement for JSON `null` in recovered payloads.
pub const NULL_PLACEHOLDER: &str = "-";

static RE_OBJECT_SPAN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)\{.*\}").unwrap());

static RE_ARRAY_SPAN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)\[\{.*\}\]").unwrap());

/// Recover the structured payload from `text`.
///
/// `null` values anywhere in the result are replaced by `"-"`.
pub fn parse_structured(text: &str) -> Option<Value> {
    let mut value = [&*RE_OBJECT_SPAN, &*RE_ARRAY_SPAN]
        .into_iter()
        .find_map(|re| {
            let span = re.find(text)?.as_str();
            match serde_json::from_str::<Value>(span) {
                Ok(v) => Some(v),
                Err(e) => {
                    debug!("Candidate span ({} chars) did not parse: {}", span.len(), e);
                    None
                }
            }
        })?;
    replace_nulls(&mut value);
    Some(value)
}

fn replace_nulls(value: &mut Value) {
    match value {
        Value::Null => *value = Value::String(NULL_PLACEHOLDER.to_string()),
        Value::Array(items) => items.iter_mut().for_each(replace_nulls),
        Value::Object(map) => map.values_mut().for_each(replace_nulls),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bare_object() {
        let v = parse_structured(r#"{"document_type": "receipt", "total_amount": "12.50"}"#);
        assert_eq!(v, Some(json!({"document_type": "receipt", "total_amount": "12.50"})));
    }

    #[test]
    fn fenced_object_with_prose() {
        let text = "Here is the result:\n```json\n{\n  \"document_type\": \"invoice\",\n  \"items\": [{\"item_code\": \"A1\"}]\n}\n```\nLet me know!";
        let v = parse_structured(text).unwrap();
        assert_eq!(v["document_type"], "invoice");
        assert_eq!(v["items"][0]["item_code"], "A1");
    }

    #[test]
    fn falls_back_to_array_span() {
        // The greedy object span covers `{..}, {..}`, which is not valid JSON.
        let text = r#"[{"document_type": "receipt"}, {"document_type": "receipt"}]"#;
        let v = parse_structured(text).unwrap();
        assert_eq!(v.as_array().map(Vec::len), Some(2));
    }

    #[test]
    fn nulls_become_placeholder() {
        let v = parse_structured(r#"{"tax_amount": null, "line_item": [{"quantity": null}]}"#).unwrap();
        assert_eq!(v["tax_amount"], "-");
        assert_eq!(v["line_item"][0]["quantity"], "-");
    }

    #[test]
    fn no_span_returns_none() {
        assert_eq!(parse_structured("I cannot read this image."), None);
        assert_eq!(parse_structured(""), None);
    }

    #[test]
    fn invalid_spans_return_none() {
        assert_eq!(parse_structured("{'document_type': 'receipt'}"), None);
        assert_eq!(parse_structured("[{oops}]"), None);
    }
}
