//! Token-usage accounting.
//!
//! Generation backends report usage as a text block with one `name: value`
//! line per metric (the protobuf text form of Vertex AI's `usageMetadata`).
//! [`parse_usage_text`] turns that block into a [`TokenUsage`] map. A line that
//! is not `name: <integer>` fails the whole extraction call.

use crate::error::IntakeError;
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::{Map, Value};

/// Integer token counts keyed by metric name, in reporting order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenUsage {
    entries: Vec<(String, i64)>,
}

impl TokenUsage {
    pub fn get(&self, name: &str) -> Option<i64> {
        self.entries
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, v)| *v)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, i64)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Insert or overwrite a metric, keeping first-seen order.
    pub fn insert(&mut self, name: impl Into<String>, value: i64) {
        let name = name.into();
        match self.entries.iter_mut().find(|(key, _)| *key == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    /// JSON object form, as attached under the `usage` key.
    pub fn to_json(&self) -> Value {
        let map: Map<String, Value> = self
            .entries
            .iter()
            .map(|(k, v)| (k.clone(), Value::from(*v)))
            .collect();
        Value::Object(map)
    }
}

impl Serialize for TokenUsage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

/// Parse a `name: value` usage block.
///
/// Blank lines are skipped. The name is everything before the first colon,
/// trimmed; the remainder must parse as an integer.
pub fn parse_usage_text(text: &str) -> Result<TokenUsage, IntakeError> {
    let mut usage = TokenUsage::default();
    for line in text.lines().filter(|l| !l.trim().is_empty()) {
        let malformed = || IntakeError::MalformedUsage {
            line: line.to_string(),
        };
        let (name, value) = line.split_once(':').ok_or_else(malformed)?;
        let value: i64 = value.trim().parse().map_err(|_| malformed())?;
        usage.insert(name.trim(), value);
    }
    Ok(usage)
}

/// Convert a camelCase metric name to the snake_case used in the text form.
pub fn snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for (i, ch) in name.chars().enumerate() {
        if ch.is_ascii_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.push(ch.to_ascii_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}

/// Render the integer fields of a JSON `usageMetadata` object as a usage block.
///
/// Nested breakdowns (per-modality details) and non-integer fields are left
/// out.
pub fn usage_text_from_json(metadata: &Value) -> String {
    let Some(fields) = metadata.as_object() else {
        return String::new();
    };
    fields
        .iter()
        .filter_map(|(name, value)| value.as_i64().map(|v| format!("{}: {}\n", snake_case(name), v)))
        .collect()
}
