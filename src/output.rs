//! Result types returned by the intake pipeline.
//!
//! Model output is trusted opportunistically: a reply either parses into a
//! JSON object (which then carries a `usage` key) or it is passed through as
//! raw text. Both serialise untagged, so HTTP callers see a bare JSON object
//! or a bare JSON string.

use crate::pipeline::usage::TokenUsage;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Key under which token usage is attached to a structured result.
pub const USAGE_KEY: &str = "usage";

/// Key wrapping a parsed top-level JSON array.
pub const DOCUMENTS_KEY: &str = "documents";

/// Outcome of one extraction call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExtractionResult {
    /// Parsed reply with `usage` attached.
    Structured(Map<String, Value>),
    /// Unparseable reply, returned verbatim and without usage.
    Raw(String),
}

impl ExtractionResult {
    /// Attach `usage` to a parsed reply.
    ///
    /// An object gains a `usage` key; an array is wrapped as
    /// `{"documents": [...], "usage": {...}}`; any other JSON value is wrapped
    /// the same way under `documents`.
    pub fn structured(parsed: Value, usage: &TokenUsage) -> Self {
        let mut map = match parsed {
            Value::Object(map) => map,
            other => {
                let mut map = Map::new();
                map.insert(DOCUMENTS_KEY.to_string(), other);
                map
            }
        };
        map.insert(USAGE_KEY.to_string(), usage.to_json());
        ExtractionResult::Structured(map)
    }

    pub fn is_structured(&self) -> bool {
        matches!(self, ExtractionResult::Structured(_))
    }

    /// The `document_type` the model reported, if any.
    pub fn document_type(&self) -> Option<&str> {
        match self {
            ExtractionResult::Structured(map) => map.get("document_type").and_then(Value::as_str),
            ExtractionResult::Raw(_) => None,
        }
    }

    /// The attached usage object, if any.
    pub fn usage(&self) -> Option<&Map<String, Value>> {
        match self {
            ExtractionResult::Structured(map) => map.get(USAGE_KEY).and_then(Value::as_object),
            ExtractionResult::Raw(_) => None,
        }
    }
}

/// Response payload of one intake request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IntakeResponse {
    /// PDF upload: all pages went through one extraction call.
    Single(ExtractionResult),
    /// Image upload: one result per detected region, in detection order.
    PerRegion(Vec<ExtractionResult>),
}

impl IntakeResponse {
    /// Number of extraction results carried.
    pub fn len(&self) -> usize {
        match self {
            IntakeResponse::Single(_) => 1,
            IntakeResponse::PerRegion(results) => results.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn results(&self) -> Vec<&ExtractionResult> {
        match self {
            IntakeResponse::Single(r) => vec![r],
            IntakeResponse::PerRegion(results) => results.iter().collect(),
        }
    }
}
