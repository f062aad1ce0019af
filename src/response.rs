//! Model reply handling: fence stripping and JSON recovery.
//!
//! Providers frequently wrap the answer in ```json fences despite being told
//! not to. A reply that fails to parse is still kept verbatim so the file
//! produces an artifact for manual review instead of being dropped.

use serde_json::Value;

/// What came back from the model for one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelReply {
    /// The reply decoded to JSON.
    Structured(Value),
    /// The reply was non-empty but not valid JSON; kept verbatim.
    Unstructured(String),
    /// The provider returned no content at all.
    Empty,
}

impl ModelReply {
    /// Classify and decode a raw completion string.
    pub fn parse(raw: &str) -> Self {
        let cleaned = strip_code_fences(raw);
        if cleaned.is_empty() {
            return Self::Empty;
        }
        match serde_json::from_str::<Value>(cleaned) {
            Ok(value) => Self::Structured(value),
            Err(err) => {
                tracing::warn!(error = %err, "model reply is not valid JSON, keeping raw text");
                Self::Unstructured(raw.to_string())
            }
        }
    }

    /// The JSON body that gets persisted as the per-file artifact.
    ///
    /// Unstructured replies are wrapped as `{"raw_response": ...}` so the
    /// artifact shape stays machine-checkable either way.
    pub fn artifact(&self) -> Value {
        match self {
            Self::Structured(value) => value.clone(),
            Self::Unstructured(raw) => serde_json::json!({ "raw_response": raw }),
            Self::Empty => Value::Object(serde_json::Map::new()),
        }
    }

    pub fn as_structured(&self) -> Option<&Value> {
        match self {
            Self::Structured(value) => Some(value),
            _ => None,
        }
    }
}

/// Strip a leading ```json (or bare ```) fence and its closing fence.
///
/// Only whole-reply fences are removed. Fences inside the payload are the
/// payload's business.
fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
    else {
        return trimmed;
    };
    rest.strip_suffix("```").unwrap_or(rest).trim()
}
