//! `ToolResult` — the captured outcome of invoking a tool (spec §3).

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// An opaque blob attached to a `ToolResult`, e.g. a base64-encoded
/// screenshot produced by an OS-mode tool.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Artifact {
    /// MIME type of the payload, e.g. `"image/png"`.
    pub mime: String,
    /// Base64-encoded payload.
    pub data_base64: String,
}

impl Artifact {
    /// Build an artifact from raw bytes, base64-encoding them for wire
    /// transport (spec §3 "Artifact ... base64-encoded payload").
    pub fn from_bytes(mime: impl Into<String>, bytes: &[u8]) -> Self {
        use base64::Engine;
        Self {
            mime: mime.into(),
            data_base64: base64::engine::general_purpose::STANDARD.encode(bytes),
        }
    }
}

/// The captured outcome of invoking a tool.
///
/// `output` and `error` are plain strings rather than a `Result` because a
/// tool invocation's failure is data the Agent Loop feeds back to the LLM,
/// not a fatal error (spec §4.2 "Failure semantics": "Tool errors never end
/// the loop").
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolResult {
    /// Captured stdout / return value, stringified. May be empty.
    pub output: String,
    /// Captured error text. Empty iff the invocation succeeded.
    pub error: String,
    /// Optional opaque blob (e.g. a screenshot).
    pub artifact: Option<Artifact>,
    /// Optional diagnostic string (e.g. exit code, stack trace) not meant
    /// for the LLM but useful for operator-facing logs.
    pub diagnostic: Option<String>,
}

impl ToolResult {
    /// A successful result carrying only `output`.
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            ..Default::default()
        }
    }

    /// A failed result carrying only `error`.
    pub fn err(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            ..Default::default()
        }
    }

    /// True iff this result represents success (`error` is empty).
    pub fn is_success(&self) -> bool {
        self.error.is_empty()
    }

    /// Merge two results by concatenating `output` and `error`, combining
    /// `artifact` as "only one may be present" (mixing two is an error),
    /// per spec §3 "ToolResult ... Combinable".
    pub fn merge(self, other: ToolResult) -> Result<ToolResult, CoreError> {
        let artifact = match (self.artifact, other.artifact) {
            (Some(_), Some(_)) => {
                return Err(CoreError::MalformedDecision(
                    "cannot merge two ToolResults that both carry an artifact".to_string(),
                ))
            }
            (Some(a), None) | (None, Some(a)) => Some(a),
            (None, None) => None,
        };
        Ok(ToolResult {
            output: self.output + &other.output,
            error: self.error + &other.error,
            artifact,
            diagnostic: self.diagnostic.or(other.diagnostic),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_concatenates_output_and_error() {
        let a = ToolResult::ok("hello ");
        let b = ToolResult::ok("world");
        let merged = a.merge(b).unwrap();
        assert_eq!(merged.output, "hello world");
        assert!(merged.error.is_empty());
    }

    #[test]
    fn merge_rejects_two_artifacts() {
        let art = Artifact {
            mime: "image/png".to_string(),
            data_base64: "AAAA".to_string(),
        };
        let a = ToolResult {
            artifact: Some(art.clone()),
            ..Default::default()
        };
        let b = ToolResult {
            artifact: Some(art),
            ..Default::default()
        };
        assert!(a.merge(b).is_err());
    }

    #[test]
    fn from_bytes_base64_encodes_payload() {
        let artifact = Artifact::from_bytes("image/png", b"hello");
        assert_eq!(artifact.mime, "image/png");
        assert_eq!(artifact.data_base64, "aGVsbG8=");
    }

    #[test]
    fn merge_keeps_single_artifact() {
        let art = Artifact {
            mime: "image/png".to_string(),
            data_base64: "AAAA".to_string(),
        };
        let a = ToolResult {
            artifact: Some(art.clone()),
            ..Default::default()
        };
        let b = ToolResult::ok("text");
        let merged = a.merge(b).unwrap();
        assert_eq!(merged.artifact, Some(art));
    }
}
