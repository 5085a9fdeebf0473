//! `ToolDecision` — the tagged variant produced by the LLM orchestrator
//! (spec §3 "ToolDecision", §6 "Tool decision (wire, JSON returned by the
//! LLM)").
//!
//! Corresponds to `local_interpreter/coordinator/orchestrator.py`'s
//! `PythonCode` / `ExternalToolCall` / `FinalResponse` pydantic models,
//! unified into one `AIResponse` union; the wire tagging (`tool_type`)
//! mirrors that union 1:1. The streaming-delta shape follows
//! `llms/streaming.rs`'s `StreamChunk` tagged enum.

use serde::{Deserialize, Serialize};

/// A structured decision from the LLM orchestrator: either a code fragment
/// to run in the local sandbox, a named external tool call, or a final
/// user-facing answer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "tool_type", rename_all = "snake_case")]
pub enum ToolDecision {
    /// Inline code fragment to execute in the local sandbox.
    Python { thought: String, code: String },
    /// Invocation of a named tool via the Extension Registry.
    External {
        thought: String,
        tool_name: String,
        #[serde(default)]
        args: Vec<String>,
    },
    /// Terminates the loop with a user-visible message.
    Final { thought: String, message: String },
}

impl ToolDecision {
    /// The `thought` rationale carried by every variant.
    pub fn thought(&self) -> &str {
        match self {
            ToolDecision::Python { thought, .. } => thought,
            ToolDecision::External { thought, .. } => thought,
            ToolDecision::Final { thought, .. } => thought,
        }
    }

    /// A short preview string used for the `code_chunk` event: the code for
    /// `Python`, a call-syntax rendering for `External`, nothing for `Final`.
    pub fn preview(&self) -> String {
        match self {
            ToolDecision::Python { code, .. } => format!("```python\n{code}\n```"),
            ToolDecision::External { tool_name, args, .. } => {
                format!("{tool_name}({})", args.join(", "))
            }
            ToolDecision::Final { .. } => String::new(),
        }
    }
}

/// A partially-streamed decision: every field is optional until the stream
/// closes, mirroring `instructor.Partial[AIResponse]` in the original
/// Python orchestrator. The Agent Loop diffs `thought`/`preview` against the
/// last-emitted value on each partial to compute the delta it streams to
/// observers (spec §9 "Streaming structured decisions").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PartialDecision {
    pub tool_type: Option<String>,
    pub thought: Option<String>,
    pub code: Option<String>,
    pub tool_name: Option<String>,
    pub args: Option<Vec<String>>,
    pub message: Option<String>,
}

impl PartialDecision {
    /// The best-effort current `thought` text, for incremental streaming.
    pub fn thought_so_far(&self) -> &str {
        self.thought.as_deref().unwrap_or("")
    }

    /// The best-effort current code/tool-call preview text.
    pub fn preview_so_far(&self) -> String {
        match self.tool_type.as_deref() {
            Some("python") => self.code.clone().unwrap_or_default(),
            Some("external") => format!(
                "{}({})",
                self.tool_name.clone().unwrap_or_default(),
                self.args.clone().unwrap_or_default().join(", ")
            ),
            _ => String::new(),
        }
    }

    /// Finalize this partial into a concrete `ToolDecision`, failing with
    /// `None` if the stream closed without enough fields to form a valid
    /// variant (spec §6: "Anything else is a malformed decision").
    pub fn finalize(self) -> Option<ToolDecision> {
        match self.tool_type.as_deref() {
            Some("python") => Some(ToolDecision::Python {
                thought: self.thought.unwrap_or_default(),
                code: self.code?,
            }),
            Some("external") => Some(ToolDecision::External {
                thought: self.thought.unwrap_or_default(),
                tool_name: self.tool_name?,
                args: self.args.unwrap_or_default(),
            }),
            Some("final") => Some(ToolDecision::Final {
                thought: self.thought.unwrap_or_default(),
                message: self.message?,
            }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_format_matches_tagged_schema() {
        let decision = ToolDecision::External {
            thought: "need weather".to_string(),
            tool_name: "weather".to_string(),
            args: vec!["berlin".to_string()],
        };
        let json = serde_json::to_value(&decision).unwrap();
        assert_eq!(json["tool_type"], "external");
        assert_eq!(json["tool_name"], "weather");
    }

    #[test]
    fn deserializes_python_variant() {
        let raw = r#"{"tool_type":"python","thought":"t","code":"print(2)"}"#;
        let decision: ToolDecision = serde_json::from_str(raw).unwrap();
        assert_eq!(
            decision,
            ToolDecision::Python {
                thought: "t".to_string(),
                code: "print(2)".to_string()
            }
        );
    }

    #[test]
    fn partial_finalizes_to_final_variant() {
        let partial = PartialDecision {
            tool_type: Some("final".to_string()),
            thought: Some("done".to_string()),
            message: Some("All set.".to_string()),
            ..Default::default()
        };
        let decision = partial.finalize().unwrap();
        assert_eq!(
            decision,
            ToolDecision::Final {
                thought: "done".to_string(),
                message: "All set.".to_string()
            }
        );
    }

    #[test]
    fn partial_missing_required_field_fails_to_finalize() {
        let partial = PartialDecision {
            tool_type: Some("external".to_string()),
            thought: Some("t".to_string()),
            ..Default::default()
        };
        assert!(partial.finalize().is_none());
    }

    #[test]
    fn unknown_tag_is_malformed() {
        let partial = PartialDecision {
            tool_type: Some("unknown".to_string()),
            ..Default::default()
        };
        assert!(partial.finalize().is_none());
    }
}
