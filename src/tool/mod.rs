//! Tool data model — the addressable unit of work the Extension Registry
//! dispatches (spec §3 "Tool").
//!
//! Corresponds to the unified tool abstraction in
//! `butler/core/extension_manager.py::get_all_tools`/`execute`, generalized
//! the way `tools/base_tool.rs`'s `BaseTool` trait generalizes CrewAI's
//! callable tools: a single capability (`invoke`) that every kind
//! (handler/module/program) implements, so the Agent Loop never branches on
//! kind itself (spec §9, "Dynamic dispatch across three tool kinds").

pub mod decision;
pub mod manifest;
pub mod result;

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CoreResult;
pub use decision::{PartialDecision, ToolDecision};
pub use manifest::Manifest;
pub use result::{Artifact, ToolResult};

/// Which of the three tool families a given tool belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    /// In-process function registered at startup against a named intent.
    Handler,
    /// Dynamically discovered script with an exported entry point.
    Module,
    /// Precompiled executable described by a manifest.
    Program,
}

impl std::fmt::Display for ToolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ToolKind::Handler => write!(f, "handler"),
            ToolKind::Module => write!(f, "module"),
            ToolKind::Program => write!(f, "program"),
        }
    }
}

/// Arguments passed to `invoke`, shaped per spec §4.1 "Invocation contract":
/// a string list for `program`, a command+mapping for `handler`, and
/// positional+keyword for `module`.
#[derive(Debug, Clone)]
pub enum InvokeArgs {
    /// `program`: always a string list.
    Program(Vec<String>),
    /// `handler`: a mapping with `command` and `args`.
    Handler {
        command: String,
        args: HashMap<String, Value>,
    },
    /// `module`: positional + keyword arguments.
    Module {
        positional: Vec<Value>,
        keyword: HashMap<String, Value>,
    },
}

impl InvokeArgs {
    /// Convenience constructor for the common case of plain string argv,
    /// used by the planner and by callers that don't care about the kind's
    /// exact argument shape (it is reshaped per-kind by the registry).
    pub fn from_strings(args: Vec<String>) -> Self {
        InvokeArgs::Program(args)
    }

    /// Render the args as a short human-readable preview, used in the
    /// `code_chunk` event the loop emits when it previews an `ExternalCall`.
    pub fn preview(&self) -> String {
        match self {
            InvokeArgs::Program(args) => args.join(" "),
            InvokeArgs::Handler { command, args } => {
                format!("{command} {}", serde_json::to_string(args).unwrap_or_default())
            }
            InvokeArgs::Module { positional, keyword } => {
                format!(
                    "{} {}",
                    positional
                        .iter()
                        .map(|v| v.to_string())
                        .collect::<Vec<_>>()
                        .join(" "),
                    serde_json::to_string(keyword).unwrap_or_default()
                )
            }
        }
    }
}

/// A single catalogue row, exactly what `list_tools()` hands to the LLM
/// (spec §4.1 "Catalogue").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogueEntry {
    pub name: String,
    pub kind: ToolKind,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<Value>,
}

/// Capability every tool kind implements, so the registry and the agent loop
/// dispatch uniformly regardless of kind (spec §9).
#[async_trait]
pub trait Invocable: Send + Sync + std::fmt::Debug {
    /// Unique tool name.
    fn name(&self) -> &str;
    /// Which kind this tool belongs to.
    fn kind(&self) -> ToolKind;
    /// Human-readable description; always non-empty (spec §3 invariant).
    fn description(&self) -> &str;
    /// Optional structured signature surfaced in the catalogue.
    fn signature(&self) -> Option<Value> {
        None
    }
    /// Invoke the tool with kind-appropriate arguments.
    async fn invoke(&self, args: InvokeArgs) -> CoreResult<ToolResult>;

    /// Project this tool into a catalogue row.
    fn catalogue_entry(&self) -> CatalogueEntry {
        CatalogueEntry {
            name: self.name().to_string(),
            kind: self.kind(),
            description: self.description().to_string(),
            signature: self.signature(),
        }
    }
}
