//! `handler` tools — in-process callables registered at startup, typically
//! bound 1:1 to an intent name (spec §3 "Tool", §4.1 "Discovery /
//! *Handlers*").
//!
//! Corresponds to the command-dispatch table in
//! `butler/core/legacy_commands.py`, where a handful of built-in commands
//! (e.g. "open app", "set volume") are wired directly to Python functions
//! rather than discovered from disk.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::CoreError;
use crate::tool::{CatalogueEntry, Invocable, InvokeArgs, ToolKind, ToolResult};

/// A handler's callback: the `command` string dispatched and its keyword
/// arguments, returning a `ToolResult` synchronously.
pub type HandlerFn = Arc<dyn Fn(&str, &HashMap<String, Value>) -> Result<ToolResult, CoreError> + Send + Sync>;

/// A `handler` tool: a name, description, and an in-process callback.
#[derive(Clone)]
pub struct HandlerTool {
    name: String,
    description: String,
    callback: HandlerFn,
}

impl std::fmt::Debug for HandlerTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerTool").field("name", &self.name).finish()
    }
}

impl HandlerTool {
    pub fn new(name: impl Into<String>, description: impl Into<String>, callback: HandlerFn) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            callback,
        }
    }
}

#[async_trait]
impl Invocable for HandlerTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ToolKind {
        ToolKind::Handler
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn invoke(&self, args: InvokeArgs) -> Result<ToolResult, CoreError> {
        let (command, kwargs) = match args {
            InvokeArgs::Handler { command, args } => (command, args),
            InvokeArgs::Program(argv) => (self.name.clone(), {
                let mut map = HashMap::new();
                map.insert("argv".to_string(), Value::from(argv));
                map
            }),
            InvokeArgs::Module { positional, keyword } => {
                let mut map = keyword;
                map.insert("positional".to_string(), Value::from(positional));
                (self.name.clone(), map)
            }
        };
        (self.callback)(&command, &kwargs)
    }

    fn catalogue_entry(&self) -> CatalogueEntry {
        CatalogueEntry {
            name: self.name.clone(),
            kind: ToolKind::Handler,
            description: self.description.clone(),
            signature: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn invoke_dispatches_command_and_kwargs() {
        let handler = HandlerTool::new(
            "set_volume",
            "Sets system volume",
            Arc::new(|command, args| {
                let level = args.get("level").and_then(|v| v.as_i64()).unwrap_or(0);
                Ok(ToolResult::ok(format!("{command}:{level}")))
            }),
        );
        let mut kwargs = HashMap::new();
        kwargs.insert("level".to_string(), Value::from(42));
        let result = handler
            .invoke(InvokeArgs::Handler {
                command: "set_volume".to_string(),
                args: kwargs,
            })
            .await
            .unwrap();
        assert_eq!(result.output, "set_volume:42");
    }

    #[tokio::test]
    async fn invoke_propagates_callback_error() {
        let handler = HandlerTool::new(
            "fails",
            "Always fails",
            Arc::new(|_, _| Err(CoreError::SandboxDenied("nope".to_string()))),
        );
        let result = handler
            .invoke(InvokeArgs::Handler {
                command: "fails".to_string(),
                args: HashMap::new(),
            })
            .await;
        assert!(result.is_err());
    }
}
