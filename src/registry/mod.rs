//! Extension Registry & Dispatcher (spec §4.1).
//!
//! Corresponds to `butler/core/extension_manager.py::ExtensionManager`,
//! which owns the three discovery mechanisms (handlers, modules, programs)
//! behind one `get_all_tools()` / `execute(name, args)` surface. Concurrent
//! readers (the Agent Loop listing tools mid-conversation) and occasional
//! writers (a rescan picking up a newly dropped program) are served by a
//! [`DashMap`], the concurrent map crate already carried in the teacher's
//! dependency table for exactly this read-mostly/occasional-write shape.

pub mod handler;
pub mod module;
pub mod program;

use std::path::Path;
use std::sync::Arc;

use dashmap::DashMap;

use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::tool::{CatalogueEntry, Invocable, InvokeArgs, ToolResult};

pub use handler::{HandlerFn, HandlerTool};
pub use module::{ModuleEntryPoint, ModuleStub, ModuleTool};
pub use program::{ProgramDiscovery, ProgramTool};

/// The unified tool directory: every registered `handler`, `module`, and
/// `program` behind one name -> `Invocable` map (spec §4.1 "Catalogue").
pub struct ExtensionRegistry {
    tools: DashMap<String, Arc<dyn Invocable>>,
    program_discovery: ProgramDiscovery,
}

impl ExtensionRegistry {
    pub fn new() -> Self {
        Self {
            tools: DashMap::new(),
            program_discovery: ProgramDiscovery::new(),
        }
    }

    /// Register a handler tool, in-process, at startup.
    pub fn register_handler(&self, name: impl Into<String>, description: impl Into<String>, callback: HandlerFn) {
        let tool = HandlerTool::new(name, description, callback);
        self.tools.insert(tool.name().to_string(), Arc::new(tool));
    }

    /// Register a single discovered module against the entry point the
    /// embedder supplies for it.
    pub fn register_module(&self, stub: ModuleStub, entry: ModuleEntryPoint) {
        let tool = ModuleTool::new(stub, entry);
        self.tools.insert(tool.name().to_string(), Arc::new(tool));
    }

    /// Scan `modules_dir` and register every discovered stub the embedder
    /// has a matching `providers` entry for. Stubs without a provider are
    /// skipped with a warning (spec §4.1: "eligible" doesn't mean "usable").
    pub fn discover_modules(
        &self,
        modules_dir: &Path,
        providers: &std::collections::HashMap<String, ModuleEntryPoint>,
    ) -> std::io::Result<()> {
        for stub in module::discover(modules_dir)? {
            match providers.get(&stub.name) {
                Some(entry) => self.register_module(stub, entry.clone()),
                None => {
                    tracing::warn!(module = %stub.name, "discovered module has no registered entry point, skipping");
                }
            }
        }
        Ok(())
    }

    /// Scan `programs_dir`, building any stale project and registering every
    /// program that builds successfully. Programs that fail to build are
    /// logged and excluded from the catalogue rather than aborting the scan
    /// (spec §4.1 "Discovery / *Programs*").
    pub fn discover_programs(&self, config: &Config) {
        let programs_dir = Path::new(&config.programs_dir);
        for (label, result) in self
            .program_discovery
            .scan(programs_dir, config.program_timeout)
        {
            match result {
                Ok(tool) => {
                    self.tools.insert(tool.name().to_string(), Arc::new(tool));
                }
                Err(e) => {
                    tracing::error!(project = %label, error = %e, "program discovery failed");
                }
            }
        }
    }

    /// The full tool catalogue, sorted by name, as handed to the LLM
    /// orchestrator's system prompt (spec §4.1 "Catalogue").
    pub fn list_tools(&self) -> Vec<CatalogueEntry> {
        let mut entries: Vec<_> = self.tools.iter().map(|e| e.value().catalogue_entry()).collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        entries
    }

    /// True iff a tool with this name is registered.
    pub fn has_tool(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Dispatch an invocation by name, failing with `UnknownTool` if no tool
    /// is registered under it (spec §7 "ErrorKind::UnknownTool").
    pub async fn invoke(&self, name: &str, args: InvokeArgs) -> CoreResult<ToolResult> {
        let tool = self
            .tools
            .get(name)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| CoreError::UnknownTool(name.to_string()))?;
        let call_id = uuid::Uuid::new_v4();
        tracing::debug!(call_id = %call_id, tool = name, kind = %tool.kind(), "invoking tool");
        tool.invoke(args).await
    }
}

impl Default for ExtensionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use serde_json::Value;

    #[test]
    fn list_tools_is_sorted_by_name() {
        let registry = ExtensionRegistry::new();
        registry.register_handler("zeta", "z", Arc::new(|_, _| Ok(ToolResult::ok("z"))));
        registry.register_handler("alpha", "a", Arc::new(|_, _| Ok(ToolResult::ok("a"))));
        let names: Vec<_> = registry.list_tools().into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["alpha".to_string(), "zeta".to_string()]);
    }

    #[tokio::test]
    async fn invoke_unknown_tool_fails() {
        let registry = ExtensionRegistry::new();
        let err = registry
            .invoke("nope", InvokeArgs::Program(vec![]))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "UnknownTool");
    }

    #[tokio::test]
    async fn invoke_dispatches_to_registered_handler() {
        let registry = ExtensionRegistry::new();
        registry.register_handler(
            "echo",
            "Echoes the command",
            Arc::new(|command, _| Ok(ToolResult::ok(command.to_string()))),
        );
        let result = registry
            .invoke(
                "echo",
                InvokeArgs::Handler {
                    command: "echo".to_string(),
                    args: HashMap::new(),
                },
            )
            .await
            .unwrap();
        assert_eq!(result.output, "echo");
    }

    #[test]
    fn discover_modules_skips_stubs_without_provider() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("orphan.module.json"), "{}").unwrap();
        let registry = ExtensionRegistry::new();
        let providers: HashMap<String, ModuleEntryPoint> = HashMap::new();
        registry.discover_modules(dir.path(), &providers).unwrap();
        assert!(!registry.has_tool("orphan"));
    }

    #[test]
    fn discover_modules_registers_provided_stub() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("echo.module.json"), "{}").unwrap();
        let registry = ExtensionRegistry::new();
        let mut providers: HashMap<String, ModuleEntryPoint> = HashMap::new();
        providers.insert(
            "echo".to_string(),
            Arc::new(|positional, _| Ok(Value::Array(positional))),
        );
        registry.discover_modules(dir.path(), &providers).unwrap();
        assert!(registry.has_tool("echo"));
    }
}
