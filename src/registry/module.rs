//! `module` tools — dynamically discovered scripts with a variadic entry
//! point, lazily loaded on first invocation (spec §3 "Tool", §4.1
//! "Discovery / *Modules*", §4.1.1).
//!
//! Corresponds to `butler/core/extension_manager.py::_scan_packages`, which
//! walks a directory of plain Python files and imports any exposing a
//! `run()` function. A Rust host has no analogue to `importlib`-ing an
//! arbitrary file at runtime without embedding a scripting VM, so discovery
//! here validates a lightweight `<name>.module.json` descriptor per module
//! (name + description + optional signature) and the actual callable is
//! supplied in-process by the embedder via [`ModuleRegistry::provide`] —
//! the same "registered closure" strategy `modules/loader.rs` uses to
//! resolve a `ModuleDef` into a ready-to-spawn instance, adapted to this
//! crate's narrower module contract. Resolution itself is still deferred
//! to first invocation and cached behind a per-name [`OnceCell`] guard, so
//! concurrent first-invocations can't double-initialize (spec §5
//! "Build-on-demand race", generalized to module load).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::OnceCell;
use serde::Deserialize;
use serde_json::Value;

use crate::error::CoreError;
use crate::tool::{CatalogueEntry, Invocable, InvokeArgs, ToolKind, ToolResult};

/// A module's entry point: a variadic callable accepting positional and
/// keyword arguments and returning a single JSON value.
pub type ModuleEntryPoint =
    Arc<dyn Fn(Vec<Value>, HashMap<String, Value>) -> Result<Value, CoreError> + Send + Sync>;

const RESERVED_PREFIX: char = '_';
const DESCRIPTOR_SUFFIX: &str = ".module.json";

/// On-disk descriptor for a discoverable module.
#[derive(Debug, Clone, Deserialize)]
struct ModuleDescriptor {
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    signature: Option<Value>,
}

/// A discovered-but-not-yet-loaded module stub.
#[derive(Debug, Clone)]
pub struct ModuleStub {
    pub name: String,
    pub path: PathBuf,
    pub description: String,
    pub signature: Option<Value>,
}

/// Walk `modules_dir` for eligible `<name>.module.json` descriptors.
///
/// A file is eligible iff its stem does not start with [`RESERVED_PREFIX`].
/// Eligible files are indexed by stem but nothing is loaded yet.
pub fn discover(modules_dir: &Path) -> std::io::Result<Vec<ModuleStub>> {
    let mut stubs = Vec::new();
    if !modules_dir.is_dir() {
        return Ok(stubs);
    }
    let mut entries: Vec<_> = std::fs::read_dir(modules_dir)?.filter_map(|e| e.ok()).collect();
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let path = entry.path();
        let Some(filename) = path.file_name().and_then(|f| f.to_str()) else {
            continue;
        };
        if !filename.ends_with(DESCRIPTOR_SUFFIX) {
            continue;
        }
        let stem = &filename[..filename.len() - DESCRIPTOR_SUFFIX.len()];
        if stem.starts_with(RESERVED_PREFIX) {
            continue;
        }
        let descriptor = match std::fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str::<ModuleDescriptor>(&content).unwrap_or_default(),
            Err(_) => ModuleDescriptor::default(),
        };
        stubs.push(ModuleStub {
            name: stem.to_string(),
            path,
            description: descriptor
                .description
                .unwrap_or_else(|| format!("Dynamically discovered module '{stem}'.")),
            signature: descriptor.signature,
        });
    }
    Ok(stubs)
}

impl Default for ModuleDescriptor {
    fn default() -> Self {
        Self {
            description: None,
            signature: None,
        }
    }
}

/// A `module` tool: discovered eagerly, resolved (loaded) lazily.
pub struct ModuleTool {
    name: String,
    description: String,
    signature: Option<Value>,
    cache: OnceCell<ModuleEntryPoint>,
    resolver: parking_lot::Mutex<Option<ModuleEntryPoint>>,
}

impl std::fmt::Debug for ModuleTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleTool")
            .field("name", &self.name)
            .field("loaded", &self.cache.get().is_some())
            .finish()
    }
}

impl ModuleTool {
    /// Build a module tool from a discovered stub plus the entry point the
    /// embedder provides for it. `entry` is not called until first
    /// `invoke`.
    pub fn new(stub: ModuleStub, entry: ModuleEntryPoint) -> Self {
        Self {
            name: stub.name,
            description: stub.description,
            signature: stub.signature,
            cache: OnceCell::new(),
            resolver: parking_lot::Mutex::new(Some(entry)),
        }
    }

    /// True once the entry point has been resolved (loaded) at least once.
    pub fn is_loaded(&self) -> bool {
        self.cache.get().is_some()
    }

    fn resolve(&self) -> Result<&ModuleEntryPoint, CoreError> {
        self.cache.get_or_try_init(|| {
            self.resolver.lock().take().ok_or_else(|| CoreError::ModuleLoadFailed {
                name: self.name.clone(),
                reason: "module entry point already consumed".to_string(),
            })
        })
    }
}

#[async_trait]
impl Invocable for ModuleTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ToolKind {
        ToolKind::Module
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn signature(&self) -> Option<Value> {
        self.signature.clone()
    }

    async fn invoke(&self, args: InvokeArgs) -> Result<ToolResult, CoreError> {
        let (positional, keyword) = match args {
            InvokeArgs::Module { positional, keyword } => (positional, keyword),
            InvokeArgs::Program(argv) => (
                argv.into_iter().map(Value::String).collect(),
                HashMap::new(),
            ),
            InvokeArgs::Handler { command, args } => (vec![Value::String(command)], args),
        };

        let entry = match self.resolve() {
            Ok(e) => e.clone(),
            Err(e) => {
                tracing::error!(module = %self.name, error = %e, "module load failed");
                return Ok(ToolResult::err(e.to_string()));
            }
        };

        match entry(positional, keyword) {
            Ok(value) => Ok(ToolResult::ok(stringify(&value))),
            Err(e) => Ok(ToolResult::err(e.to_string())),
        }
    }

    fn catalogue_entry(&self) -> CatalogueEntry {
        CatalogueEntry {
            name: self.name.clone(),
            kind: ToolKind::Module,
            description: self.description.clone(),
            signature: self.signature.clone(),
        }
    }
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discover_skips_reserved_prefix_and_non_descriptor_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("weather.module.json"),
            r#"{"description":"Gets the weather"}"#,
        )
        .unwrap();
        std::fs::write(dir.path().join("_internal.module.json"), "{}").unwrap();
        std::fs::write(dir.path().join("readme.txt"), "not a module").unwrap();

        let stubs = discover(dir.path()).unwrap();
        assert_eq!(stubs.len(), 1);
        assert_eq!(stubs[0].name, "weather");
        assert_eq!(stubs[0].description, "Gets the weather");
    }

    #[test]
    fn discover_on_missing_directory_returns_empty() {
        let stubs = discover(Path::new("/nonexistent/modules")).unwrap();
        assert!(stubs.is_empty());
    }

    #[tokio::test]
    async fn invoke_resolves_once_and_caches() {
        let stub = ModuleStub {
            name: "echo".to_string(),
            path: PathBuf::from("echo.module.json"),
            description: "Echoes its args".to_string(),
            signature: None,
        };
        let entry: ModuleEntryPoint = Arc::new(|positional, _keyword| {
            Ok(Value::String(
                positional.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(" "),
            ))
        });
        let tool = ModuleTool::new(stub, entry);
        assert!(!tool.is_loaded());

        let result = tool
            .invoke(InvokeArgs::Module {
                positional: vec![Value::String("hi".to_string())],
                keyword: HashMap::new(),
            })
            .await
            .unwrap();
        assert_eq!(result.output, "\"hi\"");
        assert!(tool.is_loaded());

        // Second invocation reuses the cached entry point rather than
        // failing with "already consumed".
        let second = tool
            .invoke(InvokeArgs::Module {
                positional: vec![],
                keyword: HashMap::new(),
            })
            .await
            .unwrap();
        assert!(second.is_success());
    }
}
