//! Restricted code runtime (spec §4.2 "Local Code Runtime", resolved
//! concretely in SPEC_FULL §4.2.1) and the OS-mode "unsafe" runtime (spec
//! §1 "OS automation is an external collaborator, not embedded").
//!
//! Corresponds to `local_interpreter/interpreter.py::Interpreter._execute_code`,
//! which runs non-OS-mode code through a restricted `Sandbox` seeded with a
//! curated globals dict (registered tool callables plus a couple of power
//! tools) instead of the bare `exec()` used in OS mode. Rust has no safe
//! in-process analogue to executing arbitrary host-language source, so the
//! published allow-list narrows "code" to arithmetic/literal expressions
//! evaluated by `evalexpr` (the crate `CloudLLM-ai-cloudllm`'s
//! `tools/calculator.rs` uses for its own sandboxed expression tool)
//! against a read-only table of registered tool callables — no imports, no
//! attribute escape, and a denylist of identifiers that must never resolve
//! even if a caller tried to register them under those names.

use std::sync::Arc;

use evalexpr::{
    ContextWithMutableFunctions, EvalexprError, Function, HashMapContext, Value as EvalValue,
};

use crate::error::CoreError;
use crate::registry::ExtensionRegistry;
use crate::tool::{InvokeArgs, ToolResult};

/// Identifiers that must never resolve in the sandbox, regardless of what a
/// caller tries to register (spec §4.2.1 "always-blocked names").
const ALWAYS_BLOCKED: &[&str] = &[
    "exec", "eval", "compile", "input", "import", "open", "__import__", "os", "sys",
];

/// The restricted evaluator: arithmetic/literal expressions plus calls into
/// registered tools, nothing else.
pub struct Sandbox {
    registry: Arc<ExtensionRegistry>,
}

impl Sandbox {
    pub fn new(registry: Arc<ExtensionRegistry>) -> Self {
        Self { registry }
    }

    /// Evaluate `code` against a context seeded only with arithmetic
    /// built-ins and one function per registered tool name. Tool functions
    /// block on the registry's async `invoke` via the current Tokio
    /// runtime, since `evalexpr` functions are synchronous.
    pub fn execute(&self, code: &str) -> Result<ToolResult, CoreError> {
        for blocked in ALWAYS_BLOCKED {
            if code.contains(blocked) {
                return Err(CoreError::SandboxDenied(format!(
                    "use of '{blocked}' is not permitted in the local code runtime"
                )));
            }
        }

        let mut context = HashMapContext::new();
        for entry in self.registry.list_tools() {
            let name = entry.name.clone();
            let registry = self.registry.clone();
            let call_name = name.clone();
            let function = Function::new(move |argument: &EvalValue| {
                let args = flatten_args(argument);
                let registry = registry.clone();
                let call_name = call_name.clone();
                let result = tokio::task::block_in_place(move || {
                    tokio::runtime::Handle::current()
                        .block_on(registry.invoke(&call_name, InvokeArgs::Program(args)))
                });
                match result {
                    Ok(tool_result) => Ok(EvalValue::String(tool_result.output)),
                    Err(e) => Err(EvalexprError::CustomMessage(e.to_string())),
                }
            });
            context
                .set_function(name, function)
                .map_err(|e| CoreError::SandboxDenied(e.to_string()))?;
        }

        let value = evalexpr::eval_with_context_mut(code, &mut context)
            .map_err(|e| CoreError::SandboxDenied(e.to_string()))?;
        Ok(ToolResult::ok(value.to_string()))
    }

    /// Dispatch an OS-mode decision through the registry's `program` path
    /// rather than an in-process "unsafe" exec, since Rust has no safe
    /// analogue and OS automation is already scoped out as an external
    /// collaborator (spec §1, §4.2.1).
    pub async fn execute_os_mode(&self, tool_name: &str, args: Vec<String>) -> Result<ToolResult, CoreError> {
        self.registry.invoke(tool_name, InvokeArgs::Program(args)).await
    }
}

fn flatten_args(value: &EvalValue) -> Vec<String> {
    match value {
        EvalValue::Tuple(values) => values.iter().map(value_to_string).collect(),
        EvalValue::Empty => Vec::new(),
        other => vec![value_to_string(other)],
    }
}

fn value_to_string(value: &EvalValue) -> String {
    match value {
        EvalValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn execute_evaluates_arithmetic() {
        let registry = Arc::new(ExtensionRegistry::new());
        let sandbox = Sandbox::new(registry);
        let result = sandbox.execute("2 + 3 * 4").unwrap();
        assert_eq!(result.output, "14");
    }

    #[test]
    fn execute_denies_blocked_identifiers() {
        let registry = Arc::new(ExtensionRegistry::new());
        let sandbox = Sandbox::new(registry);
        let err = sandbox.execute("import(\"os\")").unwrap_err();
        assert_eq!(err.kind(), "SandboxDenied");
    }
}
