//! Shared error taxonomy for the agent core.
//!
//! Corresponds to `butler/core/extension_manager.py`, `butler/code_execution_manager.py`,
//! and `package/workflow_manager.py`'s scattered `logging.error`/raised-exception sites,
//! unified the way `crewai-rust`'s `utilities/errors.rs` unifies its own component errors:
//! one `thiserror`-derived enum per `ErrorKind` in the design, with component-local
//! wrappers that convert into it via `#[from]` so call sites can use `?` throughout.

use thiserror::Error;

/// Every distinct failure mode the core can produce, named after the design's
/// `ErrorKind` taxonomy (spec §7).
#[derive(Debug, Error)]
pub enum CoreError {
    /// Invocation refers to an unregistered tool name.
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    /// A program's build step exited nonzero or produced no executable.
    #[error("build failed for program '{name}': {reason}")]
    BuildFailed { name: String, reason: String },

    /// A program manifest was structurally invalid.
    #[error("invalid manifest at {path}: {reason}")]
    InvalidManifest { path: String, reason: String },

    /// A workflow spec line was structurally invalid.
    #[error("invalid workflow spec: {0}")]
    InvalidSpec(String),

    /// The restricted code runtime refused an operation.
    #[error("sandbox denied: {0}")]
    SandboxDenied(String),

    /// A child process failed to launch or exited nonzero.
    #[error("external process failed: {0}")]
    ExternalProcessFailed(String),

    /// Module discovery or entry-point invocation raised.
    #[error("module load failed for '{name}': {reason}")]
    ModuleLoadFailed { name: String, reason: String },

    /// The LLM orchestrator could not produce a decision.
    #[error("LLM unavailable: {0}")]
    LLMUnavailable(String),

    /// The decision returned by the orchestrator matched no known variant.
    #[error("malformed decision: {0}")]
    MalformedDecision(String),

    /// The dependency graph contains a cycle.
    #[error("cyclic dependency graph detected")]
    CyclicGraph,

    /// A per-phase deadline was exceeded.
    #[error("timeout after {0:?}")]
    Timeout(std::time::Duration),

    /// The task was cancelled by the operator.
    #[error("cancelled")]
    Cancelled,

    /// Generic I/O error, wrapped so registries/planner can propagate with `?`.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CoreError {
    /// A short, stable tag naming the `ErrorKind` — useful for tests and for
    /// structured logging fields (`tracing::error!(kind = %err.kind(), ...)`).
    pub fn kind(&self) -> &'static str {
        match self {
            CoreError::UnknownTool(_) => "UnknownTool",
            CoreError::BuildFailed { .. } => "BuildFailed",
            CoreError::InvalidManifest { .. } => "InvalidManifest",
            CoreError::InvalidSpec(_) => "InvalidSpec",
            CoreError::SandboxDenied(_) => "SandboxDenied",
            CoreError::ExternalProcessFailed(_) => "ExternalProcessFailed",
            CoreError::ModuleLoadFailed { .. } => "ModuleLoadFailed",
            CoreError::LLMUnavailable(_) => "LLMUnavailable",
            CoreError::MalformedDecision(_) => "MalformedDecision",
            CoreError::CyclicGraph => "CyclicGraph",
            CoreError::Timeout(_) => "Timeout",
            CoreError::Cancelled => "Cancelled",
            CoreError::Io(_) => "Io",
            CoreError::Json(_) => "Json",
        }
    }
}

/// Convenience alias used across the crate's public surface.
pub type CoreResult<T> = Result<T, CoreError>;
