//! Process-wide configuration.
//!
//! Corresponds to `utilities/config.rs`'s `process_config` merge-with-defaults
//! idiom, generalized here into a typed `Config` loaded from the environment
//! per spec §6 ("Environment"). A process-wide initialization routine loads
//! this before any `AgentLoop` is started (spec §5, "Shared resources").

use std::time::Duration;

/// LLM API key, endpoint, and per-phase timeouts, overridable from the
/// environment.
#[derive(Debug, Clone)]
pub struct Config {
    /// API key for the LLM service. Required.
    pub llm_api_key: String,
    /// Base URL override for the LLM service.
    pub llm_base_url: String,
    /// Model used outside OS mode (code-oriented).
    pub llm_model: String,
    /// Model used in OS mode (vision-capable).
    pub llm_vision_model: String,
    /// Iteration ceiling for the agent loop.
    pub max_iterations: usize,
    /// Timeout applied to a single LLM call.
    pub llm_timeout: Duration,
    /// Timeout applied to a single external program invocation.
    pub program_timeout: Duration,
    /// Directory scanned for program manifests.
    pub programs_dir: String,
    /// Directory scanned for dynamically discovered modules.
    pub modules_dir: String,
}

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_VISION_MODEL: &str = "gpt-4o";
const DEFAULT_MAX_ITERATIONS: usize = 10;
const DEFAULT_LLM_TIMEOUT_SECS: u64 = 60;
const DEFAULT_PROGRAM_TIMEOUT_SECS: u64 = 30;
const DEFAULT_PROGRAMS_DIR: &str = "programs";
const DEFAULT_MODULES_DIR: &str = "modules";

impl Config {
    /// Load configuration from environment variables, falling back to
    /// defaults for everything except the API key.
    ///
    /// # Errors
    /// Returns an error message if `AGENTCORE_LLM_API_KEY` is unset.
    pub fn from_env() -> Result<Self, String> {
        let llm_api_key = std::env::var("AGENTCORE_LLM_API_KEY")
            .map_err(|_| "AGENTCORE_LLM_API_KEY is required".to_string())?;

        Ok(Self {
            llm_api_key,
            llm_base_url: env_or("AGENTCORE_LLM_BASE_URL", DEFAULT_BASE_URL),
            llm_model: env_or("AGENTCORE_LLM_MODEL", DEFAULT_MODEL),
            llm_vision_model: env_or("AGENTCORE_LLM_VISION_MODEL", DEFAULT_VISION_MODEL),
            max_iterations: env_parse_or("AGENTCORE_MAX_ITERATIONS", DEFAULT_MAX_ITERATIONS),
            llm_timeout: Duration::from_secs(env_parse_or(
                "AGENTCORE_LLM_TIMEOUT_SECS",
                DEFAULT_LLM_TIMEOUT_SECS,
            )),
            program_timeout: Duration::from_secs(env_parse_or(
                "AGENTCORE_PROGRAM_TIMEOUT_SECS",
                DEFAULT_PROGRAM_TIMEOUT_SECS,
            )),
            programs_dir: env_or("AGENTCORE_PROGRAMS_DIR", DEFAULT_PROGRAMS_DIR),
            modules_dir: env_or("AGENTCORE_MODULES_DIR", DEFAULT_MODULES_DIR),
        })
    }

    /// A config suitable for tests: a dummy API key and short timeouts.
    #[cfg(any(test, feature = "test-util"))]
    pub fn for_tests() -> Self {
        Self {
            llm_api_key: "test-key".to_string(),
            llm_base_url: DEFAULT_BASE_URL.to_string(),
            llm_model: DEFAULT_MODEL.to_string(),
            llm_vision_model: DEFAULT_VISION_MODEL.to_string(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
            llm_timeout: Duration::from_secs(5),
            program_timeout: Duration::from_secs(5),
            programs_dir: DEFAULT_PROGRAMS_DIR.to_string(),
            modules_dir: DEFAULT_MODULES_DIR.to_string(),
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Install a `tracing` subscriber reading `RUST_LOG`, following the teacher's
/// `env_logger`/`tracing` combination but standardized on `tracing` alone.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}
