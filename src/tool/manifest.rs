//! `Manifest` — the JSON descriptor of a `program` tool (spec §3, §6).
//!
//! Corresponds to the `manifest.json` schema read by
//! `butler/code_execution_manager.py::_compile_and_register_project`.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Persistent descriptor for a `program` tool, read once at registry scan
/// time (spec §3 "Manifest").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub name: String,
    pub language: String,
    /// Build command template; substitutes `{source}` and `{output}`.
    pub build: String,
    /// Relative source file paths.
    pub source: Vec<String>,
    /// Relative path to the built executable.
    pub executable: String,
    /// Optional run-command template; substitutes `{args}`.
    #[serde(default)]
    pub run: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl Manifest {
    /// Parse a manifest from a JSON file, failing with `InvalidManifest` on
    /// any structural problem.
    pub fn from_file(path: &Path) -> Result<Self, CoreError> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| CoreError::InvalidManifest {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }

    /// Render the build command, substituting `{source}` (space-joined
    /// source paths) and `{output}` (the relative executable path).
    pub fn render_build_command(&self) -> String {
        self.build
            .replace("{source}", &self.source.join(" "))
            .replace("{output}", &self.executable)
    }

    /// Render the run-command template, substituting `{args}` with the
    /// shell-quoted, space-joined argument string.
    pub fn render_run_command(&self, args: &[String]) -> Option<String> {
        self.run.as_ref().map(|tmpl| {
            let quoted = args
                .iter()
                .map(|a| shell_quote(a))
                .collect::<Vec<_>>()
                .join(" ");
            tmpl.replace("{args}", &quoted)
        })
    }

    /// Non-empty, all-required-fields check beyond what serde already
    /// enforces (an empty `name`/`build`/`executable` is still structurally
    /// valid JSON but a meaningless manifest).
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.name.trim().is_empty()
            || self.language.trim().is_empty()
            || self.build.trim().is_empty()
            || self.executable.trim().is_empty()
            || self.source.is_empty()
        {
            return Err(CoreError::InvalidManifest {
                path: self.name.clone(),
                reason: "manifest is missing one of: name, language, build, source, executable"
                    .to_string(),
            });
        }
        Ok(())
    }
}

/// Minimal POSIX shell quoting sufficient for the `{args}` substitution;
/// wraps in single quotes and escapes embedded single quotes.
fn shell_quote(arg: &str) -> String {
    if !arg.is_empty() && arg.chars().all(|c| c.is_ascii_alphanumeric() || "-_./:".contains(c)) {
        return arg.to_string();
    }
    format!("'{}'", arg.replace('\'', r"'\''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Manifest {
        Manifest {
            name: "echo".to_string(),
            language: "cpp".to_string(),
            build: "g++ {source} -o {output}".to_string(),
            source: vec!["main.cpp".to_string()],
            executable: "echo".to_string(),
            run: None,
            description: Some("Echoes argv".to_string()),
        }
    }

    #[test]
    fn render_build_command_substitutes_placeholders() {
        let m = sample();
        assert_eq!(m.render_build_command(), "g++ main.cpp -o echo");
    }

    #[test]
    fn render_run_command_quotes_args() {
        let mut m = sample();
        m.run = Some("./echo {args}".to_string());
        let rendered = m
            .render_run_command(&["hello world".to_string(), "plain".to_string()])
            .unwrap();
        assert_eq!(rendered, "./echo 'hello world' plain");
    }

    #[test]
    fn render_run_command_none_without_template() {
        let m = sample();
        assert!(m.render_run_command(&["x".to_string()]).is_none());
    }

    #[test]
    fn validate_rejects_missing_fields() {
        let mut m = sample();
        m.source.clear();
        assert!(m.validate().is_err());
    }

    #[test]
    fn validate_accepts_complete_manifest() {
        assert!(sample().validate().is_ok());
    }

    #[test]
    fn from_file_reports_invalid_manifest_on_bad_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.json");
        std::fs::write(&path, "not json").unwrap();
        let err = Manifest::from_file(&path).unwrap_err();
        assert_eq!(err.kind(), "InvalidManifest");
    }
}
