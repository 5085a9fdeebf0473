//! `program` tools — precompiled executables described by a [`Manifest`]
//! (spec §3 "Manifest", §4.1 "Discovery / *Programs*", §5 "Build-on-demand
//! race").
//!
//! Corresponds to `butler/code_execution_manager.py::CodeExecutionManager`:
//! it walks a directory of projects, each carrying a `manifest.json`, and
//! rebuilds the project's executable iff it is missing or older than any of
//! its declared source files.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::process::Command;

use crate::error::CoreError;
use crate::tool::{CatalogueEntry, Invocable, InvokeArgs, Manifest, ToolKind, ToolResult};

/// A `program` tool: a manifest plus the directory it lives in.
#[derive(Debug)]
pub struct ProgramTool {
    manifest: Manifest,
    project_dir: PathBuf,
    timeout: Duration,
}

impl ProgramTool {
    pub fn new(manifest: Manifest, project_dir: PathBuf, timeout: Duration) -> Self {
        Self {
            manifest,
            project_dir,
            timeout,
        }
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    fn executable_path(&self) -> PathBuf {
        self.project_dir.join(&self.manifest.executable)
    }
}

#[async_trait]
impl Invocable for ProgramTool {
    fn name(&self) -> &str {
        &self.manifest.name
    }

    fn kind(&self) -> ToolKind {
        ToolKind::Program
    }

    fn description(&self) -> &str {
        self.manifest.description.as_deref().unwrap_or("")
    }

    fn signature(&self) -> Option<Value> {
        None
    }

    async fn invoke(&self, args: InvokeArgs) -> Result<ToolResult, CoreError> {
        let argv = match args {
            InvokeArgs::Program(argv) => argv,
            InvokeArgs::Handler { command, .. } => vec![command],
            InvokeArgs::Module { positional, .. } => {
                positional.iter().map(|v| v.to_string()).collect()
            }
        };

        let mut command = if let Some(rendered) = self.manifest.render_run_command(&argv) {
            let mut parts = rendered.split_whitespace();
            let program = parts
                .next()
                .ok_or_else(|| CoreError::InvalidManifest {
                    path: self.manifest.name.clone(),
                    reason: "run template rendered to an empty command".to_string(),
                })?;
            let mut cmd = Command::new(program);
            cmd.args(parts);
            cmd
        } else {
            let mut cmd = Command::new(self.executable_path());
            cmd.args(&argv);
            cmd
        };
        command.current_dir(&self.project_dir);

        let output = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| CoreError::Timeout(self.timeout))?
            .map_err(|e| CoreError::ExternalProcessFailed(e.to_string()))?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        if output.status.success() {
            Ok(ToolResult {
                output: stdout,
                error: stderr,
                artifact: None,
                diagnostic: output.status.code().map(|c| format!("exit code {c}")),
            })
        } else {
            Ok(ToolResult {
                output: stdout,
                error: if stderr.is_empty() {
                    format!("process exited with status {}", output.status)
                } else {
                    stderr
                },
                artifact: None,
                diagnostic: output.status.code().map(|c| format!("exit code {c}")),
            })
        }
    }

    fn catalogue_entry(&self) -> CatalogueEntry {
        CatalogueEntry {
            name: self.manifest.name.clone(),
            kind: ToolKind::Program,
            description: self.description().to_string(),
            signature: None,
        }
    }
}

/// Scans `programs_dir` for subdirectories containing a `manifest.json`,
/// rebuilding each project's executable iff missing or stale, and guards
/// against building the same program twice under concurrent scans (spec §5
/// "Build-on-demand race").
pub struct ProgramDiscovery {
    building: Mutex<HashSet<String>>,
}

impl ProgramDiscovery {
    pub fn new() -> Self {
        Self {
            building: Mutex::new(HashSet::new()),
        }
    }

    /// Scan `programs_dir`, building (or rebuilding) any project whose
    /// executable is stale. Returns one entry per discovered project: either
    /// a ready `ProgramTool` or the error that prevented it from becoming
    /// one. A single bad project never aborts the whole scan.
    pub fn scan(
        &self,
        programs_dir: &Path,
        timeout: Duration,
    ) -> Vec<(String, Result<ProgramTool, CoreError>)> {
        let mut results = Vec::new();
        let Ok(entries) = std::fs::read_dir(programs_dir) else {
            return results;
        };
        let mut dirs: Vec<_> = entries.filter_map(|e| e.ok()).collect();
        dirs.sort_by_key(|e| e.file_name());

        for entry in dirs {
            let project_dir = entry.path();
            if !project_dir.is_dir() {
                continue;
            }
            let manifest_path = project_dir.join("manifest.json");
            if !manifest_path.is_file() {
                continue;
            }
            let label = project_dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let built = self.build_one(&project_dir, &manifest_path, timeout);
            results.push((label, built));
        }
        results
    }

    fn build_one(
        &self,
        project_dir: &Path,
        manifest_path: &Path,
        timeout: Duration,
    ) -> Result<ProgramTool, CoreError> {
        let manifest = Manifest::from_file(manifest_path)?;
        manifest.validate()?;

        {
            let mut guard = self.building.lock();
            if guard.contains(&manifest.name) {
                return Err(CoreError::BuildFailed {
                    name: manifest.name.clone(),
                    reason: "build already in progress for this program".to_string(),
                });
            }
            guard.insert(manifest.name.clone());
        }
        let result = self.rebuild_if_stale(project_dir, &manifest);
        self.building.lock().remove(&manifest.name);
        result?;

        Ok(ProgramTool::new(manifest, project_dir.to_path_buf(), timeout))
    }

    fn rebuild_if_stale(&self, project_dir: &Path, manifest: &Manifest) -> Result<(), CoreError> {
        let executable_path = project_dir.join(&manifest.executable);
        if !is_stale(project_dir, &executable_path, &manifest.source)? {
            return Ok(());
        }

        let rendered = manifest.render_build_command();
        let mut parts = rendered.split_whitespace();
        let program = parts.next().ok_or_else(|| CoreError::BuildFailed {
            name: manifest.name.clone(),
            reason: "build command is empty".to_string(),
        })?;

        let status = std::process::Command::new(program)
            .args(parts)
            .current_dir(project_dir)
            .status()
            .map_err(|e| CoreError::BuildFailed {
                name: manifest.name.clone(),
                reason: e.to_string(),
            })?;

        if !status.success() {
            return Err(CoreError::BuildFailed {
                name: manifest.name.clone(),
                reason: format!("build command exited with {status}"),
            });
        }
        if !executable_path.is_file() {
            return Err(CoreError::BuildFailed {
                name: manifest.name.clone(),
                reason: "build succeeded but no executable was produced".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for ProgramDiscovery {
    fn default() -> Self {
        Self::new()
    }
}

/// True iff `executable_path` is missing or older than any file in `source`.
fn is_stale(
    project_dir: &Path,
    executable_path: &Path,
    source: &[String],
) -> Result<bool, CoreError> {
    let Ok(exe_meta) = std::fs::metadata(executable_path) else {
        return Ok(true);
    };
    let exe_modified = exe_meta.modified()?;

    for rel in source {
        let src_path = project_dir.join(rel);
        let src_modified = std::fs::metadata(&src_path)?.modified()?;
        if src_modified > exe_modified {
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_manifest(dir: &Path, json: &str) {
        std::fs::write(dir.join("manifest.json"), json).unwrap();
    }

    #[test]
    fn is_stale_when_executable_missing() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("main.c"), "int main(){return 0;}").unwrap();
        let stale = is_stale(dir.path(), &dir.path().join("missing"), &["main.c".to_string()])
            .unwrap();
        assert!(stale);
    }

    #[test]
    fn is_stale_when_source_newer_than_executable() {
        let dir = tempfile::tempdir().unwrap();
        let exe = dir.path().join("app");
        std::fs::write(&exe, "old binary").unwrap();
        // Ensure a detectable mtime ordering.
        std::thread::sleep(std::time::Duration::from_millis(10));
        let src = dir.path().join("main.c");
        std::fs::write(&src, "newer source").unwrap();

        let stale = is_stale(dir.path(), &exe, &["main.c".to_string()]).unwrap();
        assert!(stale);
    }

    #[test]
    fn is_stale_false_when_executable_newer() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("main.c");
        std::fs::write(&src, "source").unwrap();
        std::thread::sleep(std::time::Duration::from_millis(10));
        let exe = dir.path().join("app");
        std::fs::write(&exe, "binary").unwrap();

        let stale = is_stale(dir.path(), &exe, &["main.c".to_string()]).unwrap();
        assert!(!stale);
    }

    #[test]
    fn scan_skips_directories_without_manifest() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir(root.path().join("not_a_project")).unwrap();
        let discovery = ProgramDiscovery::new();
        let results = discovery.scan(root.path(), Duration::from_secs(5));
        assert!(results.is_empty());
    }

    #[test]
    fn scan_reports_build_failure_without_aborting() {
        let root = tempfile::tempdir().unwrap();
        let project = root.path().join("broken");
        std::fs::create_dir(&project).unwrap();
        write_manifest(
            &project,
            r#"{"name":"broken","language":"sh","build":"false","source":["x.sh"],"executable":"out"}"#,
        );
        std::fs::write(project.join("x.sh"), "echo hi").unwrap();

        let discovery = ProgramDiscovery::new();
        let results = discovery.scan(root.path(), Duration::from_secs(5));
        assert_eq!(results.len(), 1);
        assert!(results[0].1.is_err());
    }

    #[test]
    fn scan_builds_and_registers_program() {
        let root = tempfile::tempdir().unwrap();
        let project = root.path().join("greeter");
        std::fs::create_dir(&project).unwrap();
        write_manifest(
            &project,
            r#"{"name":"greeter","language":"sh","build":"cp {source} {output}","source":["greet.sh"],"executable":"greet","run":"sh {output} {args}"}"#,
        );
        let mut f = std::fs::File::create(project.join("greet.sh")).unwrap();
        writeln!(f, "#!/bin/sh\necho hello $1").unwrap();

        let discovery = ProgramDiscovery::new();
        let results = discovery.scan(root.path(), Duration::from_secs(5));
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0, "greeter");
        assert!(results[0].1.is_ok());
    }
}
