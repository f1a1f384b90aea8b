//! External OS-level sandbox
//!
//! Wraps the language runtime in an isolation binary (`srt`) that enforces
//! the network and filesystem parts of the policy. The binary receives a
//! settings file and the command to run after `--`:
//!
//! `srt --settings settings.json -- python3 -I -B launcher.py policy.json candidate.py`

use async_trait::async_trait;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::launcher::{self, LauncherPolicy};
use super::process::{self, ProcessSpec, RlimitPlan};
use super::scratch::{RunDir, ScratchSpace};
use super::{result_from_outcome, ExecutionRequest, ExecutionResult, ExecutionState, SandboxRunner};
use crate::config::{ExecutionConfig, IsolationMode, Language};
use crate::types::{RunId, SandboxError};

pub const SANDBOX_BINARY_NAME: &str = "srt";
pub const SETTINGS_FILE: &str = "sandbox-settings.json";

/// Well-known install locations checked before PATH
fn well_known_locations() -> Vec<PathBuf> {
    let mut paths = vec![
        PathBuf::from("/usr/local/bin/srt"),
        PathBuf::from("/usr/bin/srt"),
        PathBuf::from("/opt/homebrew/bin/srt"),
    ];
    if let Some(home) = dirs::home_dir() {
        paths.push(home.join(".local/bin/srt"));
        paths.push(home.join(".npm-global/bin/srt"));
    }
    paths
}

/// Locate the isolation binary. An explicit path is used as-is and never
/// falls through to discovery.
pub fn discover_binary(explicit: Option<&Path>) -> Result<PathBuf, SandboxError> {
    if let Some(path) = explicit {
        return if path.is_file() {
            Ok(path.to_path_buf())
        } else {
            Err(SandboxError::BinaryNotFound {
                searched: vec![path.display().to_string()],
            })
        };
    }

    let locations = well_known_locations();
    if let Some(found) = locations.iter().find(|p| p.is_file()) {
        return Ok(found.clone());
    }
    if let Some(found) = process::find_executable(Path::new(SANDBOX_BINARY_NAME)) {
        return Ok(found);
    }

    let mut searched: Vec<String> = locations.iter().map(|p| p.display().to_string()).collect();
    searched.push("$PATH".to_string());
    Err(SandboxError::BinaryNotFound { searched })
}

/// Resolve the configured language runtime to an executable
pub(crate) fn resolve_runtime(config: &ExecutionConfig) -> Result<PathBuf, SandboxError> {
    let runtime = config.runtime();
    process::find_executable(&runtime).ok_or_else(|| SandboxError::RuntimeNotFound {
        language: config.language,
        runtime: runtime.display().to_string(),
    })
}

pub struct OsSandboxRunner {
    config: Arc<ExecutionConfig>,
    binary: PathBuf,
    runtime: PathBuf,
    scratch: ScratchSpace,
}

impl OsSandboxRunner {
    pub fn new(config: Arc<ExecutionConfig>) -> Result<Self, SandboxError> {
        let binary = discover_binary(config.sandbox_binary.as_deref())?;
        let runtime = resolve_runtime(&config)?;
        let scratch = ScratchSpace::new()?;

        tracing::info!(
            "OS sandbox runner using {} with runtime {}",
            binary.display(),
            runtime.display()
        );

        Ok(Self {
            config,
            binary,
            runtime,
            scratch,
        })
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    /// Settings document describing network, filesystem and resource policy
    pub fn settings_payload(&self, run_dir: &Path) -> serde_json::Value {
        let policy = self.config.security_policy_for(IsolationMode::OsSandbox);
        let limits = self.config.resource_limits();

        let allowed_domains: Vec<String> = if policy.allow_network {
            vec!["*".to_string()]
        } else {
            vec![]
        };
        let mut allow_write = vec![run_dir.display().to_string()];
        allow_write.extend(policy.allowed_paths.iter().map(|p| p.display().to_string()));
        let deny: Vec<String> = policy
            .blocked_paths
            .iter()
            .map(|p| p.display().to_string())
            .collect();

        json!({
            "network": {
                "allowedDomains": allowed_domains,
                "deniedDomains": policy.blocked_domains,
                "allowOutboundHttp": policy.allow_outbound_http,
            },
            "filesystem": {
                "denyRead": deny,
                "allowWrite": allow_write,
                "denyWrite": deny,
            },
            "resources": {
                "timeoutSeconds": limits.wall_timeout.as_secs(),
                "memoryBytes": limits.memory_bytes,
                "cpuSeconds": limits.cpu_time_seconds,
                "fileSizeBytes": limits.file_size_bytes,
                "maxFiles": limits.max_total_files,
                "diskSpaceBytes": limits.disk_space_bytes,
            },
        })
    }

    /// Command run inside the sandbox, after `--`
    fn inner_command(
        &self,
        run_dir: &RunDir,
        request: &ExecutionRequest,
    ) -> Result<Vec<String>, SandboxError> {
        let mut command = vec![self.runtime.display().to_string()];
        if request.language == Language::Python {
            // the interpreter cannot be limited from outside without limiting the sandbox
            // binary too, so the launcher applies the limits itself
            let limits = self.config.resource_limits();
            let policy = LauncherPolicy::new(
                &self.config.security_policy_for(IsolationMode::OsSandbox),
                Some(&limits),
            );
            let files = launcher::prepare(run_dir, request, &policy)?;
            command.extend(files.args(request.language.runtime_args()));
        } else {
            if request.harness.is_some() {
                tracing::debug!("Harness ignored for {} units", request.language);
            }
            let code_file = run_dir.write_file(
                &format!("candidate.{}", request.language.file_extension()),
                &request.code,
            )?;
            command.extend(request.language.runtime_args().iter().map(|a| a.to_string()));
            command.push(code_file.display().to_string());
        }
        Ok(command)
    }
}

#[async_trait]
impl SandboxRunner for OsSandboxRunner {
    fn mode(&self) -> IsolationMode {
        IsolationMode::OsSandbox
    }

    async fn execute(&self, request: &ExecutionRequest) -> Result<ExecutionResult, SandboxError> {
        let run_id = RunId::new();
        let mut state = ExecutionState::Idle;
        let limits = self.config.resource_limits();
        let run_dir = self.scratch.create_run_dir(&run_id)?;

        let settings = serde_json::to_string_pretty(&self.settings_payload(run_dir.path()))
            .map_err(|e| SandboxError::Settings(e.to_string()))?;
        let settings_file = run_dir.write_file(SETTINGS_FILE, &settings)?;

        let mut args = vec![
            "--settings".to_string(),
            settings_file.display().to_string(),
            "--".to_string(),
        ];
        args.extend(self.inner_command(&run_dir, request)?);
        let baseline = run_dir.usage();

        let mut env = process::base_environment(run_dir.path(), true);
        env.extend(self.config.environment_vars.clone());

        let spec = ProcessSpec {
            program: self.binary.clone(),
            args,
            working_dir: self
                .config
                .working_directory
                .clone()
                .unwrap_or_else(|| run_dir.path().to_path_buf()),
            env,
            stdin: request.stdin.clone(),
            rlimits: RlimitPlan {
                file_size_bytes: Some(limits.file_size_bytes),
                ..Default::default()
            },
            wall_timeout: limits.wall_timeout,
            max_output_bytes: limits.max_output_bytes,
        };
        state.advance(ExecutionState::Prepared, &run_id);

        tracing::debug!("run {}: {} {:?}", run_id, self.binary.display(), spec.args);
        state.advance(ExecutionState::Running, &run_id);
        let outcome = process::run_supervised(&spec).await?;

        let usage = run_dir.usage().since(baseline);
        let scratch_violations = super::violations::check_scratch_usage(usage, &limits);

        Ok(result_from_outcome(
            run_id,
            IsolationMode::OsSandbox,
            state,
            outcome,
            &limits,
            scratch_violations,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_missing_binary() {
        let result = discover_binary(Some(Path::new("/nonexistent/srt")));
        match result {
            Err(SandboxError::BinaryNotFound { searched }) => {
                assert_eq!(searched, vec!["/nonexistent/srt".to_string()]);
            }
            other => panic!("expected BinaryNotFound, got {:?}", other),
        }
    }

    #[test]
    fn test_explicit_binary_used_as_is() {
        let dir = tempfile::tempdir().unwrap();
        let fake = dir.path().join("srt");
        std::fs::write(&fake, "#!/bin/sh\n").unwrap();
        assert_eq!(discover_binary(Some(&fake)).unwrap(), fake);
    }

    #[test]
    fn test_runner_requires_binary() {
        let config = ExecutionConfig {
            sandbox_binary: Some(PathBuf::from("/nonexistent/srt")),
            ..Default::default()
        };
        let result = OsSandboxRunner::new(Arc::new(config));
        assert!(matches!(result, Err(SandboxError::BinaryNotFound { .. })));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_settings_and_command_line() {
        let dir = tempfile::tempdir().unwrap();
        // stand-in isolation binary that echoes its arguments and the settings file
        let fake = dir.path().join("srt");
        std::fs::write(
            &fake,
            "#!/bin/sh\necho \"$@\"\ncat \"$2\"\n",
        )
        .unwrap();
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&fake, std::fs::Permissions::from_mode(0o755)).unwrap();
        }

        let config = ExecutionConfig {
            language: Language::Shell,
            sandbox_binary: Some(fake),
            blocked_domains: vec!["evil.example".to_string()],
            ..Default::default()
        };
        let runner = OsSandboxRunner::new(Arc::new(config)).unwrap();
        let result = runner
            .execute(&ExecutionRequest::new("echo hi", Language::Shell))
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.mode, IsolationMode::OsSandbox);
        let first_line = result.stdout.lines().next().unwrap();
        assert!(first_line.starts_with("--settings "));
        assert!(first_line.contains(" -- "));
        assert!(first_line.ends_with("candidate.sh"));
        assert!(result.stdout.contains("\"deniedDomains\""));
        assert!(result.stdout.contains("evil.example"));
    }
}
