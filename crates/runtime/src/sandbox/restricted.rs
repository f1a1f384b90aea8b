//! Restricted interpreter
//!
//! Runs Python units in a `python3` child hosting the launcher with a
//! stripped builtin namespace and an import guard. Kernel limits are applied
//! to the interpreter before exec. This mode is best-effort containment: the
//! guard narrows what a unit can reach but is not a security boundary on the
//! level of an OS sandbox.

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;

use super::launcher::{self, LauncherPolicy};
use super::os_sandbox::resolve_runtime;
use super::process::{self, ProcessSpec, RlimitPlan};
use super::scratch::ScratchSpace;
use super::{result_from_outcome, ExecutionRequest, ExecutionResult, ExecutionState, SandboxRunner};
use crate::config::{ExecutionConfig, IsolationMode, Language};
use crate::types::{RunId, SandboxError};

pub struct RestrictedRunner {
    config: Arc<ExecutionConfig>,
    runtime: PathBuf,
    scratch: ScratchSpace,
}

impl RestrictedRunner {
    pub fn new(config: Arc<ExecutionConfig>) -> Result<Self, SandboxError> {
        if config.language != Language::Python {
            return Err(SandboxError::UnsupportedLanguage {
                language: config.language,
                mode: IsolationMode::RestrictedInterpreter,
            });
        }
        let runtime = resolve_runtime(&config)?;
        let scratch = ScratchSpace::new()?;

        tracing::warn!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        tracing::warn!("Restricted interpreter: BEST-EFFORT ISOLATION");
        tracing::warn!("Runtime: {}", runtime.display());
        tracing::warn!("Builtins and imports are filtered, no OS-level sandbox");
        tracing::warn!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

        Ok(Self {
            config,
            runtime,
            scratch,
        })
    }
}

#[async_trait]
impl SandboxRunner for RestrictedRunner {
    fn mode(&self) -> IsolationMode {
        IsolationMode::RestrictedInterpreter
    }

    async fn execute(&self, request: &ExecutionRequest) -> Result<ExecutionResult, SandboxError> {
        if request.language != Language::Python {
            return Err(SandboxError::UnsupportedLanguage {
                language: request.language,
                mode: IsolationMode::RestrictedInterpreter,
            });
        }

        let run_id = RunId::new();
        let mut state = ExecutionState::Idle;
        let limits = self.config.resource_limits();
        let policy = LauncherPolicy::new(
            &self
                .config
                .security_policy_for(IsolationMode::RestrictedInterpreter),
            None,
        );

        let run_dir = self.scratch.create_run_dir(&run_id)?;
        let files = launcher::prepare(&run_dir, request, &policy)?;
        let baseline = run_dir.usage();

        let mut env = process::base_environment(run_dir.path(), false);
        env.extend(self.config.environment_vars.clone());

        let spec = ProcessSpec {
            program: self.runtime.clone(),
            args: files.args(request.language.runtime_args()),
            working_dir: run_dir.path().to_path_buf(),
            env,
            stdin: request.stdin.clone(),
            rlimits: RlimitPlan {
                address_space_bytes: Some(limits.memory_bytes),
                cpu_seconds: Some(limits.cpu_time_seconds),
                file_size_bytes: Some(limits.file_size_bytes),
                open_files: Some(limits.max_open_files),
            },
            wall_timeout: limits.wall_timeout,
            max_output_bytes: limits.max_output_bytes,
        };
        state.advance(ExecutionState::Prepared, &run_id);

        state.advance(ExecutionState::Running, &run_id);
        let outcome = process::run_supervised(&spec).await?;

        let usage = run_dir.usage().since(baseline);
        let scratch_violations = super::violations::check_scratch_usage(usage, &limits);

        Ok(result_from_outcome(
            run_id,
            IsolationMode::RestrictedInterpreter,
            state,
            outcome,
            &limits,
            scratch_violations,
        ))
    }
}
