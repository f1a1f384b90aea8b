//! Isolation executor
//!
//! Runs one untrusted code unit per call under the engine's `ExecutionConfig`
//! and returns an `ExecutionResult`. Three runners implement `SandboxRunner`:
//! an external OS sandbox, a restricted interpreter and a mock. The engine
//! resolves which one to use once, at construction, according to its
//! `FallbackPolicy`.

pub mod launcher;
pub mod mock;
pub mod os_sandbox;
pub mod process;
pub mod restricted;
pub mod scratch;
pub mod violations;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::{ExecutionConfig, IsolationMode, Language, ResourceLimits};
use crate::types::{RunId, RuntimeError, SandboxError};

pub use mock::{MockOutcome, MockRunner};
pub use os_sandbox::OsSandboxRunner;
pub use restricted::RestrictedRunner;

/// Exit code reported when a run hits its wall-clock ceiling
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// One code unit to execute
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRequest {
    pub code: String,
    pub language: Language,
    /// Payload written to the unit's standard input
    pub stdin: Option<String>,
    /// Trusted driver that loads the unit through `run_unit`
    pub harness: Option<String>,
}

impl ExecutionRequest {
    pub fn new(code: impl Into<String>, language: Language) -> Self {
        Self {
            code: code.into(),
            language,
            stdin: None,
            harness: None,
        }
    }

    pub fn with_stdin(mut self, stdin: impl Into<String>) -> Self {
        self.stdin = Some(stdin.into());
        self
    }

    pub fn with_harness(mut self, harness: impl Into<String>) -> Self {
        self.harness = Some(harness.into());
        self
    }
}

/// Lifecycle of a single execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionState {
    Idle,
    Prepared,
    Running,
    Completed,
    TimedOut,
    Failed,
}

impl ExecutionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionState::Completed | ExecutionState::TimedOut | ExecutionState::Failed
        )
    }

    /// Whether `next` is a legal successor of this state
    pub fn can_transition_to(&self, next: ExecutionState) -> bool {
        use ExecutionState::*;
        matches!(
            (self, next),
            (Idle, Prepared)
                | (Idle, Failed)
                | (Prepared, Running)
                | (Prepared, Failed)
                | (Running, Completed)
                | (Running, TimedOut)
                | (Running, Failed)
        )
    }

    /// Move to `next`, logging the transition
    pub fn advance(&mut self, next: ExecutionState, run_id: &RunId) {
        debug_assert!(
            self.can_transition_to(next),
            "illegal execution transition {:?} -> {:?}",
            self,
            next
        );
        tracing::trace!("run {}: {:?} -> {:?}", run_id, self, next);
        *self = next;
    }
}

/// Result of one isolated execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub run_id: RunId,
    /// Exit code zero and no timeout
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    /// Process exit code; `TIMEOUT_EXIT_CODE` after a timeout, `128 + n` after signal `n`
    pub exit_code: i32,
    pub execution_time_ms: u64,
    pub peak_memory_mb: Option<f64>,
    /// Advisory findings from the stderr and scratch scans
    pub violations: Vec<String>,
    pub state: ExecutionState,
    pub mode: IsolationMode,
    pub stdout_truncated: bool,
    pub stderr_truncated: bool,
    /// Signal that terminated the process, if any
    pub signal: Option<i32>,
}

impl ExecutionResult {
    pub fn timed_out(&self) -> bool {
        self.state == ExecutionState::TimedOut
    }

    /// Whether the process was killed by a signal other than our timeout kill
    pub fn killed_by_signal(&self) -> bool {
        self.signal.is_some() && !self.timed_out()
    }

    /// Whether the kernel stopped the process for exhausting its CPU budget
    pub fn cpu_limit_exceeded(&self) -> bool {
        matches!(self.signal, Some(signal) if is_cpu_limit_signal(signal))
    }
}

/// Build a result from a finished supervised child
pub(crate) fn result_from_outcome(
    run_id: RunId,
    mode: IsolationMode,
    mut state: ExecutionState,
    outcome: process::ProcessOutcome,
    limits: &ResourceLimits,
    mut violations: Vec<String>,
) -> ExecutionResult {
    let mut stderr = outcome.stderr;
    let exit_code = if outcome.timed_out {
        state.advance(ExecutionState::TimedOut, &run_id);
        if !stderr.is_empty() && !stderr.ends_with('\n') {
            stderr.push('\n');
        }
        stderr.push_str(&format!(
            "[killed: wall-clock timeout after {}s]",
            limits.wall_timeout.as_secs()
        ));
        TIMEOUT_EXIT_CODE
    } else if let Some(signal) = outcome.signal {
        state.advance(ExecutionState::Failed, &run_id);
        if !stderr.is_empty() && !stderr.ends_with('\n') {
            stderr.push('\n');
        }
        if is_cpu_limit_signal(signal) {
            stderr.push_str("[killed: CPU time limit exceeded]");
        } else {
            stderr.push_str(&format!("[killed by signal {}]", signal));
        }
        128 + signal
    } else {
        state.advance(ExecutionState::Completed, &run_id);
        outcome.exit_code.unwrap_or(-1)
    };

    let mut found = violations::scan_stderr(&stderr);
    found.append(&mut violations);

    ExecutionResult {
        run_id,
        success: state == ExecutionState::Completed && exit_code == 0,
        stdout: outcome.stdout,
        stderr,
        exit_code,
        execution_time_ms: outcome.duration.as_millis() as u64,
        peak_memory_mb: outcome
            .peak_memory_bytes
            .map(|bytes| bytes as f64 / (1024.0 * 1024.0)),
        violations: found,
        state,
        mode,
        stdout_truncated: outcome.stdout_truncated,
        stderr_truncated: outcome.stderr_truncated,
        signal: outcome.signal,
    }
}

#[cfg(unix)]
fn is_cpu_limit_signal(signal: i32) -> bool {
    signal == libc::SIGXCPU
}

#[cfg(not(unix))]
fn is_cpu_limit_signal(_signal: i32) -> bool {
    false
}

/// Trait for runners that execute a code unit under isolation
#[async_trait]
pub trait SandboxRunner: Send + Sync {
    /// Isolation mode this runner provides
    fn mode(&self) -> IsolationMode;

    /// Execute one code unit.
    ///
    /// Failures of the unit itself (non-zero exit, timeout, crash) are
    /// reported in the returned `ExecutionResult`. `Err` means the isolation
    /// machinery could not run the unit at all.
    async fn execute(&self, request: &ExecutionRequest) -> Result<ExecutionResult, SandboxError>;
}

#[async_trait]
impl<T: SandboxRunner + ?Sized> SandboxRunner for Arc<T> {
    fn mode(&self) -> IsolationMode {
        (**self).mode()
    }

    async fn execute(&self, request: &ExecutionRequest) -> Result<ExecutionResult, SandboxError> {
        (**self).execute(request).await
    }
}

/// What to do when the requested isolation mode is unavailable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FallbackPolicy {
    /// Fail construction
    Never,
    /// Downgrade to the restricted interpreter
    #[default]
    ToRestricted,
    /// Downgrade to the restricted interpreter, then to the mock
    ToRestrictedThenMock,
}

/// Isolation engine bound to one configuration
pub struct IsolationEngine {
    config: Arc<ExecutionConfig>,
    runner: Box<dyn SandboxRunner>,
}

impl std::fmt::Debug for IsolationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IsolationEngine")
            .field("requested_mode", &self.config.mode)
            .field("effective_mode", &self.runner.mode())
            .finish()
    }
}

impl IsolationEngine {
    /// Validate the configuration and resolve a runner with the default fallback
    pub fn new(config: ExecutionConfig) -> Result<Self, RuntimeError> {
        Self::with_fallback(config, FallbackPolicy::default())
    }

    pub fn with_fallback(
        config: ExecutionConfig,
        fallback: FallbackPolicy,
    ) -> Result<Self, RuntimeError> {
        config.ensure_valid()?;
        let config = Arc::new(config);
        let runner = resolve_runner(config.clone(), fallback)?;

        if runner.mode() != config.mode {
            tracing::warn!(
                "Isolation downgraded: requested {}, running {}",
                config.mode,
                runner.mode()
            );
        } else {
            tracing::info!("Isolation engine ready in {} mode", runner.mode());
        }

        Ok(Self { config, runner })
    }

    /// Engine around an already-built runner
    pub fn from_runner(config: ExecutionConfig, runner: Box<dyn SandboxRunner>) -> Self {
        Self {
            config: Arc::new(config),
            runner,
        }
    }

    pub fn config(&self) -> &ExecutionConfig {
        &self.config
    }

    pub fn requested_mode(&self) -> IsolationMode {
        self.config.mode
    }

    /// Mode actually in use after any downgrade
    pub fn mode(&self) -> IsolationMode {
        self.runner.mode()
    }

    pub fn is_downgraded(&self) -> bool {
        self.runner.mode() != self.config.mode
    }

    /// Execute a bare code unit with no harness
    pub async fn execute(
        &self,
        code: &str,
        language: Language,
    ) -> Result<ExecutionResult, SandboxError> {
        self.run(&ExecutionRequest::new(code, language)).await
    }

    pub async fn run(&self, request: &ExecutionRequest) -> Result<ExecutionResult, SandboxError> {
        tracing::debug!(
            "Executing {} unit ({} bytes) in {} mode",
            request.language,
            request.code.len(),
            self.runner.mode()
        );
        self.runner.execute(request).await
    }
}

fn resolve_runner(
    config: Arc<ExecutionConfig>,
    fallback: FallbackPolicy,
) -> Result<Box<dyn SandboxRunner>, SandboxError> {
    match config.mode {
        IsolationMode::Mock => Ok(Box::new(MockRunner::new(config))),
        IsolationMode::OsSandbox => match OsSandboxRunner::new(config.clone()) {
            Ok(runner) => Ok(Box::new(runner)),
            Err(e @ SandboxError::BinaryNotFound { .. }) if fallback != FallbackPolicy::Never => {
                tracing::warn!("OS sandbox unavailable ({}), trying restricted interpreter", e);
                downgrade_to_restricted(config, fallback, e)
            }
            Err(e) => Err(e),
        },
        IsolationMode::RestrictedInterpreter => match RestrictedRunner::new(config.clone()) {
            Ok(runner) => Ok(Box::new(runner)),
            Err(e) if fallback == FallbackPolicy::ToRestrictedThenMock => {
                tracing::warn!("Restricted interpreter unavailable ({}), using mock", e);
                Ok(Box::new(MockRunner::new(config)))
            }
            Err(e) => Err(e),
        },
    }
}

fn downgrade_to_restricted(
    config: Arc<ExecutionConfig>,
    fallback: FallbackPolicy,
    original: SandboxError,
) -> Result<Box<dyn SandboxRunner>, SandboxError> {
    match RestrictedRunner::new(config.clone()) {
        Ok(runner) => Ok(Box::new(runner)),
        Err(e) if fallback == FallbackPolicy::ToRestrictedThenMock => {
            tracing::warn!("Restricted interpreter unavailable ({}), using mock", e);
            Ok(Box::new(MockRunner::new(config)))
        }
        Err(e) => Err(SandboxError::NoUsableMode(format!(
            "{}; fallback failed: {}",
            original, e
        ))),
    }
}
