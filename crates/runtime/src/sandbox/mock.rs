//! Mock runner
//!
//! Executes nothing. Returns scripted outcomes in order, then a canned
//! success whose stdout is a null result line. The wall-clock ceiling still
//! applies to scripted delays so timeout handling can be exercised without a
//! language runtime.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::{ExecutionRequest, ExecutionResult, ExecutionState, SandboxRunner, TIMEOUT_EXIT_CODE};
use crate::config::{ExecutionConfig, IsolationMode};
use crate::types::{RunId, SandboxError};

/// Stdout of the canned result
pub const CANNED_STDOUT: &str =
    r#"{"output": null, "output_type": "NoneType", "error": null, "params_used": {}}"#;

/// One scripted mock execution
#[derive(Debug, Clone, PartialEq)]
pub struct MockOutcome {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    /// Simulated run time; longer than the wall ceiling means a timeout
    pub delay: Option<Duration>,
}

impl MockOutcome {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            exit_code: 0,
            delay: None,
        }
    }

    pub fn failure(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: stderr.into(),
            exit_code,
            delay: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

impl Default for MockOutcome {
    fn default() -> Self {
        Self::success(CANNED_STDOUT)
    }
}

#[derive(Debug)]
pub struct MockRunner {
    config: Arc<ExecutionConfig>,
    scripted: Mutex<VecDeque<MockOutcome>>,
    requests: Mutex<Vec<ExecutionRequest>>,
}

impl MockRunner {
    pub fn new(config: Arc<ExecutionConfig>) -> Self {
        tracing::warn!("Mock isolation: code units are NOT executed");
        Self {
            config,
            scripted: Mutex::new(VecDeque::new()),
            requests: Mutex::new(vec![]),
        }
    }

    /// Mock that replays `outcomes` in order before falling back to the canned result
    pub fn with_outcomes(config: Arc<ExecutionConfig>, outcomes: Vec<MockOutcome>) -> Self {
        let runner = Self::new(config);
        runner.scripted.lock().extend(outcomes);
        runner
    }

    pub fn push_outcome(&self, outcome: MockOutcome) {
        self.scripted.lock().push_back(outcome);
    }

    /// Requests received so far
    pub fn requests(&self) -> Vec<ExecutionRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl SandboxRunner for MockRunner {
    fn mode(&self) -> IsolationMode {
        IsolationMode::Mock
    }

    async fn execute(&self, request: &ExecutionRequest) -> Result<ExecutionResult, SandboxError> {
        let run_id = RunId::new();
        let mut state = ExecutionState::Idle;
        self.requests.lock().push(request.clone());
        let outcome = self.scripted.lock().pop_front().unwrap_or_default();
        state.advance(ExecutionState::Prepared, &run_id);

        let wall = self.config.resource_limits().wall_timeout;
        let start = Instant::now();
        state.advance(ExecutionState::Running, &run_id);

        let timed_out = match outcome.delay {
            Some(delay) if delay > wall => {
                tokio::time::sleep(wall).await;
                true
            }
            Some(delay) => {
                tokio::time::sleep(delay).await;
                false
            }
            None => false,
        };

        let (exit_code, stderr) = if timed_out {
            state.advance(ExecutionState::TimedOut, &run_id);
            (
                TIMEOUT_EXIT_CODE,
                format!("[killed: wall-clock timeout after {}s]", wall.as_secs()),
            )
        } else {
            state.advance(ExecutionState::Completed, &run_id);
            (outcome.exit_code, outcome.stderr)
        };

        Ok(ExecutionResult {
            run_id,
            success: !timed_out && exit_code == 0,
            stdout: if timed_out {
                String::new()
            } else {
                outcome.stdout
            },
            violations: super::violations::scan_stderr(&stderr),
            stderr,
            exit_code,
            execution_time_ms: start.elapsed().as_millis() as u64,
            peak_memory_mb: None,
            state,
            mode: IsolationMode::Mock,
            stdout_truncated: false,
            stderr_truncated: false,
            signal: None,
        })
    }
}
