//! Candidate wrapper
//!
//! Runs one candidate against one input variant through the isolation engine
//! and turns whatever happened into exactly one `TestResult`. Nothing that
//! goes wrong during a run escapes as an error.

pub mod classify;
pub mod patterns;
pub mod protocol;
pub mod types;

use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{timeout, Duration};

use crate::config::Language;
use crate::sandbox::{ExecutionRequest, ExecutionResult, IsolationEngine};
use crate::synthesis::signature::entry_point_name;
use crate::synthesis::type_tag::{is_optional_annotation, normalize_type_name};
use crate::types::{CandidateId, InputMap};

pub use patterns::FailurePatternTable;
pub use types::{ErrorCategory, FailurePattern, ResourceUsage, TestOutcome, TestResult};

use classify::{classify_text, classify_wire_error, summarize, truncate_chars, MAX_SUMMARY_CHARS};
use protocol::{ProtocolError, WireResult, HARNESS_SOURCE};

/// Slack on top of the executor's own timeout before the wrapper gives up
const WALL_CLOCK_GRACE: Duration = Duration::from_secs(5);

/// Verdict on one run before it is folded into a `TestResult`
#[derive(Debug, Clone)]
struct Assessment {
    outcome: TestOutcome,
    output: Option<Value>,
    output_type: Option<String>,
    validation_passed: bool,
    validation_error: Option<String>,
    category: Option<ErrorCategory>,
    summary: Option<String>,
}

impl Assessment {
    fn passed(output: Value, output_type: Option<String>) -> Self {
        Self {
            outcome: TestOutcome::Success,
            output: Some(output),
            output_type,
            validation_passed: true,
            validation_error: None,
            category: None,
            summary: None,
        }
    }

    fn failed(category: ErrorCategory, summary: impl Into<String>) -> Self {
        Self {
            outcome: category.outcome(),
            output: None,
            output_type: None,
            validation_passed: false,
            validation_error: None,
            category: Some(category),
            summary: Some(truncate_chars(&summary.into(), MAX_SUMMARY_CHARS)),
        }
    }

    fn invalid_output(message: String, output: Option<Value>, output_type: Option<String>) -> Self {
        Self {
            outcome: TestOutcome::OutputValidationFailed,
            output,
            output_type,
            validation_passed: false,
            validation_error: Some(message.clone()),
            category: Some(ErrorCategory::Validation),
            summary: Some(truncate_chars(&message, MAX_SUMMARY_CHARS)),
        }
    }
}

/// Executes candidates and owns the failure-pattern table and run history
pub struct CandidateWrapper {
    engine: Arc<IsolationEngine>,
    patterns: FailurePatternTable,
    history: Vec<TestResult>,
}

impl CandidateWrapper {
    pub fn new(engine: Arc<IsolationEngine>) -> Self {
        Self {
            engine,
            patterns: FailurePatternTable::new(),
            history: vec![],
        }
    }

    pub fn engine(&self) -> &IsolationEngine {
        &self.engine
    }

    /// Every result produced so far, in execution order
    pub fn history(&self) -> &[TestResult] {
        &self.history
    }

    pub fn patterns(&self) -> &FailurePatternTable {
        &self.patterns
    }

    /// Run `code` with `input_params` bound and classify the outcome
    pub async fn execute_candidate(
        &mut self,
        candidate_id: &CandidateId,
        code: &str,
        input_params: &InputMap,
        expected_output_type: Option<&str>,
    ) -> TestResult {
        let started_at = Utc::now();
        let start = Instant::now();
        let wall = self.engine.config().resource_limits().wall_timeout;

        let entry_point = entry_point_name(code);
        let (assessment, execution) =
            match protocol::encode_envelope(input_params, entry_point.as_deref()) {
                Err(e) => (
                    Assessment::failed(
                        ErrorCategory::Unknown,
                        format!("failed to encode inputs: {}", e),
                    ),
                    None,
                ),
                Ok(envelope) => {
                    let request = ExecutionRequest::new(code, Language::Python)
                        .with_stdin(envelope)
                        .with_harness(HARNESS_SOURCE);
                    self.run_and_assess(&request, wall, expected_output_type)
                        .await
                }
            };

        let elapsed = start.elapsed();
        let result = self.finish(
            candidate_id,
            code,
            input_params,
            expected_output_type,
            started_at,
            elapsed,
            assessment,
            execution,
        );

        if result.success {
            tracing::debug!(
                "Candidate {} passed in {}ms",
                candidate_id,
                result.execution_time_ms
            );
        } else {
            tracing::info!(
                "Candidate {} failed: outcome={}, summary={}",
                candidate_id,
                result.outcome,
                result.error_summary.as_deref().unwrap_or("")
            );
        }

        self.history.push(result.clone());
        result
    }

    async fn run_and_assess(
        &self,
        request: &ExecutionRequest,
        wall: Duration,
        expected_output_type: Option<&str>,
    ) -> (Assessment, Option<ExecutionResult>) {
        let start = Instant::now();
        let execution = timeout(wall + WALL_CLOCK_GRACE, self.engine.run(request)).await;
        let elapsed = start.elapsed();

        match execution {
            Err(_) => {
                tracing::warn!(
                    "Executor did not return within {:?}, reporting timeout",
                    wall + WALL_CLOCK_GRACE
                );
                (timeout_assessment(wall), None)
            }
            Ok(Err(e)) => {
                tracing::warn!("Executor error: {}", e);
                (Assessment::failed(ErrorCategory::Unknown, e.to_string()), None)
            }
            Ok(Ok(execution)) => {
                let assessment =
                    if execution.timed_out() || execution.cpu_limit_exceeded() || elapsed > wall {
                        timeout_assessment(wall)
                    } else {
                        assess(&execution, expected_output_type)
                    };
                (assessment, Some(execution))
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn finish(
        &mut self,
        candidate_id: &CandidateId,
        code: &str,
        input_params: &InputMap,
        expected_output_type: Option<&str>,
        started_at: chrono::DateTime<Utc>,
        elapsed: Duration,
        assessment: Assessment,
        execution: Option<ExecutionResult>,
    ) -> TestResult {
        let success = assessment.outcome == TestOutcome::Success;
        if let (Some(category), Some(summary)) = (assessment.category, &assessment.summary) {
            self.patterns.record(category, summary, code);
        }

        let (run_id, stdout, stderr, resource_usage) = match execution {
            Some(execution) => (
                Some(execution.run_id),
                execution.stdout,
                execution.stderr,
                ResourceUsage {
                    peak_memory_mb: execution.peak_memory_mb,
                    exit_code: Some(execution.exit_code),
                    violations: execution.violations,
                    mode: Some(execution.mode),
                },
            ),
            None => (
                None,
                String::new(),
                String::new(),
                ResourceUsage {
                    peak_memory_mb: None,
                    exit_code: None,
                    violations: vec![],
                    mode: None,
                },
            ),
        };

        TestResult {
            candidate_id: candidate_id.clone(),
            run_id,
            outcome: assessment.outcome,
            success,
            started_at,
            execution_time_ms: elapsed.as_millis() as u64,
            stdout,
            stderr,
            output: assessment.output,
            output_type: assessment.output_type,
            output_validation_passed: assessment.validation_passed,
            validation_error: assessment.validation_error,
            error_category: assessment.category,
            error_summary: assessment.summary,
            resource_usage,
            input_params: input_params.clone(),
            expected_output_type: expected_output_type.map(str::to_string),
        }
    }
}

fn timeout_assessment(wall: Duration) -> Assessment {
    Assessment::failed(
        ErrorCategory::Timeout,
        format!("execution exceeded {}s timeout", wall.as_secs()),
    )
}

fn assess(execution: &ExecutionResult, expected_output_type: Option<&str>) -> Assessment {
    match protocol::parse_wire_line(&execution.stdout) {
        Ok(wire) => {
            if let Some(error) = &wire.error {
                let category = classify_wire_error(&error.kind, &error.message);
                let summary = if error.message.is_empty() {
                    error.kind.clone()
                } else {
                    format!("{}: {}", error.kind, error.message)
                };
                return Assessment::failed(category, summary);
            }
            if !execution.success {
                return assess_stderr(execution);
            }
            validate_output(wire, expected_output_type)
        }
        Err(protocol_error) if execution.success => Assessment::invalid_output(
            protocol_error.to_string(),
            None,
            None,
        ),
        Err(ProtocolError::Missing) | Err(ProtocolError::Malformed(_)) => assess_stderr(execution),
    }
}

fn assess_stderr(execution: &ExecutionResult) -> Assessment {
    let summary = summarize(&execution.stderr);
    let summary = if summary.is_empty() {
        format!("process exited with code {}", execution.exit_code)
    } else {
        summary
    };

    let category = if execution.killed_by_signal() {
        ErrorCategory::Resource
    } else {
        classify_text(&execution.stderr)
    };
    Assessment::failed(category, summary)
}

fn validate_output(wire: WireResult, expected_output_type: Option<&str>) -> Assessment {
    let Some(expected) = expected_output_type else {
        return Assessment::passed(wire.output, wire.output_type);
    };
    let Some(expected_name) = normalize_type_name(expected) else {
        tracing::debug!("Unknown expected output type '{}', skipping check", expected);
        return Assessment::passed(wire.output, wire.output_type);
    };

    let actual = observed_type_name(&wire.output, wire.output_type.as_deref());
    let none_allowed = actual == "NoneType" && is_optional_annotation(expected);
    if none_allowed || type_matches(expected_name, &actual) {
        Assessment::passed(wire.output, wire.output_type)
    } else {
        Assessment::invalid_output(
            format!("expected output of type {}, got {}", expected_name, actual),
            Some(wire.output),
            wire.output_type,
        )
    }
}

const WIRE_TYPE_NAMES: &[&str] = &[
    "dict", "list", "str", "int", "float", "bool", "tuple", "NoneType",
];

/// Runtime type of the captured value, from the wire name when it is one we
/// know and from the JSON shape otherwise
fn observed_type_name(output: &Value, reported: Option<&str>) -> String {
    if let Some(name) = reported {
        if WIRE_TYPE_NAMES.contains(&name) {
            return name.to_string();
        }
    }
    match output {
        Value::Null => "NoneType",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_i64() || n.is_u64() => "int",
        Value::Number(_) => "float",
        Value::String(_) => "str",
        Value::Array(_) => "list",
        Value::Object(_) => "dict",
    }
    .to_string()
}

/// `isinstance` semantics: a bool is also an int
fn type_matches(expected: &str, actual: &str) -> bool {
    expected == actual || (expected == "int" && actual == "bool")
}
