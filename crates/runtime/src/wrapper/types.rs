//! Outcome taxonomy and per-run records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::IsolationMode;
use crate::types::{CandidateId, InputMap, RunId};

/// Exactly one per executed variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestOutcome {
    Success,
    SyntaxError,
    RuntimeError,
    TypeError,
    Timeout,
    ResourceExhaustion,
    OutputValidationFailed,
    UnknownError,
}

impl std::fmt::Display for TestOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TestOutcome::Success => "success",
            TestOutcome::SyntaxError => "syntax_error",
            TestOutcome::RuntimeError => "runtime_error",
            TestOutcome::TypeError => "type_error",
            TestOutcome::Timeout => "timeout",
            TestOutcome::ResourceExhaustion => "resource_exhaustion",
            TestOutcome::OutputValidationFailed => "output_validation_failed",
            TestOutcome::UnknownError => "unknown_error",
        };
        write!(f, "{}", name)
    }
}

/// Coarse failure bucket used for learning aggregation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Syntax,
    Runtime,
    Type,
    Resource,
    Dependency,
    Timeout,
    Validation,
    Unknown,
}

impl ErrorCategory {
    /// Outcome reported for a failure in this category
    pub fn outcome(&self) -> TestOutcome {
        match self {
            ErrorCategory::Syntax => TestOutcome::SyntaxError,
            ErrorCategory::Runtime => TestOutcome::RuntimeError,
            ErrorCategory::Type => TestOutcome::TypeError,
            ErrorCategory::Resource => TestOutcome::ResourceExhaustion,
            ErrorCategory::Dependency => TestOutcome::RuntimeError,
            ErrorCategory::Timeout => TestOutcome::Timeout,
            ErrorCategory::Validation => TestOutcome::OutputValidationFailed,
            ErrorCategory::Unknown => TestOutcome::UnknownError,
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorCategory::Syntax => "syntax",
            ErrorCategory::Runtime => "runtime",
            ErrorCategory::Type => "type",
            ErrorCategory::Resource => "resource",
            ErrorCategory::Dependency => "dependency",
            ErrorCategory::Timeout => "timeout",
            ErrorCategory::Validation => "validation",
            ErrorCategory::Unknown => "unknown",
        };
        write!(f, "{}", name)
    }
}

/// Resources observed for one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceUsage {
    pub peak_memory_mb: Option<f64>,
    pub exit_code: Option<i32>,
    pub violations: Vec<String>,
    /// Mode that actually ran the variant; `None` if the executor never ran
    pub mode: Option<IsolationMode>,
}

/// Record of one candidate run against one input variant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    pub candidate_id: CandidateId,
    pub run_id: Option<RunId>,
    pub outcome: TestOutcome,
    pub success: bool,
    pub started_at: DateTime<Utc>,
    pub execution_time_ms: u64,
    pub stdout: String,
    pub stderr: String,
    /// Captured value from the wire line
    pub output: Option<Value>,
    /// Runtime type name reported with the value
    pub output_type: Option<String>,
    pub output_validation_passed: bool,
    pub validation_error: Option<String>,
    pub error_category: Option<ErrorCategory>,
    /// Last meaningful error line, at most 200 characters
    pub error_summary: Option<String>,
    pub resource_usage: ResourceUsage,
    pub input_params: InputMap,
    pub expected_output_type: Option<String>,
}

/// Recurring failure keyed by category and truncated message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailurePattern {
    pub category: ErrorCategory,
    pub message: String,
    pub code_snippet: String,
    pub frequency: u64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}
