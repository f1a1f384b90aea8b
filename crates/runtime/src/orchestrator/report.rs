//! Aggregate statistics and learning reports

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::types::CandidateId;
use crate::wrapper::{ErrorCategory, FailurePattern, FailurePatternTable, TestOutcome, TestResult};

/// Patterns kept in a run summary
pub const SUMMARY_TOP_PATTERNS: usize = 10;

/// Patterns kept in a learning report
pub const REPORT_TOP_PATTERNS: usize = 5;

const EMPTY_HISTORY_NOTE: &str = "no test results recorded yet";

/// Totals over every result in the history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestRunSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub success_rate: f64,
    pub mean_execution_time_ms: f64,
    pub by_outcome: BTreeMap<TestOutcome, usize>,
    pub by_category: BTreeMap<ErrorCategory, usize>,
    pub top_patterns: Vec<FailurePattern>,
}

impl TestRunSummary {
    pub fn from_history(history: &[TestResult], patterns: &FailurePatternTable) -> Self {
        let total = history.len();
        let passed = history.iter().filter(|r| r.success).count();

        let mut by_outcome = BTreeMap::new();
        let mut by_category = BTreeMap::new();
        for result in history {
            *by_outcome.entry(result.outcome).or_insert(0) += 1;
            if let Some(category) = result.error_category {
                *by_category.entry(category).or_insert(0) += 1;
            }
        }

        let (success_rate, mean_execution_time_ms) = if total == 0 {
            (0.0, 0.0)
        } else {
            let total_ms: u64 = history.iter().map(|r| r.execution_time_ms).sum();
            (
                passed as f64 / total as f64,
                total_ms as f64 / total as f64,
            )
        };

        Self {
            total,
            passed,
            failed: total - passed,
            success_rate,
            mean_execution_time_ms,
            by_outcome,
            by_category,
            top_patterns: patterns.top(SUMMARY_TOP_PATTERNS),
        }
    }
}

/// Result of testing one candidate in a tier run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateRunSummary {
    pub candidate_id: CandidateId,
    pub success: bool,
    pub variants: usize,
    pub failed_variants: usize,
    pub error: Option<String>,
}

/// Result of one `test_tier` pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierRunSummary {
    pub tier: String,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub candidates: Vec<CandidateRunSummary>,
}

impl TierRunSummary {
    pub fn total(&self) -> usize {
        self.candidates.len()
    }

    pub fn passed(&self) -> usize {
        self.candidates.iter().filter(|c| c.success).count()
    }

    pub fn failed(&self) -> usize {
        self.total() - self.passed()
    }

    pub fn variants_run(&self) -> usize {
        self.candidates.iter().map(|c| c.variants).sum()
    }

    pub fn candidate(&self, id: &CandidateId) -> Option<&CandidateRunSummary> {
        self.candidates.iter().find(|c| &c.candidate_id == id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub category: ErrorCategory,
    pub suggestion: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningReport {
    pub generated_at: DateTime<Utc>,
    pub statistics: TestRunSummary,
    pub top_patterns: Vec<FailurePattern>,
    pub recommendations: Vec<Recommendation>,
    /// Set when there is nothing to learn from yet
    pub note: Option<String>,
}

impl LearningReport {
    pub fn build(history: &[TestResult], patterns: &FailurePatternTable) -> Self {
        let statistics = TestRunSummary::from_history(history, patterns);
        let top_patterns = patterns.top(REPORT_TOP_PATTERNS);

        let mut recommendations: Vec<Recommendation> = vec![];
        for pattern in &top_patterns {
            let Some(suggestion) = remediation_for(pattern.category) else {
                continue;
            };
            if recommendations.iter().any(|r| r.category == pattern.category) {
                continue;
            }
            recommendations.push(Recommendation {
                category: pattern.category,
                suggestion: suggestion.to_string(),
            });
        }

        let note = history.is_empty().then(|| EMPTY_HISTORY_NOTE.to_string());

        Self {
            generated_at: Utc::now(),
            statistics,
            top_patterns,
            recommendations,
            note,
        }
    }
}

/// Canned remediation for a failure category
pub fn remediation_for(category: ErrorCategory) -> Option<&'static str> {
    match category {
        ErrorCategory::Syntax => Some("Add pre-execution syntax validation to the generator"),
        ErrorCategory::Type => Some("Enforce and validate type hints in generated code"),
        ErrorCategory::Dependency => Some("Check available imports before generation"),
        ErrorCategory::Resource => Some("Add resource-aware generation constraints"),
        _ => None,
    }
}
