//! Failure classification
//!
//! A structured exception type from the wire line decides the category when
//! it is conclusive. Free text falls back to an ordered substring scan where
//! the first matching group wins: syntax, type, resource, timeout, dependency,
//! then generic runtime. The scan is lossy; compound messages resolve to the
//! earliest group.

use super::types::ErrorCategory;

/// Longest summary kept for a failure
pub const MAX_SUMMARY_CHARS: usize = 200;

const SYNTAX_INDICATORS: &[&str] = &[
    "syntaxerror",
    "indentationerror",
    "taberror",
    "invalid syntax",
    "unexpected indent",
    "unexpected eof",
];
const TYPE_INDICATORS: &[&str] = &["typeerror"];
const RESOURCE_INDICATORS: &[&str] = &[
    "memoryerror",
    "out of memory",
    "cannot allocate memory",
    "recursionerror",
    "maximum recursion depth",
    "resource",
    "file too large",
    "killed by signal",
];
const TIMEOUT_INDICATORS: &[&str] = &["timeout", "timed out", "time limit"];
const DEPENDENCY_INDICATORS: &[&str] = &[
    "modulenotfounderror",
    "importerror",
    "no module named",
    "cannot import name",
];

/// Category implied by an exception type name, when it is conclusive
pub fn classify_exception_type(type_name: &str) -> Option<ErrorCategory> {
    let short = type_name.rsplit('.').next().unwrap_or(type_name);
    match short {
        "SyntaxError" | "IndentationError" | "TabError" => Some(ErrorCategory::Syntax),
        "TypeError" => Some(ErrorCategory::Type),
        "MemoryError" | "RecursionError" => Some(ErrorCategory::Resource),
        "TimeoutError" => Some(ErrorCategory::Timeout),
        "ImportError" | "ModuleNotFoundError" => Some(ErrorCategory::Dependency),
        _ => None,
    }
}

/// Ordered substring classification of free error text
pub fn classify_text(text: &str) -> ErrorCategory {
    let lower = text.to_lowercase();
    let groups: [(&[&str], ErrorCategory); 5] = [
        (SYNTAX_INDICATORS, ErrorCategory::Syntax),
        (TYPE_INDICATORS, ErrorCategory::Type),
        (RESOURCE_INDICATORS, ErrorCategory::Resource),
        (TIMEOUT_INDICATORS, ErrorCategory::Timeout),
        (DEPENDENCY_INDICATORS, ErrorCategory::Dependency),
    ];

    groups
        .iter()
        .find(|(indicators, _)| indicators.iter().any(|needle| lower.contains(needle)))
        .map(|(_, category)| *category)
        .unwrap_or(ErrorCategory::Runtime)
}

/// Classify a structured error, falling back to its text
pub fn classify_wire_error(type_name: &str, message: &str) -> ErrorCategory {
    classify_exception_type(type_name)
        .unwrap_or_else(|| classify_text(&format!("{}: {}", type_name, message)))
}

/// Last non-empty line of `text`, at most `MAX_SUMMARY_CHARS` characters
pub fn summarize(text: &str) -> String {
    let line = text
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("");
    truncate_chars(line, MAX_SUMMARY_CHARS)
}

pub(crate) fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}
