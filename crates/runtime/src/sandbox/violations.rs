//! Advisory security-violation scan
//!
//! Violations are heuristics over the error stream and the scratch directory.
//! They are attached to results for inspection and never change a result's
//! success flag.

use super::scratch::DirUsage;
use crate::config::ResourceLimits;

/// Lowercase fragment and the label it maps to
const INDICATORS: &[(&str, &str)] = &[
    ("permission denied", "filesystem access denied"),
    ("operation not permitted", "operation blocked by sandbox"),
    ("read-only file system", "write to read-only filesystem"),
    ("network is unreachable", "network access blocked"),
    ("temporary failure in name resolution", "network access blocked"),
    ("name or service not known", "network access blocked"),
    ("subprocess", "subprocess spawn attempt"),
    ("os.system", "shell escape attempt"),
    ("os.fork", "process fork attempt"),
    ("popen", "subprocess spawn attempt"),
    ("name 'eval' is not defined", "dynamic evaluation blocked"),
    ("name 'exec' is not defined", "dynamic execution blocked"),
    ("name 'compile' is not defined", "dynamic compilation blocked"),
    ("name 'open' is not defined", "file access blocked"),
    ("not allowed in restricted mode", "disallowed import"),
    ("is not allowed in this sandbox", "disallowed import"),
    ("private attribute", "private attribute access blocked"),
    ("disk quota exceeded", "disk quota exceeded"),
    ("file too large", "file size limit exceeded"),
    ("too many open files", "open file limit exceeded"),
];

const MAX_EXCERPT_CHARS: usize = 160;

/// Scan captured stderr for signs of blocked operations
pub fn scan_stderr(stderr: &str) -> Vec<String> {
    let mut found: Vec<String> = vec![];
    let mut labels: Vec<&str> = vec![];

    for line in stderr.lines() {
        let lower = line.to_lowercase();
        for (fragment, label) in INDICATORS {
            if lower.contains(fragment) && !labels.contains(label) {
                labels.push(label);
                found.push(format!("{}: {}", label, excerpt(line.trim())));
            }
        }
    }

    found
}

/// Compare what a run left behind with the scratch ceilings
pub fn check_scratch_usage(usage: DirUsage, limits: &ResourceLimits) -> Vec<String> {
    let mut found = vec![];
    if usage.files > limits.max_total_files {
        found.push(format!(
            "file count limit exceeded: {} files (limit {})",
            usage.files, limits.max_total_files
        ));
    }
    if usage.bytes > limits.disk_space_bytes {
        found.push(format!(
            "disk space limit exceeded: {} bytes (limit {})",
            usage.bytes, limits.disk_space_bytes
        ));
    }
    found
}

fn excerpt(line: &str) -> String {
    if line.chars().count() <= MAX_EXCERPT_CHARS {
        line.to_string()
    } else {
        let cut: String = line.chars().take(MAX_EXCERPT_CHARS).collect();
        format!("{}...", cut)
    }
}
