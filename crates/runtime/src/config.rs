//! Execution configuration for one isolation engine
//!
//! `ExecutionConfig` is built once per engine and never mutated afterwards.
//! Two views are derived from it: `ResourceLimits` (quantitative ceilings) and
//! `SecurityPolicy` (capability restrictions). Validation reports every
//! problem at once and never clamps values silently.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::types::ConfigError;

/// Isolation strategy used to run a code unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum IsolationMode {
    /// External OS-level sandbox binary wrapping the language runtime
    #[default]
    OsSandbox,
    /// Language runtime hosting a guard that strips the builtin namespace
    RestrictedInterpreter,
    /// No execution at all, canned results only
    Mock,
}

impl std::fmt::Display for IsolationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IsolationMode::OsSandbox => write!(f, "os_sandbox"),
            IsolationMode::RestrictedInterpreter => write!(f, "restricted_interpreter"),
            IsolationMode::Mock => write!(f, "mock"),
        }
    }
}

impl std::str::FromStr for IsolationMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "os_sandbox" | "sandbox" => Ok(IsolationMode::OsSandbox),
            "restricted_interpreter" | "restricted" => Ok(IsolationMode::RestrictedInterpreter),
            "mock" => Ok(IsolationMode::Mock),
            other => Err(ConfigError::InvalidValue {
                key: "mode".to_string(),
                reason: format!(
                    "unknown isolation mode '{}'; expected os_sandbox, restricted_interpreter or mock",
                    other
                ),
            }),
        }
    }
}

/// Language of a code unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    #[default]
    Python,
    JavaScript,
    Shell,
}

impl Language {
    /// Default runtime executable for this language
    pub fn default_runtime(&self) -> &'static str {
        match self {
            Language::Python => "python3",
            Language::JavaScript => "node",
            Language::Shell => "sh",
        }
    }

    /// File extension used when the unit is materialised on disk
    pub fn file_extension(&self) -> &'static str {
        match self {
            Language::Python => "py",
            Language::JavaScript => "js",
            Language::Shell => "sh",
        }
    }

    /// Arguments placed between the runtime and the code file
    pub fn runtime_args(&self) -> &'static [&'static str] {
        match self {
            // isolated mode, no bytecode files in the scratch directory
            Language::Python => &["-I", "-B"],
            Language::JavaScript => &[],
            Language::Shell => &[],
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Language::Python => write!(f, "python"),
            Language::JavaScript => write!(f, "javascript"),
            Language::Shell => write!(f, "shell"),
        }
    }
}

impl std::str::FromStr for Language {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "python" | "python3" | "py" => Ok(Language::Python),
            "javascript" | "js" | "node" => Ok(Language::JavaScript),
            "shell" | "sh" | "bash" => Ok(Language::Shell),
            other => Err(ConfigError::InvalidValue {
                key: "language".to_string(),
                reason: format!("unsupported language '{}'", other),
            }),
        }
    }
}

/// Default maximum bytes captured per output stream (10 MB)
const DEFAULT_MAX_OUTPUT_BYTES: usize = 10 * 1024 * 1024;
const BYTES_PER_MB: u64 = 1024 * 1024;

pub const MIN_TIMEOUT_SECONDS: u64 = 1;
pub const MAX_TIMEOUT_SECONDS: u64 = 3600;
pub const MIN_MEMORY_MB: u64 = 32;
pub const MAX_MEMORY_MB: u64 = 8192;

/// Immutable description of one engine's isolation mode, ceilings and capabilities
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Isolation strategy requested for this engine
    pub mode: IsolationMode,
    /// Language of the code units executed by this engine
    pub language: Language,
    /// Wall-clock ceiling per execution (1-3600)
    pub timeout_seconds: u64,
    /// Address-space ceiling in MB (32-8192)
    pub max_memory_mb: u64,
    /// Share of the wall-clock budget the unit may spend on CPU (0-100)
    pub max_cpu_percent: f64,
    /// Largest file the unit may write, in MB
    pub max_file_size_mb: u64,
    /// Most files the unit may leave in its scratch directory
    pub max_total_files: u64,
    /// Total scratch directory size ceiling in MB
    pub max_disk_space_mb: u64,
    pub allow_network: bool,
    pub allow_outbound_http: bool,
    pub blocked_domains: Vec<String>,
    pub allow_eval: bool,
    pub allow_exec: bool,
    pub allow_dynamic_import: bool,
    /// Extra directory the unit may read and write
    pub working_directory: Option<PathBuf>,
    /// Variables added to the minimal child environment
    pub environment_vars: HashMap<String, String>,
    /// Explicit path to the isolation binary, bypassing discovery
    pub sandbox_binary: Option<PathBuf>,
    /// Explicit language runtime, bypassing `Language::default_runtime`
    pub runtime_path: Option<PathBuf>,
    /// Bytes captured per output stream before truncation
    pub max_output_bytes: usize,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            mode: IsolationMode::OsSandbox,
            language: Language::Python,
            timeout_seconds: 30,
            max_memory_mb: 256,
            max_cpu_percent: 90.0,
            max_file_size_mb: 10,
            max_total_files: 100,
            max_disk_space_mb: 500,
            allow_network: false,
            allow_outbound_http: false,
            blocked_domains: vec![],
            allow_eval: false,
            allow_exec: false,
            allow_dynamic_import: false,
            working_directory: None,
            environment_vars: HashMap::new(),
            sandbox_binary: None,
            runtime_path: None,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
        }
    }
}

/// Outcome of validating an `ExecutionConfig`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

impl ExecutionConfig {
    /// Tight ceilings with every capability denied
    pub fn strict() -> Self {
        Self {
            timeout_seconds: 10,
            max_memory_mb: 128,
            max_file_size_mb: 1,
            max_total_files: 20,
            max_disk_space_mb: 50,
            ..Self::default()
        }
    }

    /// Relaxed ceilings with network access; eval and exec stay denied
    pub fn permissive() -> Self {
        Self {
            timeout_seconds: 60,
            max_memory_mb: 512,
            allow_network: true,
            allow_outbound_http: true,
            allow_dynamic_import: true,
            ..Self::default()
        }
    }

    /// Look up a preset by name (`strict`, `permissive`, `default`)
    pub fn preset(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "strict" => Some(Self::strict()),
            "permissive" => Some(Self::permissive()),
            "default" => Some(Self::default()),
            _ => None,
        }
    }

    /// Check every field and report all errors and warnings together
    pub fn validate(&self) -> ValidationReport {
        let mut report = ValidationReport::default();

        if !(MIN_TIMEOUT_SECONDS..=MAX_TIMEOUT_SECONDS).contains(&self.timeout_seconds) {
            report.errors.push(format!(
                "timeout_seconds must be between {} and {}, got {}",
                MIN_TIMEOUT_SECONDS, MAX_TIMEOUT_SECONDS, self.timeout_seconds
            ));
        }
        if !(MIN_MEMORY_MB..=MAX_MEMORY_MB).contains(&self.max_memory_mb) {
            report.errors.push(format!(
                "max_memory_mb must be between {} and {}, got {}",
                MIN_MEMORY_MB, MAX_MEMORY_MB, self.max_memory_mb
            ));
        }
        if !self.max_cpu_percent.is_finite() || !(0.0..=100.0).contains(&self.max_cpu_percent) {
            report.errors.push(format!(
                "max_cpu_percent must be between 0 and 100, got {}",
                self.max_cpu_percent
            ));
        }
        if self.max_file_size_mb == 0 {
            report.errors.push("max_file_size_mb must be > 0".to_string());
        }
        if self.max_total_files == 0 {
            report.errors.push("max_total_files must be > 0".to_string());
        }
        if self.max_disk_space_mb == 0 {
            report.errors.push("max_disk_space_mb must be > 0".to_string());
        } else if self.max_file_size_mb > self.max_disk_space_mb {
            report.warnings.push(format!(
                "max_file_size_mb ({}) exceeds max_disk_space_mb ({})",
                self.max_file_size_mb, self.max_disk_space_mb
            ));
        }
        if self.max_output_bytes == 0 {
            report.errors.push("max_output_bytes must be > 0".to_string());
        }
        if let Some(dir) = &self.working_directory {
            if !dir.is_absolute() {
                report.errors.push(format!(
                    "working_directory must be an absolute path: {}",
                    dir.display()
                ));
            }
        }
        if self.blocked_domains.iter().any(|d| d.trim().is_empty()) {
            report
                .errors
                .push("blocked_domains cannot contain empty entries".to_string());
        }
        if self.mode == IsolationMode::RestrictedInterpreter && self.language != Language::Python {
            report.errors.push(format!(
                "restricted_interpreter mode supports only python, got {}",
                self.language
            ));
        }

        if self.mode == IsolationMode::OsSandbox && self.allow_exec {
            report.warnings.push(
                "allow_exec = true weakens the os_sandbox mode; generated code may run arbitrary statements"
                    .to_string(),
            );
        }
        if self.allow_eval {
            report
                .warnings
                .push("allow_eval = true exposes eval() and compile() to candidates".to_string());
        }
        if self.allow_outbound_http && !self.allow_network {
            report.warnings.push(
                "allow_outbound_http has no effect while allow_network is false".to_string(),
            );
        }
        if self.max_cpu_percent == 0.0 {
            report
                .warnings
                .push("max_cpu_percent = 0 leaves a CPU budget of one second".to_string());
        }

        report
    }

    /// Fail fast when `validate` reports any error; warnings are logged
    pub fn ensure_valid(&self) -> Result<(), ConfigError> {
        let report = self.validate();
        for warning in &report.warnings {
            tracing::warn!("execution config: {}", warning);
        }
        if report.is_valid() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(report.errors))
        }
    }

    /// Quantitative view consumed by the isolation executor
    pub fn resource_limits(&self) -> ResourceLimits {
        let wall = Duration::from_secs(self.timeout_seconds);
        let cpu_budget = (self.timeout_seconds as f64 * self.max_cpu_percent / 100.0).ceil() as u64;
        ResourceLimits {
            wall_timeout: wall,
            memory_bytes: self.max_memory_mb.saturating_mul(BYTES_PER_MB),
            cpu_time_seconds: cpu_budget.max(1),
            cpu_percent: self.max_cpu_percent,
            file_size_bytes: self.max_file_size_mb.saturating_mul(BYTES_PER_MB),
            max_total_files: self.max_total_files,
            // stdio, interpreter internals and the launcher's own files
            max_open_files: self.max_total_files.saturating_add(32),
            disk_space_bytes: self.max_disk_space_mb.saturating_mul(BYTES_PER_MB),
            max_output_bytes: self.max_output_bytes,
        }
    }

    /// Qualitative view consumed by the isolation executor
    pub fn security_policy(&self) -> SecurityPolicy {
        self.security_policy_for(self.mode)
    }

    /// Capability view for the mode an engine actually resolved to, which may
    /// differ from `mode` after a downgrade
    pub fn security_policy_for(&self, mode: IsolationMode) -> SecurityPolicy {
        let mut allowed_paths = vec![];
        if let Some(dir) = &self.working_directory {
            allowed_paths.push(dir.clone());
        }

        let mut allowed_builtins: Vec<String> =
            SAFE_BUILTINS.iter().map(|s| s.to_string()).collect();
        let mut blocked_builtins: Vec<String> = vec![];
        for (name, allowed) in [
            ("eval", self.allow_eval),
            ("compile", self.allow_eval),
            ("exec", self.allow_exec),
        ] {
            if allowed {
                allowed_builtins.push(name.to_string());
            } else {
                blocked_builtins.push(name.to_string());
            }
        }
        blocked_builtins.extend(ALWAYS_BLOCKED_BUILTINS.iter().map(|s| s.to_string()));

        let restrict_builtins = mode == IsolationMode::RestrictedInterpreter;
        // the OS sandbox confines the filesystem itself, so only escape hatches are blocked there
        let base: &[&str] = if restrict_builtins {
            BLOCKED_MODULES
        } else {
            ESCAPE_MODULES
        };
        let mut blocked_modules: Vec<String> = base.iter().map(|s| s.to_string()).collect();
        if !self.allow_network {
            for module in NETWORK_MODULES {
                if !blocked_modules.iter().any(|m| m == module) {
                    blocked_modules.push(module.to_string());
                }
            }
        } else {
            blocked_modules.retain(|m| !NETWORK_MODULES.contains(&m.as_str()));
        }
        if self.allow_dynamic_import {
            blocked_modules.retain(|m| m != "importlib");
        } else if !blocked_modules.iter().any(|m| m == "importlib") {
            blocked_modules.push("importlib".to_string());
        }

        SecurityPolicy {
            restrict_builtins,
            allow_network: self.allow_network,
            allow_outbound_http: self.allow_network && self.allow_outbound_http,
            blocked_domains: self.blocked_domains.clone(),
            allow_dynamic_import: self.allow_dynamic_import,
            allowed_modules: SAFE_MODULES.iter().map(|s| s.to_string()).collect(),
            blocked_modules,
            allowed_builtins,
            blocked_builtins,
            allowed_paths,
            blocked_paths: sensitive_paths(),
        }
    }

    /// Load a configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            message: e.to_string(),
        })
    }

    /// Defaults overlaid with `CRUCIBLE_*` environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Overlay `CRUCIBLE_*` environment variables onto this configuration
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(mode) = parse_env::<IsolationMode>("CRUCIBLE_MODE")? {
            self.mode = mode;
        }
        if let Some(language) = parse_env::<Language>("CRUCIBLE_LANGUAGE")? {
            self.language = language;
        }
        if let Some(value) = parse_env::<u64>("CRUCIBLE_TIMEOUT_SECONDS")? {
            self.timeout_seconds = value;
        }
        if let Some(value) = parse_env::<u64>("CRUCIBLE_MAX_MEMORY_MB")? {
            self.max_memory_mb = value;
        }
        if let Some(value) = parse_env::<f64>("CRUCIBLE_MAX_CPU_PERCENT")? {
            self.max_cpu_percent = value;
        }
        if let Some(value) = parse_env_bool("CRUCIBLE_ALLOW_NETWORK")? {
            self.allow_network = value;
        }
        if let Ok(path) = env::var("CRUCIBLE_SANDBOX_BINARY") {
            self.sandbox_binary = Some(PathBuf::from(path));
        }
        if let Ok(path) = env::var("CRUCIBLE_RUNTIME") {
            self.runtime_path = Some(PathBuf::from(path));
        }
        Ok(())
    }

    /// Runtime executable for the configured language
    pub fn runtime(&self) -> PathBuf {
        self.runtime_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(self.language.default_runtime()))
    }
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                reason: format!("cannot parse '{}'", raw),
            }),
        Err(_) => Ok(None),
    }
}

fn parse_env_bool(key: &str) -> Result<Option<bool>, ConfigError> {
    match env::var(key) {
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(Some(true)),
            "0" | "false" | "no" | "off" => Ok(Some(false)),
            _ => Err(ConfigError::InvalidValue {
                key: key.to_string(),
                reason: format!("expected a boolean, got '{}'", raw),
            }),
        },
        Err(_) => Ok(None),
    }
}

/// Quantitative ceilings for one execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceLimits {
    pub wall_timeout: Duration,
    pub memory_bytes: u64,
    /// RLIMIT_CPU budget derived from the wall timeout and CPU share
    pub cpu_time_seconds: u64,
    pub cpu_percent: f64,
    pub file_size_bytes: u64,
    pub max_total_files: u64,
    pub max_open_files: u64,
    pub disk_space_bytes: u64,
    pub max_output_bytes: usize,
}

/// Capability restrictions for one execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityPolicy {
    /// Replace the builtin namespace with `allowed_builtins` only
    pub restrict_builtins: bool,
    pub allow_network: bool,
    pub allow_outbound_http: bool,
    pub blocked_domains: Vec<String>,
    pub allow_dynamic_import: bool,
    pub allowed_modules: Vec<String>,
    pub blocked_modules: Vec<String>,
    pub allowed_builtins: Vec<String>,
    pub blocked_builtins: Vec<String>,
    pub allowed_paths: Vec<PathBuf>,
    pub blocked_paths: Vec<PathBuf>,
}

const SAFE_BUILTINS: &[&str] = &[
    "abs", "all", "any", "ascii", "bin", "bool", "bytearray", "bytes", "callable", "chr",
    "classmethod", "complex", "dict", "divmod", "enumerate", "filter", "float", "format",
    "frozenset", "getattr", "hasattr", "hash", "hex", "id", "int", "isinstance", "issubclass",
    "iter", "len", "list", "map", "max", "min", "next", "object", "oct", "ord", "pow", "print",
    "property", "range", "repr", "reversed", "round", "set", "setattr", "slice", "sorted",
    "staticmethod", "str", "sum", "super", "tuple", "type", "zip", "__build_class__",
    "ArithmeticError", "AssertionError", "AttributeError", "BaseException", "Exception",
    "ImportError", "IndexError", "KeyError", "LookupError", "MemoryError",
    "ModuleNotFoundError", "NameError", "NotImplementedError", "OverflowError",
    "RecursionError", "RuntimeError", "StopIteration", "TimeoutError", "TypeError",
    "UnicodeError", "ValueError", "ZeroDivisionError", "NotImplemented", "Ellipsis",
];

const ALWAYS_BLOCKED_BUILTINS: &[&str] = &[
    "open", "input", "breakpoint", "globals", "locals", "vars", "memoryview", "help", "exit",
    "quit",
];

const SAFE_MODULES: &[&str] = &[
    "math", "cmath", "random", "re", "json", "string", "itertools", "functools", "collections",
    "datetime", "decimal", "fractions", "statistics", "typing", "dataclasses", "enum", "heapq",
    "bisect", "copy", "operator", "textwrap", "unicodedata", "numbers", "abc", "time",
];

const NETWORK_MODULES: &[&str] = &["socket", "ssl", "http", "urllib", "ftplib", "smtplib"];

const ESCAPE_MODULES: &[&str] = &["subprocess", "ctypes", "cffi", "multiprocessing", "pty"];

const BLOCKED_MODULES: &[&str] = &[
    "os", "sys", "subprocess", "shutil", "pathlib", "importlib", "ctypes", "cffi",
    "multiprocessing", "threading", "signal", "pickle", "marshal", "builtins", "io", "pty",
    "fcntl", "resource", "gc", "inspect", "code", "codeop", "socket", "ssl", "http", "urllib",
    "ftplib", "smtplib",
];

/// Credential stores and sensitive system locations never exposed to a unit
fn sensitive_paths() -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = [
        "/etc/shadow",
        "/etc/sudoers",
        "/etc/ssh",
        "/root",
        "/var/run/docker.sock",
        "/proc/kcore",
        "/sys/firmware",
    ]
    .iter()
    .map(PathBuf::from)
    .collect();

    if let Some(home) = dirs::home_dir() {
        for secret in [
            ".ssh",
            ".aws",
            ".gnupg",
            ".kube",
            ".docker",
            ".azure",
            ".config/gcloud",
            ".netrc",
            ".git-credentials",
            ".pypirc",
            ".npmrc",
        ] {
            paths.push(home.join(secret));
        }
    }
    paths
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_default_config() {
        let config = ExecutionConfig::default();
        assert_eq!(config.mode, IsolationMode::OsSandbox);
        assert_eq!(config.timeout_seconds, 30);
        assert_eq!(config.max_memory_mb, 256);
        assert_eq!(config.max_cpu_percent, 90.0);
        assert!(!config.allow_network);
        assert!(!config.allow_eval);
        assert!(!config.allow_exec);
        assert!(config.validate().is_valid());
    }

    #[test]
    fn test_presets() {
        let strict = ExecutionConfig::strict();
        assert_eq!(strict.timeout_seconds, 10);
        assert_eq!(strict.max_memory_mb, 128);
        assert!(!strict.allow_network && !strict.allow_eval && !strict.allow_exec);
        assert!(!strict.allow_dynamic_import);

        let permissive = ExecutionConfig::permissive();
        assert_eq!(permissive.timeout_seconds, 60);
        assert_eq!(permissive.max_memory_mb, 512);
        assert!(permissive.allow_network);
        assert!(!permissive.allow_eval && !permissive.allow_exec);

        assert_eq!(ExecutionConfig::preset("DEFAULT"), Some(ExecutionConfig::default()));
        assert!(ExecutionConfig::preset("yolo").is_none());
        for preset in [strict, permissive] {
            assert!(preset.validate().is_valid());
        }
    }

    #[test]
    fn test_out_of_range_values_are_reported_not_clamped() {
        let config = ExecutionConfig {
            timeout_seconds: 0,
            max_memory_mb: 16,
            max_cpu_percent: 150.0,
            ..Default::default()
        };
        let report = config.validate();
        assert_eq!(report.errors.len(), 3);
        assert_eq!(config.timeout_seconds, 0);
        assert!(config.ensure_valid().is_err());
    }

    #[test]
    fn test_exec_in_os_sandbox_is_a_warning() {
        let config = ExecutionConfig {
            allow_exec: true,
            ..Default::default()
        };
        let report = config.validate();
        assert!(report.is_valid());
        assert!(report.warnings.iter().any(|w| w.contains("allow_exec")));
    }

    #[test]
    fn test_restricted_mode_requires_python() {
        let config = ExecutionConfig {
            mode: IsolationMode::RestrictedInterpreter,
            language: Language::Shell,
            ..Default::default()
        };
        assert!(!config.validate().is_valid());
    }

    #[test]
    fn test_relative_working_directory_rejected() {
        let config = ExecutionConfig {
            working_directory: Some(PathBuf::from("relative/dir")),
            ..Default::default()
        };
        assert!(!config.validate().is_valid());
    }

    #[test]
    fn test_resource_limits_view() {
        let limits = ExecutionConfig::default().resource_limits();
        assert_eq!(limits.wall_timeout, Duration::from_secs(30));
        assert_eq!(limits.memory_bytes, 256 * 1024 * 1024);
        assert_eq!(limits.cpu_time_seconds, 27);
        assert_eq!(limits.file_size_bytes, 10 * 1024 * 1024);
    }

    #[test]
    fn test_resource_limits_saturate() {
        let config = ExecutionConfig {
            max_file_size_mb: u64::MAX / 1024,
            max_disk_space_mb: u64::MAX,
            max_total_files: u64::MAX,
            ..Default::default()
        };
        assert!(config.validate().is_valid());

        let limits = config.resource_limits();
        assert_eq!(limits.file_size_bytes, u64::MAX);
        assert_eq!(limits.disk_space_bytes, u64::MAX);
        assert_eq!(limits.max_open_files, u64::MAX);
    }

    #[test]
    fn test_restricted_policy_allows_time() {
        let policy = ExecutionConfig::strict().security_policy();
        assert!(policy.allowed_modules.contains(&"time".to_string()));
        assert!(!policy.blocked_modules.contains(&"time".to_string()));
    }

    #[test]
    fn test_security_policy_view() {
        let policy = ExecutionConfig::default().security_policy();
        assert!(!policy.restrict_builtins);
        assert!(policy.blocked_builtins.contains(&"eval".to_string()));
        assert!(policy.blocked_builtins.contains(&"exec".to_string()));
        assert!(policy.blocked_modules.contains(&"subprocess".to_string()));
        assert!(policy.blocked_modules.contains(&"socket".to_string()));

        assert!(!policy.blocked_modules.contains(&"os".to_string()));

        let restricted = ExecutionConfig {
            mode: IsolationMode::RestrictedInterpreter,
            allow_eval: true,
            ..Default::default()
        }
        .security_policy();
        assert!(restricted.restrict_builtins);
        assert!(restricted.allowed_builtins.contains(&"eval".to_string()));
        assert!(restricted.blocked_modules.contains(&"os".to_string()));

        let downgraded =
            ExecutionConfig::default().security_policy_for(IsolationMode::RestrictedInterpreter);
        assert!(downgraded.restrict_builtins);

        let networked = ExecutionConfig::permissive().security_policy();
        assert!(!networked.blocked_modules.contains(&"socket".to_string()));
        assert!(!networked.blocked_modules.contains(&"importlib".to_string()));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("crucible.toml");
        std::fs::write(
            &path,
            "mode = \"restricted_interpreter\"\ntimeout_seconds = 5\nblocked_domains = [\"example.com\"]\n",
        )
        .unwrap();

        let config = ExecutionConfig::from_file(&path).unwrap();
        assert_eq!(config.mode, IsolationMode::RestrictedInterpreter);
        assert_eq!(config.timeout_seconds, 5);
        assert_eq!(config.max_memory_mb, 256);
        assert_eq!(config.blocked_domains, vec!["example.com".to_string()]);
    }

    #[test]
    fn test_from_file_missing() {
        let result = ExecutionConfig::from_file("/nonexistent/crucible.toml");
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }

    #[test]
    #[serial]
    fn test_config_from_env() {
        env::set_var("CRUCIBLE_MODE", "mock");
        env::set_var("CRUCIBLE_TIMEOUT_SECONDS", "12");
        env::set_var("CRUCIBLE_ALLOW_NETWORK", "yes");

        let config = ExecutionConfig::from_env().unwrap();
        assert_eq!(config.mode, IsolationMode::Mock);
        assert_eq!(config.timeout_seconds, 12);
        assert!(config.allow_network);

        env::remove_var("CRUCIBLE_MODE");
        env::remove_var("CRUCIBLE_TIMEOUT_SECONDS");
        env::remove_var("CRUCIBLE_ALLOW_NETWORK");
    }

    const ENV_KEYS: &[&str] = &[
        "CRUCIBLE_MODE",
        "CRUCIBLE_LANGUAGE",
        "CRUCIBLE_TIMEOUT_SECONDS",
        "CRUCIBLE_MAX_MEMORY_MB",
        "CRUCIBLE_MAX_CPU_PERCENT",
        "CRUCIBLE_ALLOW_NETWORK",
        "CRUCIBLE_SANDBOX_BINARY",
        "CRUCIBLE_RUNTIME",
    ];

    fn clear_env() {
        for key in ENV_KEYS {
            env::remove_var(key);
        }
    }

    #[test]
    #[serial]
    fn test_every_env_override_applies() {
        clear_env();
        let cases: [(&str, &str, fn(&ExecutionConfig) -> bool); 8] = [
            ("CRUCIBLE_MODE", "restricted_interpreter", |c| {
                c.mode == IsolationMode::RestrictedInterpreter
            }),
            ("CRUCIBLE_LANGUAGE", "shell", |c| c.language == Language::Shell),
            ("CRUCIBLE_TIMEOUT_SECONDS", "45", |c| c.timeout_seconds == 45),
            ("CRUCIBLE_MAX_MEMORY_MB", "512", |c| c.max_memory_mb == 512),
            ("CRUCIBLE_MAX_CPU_PERCENT", "50.5", |c| c.max_cpu_percent == 50.5),
            ("CRUCIBLE_ALLOW_NETWORK", "on", |c| c.allow_network),
            ("CRUCIBLE_SANDBOX_BINARY", "/opt/bin/srt", |c| {
                c.sandbox_binary == Some(PathBuf::from("/opt/bin/srt"))
            }),
            ("CRUCIBLE_RUNTIME", "/usr/local/bin/python3.12", |c| {
                c.runtime_path == Some(PathBuf::from("/usr/local/bin/python3.12"))
            }),
        ];
        assert_eq!(cases.len(), ENV_KEYS.len());

        for (key, value, applied) in cases {
            env::set_var(key, value);
            let config = ExecutionConfig::from_env().unwrap();
            env::remove_var(key);
            assert!(applied(&config), "{}={} was not applied", key, value);
        }
    }

    #[test]
    #[serial]
    fn test_every_parsed_env_key_rejects_garbage() {
        clear_env();
        for key in &ENV_KEYS[..6] {
            env::set_var(key, "not-a-value");
            let result = ExecutionConfig::from_env();
            env::remove_var(key);
            match result {
                Err(ConfigError::InvalidValue { key: reported, .. }) => {
                    assert_eq!(reported, *key)
                }
                other => panic!("{}: expected InvalidValue, got {:?}", key, other),
            }
        }
    }

    #[test]
    #[serial]
    fn test_config_from_env_invalid_value() {
        env::set_var("CRUCIBLE_MAX_MEMORY_MB", "lots");

        let result = ExecutionConfig::from_env();
        if let Err(ConfigError::InvalidValue { key, .. }) = &result {
            assert_eq!(key, "CRUCIBLE_MAX_MEMORY_MB");
        } else {
            panic!("expected InvalidValue, got {:?}", result);
        }

        env::remove_var("CRUCIBLE_MAX_MEMORY_MB");
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!(
            "restricted-interpreter".parse::<IsolationMode>().unwrap(),
            IsolationMode::RestrictedInterpreter
        );
        assert_eq!(IsolationMode::OsSandbox.to_string(), "os_sandbox");
        assert!("vm".parse::<IsolationMode>().is_err());
    }
}
