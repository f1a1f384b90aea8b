//! Error types for the Crucible runtime

use std::path::PathBuf;
use thiserror::Error;

use super::CandidateId;
use crate::config::{IsolationMode, Language};

/// Main runtime error type
#[derive(Error, Debug, Clone)]
pub enum RuntimeError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("Sandbox error: {0}")]
    Sandbox(#[from] SandboxError),

    #[error("Synthesis error: {0}")]
    Synthesis(#[from] SynthesisError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Orchestrator error: {0}")]
    Orchestrator(#[from] OrchestratorError),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Configuration-related errors
#[derive(Error, Debug, Clone)]
pub enum ConfigError {
    #[error("Invalid configuration: {}", .0.join("; "))]
    Invalid(Vec<String>),

    #[error("Invalid configuration value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("IO error reading config file {path}: {message}")]
    Io { path: PathBuf, message: String },

    #[error("Configuration parsing error: {message}")]
    Parse { message: String },
}

/// Isolation executor errors.
///
/// These describe failures of the isolation machinery itself. Failures of the
/// code being executed are reported through `ExecutionResult`, never here.
#[derive(Error, Debug, Clone)]
pub enum SandboxError {
    #[error("isolation binary not found (searched: {})", .searched.join(", "))]
    BinaryNotFound { searched: Vec<String> },

    #[error("language runtime '{runtime}' not found for {language}")]
    RuntimeNotFound { language: Language, runtime: String },

    #[error("{language} is not supported in {mode} mode")]
    UnsupportedLanguage { language: Language, mode: IsolationMode },

    #[error("no usable isolation mode: {0}")]
    NoUsableMode(String),

    #[error("scratch directory error: {0}")]
    Scratch(String),

    #[error("failed to spawn '{program}': {reason}")]
    Spawn { program: String, reason: String },

    #[error("failed to wait on child process: {0}")]
    Wait(String),

    #[error("failed to serialize sandbox settings: {0}")]
    Settings(String),
}

/// Input synthesis errors
#[derive(Error, Debug, Clone)]
pub enum SynthesisError {
    #[error("failed to initialise parser: {0}")]
    ParserInit(String),

    #[error("failed to parse candidate source")]
    ParseFailed,
}

/// Errors surfaced by a candidate store implementation
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    #[error("Candidate not found: {0}")]
    NotFound(CandidateId),

    #[error("Store backend error: {0}")]
    Backend(String),
}

/// Errors raised while processing a single candidate inside a tier run.
///
/// They are recorded against the candidate and never abort the population loop.
#[derive(Error, Debug, Clone)]
pub enum OrchestratorError {
    #[error("candidate {0} has no code")]
    MissingCode(CandidateId),

    #[error("candidate {id} could not be prepared: {reason}")]
    Preparation { id: CandidateId, reason: String },

    #[error("candidate {id} panicked during processing: {message}")]
    Panicked { id: CandidateId, message: String },

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}
