//! Crucible Runtime
//!
//! Sandboxed execution and input synthesis for automatically generated code
//! candidates. Candidates are pulled from a store, run against synthesized
//! inputs under an isolation engine, classified, and aggregated into failure
//! patterns that feed back into generation.

pub mod config;
pub mod orchestrator;
pub mod prelude;
pub mod sandbox;
pub mod synthesis;
pub mod types;
pub mod wrapper;

// Re-export commonly used types
pub use config::{ExecutionConfig, IsolationMode, Language, ResourceLimits, SecurityPolicy};
pub use orchestrator::{
    Candidate, CandidateStore, InMemoryCandidateStore, LearningReport, OrchestratorConfig,
    ShutdownHandle, TestOrchestrator, TestRunSummary, TierRunSummary,
};
pub use sandbox::{ExecutionRequest, ExecutionResult, FallbackPolicy, IsolationEngine, SandboxRunner};
pub use synthesis::{EdgeCaseKind, EdgeCaseVariant, InputSynthesizer, ParameterDescriptor, TypeTag};
pub use types::*;
pub use wrapper::{CandidateWrapper, ErrorCategory, FailurePattern, TestOutcome, TestResult};
