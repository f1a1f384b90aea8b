//! Everything an embedder needs for a tier run:
//!
//! ```ignore
//! use crucible_runtime::prelude::*;
//! ```

// Configuration
pub use crate::config::{ExecutionConfig, IsolationMode, Language};
pub use crate::orchestrator::OrchestratorConfig;

// Engine
pub use crate::sandbox::{FallbackPolicy, IsolationEngine, SandboxRunner};

// Testing pipeline
pub use crate::orchestrator::{
    Candidate, CandidateOutcome, CandidateStatus, CandidateStore, InMemoryCandidateStore,
    ShutdownHandle, TestOrchestrator,
};
pub use crate::synthesis::InputSynthesizer;
pub use crate::wrapper::{CandidateWrapper, TestOutcome, TestResult};

// Reports
pub use crate::orchestrator::{LearningReport, TestRunSummary, TierRunSummary};

// Errors and identifiers
pub use crate::types::{CandidateId, InputMap, RuntimeError};
