//! Candidate store boundary
//!
//! The store is owned elsewhere. The orchestrator reads `id`, `code`, `tier`
//! and `status`, and writes status, outcome, error text and timestamp.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::types::{CandidateId, StoreError};
use crate::wrapper::TestResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateStatus {
    PendingTest,
    Tested,
}

impl std::fmt::Display for CandidateStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CandidateStatus::PendingTest => write!(f, "pending_test"),
            CandidateStatus::Tested => write!(f, "tested"),
        }
    }
}

/// Verdict written back once a candidate has been tested
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateOutcome {
    Success,
    Failure,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: CandidateId,
    pub code: String,
    pub tier: String,
    pub status: CandidateStatus,
    pub test_outcome: Option<CandidateOutcome>,
    pub test_error: Option<String>,
    pub test_timestamp: Option<DateTime<Utc>>,
}

impl Candidate {
    /// A fresh candidate awaiting its first test
    pub fn pending(id: impl Into<CandidateId>, tier: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            code: code.into(),
            tier: tier.into(),
            status: CandidateStatus::PendingTest,
            test_outcome: None,
            test_error: None,
            test_timestamp: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == CandidateStatus::PendingTest
    }

    /// Move to `Tested`; never goes back to pending
    pub fn mark_tested(&mut self, outcome: CandidateOutcome, error: Option<String>) {
        self.status = CandidateStatus::Tested;
        self.test_outcome = Some(outcome);
        self.test_error = error;
        self.test_timestamp = Some(Utc::now());
    }
}

/// Persistence boundary consumed by the orchestrator
#[async_trait]
pub trait CandidateStore: Send + Sync {
    /// All candidates at `tier`, whatever their status
    async fn get_by_tier(&self, tier: &str) -> Result<Vec<Candidate>, StoreError>;

    async fn get(&self, id: &CandidateId) -> Result<Option<Candidate>, StoreError>;

    /// Persist the candidate's current fields
    async fn update(&self, candidate: &Candidate) -> Result<(), StoreError>;

    /// Receive the per-variant results of one candidate
    async fn record_results(
        &self,
        _id: &CandidateId,
        _results: &[TestResult],
    ) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Map-backed store for tests and embedders
#[derive(Debug, Default)]
pub struct InMemoryCandidateStore {
    candidates: RwLock<Vec<Candidate>>,
    results: RwLock<HashMap<CandidateId, Vec<TestResult>>>,
    failing_updates: RwLock<HashSet<CandidateId>>,
}

impl InMemoryCandidateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_candidates(candidates: impl IntoIterator<Item = Candidate>) -> Self {
        let store = Self::new();
        *store.candidates.write() = candidates.into_iter().collect();
        store
    }

    /// Insert or replace by id, keeping insertion order
    pub fn insert(&self, candidate: Candidate) {
        let mut candidates = self.candidates.write();
        match candidates.iter_mut().find(|c| c.id == candidate.id) {
            Some(existing) => *existing = candidate,
            None => candidates.push(candidate),
        }
    }

    /// Make every later `update` of `id` fail with a backend error
    pub fn fail_updates_for(&self, id: impl Into<CandidateId>) {
        self.failing_updates.write().insert(id.into());
    }

    pub fn snapshot(&self) -> Vec<Candidate> {
        self.candidates.read().clone()
    }

    /// Results recorded for `id` so far
    pub fn results_for(&self, id: &CandidateId) -> Vec<TestResult> {
        self.results.read().get(id).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl CandidateStore for InMemoryCandidateStore {
    async fn get_by_tier(&self, tier: &str) -> Result<Vec<Candidate>, StoreError> {
        Ok(self
            .candidates
            .read()
            .iter()
            .filter(|c| c.tier == tier)
            .cloned()
            .collect())
    }

    async fn get(&self, id: &CandidateId) -> Result<Option<Candidate>, StoreError> {
        Ok(self.candidates.read().iter().find(|c| &c.id == id).cloned())
    }

    async fn update(&self, candidate: &Candidate) -> Result<(), StoreError> {
        if self.failing_updates.read().contains(&candidate.id) {
            return Err(StoreError::Backend(format!(
                "update rejected for {}",
                candidate.id
            )));
        }
        let mut candidates = self.candidates.write();
        let existing = candidates
            .iter_mut()
            .find(|c| c.id == candidate.id)
            .ok_or_else(|| StoreError::NotFound(candidate.id.clone()))?;
        *existing = candidate.clone();
        Ok(())
    }

    async fn record_results(
        &self,
        id: &CandidateId,
        results: &[TestResult],
    ) -> Result<(), StoreError> {
        self.results
            .write()
            .entry(id.clone())
            .or_default()
            .extend_from_slice(results);
        Ok(())
    }
}
