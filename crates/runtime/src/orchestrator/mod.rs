//! Test orchestrator
//!
//! Pulls pending candidates from the store, runs their synthesized variants
//! through the wrapper and writes the verdict back. One candidate going wrong,
//! including a panic, never stops the rest of the population.

pub mod report;
pub mod shutdown;
pub mod store;

use chrono::Utc;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::sandbox::IsolationEngine;
use crate::synthesis::InputSynthesizer;
use crate::types::{InputMap, OrchestratorError};
use crate::wrapper::{CandidateWrapper, TestResult};

pub use report::{CandidateRunSummary, LearningReport, Recommendation, TestRunSummary, TierRunSummary};
pub use shutdown::ShutdownHandle;
pub use store::{Candidate, CandidateOutcome, CandidateStatus, CandidateStore, InMemoryCandidateStore};

/// Orchestrator settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Synthesized variants run per candidate
    pub variants_per_candidate: usize,
    /// Seed for input synthesis; random per call when unset
    pub seed: Option<u64>,
    /// Also run the edge-case variants during tier runs
    pub include_edge_cases: bool,
    /// Tier tested by the continuous loop
    pub tier: String,
    /// Pause between continuous iterations, in seconds
    pub interval_seconds: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            variants_per_candidate: 5,
            seed: None,
            include_edge_cases: false,
            tier: "speculative".to_string(),
            interval_seconds: 300,
        }
    }
}

impl OrchestratorConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }
}

pub struct TestOrchestrator {
    store: Arc<dyn CandidateStore>,
    wrapper: CandidateWrapper,
    synthesizer: InputSynthesizer,
    config: OrchestratorConfig,
}

impl TestOrchestrator {
    pub fn new(
        engine: Arc<IsolationEngine>,
        store: Arc<dyn CandidateStore>,
        config: OrchestratorConfig,
    ) -> Self {
        let synthesizer = match config.seed {
            Some(seed) => InputSynthesizer::with_seed(seed),
            None => InputSynthesizer::new(),
        };
        Self {
            store,
            wrapper: CandidateWrapper::new(engine),
            synthesizer,
            config,
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn wrapper(&self) -> &CandidateWrapper {
        &self.wrapper
    }

    pub fn history(&self) -> &[TestResult] {
        self.wrapper.history()
    }

    /// Test every `pending_test` candidate at `tier`.
    ///
    /// Only the initial store query can fail; per-candidate problems are
    /// recorded in the summary.
    pub async fn test_tier(&mut self, tier: &str) -> Result<TierRunSummary, OrchestratorError> {
        let started_at = Utc::now();
        let start = Instant::now();

        let pending: Vec<Candidate> = self
            .store
            .get_by_tier(tier)
            .await?
            .into_iter()
            .filter(Candidate::is_pending)
            .collect();

        tracing::info!("Testing {} pending candidate(s) in tier {}", pending.len(), tier);

        let mut candidates = Vec::with_capacity(pending.len());
        for candidate in pending {
            let processed = AssertUnwindSafe(self.process_candidate(&candidate))
                .catch_unwind()
                .await;

            let summary = match processed {
                Ok(Ok(summary)) => summary,
                Ok(Err(e)) => {
                    tracing::warn!("Candidate {} failed: {}", candidate.id, e);
                    self.mark_failed(candidate, e).await
                }
                Err(panic) => {
                    let error = OrchestratorError::Panicked {
                        id: candidate.id.clone(),
                        message: panic_message(panic.as_ref()),
                    };
                    tracing::error!("{}", error);
                    self.mark_failed(candidate, error).await
                }
            };
            candidates.push(summary);
        }

        let summary = TierRunSummary {
            tier: tier.to_string(),
            started_at,
            duration_ms: start.elapsed().as_millis() as u64,
            candidates,
        };
        tracing::info!(
            "Tier {} done: {}/{} candidate(s) passed in {}ms",
            tier,
            summary.passed(),
            summary.total(),
            summary.duration_ms
        );
        Ok(summary)
    }

    /// Run only the edge-case variants against one candidate, without writing back
    pub async fn test_candidate_edge_cases(
        &mut self,
        candidate: &Candidate,
    ) -> Result<Vec<TestResult>, OrchestratorError> {
        if candidate.code.trim().is_empty() {
            return Err(OrchestratorError::MissingCode(candidate.id.clone()));
        }
        let variants = self
            .synthesizer
            .generate_edge_case_inputs(&candidate.code)
            .map_err(|e| OrchestratorError::Preparation {
                id: candidate.id.clone(),
                reason: e.to_string(),
            })?;
        let expected = self.synthesizer.get_expected_output_type(&candidate.code);

        let mut results = Vec::with_capacity(variants.len());
        for variant in variants {
            tracing::debug!("Edge case {} for candidate {}", variant.kind, candidate.id);
            results.push(
                self.wrapper
                    .execute_candidate(
                        &candidate.id,
                        &candidate.code,
                        &variant.inputs,
                        expected.as_deref(),
                    )
                    .await,
            );
        }
        Ok(results)
    }

    pub fn compute_statistics(&self) -> TestRunSummary {
        TestRunSummary::from_history(self.wrapper.history(), self.wrapper.patterns())
    }

    pub fn generate_learning_report(&self) -> LearningReport {
        LearningReport::build(self.wrapper.history(), self.wrapper.patterns())
    }

    /// Call `test_tier` on the configured tier until `max_iterations` or shutdown.
    ///
    /// Shutdown is checked before each iteration and interrupts the pause
    /// between iterations, never a running candidate.
    pub async fn run_continuous(
        &mut self,
        interval: Option<Duration>,
        max_iterations: Option<usize>,
        shutdown: &ShutdownHandle,
    ) -> Vec<TierRunSummary> {
        let interval = interval.unwrap_or_else(|| self.config.interval());
        let tier = self.config.tier.clone();
        let mut runs = vec![];
        let mut iteration = 0usize;

        loop {
            if shutdown.is_shutdown() {
                tracing::info!("Continuous testing stopped after {} iteration(s)", iteration);
                break;
            }
            if max_iterations.is_some_and(|max| iteration >= max) {
                tracing::info!("Continuous testing reached {} iteration(s)", iteration);
                break;
            }
            iteration += 1;

            match self.test_tier(&tier).await {
                Ok(summary) => runs.push(summary),
                Err(e) => tracing::error!("Iteration {} failed: {}", iteration, e),
            }

            if max_iterations.is_some_and(|max| iteration >= max) {
                continue;
            }
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = shutdown.wait() => {}
            }
        }

        runs
    }

    async fn process_candidate(
        &mut self,
        candidate: &Candidate,
    ) -> Result<CandidateRunSummary, OrchestratorError> {
        if candidate.code.trim().is_empty() {
            return Err(OrchestratorError::MissingCode(candidate.id.clone()));
        }

        let inputs = self.variants_for(candidate)?;
        let expected = self.synthesizer.get_expected_output_type(&candidate.code);

        let mut results = Vec::with_capacity(inputs.len());
        for params in &inputs {
            results.push(
                self.wrapper
                    .execute_candidate(&candidate.id, &candidate.code, params, expected.as_deref())
                    .await,
            );
        }

        let failed = results.iter().filter(|r| !r.success).count();
        let error = (failed > 0).then(|| format!("{}/{} variants failed", failed, results.len()));
        let outcome = if failed == 0 {
            CandidateOutcome::Success
        } else {
            CandidateOutcome::Failure
        };

        if let Err(e) = self.store.record_results(&candidate.id, &results).await {
            tracing::warn!("Failed to record results for {}: {}", candidate.id, e);
        }

        let mut updated = candidate.clone();
        updated.mark_tested(outcome, error.clone());
        self.write_back(&updated).await;

        tracing::debug!(
            "Candidate {} tested: {} variant(s), {} failed",
            candidate.id,
            results.len(),
            failed
        );

        Ok(CandidateRunSummary {
            candidate_id: candidate.id.clone(),
            success: failed == 0,
            variants: results.len(),
            failed_variants: failed,
            error,
        })
    }

    fn variants_for(&self, candidate: &Candidate) -> Result<Vec<InputMap>, OrchestratorError> {
        let preparation = |e: crate::types::SynthesisError| OrchestratorError::Preparation {
            id: candidate.id.clone(),
            reason: e.to_string(),
        };

        let mut inputs = self
            .synthesizer
            .generate_test_inputs(&candidate.code, self.config.variants_per_candidate)
            .map_err(preparation)?;
        if self.config.include_edge_cases {
            inputs.extend(
                self.synthesizer
                    .generate_edge_case_inputs(&candidate.code)
                    .map_err(preparation)?
                    .into_iter()
                    .map(|v| v.inputs),
            );
        }
        Ok(inputs)
    }

    async fn mark_failed(&self, candidate: Candidate, error: OrchestratorError) -> CandidateRunSummary {
        let message = error.to_string();
        let mut updated = candidate;
        updated.mark_tested(CandidateOutcome::Failure, Some(message.clone()));
        self.write_back(&updated).await;

        CandidateRunSummary {
            candidate_id: updated.id,
            success: false,
            variants: 0,
            failed_variants: 0,
            error: Some(message),
        }
    }

    /// Persist a candidate; failures and panics in the store are only logged
    async fn write_back(&self, candidate: &Candidate) {
        match AssertUnwindSafe(self.store.update(candidate))
            .catch_unwind()
            .await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!("Write-back failed for {}: {}", candidate.id, e),
            Err(panic) => tracing::error!(
                "Write-back panicked for {}: {}",
                candidate.id,
                panic_message(panic.as_ref())
            ),
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ExecutionConfig, IsolationMode};
    use crate::sandbox::{MockOutcome, MockRunner};
    use crate::types::CandidateId;
    use serde_json::json;

    fn engine_with(outcomes: Vec<MockOutcome>) -> Arc<IsolationEngine> {
        let config = ExecutionConfig {
            mode: IsolationMode::Mock,
            ..Default::default()
        };
        let runner = MockRunner::with_outcomes(Arc::new(config.clone()), outcomes);
        Arc::new(IsolationEngine::from_runner(config, Box::new(runner)))
    }

    fn error_line(kind: &str, message: &str) -> MockOutcome {
        MockOutcome::success(
            json!({
                "output": null,
                "error": {"type": kind, "message": message, "traceback": ""},
                "params_used": {}
            })
            .to_string(),
        )
    }

    fn config(variants: usize) -> OrchestratorConfig {
        OrchestratorConfig {
            variants_per_candidate: variants,
            seed: Some(7),
            ..Default::default()
        }
    }

    const CODE: &str = "def f(n: int):\n    return n\n";

    #[tokio::test]
    async fn test_tier_marks_candidates_tested() {
        let store = Arc::new(InMemoryCandidateStore::with_candidates([
            Candidate::pending("a", "viable", CODE),
            Candidate::pending("b", "archive", CODE),
        ]));
        let mut orchestrator = TestOrchestrator::new(engine_with(vec![]), store.clone(), config(3));

        let summary = orchestrator.test_tier("viable").await.unwrap();
        assert_eq!(summary.total(), 1);
        assert_eq!(summary.passed(), 1);
        assert_eq!(summary.variants_run(), 3);

        let a = store.get(&CandidateId::from("a")).await.unwrap().unwrap();
        assert_eq!(a.status, CandidateStatus::Tested);
        assert_eq!(a.test_outcome, Some(CandidateOutcome::Success));
        assert_eq!(a.test_error, None);
        assert_eq!(store.results_for(&a.id).len(), 3);

        let b = store.get(&CandidateId::from("b")).await.unwrap().unwrap();
        assert!(b.is_pending());
    }

    #[tokio::test]
    async fn test_partial_failure_reports_fraction() {
        let store = Arc::new(InMemoryCandidateStore::with_candidates([Candidate::pending(
            "a", "viable", CODE,
        )]));
        let outcomes = vec![
            MockOutcome::default(),
            error_line("ValueError", "bad"),
            MockOutcome::default(),
        ];
        let mut orchestrator = TestOrchestrator::new(engine_with(outcomes), store.clone(), config(3));

        let summary = orchestrator.test_tier("viable").await.unwrap();
        let a = &summary.candidates[0];
        assert!(!a.success);
        assert_eq!(a.failed_variants, 1);
        assert_eq!(a.error.as_deref(), Some("1/3 variants failed"));

        let stored = store.get(&CandidateId::from("a")).await.unwrap().unwrap();
        assert_eq!(stored.test_outcome, Some(CandidateOutcome::Failure));
        assert_eq!(stored.test_error.as_deref(), Some("1/3 variants failed"));
    }

    #[tokio::test]
    async fn test_tested_candidates_not_retested() {
        let mut done = Candidate::pending("a", "viable", CODE);
        done.mark_tested(CandidateOutcome::Success, None);
        let store = Arc::new(InMemoryCandidateStore::with_candidates([done]));
        let mut orchestrator = TestOrchestrator::new(engine_with(vec![]), store, config(2));

        let summary = orchestrator.test_tier("viable").await.unwrap();
        assert_eq!(summary.total(), 0);
        assert!(orchestrator.history().is_empty());
    }

    #[tokio::test]
    async fn test_missing_code_marked_failed() {
        let store = Arc::new(InMemoryCandidateStore::with_candidates([
            Candidate::pending("empty", "viable", "   "),
            Candidate::pending("ok", "viable", CODE),
        ]));
        let mut orchestrator = TestOrchestrator::new(engine_with(vec![]), store.clone(), config(2));

        let summary = orchestrator.test_tier("viable").await.unwrap();
        assert_eq!(summary.total(), 2);
        let empty = summary.candidate(&CandidateId::from("empty")).unwrap();
        assert!(!empty.success);
        assert!(empty.error.as_deref().unwrap().contains("no code"));
        assert!(summary.candidate(&CandidateId::from("ok")).unwrap().success);

        let stored = store.get(&CandidateId::from("empty")).await.unwrap().unwrap();
        assert_eq!(stored.status, CandidateStatus::Tested);
        assert_eq!(stored.test_outcome, Some(CandidateOutcome::Failure));
    }

    #[tokio::test]
    async fn test_write_back_failure_does_not_stop_run() {
        let store = Arc::new(InMemoryCandidateStore::with_candidates([
            Candidate::pending("a", "viable", CODE),
            Candidate::pending("b", "viable", CODE),
        ]));
        store.fail_updates_for("a");
        let mut orchestrator = TestOrchestrator::new(engine_with(vec![]), store.clone(), config(1));

        let summary = orchestrator.test_tier("viable").await.unwrap();
        assert_eq!(summary.passed(), 2);
        assert!(store.get(&CandidateId::from("a")).await.unwrap().unwrap().is_pending());
        assert!(!store.get(&CandidateId::from("b")).await.unwrap().unwrap().is_pending());
    }

    #[tokio::test]
    async fn test_edge_cases_do_not_write_back() {
        let candidate = Candidate::pending("a", "viable", "def f(a: list, b: str):\n    return a\n");
        let store = Arc::new(InMemoryCandidateStore::with_candidates([candidate.clone()]));
        let mut orchestrator = TestOrchestrator::new(engine_with(vec![]), store.clone(), config(1));

        let results = orchestrator.test_candidate_edge_cases(&candidate).await.unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].input_params["a"], json!([]));
        assert!(store.get(&candidate.id).await.unwrap().unwrap().is_pending());
    }

    #[tokio::test]
    async fn test_statistics_and_report() {
        let store = Arc::new(InMemoryCandidateStore::with_candidates([Candidate::pending(
            "a", "viable", CODE,
        )]));
        let outcomes = vec![
            error_line("SyntaxError", "invalid syntax"),
            error_line("SyntaxError", "invalid syntax"),
        ];
        let mut orchestrator = TestOrchestrator::new(engine_with(outcomes), store, config(2));
        assert!(orchestrator.generate_learning_report().note.is_some());

        orchestrator.test_tier("viable").await.unwrap();
        let stats = orchestrator.compute_statistics();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.failed, 2);

        let report = orchestrator.generate_learning_report();
        assert_eq!(report.top_patterns.len(), 1);
        assert_eq!(report.top_patterns[0].frequency, 2);
        assert_eq!(report.recommendations.len(), 1);
    }

    #[tokio::test]
    async fn test_continuous_respects_iteration_cap() {
        let store = Arc::new(InMemoryCandidateStore::new());
        let mut orchestrator = TestOrchestrator::new(engine_with(vec![]), store, config(1));
        let runs = orchestrator
            .run_continuous(Some(Duration::from_millis(10)), Some(3), &ShutdownHandle::new())
            .await;
        assert_eq!(runs.len(), 3);
    }

    #[tokio::test]
    async fn test_continuous_stops_on_shutdown() {
        let store = Arc::new(InMemoryCandidateStore::new());
        let mut orchestrator = TestOrchestrator::new(engine_with(vec![]), store, config(1));
        let shutdown = ShutdownHandle::new();

        let trigger = {
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                shutdown.shutdown();
            })
        };

        let runs = tokio::time::timeout(
            Duration::from_secs(5),
            orchestrator.run_continuous(Some(Duration::from_secs(60)), None, &shutdown),
        )
        .await
        .unwrap();
        trigger.await.unwrap();
        assert_eq!(runs.len(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_before_start_runs_nothing() {
        let store = Arc::new(InMemoryCandidateStore::new());
        let mut orchestrator = TestOrchestrator::new(engine_with(vec![]), store, config(1));
        let shutdown = ShutdownHandle::new();
        shutdown.shutdown();
        let runs = orchestrator.run_continuous(None, Some(5), &shutdown).await;
        assert!(runs.is_empty());
    }
}
