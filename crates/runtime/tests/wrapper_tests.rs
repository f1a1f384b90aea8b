//! Candidate wrapper behaviour end to end.
//!
//! Tests marked as needing python3 return early when it is not installed.

use crucible_runtime::sandbox::process::find_executable;
use crucible_runtime::sandbox::{MockOutcome, MockRunner};
use crucible_runtime::{
    CandidateId, CandidateWrapper, ErrorCategory, ExecutionConfig, InputMap, InputSynthesizer,
    IsolationEngine, IsolationMode, TestOutcome,
};
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

fn python_available() -> bool {
    find_executable(Path::new("python3")).is_some()
}

fn init_logging() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn restricted_wrapper(timeout_seconds: u64) -> Option<CandidateWrapper> {
    restricted_wrapper_with(ExecutionConfig {
        timeout_seconds,
        ..Default::default()
    })
}

fn restricted_wrapper_with(config: ExecutionConfig) -> Option<CandidateWrapper> {
    init_logging();
    if !python_available() {
        // Skip test if python3 not available
        return None;
    }
    let config = ExecutionConfig {
        mode: IsolationMode::RestrictedInterpreter,
        ..config
    };
    Some(CandidateWrapper::new(Arc::new(
        IsolationEngine::new(config).unwrap(),
    )))
}

fn mock_wrapper(timeout_seconds: u64, outcomes: Vec<MockOutcome>) -> CandidateWrapper {
    init_logging();
    let config = ExecutionConfig {
        mode: IsolationMode::Mock,
        timeout_seconds,
        ..Default::default()
    };
    let runner = MockRunner::with_outcomes(Arc::new(config.clone()), outcomes);
    CandidateWrapper::new(Arc::new(IsolationEngine::from_runner(
        config,
        Box::new(runner),
    )))
}

fn params(pairs: &[(&str, serde_json::Value)]) -> InputMap {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

fn id(name: &str) -> CandidateId {
    CandidateId::from(name)
}

#[tokio::test]
async fn test_reserved_variable_round_trip() {
    let Some(mut wrapper) = restricted_wrapper(10) else {
        return;
    };
    let code = "result = {'k': [1, 2.5, 'x'], 'flag': True, 'none': None}\n";
    let result = wrapper
        .execute_candidate(&id("round-trip"), code, &InputMap::new(), None)
        .await;

    assert_eq!(result.outcome, TestOutcome::Success, "stderr: {}", result.stderr);
    assert!(result.output_validation_passed);
    assert_eq!(
        result.output,
        Some(json!({"k": [1, 2.5, "x"], "flag": true, "none": null}))
    );
    assert_eq!(result.output_type.as_deref(), Some("dict"));
}

#[tokio::test]
async fn test_entry_function_called_with_params() {
    let Some(mut wrapper) = restricted_wrapper(10) else {
        return;
    };
    let code = "def add(a: int, b: int) -> int:\n    print('diverted')\n    return a + b\n";
    let result = wrapper
        .execute_candidate(
            &id("add"),
            code,
            &params(&[("a", json!(2)), ("b", json!(40))]),
            Some("int"),
        )
        .await;

    assert!(result.success, "stderr: {}", result.stderr);
    assert_eq!(result.output, Some(json!(42)));
    assert!(result.stderr.contains("diverted"));
    assert_eq!(result.input_params["b"], json!(40));
}

#[tokio::test]
async fn test_wrong_return_type_fails_validation() {
    let Some(mut wrapper) = restricted_wrapper(10) else {
        return;
    };
    let code = "def count(xs: list) -> list:\n    return len(xs)\n";
    let result = wrapper
        .execute_candidate(
            &id("count"),
            code,
            &params(&[("xs", json!([1, 2, 3]))]),
            Some("list"),
        )
        .await;

    assert_eq!(result.outcome, TestOutcome::OutputValidationFailed);
    assert!(!result.success);
    assert!(result.validation_error.is_some());
    assert_eq!(result.error_category, Some(ErrorCategory::Validation));
}

#[tokio::test]
async fn test_wrong_return_type_fails_validation_in_mock_mode() {
    let outcome = MockOutcome::success(
        json!({"output": "text", "output_type": "str", "error": null, "params_used": {}})
            .to_string(),
    );
    let mut wrapper = mock_wrapper(30, vec![outcome]);
    let result = wrapper
        .execute_candidate(&id("m"), "def f():\n    return 'text'\n", &InputMap::new(), Some("list"))
        .await;
    assert_eq!(result.outcome, TestOutcome::OutputValidationFailed);
    assert!(result.validation_error.is_some());
}

#[tokio::test]
async fn test_sleeping_candidate_times_out() {
    let Some(mut wrapper) = restricted_wrapper(2) else {
        return;
    };
    let code = "import time\n\ndef nap(n: int):\n    time.sleep(30)\n    return n\n";
    let result = wrapper
        .execute_candidate(&id("nap"), code, &params(&[("n", json!(0))]), None)
        .await;

    assert_eq!(result.outcome, TestOutcome::Timeout, "stderr: {}", result.stderr);
    assert_eq!(result.error_category, Some(ErrorCategory::Timeout));
    assert!(result.execution_time_ms >= 1_900, "took {}ms", result.execution_time_ms);
    assert!(
        result.execution_time_ms < 2_000 + 3_000,
        "took {}ms",
        result.execution_time_ms
    );
}

#[tokio::test]
async fn test_spinning_candidate_hits_cpu_budget() {
    // 30% of a 10s wall clock leaves a 3s CPU budget
    let Some(mut wrapper) = restricted_wrapper_with(ExecutionConfig {
        timeout_seconds: 10,
        max_cpu_percent: 30.0,
        ..Default::default()
    }) else {
        return;
    };
    let code = "def spin(n: int):\n    while True:\n        n += 1\n";
    let result = wrapper
        .execute_candidate(&id("spin"), code, &params(&[("n", json!(0))]), None)
        .await;

    assert_eq!(result.outcome, TestOutcome::Timeout, "stderr: {}", result.stderr);
    assert_eq!(result.error_category, Some(ErrorCategory::Timeout));
    assert!(
        result.execution_time_ms < 10_000,
        "took {}ms",
        result.execution_time_ms
    );
}

#[tokio::test]
async fn test_optional_return_accepts_none() {
    let Some(mut wrapper) = restricted_wrapper(10) else {
        return;
    };
    let synthesizer = InputSynthesizer::with_seed(7);
    for code in [
        "def find(n: int) -> dict | None:\n    return None\n",
        "from typing import Optional\n\ndef find(n: int) -> Optional[dict]:\n    return None\n",
    ] {
        let expected = synthesizer.get_expected_output_type(code);
        let result = wrapper
            .execute_candidate(&id("find"), code, &params(&[("n", json!(1))]), expected.as_deref())
            .await;
        assert_eq!(result.outcome, TestOutcome::Success, "stderr: {}", result.stderr);
        assert!(result.output_validation_passed);
        assert_eq!(result.output, Some(serde_json::Value::Null));
    }

    // a wrong non-None type is still rejected
    let code = "def find(n: int) -> dict | None:\n    return 'nope'\n";
    let expected = synthesizer.get_expected_output_type(code);
    let result = wrapper
        .execute_candidate(&id("find"), code, &params(&[("n", json!(1))]), expected.as_deref())
        .await;
    assert_eq!(result.outcome, TestOutcome::OutputValidationFailed);
}

#[tokio::test]
async fn test_none_rejected_for_plain_annotation_in_mock_mode() {
    let none = || {
        MockOutcome::success(
            json!({"output": null, "output_type": "NoneType", "error": null, "params_used": {}})
                .to_string(),
        )
    };
    let mut wrapper = mock_wrapper(30, vec![none(), none()]);
    let code = "def f():\n    return None\n";

    let result = wrapper
        .execute_candidate(&id("opt"), code, &InputMap::new(), Some("Optional[dict]"))
        .await;
    assert_eq!(result.outcome, TestOutcome::Success);

    let result = wrapper
        .execute_candidate(&id("plain"), code, &InputMap::new(), Some("dict"))
        .await;
    assert_eq!(result.outcome, TestOutcome::OutputValidationFailed);
}

#[tokio::test]
async fn test_delayed_mock_times_out() {
    let slow = MockOutcome::default().with_delay(Duration::from_secs(10));
    let mut wrapper = mock_wrapper(1, vec![slow]);
    let result = wrapper
        .execute_candidate(&id("slow"), "def f():\n    pass\n", &InputMap::new(), None)
        .await;

    assert_eq!(result.outcome, TestOutcome::Timeout);
    assert!(result.execution_time_ms >= 900, "took {}ms", result.execution_time_ms);
    assert!(result.execution_time_ms < 3_000, "took {}ms", result.execution_time_ms);
}

#[tokio::test]
async fn test_every_hostile_candidate_yields_one_result() {
    let Some(mut wrapper) = restricted_wrapper(5) else {
        return;
    };
    let candidates = [
        ("syntax", "def broken(:\n    pass\n", TestOutcome::SyntaxError),
        ("raise", "def f():\n    raise ValueError('boom')\n", TestOutcome::RuntimeError),
        ("type", "def f():\n    return 1 + 'a'\n", TestOutcome::TypeError),
        ("import", "import os\n", TestOutcome::RuntimeError),
        ("exit", "raise SystemExit(3)\n", TestOutcome::RuntimeError),
        ("private", "result = (1).__class__.__mro__\n", TestOutcome::RuntimeError),
    ];

    for (name, code, expected) in candidates {
        let result = wrapper
            .execute_candidate(&id(name), code, &InputMap::new(), None)
            .await;
        assert_eq!(result.outcome, expected, "{}: stderr {}", name, result.stderr);
        assert!(!result.success);
        assert!(result.error_summary.is_some());
    }
    assert_eq!(wrapper.history().len(), candidates.len());
}

#[tokio::test]
async fn test_garbage_from_executor_is_still_classified() {
    let outcomes = vec![
        MockOutcome::success("not json at all"),
        MockOutcome::success(""),
        MockOutcome::failure(1, "Traceback...\nMemoryError"),
        MockOutcome::failure(137, ""),
        MockOutcome::failure(1, "ModuleNotFoundError: No module named 'numpy'"),
    ];
    let count = outcomes.len();
    let mut wrapper = mock_wrapper(30, outcomes);

    let mut seen = vec![];
    for _ in 0..count {
        let result = wrapper
            .execute_candidate(&id("g"), "def f():\n    pass\n", &InputMap::new(), None)
            .await;
        assert!(!result.success);
        seen.push(result.outcome);
    }
    assert_eq!(
        seen,
        vec![
            TestOutcome::OutputValidationFailed,
            TestOutcome::OutputValidationFailed,
            TestOutcome::ResourceExhaustion,
            TestOutcome::RuntimeError,
            TestOutcome::RuntimeError,
        ]
    );
}

#[tokio::test]
async fn test_repeated_failure_aggregates_into_one_pattern() {
    let Some(mut wrapper) = restricted_wrapper(10) else {
        return;
    };
    let code = "def f(n: int):\n    raise KeyError('missing')\n";
    for n in 0..4 {
        wrapper
            .execute_candidate(&id("k"), code, &params(&[("n", json!(n))]), None)
            .await;
    }
    assert_eq!(wrapper.patterns().len(), 1);
    assert_eq!(wrapper.patterns().top(1)[0].frequency, 4);
}
