use clap::ArgMatches;
use crucible_runtime::prelude::*;
use serde_json::json;
use std::path::Path;
use std::sync::Arc;

use super::read_candidate;

const CLI_TIER: &str = "cli";

pub async fn run(matches: &ArgMatches) -> anyhow::Result<()> {
    let (path, code) = read_candidate(matches)?;

    let config = match matches.get_one::<String>("config") {
        Some(file) => {
            let mut config = ExecutionConfig::from_file(file)?;
            config.apply_env_overrides()?;
            config
        }
        None => ExecutionConfig::from_env()?,
    };
    let engine = Arc::new(IsolationEngine::new(config)?);
    tracing::info!("Testing {} in {} mode", path, engine.mode());

    let candidate_id = Path::new(&path)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.clone());
    let store = Arc::new(InMemoryCandidateStore::with_candidates([Candidate::pending(
        candidate_id.as_str(),
        CLI_TIER,
        code,
    )]));

    let orchestrator_config = OrchestratorConfig {
        variants_per_candidate: matches.get_one::<usize>("variants").copied().unwrap_or(5),
        seed: matches.get_one::<u64>("seed").copied(),
        include_edge_cases: matches.get_flag("edge-cases"),
        tier: CLI_TIER.to_string(),
        ..Default::default()
    };
    let mut orchestrator = TestOrchestrator::new(engine.clone(), store.clone(), orchestrator_config);

    let summary = orchestrator.test_tier(CLI_TIER).await?;
    let report = json!({
        "requested_mode": engine.requested_mode(),
        "mode": engine.mode(),
        "summary": summary,
        "results": store.results_for(&CandidateId::from(candidate_id)),
        "report": orchestrator.generate_learning_report(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
