use clap::ArgMatches;
use crucible_runtime::InputSynthesizer;
use serde_json::json;

use super::read_candidate;

pub fn run(matches: &ArgMatches) -> anyhow::Result<()> {
    let (_, code) = read_candidate(matches)?;
    let variants = matches.get_one::<usize>("variants").copied().unwrap_or(5);
    let synthesizer = match matches.get_one::<u64>("seed") {
        Some(seed) => InputSynthesizer::with_seed(*seed),
        None => InputSynthesizer::new(),
    };

    let parameters = synthesizer.extract_parameters(&code)?;
    let inputs = synthesizer.generate_test_inputs(&code, variants)?;
    let edge_cases = if matches.get_flag("edge-cases") {
        synthesizer.generate_edge_case_inputs(&code)?
    } else {
        vec![]
    };

    let report = json!({
        "parameters": parameters,
        "expected_output_type": synthesizer.get_expected_output_type(&code),
        "variants": inputs,
        "edge_cases": edge_cases,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
