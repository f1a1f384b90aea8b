pub mod config;
pub mod inputs;
pub mod run;

use anyhow::Context;
use clap::ArgMatches;

/// Contents of the required `--file` argument
pub fn read_candidate(matches: &ArgMatches) -> anyhow::Result<(String, String)> {
    let path = matches
        .get_one::<String>("file")
        .context("--file is required")?;
    let code = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read candidate file {}", path))?;
    Ok((path.clone(), code))
}
