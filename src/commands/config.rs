use anyhow::Context;
use clap::ArgMatches;
use crucible_runtime::ExecutionConfig;

pub fn run(matches: &ArgMatches) -> anyhow::Result<()> {
    let name = matches
        .get_one::<String>("preset")
        .map(String::as_str)
        .unwrap_or("default");
    let config = ExecutionConfig::preset(name).with_context(|| format!("unknown preset '{}'", name))?;

    println!("{}", serde_json::to_string_pretty(&config)?);

    let report = config.validate();
    for warning in &report.warnings {
        eprintln!("warning: {}", warning);
    }
    if !report.is_valid() {
        anyhow::bail!("invalid configuration: {}", report.errors.join("; "));
    }
    Ok(())
}
