use clap::{Arg, ArgAction, Command};

mod commands;

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn file_arg() -> Arg {
    Arg::new("file")
        .short('f')
        .long("file")
        .value_name("FILE")
        .help("Candidate source file")
        .required(true)
}

fn variants_arg() -> Arg {
    Arg::new("variants")
        .short('n')
        .long("variants")
        .value_name("N")
        .help("Number of synthesized input variants")
        .value_parser(clap::value_parser!(usize))
        .default_value("5")
}

fn seed_arg() -> Arg {
    Arg::new("seed")
        .short('s')
        .long("seed")
        .value_name("SEED")
        .help("Seed for reproducible input synthesis")
        .value_parser(clap::value_parser!(u64))
}

fn edge_cases_arg() -> Arg {
    Arg::new("edge-cases")
        .long("edge-cases")
        .help("Include empty, large and null edge-case variants")
        .action(ArgAction::SetTrue)
}

fn init_tracing(level: Option<&String>) {
    let filter = match level {
        Some(level) => tracing_subscriber::EnvFilter::new(level),
        None => tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    let matches = Command::new("crucible")
        .version(VERSION)
        .about("Crucible - sandboxed execution and test synthesis for generated code")
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .value_name("LEVEL")
                .help("Log filter, overrides RUST_LOG")
                .global(true),
        )
        .subcommand(
            Command::new("inputs")
                .about("Print synthesized inputs for a candidate without running it")
                .arg(file_arg())
                .arg(variants_arg())
                .arg(seed_arg())
                .arg(edge_cases_arg()),
        )
        .subcommand(
            Command::new("run")
                .about("Execute a candidate against synthesized inputs")
                .arg(file_arg())
                .arg(
                    Arg::new("config")
                        .short('c')
                        .long("config")
                        .value_name("CONFIG")
                        .help("Execution config TOML file; CRUCIBLE_* variables otherwise"),
                )
                .arg(variants_arg())
                .arg(seed_arg())
                .arg(edge_cases_arg()),
        )
        .subcommand(
            Command::new("config")
                .about("Print and validate an execution config")
                .arg(
                    Arg::new("preset")
                        .short('p')
                        .long("preset")
                        .value_name("PRESET")
                        .help("Preset to print")
                        .value_parser(["default", "strict", "permissive"])
                        .default_value("default"),
                ),
        )
        .get_matches();

    init_tracing(matches.get_one::<String>("log-level"));

    let outcome = match matches.subcommand() {
        Some(("inputs", sub_matches)) => commands::inputs::run(sub_matches),
        Some(("run", sub_matches)) => commands::run::run(sub_matches).await,
        Some(("config", sub_matches)) => commands::config::run(sub_matches),
        _ => {
            println!("Crucible v{}", VERSION);
            println!("Use --help for available commands");
            Ok(())
        }
    };

    if let Err(e) = outcome {
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}
