use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

fn parse_duration(input: &str) -> Result<Duration, String> {
    let s = input.trim();
    if s.is_empty() {
        return Err("duration cannot be empty (expected e.g. 30s, 250ms, 2m)".to_string());
    }

    let d = humantime::parse_duration(s)
        .map_err(|err| format!("invalid duration '{s}': {err} (expected e.g. 30s, 250ms, 2m)"))?;
    if d.is_zero() {
        return Err("duration must be positive".to_string());
    }
    Ok(d)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable summary table.
    HumanReadable,
    /// A single JSON summary line on stdout.
    Json,
}

#[derive(Debug, Parser)]
#[command(
    name = "volley",
    author,
    version,
    about = "Open-workload HTTP load generator",
    long_about = "volley injects virtual users on a schedule (all at once or ramped over time), runs each through a scripted sequence of HTTP requests, pauses, loops and random branches, and reports per-request statistics.\n\nWithout a simulation file the built-in link-shortener workload is run.",
    after_help = "Examples:\n  volley run\n  volley run --base-url http://localhost:8080 --max-duration 2m\n  volley run simulation.yaml --seed 7 --output json"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a simulation
    #[command(
        long_about = "Run a simulation described by a YAML file, or the built-in link-shortener workload when no file is given.\n\nCLI flags override values from the file."
    )]
    Run(RunArgs),
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Path to a simulation file (.yaml/.yml)
    pub simulation: Option<PathBuf>,

    /// Base URL of the system under test
    #[arg(long, env = "VOLLEY_BASE_URL")]
    pub base_url: Option<String>,

    /// Hard limit on the run; users still active are cancelled (e.g. 30s, 2m)
    #[arg(long, value_parser = parse_duration)]
    pub max_duration: Option<Duration>,

    /// Seed for pauses and random branches
    #[arg(long)]
    pub seed: Option<u64>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::HumanReadable)]
    pub output: OutputFormat,
}
