use anyhow::Context as _;
use std::time::Duration;

use volley_core::{InjectionProfile, ProtocolDefaults, Scenario, Simulation};

use crate::cli::RunArgs;
use crate::exit_codes::ExitCode;
use crate::output;
use crate::run_error::RunError;
use crate::{links, simulation_yaml};

pub(crate) const DEFAULT_BASE_URL: &str = "http://localhost:8080";

/// Everything needed to build a [`Simulation`], before CLI overrides are applied.
#[derive(Debug)]
pub(crate) struct SimulationPlan {
    pub protocol: ProtocolDefaults,
    pub max_duration: Option<Duration>,
    pub seed: Option<u64>,
    pub populations: Vec<(Scenario, InjectionProfile)>,
}

pub async fn run(args: RunArgs) -> Result<ExitCode, RunError> {
    let out = output::formatter(args.output);

    let plan = match &args.simulation {
        Some(path) => simulation_yaml::load_simulation_from_yaml(path)
            .await
            .map_err(RunError::InvalidInput)?,
        None => links::simulation()
            .context("failed to build the built-in link simulation")
            .map_err(RunError::RuntimeError)?,
    };

    let simulation = build_simulation(plan, &args)?;

    let base_url = simulation
        .protocol()
        .base_url_str()
        .unwrap_or(DEFAULT_BASE_URL)
        .to_string();
    out.print_header(&base_url, simulation.populations());

    let stop = simulation.stop_handle();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted, cancelling active users");
            stop.stop();
        }
    });

    let result = simulation.run().await;
    ctrl_c.abort();
    let summary = result.map_err(RunError::from)?;

    out.print_summary(&summary).map_err(RunError::RuntimeError)?;

    Ok(ExitCode::from_failed_requests(summary.requests_failed()))
}

fn resolve_protocol(protocol: ProtocolDefaults, base_url_flag: Option<&str>) -> ProtocolDefaults {
    match base_url_flag {
        Some(url) => protocol.base_url(url),
        None if protocol.base_url_str().is_none() => protocol.base_url(DEFAULT_BASE_URL),
        None => protocol,
    }
}

fn build_simulation(plan: SimulationPlan, args: &RunArgs) -> Result<Simulation, RunError> {
    let SimulationPlan {
        protocol,
        max_duration,
        seed,
        populations,
    } = plan;

    let protocol = resolve_protocol(protocol, args.base_url.as_deref());

    let mut builder = Simulation::builder(protocol);
    for (scenario, profile) in populations {
        builder = builder.population(scenario, profile);
    }
    if let Some(d) = args.max_duration.or(max_duration) {
        builder = builder.max_duration(d);
    }
    if let Some(seed) = args.seed.or(seed) {
        builder = builder.seed(seed);
    }

    Ok(builder.build()?)
}
