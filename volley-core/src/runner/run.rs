use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::task::TaskTracker;
use volley_http::HttpClient;
use volley_metrics::{Aggregator, RunSummary};

use crate::error::{Error, Result};
use crate::http::HttpExecutor;
use crate::injection::InjectionProfile;
use crate::protocol::ProtocolDefaults;
use crate::scenario::Scenario;

use super::admission::Admission;
use super::stop::StopHandle;

/// A scenario paired with the profile that injects its users.
#[derive(Debug, Clone)]
pub struct Population {
    pub scenario: Arc<Scenario>,
    pub profile: InjectionProfile,
}

#[derive(Debug)]
pub struct SimulationBuilder {
    protocol: ProtocolDefaults,
    populations: Vec<Population>,
    max_duration: Option<Duration>,
    seed: Option<u64>,
    client: Option<Arc<HttpClient>>,
}

impl SimulationBuilder {
    #[must_use]
    pub fn population(mut self, scenario: impl Into<Arc<Scenario>>, profile: InjectionProfile) -> Self {
        self.populations.push(Population {
            scenario: scenario.into(),
            profile,
        });
        self
    }

    /// Hard limit on the run; users still active when it elapses are cancelled.
    #[must_use]
    pub fn max_duration(mut self, max_duration: Duration) -> Self {
        self.max_duration = Some(max_duration);
        self
    }

    /// Seed every user's random source for reproducible pauses and branch choices.
    #[must_use]
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    #[must_use]
    pub fn client(mut self, client: Arc<HttpClient>) -> Self {
        self.client = Some(client);
        self
    }

    pub fn build(self) -> Result<Simulation> {
        if self.populations.is_empty() {
            return Err(Error::EmptySimulation);
        }

        let mut seen = HashSet::new();
        for p in &self.populations {
            if !seen.insert(p.scenario.name()) {
                return Err(Error::DuplicateScenario(p.scenario.name().to_string()));
            }
        }

        self.protocol.validate()?;

        Ok(Simulation {
            protocol: Arc::new(self.protocol),
            populations: self.populations,
            max_duration: self.max_duration,
            seed: self.seed,
            client: self.client.unwrap_or_default(),
            stop: StopHandle::new(),
        })
    }
}

/// A validated, ready-to-run set of populations.
#[derive(Debug)]
pub struct Simulation {
    protocol: Arc<ProtocolDefaults>,
    populations: Vec<Population>,
    max_duration: Option<Duration>,
    seed: Option<u64>,
    client: Arc<HttpClient>,
    stop: StopHandle,
}

impl Simulation {
    pub fn builder(protocol: ProtocolDefaults) -> SimulationBuilder {
        SimulationBuilder {
            protocol,
            populations: Vec::new(),
            max_duration: None,
            seed: None,
            client: None,
        }
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn populations(&self) -> &[Population] {
        &self.populations
    }

    pub fn protocol(&self) -> &ProtocolDefaults {
        &self.protocol
    }

    pub fn total_users(&self) -> u64 {
        self.populations
            .iter()
            .map(|p| p.profile.total_users())
            .sum()
    }

    /// Run every population to completion, or until stopped or past `max_duration`.
    pub async fn run(self) -> Result<RunSummary> {
        let aggregator = Arc::new(Aggregator::new());
        for p in &self.populations {
            aggregator.register_scenario(p.scenario.name(), p.profile.total_users());
        }

        let executor = HttpExecutor::new(self.client.clone());
        let cancel = self.stop.token().clone();
        let tracker = TaskTracker::new();
        let next_user_id = Arc::new(AtomicU64::new(1));
        let start = Instant::now();

        tracing::info!(
            populations = self.populations.len(),
            users = self.total_users(),
            max_duration = ?self.max_duration,
            "simulation started"
        );

        let mut admissions = Vec::with_capacity(self.populations.len());
        for (population, p) in self.populations.iter().enumerate() {
            tracing::info!(
                scenario = %p.scenario.name(),
                users = p.profile.total_users(),
                injection = ?p.profile.duration(),
                "scenario started"
            );

            let admission = Admission {
                population,
                schedule: p.profile.schedule(p.scenario.clone()),
                start,
                protocol: self.protocol.clone(),
                executor: executor.clone(),
                aggregator: aggregator.clone(),
                cancel: cancel.clone(),
                tracker: tracker.clone(),
                next_user_id: next_user_id.clone(),
                seed: self.seed,
            };
            admissions.push(tracker.spawn(admission.run()));
        }
        tracker.close();

        let finished = match self.max_duration {
            Some(limit) => tokio::select! {
                _ = tracker.wait() => true,
                _ = tokio::time::sleep_until(start + limit) => false,
            },
            None => {
                tracker.wait().await;
                true
            }
        };

        if !finished {
            tracing::info!("max duration reached, stopping remaining users");
            cancel.cancel();
            tracker.wait().await;
        }

        for handle in admissions {
            handle.await?;
        }

        let elapsed = start.elapsed();
        let summary = aggregator.summary(elapsed);

        for scenario in &summary.scenarios {
            tracing::info!(
                scenario = %scenario.scenario,
                admitted = scenario.users.admitted,
                requests = scenario.requests_total(),
                failed = scenario.requests_failed(),
                "scenario finished"
            );
        }
        tracing::info!(
            requests = summary.requests_total(),
            failed = summary.requests_failed(),
            elapsed = ?elapsed,
            "simulation finished"
        );

        Ok(summary)
    }
}
