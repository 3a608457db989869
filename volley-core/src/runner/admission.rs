use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use rand::SeedableRng;
use rand::rngs::SmallRng;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use volley_metrics::Aggregator;

use crate::http::HttpExecutor;
use crate::injection::Schedule;
use crate::protocol::ProtocolDefaults;

use super::vu::{VuContext, run_user};

/// Starts the users of one population at their scheduled offsets.
pub(crate) struct Admission {
    pub population: usize,
    pub schedule: Schedule,
    pub start: Instant,
    pub protocol: Arc<ProtocolDefaults>,
    pub executor: HttpExecutor,
    pub aggregator: Arc<Aggregator>,
    pub cancel: CancellationToken,
    pub tracker: TaskTracker,
    pub next_user_id: Arc<AtomicU64>,
    pub seed: Option<u64>,
}

impl Admission {
    /// Returns how many users were admitted.
    pub(crate) async fn run(self) -> u64 {
        let Self {
            population,
            schedule,
            start,
            protocol,
            executor,
            aggregator,
            cancel,
            tracker,
            next_user_id,
            seed,
        } = self;

        let mut admitted = 0u64;
        let mut scenario_name: Option<Arc<str>> = None;

        for event in schedule {
            // Absolute deadlines: a late wake-up never shifts later users.
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::debug!(
                        scenario = ?scenario_name.as_deref(),
                        admitted,
                        "admission stopped"
                    );
                    return admitted;
                }
                _ = tokio::time::sleep_until(start + event.offset) => {}
            }

            let scenario = event.scenario;
            let name = scenario.name_arc().clone();
            let user_id = next_user_id.fetch_add(1, Ordering::Relaxed);
            let rng = match seed {
                Some(seed) => SmallRng::seed_from_u64(user_seed(seed, population, event.user)),
                None => SmallRng::from_entropy(),
            };

            aggregator.user_admitted(&name);
            tracing::debug!(
                scenario = %name,
                user = user_id,
                phase = event.phase,
                offset = ?event.offset,
                "user admitted"
            );

            tracker.spawn(run_user(VuContext {
                user_id,
                scenario,
                protocol: protocol.clone(),
                executor: executor.clone(),
                aggregator: aggregator.clone(),
                cancel: cancel.clone(),
                rng,
            }));

            admitted += 1;
            scenario_name = Some(name);
        }

        tracing::debug!(scenario = ?scenario_name.as_deref(), admitted, "admission finished");
        admitted
    }
}

/// Per-user seed; independent of how populations interleave at runtime.
fn user_seed(seed: u64, population: usize, user: u64) -> u64 {
    seed.wrapping_add((population as u64) << 40).wrapping_add(user)
}
