use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt as _;
use rand::rngs::SmallRng;
use tokio_util::sync::CancellationToken;
use volley_metrics::{Aggregator, UserOutcome};

use crate::http::HttpExecutor;
use crate::protocol::ProtocolDefaults;
use crate::scenario::Scenario;
use crate::session::Session;

use super::interpreter;

/// Everything one virtual user needs. Owned by the user's task.
pub(crate) struct VuContext {
    pub user_id: u64,
    pub scenario: Arc<Scenario>,
    pub protocol: Arc<ProtocolDefaults>,
    pub executor: HttpExecutor,
    pub aggregator: Arc<Aggregator>,
    pub cancel: CancellationToken,
    pub rng: SmallRng,
}

pub(crate) async fn run_user(mut ctx: VuContext) -> UserOutcome {
    let mut session = Session::new(ctx.user_id, ctx.scenario.name_arc().clone());

    // A panicking action or body closure ends this user only.
    let result = AssertUnwindSafe(interpreter::run_steps(&mut ctx, &mut session))
        .catch_unwind()
        .await;
    let outcome = match result {
        Ok(outcome) => outcome,
        Err(payload) => {
            tracing::warn!(
                scenario = %ctx.scenario.name(),
                user = ctx.user_id,
                error = %panic_message(&*payload),
                "user aborted"
            );
            UserOutcome::Aborted
        }
    };

    tracing::trace!(
        scenario = %ctx.scenario.name(),
        user = ctx.user_id,
        outcome = %outcome,
        "user finished"
    );
    ctx.aggregator.user_finished(ctx.scenario.name(), outcome);
    outcome
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "panic"
    }
}
