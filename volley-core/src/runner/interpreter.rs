use tokio::task::yield_now;
use tokio::time::sleep;
use volley_metrics::UserOutcome;

use crate::http::ResolvedRequest;
use crate::scenario::{FailurePolicy, Step};
use crate::session::Session;

use super::vu::VuContext;

/// Consecutive non-suspending steps a user may run before yielding to the runtime.
const SYNC_STEPS_PER_YIELD: u32 = 64;

enum Frame<'a> {
    Sequence {
        steps: &'a [Step],
        next: usize,
    },
    Loop {
        steps: &'a [Step],
        counter: Option<&'a str>,
        times: u64,
        iteration: u64,
        next: usize,
    },
}

impl<'a> Frame<'a> {
    fn next_step(&mut self, session: &mut Session) -> Option<&'a Step> {
        match self {
            Self::Sequence { steps, next } => {
                let steps: &'a [Step] = *steps;
                let step = steps.get(*next)?;
                *next += 1;
                Some(step)
            }
            Self::Loop {
                steps,
                counter,
                times,
                iteration,
                next,
            } => {
                let steps: &'a [Step] = *steps;
                if steps.is_empty() {
                    return None;
                }
                while *iteration < *times {
                    if *next == 0
                        && let Some(counter) = *counter
                    {
                        session.set(counter, i64::try_from(*iteration).unwrap_or(i64::MAX));
                    }
                    if let Some(step) = steps.get(*next) {
                        *next += 1;
                        return Some(step);
                    }
                    *iteration += 1;
                    *next = 0;
                }
                None
            }
        }
    }
}

/// Walk the scenario's step tree for one user.
///
/// Uses an explicit frame stack so nesting depth never grows the future.
pub(crate) async fn run_steps(ctx: &mut VuContext, session: &mut Session) -> UserOutcome {
    let scenario = ctx.scenario.clone();
    let mut stack: Vec<Frame<'_>> = vec![Frame::Sequence {
        steps: scenario.steps(),
        next: 0,
    }];
    let mut sync_steps = 0u32;

    while let Some(frame) = stack.last_mut() {
        let Some(step) = frame.next_step(session) else {
            stack.pop();
            continue;
        };

        if ctx.cancel.is_cancelled() {
            return UserOutcome::Cancelled;
        }

        let suspends = matches!(step, Step::Request(_) | Step::Pause(_));

        match step {
            Step::Action { name, func } => {
                if let Err(err) = func(session) {
                    tracing::warn!(
                        scenario = %scenario.name(),
                        user = session.user_id(),
                        action = %name,
                        error = %err,
                        "user aborted"
                    );
                    return UserOutcome::Aborted;
                }
            }
            Step::Request(request) => {
                let resolved = match ResolvedRequest::resolve(request, &ctx.protocol, session) {
                    Ok(r) => r,
                    Err(err) => {
                        tracing::warn!(
                            scenario = %scenario.name(),
                            user = session.user_id(),
                            step = %request.name,
                            error = %err,
                            "user aborted"
                        );
                        return UserOutcome::Aborted;
                    }
                };

                let outcome = ctx
                    .executor
                    .execute(
                        scenario.name_arc(),
                        resolved,
                        &request.checks,
                        &request.extracts,
                        session,
                    )
                    .await;
                let failed = !outcome.passed();
                ctx.aggregator.record(outcome);

                if failed && scenario.failure_policy() == FailurePolicy::HaltUser {
                    tracing::debug!(
                        scenario = %scenario.name(),
                        user = session.user_id(),
                        step = %request.name,
                        "user halted after failed request"
                    );
                    return UserOutcome::Failed;
                }
            }
            Step::Pause(pause) => {
                let duration = pause.sample(&mut ctx.rng);
                tokio::select! {
                    biased;
                    _ = ctx.cancel.cancelled() => return UserOutcome::Cancelled,
                    _ = sleep(duration) => {}
                }
            }
            Step::Loop {
                times,
                counter,
                steps,
            } => stack.push(Frame::Loop {
                steps,
                counter: counter.as_deref(),
                times: *times,
                iteration: 0,
                next: 0,
            }),
            Step::Branch(branch) => {
                let arm = branch.pick(&mut ctx.rng);
                stack.push(Frame::Sequence {
                    steps: arm,
                    next: 0,
                });
            }
        }

        // Yield between steps, never inside one.
        if suspends {
            sync_steps = 0;
        } else {
            sync_steps += 1;
            if sync_steps >= SYNC_STEPS_PER_YIELD {
                sync_steps = 0;
                yield_now().await;
            }
        }
    }

    UserOutcome::Completed
}
