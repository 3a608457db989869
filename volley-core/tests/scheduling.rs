use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use volley_core::{
    InjectionPhase, InjectionProfile, ProtocolDefaults, RequestStep, Scenario, Simulation,
};
use volley_testserver::TestServer;

fn empty_scenario() -> Arc<Scenario> {
    Arc::new(Scenario::builder("s").build())
}

#[test]
fn ramp_offsets_are_monotonic_and_bounded() -> anyhow::Result<()> {
    for users in [1u64, 2, 3, 7, 45, 100] {
        for over_ms in [1u64, 10, 999, 15_000, 30_000] {
            let over = Duration::from_millis(over_ms);
            let profile = InjectionProfile::new(vec![InjectionPhase::ramp(users, over)])?;
            let offsets: Vec<Duration> = profile.schedule(empty_scenario()).map(|e| e.offset).collect();

            assert_eq!(offsets.len() as u64, users);
            assert!(offsets.windows(2).all(|w| w[0] <= w[1]), "{users} over {over:?}");
            assert!(offsets.last().is_some_and(|last| *last <= over));
        }
    }
    Ok(())
}

#[test]
fn at_once_phases_start_exactly_their_users_at_zero() -> anyhow::Result<()> {
    let profile = InjectionProfile::new(vec![
        InjectionPhase::ramp(10, Duration::from_secs(1)),
        InjectionPhase::at_once(5),
    ])?;

    let at_zero: Vec<usize> = profile
        .schedule(empty_scenario())
        .filter(|e| e.offset.is_zero())
        .map(|e| e.phase)
        .collect();

    // One ramp user also starts at zero; it precedes the burst because its phase comes first.
    assert_eq!(at_zero, vec![0, 1, 1, 1, 1, 1]);
    Ok(())
}

#[test]
fn schedule_emits_every_user_exactly_once() -> anyhow::Result<()> {
    let combos = [
        vec![InjectionPhase::at_once(5)],
        vec![
            InjectionPhase::at_once(5),
            InjectionPhase::ramp(45, Duration::from_secs(30)),
            InjectionPhase::ramp(25, Duration::from_secs(15)),
        ],
        vec![
            InjectionPhase::ramp(0, Duration::ZERO),
            InjectionPhase::at_once(0),
            InjectionPhase::ramp(3, Duration::from_millis(3)),
        ],
    ];

    for phases in combos {
        let expected: u64 = phases.iter().map(InjectionPhase::users).sum();
        let profile = InjectionProfile::new(phases)?;
        let mut users: Vec<u64> = profile.schedule(empty_scenario()).map(|e| e.user).collect();
        users.sort_unstable();
        users.dedup();
        assert_eq!(users.len() as u64, expected);
        assert_eq!(profile.total_users(), expected);
    }
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn run_admits_the_sum_of_all_phases() -> anyhow::Result<()> {
    let server = TestServer::start().await.context("start test server")?;

    let scenario = Scenario::builder("burst and ramp")
        .exec(RequestStep::get("missing", "/nope")?)
        .build();
    let profile = InjectionProfile::new(vec![
        InjectionPhase::at_once(4),
        InjectionPhase::ramp(6, Duration::from_millis(300)),
        InjectionPhase::ramp(5, Duration::from_millis(150)),
    ])?;

    let summary = Simulation::builder(ProtocolDefaults::new(server.base_url()))
        .population(scenario, profile)
        .build()
        .context("build simulation")?
        .run()
        .await
        .context("run simulation")?;

    let s = summary.scenario("burst and ramp").context("scenario summary")?;
    assert_eq!(s.users.scheduled, 15);
    assert_eq!(s.users.admitted, 15);
    assert_eq!(s.users.completed, 15);
    assert_eq!(s.step("missing").context("missing step")?.total, 15);
    assert_eq!(server.stats().requests_total(), 15);

    server.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn ramp_spreads_admissions_over_its_duration() -> anyhow::Result<()> {
    let server = TestServer::start().await.context("start test server")?;

    let scenario = Scenario::builder("ramp")
        .exec(RequestStep::get("missing", "/nope")?)
        .build();
    let profile = InjectionProfile::new(vec![InjectionPhase::ramp(5, Duration::from_millis(400))])?;

    let summary = Simulation::builder(ProtocolDefaults::new(server.base_url()))
        .population(scenario, profile)
        .build()
        .context("build simulation")?
        .run()
        .await
        .context("run simulation")?;

    // Last user starts at 320ms.
    assert!(summary.elapsed >= Duration::from_millis(320), "{:?}", summary.elapsed);
    assert_eq!(summary.users_admitted(), 5);

    server.shutdown().await;
    Ok(())
}
