//! Built-in link-shortener workload, run when no simulation file is given.

use std::time::Duration;

use volley_core::{
    Branch, Check, InjectionPhase, InjectionProfile, ProtocolDefaults, RequestStep, Scenario,
    Step, actions,
};

use crate::run::SimulationPlan;

pub(crate) const CREATE_AND_USE: &str = "Create and use short link";
pub(crate) const MIXED_TRAFFIC: &str = "Mixed traffic";

const SLUG_LEN: usize = 10;

/// Store a fresh 32-hex `payloadId` and its first characters as `slug`.
fn new_payload() -> [Step; 2] {
    [
        actions::random_id("payloadId"),
        actions::substring("payloadId", "slug", SLUG_LEN),
    ]
}

fn create_link(name: &str, url_prefix: &str) -> volley_core::Result<RequestStep> {
    let body = format!(
        r##"{{"url":"https://example.com/{url_prefix}-#{{payloadId}}","slug":"#{{slug}}"}}"##
    );
    Ok(RequestStep::post(name, "/links")?
        .body(&body)?
        .check(Check::Status(201)))
}

fn create_and_use_link() -> volley_core::Result<Scenario> {
    Ok(Scenario::builder(CREATE_AND_USE)
        .steps(new_payload())
        .exec(create_link("create link", "article")?)
        .exec(Step::pause(Duration::from_millis(500)))
        .exec(RequestStep::get("redirect to destination", "/#{slug}")?.check(Check::Status(302)))
        .exec(Step::pause(Duration::from_millis(500)))
        .exec(RequestStep::get("fetch stats", "/links/#{slug}")?.check(Check::Status(200)))
        .exec(Step::pause(Duration::from_secs(1)))
        .build())
}

fn mixed_traffic() -> volley_core::Result<Scenario> {
    let redirect = RequestStep::get("redirect existing", "/#{slug}")?.check(Check::Status(302));
    let stats = RequestStep::get("get stats", "/links/#{slug}")?.check(Check::Status(200));

    Ok(Scenario::builder(MIXED_TRAFFIC)
        .steps(new_payload())
        .exec(create_link("create link (auto slug)", "auto")?)
        .exec(Step::pause(Duration::from_secs(1)))
        .exec(Step::repeat(
            3,
            vec![redirect.into(), Step::pause(Duration::from_millis(250))],
        ))
        .exec(Branch::uniform(vec![vec![stats.into()], Vec::new()])?)
        .exec(Step::pause(Duration::from_secs(1)))
        .build())
}

pub(crate) fn simulation() -> volley_core::Result<SimulationPlan> {
    let protocol = ProtocolDefaults::default()
        .accept("application/json")
        .content_type("application/json");

    let create_profile = InjectionProfile::new(vec![
        InjectionPhase::at_once(5),
        InjectionPhase::ramp(45, Duration::from_secs(30)),
        InjectionPhase::ramp(25, Duration::from_secs(15)),
    ])?;
    let mixed_profile = InjectionProfile::new(vec![InjectionPhase::ramp(
        50,
        Duration::from_secs(45),
    )])?;

    Ok(SimulationPlan {
        protocol,
        max_duration: None,
        seed: None,
        populations: vec![
            (create_and_use_link()?, create_profile),
            (mixed_traffic()?, mixed_profile),
        ],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan() -> SimulationPlan {
        match simulation() {
            Ok(p) => p,
            Err(err) => panic!("built-in simulation failed to build: {err}"),
        }
    }

    #[test]
    fn builtin_profiles_match_the_link_workload() {
        let plan = plan();
        let users: Vec<(&str, u64, Duration)> = plan
            .populations
            .iter()
            .map(|(s, p)| (s.name(), p.total_users(), p.duration()))
            .collect();

        assert_eq!(
            users,
            vec![
                (CREATE_AND_USE, 75, Duration::from_secs(30)),
                (MIXED_TRAFFIC, 50, Duration::from_secs(45)),
            ]
        );
        assert_eq!(plan.protocol.base_url_str(), None);
    }

    #[test]
    fn mixed_traffic_loops_then_branches() {
        let plan = plan();
        let (mixed, _) = &plan.populations[1];

        let has_loop = mixed
            .steps()
            .iter()
            .any(|s| matches!(s, Step::Loop { times: 3, .. }));
        assert!(has_loop);

        let branch = mixed.steps().iter().find_map(|s| match s {
            Step::Branch(b) => Some(b),
            _ => None,
        });
        let Some(branch) = branch else {
            panic!("expected a random switch");
        };
        assert!(!branch.is_weighted());
        assert_eq!(branch.arms().len(), 2);
        assert!(branch.arms()[1].is_empty());
    }
}
