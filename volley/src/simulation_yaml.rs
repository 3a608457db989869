use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use anyhow::Context as _;
use serde::Deserialize;
use volley_core::{
    Branch, Check, Extract, FailurePolicy, InjectionPhase, InjectionProfile, Method,
    ProtocolDefaults, RequestStep, Scenario, SessionValue, Step, actions,
};

use crate::run::SimulationPlan;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct SimulationYaml {
    #[serde(default)]
    pub protocol: ProtocolYaml,

    #[serde(default)]
    pub max_duration: Option<YamlDuration>,

    #[serde(default)]
    pub seed: Option<u64>,

    pub scenarios: Vec<ScenarioYaml>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct ProtocolYaml {
    #[serde(default)]
    pub base_url: Option<String>,

    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    #[serde(default)]
    pub timeout: Option<YamlDuration>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct ScenarioYaml {
    pub name: String,

    /// `continue` (default) or `halt`.
    #[serde(default)]
    pub on_failure: Option<String>,

    pub steps: Vec<StepYaml>,

    pub injection: Vec<InjectionYaml>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) enum StepYaml {
    Request(RequestYaml),
    Pause(PauseYaml),
    Repeat(RepeatYaml),
    RandomSwitch(Vec<ArmYaml>),
    Set(SetYaml),
    RandomId(String),
    Substring(SubstringYaml),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct RequestYaml {
    pub name: String,

    #[serde(default)]
    pub method: Option<String>,

    pub path: String,

    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    #[serde(default)]
    pub body: Option<String>,

    #[serde(default)]
    pub check: Vec<CheckYaml>,

    #[serde(default)]
    pub extract: Vec<ExtractYaml>,

    #[serde(default)]
    pub timeout: Option<YamlDuration>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) enum CheckYaml {
    Status(u16),
    StatusIn(Vec<u16>),
    BodyContains(String),
    HeaderPresent(String),
}

#[derive(Debug, Deserialize)]
#[serde(tag = "from", rename_all = "camelCase", deny_unknown_fields)]
pub(crate) enum ExtractYaml {
    Header { name: String, into: String },
    Body { into: String },
    Status { into: String },
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum PauseYaml {
    Fixed(YamlDuration),
    Between { min: YamlDuration, max: YamlDuration },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct RepeatYaml {
    pub times: u64,

    #[serde(default)]
    pub counter: Option<String>,

    pub steps: Vec<StepYaml>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct ArmYaml {
    #[serde(default)]
    pub weight: Option<f64>,

    #[serde(default)]
    pub steps: Vec<StepYaml>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct SetYaml {
    pub var: String,
    pub value: serde_yaml::Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct SubstringYaml {
    pub from: String,
    pub into: String,
    pub len: usize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) enum InjectionYaml {
    AtOnce(u64),
    Ramp { users: u64, over: YamlDuration },
}

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct YamlDuration(Duration);

impl YamlDuration {
    fn into_inner(self) -> Duration {
        self.0
    }
}

impl<'de> Deserialize<'de> for YamlDuration {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct V;

        impl<'de> serde::de::Visitor<'de> for V {
            type Value = YamlDuration;

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("duration as string (e.g. 500ms), integer seconds, or float seconds")
            }

            fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(YamlDuration(Duration::from_secs(v)))
            }

            fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                let secs = u64::try_from(v).map_err(|_| E::custom("duration must not be negative"))?;
                Ok(YamlDuration(Duration::from_secs(secs)))
            }

            fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                if !v.is_finite() || v < 0.0 {
                    return Err(E::custom("duration must be a non-negative, finite number"));
                }
                Ok(YamlDuration(Duration::from_secs_f64(v)))
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                let d = humantime::parse_duration(v.trim()).map_err(E::custom)?;
                Ok(YamlDuration(d))
            }

            fn visit_string<E>(self, v: String) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                self.visit_str(&v)
            }
        }

        deserializer.deserialize_any(V)
    }
}

pub async fn load_simulation_from_yaml(path: &Path) -> anyhow::Result<SimulationPlan> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read simulation YAML: {}", path.display()))?;

    let doc: SimulationYaml = serde_yaml::from_slice(&bytes)
        .with_context(|| format!("failed to parse YAML: {}", path.display()))?;

    simulation_from_doc(doc).with_context(|| format!("invalid simulation: {}", path.display()))
}

pub(crate) fn simulation_from_doc(doc: SimulationYaml) -> anyhow::Result<SimulationPlan> {
    let SimulationYaml {
        protocol,
        max_duration,
        seed,
        scenarios,
    } = doc;

    let populations = scenarios
        .into_iter()
        .map(|s| {
            let name = s.name.clone();
            scenario_from_yaml(s).with_context(|| format!("scenario `{name}`"))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    Ok(SimulationPlan {
        protocol: protocol_from_yaml(protocol),
        max_duration: max_duration.map(YamlDuration::into_inner),
        seed,
        populations,
    })
}

fn protocol_from_yaml(protocol: ProtocolYaml) -> ProtocolDefaults {
    let ProtocolYaml {
        base_url,
        headers,
        timeout,
    } = protocol;

    let mut out = ProtocolDefaults::default();
    if let Some(url) = base_url {
        out = out.base_url(url);
    }
    for (name, value) in headers {
        out = out.header(name, value);
    }
    if let Some(t) = timeout {
        out = out.timeout(t.into_inner());
    }
    out
}

fn scenario_from_yaml(scenario: ScenarioYaml) -> anyhow::Result<(Scenario, InjectionProfile)> {
    let ScenarioYaml {
        name,
        on_failure,
        steps,
        injection,
    } = scenario;

    let policy = match on_failure {
        Some(raw) => raw
            .parse::<FailurePolicy>()
            .map_err(|_| anyhow::anyhow!("unknown onFailure `{raw}` (expected continue or halt)"))?,
        None => FailurePolicy::default(),
    };

    let steps = steps_from_yaml(steps)?;

    let phases = injection
        .into_iter()
        .map(|p| match p {
            InjectionYaml::AtOnce(users) => InjectionPhase::at_once(users),
            InjectionYaml::Ramp { users, over } => InjectionPhase::ramp(users, over.into_inner()),
        })
        .collect();
    let profile = InjectionProfile::new(phases)?;

    let scenario = Scenario::builder(&name)
        .steps(steps)
        .on_failure(policy)
        .build();

    Ok((scenario, profile))
}

fn steps_from_yaml(steps: Vec<StepYaml>) -> anyhow::Result<Vec<Step>> {
    steps.into_iter().map(step_from_yaml).collect()
}

fn step_from_yaml(step: StepYaml) -> anyhow::Result<Step> {
    let step = match step {
        StepYaml::Request(r) => {
            let name = r.name.clone();
            request_from_yaml(r)
                .with_context(|| format!("request `{name}`"))?
                .into()
        }
        StepYaml::Pause(PauseYaml::Fixed(d)) => Step::pause(d.into_inner()),
        StepYaml::Pause(PauseYaml::Between { min, max }) => {
            Step::pause_between(min.into_inner(), max.into_inner())
        }
        StepYaml::Repeat(RepeatYaml {
            times,
            counter,
            steps,
        }) => {
            let steps = steps_from_yaml(steps)?;
            match counter {
                Some(counter) => Step::repeat_counted(times, counter, steps),
                None => Step::repeat(times, steps),
            }
        }
        StepYaml::RandomSwitch(arms) => branch_from_yaml(arms)?.into(),
        StepYaml::Set(SetYaml { var, value }) => actions::set(&var, session_value(&var, value)?),
        StepYaml::RandomId(var) => actions::random_id(&var),
        StepYaml::Substring(SubstringYaml { from, into, len }) => {
            actions::substring(&from, &into, len)
        }
    };
    Ok(step)
}

fn request_from_yaml(r: RequestYaml) -> anyhow::Result<RequestStep> {
    let RequestYaml {
        name,
        method,
        path,
        headers,
        body,
        check,
        extract,
        timeout,
    } = r;

    let method = match method {
        Some(m) => Method::from_bytes(m.trim().to_ascii_uppercase().as_bytes())
            .with_context(|| format!("invalid HTTP method `{m}`"))?,
        None => Method::GET,
    };

    let mut step = RequestStep::new(&name, method, &path)?;
    for (k, v) in headers {
        step = step.header(k, &v)?;
    }
    if let Some(body) = body {
        step = step.body(&body)?;
    }
    for c in check {
        step = step.check(match c {
            CheckYaml::Status(code) => Check::Status(code),
            CheckYaml::StatusIn(codes) => Check::StatusIn(codes),
            CheckYaml::BodyContains(needle) => Check::BodyContains(needle),
            CheckYaml::HeaderPresent(header) => Check::HeaderPresent(header),
        });
    }
    for e in extract {
        step = step.extract(match e {
            ExtractYaml::Header { name, into } => Extract::Header { header: name, into },
            ExtractYaml::Body { into } => Extract::Body { into },
            ExtractYaml::Status { into } => Extract::Status { into },
        });
    }
    if let Some(t) = timeout {
        step = step.timeout(t.into_inner());
    }

    Ok(step)
}

fn branch_from_yaml(arms: Vec<ArmYaml>) -> anyhow::Result<Branch> {
    let weighted = arms.iter().filter(|a| a.weight.is_some()).count();

    let branch = if weighted == 0 {
        let arms = arms
            .into_iter()
            .map(|a| steps_from_yaml(a.steps))
            .collect::<anyhow::Result<Vec<_>>>()?;
        Branch::uniform(arms)?
    } else if weighted == arms.len() {
        let arms = arms
            .into_iter()
            .map(|a| Ok((a.weight.unwrap_or_default(), steps_from_yaml(a.steps)?)))
            .collect::<anyhow::Result<Vec<_>>>()?;
        Branch::weighted(arms)?
    } else {
        anyhow::bail!("randomSwitch: either every alternative has a weight or none does");
    };

    Ok(branch)
}

fn session_value(var: &str, value: serde_yaml::Value) -> anyhow::Result<SessionValue> {
    let v = match value {
        serde_yaml::Value::String(s) => SessionValue::Str(s),
        serde_yaml::Value::Bool(b) => SessionValue::Bool(b),
        serde_yaml::Value::Number(n) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => SessionValue::Int(i),
            (None, Some(f)) => SessionValue::Float(f),
            (None, None) => anyhow::bail!("set `{var}`: unsupported number {n}"),
        },
        _ => anyhow::bail!("set `{var}`: value must be a string, number or boolean"),
    };
    Ok(v)
}

#[cfg(test)]
mod tests {
    use super::*;

    const LINKS_YAML: &str = r##"
protocol:
  baseUrl: http://127.0.0.1:9999
  headers:
    accept: application/json
    content-type: application/json
  timeout: 5s
maxDuration: 2m
seed: 42
scenarios:
  - name: Mixed traffic
    onFailure: halt
    steps:
      - randomId: payloadId
      - substring: { from: payloadId, into: slug, len: 10 }
      - set: { var: attempt, value: 1 }
      - request:
          name: create link (auto slug)
          method: post
          path: /links
          body: '{"url":"https://example.com/auto-#{payloadId}","slug":"#{slug}"}'
          check:
            - status: 201
          extract:
            - { from: header, name: location, into: location }
      - pause: 1s
      - repeat:
          times: 3
          counter: i
          steps:
            - request:
                name: redirect existing
                path: /#{slug}
                check:
                  - statusIn: [301, 302]
            - pause: { min: 100ms, max: 250ms }
      - randomSwitch:
          - steps:
              - request:
                  name: get stats
                  path: /links/#{slug}
                  check:
                    - status: 200
                    - bodyContains: clicks
          - steps: []
    injection:
      - atOnce: 5
      - ramp: { users: 45, over: 30s }
"##;

    fn parse(yaml: &str) -> anyhow::Result<SimulationPlan> {
        let doc: SimulationYaml = serde_yaml::from_str(yaml)?;
        simulation_from_doc(doc)
    }

    #[test]
    fn parses_full_simulation_document() {
        let plan = match parse(LINKS_YAML) {
            Ok(p) => p,
            Err(err) => panic!("parse failed: {err:#}"),
        };

        assert_eq!(plan.protocol.base_url_str(), Some("http://127.0.0.1:9999"));
        assert_eq!(plan.protocol.request_timeout(), Duration::from_secs(5));
        assert_eq!(plan.protocol.headers().len(), 2);
        assert_eq!(plan.max_duration, Some(Duration::from_secs(120)));
        assert_eq!(plan.seed, Some(42));

        let (scenario, profile) = &plan.populations[0];
        assert_eq!(scenario.name(), "Mixed traffic");
        assert_eq!(scenario.failure_policy(), FailurePolicy::HaltUser);
        assert_eq!(profile.total_users(), 50);
        assert_eq!(profile.duration(), Duration::from_secs(30));

        let steps = scenario.steps();
        assert_eq!(steps.len(), 7);
        let Step::Request(create) = &steps[3] else {
            panic!("expected request, got {:?}", steps[3]);
        };
        assert_eq!(create.method, Method::POST);
        assert_eq!(create.checks, vec![Check::Status(201)]);
        assert_eq!(
            create.extracts,
            vec![Extract::Header {
                header: "location".to_string(),
                into: "location".to_string()
            }]
        );
        assert!(matches!(
            &steps[5],
            Step::Loop { times: 3, counter: Some(c), steps } if c == "i" && steps.len() == 2
        ));
        let Step::Branch(branch) = &steps[6] else {
            panic!("expected branch, got {:?}", steps[6]);
        };
        assert!(!branch.is_weighted());
        assert_eq!(branch.arms().len(), 2);
    }

    #[test]
    fn weighted_switch_requires_weights_on_every_arm() {
        let yaml = r#"
scenarios:
  - name: s
    steps:
      - randomSwitch:
          - weight: 80
            steps: [ { pause: 10ms } ]
          - steps: []
    injection: [ { atOnce: 1 } ]
"#;
        let err = match parse(yaml) {
            Ok(_) => panic!("expected error"),
            Err(err) => format!("{err:#}"),
        };
        assert!(err.contains("weight"), "{err}");
    }

    #[test]
    fn weighted_switch_is_built_when_all_arms_have_weights() {
        let yaml = r#"
scenarios:
  - name: s
    steps:
      - randomSwitch:
          - weight: 80
            steps: [ { pause: 10ms } ]
          - weight: 20
    injection: [ { atOnce: 1 } ]
"#;
        let plan = match parse(yaml) {
            Ok(p) => p,
            Err(err) => panic!("parse failed: {err:#}"),
        };
        let Step::Branch(branch) = &plan.populations[0].0.steps()[0] else {
            panic!("expected branch");
        };
        assert!(branch.is_weighted());
    }

    #[test]
    fn rejects_unknown_failure_policy_and_empty_injection() {
        let bad_policy = r#"
scenarios:
  - name: s
    onFailure: explode
    steps: []
    injection: [ { atOnce: 1 } ]
"#;
        assert!(parse(bad_policy).is_err());

        let no_phases = r#"
scenarios:
  - name: s
    steps: []
    injection: []
"#;
        let err = match parse(no_phases) {
            Ok(_) => panic!("expected error"),
            Err(err) => format!("{err:#}"),
        };
        assert!(err.contains("scenario `s`"), "{err}");
    }

    #[test]
    fn rejects_unterminated_template() {
        let yaml = r#"
scenarios:
  - name: s
    steps:
      - request: { name: r, path: "/#{slug" }
    injection: [ { atOnce: 1 } ]
"#;
        assert!(parse(yaml).is_err());
    }

    #[test]
    fn yaml_durations_accept_numbers_and_strings() {
        let d: YamlDuration = match serde_yaml::from_str("1.5") {
            Ok(v) => v,
            Err(err) => panic!("{err}"),
        };
        assert_eq!(d.into_inner(), Duration::from_millis(1500));

        let d: YamlDuration = match serde_yaml::from_str("\"250ms\"") {
            Ok(v) => v,
            Err(err) => panic!("{err}"),
        };
        assert_eq!(d.into_inner(), Duration::from_millis(250));

        assert!(serde_yaml::from_str::<YamlDuration>("-3").is_err());
    }

    #[tokio::test]
    async fn loads_simulation_from_file() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("links.yaml");
        tokio::fs::write(&path, LINKS_YAML).await?;

        let plan = load_simulation_from_yaml(&path).await?;
        assert_eq!(plan.populations.len(), 1);

        let missing = load_simulation_from_yaml(&dir.path().join("nope.yaml")).await;
        let err = match missing {
            Ok(_) => panic!("expected error"),
            Err(err) => err.to_string(),
        };
        assert!(err.contains("failed to read simulation YAML"), "{err}");
        Ok(())
    }
}
