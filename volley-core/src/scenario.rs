use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use rand::distributions::{Distribution, WeightedIndex};
use volley_http::Method;

use crate::error::{Error, Result};
use crate::session::Session;
use crate::template::{Template, TemplateError};

/// Fatal per-user error raised by an action, a body function or an unresolvable template.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ActionError {
    message: String,
}

impl ActionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<TemplateError> for ActionError {
    fn from(err: TemplateError) -> Self {
        Self::new(err.to_string())
    }
}

pub type ActionFn = Arc<dyn Fn(&mut Session) -> std::result::Result<(), ActionError> + Send + Sync>;
pub type BodyFn = Arc<dyn Fn(&Session) -> std::result::Result<String, ActionError> + Send + Sync>;

/// What a user does after a failed request.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, strum::Display, strum::EnumString,
)]
#[strum(serialize_all = "snake_case")]
pub enum FailurePolicy {
    #[default]
    Continue,
    #[strum(to_string = "halt", serialize = "halt_user")]
    HaltUser,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Check {
    Status(u16),
    StatusIn(Vec<u16>),
    BodyContains(String),
    HeaderPresent(String),
}

/// Saves part of a response into the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extract {
    Header { header: String, into: String },
    Body { into: String },
    Status { into: String },
}

#[derive(Clone)]
pub enum Body {
    Template(Template),
    Fn(BodyFn),
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Template(t) => f.debug_tuple("Template").field(&t.as_str()).finish(),
            Self::Fn(_) => f.write_str("Fn(..)"),
        }
    }
}

impl Body {
    pub fn render(&self, session: &Session) -> std::result::Result<String, ActionError> {
        match self {
            Self::Template(t) => Ok(t.resolve(session)?),
            Self::Fn(f) => f(session),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RequestStep {
    pub name: Arc<str>,
    pub method: Method,
    pub path: Template,
    pub headers: Vec<(String, Template)>,
    pub body: Option<Body>,
    pub checks: Vec<Check>,
    pub extracts: Vec<Extract>,
    /// Overrides the protocol default when set.
    pub timeout: Option<Duration>,
}

impl RequestStep {
    pub fn new(name: &str, method: Method, path: &str) -> Result<Self> {
        Ok(Self {
            name: Arc::from(name),
            method,
            path: Template::parse(path)?,
            headers: Vec::new(),
            body: None,
            checks: Vec::new(),
            extracts: Vec::new(),
            timeout: None,
        })
    }

    pub fn get(name: &str, path: &str) -> Result<Self> {
        Self::new(name, Method::GET, path)
    }

    pub fn post(name: &str, path: &str) -> Result<Self> {
        Self::new(name, Method::POST, path)
    }

    pub fn header(mut self, name: impl Into<String>, value: &str) -> Result<Self> {
        self.headers.push((name.into(), Template::parse(value)?));
        Ok(self)
    }

    pub fn body(mut self, body: &str) -> Result<Self> {
        self.body = Some(Body::Template(Template::parse(body)?));
        Ok(self)
    }

    #[must_use]
    pub fn body_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(&Session) -> std::result::Result<String, ActionError> + Send + Sync + 'static,
    {
        self.body = Some(Body::Fn(Arc::new(f)));
        self
    }

    #[must_use]
    pub fn check(mut self, check: Check) -> Self {
        self.checks.push(check);
        self
    }

    #[must_use]
    pub fn extract(mut self, extract: Extract) -> Self {
        self.extracts.push(extract);
        self
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pause {
    Fixed(Duration),
    /// Inclusive range.
    Uniform { min: Duration, max: Duration },
}

impl Pause {
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        match *self {
            Self::Fixed(d) => d,
            Self::Uniform { min, max } if min >= max => min,
            Self::Uniform { min, max } => rng.gen_range(min..=max),
        }
    }
}

#[derive(Debug, Clone)]
enum Selector {
    Uniform,
    Weighted(WeightedIndex<f64>),
}

/// Random choice between alternative step sequences, made once per visit.
#[derive(Debug, Clone)]
pub struct Branch {
    arms: Vec<Vec<Step>>,
    selector: Selector,
}

impl Branch {
    pub fn uniform(arms: Vec<Vec<Step>>) -> Result<Self> {
        if arms.is_empty() {
            return Err(Error::InvalidBranch("no alternatives".to_string()));
        }
        Ok(Self {
            arms,
            selector: Selector::Uniform,
        })
    }

    pub fn weighted(arms: Vec<(f64, Vec<Step>)>) -> Result<Self> {
        if arms.is_empty() {
            return Err(Error::InvalidBranch("no alternatives".to_string()));
        }

        let (weights, arms): (Vec<f64>, Vec<Vec<Step>>) = arms.into_iter().unzip();
        let index =
            WeightedIndex::new(&weights).map_err(|e| Error::InvalidBranch(e.to_string()))?;

        Ok(Self {
            arms,
            selector: Selector::Weighted(index),
        })
    }

    pub fn arms(&self) -> &[Vec<Step>] {
        &self.arms
    }

    pub fn is_weighted(&self) -> bool {
        matches!(self.selector, Selector::Weighted(_))
    }

    pub fn pick<R: Rng + ?Sized>(&self, rng: &mut R) -> &[Step] {
        let idx = match &self.selector {
            Selector::Uniform => rng.gen_range(0..self.arms.len()),
            Selector::Weighted(index) => index.sample(rng),
        };
        &self.arms[idx]
    }
}

#[derive(Clone)]
pub enum Step {
    Action { name: Arc<str>, func: ActionFn },
    Request(RequestStep),
    Pause(Pause),
    Loop {
        times: u64,
        /// Session variable receiving the zero-based iteration index.
        counter: Option<String>,
        steps: Vec<Step>,
    },
    Branch(Branch),
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Action { name, .. } => f.debug_struct("Action").field("name", name).finish(),
            Self::Request(r) => f.debug_tuple("Request").field(r).finish(),
            Self::Pause(p) => f.debug_tuple("Pause").field(p).finish(),
            Self::Loop {
                times,
                counter,
                steps,
            } => f
                .debug_struct("Loop")
                .field("times", times)
                .field("counter", counter)
                .field("steps", steps)
                .finish(),
            Self::Branch(b) => f.debug_tuple("Branch").field(b).finish(),
        }
    }
}

impl Step {
    pub fn action<F>(name: &str, func: F) -> Self
    where
        F: Fn(&mut Session) -> std::result::Result<(), ActionError> + Send + Sync + 'static,
    {
        Self::Action {
            name: Arc::from(name),
            func: Arc::new(func),
        }
    }

    pub fn pause(duration: Duration) -> Self {
        Self::Pause(Pause::Fixed(duration))
    }

    pub fn pause_between(min: Duration, max: Duration) -> Self {
        Self::Pause(Pause::Uniform {
            min: min.min(max),
            max: max.max(min),
        })
    }

    pub fn repeat(times: u64, steps: Vec<Step>) -> Self {
        Self::Loop {
            times,
            counter: None,
            steps,
        }
    }

    pub fn repeat_counted(times: u64, counter: impl Into<String>, steps: Vec<Step>) -> Self {
        Self::Loop {
            times,
            counter: Some(counter.into()),
            steps,
        }
    }
}

impl From<RequestStep> for Step {
    fn from(step: RequestStep) -> Self {
        Self::Request(step)
    }
}

impl From<Branch> for Step {
    fn from(branch: Branch) -> Self {
        Self::Branch(branch)
    }
}

impl From<Pause> for Step {
    fn from(pause: Pause) -> Self {
        Self::Pause(pause)
    }
}

/// Named, immutable step tree shared by every user of a population.
#[derive(Debug, Clone)]
pub struct Scenario {
    name: Arc<str>,
    steps: Vec<Step>,
    failure_policy: FailurePolicy,
}

impl Scenario {
    pub fn builder(name: &str) -> ScenarioBuilder {
        ScenarioBuilder {
            name: Arc::from(name),
            steps: Vec::new(),
            failure_policy: FailurePolicy::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn name_arc(&self) -> &Arc<str> {
        &self.name
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn failure_policy(&self) -> FailurePolicy {
        self.failure_policy
    }
}

#[derive(Debug)]
pub struct ScenarioBuilder {
    name: Arc<str>,
    steps: Vec<Step>,
    failure_policy: FailurePolicy,
}

impl ScenarioBuilder {
    #[must_use]
    pub fn exec(mut self, step: impl Into<Step>) -> Self {
        self.steps.push(step.into());
        self
    }

    #[must_use]
    pub fn steps(mut self, steps: impl IntoIterator<Item = Step>) -> Self {
        self.steps.extend(steps);
        self
    }

    #[must_use]
    pub fn on_failure(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn build(self) -> Scenario {
        Scenario {
            name: self.name,
            steps: self.steps,
            failure_policy: self.failure_policy,
        }
    }
}
