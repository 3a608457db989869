#![forbid(unsafe_code)]

pub mod actions;
mod error;
pub mod http;
pub mod injection;
mod protocol;
pub mod runner;
pub mod scenario;
mod session;
pub mod template;

pub use error::{Error, Result};
pub use http::{HttpExecutor, ResolvedRequest};
pub use injection::{InjectionPhase, InjectionProfile, Schedule, StartEvent};
pub use protocol::{DEFAULT_REQUEST_TIMEOUT, ProtocolDefaults};
pub use runner::{Simulation, SimulationBuilder, StopHandle};
pub use scenario::{
    ActionError, Body, Branch, Check, Extract, FailurePolicy, Pause, RequestStep, Scenario,
    ScenarioBuilder, Step,
};
pub use session::{Session, SessionValue};
pub use template::{Template, TemplateError};

pub use volley_http::{HttpClient, Method};
pub use volley_metrics::{
    FailureKind, HistogramSummary, RequestOutcome, RunSummary, ScenarioSummary, StepSummary,
    UserOutcome, UserSummary,
};
