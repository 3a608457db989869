pub mod aggregator;
pub mod histogram;
pub mod outcome;
pub mod summary;

pub use aggregator::Aggregator;
pub use histogram::HistogramSummary;
pub use outcome::{FailureKind, RequestOutcome, UserOutcome};
pub use summary::{RunSummary, ScenarioSummary, StepSummary, UserSummary};
