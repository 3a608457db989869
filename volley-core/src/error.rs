use crate::template::TemplateError;

pub type Result<T> = std::result::Result<T, Error>;

/// Configuration errors. All of them are raised before the first user starts.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("injection profile must have at least one phase")]
    EmptyProfile,

    #[error("ramp of {users} users must last longer than zero")]
    ZeroDurationRamp { users: u64 },

    #[error("protocol has no base url")]
    MissingBaseUrl,

    #[error("invalid base url `{0}` (expected an absolute http:// or https:// url)")]
    InvalidBaseUrl(String),

    #[error("simulation has no populations")]
    EmptySimulation,

    #[error("scenario `{0}` is declared more than once")]
    DuplicateScenario(String),

    #[error("template error: {0}")]
    Template(#[from] TemplateError),

    #[error("invalid branch: {0}")]
    InvalidBranch(String),

    #[error("task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}
