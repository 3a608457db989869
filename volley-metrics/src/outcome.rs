use std::sync::Arc;
use std::time::Duration;

/// Why a request did not pass.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, strum::Display, strum::EnumString,
)]
#[strum(serialize_all = "snake_case")]
pub enum FailureKind {
    /// A response arrived but a declared check (or extraction) did not hold.
    Check,
    /// The per-request timeout elapsed.
    Timeout,
    /// Connection or body read failure.
    Transport,
    /// The request could not be built (bad URL, header name or value).
    InvalidRequest,
}

impl FailureKind {
    pub const ALL: [FailureKind; 4] = [
        FailureKind::Check,
        FailureKind::Timeout,
        FailureKind::Transport,
        FailureKind::InvalidRequest,
    ];

    pub(crate) fn index(self) -> usize {
        match self {
            Self::Check => 0,
            Self::Timeout => 1,
            Self::Transport => 2,
            Self::InvalidRequest => 3,
        }
    }
}

/// One record per HTTP call.
#[derive(Debug, Clone)]
pub struct RequestOutcome {
    pub scenario: Arc<str>,
    pub step: Arc<str>,
    /// `None` when no response was received.
    pub status: Option<u16>,
    pub latency: Duration,
    pub failure: Option<FailureKind>,
    pub bytes_received: u64,
}

impl RequestOutcome {
    #[must_use]
    pub fn passed(&self) -> bool {
        self.failure.is_none()
    }
}

/// How a virtual user's run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum UserOutcome {
    /// Ran every step (individual requests may still have failed).
    Completed,
    /// Stopped early because a request failed under a halt-on-failure policy.
    Failed,
    /// A fatal per-user error (action error, unresolvable template).
    Aborted,
    /// Interrupted by a stop request or the run deadline.
    Cancelled,
}
