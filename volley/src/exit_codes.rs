#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,

    /// At least one request failed (check, timeout or transport).
    RequestsFailed = 10,

    /// Invalid CLI flags, unreadable or malformed simulation file, bad base URL.
    InvalidInput = 30,

    /// Internal/runtime error (IO errors, panicked user tasks).
    RuntimeError = 40,
}

impl ExitCode {
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    #[must_use]
    pub fn from_failed_requests(failed: u64) -> Self {
        if failed > 0 {
            Self::RequestsFailed
        } else {
            Self::Success
        }
    }
}
