use std::time::Duration;

use serde::Serialize;

use crate::config::SessionConfig;

/// Where an idle session stands relative to the inactivity threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Active { remaining: Duration },
    /// Inside the warning window: the client shows its countdown.
    Warning { remaining: Duration },
    Expired,
}

#[derive(Debug, Serialize)]
pub struct SessionStatusResponse {
    pub state: &'static str,
    pub remaining_secs: u64,
}

impl SessionState {
    pub fn to_response(self) -> SessionStatusResponse {
        match self {
            SessionState::Active { remaining } => SessionStatusResponse {
                state: "active",
                remaining_secs: remaining.as_secs(),
            },
            SessionState::Warning { remaining } => SessionStatusResponse {
                state: "warning",
                remaining_secs: remaining.as_secs(),
            },
            SessionState::Expired => SessionStatusResponse {
                state: "expired",
                remaining_secs: 0,
            },
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct InactivityPolicy {
    timeout: Duration,
    warning: Duration,
}

impl InactivityPolicy {
    /// `warning` is clamped to `timeout`.
    pub fn new(timeout: Duration, warning: Duration) -> Self {
        Self {
            timeout,
            warning: warning.min(timeout),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn evaluate(&self, idle: Duration) -> SessionState {
        if idle >= self.timeout {
            return SessionState::Expired;
        }

        let remaining = self.timeout - idle;
        if idle >= self.timeout - self.warning {
            SessionState::Warning { remaining }
        } else {
            SessionState::Active { remaining }
        }
    }
}

impl From<&SessionConfig> for InactivityPolicy {
    fn from(config: &SessionConfig) -> Self {
        Self::new(config.timeout, config.warning)
    }
}
