//! [`RestartPolicy`] – when to restart a listener and when to give up.
//!
//! A listener returns for many transient reasons: the DSP restarted, a
//! session was torn down, resources were briefly exhausted.  All of those are
//! answered with a restart after a short pause.  The single exception is the
//! terminal status (by default `AEE_ECONNREFUSED`), which means the DSP
//! device node itself is unreachable and retrying cannot help.
//!
//! # Example
//!
//! ```rust
//! use dspd_supervisor::policy::{Decision, RestartPolicy};
//! use dspd_types::ComponentStatus;
//!
//! let policy = RestartPolicy::default();
//!
//! assert_eq!(policy.decide(None), Decision::Restart);
//! assert_eq!(policy.decide(Some(ComponentStatus(-1))), Decision::Restart);
//! assert_eq!(
//!     policy.decide(Some(ComponentStatus::CONNECTION_REFUSED)),
//!     Decision::Terminate(ComponentStatus::CONNECTION_REFUSED),
//! );
//! ```

use std::time::Duration;

use dspd_types::ComponentStatus;

/// Pause between a listener returning and the next load attempt.
pub const DEFAULT_BACKOFF: Duration = Duration::from_millis(100);

/// Outcome of a [`RestartPolicy::decide`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Sleep for the backoff interval, then load again.
    Restart,
    /// Stop supervising and exit with this status.
    Terminate(ComponentStatus),
}

/// Unconditional-restart policy with one terminal status.
#[derive(Debug, Clone)]
pub struct RestartPolicy {
    terminal_status: ComponentStatus,
    backoff: Duration,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            terminal_status: ComponentStatus::CONNECTION_REFUSED,
            backoff: DEFAULT_BACKOFF,
        }
    }
}

impl RestartPolicy {
    /// Default terminal status with a custom `backoff`.
    pub fn with_backoff(backoff: Duration) -> Self {
        Self {
            backoff,
            ..Self::default()
        }
    }

    /// Replace the status that stops the loop.
    pub fn terminal_status(mut self, status: ComponentStatus) -> Self {
        self.terminal_status = status;
        self
    }

    pub fn backoff(&self) -> Duration {
        self.backoff
    }

    /// Decide what follows a cycle that produced `status`.
    ///
    /// `None` (load failure or missing entry point) always restarts.
    pub fn decide(&self, status: Option<ComponentStatus>) -> Decision {
        match status {
            Some(status) if status == self.terminal_status => Decision::Terminate(status),
            _ => Decision::Restart,
        }
    }
}
