//! Session states, failure reasons and outcomes.

use std::fmt;
use thiserror::Error;

/// State of a flash session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FlashState {
    /// Created, nothing sent yet.
    #[default]
    Idle,
    /// A page has been handed to the transport and its write has not completed.
    Sending,
    /// The in-flight page is written; waiting for the device's reply.
    WaitingAck,
    /// The in-flight page failed and is about to be re-sent or given up on.
    Retrying,
    /// Every page was acknowledged.
    Completed,
    /// The session stopped on an error.
    Failed,
    /// The user cancelled the session.
    Aborted,
}

impl FlashState {
    /// Whether the session is over.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Aborted)
    }
}

impl fmt::Display for FlashState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Sending => "sending",
            Self::WaitingAck => "waiting-ack",
            Self::Retrying => "retrying",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// Why a page attempt, or a whole session, failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FailureReason {
    /// Replies did not match the page in flight.
    #[error("protocol anomaly: device replies do not match the page in flight")]
    ProtocolAnomaly,
    /// The device rejected the page.
    #[error("device error code {code}")]
    DeviceError {
        /// Device-specific error code.
        code: u16,
    },
    /// The device went away mid-session.
    #[error("device disconnected")]
    Disconnected,
    /// The transport refused to queue the page.
    #[error("write rejected by transport: {0}")]
    WriteRejected(String),
}

/// Terminal result of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Outcome {
    /// All pages written and acknowledged.
    Completed,
    /// The session failed.
    Failed {
        /// Last error seen.
        reason: FailureReason,
    },
    /// The user cancelled; pages already acknowledged stay on the device.
    Aborted {
        /// Pages acknowledged before the abort.
        pages_done: usize,
    },
}

impl Outcome {
    /// Whether the firmware was fully written.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::Failed { reason } => write!(f, "failed: {reason}"),
            Self::Aborted { pages_done } => {
                write!(f, "aborted after {pages_done} pages")
            },
        }
    }
}

/// Opaque identifier of one flash session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SessionHandle(pub(crate) u64);

impl SessionHandle {
    /// Numeric id, unique per coordinator.
    pub fn id(self) -> u64 {
        self.0
    }
}

/// Read-only view of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SessionSnapshot {
    /// Session the snapshot belongs to.
    pub handle: SessionHandle,
    /// Current state.
    pub state: FlashState,
    /// Index of the next page to send (or the one in flight).
    pub cursor: usize,
    /// Address of the page awaiting acknowledgment.
    pub in_flight: Option<u32>,
    /// Re-sends of the current page so far.
    pub retry_count: u32,
    /// Pages acknowledged.
    pub pages_done: usize,
    /// Pages in the session.
    pub pages_total: usize,
    /// Most recent page-level error.
    pub last_error: Option<FailureReason>,
    /// Terminal result, once there is one.
    pub outcome: Option<Outcome>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(FlashState::Completed.is_terminal());
        assert!(FlashState::Failed.is_terminal());
        assert!(FlashState::Aborted.is_terminal());
        assert!(!FlashState::Idle.is_terminal());
        assert!(!FlashState::Sending.is_terminal());
        assert!(!FlashState::WaitingAck.is_terminal());
        assert!(!FlashState::Retrying.is_terminal());
    }

    #[test]
    fn test_outcome_display() {
        assert_eq!(Outcome::Completed.to_string(), "completed");
        assert_eq!(
            Outcome::Failed {
                reason: FailureReason::DeviceError { code: 3 }
            }
            .to_string(),
            "failed: device error code 3"
        );
        assert_eq!(
            Outcome::Aborted { pages_done: 4 }.to_string(),
            "aborted after 4 pages"
        );
    }
}
