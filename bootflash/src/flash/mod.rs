//! Flash coordination: session state machine, progress reporting and the
//! event pump.

pub mod coordinator;
pub mod driver;
pub mod progress;
mod session;
pub mod state;

pub use coordinator::FlashCoordinator;
pub use driver::{run_session, run_session_with};
pub use progress::{ChannelSink, EventLog, NoOpSink, Progress, ProgressEvent, ProgressSink, StateEvent};
pub use session::MAX_CONSECUTIVE_ANOMALIES;
pub use state::{FailureReason, FlashState, Outcome, SessionHandle, SessionSnapshot};
