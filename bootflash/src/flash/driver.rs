//! Event pump connecting a transport's notification channel to a coordinator.
//!
//! The coordinator itself never waits. This loop is the one place that
//! blocks on the channel, and it checks for user interruption between
//! events.

use super::coordinator::FlashCoordinator;
use super::progress::ProgressSink;
use super::state::{Outcome, SessionHandle};
use crate::error::{Error, Result};
use crate::transport::{StreamEvent, Transport};
use log::{debug, warn};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::Duration;

/// How long to wait for a notification before re-checking for interruption.
pub const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Pump `events` into the session until it ends.
///
/// Uses the process-wide interrupt checker (see
/// [`set_interrupt_checker`](crate::set_interrupt_checker)) to cancel.
pub fn run_session<T, S>(
    coordinator: &mut FlashCoordinator<T, S>,
    handle: SessionHandle,
    events: &Receiver<StreamEvent>,
) -> Result<Outcome>
where
    T: Transport,
    S: ProgressSink,
{
    run_session_with(coordinator, handle, events, crate::is_interrupted_requested)
}

/// Pump `events` into the session until it ends, cancelling as soon as
/// `should_cancel` returns `true`.
///
/// A closed channel while the session is live counts as a disconnect.
pub fn run_session_with<T, S, F>(
    coordinator: &mut FlashCoordinator<T, S>,
    handle: SessionHandle,
    events: &Receiver<StreamEvent>,
    mut should_cancel: F,
) -> Result<Outcome>
where
    T: Transport,
    S: ProgressSink,
    F: FnMut() -> bool,
{
    loop {
        let snapshot = coordinator
            .current_state(handle)
            .ok_or(Error::UnknownSession(handle.id()))?;
        if let Some(outcome) = snapshot.outcome {
            return Ok(outcome);
        }

        if should_cancel() {
            debug!("Interrupt requested, cancelling session {}", handle.id());
            coordinator.cancel(handle);
            continue;
        }

        match events.recv_timeout(POLL_INTERVAL) {
            Ok(event) => coordinator.handle_event(event),
            Err(RecvTimeoutError::Timeout) => {},
            Err(RecvTimeoutError::Disconnected) => {
                warn!("Transport notification channel closed");
                coordinator.handle_event(StreamEvent::Disconnected);
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flash::progress::EventLog;
    use crate::flash::state::FailureReason;
    use crate::image::FirmwarePage;
    use crate::profile::DeviceProfile;
    use crate::transport::{FaultPlan, SimulatedBootloader, WriteResult};
    use std::sync::mpsc;

    fn profile() -> DeviceProfile {
        DeviceProfile::new(128)
            .with_base_address(0)
            .with_address_space(128 * 32)
            .with_max_retries(2)
    }

    fn run(plan: FaultPlan, pages: usize) -> (Outcome, SimulatedBootloader, EventLog) {
        let (sim, rx) = SimulatedBootloader::new(plan);
        let mut c = FlashCoordinator::new(sim, EventLog::new());
        let h = c.start_flash(&vec![0x77; 128 * pages], &profile()).unwrap();
        let outcome = run_session_with(&mut c, h, &rx, || false).unwrap();
        let (sim, log) = c.into_parts();
        (outcome, sim, log)
    }

    #[test]
    fn test_simulated_clean_flash() {
        let (outcome, sim, log) = run(FaultPlan::default(), 10);

        assert_eq!(outcome, Outcome::Completed);
        assert_eq!(sim.writes().len(), 10);
        assert!(sim.writes().windows(2).all(|w| w[0] < w[1]));
        assert_eq!(sim.flash().len(), 10);
        assert!(sim.reset_requested());
        assert_eq!(log.progress().len(), 10);
    }

    #[test]
    fn test_simulated_page_error_recovers() {
        let plan = FaultPlan::default().with_page_errors(4, 1, 5);
        let (outcome, sim, _) = run(plan, 10);

        assert_eq!(outcome, Outcome::Completed);
        assert_eq!(sim.writes().len(), 11);
    }

    #[test]
    fn test_simulated_persistent_error_fails() {
        let plan = FaultPlan::default().with_page_errors(1, 10, 6);
        let (outcome, sim, _) = run(plan, 3);

        assert_eq!(
            outcome,
            Outcome::Failed {
                reason: FailureReason::DeviceError { code: 6 }
            }
        );
        // page 0 once, page 1 initial + 2 retries
        assert_eq!(sim.writes().len(), 4);
        assert!(!sim.reset_requested());
    }

    #[test]
    fn test_simulated_disconnect() {
        let plan = FaultPlan::default().with_disconnect_after(3);
        let (outcome, sim, _) = run(plan, 6);

        assert_eq!(
            outcome,
            Outcome::Failed {
                reason: FailureReason::Disconnected
            }
        );
        assert_eq!(sim.writes().len(), 4);
    }

    #[test]
    fn test_simulated_stale_acks() {
        let (outcome, _, _) = run(FaultPlan::default().with_stale_acks(2), 4);
        assert_eq!(outcome, Outcome::Completed);

        let (outcome, _, _) = run(FaultPlan::default().with_stale_acks(3), 4);
        assert_eq!(
            outcome,
            Outcome::Failed {
                reason: FailureReason::ProtocolAnomaly
            }
        );
    }

    #[test]
    fn test_cancel_request_aborts() {
        struct Silent;
        impl Transport for Silent {
            fn write(&mut self, _page: &FirmwarePage) -> WriteResult {
                WriteResult::Accepted
            }
        }

        let (_tx, rx) = mpsc::channel::<StreamEvent>();
        let mut c = FlashCoordinator::new(Silent, EventLog::new());
        let h = c.start_flash(&[1; 300], &profile()).unwrap();

        let mut polls = 0;
        let outcome = run_session_with(&mut c, h, &rx, || {
            polls += 1;
            polls > 2
        })
        .unwrap();

        assert_eq!(outcome, Outcome::Aborted { pages_done: 0 });
        assert_eq!(c.sink().terminals().len(), 1);
    }

    #[test]
    fn test_closed_channel_is_disconnect() {
        struct Silent;
        impl Transport for Silent {
            fn write(&mut self, _page: &FirmwarePage) -> WriteResult {
                WriteResult::Accepted
            }
        }

        let (tx, rx) = mpsc::channel::<StreamEvent>();
        drop(tx);
        let mut c = FlashCoordinator::without_sink(Silent);
        let h = c.start_flash(&[1; 10], &profile()).unwrap();

        let outcome = run_session_with(&mut c, h, &rx, || false).unwrap();
        assert_eq!(
            outcome,
            Outcome::Failed {
                reason: FailureReason::Disconnected
            }
        );
    }
}
