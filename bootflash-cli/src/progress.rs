//! Terminal progress reporting for flash sessions.

use bootflash::{FlashState, Outcome, Progress, ProgressSink, StateEvent};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use log::debug;

/// Create the session progress bar, hidden in quiet or non-interactive mode.
pub(crate) fn session_bar(pages_total: usize, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new(pages_total as u64);
    #[allow(clippy::unwrap_used)] // Static template string
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap()
            .progress_chars("#>-"),
    );
    pb.set_draw_target(ProgressDrawTarget::stderr());
    pb
}

/// [`ProgressSink`] that drives an indicatif progress bar.
pub(crate) struct BarSink {
    pb: ProgressBar,
    retries: u32,
    retry_pending: bool,
}

impl BarSink {
    pub(crate) fn new(pb: ProgressBar) -> Self {
        Self {
            pb,
            retries: 0,
            retry_pending: false,
        }
    }

    /// Pages actually re-sent during the session. A `Retrying` state that
    /// ends in `Failed` is not a re-send.
    pub(crate) fn retries(&self) -> u32 {
        self.retries
    }
}

impl ProgressSink for BarSink {
    fn on_state(&mut self, event: &StateEvent) {
        debug!(
            "state {} ({}/{})",
            event.state, event.pages_done, event.pages_total
        );
        // Only a Sending right after Retrying puts the page on the wire again.
        if event.state == FlashState::Sending && self.retry_pending {
            self.retries += 1;
        }
        self.retry_pending = event.state == FlashState::Retrying;

        if event.state == FlashState::Retrying {
            let reason = event
                .error
                .as_ref()
                .map_or_else(String::new, |e| format!(": {e}"));
            self.pb.set_message(format!("retrying{reason}"));
        } else if !event.state.is_terminal() {
            self.pb.set_message(event.state.to_string());
        }
    }

    fn on_progress(&mut self, progress: &Progress) {
        self.pb.set_length(progress.pages_total as u64);
        self.pb.set_position(progress.pages_done as u64);
    }

    fn on_terminal(&mut self, outcome: &Outcome) {
        if outcome.is_success() {
            self.pb.finish_with_message("complete");
        } else {
            self.pb.abandon_with_message(outcome.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bootflash::{
        DeviceProfile, FailureReason, FaultPlan, FlashCoordinator, SimulatedBootloader,
        run_session_with,
    };

    fn run_simulated(plan: FaultPlan, pages: usize, max_retries: u32) -> (Outcome, usize, u32) {
        let profile = DeviceProfile::new(64)
            .with_base_address(0)
            .with_address_space(64 * 16)
            .with_max_retries(max_retries);
        let (device, events) = SimulatedBootloader::new(plan);
        let mut c = FlashCoordinator::new(device, BarSink::new(ProgressBar::hidden()));
        let h = c.start_flash(&vec![0x5A; 64 * pages], &profile).unwrap();
        let outcome = run_session_with(&mut c, h, &events, || false).unwrap();
        let (device, sink) = c.into_parts();
        (outcome, device.writes().len(), sink.retries())
    }

    #[test]
    fn test_bar_sink_counts_resends() {
        let (outcome, writes, retries) =
            run_simulated(FaultPlan::default().with_page_errors(1, 2, 3), 3, 3);
        assert_eq!(outcome, Outcome::Completed);
        assert_eq!(writes, 5);
        assert_eq!(retries, 2);
    }

    #[test]
    fn test_bar_sink_exhausted_retries_not_overcounted() {
        let (outcome, writes, retries) =
            run_simulated(FaultPlan::default().with_page_errors(0, 10, 7), 2, 2);
        assert_eq!(
            outcome,
            Outcome::Failed {
                reason: FailureReason::DeviceError { code: 7 }
            }
        );
        assert_eq!(writes, 3);
        assert_eq!(retries, 2);
    }

    #[test]
    fn test_bar_sink_retrying_then_failed_is_not_a_resend() {
        let mut sink = BarSink::new(ProgressBar::hidden());
        let event = |state| StateEvent {
            pages_done: 0,
            pages_total: 4,
            state,
            error: Some(FailureReason::DeviceError { code: 3 }),
        };
        sink.on_state(&event(FlashState::Retrying));
        sink.on_state(&event(FlashState::Failed));
        assert_eq!(sink.retries(), 0);
    }

    #[test]
    fn test_bar_sink_tracks_position() {
        let pb = ProgressBar::hidden();
        let mut sink = BarSink::new(pb.clone());
        sink.on_progress(&Progress {
            pages_done: 3,
            pages_total: 8,
            state: FlashState::Sending,
        });
        assert_eq!(pb.position(), 3);
        assert_eq!(pb.length(), Some(8));

        sink.on_terminal(&Outcome::Completed);
        assert!(pb.is_finished());
    }
}
