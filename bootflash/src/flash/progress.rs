//! Progress events and sinks.
//!
//! The coordinator talks to the outside world in one direction only: it
//! pushes events into a [`ProgressSink`]. A sink cannot reach back into the
//! coordinator while an event is being delivered.

use super::state::{FailureReason, FlashState, Outcome};
use std::sync::mpsc::Sender;

/// Emitted on every state transition.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StateEvent {
    /// Pages acknowledged so far.
    pub pages_done: usize,
    /// Pages in the session.
    pub pages_total: usize,
    /// State just entered.
    pub state: FlashState,
    /// Error behind a `Retrying` or `Failed` state.
    pub error: Option<FailureReason>,
}

/// Emitted each time a page is acknowledged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Progress {
    /// Pages acknowledged so far.
    pub pages_done: usize,
    /// Pages in the session.
    pub pages_total: usize,
    /// State the session moves to after this acknowledgment: `Sending` for
    /// the next page, or `Completed` after the last one.
    pub state: FlashState,
}

impl Progress {
    /// Completion percentage, recomputed from the counts.
    pub fn percent(&self) -> u8 {
        if self.pages_total == 0 {
            return 100;
        }
        // pages_done <= pages_total, so this is at most 100
        #[allow(clippy::cast_possible_truncation)]
        let percent = (self.pages_done * 100 / self.pages_total) as u8;
        percent
    }
}

/// Any event a sink can receive.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ProgressEvent {
    /// A state transition.
    State(StateEvent),
    /// A page was acknowledged.
    Progress(Progress),
    /// The session ended.
    Terminal(Outcome),
}

/// Receiver of coordinator events.
///
/// Implementations must return quickly: delivery is fire-and-forget from the
/// coordinator's point of view.
pub trait ProgressSink {
    /// A state transition happened.
    fn on_state(&mut self, _event: &StateEvent) {}

    /// A page was acknowledged.
    fn on_progress(&mut self, progress: &Progress);

    /// The session ended. Called exactly once per session.
    fn on_terminal(&mut self, outcome: &Outcome);
}

impl<S: ProgressSink + ?Sized> ProgressSink for Box<S> {
    fn on_state(&mut self, event: &StateEvent) {
        (**self).on_state(event);
    }

    fn on_progress(&mut self, progress: &Progress) {
        (**self).on_progress(progress);
    }

    fn on_terminal(&mut self, outcome: &Outcome) {
        (**self).on_terminal(outcome);
    }
}

/// Sink that drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpSink;

impl ProgressSink for NoOpSink {
    fn on_progress(&mut self, _progress: &Progress) {}

    fn on_terminal(&mut self, _outcome: &Outcome) {}
}

/// Sink that forwards events over a channel.
///
/// Sending never blocks; events are dropped once the receiver is gone.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: Sender<ProgressEvent>,
}

impl ChannelSink {
    /// Forward events into `tx`.
    pub fn new(tx: Sender<ProgressEvent>) -> Self {
        Self { tx }
    }

    fn forward(&self, event: ProgressEvent) {
        let _ = self.tx.send(event);
    }
}

impl ProgressSink for ChannelSink {
    fn on_state(&mut self, event: &StateEvent) {
        self.forward(ProgressEvent::State(event.clone()));
    }

    fn on_progress(&mut self, progress: &Progress) {
        self.forward(ProgressEvent::Progress(*progress));
    }

    fn on_terminal(&mut self, outcome: &Outcome) {
        self.forward(ProgressEvent::Terminal(outcome.clone()));
    }
}

/// Sink that keeps every event in memory.
#[derive(Debug, Default, Clone)]
pub struct EventLog {
    events: Vec<ProgressEvent>,
}

impl EventLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// All events in delivery order.
    pub fn events(&self) -> &[ProgressEvent] {
        &self.events
    }

    /// Only the per-page progress events.
    pub fn progress(&self) -> Vec<Progress> {
        self.events
            .iter()
            .filter_map(|e| match e {
                ProgressEvent::Progress(p) => Some(*p),
                _ => None,
            })
            .collect()
    }

    /// The sequence of states entered.
    pub fn states(&self) -> Vec<FlashState> {
        self.events
            .iter()
            .filter_map(|e| match e {
                ProgressEvent::State(s) => Some(s.state),
                _ => None,
            })
            .collect()
    }

    /// Every terminal outcome reported.
    pub fn terminals(&self) -> Vec<Outcome> {
        self.events
            .iter()
            .filter_map(|e| match e {
                ProgressEvent::Terminal(o) => Some(o.clone()),
                _ => None,
            })
            .collect()
    }
}

impl ProgressSink for EventLog {
    fn on_state(&mut self, event: &StateEvent) {
        self.events.push(ProgressEvent::State(event.clone()));
    }

    fn on_progress(&mut self, progress: &Progress) {
        self.events.push(ProgressEvent::Progress(*progress));
    }

    fn on_terminal(&mut self, outcome: &Outcome) {
        self.events.push(ProgressEvent::Terminal(outcome.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn test_percent_is_recomputed() {
        let p = |done, total| Progress {
            pages_done: done,
            pages_total: total,
            state: FlashState::Sending,
        };
        assert_eq!(p(0, 3).percent(), 0);
        assert_eq!(p(1, 3).percent(), 33);
        assert_eq!(p(2, 3).percent(), 66);
        assert_eq!(p(3, 3).percent(), 100);
        assert_eq!(p(0, 0).percent(), 100);
    }

    #[test]
    fn test_channel_sink_survives_dropped_receiver() {
        let (tx, rx) = mpsc::channel();
        let mut sink = ChannelSink::new(tx);
        sink.on_terminal(&Outcome::Completed);
        assert_eq!(rx.recv().unwrap(), ProgressEvent::Terminal(Outcome::Completed));

        drop(rx);
        sink.on_terminal(&Outcome::Completed);
    }
}
