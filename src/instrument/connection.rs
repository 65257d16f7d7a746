use serde::{Deserialize, Serialize};
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    Disconnected,
    Connected,
}

/// Emitted only when the state actually changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    Connected,
    Disconnected { detail: String },
}

impl ConnectionEvent {
    pub fn status_line(&self) -> String {
        match self {
            ConnectionEvent::Connected => "CONNECTED".to_string(),
            ConnectionEvent::Disconnected { detail } => format!("Connection failed: {detail}"),
        }
    }
}

/// Binary connected/disconnected view over fetch outcomes. The current
/// state is published on a watch channel so read-only callers can observe
/// it without touching the scheduler.
pub struct ConnectionStateTracker {
    state: watch::Sender<ConnectionState>,
}

impl ConnectionStateTracker {
    pub fn new() -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self { state }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub fn record_success(&self) -> Option<ConnectionEvent> {
        self.transition(ConnectionState::Connected)
            .then_some(ConnectionEvent::Connected)
    }

    pub fn record_failure(&self, detail: impl Into<String>) -> Option<ConnectionEvent> {
        self.transition(ConnectionState::Disconnected)
            .then(|| ConnectionEvent::Disconnected {
                detail: detail.into(),
            })
    }

    fn transition(&self, next: ConnectionState) -> bool {
        self.state.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        })
    }
}

impl Default for ConnectionStateTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_disconnected() {
        let tracker = ConnectionStateTracker::new();
        assert_eq!(tracker.state(), ConnectionState::Disconnected);
        // Failing while already disconnected is not a transition.
        assert_eq!(tracker.record_failure("refused"), None);
    }

    #[test]
    fn one_event_per_contiguous_run() {
        let tracker = ConnectionStateTracker::new();
        let mut events = Vec::new();

        let outcomes = [true, true, false, false, false, true, false, true, true];
        for (i, ok) in outcomes.iter().enumerate() {
            let event = if *ok {
                tracker.record_success()
            } else {
                tracker.record_failure(format!("failure {i}"))
            };
            events.extend(event);
        }

        assert_eq!(
            events,
            vec![
                ConnectionEvent::Connected,
                ConnectionEvent::Disconnected {
                    detail: "failure 2".into()
                },
                ConnectionEvent::Connected,
                ConnectionEvent::Disconnected {
                    detail: "failure 6".into()
                },
                ConnectionEvent::Connected,
            ]
        );
    }

    #[test]
    fn subscribers_observe_transitions() {
        let tracker = ConnectionStateTracker::new();
        let rx = tracker.subscribe();
        tracker.record_success();
        assert_eq!(*rx.borrow(), ConnectionState::Connected);
        assert_eq!(
            ConnectionEvent::Disconnected {
                detail: "timeout".into()
            }
            .status_line(),
            "Connection failed: timeout"
        );
    }
}
