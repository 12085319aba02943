//! Reduces a chronological event stream to open/close sessions.

use log::{debug, warn};
use time::OffsetDateTime;

use crate::models::{Event, EventKind, Session};
use crate::utils::format_datetime;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PairingState {
    Idle,
    Pending(OffsetDateTime),
}

/// Two-state pairing of open and close events.
///
/// Events must arrive in non-decreasing timestamp order. A second open while
/// one is pending and a close with nothing pending are both ignored with a
/// warning. An open still pending when the stream ends yields no session.
#[derive(Debug)]
pub struct EventPairer {
    state: PairingState,
    sessions: Vec<Session>,
    anomalies: usize,
}

impl Default for EventPairer {
    fn default() -> Self {
        Self::new()
    }
}

impl EventPairer {
    pub fn new() -> Self {
        EventPairer {
            state: PairingState::Idle,
            sessions: Vec::new(),
            anomalies: 0,
        }
    }

    /// Feed the next event; returns the session it completes, if any.
    pub fn push(&mut self, event: &Event) -> Option<Session> {
        let ts = event.timestamp;
        match (self.state, event.kind) {
            (PairingState::Idle, EventKind::Open) => {
                self.state = PairingState::Pending(ts);
                None
            }
            (PairingState::Pending(opened_at), EventKind::Open) => {
                warn!(
                    "Duplicate open at {} while open since {}, ignoring",
                    format_datetime(&ts),
                    format_datetime(&opened_at)
                );
                self.anomalies += 1;
                None
            }
            (PairingState::Pending(opened_at), EventKind::Close) => {
                let session = Session {
                    opened_at,
                    closed_at: ts,
                };
                self.state = PairingState::Idle;
                self.sessions.push(session);
                Some(session)
            }
            (PairingState::Idle, EventKind::Close) => {
                warn!(
                    "Close without matching open at {}, ignoring",
                    format_datetime(&ts)
                );
                self.anomalies += 1;
                None
            }
        }
    }

    /// Pairing anomalies seen so far (duplicate opens and orphan closes).
    pub fn anomalies(&self) -> usize {
        self.anomalies
    }

    /// End of stream: hand back the completed sessions.
    pub fn finish(self) -> Vec<Session> {
        if let PairingState::Pending(opened_at) = self.state {
            debug!(
                "Open since {} has no close yet, not reported",
                format_datetime(&opened_at)
            );
        }
        self.sessions
    }
}
