//! Lifecycle status machine with transition broadcast
//!
//! One `StatusMachine` instance is created at startup and passed by
//! reference to everything that reports or observes lifecycle changes.
//! Status is mutated only through [`StatusMachine::update`]; duplicate
//! updates are dropped, and every recorded transition is delivered in
//! order to each subscriber.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Mutex;
use tokio::sync::mpsc;
use tracing::warn;

/// Lifecycle status of the watcher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// A poll cycle is querying the backend
    Checking,
    /// The last poll found no open days in the search window
    NoSlots,
    /// An open slot was spotted
    SlotFound,
    /// A booking call is in flight
    BookingInProgress,
    /// The booking call lost the race or was rejected
    BookingFailed,
    /// The slot was claimed; terminal
    BookingSucceeded,
    /// The backend was unreachable after retry exhaustion
    TransportError,
}

impl Status {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Checking => "checking",
            Self::NoSlots => "no_slots",
            Self::SlotFound => "slot_found",
            Self::BookingInProgress => "booking_in_progress",
            Self::BookingFailed => "booking_failed",
            Self::BookingSucceeded => "booking_succeeded",
            Self::TransportError => "transport_error",
        }
    }

    /// Terminal states admit no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::BookingSucceeded)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One recorded status change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusTransition {
    /// Status before the change
    pub previous: Status,

    /// Status after the change
    pub current: Status,

    /// When the change was recorded
    pub timestamp: DateTime<Utc>,

    /// Free-form context (slot details, failure reason)
    pub details: Option<String>,
}

struct MachineState {
    current: Status,
    history: Vec<StatusTransition>,
    subscribers: Vec<mpsc::UnboundedSender<StatusTransition>>,
}

/// Holds the current status, records transitions and fans them out
///
/// Internally synchronized; safe to call from both polling loops without
/// external locking. Subscribers receive transitions through unbounded
/// channels, so a slow consumer delays its own processing but never loses
/// events or blocks the machine.
pub struct StatusMachine {
    state: Mutex<MachineState>,
}

impl StatusMachine {
    /// Create a machine starting in [`Status::Checking`]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MachineState {
                current: Status::Checking,
                history: Vec::new(),
                subscribers: Vec::new(),
            }),
        }
    }

    /// Register a subscriber; transitions arrive in the order they were
    /// recorded
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<StatusTransition> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.subscribers.push(tx);
        rx
    }

    /// Record a status change and notify subscribers
    ///
    /// A no-op returning `false` when `next` equals the current status or
    /// the machine is already in a terminal state. A closed subscriber is
    /// logged and dropped; it never breaks propagation to the others.
    pub fn update(&self, next: Status, details: Option<String>) -> bool {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        if state.current == next || state.current.is_terminal() {
            return false;
        }

        let transition = StatusTransition {
            previous: state.current,
            current: next,
            timestamp: Utc::now(),
            details,
        };

        state.current = next;
        state.history.push(transition.clone());

        state.subscribers.retain(|tx| {
            if tx.send(transition.clone()).is_err() {
                warn!(status = %transition.current, "Dropping closed status subscriber");
                false
            } else {
                true
            }
        });

        true
    }

    /// Current status
    pub fn current(&self) -> Status {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).current
    }

    /// Full ordered transition record
    pub fn history(&self) -> Vec<StatusTransition> {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .history
            .clone()
    }

    /// Number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .subscribers
            .len()
    }
}

impl Default for StatusMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        let machine = StatusMachine::new();
        assert_eq!(machine.current(), Status::Checking);
        assert!(machine.history().is_empty());
    }

    #[test]
    fn test_duplicate_update_is_noop() {
        let machine = StatusMachine::new();

        assert!(machine.update(Status::NoSlots, None));
        assert!(!machine.update(Status::NoSlots, None));

        let history = machine.history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].previous, Status::Checking);
        assert_eq!(history[0].current, Status::NoSlots);
    }

    #[tokio::test]
    async fn test_subscriber_receives_each_transition_once() {
        let machine = StatusMachine::new();
        let mut rx = machine.subscribe();

        machine.update(Status::SlotFound, Some("2025-03-15 09:00".into()));
        machine.update(Status::SlotFound, None);
        machine.update(Status::BookingInProgress, None);

        let first = rx.recv().await.unwrap();
        assert_eq!(first.current, Status::SlotFound);
        assert_eq!(first.details.as_deref(), Some("2025-03-15 09:00"));

        let second = rx.recv().await.unwrap();
        assert_eq!(second.previous, Status::SlotFound);
        assert_eq!(second.current, Status::BookingInProgress);

        assert!(rx.try_recv().is_err(), "duplicate update must not notify");
    }

    #[test]
    fn test_terminal_state_blocks_transitions() {
        let machine = StatusMachine::new();

        machine.update(Status::SlotFound, None);
        machine.update(Status::BookingInProgress, None);
        machine.update(Status::BookingSucceeded, Some("id 12345".into()));

        assert!(!machine.update(Status::Checking, None));
        assert_eq!(machine.current(), Status::BookingSucceeded);
        assert_eq!(machine.history().len(), 3);
    }

    #[tokio::test]
    async fn test_closed_subscriber_is_dropped() {
        let machine = StatusMachine::new();
        let rx = machine.subscribe();
        let mut live = machine.subscribe();
        drop(rx);

        machine.update(Status::TransportError, Some("connect refused".into()));

        assert_eq!(machine.subscriber_count(), 1);
        let event = live.recv().await.unwrap();
        assert_eq!(event.current, Status::TransportError);
    }

    #[test]
    fn test_status_display() {
        assert_eq!(Status::BookingSucceeded.to_string(), "booking_succeeded");
        assert_eq!(Status::NoSlots.as_str(), "no_slots");
        assert!(Status::BookingSucceeded.is_terminal());
        assert!(!Status::BookingFailed.is_terminal());
    }
}
