//! The shared booking gate
//!
//! Both polling loops coordinate through exactly one piece of mutable
//! state: the pair (in_progress, successful). Reads and writes happen as
//! a single critical section so the two loops can never both pass the
//! gate, and the API exposes only try-acquire, release and mark-success.

use std::sync::Mutex;

#[derive(Debug, Default)]
struct GateState {
    /// A booking attempt is in flight somewhere
    in_progress: bool,

    /// The slot has been claimed; terminal for the whole run
    successful: bool,
}

/// Outcome of a try-acquire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// Caller owns the gate and must release it (or mark success)
    Acquired,
    /// Another loop is mid-booking; skip this attempt, keep polling
    Busy,
    /// The slot is already booked; stop polling
    Finished,
}

/// Mutual-exclusion gate for the single booking attempt
#[derive(Debug, Default)]
pub struct BookingGate {
    state: Mutex<GateState>,
}

impl BookingGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check-then-set in one critical section
    pub fn try_acquire(&self) -> GateDecision {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.successful {
            GateDecision::Finished
        } else if state.in_progress {
            GateDecision::Busy
        } else {
            state.in_progress = true;
            GateDecision::Acquired
        }
    }

    /// Release after a failed or abandoned attempt
    pub fn release(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.in_progress = false;
    }

    /// Record the terminal success; returns `true` only for the first
    /// caller, which makes it the once-guard for the success side effect
    pub fn mark_success(&self) -> bool {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.in_progress = false;
        if state.successful {
            false
        } else {
            state.successful = true;
            true
        }
    }

    /// Whether the run is over (slot claimed)
    pub fn is_finished(&self) -> bool {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .successful
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_acquire_release_cycle() {
        let gate = BookingGate::new();

        assert_eq!(gate.try_acquire(), GateDecision::Acquired);
        assert_eq!(gate.try_acquire(), GateDecision::Busy);

        gate.release();
        assert_eq!(gate.try_acquire(), GateDecision::Acquired);
    }

    #[test]
    fn test_success_is_terminal() {
        let gate = BookingGate::new();

        assert_eq!(gate.try_acquire(), GateDecision::Acquired);
        assert!(gate.mark_success());
        assert!(gate.is_finished());

        assert_eq!(gate.try_acquire(), GateDecision::Finished);
        gate.release();
        // release never un-finishes the gate
        assert_eq!(gate.try_acquire(), GateDecision::Finished);
    }

    #[test]
    fn test_mark_success_fires_once() {
        let gate = BookingGate::new();
        assert!(gate.mark_success());
        assert!(!gate.mark_success());
    }

    #[test]
    fn test_concurrent_acquire_admits_one() {
        let gate = Arc::new(BookingGate::new());
        let mut handles = Vec::new();

        for _ in 0..16 {
            let gate = Arc::clone(&gate);
            handles.push(std::thread::spawn(move || gate.try_acquire()));
        }

        let acquired = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|d| *d == GateDecision::Acquired)
            .count();
        assert_eq!(acquired, 1);
    }
}
