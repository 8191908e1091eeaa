//! Notification fan-out and status forwarding

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{Channel, Notification, Severity};
use crate::status::{Status, StatusTransition};

/// Fans notifications out to every configured channel
///
/// Delivery is best-effort: failures are logged, never retried, never
/// propagated.
pub struct Notifier {
    channels: Vec<Box<dyn Channel>>,
}

impl Notifier {
    pub fn new() -> Self {
        Self {
            channels: Vec::new(),
        }
    }

    /// Register a delivery channel
    pub fn add_channel(&mut self, channel: Box<dyn Channel>) {
        self.channels.push(channel);
    }

    /// Whether any channel is configured
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Deliver one notification through every channel
    pub async fn broadcast(&self, notification: &Notification) {
        for channel in &self.channels {
            match channel.send(notification).await {
                Ok(status) if status.success => {
                    debug!(channel = channel.name(), "Notification delivered");
                }
                Ok(status) => {
                    warn!(channel = channel.name(), status = %status, "Notification not delivered");
                }
                Err(e) => {
                    warn!(channel = channel.name(), error = %e, "Notification channel failed");
                }
            }
        }
    }

    /// Forward noteworthy status transitions to the channels
    ///
    /// Consumes a [`crate::status::StatusMachine`] subscription; routine
    /// transitions (checking, no slots) are skipped. The task ends when
    /// the status machine is dropped.
    pub fn spawn_status_forwarder(
        self: Arc<Self>,
        mut transitions: mpsc::UnboundedReceiver<StatusTransition>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(transition) = transitions.recv().await {
                if let Some(notification) = notification_for(&transition) {
                    self.broadcast(&notification).await;
                }
            }
            debug!("Status forwarder finished");
        })
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}

/// Map a status transition to an outbound notification, if it deserves
/// one
fn notification_for(transition: &StatusTransition) -> Option<Notification> {
    let details = transition.details.clone().unwrap_or_default();

    match transition.current {
        Status::SlotFound => Some(Notification::new(Severity::Info, "Slot found", details)),
        Status::BookingSucceeded => Some(Notification::new(
            Severity::Critical,
            "Appointment booked",
            details,
        )),
        Status::BookingFailed => Some(Notification::new(
            Severity::Warning,
            "Booking failed",
            details,
        )),
        Status::TransportError => Some(Notification::new(
            Severity::Warning,
            "Backend unreachable",
            details,
        )),
        Status::Checking | Status::NoSlots | Status::BookingInProgress => None,
    }
}
