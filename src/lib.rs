//! slotrace - Adversarial appointment-slot watcher
//!
//! A resilient polling-and-booking system that races other callers for
//! scarce appointment slots released by a public scheduling backend.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`config`] - Configuration management and settings
//! - [`client`] - Typed backend clients (direct HTTP and browser-simulated)
//! - [`evasion`] - Fingerprint rotation, backoff and adaptive poll cadence
//! - [`status`] - Lifecycle status machine with transition broadcast
//! - [`coordinator`] - Dual-strategy polling loops and the booking gate
//! - [`notifications`] - Outbound alert channels
//! - [`models`] - Core data structures and types
//!
//! # Example
//!
//! ```no_run
//! use slotrace::config::Config;
//! use slotrace::status::StatusMachine;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let status = Arc::new(StatusMachine::new());
//!     let _ = (config, status);
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod evasion;
pub mod models;
pub mod notifications;
pub mod status;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::client::{ClientError, DirectClient, SchedulerApi, SimulatedClient};
    pub use crate::config::Config;
    pub use crate::coordinator::{BookingGate, Coordinator, GateDecision, Strategy};
    pub use crate::error::{Error, ErrorCategory, Result, SlotraceErrorTrait};
    pub use crate::models::{AppointmentSlot, BookingOutcome, PersonalInfo, SlotQuery, StrategyKind};
    pub use crate::status::{Status, StatusMachine, StatusTransition};
}

// Direct re-exports for convenience
pub use models::{AppointmentSlot, BookingOutcome, PersonalInfo, SlotQuery, StrategyKind};
