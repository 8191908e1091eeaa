//! Detection-evasion primitives
//!
//! The backend rate-limits and fingerprints its callers, so every request
//! cycle varies its client identity and its timing:
//!
//! - [`fingerprint`] - rotating pool of client identity profiles
//! - [`backoff`] - jittered exponential retry delays
//! - [`interval`] - adaptive poll cadence with high-traffic floors

pub mod backoff;
pub mod fingerprint;
pub mod interval;

pub use backoff::BackoffPolicy;
pub use fingerprint::{FingerprintProfile, FingerprintRotator};
pub use interval::IntervalPolicy;
