//! Typed clients for the scheduling backend
//!
//! Two transports implement the same [`SchedulerApi`] contract:
//!
//! - [`DirectClient`] issues raw HTTP GETs with reqwest
//! - [`SimulatedClient`] evaluates the same requests inside a live browser
//!   page context, reached through the [`BrowserPage`] trait
//!
//! Both validate response shape against the wire contract, classify
//! failures once at this boundary, and retry only transient ones with
//! jittered exponential backoff. Every underlying call is preceded by a
//! small random delay and a fingerprint swap to break request-pattern
//! regularity.

pub mod direct;
pub mod simulated;
mod validate;

pub use direct::DirectClient;
pub use simulated::{BridgePage, BrowserPage, PageError, SimulatedClient};

use async_trait::async_trait;
use chrono::NaiveDate;
use rand::Rng;
use std::future::Future;
use thiserror::Error;
use tracing::{debug, warn};

use crate::evasion::BackoffPolicy;
use crate::models::{AppointmentSlot, BookingOutcome, PersonalInfo, SlotQuery};

/// Backend endpoint names, also used as error context
pub const AVAILABLE_DAYS: &str = "available-days";
pub const AVAILABLE_APPOINTMENTS: &str = "available-appointments";
pub const BOOK_APPOINTMENT: &str = "book-appointment";

/// Result type for client operations
pub type ClientResult<T> = Result<T, ClientError>;

/// Failure taxonomy, decided once at the client boundary
///
/// Callers never re-derive retryability; a [`ClientError::Transport`] has
/// already exhausted its retry budget by the time it surfaces.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Backend payload no longer matches the expected shape. Not retried:
    /// a malformed response means the contract changed, not transience.
    #[error("{endpoint}: unexpected payload shape: {reason}")]
    Validation {
        endpoint: &'static str,
        reason: String,
    },

    /// Non-2xx response with a non-retryable status code
    #[error("{endpoint}: backend returned HTTP {status}")]
    Api { endpoint: &'static str, status: u16 },

    /// Timeout, connection failure or retryable status, surfaced only
    /// after the retry budget is spent
    #[error("{endpoint}: transport failed after {attempts} attempts: {reason}")]
    Transport {
        endpoint: &'static str,
        attempts: u32,
        reason: String,
    },

    /// Base or endpoint URL could not be constructed
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// The underlying HTTP client could not be built
    #[error("HTTP client setup failed: {0}")]
    Setup(#[from] reqwest::Error),
}

impl ClientError {
    /// Check if this error is recoverable (worth polling again later)
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }

    /// Endpoint the failure belongs to, if any
    pub fn endpoint(&self) -> Option<&'static str> {
        match self {
            Self::Validation { endpoint, .. }
            | Self::Api { endpoint, .. }
            | Self::Transport { endpoint, .. } => Some(endpoint),
            Self::InvalidUrl(_) | Self::Setup(_) => None,
        }
    }
}

/// Shared contract for both transport variants
///
/// All three operations are idempotent from the caller's perspective
/// except [`SchedulerApi::book`], which claims the scarce resource.
#[async_trait]
pub trait SchedulerApi: Send + Sync {
    /// Days in the queried range with at least one open slot,
    /// chronological and deduplicated. The backend's "no appointments in
    /// this scope" sentinel maps to an empty list, not an error.
    async fn list_available_days(&self, query: &SlotQuery) -> ClientResult<Vec<NaiveDate>>;

    /// Slots offered for one specific day
    async fn list_slots(
        &self,
        day: NaiveDate,
        query: &SlotQuery,
    ) -> ClientResult<Vec<AppointmentSlot>>;

    /// Attempt to claim a slot. `BookingOutcome.success == false` means
    /// another caller won the race.
    async fn book(
        &self,
        day: NaiveDate,
        slot: &AppointmentSlot,
        applicant: &PersonalInfo,
        query: &SlotQuery,
    ) -> ClientResult<BookingOutcome>;
}

/// Determine if a status code should trigger a retry
///
/// Retry on 408, 429, 500, 502, 503, 504; everything else non-2xx fails
/// immediately.
pub fn is_retryable_status(status: u16) -> bool {
    matches!(status, 408 | 429 | 500 | 502 | 503 | 504)
}

/// Per-attempt outcome used inside the retry loop
pub(crate) enum AttemptError {
    /// Transient; retry after backoff
    Retryable(String),
    /// Final; surface to the caller unchanged
    Fatal(ClientError),
}

/// Run one operation with jittered exponential backoff
///
/// The closure is invoked once per attempt (`0..=max_retries`). Transient
/// failures sleep and retry; fatal ones return immediately. After the
/// budget is spent the last transient reason surfaces as
/// [`ClientError::Transport`].
pub(crate) async fn retry_with_backoff<T, F, Fut>(
    policy: &BackoffPolicy,
    endpoint: &'static str,
    mut op: F,
) -> ClientResult<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, AttemptError>>,
{
    let mut last_reason = String::new();

    for attempt in 0..=policy.max_retries {
        if attempt > 0 {
            let delay = policy.delay_for(attempt - 1, &mut rand::thread_rng());
            debug!(
                endpoint = endpoint,
                attempt = attempt,
                delay_ms = delay.as_millis() as u64,
                "Retrying after backoff"
            );
            tokio::time::sleep(delay).await;
        }

        match op(attempt).await {
            Ok(value) => {
                if attempt > 0 {
                    debug!(endpoint = endpoint, attempt = attempt, "Succeeded after retry");
                }
                return Ok(value);
            }
            Err(AttemptError::Fatal(err)) => {
                warn!(endpoint = endpoint, error = %err, "Non-retryable failure");
                return Err(err);
            }
            Err(AttemptError::Retryable(reason)) => {
                warn!(
                    endpoint = endpoint,
                    attempt = attempt,
                    max_retries = policy.max_retries,
                    reason = %reason,
                    "Transient failure"
                );
                last_reason = reason;
            }
        }
    }

    Err(ClientError::Transport {
        endpoint,
        attempts: policy.max_retries + 1,
        reason: last_reason,
    })
}

/// Sleep a small random pre-request delay (tens to hundreds of
/// milliseconds), independent of retry backoff
pub(crate) async fn pre_request_jitter(range_ms: (u64, u64)) {
    let (min, max) = range_ms;
    if max == 0 {
        return;
    }
    let ms = {
        let mut rng = rand::thread_rng();
        rng.gen_range(min..=max.max(min))
    };
    tokio::time::sleep(std::time::Duration::from_millis(ms)).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast_policy(max_retries: u32) -> BackoffPolicy {
        BackoffPolicy::with_delays(max_retries, 1, 2)
    }

    #[test]
    fn test_retryable_status_set() {
        for status in [408, 429, 500, 502, 503, 504] {
            assert!(is_retryable_status(status));
        }
        for status in [200, 400, 401, 403, 404, 422] {
            assert!(!is_retryable_status(status));
        }
    }

    #[tokio::test]
    async fn test_retry_succeeds_after_transient_failures() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&attempts);

        let result = retry_with_backoff(&fast_policy(3), AVAILABLE_DAYS, move |_| {
            let counter = Arc::clone(&counter);
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(AttemptError::Retryable("HTTP 503".into()))
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_exhaustion_counts_attempts() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&attempts);

        let result: ClientResult<()> =
            retry_with_backoff(&fast_policy(2), BOOK_APPOINTMENT, move |_| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(AttemptError::Retryable("connection refused".into()))
                }
            })
            .await;

        // max_retries + 1 total attempts
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        match result.unwrap_err() {
            ClientError::Transport {
                endpoint, attempts, ..
            } => {
                assert_eq!(endpoint, BOOK_APPOINTMENT);
                assert_eq!(attempts, 3);
            }
            other => panic!("expected Transport, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_fatal_error_short_circuits() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&attempts);

        let result: ClientResult<()> =
            retry_with_backoff(&fast_policy(5), AVAILABLE_DAYS, move |_| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(AttemptError::Fatal(ClientError::Api {
                        endpoint: AVAILABLE_DAYS,
                        status: 404,
                    }))
                }
            })
            .await;

        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert!(matches!(
            result.unwrap_err(),
            ClientError::Api { status: 404, .. }
        ));
    }

    #[test]
    fn test_error_recoverability() {
        let transport = ClientError::Transport {
            endpoint: AVAILABLE_DAYS,
            attempts: 4,
            reason: "timeout".into(),
        };
        assert!(transport.is_recoverable());
        assert_eq!(transport.endpoint(), Some(AVAILABLE_DAYS));

        let validation = ClientError::Validation {
            endpoint: AVAILABLE_APPOINTMENTS,
            reason: "not an array".into(),
        };
        assert!(!validation.is_recoverable());
    }
}
