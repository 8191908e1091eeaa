//! Browser-simulated transport
//!
//! The backend fingerprints its callers, so the second vantage point
//! issues the very same endpoint calls from inside a live browser page
//! context. The automation engine itself is external; this module only
//! speaks to its page handle through the [`BrowserPage`] trait and ships
//! [`BridgePage`], a thin adapter for an engine exposed over a local JSON
//! bridge.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use super::validate;
use super::{
    pre_request_jitter, retry_with_backoff, AttemptError, ClientError, ClientResult, SchedulerApi,
    AVAILABLE_APPOINTMENTS, AVAILABLE_DAYS, BOOK_APPOINTMENT,
};
use crate::evasion::{BackoffPolicy, FingerprintProfile, FingerprintRotator};
use crate::models::{
    AppointmentSlot, BookingOutcome, PersonalInfo, SlotQuery, BACKEND_DATE_FORMAT,
};

/// Default bounds for the unconditional pre-request delay
const DEFAULT_PRE_REQUEST_DELAY_MS: (u64, u64) = (80, 500);

/// Failures raised by a browser page handle
#[derive(Debug, Error)]
pub enum PageError {
    /// The page navigation hit its hard timeout; the browser session
    /// needs to be re-established, retrying the individual request is
    /// pointless
    #[error("page navigation timed out")]
    NavigationTimeout,

    /// The in-page network call could not reach the backend
    #[error("connection failed in page context: {0}")]
    Connection(String),

    /// The injected fetch script itself failed to run
    #[error("script evaluation failed: {0}")]
    Evaluation(String),
}

/// A live browser page capable of executing network requests and
/// returning JSON
///
/// Implementations are provided by the (external) automation engine. On
/// failure of the in-page fetch the returned payload may also be a
/// structured `{error, connectionError?}` object instead of an `Err`.
#[async_trait]
pub trait BrowserPage: Send + Sync {
    /// Present the given identity to the backend for subsequent fetches
    async fn apply_profile(&self, profile: &FingerprintProfile) -> Result<(), PageError>;

    /// Evaluate a fetch of `url` inside the page context and return the
    /// raw JSON payload
    async fn fetch_json(&self, url: &str) -> Result<Value, PageError>;
}

/// Scheduling-backend client routed through a browser page
pub struct SimulatedClient {
    page: Arc<dyn BrowserPage>,
    base_url: Url,
    rotator: Arc<FingerprintRotator>,
    backoff: BackoffPolicy,
    pre_request_delay_ms: (u64, u64),
}

impl SimulatedClient {
    /// Create a client over an established page handle
    pub fn new(
        page: Arc<dyn BrowserPage>,
        base_url: &str,
        rotator: Arc<FingerprintRotator>,
    ) -> ClientResult<Self> {
        Self::with_backoff(page, base_url, rotator, BackoffPolicy::default())
    }

    /// Create a client with a custom retry schedule
    pub fn with_backoff(
        page: Arc<dyn BrowserPage>,
        base_url: &str,
        rotator: Arc<FingerprintRotator>,
        backoff: BackoffPolicy,
    ) -> ClientResult<Self> {
        let base_url = Url::parse(base_url).map_err(|e| ClientError::InvalidUrl(e.to_string()))?;
        Ok(Self {
            page,
            base_url,
            rotator,
            backoff,
            pre_request_delay_ms: DEFAULT_PRE_REQUEST_DELAY_MS,
        })
    }

    /// Override the pre-request jitter bounds; `(0, 0)` disables it
    pub fn with_pre_request_delay(mut self, min_ms: u64, max_ms: u64) -> Self {
        self.pre_request_delay_ms = (min_ms, max_ms);
        self
    }

    fn endpoint_url(
        &self,
        endpoint: &'static str,
        params: &[(&str, String)],
    ) -> ClientResult<Url> {
        let mut url = self
            .base_url
            .join(endpoint)
            .map_err(|e| ClientError::InvalidUrl(e.to_string()))?;
        {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in params {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    /// Issue one endpoint call through the page: jitter, fingerprint
    /// swap, in-page fetch, retry of transient failures
    async fn fetch_json(
        &self,
        endpoint: &'static str,
        params: &[(&str, String)],
    ) -> ClientResult<Value> {
        let url = self.endpoint_url(endpoint, params)?;
        let url_str = url.as_str();

        retry_with_backoff(&self.backoff, endpoint, |attempt| async move {
            pre_request_jitter(self.pre_request_delay_ms).await;

            let profile = self.rotator.rotate();
            if let Err(e) = self.page.apply_profile(profile).await {
                // A profile that fails to apply leaves the previous one
                // active; the fetch is still worth issuing
                warn!(endpoint = endpoint, error = %e, "Fingerprint apply failed");
            }

            match self.page.fetch_json(url_str).await {
                Ok(raw) => classify_page_payload(raw),
                Err(PageError::NavigationTimeout) => {
                    Err(AttemptError::Fatal(ClientError::Transport {
                        endpoint,
                        attempts: attempt + 1,
                        reason: "page navigation timed out; browser session must be restarted"
                            .into(),
                    }))
                }
                Err(PageError::Connection(reason)) => Err(AttemptError::Retryable(reason)),
                Err(PageError::Evaluation(reason)) => {
                    Err(AttemptError::Fatal(ClientError::Validation {
                        endpoint,
                        reason: format!("in-page script failed: {reason}"),
                    }))
                }
            }
        })
        .await
    }
}

/// The page wrapper reports in-page fetch failures as a structured
/// `{error, connectionError?}` object rather than a thrown error; fold
/// those back into the transient-failure path
fn classify_page_payload(raw: Value) -> Result<Value, AttemptError> {
    if let Some(obj) = raw.as_object() {
        if let Some(error) = obj.get("error") {
            let message = error.as_str().unwrap_or("in-page fetch failed").to_string();
            let connection = obj
                .get("connectionError")
                .and_then(Value::as_bool)
                .unwrap_or(false);

            let reason = if connection {
                format!("connection error: {message}")
            } else {
                message
            };
            return Err(AttemptError::Retryable(reason));
        }
    }
    Ok(raw)
}

#[async_trait]
impl SchedulerApi for SimulatedClient {
    async fn list_available_days(&self, query: &SlotQuery) -> ClientResult<Vec<NaiveDate>> {
        let params = [
            (
                "startDate",
                query.start_date.format(BACKEND_DATE_FORMAT).to_string(),
            ),
            (
                "endDate",
                query.end_date.format(BACKEND_DATE_FORMAT).to_string(),
            ),
            ("officeId", query.office_id.to_string()),
            ("serviceId", query.service_id.to_string()),
            ("serviceCount", query.service_count.to_string()),
        ];

        let raw = self.fetch_json(AVAILABLE_DAYS, &params).await?;
        validate::parse_available_days(&raw).map_err(|reason| ClientError::Validation {
            endpoint: AVAILABLE_DAYS,
            reason,
        })
    }

    async fn list_slots(
        &self,
        day: NaiveDate,
        query: &SlotQuery,
    ) -> ClientResult<Vec<AppointmentSlot>> {
        let params = [
            ("date", day.format(BACKEND_DATE_FORMAT).to_string()),
            ("officeId", query.office_id.to_string()),
            ("serviceId", query.service_id.to_string()),
            ("serviceCount", query.service_count.to_string()),
        ];

        let raw = self.fetch_json(AVAILABLE_APPOINTMENTS, &params).await?;
        validate::parse_slots(&raw, day).map_err(|reason| ClientError::Validation {
            endpoint: AVAILABLE_APPOINTMENTS,
            reason,
        })
    }

    async fn book(
        &self,
        day: NaiveDate,
        slot: &AppointmentSlot,
        applicant: &PersonalInfo,
        query: &SlotQuery,
    ) -> ClientResult<BookingOutcome> {
        let params = [
            ("date", day.format(BACKEND_DATE_FORMAT).to_string()),
            ("time", slot.time.clone()),
            ("officeId", query.office_id.to_string()),
            ("serviceId", query.service_id.to_string()),
            ("serviceCount", query.service_count.to_string()),
            ("name", applicant.name.clone()),
            ("email", applicant.email.clone()),
            ("numberOfPersons", applicant.party_size.to_string()),
        ];

        let raw = self.fetch_json(BOOK_APPOINTMENT, &params).await?;
        validate::parse_booking_outcome(&raw).map_err(|reason| ClientError::Validation {
            endpoint: BOOK_APPOINTMENT,
            reason,
        })
    }
}

/// Page handle for an automation engine exposed over a local JSON bridge
///
/// The bridge contract is small: `GET /status` for liveness,
/// `POST /profile` with the identity to present, and `POST /evaluate`
/// with `{"url": ...}` which returns the raw backend payload (or the
/// structured `{error, connectionError?}` object).
pub struct BridgePage {
    client: reqwest::Client,
    base_url: Url,
}

impl BridgePage {
    /// Connect to the bridge, retrying a fixed number of times
    ///
    /// Repeated failure here is process-fatal for the caller: without a
    /// browser session the simulated strategy cannot run.
    pub async fn connect(bridge_url: &str, attempts: u32) -> Result<Self, PageError> {
        let base_url =
            Url::parse(bridge_url).map_err(|e| PageError::Connection(e.to_string()))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| PageError::Connection(e.to_string()))?;

        let status_url = base_url
            .join("status")
            .map_err(|e| PageError::Connection(e.to_string()))?;

        let mut last_reason = String::new();
        for attempt in 0..attempts.max(1) {
            if attempt > 0 {
                tokio::time::sleep(Duration::from_secs(2 * attempt as u64)).await;
            }
            match client.get(status_url.clone()).send().await {
                Ok(response) if response.status().is_success() => {
                    debug!(bridge = %base_url, "Browser bridge session established");
                    return Ok(Self { client, base_url });
                }
                Ok(response) => {
                    last_reason = format!("bridge status returned HTTP {}", response.status());
                }
                Err(e) => last_reason = e.to_string(),
            }
            warn!(
                attempt = attempt + 1,
                attempts = attempts,
                reason = %last_reason,
                "Browser bridge not ready"
            );
        }

        Err(PageError::Connection(format!(
            "bridge unreachable after {attempts} attempts: {last_reason}"
        )))
    }

    fn bridge_url(&self, path: &str) -> Result<Url, PageError> {
        self.base_url
            .join(path)
            .map_err(|e| PageError::Connection(e.to_string()))
    }
}

#[async_trait]
impl BrowserPage for BridgePage {
    async fn apply_profile(&self, profile: &FingerprintProfile) -> Result<(), PageError> {
        let url = self.bridge_url("profile")?;
        let payload = json!({
            "userAgent": profile.user_agent,
            "platform": profile.platform,
            "vendor": profile.vendor,
            "languages": profile.languages,
            "screenWidth": profile.screen_width,
            "screenHeight": profile.screen_height,
            "colorDepth": profile.color_depth,
        });

        let response = self
            .client
            .post(url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| PageError::Connection(e.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(PageError::Evaluation(format!(
                "profile override rejected: HTTP {}",
                response.status()
            )))
        }
    }

    async fn fetch_json(&self, url: &str) -> Result<Value, PageError> {
        let bridge = self.bridge_url("evaluate")?;

        let response = self
            .client
            .post(bridge)
            .json(&json!({ "url": url }))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    PageError::NavigationTimeout
                } else {
                    PageError::Connection(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            return Err(PageError::Connection(format!(
                "bridge evaluate returned HTTP {}",
                response.status()
            )));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| PageError::Evaluation(format!("bridge payload is not JSON: {e}")))
    }
}
