//! Direct HTTP transport
//!
//! Issues raw GET requests at the backend with browser-like headers built
//! from the active fingerprint profile, a request-rate cap, and retry of
//! transient failures. This is the cheap, fast vantage point; the
//! browser-simulated variant covers the case where the backend treats
//! non-browser traffic differently.

use async_trait::async_trait;
use chrono::NaiveDate;
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, USER_AGENT},
    Client,
};
use serde_json::Value;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
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
const DEFAULT_PRE_REQUEST_DELAY_MS: (u64, u64) = (50, 350);

/// Scheduling-backend client speaking plain HTTPS
pub struct DirectClient {
    /// HTTP client with configured timeout and compression
    client: Client,

    /// Base URL all three endpoints hang off
    base_url: Url,

    /// Shared fingerprint pool; swapped before every request
    rotator: Arc<FingerprintRotator>,

    /// Retry schedule for transient failures
    backoff: BackoffPolicy,

    /// Rate limiter to control request frequency
    rate_limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,

    /// Min/max milliseconds of unconditional pre-request jitter
    pre_request_delay_ms: (u64, u64),
}

impl DirectClient {
    /// Create a client with default backoff, timeout and rate cap
    pub fn new(base_url: &str, rotator: Arc<FingerprintRotator>) -> ClientResult<Self> {
        Self::with_config(
            base_url,
            rotator,
            BackoffPolicy::default(),
            2,
            Duration::from_secs(30),
        )
    }

    /// Create a client with custom configuration
    pub fn with_config(
        base_url: &str,
        rotator: Arc<FingerprintRotator>,
        backoff: BackoffPolicy,
        requests_per_second: u32,
        timeout: Duration,
    ) -> ClientResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .gzip(true)
            .cookie_store(true)
            .build()?;

        let base_url = Url::parse(base_url).map_err(|e| ClientError::InvalidUrl(e.to_string()))?;

        let rate = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::new(1).unwrap());
        let rate_limiter = RateLimiter::direct(Quota::per_second(rate));

        Ok(Self {
            client,
            base_url,
            rotator,
            backoff,
            rate_limiter,
            pre_request_delay_ms: DEFAULT_PRE_REQUEST_DELAY_MS,
        })
    }

    /// Override the pre-request jitter bounds; `(0, 0)` disables it
    pub fn with_pre_request_delay(mut self, min_ms: u64, max_ms: u64) -> Self {
        self.pre_request_delay_ms = (min_ms, max_ms);
        self
    }

    /// Issue one endpoint call: rate-cap, jitter, fingerprint swap, then
    /// GET with retry of transient failures
    async fn fetch_json(
        &self,
        endpoint: &'static str,
        params: &[(&str, String)],
    ) -> ClientResult<Value> {
        self.rate_limiter.until_ready().await;

        let url = self
            .base_url
            .join(endpoint)
            .map_err(|e| ClientError::InvalidUrl(e.to_string()))?;

        retry_with_backoff(&self.backoff, endpoint, |_attempt| {
            let url = url.clone();
            async move {
                pre_request_jitter(self.pre_request_delay_ms).await;

                let profile = self.rotator.rotate();
                let headers = build_headers(profile);

                let response = self
                    .client
                    .get(url)
                    .query(params)
                    .headers(headers)
                    .send()
                    .await;

                match response {
                    Ok(response) => {
                        let status = response.status();
                        if status.is_success() {
                            response.json::<Value>().await.map_err(|e| {
                                AttemptError::Fatal(ClientError::Validation {
                                    endpoint,
                                    reason: format!("body is not JSON: {e}"),
                                })
                            })
                        } else if super::is_retryable_status(status.as_u16()) {
                            Err(AttemptError::Retryable(format!("HTTP {status}")))
                        } else {
                            Err(AttemptError::Fatal(ClientError::Api {
                                endpoint,
                                status: status.as_u16(),
                            }))
                        }
                    }
                    Err(e) if e.is_timeout() => {
                        Err(AttemptError::Retryable("request timed out".into()))
                    }
                    Err(e) => Err(AttemptError::Retryable(e.to_string())),
                }
            }
        })
        .await
    }
}

#[async_trait]
impl SchedulerApi for DirectClient {
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

/// Build browser-like AJAX headers from a fingerprint profile
fn build_headers(profile: &FingerprintProfile) -> HeaderMap {
    let mut headers = HeaderMap::new();

    headers.insert(USER_AGENT, HeaderValue::from_static(profile.user_agent));
    headers.insert(
        ACCEPT,
        HeaderValue::from_static("application/json, text/plain, */*"),
    );
    if let Ok(value) = HeaderValue::from_str(&profile.accept_language()) {
        headers.insert(ACCEPT_LANGUAGE, value);
    }

    headers.insert(
        HeaderName::from_static("x-requested-with"),
        HeaderValue::from_static("XMLHttpRequest"),
    );

    // Sec-Fetch headers as a browser would send them for an AJAX call
    headers.insert(
        HeaderName::from_static("sec-fetch-dest"),
        HeaderValue::from_static("empty"),
    );
    headers.insert(
        HeaderName::from_static("sec-fetch-mode"),
        HeaderValue::from_static("cors"),
    );
    headers.insert(
        HeaderName::from_static("sec-fetch-site"),
        HeaderValue::from_static("same-origin"),
    );

    headers
}
