//! Configuration management for the slot watcher
//!
//! This module handles loading and validating configuration from
//! environment variables, and converting it into the policy types the
//! rest of the crate consumes.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::coordinator::QueryPlan;
use crate::error::{Error, Result};
use crate::evasion::{BackoffPolicy, IntervalPolicy};
use crate::models::PersonalInfo;
use crate::notifications::SmsConfig;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Scheduling backend configuration
    pub backend: BackendConfig,

    /// Polling cadence configuration
    pub watch: WatchConfig,

    /// Fingerprint / backoff / jitter configuration
    pub evasion: EvasionConfig,

    /// Personal data submitted with the booking
    pub applicant: ApplicantConfig,

    /// Notification configuration
    pub notify: NotifyConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Scheduling backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Base URL the three API endpoints hang off
    pub base_url: String,

    /// Offices checked in parallel every iteration
    pub office_ids: Vec<u32>,

    /// Backend service identifier
    pub service_id: u32,

    /// Number of service units per appointment
    pub service_count: u32,

    /// Length of the rolling search window in days
    pub window_days: u64,

    /// Request timeout in seconds
    pub request_timeout_secs: u64,

    /// Retries per request on transient failures
    pub max_retries: u32,

    /// Rate limit (requests per second) for the direct client
    pub rate_limit_per_sec: u32,

    /// Browser automation bridge URL; the browser strategy is skipped
    /// when unset
    pub browser_bridge_url: Option<String>,
}

/// Polling cadence configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Base interval between direct-client polls, in seconds
    pub direct_interval_secs: u64,

    /// Base interval between browser-client polls, in seconds
    pub browser_interval_secs: u64,

    /// Startup offset of the browser loop so the two loops interleave
    pub browser_offset_secs: u64,

    /// Shorter interval used during high-traffic hours, in seconds
    pub high_traffic_floor_secs: u64,

    /// Local wall-clock hours (0-23) considered high-traffic
    pub high_traffic_hours: Vec<u32>,

    /// Symmetric jitter factor applied to every interval, in `[0, 1)`
    pub interval_jitter: f64,

    /// Hard lower bound for any computed interval, in seconds
    pub min_interval_secs: u64,
}

/// Fingerprint / backoff / jitter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvasionConfig {
    /// First retry delay in milliseconds
    pub backoff_initial_ms: u64,

    /// Retry delay cap in milliseconds
    pub backoff_max_ms: u64,

    /// Backoff jitter factor in `[0, 1)`
    pub backoff_jitter: f64,

    /// Lower bound of the unconditional pre-request delay, milliseconds
    pub pre_request_delay_min_ms: u64,

    /// Upper bound of the unconditional pre-request delay, milliseconds
    pub pre_request_delay_max_ms: u64,
}

/// Personal data submitted with the booking
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicantConfig {
    /// Full name as it should appear on the appointment
    pub name: String,

    /// Contact email the backend confirms to
    pub email: String,

    /// Number of persons the appointment covers
    pub party_size: u32,
}

/// Notification configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    /// SMS gateway endpoint; SMS delivery is disabled when unset
    pub sms_gateway_url: Option<String>,

    /// Destination phone number, E.164 formatted
    pub sms_recipient: Option<String>,

    /// Gateway API key, if the gateway requires one
    pub sms_api_key: Option<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

fn env_string(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_u32_list(name: &str, default: Vec<u32>) -> Vec<u32> {
    match std::env::var(name) {
        Ok(raw) => {
            let parsed: Vec<u32> = raw
                .split(',')
                .filter_map(|part| part.trim().parse::<u32>().ok())
                .collect();
            if parsed.is_empty() {
                default
            } else {
                parsed
            }
        }
        Err(_) => default,
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let config = Self {
            backend: BackendConfig {
                base_url: env_string(
                    "SLOTRACE_BASE_URL",
                    "https://termine.example.org/api/backend/",
                ),
                office_ids: env_u32_list("SLOTRACE_OFFICE_IDS", vec![32]),
                service_id: env_parse("SLOTRACE_SERVICE_ID", 120703),
                service_count: env_parse("SLOTRACE_SERVICE_COUNT", 1),
                window_days: env_parse("SLOTRACE_WINDOW_DAYS", 180),
                request_timeout_secs: env_parse("SLOTRACE_REQUEST_TIMEOUT", 30),
                max_retries: env_parse("SLOTRACE_MAX_RETRIES", 3),
                rate_limit_per_sec: env_parse("SLOTRACE_RATE_LIMIT", 2),
                browser_bridge_url: std::env::var("SLOTRACE_BROWSER_BRIDGE_URL").ok(),
            },
            watch: WatchConfig {
                direct_interval_secs: env_parse("SLOTRACE_DIRECT_INTERVAL", 45),
                browser_interval_secs: env_parse("SLOTRACE_BROWSER_INTERVAL", 90),
                browser_offset_secs: env_parse("SLOTRACE_BROWSER_OFFSET", 20),
                high_traffic_floor_secs: env_parse("SLOTRACE_HIGH_TRAFFIC_FLOOR", 15),
                high_traffic_hours: env_u32_list(
                    "SLOTRACE_HIGH_TRAFFIC_HOURS",
                    vec![7, 8, 9, 13, 14],
                ),
                interval_jitter: env_parse("SLOTRACE_INTERVAL_JITTER", 0.3),
                min_interval_secs: env_parse("SLOTRACE_MIN_INTERVAL", 5),
            },
            evasion: EvasionConfig {
                backoff_initial_ms: env_parse("SLOTRACE_BACKOFF_INITIAL_MS", 1_000),
                backoff_max_ms: env_parse("SLOTRACE_BACKOFF_MAX_MS", 30_000),
                backoff_jitter: env_parse("SLOTRACE_BACKOFF_JITTER", 0.25),
                pre_request_delay_min_ms: env_parse("SLOTRACE_PRE_REQUEST_MIN_MS", 50),
                pre_request_delay_max_ms: env_parse("SLOTRACE_PRE_REQUEST_MAX_MS", 350),
            },
            applicant: ApplicantConfig {
                name: env_string("SLOTRACE_APPLICANT_NAME", ""),
                email: env_string("SLOTRACE_APPLICANT_EMAIL", ""),
                party_size: env_parse("SLOTRACE_PARTY_SIZE", 1),
            },
            notify: NotifyConfig {
                sms_gateway_url: std::env::var("SLOTRACE_SMS_GATEWAY_URL").ok(),
                sms_recipient: std::env::var("SLOTRACE_SMS_RECIPIENT").ok(),
                sms_api_key: std::env::var("SLOTRACE_SMS_API_KEY").ok(),
            },
            logging: LoggingConfig {
                level: env_string("SLOTRACE_LOG_LEVEL", "info"),
                format: env_string("SLOTRACE_LOG_FORMAT", "text"),
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// Applicant data is validated separately in [`Config::applicant`];
    /// it is only needed when a booking can actually be attempted.
    pub fn validate(&self) -> Result<()> {
        if !self.backend.base_url.starts_with("http://")
            && !self.backend.base_url.starts_with("https://")
        {
            return Err(Error::config("base_url must start with http:// or https://"));
        }
        if self.backend.office_ids.is_empty() {
            return Err(Error::config("at least one office_id is required"));
        }
        if self.backend.window_days == 0 {
            return Err(Error::config("window_days must be greater than 0"));
        }
        if self.backend.rate_limit_per_sec == 0 {
            return Err(Error::config("rate_limit_per_sec must be greater than 0"));
        }
        if !(0.0..1.0).contains(&self.watch.interval_jitter) {
            return Err(Error::config("interval_jitter must be in [0, 1)"));
        }
        if !(0.0..1.0).contains(&self.evasion.backoff_jitter) {
            return Err(Error::config("backoff_jitter must be in [0, 1)"));
        }
        if self.evasion.pre_request_delay_min_ms > self.evasion.pre_request_delay_max_ms {
            return Err(Error::config(
                "pre_request_delay_min_ms must not exceed pre_request_delay_max_ms",
            ));
        }
        if let Some(hour) = self
            .watch
            .high_traffic_hours
            .iter()
            .find(|hour| **hour > 23)
        {
            return Err(Error::config(format!("invalid high-traffic hour: {hour}")));
        }
        Ok(())
    }

    /// Get request timeout as Duration
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.backend.request_timeout_secs)
    }

    /// Offices and window as a query plan
    #[must_use]
    pub fn query_plan(&self) -> QueryPlan {
        QueryPlan {
            office_ids: self.backend.office_ids.clone(),
            service_id: self.backend.service_id,
            service_count: self.backend.service_count,
            window_days: self.backend.window_days,
        }
    }

    /// Retry schedule for transient request failures
    #[must_use]
    pub fn backoff_policy(&self) -> BackoffPolicy {
        BackoffPolicy {
            initial_delay: Duration::from_millis(self.evasion.backoff_initial_ms),
            max_delay: Duration::from_millis(self.evasion.backoff_max_ms),
            jitter_factor: self.evasion.backoff_jitter,
            max_retries: self.backend.max_retries,
        }
    }

    /// Pre-request jitter bounds in milliseconds
    #[must_use]
    pub fn pre_request_delay(&self) -> (u64, u64) {
        (
            self.evasion.pre_request_delay_min_ms,
            self.evasion.pre_request_delay_max_ms,
        )
    }

    /// Poll cadence for the direct-HTTP loop
    #[must_use]
    pub fn direct_interval(&self) -> IntervalPolicy {
        self.interval_policy(self.watch.direct_interval_secs)
    }

    /// Poll cadence for the browser-simulated loop
    #[must_use]
    pub fn browser_interval(&self) -> IntervalPolicy {
        self.interval_policy(self.watch.browser_interval_secs)
    }

    fn interval_policy(&self, base_secs: u64) -> IntervalPolicy {
        IntervalPolicy {
            base: Duration::from_secs(base_secs),
            high_traffic_floor: Duration::from_secs(self.watch.high_traffic_floor_secs),
            high_traffic_hours: self.watch.high_traffic_hours.clone(),
            jitter_factor: self.watch.interval_jitter,
            min_interval: Duration::from_secs(self.watch.min_interval_secs),
        }
    }

    /// Applicant data, validated for a booking attempt
    pub fn applicant(&self) -> Result<PersonalInfo> {
        if self.applicant.name.trim().is_empty() {
            return Err(Error::config("SLOTRACE_APPLICANT_NAME is required"));
        }
        if !self.applicant.email.contains('@') {
            return Err(Error::config(
                "SLOTRACE_APPLICANT_EMAIL must be a valid email address",
            ));
        }
        if self.applicant.party_size == 0 {
            return Err(Error::config("party_size must be greater than 0"));
        }
        Ok(PersonalInfo {
            name: self.applicant.name.clone(),
            email: self.applicant.email.clone(),
            party_size: self.applicant.party_size,
        })
    }

    /// SMS channel configuration, if both gateway and recipient are set
    #[must_use]
    pub fn sms(&self) -> Option<SmsConfig> {
        let gateway = self.notify.sms_gateway_url.as_ref()?;
        let recipient = self.notify.sms_recipient.as_ref()?;

        let mut config = SmsConfig::new(gateway, recipient);
        if let Some(key) = &self.notify.sms_api_key {
            config = config.with_api_key(key);
        }
        Some(config)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: BackendConfig {
                base_url: String::from("https://termine.example.org/api/backend/"),
                office_ids: vec![32],
                service_id: 120703,
                service_count: 1,
                window_days: 180,
                request_timeout_secs: 30,
                max_retries: 3,
                rate_limit_per_sec: 2,
                browser_bridge_url: None,
            },
            watch: WatchConfig {
                direct_interval_secs: 45,
                browser_interval_secs: 90,
                browser_offset_secs: 20,
                high_traffic_floor_secs: 15,
                high_traffic_hours: vec![7, 8, 9, 13, 14],
                interval_jitter: 0.3,
                min_interval_secs: 5,
            },
            evasion: EvasionConfig {
                backoff_initial_ms: 1_000,
                backoff_max_ms: 30_000,
                backoff_jitter: 0.25,
                pre_request_delay_min_ms: 50,
                pre_request_delay_max_ms: 350,
            },
            applicant: ApplicantConfig {
                name: String::new(),
                email: String::new(),
                party_size: 1,
            },
            notify: NotifyConfig {
                sms_gateway_url: None,
                sms_recipient: None,
                sms_api_key: None,
            },
            logging: LoggingConfig {
                level: String::from("info"),
                format: String::from("text"),
            },
        }
    }
}
