//! Shared helpers for integration tests

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use slotrace::client::DirectClient;
use slotrace::evasion::{BackoffPolicy, FingerprintRotator};
use slotrace::models::{PersonalInfo, SlotQuery};

/// Direct client tuned for tests: millisecond backoff, no pre-request
/// jitter, effectively uncapped rate
pub fn fast_client(base_url: &str) -> DirectClient {
    DirectClient::with_config(
        base_url,
        Arc::new(FingerprintRotator::with_seed(7)),
        BackoffPolicy::with_delays(3, 1, 2),
        100,
        Duration::from_secs(5),
    )
    .unwrap()
    .with_pre_request_delay(0, 0)
}

pub fn query() -> SlotQuery {
    SlotQuery {
        start_date: NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
        end_date: NaiveDate::from_ymd_opt(2025, 4, 1).unwrap(),
        office_id: 32,
        service_id: 120703,
        service_count: 1,
    }
}

pub fn applicant() -> PersonalInfo {
    PersonalInfo {
        name: "Max Mustermann".to_string(),
        email: "max@example.org".to_string(),
        party_size: 1,
    }
}
