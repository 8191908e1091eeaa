//! Core data structures shared across the watcher
//!
//! These types mirror the backend's wire contract (dates, slots, booking
//! outcomes) plus the local query and applicant records attached to every
//! request.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Date format used by the scheduling backend for day lists and bookings
pub const BACKEND_DATE_FORMAT: &str = "%Y-%m-%d";

/// Parameters for an availability query against one office
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotQuery {
    /// First date of the search window (inclusive)
    pub start_date: NaiveDate,

    /// Last date of the search window (inclusive)
    pub end_date: NaiveDate,

    /// Backend office identifier
    pub office_id: u32,

    /// Backend service identifier
    pub service_id: u32,

    /// Number of service units requested (`serviceCount` on the wire)
    pub service_count: u32,
}

/// A bookable time on a specific day, as returned by the backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppointmentSlot {
    /// Calendar day the slot belongs to
    pub date: NaiveDate,

    /// Time of day, backend-formatted (e.g. `"09:00"`)
    pub time: String,

    /// Whether the backend still reports the slot as open
    pub available: bool,
}

/// Result of a book-appointment call
///
/// This is the single authoritative record of whether the scarce slot was
/// claimed. `success == false` means another caller won the race; it is a
/// normal outcome, not a transport failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingOutcome {
    /// Whether the booking was confirmed
    pub success: bool,

    /// Backend booking identifier, present on success
    pub appointment_id: Option<String>,

    /// Human-readable message or error text from the backend
    pub message: Option<String>,
}

/// Applicant details sent with a booking request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonalInfo {
    /// Full name (`name` on the wire)
    pub name: String,

    /// Contact email (`email` on the wire)
    pub email: String,

    /// Party size (`numberOfPersons` on the wire)
    pub party_size: u32,
}

/// The two polling strategies the coordinator can run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    /// Raw HTTP calls straight at the backend
    Direct,
    /// Requests evaluated inside a live browser page context
    Browser,
}

impl StrategyKind {
    /// Get strategy ID as string
    pub fn id(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Browser => "browser",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_kind_id() {
        assert_eq!(StrategyKind::Direct.id(), "direct");
        assert_eq!(StrategyKind::Browser.id(), "browser");
        assert_eq!(StrategyKind::Browser.to_string(), "browser");
    }

    #[test]
    fn test_slot_query_roundtrip() {
        let query = SlotQuery {
            start_date: NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2025, 4, 1).unwrap(),
            office_id: 32,
            service_id: 120703,
            service_count: 1,
        };

        let json = serde_json::to_string(&query).unwrap();
        let back: SlotQuery = serde_json::from_str(&json).unwrap();
        assert_eq!(query, back);
    }

    #[test]
    fn test_backend_date_format() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 15).unwrap();
        assert_eq!(date.format(BACKEND_DATE_FORMAT).to_string(), "2025-03-15");
    }
}
