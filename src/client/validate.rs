//! Response shape validation for the backend wire contract
//!
//! Raw JSON payloads are checked here before anything downstream touches
//! them. A shape mismatch is a contract change and is never retried. The
//! "no appointments in this scope" sentinel is the one object payload the
//! day-list endpoint may legally return; it maps to an empty day list so
//! callers can tell "nothing available" apart from a parse failure.

use chrono::NaiveDate;
use serde_json::Value;

use crate::models::{AppointmentSlot, BookingOutcome, BACKEND_DATE_FORMAT};

/// Backend error code meaning "no open slots in the queried range"
pub(crate) const NO_SLOTS_SENTINEL: &str = "noAppointmentForThisScope";

/// Parse the available-days payload: an array of `YYYY-MM-DD` strings or
/// the no-slots sentinel object. Output is chronological without
/// duplicates.
pub(crate) fn parse_available_days(raw: &Value) -> Result<Vec<NaiveDate>, String> {
    if let Some(obj) = raw.as_object() {
        if obj.get("errorCode").and_then(Value::as_str) == Some(NO_SLOTS_SENTINEL) {
            return Ok(Vec::new());
        }
        return Err(format!(
            "expected date array or no-slots sentinel, got object with keys {:?}",
            obj.keys().collect::<Vec<_>>()
        ));
    }

    let items = raw
        .as_array()
        .ok_or_else(|| "expected array of date strings".to_string())?;

    let mut days = Vec::with_capacity(items.len());
    for item in items {
        let text = item
            .as_str()
            .ok_or_else(|| format!("expected date string, got {item}"))?;
        let day = NaiveDate::parse_from_str(text, BACKEND_DATE_FORMAT)
            .map_err(|e| format!("bad date {text:?}: {e}"))?;
        days.push(day);
    }

    days.sort_unstable();
    days.dedup();
    Ok(days)
}

/// Parse the available-appointments payload: an array of
/// `{time, available}` objects for the given day
pub(crate) fn parse_slots(raw: &Value, day: NaiveDate) -> Result<Vec<AppointmentSlot>, String> {
    let items = raw
        .as_array()
        .ok_or_else(|| "expected array of slot objects".to_string())?;

    let mut slots = Vec::with_capacity(items.len());
    for item in items {
        let obj = item
            .as_object()
            .ok_or_else(|| format!("expected slot object, got {item}"))?;
        let time = obj
            .get("time")
            .and_then(Value::as_str)
            .ok_or_else(|| "slot object missing string field 'time'".to_string())?;
        let available = obj
            .get("available")
            .and_then(Value::as_bool)
            .ok_or_else(|| "slot object missing bool field 'available'".to_string())?;

        slots.push(AppointmentSlot {
            date: day,
            time: time.to_string(),
            available,
        });
    }

    Ok(slots)
}

/// Parse the book-appointment payload: an object carrying at least a
/// `success` flag
pub(crate) fn parse_booking_outcome(raw: &Value) -> Result<BookingOutcome, String> {
    let obj = raw
        .as_object()
        .ok_or_else(|| "expected booking result object".to_string())?;

    let success = obj
        .get("success")
        .and_then(Value::as_bool)
        .ok_or_else(|| "booking result missing bool field 'success'".to_string())?;

    let appointment_id = obj
        .get("appointmentId")
        .and_then(Value::as_str)
        .map(String::from);

    // Backends report the human-readable text under either key
    let message = obj
        .get("message")
        .or_else(|| obj.get("error"))
        .and_then(Value::as_str)
        .map(String::from);

    Ok(BookingOutcome {
        success,
        appointment_id,
        message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_days_array_sorted_deduped() {
        let raw = json!(["2025-03-20", "2025-03-15", "2025-03-20"]);
        let days = parse_available_days(&raw).unwrap();

        assert_eq!(
            days,
            vec![
                NaiveDate::from_ymd_opt(2025, 3, 15).unwrap(),
                NaiveDate::from_ymd_opt(2025, 3, 20).unwrap(),
            ]
        );
    }

    #[test]
    fn test_no_slots_sentinel_is_empty_not_error() {
        let raw = json!({
            "errorCode": "noAppointmentForThisScope",
            "errorMessage": "Kein freier Termin",
            "lastModified": 1741950000000u64,
        });

        assert_eq!(parse_available_days(&raw).unwrap(), Vec::<NaiveDate>::new());
    }

    #[test]
    fn test_unknown_object_payload_fails() {
        let raw = json!({"errorCode": "somethingElse"});
        assert!(parse_available_days(&raw).is_err());

        let raw = json!({"days": ["2025-03-15"]});
        assert!(parse_available_days(&raw).is_err());
    }

    #[test]
    fn test_malformed_date_fails() {
        let raw = json!(["2025-03-15", "15.03.2025"]);
        let err = parse_available_days(&raw).unwrap_err();
        assert!(err.contains("15.03.2025"));
    }

    #[test]
    fn test_days_rejects_non_string_entries() {
        let raw = json!([20250315]);
        assert!(parse_available_days(&raw).is_err());
    }

    #[test]
    fn test_slots_parse() {
        let day = NaiveDate::from_ymd_opt(2025, 3, 15).unwrap();
        let raw = json!([
            {"time": "09:00", "available": true},
            {"time": "09:30", "available": false},
        ]);

        let slots = parse_slots(&raw, day).unwrap();
        assert_eq!(slots.len(), 2);
        assert_eq!(slots[0].time, "09:00");
        assert!(slots[0].available);
        assert_eq!(slots[0].date, day);
        assert!(!slots[1].available);
    }

    #[test]
    fn test_slots_shape_mismatch() {
        let day = NaiveDate::from_ymd_opt(2025, 3, 15).unwrap();

        assert!(parse_slots(&json!({"slots": []}), day).is_err());
        assert!(parse_slots(&json!([{"time": "09:00"}]), day).is_err());
        assert!(parse_slots(&json!([{"available": true}]), day).is_err());
    }

    #[test]
    fn test_booking_success() {
        let raw = json!({"success": true, "appointmentId": "12345"});
        let outcome = parse_booking_outcome(&raw).unwrap();

        assert!(outcome.success);
        assert_eq!(outcome.appointment_id.as_deref(), Some("12345"));
        assert!(outcome.message.is_none());
    }

    #[test]
    fn test_booking_lost_race_carries_message() {
        let raw = json!({"success": false, "error": "Slot no longer available"});
        let outcome = parse_booking_outcome(&raw).unwrap();

        assert!(!outcome.success);
        assert_eq!(outcome.message.as_deref(), Some("Slot no longer available"));
    }

    #[test]
    fn test_booking_missing_success_flag() {
        assert!(parse_booking_outcome(&json!({"appointmentId": "1"})).is_err());
        assert!(parse_booking_outcome(&json!("ok")).is_err());
    }
}
