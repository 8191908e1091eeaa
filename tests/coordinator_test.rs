//! Integration tests for the coordinator and the booking gate
//!
//! A scripted in-process backend stands in for the network clients so the
//! tests can pin down the at-most-one-booking guarantee and the status
//! trail.

mod common;

use async_trait::async_trait;
use chrono::NaiveDate;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use slotrace::client::{ClientError, ClientResult, SchedulerApi, AVAILABLE_DAYS};
use slotrace::coordinator::{Coordinator, QueryPlan};
use slotrace::models::{
    AppointmentSlot, BookingOutcome, PersonalInfo, SlotQuery, StrategyKind,
};
use slotrace::status::{Status, StatusMachine};

struct ScriptedBackend {
    days: Vec<NaiveDate>,
    fail_days: bool,
    book_success: bool,
    book_message: Option<String>,
    book_delay: Duration,
    days_calls: AtomicU32,
    book_calls: AtomicU32,
}

impl ScriptedBackend {
    fn with_open_day() -> Self {
        Self {
            days: vec![NaiveDate::from_ymd_opt(2025, 3, 15).unwrap()],
            fail_days: false,
            book_success: true,
            book_message: None,
            book_delay: Duration::ZERO,
            days_calls: AtomicU32::new(0),
            book_calls: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl SchedulerApi for ScriptedBackend {
    async fn list_available_days(&self, _query: &SlotQuery) -> ClientResult<Vec<NaiveDate>> {
        self.days_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_days {
            return Err(ClientError::Transport {
                endpoint: AVAILABLE_DAYS,
                attempts: 4,
                reason: "connection refused".into(),
            });
        }
        Ok(self.days.clone())
    }

    async fn list_slots(
        &self,
        day: NaiveDate,
        _query: &SlotQuery,
    ) -> ClientResult<Vec<AppointmentSlot>> {
        Ok(vec![AppointmentSlot {
            date: day,
            time: "09:00".to_string(),
            available: true,
        }])
    }

    async fn book(
        &self,
        _day: NaiveDate,
        _slot: &AppointmentSlot,
        _applicant: &PersonalInfo,
        _query: &SlotQuery,
    ) -> ClientResult<BookingOutcome> {
        self.book_calls.fetch_add(1, Ordering::SeqCst);
        if !self.book_delay.is_zero() {
            tokio::time::sleep(self.book_delay).await;
        }
        Ok(BookingOutcome {
            success: self.book_success,
            appointment_id: self.book_success.then(|| "A-12345".to_string()),
            message: self.book_message.clone(),
        })
    }
}

fn plan() -> QueryPlan {
    QueryPlan {
        office_ids: vec![32],
        service_id: 120703,
        service_count: 1,
        window_days: 30,
    }
}

fn coordinator(status: Arc<StatusMachine>) -> Coordinator {
    Coordinator::new(status, plan(), common::applicant())
}

#[tokio::test]
async fn test_poll_books_when_slot_is_open() {
    let backend = ScriptedBackend::with_open_day();
    let status = Arc::new(StatusMachine::new());
    let coordinator = coordinator(Arc::clone(&status));

    let booked = coordinator
        .poll_once(StrategyKind::Direct, &backend)
        .await;

    assert!(booked);
    assert_eq!(backend.book_calls.load(Ordering::SeqCst), 1);
    assert_eq!(status.current(), Status::BookingSucceeded);

    let trail: Vec<Status> = status.history().iter().map(|t| t.current).collect();
    assert!(trail.contains(&Status::SlotFound));
    assert!(trail.contains(&Status::BookingInProgress));
    assert_eq!(trail.last(), Some(&Status::BookingSucceeded));
}

#[tokio::test]
async fn test_lost_race_releases_the_gate() {
    let mut backend = ScriptedBackend::with_open_day();
    backend.book_success = false;
    backend.book_message = Some("Slot no longer available".to_string());
    let status = Arc::new(StatusMachine::new());
    let coordinator = coordinator(Arc::clone(&status));

    let booked = coordinator
        .poll_once(StrategyKind::Direct, &backend)
        .await;

    assert!(!booked);
    assert_eq!(status.current(), Status::BookingFailed);
    assert!(!coordinator.gate().is_finished());

    // The gate must be free again so the next iteration can try
    let retry_backend = ScriptedBackend::with_open_day();
    let booked = coordinator
        .poll_once(StrategyKind::Direct, &retry_backend)
        .await;
    assert!(booked);
    assert_eq!(status.current(), Status::BookingSucceeded);
}

#[tokio::test]
async fn test_concurrent_polls_book_at_most_once() {
    let mut backend = ScriptedBackend::with_open_day();
    backend.book_delay = Duration::from_millis(50);
    let backend = Arc::new(backend);
    let status = Arc::new(StatusMachine::new());
    let coordinator = Arc::new(coordinator(Arc::clone(&status)));

    let direct = {
        let coordinator = Arc::clone(&coordinator);
        let backend = Arc::clone(&backend);
        tokio::spawn(async move {
            coordinator
                .poll_once(StrategyKind::Direct, backend.as_ref())
                .await
        })
    };
    let browser = {
        let coordinator = Arc::clone(&coordinator);
        let backend = Arc::clone(&backend);
        tokio::spawn(async move {
            coordinator
                .poll_once(StrategyKind::Browser, backend.as_ref())
                .await
        })
    };

    let (a, b) = (direct.await.unwrap(), browser.await.unwrap());

    assert_eq!(backend.book_calls.load(Ordering::SeqCst), 1);
    assert!(a ^ b, "exactly one loop must win the booking");
    assert_eq!(status.current(), Status::BookingSucceeded);
}

#[tokio::test]
async fn test_no_polling_after_success() {
    let backend = ScriptedBackend::with_open_day();
    let status = Arc::new(StatusMachine::new());
    let coordinator = coordinator(Arc::clone(&status));

    assert!(coordinator.poll_once(StrategyKind::Direct, &backend).await);
    let days_after_success = backend.days_calls.load(Ordering::SeqCst);

    // A finished gate short-circuits before any network call
    assert!(!coordinator.poll_once(StrategyKind::Browser, &backend).await);
    assert_eq!(backend.days_calls.load(Ordering::SeqCst), days_after_success);
    assert_eq!(backend.book_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_all_queries_failing_publishes_transport_error() {
    let mut backend = ScriptedBackend::with_open_day();
    backend.fail_days = true;
    let status = Arc::new(StatusMachine::new());
    let coordinator = coordinator(Arc::clone(&status));

    let booked = coordinator
        .poll_once(StrategyKind::Direct, &backend)
        .await;

    assert!(!booked);
    assert_eq!(status.current(), Status::TransportError);
    assert_eq!(backend.book_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_empty_availability_publishes_no_slots() {
    let mut backend = ScriptedBackend::with_open_day();
    backend.days.clear();
    let status = Arc::new(StatusMachine::new());
    let coordinator = coordinator(Arc::clone(&status));

    let booked = coordinator
        .poll_once(StrategyKind::Direct, &backend)
        .await;

    assert!(!booked);
    assert_eq!(status.current(), Status::NoSlots);
}

#[tokio::test]
async fn test_shutdown_stops_loops_without_booking() {
    let mut backend = ScriptedBackend::with_open_day();
    backend.days.clear();
    let status = Arc::new(StatusMachine::new());
    let coordinator = Arc::new(Coordinator::new(
        Arc::clone(&status),
        plan(),
        common::applicant(),
    ));

    let strategies = vec![slotrace::coordinator::Strategy {
        kind: StrategyKind::Direct,
        client: Arc::new(backend) as Arc<dyn SchedulerApi>,
        interval: slotrace::evasion::IntervalPolicy {
            base: Duration::from_secs(60),
            high_traffic_floor: Duration::from_secs(60),
            high_traffic_hours: vec![],
            jitter_factor: 0.0,
            min_interval: Duration::from_secs(1),
        },
        initial_offset: Duration::ZERO,
    }];

    let runner = {
        let coordinator = Arc::clone(&coordinator);
        tokio::spawn(async move { coordinator.run(strategies).await })
    };

    // Let the first iteration happen, then ask for shutdown
    tokio::time::sleep(Duration::from_millis(100)).await;
    coordinator.trigger_shutdown();

    let booked = tokio::time::timeout(Duration::from_secs(5), runner)
        .await
        .expect("loops must stop promptly after shutdown")
        .unwrap();
    assert!(!booked);
    assert_eq!(status.current(), Status::NoSlots);
}
