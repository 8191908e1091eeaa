//! Dual-strategy polling coordination
//!
//! Runs one independently scheduled polling loop per transport strategy.
//! The loops never call each other; they share only the
//! [`BookingGate`] and the [`StatusMachine`]. Each iteration queries all
//! configured offices in parallel, takes the earliest open day, and -- if
//! it wins the gate -- attempts the one booking. A failed iteration
//! publishes a status and reschedules itself; only a confirmed booking or
//! a shutdown signal stops a loop.

pub mod gate;

pub use gate::{BookingGate, GateDecision};

use chrono::{Days, Local, NaiveDate};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::client::SchedulerApi;
use crate::evasion::IntervalPolicy;
use crate::models::{PersonalInfo, SlotQuery, StrategyKind};
use crate::status::{Status, StatusMachine};

/// Which offices and service to watch, and how far ahead
#[derive(Debug, Clone)]
pub struct QueryPlan {
    /// Offices checked in parallel every iteration
    pub office_ids: Vec<u32>,

    /// Backend service identifier
    pub service_id: u32,

    /// Number of service units (`serviceCount` on the wire)
    pub service_count: u32,

    /// Length of the rolling search window in days
    pub window_days: u64,
}

impl QueryPlan {
    /// Materialize one query per office for a window starting today
    pub fn queries_for(&self, today: NaiveDate) -> Vec<SlotQuery> {
        let end_date = today
            .checked_add_days(Days::new(self.window_days))
            .unwrap_or(today);

        self.office_ids
            .iter()
            .map(|office_id| SlotQuery {
                start_date: today,
                end_date,
                office_id: *office_id,
                service_id: self.service_id,
                service_count: self.service_count,
            })
            .collect()
    }
}

/// One polling loop: a transport client plus its cadence
pub struct Strategy {
    pub kind: StrategyKind,
    pub client: Arc<dyn SchedulerApi>,
    pub interval: IntervalPolicy,

    /// Startup offset so the loops do not fire simultaneously
    pub initial_offset: Duration,
}

/// Orchestrates the polling loops and the single booking attempt
pub struct Coordinator {
    status: Arc<StatusMachine>,
    gate: Arc<BookingGate>,
    plan: QueryPlan,
    applicant: PersonalInfo,
    shutdown_tx: watch::Sender<bool>,
}

impl Coordinator {
    pub fn new(status: Arc<StatusMachine>, plan: QueryPlan, applicant: PersonalInfo) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            status,
            gate: Arc::new(BookingGate::new()),
            plan,
            applicant,
            shutdown_tx,
        }
    }

    /// The shared booking gate
    pub fn gate(&self) -> Arc<BookingGate> {
        Arc::clone(&self.gate)
    }

    /// Ask both loops to stop after their current iteration
    ///
    /// An in-flight booking call always finishes first; a loop is only
    /// interrupted while it waits for its next scheduled poll.
    pub fn trigger_shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Run all strategies to completion
    ///
    /// Returns `true` when the slot was booked, `false` when the run was
    /// shut down without a booking.
    pub async fn run(self: Arc<Self>, strategies: Vec<Strategy>) -> bool {
        let mut handles = Vec::with_capacity(strategies.len());
        for strategy in strategies {
            let coordinator = Arc::clone(&self);
            handles.push(tokio::spawn(coordinator.run_loop(strategy)));
        }

        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "Polling loop task failed");
            }
        }

        self.gate.is_finished()
    }

    async fn run_loop(self: Arc<Self>, strategy: Strategy) {
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        info!(
            strategy = %strategy.kind,
            offset_ms = strategy.initial_offset.as_millis() as u64,
            "Polling loop starting"
        );

        if !strategy.initial_offset.is_zero() {
            tokio::select! {
                _ = tokio::time::sleep(strategy.initial_offset) => {}
                _ = shutdown_rx.changed() => return,
            }
        }

        loop {
            if *shutdown_rx.borrow() || self.gate.is_finished() {
                break;
            }

            let booked = self
                .poll_once(strategy.kind, strategy.client.as_ref())
                .await;
            if booked {
                break;
            }

            let delay = strategy.interval.next_delay();
            debug!(
                strategy = %strategy.kind,
                delay_ms = delay.as_millis() as u64,
                "Next poll scheduled"
            );

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown_rx.changed() => break,
            }
        }

        info!(strategy = %strategy.kind, "Polling loop stopped");
    }

    /// One poll iteration; never propagates an error out of the loop
    pub async fn poll_once(&self, kind: StrategyKind, client: &dyn SchedulerApi) -> bool {
        if self.gate.is_finished() {
            return false;
        }

        self.status.update(Status::Checking, None);

        let today = Local::now().date_naive();
        let queries = self.plan.queries_for(today);
        let results = join_all(
            queries
                .iter()
                .map(|query| client.list_available_days(query)),
        )
        .await;

        let mut earliest: Option<(NaiveDate, &SlotQuery)> = None;
        let mut failures = 0usize;
        let mut last_failure = None;

        for (query, result) in queries.iter().zip(results) {
            match result {
                Ok(days) => {
                    // Day lists are chronological; the head is the best
                    if let Some(day) = days.first().copied() {
                        if earliest.map_or(true, |(best, _)| day < best) {
                            earliest = Some((day, query));
                        }
                    }
                }
                Err(e) => {
                    warn!(
                        strategy = %kind,
                        office_id = query.office_id,
                        error = %e,
                        "Availability query failed"
                    );
                    failures += 1;
                    last_failure = Some(e.to_string());
                }
            }
        }

        if failures == queries.len() {
            self.status.update(Status::TransportError, last_failure);
            return false;
        }

        let Some((day, query)) = earliest else {
            self.status.update(Status::NoSlots, None);
            return false;
        };

        match self.gate.try_acquire() {
            GateDecision::Finished => return false,
            GateDecision::Busy => {
                debug!(strategy = %kind, %day, "Booking already in flight, skipping attempt");
                return false;
            }
            GateDecision::Acquired => {}
        }

        // The gate is held from here; every path below either marks
        // success (which clears it) or releases it
        match self.attempt_booking(kind, client, query, day).await {
            Some(details) => {
                if self.gate.mark_success() {
                    info!(strategy = %kind, details = %details, "Slot booked");
                    self.status.update(Status::BookingSucceeded, Some(details));
                    self.trigger_shutdown();
                }
                true
            }
            None => {
                self.gate.release();
                false
            }
        }
    }

    /// Drill from a known-open day down to one booking call
    ///
    /// Returns booking details on success, `None` on any failure. All
    /// failures are published as status transitions, never raised.
    async fn attempt_booking(
        &self,
        kind: StrategyKind,
        client: &dyn SchedulerApi,
        query: &SlotQuery,
        day: NaiveDate,
    ) -> Option<String> {
        self.status.update(
            Status::SlotFound,
            Some(format!("{day} at office {}", query.office_id)),
        );

        let slots = match client.list_slots(day, query).await {
            Ok(slots) => slots,
            Err(e) => {
                warn!(strategy = %kind, %day, error = %e, "Slot query failed");
                self.status
                    .update(Status::TransportError, Some(e.to_string()));
                return None;
            }
        };

        let Some(slot) = slots.into_iter().find(|slot| slot.available) else {
            // Gone between the day query and the slot query
            self.status.update(
                Status::NoSlots,
                Some(format!("slots for {day} disappeared")),
            );
            return None;
        };

        self.status.update(
            Status::BookingInProgress,
            Some(format!("{day} {}", slot.time)),
        );

        match client.book(day, &slot, &self.applicant, query).await {
            Ok(outcome) if outcome.success => Some(match &outcome.appointment_id {
                Some(id) => format!("{day} {} (id {id})", slot.time),
                None => format!("{day} {}", slot.time),
            }),
            Ok(outcome) => {
                // Transport-level success, booking-level refusal: someone
                // else got there first
                let reason = outcome
                    .message
                    .unwrap_or_else(|| "booking rejected".to_string());
                info!(strategy = %kind, reason = %reason, "Lost the race for the slot");
                self.status.update(Status::BookingFailed, Some(reason));
                None
            }
            Err(e) => {
                warn!(strategy = %kind, error = %e, "Booking call failed");
                self.status
                    .update(Status::BookingFailed, Some(e.to_string()));
                None
            }
        }
    }
}
