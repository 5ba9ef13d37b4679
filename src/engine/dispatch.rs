use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::engine::sync;
use crate::error::AppError;
use crate::models::driver::Driver;
use crate::models::event::Event;
use crate::models::trip::{Trip, TripStatus};
use crate::state::AppState;
use crate::transport::ChannelId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Assigned(Uuid),
    Exhausted,
}

impl DispatchOutcome {
    fn label(&self) -> &'static str {
        match self {
            DispatchOutcome::Assigned(_) => "assigned",
            DispatchOutcome::Exhausted => "exhausted",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OfferResult {
    Accepted,
    Declined,
    TimedOut,
}

impl OfferResult {
    fn label(&self) -> &'static str {
        match self {
            OfferResult::Accepted => "accepted",
            OfferResult::Declined => "declined",
            OfferResult::TimedOut => "timeout",
        }
    }
}

pub async fn run_dispatch_engine(state: Arc<AppState>, mut trip_rx: mpsc::Receiver<Uuid>) {
    info!("dispatch engine started");

    while let Some(trip_id) = trip_rx.recv().await {
        state.metrics.trips_awaiting_dispatch.dec();

        let start = Instant::now();
        match dispatch_trip(state.clone(), trip_id).await {
            Ok(outcome) => {
                let elapsed = start.elapsed().as_secs_f64();
                state
                    .metrics
                    .dispatch_latency_seconds
                    .with_label_values(&[outcome.label()])
                    .observe(elapsed);
                state
                    .metrics
                    .dispatches_total
                    .with_label_values(&[outcome.label()])
                    .inc();
            }
            Err(err) => {
                let elapsed = start.elapsed().as_secs_f64();
                state
                    .metrics
                    .dispatch_latency_seconds
                    .with_label_values(&["error"])
                    .observe(elapsed);
                state
                    .metrics
                    .dispatches_total
                    .with_label_values(&["error"])
                    .inc();
                error!(trip_id = %trip_id, error = %err, "failed to dispatch trip");
            }
        }
    }

    warn!("dispatch engine stopped: queue channel closed");
}

/// Runs the notify-and-wait protocol for one trip: up to `settings.rounds`
/// passes over the currently eligible candidates, offering the trip to each
/// in turn, strictly sequentially. A driver is never offered the same trip
/// twice across rounds. Exhaustion leaves the trip `requested` and tells
/// the rider; it is a business outcome, not a failure.
pub async fn dispatch_trip(
    state: Arc<AppState>,
    trip_id: Uuid,
) -> Result<DispatchOutcome, AppError> {
    let trip = state.trips.get(trip_id)?;
    match trip.status {
        TripStatus::Requested => {}
        // Already assigned: report the existing assignment as success.
        TripStatus::Accepted => {
            return existing_assignment(&trip);
        }
        other => {
            return Err(AppError::Conflict(format!(
                "trip {trip_id} is not dispatchable in status {other:?}"
            )));
        }
    }

    let mut notified: HashSet<Uuid> = HashSet::new();

    for round in 0..state.settings.rounds {
        let candidates = state.drivers.candidates(&notified);

        if candidates.is_empty() {
            if notified.is_empty() {
                debug!(trip_id = %trip_id, "no eligible drivers at all, giving up");
                break;
            }
            // Everyone currently eligible has already been offered this
            // trip; the next round re-queries in case someone came online.
            continue;
        }

        debug!(trip_id = %trip_id, round, candidates = candidates.len(), "dispatch round");

        for candidate in candidates {
            // Re-read the trip before every offer: a response that landed
            // outside this iteration's order may already have assigned it.
            let current = state.trips.get(trip_id)?;
            if current.status == TripStatus::Accepted {
                return existing_assignment(&current);
            }
            if current.status != TripStatus::Requested {
                debug!(trip_id = %trip_id, status = ?current.status, "trip left requested state, stopping dispatch");
                return Ok(DispatchOutcome::Exhausted);
            }

            if notified.contains(&candidate.id) {
                continue;
            }
            // Mark before awaiting, so the same driver reappearing in a
            // later round is a no-op.
            notified.insert(candidate.id);

            let result =
                notify_and_wait(&state, &candidate, &current, state.settings.offer_timeout).await;
            state
                .metrics
                .trip_offers_total
                .with_label_values(&[result.label()])
                .inc();

            if result != OfferResult::Accepted {
                continue;
            }

            match assign(&state, trip_id, &candidate) {
                Ok(assigned) => {
                    info!(trip_id = %trip_id, driver_id = %candidate.id, "trip assigned");
                    return Ok(DispatchOutcome::Assigned(
                        assigned.driver_id.unwrap_or(candidate.id),
                    ));
                }
                Err(AppError::Conflict(msg)) => {
                    // A concurrent writer won the race; honor whatever
                    // assignment now stands.
                    debug!(trip_id = %trip_id, %msg, "assignment lost a race");
                    let latest = state.trips.get(trip_id)?;
                    if latest.status == TripStatus::Accepted {
                        return existing_assignment(&latest);
                    }
                }
                Err(err) => return Err(err),
            }
        }
    }

    state.hub.publish(
        ChannelId::Rider(trip.rider_id),
        Event::NoDriversAvailable { trip_id },
    );
    info!(trip_id = %trip_id, notified = notified.len(), "no driver accepted the trip");
    Ok(DispatchOutcome::Exhausted)
}

/// Publishes a trip offer on the driver's channel and waits for the
/// correlated response. Resolves to the driver's answer, or times out as a
/// decline. The pending-offer entry is removed on whichever path resolves
/// first, so a late response finds nothing to complete.
async fn notify_and_wait(
    state: &AppState,
    driver: &Driver,
    trip: &Trip,
    window: Duration,
) -> OfferResult {
    let response = state.hub.register_offer(trip.id, driver.id);
    state.hub.publish(
        ChannelId::Driver(driver.id),
        Event::TripOffer { trip: trip.clone() },
    );

    match tokio::time::timeout(window, response).await {
        Ok(Ok(true)) => OfferResult::Accepted,
        Ok(Ok(false)) => OfferResult::Declined,
        // Sender dropped: the wait was displaced, treat as a decline.
        Ok(Err(_)) => OfferResult::Declined,
        Err(_) => {
            state.hub.cancel_offer(trip.id, driver.id);
            debug!(trip_id = %trip.id, driver_id = %driver.id, "offer timed out");
            OfferResult::TimedOut
        }
    }
}

/// Assigns the trip to the driver and flips the driver on_trip/unavailable.
/// The two records have no shared transaction, so a failed driver write
/// reverts the trip assignment instead of leaving a partial commit.
fn assign(state: &AppState, trip_id: Uuid, driver: &Driver) -> Result<Trip, AppError> {
    let trip = state
        .trips
        .transition(trip_id, TripStatus::Accepted, Some(driver.id))?;

    let updated_driver = match state.drivers.mark_on_trip(driver.id) {
        Ok(updated) => updated,
        Err(err) => {
            warn!(trip_id = %trip_id, driver_id = %driver.id, error = %err, "driver update failed, reverting trip assignment");
            state.trips.revert_assignment(trip_id)?;
            return Err(err);
        }
    };

    sync::broadcast_trip(state, &trip, Event::TripAssigned { trip: trip.clone() });
    sync::broadcast_driver(state, &updated_driver);
    state.notifier.send(
        "Trip assigned",
        format!("trip {} accepted by driver {}", trip.id, driver.id),
    );

    Ok(trip)
}

fn existing_assignment(trip: &Trip) -> Result<DispatchOutcome, AppError> {
    let driver_id = trip.driver_id.ok_or_else(|| {
        AppError::Internal(format!("accepted trip {} has no driver", trip.id))
    })?;
    Ok(DispatchOutcome::Assigned(driver_id))
}
