use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::queue::enqueue_dispatch;
use crate::engine::sync;
use crate::error::AppError;
use crate::models::driver::GeoPoint;
use crate::models::event::Event;
use crate::models::trip::{LocationPing, Trip, TripStatus};
use crate::state::AppState;

pub struct BookingRequest {
    pub rider_id: Uuid,
    pub origin: String,
    pub destination: String,
    pub distance: f64,
    pub fare: f64,
    pub duration: f64,
}

/// Creates a trip in `requested` and queues it for dispatch. All fields are
/// validated before anything is persisted.
pub async fn book(state: &AppState, request: BookingRequest) -> Result<Trip, AppError> {
    if request.origin.trim().is_empty() || request.destination.trim().is_empty() {
        return Err(AppError::Validation(
            "origin and destination are required".to_string(),
        ));
    }
    if request.distance <= 0.0 || request.fare <= 0.0 || request.duration <= 0.0 {
        return Err(AppError::Validation(
            "distance, fare and duration must be positive".to_string(),
        ));
    }

    let trip = Trip::new(
        request.rider_id,
        request.origin,
        request.destination,
        request.distance,
        request.fare,
        request.duration,
    );
    state.trips.insert(trip.clone());
    enqueue_dispatch(state, trip.id).await?;

    info!(trip_id = %trip.id, rider_id = %trip.rider_id, "trip booked");
    Ok(trip)
}

/// Administrative or driver-side approval: assigns the driver, accepts the
/// trip and sets the approved flag. The notification is best-effort and
/// never rolls the transition back.
pub fn approve(state: &AppState, trip_id: Uuid, driver_id: Uuid) -> Result<Trip, AppError> {
    state.drivers.get(driver_id)?;

    state
        .trips
        .transition(trip_id, TripStatus::Accepted, Some(driver_id))?;
    let trip = state.trips.mark_approved(trip_id)?;

    let driver = state.drivers.mark_on_trip(driver_id)?;
    sync::broadcast_trip(state, &trip, Event::TripAssigned { trip: trip.clone() });
    sync::broadcast_driver(state, &driver);

    state.notifier.send(
        "Trip approved",
        format!("trip {trip_id} approved for driver {driver_id}"),
    );
    info!(trip_id = %trip_id, driver_id = %driver_id, "trip approved");
    Ok(trip)
}

pub fn reject(
    state: &AppState,
    trip_id: Uuid,
    driver_id: Uuid,
    reason: Option<String>,
) -> Result<Trip, AppError> {
    state.drivers.get(driver_id)?;

    let reason = reason.unwrap_or_else(|| "No reason provided".to_string());
    state.trips.transition(trip_id, TripStatus::Rejected, None)?;
    let trip = state.trips.set_rejection_reason(trip_id, reason.clone())?;

    sync::broadcast_trip(
        state,
        &trip,
        Event::TripRejected {
            trip_id,
            driver_id,
            reason: reason.clone(),
        },
    );
    state.notifier.send(
        "Trip rejected",
        format!("trip {trip_id} rejected by driver {driver_id}: {reason}"),
    );
    info!(trip_id = %trip_id, driver_id = %driver_id, "trip rejected");
    Ok(trip)
}

/// Cancels a trip from any active state and releases the assigned driver,
/// if there is one, back to the candidate pool. The cancellation notice is
/// the one publish whose delivery the caller checks.
pub fn cancel(state: &AppState, trip_id: Uuid, actor_id: Uuid) -> Result<Trip, AppError> {
    let trip = state.trips.transition(trip_id, TripStatus::Cancelled, None)?;

    if let Some(driver_id) = trip.driver_id {
        release_driver(state, driver_id);
    }

    let reason = format!("The trip has been cancelled by {actor_id}.");
    let delivered = sync::broadcast_trip(
        state,
        &trip,
        Event::TripCancelled {
            trip_id,
            reason,
        },
    );
    if delivered == 0 {
        warn!(trip_id = %trip_id, "cancellation notice reached no subscribers");
    }

    info!(trip_id = %trip_id, actor_id = %actor_id, "trip cancelled");
    Ok(trip)
}

/// Driver starts the ride. Requires an existing assignment; the state
/// machine only admits this from `accepted`.
pub fn start(state: &AppState, trip_id: Uuid) -> Result<Trip, AppError> {
    let trip = state
        .trips
        .transition(trip_id, TripStatus::InProgress, None)?;
    sync::broadcast_trip(state, &trip, Event::TripStatusChanged { trip: trip.clone() });
    info!(trip_id = %trip_id, "trip started");
    Ok(trip)
}

/// Completes the ride, records the final location and releases the driver.
pub fn complete(
    state: &AppState,
    trip_id: Uuid,
    final_location: Option<GeoPoint>,
) -> Result<Trip, AppError> {
    if let Some(point) = &final_location {
        if !point.is_valid() {
            return Err(AppError::Validation(format!(
                "malformed coordinates: lat {}, lng {}",
                point.lat, point.lng
            )));
        }
    }

    let ping = final_location.map(|point| LocationPing::now(&point));
    let trip = state.trips.complete_with_ping(trip_id, ping)?;

    if let Some(driver_id) = trip.driver_id {
        release_driver(state, driver_id);
    }

    sync::broadcast_trip(state, &trip, Event::TripStatusChanged { trip: trip.clone() });
    info!(trip_id = %trip_id, "trip completed");
    Ok(trip)
}

/// Administrative hold; reversible via `unfreeze`.
pub fn freeze(state: &AppState, trip_id: Uuid) -> Result<Trip, AppError> {
    let trip = state.trips.transition(trip_id, TripStatus::Frozen, None)?;
    sync::broadcast_trip(state, &trip, Event::TripStatusChanged { trip: trip.clone() });
    info!(trip_id = %trip_id, "trip frozen");
    Ok(trip)
}

pub fn unfreeze(state: &AppState, trip_id: Uuid) -> Result<Trip, AppError> {
    let trip = state.trips.transition(trip_id, TripStatus::Requested, None)?;
    sync::broadcast_trip(state, &trip, Event::TripStatusChanged { trip: trip.clone() });
    info!(trip_id = %trip_id, "trip unfrozen");
    Ok(trip)
}

fn release_driver(state: &AppState, driver_id: Uuid) {
    match state.drivers.release(driver_id) {
        Ok(driver) => sync::broadcast_driver(state, &driver),
        Err(err) => warn!(driver_id = %driver_id, error = %err, "could not release driver"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::models::driver::{Driver, DriverStatus, Vehicle};
    use crate::transport::ChannelId;

    fn test_state() -> AppState {
        let config = Config {
            http_port: 0,
            log_level: "debug".to_string(),
            dispatch_queue_size: 16,
            event_buffer_size: 64,
            dispatch_rounds: 1,
            offer_timeout_ms: 50,
            notify_webhook_url: None,
        };
        AppState::new(&config).0
    }

    fn online_driver(state: &AppState) -> Driver {
        let driver = state.drivers.create(
            Uuid::new_v4(),
            "Thabo".to_string(),
            Vehicle {
                make: "Nissan".to_string(),
                model: "Almera".to_string(),
                plate_number: "NU 777".to_string(),
            },
        );
        state.drivers.register(driver.id, Uuid::new_v4()).unwrap()
    }

    fn booked_trip(state: &AppState) -> Trip {
        let trip = Trip::new(
            Uuid::new_v4(),
            "Umlazi".to_string(),
            "Durban CBD".to_string(),
            5.0,
            50.0,
            10.0,
        );
        state.trips.insert(trip.clone());
        trip
    }

    #[tokio::test]
    async fn booking_rejects_missing_fields_before_persisting() {
        let state = test_state();
        let err = book(
            &state,
            BookingRequest {
                rider_id: Uuid::new_v4(),
                origin: "  ".to_string(),
                destination: "Durban CBD".to_string(),
                distance: 5.0,
                fare: 50.0,
                duration: 10.0,
            },
        )
        .await
        .unwrap_err();

        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(state.trips.trip_count(), 0);
    }

    #[tokio::test]
    async fn booking_rejects_non_positive_amounts() {
        let state = test_state();
        let err = book(
            &state,
            BookingRequest {
                rider_id: Uuid::new_v4(),
                origin: "Umlazi".to_string(),
                destination: "Durban CBD".to_string(),
                distance: 0.0,
                fare: 50.0,
                duration: 10.0,
            },
        )
        .await
        .unwrap_err();

        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn cancelling_an_accepted_trip_releases_the_driver() {
        let state = test_state();
        let driver = online_driver(&state);
        let trip = booked_trip(&state);

        approve(&state, trip.id, driver.id).unwrap();
        assert_eq!(
            state.drivers.get(driver.id).unwrap().status,
            DriverStatus::OnTrip
        );

        let cancelled = cancel(&state, trip.id, trip.rider_id).unwrap();
        assert_eq!(cancelled.status, TripStatus::Cancelled);

        let released = state.drivers.get(driver.id).unwrap();
        assert_eq!(released.status, DriverStatus::Online);
        assert!(released.availability);
    }

    #[tokio::test]
    async fn lifecycle_releases_the_driver_exactly_once_at_completion() {
        let state = test_state();
        let driver = online_driver(&state);
        let trip = booked_trip(&state);

        approve(&state, trip.id, driver.id).unwrap();
        start(&state, trip.id).unwrap();
        assert_eq!(
            state.drivers.get(driver.id).unwrap().status,
            DriverStatus::OnTrip
        );

        let done = complete(
            &state,
            trip.id,
            Some(GeoPoint { lat: -29.85, lng: 31.02 }),
        )
        .unwrap();

        assert_eq!(done.status, TripStatus::Completed);
        assert_eq!(done.driver_id, Some(driver.id));
        assert_eq!(done.location_log.len(), 1);

        let released = state.drivers.get(driver.id).unwrap();
        assert_eq!(released.status, DriverStatus::Online);
        assert!(released.availability);
    }

    #[tokio::test]
    async fn start_without_assignment_is_a_conflict() {
        let state = test_state();
        let trip = booked_trip(&state);

        let err = start(&state, trip.id).unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert_eq!(state.trips.get(trip.id).unwrap().status, TripStatus::Requested);
    }

    #[tokio::test]
    async fn freeze_and_unfreeze_round_trip() {
        let state = test_state();
        let trip = booked_trip(&state);

        assert_eq!(freeze(&state, trip.id).unwrap().status, TripStatus::Frozen);
        assert_eq!(
            unfreeze(&state, trip.id).unwrap().status,
            TripStatus::Requested
        );
    }

    #[tokio::test]
    async fn reject_stores_the_reason_and_notifies_the_rider() {
        let state = test_state();
        let driver = online_driver(&state);
        let trip = booked_trip(&state);
        let mut rider_rx = state.hub.subscribe(ChannelId::Rider(trip.rider_id));

        let rejected = reject(
            &state,
            trip.id,
            driver.id,
            Some("too far away".to_string()),
        )
        .unwrap();

        assert_eq!(rejected.status, TripStatus::Rejected);
        assert_eq!(rejected.rejection_reason.as_deref(), Some("too far away"));
        assert!(matches!(
            rider_rx.recv().await,
            Ok(Event::TripRejected { reason, .. }) if reason == "too far away"
        ));
    }

    #[tokio::test]
    async fn approve_sets_the_approved_flag() {
        let state = test_state();
        let driver = online_driver(&state);
        let trip = booked_trip(&state);

        let approved = approve(&state, trip.id, driver.id).unwrap();
        assert!(approved.approved);
        assert_eq!(approved.status, TripStatus::Accepted);
        assert_eq!(approved.driver_id, Some(driver.id));
    }
}
