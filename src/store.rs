use chrono::Utc;
use dashmap::DashMap;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::trip::{LocationPing, Trip, TripStatus};

/// Persisted trip entities. Every status write goes through `transition`,
/// which validates against the shared state machine and applies the change
/// under the entry lock, so a concurrent writer cannot slip a lost update
/// past the status check.
pub struct TripStore {
    trips: DashMap<Uuid, Trip>,
}

impl TripStore {
    pub fn new() -> Self {
        Self {
            trips: DashMap::new(),
        }
    }

    pub fn insert(&self, trip: Trip) {
        self.trips.insert(trip.id, trip);
    }

    pub fn get(&self, trip_id: Uuid) -> Result<Trip, AppError> {
        self.trips
            .get(&trip_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AppError::NotFound(format!("trip {trip_id} not found")))
    }

    pub fn list(&self, status: Option<TripStatus>) -> Vec<Trip> {
        self.trips
            .iter()
            .filter(|entry| status.is_none_or(|wanted| entry.value().status == wanted))
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// The driver's current non-terminal trip, if any. At most one exists:
    /// an assigned driver is off the candidate pool until release.
    pub fn active_trip_for_driver(&self, driver_id: Uuid) -> Option<Trip> {
        self.trips.iter().find_map(|entry| {
            let trip = entry.value();
            (trip.driver_id == Some(driver_id) && !trip.status.is_terminal())
                .then(|| trip.clone())
        })
    }

    /// Moves the trip to `next`, rejecting illegal transitions with a
    /// Conflict and enforcing the driver-assignment invariants: a driver is
    /// required to enter accepted, an existing assignment is never silently
    /// overwritten, and in_progress requires one to already be set.
    pub fn transition(
        &self,
        trip_id: Uuid,
        next: TripStatus,
        driver_id: Option<Uuid>,
    ) -> Result<Trip, AppError> {
        let mut trip = self
            .trips
            .get_mut(&trip_id)
            .ok_or_else(|| AppError::NotFound(format!("trip {trip_id} not found")))?;

        let current = trip.status;
        if !current.can_transition_to(next) {
            return Err(AppError::Conflict(format!(
                "trip {trip_id} cannot move from {current:?} to {next:?}"
            )));
        }

        if next == TripStatus::Accepted {
            let incoming = driver_id.ok_or_else(|| {
                AppError::Validation("a driver is required to accept a trip".to_string())
            })?;
            if let Some(existing) = trip.driver_id {
                if existing != incoming {
                    return Err(AppError::Conflict(format!(
                        "trip {trip_id} is already assigned to driver {existing}"
                    )));
                }
            }
            trip.driver_id = Some(incoming);
        }

        if next.requires_driver() && trip.driver_id.is_none() {
            return Err(AppError::Conflict(format!(
                "trip {trip_id} has no assigned driver"
            )));
        }

        trip.status = next;
        trip.updated_at = Utc::now();
        Ok(trip.clone())
    }

    /// Compensation for a failed driver update after assignment: back to
    /// requested with the assignment cleared.
    pub fn revert_assignment(&self, trip_id: Uuid) -> Result<Trip, AppError> {
        let mut trip = self
            .trips
            .get_mut(&trip_id)
            .ok_or_else(|| AppError::NotFound(format!("trip {trip_id} not found")))?;

        trip.status = TripStatus::Requested;
        trip.driver_id = None;
        trip.updated_at = Utc::now();
        Ok(trip.clone())
    }

    pub fn mark_approved(&self, trip_id: Uuid) -> Result<Trip, AppError> {
        let mut trip = self
            .trips
            .get_mut(&trip_id)
            .ok_or_else(|| AppError::NotFound(format!("trip {trip_id} not found")))?;

        trip.approved = true;
        trip.updated_at = Utc::now();
        Ok(trip.clone())
    }

    pub fn set_rejection_reason(&self, trip_id: Uuid, reason: String) -> Result<Trip, AppError> {
        let mut trip = self
            .trips
            .get_mut(&trip_id)
            .ok_or_else(|| AppError::NotFound(format!("trip {trip_id} not found")))?;

        trip.rejection_reason = Some(reason);
        trip.updated_at = Utc::now();
        Ok(trip.clone())
    }

    /// Appends a location ping in receipt order. Only an active ride has a
    /// log to grow; anything else (not yet assigned, terminal) rejects the
    /// ping, so a late update cannot mutate a finished trip.
    pub fn append_ping(&self, trip_id: Uuid, ping: LocationPing) -> Result<Trip, AppError> {
        let mut trip = self
            .trips
            .get_mut(&trip_id)
            .ok_or_else(|| AppError::NotFound(format!("trip {trip_id} not found")))?;

        if !matches!(trip.status, TripStatus::Accepted | TripStatus::InProgress) {
            return Err(AppError::Conflict(format!(
                "trip {trip_id} is not active, location ping rejected"
            )));
        }

        trip.location_log.push(ping);
        trip.updated_at = Utc::now();
        Ok(trip.clone())
    }

    /// Completes the trip and records the final position in the same write,
    /// so the ping lands before the trip turns immutable.
    pub fn complete_with_ping(
        &self,
        trip_id: Uuid,
        ping: Option<LocationPing>,
    ) -> Result<Trip, AppError> {
        let mut trip = self
            .trips
            .get_mut(&trip_id)
            .ok_or_else(|| AppError::NotFound(format!("trip {trip_id} not found")))?;

        let current = trip.status;
        if !current.can_transition_to(TripStatus::Completed) {
            return Err(AppError::Conflict(format!(
                "trip {trip_id} cannot move from {current:?} to Completed"
            )));
        }
        if trip.driver_id.is_none() {
            return Err(AppError::Conflict(format!(
                "trip {trip_id} has no assigned driver"
            )));
        }

        if let Some(ping) = ping {
            trip.location_log.push(ping);
        }
        trip.status = TripStatus::Completed;
        trip.updated_at = Utc::now();
        Ok(trip.clone())
    }

    pub fn trip_count(&self) -> usize {
        self.trips.len()
    }
}

impl Default for TripStore {
    fn default() -> Self {
        Self::new()
    }
}
