use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::driver::{DriverStatus, GeoPoint};
use crate::models::trip::{LocationPing, Trip};

/// Real-time events carried on trip, driver and rider channels.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum Event {
    TripOffer {
        trip: Trip,
    },
    DriverResponse {
        trip_id: Uuid,
        driver_id: Uuid,
        accepted: bool,
    },
    TripAssigned {
        trip: Trip,
    },
    TripRejected {
        trip_id: Uuid,
        driver_id: Uuid,
        reason: String,
    },
    TripCancelled {
        trip_id: Uuid,
        reason: String,
    },
    /// Catch-all for status mutations without a dedicated event
    /// (start, complete, freeze, unfreeze).
    TripStatusChanged {
        trip: Trip,
    },
    DriverLocationUpdate {
        trip_id: Uuid,
        driver_id: Uuid,
        location: LocationPing,
    },
    NoDriversAvailable {
        trip_id: Uuid,
    },
    DriverStatusChanged {
        driver_id: Uuid,
        status: DriverStatus,
        location: GeoPoint,
    },
}
