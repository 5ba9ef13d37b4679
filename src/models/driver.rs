use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    /// Sentinel published instead of the real position while the driver's
    /// location is hidden (busy, on_trip, offline).
    pub fn hidden() -> Self {
        Self { lat: 0.0, lng: 0.0 }
    }

    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.lat) && (-180.0..=180.0).contains(&self.lng)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DriverStatus {
    Offline,
    Online,
    Idle,
    Busy,
    OnTrip,
}

impl DriverStatus {
    /// Eligible for dispatch. Availability is derived from this on every
    /// status write, so on_trip always implies unavailable.
    pub fn is_eligible(self) -> bool {
        matches!(self, DriverStatus::Online | DriverStatus::Idle)
    }

    /// Statuses that hide the driver's shared location.
    pub fn hides_location(self) -> bool {
        matches!(
            self,
            DriverStatus::Busy | DriverStatus::OnTrip | DriverStatus::Offline
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vehicle {
    pub make: String,
    pub model: String,
    pub plate_number: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Driver {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub vehicle: Vehicle,
    pub status: DriverStatus,
    pub availability: bool,
    pub location: GeoPoint,
    pub last_active: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Driver {
    pub fn new(user_id: Uuid, name: String, vehicle: Vehicle) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            name,
            vehicle,
            status: DriverStatus::Offline,
            availability: false,
            location: GeoPoint::hidden(),
            last_active: now,
            created_at: now,
            updated_at: now,
        }
    }
}
