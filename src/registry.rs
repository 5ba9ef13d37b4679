use std::collections::HashSet;

use chrono::Utc;
use dashmap::DashMap;
use tracing::debug;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::driver::{Driver, DriverStatus, GeoPoint, Vehicle};

/// Live connection state for one user. Created on connect, mutated on
/// status change, deleted on disconnect.
#[derive(Debug, Clone)]
pub struct ConnectionEntry {
    pub socket_id: Uuid,
    pub status: DriverStatus,
}

/// Tracks persisted driver records and who is currently connected.
/// Injectable service, created once at process start.
pub struct DriverRegistry {
    drivers: DashMap<Uuid, Driver>,
    connections: DashMap<Uuid, ConnectionEntry>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self {
            drivers: DashMap::new(),
            connections: DashMap::new(),
        }
    }

    pub fn create(&self, user_id: Uuid, name: String, vehicle: Vehicle) -> Driver {
        let driver = Driver::new(user_id, name, vehicle);
        self.drivers.insert(driver.id, driver.clone());
        driver
    }

    pub fn get(&self, driver_id: Uuid) -> Result<Driver, AppError> {
        self.drivers
            .get(&driver_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AppError::NotFound(format!("driver {driver_id} not found")))
    }

    pub fn list(&self) -> Vec<Driver> {
        self.drivers.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Marks the driver connected: status online, available for dispatch.
    pub fn register(&self, driver_id: Uuid, socket_id: Uuid) -> Result<Driver, AppError> {
        let driver = self.apply_status(driver_id, DriverStatus::Online, None)?;
        self.connections.insert(
            driver_id,
            ConnectionEntry {
                socket_id,
                status: DriverStatus::Online,
            },
        );
        Ok(driver)
    }

    /// Riders have no driver record; only their connection is tracked.
    pub fn register_rider(&self, rider_id: Uuid, socket_id: Uuid) {
        self.connections.insert(
            rider_id,
            ConnectionEntry {
                socket_id,
                status: DriverStatus::Online,
            },
        );
    }

    /// Persists a driver status change. Availability is recomputed from the
    /// status, and busy/on_trip/offline replace the shared location with the
    /// sentinel as part of the same update.
    pub fn update_status(
        &self,
        driver_id: Uuid,
        status: DriverStatus,
        coordinates: Option<GeoPoint>,
    ) -> Result<Driver, AppError> {
        if let Some(point) = &coordinates {
            if !point.is_valid() {
                return Err(AppError::Validation(format!(
                    "malformed coordinates: lat {}, lng {}",
                    point.lat, point.lng
                )));
            }
        }

        let driver = self.apply_status(driver_id, status, coordinates)?;

        if let Some(mut entry) = self.connections.get_mut(&driver_id) {
            entry.status = status;
        }

        Ok(driver)
    }

    /// Marks every user bound to the socket offline and removes their
    /// connection entries. Returns the updated driver records so the caller
    /// can broadcast the change.
    pub fn disconnect(&self, socket_id: Uuid) -> Vec<Driver> {
        let bound: Vec<Uuid> = self
            .connections
            .iter()
            .filter(|entry| entry.value().socket_id == socket_id)
            .map(|entry| *entry.key())
            .collect();

        let mut updated = Vec::new();
        for user_id in bound {
            self.connections.remove(&user_id);
            if let Ok(driver) = self.apply_status(user_id, DriverStatus::Offline, None) {
                updated.push(driver);
            } else {
                debug!(user_id = %user_id, "disconnected user has no driver record");
            }
        }
        updated
    }

    /// Candidates for a dispatch round: online/idle, available, and not yet
    /// notified. No geographic filter — any eligible driver is a candidate.
    pub fn candidates(&self, exclude: &HashSet<Uuid>) -> Vec<Driver> {
        self.drivers
            .iter()
            .filter_map(|entry| {
                let driver = entry.value();
                let eligible = driver.status.is_eligible()
                    && driver.availability
                    && !exclude.contains(&driver.id);
                eligible.then(|| driver.clone())
            })
            .collect()
    }

    /// Trip-assignment side effect: on_trip and off the candidate pool.
    pub fn mark_on_trip(&self, driver_id: Uuid) -> Result<Driver, AppError> {
        self.apply_status(driver_id, DriverStatus::OnTrip, None)
    }

    /// Terminal-trip side effect: back to an eligible status.
    pub fn release(&self, driver_id: Uuid) -> Result<Driver, AppError> {
        self.apply_status(driver_id, DriverStatus::Online, None)
    }

    /// Administrative purge; the only path that deletes driver records.
    pub fn purge(&self) -> usize {
        let count = self.drivers.len();
        self.drivers.clear();
        self.connections.clear();
        count
    }

    pub fn driver_count(&self) -> usize {
        self.drivers.len()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    fn apply_status(
        &self,
        driver_id: Uuid,
        status: DriverStatus,
        coordinates: Option<GeoPoint>,
    ) -> Result<Driver, AppError> {
        let mut driver = self
            .drivers
            .get_mut(&driver_id)
            .ok_or_else(|| AppError::NotFound(format!("driver {driver_id} not found")))?;

        driver.status = status;
        driver.availability = status.is_eligible();
        if status.hides_location() {
            driver.location = GeoPoint::hidden();
        } else if let Some(point) = coordinates {
            driver.location = point;
        }
        let now = Utc::now();
        driver.last_active = now;
        driver.updated_at = now;

        Ok(driver.clone())
    }
}

impl Default for DriverRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vehicle() -> Vehicle {
        Vehicle {
            make: "Toyota".to_string(),
            model: "Corolla".to_string(),
            plate_number: "ND 1234".to_string(),
        }
    }

    fn registry_with_driver() -> (DriverRegistry, Driver) {
        let registry = DriverRegistry::new();
        let driver = registry.create(Uuid::new_v4(), "Sipho".to_string(), vehicle());
        (registry, driver)
    }

    #[test]
    fn new_driver_is_offline_and_unavailable() {
        let (_, driver) = registry_with_driver();
        assert_eq!(driver.status, DriverStatus::Offline);
        assert!(!driver.availability);
    }

    #[test]
    fn register_marks_online_and_available() {
        let (registry, driver) = registry_with_driver();
        let updated = registry.register(driver.id, Uuid::new_v4()).unwrap();
        assert_eq!(updated.status, DriverStatus::Online);
        assert!(updated.availability);
        assert_eq!(registry.connection_count(), 1);
    }

    #[test]
    fn on_trip_implies_unavailable_and_hidden_location() {
        let (registry, driver) = registry_with_driver();
        registry.register(driver.id, Uuid::new_v4()).unwrap();
        registry
            .update_status(driver.id, DriverStatus::Online, Some(GeoPoint { lat: -29.85, lng: 31.02 }))
            .unwrap();

        let updated = registry.mark_on_trip(driver.id).unwrap();
        assert_eq!(updated.status, DriverStatus::OnTrip);
        assert!(!updated.availability);
        assert_eq!(updated.location, GeoPoint::hidden());
    }

    #[test]
    fn eligible_status_keeps_reported_location() {
        let (registry, driver) = registry_with_driver();
        let point = GeoPoint { lat: -29.85, lng: 31.02 };
        let updated = registry
            .update_status(driver.id, DriverStatus::Idle, Some(point))
            .unwrap();
        assert_eq!(updated.location, point);
        assert!(updated.availability);
    }

    #[test]
    fn malformed_coordinates_are_rejected_without_state_change() {
        let (registry, driver) = registry_with_driver();
        let err = registry
            .update_status(driver.id, DriverStatus::Online, Some(GeoPoint { lat: 123.0, lng: 0.0 }))
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(registry.get(driver.id).unwrap().status, DriverStatus::Offline);
    }

    #[test]
    fn disconnect_marks_offline_and_removes_entry() {
        let (registry, driver) = registry_with_driver();
        let socket_id = Uuid::new_v4();
        registry.register(driver.id, socket_id).unwrap();

        let updated = registry.disconnect(socket_id);
        assert_eq!(updated.len(), 1);
        assert_eq!(updated[0].status, DriverStatus::Offline);
        assert!(!updated[0].availability);
        assert_eq!(registry.connection_count(), 0);
    }

    #[test]
    fn candidates_exclude_notified_and_ineligible_drivers() {
        let registry = DriverRegistry::new();
        let a = registry.create(Uuid::new_v4(), "A".to_string(), vehicle());
        let b = registry.create(Uuid::new_v4(), "B".to_string(), vehicle());
        let c = registry.create(Uuid::new_v4(), "C".to_string(), vehicle());

        registry.register(a.id, Uuid::new_v4()).unwrap();
        registry.register(b.id, Uuid::new_v4()).unwrap();
        // c stays offline

        let mut notified = HashSet::new();
        notified.insert(a.id);

        let candidates = registry.candidates(&notified);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].id, b.id);
        let _ = c;
    }

    #[test]
    fn unknown_driver_is_not_found() {
        let registry = DriverRegistry::new();
        assert!(matches!(
            registry.get(Uuid::new_v4()),
            Err(AppError::NotFound(_))
        ));
    }
}
