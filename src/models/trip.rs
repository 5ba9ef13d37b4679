use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::driver::GeoPoint;

/// One driver-reported position, appended in receipt order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationPing {
    pub latitude: f64,
    pub longitude: f64,
    pub timestamp: DateTime<Utc>,
}

impl LocationPing {
    pub fn now(point: &GeoPoint) -> Self {
        Self {
            latitude: point.lat,
            longitude: point.lng,
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TripStatus {
    Requested,
    Accepted,
    InProgress,
    Completed,
    Cancelled,
    Rejected,
    Frozen,
    // Declared by the legacy schema but never assigned; kept so stored
    // legacy documents still deserialize. No transition produces it.
    Approved,
}

impl TripStatus {
    /// The one transition validator shared by every entry point
    /// (booking flow, dispatch, explicit operations).
    pub fn can_transition_to(self, next: TripStatus) -> bool {
        use TripStatus::*;
        matches!(
            (self, next),
            (Requested, Accepted)
                | (Requested, Rejected)
                | (Requested, Cancelled)
                | (Requested, Frozen)
                | (Frozen, Requested)
                | (Accepted, InProgress)
                | (Accepted, Cancelled)
                | (InProgress, Completed)
                | (InProgress, Cancelled)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TripStatus::Completed | TripStatus::Cancelled | TripStatus::Rejected
        )
    }

    /// Driver reference must be set exactly in these states.
    pub fn requires_driver(self) -> bool {
        matches!(
            self,
            TripStatus::Accepted | TripStatus::InProgress | TripStatus::Completed
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trip {
    pub id: Uuid,
    pub rider_id: Uuid,
    pub driver_id: Option<Uuid>,
    pub origin: String,
    pub destination: String,
    pub fare: f64,
    pub distance: f64,
    pub duration: f64,
    pub location_log: Vec<LocationPing>,
    pub status: TripStatus,
    pub approved: bool,
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Trip {
    pub fn new(
        rider_id: Uuid,
        origin: String,
        destination: String,
        distance: f64,
        fare: f64,
        duration: f64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            rider_id,
            driver_id: None,
            origin,
            destination,
            fare,
            distance,
            duration,
            location_log: Vec::new(),
            status: TripStatus::Requested,
            approved: false,
            rejection_reason: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::TripStatus::*;

    #[test]
    fn happy_path_transitions_are_allowed() {
        assert!(Requested.can_transition_to(Accepted));
        assert!(Accepted.can_transition_to(InProgress));
        assert!(InProgress.can_transition_to(Completed));
    }

    #[test]
    fn cancellation_is_allowed_from_active_states() {
        assert!(Requested.can_transition_to(Cancelled));
        assert!(Accepted.can_transition_to(Cancelled));
        assert!(InProgress.can_transition_to(Cancelled));
    }

    #[test]
    fn freeze_is_reversible() {
        assert!(Requested.can_transition_to(Frozen));
        assert!(Frozen.can_transition_to(Requested));
        assert!(!Frozen.can_transition_to(Accepted));
    }

    #[test]
    fn terminal_states_are_immutable() {
        for terminal in [Completed, Cancelled, Rejected] {
            assert!(terminal.is_terminal());
            for next in [Requested, Accepted, InProgress, Completed, Cancelled, Rejected, Frozen] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn completed_cannot_go_back_to_accepted() {
        assert!(!Completed.can_transition_to(Accepted));
    }

    #[test]
    fn rejection_only_from_requested() {
        assert!(Requested.can_transition_to(Rejected));
        assert!(!Accepted.can_transition_to(Rejected));
        assert!(!InProgress.can_transition_to(Rejected));
    }

    #[test]
    fn legacy_approved_status_is_unreachable() {
        for from in [Requested, Accepted, InProgress, Frozen] {
            assert!(!from.can_transition_to(Approved));
        }
    }
}
