use crate::models::driver::Driver;
use crate::models::event::Event;
use crate::models::trip::Trip;
use crate::state::AppState;
use crate::transport::ChannelId;

/// Fans a trip event out to every channel with a stake in the trip: the
/// trip's own channel, the rider's, and the assigned driver's. Observers
/// get a copy of everything through the hub. Returns the total number of
/// receivers reached, for callers that care about delivery (cancellation).
pub fn broadcast_trip(state: &AppState, trip: &Trip, event: Event) -> usize {
    let mut reached = state.hub.publish(ChannelId::Trip(trip.id), event.clone());
    reached += state
        .hub
        .publish(ChannelId::Rider(trip.rider_id), event.clone());
    if let Some(driver_id) = trip.driver_id {
        reached += state.hub.publish(ChannelId::Driver(driver_id), event);
    }
    reached
}

/// Publishes a driver's new status to the driver's channel, and to the
/// trip and rider channels of the driver's active trip if one exists, so
/// every party converges without polling.
pub fn broadcast_driver(state: &AppState, driver: &Driver) {
    let event = Event::DriverStatusChanged {
        driver_id: driver.id,
        status: driver.status,
        location: driver.location,
    };
    state.hub.publish(ChannelId::Driver(driver.id), event.clone());

    if let Some(trip) = state.trips.active_trip_for_driver(driver.id) {
        state.hub.publish(ChannelId::Trip(trip.id), event.clone());
        state.hub.publish(ChannelId::Rider(trip.rider_id), event);
    }
}
