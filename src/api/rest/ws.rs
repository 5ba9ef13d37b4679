use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamMap;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::engine::sync;
use crate::models::driver::{DriverStatus, GeoPoint};
use crate::models::event::Event;
use crate::models::trip::LocationPing;
use crate::state::AppState;
use crate::transport::ChannelId;

/// Inbound messages, one per real-time operation a connected client can
/// perform.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum ClientMessage {
    RegisterDriver {
        driver_id: Uuid,
    },
    RegisterRider {
        rider_id: Uuid,
    },
    UpdateStatus {
        user_id: Uuid,
        status: DriverStatus,
        coordinates: Option<GeoPoint>,
    },
    DriverResponse {
        trip_id: Uuid,
        driver_id: Uuid,
        accepted: bool,
    },
    JoinTripRoom {
        trip_id: Uuid,
    },
    LeaveTripRoom {
        trip_id: Uuid,
    },
    DriverLocationUpdate {
        trip_id: Uuid,
        driver_id: Uuid,
        location: GeoPoint,
    },
    Observe,
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let socket_id = Uuid::new_v4();
    let (mut sender, mut receiver) = socket.split();

    // Channels this connection has joined. Joining twice is a no-op.
    let mut joined: StreamMap<ChannelId, BroadcastStream<Event>> = StreamMap::new();

    info!(socket_id = %socket_id, "websocket client connected");

    loop {
        tokio::select! {
            inbound = receiver.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        handle_client_message(&state, socket_id, &text, &mut joined);
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        debug!(socket_id = %socket_id, error = %err, "websocket receive error");
                        break;
                    }
                }
            }
            outbound = next_event(&mut joined), if !joined.is_empty() => {
                match outbound {
                    Some(Ok(event)) => {
                        if forward(&mut sender, &event).await.is_err() {
                            break;
                        }
                    }
                    Some(Err(BroadcastStreamRecvError::Lagged(skipped))) => {
                        warn!(socket_id = %socket_id, skipped, "websocket client lagged, events dropped");
                    }
                    None => {}
                }
            }
        }
    }

    // Everyone bound to this socket goes offline and off the candidate pool.
    for driver in state.drivers.disconnect(socket_id) {
        sync::broadcast_driver(&state, &driver);
    }

    info!(socket_id = %socket_id, "websocket client disconnected");
}

async fn next_event(
    joined: &mut StreamMap<ChannelId, BroadcastStream<Event>>,
) -> Option<Result<Event, BroadcastStreamRecvError>> {
    joined.next().await.map(|(_, result)| result)
}

async fn forward(
    sender: &mut SplitSink<WebSocket, Message>,
    event: &Event,
) -> Result<(), axum::Error> {
    let json = match serde_json::to_string(event) {
        Ok(json) => json,
        Err(err) => {
            warn!(error = %err, "failed to serialize event for websocket");
            return Ok(());
        }
    };
    sender.send(Message::Text(json)).await
}

fn handle_client_message(
    state: &Arc<AppState>,
    socket_id: Uuid,
    text: &str,
    joined: &mut StreamMap<ChannelId, BroadcastStream<Event>>,
) {
    let message: ClientMessage = match serde_json::from_str(text) {
        Ok(message) => message,
        Err(err) => {
            debug!(socket_id = %socket_id, error = %err, "unparseable client message");
            return;
        }
    };

    match message {
        ClientMessage::RegisterDriver { driver_id } => {
            match state.drivers.register(driver_id, socket_id) {
                Ok(driver) => {
                    join(state, joined, ChannelId::Driver(driver_id));
                    sync::broadcast_driver(state, &driver);
                    info!(driver_id = %driver_id, socket_id = %socket_id, "driver registered");
                }
                Err(err) => {
                    warn!(driver_id = %driver_id, error = %err, "driver registration failed");
                }
            }
        }
        ClientMessage::RegisterRider { rider_id } => {
            state.drivers.register_rider(rider_id, socket_id);
            join(state, joined, ChannelId::Rider(rider_id));
            info!(rider_id = %rider_id, socket_id = %socket_id, "rider registered");
        }
        ClientMessage::UpdateStatus {
            user_id,
            status,
            coordinates,
        } => match state.drivers.update_status(user_id, status, coordinates) {
            Ok(driver) => sync::broadcast_driver(state, &driver),
            Err(err) => debug!(user_id = %user_id, error = %err, "status update ignored"),
        },
        ClientMessage::DriverResponse {
            trip_id,
            driver_id,
            accepted,
        } => {
            state.hub.publish(
                ChannelId::Trip(trip_id),
                Event::DriverResponse {
                    trip_id,
                    driver_id,
                    accepted,
                },
            );
            if !state.hub.resolve_offer(trip_id, driver_id, accepted) {
                // Late or unsolicited: the offer window already closed.
                debug!(trip_id = %trip_id, driver_id = %driver_id, "no pending offer for response, ignored");
            }
        }
        ClientMessage::JoinTripRoom { trip_id } => {
            join(state, joined, ChannelId::Trip(trip_id));
        }
        ClientMessage::LeaveTripRoom { trip_id } => {
            joined.remove(&ChannelId::Trip(trip_id));
        }
        ClientMessage::DriverLocationUpdate {
            trip_id,
            driver_id,
            location,
        } => {
            if !location.is_valid() {
                debug!(trip_id = %trip_id, driver_id = %driver_id, "malformed location update dropped");
                return;
            }
            let ping = LocationPing::now(&location);
            match state.trips.append_ping(trip_id, ping.clone()) {
                Ok(trip) => {
                    let event = Event::DriverLocationUpdate {
                        trip_id,
                        driver_id,
                        location: ping,
                    };
                    state.hub.publish(ChannelId::Rider(trip.rider_id), event.clone());
                    state.hub.publish(ChannelId::Trip(trip_id), event);
                }
                Err(err) => {
                    debug!(trip_id = %trip_id, error = %err, "location update rejected");
                }
            }
        }
        ClientMessage::Observe => {
            join(state, joined, ChannelId::Observers);
        }
    }
}

fn join(
    state: &AppState,
    joined: &mut StreamMap<ChannelId, BroadcastStream<Event>>,
    channel: ChannelId,
) {
    if joined.contains_key(&channel) {
        return;
    }
    joined.insert(channel, BroadcastStream::new(state.hub.subscribe(channel)));
}
