use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use crate::engine::trips;
use crate::error::AppError;
use crate::models::driver::GeoPoint;
use crate::models::trip::{Trip, TripStatus};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/trips", post(book_trip).get(list_trips))
        .route("/trips/:id", get(get_trip))
        .route("/trips/:id/approve", post(approve_trip))
        .route("/trips/:id/reject", post(reject_trip))
        .route("/trips/:id/cancel", post(cancel_trip))
        .route("/trips/:id/start", post(start_trip))
        .route("/trips/:id/complete", post(complete_trip))
        .route("/trips/:id/freeze", post(freeze_trip))
        .route("/trips/:id/unfreeze", post(unfreeze_trip))
}

#[derive(Deserialize)]
pub struct BookTripRequest {
    pub rider_id: Uuid,
    pub origin: String,
    pub destination: String,
    pub distance: f64,
    pub fare: f64,
    pub duration: f64,
}

#[derive(Deserialize)]
pub struct ListTripsQuery {
    pub status: Option<TripStatus>,
}

#[derive(Deserialize)]
pub struct ApproveRequest {
    pub driver_id: Uuid,
}

#[derive(Deserialize)]
pub struct RejectRequest {
    pub driver_id: Uuid,
    pub reason: Option<String>,
}

#[derive(Deserialize)]
pub struct CancelRequest {
    pub actor_id: Uuid,
}

#[derive(Deserialize, Default)]
pub struct CompleteRequest {
    pub final_location: Option<GeoPoint>,
}

async fn book_trip(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<BookTripRequest>,
) -> Result<Json<Trip>, AppError> {
    let trip = trips::book(
        &state,
        trips::BookingRequest {
            rider_id: payload.rider_id,
            origin: payload.origin,
            destination: payload.destination,
            distance: payload.distance,
            fare: payload.fare,
            duration: payload.duration,
        },
    )
    .await?;

    Ok(Json(trip))
}

async fn list_trips(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListTripsQuery>,
) -> Json<Vec<Trip>> {
    Json(state.trips.list(query.status))
}

async fn get_trip(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Trip>, AppError> {
    Ok(Json(state.trips.get(id)?))
}

async fn approve_trip(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ApproveRequest>,
) -> Result<Json<Trip>, AppError> {
    Ok(Json(trips::approve(&state, id, payload.driver_id)?))
}

async fn reject_trip(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<RejectRequest>,
) -> Result<Json<Trip>, AppError> {
    Ok(Json(trips::reject(
        &state,
        id,
        payload.driver_id,
        payload.reason,
    )?))
}

async fn cancel_trip(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CancelRequest>,
) -> Result<Json<Trip>, AppError> {
    Ok(Json(trips::cancel(&state, id, payload.actor_id)?))
}

async fn start_trip(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Trip>, AppError> {
    Ok(Json(trips::start(&state, id)?))
}

async fn complete_trip(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    payload: Option<Json<CompleteRequest>>,
) -> Result<Json<Trip>, AppError> {
    let final_location = payload.and_then(|Json(body)| body.final_location);
    Ok(Json(trips::complete(&state, id, final_location)?))
}

async fn freeze_trip(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Trip>, AppError> {
    Ok(Json(trips::freeze(&state, id)?))
}

async fn unfreeze_trip(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Trip>, AppError> {
    Ok(Json(trips::unfreeze(&state, id)?))
}
