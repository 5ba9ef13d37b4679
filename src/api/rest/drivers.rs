use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, patch, post};
use axum::Json;
use axum::Router;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::sync;
use crate::error::AppError;
use crate::models::driver::{Driver, DriverStatus, GeoPoint, Vehicle};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/drivers",
            post(create_driver).get(list_drivers).delete(purge_drivers),
        )
        .route("/drivers/:id", get(get_driver))
        .route("/drivers/:id/status", patch(update_driver_status))
}

#[derive(Deserialize)]
pub struct CreateDriverRequest {
    pub user_id: Uuid,
    pub name: String,
    pub vehicle: Vehicle,
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: DriverStatus,
    pub coordinates: Option<GeoPoint>,
}

#[derive(Serialize)]
pub struct PurgeResponse {
    pub deleted: usize,
}

async fn create_driver(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateDriverRequest>,
) -> Result<Json<Driver>, AppError> {
    if payload.name.trim().is_empty() {
        return Err(AppError::Validation("name cannot be empty".to_string()));
    }
    if payload.vehicle.plate_number.trim().is_empty() {
        return Err(AppError::Validation(
            "vehicle plate number cannot be empty".to_string(),
        ));
    }

    let driver = state
        .drivers
        .create(payload.user_id, payload.name, payload.vehicle);
    Ok(Json(driver))
}

async fn list_drivers(State(state): State<Arc<AppState>>) -> Json<Vec<Driver>> {
    Json(state.drivers.list())
}

async fn get_driver(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Driver>, AppError> {
    Ok(Json(state.drivers.get(id)?))
}

async fn update_driver_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<Json<Driver>, AppError> {
    let driver = state
        .drivers
        .update_status(id, payload.status, payload.coordinates)?;
    sync::broadcast_driver(&state, &driver);
    Ok(Json(driver))
}

async fn purge_drivers(State(state): State<Arc<AppState>>) -> Json<PurgeResponse> {
    let deleted = state.drivers.purge();
    Json(PurgeResponse { deleted })
}
