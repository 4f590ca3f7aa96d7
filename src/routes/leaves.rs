use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde_json::Value;
use uuid::Uuid;

use crate::{
    models::leave::{ProcessLeaveRequest, RequestLeaveRequest},
    services::leave::LeaveService,
    AppState,
};

pub async fn request_leave(
    State(state): State<AppState>,
    Path(therapist_id): Path<Uuid>,
    Json(body): Json<RequestLeaveRequest>,
) -> Result<(StatusCode, Json<Value>), (StatusCode, Json<Value>)> {
    LeaveService::request_leave(
        &state.db,
        therapist_id,
        &body.date,
        body.leave_type,
        &body.reason,
    )
    .await
    .map(|leave| (StatusCode::CREATED, Json(serde_json::to_value(leave).unwrap())))
    .map_err(|e| e.into_response_parts())
}

pub async fn process_leave(
    State(state): State<AppState>,
    Path(leave_id): Path<Uuid>,
    Json(body): Json<ProcessLeaveRequest>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    LeaveService::process_leave(&state.db, state.email.as_deref(), leave_id, &body)
        .await
        .map(|decision| Json(serde_json::to_value(decision).unwrap()))
        .map_err(|e| e.into_response_parts())
}

pub async fn get_balances(
    State(state): State<AppState>,
    Path(therapist_id): Path<Uuid>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    LeaveService::get_balances(&state.db, therapist_id)
        .await
        .map(|balances| Json(serde_json::to_value(balances).unwrap()))
        .map_err(|e| e.into_response_parts())
}
