use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde_json::Value;
use uuid::Uuid;

use crate::{
    models::slot::{ActivateSlotsRequest, GenerateSlotsRequest, RegenerateDayRequest, SlotDayQuery},
    services::slots::{SlotService, DEFAULT_HORIZON_DAYS},
    AppState,
};

pub async fn generate_slots(
    State(state): State<AppState>,
    Path(therapist_id): Path<Uuid>,
    Json(body): Json<GenerateSlotsRequest>,
) -> Result<(StatusCode, Json<Value>), (StatusCode, Json<Value>)> {
    let horizon = body.horizon_days.unwrap_or(DEFAULT_HORIZON_DAYS);
    SlotService::generate_slots(
        &state.db,
        therapist_id,
        &body.start_date,
        &body.selected_slots,
        body.duration_minutes,
        horizon,
    )
    .await
    .map(|slots| (StatusCode::CREATED, Json(serde_json::to_value(slots).unwrap())))
    .map_err(|e| e.into_response_parts())
}

pub async fn regenerate_day(
    State(state): State<AppState>,
    Path(therapist_id): Path<Uuid>,
    Json(body): Json<RegenerateDayRequest>,
) -> Result<(StatusCode, Json<Value>), (StatusCode, Json<Value>)> {
    SlotService::regenerate_day(
        &state.db,
        therapist_id,
        &body.date,
        &body.slot_times,
        body.duration_minutes,
    )
    .await
    .map(|slots| (StatusCode::CREATED, Json(serde_json::to_value(slots).unwrap())))
    .map_err(|e| e.into_response_parts())
}

pub async fn activate_slots(
    State(state): State<AppState>,
    Path(therapist_id): Path<Uuid>,
    Json(body): Json<ActivateSlotsRequest>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    SlotService::activate_slots(&state.db, therapist_id, &body.date, &body.slot_ids)
        .await
        .map(|slots| Json(serde_json::to_value(slots).unwrap()))
        .map_err(|e| e.into_response_parts())
}

pub async fn list_slots(
    State(state): State<AppState>,
    Path(therapist_id): Path<Uuid>,
    Query(query): Query<SlotDayQuery>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    SlotService::list_slots(&state.db, therapist_id, &query.date)
        .await
        .map(|slots| Json(serde_json::to_value(slots).unwrap()))
        .map_err(|e| e.into_response_parts())
}

pub async fn list_available_slots(
    State(state): State<AppState>,
    Path(therapist_id): Path<Uuid>,
    Query(query): Query<SlotDayQuery>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    SlotService::list_available_slots(&state.db, therapist_id, &query.date)
        .await
        .map(|slots| Json(serde_json::to_value(slots).unwrap()))
        .map_err(|e| e.into_response_parts())
}
