use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde_json::Value;
use uuid::Uuid;

use crate::{
    models::booking::BookSlotRequest, services::booking::BookingService, AppState,
};

pub async fn book_slot(
    State(state): State<AppState>,
    Json(body): Json<BookSlotRequest>,
) -> Result<(StatusCode, Json<Value>), (StatusCode, Json<Value>)> {
    BookingService::book(&state.db, body.parent_id, body.child_id, body.time_slot_id)
        .await
        .map(|receipt| {
            (
                StatusCode::CREATED,
                Json(serde_json::to_value(receipt).unwrap()),
            )
        })
        .map_err(|e| e.into_response_parts())
}

pub async fn mark_completed(
    State(state): State<AppState>,
    Path(booking_id): Path<Uuid>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    BookingService::mark_completed(&state.db, booking_id)
        .await
        .map(|booking| Json(serde_json::to_value(booking).unwrap()))
        .map_err(|e| e.into_response_parts())
}
