use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TimeSlot {
    pub id: Uuid,
    pub therapist_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub is_booked: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Body for POST /therapists/{id}/slots/generate.
#[derive(Debug, Deserialize)]
pub struct GenerateSlotsRequest {
    /// Strict "YYYY-MM-DD", first day of the generation horizon.
    pub start_date: String,
    /// Local "HH:mm" start times, interpreted in the therapist's timezone.
    pub selected_slots: Vec<String>,
    pub duration_minutes: Option<i32>,
    pub horizon_days: Option<i64>,
}

/// Body for POST /therapists/{id}/slots/day (admin day regeneration).
#[derive(Debug, Deserialize)]
pub struct RegenerateDayRequest {
    pub date: String,
    /// "HH:mm" start times treated as literal UTC.
    pub slot_times: Vec<String>,
    pub duration_minutes: Option<i32>,
}

/// Body for POST /therapists/{id}/slots/activate.
#[derive(Debug, Deserialize)]
pub struct ActivateSlotsRequest {
    pub date: String,
    pub slot_ids: Vec<Uuid>,
}

/// Query params for the slot listing endpoints.
#[derive(Debug, Deserialize)]
pub struct SlotDayQuery {
    pub date: String,
}
