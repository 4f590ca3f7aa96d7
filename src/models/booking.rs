use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    Scheduled,
    Completed,
    CancelledByTherapist,
}

impl std::fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BookingStatus::Scheduled => "SCHEDULED",
            BookingStatus::Completed => "COMPLETED",
            BookingStatus::CancelledByTherapist => "CANCELLED_BY_THERAPIST",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for BookingStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SCHEDULED" => Ok(BookingStatus::Scheduled),
            "COMPLETED" => Ok(BookingStatus::Completed),
            "CANCELLED_BY_THERAPIST" => Ok(BookingStatus::CancelledByTherapist),
            _ => Err(anyhow::anyhow!("Unknown booking status: {s}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Booking {
    pub id: Uuid,
    pub parent_id: Uuid,
    pub child_id: Uuid,
    pub therapist_id: Uuid,
    pub time_slot_id: Uuid,
    pub status: String,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Payment {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub amount: f64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DataAccessPermission {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub therapist_id: Uuid,
    pub child_id: Uuid,
    pub can_view_details: bool,
    pub access_starts_at: DateTime<Utc>,
    pub access_ends_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Body for POST /bookings.
#[derive(Debug, Deserialize)]
pub struct BookSlotRequest {
    pub parent_id: Uuid,
    pub child_id: Uuid,
    pub time_slot_id: Uuid,
}

/// Everything created by one successful booking transaction.
#[derive(Debug, Serialize)]
pub struct BookingReceipt {
    pub booking: Booking,
    pub payment: Payment,
    pub permission: DataAccessPermission,
    pub slot_start: DateTime<Utc>,
    pub slot_end: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn booking_status_round_trips_through_text() {
        for status in [
            BookingStatus::Scheduled,
            BookingStatus::Completed,
            BookingStatus::CancelledByTherapist,
        ] {
            assert_eq!(status.to_string().parse::<BookingStatus>().unwrap(), status);
        }
        assert!("CANCELLED".parse::<BookingStatus>().is_err());
    }
}
