use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TherapistStatus {
    Active,
    Inactive,
}

impl std::fmt::Display for TherapistStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TherapistStatus::Active => "ACTIVE",
            TherapistStatus::Inactive => "INACTIVE",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for TherapistStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACTIVE" => Ok(TherapistStatus::Active),
            "INACTIVE" => Ok(TherapistStatus::Inactive),
            _ => Err(anyhow::anyhow!("Unknown therapist status: {s}")),
        }
    }
}

/// DB row struct — status is stored as TEXT and compared as a string in SQL.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Therapist {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    /// IANA timezone identifier, e.g. "Asia/Kolkata".
    pub timezone: String,
    pub status: String,
    pub base_cost_per_session: f64,
    pub slot_duration_minutes: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Therapist {
    /// An unparseable stored status counts as not accepting bookings.
    pub fn is_active(&self) -> bool {
        matches!(self.status.parse(), Ok(TherapistStatus::Active))
    }

    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Parent {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    /// Negotiated per-family fee; falls back to the therapist's base fee when NULL.
    pub custom_fee: Option<f64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Child {
    pub id: Uuid,
    pub parent_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub birth_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn therapist(status: &str) -> Therapist {
        Therapist {
            id: Uuid::new_v4(),
            first_name: "A".into(),
            last_name: "B".into(),
            email: "a@b.test".into(),
            timezone: "UTC".into(),
            status: status.into(),
            base_cost_per_session: 100.0,
            slot_duration_minutes: 60,
            created_at: DateTime::<Utc>::MIN_UTC,
            updated_at: DateTime::<Utc>::MIN_UTC,
        }
    }

    #[test]
    fn only_a_valid_active_status_accepts_bookings() {
        assert!(therapist("ACTIVE").is_active());
        assert!(!therapist("INACTIVE").is_active());
        assert!(!therapist("active").is_active());
        assert!(!therapist("").is_active());
    }
}
