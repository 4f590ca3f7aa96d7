use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LeaveType {
    Casual,
    Sick,
    Festive,
    Optional,
}

impl std::fmt::Display for LeaveType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LeaveType::Casual => "CASUAL",
            LeaveType::Sick => "SICK",
            LeaveType::Festive => "FESTIVE",
            LeaveType::Optional => "OPTIONAL",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for LeaveType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CASUAL" => Ok(LeaveType::Casual),
            "SICK" => Ok(LeaveType::Sick),
            "FESTIVE" => Ok(LeaveType::Festive),
            "OPTIONAL" => Ok(LeaveType::Optional),
            _ => Err(anyhow::anyhow!("Unknown leave type: {s}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LeaveStatus {
    Pending,
    Approved,
    Rejected,
}

impl std::fmt::Display for LeaveStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LeaveStatus::Pending => "PENDING",
            LeaveStatus::Approved => "APPROVED",
            LeaveStatus::Rejected => "REJECTED",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LeaveAction {
    Approve,
    Reject,
}

/// One leave-day request with the balance snapshot taken when it was
/// created (PENDING) or approved (APPROVED — decremented values).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TherapistLeave {
    pub id: Uuid,
    pub therapist_id: Uuid,
    pub leave_date: NaiveDate,
    pub leave_type: String,
    pub status: String,
    pub reason: String,
    pub admin_notes: Option<String>,
    pub processed_by: Option<Uuid>,
    pub casual_remaining: i32,
    pub sick_remaining: i32,
    pub festive_remaining: i32,
    pub optional_remaining: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Per-type remaining leave counts. Always derived from the most recent
/// APPROVED leave row, never kept as a mutable counter.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct LeaveBalances {
    pub casual: i32,
    pub sick: i32,
    pub festive: i32,
    pub optional: i32,
}

impl Default for LeaveBalances {
    fn default() -> Self {
        Self {
            casual: 5,
            sick: 5,
            festive: 5,
            optional: 1,
        }
    }
}

impl LeaveBalances {
    pub fn from_snapshot(leave: &TherapistLeave) -> Self {
        Self {
            casual: leave.casual_remaining,
            sick: leave.sick_remaining,
            festive: leave.festive_remaining,
            optional: leave.optional_remaining,
        }
    }

    pub fn remaining(&self, leave_type: LeaveType) -> i32 {
        match leave_type {
            LeaveType::Casual => self.casual,
            LeaveType::Sick => self.sick,
            LeaveType::Festive => self.festive,
            LeaveType::Optional => self.optional,
        }
    }

    /// Consume one day of the given type.
    pub fn decrement(mut self, leave_type: LeaveType) -> Self {
        match leave_type {
            LeaveType::Casual => self.casual -= 1,
            LeaveType::Sick => self.sick -= 1,
            LeaveType::Festive => self.festive -= 1,
            LeaveType::Optional => self.optional -= 1,
        }
        self
    }
}

/// Body for POST /therapists/{id}/leaves.
#[derive(Debug, Deserialize)]
pub struct RequestLeaveRequest {
    /// Strict "YYYY-MM-DD".
    pub date: String,
    pub leave_type: LeaveType,
    pub reason: String,
}

/// Body for POST /leaves/{id}/process.
#[derive(Debug, Deserialize)]
pub struct ProcessLeaveRequest {
    pub admin_id: Uuid,
    pub action: LeaveAction,
    pub notes: Option<String>,
}

/// Notification payload collected inside the approval transaction for one
/// cancelled booking, dispatched after commit.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct CancelledBookingNotice {
    pub booking_id: Uuid,
    pub parent_id: Uuid,
    pub parent_email: String,
    pub therapist_name: String,
    pub session_start: DateTime<Utc>,
}

/// Outcome of processing a leave request.
#[derive(Debug, Serialize)]
pub struct LeaveDecision {
    pub leave: TherapistLeave,
    pub cancelled_bookings: usize,
}
