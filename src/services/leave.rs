use chrono::{Datelike, NaiveDate, Utc};
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

use crate::{
    error::CoreError,
    models::leave::{
        CancelledBookingNotice, LeaveAction, LeaveBalances, LeaveDecision, LeaveStatus,
        LeaveType, ProcessLeaveRequest, TherapistLeave,
    },
    services::{
        email::EmailService, notifications::NotificationService, schedule_time,
    },
};

/// Approval touches an unbounded number of bookings; beyond this the whole
/// cascade aborts and the caller retries.
const APPROVAL_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(15);

pub struct LeaveService;

impl LeaveService {
    /// Current balances as of today (UTC).
    pub async fn get_balances(pool: &PgPool, therapist_id: Uuid) -> Result<LeaveBalances, CoreError> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM therapists WHERE id = $1)")
                .bind(therapist_id)
                .fetch_one(pool)
                .await?;
        if !exists {
            return Err(CoreError::NotFound(format!("Therapist {therapist_id} not found")));
        }
        balances_as_of(pool, therapist_id, Utc::now().date_naive()).await
    }

    /// File a PENDING leave request for one calendar day.
    ///
    /// A PENDING row reserves nothing: it carries an undecremented copy of
    /// the balances derived at request time, and the balance is only
    /// consumed at approval (which revalidates).
    pub async fn request_leave(
        pool: &PgPool,
        therapist_id: Uuid,
        date: &str,
        leave_type: LeaveType,
        reason: &str,
    ) -> Result<TherapistLeave, CoreError> {
        let day = schedule_time::parse_schedule_date(date)?;
        if day < Utc::now().date_naive() {
            return Err(CoreError::Validation(format!("Leave date {day} is in the past")));
        }

        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM therapists WHERE id = $1)")
                .bind(therapist_id)
                .fetch_one(pool)
                .await?;
        if !exists {
            return Err(CoreError::NotFound(format!("Therapist {therapist_id} not found")));
        }

        // One leave per calendar day: a PENDING or APPROVED row for the same
        // date blocks a new request.
        let duplicate: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM therapist_leaves
              WHERE therapist_id = $1 AND leave_date = $2 AND status IN ('PENDING', 'APPROVED'))",
        )
        .bind(therapist_id)
        .bind(day)
        .fetch_one(pool)
        .await?;
        if duplicate {
            return Err(CoreError::StateConflict(format!(
                "A leave request already exists for {day}"
            )));
        }

        let balances = balances_as_of(pool, therapist_id, day).await?;

        if leave_type == LeaveType::Optional
            && optional_used_in_month(pool, therapist_id, day).await?
        {
            return Err(CoreError::PolicyViolation(
                "An optional leave was already approved this month".into(),
            ));
        }
        if balances.remaining(leave_type) <= 0 {
            return Err(CoreError::PolicyViolation(format!(
                "No {leave_type} leave balance remaining"
            )));
        }

        let leave = sqlx::query_as::<_, TherapistLeave>(
            "INSERT INTO therapist_leaves
                 (therapist_id, leave_date, leave_type, status, reason,
                  casual_remaining, sick_remaining, festive_remaining, optional_remaining)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
             RETURNING *",
        )
        .bind(therapist_id)
        .bind(day)
        .bind(leave_type.to_string())
        .bind(LeaveStatus::Pending.to_string())
        .bind(reason)
        .bind(balances.casual)
        .bind(balances.sick)
        .bind(balances.festive)
        .bind(balances.optional)
        .fetch_one(pool)
        .await
        // A racing request for the same day slips past the EXISTS check but
        // trips the partial unique index on (therapist_id, leave_date).
        .map_err(|e| {
            CoreError::conflict_on_unique(e, format!("A leave request already exists for {day}"))
        })?;

        tracing::info!("Leave request {} filed for therapist {therapist_id} on {day}", leave.id);
        Ok(leave)
    }

    /// Admin decision on a PENDING leave. Rejection has no balance or
    /// booking effects; approval runs the full cascade atomically.
    pub async fn process_leave(
        pool: &PgPool,
        email: Option<&EmailService>,
        leave_id: Uuid,
        req: &ProcessLeaveRequest,
    ) -> Result<LeaveDecision, CoreError> {
        let leave = sqlx::query_as::<_, TherapistLeave>(
            "SELECT * FROM therapist_leaves WHERE id = $1",
        )
        .bind(leave_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| CoreError::NotFound(format!("Leave request {leave_id} not found")))?;

        if leave.status != LeaveStatus::Pending.to_string() {
            return Err(CoreError::StateConflict(format!(
                "Leave request {leave_id} was already processed ({})",
                leave.status
            )));
        }
        let leave_type: LeaveType = leave
            .leave_type
            .parse()
            .map_err(|e| CoreError::Validation(format!("{e}")))?;

        match req.action {
            LeaveAction::Reject => {
                let rejected = sqlx::query_as::<_, TherapistLeave>(
                    "UPDATE therapist_leaves
                     SET status = $1, admin_notes = $2, processed_by = $3, updated_at = NOW()
                     WHERE id = $4 AND status = $5
                     RETURNING *",
                )
                .bind(LeaveStatus::Rejected.to_string())
                .bind(&req.notes)
                .bind(req.admin_id)
                .bind(leave_id)
                .bind(LeaveStatus::Pending.to_string())
                .fetch_optional(pool)
                .await?
                .ok_or_else(|| {
                    CoreError::StateConflict(format!(
                        "Leave request {leave_id} was already processed"
                    ))
                })?;

                NotificationService::notify_quietly(
                    pool,
                    rejected.therapist_id,
                    &format!("Your leave request for {} was rejected", rejected.leave_date),
                    "leave_rejected",
                )
                .await;

                Ok(LeaveDecision { leave: rejected, cancelled_bookings: 0 })
            }
            LeaveAction::Approve => {
                let cascade = approve_cascade(pool, &leave, leave_type, req);
                let (approved, notices) = tokio::time::timeout(APPROVAL_TIMEOUT, cascade)
                    .await
                    .map_err(|_| {
                        CoreError::Transaction(format!(
                            "Leave approval timed out after {}s and was rolled back",
                            APPROVAL_TIMEOUT.as_secs()
                        ))
                    })??;

                dispatch_approval_notices(pool, email, &approved, leave_type, &notices).await;

                Ok(LeaveDecision {
                    leave: approved,
                    cancelled_bookings: notices.len(),
                })
            }
        }
    }
}

/// Derive the balances in force at `as_of`: the snapshot on the most recent
/// APPROVED leave with `leave_date <= as_of` (by date, not creation time),
/// or the seed defaults when no approved leave exists yet.
async fn balances_as_of<'a, E>(
    executor: E,
    therapist_id: Uuid,
    as_of: NaiveDate,
) -> Result<LeaveBalances, CoreError>
where
    E: sqlx::Executor<'a, Database = Postgres>,
{
    let latest = sqlx::query_as::<_, TherapistLeave>(
        "SELECT * FROM therapist_leaves
         WHERE therapist_id = $1 AND status = 'APPROVED' AND leave_date <= $2
         ORDER BY leave_date DESC
         LIMIT 1",
    )
    .bind(therapist_id)
    .bind(as_of)
    .fetch_optional(executor)
    .await?;

    Ok(latest
        .map(|l| LeaveBalances::from_snapshot(&l))
        .unwrap_or_default())
}

/// The globally newest APPROVED snapshot, regardless of date.
async fn latest_balances<'a, E>(
    executor: E,
    therapist_id: Uuid,
) -> Result<LeaveBalances, CoreError>
where
    E: sqlx::Executor<'a, Database = Postgres>,
{
    let latest = sqlx::query_as::<_, TherapistLeave>(
        "SELECT * FROM therapist_leaves
         WHERE therapist_id = $1 AND status = 'APPROVED'
         ORDER BY leave_date DESC
         LIMIT 1",
    )
    .bind(therapist_id)
    .fetch_optional(executor)
    .await?;

    Ok(latest
        .map(|l| LeaveBalances::from_snapshot(&l))
        .unwrap_or_default())
}

/// An approval may spend a day only if both the chain as of the leave's
/// own date and the globally newest approved snapshot still have budget:
/// an approval for a later date may already have consumed the last day,
/// and the as-of-date view alone cannot see it.
fn approval_spend_allowed(
    as_of: &LeaveBalances,
    latest: &LeaveBalances,
    leave_type: LeaveType,
) -> bool {
    as_of.remaining(leave_type) > 0 && latest.remaining(leave_type) > 0
}

/// One optional leave per calendar month, independent of the numeric
/// balance. Both gates are necessary; neither alone is sufficient.
async fn optional_used_in_month<'a, E>(
    executor: E,
    therapist_id: Uuid,
    day: NaiveDate,
) -> Result<bool, CoreError>
where
    E: sqlx::Executor<'a, Database = Postgres>,
{
    let (month_start, month_end) = month_bounds(day);
    let used: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM therapist_leaves
          WHERE therapist_id = $1 AND leave_type = 'OPTIONAL' AND status = 'APPROVED'
            AND leave_date >= $2 AND leave_date < $3)",
    )
    .bind(therapist_id)
    .bind(month_start)
    .bind(month_end)
    .fetch_one(executor)
    .await?;
    Ok(used)
}

/// Half-open [first of month, first of next month).
fn month_bounds(day: NaiveDate) -> (NaiveDate, NaiveDate) {
    let start = NaiveDate::from_ymd_opt(day.year(), day.month(), 1).unwrap();
    let end = if day.month() == 12 {
        NaiveDate::from_ymd_opt(day.year() + 1, 1, 1).unwrap()
    } else {
        NaiveDate::from_ymd_opt(day.year(), day.month() + 1, 1).unwrap()
    };
    (start, end)
}

/// The approval cascade, one transaction: revalidate and decrement the
/// balance, approve the row, deactivate the day's slots, cancel affected
/// bookings and free their slots. Dropping the future (timeout) rolls
/// everything back.
async fn approve_cascade(
    pool: &PgPool,
    leave: &TherapistLeave,
    leave_type: LeaveType,
    req: &ProcessLeaveRequest,
) -> Result<(TherapistLeave, Vec<CancelledBookingNotice>), CoreError> {
    let mut tx = pool.begin().await?;

    // Serialize approvals per therapist. Without this, two concurrent
    // cascades each derive balances from the same snapshot and a balance
    // of 1 can fund two approved leaves.
    sqlx::query("SELECT id FROM therapists WHERE id = $1 FOR UPDATE")
        .bind(leave.therapist_id)
        .execute(&mut *tx)
        .await?;

    // Approval-time revalidation: the snapshot stored on the request may be
    // stale, and an already-approved leave for a *later* date is invisible
    // to the as-of-date chain, so both views must still have budget. A
    // decrement must never drive a balance negative.
    let balances = balances_as_of(&mut *tx, leave.therapist_id, leave.leave_date).await?;
    let latest = latest_balances(&mut *tx, leave.therapist_id).await?;
    if !approval_spend_allowed(&balances, &latest, leave_type) {
        return Err(CoreError::PolicyViolation(format!(
            "No {leave_type} leave balance remaining at approval time"
        )));
    }
    if leave_type == LeaveType::Optional
        && optional_used_in_month(&mut *tx, leave.therapist_id, leave.leave_date).await?
    {
        return Err(CoreError::PolicyViolation(
            "An optional leave was already approved this month".into(),
        ));
    }
    let decremented = balances.decrement(leave_type);

    let approved = sqlx::query_as::<_, TherapistLeave>(
        "UPDATE therapist_leaves
         SET status = $1, admin_notes = $2, processed_by = $3,
             casual_remaining = $4, sick_remaining = $5,
             festive_remaining = $6, optional_remaining = $7,
             updated_at = NOW()
         WHERE id = $8 AND status = $9
         RETURNING *",
    )
    .bind(LeaveStatus::Approved.to_string())
    .bind(&req.notes)
    .bind(req.admin_id)
    .bind(decremented.casual)
    .bind(decremented.sick)
    .bind(decremented.festive)
    .bind(decremented.optional)
    .bind(leave.id)
    .bind(LeaveStatus::Pending.to_string())
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| {
        CoreError::StateConflict(format!("Leave request {} was already processed", leave.id))
    })?;

    let (day_start, day_end) = schedule_time::leave_day_bounds(leave.leave_date);

    sqlx::query(
        "UPDATE time_slots SET is_active = FALSE
         WHERE therapist_id = $1 AND start_time >= $2 AND start_time < $3",
    )
    .bind(leave.therapist_id)
    .bind(day_start)
    .bind(day_end)
    .execute(&mut *tx)
    .await?;

    let notices = sqlx::query_as::<_, CancelledBookingNotice>(
        "SELECT b.id AS booking_id, b.parent_id, p.email AS parent_email,
                t.first_name || ' ' || t.last_name AS therapist_name,
                ts.start_time AS session_start
         FROM bookings b
         JOIN time_slots ts ON ts.id = b.time_slot_id
         JOIN parents p ON p.id = b.parent_id
         JOIN therapists t ON t.id = b.therapist_id
         WHERE b.therapist_id = $1 AND b.status = 'SCHEDULED'
           AND ts.start_time >= $2 AND ts.start_time < $3",
    )
    .bind(leave.therapist_id)
    .bind(day_start)
    .bind(day_end)
    .fetch_all(&mut *tx)
    .await?;

    if !notices.is_empty() {
        let booking_ids: Vec<Uuid> = notices.iter().map(|n| n.booking_id).collect();

        sqlx::query("UPDATE bookings SET status = 'CANCELLED_BY_THERAPIST' WHERE id = ANY($1)")
            .bind(&booking_ids)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "UPDATE time_slots SET is_booked = FALSE
             WHERE id IN (SELECT time_slot_id FROM bookings WHERE id = ANY($1))",
        )
        .bind(&booking_ids)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    tracing::info!(
        "Approved leave {} for therapist {} on {}; {} booking(s) cancelled",
        leave.id,
        leave.therapist_id,
        leave.leave_date,
        notices.len()
    );
    Ok((approved, notices))
}

/// Post-commit fan-out, best-effort and independent per recipient: one
/// failed notification or email never stops the rest.
async fn dispatch_approval_notices(
    pool: &PgPool,
    email: Option<&EmailService>,
    approved: &TherapistLeave,
    leave_type: LeaveType,
    notices: &[CancelledBookingNotice],
) {
    let balances = LeaveBalances::from_snapshot(approved);
    NotificationService::notify_quietly(
        pool,
        approved.therapist_id,
        &format!(
            "Your leave for {} was approved. Remaining {leave_type} balance: {}",
            approved.leave_date,
            balances.remaining(leave_type)
        ),
        "leave_approved",
    )
    .await;

    for notice in notices {
        let message = format!(
            "Your session with {} on {} was cancelled because the therapist is on leave",
            notice.therapist_name,
            notice.session_start.to_rfc3339()
        );
        NotificationService::notify_quietly(pool, notice.parent_id, &message, "session_cancelled")
            .await;
        if let Some(email) = email {
            email
                .send_quietly(&notice.parent_email, "Session cancelled", &message)
                .await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};

    fn leave_row(balances: LeaveBalances) -> TherapistLeave {
        TherapistLeave {
            id: Uuid::new_v4(),
            therapist_id: Uuid::new_v4(),
            leave_date: NaiveDate::from_ymd_opt(2025, 7, 4).unwrap(),
            leave_type: "CASUAL".into(),
            status: "APPROVED".into(),
            reason: String::new(),
            admin_notes: None,
            processed_by: None,
            casual_remaining: balances.casual,
            sick_remaining: balances.sick,
            festive_remaining: balances.festive,
            optional_remaining: balances.optional,
            created_at: DateTime::<Utc>::MIN_UTC,
            updated_at: DateTime::<Utc>::MIN_UTC,
        }
    }

    #[test]
    fn seed_defaults_match_policy() {
        let b = LeaveBalances::default();
        assert_eq!((b.casual, b.sick, b.festive, b.optional), (5, 5, 5, 1));
    }

    #[test]
    fn decrement_touches_only_the_requested_type() {
        let b = LeaveBalances::default().decrement(LeaveType::Casual);
        assert_eq!(b.casual, 4);
        assert_eq!((b.sick, b.festive, b.optional), (5, 5, 1));

        let b = b.decrement(LeaveType::Optional);
        assert_eq!(b.optional, 0);
        assert_eq!(b.casual, 4);
    }

    #[test]
    fn snapshot_round_trips_through_a_row() {
        let original = LeaveBalances { casual: 3, sick: 1, festive: 0, optional: 1 };
        let row = leave_row(original);
        assert_eq!(LeaveBalances::from_snapshot(&row), original);
    }

    #[test]
    fn remaining_selects_the_right_counter() {
        let b = LeaveBalances { casual: 3, sick: 2, festive: 1, optional: 0 };
        assert_eq!(b.remaining(LeaveType::Casual), 3);
        assert_eq!(b.remaining(LeaveType::Sick), 2);
        assert_eq!(b.remaining(LeaveType::Festive), 1);
        assert_eq!(b.remaining(LeaveType::Optional), 0);
    }

    #[test]
    fn approval_needs_budget_in_both_balance_views() {
        let fresh = LeaveBalances::default();
        assert!(approval_spend_allowed(&fresh, &fresh, LeaveType::Casual));

        // A later-dated leave already approved with the last casual day:
        // the chain as of the earlier date still shows 1, the newest
        // snapshot shows 0. Approving would spend the same day twice.
        let as_of = LeaveBalances { casual: 1, sick: 5, festive: 5, optional: 1 };
        let latest = LeaveBalances { casual: 0, sick: 5, festive: 5, optional: 1 };
        assert!(!approval_spend_allowed(&as_of, &latest, LeaveType::Casual));
        assert!(approval_spend_allowed(&as_of, &latest, LeaveType::Sick));

        let spent = LeaveBalances { casual: 0, sick: 5, festive: 5, optional: 1 };
        assert!(!approval_spend_allowed(&spent, &fresh, LeaveType::Casual));
    }

    #[test]
    fn month_bounds_are_half_open() {
        let (start, end) = month_bounds(NaiveDate::from_ymd_opt(2025, 7, 15).unwrap());
        assert_eq!(start, NaiveDate::from_ymd_opt(2025, 7, 1).unwrap());
        assert_eq!(end, NaiveDate::from_ymd_opt(2025, 8, 1).unwrap());
    }

    #[test]
    fn month_bounds_roll_over_december() {
        let (start, end) = month_bounds(NaiveDate::from_ymd_opt(2025, 12, 31).unwrap());
        assert_eq!(start, NaiveDate::from_ymd_opt(2025, 12, 1).unwrap());
        assert_eq!(end, NaiveDate::from_ymd_opt(2026, 1, 1).unwrap());
    }
}
