use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::{
    error::CoreError,
    models::{slot::TimeSlot, therapist::Therapist},
    services::schedule_time::{
        self, parse_schedule_date, parse_slot_time, SlotTimePolicy,
    },
};

/// Day-level regeneration may activate at most this many slots.
pub const MAX_ACTIVE_SLOTS_PER_DAY: usize = 10;

/// Default generation horizon when the caller does not pass one.
pub const DEFAULT_HORIZON_DAYS: i64 = 30;

pub struct SlotService;

impl SlotService {
    /// Materialize bookable slots for `[start_date, start_date + horizon_days)`
    /// from the therapist's recurring local slot times.
    ///
    /// Regeneration is idempotent: all unbooked future slots of the
    /// therapist are deleted first, booked slots are never touched, and a
    /// start time still occupied by a booked slot is skipped on insert.
    pub async fn generate_slots(
        pool: &PgPool,
        therapist_id: Uuid,
        start_date: &str,
        selected_slots: &[String],
        duration_minutes: Option<i32>,
        horizon_days: i64,
    ) -> Result<Vec<TimeSlot>, CoreError> {
        let start = parse_schedule_date(start_date)?;
        let times = parse_slot_times(selected_slots)?;
        if let Some(d) = duration_minutes {
            validate_duration(d)?;
        }
        if !(1..=366).contains(&horizon_days) {
            return Err(CoreError::Validation(format!(
                "horizon_days must be between 1 and 366, got {horizon_days}"
            )));
        }

        let therapist = fetch_therapist(pool, therapist_id).await?;
        let duration_minutes = duration_minutes.unwrap_or(therapist.slot_duration_minutes);
        validate_duration(duration_minutes)?;
        let tz = schedule_time::resolve_timezone(&therapist.timezone)?;
        let policy = SlotTimePolicy::TherapistLocal(tz);

        // Days already covered by an approved leave produce no slots.
        let leave_days: Vec<NaiveDate> = sqlx::query_scalar(
            "SELECT leave_date FROM therapist_leaves
             WHERE therapist_id = $1 AND status = 'APPROVED'
               AND leave_date >= $2 AND leave_date < $3",
        )
        .bind(therapist_id)
        .bind(start)
        .bind(start + Duration::days(horizon_days))
        .fetch_all(pool)
        .await?;

        let mut staged = Vec::new();
        for offset in 0..horizon_days {
            let day = start + Duration::days(offset);
            if leave_days.contains(&day) {
                continue;
            }
            staged.extend(stage_day_slots(day, &times, duration_minutes, &policy)?);
        }

        let mut tx = pool.begin().await?;

        sqlx::query(
            "DELETE FROM time_slots
             WHERE therapist_id = $1 AND is_booked = FALSE AND start_time >= NOW()",
        )
        .bind(therapist_id)
        .execute(&mut *tx)
        .await?;

        let inserted = insert_staged(&mut tx, therapist_id, &staged, true).await?;
        tx.commit().await?;

        tracing::info!(
            "Generated {} slot(s) for therapist {} over {} day(s)",
            inserted.len(),
            therapist_id,
            horizon_days
        );
        Ok(inserted)
    }

    /// Day-scoped delete-then-recreate used by the admin generate-and-activate
    /// flow. Slot times are treated as literal UTC and the new rows start out
    /// inactive until `activate_slots` marks the chosen ones.
    pub async fn regenerate_day(
        pool: &PgPool,
        therapist_id: Uuid,
        date: &str,
        slot_times: &[String],
        duration_minutes: Option<i32>,
    ) -> Result<Vec<TimeSlot>, CoreError> {
        let day = parse_schedule_date(date)?;
        let times = parse_slot_times(slot_times)?;
        if let Some(d) = duration_minutes {
            validate_duration(d)?;
        }

        let therapist = fetch_therapist(pool, therapist_id).await?;
        let duration_minutes = duration_minutes.unwrap_or(therapist.slot_duration_minutes);
        validate_duration(duration_minutes)?;

        if has_approved_leave(pool, therapist_id, day).await? {
            tracing::info!(
                "Skipping day regeneration for therapist {therapist_id} on {day}: approved leave"
            );
            return Ok(Vec::new());
        }

        let staged = stage_day_slots(day, &times, duration_minutes, &SlotTimePolicy::LiteralUtc)?;
        let (day_start, day_end) = schedule_time::leave_day_bounds(day);

        let mut tx = pool.begin().await?;

        sqlx::query(
            "DELETE FROM time_slots
             WHERE therapist_id = $1 AND is_booked = FALSE
               AND start_time >= $2 AND start_time < $3",
        )
        .bind(therapist_id)
        .bind(day_start)
        .bind(day_end)
        .execute(&mut *tx)
        .await?;

        let inserted = insert_staged(&mut tx, therapist_id, &staged, false).await?;
        tx.commit().await?;

        Ok(inserted)
    }

    /// Activate the chosen slots for one day and deactivate the rest.
    /// All-or-nothing: an unknown id aborts without partial activation.
    pub async fn activate_slots(
        pool: &PgPool,
        therapist_id: Uuid,
        date: &str,
        slot_ids: &[Uuid],
    ) -> Result<Vec<TimeSlot>, CoreError> {
        let day = parse_schedule_date(date)?;
        validate_activation_request(slot_ids)?;

        let (day_start, day_end) = schedule_time::leave_day_bounds(day);
        let mut tx = pool.begin().await?;

        let unbooked: Vec<Uuid> = sqlx::query_scalar(
            "SELECT id FROM time_slots
             WHERE therapist_id = $1 AND is_booked = FALSE
               AND start_time >= $2 AND start_time < $3
             FOR UPDATE",
        )
        .bind(therapist_id)
        .bind(day_start)
        .bind(day_end)
        .fetch_all(&mut *tx)
        .await?;

        check_activation_ids(slot_ids, &unbooked)?;

        sqlx::query(
            "UPDATE time_slots SET is_active = FALSE
             WHERE therapist_id = $1 AND is_booked = FALSE
               AND start_time >= $2 AND start_time < $3",
        )
        .bind(therapist_id)
        .bind(day_start)
        .bind(day_end)
        .execute(&mut *tx)
        .await?;

        let activated = sqlx::query_as::<_, TimeSlot>(
            "UPDATE time_slots SET is_active = TRUE
             WHERE id = ANY($1)
             RETURNING *",
        )
        .bind(slot_ids)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(activated)
    }

    /// Every slot of the therapist's day, active or not.
    pub async fn list_slots(
        pool: &PgPool,
        therapist_id: Uuid,
        date: &str,
    ) -> Result<Vec<TimeSlot>, CoreError> {
        let day = parse_schedule_date(date)?;
        let (day_start, day_end) = schedule_time::leave_day_bounds(day);
        let slots = sqlx::query_as::<_, TimeSlot>(
            "SELECT * FROM time_slots
             WHERE therapist_id = $1 AND start_time >= $2 AND start_time < $3
             ORDER BY start_time",
        )
        .bind(therapist_id)
        .bind(day_start)
        .bind(day_end)
        .fetch_all(pool)
        .await?;
        Ok(slots)
    }

    /// Slots a parent may book: active and unbooked. Inactive slots are
    /// never offered even when unbooked.
    pub async fn list_available_slots(
        pool: &PgPool,
        therapist_id: Uuid,
        date: &str,
    ) -> Result<Vec<TimeSlot>, CoreError> {
        let day = parse_schedule_date(date)?;
        let (day_start, day_end) = schedule_time::leave_day_bounds(day);
        let slots = sqlx::query_as::<_, TimeSlot>(
            "SELECT * FROM time_slots
             WHERE therapist_id = $1 AND is_booked = FALSE AND is_active = TRUE
               AND start_time >= $2 AND start_time < $3
             ORDER BY start_time",
        )
        .bind(therapist_id)
        .bind(day_start)
        .bind(day_end)
        .fetch_all(pool)
        .await?;
        Ok(slots)
    }
}

async fn fetch_therapist(pool: &PgPool, therapist_id: Uuid) -> Result<Therapist, CoreError> {
    sqlx::query_as::<_, Therapist>("SELECT * FROM therapists WHERE id = $1")
        .bind(therapist_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| CoreError::NotFound(format!("Therapist {therapist_id} not found")))
}

async fn has_approved_leave(
    pool: &PgPool,
    therapist_id: Uuid,
    day: NaiveDate,
) -> Result<bool, CoreError> {
    let exists: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM therapist_leaves
          WHERE therapist_id = $1 AND leave_date = $2 AND status = 'APPROVED')",
    )
    .bind(therapist_id)
    .bind(day)
    .fetch_one(pool)
    .await?;
    Ok(exists)
}

/// Parse and dedup-check a list of "HH:mm" strings before any DB access.
fn parse_slot_times(raw: &[String]) -> Result<Vec<NaiveTime>, CoreError> {
    if raw.is_empty() {
        return Err(CoreError::Validation("No slot times given".into()));
    }
    let mut times = Vec::with_capacity(raw.len());
    for s in raw {
        let t = parse_slot_time(s)?;
        if times.contains(&t) {
            return Err(CoreError::Validation(format!("Duplicate slot time '{s}'")));
        }
        times.push(t);
    }
    Ok(times)
}

fn validate_duration(duration_minutes: i32) -> Result<(), CoreError> {
    if !(1..=24 * 60).contains(&duration_minutes) {
        return Err(CoreError::Validation(format!(
            "Invalid slot duration: {duration_minutes} minutes"
        )));
    }
    Ok(())
}

/// Compute the (start, end) UTC instants of one day's slots. Pure.
fn stage_day_slots(
    day: NaiveDate,
    times: &[NaiveTime],
    duration_minutes: i32,
    policy: &SlotTimePolicy,
) -> Result<Vec<(DateTime<Utc>, DateTime<Utc>)>, CoreError> {
    let duration = Duration::minutes(duration_minutes as i64);
    times
        .iter()
        .map(|t| {
            let start = schedule_time::slot_instant(day, *t, policy)?;
            Ok((start, start + duration))
        })
        .collect()
}

/// Shape checks on an activation request, before any DB access.
fn validate_activation_request(slot_ids: &[Uuid]) -> Result<(), CoreError> {
    if slot_ids.is_empty() {
        return Err(CoreError::Validation("No slot ids to activate".into()));
    }
    if slot_ids.len() > MAX_ACTIVE_SLOTS_PER_DAY {
        return Err(CoreError::PolicyViolation(format!(
            "At most {MAX_ACTIVE_SLOTS_PER_DAY} slots may be active per day, got {}",
            slot_ids.len()
        )));
    }
    Ok(())
}

/// Reject activation requests that reference slots outside the day's
/// unbooked set, before anything is mutated.
fn check_activation_ids(requested: &[Uuid], unbooked: &[Uuid]) -> Result<(), CoreError> {
    for id in requested {
        if !unbooked.contains(id) {
            return Err(CoreError::Validation(format!(
                "Slot {id} is not an unbooked slot of that day"
            )));
        }
    }
    Ok(())
}

async fn insert_staged(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    therapist_id: Uuid,
    staged: &[(DateTime<Utc>, DateTime<Utc>)],
    active: bool,
) -> Result<Vec<TimeSlot>, CoreError> {
    if staged.is_empty() {
        return Ok(Vec::new());
    }
    let mut qb: QueryBuilder<Postgres> =
        QueryBuilder::new("INSERT INTO time_slots (therapist_id, start_time, end_time, is_booked, is_active) ");
    qb.push_values(staged, |mut b, (start, end)| {
        b.push_bind(therapist_id)
            .push_bind(*start)
            .push_bind(*end)
            .push_bind(false)
            .push_bind(active);
    });
    // A booked slot may still occupy a start time; leave it untouched.
    qb.push(" ON CONFLICT (therapist_id, start_time) DO NOTHING RETURNING *");

    let inserted = qb.build_query_as::<TimeSlot>().fetch_all(&mut **tx).await?;
    Ok(inserted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::Asia::Kolkata;

    fn times(raw: &[&str]) -> Vec<NaiveTime> {
        raw.iter().map(|s| parse_slot_time(s).unwrap()).collect()
    }

    #[test]
    fn stages_two_utc_slots_back_to_back() {
        let day = NaiveDate::from_ymd_opt(2025, 6, 2).unwrap();
        let staged = stage_day_slots(
            day,
            &times(&["09:00", "10:00"]),
            60,
            &SlotTimePolicy::LiteralUtc,
        )
        .unwrap();

        assert_eq!(staged.len(), 2);
        assert_eq!(staged[0].0.to_rfc3339(), "2025-06-02T09:00:00+00:00");
        assert_eq!(staged[0].1.to_rfc3339(), "2025-06-02T10:00:00+00:00");
        assert_eq!(staged[1].0.to_rfc3339(), "2025-06-02T10:00:00+00:00");
        assert_eq!(staged[1].1.to_rfc3339(), "2025-06-02T11:00:00+00:00");
    }

    #[test]
    fn stages_local_times_in_therapist_zone() {
        let day = NaiveDate::from_ymd_opt(2025, 6, 2).unwrap();
        let staged = stage_day_slots(
            day,
            &times(&["09:00"]),
            45,
            &SlotTimePolicy::TherapistLocal(Kolkata),
        )
        .unwrap();

        assert_eq!(staged[0].0.to_rfc3339(), "2025-06-02T03:30:00+00:00");
        assert_eq!(staged[0].1.to_rfc3339(), "2025-06-02T04:15:00+00:00");
    }

    #[test]
    fn duplicate_slot_times_are_rejected() {
        let raw = vec!["09:00".to_string(), "9:00".to_string()];
        assert!(matches!(
            parse_slot_times(&raw),
            Err(CoreError::Validation(_))
        ));
    }

    #[test]
    fn empty_slot_time_list_is_rejected() {
        assert!(matches!(parse_slot_times(&[]), Err(CoreError::Validation(_))));
    }

    #[test]
    fn activation_rejects_ids_outside_the_day() {
        let known = vec![Uuid::new_v4(), Uuid::new_v4()];
        let stranger = Uuid::new_v4();

        assert!(check_activation_ids(&known, &known).is_ok());
        assert!(matches!(
            check_activation_ids(&[known[0], stranger], &known),
            Err(CoreError::Validation(_))
        ));
    }

    #[test]
    fn activation_count_is_capped() {
        let ids = |n: usize| (0..n).map(|_| Uuid::new_v4()).collect::<Vec<_>>();

        assert!(validate_activation_request(&ids(1)).is_ok());
        assert!(validate_activation_request(&ids(MAX_ACTIVE_SLOTS_PER_DAY)).is_ok());
        assert!(matches!(
            validate_activation_request(&ids(MAX_ACTIVE_SLOTS_PER_DAY + 1)),
            Err(CoreError::PolicyViolation(_))
        ));
        assert!(matches!(
            validate_activation_request(&[]),
            Err(CoreError::Validation(_))
        ));
    }

    #[test]
    fn duration_bounds() {
        assert!(validate_duration(60).is_ok());
        assert!(matches!(validate_duration(0), Err(CoreError::Validation(_))));
        assert!(matches!(validate_duration(-30), Err(CoreError::Validation(_))));
        assert!(matches!(
            validate_duration(24 * 60 + 1),
            Err(CoreError::Validation(_))
        ));
    }
}
