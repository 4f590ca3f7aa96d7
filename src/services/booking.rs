use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    error::CoreError,
    models::{
        booking::{Booking, BookingReceipt, BookingStatus, DataAccessPermission, Payment},
        slot::TimeSlot,
        therapist::{Child, Parent, Therapist},
    },
    services::notifications::NotificationService,
};

pub struct BookingService;

impl BookingService {
    /// Atomically convert one available slot into a confirmed booking with
    /// its payment and data-access permission.
    ///
    /// The predicate-qualified UPDATE in step one is the concurrency guard:
    /// of two callers racing on the same slot, exactly one matches the row
    /// and the other observes zero rows and fails. Everything up to the
    /// commit shares one transaction, so there is no window in which both
    /// can see the slot unbooked.
    pub async fn book(
        pool: &PgPool,
        parent_id: Uuid,
        child_id: Uuid,
        time_slot_id: Uuid,
    ) -> Result<BookingReceipt, CoreError> {
        let mut tx = pool.begin().await?;

        let slot = sqlx::query_as::<_, TimeSlot>(
            "UPDATE time_slots SET is_booked = TRUE
             WHERE id = $1 AND is_booked = FALSE AND is_active = TRUE
             RETURNING *",
        )
        .bind(time_slot_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| {
            CoreError::StateConflict(format!("Slot {time_slot_id} is not available"))
        })?;

        let therapist = sqlx::query_as::<_, Therapist>("SELECT * FROM therapists WHERE id = $1")
            .bind(slot.therapist_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| {
                CoreError::NotFound(format!("Therapist {} not found", slot.therapist_id))
            })?;
        if !therapist.is_active() {
            return Err(CoreError::StateConflict(format!(
                "Therapist {} is not accepting bookings",
                therapist.id
            )));
        }

        let _child = sqlx::query_as::<_, Child>(
            "SELECT * FROM children WHERE id = $1 AND parent_id = $2",
        )
        .bind(child_id)
        .bind(parent_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| {
            CoreError::NotFound(format!("Child {child_id} not found for parent {parent_id}"))
        })?;

        let parent = sqlx::query_as::<_, Parent>("SELECT * FROM parents WHERE id = $1")
            .bind(parent_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("Parent {parent_id} not found")))?;

        let booking = sqlx::query_as::<_, Booking>(
            "INSERT INTO bookings (parent_id, child_id, therapist_id, time_slot_id, status)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING *",
        )
        .bind(parent_id)
        .bind(child_id)
        .bind(therapist.id)
        .bind(slot.id)
        .bind(BookingStatus::Scheduled.to_string())
        .fetch_one(&mut *tx)
        .await?;

        let amount = session_fee(parent.custom_fee, therapist.base_cost_per_session);
        let payment = sqlx::query_as::<_, Payment>(
            "INSERT INTO payments (booking_id, amount) VALUES ($1, $2) RETURNING *",
        )
        .bind(booking.id)
        .bind(amount)
        .fetch_one(&mut *tx)
        .await?;

        let permission = sqlx::query_as::<_, DataAccessPermission>(
            "INSERT INTO data_access_permissions
                 (booking_id, therapist_id, child_id, can_view_details, access_starts_at, access_ends_at)
             VALUES ($1, $2, $3, FALSE, $4, $5)
             RETURNING *",
        )
        .bind(booking.id)
        .bind(therapist.id)
        .bind(child_id)
        .bind(slot.start_time)
        .bind(slot.end_time)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(
            "Booked slot {} for parent {} with therapist {}",
            slot.id,
            parent_id,
            therapist.id
        );

        // Post-commit confirmations. Dispatch failures are logged inside
        // notify_quietly and never unwind the booking.
        let when = slot.start_time.to_rfc3339();
        NotificationService::notify_quietly(
            pool,
            therapist.id,
            &format!("New session booked for {when}"),
            "booking_confirmed",
        )
        .await;
        NotificationService::notify_quietly(
            pool,
            parent_id,
            &format!(
                "Your session with {} on {when} is confirmed",
                therapist.display_name()
            ),
            "booking_confirmed",
        )
        .await;

        Ok(BookingReceipt {
            booking,
            payment,
            permission,
            slot_start: slot.start_time,
            slot_end: slot.end_time,
        })
    }

    /// SCHEDULED → COMPLETED. Any other starting state is an invalid
    /// transition; COMPLETED and CANCELLED_BY_THERAPIST are terminal.
    pub async fn mark_completed(pool: &PgPool, booking_id: Uuid) -> Result<Booking, CoreError> {
        let updated = sqlx::query_as::<_, Booking>(
            "UPDATE bookings SET status = $1, completed_at = NOW()
             WHERE id = $2 AND status = $3
             RETURNING *",
        )
        .bind(BookingStatus::Completed.to_string())
        .bind(booking_id)
        .bind(BookingStatus::Scheduled.to_string())
        .fetch_optional(pool)
        .await?;

        let booking = match updated {
            Some(b) => b,
            None => {
                let existing = Self::get_booking(pool, booking_id).await?;
                let status: BookingStatus = existing
                    .status
                    .parse()
                    .map_err(|e| CoreError::Transaction(format!("{e}")))?;
                return Err(CoreError::StateConflict(format!(
                    "Booking {booking_id} cannot be completed from status {status}"
                )));
            }
        };

        NotificationService::notify_quietly(
            pool,
            booking.parent_id,
            "Your session is complete. Please share your feedback.",
            "feedback_request",
        )
        .await;
        NotificationService::notify_quietly(
            pool,
            booking.therapist_id,
            "Session complete. Please file the session report.",
            "report_request",
        )
        .await;

        Ok(booking)
    }

    pub async fn get_booking(pool: &PgPool, booking_id: Uuid) -> Result<Booking, CoreError> {
        sqlx::query_as::<_, Booking>("SELECT * FROM bookings WHERE id = $1")
            .bind(booking_id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("Booking {booking_id} not found")))
    }
}

/// A parent's negotiated fee wins over the therapist's base fee.
fn session_fee(custom_fee: Option<f64>, base_cost: f64) -> f64 {
    custom_fee.unwrap_or(base_cost)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn custom_fee_overrides_base_cost() {
        assert_eq!(session_fee(Some(80.0), 120.0), 80.0);
        assert_eq!(session_fee(None, 120.0), 120.0);
        // A zero custom fee is still a negotiated fee, not "unset".
        assert_eq!(session_fee(Some(0.0), 120.0), 0.0);
    }
}
