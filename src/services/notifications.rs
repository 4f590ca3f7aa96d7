use sqlx::PgPool;
use uuid::Uuid;

/// In-app notification dispatcher. Only ever invoked after the triggering
/// transaction has committed; a failed insert is logged and never turned
/// into an operation failure.
pub struct NotificationService;

impl NotificationService {
    pub async fn notify(
        pool: &PgPool,
        user_id: Uuid,
        message: &str,
        kind: &str,
    ) -> anyhow::Result<()> {
        sqlx::query("INSERT INTO notifications (user_id, message, kind) VALUES ($1, $2, $3)")
            .bind(user_id)
            .bind(message)
            .bind(kind)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Best-effort variant for post-commit fan-out: logs and swallows.
    pub async fn notify_quietly(pool: &PgPool, user_id: Uuid, message: &str, kind: &str) {
        if let Err(e) = Self::notify(pool, user_id, message, kind).await {
            tracing::warn!("Failed to record {kind} notification for user {user_id}: {e}");
        }
    }

    pub async fn list_for_user(
        pool: &PgPool,
        user_id: Uuid,
    ) -> anyhow::Result<Vec<crate::models::notification::Notification>> {
        let rows = sqlx::query_as(
            "SELECT * FROM notifications WHERE user_id = $1 ORDER BY created_at DESC LIMIT 100",
        )
        .bind(user_id)
        .fetch_all(pool)
        .await?;
        Ok(rows)
    }
}
