use super::super::{Database, DatabaseError, User};
use chrono::{DateTime, Duration, Utc};

impl Database {
    /// Create the user record if absent. Idempotent.
    pub async fn ensure_user(&self, tg_id: i64) -> Result<(), DatabaseError> {
        sqlx::query("INSERT OR IGNORE INTO users(tg_id, created_at) VALUES(?, ?)")
            .bind(tg_id)
            .bind(Utc::now())
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn set_phone(&self, tg_id: i64, phone: &str) -> Result<(), DatabaseError> {
        self.ensure_user(tg_id).await?;
        sqlx::query("UPDATE users SET phone = ? WHERE tg_id = ?")
            .bind(phone)
            .bind(tg_id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn user(&self, tg_id: i64) -> Result<Option<User>, DatabaseError> {
        let user = sqlx::query_as::<_, User>(
            "SELECT tg_id, created_at, phone, access_until FROM users WHERE tg_id = ?",
        )
        .bind(tg_id)
        .fetch_optional(self.pool())
        .await?;
        Ok(user)
    }

    pub async fn phone(&self, tg_id: i64) -> Result<Option<String>, DatabaseError> {
        let phone: Option<Option<String>> =
            sqlx::query_scalar("SELECT phone FROM users WHERE tg_id = ?")
                .bind(tg_id)
                .fetch_optional(self.pool())
                .await?;
        Ok(phone.flatten())
    }

    pub async fn access_until(&self, tg_id: i64) -> Result<Option<DateTime<Utc>>, DatabaseError> {
        let until: Option<Option<DateTime<Utc>>> =
            sqlx::query_scalar("SELECT access_until FROM users WHERE tg_id = ?")
                .bind(tg_id)
                .fetch_optional(self.pool())
                .await?;
        Ok(until.flatten())
    }

    /// True iff the stored expiry exists and is strictly in the future.
    pub async fn has_access(&self, tg_id: i64) -> Result<bool, DatabaseError> {
        let until = self.access_until(tg_id).await?;
        Ok(until.is_some_and(|until| until > Utc::now()))
    }

    /// Extend the access window by `days`. An unexpired window is extended
    /// from its current end, so repeated grants stack instead of resetting.
    pub async fn grant_access_days(
        &self,
        tg_id: i64,
        days: i64,
    ) -> Result<DateTime<Utc>, DatabaseError> {
        self.ensure_user(tg_id).await?;
        let now = Utc::now();
        let base = match self.access_until(tg_id).await? {
            Some(until) if until > now => until,
            _ => now,
        };
        let new_until = base + Duration::days(days);
        sqlx::query("UPDATE users SET access_until = ? WHERE tg_id = ?")
            .bind(new_until)
            .bind(tg_id)
            .execute(self.pool())
            .await?;
        Ok(new_until)
    }
}
