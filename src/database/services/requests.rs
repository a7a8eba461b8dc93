use super::super::{AccessRequest, Database, DatabaseError, Decision, RequestTicket};
use chrono::Utc;

impl Database {
    /// Register a pending access request for the user. If one is already
    /// pending its id is returned instead of inserting a duplicate.
    pub async fn create_access_request(
        &self,
        tg_id: i64,
        phone: &str,
    ) -> Result<RequestTicket, DatabaseError> {
        self.ensure_user(tg_id).await?;

        let existing: Option<i64> = sqlx::query_scalar(
            "SELECT id FROM access_requests
             WHERE tg_id = ? AND status = 'pending'
             ORDER BY id DESC LIMIT 1",
        )
        .bind(tg_id)
        .fetch_optional(self.pool())
        .await?;

        if let Some(id) = existing {
            return Ok(RequestTicket { id, reused: true });
        }

        let result = sqlx::query(
            "INSERT INTO access_requests(tg_id, created_at, phone, status)
             VALUES(?, ?, ?, 'pending')",
        )
        .bind(tg_id)
        .bind(Utc::now())
        .bind(phone)
        .execute(self.pool())
        .await?;

        Ok(RequestTicket {
            id: result.last_insert_rowid(),
            reused: false,
        })
    }

    pub async fn request(&self, request_id: i64) -> Result<Option<AccessRequest>, DatabaseError> {
        let request = sqlx::query_as::<_, AccessRequest>(
            "SELECT id, tg_id, created_at, phone, status, admin_id, decided_at
             FROM access_requests WHERE id = ?",
        )
        .bind(request_id)
        .fetch_optional(self.pool())
        .await?;
        Ok(request)
    }

    /// Pending requests, most recent first.
    pub async fn list_pending(&self, limit: i64) -> Result<Vec<AccessRequest>, DatabaseError> {
        let requests = sqlx::query_as::<_, AccessRequest>(
            "SELECT id, tg_id, created_at, phone, status, admin_id, decided_at
             FROM access_requests
             WHERE status = 'pending'
             ORDER BY id DESC
             LIMIT ?",
        )
        .bind(limit)
        .fetch_all(self.pool())
        .await?;
        Ok(requests)
    }

    /// Apply an administrator decision. The status guard in the WHERE clause
    /// makes a decided request immune to further decisions; the return value
    /// reports whether a row actually changed.
    pub async fn decide(
        &self,
        request_id: i64,
        admin_id: i64,
        outcome: Decision,
    ) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            "UPDATE access_requests
             SET status = ?, admin_id = ?, decided_at = ?
             WHERE id = ? AND status = 'pending'",
        )
        .bind(outcome.status())
        .bind(admin_id)
        .bind(Utc::now())
        .bind(request_id)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
