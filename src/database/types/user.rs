use chrono::{DateTime, Utc};
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub tg_id: i64,
    pub created_at: DateTime<Utc>,
    pub phone: Option<String>,
    pub access_until: Option<DateTime<Utc>>,
}
