use chrono::{DateTime, Utc};
use sqlx::FromRow;

/// Lifecycle of an access request. Terminal states are immutable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
}

/// Administrator verdict on a pending request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Approved,
    Rejected,
}

impl Decision {
    pub fn status(self) -> RequestStatus {
        match self {
            Self::Approved => RequestStatus::Approved,
            Self::Rejected => RequestStatus::Rejected,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct AccessRequest {
    pub id: i64,
    pub tg_id: i64,
    pub created_at: DateTime<Utc>,
    pub phone: String,
    pub status: RequestStatus,
    pub admin_id: Option<i64>,
    pub decided_at: Option<DateTime<Utc>>,
}

/// Outcome of `create_access_request`: either a fresh pending row or the
/// id of the user's existing pending request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestTicket {
    pub id: i64,
    pub reused: bool,
}
