use crate::configuration::Config;
use crate::database::{Database, DatabaseError, Decision, RequestStatus, RequestTicket};
use crate::feed::{self, FeedClient};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, warn};

pub mod phone;
mod reply;

pub use reply::{Keyboard, Reply};

const PENDING_LIMIT: i64 = 20;

#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error("Invalid phone format: {0}")]
    InvalidPhoneFormat(String),

    #[error("Access request {0} not found")]
    RequestNotFound(i64),

    #[error("Access request {0} already decided")]
    RequestAlreadyDecided(i64),

    #[error("User {0} is not an administrator")]
    Unauthorized(i64),

    #[error("Ledger error: {0}")]
    Ledger(#[from] DatabaseError),
}

/// Button payloads the controller understands. Anything else is dropped by
/// the transport layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackAction {
    Status,
    Loads,
    ChangePhone,
    AdminPending,
    Approve(i64),
    Reject(i64),
}

impl CallbackAction {
    pub fn parse(data: &str) -> Option<Self> {
        match data {
            "status" => Some(Self::Status),
            "loads" => Some(Self::Loads),
            "change_phone" => Some(Self::ChangePhone),
            "admin:pending" => Some(Self::AdminPending),
            _ => {
                if let Some(id) = data.strip_prefix("approve:") {
                    id.parse().ok().map(Self::Approve)
                } else if let Some(id) = data.strip_prefix("reject:") {
                    id.parse().ok().map(Self::Reject)
                } else {
                    None
                }
            }
        }
    }
}

/// Drives the access-request lifecycle: reacts to chat events, mutates the
/// ledger, and emits transport-neutral replies.
///
/// The only state held outside the ledger is the set of users currently
/// being asked for a phone number. It lives in process memory and is lost
/// on restart.
pub struct Workflow {
    db: Database,
    feed: FeedClient,
    admins: HashSet<i64>,
    access_days: i64,
    week_price_uzs: u32,
    notify_on_start: bool,
    notify_on_loads: bool,
    awaiting_phone: Mutex<HashSet<i64>>,
}

impl Workflow {
    pub fn new(config: &Config, database: Database) -> Self {
        Self {
            db: database,
            feed: FeedClient::new(&config.feed),
            admins: config.telegram.admins.iter().copied().collect(),
            access_days: config.telegram.access_days,
            week_price_uzs: config.telegram.week_price_uzs,
            notify_on_start: config.telegram.notify_on_start,
            notify_on_loads: config.telegram.notify_on_loads,
            awaiting_phone: Mutex::new(HashSet::new()),
        }
    }

    pub fn is_admin(&self, user_id: i64) -> bool {
        self.admins.contains(&user_id)
    }

    pub fn admins(&self) -> &HashSet<i64> {
        &self.admins
    }

    pub async fn is_awaiting_phone(&self, user_id: i64) -> bool {
        self.awaiting_phone.lock().await.contains(&user_id)
    }

    pub async fn on_start(&self, user_id: i64) -> Result<Vec<Reply>, WorkflowError> {
        self.db.ensure_user(user_id).await?;
        let mut replies = Vec::new();

        if self.notify_on_start {
            replies.push(Reply::AdminBroadcast {
                text: format!("👤 /start from {user_id}"),
                request_id: None,
            });
        }

        if self.is_admin(user_id) {
            replies.push(Reply::message(
                "Admin menu: press the button or use /pending",
                Keyboard::AdminPanel,
            ));
        }

        if self.db.has_access(user_id).await? {
            if let Some(until) = self.db.access_until(user_id).await? {
                replies.push(Reply::message(
                    format!(
                        "✅ Access active until {}.\nTap \"🚚 Current loads\".",
                        format_until(&until)
                    ),
                    Keyboard::UserMenu,
                ));
            }
            return Ok(replies);
        }

        match self.db.phone(user_id).await? {
            None => {
                self.awaiting_phone.lock().await.insert(user_id);
                replies.push(Reply::message(
                    format!(
                        "Access to the loads feed requires a phone number.\nTariff: {} UZS for {} days.",
                        self.week_price_uzs, self.access_days
                    ),
                    Keyboard::UserMenu,
                ));
                replies.push(phone_prompt());
            }
            Some(phone) => {
                let ticket = self.db.create_access_request(user_id, &phone).await?;
                replies.push(Reply::message(
                    format!(
                        "Phone {phone} is on file.\nAn invoice will be issued to this number; access opens once payment is confirmed.\nRequest ID: {}",
                        ticket.id
                    ),
                    Keyboard::UserMenu,
                ));
                self.push_new_request_broadcast(&mut replies, user_id, &phone, ticket);
            }
        }
        Ok(replies)
    }

    /// Contact-button submissions are accepted regardless of the awaiting
    /// state; the contact payload may arrive without a leading `+`.
    pub async fn on_contact(&self, user_id: i64, raw: &str) -> Result<Vec<Reply>, WorkflowError> {
        let Some(phone) = phone::normalize(raw) else {
            return Err(WorkflowError::InvalidPhoneFormat(raw.to_string()));
        };
        self.submit_phone(user_id, phone).await
    }

    /// Free text only matters while the user is being asked for a number.
    pub async fn on_text(&self, user_id: i64, text: &str) -> Result<Vec<Reply>, WorkflowError> {
        if text.starts_with('/') {
            return Ok(Vec::new());
        }
        if !self.awaiting_phone.lock().await.contains(&user_id) {
            return Ok(Vec::new());
        }
        let Some(phone) = phone::normalize(text) else {
            return Err(WorkflowError::InvalidPhoneFormat(text.to_string()));
        };
        self.submit_phone(user_id, phone).await
    }

    pub async fn on_status(&self, user_id: i64) -> Result<Vec<Reply>, WorkflowError> {
        let mut replies = vec![Reply::Ack { text: None }];

        if self.db.has_access(user_id).await? {
            if let Some(until) = self.db.access_until(user_id).await? {
                replies.push(Reply::message(
                    format!("✅ Access active until {}", format_until(&until)),
                    Keyboard::UserMenu,
                ));
            }
            return Ok(replies);
        }

        match self.db.phone(user_id).await? {
            None => {
                self.awaiting_phone.lock().await.insert(user_id);
                replies.push(Reply::message(
                    "⛔️ No access. Send your phone number first.",
                    Keyboard::UserMenu,
                ));
                replies.push(phone_prompt());
            }
            Some(phone) => {
                replies.push(Reply::message(
                    format!(
                        "⛔️ No access yet.\nYour number {phone} is on file; access opens once payment is confirmed."
                    ),
                    Keyboard::UserMenu,
                ));
            }
        }
        Ok(replies)
    }

    pub async fn on_loads(&self, user_id: i64) -> Result<Vec<Reply>, WorkflowError> {
        let mut replies = vec![Reply::Ack { text: None }];

        if !self.db.has_access(user_id).await? {
            match self.db.phone(user_id).await? {
                None => {
                    self.awaiting_phone.lock().await.insert(user_id);
                    replies.push(Reply::message(
                        "⛔️ Access closed. Send your phone number to get started.",
                        Keyboard::UserMenu,
                    ));
                    replies.push(phone_prompt());
                }
                Some(phone) => {
                    replies.push(Reply::message(
                        format!(
                            "⛔️ Access closed. An invoice will be issued to {phone}; access opens after payment."
                        ),
                        Keyboard::UserMenu,
                    ));
                }
            }
            return Ok(replies);
        }

        // One fetch, no retry. A failure is reported to the user once.
        match self.feed.fetch(user_id).await {
            Ok(payload) => {
                replies.push(Reply::message(feed::render(&payload), Keyboard::UserMenu));
            }
            Err(error) => {
                warn!(user_id, error = %error, "Feed fetch failed");
                replies.push(Reply::message(
                    format!("⚠️ Feed unavailable.\nDetails: {error}"),
                    Keyboard::UserMenu,
                ));
            }
        }

        if self.notify_on_loads {
            replies.push(Reply::AdminBroadcast {
                text: format!("🚚 Loads opened by {user_id}"),
                request_id: None,
            });
        }
        Ok(replies)
    }

    pub async fn on_change_phone(&self, user_id: i64) -> Result<Vec<Reply>, WorkflowError> {
        self.awaiting_phone.lock().await.insert(user_id);
        Ok(vec![Reply::Ack { text: None }, phone_prompt()])
    }

    pub async fn on_pending(&self, admin_id: i64) -> Result<Vec<Reply>, WorkflowError> {
        if !self.is_admin(admin_id) {
            return Err(WorkflowError::Unauthorized(admin_id));
        }

        let pending = self.db.list_pending(PENDING_LIMIT).await?;
        let mut replies = vec![Reply::Ack { text: None }];
        if pending.is_empty() {
            replies.push(Reply::message("No pending requests.", Keyboard::None));
            return Ok(replies);
        }
        for request in pending {
            replies.push(Reply::message(
                format!(
                    "🕒 PENDING\nRequest ID: {}\nUser: {}\nPhone: {}",
                    request.id, request.tg_id, request.phone
                ),
                Keyboard::AdminDecision(request.id),
            ));
        }
        Ok(replies)
    }

    pub async fn on_decision(
        &self,
        admin_id: i64,
        request_id: i64,
        outcome: Decision,
    ) -> Result<Vec<Reply>, WorkflowError> {
        if !self.is_admin(admin_id) {
            warn!(admin_id, request_id, "Decision attempt by non-admin");
            return Err(WorkflowError::Unauthorized(admin_id));
        }

        let Some(request) = self.db.request(request_id).await? else {
            return Err(WorkflowError::RequestNotFound(request_id));
        };
        // The ledger re-checks the status inside the UPDATE, which closes the
        // double-click race between two admins.
        if request.status != RequestStatus::Pending
            || !self.db.decide(request_id, admin_id, outcome).await?
        {
            return Err(WorkflowError::RequestAlreadyDecided(request_id));
        }

        match outcome {
            Decision::Approved => {
                let until = self.db.grant_access_days(request.tg_id, self.access_days).await?;
                info!(request_id, admin_id, user_id = request.tg_id, "Access request approved");
                Ok(vec![
                    Reply::EditDecision {
                        note: format!("✅ APPROVED until {}", format_until(&until)),
                    },
                    Reply::Ack {
                        text: Some("Confirmed".to_string()),
                    },
                    Reply::Direct {
                        user_id: request.tg_id,
                        text: format!(
                            "✅ Payment confirmed. Access open until {}.\nTap \"🚚 Current loads\".",
                            format_until(&until)
                        ),
                        keyboard: Keyboard::UserMenu,
                    },
                    Reply::AdminBroadcast {
                        text: format!(
                            "✅ APPROVED {} until {} (request {request_id})",
                            request.tg_id,
                            format_until(&until)
                        ),
                        request_id: None,
                    },
                ])
            }
            Decision::Rejected => {
                info!(request_id, admin_id, user_id = request.tg_id, "Access request rejected");
                Ok(vec![
                    Reply::EditDecision {
                        note: "❌ REJECTED".to_string(),
                    },
                    Reply::Ack {
                        text: Some("Rejected".to_string()),
                    },
                    Reply::Direct {
                        user_id: request.tg_id,
                        text: "❌ Payment was not confirmed. Send your phone number again if needed, or contact an administrator."
                            .to_string(),
                        keyboard: Keyboard::UserMenu,
                    },
                ])
            }
        }
    }

    async fn submit_phone(
        &self,
        user_id: i64,
        phone: String,
    ) -> Result<Vec<Reply>, WorkflowError> {
        self.db.set_phone(user_id, &phone).await?;
        self.awaiting_phone.lock().await.remove(&user_id);

        let ticket = self.db.create_access_request(user_id, &phone).await?;
        let mut replies = vec![Reply::message(
            format!(
                "✅ Phone saved: {phone}\nAn invoice will be issued to this number; access opens once payment is confirmed.\nRequest ID: {}",
                ticket.id
            ),
            Keyboard::UserMenu,
        )];
        self.push_new_request_broadcast(&mut replies, user_id, &phone, ticket);
        Ok(replies)
    }

    /// Admins get the decision keyboard once per request: a reused ticket
    /// means they already hold one, so resubmissions stay silent.
    fn push_new_request_broadcast(
        &self,
        replies: &mut Vec<Reply>,
        user_id: i64,
        phone: &str,
        ticket: RequestTicket,
    ) {
        if ticket.reused {
            return;
        }
        info!(user_id, request_id = ticket.id, "New access request");
        replies.push(Reply::AdminBroadcast {
            text: format!(
                "🧾 New access request\nUser: {user_id}\nPhone: {phone}\nTariff: {} UZS / {} days\nRequest ID: {}\n\nIssue the invoice to this number, then confirm once paid.",
                self.week_price_uzs, self.access_days, ticket.id
            ),
            request_id: Some(ticket.id),
        });
    }
}

fn phone_prompt() -> Reply {
    Reply::message(
        "Send your phone number as +998901234567 or tap the button below.",
        Keyboard::PhoneRequest,
    )
}

fn format_until(until: &DateTime<Utc>) -> String {
    until.format("%Y-%m-%d %H:%M UTC").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configuration::{DatabaseConfig, FeedConfig, TelegramConfig};
    use chrono::Duration;

    const USER: i64 = 10;
    const ADMIN: i64 = 1;

    fn test_config(feed_base: &str) -> Config {
        Config {
            log_level: "info".to_string(),
            telegram: TelegramConfig {
                admins: vec![ADMIN],
                access_days: 7,
                week_price_uzs: 20_000,
                notify_on_start: false,
                notify_on_loads: false,
            },
            feed: FeedConfig {
                base_url: feed_base.to_string(),
                endpoint: "/loads/latest".to_string(),
                timeout_secs: 5,
            },
            database: DatabaseConfig {
                path: ":memory:".to_string(),
            },
        }
    }

    async fn workflow() -> (Workflow, Database) {
        workflow_with_feed("").await
    }

    async fn workflow_with_feed(feed_base: &str) -> (Workflow, Database) {
        let db = Database::open_in_memory().await.unwrap();
        (Workflow::new(&test_config(feed_base), db.clone()), db)
    }

    fn broadcast_request_id(replies: &[Reply]) -> Option<i64> {
        replies.iter().find_map(|reply| match reply {
            Reply::AdminBroadcast { request_id, .. } => *request_id,
            _ => None,
        })
    }

    fn message_texts(replies: &[Reply]) -> Vec<&str> {
        replies
            .iter()
            .filter_map(|reply| match reply {
                Reply::Message { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn start_prompts_a_new_user_for_phone() {
        let (workflow, db) = workflow().await;
        let replies = workflow.on_start(USER).await.unwrap();

        assert!(workflow.is_awaiting_phone(USER).await);
        assert!(replies
            .iter()
            .any(|r| matches!(r, Reply::Message { keyboard: Keyboard::PhoneRequest, .. })));
        assert!(db.phone(USER).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn full_approval_flow_opens_access() {
        let (workflow, db) = workflow().await;

        workflow.on_start(USER).await.unwrap();
        let replies = workflow.on_text(USER, "+998 90-123-45-67").await.unwrap();

        assert!(!workflow.is_awaiting_phone(USER).await);
        assert_eq!(db.phone(USER).await.unwrap().as_deref(), Some("+998901234567"));
        let request_id = broadcast_request_id(&replies).expect("admins must be notified");

        let replies = workflow
            .on_decision(ADMIN, request_id, Decision::Approved)
            .await
            .unwrap();
        assert!(replies
            .iter()
            .any(|r| matches!(r, Reply::Direct { user_id, .. } if *user_id == USER)));

        assert!(db.has_access(USER).await.unwrap());
        let until = db.access_until(USER).await.unwrap().unwrap();
        let drift = (until - (Utc::now() + Duration::days(7))).num_seconds().abs();
        assert!(drift < 5, "expiry must be ~7 days out, drift was {drift}s");
    }

    #[tokio::test]
    async fn approval_stacks_on_an_unexpired_window() {
        let (workflow, db) = workflow().await;
        db.grant_access_days(USER, 7).await.unwrap();

        db.set_phone(USER, "+998901234567").await.unwrap();
        let ticket = db.create_access_request(USER, "+998901234567").await.unwrap();
        workflow
            .on_decision(ADMIN, ticket.id, Decision::Approved)
            .await
            .unwrap();

        let until = db.access_until(USER).await.unwrap().unwrap();
        let drift = (until - (Utc::now() + Duration::days(14))).num_seconds().abs();
        assert!(drift < 5, "second grant must stack, drift was {drift}s");
    }

    #[tokio::test]
    async fn invalid_phone_keeps_the_user_in_collection() {
        let (workflow, db) = workflow().await;
        workflow.on_start(USER).await.unwrap();

        let outcome = workflow.on_text(USER, "12345").await;
        assert!(matches!(outcome, Err(WorkflowError::InvalidPhoneFormat(_))));
        assert!(workflow.is_awaiting_phone(USER).await);
        assert!(db.list_pending(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn free_text_is_ignored_while_idle() {
        let (workflow, db) = workflow().await;
        let replies = workflow.on_text(USER, "+998901234567").await.unwrap();

        assert!(replies.is_empty());
        assert!(db.list_pending(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn contact_submission_is_accepted_while_idle() {
        let (workflow, db) = workflow().await;
        let replies = workflow.on_contact(USER, "998901234567").await.unwrap();

        assert_eq!(db.phone(USER).await.unwrap().as_deref(), Some("+998901234567"));
        assert!(broadcast_request_id(&replies).is_some());
    }

    #[tokio::test]
    async fn resubmission_does_not_renotify_admins() {
        let (workflow, db) = workflow().await;
        workflow.on_start(USER).await.unwrap();
        let first = workflow.on_text(USER, "+998901234567").await.unwrap();
        assert!(broadcast_request_id(&first).is_some());

        workflow.on_change_phone(USER).await.unwrap();
        let second = workflow.on_text(USER, "+998901234567").await.unwrap();

        assert!(broadcast_request_id(&second).is_none());
        assert_eq!(db.list_pending(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn non_admin_cannot_decide() {
        let (workflow, db) = workflow().await;
        let ticket = db.create_access_request(USER, "+998901234567").await.unwrap();

        let outcome = workflow.on_decision(USER, ticket.id, Decision::Approved).await;
        assert!(matches!(outcome, Err(WorkflowError::Unauthorized(_))));
        assert!(!db.has_access(USER).await.unwrap());
    }

    #[tokio::test]
    async fn second_decision_is_rejected() {
        let (workflow, db) = workflow().await;
        let ticket = db.create_access_request(USER, "+998901234567").await.unwrap();

        workflow
            .on_decision(ADMIN, ticket.id, Decision::Approved)
            .await
            .unwrap();
        let until = db.access_until(USER).await.unwrap();

        let outcome = workflow.on_decision(ADMIN, ticket.id, Decision::Rejected).await;
        assert!(matches!(outcome, Err(WorkflowError::RequestAlreadyDecided(_))));
        assert_eq!(db.access_until(USER).await.unwrap(), until);
        assert!(db.has_access(USER).await.unwrap());
    }

    #[tokio::test]
    async fn deciding_an_unknown_request_fails() {
        let (workflow, _db) = workflow().await;
        let outcome = workflow.on_decision(ADMIN, 999, Decision::Approved).await;
        assert!(matches!(outcome, Err(WorkflowError::RequestNotFound(999))));
    }

    #[tokio::test]
    async fn rejection_notifies_without_granting() {
        let (workflow, db) = workflow().await;
        let ticket = db.create_access_request(USER, "+998901234567").await.unwrap();

        let replies = workflow
            .on_decision(ADMIN, ticket.id, Decision::Rejected)
            .await
            .unwrap();
        assert!(replies
            .iter()
            .any(|r| matches!(r, Reply::Direct { user_id, .. } if *user_id == USER)));
        assert!(!db.has_access(USER).await.unwrap());
    }

    #[tokio::test]
    async fn loads_is_gated_without_access() {
        let (workflow, _db) = workflow().await;
        let replies = workflow.on_loads(USER).await.unwrap();

        assert!(workflow.is_awaiting_phone(USER).await);
        assert!(message_texts(&replies)
            .iter()
            .any(|text| text.contains("Access closed")));
    }

    #[tokio::test]
    async fn loads_relays_the_feed_when_access_is_active() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/loads/latest")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body(r#"{"loads":[{"direction":"Tashkent - Fergana"}]}"#)
            .create_async()
            .await;

        let (workflow, db) = workflow_with_feed(&server.url()).await;
        db.grant_access_days(USER, 7).await.unwrap();

        let replies = workflow.on_loads(USER).await.unwrap();
        mock.assert_async().await;
        assert!(message_texts(&replies)
            .iter()
            .any(|text| text.contains("Tashkent - Fergana")));
    }

    #[tokio::test]
    async fn feed_failure_is_reported_once_without_retry() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/loads/latest")
            .match_query(mockito::Matcher::Any)
            .with_status(500)
            .with_body("boom")
            .expect(1)
            .create_async()
            .await;

        let (workflow, db) = workflow_with_feed(&server.url()).await;
        db.grant_access_days(USER, 7).await.unwrap();

        let replies = workflow.on_loads(USER).await.unwrap();
        mock.assert_async().await;
        assert!(message_texts(&replies)
            .iter()
            .any(|text| text.contains("Feed unavailable")));
    }

    #[tokio::test]
    async fn status_reports_the_active_window() {
        let (workflow, db) = workflow().await;
        db.grant_access_days(USER, 7).await.unwrap();

        let replies = workflow.on_status(USER).await.unwrap();
        assert!(message_texts(&replies)
            .iter()
            .any(|text| text.contains("Access active until")));
    }

    #[tokio::test]
    async fn pending_listing_is_admin_only() {
        let (workflow, db) = workflow().await;
        db.create_access_request(USER, "+998901234567").await.unwrap();

        assert!(matches!(
            workflow.on_pending(USER).await,
            Err(WorkflowError::Unauthorized(_))
        ));

        let replies = workflow.on_pending(ADMIN).await.unwrap();
        assert!(replies
            .iter()
            .any(|r| matches!(r, Reply::Message { keyboard: Keyboard::AdminDecision(_), .. })));
    }

    #[test]
    fn callback_payloads_parse() {
        assert_eq!(CallbackAction::parse("status"), Some(CallbackAction::Status));
        assert_eq!(CallbackAction::parse("loads"), Some(CallbackAction::Loads));
        assert_eq!(
            CallbackAction::parse("change_phone"),
            Some(CallbackAction::ChangePhone)
        );
        assert_eq!(
            CallbackAction::parse("admin:pending"),
            Some(CallbackAction::AdminPending)
        );
        assert_eq!(
            CallbackAction::parse("approve:17"),
            Some(CallbackAction::Approve(17))
        );
        assert_eq!(
            CallbackAction::parse("reject:4"),
            Some(CallbackAction::Reject(4))
        );
        assert_eq!(CallbackAction::parse("approve:x"), None);
        assert_eq!(CallbackAction::parse("unknown"), None);
    }
}
