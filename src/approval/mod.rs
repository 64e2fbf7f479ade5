use crate::quota;
use crate::session::{
    AdminSession, AdminStore, ApprovalStatus, SessionManager, UserSession,
};
use anyhow::Result;
use std::str::FromStr;
use std::sync::Arc;
use strum::{Display, EnumString};

/// Admin verdict on a pending access request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum AdminAction {
    Allow,
    Deny,
    Block,
}

/// Result of a contact-share approval request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContactOutcome {
    /// The shared contact's claimed identity did not match the sender.
    /// Nothing is stored, nothing is forwarded.
    Spoofed,
    /// Phone stored; these admins should be notified.
    Forwarded { admin_ids: Vec<i64> },
}

/// Result of applying an admin decision to a target user.
#[derive(Debug, Clone)]
pub struct DecisionOutcome {
    pub session: UserSession,
    /// False when the decision was a re-delivery and nothing changed.
    pub changed: bool,
}

/// Authorization state machine and the handshake with the admin channel.
pub struct ApprovalGate {
    sessions: Arc<SessionManager>,
    admins: Arc<dyn AdminStore>,
}

impl ApprovalGate {
    pub fn new(sessions: Arc<SessionManager>, admins: Arc<dyn AdminStore>) -> Self {
        Self { sessions, admins }
    }

    /// Idempotent first-sight record creation (Basic tier, Pending
    /// approval). Must be called with the user's guard held.
    pub async fn check_or_create(&self, user_id: i64, name: &str) -> Result<UserSession> {
        self.sessions
            .load_or_create(user_id, name, &quota::current_month())
            .await
    }

    /// Handle a shared contact. Rejects spoofed requests — a contact whose
    /// claimed identity differs from the requesting user — with no state
    /// change. Must be called with the user's guard held.
    pub async fn request_approval(
        &self,
        session: &mut UserSession,
        contact_user_id: i64,
        phone: &str,
    ) -> Result<ContactOutcome> {
        if contact_user_id != session.user_id {
            tracing::warn!(
                user_id = session.user_id,
                contact_user_id,
                "rejected spoofed approval request"
            );
            return Ok(ContactOutcome::Spoofed);
        }

        session.phone = Some(phone.to_string());
        self.sessions.commit(session).await?;

        let admin_ids = self
            .admins
            .list()
            .await?
            .into_iter()
            .map(|admin| admin.admin_id)
            .collect();
        Ok(ContactOutcome::Forwarded { admin_ids })
    }

    /// Apply an admin decision to the target user. Idempotent: re-applying
    /// the same action leaves the record untouched and reports
    /// `changed: false`. Returns `None` for an unknown target.
    pub async fn apply_admin_decision(
        &self,
        action: AdminAction,
        target_id: i64,
    ) -> Result<Option<DecisionOutcome>> {
        let _guard = self.sessions.lock(target_id).await;

        let Some(mut session) = self.sessions.store().get(target_id).await? else {
            return Ok(None);
        };

        let (approval, clear_phone) = match action {
            AdminAction::Allow => (ApprovalStatus::Approved, false),
            AdminAction::Deny => (ApprovalStatus::Denied, false),
            AdminAction::Block => (ApprovalStatus::Denied, true),
        };

        let changed =
            session.approval != approval || (clear_phone && session.phone.is_some());
        if changed {
            session.approval = approval;
            if clear_phone {
                session.phone = None;
            }
            self.sessions.commit(&mut session).await?;
            tracing::info!(target_id, action = %action, "applied admin decision");
        }

        Ok(Some(DecisionOutcome { session, changed }))
    }

    /// Shared-password admin login. Persists the admin record once; wrong
    /// passwords change nothing.
    pub async fn admin_login(
        &self,
        admin_id: i64,
        name: &str,
        attempt: &str,
        configured_password: &str,
    ) -> Result<bool> {
        if configured_password.is_empty() || attempt != configured_password {
            tracing::warn!(admin_id, "rejected admin login attempt");
            return Ok(false);
        }

        self.admins
            .upsert(&AdminSession {
                admin_id,
                name: name.to_string(),
            })
            .await?;
        tracing::info!(admin_id, "admin logged in");
        Ok(true)
    }
}

/// Parse an admin decision callback (`allow_42`, `deny_42`, `block_42`).
#[must_use]
pub fn parse_decision_callback(data: &str) -> Option<(AdminAction, i64)> {
    let (action_raw, target_raw) = data.split_once('_')?;
    let action = AdminAction::from_str(action_raw).ok()?;
    let target_id = target_raw.parse::<i64>().ok()?;
    Some((action, target_id))
}
