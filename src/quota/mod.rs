use crate::session::UserSession;
use chrono::Utc;

/// One of the three independently-limited monthly resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaResource {
    Messages,
    Photos,
    ImageGenerations,
}

impl QuotaResource {
    pub fn label(self) -> &'static str {
        match self {
            QuotaResource::Messages => "messages",
            QuotaResource::Photos => "photos",
            QuotaResource::ImageGenerations => "image generations",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaDecision {
    Allowed,
    Denied { used: u32, limit: u32 },
}

impl QuotaDecision {
    pub fn is_allowed(self) -> bool {
        matches!(self, QuotaDecision::Allowed)
    }
}

/// Wall-clock "YYYY-MM" for the current usage window.
#[must_use]
pub fn current_month() -> String {
    Utc::now().format("%Y-%m").to_string()
}

/// Roll the monthly window if the stored month is stale. Resets all three
/// counters at most once per calendar month; photo and image-generation
/// counters share the window, so this runs before any limit check on every
/// event, not just chat. Returns true when a rollover happened.
pub fn ensure_current_period(session: &mut UserSession, month: &str) -> bool {
    if session.last_active_month == month {
        return false;
    }

    session.messages_used = 0;
    session.photos_used = 0;
    session.images_generated = 0;
    session.last_active_month = month.to_string();
    tracing::info!(user_id = session.user_id, month, "monthly quota rollover");
    true
}

fn used_and_limit(session: &UserSession, resource: QuotaResource) -> (u32, u32) {
    let plan = session.tier.plan();
    match resource {
        QuotaResource::Messages => (session.messages_used, plan.message_limit),
        QuotaResource::Photos => (session.photos_used, plan.photo_limit),
        QuotaResource::ImageGenerations => (session.images_generated, plan.image_limit),
    }
}

/// Compare one counter against the tier's limit table. Never mutates.
#[must_use]
pub fn check_limit(session: &UserSession, resource: QuotaResource) -> QuotaDecision {
    let (used, limit) = used_and_limit(session, resource);
    if used >= limit {
        QuotaDecision::Denied { used, limit }
    } else {
        QuotaDecision::Allowed
    }
}

/// Increment exactly one counter. Callers invoke this only after the
/// corresponding operation has succeeded, so a collaborator failure never
/// consumes quota.
pub fn charge(session: &mut UserSession, resource: QuotaResource) {
    match resource {
        QuotaResource::Messages => session.messages_used += 1,
        QuotaResource::Photos => session.photos_used += 1,
        QuotaResource::ImageGenerations => session.images_generated += 1,
    }
}
