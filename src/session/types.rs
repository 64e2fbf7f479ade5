use crate::tiers::Tier;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Conversation turns kept per user. Oldest evicted first.
pub const HISTORY_LIMIT: usize = 15;

/// Chat turns an attached photo stays eligible for vision inclusion.
pub const PHOTO_MEMORY_TURNS: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Denied,
    Blocked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    System,
    User,
    Assistant,
}

/// One role-tagged conversation turn, stored as JSON in the session row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: TurnRole,
    pub content: String,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Assistant,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::System,
            content: content.into(),
        }
    }
}

/// Explicit conversation mode. A tagged variant instead of loose boolean
/// flags, so invalid flag combinations cannot be represented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, Default)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ConversationMode {
    #[default]
    Idle,
    /// The next free-text message is consumed as an image-generation prompt.
    AwaitingImagePrompt,
}

/// Durable per-user record. Created on first-ever event, never deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSession {
    pub user_id: i64,
    pub name: String,
    pub approval: ApprovalStatus,
    pub tier: Tier,
    pub lang: String,
    pub messages_used: u32,
    pub photos_used: u32,
    pub images_generated: u32,
    /// "YYYY-MM" of the last counted activity; drives monthly rollover.
    pub last_active_month: String,
    pub history: Vec<ChatTurn>,
    /// Transport file ids of recently attached photos. Ephemeral.
    pub attached_photos: Vec<String>,
    pub photo_turn_counter: u32,
    pub pending_mode: ConversationMode,
    pub last_generated_text: Option<String>,
    pub phone: Option<String>,
    /// Storage version for compare-and-swap writes. Not user-visible.
    #[serde(default)]
    pub version: i64,
}

impl UserSession {
    #[must_use]
    pub fn new(user_id: i64, name: impl Into<String>, current_month: impl Into<String>) -> Self {
        Self {
            user_id,
            name: name.into(),
            approval: ApprovalStatus::Pending,
            tier: Tier::Basic,
            lang: "en".to_string(),
            messages_used: 0,
            photos_used: 0,
            images_generated: 0,
            last_active_month: current_month.into(),
            history: Vec::new(),
            attached_photos: Vec::new(),
            photo_turn_counter: 0,
            pending_mode: ConversationMode::Idle,
            last_generated_text: None,
            phone: None,
            version: 0,
        }
    }

    pub fn is_approved(&self) -> bool {
        self.approval == ApprovalStatus::Approved
    }

    /// Append a turn, keeping only the most recent `HISTORY_LIMIT` entries.
    pub fn push_turn(&mut self, turn: ChatTurn) {
        self.history.push(turn);
        if self.history.len() > HISTORY_LIMIT {
            let excess = self.history.len() - HISTORY_LIMIT;
            self.history.drain(..excess);
        }
    }

    /// Reset conversational state: history, photo context, pending mode.
    /// Quota counters and tier are untouched.
    pub fn clear_context(&mut self) {
        self.history.clear();
        self.attached_photos.clear();
        self.photo_turn_counter = 0;
        self.pending_mode = ConversationMode::Idle;
    }
}

/// Admin record, granted via the shared password handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminSession {
    pub admin_id: i64,
    pub name: String,
}
