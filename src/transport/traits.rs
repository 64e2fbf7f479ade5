use crate::payment::Invoice;
use async_trait::async_trait;

/// Sender identity attached to every inbound event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRef {
    pub id: i64,
    pub first_name: String,
}

/// Inbound events the gateway routes. One variant per update kind the
/// transport delivers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    Text {
        from: UserRef,
        text: String,
    },
    Photo {
        from: UserRef,
        file_id: String,
        caption: Option<String>,
    },
    Document {
        from: UserRef,
        file_id: String,
        file_name: String,
    },
    Contact {
        from: UserRef,
        contact_user_id: i64,
        phone: String,
    },
    Callback {
        from: UserRef,
        callback_id: String,
        message_id: i64,
        data: String,
    },
    PreCheckout {
        from: UserRef,
        query_id: String,
        payload: String,
    },
    PaymentSuccess {
        from: UserRef,
        payload: String,
    },
}

impl InboundEvent {
    /// The user this event belongs to — the key for the per-user lock.
    pub fn from(&self) -> &UserRef {
        match self {
            InboundEvent::Text { from, .. }
            | InboundEvent::Photo { from, .. }
            | InboundEvent::Document { from, .. }
            | InboundEvent::Contact { from, .. }
            | InboundEvent::Callback { from, .. }
            | InboundEvent::PreCheckout { from, .. }
            | InboundEvent::PaymentSuccess { from, .. } => from,
        }
    }
}

/// Reply-keyboard / inline-keyboard shapes the gateway sends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Keyboard {
    /// Rows of labelled reply buttons.
    Reply(Vec<Vec<String>>),
    /// A single contact-request button.
    RequestContact(String),
    /// Rows of (label, callback data) inline buttons.
    Inline(Vec<Vec<(String, String)>>),
    /// Remove the current reply keyboard.
    Remove,
}

/// Messaging transport collaborator. One implementation per bot token; the
/// admin channel is this same trait bound to the admin bot.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Human-readable channel name.
    fn name(&self) -> &str;

    /// Start long-polling for updates (long-running).
    async fn listen(&self, tx: tokio::sync::mpsc::Sender<InboundEvent>) -> anyhow::Result<()>;

    async fn send_message(&self, chat_id: i64, text: &str) -> anyhow::Result<()>;

    async fn send_message_with_keyboard(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: &Keyboard,
    ) -> anyhow::Result<()>;

    /// Forward an image by URL (generated images).
    async fn send_photo_url(
        &self,
        chat_id: i64,
        url: &str,
        caption: Option<&str>,
    ) -> anyhow::Result<()>;

    /// Re-send a previously uploaded photo by its file id.
    async fn send_photo_file_id(&self, chat_id: i64, file_id: &str) -> anyhow::Result<()>;

    async fn send_document(
        &self,
        chat_id: i64,
        file_name: &str,
        bytes: Vec<u8>,
        caption: Option<&str>,
    ) -> anyhow::Result<()>;

    async fn send_invoice(&self, chat_id: i64, invoice: &Invoice) -> anyhow::Result<()>;

    async fn answer_callback(
        &self,
        callback_id: &str,
        text: Option<&str>,
        show_alert: bool,
    ) -> anyhow::Result<()>;

    /// Acknowledge or veto a precheckout query. `Err(reason)` carries the
    /// human-readable rejection shown to the payer.
    async fn answer_precheckout(
        &self,
        query_id: &str,
        verdict: Result<(), String>,
    ) -> anyhow::Result<()>;

    async fn edit_message_text(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> anyhow::Result<()>;

    async fn delete_message(&self, chat_id: i64, message_id: i64) -> anyhow::Result<()>;

    /// Show a "typing…" indicator while a completion is in flight.
    async fn send_chat_action(&self, chat_id: i64, action: &str) -> anyhow::Result<()> {
        let _ = (chat_id, action);
        Ok(())
    }

    /// Download an uploaded file's bytes (vision inclusion, documents).
    async fn fetch_file(&self, file_id: &str) -> anyhow::Result<Vec<u8>>;
}

#[cfg(test)]
mod tests {
    use super::{InboundEvent, UserRef};

    #[test]
    fn event_exposes_sender_for_lock_keying() {
        let from = UserRef {
            id: 42,
            first_name: "Ada".into(),
        };
        let event = InboundEvent::PaymentSuccess {
            from: from.clone(),
            payload: "42_Pro".into(),
        };
        assert_eq!(event.from(), &from);
    }
}
