use crate::providers::{ContentPart, MessageRole, ProviderMessage};
use crate::quota::{self, QuotaResource};
use crate::session::{ChatTurn, TurnRole, UserSession};
use anyhow::{Context, Result};

/// Max tokens requested per completion.
pub const MAX_COMPLETION_TOKENS: u32 = 1500;

/// Fixed vocabulary gating whether attached images ride along with a chat
/// turn. Images are never resent on unrelated turns.
///
/// Known limitation: the vocabulary is English-only, so users chatting in
/// other languages can only trigger inclusion with these exact words.
pub const TRIGGER_WORDS: [&str; 12] = [
    "look", "see", "image", "photo", "picture", "screen", "solve", "analyze", "what", "this",
    "extract", "read",
];

const SYSTEM_TEMPLATE: &str = "\
You are a helpful, friendly assistant talking to {{ name }}. \
Answer in {{ lang }}. \
RULES:
1. DO NOT use bolding (**) for lists. Use emojis as bullet points (🔹, ✨, 🚀).
2. Keep it fun and lively.
{{ context_note }}";

/// Attach photos iff some are stored and the message text case-insensitively
/// contains a trigger word.
#[must_use]
pub fn should_attach_photos(text: &str, has_photos: bool) -> bool {
    if !has_photos {
        return false;
    }
    let lowered = text.to_lowercase();
    TRIGGER_WORDS.iter().any(|word| lowered.contains(word))
}

fn map_role(role: TurnRole) -> MessageRole {
    match role {
        TurnRole::System => MessageRole::System,
        TurnRole::User => MessageRole::User,
        TurnRole::Assistant => MessageRole::Assistant,
    }
}

/// Builds the bounded multi-modal request for the chat collaborator.
pub struct ContextAssembler {
    engine: tera::Tera,
}

impl ContextAssembler {
    pub fn new() -> Result<Self> {
        let mut engine = tera::Tera::default();
        engine
            .add_raw_template("system_instruction", SYSTEM_TEMPLATE)
            .context("register system instruction template")?;
        Ok(Self { engine })
    }

    fn system_instruction(&self, session: &UserSession, with_images: bool) -> Result<String> {
        let mut ctx = tera::Context::new();
        ctx.insert("name", &session.name);
        ctx.insert("lang", &session.lang);
        ctx.insert(
            "context_note",
            if with_images {
                "CONTEXT: User attached images. Refer ONLY if asked."
            } else {
                ""
            },
        );

        self.engine
            .render("system_instruction", &ctx)
            .context("render system instruction")
    }

    /// One system instruction + the stored history (already bounded to 15
    /// turns) + the current user turn, with photos inlined when the trigger
    /// heuristic fires.
    pub fn assemble(
        &self,
        session: &UserSession,
        text: &str,
        photo_data_urls: &[String],
    ) -> Result<Vec<ProviderMessage>> {
        let with_images = !photo_data_urls.is_empty();

        let mut messages = Vec::with_capacity(session.history.len() + 2);
        messages.push(ProviderMessage::text(
            MessageRole::System,
            self.system_instruction(session, with_images)?,
        ));

        for turn in &session.history {
            messages.push(ProviderMessage::text(map_role(turn.role), &turn.content));
        }

        let mut current = ProviderMessage::text(MessageRole::User, text);
        for url in photo_data_urls {
            current.parts.push(ContentPart::ImageUrl(url.clone()));
        }
        messages.push(current);

        Ok(messages)
    }
}

/// Fold a successful completion back into the session: append both turns,
/// truncate to the history bound, remember the raw text for export, and
/// charge one message unit (the send has already succeeded).
pub fn fold_response(session: &mut UserSession, user_text: &str, reply: &str) {
    session.push_turn(ChatTurn::user(user_text));
    session.push_turn(ChatTurn::assistant(reply));
    session.last_generated_text = Some(reply.to_string());
    quota::charge(session, QuotaResource::Messages);
}

#[cfg(test)]
mod tests {
    use super::{ContextAssembler, fold_response, should_attach_photos};
    use crate::providers::{ContentPart, MessageRole};
    use crate::session::{ChatTurn, HISTORY_LIMIT, UserSession};

    fn session() -> UserSession {
        let mut session = UserSession::new(42, "Ada", "2024-06");
        session.attached_photos.push("file-1".into());
        session
    }

    #[test]
    fn trigger_word_attaches_photos() {
        assert!(should_attach_photos("what is this", true));
        assert!(should_attach_photos("LOOK here", true));
    }

    #[test]
    fn unrelated_message_keeps_photos_out() {
        assert!(!should_attach_photos("hello there", true));
    }

    #[test]
    fn no_photos_means_no_attachment_even_with_trigger() {
        assert!(!should_attach_photos("what is this", false));
    }

    #[test]
    fn assemble_starts_with_system_and_ends_with_user_turn() {
        let assembler = ContextAssembler::new().unwrap();
        let mut session = session();
        session.push_turn(ChatTurn::user("earlier question"));
        session.push_turn(ChatTurn::assistant("earlier answer"));

        let messages = assembler.assemble(&session, "next question", &[]).unwrap();

        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].role, MessageRole::System);
        match &messages[0].parts[0] {
            ContentPart::Text(text) => {
                assert!(text.contains("Ada"));
                assert!(text.contains("en"));
            }
            ContentPart::ImageUrl(_) => panic!("system message must be text"),
        }
        assert_eq!(messages[3].role, MessageRole::User);
    }

    #[test]
    fn assemble_inlines_photo_data_urls() {
        let assembler = ContextAssembler::new().unwrap();
        let session = session();
        let urls = vec!["data:image/jpeg;base64,AAA".to_string()];

        let messages = assembler.assemble(&session, "what is this", &urls).unwrap();
        let current = messages.last().unwrap();

        assert_eq!(current.parts.len(), 2);
        assert!(matches!(&current.parts[1], ContentPart::ImageUrl(url) if url.contains("base64")));
    }

    #[test]
    fn system_note_mentions_images_only_when_attached() {
        let assembler = ContextAssembler::new().unwrap();
        let session = session();

        let with = assembler
            .assemble(&session, "look", &["data:x".to_string()])
            .unwrap();
        let without = assembler.assemble(&session, "hello", &[]).unwrap();

        let text_of = |message: &crate::providers::ProviderMessage| match &message.parts[0] {
            ContentPart::Text(text) => text.clone(),
            ContentPart::ImageUrl(_) => String::new(),
        };
        assert!(text_of(&with[0]).contains("attached images"));
        assert!(!text_of(&without[0]).contains("attached images"));
    }

    #[test]
    fn fold_response_appends_truncates_and_charges() {
        let mut session = session();
        for i in 0..14 {
            session.push_turn(ChatTurn::user(format!("turn {i}")));
        }

        fold_response(&mut session, "question", "answer");

        assert_eq!(session.history.len(), HISTORY_LIMIT);
        assert_eq!(session.history[13].content, "question");
        assert_eq!(session.history[14].content, "answer");
        assert_eq!(session.last_generated_text.as_deref(), Some("answer"));
        assert_eq!(session.messages_used, 1);
    }
}
