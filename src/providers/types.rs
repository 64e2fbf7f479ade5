/// Role of one message in a provider request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageRole::System => "system",
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }
}

/// One content part of a provider message. Text-only messages carry a single
/// `Text` part; vision turns add inlined `ImageUrl` parts (data URLs).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentPart {
    Text(String),
    ImageUrl(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderMessage {
    pub role: MessageRole,
    pub parts: Vec<ContentPart>,
}

impl ProviderMessage {
    pub fn text(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            parts: vec![ContentPart::Text(content.into())],
        }
    }

    /// True when the message carries nothing but plain text.
    pub fn is_text_only(&self) -> bool {
        self.parts
            .iter()
            .all(|part| matches!(part, ContentPart::Text(_)))
    }
}

#[cfg(test)]
mod tests {
    use super::{ContentPart, MessageRole, ProviderMessage};

    #[test]
    fn text_constructor_is_text_only() {
        let message = ProviderMessage::text(MessageRole::User, "hi");
        assert!(message.is_text_only());
        assert_eq!(message.role.as_str(), "user");
    }

    #[test]
    fn image_part_breaks_text_only() {
        let mut message = ProviderMessage::text(MessageRole::User, "look");
        message
            .parts
            .push(ContentPart::ImageUrl("data:image/jpeg;base64,AAA".into()));
        assert!(!message.is_text_only());
    }
}
