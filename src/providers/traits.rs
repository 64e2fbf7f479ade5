use super::types::ProviderMessage;
use async_trait::async_trait;

/// AI chat collaborator. Messages may carry inlined images; the provider is
/// responsible for mapping them onto its wire format.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    async fn complete(
        &self,
        model: &str,
        messages: &[ProviderMessage],
        max_tokens: u32,
    ) -> anyhow::Result<String>;
}

/// AI image-generation collaborator. Returns a locator (URL) for the
/// produced image; the transport forwards it without downloading.
#[async_trait]
pub trait ImageProvider: Send + Sync {
    async fn generate(&self, prompt: &str, size: &str, quality: &str) -> anyhow::Result<String>;
}
