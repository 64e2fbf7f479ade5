use super::traits::{ChatProvider, ImageProvider};
use super::types::{ContentPart, ProviderMessage};
use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

fn http_client() -> Client {
    Client::builder()
        .timeout(std::time::Duration::from_secs(120))
        .connect_timeout(std::time::Duration::from_secs(10))
        .pool_max_idle_per_host(10)
        .pool_idle_timeout(std::time::Duration::from_secs(90))
        .tcp_keepalive(std::time::Duration::from_secs(60))
        .build()
        .unwrap_or_else(|_| Client::new())
}

/// OpenAI chat-completions provider with vision content blocks.
pub struct OpenAiChatProvider {
    /// Pre-computed `"Bearer <key>"` header value (avoids `format!` per request).
    cached_auth_header: String,
    base_url: String,
    client: Client,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<RequestMessage>,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct RequestMessage {
    role: &'static str,
    content: RequestContent,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum RequestContent {
    Text(String),
    Parts(Vec<RequestPart>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum RequestPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrlBody },
}

#[derive(Debug, Serialize)]
struct ImageUrlBody {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

fn map_message(message: &ProviderMessage) -> RequestMessage {
    let content = if message.is_text_only() {
        let text = message
            .parts
            .iter()
            .filter_map(|part| match part {
                ContentPart::Text(text) => Some(text.as_str()),
                ContentPart::ImageUrl(_) => None,
            })
            .collect::<Vec<_>>()
            .join("\n");
        RequestContent::Text(text)
    } else {
        RequestContent::Parts(
            message
                .parts
                .iter()
                .map(|part| match part {
                    ContentPart::Text(text) => RequestPart::Text { text: text.clone() },
                    ContentPart::ImageUrl(url) => RequestPart::ImageUrl {
                        image_url: ImageUrlBody { url: url.clone() },
                    },
                })
                .collect(),
        )
    };

    RequestMessage {
        role: message.role.as_str(),
        content,
    }
}

impl OpenAiChatProvider {
    pub fn new(api_key: &str) -> Self {
        Self {
            cached_auth_header: format!("Bearer {api_key}"),
            base_url: DEFAULT_BASE_URL.to_string(),
            client: http_client(),
        }
    }

    /// Point the provider at a different endpoint (tests, proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl ChatProvider for OpenAiChatProvider {
    async fn complete(
        &self,
        model: &str,
        messages: &[ProviderMessage],
        max_tokens: u32,
    ) -> anyhow::Result<String> {
        let request = ChatRequest {
            model: model.to_string(),
            messages: messages.iter().map(map_message).collect(),
            max_tokens,
        };

        let resp = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", &self.cached_auth_header)
            .json(&request)
            .send()
            .await
            .context("send chat completion request")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let err = resp
                .text()
                .await
                .unwrap_or_else(|e| format!("<failed to read response body: {e}>"));
            anyhow::bail!("OpenAI chat completion failed ({status}): {err}");
        }

        let body: ChatResponse = resp.json().await.context("parse chat completion body")?;
        body.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.is_empty())
            .context("chat completion returned no content")
    }
}

/// DALL-E image generation against the OpenAI images endpoint.
pub struct OpenAiImageProvider {
    cached_auth_header: String,
    base_url: String,
    model: String,
    client: Client,
}

#[derive(Debug, Serialize)]
struct ImageRequest {
    model: String,
    prompt: String,
    n: u8,
    size: String,
    quality: String,
}

#[derive(Debug, Deserialize)]
struct ImageResponse {
    data: Vec<ImageDatum>,
}

#[derive(Debug, Deserialize)]
struct ImageDatum {
    url: Option<String>,
}

impl OpenAiImageProvider {
    pub fn new(api_key: &str) -> Self {
        Self {
            cached_auth_header: format!("Bearer {api_key}"),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: "dall-e-3".to_string(),
            client: http_client(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl ImageProvider for OpenAiImageProvider {
    async fn generate(&self, prompt: &str, size: &str, quality: &str) -> anyhow::Result<String> {
        let request = ImageRequest {
            model: self.model.clone(),
            prompt: prompt.to_string(),
            n: 1,
            size: size.to_string(),
            quality: quality.to_string(),
        };

        let resp = self
            .client
            .post(format!("{}/images/generations", self.base_url))
            .header("Authorization", &self.cached_auth_header)
            .json(&request)
            .send()
            .await
            .context("send image generation request")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let err = resp
                .text()
                .await
                .unwrap_or_else(|e| format!("<failed to read response body: {e}>"));
            anyhow::bail!("OpenAI image generation failed ({status}): {err}");
        }

        let body: ImageResponse = resp.json().await.context("parse image generation body")?;
        body.data
            .into_iter()
            .next()
            .and_then(|datum| datum.url)
            .context("image generation returned no URL")
    }
}
