pub mod api;

use crate::payment::Invoice;
use crate::transport::traits::{InboundEvent, Keyboard, Transport};
use anyhow::Context;
use async_trait::async_trait;
use serde_json::{Value, json};

/// Telegram channel — long-polls the Bot API for updates. The user-facing
/// and administrative bots are two instances with different tokens.
pub struct TelegramChannel {
    name: String,
    bot_token: String,
    client: reqwest::Client,
}

impl TelegramChannel {
    pub fn new(name: impl Into<String>, bot_token: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            bot_token: bot_token.into(),
            client: reqwest::Client::new(),
        }
    }

    fn api_url(&self, method: &str) -> String {
        format!("https://api.telegram.org/bot{}/{method}", self.bot_token)
    }

    fn file_url(&self, file_path: &str) -> String {
        format!(
            "https://api.telegram.org/file/bot{}/{file_path}",
            self.bot_token
        )
    }

    async fn call(&self, method: &str, body: Value) -> anyhow::Result<Value> {
        let resp = self
            .client
            .post(self.api_url(method))
            .json(&body)
            .send()
            .await
            .with_context(|| format!("Telegram {method} request"))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let err = resp
                .text()
                .await
                .unwrap_or_else(|e| format!("<failed to read response body: {e}>"));
            anyhow::bail!("Telegram {method} failed ({status}): {err}");
        }

        resp.json()
            .await
            .with_context(|| format!("Telegram {method} response body"))
    }

    fn keyboard_markup(keyboard: &Keyboard) -> Value {
        match keyboard {
            Keyboard::Reply(rows) => json!({
                "keyboard": rows
                    .iter()
                    .map(|row| row.iter().map(|label| json!({"text": label})).collect::<Vec<_>>())
                    .collect::<Vec<_>>(),
                "resize_keyboard": true
            }),
            Keyboard::RequestContact(label) => json!({
                "keyboard": [[{"text": label, "request_contact": true}]],
                "resize_keyboard": true
            }),
            Keyboard::Inline(rows) => json!({
                "inline_keyboard": rows
                    .iter()
                    .map(|row| {
                        row.iter()
                            .map(|(label, data)| json!({"text": label, "callback_data": data}))
                            .collect::<Vec<_>>()
                    })
                    .collect::<Vec<_>>()
            }),
            Keyboard::Remove => json!({"remove_keyboard": true}),
        }
    }
}

#[async_trait]
impl Transport for TelegramChannel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn listen(&self, tx: tokio::sync::mpsc::Sender<InboundEvent>) -> anyhow::Result<()> {
        let mut offset: i64 = 0;

        tracing::info!(channel = %self.name, "Telegram channel listening for updates");

        loop {
            let body = json!({
                "offset": offset,
                "timeout": 30,
                "allowed_updates": ["message", "callback_query", "pre_checkout_query"]
            });

            let data = match self.call("getUpdates", body).await {
                Ok(data) => data,
                Err(e) => {
                    tracing::warn!(channel = %self.name, "Telegram poll error: {e}");
                    tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                    continue;
                }
            };

            if let Some(results) = data.get("result").and_then(Value::as_array) {
                for update in results {
                    // Advance offset past this update
                    if let Some(uid) = update.get("update_id").and_then(Value::as_i64) {
                        offset = uid + 1;
                    }

                    let Some(event) = api::parse_update(update) else {
                        continue;
                    };

                    if tx.send(event).await.is_err() {
                        return Ok(());
                    }
                }
            }
        }
    }

    async fn send_message(&self, chat_id: i64, text: &str) -> anyhow::Result<()> {
        self.call(
            "sendMessage",
            json!({"chat_id": chat_id, "text": text, "parse_mode": "Markdown"}),
        )
        .await
        .map(|_| ())
    }

    async fn send_message_with_keyboard(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: &Keyboard,
    ) -> anyhow::Result<()> {
        self.call(
            "sendMessage",
            json!({
                "chat_id": chat_id,
                "text": text,
                "parse_mode": "Markdown",
                "reply_markup": Self::keyboard_markup(keyboard)
            }),
        )
        .await
        .map(|_| ())
    }

    async fn send_photo_url(
        &self,
        chat_id: i64,
        url: &str,
        caption: Option<&str>,
    ) -> anyhow::Result<()> {
        let mut body = json!({"chat_id": chat_id, "photo": url});
        if let Some(caption) = caption {
            body["caption"] = json!(caption);
        }
        self.call("sendPhoto", body).await.map(|_| ())
    }

    async fn send_photo_file_id(&self, chat_id: i64, file_id: &str) -> anyhow::Result<()> {
        self.call("sendPhoto", json!({"chat_id": chat_id, "photo": file_id}))
            .await
            .map(|_| ())
    }

    async fn send_document(
        &self,
        chat_id: i64,
        file_name: &str,
        bytes: Vec<u8>,
        caption: Option<&str>,
    ) -> anyhow::Result<()> {
        let mut form = reqwest::multipart::Form::new()
            .text("chat_id", chat_id.to_string())
            .part(
                "document",
                reqwest::multipart::Part::bytes(bytes).file_name(file_name.to_string()),
            );
        if let Some(caption) = caption {
            form = form.text("caption", caption.to_string());
        }

        let resp = self
            .client
            .post(self.api_url("sendDocument"))
            .multipart(form)
            .send()
            .await
            .context("Telegram sendDocument request")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let err = resp
                .text()
                .await
                .unwrap_or_else(|e| format!("<failed to read response body: {e}>"));
            anyhow::bail!("Telegram sendDocument failed ({status}): {err}");
        }

        Ok(())
    }

    async fn send_invoice(&self, chat_id: i64, invoice: &Invoice) -> anyhow::Result<()> {
        self.call(
            "sendInvoice",
            json!({
                "chat_id": chat_id,
                "title": invoice.title,
                "description": invoice.description,
                "payload": invoice.payload,
                "provider_token": invoice.provider_token,
                "currency": invoice.currency,
                "prices": [{"label": invoice.label, "amount": invoice.amount_minor}],
                "start_parameter": "upgrade-tier"
            }),
        )
        .await
        .map(|_| ())
    }

    async fn answer_callback(
        &self,
        callback_id: &str,
        text: Option<&str>,
        show_alert: bool,
    ) -> anyhow::Result<()> {
        let mut body = json!({"callback_query_id": callback_id, "show_alert": show_alert});
        if let Some(text) = text {
            body["text"] = json!(text);
        }
        self.call("answerCallbackQuery", body).await.map(|_| ())
    }

    async fn answer_precheckout(
        &self,
        query_id: &str,
        verdict: Result<(), String>,
    ) -> anyhow::Result<()> {
        let body = match verdict {
            Ok(()) => json!({"pre_checkout_query_id": query_id, "ok": true}),
            Err(reason) => json!({
                "pre_checkout_query_id": query_id,
                "ok": false,
                "error_message": reason
            }),
        };
        self.call("answerPreCheckoutQuery", body).await.map(|_| ())
    }

    async fn edit_message_text(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> anyhow::Result<()> {
        let mut body = json!({
            "chat_id": chat_id,
            "message_id": message_id,
            "text": text,
            "parse_mode": "Markdown"
        });
        if let Some(keyboard) = keyboard {
            body["reply_markup"] = Self::keyboard_markup(keyboard);
        }
        self.call("editMessageText", body).await.map(|_| ())
    }

    async fn delete_message(&self, chat_id: i64, message_id: i64) -> anyhow::Result<()> {
        self.call(
            "deleteMessage",
            json!({"chat_id": chat_id, "message_id": message_id}),
        )
        .await
        .map(|_| ())
    }

    async fn send_chat_action(&self, chat_id: i64, action: &str) -> anyhow::Result<()> {
        self.call(
            "sendChatAction",
            json!({"chat_id": chat_id, "action": action}),
        )
        .await
        .map(|_| ())
    }

    async fn fetch_file(&self, file_id: &str) -> anyhow::Result<Vec<u8>> {
        let data = self.call("getFile", json!({"file_id": file_id})).await?;
        let file_path = data
            .get("result")
            .and_then(|result| result.get("file_path"))
            .and_then(Value::as_str)
            .context("getFile response missing file_path")?;

        let resp = self
            .client
            .get(self.file_url(file_path))
            .send()
            .await
            .context("Telegram file download")?;

        if !resp.status().is_success() {
            anyhow::bail!("Telegram file download failed ({})", resp.status());
        }

        Ok(resp.bytes().await.context("read file bytes")?.to_vec())
    }
}
