use super::Gateway;
use super::menu;
use crate::conversation::context::{self, MAX_COMPLETION_TOKENS};
use crate::conversation;
use crate::conversation::ingest::{self, extract_document};
use crate::export::{self, ExportFormat};
use crate::payment::PaymentPayload;
use crate::quota::{self, QuotaDecision, QuotaResource};
use crate::session::UserSession;
use crate::tiers::Tier;
use crate::transport::{InboundEvent, Keyboard, UserRef};
use anyhow::Result;
use base64::Engine;
use std::str::FromStr;
use tokio::sync::OwnedMutexGuard;

const GENERATED_IMAGE_SIZE: &str = "1024x1024";
const GENERATED_IMAGE_QUALITY: &str = "standard";

impl Gateway {
    pub(crate) async fn handle_user_event(&self, event: InboundEvent) -> Result<()> {
        match event {
            InboundEvent::Text { from, text } => self.handle_text(&from, &text).await,
            InboundEvent::Photo {
                from,
                file_id,
                caption,
            } => self.handle_photo(&from, &file_id, caption.as_deref()).await,
            InboundEvent::Document {
                from,
                file_id,
                file_name,
            } => self.handle_document(&from, &file_id, &file_name).await,
            InboundEvent::Contact {
                from,
                contact_user_id,
                phone,
            } => self.handle_contact(&from, contact_user_id, &phone).await,
            InboundEvent::Callback {
                from,
                callback_id,
                message_id,
                data,
            } => {
                self.handle_callback(&from, &callback_id, message_id, &data)
                    .await
            }
            InboundEvent::PreCheckout {
                from: _,
                query_id,
                payload,
            } => self.handle_precheckout(&query_id, &payload).await,
            InboundEvent::PaymentSuccess { from, payload } => {
                self.handle_payment_success(&from, &payload).await
            }
        }
    }

    /// Load (or create) the session and roll the monthly window. The
    /// rollover runs on every event kind since all three counters share the
    /// same window.
    async fn checked_session(&self, from: &UserRef) -> Result<UserSession> {
        let mut session = self
            .approval
            .check_or_create(from.id, &from.first_name)
            .await?;
        if quota::ensure_current_period(&mut session, &quota::current_month()) {
            self.sessions.commit(&mut session).await?;
        }
        Ok(session)
    }

    async fn send_auth_prompt(&self, chat_id: i64) -> Result<()> {
        self.user_bot
            .send_message_with_keyboard(
                chat_id,
                &t!("auth.required"),
                &Keyboard::RequestContact(t!("auth.share_button").into_owned()),
            )
            .await
    }

    async fn handle_text(&self, from: &UserRef, text: &str) -> Result<()> {
        let guard = self.sessions.lock(from.id).await;
        let mut session = self.checked_session(from).await?;

        if !session.is_approved() {
            drop(guard);
            return self.send_auth_prompt(from.id).await;
        }

        let lang = session.lang.clone();

        if text == "/start" {
            drop(guard);
            return self
                .user_bot
                .send_message_with_keyboard(
                    from.id,
                    &t!("chat.welcome", locale = &lang, name = session.name),
                    &menu::main_keyboard(&lang),
                )
                .await;
        }

        if text == t!("menu.file", locale = &lang) {
            drop(guard);
            if session.last_generated_text.is_none() {
                return self
                    .user_bot
                    .send_message(from.id, &t!("file.nothing_to_save", locale = &lang))
                    .await;
            }
            return self
                .user_bot
                .send_message_with_keyboard(
                    from.id,
                    &t!("file.choose_format", locale = &lang),
                    &menu::format_keyboard(self.renderer.as_ref()),
                )
                .await;
        }

        if text == t!("menu.clear", locale = &lang) {
            session.clear_context();
            self.sessions.commit(&mut session).await?;
            drop(guard);
            return self
                .user_bot
                .send_message_with_keyboard(
                    from.id,
                    &t!("chat.cleared", locale = &lang),
                    &menu::main_keyboard(&lang),
                )
                .await;
        }

        if text == t!("menu.analyze", locale = &lang) {
            drop(guard);
            return self
                .user_bot
                .send_message(from.id, &t!("photos.send_prompt", locale = &lang))
                .await;
        }

        if text == t!("menu.chat", locale = &lang) {
            drop(guard);
            return self
                .user_bot
                .send_message(from.id, &t!("chat.listening", locale = &lang))
                .await;
        }

        if text == t!("menu.lang", locale = &lang) {
            drop(guard);
            return self
                .user_bot
                .send_message_with_keyboard(
                    from.id,
                    &t!("lang.choose", locale = &lang),
                    &menu::language_keyboard(),
                )
                .await;
        }

        if let Some(&(_, code)) = menu::LANGUAGE_OPTIONS
            .iter()
            .find(|(label, _)| *label == text)
        {
            session.lang = code.to_string();
            self.sessions.commit(&mut session).await?;
            drop(guard);
            return self
                .user_bot
                .send_message_with_keyboard(
                    from.id,
                    &t!("lang.set", locale = code),
                    &menu::main_keyboard(code),
                )
                .await;
        }

        if text == t!("menu.tier", locale = &lang) {
            drop(guard);
            let upgrades = self.payments.upgrade_options(session.tier);
            if upgrades.is_empty() {
                return self
                    .user_bot
                    .send_message(from.id, &t!("tier.none_above", locale = &lang))
                    .await;
            }
            return self
                .user_bot
                .send_message_with_keyboard(
                    from.id,
                    &t!("tier.choose", locale = &lang, tier = session.tier),
                    &menu::upgrade_keyboard(&upgrades),
                )
                .await;
        }

        if text == t!("menu.uploads", locale = &lang) {
            let photos = session.attached_photos.clone();
            drop(guard);
            if photos.is_empty() {
                return self
                    .user_bot
                    .send_message(from.id, &t!("photos.none", locale = &lang))
                    .await;
            }
            for file_id in &photos {
                if let Err(e) = self.user_bot.send_photo_file_id(from.id, file_id).await {
                    tracing::warn!(user_id = from.id, "failed to re-send photo: {e:#}");
                }
            }
            return Ok(());
        }

        if text == t!("menu.usage", locale = &lang) {
            drop(guard);
            let plan = session.tier.plan();
            return self
                .user_bot
                .send_message(
                    from.id,
                    &t!(
                        "usage.message",
                        locale = &lang,
                        name = session.name,
                        tier = session.tier,
                        model = plan.model,
                        used = session.messages_used,
                        limit = plan.message_limit,
                        p_used = session.photos_used,
                        p_limit = plan.photo_limit,
                        g_used = session.images_generated,
                        g_limit = plan.image_limit
                    ),
                )
                .await;
        }

        if text == t!("menu.imggen", locale = &lang) {
            match quota::check_limit(&session, QuotaResource::ImageGenerations) {
                QuotaDecision::Denied { used, limit } => {
                    drop(guard);
                    return self
                        .user_bot
                        .send_message(
                            from.id,
                            &t!("imggen.limit", locale = &lang, used = used, limit = limit),
                        )
                        .await;
                }
                QuotaDecision::Allowed => {
                    conversation::enter_image_mode(&mut session);
                    self.sessions.commit(&mut session).await?;
                    drop(guard);
                    return self
                        .user_bot
                        .send_message(from.id, &t!("imggen.prompt", locale = &lang))
                        .await;
                }
            }
        }

        self.chat_turn(guard, session, text).await
    }

    /// A free-text turn past the menu: either an image prompt being
    /// consumed, or a normal chat completion.
    async fn chat_turn(
        &self,
        guard: OwnedMutexGuard<()>,
        mut session: UserSession,
        text: &str,
    ) -> Result<()> {
        let user_id = session.user_id;
        let lang = session.lang.clone();

        if let QuotaDecision::Denied { used, limit } =
            quota::check_limit(&session, QuotaResource::Messages)
        {
            drop(guard);
            return self
                .user_bot
                .send_message(
                    user_id,
                    &t!("limits.messages", locale = &lang, used = used, limit = limit),
                )
                .await;
        }

        if conversation::take_image_prompt(&mut session) {
            // Persist the cleared mode first: a failed generation must not
            // re-trigger on the next message.
            self.sessions.commit(&mut session).await?;
            drop(guard);
            return self.generate_image(user_id, &lang, text).await;
        }

        let auto_cleared = conversation::advance_photo_window(&mut session);
        let attach_photos =
            context::should_attach_photos(text, !session.attached_photos.is_empty());
        let photo_ids = if attach_photos {
            session.attached_photos.clone()
        } else {
            Vec::new()
        };
        self.sessions.commit(&mut session).await?;
        drop(guard);

        if auto_cleared {
            self.user_bot
                .send_message(user_id, &t!("chat.auto_cleared", locale = &lang))
                .await?;
        }

        if let Err(e) = self.user_bot.send_chat_action(user_id, "typing").await {
            tracing::debug!(user_id, "typing action failed: {e:#}");
        }

        // Slow work happens outside the per-user lock: photo downloads and
        // the completion round-trip.
        let mut data_urls = Vec::with_capacity(photo_ids.len());
        for file_id in &photo_ids {
            match self.user_bot.fetch_file(file_id).await {
                Ok(bytes) => {
                    let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
                    data_urls.push(format!("data:image/jpeg;base64,{encoded}"));
                }
                Err(e) => {
                    tracing::warn!(user_id, file_id, "photo fetch failed, skipping: {e:#}");
                }
            }
        }

        let model = session.tier.plan().model;
        let messages = self.assembler.assemble(&session, text, &data_urls)?;

        match self.chat.complete(model, &messages, MAX_COMPLETION_TOKENS).await {
            Ok(reply) => {
                self.user_bot.send_message(user_id, &reply).await?;

                // Re-acquire to commit: fold the exchange into whatever the
                // session looks like now and charge for the delivered reply.
                let _guard = self.sessions.lock(user_id).await;
                let Some(mut fresh) = self.sessions.store().get(user_id).await? else {
                    return Ok(());
                };
                context::fold_response(&mut fresh, text, &reply);
                if let Err(e) = self.sessions.commit(&mut fresh).await {
                    tracing::error!(user_id, "failed to persist chat turn: {e:#}");
                }
                Ok(())
            }
            Err(e) => {
                tracing::warn!(user_id, "chat completion failed: {e:#}");
                self.user_bot
                    .send_message(user_id, &t!("chat.error", locale = &lang))
                    .await
            }
        }
    }

    /// The consumed image prompt: generate outside the lock, charge only
    /// after the image was produced and delivered.
    async fn generate_image(&self, user_id: i64, lang: &str, prompt: &str) -> Result<()> {
        self.user_bot
            .send_message(user_id, &t!("imggen.wait", locale = lang))
            .await?;

        match self
            .images
            .generate(prompt, GENERATED_IMAGE_SIZE, GENERATED_IMAGE_QUALITY)
            .await
        {
            Ok(url) => {
                self.user_bot
                    .send_photo_url(user_id, &url, Some(&t!("imggen.done", locale = lang)))
                    .await?;

                let _guard = self.sessions.lock(user_id).await;
                let Some(mut session) = self.sessions.store().get(user_id).await? else {
                    return Ok(());
                };
                quota::charge(&mut session, QuotaResource::ImageGenerations);
                if let Err(e) = self.sessions.commit(&mut session).await {
                    tracing::error!(user_id, "failed to persist image charge: {e:#}");
                }
                Ok(())
            }
            Err(e) => {
                tracing::warn!(user_id, "image generation failed: {e:#}");
                self.user_bot
                    .send_message(user_id, &t!("imggen.error", locale = lang))
                    .await
            }
        }
    }

    async fn handle_photo(
        &self,
        from: &UserRef,
        file_id: &str,
        caption: Option<&str>,
    ) -> Result<()> {
        let guard = self.sessions.lock(from.id).await;
        let mut session = self.checked_session(from).await?;

        if !session.is_approved() {
            drop(guard);
            return self.send_auth_prompt(from.id).await;
        }

        let lang = session.lang.clone();

        if let QuotaDecision::Denied { used, limit } =
            quota::check_limit(&session, QuotaResource::Photos)
        {
            drop(guard);
            return self
                .user_bot
                .send_message(
                    from.id,
                    &t!("photos.limit", locale = &lang, used = used, limit = limit),
                )
                .await;
        }

        conversation::note_photo(&mut session, file_id);
        quota::charge(&mut session, QuotaResource::Photos);
        self.sessions.commit(&mut session).await?;

        // A captioned photo is also a chat turn about that photo.
        if let Some(caption) = caption {
            return self.chat_turn(guard, session, caption).await;
        }

        let count = session.attached_photos.len();
        drop(guard);
        self.user_bot
            .send_message_with_keyboard(
                from.id,
                &t!("photos.received", locale = &lang, count = count),
                &menu::main_keyboard(&lang),
            )
            .await
    }

    async fn handle_document(
        &self,
        from: &UserRef,
        file_id: &str,
        file_name: &str,
    ) -> Result<()> {
        let guard = self.sessions.lock(from.id).await;
        let session = self.checked_session(from).await?;

        if !session.is_approved() {
            drop(guard);
            return self.send_auth_prompt(from.id).await;
        }

        let lang = session.lang.clone();

        let supported = file_name.to_lowercase().ends_with(".pdf")
            || self
                .extractors
                .iter()
                .any(|extractor| extractor.accepts(file_name));
        if !supported {
            drop(guard);
            return self
                .user_bot
                .send_message(from.id, &t!("file.unsupported", locale = &lang))
                .await;
        }
        drop(guard);

        // Download and decode outside the lock.
        let bytes = match self.user_bot.fetch_file(file_id).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(user_id = from.id, "document fetch failed: {e:#}");
                return self
                    .user_bot
                    .send_message(from.id, &t!("file.error", locale = &lang))
                    .await;
            }
        };

        let decoded = match extract_document(&self.extractors, file_name, &bytes) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(user_id = from.id, file_name, "extraction failed: {e}");
                return self
                    .user_bot
                    .send_message(from.id, &t!("file.error", locale = &lang))
                    .await;
            }
        };

        let _guard = self.sessions.lock(from.id).await;
        let Some(mut session) = self.sessions.store().get(from.id).await? else {
            return Ok(());
        };
        ingest::ingest_document(&mut session, file_name, &decoded);
        self.sessions.commit(&mut session).await?;

        self.user_bot
            .send_message(from.id, &t!("file.read", locale = &lang))
            .await
    }

    async fn handle_contact(
        &self,
        from: &UserRef,
        contact_user_id: i64,
        phone: &str,
    ) -> Result<()> {
        let guard = self.sessions.lock(from.id).await;
        let mut session = self.checked_session(from).await?;

        let outcome = self
            .approval
            .request_approval(&mut session, contact_user_id, phone)
            .await?;
        drop(guard);

        let admin_ids = match outcome {
            crate::approval::ContactOutcome::Spoofed => return Ok(()),
            crate::approval::ContactOutcome::Forwarded { admin_ids } => admin_ids,
        };

        self.user_bot
            .send_message_with_keyboard(from.id, &t!("auth.wait"), &Keyboard::Remove)
            .await?;

        let request_text = t!("admin.request", name = from.first_name, id = from.id);
        let keyboard = menu::decision_keyboard(from.id);
        for admin_id in admin_ids {
            if let Err(e) = self
                .admin_bot
                .send_message_with_keyboard(admin_id, &request_text, &keyboard)
                .await
            {
                tracing::warn!(admin_id, "failed to notify admin: {e:#}");
            }
        }
        Ok(())
    }

    async fn handle_callback(
        &self,
        from: &UserRef,
        callback_id: &str,
        message_id: i64,
        data: &str,
    ) -> Result<()> {
        if let Some(plan_raw) = data.strip_prefix("buy_") {
            return self
                .handle_plan_selected(from, callback_id, message_id, plan_raw)
                .await;
        }
        if let Some(rest) = data.strip_prefix("pay_") {
            return self.handle_provider_selected(from, callback_id, rest).await;
        }
        if let Some(format_raw) = data.strip_prefix("fmt_") {
            return self
                .handle_export(from, callback_id, message_id, format_raw)
                .await;
        }

        tracing::debug!(user_id = from.id, data, "ignoring unknown callback");
        self.user_bot.answer_callback(callback_id, None, false).await
    }

    /// SelectPlan → SelectProvider: show the provider picker for the plan.
    async fn handle_plan_selected(
        &self,
        from: &UserRef,
        callback_id: &str,
        message_id: i64,
        plan_raw: &str,
    ) -> Result<()> {
        let guard = self.sessions.lock(from.id).await;
        let session = self.checked_session(from).await?;
        let lang = session.lang.clone();
        drop(guard);

        let Ok(plan) = Tier::from_str(plan_raw) else {
            return self
                .user_bot
                .answer_callback(callback_id, Some(&t!("pay.error", locale = &lang)), true)
                .await;
        };
        let Some(price) = plan.plan().price_uzs else {
            return self
                .user_bot
                .answer_callback(callback_id, Some(&t!("pay.error", locale = &lang)), true)
                .await;
        };

        self.user_bot.answer_callback(callback_id, None, false).await?;
        self.user_bot
            .edit_message_text(
                from.id,
                message_id,
                &t!("pay.select", locale = &lang, plan = plan, price = price),
                Some(&menu::provider_keyboard(plan)),
            )
            .await
    }

    /// SelectProvider → InvoiceSent. An unconfigured provider aborts back
    /// to the picker with an alert; no invoice is ever sent for it.
    async fn handle_provider_selected(
        &self,
        from: &UserRef,
        callback_id: &str,
        rest: &str,
    ) -> Result<()> {
        let guard = self.sessions.lock(from.id).await;
        let session = self.checked_session(from).await?;
        let lang = session.lang.clone();
        drop(guard);

        let Some((provider, plan_raw)) = rest.split_once('_') else {
            return self
                .user_bot
                .answer_callback(callback_id, Some(&t!("pay.error", locale = &lang)), true)
                .await;
        };
        let Ok(plan) = Tier::from_str(plan_raw) else {
            return self
                .user_bot
                .answer_callback(callback_id, Some(&t!("pay.error", locale = &lang)), true)
                .await;
        };

        if self.payments.provider_token(provider).is_none() {
            return self
                .user_bot
                .answer_callback(
                    callback_id,
                    Some(&t!("pay.unavailable", locale = &lang)),
                    true,
                )
                .await;
        }

        let invoice = match self.payments.build_invoice(
            &session,
            plan,
            provider,
            t!("pay.invoice_title", locale = &lang, plan = plan).into_owned(),
            t!("pay.invoice_desc", locale = &lang, plan = plan).into_owned(),
        ) {
            Ok(invoice) => invoice,
            Err(e) => {
                tracing::warn!(user_id = from.id, "invoice build rejected: {e}");
                return self
                    .user_bot
                    .answer_callback(callback_id, Some(&t!("pay.error", locale = &lang)), true)
                    .await;
            }
        };

        self.user_bot.answer_callback(callback_id, None, false).await?;
        if let Err(e) = self.user_bot.send_invoice(from.id, &invoice).await {
            tracing::warn!(user_id = from.id, "invoice send failed: {e:#}");
            return self
                .user_bot
                .send_message(from.id, &t!("pay.error", locale = &lang))
                .await;
        }
        Ok(())
    }

    /// PreCheckoutValidated — the last veto point before funds move.
    async fn handle_precheckout(&self, query_id: &str, payload: &str) -> Result<()> {
        let verdict = match self.payments.validate_precheckout(payload) {
            Ok(PaymentPayload { .. }) => Ok(()),
            Err(reason) => {
                tracing::warn!(payload, "precheckout vetoed: {reason}");
                Err(reason)
            }
        };
        self.user_bot.answer_precheckout(query_id, verdict).await
    }

    /// Completed: idempotent tier upgrade. A failure here surfaces to the
    /// user but never mutates the session.
    async fn handle_payment_success(&self, from: &UserRef, payload: &str) -> Result<()> {
        let guard = self.sessions.lock(from.id).await;
        let mut session = self.checked_session(from).await?;
        let lang = session.lang.clone();

        match self.payments.apply_success(&mut session, payload) {
            Ok(true) => {
                self.sessions.commit(&mut session).await?;
                drop(guard);
                self.user_bot
                    .send_message(
                        from.id,
                        &t!("pay.thanks", locale = &lang, tier = session.tier),
                    )
                    .await
            }
            Ok(false) => Ok(()),
            Err(e) => {
                drop(guard);
                tracing::warn!(user_id = from.id, payload, "payment success rejected: {e}");
                self.user_bot
                    .send_message(from.id, &t!("pay.error", locale = &lang))
                    .await
            }
        }
    }

    /// `fmt_<ext>` callback: render the last assistant output and ship it.
    async fn handle_export(
        &self,
        from: &UserRef,
        callback_id: &str,
        message_id: i64,
        format_raw: &str,
    ) -> Result<()> {
        let guard = self.sessions.lock(from.id).await;
        let session = self.checked_session(from).await?;
        let lang = session.lang.clone();
        drop(guard);

        self.user_bot.answer_callback(callback_id, None, false).await?;

        let Ok(format) = ExportFormat::from_str(format_raw) else {
            return Ok(());
        };

        let Some(content) = session.last_generated_text.as_deref() else {
            return self
                .user_bot
                .edit_message_text(
                    from.id,
                    message_id,
                    &t!("file.expired", locale = &lang),
                    None,
                )
                .await;
        };

        let body = export::export_body(content);
        let bytes = match self.renderer.render(format, body) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(user_id = from.id, "export render failed: {e:#}");
                return self
                    .user_bot
                    .send_message(from.id, &t!("file.error", locale = &lang))
                    .await;
            }
        };

        let file_name = export::export_file_name(format);
        self.user_bot
            .send_document(
                from.id,
                &file_name,
                bytes,
                Some(&t!("file.sent", locale = &lang)),
            )
            .await?;

        if let Err(e) = self.user_bot.delete_message(from.id, message_id).await {
            tracing::debug!(user_id = from.id, "failed to delete format picker: {e:#}");
        }
        Ok(())
    }
}
