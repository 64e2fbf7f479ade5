use super::Gateway;
use super::menu;
use crate::approval::{AdminAction, parse_decision_callback};
use crate::transport::{InboundEvent, UserRef};
use anyhow::Result;

impl Gateway {
    pub(crate) async fn handle_admin_event(&self, event: InboundEvent) -> Result<()> {
        match event {
            InboundEvent::Text { from, text } => self.handle_admin_text(&from, &text).await,
            InboundEvent::Callback {
                from,
                callback_id,
                message_id,
                data,
            } => {
                self.handle_admin_callback(&from, &callback_id, message_id, &data)
                    .await
            }
            _ => Ok(()),
        }
    }

    async fn handle_admin_text(&self, from: &UserRef, text: &str) -> Result<()> {
        let Some(rest) = text.strip_prefix("/login") else {
            return Ok(());
        };
        let attempt = rest.split_whitespace().next().unwrap_or("");

        let logged_in = self
            .approval
            .admin_login(
                from.id,
                &from.first_name,
                attempt,
                &self.config.admin_password,
            )
            .await?;

        let reply = if logged_in {
            t!("admin.logged_in")
        } else {
            t!("admin.bad_password")
        };
        self.admin_bot.send_message(from.id, &reply).await
    }

    async fn handle_admin_callback(
        &self,
        from: &UserRef,
        callback_id: &str,
        message_id: i64,
        data: &str,
    ) -> Result<()> {
        self.admin_bot
            .answer_callback(callback_id, None, false)
            .await?;

        let Some((action, target_id)) = parse_decision_callback(data) else {
            tracing::debug!(admin_id = from.id, data, "ignoring unknown admin callback");
            return Ok(());
        };

        let Some(outcome) = self.approval.apply_admin_decision(action, target_id).await? else {
            return self
                .admin_bot
                .edit_message_text(from.id, message_id, &t!("admin.unknown_user"), None)
                .await;
        };

        // Decision re-deliveries keep the admin message fresh but do not
        // re-notify the user.
        if outcome.changed {
            let lang = outcome.session.lang.clone();
            let notify = match action {
                AdminAction::Allow => {
                    self.user_bot
                        .send_message_with_keyboard(
                            target_id,
                            &t!("chat.approved", locale = &lang),
                            &menu::main_keyboard(&lang),
                        )
                        .await
                }
                AdminAction::Deny => {
                    self.user_bot
                        .send_message(target_id, &t!("chat.declined", locale = &lang))
                        .await
                }
                AdminAction::Block => {
                    self.user_bot
                        .send_message(target_id, &t!("chat.blocked", locale = &lang))
                        .await
                }
            };
            if let Err(e) = notify {
                tracing::warn!(target_id, "failed to notify user of decision: {e:#}");
            }
        }

        let summary = match action {
            AdminAction::Allow => t!("admin.allowed", name = outcome.session.name),
            AdminAction::Deny => t!("admin.denied", name = outcome.session.name),
            AdminAction::Block => t!("admin.blocked", name = outcome.session.name),
        };
        self.admin_bot
            .edit_message_text(from.id, message_id, &summary, None)
            .await
    }
}
