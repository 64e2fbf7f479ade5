pub mod admin;
pub mod menu;
pub mod router;

use crate::approval::ApprovalGate;
use crate::config::Config;
use crate::conversation::ContextAssembler;
use crate::conversation::ingest::{DocumentExtractor, HtmlExtractor, PlainTextExtractor};
use crate::export::{DocumentRenderer, PlainTextRenderer};
use crate::payment::TierPaymentWorkflow;
use crate::providers::{ChatProvider, ImageProvider, OpenAiChatProvider, OpenAiImageProvider};
use crate::session::{SessionManager, SqliteSessionStore};
use crate::transport::runtime::{backoff_settings, spawn_supervised_listener};
use crate::transport::{InboundEvent, TelegramChannel, Transport};
use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::sync::Arc;

/// The assembled gateway: one user-facing bot, one admin bot, the policy
/// engines between them, and the AI collaborators behind trait seams.
pub struct Gateway {
    pub(crate) config: Config,
    pub(crate) sessions: Arc<SessionManager>,
    pub(crate) approval: ApprovalGate,
    pub(crate) payments: TierPaymentWorkflow,
    pub(crate) assembler: ContextAssembler,
    pub(crate) chat: Arc<dyn ChatProvider>,
    pub(crate) images: Arc<dyn ImageProvider>,
    pub(crate) extractors: Vec<Box<dyn DocumentExtractor>>,
    pub(crate) renderer: Box<dyn DocumentRenderer>,
    pub(crate) user_bot: Arc<dyn Transport>,
    pub(crate) admin_bot: Arc<dyn Transport>,
}

impl Gateway {
    /// Wire the production collaborators from config. Fails fast on an
    /// invalid config or an unreachable database.
    pub async fn from_config(config: Config) -> Result<Self> {
        config.validate()?;

        let db_path = config.resolved_database_path();
        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .with_context(|| format!("open gateway database at {}", db_path.display()))?;
        let store = Arc::new(SqliteSessionStore::new(pool).await?);

        let sessions = Arc::new(SessionManager::new(store.clone()));
        let approval = ApprovalGate::new(sessions.clone(), store);
        let payments = TierPaymentWorkflow::new(config.payments.configured_tokens());

        let chat = Arc::new(OpenAiChatProvider::new(&config.openai_api_key));
        let images = Arc::new(OpenAiImageProvider::new(&config.openai_api_key));

        let user_bot = Arc::new(TelegramChannel::new("user", config.bot_token.clone()));
        let admin_bot = Arc::new(TelegramChannel::new("admin", config.admin_bot_token.clone()));

        Ok(Self {
            sessions,
            approval,
            payments,
            assembler: ContextAssembler::new()?,
            chat,
            images,
            extractors: vec![Box::new(PlainTextExtractor), Box::new(HtmlExtractor)],
            renderer: Box::new(PlainTextRenderer),
            user_bot,
            admin_bot,
            config,
        })
    }

    /// Run both long-poll listeners and route events until shutdown. Each
    /// event is handled in its own task; per-user locks serialize handlers
    /// for the same user, and a failing handler never takes the process
    /// down with it.
    pub async fn run(self: Arc<Self>) -> Result<()> {
        let (initial_backoff, max_backoff) = backoff_settings(&self.config.reliability);

        let (user_tx, mut user_rx) = tokio::sync::mpsc::channel::<InboundEvent>(100);
        let (admin_tx, mut admin_rx) = tokio::sync::mpsc::channel::<InboundEvent>(100);

        let user_listener = spawn_supervised_listener(
            Arc::clone(&self.user_bot),
            user_tx,
            initial_backoff,
            max_backoff,
        );
        let admin_listener = spawn_supervised_listener(
            Arc::clone(&self.admin_bot),
            admin_tx,
            initial_backoff,
            max_backoff,
        );

        tracing::info!("gateway running");

        loop {
            tokio::select! {
                event = user_rx.recv() => {
                    let Some(event) = event else { break };
                    let gateway = Arc::clone(&self);
                    tokio::spawn(async move {
                        let user_id = event.from().id;
                        if let Err(e) = gateway.handle_user_event(event).await {
                            tracing::warn!(user_id, "user event handler failed: {e:#}");
                        }
                    });
                }
                event = admin_rx.recv() => {
                    let Some(event) = event else { break };
                    let gateway = Arc::clone(&self);
                    tokio::spawn(async move {
                        let admin_id = event.from().id;
                        if let Err(e) = gateway.handle_admin_event(event).await {
                            tracing::warn!(admin_id, "admin event handler failed: {e:#}");
                        }
                    });
                }
                else => break,
            }
        }

        user_listener.abort();
        admin_listener.abort();
        Ok(())
    }
}
