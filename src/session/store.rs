use super::types::{AdminSession, ApprovalStatus, ChatTurn, ConversationMode, UserSession};
use crate::tiers::Tier;
use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqliteRow};
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;

/// Async persistence contract for per-user session records.
///
/// `compare_and_swap` is the only write path handlers use after creation, so
/// quota check-and-increment cycles are atomic rather than racy
/// read-modify-write sequences.
pub trait SessionStore: Send + Sync {
    fn get<'a>(
        &'a self,
        user_id: i64,
    ) -> Pin<Box<dyn Future<Output = Result<Option<UserSession>>> + Send + 'a>>;

    /// Insert a brand-new record. Returns false if the user already exists.
    fn insert<'a>(
        &'a self,
        session: &'a UserSession,
    ) -> Pin<Box<dyn Future<Output = Result<bool>> + Send + 'a>>;

    /// Persist `session` iff the stored version still equals
    /// `session.version`. Returns true on success (caller bumps the local
    /// version), false when the row was concurrently modified.
    fn compare_and_swap<'a>(
        &'a self,
        session: &'a UserSession,
    ) -> Pin<Box<dyn Future<Output = Result<bool>> + Send + 'a>>;
}

/// Async persistence contract for admin records.
pub trait AdminStore: Send + Sync {
    fn get<'a>(
        &'a self,
        admin_id: i64,
    ) -> Pin<Box<dyn Future<Output = Result<Option<AdminSession>>> + Send + 'a>>;

    fn upsert<'a>(
        &'a self,
        admin: &'a AdminSession,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

    fn list<'a>(&'a self) -> Pin<Box<dyn Future<Output = Result<Vec<AdminSession>>> + Send + 'a>>;
}

const SCHEMA_META_TABLE: &str = "
CREATE TABLE IF NOT EXISTS gateway_schema_meta (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
)";
const SCHEMA_VERSION_KEY: &str = "gateway_schema_version";
const SCHEMA_VERSION: u32 = 1;

async fn ensure_schema_version(pool: &SqlitePool) -> Result<()> {
    sqlx::query(SCHEMA_META_TABLE)
        .execute(pool)
        .await
        .context("create gateway_schema_meta table")?;

    let stored_version: Option<(String,)> =
        sqlx::query_as("SELECT value FROM gateway_schema_meta WHERE key = $1")
            .bind(SCHEMA_VERSION_KEY)
            .fetch_optional(pool)
            .await
            .context("load gateway schema version")?;

    if let Some((value,)) = stored_version {
        let parsed = value
            .parse::<u32>()
            .with_context(|| format!("invalid gateway schema version value: {value}"))?;
        anyhow::ensure!(
            parsed == SCHEMA_VERSION,
            "incompatible gateway schema version: stored={parsed}, expected={SCHEMA_VERSION}. \
remove the gateway DB and restart."
        );
        return Ok(());
    }

    sqlx::query("INSERT INTO gateway_schema_meta (key, value) VALUES ($1, $2)")
        .bind(SCHEMA_VERSION_KEY)
        .bind(SCHEMA_VERSION.to_string())
        .execute(pool)
        .await
        .context("persist gateway schema version")?;

    Ok(())
}

/// SQLite-backed store for user and admin sessions using an sqlx async pool.
pub struct SqliteSessionStore {
    pool: SqlitePool,
}

impl SqliteSessionStore {
    /// Create a new store with an existing pool and run migrations.
    pub async fn new(pool: SqlitePool) -> Result<Self> {
        sqlx::query("PRAGMA foreign_keys = ON;")
            .execute(&pool)
            .await?;

        ensure_schema_version(&pool).await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS users (
                 user_id INTEGER PRIMARY KEY,
                 name TEXT NOT NULL,
                 approval TEXT NOT NULL,
                 tier TEXT NOT NULL,
                 lang TEXT NOT NULL,
                 messages_used INTEGER NOT NULL DEFAULT 0,
                 photos_used INTEGER NOT NULL DEFAULT 0,
                 images_generated INTEGER NOT NULL DEFAULT 0,
                 last_active_month TEXT NOT NULL,
                 history TEXT NOT NULL,
                 attached_photos TEXT NOT NULL,
                 photo_turn_counter INTEGER NOT NULL DEFAULT 0,
                 pending_mode TEXT NOT NULL,
                 last_generated_text TEXT,
                 phone TEXT,
                 version INTEGER NOT NULL DEFAULT 0,
                 created_at TEXT NOT NULL,
                 updated_at TEXT NOT NULL
             )",
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS admins (
                 admin_id INTEGER PRIMARY KEY,
                 name TEXT NOT NULL,
                 created_at TEXT NOT NULL
             )",
        )
        .execute(&pool)
        .await?;

        Ok(Self { pool })
    }

    /// Access the underlying pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn map_user_row(row: &SqliteRow) -> Result<UserSession> {
    let approval_raw: String = row.try_get("approval")?;
    let tier_raw: String = row.try_get("tier")?;
    let mode_raw: String = row.try_get("pending_mode")?;
    let history_raw: String = row.try_get("history")?;
    let photos_raw: String = row.try_get("attached_photos")?;

    let history: Vec<ChatTurn> =
        serde_json::from_str(&history_raw).context("deserialize conversation history")?;
    let attached_photos: Vec<String> =
        serde_json::from_str(&photos_raw).context("deserialize attached photos")?;

    let messages_used: i64 = row.try_get("messages_used")?;
    let photos_used: i64 = row.try_get("photos_used")?;
    let images_generated: i64 = row.try_get("images_generated")?;
    let photo_turn_counter: i64 = row.try_get("photo_turn_counter")?;

    Ok(UserSession {
        user_id: row.try_get("user_id")?,
        name: row.try_get("name")?,
        approval: ApprovalStatus::from_str(&approval_raw)
            .with_context(|| format!("unknown approval status: {approval_raw}"))?,
        tier: Tier::from_str(&tier_raw).with_context(|| format!("unknown tier: {tier_raw}"))?,
        lang: row.try_get("lang")?,
        messages_used: u32::try_from(messages_used).context("messages_used out of range")?,
        photos_used: u32::try_from(photos_used).context("photos_used out of range")?,
        images_generated: u32::try_from(images_generated)
            .context("images_generated out of range")?,
        last_active_month: row.try_get("last_active_month")?,
        history,
        attached_photos,
        photo_turn_counter: u32::try_from(photo_turn_counter)
            .context("photo_turn_counter out of range")?,
        pending_mode: ConversationMode::from_str(&mode_raw)
            .with_context(|| format!("unknown pending mode: {mode_raw}"))?,
        last_generated_text: row.try_get("last_generated_text")?,
        phone: row.try_get("phone")?,
        version: row.try_get("version")?,
    })
}

impl SessionStore for SqliteSessionStore {
    fn get<'a>(
        &'a self,
        user_id: i64,
    ) -> Pin<Box<dyn Future<Output = Result<Option<UserSession>>> + Send + 'a>> {
        Box::pin(async move {
            let row = sqlx::query("SELECT * FROM users WHERE user_id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await
                .context("query user session")?;

            row.map(|r| map_user_row(&r)).transpose()
        })
    }

    fn insert<'a>(
        &'a self,
        session: &'a UserSession,
    ) -> Pin<Box<dyn Future<Output = Result<bool>> + Send + 'a>> {
        Box::pin(async move {
            let timestamp = Utc::now().to_rfc3339();
            let history = serde_json::to_string(&session.history)?;
            let photos = serde_json::to_string(&session.attached_photos)?;

            let result = sqlx::query(
                "INSERT OR IGNORE INTO users (
                     user_id, name, approval, tier, lang,
                     messages_used, photos_used, images_generated,
                     last_active_month, history, attached_photos,
                     photo_turn_counter, pending_mode, last_generated_text,
                     phone, version, created_at, updated_at
                 ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, 0, $16, $16)",
            )
            .bind(session.user_id)
            .bind(&session.name)
            .bind(session.approval.to_string())
            .bind(session.tier.to_string())
            .bind(&session.lang)
            .bind(i64::from(session.messages_used))
            .bind(i64::from(session.photos_used))
            .bind(i64::from(session.images_generated))
            .bind(&session.last_active_month)
            .bind(&history)
            .bind(&photos)
            .bind(i64::from(session.photo_turn_counter))
            .bind(session.pending_mode.to_string())
            .bind(&session.last_generated_text)
            .bind(&session.phone)
            .bind(&timestamp)
            .execute(&self.pool)
            .await
            .context("insert user session")?;

            Ok(result.rows_affected() > 0)
        })
    }

    fn compare_and_swap<'a>(
        &'a self,
        session: &'a UserSession,
    ) -> Pin<Box<dyn Future<Output = Result<bool>> + Send + 'a>> {
        Box::pin(async move {
            let timestamp = Utc::now().to_rfc3339();
            let history = serde_json::to_string(&session.history)?;
            let photos = serde_json::to_string(&session.attached_photos)?;

            let result = sqlx::query(
                "UPDATE users SET
                     name = $1, approval = $2, tier = $3, lang = $4,
                     messages_used = $5, photos_used = $6, images_generated = $7,
                     last_active_month = $8, history = $9, attached_photos = $10,
                     photo_turn_counter = $11, pending_mode = $12,
                     last_generated_text = $13, phone = $14,
                     version = version + 1, updated_at = $15
                 WHERE user_id = $16 AND version = $17",
            )
            .bind(&session.name)
            .bind(session.approval.to_string())
            .bind(session.tier.to_string())
            .bind(&session.lang)
            .bind(i64::from(session.messages_used))
            .bind(i64::from(session.photos_used))
            .bind(i64::from(session.images_generated))
            .bind(&session.last_active_month)
            .bind(&history)
            .bind(&photos)
            .bind(i64::from(session.photo_turn_counter))
            .bind(session.pending_mode.to_string())
            .bind(&session.last_generated_text)
            .bind(&session.phone)
            .bind(&timestamp)
            .bind(session.user_id)
            .bind(session.version)
            .execute(&self.pool)
            .await
            .context("compare-and-swap user session")?;

            Ok(result.rows_affected() > 0)
        })
    }
}

impl AdminStore for SqliteSessionStore {
    fn get<'a>(
        &'a self,
        admin_id: i64,
    ) -> Pin<Box<dyn Future<Output = Result<Option<AdminSession>>> + Send + 'a>> {
        Box::pin(async move {
            let row = sqlx::query("SELECT admin_id, name FROM admins WHERE admin_id = $1")
                .bind(admin_id)
                .fetch_optional(&self.pool)
                .await
                .context("query admin session")?;

            row.map(|r| {
                Ok(AdminSession {
                    admin_id: r.try_get("admin_id")?,
                    name: r.try_get("name")?,
                })
            })
            .transpose()
        })
    }

    fn upsert<'a>(
        &'a self,
        admin: &'a AdminSession,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            let timestamp = Utc::now().to_rfc3339();
            sqlx::query(
                "INSERT INTO admins (admin_id, name, created_at) VALUES ($1, $2, $3)
                 ON CONFLICT(admin_id) DO UPDATE SET name = excluded.name",
            )
            .bind(admin.admin_id)
            .bind(&admin.name)
            .bind(&timestamp)
            .execute(&self.pool)
            .await
            .context("upsert admin session")?;
            Ok(())
        })
    }

    fn list<'a>(&'a self) -> Pin<Box<dyn Future<Output = Result<Vec<AdminSession>>> + Send + 'a>> {
        Box::pin(async move {
            let rows = sqlx::query("SELECT admin_id, name FROM admins ORDER BY admin_id")
                .fetch_all(&self.pool)
                .await
                .context("list admin sessions")?;

            rows.iter()
                .map(|r| {
                    Ok(AdminSession {
                        admin_id: r.try_get("admin_id")?,
                        name: r.try_get("name")?,
                    })
                })
                .collect()
        })
    }
}
