use super::store::SessionStore;
use super::types::UserSession;
use crate::error::SessionError;
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Per-user exclusive access over a shared `SessionStore`.
///
/// Every read-modify-persist cycle for a user must run while holding that
/// user's guard. Slow collaborator calls (AI completions, payment round
/// trips) happen *between* two guarded sections: compute under the lock,
/// release, await the collaborator, re-acquire to commit.
pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    locks: Mutex<HashMap<i64, Arc<Mutex<()>>>>,
}

impl SessionManager {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self {
            store,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Acquire the exclusive guard for one user. Guards for different users
    /// are independent; events for the same user serialize here.
    pub async fn lock(&self, user_id: i64) -> OwnedMutexGuard<()> {
        let user_lock = {
            let mut locks = self.locks.lock().await;
            Arc::clone(locks.entry(user_id).or_default())
        };
        user_lock.lock_owned().await
    }

    /// Load a session, creating the default record on first sight.
    /// Must be called with the user's guard held.
    pub async fn load_or_create(
        &self,
        user_id: i64,
        name: &str,
        current_month: &str,
    ) -> Result<UserSession> {
        if let Some(session) = self.store.get(user_id).await? {
            return Ok(session);
        }

        let session = UserSession::new(user_id, name, current_month);
        self.store
            .insert(&session)
            .await
            .context("create default user session")?;
        tracing::info!(user_id, "created new user session");

        // Re-read so a racing insert from another process yields one record.
        self.store
            .get(user_id)
            .await?
            .ok_or_else(|| SessionError::NotFound(user_id).into())
    }

    /// Persist through compare-and-swap and bump the in-memory version.
    /// Must be called with the user's guard held.
    pub async fn commit(&self, session: &mut UserSession) -> Result<()> {
        if self.store.compare_and_swap(session).await? {
            session.version += 1;
            return Ok(());
        }

        Err(SessionError::StaleWrite {
            user_id: session.user_id,
            version: session.version,
        }
        .into())
    }

    /// Access the underlying store.
    pub fn store(&self) -> &dyn SessionStore {
        self.store.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::SessionManager;
    use crate::session::store::SqliteSessionStore;
    use sqlx::sqlite::SqlitePoolOptions;
    use std::sync::Arc;

    async fn manager() -> SessionManager {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let store = Arc::new(SqliteSessionStore::new(pool).await.unwrap());
        SessionManager::new(store)
    }

    #[tokio::test]
    async fn load_or_create_is_idempotent() {
        let manager = manager().await;
        let _guard = manager.lock(42).await;

        let first = manager.load_or_create(42, "Ada", "2024-06").await.unwrap();
        let second = manager.load_or_create(42, "Ada", "2024-06").await.unwrap();

        assert_eq!(first.user_id, second.user_id);
        assert_eq!(first.version, second.version);
    }

    #[tokio::test]
    async fn commit_bumps_local_version() {
        let manager = manager().await;
        let _guard = manager.lock(42).await;
        let mut session = manager.load_or_create(42, "Ada", "2024-06").await.unwrap();

        session.messages_used = 5;
        manager.commit(&mut session).await.unwrap();
        assert_eq!(session.version, 1);

        session.messages_used = 6;
        manager.commit(&mut session).await.unwrap();
        assert_eq!(session.version, 2);
    }

    #[tokio::test]
    async fn stale_commit_is_rejected() {
        let manager = manager().await;
        let _guard = manager.lock(42).await;
        let session = manager.load_or_create(42, "Ada", "2024-06").await.unwrap();

        let mut current = session.clone();
        let mut stale = session;

        current.messages_used = 1;
        manager.commit(&mut current).await.unwrap();

        stale.messages_used = 9;
        assert!(manager.commit(&mut stale).await.is_err());
    }

    #[tokio::test]
    async fn locks_serialize_same_user() {
        let manager = Arc::new(manager().await);

        let guard = manager.lock(42).await;
        let contender = {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move {
                let _guard = manager.lock(42).await;
            })
        };

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(guard);
        contender.await.unwrap();
    }

    #[tokio::test]
    async fn locks_are_independent_across_users() {
        let manager = manager().await;
        let _a = manager.lock(1).await;
        let _b = manager.lock(2).await;
    }
}
