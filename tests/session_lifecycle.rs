use altaira::payment::TierPaymentWorkflow;
use altaira::quota::{self, QuotaResource};
use altaira::session::{ChatTurn, SessionManager, SessionStore, SqliteSessionStore};
use altaira::tiers::Tier;
use sqlx::sqlite::SqlitePoolOptions;
use std::sync::Arc;

async fn manager() -> (Arc<SessionManager>, Arc<SqliteSessionStore>) {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    let store = Arc::new(SqliteSessionStore::new(pool).await.unwrap());
    (Arc::new(SessionManager::new(store.clone())), store)
}

#[tokio::test]
async fn monthly_rollover_persists_exactly_once() {
    let (manager, store) = manager().await;

    {
        let _guard = manager.lock(42).await;
        let mut session = manager.load_or_create(42, "Ada", "2024-05").await.unwrap();
        session.messages_used = 120;
        session.photos_used = 9;
        session.images_generated = 4;
        manager.commit(&mut session).await.unwrap();
    }

    // First event of the new month rolls the window once.
    {
        let _guard = manager.lock(42).await;
        let mut session = SessionStore::get(store.as_ref(), 42)
            .await
            .unwrap()
            .unwrap();
        assert!(quota::ensure_current_period(&mut session, "2024-06"));
        manager.commit(&mut session).await.unwrap();
    }

    // A second check in the same month is a no-op.
    {
        let _guard = manager.lock(42).await;
        let mut session = SessionStore::get(store.as_ref(), 42)
            .await
            .unwrap()
            .unwrap();
        quota::charge(&mut session, QuotaResource::Messages);
        assert!(!quota::ensure_current_period(&mut session, "2024-06"));
        manager.commit(&mut session).await.unwrap();
    }

    let session = SessionStore::get(store.as_ref(), 42)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(session.messages_used, 1);
    assert_eq!(session.photos_used, 0);
    assert_eq!(session.images_generated, 0);
    assert_eq!(session.last_active_month, "2024-06");
}

#[tokio::test]
async fn history_bound_survives_persistence() {
    let (manager, store) = manager().await;

    {
        let _guard = manager.lock(42).await;
        let mut session = manager.load_or_create(42, "Ada", "2024-06").await.unwrap();
        for i in 0..20 {
            session.push_turn(ChatTurn::user(format!("turn {i}")));
        }
        manager.commit(&mut session).await.unwrap();
    }

    let session = SessionStore::get(store.as_ref(), 42)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(session.history.len(), 15);
    assert_eq!(session.history.first().unwrap().content, "turn 5");
    assert_eq!(session.history.last().unwrap().content, "turn 19");
}

#[tokio::test]
async fn duplicate_payment_success_upgrades_once() {
    let (manager, store) = manager().await;
    let workflow = TierPaymentWorkflow::new(vec![("click".into(), "token".into())]);

    {
        let _guard = manager.lock(42).await;
        let mut session = manager.load_or_create(42, "Ada", "2024-06").await.unwrap();

        assert!(workflow.apply_success(&mut session, "42_Pro").unwrap());
        manager.commit(&mut session).await.unwrap();
    }

    // Re-delivery of the same notification changes nothing, so no commit
    // happens and the stored version stays put.
    let before = SessionStore::get(store.as_ref(), 42)
        .await
        .unwrap()
        .unwrap();
    {
        let _guard = manager.lock(42).await;
        let mut session = before.clone();
        assert!(!workflow.apply_success(&mut session, "42_Pro").unwrap());
        assert_eq!(session, before);
    }

    let after = SessionStore::get(store.as_ref(), 42)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(after.tier, Tier::Pro);
    assert_eq!(after.version, before.version);
}
