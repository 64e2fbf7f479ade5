pub mod manager;
pub mod store;
pub mod types;

pub use manager::SessionManager;
pub use store::{AdminStore, SessionStore, SqliteSessionStore};
pub use types::{
    AdminSession, ApprovalStatus, ChatTurn, ConversationMode, HISTORY_LIMIT, PHOTO_MEMORY_TURNS,
    TurnRole, UserSession,
};
