pub mod context;
pub mod ingest;

use crate::session::{ConversationMode, PHOTO_MEMORY_TURNS, UserSession};

pub use context::ContextAssembler;

/// Photo arrival: remember the reference and restart the memory window.
/// Quota is checked by the caller before the photo is stored.
pub fn note_photo(session: &mut UserSession, file_id: impl Into<String>) {
    session.attached_photos.push(file_id.into());
    session.photo_turn_counter = 0;
}

/// Advance the photo memory window by one chat turn. When the window is
/// exhausted the attached photos and the counter are cleared together;
/// returns true so the caller can emit the auto-clear notice.
pub fn advance_photo_window(session: &mut UserSession) -> bool {
    if session.attached_photos.is_empty() {
        return false;
    }

    session.photo_turn_counter += 1;
    if session.photo_turn_counter >= PHOTO_MEMORY_TURNS {
        session.attached_photos.clear();
        session.photo_turn_counter = 0;
        return true;
    }

    false
}

/// Drop photo context entirely. Document arrival supersedes photo context.
pub fn clear_photo_context(session: &mut UserSession) {
    session.attached_photos.clear();
    session.photo_turn_counter = 0;
}

/// Enter image-generation mode. The caller has already verified that
/// image-generation quota remains.
pub fn enter_image_mode(session: &mut UserSession) {
    session.pending_mode = ConversationMode::AwaitingImagePrompt;
}

/// If the session is awaiting an image prompt, consume the mode and return
/// true. The mode is cleared *before* any generation attempt, so a failed
/// generation does not re-trigger on the next message; the user re-enters
/// the mode explicitly to retry.
pub fn take_image_prompt(session: &mut UserSession) -> bool {
    if session.pending_mode == ConversationMode::AwaitingImagePrompt {
        session.pending_mode = ConversationMode::Idle;
        return true;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::{
        advance_photo_window, clear_photo_context, enter_image_mode, note_photo,
        take_image_prompt,
    };
    use crate::session::{ConversationMode, UserSession};

    fn session() -> UserSession {
        UserSession::new(42, "Ada", "2024-06")
    }

    #[test]
    fn note_photo_restarts_window() {
        let mut session = session();
        session.photo_turn_counter = 3;

        note_photo(&mut session, "file-1");

        assert_eq!(session.attached_photos, vec!["file-1".to_string()]);
        assert_eq!(session.photo_turn_counter, 0);
    }

    #[test]
    fn window_clears_after_five_turns() {
        let mut session = session();
        note_photo(&mut session, "file-1");

        for _ in 0..4 {
            assert!(!advance_photo_window(&mut session));
        }
        assert!(advance_photo_window(&mut session));

        assert!(session.attached_photos.is_empty());
        assert_eq!(session.photo_turn_counter, 0);
    }

    #[test]
    fn window_does_not_tick_without_photos() {
        let mut session = session();
        for _ in 0..10 {
            assert!(!advance_photo_window(&mut session));
        }
        assert_eq!(session.photo_turn_counter, 0);
    }

    #[test]
    fn new_photo_mid_window_restarts_count() {
        let mut session = session();
        note_photo(&mut session, "file-1");
        advance_photo_window(&mut session);
        advance_photo_window(&mut session);

        note_photo(&mut session, "file-2");
        assert_eq!(session.photo_turn_counter, 0);
        assert_eq!(session.attached_photos.len(), 2);
    }

    #[test]
    fn clear_photo_context_drops_both_fields() {
        let mut session = session();
        note_photo(&mut session, "file-1");
        session.photo_turn_counter = 2;

        clear_photo_context(&mut session);

        assert!(session.attached_photos.is_empty());
        assert_eq!(session.photo_turn_counter, 0);
    }

    #[test]
    fn image_prompt_is_consumed_at_most_once() {
        let mut session = session();
        enter_image_mode(&mut session);
        assert_eq!(session.pending_mode, ConversationMode::AwaitingImagePrompt);

        assert!(take_image_prompt(&mut session));
        assert_eq!(session.pending_mode, ConversationMode::Idle);

        // A second message after a failed generation is a normal chat turn.
        assert!(!take_image_prompt(&mut session));
    }
}
