pub mod runtime;
pub mod telegram;
pub mod traits;

pub use telegram::TelegramChannel;
pub use traits::{InboundEvent, Keyboard, Transport, UserRef};
