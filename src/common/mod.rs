pub mod commands;
pub mod events;
pub mod types;

pub use commands::ChatCommand;
pub use events::{ChatEvent, Notification, Severity};
pub use types::{Conversation, Message, NewMessage, Profile};
