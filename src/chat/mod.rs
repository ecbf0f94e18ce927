//! Chat core: conversation list, message thread, send path and the session
//! loop that drives them for the view.

pub mod conversations;
pub mod profiles;
pub mod send;
pub mod session;
pub mod thread;

pub use conversations::{ConversationList, LiveUpdate, aggregate, load_conversations};
pub use profiles::{DEFAULT_PLACEHOLDER_NAME, ProfileDirectory};
pub use send::Composer;
pub use session::{ChatSession, SessionOptions};
pub use thread::{MessageThread, ThreadStatus, fetch_thread, load_thread, mark_thread_read};
