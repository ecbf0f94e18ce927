use super::types::{Conversation, Message};

/// Events the chat session sends up to the view.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    /// No current user; the view should show the sign-in screen.
    SignInRequired,
    SignedIn { user_id: String },
    ConversationsLoading,
    /// Full list snapshot. An empty list means "no conversations yet".
    ConversationsReady(Vec<Conversation>),
    ConversationsFailed,
    ThreadLoading { partner_id: String },
    PartnerNamed { partner_id: String, display_name: String },
    ThreadReady { partner_id: String, messages: Vec<Message> },
    ThreadFailed { partner_id: String },
    MessageAppended(Message),
    /// The last draft was sent; the input field can be emptied.
    DraftCleared,
    Notify(Notification),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Destructive,
}

/// A user-visible toast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub description: String,
    pub severity: Severity,
}

impl Notification {
    pub fn error(description: impl Into<String>) -> Self {
        Self {
            title: "Error".to_string(),
            description: description.into(),
            severity: Severity::Destructive,
        }
    }

    pub fn info(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            severity: Severity::Info,
        }
    }
}
