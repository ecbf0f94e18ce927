/// Commands the view sends down to the chat session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    /// Show the conversation list of the signed-in user.
    OpenConversations,
    /// Show the thread with `partner_id`.
    OpenThread { partner_id: String },
    /// Submit the current draft to the open thread.
    /// The draft stays in the view until the session answers with `DraftCleared`.
    SendMessage { draft: String },
    /// Leave the current view and drop its live subscription.
    CloseView,
}
