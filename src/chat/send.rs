use crate::backend::Backend;
use crate::common::{Message, NewMessage};
use crate::error::ChatError;

/// Draft text of the open thread and the path that turns it into a row.
///
/// The draft is only emptied once the backend has accepted the insert, so a
/// failed send leaves it in place for a retry.
#[derive(Debug, Default, Clone)]
pub struct Composer {
    draft: String,
}

impl Composer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn draft(&self) -> &str {
        &self.draft
    }

    pub fn set_draft(&mut self, draft: impl Into<String>) {
        self.draft = draft.into();
    }

    /// Validates the draft into an insert payload without touching it.
    pub fn prepare(
        &self,
        sender_id: Option<&str>,
        receiver_id: Option<&str>,
    ) -> Result<NewMessage, ChatError> {
        let content = self.draft.trim();
        if content.is_empty() {
            return Err(ChatError::ValidationRejected("message is empty"));
        }
        let sender_id = sender_id.ok_or(ChatError::ValidationRejected("no signed-in user"))?;
        let receiver_id = receiver_id.ok_or(ChatError::ValidationRejected("no open thread"))?;

        Ok(NewMessage {
            sender_id: sender_id.to_string(),
            receiver_id: receiver_id.to_string(),
            content: content.to_string(),
        })
    }

    /// Inserts the draft. The stored row reaches the thread through the
    /// insert feed, not through this return value.
    pub async fn send<B: Backend>(
        &mut self,
        backend: &B,
        sender_id: Option<&str>,
        receiver_id: Option<&str>,
    ) -> Result<Message, ChatError> {
        let payload = self.prepare(sender_id, receiver_id)?;
        let stored = backend.insert_message(payload).await?;
        log::info!("Sent message {} to {}", stored.id, stored.receiver_id);
        self.draft.clear();
        Ok(stored)
    }
}
