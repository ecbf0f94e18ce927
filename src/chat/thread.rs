use std::collections::HashSet;

use crate::backend::{Backend, MessageFilter, SortOrder};
use crate::common::Message;
use crate::error::ChatError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadStatus {
    Loading,
    Ready,
    Failed,
}

/// Fetches the pair's history, oldest first.
pub async fn fetch_thread<B: Backend>(
    backend: &B,
    user_id: &str,
    partner_id: &str,
) -> Result<Vec<Message>, ChatError> {
    let mut messages = backend
        .query_messages(&between(user_id, partner_id), SortOrder::Ascending)
        .await?;
    // Adapters already order rows; re-sorting pins the id tiebreak.
    SortOrder::Ascending.sort(&mut messages);
    Ok(messages)
}

/// Marks everything `partner_id` sent to `user_id` as read, in one update.
pub async fn mark_thread_read<B: Backend>(
    backend: &B,
    user_id: &str,
    partner_id: &str,
) -> Result<(), ChatError> {
    backend
        .mark_read(&MessageFilter::UnreadFrom {
            sender_id: partner_id.to_string(),
            receiver_id: user_id.to_string(),
        })
        .await?;
    Ok(())
}

/// Fetches the thread and then marks it read. The returned rows are the
/// ones fetched; a failed read update is only logged.
pub async fn load_thread<B: Backend>(
    backend: &B,
    user_id: &str,
    partner_id: &str,
) -> Result<Vec<Message>, ChatError> {
    let messages = fetch_thread(backend, user_id, partner_id).await?;
    if let Err(err) = mark_thread_read(backend, user_id, partner_id).await {
        log::warn!("Could not mark messages from {partner_id} as read: {err}");
    }
    Ok(messages)
}

fn between(user_id: &str, partner_id: &str) -> MessageFilter {
    MessageFilter::Between {
        a: user_id.to_string(),
        b: partner_id.to_string(),
    }
}

/// Ordered message log of one (user, partner) pair.
#[derive(Debug, Clone)]
pub struct MessageThread {
    user_id: String,
    partner_id: String,
    filter: MessageFilter,
    messages: Vec<Message>,
    ids: HashSet<String>,
    status: ThreadStatus,
}

impl MessageThread {
    pub fn new(user_id: impl Into<String>, partner_id: impl Into<String>) -> Self {
        let user_id = user_id.into();
        let partner_id = partner_id.into();
        Self {
            filter: between(&user_id, &partner_id),
            user_id,
            partner_id,
            messages: Vec::new(),
            ids: HashSet::new(),
            status: ThreadStatus::Loading,
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn partner_id(&self) -> &str {
        &self.partner_id
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn status(&self) -> ThreadStatus {
        self.status
    }

    /// Loads the history into this thread; see [`load_thread`].
    pub async fn load<B: Backend>(&mut self, backend: &B) -> Result<(), ChatError> {
        match load_thread(backend, &self.user_id, &self.partner_id).await {
            Ok(messages) => {
                self.apply_loaded(messages);
                Ok(())
            }
            Err(err) => {
                self.apply_failure();
                Err(err)
            }
        }
    }

    /// Installs a fetched history. Live messages merged while the fetch was
    /// in flight and missing from it are kept after the history; their ids
    /// are returned.
    pub fn apply_loaded(&mut self, loaded: Vec<Message>) -> Vec<String> {
        let loaded_ids: HashSet<String> = loaded.iter().map(|m| m.id.clone()).collect();
        let arrived_meanwhile: Vec<Message> = self
            .messages
            .drain(..)
            .filter(|m| !loaded_ids.contains(&m.id))
            .collect();

        let kept = arrived_meanwhile.iter().map(|m| m.id.clone()).collect();
        self.messages = loaded;
        self.messages.extend(arrived_meanwhile);
        self.ids = self.messages.iter().map(|m| m.id.clone()).collect();
        self.status = ThreadStatus::Ready;
        kept
    }

    /// Ids of messages from the partner that are still unread here.
    pub fn incoming_unread_ids(&self) -> Vec<String> {
        self.messages
            .iter()
            .filter(|m| self.is_incoming_unread(m))
            .map(|m| m.id.clone())
            .collect()
    }

    /// A failed load shows nothing rather than partial data.
    pub fn apply_failure(&mut self) {
        self.messages.clear();
        self.ids.clear();
        self.status = ThreadStatus::Failed;
    }

    /// Appends a pushed insert if it belongs to this pair and is new.
    pub fn merge_live(&mut self, message: Message) -> bool {
        if self.status == ThreadStatus::Failed {
            return false;
        }
        if !self.filter.matches(&message) {
            log::debug!("Live message {} is for another thread", message.id);
            return false;
        }
        if !self.ids.insert(message.id.clone()) {
            return false;
        }
        self.messages.push(message);
        true
    }

    /// Local mirror of a successful read update on `message_id`.
    pub fn mark_read_locally(&mut self, message_id: &str) {
        if let Some(message) = self.messages.iter_mut().find(|m| m.id == message_id) {
            message.mark_read();
        }
    }

    pub fn is_incoming_unread(&self, message: &Message) -> bool {
        message.is_unread_from(&self.partner_id, &self.user_id)
    }
}
