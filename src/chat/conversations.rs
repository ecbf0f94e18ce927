//! Per-partner conversation summaries derived from the flat message list.

use std::collections::{HashMap, HashSet};

use super::profiles::ProfileDirectory;
use crate::backend::{Backend, MessageFilter, SortOrder};
use crate::common::{Conversation, Message};
use crate::error::ChatError;

/// Result of feeding one live insert into a [`ConversationList`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiveUpdate {
    /// Not addressed to or from the user, or already counted.
    Ignored,
    Updated,
    /// First message with this partner; the entry carries the placeholder
    /// name until [`ConversationList::set_display_name`] is called.
    NewPartner(String),
}

/// Counterparts of `user_id` ordered by recency of their latest message.
pub fn partners_by_recency(messages: &[Message], user_id: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    newest_first(messages, user_id)
        .into_iter()
        .map(|message| message.counterpart_of(user_id))
        .filter(|partner| seen.insert(*partner))
        .map(str::to_string)
        .collect()
}

/// Groups `messages` into one conversation per counterpart.
///
/// The first message seen per counterpart in newest-first order becomes the
/// summary's last message; unread counts cover the whole set.
pub fn aggregate(
    messages: &[Message],
    user_id: &str,
    names: &HashMap<String, String>,
    placeholder: &str,
) -> Vec<Conversation> {
    let mut unread: HashMap<&str, usize> = HashMap::new();
    for message in messages {
        if message.receiver_id == user_id && !message.read {
            *unread.entry(message.sender_id.as_str()).or_default() += 1;
        }
    }

    let mut seen = HashSet::new();
    let mut conversations = Vec::new();
    for message in newest_first(messages, user_id) {
        let partner = message.counterpart_of(user_id);
        if !seen.insert(partner) {
            continue;
        }
        conversations.push(Conversation {
            partner_id: partner.to_string(),
            partner_display_name: names
                .get(partner)
                .cloned()
                .unwrap_or_else(|| placeholder.to_string()),
            last_message: message.content.clone(),
            last_message_at: message.created_at,
            unread_count: unread.get(partner).copied().unwrap_or(0),
        });
    }
    conversations
}

fn newest_first<'a>(messages: &'a [Message], user_id: &str) -> Vec<&'a Message> {
    let mut ordered: Vec<&Message> = messages
        .iter()
        .filter(|message| message.involves(user_id))
        .collect();
    ordered.sort_by(|a, b| SortOrder::Descending.compare(a, b));
    ordered
}

/// Loads every message of `user_id` and builds the conversation list.
pub async fn load_conversations<B: Backend>(
    backend: &B,
    user_id: &str,
    directory: &ProfileDirectory,
) -> Result<ConversationList, ChatError> {
    let messages = backend
        .query_messages(
            &MessageFilter::Involving {
                user_id: user_id.to_string(),
            },
            SortOrder::Descending,
        )
        .await?;

    let partners = partners_by_recency(&messages, user_id);
    let names = directory.resolve_all(backend, &partners).await;
    log::debug!(
        "Aggregated {} messages into {} conversations",
        messages.len(),
        partners.len()
    );

    Ok(ConversationList::from_messages(
        user_id,
        &messages,
        &names,
        directory.placeholder(),
    ))
}

/// The conversation list of one user, kept current by live inserts.
#[derive(Debug, Clone)]
pub struct ConversationList {
    user_id: String,
    conversations: Vec<Conversation>,
    counted: HashSet<String>,
}

impl ConversationList {
    pub fn from_messages(
        user_id: &str,
        messages: &[Message],
        names: &HashMap<String, String>,
        placeholder: &str,
    ) -> Self {
        Self {
            user_id: user_id.to_string(),
            conversations: aggregate(messages, user_id, names, placeholder),
            counted: messages
                .iter()
                .filter(|message| message.involves(user_id))
                .map(|message| message.id.clone())
                .collect(),
        }
    }

    pub fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    pub fn is_empty(&self) -> bool {
        self.conversations.is_empty()
    }

    pub fn unread_total(&self) -> usize {
        self.conversations.iter().map(|c| c.unread_count).sum()
    }

    /// Moves the partner's conversation to the front with `message` as its
    /// latest entry.
    pub fn apply_live_insert(&mut self, message: &Message, placeholder: &str) -> LiveUpdate {
        if !message.involves(&self.user_id) || !self.counted.insert(message.id.clone()) {
            return LiveUpdate::Ignored;
        }

        let partner = message.counterpart_of(&self.user_id).to_string();
        let incoming_unread = message.is_unread_from(&partner, &self.user_id);

        match self
            .conversations
            .iter()
            .position(|c| c.partner_id == partner)
        {
            Some(index) => {
                let mut conversation = self.conversations.remove(index);
                conversation.last_message = message.content.clone();
                conversation.last_message_at = message.created_at;
                if incoming_unread {
                    conversation.unread_count += 1;
                }
                self.conversations.insert(0, conversation);
                LiveUpdate::Updated
            }
            None => {
                self.conversations.insert(
                    0,
                    Conversation {
                        partner_id: partner.clone(),
                        partner_display_name: placeholder.to_string(),
                        last_message: message.content.clone(),
                        last_message_at: message.created_at,
                        unread_count: usize::from(incoming_unread),
                    },
                );
                LiveUpdate::NewPartner(partner)
            }
        }
    }

    pub fn set_display_name(&mut self, partner_id: &str, display_name: &str) -> bool {
        match self
            .conversations
            .iter_mut()
            .find(|c| c.partner_id == partner_id)
        {
            Some(conversation) if conversation.partner_display_name != display_name => {
                conversation.partner_display_name = display_name.to_string();
                true
            }
            _ => false,
        }
    }
}
