//! Contract with the managed backend (auth, `profiles`/`messages` tables and
//! the insert change feed), plus the two adapters that implement it.

pub mod feed;
pub mod local;
pub mod remote;

use std::cmp::Ordering;
use std::future::Future;

use crate::common::{Message, NewMessage, Profile};
use crate::error::BackendError;

pub use feed::{InsertFeed, LiveEvent, Subscription};
pub use local::LocalBackend;
pub use remote::RemoteBackend;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    Profiles,
    Messages,
}

impl Table {
    pub fn name(self) -> &'static str {
        match self {
            Table::Profiles => "profiles",
            Table::Messages => "messages",
        }
    }
}

/// Row selection on the `messages` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageFilter {
    /// `sender = user OR receiver = user`
    Involving { user_id: String },
    /// Messages between `a` and `b`, either direction.
    Between { a: String, b: String },
    /// `sender = sender AND receiver = receiver AND read = false`
    UnreadFrom { sender_id: String, receiver_id: String },
}

impl MessageFilter {
    pub fn matches(&self, message: &Message) -> bool {
        match self {
            MessageFilter::Involving { user_id } => message.involves(user_id),
            MessageFilter::Between { a, b } => {
                (message.sender_id == *a && message.receiver_id == *b)
                    || (message.sender_id == *b && message.receiver_id == *a)
            }
            MessageFilter::UnreadFrom {
                sender_id,
                receiver_id,
            } => message.is_unread_from(sender_id, receiver_id),
        }
    }
}

/// Ordering on `(created_at, id)`. The id keeps equal timestamps in a
/// stable order across loads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

impl SortOrder {
    pub fn compare(self, a: &Message, b: &Message) -> Ordering {
        let ascending = a
            .created_at
            .cmp(&b.created_at)
            .then_with(|| a.id.cmp(&b.id));
        match self {
            SortOrder::Ascending => ascending,
            SortOrder::Descending => ascending.reverse(),
        }
    }

    pub fn sort(self, messages: &mut [Message]) {
        messages.sort_by(|a, b| self.compare(a, b));
    }
}

/// Capabilities the chat core consumes from the managed backend.
///
/// Adapters are cheap to clone and are shared between the session loop and
/// the load tasks it spawns.
pub trait Backend: Clone + Send + Sync + 'static {
    /// Identity of the signed-in user, `None` when nobody is signed in.
    fn current_user(&self) -> impl Future<Output = Result<Option<String>, BackendError>> + Send;

    fn get_profile(
        &self,
        user_id: &str,
    ) -> impl Future<Output = Result<Option<Profile>, BackendError>> + Send;

    fn query_messages(
        &self,
        filter: &MessageFilter,
        order: SortOrder,
    ) -> impl Future<Output = Result<Vec<Message>, BackendError>> + Send;

    fn insert_message(
        &self,
        message: NewMessage,
    ) -> impl Future<Output = Result<Message, BackendError>> + Send;

    /// Sets `read = true` on every row matching `filter`.
    fn mark_read(
        &self,
        filter: &MessageFilter,
    ) -> impl Future<Output = Result<(), BackendError>> + Send;

    /// Opens a live handle on row inserts. The caller owns the handle and
    /// must call [`Subscription::unsubscribe`] when its view goes away.
    fn subscribe_inserts(&self, table: Table) -> Result<Subscription, BackendError>;
}
