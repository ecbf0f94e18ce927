use std::sync::{Arc, Mutex};

use super::feed::{InsertFeed, Subscription};
use super::{Backend, MessageFilter, SortOrder, Table};
use crate::common::{Message, NewMessage, Profile};
use crate::error::BackendError;
use crate::storage::MessageDatabase;

/// SQLite-backed backend for development and tests.
///
/// The signed-in identity is fixed at construction; inserts are published to
/// an in-process feed once the row is committed.
#[derive(Clone)]
pub struct LocalBackend {
    db: Arc<Mutex<MessageDatabase>>,
    feed: Arc<InsertFeed>,
    user_id: Option<String>,
}

impl LocalBackend {
    pub fn new(db: MessageDatabase, user_id: Option<String>, feed_capacity: usize) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
            feed: InsertFeed::new(feed_capacity),
            user_id,
        }
    }

    /// Same store and feed, seen as another user.
    pub fn signed_in_as(&self, user_id: impl Into<String>) -> Self {
        Self {
            db: Arc::clone(&self.db),
            feed: Arc::clone(&self.feed),
            user_id: Some(user_id.into()),
        }
    }

    pub fn feed(&self) -> &Arc<InsertFeed> {
        &self.feed
    }

    pub fn upsert_profile(&self, profile: &Profile) -> Result<(), BackendError> {
        self.with_db(|db| db.upsert_profile(profile))
    }

    fn with_db<T>(
        &self,
        op: impl FnOnce(&mut MessageDatabase) -> rusqlite::Result<T>,
    ) -> Result<T, BackendError> {
        let mut db = self.db.lock().map_err(|_| BackendError::Poisoned)?;
        Ok(op(&mut db)?)
    }
}

impl Backend for LocalBackend {
    async fn current_user(&self) -> Result<Option<String>, BackendError> {
        Ok(self.user_id.clone())
    }

    async fn get_profile(&self, user_id: &str) -> Result<Option<Profile>, BackendError> {
        self.with_db(|db| db.get_profile(user_id))
    }

    async fn query_messages(
        &self,
        filter: &MessageFilter,
        order: SortOrder,
    ) -> Result<Vec<Message>, BackendError> {
        self.with_db(|db| db.query_messages(filter, order))
    }

    async fn insert_message(&self, message: NewMessage) -> Result<Message, BackendError> {
        let stored = self.with_db(|db| db.insert_message(&message))?;
        let delivered = self.feed.publish(stored.clone());
        log::debug!("Message {} delivered to {delivered} subscribers", stored.id);
        Ok(stored)
    }

    async fn mark_read(&self, filter: &MessageFilter) -> Result<(), BackendError> {
        let updated = self.with_db(|db| db.mark_read(filter))?;
        log::debug!("Marked {updated} messages read");
        Ok(())
    }

    fn subscribe_inserts(&self, table: Table) -> Result<Subscription, BackendError> {
        match table {
            Table::Messages => Ok(self.feed.subscribe()),
            other => Err(BackendError::UnsupportedTable(other.name())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::LiveEvent;

    fn backend() -> LocalBackend {
        LocalBackend::new(
            MessageDatabase::in_memory().unwrap(),
            Some("alice".to_string()),
            16,
        )
    }

    #[tokio::test]
    async fn insert_is_published_to_subscribers() {
        let backend = backend();
        let mut sub = backend.subscribe_inserts(Table::Messages).unwrap();

        let stored = backend
            .insert_message(NewMessage {
                sender_id: "alice".to_string(),
                receiver_id: "bob".to_string(),
                content: "hi".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(sub.next_event().await, LiveEvent::Inserted(stored));
        sub.unsubscribe();
        assert_eq!(backend.feed().active_count(), 0);
    }

    #[tokio::test]
    async fn profiles_table_has_no_feed() {
        let backend = backend();
        assert!(matches!(
            backend.subscribe_inserts(Table::Profiles),
            Err(BackendError::UnsupportedTable("profiles"))
        ));
    }

    #[tokio::test]
    async fn signed_in_as_shares_the_store() {
        let alice = backend();
        let bob = alice.signed_in_as("bob");
        assert_eq!(bob.current_user().await.unwrap().as_deref(), Some("bob"));

        alice
            .insert_message(NewMessage {
                sender_id: "alice".to_string(),
                receiver_id: "bob".to_string(),
                content: "hi".to_string(),
            })
            .await
            .unwrap();
        let seen = bob
            .query_messages(
                &MessageFilter::Involving {
                    user_id: "bob".to_string(),
                },
                SortOrder::Ascending,
            )
            .await
            .unwrap();
        assert_eq!(seen.len(), 1);
    }
}
