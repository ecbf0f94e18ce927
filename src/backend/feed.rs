use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::broadcast;

use crate::common::Message;

/// What a subscription yields when polled.
#[derive(Debug, Clone, PartialEq)]
pub enum LiveEvent {
    Inserted(Message),
    /// The subscriber fell behind and this many inserts were dropped.
    Lagged(u64),
    /// The feed is gone; no more events will arrive.
    Closed,
}

/// Fan-out of inserted `messages` rows to every open [`Subscription`].
#[derive(Debug)]
pub struct InsertFeed {
    sender: broadcast::Sender<Message>,
    active: Mutex<HashSet<u64>>,
    next_id: AtomicU64,
}

impl InsertFeed {
    pub fn new(capacity: usize) -> Arc<Self> {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Arc::new(Self {
            sender,
            active: Mutex::new(HashSet::new()),
            next_id: AtomicU64::new(1),
        })
    }

    pub fn subscribe(self: &Arc<Self>) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let receiver = self.sender.subscribe();
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id);
        log::info!("Insert subscription {id} opened");
        Subscription {
            id,
            receiver,
            feed: Arc::clone(self),
            released: false,
        }
    }

    /// Delivers `message` to current subscribers and returns how many got it.
    pub fn publish(&self, message: Message) -> usize {
        self.sender.send(message).unwrap_or(0)
    }

    pub fn active_count(&self) -> usize {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn release(&self, id: u64) {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
    }
}

/// Live handle on the insert feed, owned by exactly one view.
#[must_use = "a subscription must be kept and explicitly unsubscribed"]
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    receiver: broadcast::Receiver<Message>,
    feed: Arc<InsertFeed>,
    released: bool,
}

impl Subscription {
    pub async fn next_event(&mut self) -> LiveEvent {
        match self.receiver.recv().await {
            Ok(message) => LiveEvent::Inserted(message),
            Err(broadcast::error::RecvError::Lagged(skipped)) => LiveEvent::Lagged(skipped),
            Err(broadcast::error::RecvError::Closed) => LiveEvent::Closed,
        }
    }

    /// Stops delivery to this handle.
    pub fn unsubscribe(mut self) {
        self.feed.release(self.id);
        self.released = true;
        log::info!("Insert subscription {} closed", self.id);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if !self.released {
            log::warn!(
                "Insert subscription {} dropped without unsubscribe",
                self.id
            );
            self.feed.release(self.id);
        }
    }
}
