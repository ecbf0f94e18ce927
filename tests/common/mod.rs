#![allow(dead_code)]

use std::collections::BTreeSet;
use std::time::Duration;

use skillswap_chat::backend::{Backend, LocalBackend, MessageFilter, SortOrder, Subscription, Table};
use skillswap_chat::chat::{ChatSession, SessionOptions};
use skillswap_chat::common::{ChatCommand, ChatEvent, Message, NewMessage, Profile};
use skillswap_chat::error::BackendError;
use skillswap_chat::storage::MessageDatabase;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub const ALICE: &str = "alice";
pub const BOB: &str = "bob";
pub const CAROL: &str = "carol";

/// Empty in-memory store with Alice, Bob and Carol profiles, signed in as `user`.
pub fn backend_as(user: &str) -> LocalBackend {
    let backend = LocalBackend::new(
        MessageDatabase::in_memory().expect("in-memory store"),
        Some(user.to_string()),
        64,
    );
    for (id, name) in [(ALICE, "Alice"), (BOB, "Bob"), (CAROL, "Carol")] {
        backend
            .upsert_profile(&Profile {
                id: id.to_string(),
                display_name: Some(name.to_string()),
                bio: None,
                skills: BTreeSet::from(["rust".to_string()]),
            })
            .expect("seed profile");
    }
    backend
}

pub fn signed_out() -> LocalBackend {
    LocalBackend::new(MessageDatabase::in_memory().expect("in-memory store"), None, 8)
}

/// Inserts a message as `from`, through a handle signed in as the sender.
pub async fn send(backend: &LocalBackend, from: &str, to: &str, content: &str) -> Message {
    backend
        .signed_in_as(from)
        .insert_message(NewMessage {
            sender_id: from.to_string(),
            receiver_id: to.to_string(),
            content: content.to_string(),
        })
        .await
        .expect("insert")
}

pub async fn thread_rows(backend: &LocalBackend, a: &str, b: &str) -> Vec<Message> {
    backend
        .query_messages(
            &MessageFilter::Between {
                a: a.to_string(),
                b: b.to_string(),
            },
            SortOrder::Ascending,
        )
        .await
        .expect("query")
}

/// Local backend with injectable latency and failures.
#[derive(Clone)]
pub struct TestBackend {
    pub inner: LocalBackend,
    /// Thread queries involving this user are delayed by `delay`.
    pub slow_partner: Option<String>,
    pub delay: Duration,
    /// Held after every read update before it is acknowledged.
    pub mark_read_delay: Duration,
    pub fail_inserts: bool,
    pub fail_queries: bool,
}

impl TestBackend {
    pub fn new(inner: LocalBackend) -> Self {
        Self {
            inner,
            slow_partner: None,
            delay: Duration::ZERO,
            mark_read_delay: Duration::ZERO,
            fail_inserts: false,
            fail_queries: false,
        }
    }

    fn is_slow(&self, filter: &MessageFilter) -> bool {
        match (&self.slow_partner, filter) {
            (Some(slow), MessageFilter::Between { a, b }) => a == slow || b == slow,
            _ => false,
        }
    }
}

impl Backend for TestBackend {
    async fn current_user(&self) -> Result<Option<String>, BackendError> {
        self.inner.current_user().await
    }

    async fn get_profile(&self, user_id: &str) -> Result<Option<Profile>, BackendError> {
        self.inner.get_profile(user_id).await
    }

    async fn query_messages(
        &self,
        filter: &MessageFilter,
        order: SortOrder,
    ) -> Result<Vec<Message>, BackendError> {
        if self.fail_queries {
            return Err(BackendError::UnexpectedResponse("query refused".to_string()));
        }
        if self.is_slow(filter) {
            tokio::time::sleep(self.delay).await;
        }
        self.inner.query_messages(filter, order).await
    }

    async fn insert_message(&self, message: NewMessage) -> Result<Message, BackendError> {
        if self.fail_inserts {
            return Err(BackendError::UnexpectedResponse("insert refused".to_string()));
        }
        self.inner.insert_message(message).await
    }

    async fn mark_read(&self, filter: &MessageFilter) -> Result<(), BackendError> {
        self.inner.mark_read(filter).await?;
        tokio::time::sleep(self.mark_read_delay).await;
        Ok(())
    }

    fn subscribe_inserts(&self, table: Table) -> Result<Subscription, BackendError> {
        self.inner.subscribe_inserts(table)
    }
}

/// A running session with both ends of its channels.
pub struct Harness {
    pub commands: mpsc::Sender<ChatCommand>,
    pub events: mpsc::Receiver<ChatEvent>,
    pub task: JoinHandle<()>,
}

pub fn start<B: Backend>(backend: B) -> Harness {
    let (commands, command_receiver) = mpsc::channel(16);
    let (event_sender, events) = mpsc::channel(64);
    let session = ChatSession::new(backend, SessionOptions::default(), event_sender, command_receiver);
    Harness {
        commands,
        events,
        task: tokio::spawn(session.run()),
    }
}

impl Harness {
    pub async fn command(&self, command: ChatCommand) {
        self.commands.send(command).await.expect("session alive");
    }

    pub async fn next(&mut self) -> ChatEvent {
        tokio::time::timeout(Duration::from_secs(5), self.events.recv())
            .await
            .expect("timed out waiting for an event")
            .expect("session ended")
    }

    /// Skips events until one matches, returning everything skipped as well.
    pub async fn wait_for(
        &mut self,
        matches: impl Fn(&ChatEvent) -> bool,
    ) -> (ChatEvent, Vec<ChatEvent>) {
        let mut skipped = Vec::new();
        loop {
            let event = self.next().await;
            if matches(&event) {
                return (event, skipped);
            }
            skipped.push(event);
        }
    }

    /// Events that arrive within `window`.
    pub async fn drain_for(&mut self, window: Duration) -> Vec<ChatEvent> {
        let mut seen = Vec::new();
        let deadline = tokio::time::Instant::now() + window;
        while let Ok(Some(event)) = tokio::time::timeout_at(deadline, self.events.recv()).await {
            seen.push(event);
        }
        seen
    }

    pub async fn shutdown(self) {
        drop(self.commands);
        tokio::time::timeout(Duration::from_secs(5), self.task)
            .await
            .expect("session did not stop")
            .expect("session panicked");
    }
}
