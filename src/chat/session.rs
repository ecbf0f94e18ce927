use tokio::sync::mpsc;

use super::conversations::{ConversationList, LiveUpdate, load_conversations};
use super::profiles::{DEFAULT_PLACEHOLDER_NAME, ProfileDirectory};
use super::send::Composer;
use super::thread::{MessageThread, ThreadStatus, load_thread, mark_thread_read};
use crate::backend::{Backend, LiveEvent, Subscription, Table};
use crate::common::{ChatCommand, ChatEvent, Message, Notification};
use crate::error::ChatError;

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub placeholder_name: String,
    /// Mark incoming messages read as they arrive in the open thread.
    pub mark_read_on_live: bool,
    pub channel_capacity: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            placeholder_name: DEFAULT_PLACEHOLDER_NAME.to_string(),
            mark_read_on_live: true,
            channel_capacity: 100,
        }
    }
}

enum View {
    Idle,
    Conversations {
        list: Option<ConversationList>,
        /// Live inserts that arrived before the list finished loading.
        pending: Vec<Message>,
    },
    Thread(MessageThread),
}

enum LoadOutcome {
    Conversations(Result<ConversationList, ChatError>),
    Thread(Result<Vec<Message>, ChatError>),
    PartnerName {
        partner_id: String,
        display_name: String,
    },
}

struct LoadDone {
    generation: u64,
    outcome: LoadOutcome,
}

/// Event loop that owns the open view and its live subscription.
///
/// Commands come from the view, events go back to it. Loads run as spawned
/// tasks and report back tagged with the view generation they were started
/// for; anything tagged with an older generation is dropped.
pub struct ChatSession<B: Backend> {
    backend: B,
    options: SessionOptions,
    event_sender: mpsc::Sender<ChatEvent>,
    command_receiver: mpsc::Receiver<ChatCommand>,
    load_sender: mpsc::Sender<LoadDone>,
    load_receiver: mpsc::Receiver<LoadDone>,
    directory: ProfileDirectory,
    composer: Composer,
    user_id: Option<String>,
    view: View,
    generation: u64,
    subscription: Option<Subscription>,
}

impl<B: Backend> ChatSession<B> {
    pub fn new(
        backend: B,
        options: SessionOptions,
        event_sender: mpsc::Sender<ChatEvent>,
        command_receiver: mpsc::Receiver<ChatCommand>,
    ) -> Self {
        let (load_sender, load_receiver) = mpsc::channel(options.channel_capacity.max(1));
        Self {
            directory: ProfileDirectory::new(options.placeholder_name.clone()),
            backend,
            options,
            event_sender,
            command_receiver,
            load_sender,
            load_receiver,
            composer: Composer::new(),
            user_id: None,
            view: View::Idle,
            generation: 0,
            subscription: None,
        }
    }

    /// Runs until the command channel closes, then releases the open view.
    pub async fn run(mut self) {
        log::info!("Chat session started");

        loop {
            tokio::select! {
                command = self.command_receiver.recv() => {
                    if let Some(command) = command {
                        self.handle_command(command).await;
                    } else {
                        break;
                    }
                }
                Some(done) = self.load_receiver.recv() => {
                    self.handle_load(done).await;
                }
                event = next_live(&mut self.subscription) => {
                    self.handle_live(event).await;
                }
            }
        }

        self.leave_view();
        log::info!("Chat session stopped");
    }

    async fn handle_command(&mut self, command: ChatCommand) {
        match command {
            ChatCommand::OpenConversations => self.open_conversations().await,
            ChatCommand::OpenThread { partner_id } => self.open_thread(partner_id).await,
            ChatCommand::SendMessage { draft } => self.send(draft).await,
            ChatCommand::CloseView => self.leave_view(),
        }
    }

    async fn emit(&self, event: ChatEvent) {
        if let Err(err) = self.event_sender.send(event).await {
            log::debug!("View is gone, dropping event: {err}");
        }
    }

    async fn report(&self, err: &ChatError, action: &str) {
        match err {
            ChatError::NotAuthenticated => self.emit(ChatEvent::SignInRequired).await,
            ChatError::ValidationRejected(reason) => log::debug!("Not sent: {reason}"),
            _ => {
                log::warn!("Failed to {action}: {err}");
                if let Some(toast) = err.notification(action) {
                    self.emit(ChatEvent::Notify(toast)).await;
                }
            }
        }
    }

    /// Looks up the signed-in user, announcing changes to the view.
    async fn ensure_user(&mut self, action: &str) -> Option<String> {
        let result = self.backend.current_user().await.map_err(ChatError::from);
        match result {
            Ok(Some(user_id)) => {
                if self.user_id.as_deref() != Some(user_id.as_str()) {
                    log::info!("Signed in as {user_id}");
                    self.user_id = Some(user_id.clone());
                    self.emit(ChatEvent::SignedIn {
                        user_id: user_id.clone(),
                    })
                    .await;
                }
                Some(user_id)
            }
            Ok(None) => {
                self.user_id = None;
                self.emit(ChatEvent::SignInRequired).await;
                None
            }
            Err(err) => {
                self.report(&err, action).await;
                None
            }
        }
    }

    /// Drops the current view: its subscription is released and every load
    /// still in flight for it becomes stale.
    fn leave_view(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }
        self.generation += 1;
        self.view = View::Idle;
    }

    fn subscribe(&mut self) {
        match self.backend.subscribe_inserts(Table::Messages) {
            Ok(subscription) => self.subscription = Some(subscription),
            Err(err) => log::warn!("Live updates unavailable: {err}"),
        }
    }

    fn spawn_load<F>(&self, load: F)
    where
        F: Future<Output = LoadOutcome> + Send + 'static,
    {
        let generation = self.generation;
        let sender = self.load_sender.clone();
        tokio::spawn(async move {
            let outcome = load.await;
            if sender.send(LoadDone { generation, outcome }).await.is_err() {
                log::debug!("Session ended before load {generation} finished");
            }
        });
    }

    fn spawn_name_lookup(&self, partner_id: String) {
        let backend = self.backend.clone();
        let directory = self.directory.clone();
        self.spawn_load(async move {
            let display_name = directory.display_name(&backend, &partner_id).await;
            LoadOutcome::PartnerName {
                partner_id,
                display_name,
            }
        });
    }

    async fn open_conversations(&mut self) {
        self.leave_view();
        let Some(user_id) = self.ensure_user("load conversations").await else {
            return;
        };

        log::info!("Opening conversations for {user_id}");
        self.subscribe();
        self.view = View::Conversations {
            list: None,
            pending: Vec::new(),
        };
        self.emit(ChatEvent::ConversationsLoading).await;

        let backend = self.backend.clone();
        let directory = self.directory.clone();
        self.spawn_load(async move {
            LoadOutcome::Conversations(load_conversations(&backend, &user_id, &directory).await)
        });
    }

    async fn open_thread(&mut self, partner_id: String) {
        self.leave_view();
        let Some(user_id) = self.ensure_user("load messages").await else {
            return;
        };

        log::info!("Opening thread with {partner_id}");
        self.subscribe();
        self.view = View::Thread(MessageThread::new(user_id.clone(), partner_id.clone()));
        self.emit(ChatEvent::ThreadLoading {
            partner_id: partner_id.clone(),
        })
        .await;

        self.spawn_name_lookup(partner_id.clone());

        let backend = self.backend.clone();
        self.spawn_load(async move {
            LoadOutcome::Thread(load_thread(&backend, &user_id, &partner_id).await)
        });
    }

    async fn send(&mut self, draft: String) {
        let (user_id, partner_id) = match &self.view {
            View::Thread(thread) => (
                Some(thread.user_id().to_string()),
                Some(thread.partner_id().to_string()),
            ),
            _ => (self.user_id.clone(), None),
        };

        self.composer.set_draft(draft);
        let result = self
            .composer
            .send(&self.backend, user_id.as_deref(), partner_id.as_deref())
            .await;
        match result {
            Ok(_) => self.emit(ChatEvent::DraftCleared).await,
            Err(err) => self.report(&err, "send message").await,
        }
    }

    async fn handle_load(&mut self, done: LoadDone) {
        if done.generation != self.generation {
            log::debug!(
                "Discarding stale load from view {} (current {})",
                done.generation,
                self.generation
            );
            return;
        }

        match done.outcome {
            LoadOutcome::Conversations(result) => self.conversations_loaded(result).await,
            LoadOutcome::Thread(result) => self.thread_loaded(result).await,
            LoadOutcome::PartnerName {
                partner_id,
                display_name,
            } => self.partner_named(partner_id, display_name).await,
        }
    }

    async fn conversations_loaded(&mut self, result: Result<ConversationList, ChatError>) {
        let View::Conversations { list, pending } = &mut self.view else {
            return;
        };

        match result {
            Ok(mut loaded) => {
                let mut new_partners = Vec::new();
                for message in pending.drain(..) {
                    if let LiveUpdate::NewPartner(partner) =
                        loaded.apply_live_insert(&message, &self.options.placeholder_name)
                    {
                        new_partners.push(partner);
                    }
                }
                let snapshot = loaded.conversations().to_vec();
                *list = Some(loaded);

                for partner in new_partners {
                    self.spawn_name_lookup(partner);
                }
                self.emit(ChatEvent::ConversationsReady(snapshot)).await;
            }
            Err(err) => {
                pending.clear();
                self.emit(ChatEvent::ConversationsFailed).await;
                self.report(&err, "load conversations").await;
            }
        }
    }

    async fn thread_loaded(&mut self, result: Result<Vec<Message>, ChatError>) {
        let View::Thread(thread) = &mut self.view else {
            return;
        };
        let partner_id = thread.partner_id().to_string();

        match result {
            Ok(messages) => {
                let arrived_meanwhile = thread.apply_loaded(messages);
                if self.options.mark_read_on_live {
                    // Live messages buffered during the load may postdate its read update.
                    let unread: Vec<String> = thread
                        .incoming_unread_ids()
                        .into_iter()
                        .filter(|id| arrived_meanwhile.contains(id))
                        .collect();
                    if !unread.is_empty() {
                        match mark_thread_read(&self.backend, thread.user_id(), thread.partner_id())
                            .await
                        {
                            Ok(()) => {
                                for id in &unread {
                                    thread.mark_read_locally(id);
                                }
                            }
                            Err(err) => {
                                log::warn!("Could not mark messages from {partner_id} as read: {err}")
                            }
                        }
                    }
                }
                let messages = thread.messages().to_vec();
                self.emit(ChatEvent::ThreadReady {
                    partner_id,
                    messages,
                })
                .await;
            }
            Err(err) => {
                thread.apply_failure();
                self.emit(ChatEvent::ThreadFailed { partner_id }).await;
                self.report(&err, "load messages").await;
            }
        }
    }

    async fn partner_named(&mut self, partner_id: String, display_name: String) {
        match &mut self.view {
            View::Conversations {
                list: Some(list), ..
            } => {
                if list.set_display_name(&partner_id, &display_name) {
                    let snapshot = list.conversations().to_vec();
                    self.emit(ChatEvent::ConversationsReady(snapshot)).await;
                }
            }
            View::Thread(thread) if thread.partner_id() == partner_id => {
                self.emit(ChatEvent::PartnerNamed {
                    partner_id,
                    display_name,
                })
                .await;
            }
            _ => {}
        }
    }

    async fn handle_live(&mut self, event: LiveEvent) {
        match event {
            LiveEvent::Inserted(message) => self.live_insert(message).await,
            LiveEvent::Lagged(missed) => {
                log::warn!("Live feed lagged, {missed} inserts missed; reloading view");
                self.emit(ChatEvent::Notify(Notification::info(
                    "Reconnecting",
                    "Some updates were missed, reloading",
                )))
                .await;
                self.reload().await;
            }
            LiveEvent::Closed => {
                log::warn!("Live feed closed");
                if let Some(subscription) = self.subscription.take() {
                    subscription.unsubscribe();
                }
                self.emit(ChatEvent::Notify(Notification::info(
                    "Live updates stopped",
                    "Reopen the view to see new messages",
                )))
                .await;
            }
        }
    }

    async fn reload(&mut self) {
        let partner_id = match &self.view {
            View::Conversations { .. } => None,
            View::Thread(thread) => Some(thread.partner_id().to_string()),
            View::Idle => return,
        };
        match partner_id {
            Some(partner_id) => self.open_thread(partner_id).await,
            None => self.open_conversations().await,
        }
    }

    async fn live_insert(&mut self, message: Message) {
        match &mut self.view {
            View::Conversations { list: None, pending } => pending.push(message),
            View::Conversations {
                list: Some(list), ..
            } => match list.apply_live_insert(&message, &self.options.placeholder_name) {
                LiveUpdate::Ignored => {}
                LiveUpdate::Updated => {
                    let snapshot = list.conversations().to_vec();
                    self.emit(ChatEvent::ConversationsReady(snapshot)).await;
                }
                LiveUpdate::NewPartner(partner) => {
                    let snapshot = list.conversations().to_vec();
                    self.spawn_name_lookup(partner);
                    self.emit(ChatEvent::ConversationsReady(snapshot)).await;
                }
            },
            View::Thread(thread) => {
                let incoming_unread = thread.is_incoming_unread(&message);
                let id = message.id.clone();
                if !thread.merge_live(message) || thread.status() != ThreadStatus::Ready {
                    return;
                }
                if incoming_unread && self.options.mark_read_on_live {
                    self.mark_live_read(&id).await;
                }
                self.emit_appended(&id).await;
            }
            View::Idle => {}
        }
    }

    async fn mark_live_read(&mut self, message_id: &str) {
        let View::Thread(thread) = &mut self.view else {
            return;
        };
        match mark_thread_read(&self.backend, thread.user_id(), thread.partner_id()).await {
            Ok(()) => thread.mark_read_locally(message_id),
            Err(err) => log::warn!("Could not mark {message_id} as read: {err}"),
        }
    }

    async fn emit_appended(&self, message_id: &str) {
        let View::Thread(thread) = &self.view else {
            return;
        };
        if let Some(message) = thread.messages().iter().find(|m| m.id == message_id) {
            self.emit(ChatEvent::MessageAppended(message.clone())).await;
        }
    }
}

async fn next_live(subscription: &mut Option<Subscription>) -> LiveEvent {
    match subscription {
        Some(subscription) => subscription.next_event().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::LocalBackend;
    use crate::common::Severity;
    use crate::storage::MessageDatabase;

    #[tokio::test]
    async fn closed_feed_drops_subscription_and_tells_the_view() {
        let backend =
            LocalBackend::new(MessageDatabase::in_memory().unwrap(), Some("alice".into()), 8);
        let feed = backend.feed().clone();
        let (event_sender, mut events) = mpsc::channel(8);
        let (_commands, command_receiver) = mpsc::channel(8);
        let mut session =
            ChatSession::new(backend, SessionOptions::default(), event_sender, command_receiver);

        session.subscribe();
        assert_eq!(feed.active_count(), 1);

        session.handle_live(LiveEvent::Closed).await;
        assert!(session.subscription.is_none());
        assert_eq!(feed.active_count(), 0);

        let Some(ChatEvent::Notify(toast)) = events.recv().await else {
            panic!("expected a toast");
        };
        assert_eq!(toast.severity, Severity::Info);
        assert_eq!(toast.title, "Live updates stopped");
    }
}
