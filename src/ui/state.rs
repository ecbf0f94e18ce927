use chrono::{DateTime, Duration, Utc};
use skillswap_chat::common::{ChatEvent, Conversation, Message, Notification};

const TOAST_LIFETIME_SECS: i64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    SignIn,
    Conversations,
    Thread,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStatus {
    Loading,
    Ready,
    Failed,
}

pub struct Toast {
    pub notification: Notification,
    pub shown_at: DateTime<Utc>,
}

/// Local mirror of what the session has told the view.
pub struct AppState {
    pub screen: Screen,
    pub user_id: Option<String>,
    pub conversations: Vec<Conversation>,
    pub conversations_status: LoadStatus,
    pub partner_id: Option<String>,
    pub partner_name: Option<String>,
    pub messages: Vec<Message>,
    pub thread_status: LoadStatus,
    pub input_text: String,
    pub toasts: Vec<Toast>,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            screen: Screen::Conversations,
            user_id: None,
            conversations: Vec::new(),
            conversations_status: LoadStatus::Loading,
            partner_id: None,
            partner_name: None,
            messages: Vec::new(),
            thread_status: LoadStatus::Loading,
            input_text: String::new(),
            toasts: Vec::new(),
        }
    }

    pub fn apply(&mut self, event: ChatEvent) {
        match event {
            ChatEvent::SignInRequired => {
                self.screen = Screen::SignIn;
                self.user_id = None;
            }
            ChatEvent::SignedIn { user_id } => self.user_id = Some(user_id),
            ChatEvent::ConversationsLoading => {
                self.screen = Screen::Conversations;
                self.conversations_status = LoadStatus::Loading;
                self.partner_id = None;
                self.partner_name = None;
            }
            ChatEvent::ConversationsReady(conversations) => {
                self.conversations = conversations;
                self.conversations_status = LoadStatus::Ready;
            }
            ChatEvent::ConversationsFailed => {
                self.conversations.clear();
                self.conversations_status = LoadStatus::Failed;
            }
            ChatEvent::ThreadLoading { partner_id } => {
                if self.partner_id.as_ref() != Some(&partner_id) {
                    self.input_text.clear();
                }
                self.screen = Screen::Thread;
                self.partner_name = self
                    .conversations
                    .iter()
                    .find(|c| c.partner_id == partner_id)
                    .map(|c| c.partner_display_name.clone());
                self.partner_id = Some(partner_id);
                self.messages.clear();
                self.thread_status = LoadStatus::Loading;
            }
            ChatEvent::PartnerNamed {
                partner_id,
                display_name,
            } => {
                if self.partner_id.as_ref() == Some(&partner_id) {
                    self.partner_name = Some(display_name);
                }
            }
            ChatEvent::ThreadReady {
                partner_id,
                messages,
            } => {
                if self.partner_id.as_ref() == Some(&partner_id) {
                    self.messages = messages;
                    self.thread_status = LoadStatus::Ready;
                }
            }
            ChatEvent::ThreadFailed { partner_id } => {
                if self.partner_id.as_ref() == Some(&partner_id) {
                    self.messages.clear();
                    self.thread_status = LoadStatus::Failed;
                }
            }
            ChatEvent::MessageAppended(message) => self.messages.push(message),
            ChatEvent::DraftCleared => self.input_text.clear(),
            ChatEvent::Notify(notification) => self.toasts.push(Toast {
                notification,
                shown_at: Utc::now(),
            }),
        }
    }

    /// `partner_id`'s thread is on screen and has not failed.
    pub fn is_thread_open(&self, partner_id: &str) -> bool {
        self.screen == Screen::Thread
            && self.thread_status != LoadStatus::Failed
            && self.partner_id.as_deref() == Some(partner_id)
    }

    pub fn expire_toasts(&mut self, now: DateTime<Utc>) {
        let lifetime = Duration::seconds(TOAST_LIFETIME_SECS);
        self.toasts.retain(|toast| now - toast.shown_at < lifetime);
    }
}
