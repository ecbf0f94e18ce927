use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// A direct message between two users.
///
/// Everything except `read` is fixed at insert time. `read` only ever moves
/// from `false` to `true`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub read: bool,
}

impl Message {
    /// The endpoint of this message that is not `user_id`.
    pub fn counterpart_of(&self, user_id: &str) -> &str {
        if self.sender_id == user_id {
            &self.receiver_id
        } else {
            &self.sender_id
        }
    }

    pub fn involves(&self, user_id: &str) -> bool {
        self.sender_id == user_id || self.receiver_id == user_id
    }

    /// Sent by `partner_id` to `user_id` and not read yet.
    pub fn is_unread_from(&self, partner_id: &str, user_id: &str) -> bool {
        !self.read && self.sender_id == partner_id && self.receiver_id == user_id
    }

    pub fn mark_read(&mut self) {
        self.read = true;
    }
}

/// Insert payload. The store assigns `id`, `created_at` and `read = false`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMessage {
    pub sender_id: String,
    pub receiver_id: String,
    pub content: String,
}

/// Per-partner summary derived from the message set of the current user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversation {
    pub partner_id: String,
    pub partner_display_name: String,
    pub last_message: String,
    pub last_message_at: DateTime<Utc>,
    pub unread_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    #[serde(rename = "full_name", default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub skills: BTreeSet<String>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<BTreeSet<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<BTreeSet<String>>::deserialize(deserializer)?.unwrap_or_default())
}

impl Profile {
    /// Display name, or `None` when the profile has no usable name.
    pub fn name(&self) -> Option<&str> {
        self.display_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(sender: &str, receiver: &str, read: bool) -> Message {
        Message {
            id: "m1".to_string(),
            sender_id: sender.to_string(),
            receiver_id: receiver.to_string(),
            content: "hi".to_string(),
            created_at: Utc::now(),
            read,
        }
    }

    #[test]
    fn counterpart_is_the_other_endpoint() {
        let msg = message("alice", "bob", false);
        assert_eq!(msg.counterpart_of("alice"), "bob");
        assert_eq!(msg.counterpart_of("bob"), "alice");
    }

    #[test]
    fn unread_from_requires_direction_and_flag() {
        let msg = message("bob", "alice", false);
        assert!(msg.is_unread_from("bob", "alice"));
        assert!(!msg.is_unread_from("alice", "bob"));

        let read = message("bob", "alice", true);
        assert!(!read.is_unread_from("bob", "alice"));
    }

    #[test]
    fn blank_profile_name_counts_as_missing() {
        let profile = Profile {
            id: "p".to_string(),
            display_name: Some("   ".to_string()),
            bio: None,
            skills: BTreeSet::new(),
        };
        assert_eq!(profile.name(), None);
    }

    #[test]
    fn profile_reads_full_name_column() {
        let profile: Profile =
            serde_json::from_str(r#"{"id":"u1","full_name":"Ada","skills":["rust","go"]}"#)
                .unwrap();
        assert_eq!(profile.name(), Some("Ada"));
        assert!(profile.skills.contains("rust"));
        assert_eq!(profile.bio, None);
    }

    #[test]
    fn null_skills_become_empty() {
        let profile: Profile =
            serde_json::from_str(r#"{"id":"u1","full_name":null,"bio":null,"skills":null}"#)
                .unwrap();
        assert!(profile.skills.is_empty());
        assert_eq!(profile.name(), None);
    }
}
