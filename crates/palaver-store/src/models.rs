//! Domain records held by the store.
//!
//! Records are plain data plus the room invariants that belong to them; all
//! access control and cross-record logic lives in the cursor layer.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::{Result, StoreError};

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

/// A registered user. The id doubles as the opaque client token.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct User {
    pub id: Uuid,
    pub is_banned: bool,
    /// Set while the user is banned, `None` otherwise.
    pub banned_when: Option<DateTime<Utc>>,
    /// Complaints counted against this user so far.
    pub reported_times: u32,
}

impl User {
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            is_banned: false,
            banned_when: None,
            reported_times: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// A single chat message. Immutable once constructed and owned by exactly
/// one chat.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Message {
    pub id: Uuid,
    pub created: DateTime<Utc>,
    pub author: Uuid,
    pub text: String,
    /// Id of the message this one comments on, if any.
    pub is_comment_on: Option<Uuid>,
}

// ---------------------------------------------------------------------------
// Chat
// ---------------------------------------------------------------------------

/// Chat variant tag.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub enum ChatKind {
    #[serde(rename = "common")]
    Common,
    #[serde(rename = "private")]
    PeerToPeer,
}

/// A chat room: a message map plus the set of users currently in the room.
///
/// Insertion order of `messages` is irrelevant; ordering is established only
/// when a [`ChatView`] is produced.
#[derive(Debug, Clone)]
pub struct Chat {
    pub id: Uuid,
    pub name: String,
    pub kind: ChatKind,
    pub messages: HashMap<Uuid, Message>,
    pub authors: HashSet<Uuid>,
}

impl Chat {
    pub fn new(id: Uuid, name: impl Into<String>, kind: ChatKind) -> Self {
        Self {
            id,
            name: name.into(),
            kind,
            messages: HashMap::new(),
            authors: HashSet::new(),
        }
    }

    /// Number of users in the room. Always equal to `authors.len()`.
    pub fn size(&self) -> usize {
        self.authors.len()
    }

    /// Add a user to the room. A no-op when the user is already present.
    ///
    /// A peer-to-peer chat holds at most two members: a third distinct user
    /// gets [`StoreError::MaxMembers`] and the room is left unchanged.
    pub fn enter(&mut self, user_id: Uuid) -> Result<()> {
        if self.authors.contains(&user_id) {
            return Ok(());
        }
        if self.kind == ChatKind::PeerToPeer && self.authors.len() >= 2 {
            return Err(StoreError::MaxMembers);
        }
        self.authors.insert(user_id);
        Ok(())
    }

    /// Remove a user from the room. A no-op when the user is not present.
    pub fn leave(&mut self, user_id: Uuid) {
        self.authors.remove(&user_id);
    }

    /// Insert a message keyed by its id.
    pub fn add_message(&mut self, message: Message) {
        self.messages.insert(message.id, message);
    }

    /// Serializable snapshot with the `count` most recent messages, newest
    /// first. Ordering among equal timestamps is unspecified.
    pub fn view(&self, count: usize) -> ChatView {
        let mut messages: Vec<Message> = self.messages.values().cloned().collect();
        messages.sort_by(|a, b| b.created.cmp(&a.created));
        messages.truncate(count);

        ChatView {
            id: self.id,
            name: self.name.clone(),
            messages,
            authors: self.authors.iter().copied().collect(),
            size: self.size(),
        }
    }
}

/// The wire representation of a chat.
#[derive(Debug, Clone, Serialize)]
pub struct ChatView {
    pub id: Uuid,
    pub name: String,
    pub messages: Vec<Message>,
    pub authors: Vec<Uuid>,
    pub size: usize,
}

// ---------------------------------------------------------------------------
// Complaint
// ---------------------------------------------------------------------------

/// A report filed against a user. Reviewed exactly once by the moderation
/// sweep; never deleted.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Complaint {
    pub id: Uuid,
    pub author: Uuid,
    pub created: DateTime<Utc>,
    pub reported_user: Uuid,
    pub reason: String,
    pub reviewed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn message(chat_age_secs: i64) -> Message {
        Message {
            id: Uuid::new_v4(),
            created: Utc::now() - Duration::seconds(chat_age_secs),
            author: Uuid::new_v4(),
            text: "hi".to_string(),
            is_comment_on: None,
        }
    }

    #[test]
    fn enter_is_idempotent_and_size_tracks_authors() {
        let mut chat = Chat::new(Uuid::new_v4(), "default", ChatKind::Common);
        let user = Uuid::new_v4();

        chat.enter(user).unwrap();
        chat.enter(user).unwrap();

        assert_eq!(chat.size(), 1);
        assert_eq!(chat.size(), chat.authors.len());
    }

    #[test]
    fn leave_missing_user_is_noop() {
        let mut chat = Chat::new(Uuid::new_v4(), "default", ChatKind::Common);
        chat.enter(Uuid::new_v4()).unwrap();

        chat.leave(Uuid::new_v4());

        assert_eq!(chat.size(), 1);
    }

    #[test]
    fn p2p_chat_caps_at_two_authors() {
        let mut chat = Chat::new(Uuid::new_v4(), "p2p", ChatKind::PeerToPeer);
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

        chat.enter(a).unwrap();
        chat.enter(b).unwrap();
        let before = chat.authors.clone();

        assert_eq!(chat.enter(c).unwrap_err(), StoreError::MaxMembers);
        assert_eq!(chat.authors, before);

        // Re-entering an existing member is still fine at the cap.
        chat.enter(a).unwrap();
        assert_eq!(chat.size(), 2);
    }

    #[test]
    fn view_returns_newest_first_and_truncates() {
        let mut chat = Chat::new(Uuid::new_v4(), "default", ChatKind::Common);
        for age in [30, 10, 20, 40] {
            chat.add_message(message(age));
        }

        let view = chat.view(3);

        assert_eq!(view.messages.len(), 3);
        let ages: Vec<_> = view.messages.iter().map(|m| m.created).collect();
        assert!(ages.windows(2).all(|w| w[0] >= w[1]));
        // The oldest message fell off.
        assert!(view.messages.iter().all(|m| m.created > Utc::now() - Duration::seconds(35)));
    }

    #[test]
    fn chat_kind_serializes_as_wire_tags() {
        assert_eq!(serde_json::to_string(&ChatKind::Common).unwrap(), "\"common\"");
        assert_eq!(serde_json::to_string(&ChatKind::PeerToPeer).unwrap(), "\"private\"");
    }
}
