//! Cursors: token-checked handles through which every store operation flows.
//!
//! A cursor is valid from `ChatStore::connect()` until `disconnect()`; each
//! operation re-checks its token and fails with [`StoreError::NotConnected`]
//! once revoked. Multi-step mutation flows (the message pipeline, the
//! peer-to-peer scan-or-create, complaint creation, the moderation sweeps)
//! run under a single lock acquisition so their steps cannot interleave with
//! another handler's.

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::MutexGuard;
use uuid::Uuid;

use crate::error::{Result, StoreError};
use crate::models::{Chat, ChatKind, Complaint, Message, User};
use crate::store::{fresh_id, ChatStore, StoreInner};

/// Rate-limit policy for the default chat: at most `max_messages` per author
/// within the trailing `window`.
#[derive(Debug, Clone)]
pub struct MessageLimit {
    pub max_messages: u32,
    pub window: Duration,
}

/// A capability handle bound to one [`ChatStore`].
#[derive(Debug)]
pub struct Cursor {
    store: ChatStore,
    token: u64,
}

impl Cursor {
    pub(crate) fn new(store: ChatStore, token: u64) -> Self {
        Self { store, token }
    }

    /// The opaque admission token of this cursor.
    pub fn token(&self) -> u64 {
        self.token
    }

    /// Release the cursor's admission slot. Idempotent at the store level.
    pub async fn disconnect(self) {
        self.store.disconnect(self.token).await;
    }

    /// Lock the store and verify this cursor is still admitted.
    async fn inner(&self) -> Result<MutexGuard<'_, StoreInner>> {
        let guard = self.store.inner.lock().await;
        if !guard.connections.contains(&self.token) {
            return Err(StoreError::NotConnected);
        }
        Ok(guard)
    }

    // -- users --------------------------------------------------------------

    pub async fn create_user(&self) -> Result<Uuid> {
        let mut inner = self.inner().await?;
        let id = fresh_id(&inner.users);
        inner.users.insert(id, User::new(id));
        Ok(id)
    }

    pub async fn get_user(&self, id: Uuid) -> Result<User> {
        self.inner()
            .await?
            .users
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotExist)
    }

    pub async fn get_user_list(&self) -> Result<Vec<User>> {
        Ok(self.inner().await?.users.values().cloned().collect())
    }

    // -- chats --------------------------------------------------------------

    /// Id of the default chat, created and memoized on first use.
    pub async fn get_default_chat_id(&self) -> Result<Uuid> {
        Ok(self.inner().await?.ensure_default_chat())
    }

    pub async fn create_chat(&self, name: &str) -> Result<Uuid> {
        let mut inner = self.inner().await?;
        let id = fresh_id(&inner.chats);
        inner.chats.insert(id, Chat::new(id, name, ChatKind::Common));
        Ok(id)
    }

    pub async fn create_p2p_chat(&self, name: &str) -> Result<Uuid> {
        let mut inner = self.inner().await?;
        let id = fresh_id(&inner.chats);
        inner
            .chats
            .insert(id, Chat::new(id, name, ChatKind::PeerToPeer));
        Ok(id)
    }

    pub async fn get_chat(&self, id: Uuid) -> Result<Chat> {
        self.inner()
            .await?
            .chats
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotExist)
    }

    pub async fn get_chat_list(&self) -> Result<Vec<Chat>> {
        Ok(self.inner().await?.chats.values().cloned().collect())
    }

    /// Add a user to a chat (enforcing the peer-to-peer cap).
    pub async fn enter_chat(&self, chat_id: Uuid, user_id: Uuid) -> Result<()> {
        let mut inner = self.inner().await?;
        if !inner.users.contains_key(&user_id) {
            return Err(StoreError::NotExist);
        }
        let chat = inner.chats.get_mut(&chat_id).ok_or(StoreError::NotExist)?;
        chat.enter(user_id)
    }

    /// Remove a user from a chat. A no-op if the user is not a member.
    pub async fn leave_chat(&self, chat_id: Uuid, user_id: Uuid) -> Result<()> {
        let mut inner = self.inner().await?;
        if !inner.users.contains_key(&user_id) {
            return Err(StoreError::NotExist);
        }
        let chat = inner.chats.get_mut(&chat_id).ok_or(StoreError::NotExist)?;
        chat.leave(user_id);
        Ok(())
    }

    // -- messages -----------------------------------------------------------

    /// Find a message by id, scanning every chat's message map. O(total
    /// messages).
    pub async fn get_message(&self, id: Uuid) -> Result<Option<Message>> {
        Ok(self
            .inner()
            .await?
            .chats
            .values()
            .find_map(|chat| chat.messages.get(&id).cloned()))
    }

    /// The message pipeline behind `POST /send`.
    ///
    /// `chat_id = None` targets the default chat (created lazily). The check
    /// order is a contract: existence, then rate limit, then comment
    /// resolution, then ban. A dangling `comment_on` is dropped with a log
    /// line, never an error.
    pub async fn write_to_chat(
        &self,
        author_id: Uuid,
        chat_id: Option<Uuid>,
        text: &str,
        comment_on: Option<Uuid>,
        limit: Option<&MessageLimit>,
    ) -> Result<Uuid> {
        let mut inner = self.inner().await?;

        let chat_id = match chat_id {
            Some(id) => id,
            None => inner.ensure_default_chat(),
        };

        let author = inner
            .users
            .get(&author_id)
            .cloned()
            .ok_or(StoreError::NotExist)?;
        if !inner.chats.contains_key(&chat_id) {
            return Err(StoreError::NotExist);
        }

        let now = Utc::now();

        // Only the default chat is rate limited; private chats never are.
        if let Some(limit) = limit {
            if inner.default_chat_id == Some(chat_id) {
                let since = now - limit.window;
                let recent = inner.chats[&chat_id]
                    .messages
                    .values()
                    .filter(|m| m.author == author_id && m.created > since)
                    .count();
                if recent >= limit.max_messages as usize {
                    return Err(StoreError::MsgLimitExceeded);
                }
            }
        }

        let is_comment_on = comment_on.and_then(|target| {
            let found = inner
                .chats
                .values()
                .any(|chat| chat.messages.contains_key(&target));
            if found {
                Some(target)
            } else {
                tracing::warn!(message_id = %target, "comment target not found, dropping reference");
                None
            }
        });

        if author.is_banned {
            return Err(StoreError::Banned);
        }

        let chat = inner.chats.get_mut(&chat_id).ok_or(StoreError::NotExist)?;
        let id = fresh_id(&chat.messages);
        chat.add_message(Message {
            id,
            created: now,
            author: author_id,
            text: text.to_string(),
            is_comment_on,
        });
        Ok(id)
    }

    /// Find or create the private chat for an unordered pair of users.
    ///
    /// Scans for an existing peer-to-peer chat whose author set is exactly
    /// the pair, reusing the first match. Runs under one lock acquisition so
    /// a concurrent request for the same pair cannot create a duplicate.
    pub async fn enter_p2p(&self, user_id: Uuid, other_user_id: Uuid) -> Result<Uuid> {
        let mut inner = self.inner().await?;

        if !inner.users.contains_key(&user_id) || !inner.users.contains_key(&other_user_id) {
            return Err(StoreError::NotExist);
        }

        let pair: HashSet<Uuid> = [user_id, other_user_id].into_iter().collect();
        if let Some(existing) = inner
            .chats
            .values()
            .find(|chat| chat.kind == ChatKind::PeerToPeer && chat.authors == pair)
        {
            return Ok(existing.id);
        }

        let id = fresh_id(&inner.chats);
        let mut chat = Chat::new(id, "p2p", ChatKind::PeerToPeer);
        chat.enter(user_id)?;
        chat.enter(other_user_id)?;
        inner.chats.insert(id, chat);
        Ok(id)
    }

    // -- complaints ---------------------------------------------------------

    /// File a complaint. A (reporter, target) pair may only be reported once.
    pub async fn create_complaint(
        &self,
        author_id: Uuid,
        reported_user_id: Uuid,
        reason: &str,
    ) -> Result<Uuid> {
        let mut inner = self.inner().await?;

        if !inner.users.contains_key(&author_id) || !inner.users.contains_key(&reported_user_id) {
            return Err(StoreError::NotExist);
        }
        let duplicate = inner
            .complaints
            .values()
            .any(|c| c.author == author_id && c.reported_user == reported_user_id);
        if duplicate {
            return Err(StoreError::Validation("User already reported".to_string()));
        }

        let id = fresh_id(&inner.complaints);
        inner.complaints.insert(
            id,
            Complaint {
                id,
                author: author_id,
                created: Utc::now(),
                reported_user: reported_user_id,
                reason: reason.to_string(),
                reviewed: false,
            },
        );
        Ok(id)
    }

    pub async fn get_complaint_list(&self) -> Result<Vec<Complaint>> {
        Ok(self.inner().await?.complaints.values().cloned().collect())
    }

    // -- moderation sweeps --------------------------------------------------

    /// Review every pending complaint, counting it against the reported user
    /// and banning once the count reaches `max_complaint_count`. Each
    /// complaint is marked reviewed and never re-counted. Returns the number
    /// of complaints reviewed.
    pub async fn review_pending_complaints(
        &self,
        max_complaint_count: u32,
        now: DateTime<Utc>,
    ) -> Result<usize> {
        let mut guard = self.inner().await?;
        let inner = &mut *guard;

        let mut reviewed = 0;
        for complaint in inner.complaints.values_mut().filter(|c| !c.reviewed) {
            if let Some(user) = inner.users.get_mut(&complaint.reported_user) {
                if user.reported_times + 1 >= max_complaint_count {
                    user.is_banned = true;
                    user.banned_when = Some(now);
                } else {
                    user.reported_times += 1;
                }
            }
            complaint.reviewed = true;
            reviewed += 1;
        }
        Ok(reviewed)
    }

    /// Lift every ban whose `ban_period` has elapsed. Returns the number of
    /// users unbanned.
    pub async fn expire_bans(&self, ban_period: Duration, now: DateTime<Utc>) -> Result<usize> {
        let mut inner = self.inner().await?;

        let mut unbanned = 0;
        for user in inner.users.values_mut() {
            if let Some(banned_when) = user.banned_when.filter(|_| user.is_banned) {
                if now - banned_when >= ban_period {
                    user.is_banned = false;
                    user.banned_when = None;
                    unbanned += 1;
                }
            }
        }
        Ok(unbanned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store_and_cursor() -> (ChatStore, Cursor) {
        let store = ChatStore::new(8);
        let cursor = store.connect().await;
        (store, cursor)
    }

    async fn ban(store: &ChatStore, user_id: Uuid) {
        let mut inner = store.inner.lock().await;
        let user = inner.users.get_mut(&user_id).unwrap();
        user.is_banned = true;
        user.banned_when = Some(Utc::now());
    }

    #[tokio::test]
    async fn cursor_rejects_operations_after_disconnect() {
        let (store, cursor) = store_and_cursor().await;
        let user = cursor.create_user().await.unwrap();
        cursor.disconnect().await;

        let stale = Cursor::new(store.clone(), 9999);
        assert_eq!(stale.get_user(user).await.unwrap_err(), StoreError::NotConnected);
        assert_eq!(stale.create_user().await.unwrap_err(), StoreError::NotConnected);
        assert_eq!(
            stale.write_to_chat(user, None, "hi", None, None).await.unwrap_err(),
            StoreError::NotConnected,
        );
        assert_eq!(
            stale.enter_chat(Uuid::new_v4(), user).await.unwrap_err(),
            StoreError::NotConnected,
        );
        assert_eq!(
            stale.leave_chat(Uuid::new_v4(), user).await.unwrap_err(),
            StoreError::NotConnected,
        );
    }

    #[tokio::test]
    async fn default_chat_is_memoized() {
        let (_store, cursor) = store_and_cursor().await;

        let first = cursor.get_default_chat_id().await.unwrap();
        let second = cursor.get_default_chat_id().await.unwrap();

        assert_eq!(first, second);
        assert_eq!(cursor.get_chat_list().await.unwrap().len(), 1);
        assert_eq!(cursor.get_chat(first).await.unwrap().name, "default");
    }

    #[tokio::test]
    async fn write_to_default_chat_inserts_one_message() {
        let (_store, cursor) = store_and_cursor().await;
        let author = cursor.create_user().await.unwrap();

        let msg_id = cursor
            .write_to_chat(author, None, "hello, world", None, None)
            .await
            .unwrap();

        let chat_id = cursor.get_default_chat_id().await.unwrap();
        let chat = cursor.get_chat(chat_id).await.unwrap();
        assert_eq!(chat.messages.len(), 1);
        let stored = &chat.messages[&msg_id];
        assert_eq!(stored.author, author);
        assert_eq!(stored.text, "hello, world");
    }

    #[tokio::test]
    async fn write_requires_author_and_chat() {
        let (_store, cursor) = store_and_cursor().await;
        let author = cursor.create_user().await.unwrap();

        assert_eq!(
            cursor
                .write_to_chat(Uuid::new_v4(), None, "hi", None, None)
                .await
                .unwrap_err(),
            StoreError::NotExist,
        );
        assert_eq!(
            cursor
                .write_to_chat(author, Some(Uuid::new_v4()), "hi", None, None)
                .await
                .unwrap_err(),
            StoreError::NotExist,
        );
    }

    #[tokio::test]
    async fn banned_author_cannot_write_but_missing_chat_wins() {
        let (store, cursor) = store_and_cursor().await;
        let author = cursor.create_user().await.unwrap();
        cursor.get_default_chat_id().await.unwrap();
        ban(&store, author).await;

        assert_eq!(
            cursor.write_to_chat(author, None, "hi", None, None).await.unwrap_err(),
            StoreError::Banned,
        );
        // Existence is checked before the ban: a missing chat still reports
        // NotExist to a banned author.
        assert_eq!(
            cursor
                .write_to_chat(author, Some(Uuid::new_v4()), "hi", None, None)
                .await
                .unwrap_err(),
            StoreError::NotExist,
        );
    }

    #[tokio::test]
    async fn rate_limit_applies_to_default_chat_only() {
        let (_store, cursor) = store_and_cursor().await;
        let author = cursor.create_user().await.unwrap();
        let limit = MessageLimit {
            max_messages: 2,
            window: Duration::hours(1),
        };

        cursor.write_to_chat(author, None, "1", None, Some(&limit)).await.unwrap();
        cursor.write_to_chat(author, None, "2", None, Some(&limit)).await.unwrap();
        assert_eq!(
            cursor
                .write_to_chat(author, None, "3", None, Some(&limit))
                .await
                .unwrap_err(),
            StoreError::MsgLimitExceeded,
        );

        // Another author still has a fresh budget.
        let other = cursor.create_user().await.unwrap();
        cursor.write_to_chat(other, None, "hi", None, Some(&limit)).await.unwrap();

        // A private chat is never limited.
        let p2p = cursor.enter_p2p(author, other).await.unwrap();
        for i in 0..5 {
            cursor
                .write_to_chat(author, Some(p2p), &i.to_string(), None, Some(&limit))
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn messages_flow_freely_without_a_limit() {
        let (_store, cursor) = store_and_cursor().await;
        let author = cursor.create_user().await.unwrap();

        for i in 0..25 {
            cursor
                .write_to_chat(author, None, &i.to_string(), None, None)
                .await
                .unwrap();
        }

        let chat_id = cursor.get_default_chat_id().await.unwrap();
        assert_eq!(cursor.get_chat(chat_id).await.unwrap().messages.len(), 25);
    }

    #[tokio::test]
    async fn dangling_comment_target_is_dropped_not_rejected() {
        let (_store, cursor) = store_and_cursor().await;
        let author = cursor.create_user().await.unwrap();

        let msg_id = cursor
            .write_to_chat(author, None, "orphan", Some(Uuid::new_v4()), None)
            .await
            .unwrap();

        let stored = cursor.get_message(msg_id).await.unwrap().unwrap();
        assert_eq!(stored.is_comment_on, None);
    }

    #[tokio::test]
    async fn comment_on_existing_message_is_kept() {
        let (_store, cursor) = store_and_cursor().await;
        let author = cursor.create_user().await.unwrap();

        let parent = cursor.write_to_chat(author, None, "parent", None, None).await.unwrap();
        let reply = cursor
            .write_to_chat(author, None, "reply", Some(parent), None)
            .await
            .unwrap();

        let stored = cursor.get_message(reply).await.unwrap().unwrap();
        assert_eq!(stored.is_comment_on, Some(parent));
    }

    #[tokio::test]
    async fn get_message_scans_across_chats() {
        let (_store, cursor) = store_and_cursor().await;
        let (a, b) = (cursor.create_user().await.unwrap(), cursor.create_user().await.unwrap());
        let p2p = cursor.enter_p2p(a, b).await.unwrap();

        let in_default = cursor.write_to_chat(a, None, "one", None, None).await.unwrap();
        let in_p2p = cursor.write_to_chat(a, Some(p2p), "two", None, None).await.unwrap();

        assert!(cursor.get_message(in_default).await.unwrap().is_some());
        assert!(cursor.get_message(in_p2p).await.unwrap().is_some());
        assert!(cursor.get_message(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn enter_p2p_is_idempotent_per_pair() {
        let (_store, cursor) = store_and_cursor().await;
        let (a, b) = (cursor.create_user().await.unwrap(), cursor.create_user().await.unwrap());

        let first = cursor.enter_p2p(a, b).await.unwrap();
        let second = cursor.enter_p2p(b, a).await.unwrap();

        assert_eq!(first, second);
        let chat = cursor.get_chat(first).await.unwrap();
        assert_eq!(chat.size(), 2);
        assert_eq!(chat.kind, ChatKind::PeerToPeer);

        let p2p_count = cursor
            .get_chat_list()
            .await
            .unwrap()
            .iter()
            .filter(|c| c.kind == ChatKind::PeerToPeer)
            .count();
        assert_eq!(p2p_count, 1);
    }

    #[tokio::test]
    async fn enter_p2p_requires_both_users() {
        let (_store, cursor) = store_and_cursor().await;
        let a = cursor.create_user().await.unwrap();

        assert_eq!(
            cursor.enter_p2p(a, Uuid::new_v4()).await.unwrap_err(),
            StoreError::NotExist,
        );
    }

    #[tokio::test]
    async fn third_user_cannot_enter_p2p_chat() {
        let (_store, cursor) = store_and_cursor().await;
        let (a, b, c) = (
            cursor.create_user().await.unwrap(),
            cursor.create_user().await.unwrap(),
            cursor.create_user().await.unwrap(),
        );
        let p2p = cursor.enter_p2p(a, b).await.unwrap();

        assert_eq!(
            cursor.enter_chat(p2p, c).await.unwrap_err(),
            StoreError::MaxMembers,
        );
        assert_eq!(cursor.get_chat(p2p).await.unwrap().size(), 2);
    }

    #[tokio::test]
    async fn duplicate_report_is_rejected() {
        let (_store, cursor) = store_and_cursor().await;
        let (reporter, target) = (
            cursor.create_user().await.unwrap(),
            cursor.create_user().await.unwrap(),
        );

        cursor.create_complaint(reporter, target, "spam").await.unwrap();
        assert_eq!(
            cursor.create_complaint(reporter, target, "spam again").await.unwrap_err(),
            StoreError::Validation("User already reported".to_string()),
        );

        // The reverse direction is a different pair.
        cursor.create_complaint(target, reporter, "retaliation").await.unwrap();
        assert_eq!(cursor.get_complaint_list().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn complaints_ban_at_threshold_and_are_reviewed_once() {
        let (_store, cursor) = store_and_cursor().await;
        let target = cursor.create_user().await.unwrap();
        for _ in 0..3 {
            let reporter = cursor.create_user().await.unwrap();
            cursor.create_complaint(reporter, target, "abuse").await.unwrap();
        }

        let now = Utc::now();
        assert_eq!(cursor.review_pending_complaints(3, now).await.unwrap(), 3);

        let user = cursor.get_user(target).await.unwrap();
        assert!(user.is_banned);
        assert_eq!(user.banned_when, Some(now));

        // Everything was marked reviewed; a second sweep finds nothing.
        assert_eq!(cursor.review_pending_complaints(3, Utc::now()).await.unwrap(), 0);
        assert!(cursor
            .get_complaint_list()
            .await
            .unwrap()
            .iter()
            .all(|c| c.reviewed));
    }

    #[tokio::test]
    async fn two_complaints_only_increment_the_counter() {
        let (_store, cursor) = store_and_cursor().await;
        let target = cursor.create_user().await.unwrap();
        for _ in 0..2 {
            let reporter = cursor.create_user().await.unwrap();
            cursor.create_complaint(reporter, target, "noise").await.unwrap();
        }

        cursor.review_pending_complaints(3, Utc::now()).await.unwrap();

        let user = cursor.get_user(target).await.unwrap();
        assert!(!user.is_banned);
        assert_eq!(user.reported_times, 2);
    }

    #[tokio::test]
    async fn elapsed_bans_expire_fresh_ones_do_not() {
        let (store, cursor) = store_and_cursor().await;
        let old = cursor.create_user().await.unwrap();
        let fresh = cursor.create_user().await.unwrap();

        let now = Utc::now();
        {
            let mut inner = store.inner.lock().await;
            let user = inner.users.get_mut(&old).unwrap();
            user.is_banned = true;
            user.banned_when = Some(now - Duration::hours(5));
            let user = inner.users.get_mut(&fresh).unwrap();
            user.is_banned = true;
            user.banned_when = Some(now);
        }

        assert_eq!(cursor.expire_bans(Duration::hours(4), now).await.unwrap(), 1);

        let old_user = cursor.get_user(old).await.unwrap();
        assert!(!old_user.is_banned);
        assert_eq!(old_user.banned_when, None);
        assert!(cursor.get_user(fresh).await.unwrap().is_banned);

        // The unbanned user can post again.
        cursor.write_to_chat(old, None, "back", None, None).await.unwrap();
    }

    #[tokio::test]
    async fn get_user_list_returns_every_registration() {
        let (_store, cursor) = store_and_cursor().await;
        for _ in 0..3 {
            cursor.create_user().await.unwrap();
        }
        assert_eq!(cursor.get_user_list().await.unwrap().len(), 3);
    }
}
