//! The [`ChatStore`]: record ownership plus the cursor admission gate.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use uuid::Uuid;

use crate::cursor::Cursor;
use crate::models::{Chat, ChatKind, Complaint, User};

/// Name of the lazily-created default chat.
pub const DEFAULT_CHAT_NAME: &str = "default";

/// How long `connect()` sleeps between admission checks.
const CONNECT_RETRY_INTERVAL: Duration = Duration::from_millis(50);

/// Everything behind the store's single coarse lock. Multi-step operations
/// hold the lock for their whole duration, so their steps never interleave.
#[derive(Debug, Default)]
pub(crate) struct StoreInner {
    pub connections: HashSet<u64>,
    next_token: u64,
    pub users: HashMap<Uuid, User>,
    pub chats: HashMap<Uuid, Chat>,
    pub complaints: HashMap<Uuid, Complaint>,
    pub default_chat_id: Option<Uuid>,
}

impl StoreInner {
    fn mint_token(&mut self) -> u64 {
        self.next_token += 1;
        self.next_token
    }

    /// Return the default chat id, creating and memoizing the chat on first
    /// use.
    pub fn ensure_default_chat(&mut self) -> Uuid {
        if let Some(id) = self.default_chat_id {
            return id;
        }
        let id = fresh_id(&self.chats);
        self.chats
            .insert(id, Chat::new(id, DEFAULT_CHAT_NAME, ChatKind::Common));
        self.default_chat_id = Some(id);
        id
    }
}

/// Pick an id not yet present in `map`. Collisions are vanishingly unlikely
/// but the retry is part of the contract.
pub(crate) fn fresh_id<V>(map: &HashMap<Uuid, V>) -> Uuid {
    loop {
        let id = Uuid::new_v4();
        if !map.contains_key(&id) {
            return id;
        }
    }
}

/// Owns all chat/user/complaint records and bounds the number of
/// concurrently admitted cursors.
///
/// Cloning is cheap: clones share the same underlying state.
#[derive(Debug, Clone)]
pub struct ChatStore {
    max_connections: usize,
    pub(crate) inner: Arc<Mutex<StoreInner>>,
}

impl ChatStore {
    pub fn new(max_connections: usize) -> Self {
        Self {
            max_connections,
            inner: Arc::new(Mutex::new(StoreInner::default())),
        }
    }

    /// The configured admission limit.
    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    /// Wait for admission and return a fresh cursor.
    ///
    /// The gate only blocks while the admitted count is strictly *greater*
    /// than `max_connections`: a cursor arriving at exactly the limit is
    /// still admitted, so the effective ceiling is `max_connections + 1`.
    pub async fn connect(&self) -> Cursor {
        loop {
            {
                let mut inner = self.inner.lock().await;
                if inner.connections.len() <= self.max_connections {
                    let token = inner.mint_token();
                    inner.connections.insert(token);
                    return Cursor::new(self.clone(), token);
                }
            }
            tokio::time::sleep(CONNECT_RETRY_INTERVAL).await;
        }
    }

    /// Revoke a token. Idempotent: unknown and already-revoked tokens are
    /// ignored.
    pub async fn disconnect(&self, token: u64) {
        self.inner.lock().await.connections.remove(&token);
    }

    /// Whether a token is currently admitted.
    pub async fn check_connected(&self, token: u64) -> bool {
        self.inner.lock().await.connections.contains(&token)
    }

    /// Number of currently admitted cursors.
    pub async fn connection_count(&self) -> usize {
        self.inner.lock().await.connections.len()
    }
}
