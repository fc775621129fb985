//! One handler per endpoint.
//!
//! Handlers receive an already-admitted cursor, deserialize their body into
//! a typed request struct and return a JSON-serializable payload. Missing or
//! mistyped fields surface as [`ApiError::Unsupported`]; domain failures
//! bubble up as [`StoreError`] values for the dispatcher to map.

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use palaver_store::{ChatStore, Cursor, StoreError};

use crate::config::ServerConfig;
use crate::dispatch::ApiError;

fn parse_body<T: DeserializeOwned>(body: &Value) -> Result<T, ApiError> {
    serde_json::from_value(body.clone()).map_err(|_| ApiError::Unsupported)
}

// ---------------------------------------------------------------------------
// POST /connect
// ---------------------------------------------------------------------------

/// Register a new user and auto-enter them into the default chat.
pub async fn register(cursor: &Cursor) -> Result<Value, ApiError> {
    let user_id = cursor.create_user().await?;
    let default_chat = cursor.get_default_chat_id().await?;
    cursor.enter_chat(default_chat, user_id).await?;
    Ok(json!({ "token": user_id }))
}

// ---------------------------------------------------------------------------
// GET /status
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct StatusRequest {
    user_id: Uuid,
}

pub async fn get_status(
    cursor: &Cursor,
    store: &ChatStore,
    body: &Value,
) -> Result<Value, ApiError> {
    let req: StatusRequest = parse_body(body)?;

    let user = cursor.get_user(req.user_id).await?;
    let default_chat = cursor.get_default_chat_id().await?;
    let chats = cursor.get_chat_list().await?;
    let with_user = chats
        .iter()
        .filter(|chat| chat.authors.contains(&req.user_id))
        .count();

    Ok(json!({
        "time": Utc::now(),
        "connections_db_max": store.max_connections(),
        "connections_db_now": store.connection_count().await,
        "chat_default": default_chat,
        "chats_count": chats.len(),
        "chats_with_user_count": with_user,
        "user": user,
    }))
}

// ---------------------------------------------------------------------------
// POST /send
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct SendRequest {
    author_id: Uuid,
    #[serde(default)]
    chat_id: Option<Uuid>,
    message: String,
    #[serde(default)]
    comment_on: Option<Uuid>,
}

pub async fn add_message(
    cursor: &Cursor,
    config: &ServerConfig,
    body: &Value,
) -> Result<Value, ApiError> {
    let req: SendRequest = parse_body(body)?;

    let limit = config.message_limit();
    let message_id = cursor
        .write_to_chat(
            req.author_id,
            req.chat_id,
            &req.message,
            req.comment_on,
            limit.as_ref(),
        )
        .await?;
    Ok(json!({ "id": message_id }))
}

// ---------------------------------------------------------------------------
// GET /chats
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct ChatsRequest {
    user_id: Uuid,
    #[serde(default)]
    chat_id: Option<Uuid>,
    #[serde(default)]
    msg_count: Option<usize>,
}

/// Without `chat_id`: the chats the user is a member of. With `chat_id`:
/// that chat's history.
pub async fn get_chats(
    cursor: &Cursor,
    config: &ServerConfig,
    body: &Value,
) -> Result<Value, ApiError> {
    let req: ChatsRequest = parse_body(body)?;
    let msg_count = req.msg_count.unwrap_or(config.msg_count);

    let user = cursor.get_user(req.user_id).await?;

    if let Some(chat_id) = req.chat_id {
        let chat = cursor.get_chat(chat_id).await?;
        return Ok(json!({ "history": chat.view(msg_count) }));
    }

    let chats: Vec<_> = cursor
        .get_chat_list()
        .await?
        .iter()
        .filter(|chat| chat.authors.contains(&user.id))
        .map(|chat| chat.view(msg_count))
        .collect();
    Ok(json!({ "chats": chats }))
}

// ---------------------------------------------------------------------------
// POST /connect_p2p
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct ConnectP2pRequest {
    user_id: Uuid,
    other_user_id: Uuid,
}

pub async fn connect_p2p(cursor: &Cursor, body: &Value) -> Result<Value, ApiError> {
    let req: ConnectP2pRequest = parse_body(body)?;
    let chat_id = cursor.enter_p2p(req.user_id, req.other_user_id).await?;
    Ok(json!({ "chat_id": chat_id }))
}

// ---------------------------------------------------------------------------
// POST /chats/exit
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct ExitChatRequest {
    user_id: Uuid,
    chat_id: Uuid,
}

pub async fn exit_chat(cursor: &Cursor, body: &Value) -> Result<Value, ApiError> {
    let req: ExitChatRequest = parse_body(body)?;
    cursor.leave_chat(req.chat_id, req.user_id).await?;
    Ok(json!({}))
}

// ---------------------------------------------------------------------------
// POST /report_user
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct ReportUserRequest {
    user_id: Uuid,
    reported_user_id: Uuid,
    #[serde(default)]
    reason: Option<String>,
}

pub async fn report_user(cursor: &Cursor, body: &Value) -> Result<Value, ApiError> {
    let req: ReportUserRequest = parse_body(body)?;

    let reason = match req.reason.as_deref().map(str::trim) {
        Some(reason) if !reason.is_empty() => reason,
        _ => {
            return Err(StoreError::Validation("Reason is required".to_string()).into());
        }
    };

    let complaint_id = cursor
        .create_complaint(req.user_id, req.reported_user_id, reason)
        .await?;
    Ok(json!({ "id": complaint_id }))
}
