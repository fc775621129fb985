//! Request dispatch: one wire line in, one JSON document out.
//!
//! The dispatcher parses the line, routes over an explicit `(method, path)`
//! match, and wraps the handler in acquire-cursor / run / release-cursor.
//! The cursor is released on every exit path. Domain errors surface verbatim
//! in the `fail` envelope; everything malformed collapses into the one
//! generic unsupported message.

use serde_json::Value;
use thiserror::Error;

use palaver_proto::{fail, Method, Request, INTERNAL_ERROR_MSG, UNSUPPORTED_MSG};
use palaver_store::{ChatStore, Cursor, StoreError};

use crate::config::ServerConfig;
use crate::handlers;

/// Handler-level failure: either a malformed request or a domain error.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{UNSUPPORTED_MSG}")]
    Unsupported,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Handle one raw request line, producing the response document as a string.
/// Never fails: every error becomes a `fail` envelope.
pub async fn handle_line(store: &ChatStore, config: &ServerConfig, line: &str) -> String {
    let response = match Request::parse(line) {
        Ok(request) => dispatch(store, config, request).await,
        Err(error) => {
            tracing::debug!(%error, "rejected request line");
            fail(UNSUPPORTED_MSG)
        }
    };

    serde_json::to_string(&response).unwrap_or_else(|error| {
        tracing::error!(%error, "failed to serialize response");
        format!(r#"{{"fail":"{INTERNAL_ERROR_MSG}"}}"#)
    })
}

async fn dispatch(store: &ChatStore, config: &ServerConfig, request: Request) -> Value {
    let cursor = store.connect().await;
    let result = route(&cursor, store, config, &request).await;
    // Release before mapping the result so the admission slot is returned on
    // success and failure alike.
    cursor.disconnect().await;

    match result {
        Ok(payload) => payload,
        Err(ApiError::Unsupported) => fail(UNSUPPORTED_MSG),
        Err(ApiError::Store(error)) => {
            tracing::debug!(method = request.method.as_str(), path = %request.path, %error, "request failed");
            fail(error.to_string())
        }
    }
}

async fn route(
    cursor: &Cursor,
    store: &ChatStore,
    config: &ServerConfig,
    request: &Request,
) -> Result<Value, ApiError> {
    match (request.method, request.path.as_str()) {
        (Method::Post, "/connect") => handlers::register(cursor).await,
        (Method::Get, "/status") => handlers::get_status(cursor, store, &request.body).await,
        (Method::Post, "/send") => handlers::add_message(cursor, config, &request.body).await,
        (Method::Get, "/chats") => handlers::get_chats(cursor, config, &request.body).await,
        (Method::Post, "/connect_p2p") => handlers::connect_p2p(cursor, &request.body).await,
        (Method::Post, "/chats/exit") => handlers::exit_chat(cursor, &request.body).await,
        (Method::Post, "/report_user") => handlers::report_user(cursor, &request.body).await,
        _ => Err(ApiError::Unsupported),
    }
}
