//! # palaver-client
//!
//! A thin line client for the palaver server: one TCP connection per
//! request, one JSON document back. The client only knows the wire protocol;
//! all domain rules live server-side.

use serde_json::{json, Value};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::debug;

use palaver_proto::{Method, Request};

/// Errors produced by the client.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The server response was not a JSON document.
    #[error("Invalid server response: {0}")]
    BadResponse(#[from] serde_json::Error),

    /// The server answered with a `fail` envelope.
    #[error("{0}")]
    Fail(String),

    /// A helper that needs a token was called before `signup`.
    #[error("Not signed up yet")]
    NoToken,
}

pub type Result<T> = std::result::Result<T, ClientError>;

/// A client bound to one server address, optionally holding a user token.
#[derive(Debug, Clone)]
pub struct ChatClient {
    addr: String,
    pub token: Option<String>,
}

impl ChatClient {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            token: None,
        }
    }

    /// Adopt an existing token instead of signing up.
    pub fn force_login(&mut self, token: impl Into<String>) {
        self.token = Some(token.into());
    }

    fn token(&self) -> Result<&str> {
        self.token.as_deref().ok_or(ClientError::NoToken)
    }

    /// Send a raw request line and return the raw response line.
    pub async fn exchange(&self, line: &str) -> Result<String> {
        debug!(request = line, "sending");
        let stream = TcpStream::connect(&self.addr).await?;
        let (reader, mut writer) = stream.into_split();

        writer.write_all(line.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;

        let mut response = String::new();
        BufReader::new(reader).read_line(&mut response).await?;
        debug!(response = response.trim_end(), "received");
        Ok(response.trim_end().to_string())
    }

    async fn request(&self, method: Method, path: &str, body: Value) -> Result<Value> {
        let line = request_line(method, path, body);
        let raw = self.exchange(&line).await?;
        let value: Value = serde_json::from_str(&raw)?;
        if let Some(reason) = value.get("fail").and_then(Value::as_str) {
            return Err(ClientError::Fail(reason.to_string()));
        }
        Ok(value)
    }

    pub async fn get(&self, path: &str, body: Value) -> Result<Value> {
        self.request(Method::Get, path, body).await
    }

    pub async fn post(&self, path: &str, body: Value) -> Result<Value> {
        self.request(Method::Post, path, body).await
    }

    // -- endpoint helpers ---------------------------------------------------

    /// Register and remember the returned token.
    pub async fn signup(&mut self) -> Result<String> {
        let response = self.post("/connect", Value::Null).await?;
        let token = response["token"]
            .as_str()
            .ok_or(ClientError::Fail("no token in response".to_string()))?
            .to_string();
        self.token = Some(token.clone());
        Ok(token)
    }

    pub async fn status(&self) -> Result<Value> {
        let body = json!({ "user_id": self.token()? });
        self.get("/status", body).await
    }

    /// Post a message; `chat_id = None` targets the default chat.
    pub async fn send_message(
        &self,
        chat_id: Option<&str>,
        message: &str,
        comment_on: Option<&str>,
    ) -> Result<Value> {
        let body = send_body(self.token()?, chat_id, message, comment_on);
        self.post("/send", body).await
    }

    /// The chats this user is a member of.
    pub async fn chat_list(&self) -> Result<Value> {
        let body = json!({ "user_id": self.token()? });
        self.get("/chats", body).await
    }

    /// History of one chat.
    pub async fn chat_history(&self, chat_id: &str, msg_count: Option<usize>) -> Result<Value> {
        let mut body = json!({ "user_id": self.token()?, "chat_id": chat_id });
        if let Some(count) = msg_count {
            body["msg_count"] = count.into();
        }
        self.get("/chats", body).await
    }

    /// Find or create the private chat with another user.
    pub async fn connect_p2p(&self, other_user_id: &str) -> Result<Value> {
        let body = json!({ "user_id": self.token()?, "other_user_id": other_user_id });
        self.post("/connect_p2p", body).await
    }

    pub async fn exit_chat(&self, chat_id: &str) -> Result<Value> {
        let body = json!({ "user_id": self.token()?, "chat_id": chat_id });
        self.post("/chats/exit", body).await
    }

    pub async fn report_user(&self, reported_user_id: &str, reason: &str) -> Result<Value> {
        let body = json!({
            "user_id": self.token()?,
            "reported_user_id": reported_user_id,
            "reason": reason,
        });
        self.post("/report_user", body).await
    }
}

fn request_line(method: Method, path: &str, body: Value) -> String {
    Request {
        method,
        path: path.to_string(),
        body,
    }
    .to_line()
}

fn send_body(
    author_id: &str,
    chat_id: Option<&str>,
    message: &str,
    comment_on: Option<&str>,
) -> Value {
    let mut body = json!({
        "author_id": author_id,
        "chat_id": chat_id,
        "message": message,
    });
    if let Some(target) = comment_on {
        body["comment_on"] = target.into();
    }
    body
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signup_line_has_an_empty_body() {
        assert_eq!(
            request_line(Method::Post, "/connect", Value::Null),
            "POST /connect ",
        );
    }

    #[test]
    fn send_body_defaults_to_a_null_chat() {
        let body = send_body("user-1", None, "hello, world!", None);
        assert_eq!(body["author_id"], "user-1");
        assert_eq!(body["chat_id"], Value::Null);
        assert_eq!(body["message"], "hello, world!");
        assert!(body.get("comment_on").is_none());
    }

    #[test]
    fn send_body_carries_a_comment_target() {
        let body = send_body("user-1", Some("chat-1"), "reply", Some("msg-1"));
        assert_eq!(body["chat_id"], "chat-1");
        assert_eq!(body["comment_on"], "msg-1");
    }

    #[test]
    fn status_line_round_trips_through_the_parser() {
        let line = request_line(Method::Get, "/status", json!({ "user_id": "u" }));
        let parsed = Request::parse(&line).unwrap();
        assert_eq!(parsed.method, Method::Get);
        assert_eq!(parsed.path, "/status");
        assert_eq!(parsed.body["user_id"], "u");
    }

    #[test]
    fn helpers_require_a_token() {
        let client = ChatClient::new("127.0.0.1:8001");
        assert!(matches!(client.token(), Err(ClientError::NoToken)));

        let mut client = client;
        client.force_login("some-token");
        assert_eq!(client.token().unwrap(), "some-token");
    }
}
