//! # palaver-proto
//!
//! The wire protocol shared by the palaver server and client.
//!
//! A request is a single line, `<METHOD> <PATH> <JSON-or-empty>`, and the
//! response is a single JSON document. Failures of any kind are reported as
//! `{"fail": "<reason>"}` with no further structure, so the client never has
//! to distinguish transport from domain errors.

use serde::Serialize;
use thiserror::Error;

/// Failure message for unknown routes, unknown methods and malformed bodies.
/// Parser internals are never surfaced to the client.
pub const UNSUPPORTED_MSG: &str = "method or url is not supported";

/// Failure message for unexpected server-side errors. The detail is logged,
/// not sent.
pub const INTERNAL_ERROR_MSG: &str = "internal server error";

/// Upper bound on an accepted request line, in bytes.
pub const MAX_REQUEST_BYTES: u64 = 64_000;

/// Errors produced while parsing a request line.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtoError {
    /// The line was empty or had fewer than two tokens.
    #[error("malformed request line")]
    MalformedLine,

    /// The method token was neither `GET` nor `POST`.
    #[error("unknown method: {0}")]
    UnknownMethod(String),

    /// The body was present but not valid JSON.
    #[error("malformed request body")]
    MalformedBody,
}

/// Request method. The protocol only ever uses these two.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    fn parse(token: &str) -> Result<Self, ProtoError> {
        match token {
            "GET" => Ok(Self::Get),
            "POST" => Ok(Self::Post),
            other => Err(ProtoError::UnknownMethod(other.to_string())),
        }
    }

    /// Wire spelling of the method.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }
}

/// A parsed request line.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub path: String,
    /// Parsed body; `Value::Null` when the body was empty.
    pub body: serde_json::Value,
}

impl Request {
    /// Parse a request line.
    ///
    /// The line is split on whitespace at most twice: everything after the
    /// path is consumed as one JSON token, so body values may contain spaces.
    pub fn parse(line: &str) -> Result<Self, ProtoError> {
        let line = line.trim();
        let mut tokens = line.splitn(3, char::is_whitespace);

        let method = match tokens.next() {
            Some(token) if !token.is_empty() => Method::parse(token)?,
            _ => return Err(ProtoError::MalformedLine),
        };
        let path = match tokens.next() {
            Some(token) if !token.is_empty() => token.to_string(),
            _ => return Err(ProtoError::MalformedLine),
        };
        let body = match tokens.next().map(str::trim) {
            None | Some("") => serde_json::Value::Null,
            Some(raw) => serde_json::from_str(raw).map_err(|_| ProtoError::MalformedBody)?,
        };

        Ok(Self { method, path, body })
    }

    /// Render the request back into its wire form (used by the client).
    pub fn to_line(&self) -> String {
        if self.body.is_null() {
            format!("{} {} ", self.method.as_str(), self.path)
        } else {
            format!("{} {} {}", self.method.as_str(), self.path, self.body)
        }
    }
}

/// The uniform failure envelope.
#[derive(Debug, Serialize)]
pub struct Fail {
    pub fail: String,
}

/// Build a `{"fail": ...}` response value.
pub fn fail(reason: impl Into<String>) -> serde_json::Value {
    serde_json::json!({ "fail": reason.into() })
}
