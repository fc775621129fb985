//! # palaver-store
//!
//! In-memory storage for the palaver chat service.
//!
//! The [`ChatStore`] owns every user, chat and complaint record and bounds
//! the number of simultaneously admitted accessors. All reads and writes go
//! through a [`Cursor`], a token-checked handle that is only valid between
//! `connect()` and `disconnect()`. Nothing is persisted to disk; a process
//! restart starts from an empty store.

pub mod cursor;
pub mod models;
pub mod store;

mod error;

pub use cursor::{Cursor, MessageLimit};
pub use error::{Result, StoreError};
pub use models::*;
pub use store::ChatStore;
