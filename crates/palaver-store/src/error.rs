use thiserror::Error;

/// Errors produced by the store layer.
///
/// Every variant is caller-caused and its display string is surfaced to the
/// client verbatim in the `fail` envelope.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A cursor was used outside its admitted window.
    #[error("Operation is rejected because no established connection found")]
    NotConnected,

    /// A referenced user, chat or message is absent.
    #[error("Requested object is not present in database")]
    NotExist,

    /// The per-window message limit on the default chat was hit.
    #[error("Message limit is achieved. Please try again later.")]
    MsgLimitExceeded,

    /// The author is currently banned.
    #[error("You have been banned. Please try again later.")]
    Banned,

    /// A peer-to-peer chat already has two members.
    #[error("Max member count is exceeded.")]
    MaxMembers,

    /// A business-rule violation in caller-supplied data.
    #[error("{0}")]
    Validation(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;
