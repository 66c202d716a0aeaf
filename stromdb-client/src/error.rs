//! Client error types.

use stromdb_protocol::ProtocolError;
use thiserror::Error;

/// Errors surfaced by the driver.
///
/// Argument and state violations are returned synchronously from the call
/// that caused them. Everything else travels through an operation's
/// completion handle or a subscription's drop notification; inspection
/// itself never propagates errors to the dispatcher.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("illegal state: {0}")]
    IllegalState(String),

    #[error("access denied to stream '{0}'")]
    AccessDenied(String),

    #[error("subscription group '{group}' on stream '{stream}' does not exist")]
    DoesNotExist { group: String, stream: String },

    #[error("subscription group '{group}' on stream '{stream}' already exists")]
    AlreadyExists { group: String, stream: String },

    #[error("subscription group '{group}' on stream '{stream}' failed '{reason}'")]
    OperationFailed {
        group: String,
        stream: String,
        reason: String,
    },

    #[error("persistent subscription deleted")]
    PersistentSubscriptionDeleted,

    #[error("maximum subscribers reached")]
    MaximumSubscribersReached,

    #[error("server error: {0}")]
    ServerError(String),

    #[error("not authenticated: {0}")]
    NotAuthenticated(String),

    #[error("operation '{name}' reached retries limit: {limit}")]
    RetriesLimitReached { name: String, limit: u32 },

    #[error("connection closed")]
    ConnectionClosed,

    #[error("unexpected operation result for '{0}'")]
    UnexpectedResult(String),

    #[error("reached max queue size limit: {0}")]
    MaxQueueSize(usize),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

impl ClientError {
    /// Whether retrying against a fresh connection may help.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ClientError::ConnectionClosed)
    }
}
