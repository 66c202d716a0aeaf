//! Protocol error types.

use thiserror::Error;

/// Errors that can occur while encoding or decoding protocol data.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: u32, max: u32 },

    #[error("frame too short: {size} bytes")]
    FrameTooShort { size: u32 },

    #[error("invalid frame flags: {0:#04x}")]
    InvalidFlags(u8),

    #[error("truncated credentials in authenticated frame")]
    TruncatedCredentials,

    #[error("credential field '{field}' too long: {len} bytes (max 255)")]
    CredentialTooLong { field: &'static str, len: usize },

    #[error("invalid UTF-8 in credential field '{0}'")]
    InvalidUtf8(&'static str),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
