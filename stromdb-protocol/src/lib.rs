//! # stromdb-protocol
//!
//! Wire protocol implementation for the StromDB TCP interface.
//!
//! This crate provides:
//! - Binary framing with length prefix and per-frame credentials
//! - The command byte table, including pass-through for unknown commands
//! - JSON message types for the subscription and admin command families
//! - Error types and protocol constants

pub mod command;
pub mod error;
pub mod frame;
pub mod message;

pub use command::Command;
pub use error::ProtocolError;
pub use frame::{Credentials, Flags, Frame, FRAME_FIXED_SIZE, LENGTH_PREFIX_SIZE};
pub use message::{EventId, EventRecord, NakAction, ResolvedEvent};

/// Protocol version supported by this implementation.
pub const PROTOCOL_VERSION: u16 = 1;

/// Default port for a StromDB node.
pub const DEFAULT_PORT: u16 = 1113;

/// Maximum frame size counted after the length prefix (16 MiB).
pub const MAX_FRAME_SIZE: u32 = 16 * 1024 * 1024;
