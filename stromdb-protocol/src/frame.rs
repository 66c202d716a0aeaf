//! Binary frame format for the StromDB TCP protocol.
//!
//! Frame layout:
//!
//! ```text
//! +--------------+---------+-------+----------------+------------------+----------+
//! | Frame Length | Command | Flags | Correlation Id | Login + Password | Payload  |
//! | 4 bytes (LE) | 1 byte  | 1 byte| 16 bytes       | if authenticated | variable |
//! +--------------+---------+-------+----------------+------------------+----------+
//! ```
//!
//! The length prefix counts everything after itself. Credentials are two
//! `u8`-length-prefixed strings (login, then password) and are present
//! exactly when the `AUTHENTICATED` flag is set, so an empty password on an
//! authenticated frame stays distinguishable from no credentials at all.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use uuid::Uuid;

use crate::command::Command;
use crate::error::ProtocolError;
use crate::MAX_FRAME_SIZE;

/// Size of the frame length prefix in bytes.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Size of the fixed portion after the length prefix:
/// command (1) + flags (1) + correlation id (16).
pub const FRAME_FIXED_SIZE: usize = 18;

/// Maximum encoded length of a single credential field.
pub const MAX_CREDENTIAL_LEN: usize = 255;

/// Frame flags byte.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Flags(u8);

impl Flags {
    /// Credentials are attached to this frame.
    pub const AUTHENTICATED: u8 = 1 << 0;

    /// Bits defined by protocol version 1.
    const VALID_MASK: u8 = 0x01;

    pub fn new() -> Self {
        Flags(0)
    }

    pub fn with_authenticated(mut self) -> Self {
        self.0 |= Self::AUTHENTICATED;
        self
    }

    pub fn is_authenticated(&self) -> bool {
        self.0 & Self::AUTHENTICATED != 0
    }

    pub fn bits(&self) -> u8 {
        self.0
    }

    /// Validates and wraps a raw flags byte.
    pub fn from_bits(bits: u8) -> Result<Self, ProtocolError> {
        if bits & !Self::VALID_MASK != 0 {
            return Err(ProtocolError::InvalidFlags(bits));
        }
        Ok(Flags(bits))
    }
}

/// Login/password pair attached to an authenticated frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub login: String,
    pub password: String,
}

impl Credentials {
    pub fn new(login: impl Into<String>, password: impl Into<String>) -> Self {
        Credentials {
            login: login.into(),
            password: password.into(),
        }
    }

    /// Encoded size: two u8 length prefixes plus the field bytes.
    fn encoded_len(&self) -> usize {
        2 + self.login.len() + self.password.len()
    }
}

/// A single protocol frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Command identifying the payload's message family.
    pub command: Command,
    /// Correlates this frame with the operation that initiated the exchange.
    pub correlation_id: Uuid,
    /// Per-frame credentials; `None` for unauthenticated frames.
    pub credentials: Option<Credentials>,
    /// Message body, typically JSON. May be empty.
    pub payload: Bytes,
}

impl Frame {
    /// Creates an unauthenticated frame.
    pub fn new(command: Command, correlation_id: Uuid, payload: Bytes) -> Self {
        Frame {
            command,
            correlation_id,
            credentials: None,
            payload,
        }
    }

    /// Creates a frame whose payload is the JSON encoding of `body`.
    pub fn from_json<T: serde::Serialize>(
        command: Command,
        correlation_id: Uuid,
        body: &T,
    ) -> Result<Self, ProtocolError> {
        let payload = serde_json::to_vec(body)?;
        Ok(Frame::new(command, correlation_id, Bytes::from(payload)))
    }

    /// Attaches credentials, or strips them with `None`.
    pub fn with_credentials(mut self, credentials: Option<Credentials>) -> Self {
        self.credentials = credentials;
        self
    }

    /// Flags byte derived from the frame contents.
    pub fn flags(&self) -> Flags {
        if self.credentials.is_some() {
            Flags::new().with_authenticated()
        } else {
            Flags::new()
        }
    }

    /// Deserializes the payload as JSON.
    pub fn body_as<T: serde::de::DeserializeOwned>(&self) -> Result<T, ProtocolError> {
        Ok(serde_json::from_slice(&self.payload)?)
    }

    /// Encodes the frame into a byte buffer.
    pub fn encode(&self) -> Result<BytesMut, ProtocolError> {
        let credentials_len = match &self.credentials {
            Some(credentials) => {
                if credentials.login.len() > MAX_CREDENTIAL_LEN {
                    return Err(ProtocolError::CredentialTooLong {
                        field: "login",
                        len: credentials.login.len(),
                    });
                }
                if credentials.password.len() > MAX_CREDENTIAL_LEN {
                    return Err(ProtocolError::CredentialTooLong {
                        field: "password",
                        len: credentials.password.len(),
                    });
                }
                credentials.encoded_len()
            }
            None => 0,
        };

        let content_len = FRAME_FIXED_SIZE + credentials_len + self.payload.len();
        if content_len > MAX_FRAME_SIZE as usize {
            return Err(ProtocolError::FrameTooLarge {
                size: content_len as u32,
                max: MAX_FRAME_SIZE,
            });
        }

        let mut buf = BytesMut::with_capacity(LENGTH_PREFIX_SIZE + content_len);

        // Frame length (4 bytes, little-endian)
        buf.put_u32_le(content_len as u32);

        // Command (1 byte)
        buf.put_u8(self.command.to_u8());

        // Flags (1 byte)
        buf.put_u8(self.flags().bits());

        // Correlation id (16 bytes)
        buf.put_slice(self.correlation_id.as_bytes());

        // Credentials (only when authenticated)
        if let Some(credentials) = &self.credentials {
            buf.put_u8(credentials.login.len() as u8);
            buf.put_slice(credentials.login.as_bytes());
            buf.put_u8(credentials.password.len() as u8);
            buf.put_slice(credentials.password.as_bytes());
        }

        // Payload
        buf.put_slice(&self.payload);

        Ok(buf)
    }

    /// Decodes a frame from a byte buffer.
    ///
    /// Returns `Ok(Some(frame))` when a complete frame was consumed,
    /// `Ok(None)` when more data is needed, or an error for malformed
    /// input. Decoding an unknown command byte is not an error: the frame
    /// comes back with [`Command::Unhandled`].
    pub fn decode(buf: &mut BytesMut) -> Result<Option<Frame>, ProtocolError> {
        if buf.len() < LENGTH_PREFIX_SIZE {
            return Ok(None);
        }

        // Peek at the length prefix without consuming it
        let content_len = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;

        if content_len > MAX_FRAME_SIZE as usize {
            return Err(ProtocolError::FrameTooLarge {
                size: content_len as u32,
                max: MAX_FRAME_SIZE,
            });
        }
        if content_len < FRAME_FIXED_SIZE {
            return Err(ProtocolError::FrameTooShort {
                size: content_len as u32,
            });
        }

        if buf.len() < LENGTH_PREFIX_SIZE + content_len {
            return Ok(None);
        }

        buf.advance(LENGTH_PREFIX_SIZE);
        let mut content = buf.split_to(content_len);

        let command = Command::from_u8(content.get_u8());
        let flags = Flags::from_bits(content.get_u8())?;

        let mut correlation = [0u8; 16];
        content.copy_to_slice(&mut correlation);
        let correlation_id = Uuid::from_bytes(correlation);

        let credentials = if flags.is_authenticated() {
            Some(Self::read_credentials(&mut content)?)
        } else {
            None
        };

        Ok(Some(Frame {
            command,
            correlation_id,
            credentials,
            payload: content.freeze(),
        }))
    }

    fn read_credentials(content: &mut BytesMut) -> Result<Credentials, ProtocolError> {
        let login = Self::read_credential_field(content, "login")?;
        let password = Self::read_credential_field(content, "password")?;
        Ok(Credentials { login, password })
    }

    fn read_credential_field(
        content: &mut BytesMut,
        field: &'static str,
    ) -> Result<String, ProtocolError> {
        if content.is_empty() {
            return Err(ProtocolError::TruncatedCredentials);
        }
        let len = content.get_u8() as usize;
        if content.len() < len {
            return Err(ProtocolError::TruncatedCredentials);
        }
        let value = std::str::from_utf8(&content[..len])
            .map_err(|_| ProtocolError::InvalidUtf8(field))?
            .to_string();
        content.advance(len);
        Ok(value)
    }
}
