//! TCP command byte table.

/// Command carried in the frame header, identifying the message family of
/// the payload.
///
/// Every byte maps to a command: bytes this driver does not know decode to
/// [`Command::Unhandled`] so they can be routed (and logged) instead of
/// failing the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    HeartbeatRequest,
    HeartbeatResponse,
    Ping,
    Pong,

    WriteEvents,
    WriteEventsCompleted,
    DeleteStream,
    DeleteStreamCompleted,

    ReadEvent,
    ReadEventCompleted,
    ReadStreamEventsForward,
    ReadStreamEventsForwardCompleted,
    ReadStreamEventsBackward,
    ReadStreamEventsBackwardCompleted,
    ReadAllEventsForward,
    ReadAllEventsForwardCompleted,
    ReadAllEventsBackward,
    ReadAllEventsBackwardCompleted,

    SubscribeToStream,
    SubscriptionConfirmation,
    StreamEventAppeared,
    UnsubscribeFromStream,
    SubscriptionDropped,

    ConnectToPersistentSubscription,
    PersistentSubscriptionConfirmation,
    PersistentSubscriptionStreamEventAppeared,
    CreatePersistentSubscription,
    CreatePersistentSubscriptionCompleted,
    DeletePersistentSubscription,
    DeletePersistentSubscriptionCompleted,
    PersistentSubscriptionAckEvents,
    PersistentSubscriptionNakEvents,
    UpdatePersistentSubscription,
    UpdatePersistentSubscriptionCompleted,

    BadRequest,
    NotHandled,
    Authenticate,
    Authenticated,
    NotAuthenticated,
    IdentifyClient,
    ClientIdentified,

    /// A command byte with no known meaning, passed through unchanged.
    Unhandled(u8),
}

impl Command {
    /// Decodes a command byte. Total: unknown bytes become `Unhandled`.
    pub fn from_u8(value: u8) -> Self {
        match value {
            0x01 => Command::HeartbeatRequest,
            0x02 => Command::HeartbeatResponse,
            0x03 => Command::Ping,
            0x04 => Command::Pong,

            0x82 => Command::WriteEvents,
            0x83 => Command::WriteEventsCompleted,
            0x8A => Command::DeleteStream,
            0x8B => Command::DeleteStreamCompleted,

            0xB0 => Command::ReadEvent,
            0xB1 => Command::ReadEventCompleted,
            0xB2 => Command::ReadStreamEventsForward,
            0xB3 => Command::ReadStreamEventsForwardCompleted,
            0xB4 => Command::ReadStreamEventsBackward,
            0xB5 => Command::ReadStreamEventsBackwardCompleted,
            0xB6 => Command::ReadAllEventsForward,
            0xB7 => Command::ReadAllEventsForwardCompleted,
            0xB8 => Command::ReadAllEventsBackward,
            0xB9 => Command::ReadAllEventsBackwardCompleted,

            0xC0 => Command::SubscribeToStream,
            0xC1 => Command::SubscriptionConfirmation,
            0xC2 => Command::StreamEventAppeared,
            0xC3 => Command::UnsubscribeFromStream,
            0xC4 => Command::SubscriptionDropped,

            0xC5 => Command::ConnectToPersistentSubscription,
            0xC6 => Command::PersistentSubscriptionConfirmation,
            0xC7 => Command::PersistentSubscriptionStreamEventAppeared,
            0xC8 => Command::CreatePersistentSubscription,
            0xC9 => Command::CreatePersistentSubscriptionCompleted,
            0xCA => Command::DeletePersistentSubscription,
            0xCB => Command::DeletePersistentSubscriptionCompleted,
            0xCC => Command::PersistentSubscriptionAckEvents,
            0xCD => Command::PersistentSubscriptionNakEvents,
            0xCE => Command::UpdatePersistentSubscription,
            0xCF => Command::UpdatePersistentSubscriptionCompleted,

            0xF0 => Command::BadRequest,
            0xF1 => Command::NotHandled,
            0xF2 => Command::Authenticate,
            0xF3 => Command::Authenticated,
            0xF4 => Command::NotAuthenticated,
            0xF5 => Command::IdentifyClient,
            0xF6 => Command::ClientIdentified,

            other => Command::Unhandled(other),
        }
    }

    /// Encodes the command back to its wire byte.
    pub fn to_u8(self) -> u8 {
        match self {
            Command::HeartbeatRequest => 0x01,
            Command::HeartbeatResponse => 0x02,
            Command::Ping => 0x03,
            Command::Pong => 0x04,

            Command::WriteEvents => 0x82,
            Command::WriteEventsCompleted => 0x83,
            Command::DeleteStream => 0x8A,
            Command::DeleteStreamCompleted => 0x8B,

            Command::ReadEvent => 0xB0,
            Command::ReadEventCompleted => 0xB1,
            Command::ReadStreamEventsForward => 0xB2,
            Command::ReadStreamEventsForwardCompleted => 0xB3,
            Command::ReadStreamEventsBackward => 0xB4,
            Command::ReadStreamEventsBackwardCompleted => 0xB5,
            Command::ReadAllEventsForward => 0xB6,
            Command::ReadAllEventsForwardCompleted => 0xB7,
            Command::ReadAllEventsBackward => 0xB8,
            Command::ReadAllEventsBackwardCompleted => 0xB9,

            Command::SubscribeToStream => 0xC0,
            Command::SubscriptionConfirmation => 0xC1,
            Command::StreamEventAppeared => 0xC2,
            Command::UnsubscribeFromStream => 0xC3,
            Command::SubscriptionDropped => 0xC4,

            Command::ConnectToPersistentSubscription => 0xC5,
            Command::PersistentSubscriptionConfirmation => 0xC6,
            Command::PersistentSubscriptionStreamEventAppeared => 0xC7,
            Command::CreatePersistentSubscription => 0xC8,
            Command::CreatePersistentSubscriptionCompleted => 0xC9,
            Command::DeletePersistentSubscription => 0xCA,
            Command::DeletePersistentSubscriptionCompleted => 0xCB,
            Command::PersistentSubscriptionAckEvents => 0xCC,
            Command::PersistentSubscriptionNakEvents => 0xCD,
            Command::UpdatePersistentSubscription => 0xCE,
            Command::UpdatePersistentSubscriptionCompleted => 0xCF,

            Command::BadRequest => 0xF0,
            Command::NotHandled => 0xF1,
            Command::Authenticate => 0xF2,
            Command::Authenticated => 0xF3,
            Command::NotAuthenticated => 0xF4,
            Command::IdentifyClient => 0xF5,
            Command::ClientIdentified => 0xF6,

            Command::Unhandled(raw) => raw,
        }
    }

    /// Whether this command has no known meaning to the driver.
    pub fn is_unhandled(&self) -> bool {
        matches!(self, Command::Unhandled(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_byte_round_trips() {
        for byte in 0u8..=255 {
            let command = Command::from_u8(byte);
            assert_eq!(command.to_u8(), byte);
        }
    }

    #[test]
    fn test_known_commands() {
        assert_eq!(Command::from_u8(0x01), Command::HeartbeatRequest);
        assert_eq!(Command::from_u8(0xC0), Command::SubscribeToStream);
        assert_eq!(Command::from_u8(0xC1), Command::SubscriptionConfirmation);
        assert_eq!(Command::from_u8(0xC5), Command::ConnectToPersistentSubscription);
        assert_eq!(Command::from_u8(0xCC), Command::PersistentSubscriptionAckEvents);
        assert_eq!(Command::from_u8(0xF1), Command::NotHandled);
        assert_eq!(Command::from_u8(0xF4), Command::NotAuthenticated);
    }

    #[test]
    fn test_unknown_byte_is_unhandled_not_error() {
        let command = Command::from_u8(0x55);
        assert_eq!(command, Command::Unhandled(0x55));
        assert!(command.is_unhandled());
        assert!(!Command::Ping.is_unhandled());
    }
}
