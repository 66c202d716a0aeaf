//! JSON message bodies for the subscription and admin command families.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

// ============================================================================
// Events
// ============================================================================

/// Identity of a stored event; the unit of acknowledgement on persistent
/// subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(Uuid);

impl EventId {
    /// Generates a fresh random id.
    pub fn new() -> Self {
        EventId(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        EventId(uuid)
    }

    pub fn uuid(&self) -> Uuid {
        self.0
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl Default for EventId {
    fn default() -> Self {
        EventId::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single recorded event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub event_stream_id: String,
    pub event_number: i64,
    pub event_id: EventId,
    pub event_type: String,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub metadata: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
}

/// An event plus the link event that pointed at it, if the subscription
/// asked the server to resolve links.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResolvedEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<EventRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<EventRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_position: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prepare_position: Option<i64>,
}

impl ResolvedEvent {
    /// The event as the subscriber saw it: the link when this event was
    /// reached through one, otherwise the event itself.
    pub fn original_event(&self) -> Option<&EventRecord> {
        self.link.as_ref().or(self.event.as_ref())
    }

    pub fn original_event_id(&self) -> Option<EventId> {
        self.original_event().map(|event| event.event_id)
    }

    pub fn original_event_number(&self) -> Option<i64> {
        self.original_event().map(|event| event.event_number)
    }

    /// Whether a link event was resolved to its target.
    pub fn is_resolved(&self) -> bool {
        self.link.is_some() && self.event.is_some()
    }
}

// ============================================================================
// Volatile subscriptions
// ============================================================================

/// Opens a volatile subscription on a stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscribeToStream {
    pub event_stream_id: String,
    pub resolve_link_tos: bool,
}

/// Server confirmation of a volatile subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionConfirmation {
    pub last_commit_position: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_event_number: Option<i64>,
}

/// An event pushed on a volatile subscription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamEventAppeared {
    pub event: ResolvedEvent,
}

/// Terminal drop notification, shared by both subscription kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionDropped {
    /// Wire reason code. Codes outside the known set pass through to the
    /// subscriber unchanged.
    pub reason: u8,
}

impl SubscriptionDropped {
    pub const UNSUBSCRIBED: u8 = 0;
    pub const ACCESS_DENIED: u8 = 1;
    pub const NOT_FOUND: u8 = 2;
    pub const PERSISTENT_SUBSCRIPTION_DELETED: u8 = 3;
    pub const SUBSCRIBER_MAX_COUNT_REACHED: u8 = 4;
}

// ============================================================================
// Persistent subscriptions
// ============================================================================

/// Connects to a persistent subscription group.
///
/// `subscription_id` carries the group name on the way in; the server
/// answers with its own subscription id in the confirmation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectToPersistentSubscription {
    pub subscription_id: String,
    pub event_stream_id: String,
    /// In-flight event credit granted to the server.
    pub allowed_in_flight_messages: i32,
}

/// Server confirmation of a persistent subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistentSubscriptionConfirmation {
    pub last_commit_position: i64,
    pub subscription_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_event_number: Option<i64>,
}

/// An event pushed on a persistent subscription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistentSubscriptionStreamEventAppeared {
    pub event: ResolvedEvent,
    /// How many times the server has redelivered this event.
    #[serde(default)]
    pub retry_count: i32,
}

/// Acknowledges processed events, releasing their credit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistentSubscriptionAckEvents {
    pub subscription_id: String,
    pub processed_event_ids: Vec<EventId>,
}

/// Negatively acknowledges events with a handling action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistentSubscriptionNakEvents {
    pub subscription_id: String,
    pub failed_event_ids: Vec<EventId>,
    pub action: NakAction,
    pub message: String,
}

/// What the server should do with negatively acknowledged events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NakAction {
    Unknown,
    Park,
    Retry,
    Skip,
    Stop,
}

// ============================================================================
// Persistent subscription administration
// ============================================================================

/// Group configuration shared by create and update requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistentSubscriptionConfig {
    pub resolve_link_tos: bool,
    pub start_from: i64,
    pub message_timeout_milliseconds: i32,
    pub record_statistics: bool,
    pub live_buffer_size: i32,
    pub read_batch_size: i32,
    pub buffer_size: i32,
    pub max_retry_count: i32,
    pub prefer_round_robin: bool,
    pub checkpoint_after_time: i32,
    pub checkpoint_max_count: i32,
    pub checkpoint_min_count: i32,
    pub subscriber_max_count: i32,
    pub named_consumer_strategy: String,
}

/// Creates a persistent subscription group on a stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatePersistentSubscription {
    pub subscription_group_name: String,
    pub event_stream_id: String,
    #[serde(flatten)]
    pub config: PersistentSubscriptionConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CreatePersistentSubscriptionResult {
    Success,
    AlreadyExists,
    Fail,
    AccessDenied,
    /// Result codes this driver does not know.
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatePersistentSubscriptionCompleted {
    pub result: CreatePersistentSubscriptionResult,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Updates the configuration of an existing group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdatePersistentSubscription {
    pub subscription_group_name: String,
    pub event_stream_id: String,
    #[serde(flatten)]
    pub config: PersistentSubscriptionConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UpdatePersistentSubscriptionResult {
    Success,
    DoesNotExist,
    Fail,
    AccessDenied,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdatePersistentSubscriptionCompleted {
    pub result: UpdatePersistentSubscriptionResult,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Deletes a persistent subscription group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletePersistentSubscription {
    pub subscription_group_name: String,
    pub event_stream_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeletePersistentSubscriptionResult {
    Success,
    DoesNotExist,
    Fail,
    AccessDenied,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletePersistentSubscriptionCompleted {
    pub result: DeletePersistentSubscriptionResult,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

// ============================================================================
// Generic server signals
// ============================================================================

/// Why the server refused to process a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotHandledReason {
    NotReady,
    TooBusy,
    NotLeader,
    #[serde(other)]
    Unknown,
}

/// Where the current leader listens, carried by `NotLeader` responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderInfo {
    pub external_tcp_address: String,
    pub external_tcp_port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_secure_tcp_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_secure_tcp_port: Option<u16>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotHandled {
    pub reason: NotHandledReason,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leader_info: Option<LeaderInfo>,
}
