//! Persistent subscription group settings and stream access control.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use stromdb_protocol::message::PersistentSubscriptionConfig;

/// Role granted to every authenticated user.
pub const SYSTEM_ROLE_ALL: &str = "$all";
/// Role granted to administrators.
pub const SYSTEM_ROLE_ADMINS: &str = "$admins";

/// How a persistent subscription group distributes events among its
/// consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerStrategy {
    /// All events go to a single consumer until it disconnects.
    DispatchToSingle,
    /// Events rotate across consumers.
    RoundRobin,
    /// Events from the same source stream stick to the same consumer.
    Pinned,
}

impl ConsumerStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConsumerStrategy::DispatchToSingle => "DispatchToSingle",
            ConsumerStrategy::RoundRobin => "RoundRobin",
            ConsumerStrategy::Pinned => "Pinned",
        }
    }
}

impl fmt::Display for ConsumerStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration of a persistent subscription group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistentSubscriptionSettings {
    /// Resolve link events to their targets.
    pub resolve_link_tos: bool,
    /// Event number to start from; `-1` means the end of the stream.
    pub start_from: i64,
    /// Track latency statistics per event.
    pub extra_statistics: bool,
    /// How long the server waits for an ack before retrying an event.
    pub message_timeout: Duration,
    /// Redeliveries before an event is parked.
    pub max_retry_count: i32,
    /// Events buffered when paging through live data.
    pub live_buffer_size: i32,
    /// Events read per page when catching up.
    pub read_batch_size: i32,
    /// Events cached while catching up.
    pub history_buffer_size: i32,
    /// Time between checkpoints.
    pub checkpoint_after: Duration,
    /// Minimum acked events before a checkpoint.
    pub min_checkpoint_count: i32,
    /// Maximum acked events before a forced checkpoint.
    pub max_checkpoint_count: i32,
    /// Consumer limit; `0` means unbounded.
    pub max_subscriber_count: i32,
    pub named_consumer_strategy: ConsumerStrategy,
}

impl Default for PersistentSubscriptionSettings {
    fn default() -> Self {
        PersistentSubscriptionSettings {
            resolve_link_tos: false,
            start_from: -1,
            extra_statistics: false,
            message_timeout: Duration::from_secs(30),
            max_retry_count: 10,
            live_buffer_size: 500,
            read_batch_size: 20,
            history_buffer_size: 500,
            checkpoint_after: Duration::from_secs(2),
            min_checkpoint_count: 10,
            max_checkpoint_count: 1000,
            max_subscriber_count: 0,
            named_consumer_strategy: ConsumerStrategy::RoundRobin,
        }
    }
}

impl PersistentSubscriptionSettings {
    pub fn with_resolve_link_tos(mut self, resolve_link_tos: bool) -> Self {
        self.resolve_link_tos = resolve_link_tos;
        self
    }

    pub fn with_start_from(mut self, start_from: i64) -> Self {
        self.start_from = start_from;
        self
    }

    pub fn with_message_timeout(mut self, message_timeout: Duration) -> Self {
        self.message_timeout = message_timeout;
        self
    }

    pub fn with_max_retry_count(mut self, max_retry_count: i32) -> Self {
        self.max_retry_count = max_retry_count;
        self
    }

    pub fn with_max_subscriber_count(mut self, max_subscriber_count: i32) -> Self {
        self.max_subscriber_count = max_subscriber_count;
        self
    }

    pub fn with_consumer_strategy(mut self, strategy: ConsumerStrategy) -> Self {
        self.named_consumer_strategy = strategy;
        self
    }

    /// Wire configuration for create/update requests.
    pub fn to_config(&self) -> PersistentSubscriptionConfig {
        PersistentSubscriptionConfig {
            resolve_link_tos: self.resolve_link_tos,
            start_from: self.start_from,
            message_timeout_milliseconds: self.message_timeout.as_millis() as i32,
            record_statistics: self.extra_statistics,
            live_buffer_size: self.live_buffer_size,
            read_batch_size: self.read_batch_size,
            buffer_size: self.history_buffer_size,
            max_retry_count: self.max_retry_count,
            prefer_round_robin: self.named_consumer_strategy == ConsumerStrategy::RoundRobin,
            checkpoint_after_time: self.checkpoint_after.as_millis() as i32,
            checkpoint_max_count: self.max_checkpoint_count,
            checkpoint_min_count: self.min_checkpoint_count,
            subscriber_max_count: self.max_subscriber_count,
            named_consumer_strategy: self.named_consumer_strategy.as_str().to_string(),
        }
    }
}

/// Access control list of a single stream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamAcl {
    #[serde(rename = "$r", default, skip_serializing_if = "Vec::is_empty")]
    pub read_roles: Vec<String>,
    #[serde(rename = "$w", default, skip_serializing_if = "Vec::is_empty")]
    pub write_roles: Vec<String>,
    #[serde(rename = "$d", default, skip_serializing_if = "Vec::is_empty")]
    pub delete_roles: Vec<String>,
    #[serde(rename = "$mr", default, skip_serializing_if = "Vec::is_empty")]
    pub meta_read_roles: Vec<String>,
    #[serde(rename = "$mw", default, skip_serializing_if = "Vec::is_empty")]
    pub meta_write_roles: Vec<String>,
}

impl StreamAcl {
    fn for_roles(roles: &[&str]) -> Self {
        let list = || roles.iter().map(|role| role.to_string()).collect();
        StreamAcl {
            read_roles: list(),
            write_roles: list(),
            delete_roles: list(),
            meta_read_roles: list(),
            meta_write_roles: list(),
        }
    }
}

/// Store-wide default ACLs for user and system streams.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemSettings {
    #[serde(rename = "$userStreamAcl")]
    pub user_stream_acl: StreamAcl,
    #[serde(rename = "$systemStreamAcl")]
    pub system_stream_acl: StreamAcl,
}

impl Default for SystemSettings {
    fn default() -> Self {
        SystemSettings {
            user_stream_acl: StreamAcl::for_roles(&[SYSTEM_ROLE_ALL]),
            system_stream_acl: StreamAcl::for_roles(&[SYSTEM_ROLE_ALL, SYSTEM_ROLE_ADMINS]),
        }
    }
}
