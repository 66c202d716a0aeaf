//! Well-known stream names and metadata stream helpers.

/// Stream carrying every event in the store.
pub const ALL_STREAM: &str = "$all";

/// Stream of created stream names.
pub const STREAMS_STREAM: &str = "$streams";

/// Stream holding store-wide settings.
pub const SETTINGS_STREAM: &str = "$settings";

/// Prefix of per-node statistics streams.
pub const STATS_STREAM_PREFIX: &str = "$stats";

/// Stream of scavenge runs.
pub const SCAVENGES_STREAM: &str = "$scavenges";

/// Stream holding persistent subscription configuration.
pub const PERSISTENT_SUBSCRIPTION_CONFIG: &str = "$persistentSubscriptionConfig";

/// Name of the metadata stream for `stream_id`.
pub fn metastream_of(stream_id: &str) -> String {
    format!("$${stream_id}")
}

pub fn is_metastream(stream_id: &str) -> bool {
    stream_id.starts_with("$$")
}

/// The stream a metadata stream describes. Returns the input unchanged when
/// it is not a metadata stream.
pub fn original_stream_of(metastream_id: &str) -> &str {
    metastream_id.strip_prefix("$$").unwrap_or(metastream_id)
}

pub fn is_system_stream(stream_id: &str) -> bool {
    stream_id.starts_with('$')
}
