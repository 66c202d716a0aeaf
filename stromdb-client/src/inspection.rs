//! Inspection vocabulary: what an operation tells the dispatcher to do
//! with a response frame.

use crate::types::Endpoint;

/// Dispatcher action decided by inspecting a response frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InspectionDecision {
    /// Frame consumed; the operation stays registered.
    DoNothing,
    /// The operation finished (success or failure); remove it.
    EndOperation,
    /// Re-send the request frame on the same connection.
    Retry,
    /// Tear the connection down and reconnect, preferring the carried
    /// endpoints.
    Reconnect,
    /// Subscription confirmed; keep it registered for pushed frames.
    Subscribed,
}

/// Decision plus a short description for diagnostics.
#[derive(Debug, Clone)]
pub struct InspectionResult {
    pub decision: InspectionDecision,
    pub description: String,
    /// Redirect target, set only for [`InspectionDecision::Reconnect`].
    pub tcp_endpoint: Option<Endpoint>,
    pub secure_tcp_endpoint: Option<Endpoint>,
}

impl InspectionResult {
    pub fn do_nothing(description: impl Into<String>) -> Self {
        Self::plain(InspectionDecision::DoNothing, description)
    }

    pub fn end_operation(description: impl Into<String>) -> Self {
        Self::plain(InspectionDecision::EndOperation, description)
    }

    pub fn retry(description: impl Into<String>) -> Self {
        Self::plain(InspectionDecision::Retry, description)
    }

    pub fn subscribed(description: impl Into<String>) -> Self {
        Self::plain(InspectionDecision::Subscribed, description)
    }

    pub fn reconnect(
        description: impl Into<String>,
        tcp_endpoint: Option<Endpoint>,
        secure_tcp_endpoint: Option<Endpoint>,
    ) -> Self {
        InspectionResult {
            decision: InspectionDecision::Reconnect,
            description: description.into(),
            tcp_endpoint,
            secure_tcp_endpoint,
        }
    }

    fn plain(decision: InspectionDecision, description: impl Into<String>) -> Self {
        InspectionResult {
            decision,
            description: description.into(),
            tcp_endpoint: None,
            secure_tcp_endpoint: None,
        }
    }
}
