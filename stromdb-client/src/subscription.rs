//! Subscription lifecycle shared by volatile and persistent subscriptions,
//! and the volatile subscription operation.
//!
//! A subscription moves through `AwaitingConfirmation -> Subscribed ->
//! Dropped`. Events and the terminal drop are delivered in arrival order
//! through an unbounded channel; the drop fires exactly once no matter how
//! many ways the subscription ends.

use std::fmt;

use stromdb_protocol::message::{self, ResolvedEvent};
use stromdb_protocol::{Command, Credentials, Frame};
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use crate::error::ClientError;
use crate::inspection::InspectionResult;
use crate::operation::{
    classify_not_handled, text_payload, ClientOperation, NotHandledOutcome, DEFAULT_MAX_RETRIES,
};
use crate::types::SubscriptionDropReason;

/// Notification delivered to a subscriber.
#[derive(Debug)]
pub enum SubscriptionNotification<E> {
    /// An event arrived. Per-subscription order matches arrival order.
    EventAppeared(E),
    /// The subscription ended. Sent exactly once, after all prior events.
    Dropped {
        reason: SubscriptionDropReason,
        error: Option<ClientError>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SubscriptionPhase {
    AwaitingConfirmation,
    Subscribed,
    Dropped,
}

/// State shared by both subscription kinds: identity, phase, positions,
/// the completion handle for the subscription handle, and the event
/// channel.
pub(crate) struct SubscriptionCore<E, H> {
    pub(crate) name: &'static str,
    pub(crate) stream_id: String,
    pub(crate) credentials: Option<Credentials>,
    pub(crate) correlation_id: Uuid,
    pub(crate) phase: SubscriptionPhase,
    pub(crate) last_commit_position: i64,
    pub(crate) last_event_number: Option<i64>,
    completion: Option<oneshot::Sender<Result<H, ClientError>>>,
    events_tx: mpsc::UnboundedSender<SubscriptionNotification<E>>,
    events_rx: Option<mpsc::UnboundedReceiver<SubscriptionNotification<E>>>,
    retries: u32,
    pub(crate) max_retries: u32,
}

impl<E, H> fmt::Debug for SubscriptionCore<E, H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionCore")
            .field("name", &self.name)
            .field("stream_id", &self.stream_id)
            .field("correlation_id", &self.correlation_id)
            .field("phase", &self.phase)
            .field("retries", &self.retries)
            .finish()
    }
}

impl<E, H> SubscriptionCore<E, H> {
    pub(crate) fn new(
        name: &'static str,
        stream_id: impl Into<String>,
        credentials: Option<Credentials>,
    ) -> (Self, oneshot::Receiver<Result<H, ClientError>>) {
        let (completion_tx, completion_rx) = oneshot::channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        (
            SubscriptionCore {
                name,
                stream_id: stream_id.into(),
                credentials,
                correlation_id: Uuid::new_v4(),
                phase: SubscriptionPhase::AwaitingConfirmation,
                last_commit_position: -1,
                last_event_number: None,
                completion: Some(completion_tx),
                events_tx,
                events_rx: Some(events_rx),
                retries: 0,
                max_retries: DEFAULT_MAX_RETRIES,
            },
            completion_rx,
        )
    }

    /// Builds a request frame carrying this subscription's identity and
    /// credentials.
    pub(crate) fn request_frame<B: serde::Serialize>(
        &self,
        command: Command,
        body: &B,
    ) -> Result<Frame, ClientError> {
        let frame = Frame::from_json(command, self.correlation_id, body)?
            .with_credentials(self.credentials.clone());
        Ok(frame)
    }

    /// Moves to `Subscribed` and hands out the event receiver. Returns
    /// `None` on a duplicate confirmation.
    pub(crate) fn confirm(
        &mut self,
        last_commit_position: i64,
        last_event_number: Option<i64>,
    ) -> Option<mpsc::UnboundedReceiver<SubscriptionNotification<E>>> {
        match self.phase {
            SubscriptionPhase::AwaitingConfirmation => {
                self.phase = SubscriptionPhase::Subscribed;
                self.last_commit_position = last_commit_position;
                self.last_event_number = last_event_number;
                tracing::debug!(
                    stream_id = %self.stream_id,
                    position = last_commit_position,
                    "subscription confirmed"
                );
                self.events_rx.take()
            }
            _ => {
                tracing::warn!(stream_id = %self.stream_id, "duplicate subscription confirmation");
                None
            }
        }
    }

    /// Resolves the subscriber's completion with the constructed handle.
    pub(crate) fn complete(&mut self, handle: H) {
        match self.completion.take() {
            Some(tx) => {
                if tx.send(Ok(handle)).is_err() {
                    tracing::debug!(stream_id = %self.stream_id, "subscription receiver dropped");
                }
            }
            None => tracing::warn!(stream_id = %self.stream_id, "subscription already resolved"),
        }
    }

    /// Delivers an event to the subscriber. Events arriving outside the
    /// `Subscribed` phase are ignored.
    pub(crate) fn event_appeared(&mut self, event: E) {
        if self.phase != SubscriptionPhase::Subscribed {
            tracing::warn!(
                stream_id = %self.stream_id,
                phase = ?self.phase,
                "event outside subscribed phase ignored"
            );
            return;
        }
        if self
            .events_tx
            .send(SubscriptionNotification::EventAppeared(event))
            .is_err()
        {
            tracing::debug!(stream_id = %self.stream_id, "subscriber receiver dropped");
        }
    }

    /// Ends the subscription. A confirmed subscription gets a `Dropped`
    /// notification after all delivered events; an unconfirmed one fails
    /// its completion. Repeat drops are ignored.
    pub(crate) fn drop_subscription(
        &mut self,
        reason: SubscriptionDropReason,
        error: Option<ClientError>,
    ) {
        if self.phase == SubscriptionPhase::Dropped {
            tracing::warn!(stream_id = %self.stream_id, ?reason, "subscription already dropped");
            return;
        }
        let confirmed = self.phase == SubscriptionPhase::Subscribed;
        self.phase = SubscriptionPhase::Dropped;
        tracing::debug!(stream_id = %self.stream_id, ?reason, "subscription dropped");

        if confirmed {
            if self
                .events_tx
                .send(SubscriptionNotification::Dropped { reason, error })
                .is_err()
            {
                tracing::debug!(stream_id = %self.stream_id, "subscriber receiver dropped");
            }
        } else {
            let error = error.unwrap_or_else(|| {
                ClientError::ServerError(format!(
                    "subscription to '{}' dropped: {reason:?}",
                    self.stream_id
                ))
            });
            if let Some(tx) = self.completion.take() {
                let _ = tx.send(Err(error));
            }
        }
    }

    /// Drops the subscription because a frame payload would not decode.
    pub(crate) fn drop_bad_payload(&mut self, error: ClientError) -> InspectionResult {
        let description = format!("Exception - {error}");
        self.drop_subscription(SubscriptionDropReason::ServerError, Some(error));
        InspectionResult::end_operation(description)
    }

    /// Handles the command families both subscription kinds treat the same
    /// way. Returns `None` for anything else.
    pub(crate) fn inspect_generic(&mut self, frame: &Frame) -> Option<InspectionResult> {
        match frame.command {
            Command::NotAuthenticated => {
                let message = text_payload(frame, "authentication failed");
                self.drop_subscription(
                    SubscriptionDropReason::NotAuthenticated,
                    Some(ClientError::NotAuthenticated(message)),
                );
                Some(InspectionResult::end_operation("NotAuthenticated"))
            }
            Command::BadRequest => {
                let message = text_payload(frame, "<no message>");
                let description = format!("BadRequest - {message}");
                self.drop_subscription(
                    SubscriptionDropReason::ServerError,
                    Some(ClientError::ServerError(message)),
                );
                Some(InspectionResult::end_operation(description))
            }
            Command::NotHandled => Some(match classify_not_handled(self.name, frame) {
                NotHandledOutcome::Retry(description) => {
                    self.retries += 1;
                    if self.retries > self.max_retries {
                        self.drop_subscription(
                            SubscriptionDropReason::SubscribingError,
                            Some(ClientError::RetriesLimitReached {
                                name: self.name.to_string(),
                                limit: self.max_retries,
                            }),
                        );
                        InspectionResult::end_operation("RetriesLimitReached")
                    } else {
                        InspectionResult::retry(description)
                    }
                }
                NotHandledOutcome::Reconnect {
                    tcp_endpoint,
                    secure_tcp_endpoint,
                } => InspectionResult::reconnect(
                    "NotHandled - NotLeader",
                    Some(tcp_endpoint),
                    secure_tcp_endpoint,
                ),
                NotHandledOutcome::BadPayload(error) => self.drop_bad_payload(error),
            }),
            _ => None,
        }
    }

    /// Connection teardown: ends the subscription with the matching drop
    /// reason.
    pub(crate) fn fail(&mut self, error: ClientError) {
        let reason = match error {
            ClientError::ConnectionClosed => SubscriptionDropReason::ConnectionClosed,
            _ => SubscriptionDropReason::ServerError,
        };
        self.drop_subscription(reason, Some(error));
    }
}

/// Maps a wire drop-reason code to the client-facing reason and error.
/// Codes outside the known set pass through with no error.
pub(crate) fn drop_reason_from_wire(
    raw: u8,
    stream_id: &str,
) -> (SubscriptionDropReason, Option<ClientError>) {
    match raw {
        message::SubscriptionDropped::UNSUBSCRIBED => (SubscriptionDropReason::UserInitiated, None),
        message::SubscriptionDropped::ACCESS_DENIED => (
            SubscriptionDropReason::AccessDenied,
            Some(ClientError::AccessDenied(stream_id.to_string())),
        ),
        message::SubscriptionDropped::NOT_FOUND => (
            SubscriptionDropReason::NotFound,
            Some(ClientError::InvalidArgument(
                "subscription not found".to_string(),
            )),
        ),
        message::SubscriptionDropped::PERSISTENT_SUBSCRIPTION_DELETED => (
            SubscriptionDropReason::PersistentSubscriptionDeleted,
            Some(ClientError::PersistentSubscriptionDeleted),
        ),
        message::SubscriptionDropped::SUBSCRIBER_MAX_COUNT_REACHED => (
            SubscriptionDropReason::MaxSubscribersReached,
            Some(ClientError::MaximumSubscribersReached),
        ),
        other => (SubscriptionDropReason::Unknown(other), None),
    }
}

/// Live handle to a confirmed volatile subscription.
#[derive(Debug)]
pub struct Subscription {
    stream_id: String,
    last_commit_position: i64,
    last_event_number: Option<i64>,
    events: mpsc::UnboundedReceiver<SubscriptionNotification<ResolvedEvent>>,
}

impl Subscription {
    /// Next notification, or `None` once the subscription is gone and the
    /// channel is drained.
    pub async fn next(&mut self) -> Option<SubscriptionNotification<ResolvedEvent>> {
        self.events.recv().await
    }

    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    /// Commit position of the stream at confirmation time.
    pub fn last_commit_position(&self) -> i64 {
        self.last_commit_position
    }

    /// Last event number at confirmation time, if the stream had any.
    pub fn last_event_number(&self) -> Option<i64> {
        self.last_event_number
    }
}

/// Subscribes to live events on a single stream.
#[derive(Debug)]
pub struct VolatileSubscriptionOperation {
    core: SubscriptionCore<ResolvedEvent, Subscription>,
    resolve_link_tos: bool,
}

impl VolatileSubscriptionOperation {
    pub fn new(
        stream_id: impl Into<String>,
        resolve_link_tos: bool,
        credentials: Option<Credentials>,
    ) -> (Self, oneshot::Receiver<Result<Subscription, ClientError>>) {
        let (core, rx) = SubscriptionCore::new("SubscribeToStream", stream_id, credentials);
        (
            VolatileSubscriptionOperation {
                core,
                resolve_link_tos,
            },
            rx,
        )
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.core.max_retries = max_retries;
        self
    }
}

impl ClientOperation for VolatileSubscriptionOperation {
    fn name(&self) -> &'static str {
        self.core.name
    }

    fn correlation_id(&self) -> Uuid {
        self.core.correlation_id
    }

    fn build_request(&self) -> Result<Frame, ClientError> {
        let body = message::SubscribeToStream {
            event_stream_id: self.core.stream_id.clone(),
            resolve_link_tos: self.resolve_link_tos,
        };
        self.core.request_frame(Command::SubscribeToStream, &body)
    }

    fn inspect(&mut self, frame: &Frame) -> Option<InspectionResult> {
        match frame.command {
            Command::SubscriptionConfirmation => {
                let confirmation: message::SubscriptionConfirmation = match frame.body_as() {
                    Ok(body) => body,
                    Err(e) => return Some(self.core.drop_bad_payload(e.into())),
                };
                if let Some(events) = self
                    .core
                    .confirm(confirmation.last_commit_position, confirmation.last_event_number)
                {
                    let handle = Subscription {
                        stream_id: self.core.stream_id.clone(),
                        last_commit_position: confirmation.last_commit_position,
                        last_event_number: confirmation.last_event_number,
                        events,
                    };
                    self.core.complete(handle);
                }
                Some(InspectionResult::subscribed("SubscriptionConfirmation"))
            }
            Command::StreamEventAppeared => {
                let appeared: message::StreamEventAppeared = match frame.body_as() {
                    Ok(body) => body,
                    Err(e) => return Some(self.core.drop_bad_payload(e.into())),
                };
                self.core.event_appeared(appeared.event);
                Some(InspectionResult::do_nothing("StreamEventAppeared"))
            }
            Command::SubscriptionDropped => {
                let dropped: message::SubscriptionDropped = match frame.body_as() {
                    Ok(body) => body,
                    Err(e) => return Some(self.core.drop_bad_payload(e.into())),
                };
                let (reason, error) = drop_reason_from_wire(dropped.reason, &self.core.stream_id);
                self.core.drop_subscription(reason, error);
                Some(InspectionResult::end_operation("SubscriptionDropped"))
            }
            _ => self.core.inspect_generic(frame),
        }
    }

    fn fail(&mut self, error: ClientError) {
        self.core.fail(error);
    }
}
