//! Persistent subscriptions: competing consumers over a named group, with
//! explicit ack/nak flow control.

use std::sync::{Arc, OnceLock};

use stromdb_protocol::message::{self, EventId, NakAction, ResolvedEvent};
use stromdb_protocol::{Command, Credentials, Frame};
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use crate::error::ClientError;
use crate::inspection::InspectionResult;
use crate::operation::ClientOperation;
use crate::subscription::{drop_reason_from_wire, SubscriptionCore, SubscriptionNotification};

/// Default in-flight event credit granted to the server.
pub const DEFAULT_BUFFER_SIZE: i32 = 10;

/// A resolved event delivered on a persistent subscription.
#[derive(Debug, Clone, PartialEq)]
pub struct PersistentSubscriptionEvent {
    pub event: ResolvedEvent,
    /// How many times the server has redelivered this event.
    pub retry_count: i32,
}

/// Ack/nak plumbing shared between the operation and its handle.
///
/// The server-assigned subscription id is set once, at confirmation;
/// acknowledgements sent before that fail synchronously.
#[derive(Debug)]
struct SubscriptionLink {
    correlation_id: Uuid,
    credentials: Option<Credentials>,
    subscription_id: OnceLock<String>,
    outbound: mpsc::UnboundedSender<Frame>,
}

impl SubscriptionLink {
    /// Acknowledges processed events. Fire-and-forget: the server sends no
    /// reply.
    fn notify_events_processed(&self, event_ids: &[EventId]) -> Result<(), ClientError> {
        let subscription_id = self.checked_subscription_id(event_ids)?;
        let body = message::PersistentSubscriptionAckEvents {
            subscription_id,
            processed_event_ids: event_ids.to_vec(),
        };
        self.send(Command::PersistentSubscriptionAckEvents, &body)
    }

    /// Negatively acknowledges events with a handling action.
    fn notify_events_failed(
        &self,
        event_ids: &[EventId],
        action: NakAction,
        reason: &str,
    ) -> Result<(), ClientError> {
        let subscription_id = self.checked_subscription_id(event_ids)?;
        let body = message::PersistentSubscriptionNakEvents {
            subscription_id,
            failed_event_ids: event_ids.to_vec(),
            action,
            message: reason.to_string(),
        };
        self.send(Command::PersistentSubscriptionNakEvents, &body)
    }

    fn checked_subscription_id(&self, event_ids: &[EventId]) -> Result<String, ClientError> {
        if event_ids.is_empty() {
            return Err(ClientError::InvalidArgument(
                "event ids cannot be empty".to_string(),
            ));
        }
        self.subscription_id.get().cloned().ok_or_else(|| {
            ClientError::IllegalState("subscription is not confirmed yet".to_string())
        })
    }

    fn send<B: serde::Serialize>(&self, command: Command, body: &B) -> Result<(), ClientError> {
        let frame = Frame::from_json(command, self.correlation_id, body)?
            .with_credentials(self.credentials.clone());
        self.outbound
            .send(frame)
            .map_err(|_| ClientError::ConnectionClosed)
    }
}

/// Live handle to a confirmed persistent subscription.
///
/// Each delivered event consumes one unit of the in-flight credit granted
/// at connect time; `ack`/`nak` release it.
#[derive(Debug)]
pub struct PersistentSubscription {
    stream_id: String,
    group_name: String,
    subscription_id: String,
    last_commit_position: i64,
    last_event_number: Option<i64>,
    events: mpsc::UnboundedReceiver<SubscriptionNotification<PersistentSubscriptionEvent>>,
    link: Arc<SubscriptionLink>,
}

impl PersistentSubscription {
    /// Next notification, or `None` once the subscription is gone and the
    /// channel is drained.
    pub async fn next(&mut self) -> Option<SubscriptionNotification<PersistentSubscriptionEvent>> {
        self.events.recv().await
    }

    /// Acknowledges processed events.
    pub fn ack(&self, event_ids: &[EventId]) -> Result<(), ClientError> {
        self.link.notify_events_processed(event_ids)
    }

    /// Negatively acknowledges events with a handling action.
    pub fn nak(
        &self,
        event_ids: &[EventId],
        action: NakAction,
        reason: &str,
    ) -> Result<(), ClientError> {
        self.link.notify_events_failed(event_ids, action, reason)
    }

    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    pub fn group_name(&self) -> &str {
        &self.group_name
    }

    /// Server-assigned subscription id.
    pub fn subscription_id(&self) -> &str {
        &self.subscription_id
    }

    pub fn last_commit_position(&self) -> i64 {
        self.last_commit_position
    }

    pub fn last_event_number(&self) -> Option<i64> {
        self.last_event_number
    }
}

/// Connects to a persistent subscription group and drives its event and
/// acknowledgement traffic.
#[derive(Debug)]
pub struct PersistentSubscriptionOperation {
    core: SubscriptionCore<PersistentSubscriptionEvent, PersistentSubscription>,
    group_name: String,
    buffer_size: i32,
    link: Arc<SubscriptionLink>,
}

impl PersistentSubscriptionOperation {
    /// `outbound` carries ack/nak frames to the connection's writer.
    pub fn new(
        stream_id: impl Into<String>,
        group_name: impl Into<String>,
        buffer_size: i32,
        credentials: Option<Credentials>,
        outbound: mpsc::UnboundedSender<Frame>,
    ) -> (
        Self,
        oneshot::Receiver<Result<PersistentSubscription, ClientError>>,
    ) {
        let (core, rx) = SubscriptionCore::new(
            "ConnectToPersistentSubscription",
            stream_id,
            credentials,
        );
        let link = Arc::new(SubscriptionLink {
            correlation_id: core.correlation_id,
            credentials: core.credentials.clone(),
            subscription_id: OnceLock::new(),
            outbound,
        });
        (
            PersistentSubscriptionOperation {
                core,
                group_name: group_name.into(),
                buffer_size,
                link,
            },
            rx,
        )
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.core.max_retries = max_retries;
        self
    }

    /// Acknowledges processed events on behalf of the handle.
    pub fn notify_events_processed(&self, event_ids: &[EventId]) -> Result<(), ClientError> {
        self.link.notify_events_processed(event_ids)
    }

    /// Negatively acknowledges events on behalf of the handle.
    pub fn notify_events_failed(
        &self,
        event_ids: &[EventId],
        action: NakAction,
        reason: &str,
    ) -> Result<(), ClientError> {
        self.link.notify_events_failed(event_ids, action, reason)
    }

    pub fn buffer_size(&self) -> i32 {
        self.buffer_size
    }
}

impl ClientOperation for PersistentSubscriptionOperation {
    fn name(&self) -> &'static str {
        self.core.name
    }

    fn correlation_id(&self) -> Uuid {
        self.core.correlation_id
    }

    fn build_request(&self) -> Result<Frame, ClientError> {
        let body = message::ConnectToPersistentSubscription {
            subscription_id: self.group_name.clone(),
            event_stream_id: self.core.stream_id.clone(),
            allowed_in_flight_messages: self.buffer_size,
        };
        self.core
            .request_frame(Command::ConnectToPersistentSubscription, &body)
    }

    fn inspect(&mut self, frame: &Frame) -> Option<InspectionResult> {
        match frame.command {
            Command::PersistentSubscriptionConfirmation => {
                let confirmation: message::PersistentSubscriptionConfirmation =
                    match frame.body_as() {
                        Ok(body) => body,
                        Err(e) => return Some(self.core.drop_bad_payload(e.into())),
                    };
                if self
                    .link
                    .subscription_id
                    .set(confirmation.subscription_id.clone())
                    .is_err()
                {
                    tracing::warn!(
                        stream_id = %self.core.stream_id,
                        "duplicate persistent subscription confirmation"
                    );
                }
                if let Some(events) = self.core.confirm(
                    confirmation.last_commit_position,
                    confirmation.last_event_number,
                ) {
                    let handle = PersistentSubscription {
                        stream_id: self.core.stream_id.clone(),
                        group_name: self.group_name.clone(),
                        subscription_id: confirmation.subscription_id,
                        last_commit_position: confirmation.last_commit_position,
                        last_event_number: confirmation.last_event_number,
                        events,
                        link: Arc::clone(&self.link),
                    };
                    self.core.complete(handle);
                }
                Some(InspectionResult::subscribed("SubscriptionConfirmation"))
            }
            Command::PersistentSubscriptionStreamEventAppeared => {
                let appeared: message::PersistentSubscriptionStreamEventAppeared =
                    match frame.body_as() {
                        Ok(body) => body,
                        Err(e) => return Some(self.core.drop_bad_payload(e.into())),
                    };
                self.core.event_appeared(PersistentSubscriptionEvent {
                    event: appeared.event,
                    retry_count: appeared.retry_count,
                });
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
