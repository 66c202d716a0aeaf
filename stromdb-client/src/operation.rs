//! Operation contract and the state shared by all request/response
//! operations.

use std::fmt;

use stromdb_protocol::message::{NotHandled, NotHandledReason};
use stromdb_protocol::{Command, Credentials, Frame};
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::error::ClientError;
use crate::inspection::InspectionResult;
use crate::types::Endpoint;

/// Default retry ceiling for operations and subscriptions.
pub const DEFAULT_MAX_RETRIES: u32 = 10;

/// A single protocol exchange the dispatcher can multiplex over one
/// connection.
///
/// An operation builds its request frame, classifies every response frame
/// addressed to its correlation id into an [`InspectionResult`], and
/// resolves its completion handle exactly once. Inspection never returns an
/// error to the dispatcher: failures travel through the completion handle.
pub trait ClientOperation: fmt::Debug + Send + Sync {
    /// Operation name for logs and error messages.
    fn name(&self) -> &'static str;

    /// Correlation id assigned at creation. Stable across retries.
    fn correlation_id(&self) -> Uuid;

    /// Builds the request frame. Deterministic given the operation's state;
    /// performs no network activity.
    fn build_request(&self) -> Result<Frame, ClientError>;

    /// Classifies a response frame. Returns `None` when the command is not
    /// one this operation recognizes, leaving the frame otherwise ignored.
    fn inspect(&mut self, frame: &Frame) -> Option<InspectionResult>;

    /// Fails the operation, resolving its completion with `error`. Used by
    /// connection teardown.
    fn fail(&mut self, error: ClientError);
}

/// State shared by request/response operations: identity, credentials, the
/// completion handle, and the retry counter.
pub struct OperationBase<T> {
    name: &'static str,
    correlation_id: Uuid,
    credentials: Option<Credentials>,
    completion: Option<oneshot::Sender<Result<T, ClientError>>>,
    retries: u32,
    max_retries: u32,
}

impl<T> fmt::Debug for OperationBase<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationBase")
            .field("name", &self.name)
            .field("correlation_id", &self.correlation_id)
            .field("retries", &self.retries)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

impl<T> OperationBase<T> {
    /// Creates the base and the receiving end of its completion handle.
    pub fn new(
        name: &'static str,
        credentials: Option<Credentials>,
    ) -> (Self, oneshot::Receiver<Result<T, ClientError>>) {
        let (tx, rx) = oneshot::channel();
        (
            OperationBase {
                name,
                correlation_id: Uuid::new_v4(),
                credentials,
                completion: Some(tx),
                retries: 0,
                max_retries: DEFAULT_MAX_RETRIES,
            },
            rx,
        )
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    /// Builds a request frame carrying this operation's identity and
    /// credentials.
    pub fn request_frame<B: serde::Serialize>(
        &self,
        command: Command,
        body: &B,
    ) -> Result<Frame, ClientError> {
        let frame = Frame::from_json(command, self.correlation_id, body)?
            .with_credentials(self.credentials.clone());
        Ok(frame)
    }

    /// Resolves the completion with a success value. Later resolutions are
    /// ignored.
    pub fn succeed(&mut self, value: T) {
        match self.completion.take() {
            Some(tx) => {
                if tx.send(Ok(value)).is_err() {
                    tracing::debug!(name = self.name, "completion receiver dropped");
                }
            }
            None => tracing::warn!(name = self.name, "operation already resolved"),
        }
    }

    /// Resolves the completion with an error. Later resolutions are ignored.
    pub fn fail(&mut self, error: ClientError) {
        match self.completion.take() {
            Some(tx) => {
                tracing::debug!(name = self.name, %error, "operation failed");
                if tx.send(Err(error)).is_err() {
                    tracing::debug!(name = self.name, "completion receiver dropped");
                }
            }
            None => tracing::warn!(name = self.name, "operation already resolved"),
        }
    }

    /// Handles the command families every operation treats the same way:
    /// authentication failures, bad requests, and `NotHandled` signals.
    /// Returns `None` for anything else.
    pub fn inspect_command(&mut self, frame: &Frame) -> Option<InspectionResult> {
        match frame.command {
            Command::NotAuthenticated => {
                let message = text_payload(frame, "authentication failed");
                self.fail(ClientError::NotAuthenticated(message));
                Some(InspectionResult::end_operation("NotAuthenticated"))
            }
            Command::BadRequest => {
                let message = text_payload(frame, "<no message>");
                let description = format!("BadRequest - {message}");
                self.fail(ClientError::ServerError(message));
                Some(InspectionResult::end_operation(description))
            }
            Command::NotHandled => Some(match classify_not_handled(self.name, frame) {
                NotHandledOutcome::Retry(description) => self.retry_or_give_up(description),
                NotHandledOutcome::Reconnect {
                    tcp_endpoint,
                    secure_tcp_endpoint,
                } => InspectionResult::reconnect(
                    "NotHandled - NotLeader",
                    Some(tcp_endpoint),
                    secure_tcp_endpoint,
                ),
                NotHandledOutcome::BadPayload(error) => {
                    let description = format!("Exception - {error}");
                    self.fail(error);
                    InspectionResult::end_operation(description)
                }
            }),
            _ => None,
        }
    }

    /// Retries while under the ceiling; past it the operation fails with a
    /// timeout-class error and ends.
    fn retry_or_give_up(&mut self, description: &'static str) -> InspectionResult {
        self.retries += 1;
        if self.retries > self.max_retries {
            self.fail(ClientError::RetriesLimitReached {
                name: self.name.to_string(),
                limit: self.max_retries,
            });
            InspectionResult::end_operation("RetriesLimitReached")
        } else {
            InspectionResult::retry(description)
        }
    }
}

/// How a `NotHandled` frame should be acted on, before the retry ceiling is
/// applied.
pub(crate) enum NotHandledOutcome {
    Retry(&'static str),
    Reconnect {
        tcp_endpoint: Endpoint,
        secure_tcp_endpoint: Option<Endpoint>,
    },
    BadPayload(ClientError),
}

/// Shared classification of `NotHandled` frames for operations and
/// subscriptions.
pub(crate) fn classify_not_handled(name: &str, frame: &Frame) -> NotHandledOutcome {
    let not_handled: NotHandled = match frame.body_as() {
        Ok(body) => body,
        Err(e) => return NotHandledOutcome::BadPayload(e.into()),
    };

    match not_handled.reason {
        NotHandledReason::NotReady => NotHandledOutcome::Retry("NotHandled - NotReady"),
        NotHandledReason::TooBusy => NotHandledOutcome::Retry("NotHandled - TooBusy"),
        NotHandledReason::NotLeader => match not_handled.leader_info {
            Some(info) => NotHandledOutcome::Reconnect {
                tcp_endpoint: Endpoint::new(info.external_tcp_address, info.external_tcp_port),
                secure_tcp_endpoint: match (
                    info.external_secure_tcp_address,
                    info.external_secure_tcp_port,
                ) {
                    (Some(address), Some(port)) => Some(Endpoint::new(address, port)),
                    _ => None,
                },
            },
            None => {
                tracing::warn!(operation = name, "NotLeader response without leader info");
                NotHandledOutcome::Retry("NotHandled - NotLeader")
            }
        },
        NotHandledReason::Unknown => {
            tracing::error!(operation = name, "unknown NotHandled reason");
            NotHandledOutcome::Retry("NotHandled - <unknown>")
        }
    }
}

/// Interprets a frame payload as plain UTF-8 text.
pub(crate) fn text_payload(frame: &Frame, fallback: &str) -> String {
    if frame.payload.is_empty() {
        fallback.to_string()
    } else {
        String::from_utf8_lossy(&frame.payload).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use stromdb_protocol::message::LeaderInfo;
    use tokio::sync::oneshot::error::TryRecvError;

    use crate::inspection::InspectionDecision;

    fn not_handled_frame(base: &OperationBase<()>, reason: NotHandledReason) -> Frame {
        Frame::from_json(
            Command::NotHandled,
            base.correlation_id(),
            &NotHandled {
                reason,
                leader_info: None,
            },
        )
        .unwrap()
    }

    #[test]
    fn test_request_frame_carries_identity_and_credentials() {
        let (base, _rx) =
            OperationBase::<()>::new("TestOp", Some(Credentials::new("admin", "changeit")));

        let frame = base
            .request_frame(Command::SubscribeToStream, &serde_json::json!({"k": "v"}))
            .unwrap();

        assert_eq!(frame.correlation_id, base.correlation_id());
        assert_eq!(frame.credentials, Some(Credentials::new("admin", "changeit")));
        assert!(frame.flags().is_authenticated());
    }

    #[test]
    fn test_not_ready_retries_until_ceiling() {
        let (base, mut rx) = OperationBase::<()>::new("TestOp", None);
        let mut base = base.with_max_retries(2);
        let frame = not_handled_frame(&base, NotHandledReason::NotReady);

        for _ in 0..2 {
            let result = base.inspect_command(&frame).unwrap();
            assert_eq!(result.decision, InspectionDecision::Retry);
            assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
        }

        // Third refusal crosses the ceiling.
        let result = base.inspect_command(&frame).unwrap();
        assert_eq!(result.decision, InspectionDecision::EndOperation);
        assert_eq!(result.description, "RetriesLimitReached");
        assert!(matches!(
            rx.try_recv(),
            Ok(Err(ClientError::RetriesLimitReached { limit: 2, .. }))
        ));
    }

    #[test]
    fn test_not_leader_with_info_reconnects() {
        let (mut base, mut rx) = OperationBase::<()>::new("TestOp", None);
        let frame = Frame::from_json(
            Command::NotHandled,
            base.correlation_id(),
            &NotHandled {
                reason: NotHandledReason::NotLeader,
                leader_info: Some(LeaderInfo {
                    external_tcp_address: "10.0.0.2".to_string(),
                    external_tcp_port: 1113,
                    external_secure_tcp_address: Some("10.0.0.2".to_string()),
                    external_secure_tcp_port: Some(1114),
                }),
            },
        )
        .unwrap();

        let result = base.inspect_command(&frame).unwrap();
        assert_eq!(result.decision, InspectionDecision::Reconnect);
        assert_eq!(result.tcp_endpoint, Some(Endpoint::new("10.0.0.2", 1113)));
        assert_eq!(
            result.secure_tcp_endpoint,
            Some(Endpoint::new("10.0.0.2", 1114))
        );
        // The operation itself is still pending.
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[test]
    fn test_not_leader_without_info_retries() {
        let (mut base, _rx) = OperationBase::<()>::new("TestOp", None);
        let frame = not_handled_frame(&base, NotHandledReason::NotLeader);

        let result = base.inspect_command(&frame).unwrap();
        assert_eq!(result.decision, InspectionDecision::Retry);
    }

    #[test]
    fn test_bad_request_fails_operation() {
        let (mut base, mut rx) = OperationBase::<()>::new("TestOp", None);
        let frame = Frame::new(
            Command::BadRequest,
            base.correlation_id(),
            Bytes::from_static(b"malformed request"),
        );

        let result = base.inspect_command(&frame).unwrap();
        assert_eq!(result.decision, InspectionDecision::EndOperation);
        assert_eq!(result.description, "BadRequest - malformed request");
        assert!(matches!(rx.try_recv(), Ok(Err(ClientError::ServerError(msg))) if msg == "malformed request"));
    }

    #[test]
    fn test_not_authenticated_fails_operation() {
        let (mut base, mut rx) = OperationBase::<()>::new("TestOp", None);
        let frame = Frame::new(Command::NotAuthenticated, base.correlation_id(), Bytes::new());

        let result = base.inspect_command(&frame).unwrap();
        assert_eq!(result.decision, InspectionDecision::EndOperation);
        assert!(matches!(
            rx.try_recv(),
            Ok(Err(ClientError::NotAuthenticated(_)))
        ));
    }

    #[test]
    fn test_unrelated_command_not_recognized() {
        let (mut base, _rx) = OperationBase::<()>::new("TestOp", None);
        let frame = Frame::new(Command::Pong, base.correlation_id(), Bytes::new());

        assert!(base.inspect_command(&frame).is_none());
    }

    #[test]
    fn test_completion_resolves_exactly_once() {
        let (mut base, mut rx) = OperationBase::<u32>::new("TestOp", None);

        base.succeed(7);
        base.fail(ClientError::ConnectionClosed);

        assert!(matches!(rx.try_recv(), Ok(Ok(7))));
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Closed)));
    }
}
