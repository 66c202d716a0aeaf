//! In-flight operation table keyed by correlation id.
//!
//! Operations are inserted when registered and removed exactly once: on a
//! terminal inspection decision or at connection teardown. The registry
//! itself never interprets payloads; it routes frames and applies the
//! inspection decision the operation returns.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use stromdb_protocol::Frame;
use uuid::Uuid;

use crate::error::ClientError;
use crate::inspection::InspectionDecision;
use crate::operation::ClientOperation;
use crate::types::Endpoint;

/// What the dispatcher must do after the registry applied a frame.
#[derive(Debug)]
pub enum FrameOutcome {
    /// No operation matched the correlation id.
    Unmatched,
    /// The matched operation did not recognize the command; it stays
    /// registered.
    Unrecognized,
    /// Frame consumed; the operation stays registered.
    Active,
    /// The operation finished and was removed.
    Completed,
    /// Re-send this request frame; the operation stays registered.
    Resend(Frame),
    /// Tear the connection down and reconnect, preferring the carried
    /// endpoints. The operation stays registered so it survives into the
    /// next connection.
    Reconnect {
        tcp_endpoint: Option<Endpoint>,
        secure_tcp_endpoint: Option<Endpoint>,
    },
}

/// Concurrent table of in-flight operations and subscriptions.
#[derive(Debug, Default)]
pub struct OperationRegistry {
    operations: DashMap<Uuid, Box<dyn ClientOperation>>,
    max_queue_size: Option<usize>,
}

impl OperationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bounds the number of concurrently registered operations.
    pub fn with_max_queue_size(mut self, max_queue_size: usize) -> Self {
        self.max_queue_size = Some(max_queue_size);
        self
    }

    /// Registers an operation and returns its request frame for sending.
    pub fn register(&self, operation: Box<dyn ClientOperation>) -> Result<Frame, ClientError> {
        if let Some(max) = self.max_queue_size {
            if self.operations.len() >= max {
                return Err(ClientError::MaxQueueSize(max));
            }
        }

        let name = operation.name();
        let correlation_id = operation.correlation_id();
        let frame = operation.build_request()?;

        match self.operations.entry(correlation_id) {
            Entry::Occupied(_) => Err(ClientError::IllegalState(format!(
                "correlation id {correlation_id} is already registered"
            ))),
            Entry::Vacant(vacant) => {
                vacant.insert(operation);
                tracing::debug!(operation = name, %correlation_id, "operation registered");
                Ok(frame)
            }
        }
    }

    /// Routes a response frame to its operation and applies the inspection
    /// decision.
    pub fn handle_frame(&self, frame: &Frame) -> FrameOutcome {
        let correlation_id = frame.correlation_id;

        let Some(mut entry) = self.operations.get_mut(&correlation_id) else {
            tracing::debug!(%correlation_id, command = ?frame.command, "no operation for frame");
            return FrameOutcome::Unmatched;
        };

        let Some(result) = entry.inspect(frame) else {
            tracing::warn!(
                operation = entry.name(),
                command = ?frame.command,
                "command not recognized by operation"
            );
            return FrameOutcome::Unrecognized;
        };

        tracing::debug!(
            operation = entry.name(),
            decision = ?result.decision,
            description = %result.description,
            "frame inspected"
        );

        match result.decision {
            InspectionDecision::DoNothing | InspectionDecision::Subscribed => FrameOutcome::Active,
            InspectionDecision::EndOperation => {
                drop(entry);
                self.operations.remove(&correlation_id);
                FrameOutcome::Completed
            }
            InspectionDecision::Retry => match entry.build_request() {
                Ok(request) => FrameOutcome::Resend(request),
                Err(error) => {
                    entry.fail(error);
                    drop(entry);
                    self.operations.remove(&correlation_id);
                    FrameOutcome::Completed
                }
            },
            InspectionDecision::Reconnect => FrameOutcome::Reconnect {
                tcp_endpoint: result.tcp_endpoint,
                secure_tcp_endpoint: result.secure_tcp_endpoint,
            },
        }
    }

    /// Connection teardown: fails every registered operation with
    /// `ConnectionClosed` and empties the table. Pending operations resolve
    /// their completions; confirmed subscriptions get their drop
    /// notification. Returns how many operations were failed.
    pub fn fail_all(&self) -> usize {
        let correlation_ids: Vec<Uuid> =
            self.operations.iter().map(|entry| *entry.key()).collect();
        let mut failed = 0;

        for correlation_id in correlation_ids {
            if let Some((_, mut operation)) = self.operations.remove(&correlation_id) {
                tracing::debug!(operation = operation.name(), %correlation_id, "closing operation");
                operation.fail(ClientError::ConnectionClosed);
                failed += 1;
            }
        }

        failed
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use stromdb_protocol::message::{self, NotHandledReason};
    use stromdb_protocol::Command;

    use crate::inspection::InspectionResult;
    use crate::operations::DeletePersistentSubscriptionOperation;
    use crate::subscription::{SubscriptionNotification, VolatileSubscriptionOperation};
    use crate::types::SubscriptionDropReason;

    /// Operation with a caller-chosen correlation id.
    #[derive(Debug)]
    struct StubOperation {
        correlation_id: Uuid,
    }

    impl ClientOperation for StubOperation {
        fn name(&self) -> &'static str {
            "Stub"
        }

        fn correlation_id(&self) -> Uuid {
            self.correlation_id
        }

        fn build_request(&self) -> Result<Frame, ClientError> {
            Ok(Frame::new(Command::Ping, self.correlation_id, Bytes::new()))
        }

        fn inspect(&mut self, _frame: &Frame) -> Option<InspectionResult> {
            None
        }

        fn fail(&mut self, _error: ClientError) {}
    }

    fn delete_completed_frame(correlation_id: Uuid, result: &str) -> Frame {
        Frame::from_json(
            Command::DeletePersistentSubscriptionCompleted,
            correlation_id,
            &serde_json::json!({ "result": result }),
        )
        .unwrap()
    }

    #[test]
    fn test_register_returns_request_frame() {
        let registry = OperationRegistry::new();
        let (op, _rx) = DeletePersistentSubscriptionOperation::new("orders", "workers", None);
        let correlation_id = op.correlation_id();

        let frame = registry.register(Box::new(op)).unwrap();

        assert_eq!(frame.command, Command::DeletePersistentSubscription);
        assert_eq!(frame.correlation_id, correlation_id);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_register_duplicate_correlation_id_rejected() {
        let registry = OperationRegistry::new();
        let correlation_id = Uuid::new_v4();

        registry
            .register(Box::new(StubOperation { correlation_id }))
            .unwrap();
        let err = registry
            .register(Box::new(StubOperation { correlation_id }))
            .unwrap_err();

        assert!(matches!(err, ClientError::IllegalState(_)));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_register_respects_max_queue_size() {
        let registry = OperationRegistry::new().with_max_queue_size(2);

        for _ in 0..2 {
            let (op, _rx) = DeletePersistentSubscriptionOperation::new("orders", "workers", None);
            registry.register(Box::new(op)).unwrap();
        }

        let (op, _rx) = DeletePersistentSubscriptionOperation::new("orders", "workers", None);
        let err = registry.register(Box::new(op)).unwrap_err();

        assert!(matches!(err, ClientError::MaxQueueSize(2)));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_frame_without_operation_is_unmatched() {
        let registry = OperationRegistry::new();
        let frame = delete_completed_frame(Uuid::new_v4(), "SUCCESS");

        assert!(matches!(registry.handle_frame(&frame), FrameOutcome::Unmatched));
    }

    #[test]
    fn test_completed_operation_is_removed() {
        let registry = OperationRegistry::new();
        let (op, mut rx) = DeletePersistentSubscriptionOperation::new("orders", "workers", None);
        let correlation_id = op.correlation_id();
        registry.register(Box::new(op)).unwrap();

        let outcome = registry.handle_frame(&delete_completed_frame(correlation_id, "SUCCESS"));

        assert!(matches!(outcome, FrameOutcome::Completed));
        assert!(registry.is_empty());
        assert!(matches!(rx.try_recv(), Ok(Ok(_))));

        // A second frame for the same id no longer matches anything.
        let outcome = registry.handle_frame(&delete_completed_frame(correlation_id, "SUCCESS"));
        assert!(matches!(outcome, FrameOutcome::Unmatched));
    }

    #[test]
    fn test_retry_resends_same_request() {
        let registry = OperationRegistry::new();
        let (op, _rx) = DeletePersistentSubscriptionOperation::new("orders", "workers", None);
        let correlation_id = op.correlation_id();
        let original = op.build_request().unwrap();
        registry.register(Box::new(op)).unwrap();

        let not_handled = Frame::from_json(
            Command::NotHandled,
            correlation_id,
            &message::NotHandled {
                reason: NotHandledReason::NotReady,
                leader_info: None,
            },
        )
        .unwrap();

        match registry.handle_frame(&not_handled) {
            FrameOutcome::Resend(request) => assert_eq!(request, original),
            other => panic!("expected resend, got {other:?}"),
        }
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_reconnect_keeps_operation_registered() {
        let registry = OperationRegistry::new();
        let (op, _rx) = DeletePersistentSubscriptionOperation::new("orders", "workers", None);
        let correlation_id = op.correlation_id();
        registry.register(Box::new(op)).unwrap();

        let not_leader = Frame::from_json(
            Command::NotHandled,
            correlation_id,
            &message::NotHandled {
                reason: NotHandledReason::NotLeader,
                leader_info: Some(message::LeaderInfo {
                    external_tcp_address: "10.0.0.9".to_string(),
                    external_tcp_port: 1113,
                    external_secure_tcp_address: None,
                    external_secure_tcp_port: None,
                }),
            },
        )
        .unwrap();

        match registry.handle_frame(&not_leader) {
            FrameOutcome::Reconnect {
                tcp_endpoint,
                secure_tcp_endpoint,
            } => {
                assert_eq!(tcp_endpoint, Some(Endpoint::new("10.0.0.9", 1113)));
                assert!(secure_tcp_endpoint.is_none());
            }
            other => panic!("expected reconnect, got {other:?}"),
        }
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_unrecognized_command_keeps_operation() {
        let registry = OperationRegistry::new();
        let (op, _rx) = DeletePersistentSubscriptionOperation::new("orders", "workers", None);
        let correlation_id = op.correlation_id();
        registry.register(Box::new(op)).unwrap();

        // Right correlation id, wrong command family.
        let frame = Frame::from_json(
            Command::CreatePersistentSubscriptionCompleted,
            correlation_id,
            &serde_json::json!({ "result": "SUCCESS" }),
        )
        .unwrap();

        assert!(matches!(
            registry.handle_frame(&frame),
            FrameOutcome::Unrecognized
        ));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_subscription_lifecycle_through_registry() {
        tokio_test::block_on(async {
            let registry = OperationRegistry::new();
            let (op, mut rx) = VolatileSubscriptionOperation::new("orders", false, None);
            let correlation_id = op.correlation_id();
            registry.register(Box::new(op)).unwrap();

            let confirmation = Frame::from_json(
                Command::SubscriptionConfirmation,
                correlation_id,
                &message::SubscriptionConfirmation {
                    last_commit_position: 5,
                    last_event_number: Some(1),
                },
            )
            .unwrap();
            assert!(matches!(
                registry.handle_frame(&confirmation),
                FrameOutcome::Active
            ));
            let mut handle = rx.try_recv().unwrap().unwrap();

            let event = Frame::from_json(
                Command::StreamEventAppeared,
                correlation_id,
                &message::StreamEventAppeared {
                    event: message::ResolvedEvent::default(),
                },
            )
            .unwrap();
            assert!(matches!(registry.handle_frame(&event), FrameOutcome::Active));
            assert_eq!(registry.len(), 1);

            let dropped = Frame::from_json(
                Command::SubscriptionDropped,
                correlation_id,
                &message::SubscriptionDropped {
                    reason: message::SubscriptionDropped::UNSUBSCRIBED,
                },
            )
            .unwrap();
            assert!(matches!(
                registry.handle_frame(&dropped),
                FrameOutcome::Completed
            ));
            assert!(registry.is_empty());

            assert!(matches!(
                handle.next().await.unwrap(),
                SubscriptionNotification::EventAppeared(_)
            ));
            assert!(matches!(
                handle.next().await.unwrap(),
                SubscriptionNotification::Dropped {
                    reason: SubscriptionDropReason::UserInitiated,
                    error: None,
                }
            ));
        });
    }

    #[test]
    fn test_fail_all_drains_everything() {
        tokio_test::block_on(async {
            let registry = OperationRegistry::new();

            let mut delete_rxs = Vec::new();
            for _ in 0..3 {
                let (op, rx) = DeletePersistentSubscriptionOperation::new("orders", "workers", None);
                registry.register(Box::new(op)).unwrap();
                delete_rxs.push(rx);
            }

            // One confirmed subscription, one still awaiting confirmation.
            let (confirmed_op, mut confirmed_rx) =
                VolatileSubscriptionOperation::new("orders", false, None);
            let confirmed_id = confirmed_op.correlation_id();
            registry.register(Box::new(confirmed_op)).unwrap();
            let confirmation = Frame::from_json(
                Command::SubscriptionConfirmation,
                confirmed_id,
                &message::SubscriptionConfirmation {
                    last_commit_position: 0,
                    last_event_number: None,
                },
            )
            .unwrap();
            registry.handle_frame(&confirmation);
            let mut handle = confirmed_rx.try_recv().unwrap().unwrap();

            let (pending_op, mut pending_rx) =
                VolatileSubscriptionOperation::new("payments", false, None);
            registry.register(Box::new(pending_op)).unwrap();

            assert_eq!(registry.fail_all(), 5);
            assert!(registry.is_empty());

            for mut rx in delete_rxs {
                assert!(matches!(
                    rx.try_recv(),
                    Ok(Err(ClientError::ConnectionClosed))
                ));
            }
            assert!(matches!(
                handle.next().await.unwrap(),
                SubscriptionNotification::Dropped {
                    reason: SubscriptionDropReason::ConnectionClosed,
                    ..
                }
            ));
            assert!(matches!(
                pending_rx.try_recv(),
                Ok(Err(ClientError::ConnectionClosed))
            ));

            // Teardown is idempotent on an empty table.
            assert_eq!(registry.fail_all(), 0);
        });
    }
}
