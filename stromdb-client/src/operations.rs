//! Persistent subscription administration operations: create, update,
//! delete.

use stromdb_protocol::message::{
    self, CreatePersistentSubscriptionResult, DeletePersistentSubscriptionResult,
    UpdatePersistentSubscriptionResult,
};
use stromdb_protocol::{Command, Credentials, Frame};
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::error::ClientError;
use crate::inspection::InspectionResult;
use crate::operation::{ClientOperation, OperationBase};
use crate::settings::PersistentSubscriptionSettings;

/// Completion status of a persistent subscription admin operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistentSubscriptionStatus {
    Success,
    Failure,
}

/// Result of creating a persistent subscription group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PersistentSubscriptionCreateResult {
    pub status: PersistentSubscriptionStatus,
}

/// Result of updating a persistent subscription group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PersistentSubscriptionUpdateResult {
    pub status: PersistentSubscriptionStatus,
}

/// Result of deleting a persistent subscription group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PersistentSubscriptionDeleteResult {
    pub status: PersistentSubscriptionStatus,
}

/// Creates a persistent subscription group on a stream.
#[derive(Debug)]
pub struct CreatePersistentSubscriptionOperation {
    base: OperationBase<PersistentSubscriptionCreateResult>,
    stream_id: String,
    group_name: String,
    settings: PersistentSubscriptionSettings,
}

impl CreatePersistentSubscriptionOperation {
    pub fn new(
        stream_id: impl Into<String>,
        group_name: impl Into<String>,
        settings: PersistentSubscriptionSettings,
        credentials: Option<Credentials>,
    ) -> (
        Self,
        oneshot::Receiver<Result<PersistentSubscriptionCreateResult, ClientError>>,
    ) {
        let (base, rx) = OperationBase::new("CreatePersistentSubscription", credentials);
        (
            CreatePersistentSubscriptionOperation {
                base,
                stream_id: stream_id.into(),
                group_name: group_name.into(),
                settings,
            },
            rx,
        )
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.base = self.base.with_max_retries(max_retries);
        self
    }

    fn inspect_completed(&mut self, frame: &Frame) -> InspectionResult {
        let completed: message::CreatePersistentSubscriptionCompleted = match frame.body_as() {
            Ok(body) => body,
            Err(e) => return fail_decoding(&mut self.base, e.into()),
        };

        match completed.result {
            CreatePersistentSubscriptionResult::Success => {
                self.base.succeed(PersistentSubscriptionCreateResult {
                    status: PersistentSubscriptionStatus::Success,
                });
                InspectionResult::end_operation("Success")
            }
            CreatePersistentSubscriptionResult::AlreadyExists => {
                self.base.fail(ClientError::AlreadyExists {
                    group: self.group_name.clone(),
                    stream: self.stream_id.clone(),
                });
                InspectionResult::end_operation("AlreadyExists")
            }
            CreatePersistentSubscriptionResult::Fail => {
                self.base.fail(ClientError::OperationFailed {
                    group: self.group_name.clone(),
                    stream: self.stream_id.clone(),
                    reason: completed.reason.unwrap_or_default(),
                });
                InspectionResult::end_operation("Fail")
            }
            CreatePersistentSubscriptionResult::AccessDenied => {
                self.base
                    .fail(ClientError::AccessDenied(self.stream_id.clone()));
                InspectionResult::end_operation("AccessDenied")
            }
            CreatePersistentSubscriptionResult::Unknown => fail_unexpected(&mut self.base),
        }
    }
}

impl ClientOperation for CreatePersistentSubscriptionOperation {
    fn name(&self) -> &'static str {
        self.base.name()
    }

    fn correlation_id(&self) -> Uuid {
        self.base.correlation_id()
    }

    fn build_request(&self) -> Result<Frame, ClientError> {
        let body = message::CreatePersistentSubscription {
            subscription_group_name: self.group_name.clone(),
            event_stream_id: self.stream_id.clone(),
            config: self.settings.to_config(),
        };
        self.base
            .request_frame(Command::CreatePersistentSubscription, &body)
    }

    fn inspect(&mut self, frame: &Frame) -> Option<InspectionResult> {
        match frame.command {
            Command::CreatePersistentSubscriptionCompleted => Some(self.inspect_completed(frame)),
            _ => self.base.inspect_command(frame),
        }
    }

    fn fail(&mut self, error: ClientError) {
        self.base.fail(error);
    }
}

/// Updates the configuration of an existing persistent subscription group.
#[derive(Debug)]
pub struct UpdatePersistentSubscriptionOperation {
    base: OperationBase<PersistentSubscriptionUpdateResult>,
    stream_id: String,
    group_name: String,
    settings: PersistentSubscriptionSettings,
}

impl UpdatePersistentSubscriptionOperation {
    pub fn new(
        stream_id: impl Into<String>,
        group_name: impl Into<String>,
        settings: PersistentSubscriptionSettings,
        credentials: Option<Credentials>,
    ) -> (
        Self,
        oneshot::Receiver<Result<PersistentSubscriptionUpdateResult, ClientError>>,
    ) {
        let (base, rx) = OperationBase::new("UpdatePersistentSubscription", credentials);
        (
            UpdatePersistentSubscriptionOperation {
                base,
                stream_id: stream_id.into(),
                group_name: group_name.into(),
                settings,
            },
            rx,
        )
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.base = self.base.with_max_retries(max_retries);
        self
    }

    fn inspect_completed(&mut self, frame: &Frame) -> InspectionResult {
        let completed: message::UpdatePersistentSubscriptionCompleted = match frame.body_as() {
            Ok(body) => body,
            Err(e) => return fail_decoding(&mut self.base, e.into()),
        };

        match completed.result {
            UpdatePersistentSubscriptionResult::Success => {
                self.base.succeed(PersistentSubscriptionUpdateResult {
                    status: PersistentSubscriptionStatus::Success,
                });
                InspectionResult::end_operation("Success")
            }
            UpdatePersistentSubscriptionResult::DoesNotExist => {
                self.base.fail(ClientError::DoesNotExist {
                    group: self.group_name.clone(),
                    stream: self.stream_id.clone(),
                });
                InspectionResult::end_operation("DoesNotExist")
            }
            UpdatePersistentSubscriptionResult::Fail => {
                self.base.fail(ClientError::OperationFailed {
                    group: self.group_name.clone(),
                    stream: self.stream_id.clone(),
                    reason: completed.reason.unwrap_or_default(),
                });
                InspectionResult::end_operation("Fail")
            }
            UpdatePersistentSubscriptionResult::AccessDenied => {
                self.base
                    .fail(ClientError::AccessDenied(self.stream_id.clone()));
                InspectionResult::end_operation("AccessDenied")
            }
            UpdatePersistentSubscriptionResult::Unknown => fail_unexpected(&mut self.base),
        }
    }
}

impl ClientOperation for UpdatePersistentSubscriptionOperation {
    fn name(&self) -> &'static str {
        self.base.name()
    }

    fn correlation_id(&self) -> Uuid {
        self.base.correlation_id()
    }

    fn build_request(&self) -> Result<Frame, ClientError> {
        let body = message::UpdatePersistentSubscription {
            subscription_group_name: self.group_name.clone(),
            event_stream_id: self.stream_id.clone(),
            config: self.settings.to_config(),
        };
        self.base
            .request_frame(Command::UpdatePersistentSubscription, &body)
    }

    fn inspect(&mut self, frame: &Frame) -> Option<InspectionResult> {
        match frame.command {
            Command::UpdatePersistentSubscriptionCompleted => Some(self.inspect_completed(frame)),
            _ => self.base.inspect_command(frame),
        }
    }

    fn fail(&mut self, error: ClientError) {
        self.base.fail(error);
    }
}

/// Deletes a persistent subscription group.
#[derive(Debug)]
pub struct DeletePersistentSubscriptionOperation {
    base: OperationBase<PersistentSubscriptionDeleteResult>,
    stream_id: String,
    group_name: String,
}

impl DeletePersistentSubscriptionOperation {
    pub fn new(
        stream_id: impl Into<String>,
        group_name: impl Into<String>,
        credentials: Option<Credentials>,
    ) -> (
        Self,
        oneshot::Receiver<Result<PersistentSubscriptionDeleteResult, ClientError>>,
    ) {
        let (base, rx) = OperationBase::new("DeletePersistentSubscription", credentials);
        (
            DeletePersistentSubscriptionOperation {
                base,
                stream_id: stream_id.into(),
                group_name: group_name.into(),
            },
            rx,
        )
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.base = self.base.with_max_retries(max_retries);
        self
    }

    fn inspect_completed(&mut self, frame: &Frame) -> InspectionResult {
        let completed: message::DeletePersistentSubscriptionCompleted = match frame.body_as() {
            Ok(body) => body,
            Err(e) => return fail_decoding(&mut self.base, e.into()),
        };

        match completed.result {
            DeletePersistentSubscriptionResult::Success => {
                self.base.succeed(PersistentSubscriptionDeleteResult {
                    status: PersistentSubscriptionStatus::Success,
                });
                InspectionResult::end_operation("Success")
            }
            DeletePersistentSubscriptionResult::DoesNotExist => {
                self.base.fail(ClientError::DoesNotExist {
                    group: self.group_name.clone(),
                    stream: self.stream_id.clone(),
                });
                InspectionResult::end_operation("DoesNotExist")
            }
            DeletePersistentSubscriptionResult::Fail => {
                self.base.fail(ClientError::OperationFailed {
                    group: self.group_name.clone(),
                    stream: self.stream_id.clone(),
                    reason: completed.reason.unwrap_or_default(),
                });
                InspectionResult::end_operation("Fail")
            }
            DeletePersistentSubscriptionResult::AccessDenied => {
                self.base
                    .fail(ClientError::AccessDenied(self.stream_id.clone()));
                InspectionResult::end_operation("AccessDenied")
            }
            DeletePersistentSubscriptionResult::Unknown => fail_unexpected(&mut self.base),
        }
    }
}

impl ClientOperation for DeletePersistentSubscriptionOperation {
    fn name(&self) -> &'static str {
        self.base.name()
    }

    fn correlation_id(&self) -> Uuid {
        self.base.correlation_id()
    }

    fn build_request(&self) -> Result<Frame, ClientError> {
        let body = message::DeletePersistentSubscription {
            subscription_group_name: self.group_name.clone(),
            event_stream_id: self.stream_id.clone(),
        };
        self.base
            .request_frame(Command::DeletePersistentSubscription, &body)
    }

    fn inspect(&mut self, frame: &Frame) -> Option<InspectionResult> {
        match frame.command {
            Command::DeletePersistentSubscriptionCompleted => Some(self.inspect_completed(frame)),
            _ => self.base.inspect_command(frame),
        }
    }

    fn fail(&mut self, error: ClientError) {
        self.base.fail(error);
    }
}

/// Fails an operation whose completed payload would not decode.
fn fail_decoding<T>(base: &mut OperationBase<T>, error: ClientError) -> InspectionResult {
    let description = format!("Exception - {error}");
    base.fail(error);
    InspectionResult::end_operation(description)
}

/// Fails an operation that reported a result code outside the known set.
fn fail_unexpected<T>(base: &mut OperationBase<T>) -> InspectionResult {
    base.fail(ClientError::UnexpectedResult(base.name().to_string()));
    InspectionResult::end_operation("UnexpectedResult")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::oneshot::error::TryRecvError;

    use crate::inspection::InspectionDecision;

    fn completed_frame(
        operation: &dyn ClientOperation,
        command: Command,
        result: &str,
    ) -> Frame {
        Frame::from_json(
            command,
            operation.correlation_id(),
            &serde_json::json!({ "result": result }),
        )
        .unwrap()
    }

    #[test]
    fn test_create_request_shape() {
        let (op, _rx) = CreatePersistentSubscriptionOperation::new(
            "orders",
            "workers",
            PersistentSubscriptionSettings::default(),
            Some(Credentials::new("admin", "changeit")),
        );

        let frame = op.build_request().unwrap();
        assert_eq!(frame.command, Command::CreatePersistentSubscription);
        assert!(frame.flags().is_authenticated());

        let body: message::CreatePersistentSubscription = frame.body_as().unwrap();
        assert_eq!(body.subscription_group_name, "workers");
        assert_eq!(body.event_stream_id, "orders");
        assert_eq!(body.config.start_from, -1);
        assert_eq!(body.config.message_timeout_milliseconds, 30_000);
        assert!(body.config.prefer_round_robin);
    }

    #[test]
    fn test_build_request_is_deterministic() {
        let (op, _rx) = DeletePersistentSubscriptionOperation::new("orders", "workers", None);

        let first = op.build_request().unwrap();
        let second = op.build_request().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_create_success() {
        let (mut op, mut rx) = CreatePersistentSubscriptionOperation::new(
            "orders",
            "workers",
            PersistentSubscriptionSettings::default(),
            None,
        );
        let frame = completed_frame(&op, Command::CreatePersistentSubscriptionCompleted, "SUCCESS");

        let result = op.inspect(&frame).unwrap();
        assert_eq!(result.decision, InspectionDecision::EndOperation);
        assert_eq!(result.description, "Success");
        assert!(matches!(
            rx.try_recv(),
            Ok(Ok(PersistentSubscriptionCreateResult {
                status: PersistentSubscriptionStatus::Success
            }))
        ));
    }

    #[test]
    fn test_create_already_exists() {
        let (mut op, mut rx) = CreatePersistentSubscriptionOperation::new(
            "orders",
            "workers",
            PersistentSubscriptionSettings::default(),
            None,
        );
        let frame = completed_frame(
            &op,
            Command::CreatePersistentSubscriptionCompleted,
            "ALREADY_EXISTS",
        );

        let result = op.inspect(&frame).unwrap();
        assert_eq!(result.description, "AlreadyExists");
        assert!(matches!(
            rx.try_recv(),
            Ok(Err(ClientError::AlreadyExists { group, stream })) if group == "workers" && stream == "orders"
        ));
    }

    #[test]
    fn test_update_does_not_exist() {
        let (mut op, mut rx) = UpdatePersistentSubscriptionOperation::new(
            "orders",
            "workers",
            PersistentSubscriptionSettings::default(),
            None,
        );
        let frame = completed_frame(
            &op,
            Command::UpdatePersistentSubscriptionCompleted,
            "DOES_NOT_EXIST",
        );

        let result = op.inspect(&frame).unwrap();
        assert_eq!(result.description, "DoesNotExist");
        assert!(matches!(
            rx.try_recv(),
            Ok(Err(ClientError::DoesNotExist { .. }))
        ));
    }

    #[test]
    fn test_delete_result_table() {
        // Success
        let (mut op, mut rx) = DeletePersistentSubscriptionOperation::new("orders", "workers", None);
        let frame = completed_frame(&op, Command::DeletePersistentSubscriptionCompleted, "SUCCESS");
        assert_eq!(op.inspect(&frame).unwrap().description, "Success");
        assert!(matches!(rx.try_recv(), Ok(Ok(_))));

        // AccessDenied
        let (mut op, mut rx) = DeletePersistentSubscriptionOperation::new("orders", "workers", None);
        let frame = completed_frame(
            &op,
            Command::DeletePersistentSubscriptionCompleted,
            "ACCESS_DENIED",
        );
        assert_eq!(op.inspect(&frame).unwrap().description, "AccessDenied");
        assert!(matches!(
            rx.try_recv(),
            Ok(Err(ClientError::AccessDenied(stream))) if stream == "orders"
        ));

        // DoesNotExist
        let (mut op, mut rx) = DeletePersistentSubscriptionOperation::new("orders", "workers", None);
        let frame = completed_frame(
            &op,
            Command::DeletePersistentSubscriptionCompleted,
            "DOES_NOT_EXIST",
        );
        assert_eq!(op.inspect(&frame).unwrap().description, "DoesNotExist");
        assert!(matches!(
            rx.try_recv(),
            Ok(Err(ClientError::DoesNotExist { .. }))
        ));
    }

    #[test]
    fn test_delete_fail_carries_reason() {
        let (mut op, mut rx) = DeletePersistentSubscriptionOperation::new("orders", "workers", None);
        let frame = Frame::from_json(
            Command::DeletePersistentSubscriptionCompleted,
            op.correlation_id(),
            &serde_json::json!({ "result": "FAIL", "reason": "backend offline" }),
        )
        .unwrap();

        let result = op.inspect(&frame).unwrap();
        assert_eq!(result.description, "Fail");
        let err = rx.try_recv().unwrap().unwrap_err();
        assert_eq!(
            err.to_string(),
            "subscription group 'workers' on stream 'orders' failed 'backend offline'"
        );
    }

    #[test]
    fn test_unknown_result_is_unexpected() {
        let (mut op, mut rx) = DeletePersistentSubscriptionOperation::new("orders", "workers", None);
        let frame = completed_frame(
            &op,
            Command::DeletePersistentSubscriptionCompleted,
            "SOMETHING_NEW",
        );

        let result = op.inspect(&frame).unwrap();
        assert_eq!(result.decision, InspectionDecision::EndOperation);
        assert_eq!(result.description, "UnexpectedResult");
        assert!(matches!(
            rx.try_recv(),
            Ok(Err(ClientError::UnexpectedResult(name))) if name == "DeletePersistentSubscription"
        ));
    }

    #[test]
    fn test_unrecognized_command_returns_none() {
        let (mut op, mut rx) = DeletePersistentSubscriptionOperation::new("orders", "workers", None);
        // A completed frame for a different operation family.
        let frame = completed_frame(&op, Command::CreatePersistentSubscriptionCompleted, "SUCCESS");

        assert!(op.inspect(&frame).is_none());
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[test]
    fn test_teardown_fails_with_connection_closed() {
        let (mut op, mut rx) = DeletePersistentSubscriptionOperation::new("orders", "workers", None);

        ClientOperation::fail(&mut op, ClientError::ConnectionClosed);

        assert!(matches!(
            rx.try_recv(),
            Ok(Err(ClientError::ConnectionClosed))
        ));
    }
}
