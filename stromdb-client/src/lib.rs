//! # stromdb-client
//!
//! Client driver core for StromDB.
//!
//! This crate provides:
//! - The operation contract and response inspection vocabulary
//! - Volatile and persistent subscription state machines
//! - The in-flight operation registry keyed by correlation id
//! - Endpoint discovery for single-node and multi-node targets
//! - Persistent subscription group settings and stream ACLs

pub mod discovery;
pub mod error;
pub mod inspection;
pub mod operation;
pub mod operations;
pub mod persistent;
pub mod registry;
pub mod settings;
pub mod streams;
pub mod subscription;
pub mod types;

pub use discovery::{EndpointDiscoverer, RoundRobinEndpointDiscoverer, SingleEndpointDiscoverer};
pub use error::ClientError;
pub use inspection::{InspectionDecision, InspectionResult};
pub use operation::{ClientOperation, OperationBase, DEFAULT_MAX_RETRIES};
pub use operations::{
    CreatePersistentSubscriptionOperation, DeletePersistentSubscriptionOperation,
    PersistentSubscriptionCreateResult, PersistentSubscriptionDeleteResult,
    PersistentSubscriptionStatus, PersistentSubscriptionUpdateResult,
    UpdatePersistentSubscriptionOperation,
};
pub use persistent::{
    PersistentSubscription, PersistentSubscriptionEvent, PersistentSubscriptionOperation,
    DEFAULT_BUFFER_SIZE,
};
pub use registry::{FrameOutcome, OperationRegistry};
pub use settings::{ConsumerStrategy, PersistentSubscriptionSettings, StreamAcl, SystemSettings};
pub use subscription::{Subscription, SubscriptionNotification, VolatileSubscriptionOperation};
pub use types::{Endpoint, NodeEndpoints, SubscriptionDropReason};
