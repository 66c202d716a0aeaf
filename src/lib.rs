//! StromDB client driver.
//!
//! This crate re-exports the two building blocks of the driver:
//!
//! - [`protocol`] defines the binary frame layout and the JSON message
//!   bodies exchanged with a StromDB server.
//! - [`client`] implements the operation layer on top of it: pending
//!   operation tracking, volatile and persistent subscriptions, and
//!   endpoint discovery.
//!
//! Applications normally depend on this crate and pull the pieces they
//! need from the re-exported modules:
//!
//! ```
//! use stromdb::client::{OperationRegistry, VolatileSubscriptionOperation};
//! use stromdb::protocol::{Command, Frame};
//!
//! let registry = OperationRegistry::new();
//! let (operation, _completion) =
//!     VolatileSubscriptionOperation::new("orders", true, None);
//! let frame: Frame = registry.register(Box::new(operation)).unwrap();
//! assert_eq!(frame.command, Command::SubscribeToStream);
//! ```

pub use stromdb_client as client;
pub use stromdb_protocol as protocol;
