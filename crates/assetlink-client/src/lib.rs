//! assetlink-client: connection handling and transfer operations.
//!
//! [`OperationManager`] is the entry point: connect, start requests, and
//! collect one [`EventCapsule`] per operation from its event queue.

pub mod communicator;
pub mod connection;
pub mod demux;
pub mod error;
pub mod event;
pub mod manager;
pub mod operation;
pub mod table;
pub mod watchdog;

pub use error::ClientError;
pub use event::{EventCapsule, FileTransfer, NetworkEvent};
pub use manager::OperationManager;
pub use table::{OperationKind, MAX_OPERATIONS};
