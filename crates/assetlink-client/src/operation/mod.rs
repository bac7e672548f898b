//! Operations: one worker per in-flight request.
//!
//! A worker sends its request, reads replies from its private queue, and
//! returns exactly one terminal capsule. It never touches the table: the
//! spawn wrapper releases the id and then publishes the capsule.

use std::sync::Arc;

use tokio::sync::mpsc;

use assetlink_core::wire::Packet;

use crate::connection::{ConnectionState, PacketSink};
use crate::error::ClientError;
use crate::event::{EventCapsule, EventSink};
use crate::table::{OperationKind, OperationTable, Registration};

mod file_request;
mod file_save;
mod id_request;

pub use file_request::FileRequest;
pub use file_save::FileSave;
pub use id_request::IdRequest;

/// What a worker sees of the connection.
pub struct OperationContext {
    pub id: u8,
    inbox: mpsc::UnboundedReceiver<Packet>,
    outbound: PacketSink,
    connection: Arc<ConnectionState>,
}

impl OperationContext {
    pub fn new(
        registration: Registration,
        outbound: PacketSink,
        connection: Arc<ConnectionState>,
    ) -> Self {
        Self {
            id: registration.id,
            inbox: registration.inbox,
            outbound,
            connection,
        }
    }

    fn send(&self, packet: Packet) {
        if !self.outbound.send(packet) {
            tracing::debug!(
                operation_id = self.id,
                "request not sent, connection inactive"
            );
        }
    }

    /// Next packet routed to this operation; `None` once the table is gone.
    async fn next_packet(&mut self) -> Option<Packet> {
        self.inbox.recv().await
    }

    fn user_id(&self) -> u32 {
        self.connection.user_id()
    }
}

pub enum Operation {
    IdRequest(IdRequest),
    FileRequest(FileRequest),
    FileSave(FileSave),
}

impl Operation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::IdRequest(_) => OperationKind::IdRequest,
            Operation::FileRequest(_) => OperationKind::FileRequest,
            Operation::FileSave(_) => OperationKind::FileSave,
        }
    }

    pub async fn run(self, ctx: OperationContext) -> EventCapsule {
        match self {
            Operation::IdRequest(op) => op.run(ctx).await,
            Operation::FileRequest(op) => op.run(ctx).await,
            Operation::FileSave(op) => op.run(ctx).await,
        }
    }
}

/// Register `op`, start its worker, and return the assigned id.
pub fn spawn(
    op: Operation,
    table: &OperationTable,
    outbound: PacketSink,
    connection: Arc<ConnectionState>,
    events: EventSink,
) -> Result<u8, ClientError> {
    let registration = table.register(op.kind())?;
    let id = registration.id;
    let ctx = OperationContext::new(registration, outbound, connection);
    let table = table.clone();

    tokio::spawn(async move {
        let capsule = op.run(ctx).await;
        table.release(id);
        events.emit(capsule);
    });

    Ok(id)
}
