//! Demultiplexer: dequeues inbound packets and routes them to operations.
//!
//! A `Suspend` (from the peer, the watchdog, the socket tasks or a manual
//! shutdown) tears the connection down: every registered operation gets the
//! packet, the table closes, the send path is disabled and one `Suspended`
//! event is published.

use std::sync::Arc;

use tokio::sync::mpsc;

use assetlink_core::payload;
use assetlink_core::wire::{ErrorType, Packet, PacketType};

use crate::connection::{ConnectionState, PacketSink};
use crate::event::{EventCapsule, EventSink};
use crate::table::OperationTable;

pub struct Demultiplexer {
    inbound: mpsc::UnboundedReceiver<Packet>,
    table: OperationTable,
    outbound: PacketSink,
    state: Arc<ConnectionState>,
    events: EventSink,
    /// One token per dequeued packet, read by the watchdog.
    activity: mpsc::Sender<()>,
}

impl Demultiplexer {
    pub fn new(
        inbound: mpsc::UnboundedReceiver<Packet>,
        table: OperationTable,
        outbound: PacketSink,
        state: Arc<ConnectionState>,
        events: EventSink,
        activity: mpsc::Sender<()>,
    ) -> Self {
        Self {
            inbound,
            table,
            outbound,
            state,
            events,
            activity,
        }
    }

    /// Route until teardown. Returns the reason the connection ended.
    pub async fn run(mut self) -> ErrorType {
        loop {
            let Some(packet) = self.inbound.recv().await else {
                tracing::debug!("inbound queue closed without suspend");
                let reason = ErrorType::SocketClosed;
                self.teardown(&Packet::suspend(reason), reason);
                return reason;
            };
            // Full channel means a token is already pending.
            let _ = self.activity.try_send(());

            match packet.packet_type() {
                Some(PacketType::Suspend) => {
                    let reason = payload::decode_suspend(&packet.payload);
                    self.teardown(&packet, reason);
                    return reason;
                }
                Some(PacketType::ConnectionCheck) => {
                    tracing::trace!(sequence = packet.sequence, "echoing connection check");
                    self.outbound.send(packet);
                }
                _ => {
                    if let Err(packet) = self.table.route(packet) {
                        tracing::trace!(
                            operation_id = packet.operation_id,
                            request_type = packet.request_type,
                            "no operation for packet, dropped"
                        );
                    }
                }
            }
        }
    }

    fn teardown(&self, packet: &Packet, reason: ErrorType) {
        let reached = self.table.broadcast_and_close(packet);
        self.state.deactivate();
        self.state.signal_shutdown();
        tracing::info!(?reason, operations = reached, "connection suspended");
        self.events
            .emit(EventCapsule::suspended(reason, self.state.user_id()));
    }
}
