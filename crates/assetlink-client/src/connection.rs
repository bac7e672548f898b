//! Per-connection shared state and the gated outbound packet sink.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};

use assetlink_core::wire::Packet;

/// State shared by every task of one connection.
///
/// Replaced wholesale on reconnect.
#[derive(Debug)]
pub struct ConnectionState {
    user_id: AtomicU32,
    /// Advisory: workers check it before sending, it is not a lock.
    active: AtomicBool,
    shutdown: broadcast::Sender<()>,
}

impl ConnectionState {
    pub fn new(user_id: u32) -> Self {
        let (shutdown, _) = broadcast::channel(1);
        Self {
            user_id: AtomicU32::new(user_id),
            active: AtomicBool::new(false),
            shutdown,
        }
    }

    pub fn user_id(&self) -> u32 {
        self.user_id.load(Ordering::SeqCst)
    }

    pub fn set_user_id(&self, user_id: u32) {
        self.user_id.store(user_id, Ordering::SeqCst);
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn activate(&self) {
        self.active.store(true, Ordering::SeqCst);
    }

    /// Returns whether the connection was active before the call.
    pub fn deactivate(&self) -> bool {
        self.active.swap(false, Ordering::SeqCst)
    }

    /// Stop the communicator's reader and writer.
    pub fn signal_shutdown(&self) {
        // No receivers just means the communicator already stopped.
        let _ = self.shutdown.send(());
    }

    pub fn subscribe_shutdown(&self) -> broadcast::Receiver<()> {
        self.shutdown.subscribe()
    }
}

/// Outbound side of the connection as seen by operations and the
/// demultiplexer. Drops packets once the connection is inactive.
#[derive(Clone)]
pub struct PacketSink {
    tx: mpsc::UnboundedSender<Packet>,
    state: Arc<ConnectionState>,
}

impl PacketSink {
    pub fn new(tx: mpsc::UnboundedSender<Packet>, state: Arc<ConnectionState>) -> Self {
        Self { tx, state }
    }

    /// Queue `packet` for the writer. Returns false if it was dropped.
    pub fn send(&self, packet: Packet) -> bool {
        if !self.state.is_active() {
            tracing::trace!(
                request_type = packet.request_type,
                operation_id = packet.operation_id,
                "send path disabled, dropping packet"
            );
            return false;
        }
        self.tx.send(packet).is_ok()
    }
}
