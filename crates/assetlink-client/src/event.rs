//! Outcome events handed to the application, and the queue that carries them.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;
use tokio::sync::{mpsc, Mutex};

use assetlink_core::wire::{ErrorType, FileType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum NetworkEvent {
    FileRequestDone,
    FileRequestFailed,
    IdRequestDone,
    IdRequestFailed,
    FileSaveDone,
    FileSaveFailed,
    Connected,
    Suspended,
}

/// A downloaded file.
///
/// `file_name`, `file_size` and `file_type` come from the leading
/// `FileInfo` packet; when the server skipped it they are empty, zero and
/// `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileTransfer {
    pub data: Bytes,
    pub file_name: String,
    pub file_size: u32,
    pub file_type: Option<FileType>,
}

/// One outcome. Every operation produces exactly one of these; the
/// connection produces `Connected` and `Suspended`.
#[derive(Debug, Clone, Serialize)]
pub struct EventCapsule {
    pub event: NetworkEvent,
    pub error: ErrorType,
    pub user_id: u32,
    /// 0 for connection-level events.
    pub operation_id: u8,
    #[serde(skip)]
    pub file: Option<FileTransfer>,
}

impl EventCapsule {
    pub fn new(event: NetworkEvent, error: ErrorType, user_id: u32, operation_id: u8) -> Self {
        Self {
            event,
            error,
            user_id,
            operation_id,
            file: None,
        }
    }

    pub fn connected(user_id: u32) -> Self {
        Self::new(NetworkEvent::Connected, ErrorType::Success, user_id, 0)
    }

    pub fn suspended(reason: ErrorType, user_id: u32) -> Self {
        Self::new(NetworkEvent::Suspended, reason, user_id, 0)
    }

    pub fn with_file(mut self, file: FileTransfer) -> Self {
        self.file = Some(file);
        self
    }

    pub fn is_success(&self) -> bool {
        self.error == ErrorType::Success
    }
}

// ── Queue ─────────────────────────────────────────────────────────────────────

/// Producer side, cloned into every operation worker and the demultiplexer.
#[derive(Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<EventCapsule>,
    pending: Arc<AtomicUsize>,
}

impl EventSink {
    pub fn emit(&self, capsule: EventCapsule) {
        tracing::debug!(
            event = ?capsule.event,
            error = ?capsule.error,
            operation_id = capsule.operation_id,
            "event emitted"
        );
        self.pending.fetch_add(1, Ordering::SeqCst);
        if self.tx.send(capsule).is_err() {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            tracing::debug!("event queue dropped, discarding event");
        }
    }
}

/// Consumer side, owned by the manager.
pub struct EventQueue {
    rx: Mutex<mpsc::UnboundedReceiver<EventCapsule>>,
    pending: Arc<AtomicUsize>,
}

impl EventQueue {
    /// Wait for the next event. `None` only once every sink is gone.
    pub async fn next(&self) -> Option<EventCapsule> {
        let capsule = self.rx.lock().await.recv().await;
        if capsule.is_some() {
            self.pending.fetch_sub(1, Ordering::SeqCst);
        }
        capsule
    }

    /// Take an event if one is queued and no other caller is waiting.
    pub fn try_next(&self) -> Option<EventCapsule> {
        let capsule = self.rx.try_lock().ok()?.try_recv().ok();
        if capsule.is_some() {
            self.pending.fetch_sub(1, Ordering::SeqCst);
        }
        capsule
    }

    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }
}

pub fn event_channel() -> (EventSink, EventQueue) {
    let (tx, rx) = mpsc::unbounded_channel();
    let pending = Arc::new(AtomicUsize::new(0));
    (
        EventSink {
            tx,
            pending: pending.clone(),
        },
        EventQueue {
            rx: Mutex::new(rx),
            pending,
        },
    )
}
