//! Active-operation table: which operation owns which id.
//!
//! One mutex guards every access: lookup, insert, remove, the free-id scan
//! and the teardown broadcast. The guard is never held across an await.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tokio::sync::mpsc;

use assetlink_core::wire::Packet;

use crate::error::ClientError;

/// Ids 1..=255 are assignable; 0 is the control id.
pub const MAX_OPERATIONS: usize = u8::MAX as usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum OperationKind {
    IdRequest,
    FileRequest,
    FileSave,
}

struct Entry {
    kind: OperationKind,
    inbox: mpsc::UnboundedSender<Packet>,
}

#[derive(Default)]
struct Inner {
    entries: BTreeMap<u8, Entry>,
    /// Set by the teardown broadcast; no registrations afterwards.
    closed: bool,
}

/// An id handed out by [`OperationTable::register`] and the private queue
/// the demultiplexer feeds for it.
pub struct Registration {
    pub id: u8,
    pub inbox: mpsc::UnboundedReceiver<Packet>,
}

/// Shared by the manager, the demultiplexer and every worker.
#[derive(Clone, Default)]
pub struct OperationTable {
    inner: Arc<Mutex<Inner>>,
}

impl OperationTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Allocate the lowest free id and register an operation under it.
    pub fn register(&self, kind: OperationKind) -> Result<Registration, ClientError> {
        let mut inner = self.lock();
        if inner.closed {
            return Err(ClientError::NotActive);
        }
        let id = (1..=u8::MAX)
            .find(|id| !inner.entries.contains_key(id))
            .ok_or(ClientError::IdsExhausted)?;
        let (tx, rx) = mpsc::unbounded_channel();
        inner.entries.insert(id, Entry { kind, inbox: tx });
        tracing::debug!(operation_id = id, ?kind, "operation registered");
        Ok(Registration { id, inbox: rx })
    }

    /// Remove `id`. Returns false if it was not registered.
    pub fn release(&self, id: u8) -> bool {
        let removed = self.lock().entries.remove(&id);
        if let Some(entry) = &removed {
            tracing::debug!(operation_id = id, kind = ?entry.kind, "operation released");
        }
        removed.is_some()
    }

    /// Deliver `packet` to the operation named by its id.
    ///
    /// Hands the packet back if no such operation is registered, or if the
    /// operation has already stopped reading.
    pub fn route(&self, packet: Packet) -> Result<(), Packet> {
        let inner = self.lock();
        match inner.entries.get(&packet.operation_id) {
            Some(entry) => entry.inbox.send(packet).map_err(|e| e.0),
            None => Err(packet),
        }
    }

    /// Push `packet` into every registered queue and refuse further
    /// registrations. Returns how many operations were reached.
    pub fn broadcast_and_close(&self, packet: &Packet) -> usize {
        let mut inner = self.lock();
        inner.closed = true;
        inner
            .entries
            .values()
            .filter(|entry| entry.inbox.send(packet.clone()).is_ok())
            .count()
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, id: u8) -> bool {
        self.lock().entries.contains_key(&id)
    }

    #[cfg(test)]
    pub(crate) fn kind_of(&self, id: u8) -> Option<OperationKind> {
        self.lock().entries.get(&id).map(|e| e.kind)
    }

    #[cfg(test)]
    pub(crate) fn is_closed(&self) -> bool {
        self.lock().closed
    }
}
