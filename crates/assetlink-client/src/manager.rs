//! Operation manager: the application-facing handle.
//!
//! Owns the event queue for its whole lifetime and, while connected, the
//! per-connection context: state, operation table, outbound sink and the
//! inbound sender used for local teardown.

use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::mpsc;

use assetlink_core::config::ClientConfig;
use assetlink_core::wire::{ErrorType, FileType, Packet};

use crate::communicator;
use crate::connection::{ConnectionState, PacketSink};
use crate::demux::Demultiplexer;
use crate::error::ClientError;
use crate::event::{event_channel, EventCapsule, EventQueue, EventSink};
use crate::operation::{self, FileRequest, FileSave, IdRequest, Operation};
use crate::table::OperationTable;
use crate::watchdog::Watchdog;

struct Connection {
    state: Arc<ConnectionState>,
    table: OperationTable,
    outbound: PacketSink,
    inbound: mpsc::UnboundedSender<Packet>,
}

pub struct OperationManager {
    config: ClientConfig,
    events: EventSink,
    queue: EventQueue,
    connection: Option<Connection>,
}

impl OperationManager {
    pub fn new(config: ClientConfig) -> Self {
        let (events, queue) = event_channel();
        Self {
            config,
            events,
            queue,
            connection: None,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    // ── Connection lifecycle ─────────────────────────────────────────────────

    /// Connect over TCP. With `user_id == 0` an id is requested right away.
    pub async fn connect(
        &mut self,
        address: &str,
        port: u16,
        user_id: u32,
    ) -> Result<(), ClientError> {
        if self.is_active() {
            return Err(ClientError::AlreadyConnected);
        }
        let stream = TcpStream::connect((address, port))
            .await
            .map_err(|source| ClientError::Connect {
                addr: format!("{address}:{port}"),
                source,
            })?;
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(error = %e, "could not set TCP_NODELAY");
        }
        tracing::info!(address, port, user_id, "connected to asset server");
        self.connect_stream(stream, user_id)
    }

    /// Connect to the server and identity named in the configuration.
    pub async fn connect_configured(&mut self) -> Result<(), ClientError> {
        let address = self.config.server.address.clone();
        let port = self.config.server.port;
        let user_id = self.config.identity.user_id;
        self.connect(&address, port, user_id).await
    }

    /// Run the protocol over an already open byte stream.
    pub fn connect_stream<S>(&mut self, stream: S, user_id: u32) -> Result<(), ClientError>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        if self.is_active() {
            return Err(ClientError::AlreadyConnected);
        }

        let state = Arc::new(ConnectionState::new(user_id));
        let table = OperationTable::new();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (activity_tx, activity_rx) = mpsc::channel(1);
        let outbound = PacketSink::new(outbound_tx, state.clone());
        state.activate();

        communicator::spawn(stream, inbound_tx.clone(), outbound_rx, &state);
        tokio::spawn(
            Demultiplexer::new(
                inbound_rx,
                table.clone(),
                outbound.clone(),
                state.clone(),
                self.events.clone(),
                activity_tx,
            )
            .run(),
        );
        tokio::spawn(
            Watchdog::from_config(&self.config.watchdog).run(activity_rx, inbound_tx.clone()),
        );

        self.events.emit(EventCapsule::connected(user_id));
        self.connection = Some(Connection {
            state,
            table,
            outbound,
            inbound: inbound_tx,
        });

        if user_id == 0 {
            self.request_id()?;
        }
        Ok(())
    }

    /// Tear the connection down locally.
    ///
    /// Every active operation reports `SocketClosed` and one `Suspended`
    /// event with `ManualShutdown` follows.
    pub fn shutdown(&self) -> Result<(), ClientError> {
        let conn = self.connection.as_ref().ok_or(ClientError::NotActive)?;
        if !conn.state.deactivate() {
            return Err(ClientError::NotActive);
        }
        tracing::info!("manual shutdown requested");
        // Fails only if the demultiplexer already stopped, which means the
        // teardown has happened anyway.
        let _ = conn
            .inbound
            .send(Packet::suspend(ErrorType::ManualShutdown));
        Ok(())
    }

    pub fn is_active(&self) -> bool {
        self.connection
            .as_ref()
            .is_some_and(|c| c.state.is_active())
    }

    /// The connection's user id; 0 when unassigned or never connected.
    pub fn user_id(&self) -> u32 {
        self.connection.as_ref().map_or(0, |c| c.state.user_id())
    }

    // ── Requests ─────────────────────────────────────────────────────────────

    /// Ask the server for a new user id.
    pub fn request_id(&self) -> Result<u8, ClientError> {
        let conn = self.active()?;
        self.start(conn, Operation::IdRequest(IdRequest))
    }

    /// Download `file_name`. Returns the operation id.
    pub fn request_file(&self, file_name: &str, file_type: FileType) -> Result<u8, ClientError> {
        let conn = self.identified()?;
        let op = FileRequest::new(file_name, file_type, conn.state.user_id())?;
        self.start(conn, Operation::FileRequest(op))
    }

    /// Upload `data` as the user file `file_name`. Returns the operation id.
    pub fn save_user_file(
        &self,
        file_name: &str,
        data: impl Into<Bytes>,
    ) -> Result<u8, ClientError> {
        let conn = self.identified()?;
        let op = FileSave::new(file_name, data, conn.state.user_id())?;
        self.start(conn, Operation::FileSave(op))
    }

    fn active(&self) -> Result<&Connection, ClientError> {
        self.connection
            .as_ref()
            .filter(|c| c.state.is_active())
            .ok_or(ClientError::NotActive)
    }

    fn identified(&self) -> Result<&Connection, ClientError> {
        let conn = self.active()?;
        if conn.state.user_id() == 0 {
            return Err(ClientError::MissingUserId);
        }
        Ok(conn)
    }

    fn start(&self, conn: &Connection, op: Operation) -> Result<u8, ClientError> {
        let kind = op.kind();
        let id = operation::spawn(
            op,
            &conn.table,
            conn.outbound.clone(),
            conn.state.clone(),
            self.events.clone(),
        )?;
        tracing::debug!(operation_id = id, ?kind, "operation started");
        Ok(id)
    }

    // ── Events ───────────────────────────────────────────────────────────────

    /// Wait for the next event.
    pub async fn dequeue_event(&self) -> Option<EventCapsule> {
        self.queue.next().await
    }

    pub fn try_dequeue_event(&self) -> Option<EventCapsule> {
        self.queue.try_next()
    }

    pub fn count_pending_events(&self) -> usize {
        self.queue.pending()
    }

    /// Operations still waiting for their terminal event.
    pub fn count_active_operations(&self) -> usize {
        self.connection.as_ref().map_or(0, |c| c.table.len())
    }
}
