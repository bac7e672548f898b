//! AssetLink integration test harness.
//!
//! Every test runs an `OperationManager` against a server on a loopback
//! TCP port. Either the test drives the server side packet by packet, or
//! it starts the in-memory `AssetServer` from `infra.rs`.
//!
//!   cargo test --test integration

mod teardown;
mod transfers;

use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio::net::{TcpListener, TcpStream};

use assetlink_client::communicator::{read_packet, write_packet};
use assetlink_client::{EventCapsule, NetworkEvent, OperationManager};
use assetlink_core::config::ClientConfig;
use assetlink_core::Packet;

// ── Harness ───────────────────────────────────────────────────────────────────

/// Upper bound on any single wait in these tests.
pub const STEP_TIMEOUT: Duration = Duration::from_secs(5);

/// Bind a listener on an ephemeral loopback port.
pub async fn listen() -> Result<(TcpListener, u16)> {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .context("failed to bind loopback listener")?;
    let port = listener.local_addr()?.port();
    Ok((listener, port))
}

/// Accept the manager's connection.
pub async fn accept(listener: &TcpListener) -> Result<TcpStream> {
    let (stream, _) = tokio::time::timeout(STEP_TIMEOUT, listener.accept())
        .await
        .context("timed out waiting for the client to connect")??;
    Ok(stream)
}

/// Next packet the client sent.
pub async fn recv(stream: &mut TcpStream) -> Result<Packet> {
    match tokio::time::timeout(STEP_TIMEOUT, read_packet(stream))
        .await
        .context("timed out waiting for a client packet")??
    {
        Some(packet) => Ok(packet),
        None => bail!("client closed the connection"),
    }
}

pub async fn send(stream: &mut TcpStream, packet: &Packet) -> Result<()> {
    write_packet(stream, packet).await
}

/// Next event from the manager.
pub async fn next_event(manager: &OperationManager) -> Result<EventCapsule> {
    tokio::time::timeout(STEP_TIMEOUT, manager.dequeue_event())
        .await
        .context("timed out waiting for an event")?
        .context("event queue closed")
}

/// Skip events until one of `kind` arrives.
pub async fn event_of(manager: &OperationManager, kind: NetworkEvent) -> Result<EventCapsule> {
    loop {
        let capsule = next_event(manager).await?;
        if capsule.event == kind {
            return Ok(capsule);
        }
    }
}

/// Defaults with the watchdog pushed out of the way.
pub fn quiet_config() -> ClientConfig {
    let mut config = ClientConfig::default();
    config.watchdog.grace_ms = 60_000;
    config.watchdog.recheck_ms = 60_000;
    config
}

/// Connect a fresh manager to `port` on loopback and consume `Connected`.
pub async fn connect(config: ClientConfig, port: u16, user_id: u32) -> Result<OperationManager> {
    let mut manager = OperationManager::new(config);
    manager.connect("127.0.0.1", port, user_id).await?;
    let first = next_event(&manager).await?;
    if first.event != NetworkEvent::Connected {
        bail!("expected Connected first, got {:?}", first.event);
    }
    Ok(manager)
}
