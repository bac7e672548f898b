//! Socket tasks: one reader, one writer per connection.
//!
//! The reader turns bytes into packets for the inbound queue; the writer
//! drains the outbound queue onto the socket. Any socket failure becomes a
//! local `Suspend(SocketClosed)` in the inbound queue. Both stop on the
//! connection's shutdown signal.

use anyhow::{bail, Context, Result};
use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use assetlink_core::wire::{
    ErrorType, Packet, PacketHeader, WireError, HEADER_SIZE, MAX_FRAGMENT_PAYLOAD,
};

use crate::connection::ConnectionState;

/// Read one packet. `Ok(None)` on a clean end of stream before a header.
pub async fn read_packet<R>(reader: &mut R) -> Result<Option<Packet>>
where
    R: AsyncRead + Unpin,
{
    let mut raw = [0u8; HEADER_SIZE];
    let mut filled = 0;
    while filled < HEADER_SIZE {
        let n = reader
            .read(&mut raw[filled..])
            .await
            .context("reading packet header")?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            bail!("stream ended after {filled} of {HEADER_SIZE} header bytes");
        }
        filled += n;
    }

    let header = PacketHeader::decode(&raw)
        .with_context(|| format!("decoding header {}", hex::encode(raw)))?;
    let size = header.payload_size as usize;
    if size > MAX_FRAGMENT_PAYLOAD {
        return Err(WireError::PayloadTooLarge(size)).context("rejecting packet");
    }

    let mut payload = vec![0u8; size];
    reader
        .read_exact(&mut payload)
        .await
        .with_context(|| format!("reading {size} byte payload"))?;
    Ok(Some(Packet::from_parts(header, Bytes::from(payload))?))
}

/// Write one packet and flush.
pub async fn write_packet<W>(writer: &mut W, packet: &Packet) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer
        .write_all(&packet.to_bytes())
        .await
        .context("writing packet")?;
    writer.flush().await.context("flushing socket")?;
    Ok(())
}

/// Start the reader and writer for `stream`.
pub fn spawn<S>(
    stream: S,
    inbound: mpsc::UnboundedSender<Packet>,
    outbound: mpsc::UnboundedReceiver<Packet>,
    state: &ConnectionState,
) -> (JoinHandle<()>, JoinHandle<()>)
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (reader, writer) = tokio::io::split(stream);
    let reader = tokio::spawn(read_loop(
        reader,
        inbound.clone(),
        state.subscribe_shutdown(),
    ));
    let writer = tokio::spawn(write_loop(
        writer,
        outbound,
        inbound,
        state.subscribe_shutdown(),
    ));
    (reader, writer)
}

async fn read_loop<R>(
    mut reader: R,
    inbound: mpsc::UnboundedSender<Packet>,
    mut shutdown: broadcast::Receiver<()>,
) where
    R: AsyncRead + Unpin,
{
    loop {
        let read = tokio::select! {
            _ = shutdown.recv() => {
                tracing::debug!("reader shutting down");
                return;
            }
            read = read_packet(&mut reader) => read,
        };
        match read {
            Ok(Some(packet)) => {
                tracing::trace!(
                    request_type = packet.request_type,
                    operation_id = packet.operation_id,
                    sequence = packet.sequence,
                    bytes = packet.payload.len(),
                    "packet received"
                );
                if inbound.send(packet).is_err() {
                    return;
                }
            }
            Ok(None) => {
                tracing::info!("server closed the connection");
                break;
            }
            Err(e) => {
                tracing::warn!(error = %format!("{e:#}"), "read failed");
                break;
            }
        }
    }
    let _ = inbound.send(Packet::suspend(ErrorType::SocketClosed));
}

async fn write_loop<W>(
    mut writer: W,
    mut outbound: mpsc::UnboundedReceiver<Packet>,
    inbound: mpsc::UnboundedSender<Packet>,
    mut shutdown: broadcast::Receiver<()>,
) where
    W: AsyncWrite + Unpin,
{
    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                tracing::debug!("writer shutting down");
                return;
            }
            next = outbound.recv() => {
                let Some(packet) = next else {
                    return;
                };
                if let Err(e) = write_packet(&mut writer, &packet).await {
                    tracing::warn!(error = %format!("{e:#}"), "write failed");
                    let _ = inbound.send(Packet::suspend(ErrorType::SocketClosed));
                    return;
                }
            }
        }
    }
}
