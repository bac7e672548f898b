use bytes::Bytes;

use assetlink_core::payload::{self, FileInfoBody};
use assetlink_core::wire::{self, ErrorType, FileType, Packet, PacketType};

use super::OperationContext;
use crate::error::ClientError;
use crate::event::{EventCapsule, NetworkEvent};

/// Upload one user file.
///
/// A `FileInfo` (sequence 0) is followed by `File` fragments numbered from 1;
/// the server answers once with `FileSaveDone` or `Error`. Empty data is
/// sent as a single zero-length fragment.
pub struct FileSave {
    info: Bytes,
    data: Bytes,
}

impl FileSave {
    pub fn new(
        file_name: &str,
        data: impl Into<Bytes>,
        user_id: u32,
    ) -> Result<Self, ClientError> {
        let data = data.into();
        let file_size = u32::try_from(data.len())
            .map_err(|_| ClientError::FileTooLarge(data.len()))?;
        let info = FileInfoBody {
            file_size,
            user_id,
            file_name: file_name.to_string(),
        }
        .encode()?;
        Ok(Self { info, data })
    }

    pub async fn run(self, mut ctx: OperationContext) -> EventCapsule {
        ctx.send(
            Packet::new(PacketType::FileInfo, ctx.id, self.info)
                .with_file_type(FileType::User)
                .with_continuation(true),
        );
        let fragments = wire::file_fragments(ctx.id, FileType::User, &self.data);
        let sent = fragments.len();
        for packet in fragments {
            ctx.send(packet);
        }
        tracing::debug!(
            operation_id = ctx.id,
            bytes = self.data.len(),
            fragments = sent,
            "file sent"
        );

        let error = match ctx.next_packet().await {
            None => ErrorType::SocketClosed,
            Some(reply) => match reply.packet_type() {
                Some(PacketType::FileSaveDone) => ErrorType::Success,
                Some(PacketType::Error) => payload::decode_error(&reply.payload),
                Some(PacketType::Suspend) => ErrorType::SocketClosed,
                _ => {
                    tracing::warn!(
                        operation_id = ctx.id,
                        request_type = reply.request_type,
                        "unexpected reply to file save"
                    );
                    ErrorType::InvalidPacket
                }
            },
        };

        let event = if error == ErrorType::Success {
            tracing::info!(operation_id = ctx.id, bytes = self.data.len(), "file saved");
            NetworkEvent::FileSaveDone
        } else {
            NetworkEvent::FileSaveFailed
        };
        EventCapsule::new(event, error, ctx.user_id(), ctx.id)
    }
}
