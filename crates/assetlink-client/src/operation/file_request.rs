use bytes::{Bytes, BytesMut};

use assetlink_core::payload::{self, FileInfoBody, FileRequestBody};
use assetlink_core::wire::{ErrorType, FileType, Packet, PacketType, MAX_FRAGMENT_PAYLOAD};

use super::OperationContext;
use crate::error::ClientError;
use crate::event::{EventCapsule, FileTransfer, NetworkEvent};

/// Download one file.
///
/// The server answers with a `FileInfo` packet followed by `File` fragments;
/// the fragment without the continuation flag completes the transfer.
/// `File` fragments are also accepted without a leading `FileInfo`, in which
/// case the capsule carries no name or size.
pub struct FileRequest {
    file_type: FileType,
    request: Bytes,
}

/// Metadata from the leading `FileInfo`, if there was one.
struct Metadata {
    info: FileInfoBody,
    file_type: Option<FileType>,
}

impl FileRequest {
    pub fn new(file_name: &str, file_type: FileType, user_id: u32) -> Result<Self, ClientError> {
        if file_type == FileType::NoFile {
            return Err(ClientError::InvalidFileType(file_type));
        }
        let request = FileRequestBody {
            user_id,
            file_name: file_name.to_string(),
        }
        .encode()?;
        Ok(Self { file_type, request })
    }

    pub async fn run(self, mut ctx: OperationContext) -> EventCapsule {
        ctx.send(
            Packet::new(PacketType::FileRequest, ctx.id, self.request)
                .with_file_type(self.file_type),
        );

        let fail = |ctx: &OperationContext, error: ErrorType| {
            EventCapsule::new(
                NetworkEvent::FileRequestFailed,
                error,
                ctx.user_id(),
                ctx.id,
            )
        };

        let mut metadata: Option<Metadata> = None;
        let mut data = BytesMut::new();
        let mut received_fragments = 0usize;
        let mut first = true;

        loop {
            let Some(packet) = ctx.next_packet().await else {
                return fail(&ctx, ErrorType::SocketClosed);
            };
            let leading = std::mem::replace(&mut first, false);

            match packet.packet_type() {
                Some(PacketType::Suspend) => return fail(&ctx, ErrorType::SocketClosed),
                Some(PacketType::Error) => {
                    let error = payload::decode_error(&packet.payload);
                    tracing::info!(operation_id = ctx.id, ?error, "file request refused");
                    return fail(&ctx, error);
                }
                Some(PacketType::FileInfo) if !packet.continuation => {
                    tracing::warn!(operation_id = ctx.id, "file info ended the transfer");
                    return fail(&ctx, ErrorType::InvalidPacket);
                }
                Some(PacketType::FileInfo) if leading => {
                    match FileInfoBody::decode(&packet.payload) {
                        Ok(info) => {
                            data.reserve((info.file_size as usize).min(MAX_FRAGMENT_PAYLOAD * 8));
                            metadata = Some(Metadata {
                                info,
                                file_type: FileType::try_from(packet.file_type).ok(),
                            });
                        }
                        Err(e) => {
                            tracing::warn!(
                                operation_id = ctx.id,
                                error = %e,
                                "malformed file info"
                            );
                            return fail(&ctx, ErrorType::InvalidPacket);
                        }
                    }
                }
                Some(PacketType::FileInfo) => {
                    tracing::debug!(operation_id = ctx.id, "ignoring repeated file info");
                }
                Some(PacketType::File) => {
                    data.extend_from_slice(&packet.payload);
                    received_fragments += 1;
                    if !packet.continuation {
                        break;
                    }
                }
                _ => {
                    tracing::warn!(
                        operation_id = ctx.id,
                        request_type = packet.request_type,
                        "unexpected packet during file download"
                    );
                    return fail(&ctx, ErrorType::InvalidPacket);
                }
            }
        }

        let data = data.freeze();
        let (file_name, file_size, file_type, user_id) = match metadata {
            Some(m) => {
                if m.info.file_size as usize != data.len() {
                    tracing::debug!(
                        operation_id = ctx.id,
                        declared = m.info.file_size,
                        received = data.len(),
                        "file size differs from file info"
                    );
                }
                (
                    m.info.file_name,
                    m.info.file_size,
                    m.file_type,
                    m.info.user_id,
                )
            }
            None => (String::new(), 0, None, ctx.user_id()),
        };

        tracing::info!(
            operation_id = ctx.id,
            file_name = %file_name,
            bytes = data.len(),
            fragments = received_fragments,
            "file received"
        );

        let done = EventCapsule::new(
            NetworkEvent::FileRequestDone,
            ErrorType::Success,
            user_id,
            ctx.id,
        );
        done.with_file(FileTransfer {
            data,
            file_name,
            file_size,
            file_type,
        })
    }
}
