use assetlink_core::payload;
use assetlink_core::wire::{ErrorType, Packet, PacketType};

use super::OperationContext;
use crate::event::{EventCapsule, NetworkEvent};

/// Ask the server for a user id.
///
/// Replies: `Id` (success, the id is stored on the connection), `Error`,
/// `Suspend`. Anything else is an invalid packet.
///
/// An `Id` reply carrying 0 is not a success: 0 marks a connection with no
/// id, so it fails with `InvalidPacket` and the stored id is left alone.
pub struct IdRequest;

impl IdRequest {
    pub async fn run(self, mut ctx: OperationContext) -> EventCapsule {
        ctx.send(Packet::new(
            PacketType::IdRequest,
            ctx.id,
            payload::encode_id_request(),
        ));

        let error = match ctx.next_packet().await {
            None => ErrorType::SocketClosed,
            Some(reply) => match reply.packet_type() {
                Some(PacketType::Id) => match payload::decode_id(&reply.payload) {
                    // 0 means "unassigned" and cannot be accepted as an id.
                    Ok(0) => {
                        tracing::warn!(operation_id = ctx.id, "server assigned user id 0");
                        ErrorType::InvalidPacket
                    }
                    Ok(user_id) => {
                        ctx.connection.set_user_id(user_id);
                        tracing::info!(user_id, "user id assigned");
                        ErrorType::Success
                    }
                    Err(e) => {
                        tracing::warn!(operation_id = ctx.id, error = %e, "malformed id reply");
                        ErrorType::InvalidPacket
                    }
                },
                Some(PacketType::Error) => payload::decode_error(&reply.payload),
                Some(PacketType::Suspend) => ErrorType::SocketClosed,
                _ => {
                    tracing::warn!(
                        operation_id = ctx.id,
                        request_type = reply.request_type,
                        "unexpected reply to id request"
                    );
                    ErrorType::InvalidPacket
                }
            },
        };

        let event = if error == ErrorType::Success {
            NetworkEvent::IdRequestDone
        } else {
            NetworkEvent::IdRequestFailed
        };
        EventCapsule::new(event, error, ctx.user_id(), ctx.id)
    }
}
