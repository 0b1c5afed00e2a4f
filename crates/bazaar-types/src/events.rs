use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::MessageResponse;

/// Close codes sent when a room socket is refused. Private-use range (4000-4999).
pub mod close_code {
    /// `room_id`, `user_id` or `token` missing or malformed
    pub const BAD_QUERY: u16 = 4400;
    /// token invalid, expired, or issued for a different user
    pub const BAD_TOKEN: u16 = 4401;
    /// caller does not occupy either slot of the room
    pub const NOT_MEMBER: u16 = 4403;
    pub const UNKNOWN_ROOM: u16 = 4404;
}

/// Frames pushed from the server to a room socket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Connection admitted. `last_seq` lets the client decide whether it needs
    /// to catch up through the message fetch endpoint first.
    Ready {
        room_id: Uuid,
        user_id: String,
        last_seq: i64,
    },

    /// A message was persisted in the room.
    MessageCreate(MessageResponse),
}

impl GatewayEvent {
    /// Room this frame belongs to.
    pub fn room_id(&self) -> Uuid {
        match self {
            Self::Ready { room_id, .. } => *room_id,
            Self::MessageCreate(message) => message.room_id,
        }
    }
}
