use chrono::{DateTime, Utc};
use jsonwebtoken::{DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{MessageKind, RequestStatus};

// -- JWT Claims --

/// Claims minted by the campus auth service. `sub` is the opaque user id every
/// conversation operation is scoped to. The REST middleware and the socket
/// upgrade both decode through [`Claims::decode`]; nothing here issues tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
}

impl Claims {
    /// Verify an HS256 token against the shared secret. `None` on any failure.
    pub fn decode(token: &str, secret: &str) -> Option<Self> {
        decode::<Claims>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &Validation::default(),
        )
        .ok()
        .map(|data| data.claims)
        .filter(|claims| !claims.sub.is_empty())
    }
}

// -- Rooms --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnsureFriendRoomRequest {
    pub peer_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnsureTradeRoomRequest {
    pub product_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomIdResponse {
    pub room_id: Uuid,
}

/// Who sits in a room. FRIEND rooms hold an unordered pair (stored low/high);
/// TRADE rooms keep the directional buyer/seller roles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum RoomParticipants {
    Friend {
        members: [String; 2],
    },
    Trade {
        product_id: String,
        buyer_id: String,
        seller_id: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartnerProfile {
    pub user_id: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LastActivity {
    pub message_id: Uuid,
    pub sender_id: String,
    pub preview: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomSummary {
    pub id: Uuid,
    #[serde(flatten)]
    pub participants: RoomParticipants,
    pub partner: PartnerProfile,
    pub last_activity: Option<LastActivity>,
    pub last_seq: i64,
    pub unread_count: i64,
    pub created_at: DateTime<Utc>,
}

// -- Messages --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    #[serde(default = "default_message_kind")]
    pub kind: MessageKind,
    pub text: Option<String>,
    pub file_ref: Option<String>,
}

fn default_message_kind() -> MessageKind {
    MessageKind::Text
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageResponse {
    pub id: Uuid,
    pub room_id: Uuid,
    pub seq: i64,
    pub sender_id: String,
    pub kind: MessageKind,
    pub text: Option<String>,
    pub file_ref: Option<String>,
    pub created_at: DateTime<Utc>,
}

// -- Read cursors --

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MarkReadRequest {
    #[serde(default)]
    pub message_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadCursorResponse {
    pub room_id: Uuid,
    pub user_id: String,
    /// `None` when the room has no messages and nothing was ever read.
    pub message_id: Option<Uuid>,
    pub seq: i64,
}

// -- Friend requests --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendFriendRequest {
    pub recipient_id: Option<String>,
    pub recipient_email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FriendRequestResponse {
    pub id: Uuid,
    pub sender_id: String,
    pub recipient_id: String,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FriendRequestBoxEntry {
    #[serde(flatten)]
    pub request: FriendRequestResponse,
    pub counterpart: PartnerProfile,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcceptFriendResponse {
    pub request: FriendRequestResponse,
    pub friend_id: Uuid,
    pub room_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FriendResponse {
    pub id: Uuid,
    pub friend: PartnerProfile,
    pub since: DateTime<Utc>,
}

// -- Blocks --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BlockRequest {
    pub user_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockResponse {
    pub id: Uuid,
    pub blocker_id: String,
    pub blocked_id: String,
    pub created_at: DateTime<Utc>,
}
