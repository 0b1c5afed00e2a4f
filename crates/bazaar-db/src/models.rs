//! Database row types. Distinct from the bazaar-types API models to keep the DB
//! layer independent; the `From` impls at the bottom are the only bridge.

use bazaar_types::api::{
    BlockResponse, FriendRequestBoxEntry, FriendRequestResponse, FriendResponse, LastActivity,
    MessageResponse, PartnerProfile, ReadCursorResponse, RoomParticipants, RoomSummary,
};
use bazaar_types::models::{MessageKind, RequestStatus, RoomKind};
use chrono::{DateTime, Utc};
use rusqlite::Row;
use rusqlite::types::Type;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: String,
    pub email: String,
    pub display_name: String,
    pub deleted_at: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct ProductRow {
    pub id: String,
    pub owner_id: String,
    pub title: String,
    pub deleted_at: Option<i64>,
}

/// The two occupants of a room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Members {
    /// Symmetric pair, stored canonically (`low <= high`).
    Friend { low: String, high: String },
    /// Directional: the buyer opened the room on the seller's listing.
    Trade {
        product_id: String,
        buyer: String,
        seller: String,
    },
}

impl Members {
    pub fn kind(&self) -> RoomKind {
        match self {
            Self::Friend { .. } => RoomKind::Friend,
            Self::Trade { .. } => RoomKind::Trade,
        }
    }

    pub fn contains(&self, user_id: &str) -> bool {
        let (a, b) = self.slots();
        a == user_id || b == user_id
    }

    /// The other occupant, or `None` if `user_id` is not in the room.
    pub fn peer_of(&self, user_id: &str) -> Option<&str> {
        let (a, b) = self.slots();
        if a == user_id {
            Some(b)
        } else if b == user_id {
            Some(a)
        } else {
            None
        }
    }

    fn slots(&self) -> (&str, &str) {
        match self {
            Self::Friend { low, high } => (low, high),
            Self::Trade { buyer, seller, .. } => (buyer, seller),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RoomRow {
    pub id: Uuid,
    pub members: Members,
    pub last_seq: i64,
    pub last_activity: Option<LastActivityRow>,
    pub created_at: i64,
}

#[derive(Debug, Clone)]
pub struct LastActivityRow {
    pub message_id: Uuid,
    pub sender_id: String,
    pub preview: String,
    pub at: i64,
}

/// A room as seen from one participant.
#[derive(Debug, Clone)]
pub struct RoomSummaryRow {
    pub room: RoomRow,
    pub partner: ProfileRow,
    pub unread_count: i64,
}

/// Display identity of a counterpart. Name and email are missing when the
/// account row is gone.
#[derive(Debug, Clone)]
pub struct ProfileRow {
    pub user_id: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MessageRow {
    pub id: Uuid,
    pub room_id: Uuid,
    pub sender_id: String,
    pub kind: MessageKind,
    pub body: Option<String>,
    pub file_ref: Option<String>,
    /// `None` on legacy rows written before the per-room counter existed.
    pub seq: Option<i64>,
    pub created_at: i64,
}

impl MessageRow {
    /// Ordering key: the counter value, or for legacy rows the creation time in
    /// milliseconds. The fallback is lossy and never used for new writes.
    pub fn effective_seq(&self) -> i64 {
        self.seq.unwrap_or(self.created_at)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReadCursorRow {
    pub room_id: Uuid,
    pub user_id: String,
    pub message_id: Uuid,
    pub seq: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FriendRequestRow {
    pub id: Uuid,
    pub sender_id: String,
    pub recipient_id: String,
    pub status: RequestStatus,
    pub version: i64,
    pub created_at: i64,
    pub decided_at: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct RequestBoxRow {
    pub request: FriendRequestRow,
    pub counterpart: ProfileRow,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FriendRow {
    pub id: Uuid,
    pub user_low: String,
    pub user_high: String,
    pub created_at: i64,
}

#[derive(Debug, Clone)]
pub struct FriendListRow {
    pub friend: FriendRow,
    pub profile: ProfileRow,
}

/// Everything an accepted friend request produced.
#[derive(Debug, Clone)]
pub struct Acceptance {
    pub request: FriendRequestRow,
    pub friend: FriendRow,
    pub room_id: Uuid,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BlockRow {
    pub id: Uuid,
    pub blocker_id: String,
    pub blocked_id: String,
    pub created_at: i64,
}

// -- Column helpers --

/// Read a TEXT column holding a UUID.
pub(crate) fn uuid_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let text: String = row.get(idx)?;
    Uuid::parse_str(&text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn opt_uuid_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Uuid>> {
    match row.get::<_, Option<String>>(idx)? {
        Some(text) => Uuid::parse_str(&text)
            .map(Some)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))),
        None => Ok(None),
    }
}

/// Read a TEXT column holding one of the bazaar-types tagged enums.
pub(crate) fn tag_col<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr<Err = bazaar_types::models::UnknownVariant>,
{
    let text: String = row.get(idx)?;
    text.parse::<T>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn ms_to_datetime(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

// -- API conversions --

impl From<ProfileRow> for PartnerProfile {
    fn from(row: ProfileRow) -> Self {
        PartnerProfile {
            user_id: row.user_id,
            display_name: row.display_name,
            email: row.email,
        }
    }
}

impl From<Members> for RoomParticipants {
    fn from(members: Members) -> Self {
        match members {
            Members::Friend { low, high } => RoomParticipants::Friend {
                members: [low, high],
            },
            Members::Trade {
                product_id,
                buyer,
                seller,
            } => RoomParticipants::Trade {
                product_id,
                buyer_id: buyer,
                seller_id: seller,
            },
        }
    }
}

impl From<LastActivityRow> for LastActivity {
    fn from(row: LastActivityRow) -> Self {
        LastActivity {
            message_id: row.message_id,
            sender_id: row.sender_id,
            preview: row.preview,
            at: ms_to_datetime(row.at),
        }
    }
}

impl From<RoomSummaryRow> for RoomSummary {
    fn from(row: RoomSummaryRow) -> Self {
        RoomSummary {
            id: row.room.id,
            participants: row.room.members.into(),
            partner: row.partner.into(),
            last_activity: row.room.last_activity.map(Into::into),
            last_seq: row.room.last_seq,
            unread_count: row.unread_count,
            created_at: ms_to_datetime(row.room.created_at),
        }
    }
}

impl From<MessageRow> for MessageResponse {
    fn from(row: MessageRow) -> Self {
        MessageResponse {
            id: row.id,
            room_id: row.room_id,
            seq: row.effective_seq(),
            sender_id: row.sender_id,
            kind: row.kind,
            text: row.body,
            file_ref: row.file_ref,
            created_at: ms_to_datetime(row.created_at),
        }
    }
}

impl From<ReadCursorRow> for ReadCursorResponse {
    fn from(row: ReadCursorRow) -> Self {
        ReadCursorResponse {
            room_id: row.room_id,
            user_id: row.user_id,
            message_id: Some(row.message_id),
            seq: row.seq,
        }
    }
}

impl From<FriendRequestRow> for FriendRequestResponse {
    fn from(row: FriendRequestRow) -> Self {
        FriendRequestResponse {
            id: row.id,
            sender_id: row.sender_id,
            recipient_id: row.recipient_id,
            status: row.status,
            created_at: ms_to_datetime(row.created_at),
            decided_at: row.decided_at.map(ms_to_datetime),
        }
    }
}

impl From<RequestBoxRow> for FriendRequestBoxEntry {
    fn from(row: RequestBoxRow) -> Self {
        FriendRequestBoxEntry {
            request: row.request.into(),
            counterpart: row.counterpart.into(),
        }
    }
}

impl From<FriendListRow> for FriendResponse {
    fn from(row: FriendListRow) -> Self {
        FriendResponse {
            id: row.friend.id,
            friend: row.profile.into(),
            since: ms_to_datetime(row.friend.created_at),
        }
    }
}

impl From<BlockRow> for BlockResponse {
    fn from(row: BlockRow) -> Self {
        BlockResponse {
            id: row.id,
            blocker_id: row.blocker_id,
            blocked_id: row.blocked_id,
            created_at: ms_to_datetime(row.created_at),
        }
    }
}
