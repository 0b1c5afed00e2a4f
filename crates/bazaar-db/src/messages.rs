use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::debug;
use uuid::Uuid;

use bazaar_types::models::MessageKind;

use crate::error::{StoreError, StoreResult};
use crate::models::{MessageRow, tag_col, uuid_col};
use crate::{Database, now_ms, require_id};

/// Upper bound on one page of messages.
pub const MAX_FETCH_LIMIT: u32 = 200;
pub const MAX_TEXT_CHARS: usize = 4000;
const PREVIEW_CHARS: usize = 80;

const MESSAGE_COLUMNS: &str = "id, room_id, sender_id, kind, body, file_ref, seq, created_at";

/// Validated content of a message about to be appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageBody {
    kind: MessageKind,
    text: Option<String>,
    file_ref: Option<String>,
}

impl MessageBody {
    pub fn text(text: impl Into<String>) -> Result<Self, StoreError> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(StoreError::validation("text must not be empty"));
        }
        check_length(&text)?;
        Ok(Self {
            kind: MessageKind::Text,
            text: Some(text),
            file_ref: None,
        })
    }

    /// A file reference with an optional caption.
    pub fn file(file_ref: impl Into<String>, caption: Option<String>) -> Result<Self, StoreError> {
        let file_ref = file_ref.into();
        if file_ref.trim().is_empty() {
            return Err(StoreError::validation("file_ref must not be empty"));
        }
        let caption = caption.filter(|c| !c.trim().is_empty());
        if let Some(caption) = &caption {
            check_length(caption)?;
        }
        Ok(Self {
            kind: MessageKind::File,
            text: caption,
            file_ref: Some(file_ref),
        })
    }

    /// Server-originated notice. Never constructed from client input.
    pub(crate) fn system(text: &str) -> Self {
        Self {
            kind: MessageKind::System,
            text: Some(text.to_string()),
            file_ref: None,
        }
    }

    /// Build a body from the fields a client posted.
    pub fn from_client(
        kind: MessageKind,
        text: Option<String>,
        file_ref: Option<String>,
    ) -> Result<Self, StoreError> {
        match kind {
            MessageKind::Text => {
                if file_ref.is_some() {
                    return Err(StoreError::validation("text messages cannot carry file_ref"));
                }
                Self::text(text.unwrap_or_default())
            }
            MessageKind::File => Self::file(file_ref.unwrap_or_default(), text),
            MessageKind::System => Err(StoreError::validation("system messages are server-only")),
        }
    }

    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    /// Short text for room list views.
    fn preview(&self) -> String {
        match (&self.text, self.kind) {
            (Some(text), _) => text.chars().take(PREVIEW_CHARS).collect(),
            (None, MessageKind::File) => "[file]".to_string(),
            (None, _) => String::new(),
        }
    }
}

fn check_length(text: &str) -> Result<(), StoreError> {
    if text.chars().count() > MAX_TEXT_CHARS {
        return Err(StoreError::validation(format!(
            "text exceeds {} characters",
            MAX_TEXT_CHARS
        )));
    }
    Ok(())
}

impl Database {
    /// Persist a message and bump the room's last-activity fields atomically.
    /// Existence and membership are the caller's job; the returned row carries
    /// the assigned sequence and timestamp.
    pub fn append_message(&self, room_id: Uuid, sender_id: &str, body: &MessageBody) -> StoreResult<MessageRow> {
        let sender_id = require_id(sender_id, "sender id")?;
        self.with_tx(|tx| append_in(tx, room_id, sender_id, body))
    }

    /// Page through a room by sequence.
    ///
    /// `since_seq <= 0` returns the newest `limit` messages in chronological
    /// order (initial load). A positive `since_seq` returns up to `limit`
    /// messages strictly after it, ascending (catch-up after reconnect).
    pub fn fetch_since(&self, room_id: Uuid, since_seq: i64, limit: u32) -> StoreResult<Vec<MessageRow>> {
        let limit = limit.clamp(1, MAX_FETCH_LIMIT);
        let room = room_id.to_string();

        self.with_conn(|conn| {
            if since_seq <= 0 {
                let sql = format!(
                    "SELECT {MESSAGE_COLUMNS} FROM messages
                     WHERE room_id = ?1
                     ORDER BY COALESCE(seq, created_at) DESC
                     LIMIT ?2"
                );
                let mut stmt = conn.prepare(&sql)?;
                let mut rows = stmt
                    .query_map(params![room, limit], map_message)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                rows.reverse();
                Ok(rows)
            } else {
                let sql = format!(
                    "SELECT {MESSAGE_COLUMNS} FROM messages
                     WHERE room_id = ?1 AND COALESCE(seq, created_at) > ?2
                     ORDER BY COALESCE(seq, created_at) ASC
                     LIMIT ?3"
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map(params![room, since_seq, limit], map_message)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(rows)
            }
        })
    }
}

/// Append inside an open transaction. The per-room counter is bumped first so
/// two appends can never observe the same sequence. Rooms holding imported
/// rows without a sequence continue above their timestamp-derived order, so a
/// new message never sorts before older history.
pub(crate) fn append_in(
    conn: &Connection,
    room_id: Uuid,
    sender_id: &str,
    body: &MessageBody,
) -> StoreResult<MessageRow> {
    let room = room_id.to_string();
    let seq: i64 = conn
        .query_row(
            "UPDATE rooms
             SET last_seq = MAX(
                     last_seq,
                     COALESCE((SELECT MAX(COALESCE(seq, created_at)) FROM messages WHERE room_id = ?1), 0)
                 ) + 1
             WHERE id = ?1
             RETURNING last_seq",
            [&room],
            |row| row.get(0),
        )
        .optional()?
        .ok_or(StoreError::NotFound("room"))?;

    let id = Uuid::new_v4();
    let created_at = now_ms();

    conn.execute(
        "INSERT INTO messages (id, room_id, sender_id, kind, body, file_ref, seq, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            id.to_string(),
            room,
            sender_id,
            body.kind.as_str(),
            body.text,
            body.file_ref,
            seq,
            created_at
        ],
    )?;

    conn.execute(
        "UPDATE rooms
         SET last_message_id = ?2, last_message_at = ?3, last_sender_id = ?4, last_preview = ?5
         WHERE id = ?1",
        params![room, id.to_string(), created_at, sender_id, body.preview()],
    )?;

    debug!("Appended {} message {} to room {} (seq {})", body.kind, id, room_id, seq);

    Ok(MessageRow {
        id,
        room_id,
        sender_id: sender_id.to_string(),
        kind: body.kind,
        body: body.text.clone(),
        file_ref: body.file_ref.clone(),
        seq: Some(seq),
        created_at,
    })
}

pub(crate) fn message_in_room(conn: &Connection, room_id: Uuid, message_id: Uuid) -> StoreResult<Option<MessageRow>> {
    let sql = format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1 AND room_id = ?2");
    let row = conn
        .query_row(&sql, params![message_id.to_string(), room_id.to_string()], map_message)
        .optional()?;
    Ok(row)
}

pub(crate) fn latest_in_room(conn: &Connection, room_id: Uuid) -> StoreResult<Option<MessageRow>> {
    let sql = format!(
        "SELECT {MESSAGE_COLUMNS} FROM messages WHERE room_id = ?1
         ORDER BY COALESCE(seq, created_at) DESC LIMIT 1"
    );
    let row = conn
        .query_row(&sql, [room_id.to_string()], map_message)
        .optional()?;
    Ok(row)
}

fn map_message(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: uuid_col(row, 0)?,
        room_id: uuid_col(row, 1)?,
        sender_id: row.get(2)?,
        kind: tag_col(row, 3)?,
        body: row.get(4)?,
        file_ref: row.get(5)?,
        seq: row.get(6)?,
        created_at: row.get(7)?,
    })
}
