use rusqlite::{Connection, OptionalExtension, params};
use tracing::debug;
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::messages::{latest_in_room, message_in_room};
use crate::models::{ReadCursorRow, uuid_col};
use crate::{Database, now_ms, require_id};

impl Database {
    /// Advance `user_id`'s read cursor in `room_id`.
    ///
    /// With `target = None` the cursor moves to the room's latest message
    /// (no-op on an empty room). The upsert only replaces the stored cursor
    /// when the candidate's sequence is larger, so a stale client can never
    /// un-read what a newer one already marked. Returns the cursor as stored
    /// after the call.
    pub fn mark_read(
        &self,
        room_id: Uuid,
        user_id: &str,
        target: Option<Uuid>,
    ) -> StoreResult<Option<ReadCursorRow>> {
        let user_id = require_id(user_id, "user id")?;

        self.with_conn_mut(|conn| {
            let candidate = match target {
                Some(message_id) => message_in_room(conn, room_id, message_id)?
                    .ok_or(StoreError::NotFound("message"))?,
                None => match latest_in_room(conn, room_id)? {
                    Some(latest) => latest,
                    None => return cursor_in(conn, room_id, user_id),
                },
            };

            let advanced = conn.execute(
                "INSERT INTO read_cursors (room_id, user_id, message_id, seq, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(room_id, user_id) DO UPDATE
                    SET message_id = excluded.message_id,
                        seq = excluded.seq,
                        updated_at = excluded.updated_at
                  WHERE excluded.seq > read_cursors.seq",
                params![
                    room_id.to_string(),
                    user_id,
                    candidate.id.to_string(),
                    candidate.effective_seq(),
                    now_ms()
                ],
            )?;
            debug!(
                "{} read room {} up to seq {} (advanced: {})",
                user_id,
                room_id,
                candidate.effective_seq(),
                advanced > 0
            );

            cursor_in(conn, room_id, user_id)
        })
    }

    pub fn get_read_cursor(&self, room_id: Uuid, user_id: &str) -> StoreResult<Option<ReadCursorRow>> {
        self.with_conn(|conn| cursor_in(conn, room_id, user_id))
    }
}

fn cursor_in(conn: &Connection, room_id: Uuid, user_id: &str) -> StoreResult<Option<ReadCursorRow>> {
    let row = conn
        .query_row(
            "SELECT room_id, user_id, message_id, seq, updated_at FROM read_cursors
             WHERE room_id = ?1 AND user_id = ?2",
            params![room_id.to_string(), user_id],
            |row| {
                Ok(ReadCursorRow {
                    room_id: uuid_col(row, 0)?,
                    user_id: row.get(1)?,
                    message_id: uuid_col(row, 2)?,
                    seq: row.get(3)?,
                    updated_at: row.get(4)?,
                })
            },
        )
        .optional()?;
    Ok(row)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::MessageBody;
    use crate::models::MessageRow;
    use crate::testing::{open_temp, seed_users};

    fn seeded_room(db: &Database, count: usize) -> (Uuid, Vec<MessageRow>) {
        seed_users(db, &["alice", "bob", "carol"]);
        let room_id = db.ensure_friend_room("alice", "bob").unwrap();
        let messages = (0..count)
            .map(|i| {
                db.append_message(room_id, "bob", &MessageBody::text(format!("m{}", i + 1)).unwrap())
                    .unwrap()
            })
            .collect();
        (room_id, messages)
    }

    #[test]
    fn implicit_target_is_latest_message() {
        let (_dir, db) = open_temp();
        let (room_id, messages) = seeded_room(&db, 4);

        let cursor = db.mark_read(room_id, "alice", None).unwrap().unwrap();
        assert_eq!(cursor.message_id, messages[3].id);
        assert_eq!(cursor.seq, 4);
    }

    #[test]
    fn empty_room_is_a_noop() {
        let (_dir, db) = open_temp();
        let (room_id, _) = seeded_room(&db, 0);

        assert!(db.mark_read(room_id, "alice", None).unwrap().is_none());
        assert!(db.get_read_cursor(room_id, "alice").unwrap().is_none());
    }

    #[test]
    fn cursor_never_moves_backward() {
        let (_dir, db) = open_temp();
        let (room_id, messages) = seeded_room(&db, 9);

        db.mark_read(room_id, "alice", Some(messages[8].id)).unwrap();
        let cursor = db.mark_read(room_id, "alice", Some(messages[4].id)).unwrap().unwrap();
        assert_eq!(cursor.seq, 9);
        assert_eq!(cursor.message_id, messages[8].id);
    }

    #[test]
    fn concurrent_marks_keep_the_maximum() {
        for _ in 0..10 {
            let (_dir, db) = open_temp();
            let (room_id, messages) = seeded_room(&db, 9);
            let (five, nine) = (messages[4].id, messages[8].id);

            std::thread::scope(|s| {
                s.spawn(|| db.mark_read(room_id, "alice", Some(five)).unwrap());
                s.spawn(|| db.mark_read(room_id, "alice", Some(nine)).unwrap());
            });

            let cursor = db.get_read_cursor(room_id, "alice").unwrap().unwrap();
            assert_eq!(cursor.seq, 9);
        }
    }

    #[test]
    fn target_must_belong_to_the_room() {
        let (_dir, db) = open_temp();
        let (room_id, _) = seeded_room(&db, 1);
        let other_room = db.ensure_friend_room("alice", "carol").unwrap();
        let foreign = db
            .append_message(other_room, "carol", &MessageBody::text("elsewhere").unwrap())
            .unwrap();

        assert!(matches!(
            db.mark_read(room_id, "alice", Some(foreign.id)),
            Err(StoreError::NotFound("message"))
        ));
        assert!(db.get_read_cursor(room_id, "alice").unwrap().is_none());
    }

    #[test]
    fn cursors_are_per_user() {
        let (_dir, db) = open_temp();
        let (room_id, messages) = seeded_room(&db, 3);

        db.mark_read(room_id, "alice", Some(messages[2].id)).unwrap();
        db.mark_read(room_id, "bob", Some(messages[0].id)).unwrap();

        assert_eq!(db.get_read_cursor(room_id, "alice").unwrap().unwrap().seq, 3);
        assert_eq!(db.get_read_cursor(room_id, "bob").unwrap().unwrap().seq, 1);
    }
}
