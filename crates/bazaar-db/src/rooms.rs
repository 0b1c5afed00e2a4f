use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::{debug, error, info};
use uuid::Uuid;

use bazaar_types::models::RoomKind;

use crate::blocks::blocked_either;
use crate::directory::{active_product, active_user};
use crate::error::{Conflict, StoreError, StoreResult};
use crate::messages::{MessageBody, append_in};
use crate::models::{LastActivityRow, Members, ProfileRow, RoomRow, RoomSummaryRow, opt_uuid_col, tag_col, uuid_col};
use crate::pair::canonical_pair;
use crate::{Database, now_ms, require_id};

const ROOM_COLUMNS: &str = "r.id, r.kind, r.product_id, r.member_a, r.member_b, r.last_seq,
     r.last_message_id, r.last_message_at, r.last_sender_id, r.last_preview, r.created_at";

/// Notice appended when a buyer opens a new trade room.
pub const TRADE_OPENED_NOTICE: &str = "trade room opened";

/// Sender id stamped on server-originated notices. Notices never count as
/// unread for either member.
pub const SYSTEM_SENDER: &str = "system";

impl Database {
    /// Resolve the single FRIEND room for `{me, peer}`, creating it on first
    /// use. Either participant gets the same id back, including when both
    /// race to create it.
    pub fn ensure_friend_room(&self, me: &str, peer: &str) -> StoreResult<Uuid> {
        let me = require_id(me, "user id")?;
        let peer = require_id(peer, "peer id")?;
        if me == peer {
            return Err(Conflict::SelfTarget.into());
        }

        self.with_tx(|tx| {
            if active_user(tx, me)?.is_none() {
                return Err(StoreError::NotFound("user"));
            }
            if active_user(tx, peer)?.is_none() {
                return Err(StoreError::NotFound("peer"));
            }
            if blocked_either(tx, me, peer)? {
                return Err(Conflict::Blocked.into());
            }

            let (low, high) = canonical_pair(me, peer);
            let (room_id, created) = ensure_friend_room_in(tx, low, high)?;
            if created {
                info!("Friend room {} created for {} / {}", room_id, low, high);
            }
            Ok(room_id)
        })
    }

    /// Resolve the TRADE room between `requester` (buyer) and the owner of
    /// `product_id`. Not canonicalized: the buyer always sits in the first slot.
    pub fn ensure_trade_room(&self, requester: &str, product_id: &str) -> StoreResult<Uuid> {
        let requester = require_id(requester, "user id")?;
        let product_id = require_id(product_id, "product id")?;

        self.with_tx(|tx| {
            let product = active_product(tx, product_id)?.ok_or(StoreError::NotFound("product"))?;
            let owner = product.owner_id;
            if owner.trim().is_empty() || active_user(tx, &owner)?.is_none() {
                return Err(StoreError::NotFound("product owner"));
            }
            if owner == requester {
                return Err(Conflict::SelfTarget.into());
            }
            if active_user(tx, requester)?.is_none() {
                return Err(StoreError::NotFound("user"));
            }
            if blocked_either(tx, requester, &owner)? {
                return Err(Conflict::Blocked.into());
            }

            let (room_id, created) = ensure_trade_room_in(tx, product_id, requester, &owner)?;
            if created {
                append_in(tx, room_id, SYSTEM_SENDER, &MessageBody::system(TRADE_OPENED_NOTICE))?;
                info!(
                    "Trade room {} created on product {} ({} -> {})",
                    room_id, product_id, requester, owner
                );
            }
            Ok(room_id)
        })
    }

    /// Every room `user_id` sits in, most recent activity first, with the
    /// partner's display identity and the number of unread partner messages.
    pub fn list_rooms_for(&self, user_id: &str) -> StoreResult<Vec<RoomSummaryRow>> {
        let user_id = require_id(user_id, "user id")?;
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {ROOM_COLUMNS},
                        p.display_name, p.email,
                        CASE WHEN r.member_a = ?1 THEN r.member_b ELSE r.member_a END AS partner_id,
                        (SELECT COUNT(*) FROM messages m
                          WHERE m.room_id = r.id
                            AND m.sender_id <> ?1
                            AND m.kind <> 'system'
                            AND COALESCE(m.seq, m.created_at) > COALESCE(c.seq, 0)) AS unread
                 FROM rooms r
                 LEFT JOIN read_cursors c ON c.room_id = r.id AND c.user_id = ?1
                 LEFT JOIN users p
                        ON p.id = CASE WHEN r.member_a = ?1 THEN r.member_b ELSE r.member_a END
                 WHERE r.member_a = ?1 OR r.member_b = ?1
                 ORDER BY COALESCE(r.last_message_at, r.created_at) DESC, r.id DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([user_id], |row| {
                    Ok(RoomSummaryRow {
                        room: map_room(row)?,
                        partner: ProfileRow {
                            user_id: row.get(13)?,
                            display_name: row.get(11)?,
                            email: row.get(12)?,
                        },
                        unread_count: row.get(14)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn get_room(&self, room_id: Uuid) -> StoreResult<Option<RoomRow>> {
        self.with_conn(|conn| room_by_id(conn, room_id))
    }

    /// Existence check; "not found" is `Ok(false)`, never an error.
    pub fn ensure_room_exists(&self, room_id: Uuid) -> StoreResult<bool> {
        Ok(self.get_room(room_id)?.is_some())
    }

    /// True when the room exists and `user_id` occupies either slot.
    pub fn ensure_membership(&self, room_id: Uuid, user_id: &str) -> StoreResult<bool> {
        Ok(self
            .get_room(room_id)?
            .is_some_and(|room| room.members.contains(user_id)))
    }

    /// Delete a room on behalf of one of its members, purging its messages and
    /// read cursors in the same transaction.
    pub fn leave_room(&self, room_id: Uuid, user_id: &str) -> StoreResult<()> {
        let user_id = require_id(user_id, "user id")?;
        self.with_tx(|tx| {
            let room = room_by_id(tx, room_id)?.ok_or(StoreError::NotFound("room"))?;
            if !room.members.contains(user_id) {
                return Err(StoreError::Permission("not a member of this room"));
            }

            let id = room_id.to_string();
            tx.execute("DELETE FROM read_cursors WHERE room_id = ?1", [&id])?;
            let purged = tx.execute("DELETE FROM messages WHERE room_id = ?1", [&id])?;
            tx.execute("DELETE FROM rooms WHERE id = ?1", [&id])?;

            info!("{} left room {} ({} messages purged)", user_id, room_id, purged);
            Ok(())
        })
    }
}

/// Insert-or-ignore the FRIEND room for a canonical pair, then read back the
/// surviving row. Returns `(room_id, created)`.
pub(crate) fn ensure_friend_room_in(conn: &Connection, low: &str, high: &str) -> StoreResult<(Uuid, bool)> {
    debug_assert!(low <= high, "friend room pair must be canonical");

    let candidate = Uuid::new_v4();
    let inserted = conn.execute(
        "INSERT INTO rooms (id, kind, member_a, member_b, created_at)
         VALUES (?1, 'friend', ?2, ?3, ?4)
         ON CONFLICT DO NOTHING",
        params![candidate.to_string(), low, high, now_ms()],
    )?;

    let resolved = conn
        .query_row(
            "SELECT id FROM rooms WHERE kind = 'friend' AND member_a = ?1 AND member_b = ?2",
            params![low, high],
            |row| uuid_col(row, 0),
        )
        .optional()?;

    resolve_or_fail(resolved, inserted, || format!("friend room {} / {}", low, high))
}

fn ensure_trade_room_in(
    conn: &Connection,
    product_id: &str,
    buyer: &str,
    seller: &str,
) -> StoreResult<(Uuid, bool)> {
    let candidate = Uuid::new_v4();
    let inserted = conn.execute(
        "INSERT INTO rooms (id, kind, product_id, member_a, member_b, created_at)
         VALUES (?1, 'trade', ?2, ?3, ?4, ?5)
         ON CONFLICT DO NOTHING",
        params![candidate.to_string(), product_id, buyer, seller, now_ms()],
    )?;

    let resolved = conn
        .query_row(
            "SELECT id FROM rooms
             WHERE kind = 'trade' AND product_id = ?1 AND member_a = ?2 AND member_b = ?3",
            params![product_id, buyer, seller],
            |row| uuid_col(row, 0),
        )
        .optional()?;

    resolve_or_fail(resolved, inserted, || {
        format!("trade room {} ({} -> {})", product_id, buyer, seller)
    })
}

/// An empty read-back after an insert-or-ignore means the uniqueness key and
/// the resolve query have drifted apart.
fn resolve_or_fail(
    resolved: Option<Uuid>,
    inserted: usize,
    describe: impl FnOnce() -> String,
) -> StoreResult<(Uuid, bool)> {
    match resolved {
        Some(id) => {
            debug!("Resolved room {} (inserted: {})", id, inserted == 1);
            Ok((id, inserted == 1))
        }
        None => {
            let what = describe();
            error!("Room resolve failed after insert-or-ignore: {}", what);
            Err(StoreError::Invariant(format!("resolve failed for {}", what)))
        }
    }
}

pub(crate) fn room_by_id(conn: &Connection, room_id: Uuid) -> StoreResult<Option<RoomRow>> {
    let sql = format!("SELECT {ROOM_COLUMNS} FROM rooms r WHERE r.id = ?1");
    let row = conn
        .query_row(&sql, [room_id.to_string()], map_room)
        .optional()?;
    Ok(row)
}

/// Maps the leading [`ROOM_COLUMNS`] of a row.
fn map_room(row: &Row<'_>) -> rusqlite::Result<RoomRow> {
    let kind: RoomKind = tag_col(row, 1)?;
    let member_a: String = row.get(3)?;
    let member_b: String = row.get(4)?;
    let members = match kind {
        RoomKind::Friend => Members::Friend {
            low: member_a,
            high: member_b,
        },
        RoomKind::Trade => Members::Trade {
            product_id: row
                .get::<_, Option<String>>(2)?
                .ok_or_else(|| rusqlite::Error::InvalidColumnType(2, "product_id".into(), Type::Null))?,
            buyer: member_a,
            seller: member_b,
        },
    };

    let last_message_id = opt_uuid_col(row, 6)?;
    let last_message_at: Option<i64> = row.get(7)?;
    let last_sender_id: Option<String> = row.get(8)?;
    let last_preview: Option<String> = row.get(9)?;
    let last_activity = match (last_message_id, last_message_at, last_sender_id) {
        (Some(message_id), Some(at), Some(sender_id)) => Some(LastActivityRow {
            message_id,
            sender_id,
            preview: last_preview.unwrap_or_default(),
            at,
        }),
        _ => None,
    };

    Ok(RoomRow {
        id: uuid_col(row, 0)?,
        members,
        last_seq: row.get(5)?,
        last_activity,
        created_at: row.get(10)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{open_temp, seed_product, seed_users};
    use bazaar_types::models::MessageKind;

    #[test]
    fn friend_room_is_symmetric_and_idempotent() {
        let (_dir, db) = open_temp();
        seed_users(&db, &["alice", "bob"]);

        let first = db.ensure_friend_room("alice", "bob").unwrap();
        let second = db.ensure_friend_room("bob", "alice").unwrap();
        let third = db.ensure_friend_room("alice", "bob").unwrap();
        assert_eq!(first, second);
        assert_eq!(first, third);

        let room = db.get_room(first).unwrap().unwrap();
        assert_eq!(
            room.members,
            Members::Friend {
                low: "alice".into(),
                high: "bob".into()
            }
        );
    }

    #[test]
    fn concurrent_friend_room_creation_converges() {
        let (_dir, db) = open_temp();
        seed_users(&db, &["carol", "dave"]);

        let ids: Vec<Uuid> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|i| {
                    let db = &db;
                    s.spawn(move || {
                        if i % 2 == 0 {
                            db.ensure_friend_room("carol", "dave").unwrap()
                        } else {
                            db.ensure_friend_room("dave", "carol").unwrap()
                        }
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert!(ids.windows(2).all(|w| w[0] == w[1]));
        let count: i64 = db
            .with_conn(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM rooms", [], |r| r.get(0))?))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn friend_room_rejects_self_unknown_and_blocked() {
        let (_dir, db) = open_temp();
        seed_users(&db, &["alice", "bob"]);

        assert!(matches!(
            db.ensure_friend_room("alice", "alice"),
            Err(StoreError::Conflict(Conflict::SelfTarget))
        ));
        assert!(matches!(
            db.ensure_friend_room("alice", "ghost"),
            Err(StoreError::NotFound("peer"))
        ));
        assert!(matches!(
            db.ensure_friend_room("alice", " "),
            Err(StoreError::Validation(_))
        ));

        db.block("bob", "alice").unwrap();
        assert!(matches!(
            db.ensure_friend_room("alice", "bob"),
            Err(StoreError::Conflict(Conflict::Blocked))
        ));
    }

    #[test]
    fn trade_room_is_directional_and_opens_with_notice() {
        let (_dir, db) = open_temp();
        seed_users(&db, &["buyer", "seller", "other"]);
        seed_product(&db, "p1", "seller");

        let room_id = db.ensure_trade_room("buyer", "p1").unwrap();
        assert_eq!(db.ensure_trade_room("buyer", "p1").unwrap(), room_id);
        assert_ne!(db.ensure_trade_room("other", "p1").unwrap(), room_id);

        let room = db.get_room(room_id).unwrap().unwrap();
        assert_eq!(
            room.members,
            Members::Trade {
                product_id: "p1".into(),
                buyer: "buyer".into(),
                seller: "seller".into()
            }
        );

        // The notice is written once, on creation only.
        let messages = db.fetch_since(room_id, 0, 50).unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].kind, MessageKind::System);
        assert_eq!(messages[0].body.as_deref(), Some(TRADE_OPENED_NOTICE));
        assert_eq!(messages[0].sender_id, SYSTEM_SENDER);

        let activity = room.last_activity.unwrap();
        assert_eq!(activity.sender_id, SYSTEM_SENDER);
        for member in ["buyer", "seller"] {
            assert_eq!(db.list_rooms_for(member).unwrap()[0].unread_count, 0);
        }
    }

    #[test]
    fn trade_room_rejects_bad_products() {
        let (_dir, db) = open_temp();
        seed_users(&db, &["buyer", "seller"]);
        seed_product(&db, "p1", "seller");
        seed_product(&db, "orphan", "nobody");

        assert!(matches!(
            db.ensure_trade_room("buyer", "missing"),
            Err(StoreError::NotFound("product"))
        ));
        assert!(matches!(
            db.ensure_trade_room("buyer", "orphan"),
            Err(StoreError::NotFound("product owner"))
        ));
        assert!(matches!(
            db.ensure_trade_room("seller", "p1"),
            Err(StoreError::Conflict(Conflict::SelfTarget))
        ));

        db.soft_delete_product("p1").unwrap();
        assert!(matches!(
            db.ensure_trade_room("buyer", "p1"),
            Err(StoreError::NotFound("product"))
        ));
    }

    #[test]
    fn membership_checks_never_error_on_missing_rooms() {
        let (_dir, db) = open_temp();
        seed_users(&db, &["alice", "bob", "eve"]);
        let room_id = db.ensure_friend_room("alice", "bob").unwrap();

        assert!(db.ensure_room_exists(room_id).unwrap());
        assert!(!db.ensure_room_exists(Uuid::new_v4()).unwrap());
        assert!(db.ensure_membership(room_id, "bob").unwrap());
        assert!(!db.ensure_membership(room_id, "eve").unwrap());
        assert!(!db.ensure_membership(Uuid::new_v4(), "bob").unwrap());
    }

    #[test]
    fn listing_orders_by_activity_and_counts_unread() {
        let (_dir, db) = open_temp();
        seed_users(&db, &["alice", "bob", "carol"]);
        let with_bob = db.ensure_friend_room("alice", "bob").unwrap();
        let with_carol = db.ensure_friend_room("carol", "alice").unwrap();

        db.append_message(with_bob, "bob", &MessageBody::text("one").unwrap()).unwrap();
        db.append_message(with_bob, "bob", &MessageBody::text("two").unwrap()).unwrap();
        db.append_message(with_bob, "alice", &MessageBody::text("mine").unwrap()).unwrap();
        db.append_message(with_carol, "carol", &MessageBody::text("latest").unwrap()).unwrap();
        db.with_conn_mut(|conn| {
            let stamp = "UPDATE rooms SET last_message_at = ?2 WHERE id = ?1";
            conn.execute(stamp, params![with_bob.to_string(), 1_000])?;
            conn.execute(stamp, params![with_carol.to_string(), 2_000])?;
            Ok(())
        })
        .unwrap();

        let rooms = db.list_rooms_for("alice").unwrap();
        assert_eq!(rooms.len(), 2);
        assert_eq!(rooms[0].room.id, with_carol);
        assert_eq!(rooms[0].partner.user_id, "carol");
        assert_eq!(rooms[0].partner.display_name.as_deref(), Some("CAROL"));
        assert_eq!(rooms[0].unread_count, 1);

        assert_eq!(rooms[1].room.id, with_bob);
        assert_eq!(rooms[1].unread_count, 2);
        let activity = rooms[1].room.last_activity.as_ref().unwrap();
        assert_eq!(activity.sender_id, "alice");
        assert_eq!(activity.preview, "mine");

        db.mark_read(with_bob, "alice", None).unwrap();
        let rooms = db.list_rooms_for("alice").unwrap();
        assert_eq!(rooms[1].unread_count, 0);
    }

    #[test]
    fn leave_purges_room_messages_and_cursors() {
        let (_dir, db) = open_temp();
        seed_users(&db, &["alice", "bob", "eve"]);
        let room_id = db.ensure_friend_room("alice", "bob").unwrap();
        db.append_message(room_id, "bob", &MessageBody::text("hi").unwrap()).unwrap();
        db.mark_read(room_id, "alice", None).unwrap();

        assert!(matches!(
            db.leave_room(room_id, "eve"),
            Err(StoreError::Permission(_))
        ));
        db.leave_room(room_id, "alice").unwrap();

        assert!(!db.ensure_room_exists(room_id).unwrap());
        let leftovers: i64 = db
            .with_conn(|conn| {
                Ok(conn.query_row(
                    "SELECT (SELECT COUNT(*) FROM messages) + (SELECT COUNT(*) FROM read_cursors)",
                    [],
                    |r| r.get(0),
                )?)
            })
            .unwrap();
        assert_eq!(leftovers, 0);
        assert!(matches!(
            db.leave_room(room_id, "alice"),
            Err(StoreError::NotFound("room"))
        ));

        // Ensuring again starts a fresh room.
        assert_ne!(db.ensure_friend_room("bob", "alice").unwrap(), room_id);
    }
}
