//! Friend requests and the friendships they produce.
//!
//! ```text
//! PENDING ──accept (recipient)──▶ ACCEPTED
//!    │ ────reject (recipient)──▶ REJECTED
//!    └─────cancel (sender)─────▶ CANCELED
//! ```
//! Every transition starts from PENDING; the other three states are terminal.

use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::{error, info};
use uuid::Uuid;

use bazaar_types::models::{BoxDirection, RequestStatus};

use crate::blocks::blocked_either;
use crate::directory::{active_user, active_user_by_email};
use crate::error::{Conflict, StoreError, StoreResult};
use crate::models::{
    Acceptance, FriendListRow, FriendRequestRow, FriendRow, ProfileRow, RequestBoxRow, tag_col, uuid_col,
};
use crate::pair::canonical_pair;
use crate::rooms::ensure_friend_room_in;
use crate::{Database, now_ms, require_id};

const REQUEST_COLUMNS: &str =
    "fr.id, fr.sender_id, fr.recipient_id, fr.status, fr.version, fr.created_at, fr.decided_at";

/// How the sender addressed the recipient.
#[derive(Debug, Clone, Copy)]
pub enum Recipient<'a> {
    Id(&'a str),
    Email(&'a str),
}

/// Which participant is allowed to make a given decision.
#[derive(Debug, Clone, Copy)]
enum Actor {
    Sender,
    Recipient,
}

impl Actor {
    fn column(self) -> &'static str {
        match self {
            Self::Sender => "sender_id",
            Self::Recipient => "recipient_id",
        }
    }
}

impl Database {
    /// Open a PENDING request from `sender_id`. Re-sending while one is already
    /// pending in the same direction returns the existing row unchanged. A
    /// pending request in the opposite direction is left alone; acceptance
    /// resolves both.
    pub fn send_friend_request(&self, sender_id: &str, recipient: Recipient<'_>) -> StoreResult<FriendRequestRow> {
        let sender_id = require_id(sender_id, "sender id")?;
        if let Recipient::Id(id) = recipient {
            require_id(id, "recipient id")?;
            if id == sender_id {
                return Err(Conflict::SelfTarget.into());
            }
        }

        self.with_tx(|tx| {
            let target = match recipient {
                Recipient::Id(id) => active_user(tx, id)?,
                Recipient::Email(email) => {
                    require_id(email, "recipient email")?;
                    active_user_by_email(tx, email)?
                }
            }
            .ok_or(StoreError::NotFound("recipient"))?;
            let recipient_id = target.id.as_str();

            if recipient_id == sender_id {
                return Err(Conflict::SelfTarget.into());
            }
            if active_user(tx, sender_id)?.is_none() {
                return Err(StoreError::NotFound("user"));
            }
            if blocked_either(tx, sender_id, recipient_id)? {
                return Err(Conflict::Blocked.into());
            }
            if live_friend(tx, sender_id, recipient_id)?.is_some() {
                return Err(Conflict::AlreadyFriends.into());
            }
            if let Some(existing) = pending_between(tx, sender_id, recipient_id)? {
                return Ok(existing);
            }

            let id = Uuid::new_v4();
            tx.execute(
                "INSERT INTO friend_requests (id, sender_id, recipient_id, status, created_at)
                 VALUES (?1, ?2, ?3, 'pending', ?4)
                 ON CONFLICT DO NOTHING",
                params![id.to_string(), sender_id, recipient_id, now_ms()],
            )?;

            let row = pending_between(tx, sender_id, recipient_id)?.ok_or_else(|| {
                error!("Pending request {} -> {} vanished after insert", sender_id, recipient_id);
                StoreError::Invariant(format!("resolve failed for request {} -> {}", sender_id, recipient_id))
            })?;
            info!("Friend request {} sent {} -> {}", row.id, sender_id, recipient_id);
            Ok(row)
        })
    }

    /// Accept a pending request as its recipient. In one transaction: create
    /// the friendship, ensure the FRIEND room, mark this request and any
    /// mirrored pending request ACCEPTED. Any failure leaves everything as it
    /// was.
    pub fn accept_friend_request(&self, recipient_id: &str, request_id: Uuid) -> StoreResult<Acceptance> {
        let recipient_id = require_id(recipient_id, "recipient id")?;

        self.with_tx(|tx| {
            let request = request_by_id(tx, request_id)?.ok_or(StoreError::NotFound("friend request"))?;
            if request.recipient_id != recipient_id {
                return Err(StoreError::Permission("only the recipient can accept"));
            }
            if request.status.is_terminal() {
                return Err(Conflict::NotPending.into());
            }
            let sender_id = request.sender_id.as_str();
            if active_user(tx, sender_id)?.is_none() {
                return Err(StoreError::NotFound("user"));
            }
            if blocked_either(tx, sender_id, recipient_id)? {
                return Err(Conflict::Blocked.into());
            }

            let friend = insert_friend(tx, sender_id, recipient_id)?;
            let (low, high) = canonical_pair(sender_id, recipient_id);
            let (room_id, _) = ensure_friend_room_in(tx, low, high)?;

            let now = now_ms();
            // Version check: fails if anything moved the row since it was read.
            let updated = tx.execute(
                "UPDATE friend_requests
                 SET status = 'accepted', decided_at = ?2, version = version + 1
                 WHERE id = ?1 AND status = 'pending' AND version = ?3",
                params![request_id.to_string(), now, request.version],
            )?;
            if updated == 0 {
                return Err(Conflict::NotPending.into());
            }

            let mirrored = tx.execute(
                "UPDATE friend_requests
                 SET status = 'accepted', decided_at = ?3, version = version + 1
                 WHERE sender_id = ?1 AND recipient_id = ?2 AND status = 'pending'",
                params![recipient_id, sender_id, now],
            )?;

            let request = request_by_id(tx, request_id)?
                .ok_or_else(|| StoreError::Invariant(format!("request {} vanished during accept", request_id)))?;
            info!(
                "Friend request {} accepted ({} mirrored); {} and {} are friends in room {}",
                request_id, mirrored, low, high, room_id
            );
            Ok(Acceptance {
                request,
                friend,
                room_id,
            })
        })
    }

    pub fn reject_friend_request(&self, recipient_id: &str, request_id: Uuid) -> StoreResult<FriendRequestRow> {
        self.decide(recipient_id, request_id, Actor::Recipient, RequestStatus::Rejected)
    }

    pub fn cancel_friend_request(&self, sender_id: &str, request_id: Uuid) -> StoreResult<FriendRequestRow> {
        self.decide(sender_id, request_id, Actor::Sender, RequestStatus::Canceled)
    }

    /// Single conditional update; on a miss, re-read the row to tell the
    /// caller whether it was missing, theirs to decide, or already decided.
    fn decide(
        &self,
        actor_id: &str,
        request_id: Uuid,
        actor: Actor,
        to: RequestStatus,
    ) -> StoreResult<FriendRequestRow> {
        let actor_id = require_id(actor_id, "user id")?;

        self.with_tx(|tx| {
            let sql = format!(
                "UPDATE friend_requests
                 SET status = ?1, decided_at = ?2, version = version + 1
                 WHERE id = ?3 AND {} = ?4 AND status = 'pending'",
                actor.column()
            );
            let changed = tx.execute(&sql, params![to.as_str(), now_ms(), request_id.to_string(), actor_id])?;

            let row = request_by_id(tx, request_id)?.ok_or(StoreError::NotFound("friend request"))?;
            if changed == 1 {
                info!("Friend request {} {} by {}", request_id, to, actor_id);
                return Ok(row);
            }

            let owner = match actor {
                Actor::Sender => &row.sender_id,
                Actor::Recipient => &row.recipient_id,
            };
            if owner != actor_id {
                Err(StoreError::Permission(match actor {
                    Actor::Sender => "only the sender can cancel",
                    Actor::Recipient => "only the recipient can reject",
                }))
            } else {
                Err(Conflict::NotPending.into())
            }
        })
    }

    /// Pending requests addressed to (`Incoming`) or sent by (`Outgoing`)
    /// `user_id`, newest first, with the other party's display identity.
    pub fn list_request_box(&self, user_id: &str, direction: BoxDirection) -> StoreResult<Vec<RequestBoxRow>> {
        let user_id = require_id(user_id, "user id")?;
        let (mine, theirs) = match direction {
            BoxDirection::Incoming => ("recipient_id", "sender_id"),
            BoxDirection::Outgoing => ("sender_id", "recipient_id"),
        };

        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {REQUEST_COLUMNS}, u.display_name, u.email
                 FROM friend_requests fr
                 LEFT JOIN users u ON u.id = fr.{theirs}
                 WHERE fr.{mine} = ?1 AND fr.status = 'pending'
                 ORDER BY fr.created_at DESC, fr.id DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([user_id], |row| {
                    let request = map_request(row)?;
                    let counterpart_id = match direction {
                        BoxDirection::Incoming => request.sender_id.clone(),
                        BoxDirection::Outgoing => request.recipient_id.clone(),
                    };
                    Ok(RequestBoxRow {
                        request,
                        counterpart: ProfileRow {
                            user_id: counterpart_id,
                            display_name: row.get(7)?,
                            email: row.get(8)?,
                        },
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn get_friend_request(&self, request_id: Uuid) -> StoreResult<Option<FriendRequestRow>> {
        self.with_conn(|conn| request_by_id(conn, request_id))
    }

    pub fn are_friends(&self, a: &str, b: &str) -> StoreResult<bool> {
        self.with_conn(|conn| Ok(live_friend(conn, a, b)?.is_some()))
    }

    /// Live friendships of `user_id`, newest first.
    pub fn list_friends(&self, user_id: &str) -> StoreResult<Vec<FriendListRow>> {
        let user_id = require_id(user_id, "user id")?;
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT f.id, f.user_low, f.user_high, f.created_at,
                        CASE WHEN f.user_low = ?1 THEN f.user_high ELSE f.user_low END AS other,
                        u.display_name, u.email
                 FROM friends f
                 LEFT JOIN users u
                        ON u.id = CASE WHEN f.user_low = ?1 THEN f.user_high ELSE f.user_low END
                 WHERE (f.user_low = ?1 OR f.user_high = ?1) AND f.removed_at IS NULL
                 ORDER BY f.created_at DESC, f.id DESC",
            )?;
            let rows = stmt
                .query_map([user_id], |row| {
                    Ok(FriendListRow {
                        friend: map_friend(row)?,
                        profile: ProfileRow {
                            user_id: row.get(4)?,
                            display_name: row.get(5)?,
                            email: row.get(6)?,
                        },
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Soft-remove the friendship between `user_id` and `other_id`. The FRIEND
    /// room and its history stay. Returns whether a live friendship existed.
    pub fn unfriend(&self, user_id: &str, other_id: &str) -> StoreResult<bool> {
        let user_id = require_id(user_id, "user id")?;
        let other_id = require_id(other_id, "friend id")?;
        if user_id == other_id {
            return Err(Conflict::SelfTarget.into());
        }
        self.with_conn_mut(|conn| {
            let removed = remove_friend(conn, user_id, other_id)?;
            if removed {
                info!("{} unfriended {}", user_id, other_id);
            }
            Ok(removed)
        })
    }
}

/// Idempotently create the live friendship for a pair and return it.
fn insert_friend(conn: &Connection, a: &str, b: &str) -> StoreResult<FriendRow> {
    let (low, high) = canonical_pair(a, b);
    conn.execute(
        "INSERT INTO friends (id, user_low, user_high, created_at)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT DO NOTHING",
        params![Uuid::new_v4().to_string(), low, high, now_ms()],
    )?;
    live_friend(conn, low, high)?.ok_or_else(|| {
        error!("Friendship {} / {} vanished after insert", low, high);
        StoreError::Invariant(format!("resolve failed for friendship {} / {}", low, high))
    })
}

pub(crate) fn live_friend(conn: &Connection, a: &str, b: &str) -> StoreResult<Option<FriendRow>> {
    let (low, high) = canonical_pair(a, b);
    let row = conn
        .query_row(
            "SELECT id, user_low, user_high, created_at FROM friends
             WHERE user_low = ?1 AND user_high = ?2 AND removed_at IS NULL",
            params![low, high],
            map_friend,
        )
        .optional()?;
    Ok(row)
}

pub(crate) fn remove_friend(conn: &Connection, a: &str, b: &str) -> StoreResult<bool> {
    let (low, high) = canonical_pair(a, b);
    let changed = conn.execute(
        "UPDATE friends SET removed_at = ?3
         WHERE user_low = ?1 AND user_high = ?2 AND removed_at IS NULL",
        params![low, high, now_ms()],
    )?;
    Ok(changed > 0)
}

/// Close every PENDING request between two users because `blocker` blocked
/// `blocked`: the blocker's own requests become CANCELED, the other party's
/// become REJECTED. Returns the number of rows touched.
pub(crate) fn resolve_pending_for_block(conn: &Connection, blocker: &str, blocked: &str) -> StoreResult<usize> {
    let now = now_ms();
    let canceled = conn.execute(
        "UPDATE friend_requests SET status = 'canceled', decided_at = ?3, version = version + 1
         WHERE sender_id = ?1 AND recipient_id = ?2 AND status = 'pending'",
        params![blocker, blocked, now],
    )?;
    let rejected = conn.execute(
        "UPDATE friend_requests SET status = 'rejected', decided_at = ?3, version = version + 1
         WHERE sender_id = ?1 AND recipient_id = ?2 AND status = 'pending'",
        params![blocked, blocker, now],
    )?;
    Ok(canceled + rejected)
}

fn pending_between(conn: &Connection, sender: &str, recipient: &str) -> StoreResult<Option<FriendRequestRow>> {
    let sql = format!(
        "SELECT {REQUEST_COLUMNS} FROM friend_requests fr
         WHERE fr.sender_id = ?1 AND fr.recipient_id = ?2 AND fr.status = 'pending'"
    );
    let row = conn
        .query_row(&sql, params![sender, recipient], map_request)
        .optional()?;
    Ok(row)
}

fn request_by_id(conn: &Connection, request_id: Uuid) -> StoreResult<Option<FriendRequestRow>> {
    let sql = format!("SELECT {REQUEST_COLUMNS} FROM friend_requests fr WHERE fr.id = ?1");
    let row = conn
        .query_row(&sql, [request_id.to_string()], map_request)
        .optional()?;
    Ok(row)
}

fn map_request(row: &Row<'_>) -> rusqlite::Result<FriendRequestRow> {
    Ok(FriendRequestRow {
        id: uuid_col(row, 0)?,
        sender_id: row.get(1)?,
        recipient_id: row.get(2)?,
        status: tag_col(row, 3)?,
        version: row.get(4)?,
        created_at: row.get(5)?,
        decided_at: row.get(6)?,
    })
}

fn map_friend(row: &Row<'_>) -> rusqlite::Result<FriendRow> {
    Ok(FriendRow {
        id: uuid_col(row, 0)?,
        user_low: row.get(1)?,
        user_high: row.get(2)?,
        created_at: row.get(3)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{open_temp, seed_users};

    fn setup() -> (tempfile::TempDir, Database) {
        let (dir, db) = open_temp();
        seed_users(&db, &["alice", "bob", "carol"]);
        (dir, db)
    }

    #[test]
    fn send_is_idempotent() {
        let (_dir, db) = setup();
        let first = db.send_friend_request("alice", Recipient::Id("bob")).unwrap();
        let second = db.send_friend_request("alice", Recipient::Id("bob")).unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.status, RequestStatus::Pending);

        let pending = db.list_request_box("bob", BoxDirection::Incoming).unwrap();
        assert_eq!(pending.len(), 1);
    }

    #[test]
    fn send_by_email_resolves_recipient() {
        let (_dir, db) = setup();
        let request = db
            .send_friend_request("alice", Recipient::Email("Bob@campus.edu"))
            .unwrap();
        assert_eq!(request.recipient_id, "bob");

        assert!(matches!(
            db.send_friend_request("alice", Recipient::Email("alice@campus.edu")),
            Err(StoreError::Conflict(Conflict::SelfTarget))
        ));
        assert!(matches!(
            db.send_friend_request("alice", Recipient::Email("nobody@campus.edu")),
            Err(StoreError::NotFound("recipient"))
        ));
    }

    #[test]
    fn send_rejects_self_blocked_and_friends() {
        let (_dir, db) = setup();
        assert!(matches!(
            db.send_friend_request("alice", Recipient::Id("alice")),
            Err(StoreError::Conflict(Conflict::SelfTarget))
        ));

        db.block("carol", "alice").unwrap();
        assert!(matches!(
            db.send_friend_request("alice", Recipient::Id("carol")),
            Err(StoreError::Conflict(Conflict::Blocked))
        ));

        let request = db.send_friend_request("alice", Recipient::Id("bob")).unwrap();
        db.accept_friend_request("bob", request.id).unwrap();
        assert!(matches!(
            db.send_friend_request("bob", Recipient::Id("alice")),
            Err(StoreError::Conflict(Conflict::AlreadyFriends))
        ));
    }

    #[test]
    fn reverse_pending_requests_coexist_until_accept() {
        let (_dir, db) = setup();
        let forward = db.send_friend_request("alice", Recipient::Id("bob")).unwrap();
        let reverse = db.send_friend_request("bob", Recipient::Id("alice")).unwrap();
        assert_ne!(forward.id, reverse.id);

        db.accept_friend_request("bob", forward.id).unwrap();
        let reverse = db.get_friend_request(reverse.id).unwrap().unwrap();
        assert_eq!(reverse.status, RequestStatus::Accepted);
        assert!(db.list_request_box("alice", BoxDirection::Incoming).unwrap().is_empty());
    }

    #[test]
    fn accept_creates_friendship_and_room() {
        let (_dir, db) = setup();
        let request = db.send_friend_request("bob", Recipient::Id("alice")).unwrap();

        let acceptance = db.accept_friend_request("alice", request.id).unwrap();
        assert_eq!(acceptance.request.status, RequestStatus::Accepted);
        assert!(acceptance.request.decided_at.is_some());
        assert_eq!(acceptance.friend.user_low, "alice");
        assert_eq!(acceptance.friend.user_high, "bob");
        assert!(db.are_friends("bob", "alice").unwrap());
        assert_eq!(db.ensure_friend_room("bob", "alice").unwrap(), acceptance.room_id);
    }

    #[test]
    fn only_the_right_actor_may_decide() {
        let (_dir, db) = setup();
        let request = db.send_friend_request("alice", Recipient::Id("bob")).unwrap();

        assert!(matches!(
            db.accept_friend_request("alice", request.id),
            Err(StoreError::Permission(_))
        ));
        assert!(matches!(
            db.reject_friend_request("carol", request.id),
            Err(StoreError::Permission(_))
        ));
        assert!(matches!(
            db.cancel_friend_request("bob", request.id),
            Err(StoreError::Permission(_))
        ));
        assert!(matches!(
            db.accept_friend_request("bob", Uuid::new_v4()),
            Err(StoreError::NotFound("friend request"))
        ));

        let still = db.get_friend_request(request.id).unwrap().unwrap();
        assert_eq!(still.status, RequestStatus::Pending);
    }

    #[test]
    fn terminal_states_refuse_further_transitions() {
        let (_dir, db) = setup();
        let accepted = db.send_friend_request("alice", Recipient::Id("bob")).unwrap();
        db.accept_friend_request("bob", accepted.id).unwrap();
        let rejected = db.send_friend_request("carol", Recipient::Id("alice")).unwrap();
        db.reject_friend_request("alice", rejected.id).unwrap();
        let canceled = db.send_friend_request("bob", Recipient::Id("carol")).unwrap();
        db.cancel_friend_request("bob", canceled.id).unwrap();

        let cases = [
            (accepted.id, "alice", "bob", RequestStatus::Accepted),
            (rejected.id, "carol", "alice", RequestStatus::Rejected),
            (canceled.id, "bob", "carol", RequestStatus::Canceled),
        ];
        for (id, sender, recipient, status) in cases {
            for result in [
                db.accept_friend_request(recipient, id).map(|a| a.request),
                db.reject_friend_request(recipient, id),
                db.cancel_friend_request(sender, id),
            ] {
                assert!(matches!(result, Err(StoreError::Conflict(Conflict::NotPending))));
            }
            assert_eq!(db.get_friend_request(id).unwrap().unwrap().status, status);
        }
    }

    #[test]
    fn accept_rolls_back_when_blocked() {
        let (_dir, db) = setup();
        let request = db.send_friend_request("alice", Recipient::Id("bob")).unwrap();
        // Block rows inserted behind the state machine's back.
        db.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO blocks (id, blocker_id, blocked_id, created_at) VALUES (?1, 'bob', 'alice', 0)",
                [Uuid::new_v4().to_string()],
            )?;
            Ok(())
        })
        .unwrap();

        assert!(matches!(
            db.accept_friend_request("bob", request.id),
            Err(StoreError::Conflict(Conflict::Blocked))
        ));
        assert_eq!(
            db.get_friend_request(request.id).unwrap().unwrap().status,
            RequestStatus::Pending
        );
        assert!(!db.are_friends("alice", "bob").unwrap());
    }

    #[test]
    fn accept_from_deleted_sender_is_not_found() {
        let (_dir, db) = setup();
        let request = db.send_friend_request("alice", Recipient::Id("bob")).unwrap();
        assert!(db.soft_delete_user("alice").unwrap());

        assert!(matches!(
            db.accept_friend_request("bob", request.id),
            Err(StoreError::NotFound("user"))
        ));
        assert_eq!(
            db.get_friend_request(request.id).unwrap().unwrap().status,
            RequestStatus::Pending
        );
        assert!(!db.are_friends("alice", "bob").unwrap());
        assert!(db.list_rooms_for("bob").unwrap().is_empty());
    }

    #[test]
    fn concurrent_accepts_produce_one_winner() {
        let (_dir, db) = setup();
        let request = db.send_friend_request("alice", Recipient::Id("bob")).unwrap();

        let results: Vec<_> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..4)
                .map(|_| s.spawn(|| db.accept_friend_request("bob", request.id)))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| matches!(e, StoreError::Conflict(Conflict::NotPending))));
        assert_eq!(db.list_friends("alice").unwrap().len(), 1);
    }

    #[test]
    fn boxes_list_pending_newest_first_with_counterpart() {
        let (_dir, db) = setup();
        let older = db.send_friend_request("alice", Recipient::Id("carol")).unwrap();
        let newer = db.send_friend_request("bob", Recipient::Id("carol")).unwrap();
        db.with_conn_mut(|conn| {
            let stamp = "UPDATE friend_requests SET created_at = ?2 WHERE id = ?1";
            conn.execute(stamp, params![older.id.to_string(), 1_000])?;
            conn.execute(stamp, params![newer.id.to_string(), 2_000])?;
            Ok(())
        })
        .unwrap();
        let canceled = db.send_friend_request("carol", Recipient::Id("alice")).unwrap();
        db.cancel_friend_request("carol", canceled.id).unwrap();

        let incoming = db.list_request_box("carol", BoxDirection::Incoming).unwrap();
        let senders: Vec<_> = incoming.iter().map(|e| e.counterpart.user_id.as_str()).collect();
        assert_eq!(senders, vec!["bob", "alice"]);
        assert_eq!(incoming[0].counterpart.display_name.as_deref(), Some("BOB"));

        let outgoing = db.list_request_box("alice", BoxDirection::Outgoing).unwrap();
        assert_eq!(outgoing.len(), 1);
        assert_eq!(outgoing[0].counterpart.email.as_deref(), Some("carol@campus.edu"));
        assert!(db.list_request_box("carol", BoxDirection::Outgoing).unwrap().is_empty());
    }

    #[test]
    fn unfriend_keeps_room_and_allows_new_request() {
        let (_dir, db) = setup();
        let request = db.send_friend_request("alice", Recipient::Id("bob")).unwrap();
        let acceptance = db.accept_friend_request("bob", request.id).unwrap();

        assert!(db.unfriend("bob", "alice").unwrap());
        assert!(!db.unfriend("bob", "alice").unwrap());
        assert!(db.list_friends("alice").unwrap().is_empty());
        assert!(db.ensure_room_exists(acceptance.room_id).unwrap());

        let again = db.send_friend_request("bob", Recipient::Id("alice")).unwrap();
        let second = db.accept_friend_request("alice", again.id).unwrap();
        assert_ne!(second.friend.id, acceptance.friend.id);
        assert_eq!(second.room_id, acceptance.room_id);
    }
}
