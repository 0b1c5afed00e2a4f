use rusqlite::{Connection, OptionalExtension, params};
use tracing::info;
use uuid::Uuid;

use crate::directory::active_user;
use crate::error::{Conflict, StoreError, StoreResult};
use crate::friends::{remove_friend, resolve_pending_for_block};
use crate::models::{BlockRow, uuid_col};
use crate::{Database, now_ms, require_id};

impl Database {
    /// `blocker_id` blocks `blocked_id`. Atomically ends any live friendship
    /// and closes pending requests between the two. Blocking twice returns
    /// the existing block.
    pub fn block(&self, blocker_id: &str, blocked_id: &str) -> StoreResult<BlockRow> {
        let blocker_id = require_id(blocker_id, "blocker id")?;
        let blocked_id = require_id(blocked_id, "blocked id")?;
        if blocker_id == blocked_id {
            return Err(Conflict::SelfTarget.into());
        }

        self.with_tx(|tx| {
            if active_user(tx, blocked_id)?.is_none() {
                return Err(StoreError::NotFound("user"));
            }

            let unfriended = remove_friend(tx, blocker_id, blocked_id)?;
            let closed = resolve_pending_for_block(tx, blocker_id, blocked_id)?;

            if let Some(existing) = block_row(tx, blocker_id, blocked_id)? {
                return Ok(existing);
            }
            tx.execute(
                "INSERT INTO blocks (id, blocker_id, blocked_id, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![Uuid::new_v4().to_string(), blocker_id, blocked_id, now_ms()],
            )?;
            let row = block_row(tx, blocker_id, blocked_id)?
                .ok_or_else(|| StoreError::Invariant(format!("block {} -> {} vanished", blocker_id, blocked_id)))?;

            info!(
                "{} blocked {} (friendship ended: {}, requests closed: {})",
                blocker_id, blocked_id, unfriended, closed
            );
            Ok(row)
        })
    }

    /// Remove the block if present. Friendship is not restored.
    pub fn unblock(&self, blocker_id: &str, blocked_id: &str) -> StoreResult<bool> {
        let blocker_id = require_id(blocker_id, "blocker id")?;
        let blocked_id = require_id(blocked_id, "blocked id")?;
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "DELETE FROM blocks WHERE blocker_id = ?1 AND blocked_id = ?2",
                params![blocker_id, blocked_id],
            )?;
            if changed > 0 {
                info!("{} unblocked {}", blocker_id, blocked_id);
            }
            Ok(changed > 0)
        })
    }

    pub fn is_blocked_either(&self, a: &str, b: &str) -> StoreResult<bool> {
        self.with_conn(|conn| blocked_either(conn, a, b))
    }

    /// Blocks placed by `blocker_id`, newest first.
    pub fn list_blocks(&self, blocker_id: &str) -> StoreResult<Vec<BlockRow>> {
        let blocker_id = require_id(blocker_id, "blocker id")?;
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, blocker_id, blocked_id, created_at FROM blocks
                 WHERE blocker_id = ?1
                 ORDER BY created_at DESC, id DESC",
            )?;
            let rows = stmt
                .query_map([blocker_id], map_block)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

/// True if either user blocks the other.
pub(crate) fn blocked_either(conn: &Connection, a: &str, b: &str) -> StoreResult<bool> {
    let hit: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM blocks
             WHERE (blocker_id = ?1 AND blocked_id = ?2) OR (blocker_id = ?2 AND blocked_id = ?1)
             LIMIT 1",
            params![a, b],
            |row| row.get(0),
        )
        .optional()?;
    Ok(hit.is_some())
}

fn block_row(conn: &Connection, blocker_id: &str, blocked_id: &str) -> StoreResult<Option<BlockRow>> {
    let row = conn
        .query_row(
            "SELECT id, blocker_id, blocked_id, created_at FROM blocks
             WHERE blocker_id = ?1 AND blocked_id = ?2",
            params![blocker_id, blocked_id],
            map_block,
        )
        .optional()?;
    Ok(row)
}

fn map_block(row: &rusqlite::Row<'_>) -> rusqlite::Result<BlockRow> {
    Ok(BlockRow {
        id: uuid_col(row, 0)?,
        blocker_id: row.get(1)?,
        blocked_id: row.get(2)?,
        created_at: row.get(3)?,
    })
}
