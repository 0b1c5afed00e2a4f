use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (conversation schema)");
        conn.execute_batch(
            "
            BEGIN;

            -- Owned by the account service; read here for existence and display.
            CREATE TABLE users (
                id              TEXT PRIMARY KEY,
                email           TEXT NOT NULL UNIQUE,
                display_name    TEXT NOT NULL,
                deleted_at      INTEGER
            );

            -- Owned by the listing service; only id, owner and soft-delete are consumed.
            CREATE TABLE products (
                id              TEXT PRIMARY KEY,
                owner_id        TEXT NOT NULL,
                title           TEXT NOT NULL,
                deleted_at      INTEGER
            );

            -- member_a/member_b: canonical low/high for friend rooms,
            -- buyer/seller for trade rooms.
            CREATE TABLE rooms (
                id                  TEXT PRIMARY KEY,
                kind                TEXT NOT NULL CHECK (kind IN ('friend', 'trade')),
                product_id          TEXT,
                member_a            TEXT NOT NULL,
                member_b            TEXT NOT NULL,
                last_seq            INTEGER NOT NULL DEFAULT 0,
                last_message_id     TEXT,
                last_message_at     INTEGER,
                last_sender_id      TEXT,
                last_preview        TEXT,
                created_at          INTEGER NOT NULL,
                CHECK (member_a <> member_b),
                CHECK ((kind = 'trade') = (product_id IS NOT NULL))
            );

            CREATE UNIQUE INDEX ux_rooms_friend_pair
                ON rooms(member_a, member_b) WHERE kind = 'friend';
            CREATE UNIQUE INDEX ux_rooms_trade_key
                ON rooms(product_id, member_a, member_b) WHERE kind = 'trade';
            CREATE INDEX idx_rooms_member_b ON rooms(member_b);

            -- seq is NULL only on rows imported from before the counter existed.
            CREATE TABLE messages (
                id              TEXT PRIMARY KEY,
                room_id         TEXT NOT NULL REFERENCES rooms(id) ON DELETE CASCADE,
                sender_id       TEXT NOT NULL,
                kind            TEXT NOT NULL CHECK (kind IN ('text', 'file', 'system')),
                body            TEXT,
                file_ref        TEXT,
                seq             INTEGER,
                created_at      INTEGER NOT NULL
            );

            CREATE UNIQUE INDEX ux_messages_room_seq ON messages(room_id, seq);
            CREATE INDEX idx_messages_room_order
                ON messages(room_id, COALESCE(seq, created_at));

            CREATE TABLE read_cursors (
                room_id         TEXT NOT NULL REFERENCES rooms(id) ON DELETE CASCADE,
                user_id         TEXT NOT NULL,
                message_id      TEXT NOT NULL,
                seq             INTEGER NOT NULL,
                updated_at      INTEGER NOT NULL,
                PRIMARY KEY (room_id, user_id)
            );

            CREATE TABLE friend_requests (
                id              TEXT PRIMARY KEY,
                sender_id       TEXT NOT NULL,
                recipient_id    TEXT NOT NULL,
                status          TEXT NOT NULL DEFAULT 'pending'
                                CHECK (status IN ('pending', 'accepted', 'rejected', 'canceled')),
                version         INTEGER NOT NULL DEFAULT 0,
                created_at      INTEGER NOT NULL,
                decided_at      INTEGER,
                CHECK (sender_id <> recipient_id)
            );

            CREATE UNIQUE INDEX ux_friend_requests_pending
                ON friend_requests(sender_id, recipient_id) WHERE status = 'pending';
            CREATE INDEX idx_friend_requests_recipient
                ON friend_requests(recipient_id, status);

            -- Soft-removed rows keep history; only one live row per pair.
            CREATE TABLE friends (
                id              TEXT PRIMARY KEY,
                user_low        TEXT NOT NULL,
                user_high       TEXT NOT NULL,
                created_at      INTEGER NOT NULL,
                removed_at      INTEGER,
                CHECK (user_low < user_high)
            );

            CREATE UNIQUE INDEX ux_friends_live_pair
                ON friends(user_low, user_high) WHERE removed_at IS NULL;
            CREATE INDEX idx_friends_high ON friends(user_high);

            CREATE TABLE blocks (
                id              TEXT PRIMARY KEY,
                blocker_id      TEXT NOT NULL,
                blocked_id      TEXT NOT NULL,
                created_at      INTEGER NOT NULL,
                UNIQUE (blocker_id, blocked_id),
                CHECK (blocker_id <> blocked_id)
            );

            INSERT INTO schema_version (version) VALUES (1);

            COMMIT;
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
