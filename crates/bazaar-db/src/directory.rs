//! Read side of the account and listing collaborators.
//!
//! The `users` and `products` tables are written by the surrounding services;
//! the upserts here are how those services (and tests) sync rows in.

use rusqlite::{Connection, OptionalExtension, params};

use crate::error::StoreResult;
use crate::models::{ProductRow, UserRow};
use crate::{Database, now_ms};

#[derive(Debug, Clone)]
pub struct NewUser {
    pub id: String,
    pub email: String,
    pub display_name: String,
}

#[derive(Debug, Clone)]
pub struct NewProduct {
    pub id: String,
    pub owner_id: String,
    pub title: String,
}

impl Database {
    pub fn upsert_user(&self, user: &NewUser) -> StoreResult<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO users (id, email, display_name) VALUES (?1, ?2, ?3)
                 ON CONFLICT(id) DO UPDATE SET email = excluded.email,
                                               display_name = excluded.display_name,
                                               deleted_at = NULL",
                params![user.id, user.email, user.display_name],
            )?;
            Ok(())
        })
    }

    pub fn soft_delete_user(&self, id: &str) -> StoreResult<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE users SET deleted_at = ?2 WHERE id = ?1 AND deleted_at IS NULL",
                params![id, now_ms()],
            )?;
            Ok(changed > 0)
        })
    }

    pub fn upsert_product(&self, product: &NewProduct) -> StoreResult<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO products (id, owner_id, title) VALUES (?1, ?2, ?3)
                 ON CONFLICT(id) DO UPDATE SET owner_id = excluded.owner_id,
                                               title = excluded.title,
                                               deleted_at = NULL",
                params![product.id, product.owner_id, product.title],
            )?;
            Ok(())
        })
    }

    pub fn soft_delete_product(&self, id: &str) -> StoreResult<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE products SET deleted_at = ?2 WHERE id = ?1 AND deleted_at IS NULL",
                params![id, now_ms()],
            )?;
            Ok(changed > 0)
        })
    }

    /// Live (not soft-deleted) user by id.
    pub fn get_active_user(&self, id: &str) -> StoreResult<Option<UserRow>> {
        self.with_conn(|conn| active_user(conn, id))
    }

    pub fn find_active_user_by_email(&self, email: &str) -> StoreResult<Option<UserRow>> {
        self.with_conn(|conn| active_user_by_email(conn, email))
    }
}

pub(crate) fn active_user(conn: &Connection, id: &str) -> StoreResult<Option<UserRow>> {
    let row = conn
        .query_row(
            "SELECT id, email, display_name, deleted_at FROM users
             WHERE id = ?1 AND deleted_at IS NULL",
            [id],
            map_user,
        )
        .optional()?;
    Ok(row)
}

pub(crate) fn active_user_by_email(conn: &Connection, email: &str) -> StoreResult<Option<UserRow>> {
    let row = conn
        .query_row(
            "SELECT id, email, display_name, deleted_at FROM users
             WHERE email = ?1 COLLATE NOCASE AND deleted_at IS NULL",
            [email.trim()],
            map_user,
        )
        .optional()?;
    Ok(row)
}

pub(crate) fn active_product(conn: &Connection, id: &str) -> StoreResult<Option<ProductRow>> {
    let row = conn
        .query_row(
            "SELECT id, owner_id, title, deleted_at FROM products
             WHERE id = ?1 AND deleted_at IS NULL",
            [id],
            |row| {
                Ok(ProductRow {
                    id: row.get(0)?,
                    owner_id: row.get(1)?,
                    title: row.get(2)?,
                    deleted_at: row.get(3)?,
                })
            },
        )
        .optional()?;
    Ok(row)
}

fn map_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        email: row.get(1)?,
        display_name: row.get(2)?,
        deleted_at: row.get(3)?,
    })
}

#[cfg(test)]
mod tests {
    use crate::testing::{open_temp, seed_product, seed_users};

    #[test]
    fn soft_deleted_user_is_invisible() {
        let (_dir, db) = open_temp();
        seed_users(&db, &["alice"]);

        assert!(db.get_active_user("alice").unwrap().is_some());
        assert!(db.soft_delete_user("alice").unwrap());
        assert!(db.get_active_user("alice").unwrap().is_none());
        assert!(db.find_active_user_by_email("alice@campus.edu").unwrap().is_none());
    }

    #[test]
    fn email_lookup_ignores_case() {
        let (_dir, db) = open_temp();
        seed_users(&db, &["bob"]);

        let user = db.find_active_user_by_email(" BOB@Campus.edu ").unwrap().unwrap();
        assert_eq!(user.id, "bob");
    }

    #[test]
    fn deleted_product_is_not_active() {
        let (_dir, db) = open_temp();
        seed_users(&db, &["seller"]);
        seed_product(&db, "p1", "seller");

        let found = db.with_conn(|conn| super::active_product(conn, "p1")).unwrap();
        assert_eq!(found.unwrap().owner_id, "seller");

        db.soft_delete_product("p1").unwrap();
        let gone = db.with_conn(|conn| super::active_product(conn, "p1")).unwrap();
        assert!(gone.is_none());
    }
}
