use rusqlite::{Connection, OptionalExtension};
use tracing::debug;

use crate::error::{CoreError, CoreResult, is_unique_violation};
use crate::models::{UserRow, UserSummaryRow};
use crate::{Database, SYSTEM_USER_ID};

impl Database {
    pub fn create_user(&self, id: &str, username: &str, password_hash: &str) -> CoreResult<()> {
        self.with_conn_mut(|conn| {
            let inserted = conn.execute(
                "INSERT INTO users (id, username, password) VALUES (?1, ?2, ?3)",
                (id, username, password_hash),
            );
            match inserted {
                Ok(_) => {
                    debug!("Created user {} ({})", username, id);
                    Ok(())
                }
                Err(e) if is_unique_violation(&e) => {
                    Err(CoreError::conflict("Username already exists"))
                }
                Err(e) => Err(e.into()),
            }
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> CoreResult<Option<UserRow>> {
        self.with_conn(|conn| Ok(query_user(conn, "username", username)?))
    }

    pub fn get_user_by_id(&self, id: &str) -> CoreResult<Option<UserRow>> {
        self.with_conn(|conn| Ok(query_user(conn, "id", id)?))
    }

    pub fn get_username_by_id(&self, id: &str) -> CoreResult<String> {
        self.with_conn(|conn| {
            conn.query_row("SELECT username FROM users WHERE id = ?1", [id], |row| {
                row.get(0)
            })
            .optional()?
            .ok_or_else(|| CoreError::not_found(format!("User not found: {}", id)))
        })
    }

    /// Every registered user, by username.
    pub fn list_users(&self) -> CoreResult<Vec<UserSummaryRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, username FROM users WHERE id <> ?1 ORDER BY username ASC",
            )?;
            let rows = stmt
                .query_map([SYSTEM_USER_ID], summary_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    /// Case-insensitive substring search on usernames, excluding the caller.
    pub fn search_users(&self, requester_id: &str, fragment: &str) -> CoreResult<Vec<UserSummaryRow>> {
        let fragment = fragment.trim();
        if fragment.is_empty() {
            return Err(CoreError::invalid("Search term must not be empty"));
        }
        let pattern = format!("%{}%", escape_like(fragment));

        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, username FROM users
                 WHERE username LIKE ?1 ESCAPE '\\' AND id <> ?2 AND id <> ?3
                 ORDER BY username ASC",
            )?;
            let rows = stmt
                .query_map((&pattern, requester_id, SYSTEM_USER_ID), summary_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }
}

pub(crate) fn user_exists(conn: &Connection, id: &str) -> rusqlite::Result<bool> {
    conn.query_row("SELECT EXISTS(SELECT 1 FROM users WHERE id = ?1)", [id], |row| row.get(0))
}

pub(crate) fn summary_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserSummaryRow> {
    Ok(UserSummaryRow {
        id: row.get(0)?,
        username: row.get(1)?,
    })
}

fn query_user(conn: &Connection, column: &str, value: &str) -> rusqlite::Result<Option<UserRow>> {
    // `column` is one of two literals chosen above, never caller input
    let sql = format!(
        "SELECT id, username, password, created_at FROM users WHERE {} = ?1",
        column
    );
    conn.query_row(&sql, [value], |row| {
        Ok(UserRow {
            id: row.get(0)?,
            username: row.get(1)?,
            password: row.get(2)?,
            created_at: row.get(3)?,
        })
    })
    .optional()
}

fn escape_like(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
