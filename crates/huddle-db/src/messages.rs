use rusqlite::{Connection, TransactionBehavior};
use tracing::debug;

use crate::error::{CoreError, CoreResult};
use crate::groups::{member_ids, role_of};
use crate::models::{MessageRow, PostedMessage};
use crate::{Database, LOBBY_GROUP_ID};

pub const DEFAULT_PAGE_SIZE: u32 = 50;
pub const MAX_PAGE_SIZE: u32 = 200;

/// Resolve a requested page size to `1..=MAX_PAGE_SIZE`.
pub fn clamp_page_size(limit: Option<u32>) -> u32 {
    limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)
}

const SELECT_MESSAGE: &str =
    "SELECT m.id, m.group_id, m.sender_id, u.username, m.content, m.message_type, m.created_at
     FROM group_messages m
     LEFT JOIN users u ON u.id = m.sender_id";

impl Database {
    /// Append a message to a group the sender belongs to and bump the
    /// group's activity timestamp. Returns the stored message together with
    /// the member ids that should be notified.
    pub fn post_group_message(
        &self,
        group_id: &str,
        sender_id: &str,
        content: &str,
        message_type: &str,
    ) -> CoreResult<PostedMessage> {
        if content.is_empty() {
            return Err(CoreError::invalid("Message content must not be empty"));
        }
        let message_type = if message_type.is_empty() { "text" } else { message_type };

        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            if role_of(&tx, group_id, sender_id)?.is_none() {
                return Err(CoreError::forbidden(
                    "You are not a member of this group and cannot send messages",
                ));
            }

            tx.execute(
                "INSERT INTO group_messages (group_id, sender_id, content, message_type)
                 VALUES (?1, ?2, ?3, ?4)",
                (group_id, sender_id, content, message_type),
            )?;
            let id = tx.last_insert_rowid();

            tx.execute(
                "UPDATE chat_groups
                 SET updated_at = (SELECT created_at FROM group_messages WHERE id = ?1)
                 WHERE id = ?2",
                (id, group_id),
            )?;

            let message = query_message(&tx, id)?;
            let member_ids = member_ids(&tx, group_id)?;
            tx.commit()?;

            debug!("Message {} posted to {} by {}", id, group_id, sender_id);
            Ok(PostedMessage {
                message,
                member_ids,
            })
        })
    }

    /// One page of a group's history in chronological order.
    ///
    /// Without `before` the page holds the newest `limit` messages; with it,
    /// the `limit` messages immediately older than that id.
    pub fn list_group_messages(
        &self,
        group_id: &str,
        requester_id: &str,
        limit: u32,
        before: Option<i64>,
    ) -> CoreResult<Vec<MessageRow>> {
        self.with_conn(|conn| {
            if role_of(conn, group_id, requester_id)?.is_none() {
                return Err(CoreError::forbidden(
                    "You are not a member of this group and cannot view messages",
                ));
            }
            Ok(query_page(conn, group_id, limit, before)?)
        })
    }

    /// Best-effort archive of a gateway chat line into the lobby group.
    /// Membership is not checked.
    pub fn archive_chat_message(&self, sender_id: &str, content: &str) -> CoreResult<i64> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO group_messages (group_id, sender_id, content, message_type)
                 VALUES (?1, ?2, ?3, 'text')",
                (LOBBY_GROUP_ID, sender_id, content),
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// Newest lobby lines, oldest first.
    pub fn recent_chat_messages(&self, limit: u32) -> CoreResult<Vec<MessageRow>> {
        self.with_conn(|conn| Ok(query_page(conn, LOBBY_GROUP_ID, limit, None)?))
    }
}

fn query_page(
    conn: &Connection,
    group_id: &str,
    limit: u32,
    before: Option<i64>,
) -> rusqlite::Result<Vec<MessageRow>> {
    let sql = format!(
        "{} WHERE m.group_id = ?1 AND (?2 IS NULL OR m.id < ?2) ORDER BY m.id DESC LIMIT ?3",
        SELECT_MESSAGE
    );
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt
        .query_map((group_id, before, limit), message_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    rows.reverse();
    Ok(rows)
}

fn query_message(conn: &Connection, id: i64) -> rusqlite::Result<MessageRow> {
    let sql = format!("{} WHERE m.id = ?1", SELECT_MESSAGE);
    conn.query_row(&sql, [id], message_from_row)
}

fn message_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        group_id: row.get(1)?,
        sender_id: row.get(2)?,
        sender_name: row
            .get::<_, Option<String>>(3)?
            .unwrap_or_else(|| "unknown".to_string()),
        content: row.get(4)?,
        message_type: row.get(5)?,
        created_at: row.get(6)?,
    })
}
