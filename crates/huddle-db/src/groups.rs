use rusqlite::{Connection, OptionalExtension, TransactionBehavior};
use tracing::{info, warn};

use huddle_types::models::GroupRole;

use crate::error::{CoreError, CoreResult};
use crate::models::{GroupDetail, GroupRow, InviteReport, MemberRow, MyGroupRow};
use crate::{Database, parse_column};

impl Database {
    /// Create a group with `creator_id` as its first admin.
    pub fn create_group(
        &self,
        id: &str,
        creator_id: &str,
        name: &str,
        description: &str,
    ) -> CoreResult<GroupRow> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CoreError::invalid("Group name must not be empty"));
        }

        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            tx.execute(
                "INSERT INTO chat_groups (id, name, description, creator_id) VALUES (?1, ?2, ?3, ?4)",
                (id, name, description, creator_id),
            )?;
            tx.execute(
                "INSERT INTO group_members (group_id, user_id, role) VALUES (?1, ?2, 'admin')",
                (id, creator_id),
            )?;
            let group = query_group(&tx, id)?
                .ok_or_else(|| anyhow::anyhow!("Group {} vanished after insert", id))?;
            tx.commit()?;

            info!("Group {} ({}) created by {}", name, id, creator_id);
            Ok(group)
        })
    }

    /// Groups the user belongs to, most recently active first.
    pub fn list_my_groups(&self, user_id: &str) -> CoreResult<Vec<MyGroupRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT g.id, g.name, g.description, g.creator_id, g.created_at, g.updated_at,
                        m.role,
                        (SELECT COUNT(*) FROM group_members c WHERE c.group_id = g.id)
                 FROM group_members m
                 JOIN chat_groups g ON g.id = m.group_id
                 WHERE m.user_id = ?1
                 ORDER BY g.updated_at DESC, g.rowid DESC",
            )?;
            let rows = stmt
                .query_map([user_id], |row| {
                    Ok(MyGroupRow {
                        group: group_from_row(row)?,
                        role: parse_column(row, 6)?,
                        member_count: row.get(7)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    pub fn get_group_detail(&self, group_id: &str, user_id: &str) -> CoreResult<GroupDetail> {
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;

            let group = query_group(&tx, group_id)?
                .ok_or_else(|| CoreError::not_found("Group not found"))?;
            let user_role = role_of(&tx, group_id, user_id)?
                .ok_or_else(|| CoreError::forbidden("You are not a member of this group"))?;

            let mut stmt = tx.prepare(
                "SELECT m.user_id, u.username, m.role, m.joined_at
                 FROM group_members m
                 JOIN users u ON u.id = m.user_id
                 WHERE m.group_id = ?1
                 ORDER BY CASE m.role WHEN 'admin' THEN 0 ELSE 1 END, m.joined_at ASC, m.rowid ASC",
            )?;
            let members = stmt
                .query_map([group_id], |row| {
                    Ok(MemberRow {
                        user_id: row.get(0)?,
                        username: row.get(1)?,
                        role: parse_column(row, 2)?,
                        joined_at: row.get(3)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            let member_count: i64 = tx.query_row(
                "SELECT COUNT(*) FROM group_members WHERE group_id = ?1",
                [group_id],
                |row| row.get(0),
            )?;

            Ok(GroupDetail {
                group,
                member_count,
                members,
                user_role,
            })
        })
    }

    /// Add friends of `inviter_id` to a group.
    ///
    /// Any member may invite. Targets that are malformed, not the inviter's
    /// friends, or already members are reported in `errors` and skipped.
    pub fn invite_members(
        &self,
        group_id: &str,
        inviter_id: &str,
        target_ids: &[String],
    ) -> CoreResult<InviteReport> {
        if target_ids.is_empty() {
            return Err(CoreError::invalid("Friend id list must not be empty"));
        }

        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            if query_group(&tx, group_id)?.is_none() {
                return Err(CoreError::not_found("Group not found"));
            }
            if role_of(&tx, group_id, inviter_id)?.is_none() {
                return Err(CoreError::forbidden(
                    "You are not a member of this group and cannot invite",
                ));
            }

            let mut report = InviteReport::default();
            for target_id in target_ids {
                match invite_one(&tx, group_id, inviter_id, target_id) {
                    Ok(None) => report.added.push(target_id.clone()),
                    Ok(Some(reason)) => report.errors.push(reason),
                    Err(e) => {
                        warn!("Invite of {} into {} failed: {}", target_id, group_id, e);
                        report
                            .errors
                            .push(format!("Could not add user {}", target_id));
                    }
                }
            }
            tx.commit()?;

            info!(
                "{} invited {} user(s) into {} ({} skipped)",
                inviter_id,
                report.added.len(),
                group_id,
                report.errors.len()
            );
            Ok(report)
        })
    }

    /// Ids of every member of a group.
    pub fn group_member_ids(&self, group_id: &str) -> CoreResult<Vec<String>> {
        self.with_conn(|conn| Ok(member_ids(conn, group_id)?))
    }

    pub fn member_role(&self, group_id: &str, user_id: &str) -> CoreResult<Option<GroupRole>> {
        self.with_conn(|conn| role_of(conn, group_id, user_id))
    }
}

/// `Ok(None)` when added, `Ok(Some(reason))` when skipped.
fn invite_one(
    conn: &Connection,
    group_id: &str,
    inviter_id: &str,
    target_id: &str,
) -> CoreResult<Option<String>> {
    if target_id.parse::<uuid::Uuid>().is_err() {
        return Ok(Some(format!("Invalid user id {}", target_id)));
    }

    let is_friend: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM friendships WHERE user_id = ?1 AND friend_id = ?2)",
        (inviter_id, target_id),
        |row| row.get(0),
    )?;
    if !is_friend {
        return Ok(Some(format!("User {} is not your friend", target_id)));
    }

    if role_of(conn, group_id, target_id)?.is_some() {
        return Ok(Some(format!("User {} is already a member", target_id)));
    }

    conn.execute(
        "INSERT INTO group_members (group_id, user_id, role) VALUES (?1, ?2, 'member')",
        (group_id, target_id),
    )?;
    Ok(None)
}

pub(crate) fn role_of(
    conn: &Connection,
    group_id: &str,
    user_id: &str,
) -> CoreResult<Option<GroupRole>> {
    let role = conn
        .query_row(
            "SELECT role FROM group_members WHERE group_id = ?1 AND user_id = ?2",
            (group_id, user_id),
            |row| parse_column(row, 0),
        )
        .optional()?;
    Ok(role)
}

pub(crate) fn member_ids(conn: &Connection, group_id: &str) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT user_id FROM group_members WHERE group_id = ?1")?;
    let ids = stmt
        .query_map([group_id], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<String>>>()?;
    Ok(ids)
}

fn query_group(conn: &Connection, group_id: &str) -> rusqlite::Result<Option<GroupRow>> {
    conn.query_row(
        "SELECT id, name, description, creator_id, created_at, updated_at
         FROM chat_groups WHERE id = ?1",
        [group_id],
        group_from_row,
    )
    .optional()
}

fn group_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<GroupRow> {
    Ok(GroupRow {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        creator_id: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}
