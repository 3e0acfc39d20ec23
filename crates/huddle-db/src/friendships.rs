use rusqlite::{Connection, OptionalExtension, TransactionBehavior};
use tracing::{debug, info};
use uuid::Uuid;

use huddle_types::api::SendOutcome;
use huddle_types::models::FriendRequestStatus;

use crate::directory::{summary_from_row, user_exists};
use crate::error::{CoreError, CoreResult};
use crate::models::{RequestListing, RequestListingRow, UserSummaryRow};
use crate::{Database, SYSTEM_USER_ID, parse_column};

impl Database {
    // -- Requests --

    /// Send (or re-send) a friend request from `sender_id` to `receiver_id`.
    ///
    /// Returns the id of the request that is now pending.
    pub fn send_friend_request(
        &self,
        sender_id: &str,
        receiver_id: &str,
    ) -> CoreResult<(String, SendOutcome)> {
        if sender_id == receiver_id {
            return Err(CoreError::invalid("You cannot send a friend request to yourself"));
        }

        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            if receiver_id == SYSTEM_USER_ID || !user_exists(&tx, receiver_id)? {
                return Err(CoreError::not_found("User not found"));
            }

            if friendship_exists(&tx, sender_id, receiver_id)? {
                return Err(CoreError::conflict("You are already friends"));
            }

            let existing: Option<(String, FriendRequestStatus)> = tx
                .query_row(
                    "SELECT id, status FROM friend_requests
                     WHERE sender_id = ?1 AND receiver_id = ?2 AND status <> 'accepted'",
                    (sender_id, receiver_id),
                    |row| Ok((row.get(0)?, parse_column(row, 1)?)),
                )
                .optional()?;

            if let Some((_, FriendRequestStatus::Pending)) = existing {
                return Err(CoreError::conflict(
                    "Friend request already sent, waiting for a response",
                ));
            }

            // Checked before a resend too, so the pair never holds two
            // pending requests
            let reverse_pending: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM friend_requests
                 WHERE sender_id = ?1 AND receiver_id = ?2 AND status = 'pending')",
                (receiver_id, sender_id),
                |row| row.get(0),
            )?;
            if reverse_pending {
                return Err(CoreError::conflict(
                    "This user has already sent you a friend request, respond to it instead",
                ));
            }

            if let Some((id, _)) = existing {
                tx.execute(
                    "UPDATE friend_requests
                     SET status = 'pending', updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                     WHERE id = ?1",
                    [&id],
                )?;
                tx.commit()?;
                info!("Friend request {} re-sent {} -> {}", id, sender_id, receiver_id);
                return Ok((id, SendOutcome::Resent));
            }

            let id = Uuid::new_v4().to_string();
            tx.execute(
                "INSERT INTO friend_requests (id, sender_id, receiver_id, status)
                 VALUES (?1, ?2, ?3, 'pending')",
                (&id, sender_id, receiver_id),
            )?;
            tx.commit()?;

            info!("Friend request {} sent {} -> {}", id, sender_id, receiver_id);
            Ok((id, SendOutcome::Created))
        })
    }

    /// Accept or reject a pending request addressed to `responder_id`.
    ///
    /// The status flip and the friendship rows commit together, and the
    /// status guard in the UPDATE makes a second responder lose the race.
    pub fn respond_to_friend_request(
        &self,
        request_id: &str,
        responder_id: &str,
        status: FriendRequestStatus,
    ) -> CoreResult<()> {
        if status == FriendRequestStatus::Pending {
            return Err(CoreError::invalid("Status must be accepted or rejected"));
        }

        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let sender_id: Option<String> = tx
                .query_row(
                    "SELECT sender_id FROM friend_requests
                     WHERE id = ?1 AND receiver_id = ?2 AND status = 'pending'",
                    (request_id, responder_id),
                    |row| row.get(0),
                )
                .optional()?;
            let Some(sender_id) = sender_id else {
                return Err(CoreError::not_found(
                    "Friend request not found or already handled",
                ));
            };

            let changed = tx.execute(
                "UPDATE friend_requests
                 SET status = ?1, updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?2 AND status = 'pending'",
                (status.as_str(), request_id),
            )?;
            if changed != 1 {
                return Err(CoreError::not_found(
                    "Friend request not found or already handled",
                ));
            }

            if status == FriendRequestStatus::Accepted
                && !friendship_exists(&tx, responder_id, &sender_id)?
            {
                tx.execute(
                    "INSERT INTO friendships (user_id, friend_id) VALUES (?1, ?2), (?2, ?1)",
                    (responder_id, &sender_id),
                )?;
            }

            tx.commit()?;
            info!("Friend request {} {} by {}", request_id, status, responder_id);
            Ok(())
        })
    }

    /// Pending requests the user received and every request the user sent,
    /// newest first, each with the other party's username.
    pub fn list_friend_requests(&self, user_id: &str) -> CoreResult<RequestListing> {
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;

            let mut stmt = tx.prepare(
                "SELECT r.id, r.sender_id, u.username, r.status, r.created_at, r.updated_at
                 FROM friend_requests r
                 JOIN users u ON u.id = r.sender_id
                 WHERE r.receiver_id = ?1 AND r.status = 'pending'
                 ORDER BY r.created_at DESC, r.rowid DESC",
            )?;
            let received = stmt
                .query_map([user_id], listing_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            let mut stmt = tx.prepare(
                "SELECT r.id, r.receiver_id, u.username, r.status, r.created_at, r.updated_at
                 FROM friend_requests r
                 JOIN users u ON u.id = r.receiver_id
                 WHERE r.sender_id = ?1
                 ORDER BY r.created_at DESC, r.rowid DESC",
            )?;
            let sent = stmt
                .query_map([user_id], listing_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            debug!(
                "Listed friend requests for {}: {} received, {} sent",
                user_id,
                received.len(),
                sent.len()
            );
            Ok(RequestListing { received, sent })
        })
    }

    // -- Friendships --

    /// Friends of `user_id`, sorted by username.
    pub fn list_friends(&self, user_id: &str) -> CoreResult<Vec<UserSummaryRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT u.id, u.username
                 FROM friendships f
                 JOIN users u ON u.id = f.friend_id
                 WHERE f.user_id = ?1
                 ORDER BY u.username ASC",
            )?;
            let rows = stmt
                .query_map([user_id], summary_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    /// Delete both directed rows of a friendship.
    pub fn remove_friend(&self, user_id: &str, friend_id: &str) -> CoreResult<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let exists: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM friendships WHERE user_id = ?1 AND friend_id = ?2)",
                (user_id, friend_id),
                |row| row.get(0),
            )?;
            if !exists {
                return Err(CoreError::not_found("Friendship does not exist"));
            }

            tx.execute(
                "DELETE FROM friendships
                 WHERE (user_id = ?1 AND friend_id = ?2) OR (user_id = ?2 AND friend_id = ?1)",
                (user_id, friend_id),
            )?;
            tx.commit()?;

            info!("Friendship removed: {} <-> {}", user_id, friend_id);
            Ok(())
        })
    }

    pub fn are_friends(&self, a: &str, b: &str) -> CoreResult<bool> {
        self.with_conn(|conn| Ok(friendship_exists(conn, a, b)?))
    }
}

/// True when a friendship row exists in either direction.
pub(crate) fn friendship_exists(conn: &Connection, a: &str, b: &str) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM friendships
         WHERE (user_id = ?1 AND friend_id = ?2) OR (user_id = ?2 AND friend_id = ?1))",
        (a, b),
        |row| row.get(0),
    )
}

fn listing_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RequestListingRow> {
    Ok(RequestListingRow {
        id: row.get(0)?,
        counterpart_id: row.get(1)?,
        counterpart_username: row.get(2)?,
        status: parse_column(row, 3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use huddle_types::api::SendOutcome;
    use huddle_types::models::FriendRequestStatus::{Accepted, Pending, Rejected};

    use crate::test_support::{befriend, db, user};
    use crate::{CoreError, SYSTEM_USER_ID};

    fn friend_names(db: &crate::Database, user_id: &str) -> Vec<String> {
        db.list_friends(user_id)
            .unwrap()
            .into_iter()
            .map(|f| f.username)
            .collect()
    }

    fn friendship_rows(db: &crate::Database) -> i64 {
        db.with_conn(|conn| {
            Ok::<_, CoreError>(conn.query_row("SELECT COUNT(*) FROM friendships", [], |r| r.get(0))?)
        })
        .unwrap()
    }

    #[test]
    fn accepting_creates_symmetric_friendship() {
        let db = db();
        let alice = user(&db, "alice");
        let bob = user(&db, "bob");

        let (request_id, outcome) = db.send_friend_request(&alice, &bob).unwrap();
        assert_eq!(outcome, SendOutcome::Created);
        db.respond_to_friend_request(&request_id, &bob, Accepted).unwrap();

        assert_eq!(friend_names(&db, &alice), vec!["bob"]);
        assert_eq!(friend_names(&db, &bob), vec!["alice"]);
        assert_eq!(friendship_rows(&db), 2);

        // Either direction now conflicts
        assert!(matches!(db.send_friend_request(&alice, &bob), Err(CoreError::Conflict(_))));
        assert!(matches!(db.send_friend_request(&bob, &alice), Err(CoreError::Conflict(_))));
    }

    #[test]
    fn duplicate_pending_request_conflicts() {
        let db = db();
        let alice = user(&db, "alice");
        let bob = user(&db, "bob");

        db.send_friend_request(&alice, &bob).unwrap();
        assert!(matches!(db.send_friend_request(&alice, &bob), Err(CoreError::Conflict(_))));
    }

    #[test]
    fn reverse_pending_request_conflicts() {
        let db = db();
        let alice = user(&db, "alice");
        let bob = user(&db, "bob");

        db.send_friend_request(&alice, &bob).unwrap();
        let err = db.send_friend_request(&bob, &alice).unwrap_err();
        assert!(matches!(err, CoreError::Conflict(ref msg) if msg.contains("respond")));
    }

    #[test]
    fn unknown_receiver_and_self_request() {
        let db = db();
        let alice = user(&db, "alice");
        assert!(matches!(db.send_friend_request(&alice, "nobody"), Err(CoreError::NotFound(_))));
        assert!(matches!(
            db.send_friend_request(&alice, &alice),
            Err(CoreError::InvalidArgument(_))
        ));
    }

    #[test]
    fn reject_then_resend_reuses_the_same_row() {
        let db = db();
        let alice = user(&db, "alice");
        let bob = user(&db, "bob");

        let (first_id, _) = db.send_friend_request(&alice, &bob).unwrap();
        db.respond_to_friend_request(&first_id, &bob, Rejected).unwrap();

        let sent = db.list_friend_requests(&alice).unwrap().sent;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].status, Rejected);
        assert!(db.list_friend_requests(&bob).unwrap().received.is_empty());

        let (second_id, outcome) = db.send_friend_request(&alice, &bob).unwrap();
        assert_eq!(outcome, SendOutcome::Resent);
        assert_eq!(first_id, second_id);

        let sent = db.list_friend_requests(&alice).unwrap().sent;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].status, Pending);
        assert_eq!(db.list_friend_requests(&bob).unwrap().received.len(), 1);
    }

    #[test]
    fn resend_is_refused_while_the_reverse_request_is_pending() {
        let db = db();
        let alice = user(&db, "alice");
        let bob = user(&db, "bob");

        let (first_id, _) = db.send_friend_request(&alice, &bob).unwrap();
        db.respond_to_friend_request(&first_id, &bob, Rejected).unwrap();
        db.send_friend_request(&bob, &alice).unwrap();

        assert!(matches!(
            db.send_friend_request(&alice, &bob),
            Err(CoreError::Conflict(_))
        ));

        // The rejected row stays rejected; only bob's request is pending
        let listing = db.list_friend_requests(&alice).unwrap();
        assert_eq!(listing.sent.len(), 1);
        assert_eq!(listing.sent[0].status, Rejected);
        assert_eq!(listing.received.len(), 1);
        assert!(db.list_friend_requests(&bob).unwrap().received.is_empty());
    }

    #[test]
    fn system_account_cannot_be_befriended() {
        let db = db();
        let alice = user(&db, "alice");
        assert!(matches!(
            db.send_friend_request(&alice, SYSTEM_USER_ID),
            Err(CoreError::NotFound(_))
        ));
    }

    #[test]
    fn only_the_receiver_can_respond() {
        let db = db();
        let alice = user(&db, "alice");
        let bob = user(&db, "bob");
        let carol = user(&db, "carol");

        let (request_id, _) = db.send_friend_request(&alice, &bob).unwrap();
        assert!(matches!(
            db.respond_to_friend_request(&request_id, &alice, Accepted),
            Err(CoreError::NotFound(_))
        ));
        assert!(matches!(
            db.respond_to_friend_request(&request_id, &carol, Accepted),
            Err(CoreError::NotFound(_))
        ));
        assert!(matches!(
            db.respond_to_friend_request(&request_id, &bob, Pending),
            Err(CoreError::InvalidArgument(_))
        ));
    }

    #[test]
    fn accepted_request_is_terminal() {
        let db = db();
        let alice = user(&db, "alice");
        let bob = user(&db, "bob");

        let (request_id, _) = db.send_friend_request(&alice, &bob).unwrap();
        db.respond_to_friend_request(&request_id, &bob, Accepted).unwrap();
        assert!(matches!(
            db.respond_to_friend_request(&request_id, &bob, Rejected),
            Err(CoreError::NotFound(_))
        ));
        assert_eq!(friendship_rows(&db), 2);
    }

    #[test]
    fn racing_responses_produce_one_outcome() {
        let db = Arc::new(db());
        let alice = user(&db, "alice");
        let bob = user(&db, "bob");
        let (request_id, _) = db.send_friend_request(&alice, &bob).unwrap();

        let handles: Vec<_> = [Accepted, Rejected, Accepted, Accepted]
            .into_iter()
            .map(|status| {
                let db = db.clone();
                let request_id = request_id.clone();
                let bob = bob.clone();
                thread::spawn(move || db.respond_to_friend_request(&request_id, &bob, status))
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| matches!(e, CoreError::NotFound(_))));

        let rows = friendship_rows(&db);
        assert!(rows == 0 || rows == 2, "unexpected friendship rows: {}", rows);
    }

    #[test]
    fn remove_friend_deletes_both_directions() {
        let db = db();
        let alice = user(&db, "alice");
        let bob = user(&db, "bob");
        befriend(&db, &alice, &bob);

        db.remove_friend(&bob, &alice).unwrap();
        assert!(friend_names(&db, &alice).is_empty());
        assert!(friend_names(&db, &bob).is_empty());
        assert_eq!(friendship_rows(&db), 0);

        assert!(matches!(db.remove_friend(&alice, &bob), Err(CoreError::NotFound(_))));
    }

    #[test]
    fn friends_can_reconnect_after_unfriending() {
        let db = db();
        let alice = user(&db, "alice");
        let bob = user(&db, "bob");
        befriend(&db, &alice, &bob);
        db.remove_friend(&alice, &bob).unwrap();

        let (request_id, outcome) = db.send_friend_request(&alice, &bob).unwrap();
        assert_eq!(outcome, SendOutcome::Created);
        db.respond_to_friend_request(&request_id, &bob, Accepted).unwrap();
        assert!(db.are_friends(&alice, &bob).unwrap());
        assert_eq!(friendship_rows(&db), 2);
    }

    #[test]
    fn request_listing_is_newest_first_with_usernames() {
        let db = db();
        let alice = user(&db, "alice");
        let bob = user(&db, "bob");
        let carol = user(&db, "carol");

        db.send_friend_request(&bob, &alice).unwrap();
        db.send_friend_request(&carol, &alice).unwrap();
        db.send_friend_request(&alice, &user(&db, "dave")).unwrap();

        let listing = db.list_friend_requests(&alice).unwrap();
        let received: Vec<_> = listing
            .received
            .iter()
            .map(|r| r.counterpart_username.as_str())
            .collect();
        assert_eq!(received, vec!["carol", "bob"]);
        assert_eq!(listing.sent.len(), 1);
        assert_eq!(listing.sent[0].counterpart_username, "dave");
    }

    #[test]
    fn friends_are_sorted_by_username() {
        let db = db();
        let alice = user(&db, "alice");
        let zed = user(&db, "zed");
        let bob = user(&db, "bob");
        befriend(&db, &zed, &alice);
        befriend(&db, &alice, &bob);

        assert_eq!(friend_names(&db, &alice), vec!["bob", "zed"]);
    }
}
