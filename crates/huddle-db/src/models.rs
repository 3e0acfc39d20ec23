use huddle_types::models::{FriendRequestStatus, GroupRole};

/// Database row types: these map directly to SQLite rows.
/// Distinct from huddle-types API models to keep the DB layer independent.
/// Ids are kept as the TEXT stored in SQLite.
pub struct UserRow {
    pub id: String,
    pub username: String,
    pub password: String,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserSummaryRow {
    pub id: String,
    pub username: String,
}

/// One side of a friend request as seen by a participant.
#[derive(Debug, Clone)]
pub struct RequestListingRow {
    pub id: String,
    pub counterpart_id: String,
    pub counterpart_username: String,
    pub status: FriendRequestStatus,
    pub created_at: String,
    pub updated_at: String,
}

pub struct RequestListing {
    /// Pending requests addressed to the user
    pub received: Vec<RequestListingRow>,
    /// Every request the user has sent, whatever its status
    pub sent: Vec<RequestListingRow>,
}

#[derive(Debug, Clone)]
pub struct GroupRow {
    pub id: String,
    pub name: String,
    pub description: String,
    pub creator_id: String,
    pub created_at: String,
    pub updated_at: String,
}

pub struct MyGroupRow {
    pub group: GroupRow,
    pub role: GroupRole,
    pub member_count: i64,
}

#[derive(Debug, Clone)]
pub struct MemberRow {
    pub user_id: String,
    pub username: String,
    pub role: GroupRole,
    pub joined_at: String,
}

pub struct GroupDetail {
    pub group: GroupRow,
    pub member_count: i64,
    pub members: Vec<MemberRow>,
    pub user_role: GroupRole,
}

/// Result of a batch invite: the call succeeds even when some targets fail.
#[derive(Debug, Default)]
pub struct InviteReport {
    pub added: Vec<String>,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct MessageRow {
    pub id: i64,
    pub group_id: String,
    pub sender_id: String,
    pub sender_name: String,
    pub content: String,
    pub message_type: String,
    pub created_at: String,
}

/// A freshly stored group message plus the members to notify.
pub struct PostedMessage {
    pub message: MessageRow,
    pub member_ids: Vec<String>,
}
