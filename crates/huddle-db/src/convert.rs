use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::warn;
use uuid::Uuid;

use huddle_types::api::{
    GroupMemberResponse, GroupResponse, MyGroup, ReceivedFriendRequest, SentFriendRequest,
};
use huddle_types::events::ChatLine;
use huddle_types::models::{GroupMessage, UserSummary};

use crate::models::{GroupRow, MemberRow, MessageRow, MyGroupRow, RequestListingRow, UserSummaryRow};

/// Parse a stored id, logging and substituting the nil UUID on corruption.
pub fn parse_id(raw: &str, what: &str) -> Uuid {
    raw.parse().unwrap_or_else(|e| {
        warn!("Corrupt {} '{}': {}", what, raw, e);
        Uuid::nil()
    })
}

/// Parse a stored timestamp. Rows written by this crate are RFC 3339 with
/// milliseconds; plain `datetime('now')` values are accepted as naive UTC.
pub fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc()))
        .unwrap_or_else(|e| {
            warn!("Corrupt timestamp '{}': {}", raw, e);
            DateTime::default()
        })
}

impl From<MessageRow> for GroupMessage {
    fn from(row: MessageRow) -> Self {
        GroupMessage {
            id: row.id,
            group_id: parse_id(&row.group_id, "group_id"),
            sender_id: parse_id(&row.sender_id, "sender_id"),
            sender_name: row.sender_name,
            content: row.content,
            message_type: row.message_type,
            created_at: parse_timestamp(&row.created_at),
        }
    }
}

impl From<MessageRow> for ChatLine {
    fn from(row: MessageRow) -> Self {
        ChatLine {
            user: row.sender_name,
            text: row.content,
            time: parse_timestamp(&row.created_at),
        }
    }
}

impl From<UserSummaryRow> for UserSummary {
    fn from(row: UserSummaryRow) -> Self {
        UserSummary {
            id: parse_id(&row.id, "user id"),
            username: row.username,
        }
    }
}

impl From<GroupRow> for GroupResponse {
    fn from(row: GroupRow) -> Self {
        GroupResponse {
            id: parse_id(&row.id, "group id"),
            name: row.name,
            description: row.description,
            creator_id: parse_id(&row.creator_id, "creator_id"),
            created_at: parse_timestamp(&row.created_at),
            updated_at: parse_timestamp(&row.updated_at),
        }
    }
}

impl From<MyGroupRow> for MyGroup {
    fn from(row: MyGroupRow) -> Self {
        MyGroup {
            group: row.group.into(),
            role: row.role,
            member_count: row.member_count.max(0) as usize,
        }
    }
}

impl From<MemberRow> for GroupMemberResponse {
    fn from(row: MemberRow) -> Self {
        GroupMemberResponse {
            user_id: parse_id(&row.user_id, "member id"),
            username: row.username,
            role: row.role,
            joined_at: parse_timestamp(&row.joined_at),
        }
    }
}

impl From<RequestListingRow> for ReceivedFriendRequest {
    fn from(row: RequestListingRow) -> Self {
        ReceivedFriendRequest {
            id: parse_id(&row.id, "request id"),
            sender_id: parse_id(&row.counterpart_id, "sender_id"),
            sender_username: row.counterpart_username,
            status: row.status,
            created_at: parse_timestamp(&row.created_at),
            updated_at: parse_timestamp(&row.updated_at),
        }
    }
}

impl From<RequestListingRow> for SentFriendRequest {
    fn from(row: RequestListingRow) -> Self {
        SentFriendRequest {
            id: parse_id(&row.id, "request id"),
            receiver_id: parse_id(&row.counterpart_id, "receiver_id"),
            receiver_username: row.counterpart_username,
            status: row.status,
            created_at: parse_timestamp(&row.created_at),
            updated_at: parse_timestamp(&row.updated_at),
        }
    }
}
