use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{FriendRequestStatus, GroupMessage, GroupRole, UserSummary};

// -- JWT Claims --

/// JWT claims shared by the REST middleware and the gateway `identify`
/// handshake, so both paths resolve the same user identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    pub exp: usize,
}

/// Body of every non-2xx JSON response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub message: String,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub user_id: Uuid,
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub user_id: Uuid,
    pub username: String,
    pub token: String,
}

// -- Users --

#[derive(Debug, Serialize, Deserialize)]
pub struct UserListResponse {
    pub users: Vec<UserSummary>,
}

#[derive(Debug, Deserialize)]
pub struct UserSearchQuery {
    #[serde(default)]
    pub username: String,
}

// -- Friend requests --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendFriendRequest {
    pub receiver_id: Uuid,
}

/// Whether a send produced a fresh request or revived a rejected one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SendOutcome {
    Created,
    Resent,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SendFriendRequestResponse {
    pub request_id: Uuid,
    pub outcome: SendOutcome,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RespondFriendRequest {
    /// Kept as a raw string so that `pending` or garbage map to a 400
    /// instead of a body-rejection.
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RespondFriendRequestResponse {
    pub request_id: Uuid,
    pub status: FriendRequestStatus,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReceivedFriendRequest {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub sender_username: String,
    pub status: FriendRequestStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SentFriendRequest {
    pub id: Uuid,
    pub receiver_id: Uuid,
    pub receiver_username: String,
    pub status: FriendRequestStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FriendRequestsResponse {
    pub received: Vec<ReceivedFriendRequest>,
    pub sent: Vec<SentFriendRequest>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FriendsResponse {
    pub friends: Vec<UserSummary>,
}

// -- Groups --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateGroupRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupResponse {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub creator_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MyGroup {
    #[serde(flatten)]
    pub group: GroupResponse,
    pub role: GroupRole,
    pub member_count: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MyGroupsResponse {
    pub groups: Vec<MyGroup>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GroupMemberResponse {
    pub user_id: Uuid,
    pub username: String,
    pub role: GroupRole,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GroupDetailResponse {
    pub group: GroupResponse,
    pub member_count: usize,
    pub members: Vec<GroupMemberResponse>,
    pub user_role: GroupRole,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InviteMembersRequest {
    /// Raw ids, so one malformed entry is reported instead of failing the batch
    pub friend_ids: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct InviteMembersResponse {
    pub added_friends: Vec<Uuid>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

// -- Group messages --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendGroupMessageRequest {
    pub content: String,
    #[serde(default = "default_message_type")]
    pub message_type: String,
}

pub fn default_message_type() -> String {
    "text".to_string()
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GroupMessagesResponse {
    pub messages: Vec<GroupMessage>,
}
