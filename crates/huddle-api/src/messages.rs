use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use axum_extra::extract::WithRejection;
use serde::Deserialize;
use tracing::debug;
use uuid::Uuid;

use huddle_db::convert::parse_id;
use huddle_db::messages::clamp_page_size;
use huddle_types::api::{Claims, GroupMessagesResponse, SendGroupMessageRequest};
use huddle_types::events::GatewayEvent;
use huddle_types::models::GroupMessage;

use crate::error::{ApiError, ApiResult, blocking};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    pub limit: Option<u32>,
    /// Cursor: return only messages with an id strictly below this one.
    pub before: Option<i64>,
}

/// Append to a group and push the stored message to every live session of
/// the group's members.
pub async fn send_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    WithRejection(Path(group_id), _): WithRejection<Path<Uuid>, ApiError>,
    WithRejection(Json(req), _): WithRejection<Json<SendGroupMessageRequest>, ApiError>,
) -> ApiResult<impl IntoResponse> {
    let sender = claims.sub.to_string();
    let posted = blocking(&state, move |db| {
        db.post_group_message(&group_id.to_string(), &sender, &req.content, &req.message_type)
    })
    .await?;

    let audience: Vec<Uuid> = posted
        .member_ids
        .iter()
        .map(|id| parse_id(id, "member id"))
        .collect();
    let message = GroupMessage::from(posted.message);

    let delivered = state
        .hub
        .send_to_users(&audience, GatewayEvent::GroupMessage(message.clone()))
        .await;
    debug!("Message {} fanned out to {} connections", message.id, delivered);

    Ok((StatusCode::CREATED, Json(message)))
}

pub async fn get_messages(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    WithRejection(Path(group_id), _): WithRejection<Path<Uuid>, ApiError>,
    WithRejection(Query(query), _): WithRejection<Query<MessageQuery>, ApiError>,
) -> ApiResult<Json<GroupMessagesResponse>> {
    let requester = claims.sub.to_string();
    let limit = clamp_page_size(query.limit);
    let rows = blocking(&state, move |db| {
        db.list_group_messages(&group_id.to_string(), &requester, limit, query.before)
    })
    .await?;

    Ok(Json(GroupMessagesResponse {
        messages: rows.into_iter().map(Into::into).collect(),
    }))
}
