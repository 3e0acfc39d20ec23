use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use axum_extra::extract::WithRejection;
use tracing::info;
use uuid::Uuid;

use huddle_db::convert::parse_id;
use huddle_types::api::{
    Claims, CreateGroupRequest, GroupDetailResponse, GroupResponse, InviteMembersRequest,
    InviteMembersResponse, MyGroupsResponse,
};

use crate::error::{ApiError, ApiResult, blocking};
use crate::state::AppState;

pub async fn create_group(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    WithRejection(Json(req), _): WithRejection<Json<CreateGroupRequest>, ApiError>,
) -> ApiResult<impl IntoResponse> {
    let group_id = Uuid::new_v4();
    let creator = claims.sub.to_string();
    let row = blocking(&state, move |db| {
        db.create_group(&group_id.to_string(), &creator, &req.name, &req.description)
    })
    .await?;
    info!("{} created group '{}' ({})", claims.username, row.name, group_id);

    Ok((StatusCode::CREATED, Json(GroupResponse::from(row))))
}

pub async fn list_my_groups(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<MyGroupsResponse>> {
    let user = claims.sub.to_string();
    let rows = blocking(&state, move |db| db.list_my_groups(&user)).await?;
    Ok(Json(MyGroupsResponse {
        groups: rows.into_iter().map(Into::into).collect(),
    }))
}

pub async fn get_group(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    WithRejection(Path(group_id), _): WithRejection<Path<Uuid>, ApiError>,
) -> ApiResult<Json<GroupDetailResponse>> {
    let user = claims.sub.to_string();
    let detail = blocking(&state, move |db| db.get_group_detail(&group_id.to_string(), &user)).await?;
    Ok(Json(GroupDetailResponse {
        group: detail.group.into(),
        member_count: detail.member_count.max(0) as usize,
        members: detail.members.into_iter().map(Into::into).collect(),
        user_role: detail.user_role,
    }))
}

/// Add friends of the caller to a group. Per-target failures are reported
/// in `errors` without failing the request.
pub async fn invite_members(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    WithRejection(Path(group_id), _): WithRejection<Path<Uuid>, ApiError>,
    WithRejection(Json(req), _): WithRejection<Json<InviteMembersRequest>, ApiError>,
) -> ApiResult<Json<InviteMembersResponse>> {
    let inviter = claims.sub.to_string();
    let report = blocking(&state, move |db| {
        db.invite_members(&group_id.to_string(), &inviter, &req.friend_ids)
    })
    .await?;

    Ok(Json(InviteMembersResponse {
        added_friends: report
            .added
            .iter()
            .map(|id| parse_id(id, "member id"))
            .collect(),
        errors: report.errors,
    }))
}
