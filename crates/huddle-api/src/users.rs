use axum::{
    Extension, Json,
    extract::{Query, State},
};
use axum_extra::extract::WithRejection;

use huddle_types::api::{Claims, UserListResponse, UserSearchQuery};

use crate::error::{ApiError, ApiResult, blocking};
use crate::state::AppState;

pub async fn list_users(
    State(state): State<AppState>,
    Extension(_claims): Extension<Claims>,
) -> ApiResult<Json<UserListResponse>> {
    let rows = blocking(&state, |db| db.list_users()).await?;
    Ok(Json(UserListResponse {
        users: rows.into_iter().map(Into::into).collect(),
    }))
}

/// Case-insensitive username search that never returns the caller.
pub async fn search_users(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    WithRejection(Query(query), _): WithRejection<Query<UserSearchQuery>, ApiError>,
) -> ApiResult<Json<UserListResponse>> {
    let requester = claims.sub.to_string();
    let rows = blocking(&state, move |db| db.search_users(&requester, &query.username)).await?;
    Ok(Json(UserListResponse {
        users: rows.into_iter().map(Into::into).collect(),
    }))
}
