use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use axum_extra::extract::WithRejection;
use tracing::debug;
use uuid::Uuid;

use huddle_db::convert::parse_id;
use huddle_types::api::{
    Claims, FriendRequestsResponse, FriendsResponse, RespondFriendRequest,
    RespondFriendRequestResponse, SendFriendRequest, SendFriendRequestResponse, SendOutcome,
};
use huddle_types::models::FriendRequestStatus;

use crate::error::{ApiError, ApiResult, blocking};
use crate::state::AppState;

pub async fn send_request(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    WithRejection(Json(req), _): WithRejection<Json<SendFriendRequest>, ApiError>,
) -> ApiResult<impl IntoResponse> {
    let sender = claims.sub.to_string();
    let receiver = req.receiver_id.to_string();
    let (request_id, outcome) =
        blocking(&state, move |db| db.send_friend_request(&sender, &receiver)).await?;
    debug!("{} -> {} friend request {:?}", claims.sub, req.receiver_id, outcome);

    let status = match outcome {
        SendOutcome::Created => StatusCode::CREATED,
        SendOutcome::Resent => StatusCode::OK,
    };
    Ok((
        status,
        Json(SendFriendRequestResponse {
            request_id: parse_id(&request_id, "request id"),
            outcome,
        }),
    ))
}

pub async fn respond_to_request(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    WithRejection(Path(request_id), _): WithRejection<Path<Uuid>, ApiError>,
    WithRejection(Json(req), _): WithRejection<Json<RespondFriendRequest>, ApiError>,
) -> ApiResult<Json<RespondFriendRequestResponse>> {
    let status: FriendRequestStatus = req
        .status
        .parse()
        .map_err(|_| ApiError::BadRequest("Status must be accepted or rejected".into()))?;

    let responder = claims.sub.to_string();
    blocking(&state, move |db| {
        db.respond_to_friend_request(&request_id.to_string(), &responder, status)
    })
    .await?;

    Ok(Json(RespondFriendRequestResponse { request_id, status }))
}

pub async fn list_requests(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<FriendRequestsResponse>> {
    let user = claims.sub.to_string();
    let listing = blocking(&state, move |db| db.list_friend_requests(&user)).await?;
    Ok(Json(FriendRequestsResponse {
        received: listing.received.into_iter().map(Into::into).collect(),
        sent: listing.sent.into_iter().map(Into::into).collect(),
    }))
}

pub async fn list_friends(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<FriendsResponse>> {
    let user = claims.sub.to_string();
    let rows = blocking(&state, move |db| db.list_friends(&user)).await?;
    Ok(Json(FriendsResponse {
        friends: rows.into_iter().map(Into::into).collect(),
    }))
}

pub async fn remove_friend(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    WithRejection(Path(friend_id), _): WithRejection<Path<Uuid>, ApiError>,
) -> ApiResult<StatusCode> {
    let user = claims.sub.to_string();
    blocking(&state, move |db| db.remove_friend(&user, &friend_id.to_string())).await?;
    Ok(StatusCode::NO_CONTENT)
}
