use axum::{
    Router,
    extract::{State, WebSocketUpgrade},
    middleware,
    response::IntoResponse,
    routing::{delete, get, post, put},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use huddle_gateway::connection;

use crate::middleware::require_auth;
use crate::state::AppState;
use crate::{auth, friends, groups, messages, users};

/// The full HTTP surface: REST under `/api`, the WebSocket gateway and a
/// liveness probe.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/api/register", post(auth::register))
        .route("/api/login", post(auth::login));

    let protected_routes = Router::new()
        .route("/api/users", get(users::list_users))
        .route("/api/users/search", get(users::search_users))
        .route(
            "/api/friend-requests",
            get(friends::list_requests).post(friends::send_request),
        )
        .route("/api/friend-requests/{request_id}", put(friends::respond_to_request))
        .route("/api/friends", get(friends::list_friends))
        .route("/api/friends/{friend_id}", delete(friends::remove_friend))
        .route("/api/groups", post(groups::create_group))
        .route("/api/groups/my", get(groups::list_my_groups))
        .route("/api/groups/{group_id}", get(groups::get_group))
        .route("/api/groups/{group_id}/invite", post(groups::invite_members))
        .route(
            "/api/groups/{group_id}/messages",
            get(messages::get_messages).post(messages::send_message),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    let ws_route = Router::new().route("/gateway", get(ws_upgrade));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(ws_route)
        .route("/health", get(health))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

async fn ws_upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    let ctx = state.gateway_context();
    ws.on_upgrade(move |socket| connection::handle_connection(socket, ctx))
}

async fn health() -> &'static str {
    "ok"
}
