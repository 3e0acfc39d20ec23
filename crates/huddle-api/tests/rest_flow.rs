use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use huddle_api::{AppStateInner, router};
use huddle_db::Database;

const SECRET: &str = "rest-flow-secret";

fn app() -> Router {
    let db = Database::open_in_memory().unwrap();
    router(Arc::new(AppStateInner::new(db, SECRET, 12, 50)))
}

async fn call(
    app: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into()))
    };
    (status, value)
}

struct TestUser {
    id: String,
    token: String,
}

async fn register(app: &Router, username: &str) -> TestUser {
    let (status, body) = call(
        app,
        Method::POST,
        "/api/register",
        None,
        Some(json!({ "username": username, "password": "correct horse" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    TestUser {
        id: body["user_id"].as_str().unwrap().to_string(),
        token: body["token"].as_str().unwrap().to_string(),
    }
}

async fn befriend(app: &Router, a: &TestUser, b: &TestUser) {
    let (status, body) = call(
        app,
        Method::POST,
        "/api/friend-requests",
        Some(&a.token),
        Some(json!({ "receiver_id": b.id })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let request_id = body["request_id"].as_str().unwrap().to_string();

    let (status, _) = call(
        app,
        Method::PUT,
        &format!("/api/friend-requests/{}", request_id),
        Some(&b.token),
        Some(json!({ "status": "accepted" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn register_and_login() {
    let app = app();
    let alice = register(&app, "alice").await;

    let (status, body) = call(
        &app,
        Method::POST,
        "/api/register",
        None,
        Some(json!({ "username": "alice", "password": "another pass" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["message"], "Username already exists");

    let (status, _) = call(
        &app,
        Method::POST,
        "/api/register",
        None,
        Some(json!({ "username": "bob", "password": "short" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(
        &app,
        Method::POST,
        "/api/login",
        None,
        Some(json!({ "username": "alice", "password": "wrong password" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = call(
        &app,
        Method::POST,
        "/api/login",
        None,
        Some(json!({ "username": "alice", "password": "correct horse" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user_id"], alice.id.as_str());
    assert_eq!(body["username"], "alice");

    // The seeded account cannot be logged into
    let (status, _) = call(
        &app,
        Method::POST,
        "/api/login",
        None,
        Some(json!({ "username": "system", "password": "!" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn protected_routes_require_a_valid_token() {
    let app = app();

    let (status, body) = call(&app, Method::GET, "/api/friends", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["message"].is_string());

    let (status, _) = call(&app, Method::GET, "/api/friends", Some("not-a-jwt"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = call(&app, Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::String("ok".into()));
}

#[tokio::test]
async fn user_directory_and_search() {
    let app = app();
    let alice = register(&app, "alice").await;
    register(&app, "bob").await;
    register(&app, "Alicia").await;

    let (status, body) = call(&app, Method::GET, "/api/users", Some(&alice.token), None).await;
    assert_eq!(status, StatusCode::OK);
    let names: Vec<&str> = body["users"]
        .as_array()
        .unwrap()
        .iter()
        .map(|u| u["username"].as_str().unwrap())
        .collect();
    assert_eq!(names.len(), 3);
    assert!(!names.contains(&"system"));

    let (status, body) = call(
        &app,
        Method::GET,
        "/api/users/search?username=ALI",
        Some(&alice.token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let found: Vec<&str> = body["users"]
        .as_array()
        .unwrap()
        .iter()
        .map(|u| u["username"].as_str().unwrap())
        .collect();
    assert_eq!(found, vec!["Alicia"]);

    let (status, _) = call(
        &app,
        Method::GET,
        "/api/users/search?username=",
        Some(&alice.token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn friend_request_lifecycle() {
    let app = app();
    let alice = register(&app, "alice").await;
    let bob = register(&app, "bob").await;

    let send = |from: &TestUser, to: &str| {
        let token = from.token.clone();
        let to = to.to_string();
        let app = app.clone();
        async move {
            call(
                &app,
                Method::POST,
                "/api/friend-requests",
                Some(&token),
                Some(json!({ "receiver_id": to })),
            )
            .await
        }
    };

    let (status, _) = send(&alice, &alice.id).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&alice, &uuid::Uuid::new_v4().to_string()).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(&alice, &bob.id).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["outcome"], "created");
    let request_id = body["request_id"].as_str().unwrap().to_string();

    let (status, _) = send(&alice, &bob.id).await;
    assert_eq!(status, StatusCode::CONFLICT);

    // Reverse request while one is pending is refused
    let (status, _) = send(&bob, &alice.id).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = call(&app, Method::GET, "/api/friend-requests", Some(&bob.token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["received"][0]["id"], request_id.as_str());
    assert_eq!(body["received"][0]["sender_username"], "alice");
    assert!(body["sent"].as_array().unwrap().is_empty());

    // Only the receiver may respond, and only with accepted/rejected
    let uri = format!("/api/friend-requests/{}", request_id);
    let (status, _) = call(&app, Method::PUT, &uri, Some(&alice.token), Some(json!({ "status": "accepted" }))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = call(&app, Method::PUT, &uri, Some(&bob.token), Some(json!({ "status": "pending" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = call(&app, Method::PUT, &uri, Some(&bob.token), Some(json!({ "status": "maybe" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = call(&app, Method::PUT, &uri, Some(&bob.token), Some(json!({ "status": "accepted" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "accepted");

    for (user, other) in [(&alice, "bob"), (&bob, "alice")] {
        let (_, body) = call(&app, Method::GET, "/api/friends", Some(&user.token), None).await;
        assert_eq!(body["friends"][0]["username"], other);
    }

    let (status, _) = send(&bob, &alice.id).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let unfriend = format!("/api/friends/{}", bob.id);
    let (status, _) = call(&app, Method::DELETE, &unfriend, Some(&alice.token), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = call(&app, Method::DELETE, &unfriend, Some(&alice.token), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, body) = call(&app, Method::GET, "/api/friends", Some(&bob.token), None).await;
    assert!(body["friends"].as_array().unwrap().is_empty());

    // After unfriending a fresh request can be sent
    let (status, body) = send(&alice, &bob.id).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_ne!(body["request_id"], request_id.as_str());
}

#[tokio::test]
async fn rejected_request_is_resent() {
    let app = app();
    let alice = register(&app, "alice").await;
    let bob = register(&app, "bob").await;

    let body = json!({ "receiver_id": bob.id });
    let (_, sent) = call(&app, Method::POST, "/api/friend-requests", Some(&alice.token), Some(body.clone())).await;
    let request_id = sent["request_id"].as_str().unwrap().to_string();

    let (status, _) = call(
        &app,
        Method::PUT,
        &format!("/api/friend-requests/{}", request_id),
        Some(&bob.token),
        Some(json!({ "status": "rejected" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, resent) = call(&app, Method::POST, "/api/friend-requests", Some(&alice.token), Some(body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(resent["outcome"], "resent");
    assert_eq!(resent["request_id"], request_id.as_str());

    let (_, listing) = call(&app, Method::GET, "/api/friend-requests", Some(&alice.token), None).await;
    let sent = listing["sent"].as_array().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0]["status"], "pending");
}

#[tokio::test]
async fn groups_and_messages() {
    let app = app();
    let alice = register(&app, "alice").await;
    let bob = register(&app, "bob").await;
    let carol = register(&app, "carol").await;
    befriend(&app, &alice, &bob).await;

    let (status, _) = call(&app, Method::POST, "/api/groups", Some(&alice.token), Some(json!({ "name": "   " }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, group) = call(
        &app,
        Method::POST,
        "/api/groups",
        Some(&alice.token),
        Some(json!({ "name": "  Climbing ", "description": "weekend trips" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(group["name"], "Climbing");
    let group_id = group["id"].as_str().unwrap().to_string();
    let base = format!("/api/groups/{}", group_id);

    let (status, report) = call(
        &app,
        Method::POST,
        &format!("{}/invite", base),
        Some(&alice.token),
        Some(json!({ "friend_ids": [bob.id, carol.id] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["added_friends"], json!([bob.id]));
    assert_eq!(report["errors"].as_array().unwrap().len(), 1);

    let (status, _) = call(
        &app,
        Method::POST,
        &format!("{}/invite", base),
        Some(&alice.token),
        Some(json!({ "friend_ids": [] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, detail) = call(&app, Method::GET, &base, Some(&bob.token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["member_count"], 2);
    assert_eq!(detail["user_role"], "member");
    assert_eq!(detail["members"][0]["username"], "alice");
    assert_eq!(detail["members"][0]["role"], "admin");

    let (status, _) = call(&app, Method::GET, &base, Some(&carol.token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let missing = format!("/api/groups/{}", uuid::Uuid::new_v4());
    let (status, _) = call(&app, Method::GET, &missing, Some(&alice.token), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let messages = format!("{}/messages", base);
    for i in 0..5 {
        let (status, msg) = call(
            &app,
            Method::POST,
            &messages,
            Some(&bob.token),
            Some(json!({ "content": format!("m{}", i) })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(msg["sender_name"], "bob");
        assert_eq!(msg["message_type"], "text");
    }

    let (status, _) = call(&app, Method::POST, &messages, Some(&bob.token), Some(json!({ "content": "" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = call(&app, Method::POST, &messages, Some(&carol.token), Some(json!({ "content": "hi" }))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = call(&app, Method::GET, &messages, Some(&carol.token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, page) = call(&app, Method::GET, &format!("{}?limit=2", messages), Some(&alice.token), None).await;
    assert_eq!(status, StatusCode::OK);
    let page = page["messages"].as_array().unwrap().clone();
    assert_eq!(page.len(), 2);
    assert_eq!(page[0]["content"], "m3");
    assert_eq!(page[1]["content"], "m4");

    let cursor = page[0]["id"].as_i64().unwrap();
    let (_, older) = call(
        &app,
        Method::GET,
        &format!("{}?limit=10&before={}", messages, cursor),
        Some(&alice.token),
        None,
    )
    .await;
    let contents: Vec<&str> = older["messages"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["content"].as_str().unwrap())
        .collect();
    assert_eq!(contents, vec!["m0", "m1", "m2"]);

    let (status, mine) = call(&app, Method::GET, "/api/groups/my", Some(&bob.token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(mine["groups"][0]["id"], group_id.as_str());
    assert_eq!(mine["groups"][0]["role"], "member");
    assert_eq!(mine["groups"][0]["member_count"], 2);

    let (_, none) = call(&app, Method::GET, "/api/groups/my", Some(&carol.token), None).await;
    assert!(none["groups"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn malformed_invite_id_is_reported_per_target() {
    let app = app();
    let alice = register(&app, "alice").await;
    let bob = register(&app, "bob").await;
    befriend(&app, &alice, &bob).await;

    let (_, group) = call(&app, Method::POST, "/api/groups", Some(&alice.token), Some(json!({ "name": "crew" }))).await;
    let uri = format!("/api/groups/{}/invite", group["id"].as_str().unwrap());

    let (status, report) = call(
        &app,
        Method::POST,
        &uri,
        Some(&alice.token),
        Some(json!({ "friend_ids": [bob.id, "not-an-id"] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["added_friends"], json!([bob.id]));
    let errors = report["errors"].as_array().unwrap();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].as_str().unwrap().contains("not-an-id"));
}

#[tokio::test]
async fn malformed_input_is_a_bad_request_with_a_message() {
    let app = app();
    let alice = register(&app, "alice").await;
    let (_, group) = call(&app, Method::POST, "/api/groups", Some(&alice.token), Some(json!({ "name": "crew" }))).await;
    let messages = format!("/api/groups/{}/messages", group["id"].as_str().unwrap());

    let cases = [
        (Method::POST, messages.clone(), Some(json!({ "message_type": "text" }))),
        (Method::GET, format!("{}?before=yesterday", messages), None),
        (Method::GET, "/api/groups/not-a-uuid".to_string(), None),
        (Method::POST, "/api/friend-requests".to_string(), Some(json!({ "receiver_id": 42 }))),
        (Method::POST, "/api/register".to_string(), Some(json!({ "username": "carol" }))),
    ];
    for (method, uri, body) in cases {
        let (status, body) = call(&app, method, &uri, Some(&alice.token), body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", uri);
        assert!(body["message"].is_string(), "{} -> {}", uri, body);
    }
}
