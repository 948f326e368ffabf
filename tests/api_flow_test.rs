//! End-to-end tests against the assembled router: the signup → post → like →
//! feed flow, plus the concurrency guarantees the storage layer has to hold.

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use ripple::config::Config;
use ripple::db;
use ripple::routes;
use ripple::state::AppState;

fn test_app() -> (Router, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test.db");
    let pool = db::create_pool(&db_path).expect("Failed to create test database");
    db::run_migrations(&pool).expect("Failed to run migrations");

    let mut config = Config::default();
    config.database.path = Some(db_path);
    config.storage.path = Some(temp_dir.path().join("uploads"));

    let state = AppState { db: pool, config };

    let app = Router::new()
        .merge(routes::auth::router())
        .merge(routes::users::router())
        .merge(routes::posts::router())
        .merge(routes::media::router())
        .with_state(state);

    (app, temp_dir)
}

async fn send_json(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Value,
) -> (StatusCode, Value) {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(t) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", t));
    }
    let request = builder.body(Body::from(body.to_string())).unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn get_json(app: &Router, uri: &str) -> (StatusCode, Value) {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = serde_json::from_slice(&bytes).unwrap();
    (status, value)
}

async fn signup(app: &Router, name: &str, email: &str, password: &str) -> (StatusCode, Value) {
    send_json(
        app,
        "POST",
        "/auth/signup",
        None,
        json!({ "name": name, "email": email, "password": password }),
    )
    .await
}

async fn login(app: &Router, email: &str, password: &str) -> (StatusCode, Value) {
    send_json(
        app,
        "POST",
        "/auth/login",
        None,
        json!({ "email": email, "password": password }),
    )
    .await
}

#[tokio::test(flavor = "multi_thread")]
async fn alice_scenario() {
    let (app, _tmp) = test_app();

    // Register Alice
    let (status, created) = signup(&app, "Alice", "a@x.com", "secret1").await;
    assert_eq!(status, StatusCode::OK);
    let alice_id = created["id"].as_str().unwrap().to_string();

    // Login returns the same id plus a session token
    let (status, session) = login(&app, "a@x.com", "secret1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(session["user"]["id"].as_str().unwrap(), alice_id);
    let token = session["token"].as_str().unwrap().to_string();

    // Create a post
    let (status, post) = send_json(
        &app,
        "POST",
        "/posts",
        Some(&token),
        json!({ "content": "hello" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let post_id = post["postId"].as_str().unwrap().to_string();

    // Like it three times concurrently
    let mut handles = Vec::new();
    for _ in 0..3 {
        let app = app.clone();
        let uri = format!("/posts/{}/like", post_id);
        handles.push(tokio::spawn(async move {
            let request = Request::builder()
                .method("POST")
                .uri(uri)
                .body(Body::empty())
                .unwrap();
            app.oneshot(request).await.unwrap().status()
        }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap(), StatusCode::OK);
    }

    // The feed leads with Alice's post, enriched and counted
    let (status, feed) = get_json(&app, "/feed").await;
    assert_eq!(status, StatusCode::OK);
    let first = &feed.as_array().unwrap()[0];
    assert_eq!(first["content"].as_str().unwrap(), "hello");
    assert_eq!(first["userName"].as_str().unwrap(), "Alice");
    assert_eq!(first["likes"].as_i64().unwrap(), 3);
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_likes_lose_no_updates() {
    let (app, _tmp) = test_app();

    let (_, _) = signup(&app, "Alice", "a@x.com", "secret1").await;
    let (_, session) = login(&app, "a@x.com", "secret1").await;
    let token = session["token"].as_str().unwrap().to_string();

    let (_, post) = send_json(
        &app,
        "POST",
        "/posts",
        Some(&token),
        json!({ "content": "count me" }),
    )
    .await;
    let post_id = post["postId"].as_str().unwrap().to_string();

    let n = 20;
    let mut handles = Vec::new();
    for _ in 0..n {
        let app = app.clone();
        let uri = format!("/posts/{}/like", post_id);
        handles.push(tokio::spawn(async move {
            let request = Request::builder()
                .method("POST")
                .uri(uri)
                .body(Body::empty())
                .unwrap();
            app.oneshot(request).await.unwrap().status()
        }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap(), StatusCode::OK);
    }

    let (_, feed) = get_json(&app, "/feed").await;
    assert_eq!(feed.as_array().unwrap()[0]["likes"].as_i64().unwrap(), n);
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_signups_have_one_winner() {
    let (app, _tmp) = test_app();

    let n = 8;
    let mut handles = Vec::new();
    for i in 0..n {
        let app = app.clone();
        handles.push(tokio::spawn(async move {
            let body = json!({
                "name": format!("Racer {}", i),
                "email": "race@x.com",
                "password": "pw",
            });
            let request = Request::builder()
                .method("POST")
                .uri("/auth/signup")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap();
            app.oneshot(request).await.unwrap().status()
        }));
    }

    let mut winners = 0;
    let mut conflicts = 0;
    for handle in handles {
        match handle.await.unwrap() {
            StatusCode::OK => winners += 1,
            StatusCode::CONFLICT => conflicts += 1,
            other => panic!("unexpected status: {}", other),
        }
    }
    assert_eq!(winners, 1);
    assert_eq!(conflicts, n - 1);
}

#[tokio::test]
async fn post_creation_requires_session() {
    let (app, _tmp) = test_app();

    let (status, _) = send_json(&app, "POST", "/posts", None, json!({ "content": "hi" })).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send_json(
        &app,
        "POST",
        "/posts",
        Some("bogus-token"),
        json!({ "content": "hi" }),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn logout_invalidates_the_session() {
    let (app, _tmp) = test_app();

    signup(&app, "Alice", "a@x.com", "secret1").await;
    let (_, session) = login(&app, "a@x.com", "secret1").await;
    let token = session["token"].as_str().unwrap().to_string();

    let (status, _) = send_json(&app, "POST", "/auth/logout", Some(&token), json!({})).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send_json(
        &app,
        "POST",
        "/posts",
        Some(&token),
        json!({ "content": "too late" }),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn empty_post_is_rejected_with_400() {
    let (app, _tmp) = test_app();

    signup(&app, "Alice", "a@x.com", "secret1").await;
    let (_, session) = login(&app, "a@x.com", "secret1").await;
    let token = session["token"].as_str().unwrap().to_string();

    let (status, body) = send_json(
        &app,
        "POST",
        "/posts",
        Some(&token),
        json!({ "content": "   " }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("text or an image"));
}

#[tokio::test]
async fn media_upload_round_trip_over_http() {
    let (app, _tmp) = test_app();

    // Issue an upload target
    let (status, target) = send_json(&app, "POST", "/media/uploads", None, json!({})).await;
    assert_eq!(status, StatusCode::OK);
    let storage_id = target["storageId"].as_str().unwrap().to_string();
    let upload_url = target["uploadUrl"].as_str().unwrap().to_string();

    // PUT the bytes
    let payload: &[u8] = b"raw image bytes";
    let request = Request::builder()
        .method("PUT")
        .uri(upload_url)
        .header(header::CONTENT_TYPE, "image/jpeg")
        .body(Body::from(payload.to_vec()))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Resolve and fetch
    let (status, url) = get_json(&app, &format!("/media/{}/url", storage_id)).await;
    assert_eq!(status, StatusCode::OK);
    let url = url.as_str().unwrap().to_string();

    let request = Request::builder().uri(url).body(Body::empty()).unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "image/jpeg"
    );
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&bytes[..], payload);
}

#[tokio::test]
async fn missing_user_resolves_to_null_body() {
    let (app, _tmp) = test_app();
    let (status, body) = get_json(&app, "/users/no-such-user").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.is_null());
}
