//! Integration tests for the REST surface
//!
//! Requests go through the full router with `tower::ServiceExt::oneshot`.

mod helpers;

use axum::body::Body;
use axum::http::StatusCode;
use http::{Method, Request};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::time::Duration;
use tower::ServiceExt;

use helpers::{drain, playback_states, TestTeam};
use teamplay_sync::api::{create_router, AppContext};

fn router(t: &TestTeam) -> axum::Router {
    create_router(AppContext {
        engine: t.engine.clone(),
        hub: t.hub.clone(),
        sse_keep_alive: Duration::from_secs(15),
    })
}

async fn make_request(
    app: &axum::Router,
    method: Method,
    path: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(path);
    let body = match body {
        Some(json_body) => {
            request = request.header("content-type", "application/json");
            Body::from(json_body.to_string())
        }
        None => Body::empty(),
    };

    let response = app
        .clone()
        .oneshot(request.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

#[tokio::test]
async fn test_health_endpoint() {
    let t = TestTeam::abc();
    let app = router(&t);

    let (status, body) = make_request(&app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["module"], "teamplay-sync");
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn test_state_uses_wire_field_names() {
    let t = TestTeam::abc();
    let app = router(&t);

    let (status, body) =
        make_request(&app, Method::GET, &format!("/teams/{}/state", t.team), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["teamId"], t.team.to_string());
    assert_eq!(body["currentSongIndex"], 0);
    assert_eq!(body["isPlaying"], false);
    assert_eq!(body["startedAtUtc"], Value::Null);
    assert_eq!(body["elapsedSeconds"], 0.0);
    assert_eq!(body["queueLength"], 3);
    assert_eq!(body["currentSong"]["title"], "A");
}

#[tokio::test]
async fn test_play_broadcasts_to_channel_members() {
    let t = TestTeam::abc();
    let app = router(&t);
    let (_alice, mut alice_rx) = t.member().await;

    let (status, body) =
        make_request(&app, Method::POST, &format!("/teams/{}/play", t.team), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["isPlaying"], true);
    assert!(body["startedAtUtc"].is_string());

    let states = playback_states(&drain(&mut alice_rx));
    assert_eq!(states.len(), 1);
    assert!(states[0].is_playing);
}

#[tokio::test]
async fn test_pause_next_previous() {
    let t = TestTeam::abc();
    let app = router(&t);
    let base = format!("/teams/{}", t.team);

    make_request(&app, Method::POST, &format!("{base}/play"), None).await;
    t.clock.advance_secs(4.0);

    let (_, body) = make_request(&app, Method::POST, &format!("{base}/pause"), None).await;
    assert_eq!(body["elapsedSeconds"], 4.0);

    let (_, body) = make_request(&app, Method::POST, &format!("{base}/next"), None).await;
    assert_eq!(body["currentSongIndex"], 1);
    assert_eq!(body["elapsedSeconds"], 0.0);

    let (_, body) = make_request(&app, Method::POST, &format!("{base}/previous"), None).await;
    assert_eq!(body["currentSongIndex"], 0);
}

#[tokio::test]
async fn test_jump_in_and_out_of_range() {
    let t = TestTeam::abc();
    let app = router(&t);
    let path = format!("/teams/{}/jump", t.team);

    let (status, body) = make_request(&app, Method::POST, &path, Some(json!({ "index": 2 }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["currentSongIndex"], 2);

    let (status, body) = make_request(&app, Method::POST, &path, Some(json!({ "index": 5 }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "index_out_of_range");

    let (_, body) =
        make_request(&app, Method::GET, &format!("/teams/{}/state", t.team), None).await;
    assert_eq!(body["currentSongIndex"], 2);
}

#[tokio::test]
async fn test_unknown_and_malformed_team_ids() {
    let t = TestTeam::abc();
    let app = router(&t);

    let (status, body) = make_request(
        &app,
        Method::POST,
        &format!("/teams/{}/play", teamplay_common::TeamId::new()),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "team_not_found");

    let (status, body) = make_request(&app, Method::POST, "/teams/not-a-uuid/play", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "malformed_command");
}

#[tokio::test]
async fn test_refresh_store_failure_is_service_unavailable() {
    let t = TestTeam::abc();
    let app = router(&t);
    let base = format!("/teams/{}", t.team);
    make_request(&app, Method::GET, &format!("{base}/state"), None).await;

    t.store.set_fail_reads(true);
    let (status, body) = make_request(&app, Method::POST, &format!("{base}/refresh"), None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["code"], "store_unavailable");

    t.store.set_fail_reads(false);
    let (status, _) = make_request(&app, Method::POST, &format!("{base}/refresh"), None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_queue_and_delete_team() {
    let t = TestTeam::abc();
    let app = router(&t);
    let base = format!("/teams/{}", t.team);

    let (status, body) = make_request(&app, Method::GET, &format!("{base}/queue"), None).await;
    assert_eq!(status, StatusCode::OK);
    let titles: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["title"].as_str().unwrap())
        .collect();
    assert_eq!(titles, vec!["A", "B", "C"]);

    let (status, body) = make_request(&app, Method::DELETE, &base, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["removed"], true);

    let (_, body) = make_request(&app, Method::DELETE, &base, None).await;
    assert_eq!(body["removed"], false);
}

async fn open_events(app: &axum::Router, path: &str) -> axum::response::Response {
    app.clone()
        .oneshot(Request::builder().uri(path).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

/// Next chunk of an SSE body as text; `None` once the stream has ended
async fn next_chunk(body: &mut Body) -> Option<String> {
    let frame = tokio::time::timeout(Duration::from_secs(5), body.frame())
        .await
        .expect("timed out waiting for SSE data")?
        .unwrap();
    let data = frame.into_data().unwrap();
    Some(String::from_utf8(data.to_vec()).unwrap())
}

async fn read_until(body: &mut Body, needle: &str) -> String {
    let mut text = String::new();
    while !text.contains(needle) {
        let chunk = next_chunk(body).await.expect("SSE stream ended early");
        text.push_str(&chunk);
    }
    text
}

#[tokio::test]
async fn test_events_stream_catch_up_then_team_removed() {
    let t = TestTeam::abc();
    let app = router(&t);

    let response = open_events(&app, &format!("/teams/{}/events", t.team)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "text/event-stream");
    let mut body = response.into_body();

    let catch_up = read_until(&mut body, "event: PlaybackState").await;
    let queue_at = catch_up.find("event: QueueUpdated").unwrap();
    let state_at = catch_up.find("event: PlaybackState").unwrap();
    assert!(queue_at < state_at);
    assert_eq!(t.engine.broadcaster().members(t.team).len(), 1);

    t.engine.play(t.team, None).await.unwrap();
    let played = read_until(&mut body, "event: PlaybackState").await;
    assert!(played.contains("\"isPlaying\":true"));

    assert!(t.engine.invalidate_team(t.team).await);
    let mut rest = String::new();
    while let Some(chunk) = next_chunk(&mut body).await {
        rest.push_str(&chunk);
    }
    assert!(rest.contains("event: TeamRemoved"));
    assert!(t.engine.broadcaster().members(t.team).is_empty());
    assert_eq!(t.hub.connection_count(), 0);
}

#[tokio::test]
async fn test_dropping_events_stream_leaves_channel() {
    let t = TestTeam::abc();
    let app = router(&t);
    let (_alice, mut alice_rx) = t.member().await;

    let response = open_events(&app, &format!("/teams/{}/events", t.team)).await;
    let mut body = response.into_body();
    read_until(&mut body, "event: PlaybackState").await;
    assert_eq!(t.engine.broadcaster().members(t.team).len(), 2);

    drop(body);
    assert_eq!(t.engine.broadcaster().members(t.team).len(), 1);
    assert_eq!(t.hub.connection_count(), 1);

    t.engine.play(t.team, None).await.unwrap();
    assert_eq!(playback_states(&drain(&mut alice_rx)).len(), 1);
}

#[tokio::test]
async fn test_events_for_unknown_team() {
    let t = TestTeam::abc();
    let app = router(&t);

    let response = open_events(&app, &format!("/teams/{}/events", teamplay_common::TeamId::new())).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(t.hub.connection_count(), 0);

    let response = open_events(&app, "/teams/not-a-uuid/events").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
