mod common;

use std::net::SocketAddr;
use std::time::Duration;

use axum::http::header::AUTHORIZATION;
use axum_test::TestServer;
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::TcpStream;
use tokio::time;
use tokio_tungstenite::tungstenite;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use alert_api::auth::tokens::AccessClaims;
use alert_api::models::user::UserRole;
use alert_api::AppState;

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Helper: start an actual TCP server for WebSocket testing.
async fn start_ws_server() -> (SocketAddr, AppState) {
    let state = common::test_state();
    let app = alert_api::routes::router().with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (addr, state)
}

async fn connect(addr: SocketAddr, user_id: i64, token: Option<&str>) -> Client {
    let url = match token {
        Some(token) => format!("ws://{addr}/ws/{user_id}?token={token}"),
        None => format!("ws://{addr}/ws/{user_id}"),
    };
    let (ws, _) = tokio_tungstenite::connect_async(url)
        .await
        .expect("ws connect");
    ws
}

async fn next_message(ws: &mut Client) -> tungstenite::Message {
    time::timeout(Duration::from_secs(5), ws.next())
        .await
        .expect("timeout")
        .expect("stream ended")
        .expect("read error")
}

async fn next_json(ws: &mut Client) -> serde_json::Value {
    let text = next_message(ws).await.into_text().expect("not text");
    serde_json::from_str(&text).expect("parse frame")
}

async fn expect_close(ws: &mut Client, code: u16) {
    match next_message(ws).await {
        tungstenite::Message::Close(Some(frame)) => {
            assert_eq!(frame.code, CloseCode::from(code));
        }
        other => panic!("Expected Close frame, got: {other:?}"),
    }
}

/// Poll until `cond` holds or a few seconds pass.
async fn eventually(cond: impl Fn() -> bool) {
    for _ in 0..100 {
        if cond() {
            return;
        }
        time::sleep(Duration::from_millis(20)).await;
    }
    panic!("condition not reached");
}

// ---------------------------------------------------------------------------
// Handshake rejections
// ---------------------------------------------------------------------------

#[tokio::test]
async fn missing_token_closes_4001() {
    let (addr, state) = start_ws_server().await;
    let (user, _token) = common::create_user(&state, "pupil", UserRole::Student);

    let mut ws = connect(addr, user.id, None).await;
    expect_close(&mut ws, 4001).await;
    assert_eq!(state.connections.count(), 0);
}

#[tokio::test]
async fn invalid_token_closes_4002() {
    let (addr, state) = start_ws_server().await;
    let (user, _token) = common::create_user(&state, "pupil", UserRole::Student);

    let mut ws = connect(addr, user.id, Some("not-a-jwt")).await;
    expect_close(&mut ws, 4002).await;
}

#[tokio::test]
async fn token_for_another_user_closes_4003() {
    let (addr, state) = start_ws_server().await;
    let (_pupil, pupil_token) = common::create_user(&state, "pupil", UserRole::Student);
    let (prof, _) = common::create_user(&state, "prof", UserRole::Faculty);

    let mut ws = connect(addr, prof.id, Some(&pupil_token)).await;
    expect_close(&mut ws, 4003).await;
    assert!(!state.connections.contains(prof.id));
}

#[tokio::test]
async fn unknown_user_closes_4004() {
    let (addr, state) = start_ws_server().await;
    let token = state
        .tokens
        .sign(&AccessClaims {
            user_id: 999,
            username: "ghost".into(),
            role: UserRole::Student,
            exp: (Utc::now() + chrono::Duration::minutes(5)).timestamp(),
        })
        .unwrap();

    let mut ws = connect(addr, 999, Some(&token)).await;
    expect_close(&mut ws, 4004).await;
}

#[tokio::test]
async fn deactivated_user_closes_4005() {
    let (addr, state) = start_ws_server().await;
    let (user, token) = common::create_user(&state, "pupil", UserRole::Student);
    state.db.lock().user_mut(user.id).unwrap().is_active = false;

    let mut ws = connect(addr, user.id, Some(&token)).await;
    expect_close(&mut ws, 4005).await;
    assert_eq!(state.connections.count(), 0);
}

// ---------------------------------------------------------------------------
// Active connections
// ---------------------------------------------------------------------------

#[tokio::test]
async fn text_frames_get_pong() {
    let (addr, state) = start_ws_server().await;
    let (user, token) = common::create_user(&state, "pupil", UserRole::Student);

    let mut ws = connect(addr, user.id, Some(&token)).await;
    eventually(|| state.connections.contains(user.id)).await;

    ws.send(tungstenite::Message::Text("ping".into()))
        .await
        .expect("send ping");
    let pong = next_json(&mut ws).await;
    assert_eq!(pong, json!({ "type": "pong", "message": "Connection alive" }));
}

#[tokio::test]
async fn alerts_are_delivered_by_role_over_the_socket() {
    let (addr, state) = start_ws_server().await;
    let server = TestServer::new(alert_api::routes::router().with_state(state.clone())).unwrap();

    let (_admin, admin_token) = common::create_user(&state, "dean", UserRole::CollegeAdmin);
    let (pupil, pupil_token) = common::create_user(&state, "pupil", UserRole::Student);
    let (prof, prof_token) = common::create_user(&state, "prof", UserRole::Faculty);

    let mut pupil_ws = connect(addr, pupil.id, Some(&pupil_token)).await;
    let mut prof_ws = connect(addr, prof.id, Some(&prof_token)).await;
    eventually(|| state.connections.count() == 2).await;

    let created: serde_json::Value = server
        .post("/api/alerts")
        .add_header(AUTHORIZATION, common::bearer(&admin_token))
        .json(&json!({
            "title": "Office hours moved",
            "message": "Now Tuesday",
            "priority": "info",
            "target_roles": ["faculty"],
        }))
        .await
        .json();
    let alert_id = created["id"].as_i64().unwrap();

    server
        .delete(&format!("/api/alerts/{alert_id}"))
        .add_header(AUTHORIZATION, common::bearer(&admin_token))
        .await
        .assert_status_ok();

    // Faculty sees the alert and then its deletion, in order.
    let first = next_json(&mut prof_ws).await;
    assert_eq!(first["type"], "new_alert");
    assert_eq!(first["alert"]["id"], alert_id);
    let second = next_json(&mut prof_ws).await;
    assert_eq!(second["type"], "alert_deleted");

    // The student only sees the unscoped deletion.
    let only = next_json(&mut pupil_ws).await;
    assert_eq!(only["type"], "alert_deleted");
    assert_eq!(only["alert_id"], alert_id);
}

#[tokio::test]
async fn newer_connection_replaces_older_one() {
    let (addr, state) = start_ws_server().await;
    let (user, token) = common::create_user(&state, "pupil", UserRole::Student);

    let mut first = connect(addr, user.id, Some(&token)).await;
    eventually(|| state.connections.contains(user.id)).await;
    let first_id = state.connections.snapshot().get(user.id).unwrap().connection_id;

    let mut second = connect(addr, user.id, Some(&token)).await;
    eventually(|| {
        state
            .connections
            .snapshot()
            .get(user.id)
            .is_some_and(|e| e.connection_id != first_id)
    })
    .await;

    expect_close(&mut first, 4006).await;
    drop(first);

    // The old connection's teardown must not remove the new entry.
    time::sleep(Duration::from_millis(100)).await;
    assert!(state.connections.contains(user.id));
    assert_eq!(state.connections.count(), 1);

    second
        .send(tungstenite::Message::Text("still here?".into()))
        .await
        .unwrap();
    assert_eq!(next_json(&mut second).await["type"], "pong");
}

#[tokio::test]
async fn client_close_removes_registry_entry() {
    let (addr, state) = start_ws_server().await;
    let (user, token) = common::create_user(&state, "pupil", UserRole::Student);

    let mut ws = connect(addr, user.id, Some(&token)).await;
    eventually(|| state.connections.contains(user.id)).await;

    ws.close(None).await.expect("close");
    eventually(|| !state.connections.contains(user.id)).await;
}

#[tokio::test]
async fn idle_connection_is_closed_4009() {
    let mut config = common::test_config();
    config.ws_idle_timeout_secs = 1;
    let state = AppState::new(config);
    let app = alert_api::routes::router().with_state(state.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let (user, token) = common::create_user(&state, "pupil", UserRole::Student);
    let mut ws = connect(addr, user.id, Some(&token)).await;

    expect_close(&mut ws, 4009).await;
    eventually(|| !state.connections.contains(user.id)).await;
}
