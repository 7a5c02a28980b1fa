#![allow(dead_code)]

use axum::extract::ws::Message;
use axum::Router;
use tokio::sync::mpsc;

use alert_api::auth::password::hash_password;
use alert_api::config::Config;
use alert_api::models::user::{NewUser, User, UserRole};
use alert_api::AppState;

pub const TEST_SECRET: &str = "test-secret-do-not-use-in-production";
pub const TEST_PASSWORD: &str = "correct-horse-battery";

/// Configuration for tests. Does not read the environment.
pub fn test_config() -> Config {
    Config {
        jwt_secret: TEST_SECRET.to_string(),
        port: 0,
        access_token_expire_minutes: 60,
        ws_idle_timeout_secs: 30,
        ws_queue_capacity: 16,
        admin_password: TEST_PASSWORD.to_string(),
        cors_origins: None,
    }
}

/// Fresh state: empty tables, no live connections.
pub fn test_state() -> AppState {
    AppState::new(test_config())
}

/// Build the full application [`Router`] wired to a fresh test state.
pub fn test_app() -> (Router, AppState) {
    let state = test_state();
    let app = alert_api::routes::router().with_state(state.clone());
    (app, state)
}

/// Insert an active, approved user and return it with a valid access token.
///
/// The stored hash is a placeholder; use [`create_user_with_password`] when
/// the test logs in.
pub fn create_user(state: &AppState, username: &str, role: UserRole) -> (User, String) {
    insert(state, username, role, "not-a-real-hash".to_string())
}

pub fn create_user_with_password(state: &AppState, username: &str, role: UserRole) -> User {
    let hash = hash_password(TEST_PASSWORD).expect("hash test password");
    insert(state, username, role, hash).0
}

fn insert(state: &AppState, username: &str, role: UserRole, password_hash: String) -> (User, String) {
    let user = state.db.lock().insert_user(NewUser {
        username: username.to_string(),
        email: Some(format!("{username}@campus.test")),
        password_hash,
        role,
        full_name: format!("Test {username}"),
        is_active: true,
        is_approved: true,
    });
    let token = state.tokens.issue(&user).expect("issue test token");
    (user, token)
}

pub fn bearer(token: &str) -> String {
    format!("Bearer {token}")
}

/// Register an in-process connection for `user_id` and return its receiving
/// end, so a test can observe what the dispatcher pushes.
pub fn observe(state: &AppState, user_id: i64, role: UserRole) -> mpsc::Receiver<Message> {
    let (tx, rx) = mpsc::channel(16);
    state.connections.register(user_id, role, tx);
    rx
}

/// Next queued event frame as JSON, or `None` if nothing is queued.
pub fn next_event(rx: &mut mpsc::Receiver<Message>) -> Option<serde_json::Value> {
    match rx.try_recv().ok()? {
        Message::Text(text) => Some(serde_json::from_str(text.as_str()).expect("event is JSON")),
        other => panic!("expected text frame, got {other:?}"),
    }
}
