mod common;

use axum::http::header::AUTHORIZATION;
use axum::http::StatusCode;
use axum_test::TestServer;
use serde_json::json;

use alert_api::models::user::UserRole;

#[tokio::test]
async fn login_returns_token_that_authenticates() {
    let (app, state) = common::test_app();
    let server = TestServer::new(app).unwrap();

    let user = common::create_user_with_password(&state, "prof", UserRole::Faculty);

    let resp = server
        .post("/api/auth/login")
        .json(&json!({ "username": "prof", "password": common::TEST_PASSWORD }))
        .await;

    resp.assert_status_ok();
    let body: serde_json::Value = resp.json();
    assert_eq!(body["token_type"], "bearer");
    assert_eq!(body["user"]["id"], user.id);
    assert_eq!(body["user"]["role"], "faculty");
    assert!(body["user"].get("password_hash").is_none());
    assert!(state.db.lock().user(user.id).unwrap().last_login_at.is_some());

    let token = body["access_token"].as_str().unwrap();
    let claims = state.tokens.decode(token).unwrap();
    assert_eq!(claims.user_id, user.id);

    server
        .get("/api/users/me")
        .add_header(AUTHORIZATION, common::bearer(token))
        .await
        .assert_status_ok();
}

#[tokio::test]
async fn login_rejects_bad_credentials() {
    let (app, state) = common::test_app();
    let server = TestServer::new(app).unwrap();

    common::create_user_with_password(&state, "prof", UserRole::Faculty);

    server
        .post("/api/auth/login")
        .json(&json!({ "username": "prof", "password": "wrong-password" }))
        .await
        .assert_status(StatusCode::UNAUTHORIZED);

    server
        .post("/api/auth/login")
        .json(&json!({ "username": "nobody", "password": common::TEST_PASSWORD }))
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn login_checks_account_state() {
    let (app, state) = common::test_app();
    let server = TestServer::new(app).unwrap();

    let inactive = common::create_user_with_password(&state, "gone", UserRole::Student);
    state.db.lock().user_mut(inactive.id).unwrap().is_active = false;

    server
        .post("/api/auth/login")
        .json(&json!({ "username": "gone", "password": common::TEST_PASSWORD }))
        .await
        .assert_status(StatusCode::UNAUTHORIZED);

    server
        .post("/api/auth/signup")
        .json(&json!({
            "username": "newcomer",
            "password": common::TEST_PASSWORD,
            "role": "student",
        }))
        .await
        .assert_status(StatusCode::CREATED);

    let resp = server
        .post("/api/auth/login")
        .json(&json!({ "username": "newcomer", "password": common::TEST_PASSWORD }))
        .await;
    resp.assert_status(StatusCode::FORBIDDEN);
    assert_eq!(resp.json::<serde_json::Value>()["error"]["code"], "FORBIDDEN");
}

#[tokio::test]
async fn deactivated_user_token_is_rejected() {
    let (app, state) = common::test_app();
    let server = TestServer::new(app).unwrap();

    let (user, token) = common::create_user(&state, "pupil", UserRole::Student);
    state.db.lock().user_mut(user.id).unwrap().is_active = false;

    server
        .get("/api/users/me")
        .add_header(AUTHORIZATION, common::bearer(&token))
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn malformed_authorization_header_is_rejected() {
    let (app, _state) = common::test_app();
    let server = TestServer::new(app).unwrap();

    let resp = server
        .get("/api/users/me")
        .add_header(AUTHORIZATION, "Token abc")
        .await;
    resp.assert_status(StatusCode::UNAUTHORIZED);
    assert_eq!(resp.json::<serde_json::Value>()["error"]["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn health_reports_active_connections() {
    let (app, state) = common::test_app();
    let server = TestServer::new(app).unwrap();

    let _a = common::observe(&state, 1, UserRole::Student);
    let _b = common::observe(&state, 2, UserRole::Faculty);

    let resp = server.get("/api/health").await;
    resp.assert_status_ok();
    resp.assert_json(&json!({ "status": "healthy", "active_connections": 2 }));
}
