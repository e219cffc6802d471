//! HTTP tests for the /auth endpoints
//!
//! Each test spawns the server on a random port, backed by the in-process
//! stores, and drives it with reqwest.

use std::net::TcpListener;
use std::sync::Arc;

use chrono::Utc;
use member_auth::auth::{
    AuthService, InMemoryMemberStore, InMemorySessionStore, MemberStatus, PasswordHasher,
    SessionStore, TokenCodec,
};
use member_auth::clock::SystemClock;
use member_auth::configuration::JwtSettings;
use member_auth::startup::run;
use member_auth::telemetry::try_init_telemetry;
use serde_json::{json, Value};

pub struct TestApp {
    pub address: String,
    pub members: Arc<InMemoryMemberStore>,
    pub sessions: Arc<InMemorySessionStore>,
    pub client: reqwest::Client,
}

impl TestApp {
    async fn post(&self, path: &str, body: &Value) -> reqwest::Response {
        self.client
            .post(&format!("{}{}", &self.address, path))
            .json(body)
            .send()
            .await
            .expect("Failed to execute request.")
    }

    async fn sign_up(&self, username: &str) -> i64 {
        let response = self
            .post(
                "/auth/sign-up",
                &json!({
                    "username": username,
                    "password": "Passw0rd!",
                    "memberName": "Kim",
                    "phoneNumber": "010-1111-2222"
                }),
            )
            .await;
        assert_eq!(200, response.status().as_u16());
        let body: Value = response.json().await.unwrap();
        body["memberId"].as_i64().expect("memberId missing")
    }

    async fn sign_in(&self, username: &str, password: &str) -> reqwest::Response {
        self.post(
            "/auth/sign-in",
            &json!({ "username": username, "password": password }),
        )
        .await
    }

    async fn sign_in_tokens(&self, username: &str) -> Value {
        let response = self.sign_in(username, "Passw0rd!").await;
        assert_eq!(200, response.status().as_u16());
        response.json().await.unwrap()
    }
}

fn spawn_app() -> TestApp {
    try_init_telemetry();

    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    let clock = Arc::new(SystemClock);
    let members = Arc::new(InMemoryMemberStore::new());
    let sessions = Arc::new(InMemorySessionStore::new());
    let jwt = JwtSettings {
        secret: "http-integration-test-secret-key-32-bytes".to_string(),
        issuer: "member-auth-test".to_string(),
        access_token_expiry_minutes: 15,
        refresh_token_expiry_days: 14,
    };
    let service = AuthService::new(
        members.clone(),
        sessions.clone(),
        TokenCodec::new(&jwt, clock.clone()).expect("Failed to build codec"),
        PasswordHasher::new(4).expect("Failed to build hasher"),
        clock,
    );

    let server = run(listener, service).expect("Failed to bind address");
    let _ = tokio::spawn(server);

    TestApp {
        address,
        members,
        sessions,
        client: reqwest::Client::new(),
    }
}

async fn error_code(response: reqwest::Response) -> String {
    let body: Value = response.json().await.expect("error body is not JSON");
    body["code"].as_str().unwrap_or_default().to_string()
}

// --- Sign-up ---

#[tokio::test]
async fn sign_up_returns_200_and_member_id() {
    let app = spawn_app();

    let member_id = app.sign_up("stud01").await;

    assert!(member_id > 0);
}

#[tokio::test]
async fn sign_up_returns_409_for_duplicate_username() {
    let app = spawn_app();
    app.sign_up("stud01").await;

    let response = app
        .post(
            "/auth/sign-up",
            &json!({
                "username": "stud01",
                "password": "Passw0rd!",
                "memberName": "Lee",
                "phoneNumber": "010-3333-4444"
            }),
        )
        .await;

    assert_eq!(409, response.status().as_u16());
    assert_eq!(error_code(response).await, "MEMBER_USERNAME_DUPLICATE");
}

#[tokio::test]
async fn sign_up_returns_400_for_invalid_input() {
    let app = spawn_app();
    let test_cases = vec![
        (
            json!({"username": "ab", "password": "Passw0rd!", "memberName": "Kim", "phoneNumber": "010-1111-2222"}),
            "username too short",
        ),
        (
            json!({"username": "stud01", "password": "password", "memberName": "Kim", "phoneNumber": "010-1111-2222"}),
            "weak password",
        ),
        (
            json!({"username": "stud01", "password": "Passw0rd!", "memberName": "K", "phoneNumber": "010-1111-2222"}),
            "member name too short",
        ),
        (
            json!({"username": "stud01", "password": "Passw0rd!", "memberName": "Kim", "phoneNumber": "02-111-2222"}),
            "bad phone number",
        ),
        (
            json!({"username": "stud01", "password": "Passw0rd!", "memberName": "Kim", "phoneNumber": "010-1111-2222", "emailAddress": "not-an-email"}),
            "bad email",
        ),
    ];

    for (body, description) in test_cases {
        let response = app.post("/auth/sign-up", &body).await;

        assert_eq!(
            400,
            response.status().as_u16(),
            "The API did not fail with 400 when the payload was {}.",
            description
        );
        assert_eq!(error_code(response).await, "VALIDATION_ERROR");
    }
}

// --- Sign-in ---

#[tokio::test]
async fn sign_in_returns_token_pair() {
    let app = spawn_app();
    let member_id = app.sign_up("stud01").await;

    let body = app.sign_in_tokens("stud01").await;

    assert!(body["accessToken"].is_string());
    assert!(body["refreshToken"].is_string());
    assert_eq!(body["expiresIn"], 900);
    assert_eq!(body["member"]["id"], member_id);
    assert_eq!(body["member"]["username"], "stud01");
    assert_eq!(body["member"]["memberName"], "Kim");
    assert_eq!(body["member"]["role"], "USER");
}

#[tokio::test]
async fn sign_in_returns_401_for_wrong_password_and_unknown_user() {
    let app = spawn_app();
    app.sign_up("stud01").await;

    let wrong_password = app.sign_in("stud01", "Wr0ngPass!").await;
    let unknown_user = app.sign_in("nobody", "Passw0rd!").await;

    assert_eq!(401, wrong_password.status().as_u16());
    assert_eq!(401, unknown_user.status().as_u16());
    assert_eq!(error_code(wrong_password).await, "AUTH_INVALID_CREDENTIALS");
    assert_eq!(error_code(unknown_user).await, "AUTH_INVALID_CREDENTIALS");
}

#[tokio::test]
async fn sign_in_returns_423_for_suspended_member() {
    let app = spawn_app();
    let member_id = app.sign_up("stud01").await;
    app.members
        .set_status(member_id, MemberStatus::Suspended)
        .unwrap();

    let response = app.sign_in("stud01", "Passw0rd!").await;

    assert_eq!(423, response.status().as_u16());
    assert_eq!(error_code(response).await, "AUTH_ACCOUNT_SUSPENDED");
    assert!(app.sessions.is_empty());
}

#[tokio::test]
async fn sign_in_records_forwarded_client_address() {
    let app = spawn_app();
    app.sign_up("stud01").await;

    let response = app
        .client
        .post(&format!("{}/auth/sign-in", &app.address))
        .header("User-Agent", "member-app/1.0")
        .header("X-Forwarded-For", "203.0.113.9, 10.0.0.1")
        .json(&json!({"username": "stud01", "password": "Passw0rd!"}))
        .send()
        .await
        .expect("Failed to execute request.");
    assert_eq!(200, response.status().as_u16());
    let body: Value = response.json().await.unwrap();

    let record = app
        .sessions
        .find_valid(body["refreshToken"].as_str().unwrap(), Utc::now())
        .await
        .unwrap()
        .expect("refresh token row missing");
    assert_eq!(record.ip_address.as_deref(), Some("203.0.113.9"));
    assert_eq!(record.user_agent.as_deref(), Some("member-app/1.0"));
}

#[tokio::test]
async fn sign_in_ignores_oversized_forwarded_header() {
    let app = spawn_app();
    app.sign_up("stud01").await;

    let response = app
        .client
        .post(&format!("{}/auth/sign-in", &app.address))
        .header("X-Forwarded-For", "a".repeat(200))
        .header("X-Real-IP", "b".repeat(200))
        .json(&json!({"username": "stud01", "password": "Passw0rd!"}))
        .send()
        .await
        .expect("Failed to execute request.");
    assert_eq!(200, response.status().as_u16());
    let body: Value = response.json().await.unwrap();

    let record = app
        .sessions
        .find_valid(body["refreshToken"].as_str().unwrap(), Utc::now())
        .await
        .unwrap()
        .expect("refresh token row missing");
    assert_eq!(record.ip_address.as_deref(), Some("127.0.0.1"));
}

// --- Refresh ---

#[tokio::test]
async fn refresh_rotates_and_rejects_reuse() {
    let app = spawn_app();
    app.sign_up("stud01").await;
    let tokens = app.sign_in_tokens("stud01").await;

    let response = app
        .post(
            "/auth/refresh",
            &json!({ "refreshToken": tokens["refreshToken"] }),
        )
        .await;
    assert_eq!(200, response.status().as_u16());
    let rotated: Value = response.json().await.unwrap();
    assert_ne!(rotated["refreshToken"], tokens["refreshToken"]);

    let replay = app
        .post(
            "/auth/refresh",
            &json!({ "refreshToken": tokens["refreshToken"] }),
        )
        .await;
    assert_eq!(401, replay.status().as_u16());
    assert_eq!(error_code(replay).await, "AUTH_REFRESH_TOKEN_NOT_FOUND");
}

#[tokio::test]
async fn refresh_returns_401_for_unknown_token() {
    let app = spawn_app();

    let response = app
        .post("/auth/refresh", &json!({ "refreshToken": "garbage" }))
        .await;

    assert_eq!(401, response.status().as_u16());
}

// --- Sign-out ---

#[tokio::test]
async fn sign_out_is_idempotent() {
    let app = spawn_app();
    app.sign_up("stud01").await;
    let tokens = app.sign_in_tokens("stud01").await;
    let body = json!({ "refreshToken": tokens["refreshToken"] });

    let first = app.post("/auth/sign-out", &body).await;
    let second = app.post("/auth/sign-out", &body).await;

    assert_eq!(200, first.status().as_u16());
    assert_eq!(200, second.status().as_u16());

    let refresh = app.post("/auth/refresh", &body).await;
    assert_eq!(401, refresh.status().as_u16());
}

// --- Protected routes ---

#[tokio::test]
async fn change_password_requires_access_token() {
    let app = spawn_app();

    let response = app
        .post(
            "/auth/change-password",
            &json!({"currentPassword": "Passw0rd!", "newPassword": "N3wPassw0rd!"}),
        )
        .await;

    assert_eq!(401, response.status().as_u16());
    assert_eq!(error_code(response).await, "AUTH_REQUIRED");
}

#[tokio::test]
async fn change_password_revokes_refresh_tokens() {
    let app = spawn_app();
    app.sign_up("stud01").await;
    let tokens = app.sign_in_tokens("stud01").await;

    let response = app
        .client
        .post(&format!("{}/auth/change-password", &app.address))
        .bearer_auth(tokens["accessToken"].as_str().unwrap())
        .json(&json!({"currentPassword": "Passw0rd!", "newPassword": "N3wPassw0rd!"}))
        .send()
        .await
        .expect("Failed to execute request.");
    assert_eq!(200, response.status().as_u16());

    let refresh = app
        .post(
            "/auth/refresh",
            &json!({ "refreshToken": tokens["refreshToken"] }),
        )
        .await;
    assert_eq!(401, refresh.status().as_u16());

    let new_sign_in = app.sign_in("stud01", "N3wPassw0rd!").await;
    assert_eq!(200, new_sign_in.status().as_u16());
}

#[tokio::test]
async fn change_password_rejects_same_password() {
    let app = spawn_app();
    app.sign_up("stud01").await;
    let tokens = app.sign_in_tokens("stud01").await;

    let response = app
        .client
        .post(&format!("{}/auth/change-password", &app.address))
        .bearer_auth(tokens["accessToken"].as_str().unwrap())
        .json(&json!({"currentPassword": "Passw0rd!", "newPassword": "Passw0rd!"}))
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(400, response.status().as_u16());
    assert_eq!(error_code(response).await, "MEMBER_SAME_PASSWORD");
}

#[tokio::test]
async fn me_returns_profile() {
    let app = spawn_app();
    let member_id = app.sign_up("stud01").await;
    let tokens = app.sign_in_tokens("stud01").await;

    let response = app
        .client
        .get(&format!("{}/auth/me", &app.address))
        .bearer_auth(tokens["accessToken"].as_str().unwrap())
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(200, response.status().as_u16());
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["id"], member_id);
    assert_eq!(body["username"], "stud01");
    assert_eq!(body["phoneNumber"], "010-1111-2222");
    assert_eq!(body["status"], "ACTIVE");
    assert!(body["lastLoginAt"].is_string());
}

#[tokio::test]
async fn refresh_token_is_not_accepted_as_bearer() {
    let app = spawn_app();
    app.sign_up("stud01").await;
    let tokens = app.sign_in_tokens("stud01").await;

    let response = app
        .client
        .get(&format!("{}/auth/me", &app.address))
        .bearer_auth(tokens["refreshToken"].as_str().unwrap())
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(401, response.status().as_u16());
    assert_eq!(error_code(response).await, "AUTH_INVALID_TOKEN");
}
