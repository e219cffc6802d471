//! Health check endpoint

use std::net::TcpListener;
use std::sync::Arc;

use member_auth::auth::{
    AuthService, InMemoryMemberStore, InMemorySessionStore, PasswordHasher, TokenCodec,
};
use member_auth::clock::SystemClock;
use member_auth::configuration::JwtSettings;
use member_auth::startup::run;

fn spawn_app() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();

    let clock = Arc::new(SystemClock);
    let jwt = JwtSettings {
        secret: "health-check-test-secret-key-32-bytes!!".to_string(),
        issuer: "member-auth-test".to_string(),
        access_token_expiry_minutes: 15,
        refresh_token_expiry_days: 14,
    };
    let service = AuthService::new(
        Arc::new(InMemoryMemberStore::new()),
        Arc::new(InMemorySessionStore::new()),
        TokenCodec::new(&jwt, clock.clone()).expect("Failed to build codec"),
        PasswordHasher::new(4).expect("Failed to build hasher"),
        clock,
    );

    let server = run(listener, service).expect("Failed to create server");
    let _ = tokio::spawn(async move {
        let _ = server.await;
    });

    format!("http://127.0.0.1:{}", port)
}

#[tokio::test]
async fn health_check_works() {
    let addr = spawn_app();

    let response = reqwest::Client::new()
        .get(&format!("{}/health_check", addr))
        .send()
        .await
        .expect("Failed to execute request");

    assert!(response.status().is_success());
    assert_eq!(Some(0), response.content_length());
}

#[tokio::test]
async fn unknown_route_is_404() {
    let addr = spawn_app();

    let response = reqwest::Client::new()
        .get(&format!("{}/auth/unknown", addr))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(404, response.status().as_u16());
}
