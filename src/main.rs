use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;

use member_auth::auth::{
    spawn_session_sweeper, AuthService, PasswordHasher, PgMemberStore, PgSessionStore,
    SessionStore, TokenCodec,
};
use member_auth::clock::{Clock, SystemClock};
use member_auth::configuration::get_configuration;
use member_auth::startup::run;
use member_auth::telemetry::init_telemetry;
use sqlx::postgres::PgPoolOptions;

fn startup_error(kind: std::io::ErrorKind, message: &str) -> std::io::Error {
    std::io::Error::new(kind, message.to_string())
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    init_telemetry();

    tracing::info!("Starting application");

    let configuration = match get_configuration() {
        Ok(config) => {
            tracing::info!("Configuration loaded successfully");
            config
        }
        Err(e) => {
            tracing::error!("Failed to read configuration: {}", e);
            return Err(startup_error(
                std::io::ErrorKind::InvalidInput,
                "Configuration error",
            ));
        }
    };

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let tokens = TokenCodec::new(&configuration.jwt, clock.clone()).map_err(|e| {
        tracing::error!("Invalid JWT configuration: {}", e);
        startup_error(std::io::ErrorKind::InvalidInput, "JWT configuration error")
    })?;

    let hasher = PasswordHasher::new(configuration.auth.hash_cost).map_err(|e| {
        tracing::error!("Invalid password hashing configuration: {}", e);
        startup_error(std::io::ErrorKind::InvalidInput, "Auth configuration error")
    })?;

    tracing::info!("Attempting to connect to database");
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(5))
        .connect(&configuration.database.connection_string())
        .await
        .map_err(|e| {
            tracing::error!("Failed to create connection pool: {}", e);
            startup_error(
                std::io::ErrorKind::ConnectionRefused,
                "Database connection error",
            )
        })?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to run migrations: {}", e);
            startup_error(std::io::ErrorKind::Other, "Database migration error")
        })?;

    tracing::info!("Database connection pool created successfully");

    let sessions: Arc<dyn SessionStore> = Arc::new(PgSessionStore::new(pool.clone()));
    let members = Arc::new(PgMemberStore::new(pool));

    let _sweeper = spawn_session_sweeper(
        sessions.clone(),
        clock.clone(),
        Duration::from_secs(configuration.auth.sweep_interval_seconds.max(1)),
    );

    let service = AuthService::new(members, sessions, tokens, hasher, clock);

    let address = format!(
        "{}:{}",
        configuration.application.host, configuration.application.port
    );
    let listener = TcpListener::bind(&address)?;
    tracing::info!("Server listening on: {}", address);

    let server = run(listener, service)?;
    tracing::info!("Server started successfully");

    server.await
}
