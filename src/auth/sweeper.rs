/// Expired session cleanup
///
/// Periodically deletes refresh-token rows past their expiry. Runs on its own
/// task, never on the request path.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::auth::refresh_token::SessionStore;
use crate::clock::Clock;
use crate::error::AppError;

/// Run one sweep and return the number of deleted rows
pub async fn sweep_once(store: &dyn SessionStore, clock: &dyn Clock) -> Result<u64, AppError> {
    let deleted = store.sweep_expired(clock.now()).await?;
    if deleted > 0 {
        tracing::info!(deleted = deleted, "Expired refresh tokens swept");
    } else {
        tracing::debug!("Session sweep found nothing to delete");
    }
    Ok(deleted)
}

/// Spawn the periodic sweep; the first run happens immediately
///
/// Failures are logged and the loop keeps going.
pub fn spawn_session_sweeper(
    store: Arc<dyn SessionStore>,
    clock: Arc<dyn Clock>,
    every: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!(interval_secs = every.as_secs(), "Session sweeper started");
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            if let Err(e) = sweep_once(store.as_ref(), clock.as_ref()).await {
                tracing::error!(error = %e, "Session sweep failed");
            }
        }
    })
}
