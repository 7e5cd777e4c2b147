//! Keep a [`ConnectionManager`] in step with the session credential.

use std::sync::Arc;

use sc_domain::SessionState;
use tokio_util::sync::CancellationToken;

use crate::manager::ConnectionManager;
use crate::types::{ConnectParams, EventCallback};

/// Reconnect whenever the session's access token changes.
///
/// Runs until `shutdown` fires or the session is dropped, then disconnects.
/// A cleared token disconnects with "Not authenticated" status; a new token
/// tears the old socket down and starts a fresh attempt sequence.
pub async fn follow_session(
    manager: Arc<ConnectionManager>,
    session: Arc<SessionState>,
    endpoint: String,
    max_attempts: u32,
    on_event: Option<EventCallback>,
    shutdown: CancellationToken,
) {
    let mut tokens = session.subscribe_token();
    // Drop our strong ref so the session's lifetime is not extended.
    drop(session);

    loop {
        let token = tokens.borrow_and_update().clone();
        let params = ConnectParams {
            endpoint: endpoint.clone(),
            token,
            max_attempts,
            on_event: on_event.clone(),
        };
        manager.connect(params).await;

        tokio::select! {
            _ = shutdown.cancelled() => break,
            changed = tokens.changed() => {
                if changed.is_err() {
                    tracing::debug!("session dropped; stopping realtime follower");
                    break;
                }
                tracing::debug!("session token changed; reconnecting realtime");
            }
        }
    }

    manager.disconnect().await;
}
