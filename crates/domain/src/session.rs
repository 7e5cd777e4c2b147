//! Process-wide session state shared by the RPC and realtime channels.
//!
//! [`SessionState`] holds the current access token, the resolved user
//! profile, and the sticky "forbidden" flag.  It is the only mutable
//! resource the two channels share, and it only changes through four
//! entry points: [`authenticate`](SessionState::authenticate),
//! [`update_token`](SessionState::update_token),
//! [`set_forbidden`](SessionState::set_forbidden) and
//! [`clear`](SessionState::clear).
//!
//! Token changes are broadcast on a `watch` channel so long-lived
//! connections can re-authenticate without being called directly.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Denormalized profile of the signed-in user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
}

#[derive(Default)]
struct Inner {
    access_token: Option<String>,
    user: Option<UserIdentity>,
    is_forbidden: bool,
}

/// Point-in-time copy of the session, safe to hand to callers.
///
/// `Debug` is manually implemented to redact the token.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub access_token: Option<String>,
    pub user: Option<UserIdentity>,
    pub is_forbidden: bool,
}

impl SessionSnapshot {
    pub fn is_authenticated(&self) -> bool {
        token_present(self.access_token.as_deref())
    }
}

impl std::fmt::Debug for SessionSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionSnapshot")
            .field("access_token", &self.access_token.as_ref().map(|_| "[REDACTED]"))
            .field("user", &self.user)
            .field("is_forbidden", &self.is_forbidden)
            .finish()
    }
}

/// Thread-safe holder of the current credential and identity.
///
/// Designed to be created once and shared behind an `Arc`.
pub struct SessionState {
    inner: RwLock<Inner>,
    token_tx: watch::Sender<Option<String>>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionState {
    /// Empty, unauthenticated session.
    pub fn new() -> Self {
        let (token_tx, _) = watch::channel(None);
        Self {
            inner: RwLock::new(Inner::default()),
            token_tx,
        }
    }

    // ── Mutation entry points ────────────────────────────────────────

    /// Start a fresh session after login.  Clears any previous
    /// forbidden flag.
    pub fn authenticate(&self, token: impl Into<String>, user: Option<UserIdentity>) {
        {
            let mut inner = self.inner.write();
            inner.access_token = Some(token.into());
            inner.user = user;
            inner.is_forbidden = false;
            self.publish(&inner);
        }
        tracing::info!("session authenticated");
    }

    /// Replace the access token (e.g. after a refresh), keeping the user.
    pub fn update_token(&self, token: impl Into<String>) {
        {
            let mut inner = self.inner.write();
            inner.access_token = Some(token.into());
            self.publish(&inner);
        }
        tracing::debug!("session token rotated");
    }

    /// Set or reset the sticky authorization-denied flag.
    pub fn set_forbidden(&self, forbidden: bool) {
        self.inner.write().is_forbidden = forbidden;
        if forbidden {
            tracing::warn!("session marked forbidden");
        }
    }

    /// Drop the token, the user, and the forbidden flag.
    pub fn clear(&self) {
        {
            let mut inner = self.inner.write();
            *inner = Inner::default();
            self.publish(&inner);
        }
        tracing::info!("session cleared");
    }

    // ── Reads ────────────────────────────────────────────────────────

    pub fn access_token(&self) -> Option<String> {
        self.inner.read().access_token.clone()
    }

    pub fn user(&self) -> Option<UserIdentity> {
        self.inner.read().user.clone()
    }

    pub fn is_forbidden(&self) -> bool {
        self.inner.read().is_forbidden
    }

    /// Derived from the token; never stored separately.
    pub fn is_authenticated(&self) -> bool {
        token_present(self.inner.read().access_token.as_deref())
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let inner = self.inner.read();
        SessionSnapshot {
            access_token: inner.access_token.clone(),
            user: inner.user.clone(),
            is_forbidden: inner.is_forbidden,
        }
    }

    /// Receiver that observes every token change (including `clear`).
    pub fn subscribe_token(&self) -> watch::Receiver<Option<String>> {
        self.token_tx.subscribe()
    }

    /// Broadcast the token held in `inner`.
    ///
    /// Called with the write guard still held, so broadcasts are ordered the
    /// same way as the state changes they report.
    fn publish(&self, inner: &Inner) {
        // `send_if_modified` so identical tokens don't wake followers.
        self.token_tx.send_if_modified(|current| {
            if *current == inner.access_token {
                false
            } else {
                current.clone_from(&inner.access_token);
                true
            }
        });
    }
}

impl std::fmt::Debug for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionState")
            .field("snapshot", &self.snapshot())
            .finish()
    }
}

fn token_present(token: Option<&str>) -> bool {
    token.is_some_and(|t| !t.is_empty())
}
