//! Single-flight credential refresh with transparent request replay.
//!
//! # Refresh cycle
//!
//! ```text
//!   Idle ──expiry──▶ Refreshing ──ok──▶ Idle (token rotated, tickets resolved)
//!                        │
//!                        └──fail──▶ LoggedOut (tickets rejected, session cleared,
//!                                              redirect to login)
//! ```
//!
//! The guard is `RefreshState::queue`: `Some` exactly while a refresh is in
//! flight.  The first caller to see an expiry error flips it to `Some` and
//! spawns the refresh; every later caller parks a [`PendingTicket`] in the
//! queue.  Settlement drains the queue in enqueue order under the same lock,
//! so no new refresh can start until every ticket has its answer.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::FutureExt;
use parking_lot::Mutex;
use sc_domain::config::RpcConfig;
use sc_domain::SessionState;
use tokio::sync::oneshot;

use crate::envelope::{summarize, RpcRequest, ServerError, TransportError};
use crate::signature::{classify, ErrorClass};
use crate::traits::{Navigator, RpcTransport, TokenRefresher};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Errors
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Why a refresh exchange failed.  Cloned into every waiting ticket.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RefreshFailure {
    #[error("refresh rejected: {0}")]
    Rejected(String),
    #[error("refresh returned an empty token")]
    EmptyToken,
}

/// Caller-visible outcome of a failed RPC.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum RpcError {
    /// The credential expired and could not be refreshed; the session has
    /// been cleared.
    #[error("session expired: {0}")]
    SessionExpired(#[from] RefreshFailure),
    /// Authorization denied.  The session's forbidden flag is set.
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("server error: {}", summarize(.0))]
    Server(Vec<ServerError>),
    #[error("network: {0}")]
    Network(String),
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Pending request ticket
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

type TicketOutcome = Result<String, RefreshFailure>;

/// A caller waiting for the in-flight refresh.
///
/// Settling consumes the ticket, so it can be answered at most once.
#[derive(Debug)]
pub struct PendingTicket {
    tx: oneshot::Sender<TicketOutcome>,
}

impl PendingTicket {
    fn new() -> (Self, oneshot::Receiver<TicketOutcome>) {
        let (tx, rx) = oneshot::channel();
        (Self { tx }, rx)
    }

    pub fn resolve(self, token: String) {
        // A receiver that gave up is not an error.
        let _ = self.tx.send(Ok(token));
    }

    pub fn reject(self, failure: RefreshFailure) {
        let _ = self.tx.send(Err(failure));
    }
}

#[derive(Default)]
struct RefreshState {
    /// `Some` while a refresh is in flight.
    queue: Option<Vec<PendingTicket>>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Coordinator
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct Inner {
    session: Arc<SessionState>,
    transport: Arc<dyn RpcTransport>,
    refresher: Arc<dyn TokenRefresher>,
    navigator: Arc<dyn Navigator>,
    refresh_operation: String,
    login_route: String,
    state: Mutex<RefreshState>,
    refresh_count: AtomicU64,
}

/// Makes credential expiry invisible to RPC callers.
///
/// Cheap to clone; all clones share the same single-flight guard.
#[derive(Clone)]
pub struct RefreshCoordinator {
    inner: Arc<Inner>,
}

impl RefreshCoordinator {
    pub fn new(
        session: Arc<SessionState>,
        transport: Arc<dyn RpcTransport>,
        refresher: Arc<dyn TokenRefresher>,
        navigator: Arc<dyn Navigator>,
        config: &RpcConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                session,
                transport,
                refresher,
                navigator,
                refresh_operation: config.refresh_operation.clone(),
                login_route: config.login_route.clone(),
                state: Mutex::new(RefreshState::default()),
                refresh_count: AtomicU64::new(0),
            }),
        }
    }

    /// Send a request, refreshing the credential and retrying once if it
    /// failed because the token expired.
    pub async fn execute(&self, request: RpcRequest) -> Result<serde_json::Value, RpcError> {
        let prepared = self.prepare_request(request.clone());
        let err = match self.inner.transport.send(prepared.clone()).await {
            Ok(data) => return Ok(data),
            Err(e) => e,
        };

        let token = self.on_response_error(err, &prepared).await?;
        tracing::debug!(operation = %request.operation_name, "retrying with refreshed token");

        // The retry never re-enters the refresh path.
        self.inner
            .transport
            .send(request.with_bearer(&token))
            .await
            .map_err(|e| self.surface(e))
    }

    /// Attach the current token to every request except the refresh call.
    pub fn prepare_request(&self, request: RpcRequest) -> RpcRequest {
        if self.is_refresh_request(&request) {
            return request;
        }
        match self.inner.session.access_token() {
            Some(token) if !token.is_empty() => request.with_bearer(&token),
            _ => request,
        }
    }

    /// Inspect a failed response.
    ///
    /// Returns `Ok(token)` when the request should be retried with `token`,
    /// or the error to surface otherwise.  Expiry errors on the refresh
    /// call itself are surfaced, never refreshed.
    pub async fn on_response_error(
        &self,
        error: TransportError,
        originating: &RpcRequest,
    ) -> Result<String, RpcError> {
        let errors = match error {
            TransportError::Errors(errors) if classify(&errors) == ErrorClass::Expired => errors,
            other => return Err(self.surface(other)),
        };

        if self.is_refresh_request(originating) {
            tracing::debug!(
                operation = %originating.operation_name,
                "expiry on the refresh call itself, not refreshing"
            );
            return Err(RpcError::Server(errors));
        }

        tracing::info!(
            operation = %originating.operation_name,
            "credential expired, awaiting refresh"
        );
        self.await_fresh_token(originating.bearer_token())
            .await
            .map_err(RpcError::SessionExpired)
    }

    /// Whether a refresh is currently in flight.
    pub fn is_refreshing(&self) -> bool {
        self.inner.state.lock().queue.is_some()
    }

    /// Number of callers parked on the in-flight refresh.
    pub fn pending_tickets(&self) -> usize {
        self.inner
            .state
            .lock()
            .queue
            .as_ref()
            .map_or(0, Vec::len)
    }

    /// Refresh exchanges started since construction.
    pub fn refresh_count(&self) -> u64 {
        self.inner.refresh_count.load(Ordering::Relaxed)
    }

    // ── Internals ────────────────────────────────────────────────────

    fn is_refresh_request(&self, request: &RpcRequest) -> bool {
        request.operation_name == self.inner.refresh_operation
    }

    /// Map a non-recoverable transport error to the caller-visible error,
    /// applying its side effects.
    fn surface(&self, error: TransportError) -> RpcError {
        match error {
            TransportError::Network(msg) => {
                tracing::warn!(error = %msg, "network error, not retrying");
                RpcError::Network(msg)
            }
            TransportError::Errors(errors) => match classify(&errors) {
                ErrorClass::Forbidden => {
                    self.inner.session.set_forbidden(true);
                    RpcError::Forbidden(summarize(&errors))
                }
                _ => RpcError::Server(errors),
            },
        }
    }

    async fn await_fresh_token(&self, sent_with: Option<&str>) -> Result<String, RefreshFailure> {
        let rx = {
            let mut state = self.inner.state.lock();

            if state.queue.is_none() {
                // A refresh settled after this request left: the token it
                // carried is already stale, so just retry with the new one.
                if let Some(current) = self.inner.session.access_token() {
                    if !current.is_empty() && sent_with != Some(current.as_str()) {
                        tracing::debug!("token already rotated, retrying without refresh");
                        return Ok(current);
                    }
                }
            }

            let (ticket, rx) = PendingTicket::new();
            match state.queue.as_mut() {
                Some(queue) => {
                    queue.push(ticket);
                    tracing::debug!(queued = queue.len(), "refresh in flight, request queued");
                }
                None => {
                    state.queue = Some(vec![ticket]);
                    self.spawn_refresh();
                }
            }
            rx
        };

        rx.await
            .unwrap_or_else(|_| Err(RefreshFailure::Rejected("refresh task dropped".into())))
    }

    /// Run the refresh exchange on its own task so a caller that stops
    /// waiting cannot abandon it mid-flight.
    fn spawn_refresh(&self) {
        let inner = self.inner.clone();
        inner.refresh_count.fetch_add(1, Ordering::Relaxed);
        tokio::spawn(async move {
            tracing::info!("refreshing access token");
            let result = AssertUnwindSafe(inner.refresher.refresh())
                .catch_unwind()
                .await;

            let outcome = match result {
                Ok(Ok(token)) if !token.is_empty() => Ok(token),
                Ok(Ok(_)) => Err(RefreshFailure::EmptyToken),
                Ok(Err(e)) => Err(RefreshFailure::Rejected(e.to_string())),
                Err(_panic) => {
                    tracing::error!("token refresher panicked");
                    Err(RefreshFailure::Rejected("refresher panicked".into()))
                }
            };
            inner.settle(outcome);
        });
    }
}

impl Inner {
    fn settle(&self, outcome: TicketOutcome) {
        match outcome {
            Ok(token) => {
                self.session.update_token(token.clone());
                let tickets = self.drain(|ticket| ticket.resolve(token.clone()));
                tracing::info!(replayed = tickets, "access token refreshed");
            }
            Err(failure) => {
                self.session.clear();
                let tickets = self.drain(|ticket| ticket.reject(failure.clone()));
                tracing::warn!(
                    error = %failure,
                    rejected = tickets,
                    "token refresh failed, session cleared"
                );
                self.redirect_to_login();
            }
        }
    }

    /// Settle every queued ticket in enqueue order and reopen the guard.
    fn drain(&self, mut settle: impl FnMut(PendingTicket)) -> usize {
        let mut state = self.state.lock();
        let tickets = state.queue.take().unwrap_or_default();
        let count = tickets.len();
        for ticket in tickets {
            settle(ticket);
        }
        count
    }

    fn redirect_to_login(&self) {
        let current = self.navigator.current_route();
        let path = current.split(['?', '#']).next().unwrap_or_default();
        if path == self.login_route {
            tracing::debug!(route = %current, "already on login route, not redirecting");
            return;
        }
        tracing::info!(route = %self.login_route, "redirecting to login");
        self.navigator.navigate(&self.login_route);
    }
}
