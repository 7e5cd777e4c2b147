//! Integration tests for the refresh coordinator: many requests failing on
//! an expired token, one refresh, transparent replay, and the logout path.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use sc_domain::config::RpcConfig;
use sc_domain::error::{Error, Result};
use sc_domain::{SessionState, UserIdentity};
use sc_rpc::{
    RecordingNavigator, RefreshCoordinator, RefreshFailure, RpcError, RpcRequest, RpcTransport,
    ServerError, TokenRefresher, TransportError, TransportRefresher,
};
use tokio::sync::Semaphore;

// ── Test transport: accepts exactly one token ───────────────────────────

/// Answers with `{ op, token }` when the request carries the accepted
/// token, and an expiry error otherwise.  Records every call.
struct ScriptedTransport {
    accepted: Mutex<Option<String>>,
    calls: Mutex<Vec<(String, Option<String>)>>,
    refresh_reply: Mutex<std::result::Result<serde_json::Value, TransportError>>,
}

impl ScriptedTransport {
    fn accepting(token: &str) -> Self {
        Self {
            accepted: Mutex::new(Some(token.into())),
            calls: Mutex::new(Vec::new()),
            refresh_reply: Mutex::new(Err(expired())),
        }
    }

    fn calls(&self) -> Vec<(String, Option<String>)> {
        self.calls.lock().clone()
    }

    fn calls_for(&self, op: &str) -> usize {
        self.calls.lock().iter().filter(|(o, _)| o == op).count()
    }
}

#[async_trait::async_trait]
impl RpcTransport for ScriptedTransport {
    async fn send(
        &self,
        request: RpcRequest,
    ) -> std::result::Result<serde_json::Value, TransportError> {
        let bearer = request.bearer_token().map(str::to_owned);
        self.calls
            .lock()
            .push((request.operation_name.clone(), bearer.clone()));

        if request.operation_name == "refreshToken" {
            return self.refresh_reply.lock().clone();
        }

        let accepted = self.accepted.lock().clone();
        if bearer.is_some() && bearer == accepted {
            Ok(serde_json::json!({ "op": request.operation_name, "token": bearer }))
        } else {
            Err(expired())
        }
    }
}

fn expired() -> TransportError {
    TransportError::Errors(vec![
        ServerError::new("Unauthorized").with_code("UNAUTHORIZED").with_status(401),
    ])
}

// ── Test refresher: blocks until released ───────────────────────────────

struct GatedRefresher {
    calls: AtomicUsize,
    gate: Semaphore,
    outcome: Mutex<Result<String>>,
}

impl GatedRefresher {
    fn new(outcome: Result<String>) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            gate: Semaphore::new(0),
            outcome: Mutex::new(outcome),
        }
    }

    fn succeeding(token: &str) -> Self {
        Self::new(Ok(token.into()))
    }

    fn failing() -> Self {
        Self::new(Err(Error::Auth("refresh cookie expired".into())))
    }

    fn release(&self) {
        self.gate.add_permits(1);
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl TokenRefresher for GatedRefresher {
    async fn refresh(&self) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let _permit = self.gate.acquire().await.expect("gate closed");
        match &*self.outcome.lock() {
            Ok(t) => Ok(t.clone()),
            Err(e) => Err(Error::Auth(e.to_string())),
        }
    }
}

// ── Helpers ─────────────────────────────────────────────────────────────

struct Harness {
    session: Arc<SessionState>,
    transport: Arc<ScriptedTransport>,
    refresher: Arc<GatedRefresher>,
    navigator: Arc<RecordingNavigator>,
    coordinator: RefreshCoordinator,
}

fn harness(refresher: GatedRefresher, route: &str) -> Harness {
    let session = Arc::new(SessionState::new());
    session.authenticate(
        "stale",
        Some(UserIdentity {
            id: "u1".into(),
            email: "dev@example.com".into(),
            display_name: None,
            roles: vec![],
        }),
    );
    let transport = Arc::new(ScriptedTransport::accepting("fresh"));
    let refresher = Arc::new(refresher);
    let navigator = Arc::new(RecordingNavigator::new(route));
    let coordinator = RefreshCoordinator::new(
        session.clone(),
        transport.clone(),
        refresher.clone(),
        navigator.clone(),
        &RpcConfig::default(),
    );
    Harness {
        session,
        transport,
        refresher,
        navigator,
        coordinator,
    }
}

/// Yield until `cond` holds, failing the test after a generous deadline.
async fn wait_until(mut cond: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !cond() {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("condition not reached");
}

fn spawn_requests(
    coordinator: &RefreshCoordinator,
    n: usize,
) -> Vec<tokio::task::JoinHandle<std::result::Result<serde_json::Value, RpcError>>> {
    (0..n)
        .map(|i| {
            let c = coordinator.clone();
            tokio::spawn(async move {
                c.execute(RpcRequest::new(format!("listTimers{i}"), "query { timers { id } }"))
                    .await
            })
        })
        .collect()
}

// ── Tests ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn concurrent_expiry_triggers_exactly_one_refresh() {
    const N: usize = 8;
    let h = harness(GatedRefresher::succeeding("fresh"), "/timers");

    let handles = spawn_requests(&h.coordinator, N);

    // Every request has failed once and is parked on the single refresh.
    wait_until(|| h.coordinator.pending_tickets() == N && h.refresher.calls() == 1).await;
    assert!(h.coordinator.is_refreshing());

    h.refresher.release();

    for handle in handles {
        let data = handle.await.unwrap().expect("request should succeed after refresh");
        assert_eq!(data["token"], "fresh");
    }

    assert_eq!(h.refresher.calls(), 1);
    assert_eq!(h.coordinator.refresh_count(), 1);
    assert!(!h.coordinator.is_refreshing());
    assert_eq!(h.session.access_token().as_deref(), Some("fresh"));
    assert!(h.session.user().is_some(), "refresh keeps the user");

    let calls = h.transport.calls();
    let stale = calls.iter().filter(|(_, t)| t.as_deref() == Some("stale")).count();
    let fresh = calls.iter().filter(|(_, t)| t.as_deref() == Some("fresh")).count();
    assert_eq!(stale, N);
    assert_eq!(fresh, N);
    assert!(h.navigator.history().is_empty());
}

#[tokio::test]
async fn refresh_failure_rejects_all_and_clears_session() {
    const N: usize = 5;
    let h = harness(GatedRefresher::failing(), "/board");

    let handles = spawn_requests(&h.coordinator, N);
    wait_until(|| h.coordinator.pending_tickets() == N).await;
    h.refresher.release();

    for handle in handles {
        match handle.await.unwrap() {
            Err(RpcError::SessionExpired(RefreshFailure::Rejected(msg))) => {
                assert!(msg.contains("refresh cookie expired"), "got: {msg}");
            }
            other => panic!("expected SessionExpired, got {other:?}"),
        }
    }

    assert_eq!(h.refresher.calls(), 1);
    assert!(h.session.access_token().is_none());
    assert!(h.session.user().is_none());
    assert!(!h.session.is_authenticated());
    assert_eq!(h.navigator.history(), vec!["/login".to_string()]);
    assert!(!h.coordinator.is_refreshing());
}

#[tokio::test]
async fn refresh_failure_on_login_route_does_not_redirect() {
    let h = harness(GatedRefresher::failing(), "/login");

    let handles = spawn_requests(&h.coordinator, 1);
    wait_until(|| h.coordinator.pending_tickets() == 1).await;
    h.refresher.release();

    for handle in handles {
        assert!(handle.await.unwrap().is_err());
    }
    assert!(h.navigator.history().is_empty());
}

#[tokio::test]
async fn empty_refresh_token_counts_as_failure() {
    let h = harness(GatedRefresher::succeeding(""), "/board");

    let handles = spawn_requests(&h.coordinator, 2);
    wait_until(|| h.coordinator.pending_tickets() == 2).await;
    h.refresher.release();

    for handle in handles {
        assert_eq!(
            handle.await.unwrap(),
            Err(RpcError::SessionExpired(RefreshFailure::EmptyToken))
        );
    }
    assert!(h.session.access_token().is_none());
}

#[tokio::test]
async fn refresh_call_expiry_never_recurses() {
    // The refresher goes through the same transport, which answers the
    // refresh operation itself with an expiry error.
    let session = Arc::new(SessionState::new());
    session.authenticate("stale", None);
    let transport = Arc::new(ScriptedTransport::accepting("fresh"));
    let config = RpcConfig::default();
    let refresher = Arc::new(TransportRefresher::new(transport.clone(), &config));
    let navigator = Arc::new(RecordingNavigator::new("/admin"));
    let coordinator = RefreshCoordinator::new(
        session.clone(),
        transport.clone(),
        refresher,
        navigator.clone(),
        &config,
    );

    let err = coordinator
        .execute(RpcRequest::new("listUsers", "query { users { id } }"))
        .await
        .unwrap_err();

    assert!(matches!(err, RpcError::SessionExpired(_)), "got {err:?}");
    assert_eq!(transport.calls_for("refreshToken"), 1);
    assert_eq!(coordinator.refresh_count(), 1);
    assert!(session.access_token().is_none());
    assert_eq!(navigator.history(), vec!["/login".to_string()]);
}

#[tokio::test]
async fn direct_refresh_operation_is_never_refreshed() {
    let h = harness(GatedRefresher::succeeding("fresh"), "/timers");

    let err = h
        .coordinator
        .execute(RpcRequest::new("refreshToken", "mutation { refreshToken { accessToken } }"))
        .await
        .unwrap_err();

    assert!(matches!(err, RpcError::Server(_)), "got {err:?}");
    assert_eq!(h.refresher.calls(), 0);
    // Sent without a bearer token.
    assert_eq!(h.transport.calls(), vec![("refreshToken".to_string(), None)]);
    assert_eq!(h.session.access_token().as_deref(), Some("stale"));
}

#[tokio::test]
async fn successful_refresh_via_transport() {
    let session = Arc::new(SessionState::new());
    session.authenticate("stale", None);
    let transport = Arc::new(ScriptedTransport::accepting("fresh"));
    *transport.refresh_reply.lock() =
        Ok(serde_json::json!({ "refreshToken": { "accessToken": "fresh" } }));
    let config = RpcConfig::default();
    let coordinator = RefreshCoordinator::new(
        session.clone(),
        transport.clone(),
        Arc::new(TransportRefresher::new(transport.clone(), &config)),
        Arc::new(RecordingNavigator::new("/timers")),
        &config,
    );

    let data = coordinator
        .execute(RpcRequest::new("listRates", "query { rates { id } }"))
        .await
        .unwrap();
    assert_eq!(data["token"], "fresh");
    assert_eq!(session.access_token().as_deref(), Some("fresh"));
    assert_eq!(
        transport.calls(),
        vec![
            ("listRates".to_string(), Some("stale".to_string())),
            ("refreshToken".to_string(), None),
            ("listRates".to_string(), Some("fresh".to_string())),
        ]
    );
}

#[tokio::test]
async fn forbidden_sets_flag_without_refresh() {
    struct Denying;

    #[async_trait::async_trait]
    impl RpcTransport for Denying {
        async fn send(
            &self,
            _request: RpcRequest,
        ) -> std::result::Result<serde_json::Value, TransportError> {
            Err(TransportError::Errors(vec![
                ServerError::new("Access denied").with_code("FORBIDDEN"),
            ]))
        }
    }

    let session = Arc::new(SessionState::new());
    session.authenticate("tok", None);
    let refresher = Arc::new(GatedRefresher::succeeding("fresh"));
    let coordinator = RefreshCoordinator::new(
        session.clone(),
        Arc::new(Denying),
        refresher.clone(),
        Arc::new(RecordingNavigator::new("/admin")),
        &RpcConfig::default(),
    );

    let err = coordinator
        .execute(RpcRequest::new("deleteUser", "mutation { deleteUser }"))
        .await
        .unwrap_err();

    assert!(matches!(err, RpcError::Forbidden(_)), "got {err:?}");
    assert!(session.is_forbidden());
    assert_eq!(session.access_token().as_deref(), Some("tok"));
    assert_eq!(refresher.calls(), 0);
}

#[tokio::test]
async fn stale_token_after_rotation_retries_without_refresh() {
    let h = harness(GatedRefresher::succeeding("unused"), "/timers");
    // Another caller already rotated the token.
    h.session.update_token("fresh");

    let stale_request = RpcRequest::new("listTimers", "q").with_bearer("stale");
    let token = h
        .coordinator
        .on_response_error(expired(), &stale_request)
        .await
        .unwrap();

    assert_eq!(token, "fresh");
    assert_eq!(h.refresher.calls(), 0);
    assert_eq!(h.coordinator.refresh_count(), 0);
}

#[tokio::test]
async fn retry_that_still_fails_is_surfaced_once() {
    let h = harness(GatedRefresher::succeeding("also-rejected"), "/timers");
    h.refresher.release();

    let err = h
        .coordinator
        .execute(RpcRequest::new("listTimers", "q"))
        .await
        .unwrap_err();

    assert!(matches!(err, RpcError::Server(_)), "got {err:?}");
    assert_eq!(h.refresher.calls(), 1);
    assert_eq!(h.transport.calls_for("listTimers"), 2);
}

#[tokio::test]
async fn second_wave_after_settlement_starts_new_refresh() {
    let h = harness(GatedRefresher::succeeding("fresh"), "/timers");
    h.refresher.release();

    h.coordinator
        .execute(RpcRequest::new("first", "q"))
        .await
        .unwrap();
    assert_eq!(h.refresher.calls(), 1);

    // Server now rejects "fresh" too; a later expiry on the current token
    // must start a new cycle.
    *h.transport.accepted.lock() = Some("fresher".into());
    *h.refresher.outcome.lock() = Ok("fresher".into());
    h.refresher.release();

    let data = h
        .coordinator
        .execute(RpcRequest::new("second", "q"))
        .await
        .unwrap();
    assert_eq!(data["token"], "fresher");
    assert_eq!(h.refresher.calls(), 2);
}
