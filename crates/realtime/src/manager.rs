//! Connection Resilience Manager.
//!
//! One [`ConnectionManager`] owns at most one driver task at a time.  The
//! driver walks an explicit state machine and is the only code that opens
//! or tears down sockets, so teardown always precedes setup and a stale
//! socket can never deliver events after a newer one was opened.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::reconnect::ReconnectBackoff;
use crate::socket::{DisconnectReason, SocketConnector, SocketEvent, SocketOptions, SocketSession};
use crate::types::{
    ConnectParams, ConnectionStatus, EventCallback, STATUS_CLIENT_DISCONNECT, STATUS_DISCONNECTED,
    STATUS_NOT_AUTHENTICATED, STATUS_NO_ENDPOINT, STATUS_SERVER_DISCONNECT,
};

/// Live driver plus the parameters it was started with.
struct ActiveDriver {
    endpoint: String,
    token: String,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

pub struct ConnectionManager {
    connector: Arc<dyn SocketConnector>,
    backoff: ReconnectBackoff,
    status_tx: Arc<watch::Sender<ConnectionStatus>>,
    active: Mutex<Option<ActiveDriver>>,
    /// Parent of every driver's token; cancelled on drop.
    root: CancellationToken,
}

impl ConnectionManager {
    pub fn new(connector: Arc<dyn SocketConnector>, backoff: ReconnectBackoff) -> Self {
        let (status_tx, _) = watch::channel(ConnectionStatus::default());
        Self {
            connector,
            backoff,
            status_tx: Arc::new(status_tx),
            active: Mutex::new(None),
            root: CancellationToken::new(),
        }
    }

    /// Start (or keep) a connection for `params`.
    ///
    /// Returns once the previous driver, if any, has fully torn down and the
    /// new one has been spawned.  The connection outcome is reported through
    /// [`status`](Self::status) and [`subscribe`](Self::subscribe).
    pub async fn connect(&self, params: ConnectParams) {
        let mut active = self.active.lock().await;

        if params.endpoint.trim().is_empty() {
            self.stop(&mut active).await;
            self.publish(ConnectionStatus::idle(STATUS_NO_ENDPOINT));
            return;
        }
        let token = match params.token.as_deref().filter(|t| !t.is_empty()) {
            Some(t) => t.to_string(),
            None => {
                self.stop(&mut active).await;
                self.publish(ConnectionStatus::idle(STATUS_NOT_AUTHENTICATED));
                return;
            }
        };

        if let Some(current) = active.as_ref() {
            if current.endpoint == params.endpoint
                && current.token == token
                && !current.task.is_finished()
            {
                tracing::debug!(endpoint = %params.endpoint, "connect with unchanged params ignored");
                return;
            }
        }

        self.stop(&mut active).await;

        let cancel = self.root.child_token();
        let backoff = ReconnectBackoff {
            max_attempts: params.max_attempts,
            ..self.backoff.clone()
        };
        let driver = Driver {
            connector: self.connector.clone(),
            backoff,
            options: SocketOptions::new(params.endpoint.clone(), token.clone()),
            on_event: params.on_event,
            status_tx: self.status_tx.clone(),
            cancel: cancel.clone(),
            socket: None,
        };
        tracing::info!(
            endpoint = %params.endpoint,
            max_attempts = params.max_attempts,
            "starting realtime connection"
        );
        let task = tokio::spawn(driver.run());

        *active = Some(ActiveDriver {
            endpoint: params.endpoint,
            token,
            cancel,
            task,
        });
    }

    /// Cancel the driver (pending retry timer included), detach listeners,
    /// close the socket, and reset status.
    pub async fn disconnect(&self) {
        let mut active = self.active.lock().await;
        self.stop(&mut active).await;
        self.publish(ConnectionStatus::idle(STATUS_DISCONNECTED));
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status_tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionStatus> {
        self.status_tx.subscribe()
    }

    async fn stop(&self, active: &mut Option<ActiveDriver>) {
        let Some(driver) = active.take() else {
            return;
        };
        driver.cancel.cancel();
        if let Err(e) = driver.task.await {
            tracing::warn!(endpoint = %driver.endpoint, error = %e, "realtime driver ended abnormally");
        }
    }

    fn publish(&self, status: ConnectionStatus) {
        self.status_tx.send_replace(status);
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.root.cancel();
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("backoff", &self.backoff)
            .field("status", &*self.status_tx.borrow())
            .finish_non_exhaustive()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Driver
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Driver state transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    /// Open a socket as attempt `n` (0-indexed).
    Attempt(u32),
    /// Socket is connected; pump events until it drops.
    Live,
    /// Wait `backoff.delay_for_attempt(delay_index)`, then try `next`.
    Retry { delay_index: u32, next: u32 },
    Done,
}

struct Driver {
    connector: Arc<dyn SocketConnector>,
    /// Carries the per-connection attempt budget.
    backoff: ReconnectBackoff,
    options: SocketOptions,
    on_event: Option<EventCallback>,
    status_tx: Arc<watch::Sender<ConnectionStatus>>,
    cancel: CancellationToken,
    socket: Option<SocketSession>,
}

impl Driver {
    async fn run(mut self) {
        let mut step = Step::Attempt(0);
        loop {
            if self.cancel.is_cancelled() {
                step = Step::Done;
            }
            step = match step {
                Step::Attempt(n) => self.attempt(n).await,
                Step::Live => self.pump().await,
                Step::Retry { delay_index, next } => self.wait_retry(delay_index, next).await,
                Step::Done => break,
            };
        }
        self.teardown();
        tracing::debug!(endpoint = %self.options.endpoint, "realtime driver stopped");
    }

    async fn attempt(&mut self, n: u32) -> Step {
        if self.gives_up(n) {
            return self.fail();
        }
        self.publish(ConnectionStatus::connecting(n, self.backoff.max_attempts));

        self.teardown();
        tracing::debug!(endpoint = %self.options.endpoint, attempt = n, "opening socket");
        let session = self.connector.open(&self.options);
        let socket = self.socket.insert(session);

        loop {
            let event = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Step::Done,
                ev = socket.events.recv() => ev,
            };
            let error = match event {
                Some(SocketEvent::Connected) => {
                    tracing::info!(endpoint = %self.options.endpoint, attempt = n, "realtime connected");
                    self.publish(ConnectionStatus::live());
                    return Step::Live;
                }
                // Pushes before the connect ack are not delivered.
                Some(SocketEvent::Message(_)) => continue,
                Some(SocketEvent::ConnectError(e)) => e,
                Some(SocketEvent::Disconnected(reason)) => reason.to_string(),
                None => "socket closed before connecting".to_string(),
            };

            tracing::warn!(
                endpoint = %self.options.endpoint,
                attempt = n,
                error = %error,
                "realtime connect error"
            );
            self.teardown();
            self.publish(ConnectionStatus::connect_error(n, &error));
            return Step::Retry {
                delay_index: n,
                next: n.saturating_add(1),
            };
        }
    }

    async fn pump(&mut self) -> Step {
        let Some(socket) = self.socket.as_mut() else {
            return Step::Attempt(0);
        };

        let reason = loop {
            let event = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Step::Done,
                ev = socket.events.recv() => ev,
            };
            match event {
                Some(SocketEvent::Message(ev)) => {
                    if let Some(cb) = &self.on_event {
                        let name = ev.name.clone();
                        let delivered =
                            std::panic::catch_unwind(AssertUnwindSafe(|| (cb.as_ref())(ev)));
                        if delivered.is_err() {
                            tracing::error!(event = %name, "realtime event callback panicked");
                        }
                    }
                }
                Some(SocketEvent::Disconnected(reason)) => break reason,
                Some(SocketEvent::Connected) => {}
                Some(SocketEvent::ConnectError(e)) => {
                    tracing::debug!(error = %e, "connect error on live socket ignored");
                }
                None => break DisconnectReason::TransportClose,
            }
        };

        self.teardown();
        if reason.is_deliberate() {
            tracing::info!(endpoint = %self.options.endpoint, %reason, "realtime closed");
            let message = match reason {
                DisconnectReason::ClientDisconnect => STATUS_CLIENT_DISCONNECT,
                _ => STATUS_SERVER_DISCONNECT,
            };
            self.publish(ConnectionStatus::idle(message));
            return Step::Done;
        }

        tracing::warn!(
            endpoint = %self.options.endpoint,
            %reason,
            "realtime connection lost"
        );
        // A successful connect resets the counter.
        self.publish(ConnectionStatus::lost(0, &reason));
        Step::Retry {
            delay_index: 0,
            next: 0,
        }
    }

    async fn wait_retry(&mut self, delay_index: u32, next: u32) -> Step {
        if self.gives_up(next) {
            return self.fail();
        }
        let delay = self.backoff.delay_for_attempt(delay_index);
        tracing::debug!(
            endpoint = %self.options.endpoint,
            next_attempt = next,
            delay_ms = delay.as_millis() as u64,
            "scheduling reconnect"
        );
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Step::Done,
            _ = tokio::time::sleep(delay) => Step::Attempt(next),
        }
    }

    fn gives_up(&self, attempt: u32) -> bool {
        self.backoff.should_give_up(attempt)
    }

    fn fail(&mut self) -> Step {
        tracing::warn!(
            endpoint = %self.options.endpoint,
            max_attempts = self.backoff.max_attempts,
            "realtime connection failed after max attempts"
        );
        self.publish(ConnectionStatus::failed());
        Step::Done
    }

    /// Detach listeners, then close.  No-op without a socket.
    fn teardown(&mut self) {
        if let Some(socket) = self.socket.take() {
            socket.teardown();
        }
    }

    fn publish(&self, status: ConnectionStatus) {
        if self.cancel.is_cancelled() {
            return;
        }
        self.status_tx.send_replace(status);
    }
}
