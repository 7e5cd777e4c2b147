//! [`SocketConnector`] backed by `tokio-tungstenite`.
//!
//! Each `open` spawns one I/O task.  The task owns the WebSocket and pushes
//! lifecycle events into the session's channel through a shared listener
//! slot; emptying the slot is how listeners are removed.
//!
//! Wire protocol:
//! - upgrade request carries `Authorization: Bearer <token>`
//! - first frame sent is `{"type":"auth","token":"<token>"}`
//! - server frames are `{"event":"<name>","data":<any>}`

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue, Request};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use crate::socket::{
    DisconnectReason, RealtimeEvent, SocketConnector, SocketEvent, SocketHandle, SocketOptions,
    SocketSession, TransportMode,
};
use crate::types::RealtimeError;

type Listeners = Arc<Mutex<Option<mpsc::UnboundedSender<SocketEvent>>>>;

#[derive(Debug, Clone)]
pub struct WsConnector {
    handshake_timeout: Duration,
}

impl WsConnector {
    pub fn new(handshake_timeout: Duration) -> Self {
        Self { handshake_timeout }
    }
}

impl Default for WsConnector {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

impl SocketConnector for WsConnector {
    fn open(&self, options: &SocketOptions) -> SocketSession {
        let (tx, rx) = mpsc::unbounded_channel();
        let listeners: Listeners = Arc::new(Mutex::new(Some(tx)));
        let cancel = CancellationToken::new();

        tokio::spawn(run_socket(
            options.clone(),
            self.handshake_timeout,
            listeners.clone(),
            cancel.clone(),
        ));

        SocketSession {
            handle: Box::new(WsHandle { listeners, cancel }),
            events: rx,
        }
    }
}

struct WsHandle {
    listeners: Listeners,
    cancel: CancellationToken,
}

impl SocketHandle for WsHandle {
    fn remove_all_listeners(&mut self) {
        self.listeners.lock().take();
    }

    fn disconnect(&mut self) {
        self.cancel.cancel();
    }
}

impl Drop for WsHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn emit(listeners: &Listeners, event: SocketEvent) {
    if let Some(tx) = listeners.lock().as_ref() {
        let _ = tx.send(event);
    }
}

/// Upgrade request with the option headers applied.
fn build_request(options: &SocketOptions) -> Result<Request<()>, RealtimeError> {
    if !options.transports.contains(&TransportMode::WebSocket) {
        return Err(RealtimeError::Config(
            "websocket transport not permitted by options".into(),
        ));
    }

    let mut request = options
        .endpoint
        .as_str()
        .into_client_request()
        .map_err(|e| RealtimeError::Handshake(e.to_string()))?;

    for (name, value) in &options.headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| RealtimeError::Handshake(format!("header name {name:?}: {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| RealtimeError::Handshake(format!("header {name}: {e}")))?;
        request.headers_mut().insert(name, value);
    }
    Ok(request)
}

fn auth_frame(token: &str) -> String {
    serde_json::json!({ "type": "auth", "token": token }).to_string()
}

async fn run_socket(
    options: SocketOptions,
    handshake_timeout: Duration,
    listeners: Listeners,
    cancel: CancellationToken,
) {
    let request = match build_request(&options) {
        Ok(r) => r,
        Err(e) => {
            emit(&listeners, SocketEvent::ConnectError(e.to_string()));
            return;
        }
    };

    let upgrade = tokio::time::timeout(handshake_timeout, tokio_tungstenite::connect_async(request));
    let ws = tokio::select! {
        _ = cancel.cancelled() => return,
        res = upgrade => match res {
            Ok(Ok((ws, _response))) => ws,
            Ok(Err(e)) => {
                let err = RealtimeError::WebSocket(e.to_string());
                emit(&listeners, SocketEvent::ConnectError(err.to_string()));
                return;
            }
            Err(_) => {
                let err = RealtimeError::Handshake(format!(
                    "timed out after {}ms",
                    handshake_timeout.as_millis()
                ));
                emit(&listeners, SocketEvent::ConnectError(err.to_string()));
                return;
            }
        },
    };

    let (mut sink, mut stream) = ws.split();
    if let Err(e) = sink.send(Message::Text(auth_frame(options.token()))).await {
        let err = RealtimeError::Handshake(format!("sending auth frame: {e}"));
        emit(&listeners, SocketEvent::ConnectError(err.to_string()));
        return;
    }
    emit(&listeners, SocketEvent::Connected);

    let reason = loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = sink.send(Message::Close(None)).await;
                break DisconnectReason::ClientDisconnect;
            }
            msg = stream.next() => match msg {
                Some(Ok(Message::Text(text))) => match serde_json::from_str::<RealtimeEvent>(&text) {
                    Ok(event) => emit(&listeners, SocketEvent::Message(event)),
                    Err(e) => {
                        tracing::debug!(error = %e, "ignoring unrecognised realtime frame");
                    }
                },
                Some(Ok(Message::Close(frame))) => {
                    tracing::debug!(?frame, "realtime server sent close");
                    break close_reason(frame.as_ref());
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!(error = %e, "realtime read error");
                    break DisconnectReason::TransportError;
                }
                None => break DisconnectReason::TransportClose,
            },
        }
    };

    emit(&listeners, SocketEvent::Disconnected(reason));
}

/// Only a normal (1000) close is a deliberate server disconnect; restarts
/// and going-away closes are retried like any other drop.
fn close_reason(frame: Option<&CloseFrame<'_>>) -> DisconnectReason {
    match frame {
        Some(f) if f.code == CloseCode::Normal => DisconnectReason::ServerDisconnect,
        _ => DisconnectReason::TransportClose,
    }
}
