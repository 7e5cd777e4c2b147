//! Integration test: boots an in-process WebSocket server and drives the
//! tokio-tungstenite socket adapter (alone, and under the manager) against
//! it over real TCP.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use sc_realtime::types::STATUS_SERVER_DISCONNECT;
use sc_realtime::{
    ConnectParams, ConnectionManagerBuilder, ConnectionStatus, DisconnectReason, RealtimeEvent,
    ReconnectBackoff, SocketConnector, SocketEvent, SocketOptions, SocketSession, WsConnector,
};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

// ── Mini server: in-process WS endpoint ─────────────────────────────────

/// One accepted client: what it sent during the handshake plus the live
/// server side of the socket.
struct Accepted {
    auth_header: Option<String>,
    first_frame: String,
    ws: WebSocketStream<TcpStream>,
}

async fn start_server() -> (SocketAddr, mpsc::Receiver<Accepted>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (conn_tx, conn_rx) = mpsc::channel(4);

    tokio::spawn(async move {
        while let Ok((stream, _peer)) = listener.accept().await {
            let conn_tx = conn_tx.clone();
            tokio::spawn(async move {
                let captured: Arc<Mutex<Option<String>>> = Arc::default();
                let cap = captured.clone();
                let callback = move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
                    *cap.lock() = req
                        .headers()
                        .get("authorization")
                        .and_then(|v| v.to_str().ok())
                        .map(String::from);
                    Ok(resp)
                };
                let mut ws = tokio_tungstenite::accept_hdr_async(stream, callback)
                    .await
                    .unwrap();

                let first_frame = loop {
                    match ws.next().await {
                        Some(Ok(Message::Text(text))) => break text,
                        Some(Ok(_)) => continue,
                        _ => return,
                    }
                };
                let auth_header = captured.lock().take();
                let _ = conn_tx
                    .send(Accepted {
                        auth_header,
                        first_frame,
                        ws,
                    })
                    .await;
            });
        }
    });

    (addr, conn_rx)
}

async fn next_event(session: &mut SocketSession) -> SocketEvent {
    tokio::time::timeout(Duration::from_secs(5), session.events.recv())
        .await
        .expect("timed out waiting for socket event")
        .expect("socket event channel closed")
}

async fn next_conn(conns: &mut mpsc::Receiver<Accepted>) -> Accepted {
    tokio::time::timeout(Duration::from_secs(5), conns.recv())
        .await
        .expect("timed out waiting for connection")
        .expect("server stopped")
}

async fn wait_status(
    rx: &mut watch::Receiver<ConnectionStatus>,
    pred: impl Fn(&ConnectionStatus) -> bool,
) -> ConnectionStatus {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            {
                let status = rx.borrow_and_update();
                if pred(&status) {
                    return status.clone();
                }
            }
            rx.changed().await.expect("status channel closed");
        }
    })
    .await
    .expect("timed out waiting for status")
}

// ── Adapter ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn handshake_events_and_server_close() {
    let (addr, mut conns) = start_server().await;
    let connector = WsConnector::default();
    let mut session = connector.open(&SocketOptions::new(format!("ws://{addr}/realtime"), "tok-ws"));

    assert_eq!(next_event(&mut session).await, SocketEvent::Connected);
    let mut conn = next_conn(&mut conns).await;

    // Token travels both as header and as the first frame.
    assert_eq!(conn.auth_header.as_deref(), Some("Bearer tok-ws"));
    let frame: serde_json::Value = serde_json::from_str(&conn.first_frame).unwrap();
    assert_eq!(frame["type"], "auth");
    assert_eq!(frame["token"], "tok-ws");

    conn.ws
        .send(Message::Text("not json".into()))
        .await
        .unwrap();
    conn.ws
        .send(Message::Text(
            r#"{"event":"timer.started","data":{"id":1}}"#.into(),
        ))
        .await
        .unwrap();
    assert_eq!(
        next_event(&mut session).await,
        SocketEvent::Message(RealtimeEvent {
            name: "timer.started".into(),
            data: serde_json::json!({ "id": 1 }),
        })
    );

    conn.ws
        .close(Some(CloseFrame {
            code: CloseCode::Normal,
            reason: "logout".into(),
        }))
        .await
        .unwrap();
    assert_eq!(
        next_event(&mut session).await,
        SocketEvent::Disconnected(DisconnectReason::ServerDisconnect)
    );
}

#[tokio::test]
async fn going_away_close_is_not_deliberate() {
    let (addr, mut conns) = start_server().await;
    let connector = WsConnector::default();
    let mut session = connector.open(&SocketOptions::new(format!("ws://{addr}/realtime"), "tok"));

    assert_eq!(next_event(&mut session).await, SocketEvent::Connected);
    let mut conn = next_conn(&mut conns).await;

    conn.ws
        .close(Some(CloseFrame {
            code: CloseCode::Away,
            reason: "restarting".into(),
        }))
        .await
        .unwrap();
    assert_eq!(
        next_event(&mut session).await,
        SocketEvent::Disconnected(DisconnectReason::TransportClose)
    );
}

#[tokio::test]
async fn refused_connection_is_connect_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let connector = WsConnector::default();
    let mut session = connector.open(&SocketOptions::new(format!("ws://{addr}/realtime"), "tok"));

    match next_event(&mut session).await {
        SocketEvent::ConnectError(msg) => assert!(msg.starts_with("websocket:"), "{msg}"),
        other => panic!("expected ConnectError, got {other:?}"),
    }
}

#[tokio::test]
async fn teardown_sends_close_to_server() {
    let (addr, mut conns) = start_server().await;
    let connector = WsConnector::default();
    let mut session = connector.open(&SocketOptions::new(format!("ws://{addr}/realtime"), "tok"));

    assert_eq!(next_event(&mut session).await, SocketEvent::Connected);
    let mut conn = next_conn(&mut conns).await;

    session.teardown();

    let closed = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match conn.ws.next().await {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return,
                Some(Ok(_)) => continue,
            }
        }
    })
    .await;
    assert!(closed.is_ok(), "server never saw the client close");
}

// ── Manager over real sockets ───────────────────────────────────────────

#[tokio::test]
async fn manager_reconnects_after_abrupt_drop() {
    let (addr, mut conns) = start_server().await;
    let manager = ConnectionManagerBuilder::new()
        .reconnect_backoff(ReconnectBackoff {
            initial_delay: Duration::from_millis(20),
            max_delay: Duration::from_millis(100),
            jitter: Duration::ZERO,
            ..Default::default()
        })
        .build()
        .unwrap();
    let mut rx = manager.subscribe();

    manager
        .connect(ConnectParams::new(
            format!("ws://{addr}/realtime"),
            Some("tok-live".into()),
        ))
        .await;
    wait_status(&mut rx, |s| s.connected).await;
    let first = next_conn(&mut conns).await;
    assert_eq!(first.auth_header.as_deref(), Some("Bearer tok-live"));

    // Drop TCP without a close handshake.
    drop(first);
    wait_status(&mut rx, |s| !s.connected).await;

    let second = next_conn(&mut conns).await;
    assert_eq!(second.auth_header.as_deref(), Some("Bearer tok-live"));
    wait_status(&mut rx, |s| s.connected).await;

    manager.disconnect().await;
    assert!(!manager.status().connected);
}

fn quick_manager() -> sc_realtime::ConnectionManager {
    ConnectionManagerBuilder::new()
        .reconnect_backoff(ReconnectBackoff {
            initial_delay: Duration::from_millis(20),
            max_delay: Duration::from_millis(100),
            jitter: Duration::ZERO,
            ..Default::default()
        })
        .build()
        .unwrap()
}

#[tokio::test]
async fn manager_reconnects_after_server_restart_close() {
    let (addr, mut conns) = start_server().await;
    let manager = quick_manager();
    let mut rx = manager.subscribe();

    manager
        .connect(ConnectParams::new(
            format!("ws://{addr}/realtime"),
            Some("tok-deploy".into()),
        ))
        .await;
    wait_status(&mut rx, |s| s.connected).await;
    let mut first = next_conn(&mut conns).await;

    first
        .ws
        .close(Some(CloseFrame {
            code: CloseCode::Away,
            reason: "restarting".into(),
        }))
        .await
        .unwrap();
    let lost = wait_status(&mut rx, |s| !s.connected).await;
    assert_ne!(lost.status_message, STATUS_SERVER_DISCONNECT);

    let second = next_conn(&mut conns).await;
    assert_eq!(second.auth_header.as_deref(), Some("Bearer tok-deploy"));
    wait_status(&mut rx, |s| s.connected).await;

    manager.disconnect().await;
}

#[tokio::test]
async fn manager_stops_after_normal_server_close() {
    let (addr, mut conns) = start_server().await;
    let manager = quick_manager();
    let mut rx = manager.subscribe();

    manager
        .connect(ConnectParams::new(
            format!("ws://{addr}/realtime"),
            Some("tok".into()),
        ))
        .await;
    wait_status(&mut rx, |s| s.connected).await;
    let mut first = next_conn(&mut conns).await;

    first
        .ws
        .close(Some(CloseFrame {
            code: CloseCode::Normal,
            reason: "bye".into(),
        }))
        .await
        .ok();
    wait_status(&mut rx, |s| s.status_message == STATUS_SERVER_DISCONNECT).await;

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(
        tokio::time::timeout(Duration::from_millis(100), conns.recv())
            .await
            .is_err(),
        "no reconnect after a normal close"
    );
}
