use std::sync::Arc;

use anyhow::Context;
use sc_domain::config::Config;
use sc_domain::SessionState;
use sc_realtime::{ConnectParams, ConnectionManagerBuilder, ConnectionStatus};
use sc_rpc::{
    HttpTransport, RecordingNavigator, RefreshCoordinator, RpcRequest, RpcTransport,
    TransportRefresher,
};

/// Connect the realtime channel and print status changes until terminal.
pub async fn status(config: &Config, token: String, max_attempts: Option<u32>) -> anyhow::Result<()> {
    let manager = ConnectionManagerBuilder::from_config(&config.realtime)
        .build()
        .context("building realtime manager")?;
    let mut rx = manager.subscribe();

    let params = ConnectParams::new(config.realtime.endpoint.clone(), Some(token))
        .max_attempts(max_attempts.unwrap_or(config.realtime.max_reconnect_attempts))
        .on_event(|ev| println!("event  {} {}", ev.name, ev.data));
    manager.connect(params).await;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                manager.disconnect().await;
                println!("{}", render(&manager.status()));
                break;
            }
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let status = rx.borrow_and_update().clone();
                println!("{}", render(&status));
                if status.is_terminal() {
                    break;
                }
            }
        }
    }
    Ok(())
}

fn render(status: &ConnectionStatus) -> String {
    let dot = if status.connected { "●" } else { "○" };
    format!("{dot} {}", status.status_message)
}

/// Execute one RPC through the refresh coordinator.
pub async fn query(
    config: &Config,
    operation: String,
    query: Option<String>,
    variables: Option<String>,
    token: Option<String>,
) -> anyhow::Result<()> {
    let session = Arc::new(SessionState::new());
    if let Some(token) = token {
        session.authenticate(token, None);
    }

    let transport: Arc<dyn RpcTransport> =
        Arc::new(HttpTransport::new(&config.rpc).context("building HTTP transport")?);
    let refresher = Arc::new(TransportRefresher::new(transport.clone(), &config.rpc));
    let navigator = Arc::new(RecordingNavigator::new("/"));
    let coordinator = RefreshCoordinator::new(
        session.clone(),
        transport,
        refresher,
        navigator.clone(),
        &config.rpc,
    );

    let document = query.unwrap_or_else(|| default_query(&operation));
    let mut request = RpcRequest::new(operation.clone(), document);
    if let Some(raw) = variables {
        let vars: serde_json::Value =
            serde_json::from_str(&raw).context("parsing --variables as JSON")?;
        request = request.with_variables(vars);
    }

    let result = coordinator.execute(request).await;
    if coordinator.refresh_count() > 0 {
        tracing::info!(refreshes = coordinator.refresh_count(), "credential refreshed during query");
    }
    if let Some(route) = navigator.history().last() {
        eprintln!("session ended; would redirect to {route}");
    }

    let data = result.with_context(|| format!("executing {operation}"))?;
    println!("{}", serde_json::to_string_pretty(&data)?);
    Ok(())
}

fn default_query(operation: &str) -> String {
    format!("query {operation} {{ {operation} }}")
}
