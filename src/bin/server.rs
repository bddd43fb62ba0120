use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::{header, HeaderMap};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use clap::Parser;
use futures_util::{SinkExt, StreamExt};
use omnitris_server::broadcaster::{OutboundMessage, CLIENT_QUEUE_CAPACITY};
use omnitris_server::config::ServerConfig;
use omnitris_server::error::ServerError;
use omnitris_server::gateway::SessionGateway;
use omnitris_server::match_history::parse_history_limit;
use omnitris_server::server_utils::{display_name_from_user_agent, random_name_suffix};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

type SharedGateway = Arc<SessionGateway>;

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    limit: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), ServerError> {
    let config = ServerConfig::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_new(&config.log_filter).unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let gateway: SharedGateway = Arc::new(SessionGateway::new());

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/api/history", get(history_handler))
        .route("/ws", get(ws_handler))
        .with_state(gateway.clone());

    let app = if let Some(static_dir) = config.resolve_static_dir() {
        let index_file = static_dir.join("index.html");
        info!(root = %static_dir.display(), "serving static files");
        app.fallback_service(ServeDir::new(static_dir).not_found_service(ServeFile::new(index_file)))
    } else {
        warn!("static file root not found, serving the API only");
        app
    };
    let app = app.layer(TraceLayer::new_for_http());

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind { addr, source })?;

    info!(%addr, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(ServerError::Serve)?;

    gateway.broadcaster().close_all(1001, "server shutting down").await;
    gateway.registry().shutdown().await;
    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

async fn healthz() -> impl IntoResponse {
    Json(json!({ "ok": true }))
}

async fn history_handler(
    State(gateway): State<SharedGateway>,
    Query(query): Query<HistoryQuery>,
) -> impl IntoResponse {
    let limit = parse_history_limit(query.limit.as_deref());
    Json(gateway.broadcaster().history_response(limit).await)
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    State(gateway): State<SharedGateway>,
) -> impl IntoResponse {
    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    ws.on_upgrade(move |socket| handle_socket(gateway, socket, user_agent))
}

async fn handle_socket(gateway: SharedGateway, socket: WebSocket, user_agent: Option<String>) {
    let client_id = make_id("client");
    let name = display_name_from_user_agent(user_agent.as_deref(), random_name_suffix());
    let (tx, mut rx) = mpsc::channel::<OutboundMessage>(CLIENT_QUEUE_CAPACITY);
    gateway.connect(&client_id, tx.clone(), name).await;

    let (mut ws_sender, mut ws_receiver) = socket.split();
    let writer = tokio::spawn(async move {
        while let Some(outbound) = rx.recv().await {
            let should_close = matches!(outbound, OutboundMessage::Close { .. });
            let result = match outbound {
                OutboundMessage::Text(payload) => {
                    ws_sender.send(Message::Text(payload.into())).await
                }
                OutboundMessage::Close { code, reason } => {
                    let frame = CloseFrame {
                        code,
                        reason: reason.into(),
                    };
                    ws_sender.send(Message::Close(Some(frame))).await
                }
            };
            if result.is_err() || should_close {
                break;
            }
        }
    });

    while let Some(received) = ws_receiver.next().await {
        let Ok(message) = received else {
            break;
        };

        match message {
            Message::Text(raw) => {
                gateway.handle_text(&client_id, raw.as_str()).await;
            }
            Message::Binary(raw) => match std::str::from_utf8(&raw) {
                Ok(text) => gateway.handle_text(&client_id, text).await,
                Err(_) => debug!(client = %client_id, "non-utf8 frame dropped"),
            },
            Message::Close(_) => break,
            _ => {}
        }
    }

    gateway.disconnect(&client_id).await;
    drop(tx);
    let _ = writer.await;
}

fn make_id(prefix: &str) -> String {
    let seq = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}_{seq}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique_and_prefixed() {
        let a = make_id("client");
        let b = make_id("client");
        assert_ne!(a, b);
        assert!(a.starts_with("client_"));
    }
}
