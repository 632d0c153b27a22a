//! SlideSync WebSocket Relay Server
//!
//! Relays renderer sync events between clients on the same document channel.
//! Delivery is best-effort and broadcast-once: nothing is buffered for late
//! joiners, and a sender never receives its own messages.
//!
//! ## Protocol
//!
//! JSON text frames:
//! ```json
//! { "type": "join", "channel": "slide-sync:deck-id", "observer": "client-id" }
//! { "type": "broadcast", "channel": "slide-sync:deck-id", "payload": { ... } }
//! { "type": "leave", "channel": "slide-sync:deck-id" }
//! ```

mod connection;
mod state;

use axum::{
    Router,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
    routing::get,
};
use futures_util::{SinkExt, StreamExt, stream::SplitSink};
use slidesync_core::protocol::{ClientMessage, ServerMessage};
use std::{net::SocketAddr, sync::Arc};
use tokio::sync::mpsc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};

use connection::Connection;
use state::AppState;

/// Environment variable overriding the listen address.
const ADDR_ENV: &str = "SLIDESYNC_ADDR";
const DEFAULT_ADDR: &str = "0.0.0.0:3030";

fn listen_addr() -> SocketAddr {
    let default = SocketAddr::from(([0, 0, 0, 0], 3030));
    match std::env::var(ADDR_ENV) {
        Ok(value) => value.parse().unwrap_or_else(|e| {
            warn!("Invalid {}={:?} ({}), using {}", ADDR_ENV, value, e, DEFAULT_ADDR);
            default
        }),
        Err(_) => default,
    }
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "slidesync_server=info,tower_http=info".into()),
        )
        .init();

    let state = Arc::new(AppState::new());

    let app = Router::new()
        .route("/", get(index))
        .route("/ws", get(ws_handler))
        .route("/health", get(health))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = listen_addr();
    info!("SlideSync relay listening on {}", addr);
    info!("WebSocket endpoint: ws://{}/ws", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await
}

async fn index() -> &'static str {
    "SlideSync Relay Server - Connect via WebSocket at /ws"
}

async fn health() -> &'static str {
    "ok"
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Serialize and send one message.
async fn send_json(sender: &mut SplitSink<WebSocket, Message>, msg: &ServerMessage) -> Result<(), ()> {
    let json = serde_json::to_string(msg).map_err(|e| warn!("Failed to encode reply: {}", e))?;
    sender.send(Message::Text(json.into())).await.map_err(|_| ())
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<ServerMessage>();
    let mut conn = Connection::new(state, out_tx);
    let conn_id = conn.id();
    info!("New connection: {}", conn_id);

    loop {
        tokio::select! {
            msg = receiver.next() => {
                let reply = match msg {
                    Some(Ok(Message::Text(text))) => match serde_json::from_str::<ClientMessage>(&text) {
                        Ok(client_msg) => conn.handle(client_msg),
                        Err(e) => {
                            warn!("Invalid message from {}: {}", conn_id, e);
                            Some(ServerMessage::Error {
                                message: format!("Invalid message: {}", e),
                            })
                        }
                    },
                    Some(Ok(Message::Binary(_))) => Some(ServerMessage::Error {
                        message: "Binary frames are not supported".to_string(),
                    }),
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => None, // ping/pong
                    Some(Err(e)) => {
                        warn!("WebSocket error for {}: {}", conn_id, e);
                        break;
                    }
                };
                if let Some(reply) = reply {
                    if send_json(&mut sender, &reply).await.is_err() {
                        break;
                    }
                }
            }

            Some(out) = out_rx.recv() => {
                if send_json(&mut sender, &out).await.is_err() {
                    break;
                }
            }
        }
    }

    conn.leave_all();
    info!("Connection closed: {} ({:?})", conn_id, conn.observer());
}
