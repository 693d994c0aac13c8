//! WebSocket upgrade handler

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::util::rate_limit::ConnectionRateLimiter;
use crate::util::time::unix_millis;
use crate::ws::protocol::{ClientMsg, ServerMsg};

/// WebSocket upgrade handler. Identity is claimed later over the socket
/// via `register_online`; the external user store owns authentication.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, state: AppState) {
    let conn = Uuid::new_v4();
    info!(connection_id = %conn, "new websocket connection");

    let (mut ws_sink, mut ws_stream) = socket.split();

    // Outbound channel: the hub routes through the registry into it
    let mut outbound_rx = state.clients.register(conn);

    // The client needs its connection id: game events are keyed by it
    let welcome = ServerMsg::Welcome {
        connection_id: conn,
        server_time: unix_millis(),
    };
    if let Err(e) = send_msg(&mut ws_sink, &welcome).await {
        error!(connection_id = %conn, error = %e, "failed to send welcome");
        state.clients.unregister(conn);
        return;
    }

    // Writer task: registry channel -> WebSocket
    let writer_conn = conn;
    let writer_handle = tokio::spawn(async move {
        while let Some(msg) = outbound_rx.recv().await {
            if let Err(e) = send_msg(&mut ws_sink, &msg).await {
                debug!(connection_id = %writer_conn, error = %e, "websocket send failed");
                break;
            }
        }
    });

    // Reader loop: WebSocket -> hub
    let rate_limiter = ConnectionRateLimiter::new();
    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                if !rate_limiter.check_input() {
                    warn!(connection_id = %conn, "rate limited input message");
                    continue;
                }

                match serde_json::from_str::<ClientMsg>(&text) {
                    Ok(msg) => {
                        if let ClientMsg::RegisterOnline { user_id } = &msg {
                            // Advisory lookup against the external user
                            // store; an unknown id still registers
                            match state.directory.display_name(user_id).await {
                                Some(name) => info!(
                                    connection_id = %conn,
                                    user_id = %user_id,
                                    display_name = %name,
                                    "user coming online"
                                ),
                                None => info!(
                                    connection_id = %conn,
                                    user_id = %user_id,
                                    "user coming online (no directory entry)"
                                ),
                            }
                        }

                        if state.hub.send(conn, msg).await.is_err() {
                            debug!(connection_id = %conn, "hub channel closed");
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(connection_id = %conn, error = %e, "failed to parse client message");
                    }
                }
            }
            Ok(Message::Binary(_)) => {
                warn!(connection_id = %conn, "received binary message, ignoring");
            }
            Ok(Message::Ping(_)) => {
                debug!(connection_id = %conn, "received ping");
            }
            Ok(Message::Pong(_)) => {
                debug!(connection_id = %conn, "received pong");
            }
            Ok(Message::Close(_)) => {
                info!(connection_id = %conn, "client initiated close");
                break;
            }
            Err(e) => {
                error!(connection_id = %conn, error = %e, "websocket error");
                break;
            }
        }
    }

    // Fan out cleanup: presence, snake, sea battle
    state.clients.unregister(conn);
    state.hub.disconnect(conn).await;
    writer_handle.abort();

    info!(connection_id = %conn, "websocket connection closed");
}

/// Send a message over WebSocket
async fn send_msg(
    sink: &mut futures::stream::SplitSink<WebSocket, Message>,
    msg: &ServerMsg,
) -> Result<(), String> {
    let json = serde_json::to_string(msg).map_err(|e| e.to_string())?;
    sink.send(Message::Text(json))
        .await
        .map_err(|e| e.to_string())
}
