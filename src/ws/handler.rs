//! WebSocket upgrade handler

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::app::AppState;
use crate::game::{Frame, GameHandle, SessionId};
use crate::util::rate_limit::SessionRateLimiter;

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, state: AppState) {
    let (ws_sink, ws_stream) = socket.split();

    let game = state.game.clone();
    let (outbound_tx, outbound_rx) = mpsc::channel(game.outbound_buffer());

    let Some(session_id) = game.connect(outbound_tx).await else {
        error!("Game server unavailable, dropping connection");
        return;
    };

    info!(session_id, "New WebSocket connection");

    let rate_limiter = SessionRateLimiter::new(state.config.message_rate_limit);
    run_session(session_id, &game, rate_limiter, ws_sink, ws_stream, outbound_rx).await;

    // Cleanup on disconnect
    game.disconnect(session_id).await;

    info!(session_id, "WebSocket connection closed");
}

/// Run the WebSocket session with read/write split
async fn run_session(
    session_id: SessionId,
    game: &GameHandle,
    rate_limiter: SessionRateLimiter,
    mut ws_sink: SplitSink<WebSocket, Message>,
    mut ws_stream: SplitStream<WebSocket>,
    mut outbound_rx: mpsc::Receiver<Frame>,
) {
    // Spawn writer task: outbound queue -> WebSocket
    let writer_handle = tokio::spawn(async move {
        while let Some(frame) = outbound_rx.recv().await {
            if let Err(e) = ws_sink.send(Message::Text(frame.to_string())).await {
                debug!(session_id, error = %e, "WebSocket send failed");
                break;
            }
        }
        let _ = ws_sink.close().await;
    });

    // Reader loop: WebSocket -> event loop
    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                if !rate_limiter.check() {
                    warn!(session_id, "Rate limited inbound message");
                    continue;
                }

                if !game.inbound(session_id, text).await {
                    debug!(session_id, "Event loop closed");
                    break;
                }
            }
            Ok(Message::Binary(_)) => {
                warn!(session_id, "Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) => {
                debug!(session_id, "Received ping");
            }
            Ok(Message::Pong(_)) => {
                debug!(session_id, "Received pong");
            }
            Ok(Message::Close(_)) => {
                info!(session_id, "Client initiated close");
                break;
            }
            Err(e) => {
                error!(session_id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    // Abort writer task
    writer_handle.abort();
}
