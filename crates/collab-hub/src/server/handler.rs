//! WebSocket handler
//!
//! Authenticates the connect request, then runs one session per socket.

use super::{ApiError, ApiResult, HubState};
use crate::connection::Connection;
use crate::handlers::MessageDispatcher;
use crate::types::{DocumentId, Section};
use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket},
        Path, Query, State, WebSocketUpgrade,
    },
    response::Response,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use collab_common::{CloseCode, Identity, ServerMessage};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::interval;

/// How long the writer may take to flush a close frame during cleanup
const WRITER_FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

/// Query string of the connect request
#[derive(Debug, Default, Deserialize)]
pub struct ConnectParams {
    pub token: Option<String>,
    pub tab: Option<String>,
}

/// WebSocket connect handler
///
/// GET /ws/proposals/:proposal_id?token=..&tab=..
///
/// The token may also come as a bearer header. It is checked before the
/// upgrade, so a rejected client gets a plain 401 and never joins a room.
pub async fn connect_handler(
    State(state): State<HubState>,
    Path(proposal_id): Path<String>,
    Query(params): Query<ConnectParams>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    ws: WebSocketUpgrade,
) -> ApiResult<Response> {
    let document_id = DocumentId::parse(&proposal_id)
        .ok_or_else(|| ApiError::invalid_path("proposal_id must not be empty"))?;

    let token = params
        .token
        .filter(|t| !t.trim().is_empty())
        .or_else(|| bearer.map(|TypedHeader(Authorization(b))| b.token().to_string()))
        .ok_or(ApiError::MissingAuth)?;

    let identity = state.authenticator().authenticate(&token).await.map_err(|e| {
        tracing::debug!(document_id = %document_id, error = %e, "Connect rejected");
        ApiError::from(e)
    })?;

    let section = params
        .tab
        .as_deref()
        .and_then(Section::parse)
        .unwrap_or_default();

    Ok(ws.on_upgrade(move |socket| handle_socket(state, socket, document_id, identity, section)))
}

/// Run an upgraded, authenticated session until it ends
async fn handle_socket(
    state: HubState,
    mut socket: WebSocket,
    document_id: DocumentId,
    identity: Identity,
    section: Section,
) {
    let hub_config = &state.config().hub;
    let (tx, mut rx) = mpsc::channel::<ServerMessage>(hub_config.outbound_buffer);

    let connection = match state.hub().route_connect(document_id, identity, section, tx) {
        Ok(connection) => connection,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to attach connection");
            let _ = socket.send(close_message(CloseCode::UnknownError)).await;
            return;
        }
    };
    let session_id = connection.session_id();

    tracing::info!(
        session_id = %session_id,
        document_id = %connection.document_id(),
        user_id = %connection.identity().user_id,
        "WebSocket connection established"
    );

    let (mut ws_sink, mut ws_stream) = socket.split();
    let (close_tx, mut close_rx) = oneshot::channel::<CloseCode>();

    // Reader: every inbound frame counts as activity
    let hub_recv = Arc::clone(state.hub());
    let connection_recv = Arc::clone(&connection);
    let mut recv_task = tokio::spawn(async move {
        while let Some(msg) = ws_stream.next().await {
            let msg = match msg {
                Ok(msg) => msg,
                Err(e) => {
                    tracing::warn!(session_id = %session_id, error = %e, "WebSocket error");
                    return;
                }
            };
            connection_recv.touch();

            match msg {
                Message::Text(text) => {
                    if let Err(e) = MessageDispatcher::handle_text(&hub_recv, &connection_recv, &text) {
                        tracing::debug!(session_id = %session_id, error = %e, "Ignoring frame");
                    }
                }
                Message::Binary(data) => {
                    tracing::debug!(
                        session_id = %session_id,
                        len = data.len(),
                        "Ignoring binary frame"
                    );
                }
                Message::Ping(_) | Message::Pong(_) => {
                    tracing::trace!(session_id = %session_id, "Ping/pong received");
                }
                Message::Close(frame) => {
                    tracing::info!(
                        session_id = %session_id,
                        code = ?frame.as_ref().map(|f| f.code),
                        "Client closed connection"
                    );
                    return;
                }
            }
        }
    });

    // Writer: sole owner of the sink
    let mut send_task = tokio::spawn(async move {
        loop {
            tokio::select! {
                msg = rx.recv() => {
                    let Some(msg) = msg else { break };
                    let json = match msg.to_json() {
                        Ok(json) => json,
                        Err(e) => {
                            tracing::warn!(session_id = %session_id, error = %e, "Failed to encode message");
                            continue;
                        }
                    };
                    if ws_sink.send(Message::Text(json)).await.is_err() {
                        tracing::debug!(session_id = %session_id, "Failed to send message to WebSocket");
                        return;
                    }
                }
                code = &mut close_rx => {
                    if let Ok(code) = code {
                        let _ = ws_sink.send(close_message(code)).await;
                    }
                    return;
                }
            }
        }
        let _ = ws_sink.close().await;
    });

    // Idle monitor
    let connection_idle = Arc::clone(&connection);
    let idle_timeout = hub_config.idle_timeout();
    let mut idle_task = tokio::spawn(async move {
        let mut check_interval = interval(idle_timeout / 4);
        loop {
            check_interval.tick().await;

            let idle = connection_idle.idle_for();
            if idle >= idle_timeout {
                tracing::info!(
                    session_id = %session_id,
                    idle_ms = u64::try_from(idle.as_millis()).unwrap_or(u64::MAX),
                    "Connection idle, closing"
                );
                break;
            }
        }
    });

    // Wait for any task to complete
    let (close_code, writer_done) = tokio::select! {
        _ = &mut recv_task => {
            tracing::debug!(session_id = %session_id, "Receive task ended");
            (CloseCode::Normal, false)
        }
        _ = &mut send_task => {
            tracing::debug!(session_id = %session_id, "Send task ended");
            (CloseCode::Normal, true)
        }
        _ = &mut idle_task => (CloseCode::IdleTimeout, false),
    };

    cleanup_connection(&state, &connection);
    recv_task.abort();
    idle_task.abort();

    // Let the writer send its close frame, then give up on it
    if !writer_done {
        let _ = close_tx.send(close_code);
        if tokio::time::timeout(WRITER_FLUSH_TIMEOUT, &mut send_task).await.is_err() {
            send_task.abort();
        }
    }
}

fn close_message(code: CloseCode) -> Message {
    Message::Close(Some(CloseFrame {
        code: code.as_u16(),
        reason: Cow::Borrowed(code.description()),
    }))
}

/// Clean up a connection on disconnect
fn cleanup_connection(state: &HubState, connection: &Connection) {
    tracing::debug!(session_id = %connection.session_id(), "Cleaning up connection");

    let outcome = state.hub().disconnect(connection);
    tracing::debug!(
        session_id = %connection.session_id(),
        outcome = ?outcome,
        rooms = state.hub().room_count(),
        "Connection removed from hub"
    );
}
