//! WebSocket connection handlers.

use std::{fmt::Display, sync::Arc, time::Duration};

use axum::{
    extract::{
        Query, State,
        ws::{CloseFrame, Message as WsMessage, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use futures_util::{Sink, SinkExt, StreamExt, future};
use roomcast_shared::{Message, close_code, kind};
use tokio::sync::mpsc;

use crate::{
    domain::{AuthError, ChannelId, Identity, ProjectId, Scope},
    hub::{
        Connection, Hub, Outbound,
        outbound::{self, DrainError},
    },
    infrastructure::dto::websocket::ErrorPayload,
    ui::state::{AppState, ConnectQuery},
    usecase::{ConnectUseCase, DisconnectUseCase, RouteMessageUseCase},
};

/// How long the writer may keep flushing after the reader has finished.
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Reason a socket is closed right after the upgrade.
struct Rejection {
    code: u16,
    reason: String,
}

impl From<AuthError> for Rejection {
    fn from(e: AuthError) -> Self {
        let code = match e {
            AuthError::Unauthorized => close_code::UNAUTHORIZED,
            AuthError::Forbidden(_) => close_code::FORBIDDEN,
        };
        Self {
            code,
            reason: e.to_string(),
        }
    }
}

pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(query): Query<ConnectQuery>,
) -> impl IntoResponse {
    // Upgrade first so rejections reach the client as close codes it can act on.
    ws.on_upgrade(move |socket| handle_socket(socket, state, query))
}

async fn authenticate(state: &AppState, query: &ConnectQuery) -> Result<(Identity, Scope), Rejection> {
    let token = query
        .token
        .as_deref()
        .filter(|t| !t.is_empty())
        .ok_or(AuthError::Unauthorized)?;
    let forbidden = |reason: String| Rejection {
        code: close_code::FORBIDDEN,
        reason,
    };
    let project = ProjectId::new(query.project_id.clone().unwrap_or_default())
        .map_err(|e| forbidden(e.to_string()))?;
    let channel = query
        .channel_id
        .clone()
        .filter(|c| !c.is_empty())
        .map(ChannelId::new)
        .transpose()
        .map_err(|e| forbidden(e.to_string()))?;

    let identity = state.verifier.verify(token, &project).await?;
    Ok((identity, Scope::new(project, channel)))
}

async fn close_with(mut socket: WebSocket, rejection: Rejection) {
    let frame = CloseFrame {
        code: rejection.code,
        reason: rejection.reason.into(),
    };
    if let Err(e) = socket.send(WsMessage::Close(Some(frame))).await {
        tracing::debug!("Failed to send close frame: {}", e);
    }
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, query: ConnectQuery) {
    let (identity, scope) = match authenticate(&state, &query).await {
        Ok(accepted) => accepted,
        Err(rejection) => {
            tracing::warn!(
                code = rejection.code,
                reason = %rejection.reason,
                "Rejecting WebSocket connection"
            );
            close_with(socket, rejection).await;
            return;
        }
    };

    let (conn, rx) = Connection::new(identity, &state.delivery);
    let rooms = ConnectUseCase::new(state.hub.clone())
        .execute(&conn, &scope)
        .await;
    tracing::info!(
        conn_id = %conn.id(),
        user_id = %conn.identity().user_id,
        rooms = rooms.len(),
        "Client connected"
    );

    let (sink, mut stream) = socket.split();
    let sink = Box::pin(sink.with(|text: String| {
        future::ready(Ok::<_, axum::Error>(WsMessage::Text(text.into())))
    }));

    // Writer: drain this connection's queue onto the socket
    let mut send_task = tokio::spawn(run_writer(state.hub.clone(), conn.clone(), rx, sink));

    // Reader: decode frames and route them through the hub
    let reader_conn = conn.clone();
    let router = RouteMessageUseCase::new(state.hub.clone());
    let mut recv_task = tokio::spawn(async move {
        let mut scope = scope;
        while let Some(frame) = stream.next().await {
            let frame = match frame {
                Ok(frame) => frame,
                Err(e) => {
                    tracing::warn!(conn_id = %reader_conn.id(), "WebSocket error: {}", e);
                    break;
                }
            };
            match frame {
                WsMessage::Text(text) => {
                    handle_text(&router, &reader_conn, &mut scope, text.as_str()).await;
                }
                WsMessage::Binary(bytes) => {
                    tracing::warn!(conn_id = %reader_conn.id(), len = bytes.len(), "Ignoring binary frame");
                }
                WsMessage::Close(frame) => {
                    tracing::info!(
                        conn_id = %reader_conn.id(),
                        code = frame.as_ref().map(|f| f.code),
                        "Client requested close"
                    );
                    break;
                }
                // Ping/pong is answered by the WebSocket implementation
                WsMessage::Ping(_) | WsMessage::Pong(_) => {}
            }
        }
    });

    let writer_finished = tokio::select! {
        _ = &mut recv_task => false,
        result = &mut send_task => {
            match result {
                Ok(Ok(written)) => tracing::debug!(conn_id = %conn.id(), written, "Writer finished"),
                // Already torn down by the writer
                Ok(Err(_)) => {}
                Err(e) => tracing::error!(conn_id = %conn.id(), "Writer task failed: {}", e),
            }
            true
        }
    };

    let disconnect = DisconnectUseCase::new(state.hub.clone());
    if writer_finished {
        recv_task.abort();
        if !conn.is_closed() {
            disconnect.execute(&conn).await;
        }
    } else {
        // Closing the queue lets the writer finish what is already queued.
        disconnect.execute(&conn).await;
        if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, &mut send_task)
            .await
            .is_err()
        {
            send_task.abort();
        }
    }
}

/// Drain `conn`'s queue onto `sink`. A failed write takes the connection out
/// of every room and closes its queue, so broadcasts stop targeting it.
async fn run_writer<S>(
    hub: Arc<Hub>,
    conn: Arc<Connection>,
    rx: mpsc::Receiver<Outbound>,
    sink: S,
) -> Result<usize, DrainError>
where
    S: Sink<String> + Unpin,
    S::Error: Display,
{
    let result = outbound::drain(rx, sink).await;
    if let Err(e) = &result {
        tracing::error!(conn_id = %conn.id(), "Write failed, tearing down: {}", e);
        DisconnectUseCase::new(hub).execute(&conn).await;
    }
    result
}

async fn handle_text(
    router: &RouteMessageUseCase,
    conn: &Arc<Connection>,
    scope: &mut Scope,
    text: &str,
) {
    let message = match Message::decode(text) {
        Ok(message) => message,
        Err(e) => {
            tracing::warn!(conn_id = %conn.id(), "Discarding malformed frame: {}", e);
            return;
        }
    };
    tracing::debug!(conn_id = %conn.id(), kind = %message.kind, "Received message");

    if let Err(e) = router.execute(conn, scope, message).await {
        tracing::warn!(conn_id = %conn.id(), "Rejected message: {}", e);
        let payload = serde_json::to_value(ErrorPayload {
            reason: e.to_string(),
        })
        .ok();
        let mut error = Message::new(kind::ERROR);
        error.payload = payload;
        conn.send(Arc::new(error));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::{RoomId, UserId},
        hub::DeliveryConfig,
    };
    use futures_util::sink;

    #[tokio::test]
    async fn test_write_failure_tears_connection_down() {
        // テスト項目: ソケットへの書き込みに失敗すると、全ルームから外れて送信キューが閉じられる
        // given (前提条件):
        let hub = Arc::new(Hub::local());
        let (conn, rx) = Connection::new(
            Identity::new(UserId::new("alice".to_string()).unwrap(), None),
            &DeliveryConfig::default(),
        );
        let (a, b) = (RoomId::from_raw("a"), RoomId::from_raw("b"));
        hub.join(&a, &conn).await;
        hub.join(&b, &conn).await;
        hub.broadcast(&a, Message::new(kind::CHAT)).await;
        let broken = Box::pin(sink::unfold((), |(), _text: String| async {
            Err::<(), _>(std::io::Error::other("broken pipe"))
        }));

        // when (操作):
        let result = run_writer(hub.clone(), conn.clone(), rx, broken).await;

        // then (期待する結果):
        assert!(matches!(result, Err(DrainError::Write(_))));
        assert_eq!(hub.room_count().await, 0);
        assert!(conn.is_closed());
        assert!(!hub.is_member(&a, conn.id()).await);
    }

    #[tokio::test]
    async fn test_writer_finishing_normally_leaves_rooms_alone() {
        // テスト項目: キューが閉じられて正常終了した場合はルームを操作しない
        let hub = Arc::new(Hub::local());
        let (conn, rx) = Connection::new(
            Identity::new(UserId::new("bob".to_string()).unwrap(), None),
            &DeliveryConfig::default(),
        );
        let room = RoomId::from_raw("a");
        hub.join(&room, &conn).await;
        conn.close();
        let sink = sink::drain::<String>();

        let result = run_writer(hub.clone(), conn.clone(), rx, sink).await;

        assert_eq!(result.unwrap(), 0);
        assert!(hub.is_member(&room, conn.id()).await);
    }
}
