//! UseCase: 接続直後の処理
//!
//! 接続をプロジェクトのルームと（指定があれば）チャンネルのルームに参加させ、
//! `connected` メッセージを本人に送ります。

use std::sync::Arc;

use roomcast_shared::{Message, kind, time::now_millis};

use crate::{
    domain::{RoomId, Scope},
    hub::{Connection, Hub},
    infrastructure::dto::websocket::ConnectedPayload,
};

/// 接続のユースケース
pub struct ConnectUseCase {
    hub: Arc<Hub>,
}

impl ConnectUseCase {
    pub fn new(hub: Arc<Hub>) -> Self {
        Self { hub }
    }

    /// Join the rooms implied by `scope` and greet the connection.
    ///
    /// Returns the rooms joined.
    pub async fn execute(&self, conn: &Arc<Connection>, scope: &Scope) -> Vec<RoomId> {
        let mut rooms = vec![scope.project_room()];
        rooms.extend(scope.channel_room());
        for room in &rooms {
            self.hub.join(room, conn).await;
        }

        let payload = ConnectedPayload {
            connection_id: conn.id().to_string(),
            user_id: conn.identity().user_id.to_string(),
            display_name: conn.identity().display_name.clone(),
            rooms: rooms.iter().map(ToString::to_string).collect(),
            connected_at: now_millis(),
        };
        match serde_json::to_value(payload) {
            Ok(value) => {
                conn.send(Arc::new(Message::new(kind::CONNECTED).with_payload(value)));
            }
            Err(e) => tracing::warn!(conn_id = %conn.id(), error = %e, "failed to build connected message"),
        }
        rooms
    }
}
