//! UseCase: 切断処理
//!
//! 接続を全てのルームから外し、バッチを吐き出してから送信キューを閉じます。

use std::sync::Arc;

use crate::{
    domain::RoomId,
    hub::{Connection, Hub},
};

/// 切断のユースケース
pub struct DisconnectUseCase {
    hub: Arc<Hub>,
}

impl DisconnectUseCase {
    pub fn new(hub: Arc<Hub>) -> Self {
        Self { hub }
    }

    /// Returns the rooms the connection was removed from.
    pub async fn execute(&self, conn: &Connection) -> Vec<RoomId> {
        let rooms = self.hub.leave_all(conn.id()).await;
        conn.close();
        tracing::info!(
            conn_id = %conn.id(),
            user_id = %conn.identity().user_id,
            rooms = rooms.len(),
            dropped = conn.dropped(),
            "connection torn down"
        );
        rooms
    }
}
