//! UseCase: 受信メッセージの振り分け
//!
//! ## テスト実装の作業記録
//!
//! ### 何をテストしているか
//! - RouteMessageUseCase::execute() メソッド
//! - switch_channel によるルームの入れ替え
//! - チャットのブロードキャスト（送信者へのエコー抑制、message_id の付与）
//!
//! ### どのような状況を想定しているか
//! - 正常系：チャット、チャンネル切り替え、presence/typing
//! - 異常系：channel_id の無い switch_channel、クライアントからの batch

use std::sync::Arc;

use roomcast_shared::{Message, kind};

use super::error::RouteError;
use crate::{
    domain::{ChannelId, RoomId, Scope},
    hub::{Connection, Hub},
};

/// What happened to an inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Routed {
    Broadcast { room: RoomId, delivered: usize },
    Switched { left: Option<RoomId>, joined: RoomId },
    Unchanged,
}

/// 受信メッセージ振り分けのユースケース
pub struct RouteMessageUseCase {
    hub: Arc<Hub>,
}

impl RouteMessageUseCase {
    pub fn new(hub: Arc<Hub>) -> Self {
        Self { hub }
    }

    /// Route one decoded inbound message from `conn`.
    ///
    /// `scope` is the connection's current scope and is updated by
    /// `switch_channel`.
    pub async fn execute(
        &self,
        conn: &Arc<Connection>,
        scope: &mut Scope,
        message: Message,
    ) -> Result<Routed, RouteError> {
        match message.kind.as_str() {
            kind::SWITCH_CHANNEL => self.switch_channel(conn, scope, message).await,
            kind::BATCH | kind::CONNECTED => Err(RouteError::ReservedType(message.kind)),
            _ => Ok(self.relay_to_room(conn, scope, message).await),
        }
    }

    async fn switch_channel(
        &self,
        conn: &Arc<Connection>,
        scope: &mut Scope,
        message: Message,
    ) -> Result<Routed, RouteError> {
        let channel = ChannelId::new(message.channel_id.ok_or(RouteError::MissingChannel)?)?;
        if scope.channel.as_ref() == Some(&channel) {
            return Ok(Routed::Unchanged);
        }

        let left = scope.channel_room();
        if let Some(room) = &left {
            self.hub.leave(room, conn.id()).await;
        }
        scope.channel = Some(channel);
        let joined = scope.target_room();
        self.hub.join(&joined, conn).await;
        tracing::info!(
            conn_id = %conn.id(),
            from = ?left.as_ref().map(RoomId::as_str),
            to = %joined,
            "switched channel"
        );
        Ok(Routed::Switched { left, joined })
    }

    async fn relay_to_room(&self, conn: &Arc<Connection>, scope: &Scope, mut message: Message) -> Routed {
        if message.kind == kind::CHAT && message.message_id.is_none() {
            message.message_id = Some(uuid::Uuid::new_v4().to_string());
        }
        message.channel_id = scope.channel.as_ref().map(ToString::to_string);
        message
            .extra
            .insert("sender".to_string(), conn.identity().sender_value());

        let room = scope.target_room();
        let delivered = self.hub.broadcast_except(&room, message, conn.id()).await;
        Routed::Broadcast { room, delivered }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::{Identity, ProjectId, UserId},
        hub::{DeliveryConfig, Outbound},
    };
    use serde_json::json;
    use tokio::sync::mpsc;

    fn connect(name: &str) -> (Arc<Connection>, mpsc::Receiver<Outbound>) {
        let config = DeliveryConfig {
            batching: None,
            ..DeliveryConfig::default()
        };
        Connection::new(
            Identity::new(UserId::new(name.to_string()).unwrap(), Some(name.to_uppercase())),
            &config,
        )
    }

    fn scope(channel: Option<&str>) -> Scope {
        Scope::new(
            ProjectId::new("p1".to_string()).unwrap(),
            channel.map(|c| ChannelId::new(c.to_string()).unwrap()),
        )
    }

    #[tokio::test]
    async fn test_chat_is_broadcast_to_others_with_sender_and_id() {
        // テスト項目: チャットは送信者以外に届き、sender と message_id が付与される
        // given (前提条件):
        let hub = Arc::new(Hub::local());
        let usecase = RouteMessageUseCase::new(hub.clone());
        let (alice, mut rx_a) = connect("alice");
        let (bob, mut rx_b) = connect("bob");
        let mut alice_scope = scope(Some("general"));
        hub.join(&alice_scope.target_room(), &alice).await;
        hub.join(&alice_scope.target_room(), &bob).await;

        // when (操作):
        let routed = usecase
            .execute(
                &alice,
                &mut alice_scope,
                Message::new(kind::CHAT).with_payload(json!({"text": "hi"})),
            )
            .await
            .unwrap();

        // then (期待する結果):
        assert_eq!(
            routed,
            Routed::Broadcast {
                room: alice_scope.target_room(),
                delivered: 1
            }
        );
        assert!(rx_a.try_recv().is_err());
        let received = rx_b.try_recv().unwrap();
        assert!(received.message_id.is_some());
        assert_eq!(received.channel_id.as_deref(), Some("general"));
        assert_eq!(received.extra["sender"]["user_id"], "alice");
        assert_eq!(received.extra["sender"]["display_name"], "ALICE");
    }

    #[tokio::test]
    async fn test_chat_keeps_client_message_id() {
        // テスト項目: クライアントが付けた message_id はそのまま保たれる（楽観的 UI の照合用）
        let hub = Arc::new(Hub::local());
        let usecase = RouteMessageUseCase::new(hub.clone());
        let (alice, _rx_a) = connect("alice");
        let (bob, mut rx_b) = connect("bob");
        let mut s = scope(None);
        hub.join(&s.target_room(), &alice).await;
        hub.join(&s.target_room(), &bob).await;

        usecase
            .execute(&alice, &mut s, Message::new(kind::CHAT).with_message_id("client-1"))
            .await
            .unwrap();

        assert_eq!(rx_b.try_recv().unwrap().message_id.as_deref(), Some("client-1"));
    }

    #[tokio::test]
    async fn test_switch_channel_moves_membership() {
        // テスト項目: switch_channel で旧チャンネルのルームを離れ新チャンネルのルームに参加する
        // given (前提条件):
        let hub = Arc::new(Hub::local());
        let usecase = RouteMessageUseCase::new(hub.clone());
        let (alice, _rx) = connect("alice");
        let mut s = scope(Some("general"));
        let old_room = s.target_room();
        hub.join(&s.project_room(), &alice).await;
        hub.join(&old_room, &alice).await;

        // when (操作):
        let routed = usecase
            .execute(&alice, &mut s, Message::switch_channel("random"))
            .await
            .unwrap();

        // then (期待する結果):
        let new_room = s.target_room();
        assert_eq!(
            routed,
            Routed::Switched {
                left: Some(old_room.clone()),
                joined: new_room.clone()
            }
        );
        assert!(!hub.is_member(&old_room, alice.id()).await);
        assert!(hub.is_member(&new_room, alice.id()).await);
        assert!(hub.is_member(&s.project_room(), alice.id()).await);
        assert_eq!(hub.room_count().await, 2, "the emptied channel room is gone");
    }

    #[tokio::test]
    async fn test_switch_to_current_channel_is_unchanged() {
        let hub = Arc::new(Hub::local());
        let usecase = RouteMessageUseCase::new(hub.clone());
        let (alice, _rx) = connect("alice");
        let mut s = scope(Some("general"));

        let routed = usecase
            .execute(&alice, &mut s, Message::switch_channel("general"))
            .await
            .unwrap();

        assert_eq!(routed, Routed::Unchanged);
    }

    #[tokio::test]
    async fn test_switch_channel_without_channel_id_is_rejected() {
        // テスト項目: channel_id の無い switch_channel はエラーになり、スコープは変わらない
        let hub = Arc::new(Hub::local());
        let usecase = RouteMessageUseCase::new(hub.clone());
        let (alice, _rx) = connect("alice");
        let mut s = scope(Some("general"));

        let result = usecase
            .execute(&alice, &mut s, Message::new(kind::SWITCH_CHANNEL))
            .await;

        assert_eq!(result, Err(RouteError::MissingChannel));
        assert_eq!(s.channel.unwrap().as_str(), "general");
    }

    #[tokio::test]
    async fn test_client_batch_is_rejected() {
        let hub = Arc::new(Hub::local());
        let usecase = RouteMessageUseCase::new(hub.clone());
        let (alice, _rx) = connect("alice");
        let mut s = scope(None);

        let result = usecase
            .execute(&alice, &mut s, Message::batch(vec![]))
            .await;

        assert_eq!(result, Err(RouteError::ReservedType("batch".to_string())));
    }
}
