//! JSON wire protocol spoken over the WebSocket.
//!
//! Every frame is a text frame holding one [`Message`]:
//!
//! ```text
//! { "type": "...", "payload": ..., "channel_id": "...", "message_id": "...", ...extra }
//! { "type": "batch", "messages": [ <message>, <message>, ... ] }
//! { "type": "switch_channel", "channel_id": "..." }
//! ```
//!
//! The hub never looks inside `payload`; only `type` (and, for batching, the
//! batch envelope) matters to the delivery path.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Well-known values of the `type` discriminator.
pub mod kind {
    pub const BATCH: &str = "batch";
    pub const SWITCH_CHANNEL: &str = "switch_channel";
    pub const CHAT: &str = "chat";
    pub const PRESENCE: &str = "presence";
    pub const TYPING: &str = "typing";
    pub const CONNECTED: &str = "connected";
    pub const ERROR: &str = "error";
}

/// WebSocket close codes with protocol meaning.
pub mod close_code {
    /// Clean shutdown. Clients do not retry.
    pub const NORMAL: u16 = 1000;
    /// Missing or invalid credential.
    pub const UNAUTHORIZED: u16 = 4001;
    /// Valid credential without access to the requested scope.
    pub const FORBIDDEN: u16 = 4003;

    /// Whether `code` reports an authentication rejection.
    pub fn is_auth_failure(code: u16) -> bool {
        code == UNAUTHORIZED || code == FORBIDDEN
    }

    /// Whether a close with `code` should be followed by a reconnect attempt.
    pub fn is_retryable(code: u16) -> bool {
        code != NORMAL && !is_auth_failure(code)
    }
}

/// Errors raised while encoding or decoding frames.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("expected a batch envelope, got type '{0}'")]
    NotABatch(String),
}

/// One message on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    /// Fields the protocol does not name, carried through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Message {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            payload: None,
            channel_id: None,
            message_id: None,
            extra: Map::new(),
        }
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn with_channel(mut self, channel_id: impl Into<String>) -> Self {
        self.channel_id = Some(channel_id.into());
        self
    }

    pub fn with_message_id(mut self, message_id: impl Into<String>) -> Self {
        self.message_id = Some(message_id.into());
        self
    }

    /// The `switch_channel` control signal.
    pub fn switch_channel(channel_id: impl Into<String>) -> Self {
        Self::new(kind::SWITCH_CHANNEL).with_channel(channel_id)
    }

    /// Wrap `messages` in a batch envelope, preserving their order.
    ///
    /// Callers are expected to pass two or more messages; a single message is
    /// always sent unwrapped.
    pub fn batch(messages: Vec<Message>) -> Self {
        let items = messages
            .into_iter()
            .filter_map(|m| serde_json::to_value(m).ok())
            .collect();
        let mut envelope = Self::new(kind::BATCH);
        envelope
            .extra
            .insert("messages".to_string(), Value::Array(items));
        envelope
    }

    pub fn is_batch(&self) -> bool {
        self.kind == kind::BATCH
    }

    /// Split a batch envelope back into its messages, in order.
    pub fn into_batch(mut self) -> Result<Vec<Message>, ProtocolError> {
        if !self.is_batch() {
            return Err(ProtocolError::NotABatch(self.kind));
        }
        let items = self
            .extra
            .remove("messages")
            .unwrap_or(Value::Array(Vec::new()));
        Ok(serde_json::from_value(items)?)
    }

    /// Flatten a frame into the messages it carries: batches are unwrapped,
    /// anything else is returned as-is.
    pub fn into_messages(self) -> Result<Vec<Message>, ProtocolError> {
        if self.is_batch() {
            self.into_batch()
        } else {
            Ok(vec![self])
        }
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_omits_absent_optional_fields() {
        // テスト項目: 省略可能なフィールドが無い場合は JSON に出力されない
        // given (前提条件):
        let msg = Message::new(kind::CHAT).with_payload(json!({"text": "hi"}));

        // when (操作):
        let value: Value = serde_json::from_str(&msg.encode().unwrap()).unwrap();

        // then (期待する結果):
        assert_eq!(value, json!({"type": "chat", "payload": {"text": "hi"}}));
    }

    #[test]
    fn test_unknown_fields_are_preserved() {
        // テスト項目: 未知のフィールドは extra に保持され、再エンコードでも失われない
        // given (前提条件):
        let text = r#"{"type":"reaction","message_id":"m1","emoji":"+1"}"#;

        // when (操作):
        let msg = Message::decode(text).unwrap();

        // then (期待する結果):
        assert_eq!(msg.kind, "reaction");
        assert_eq!(msg.message_id.as_deref(), Some("m1"));
        assert_eq!(msg.extra.get("emoji"), Some(&json!("+1")));
        let value: Value = serde_json::from_str(&msg.encode().unwrap()).unwrap();
        assert_eq!(value["emoji"], "+1");
    }

    #[test]
    fn test_decode_rejects_missing_type() {
        // テスト項目: type を持たないフレームはデコードエラーになる
        let result = Message::decode(r#"{"payload": 1}"#);
        assert!(matches!(result, Err(ProtocolError::Malformed(_))));
    }

    #[test]
    fn test_decode_rejects_non_json() {
        let result = Message::decode("not json at all");
        assert!(matches!(result, Err(ProtocolError::Malformed(_))));
    }

    #[test]
    fn test_batch_wire_shape() {
        // テスト項目: バッチは {type: "batch", messages: [...]} の形で順序を保つ
        // given (前提条件):
        let batch = Message::batch(vec![
            Message::new(kind::TYPING).with_channel("c1"),
            Message::new(kind::PRESENCE),
        ]);

        // when (操作):
        let value: Value = serde_json::from_str(&batch.encode().unwrap()).unwrap();

        // then (期待する結果):
        assert_eq!(
            value,
            json!({
                "type": "batch",
                "messages": [
                    {"type": "typing", "channel_id": "c1"},
                    {"type": "presence"}
                ]
            })
        );
    }

    #[test]
    fn test_into_messages_unwraps_batch_in_order() {
        // テスト項目: バッチを展開すると元の順序でメッセージが得られる
        // given (前提条件):
        let originals: Vec<Message> = (0..3)
            .map(|i| Message::new(kind::TYPING).with_message_id(format!("m{i}")))
            .collect();
        let text = Message::batch(originals.clone()).encode().unwrap();

        // when (操作):
        let messages = Message::decode(&text).unwrap().into_messages().unwrap();

        // then (期待する結果):
        assert_eq!(messages, originals);
    }

    #[test]
    fn test_into_batch_rejects_plain_message() {
        let result = Message::new(kind::CHAT).into_batch();
        assert!(matches!(result, Err(ProtocolError::NotABatch(k)) if k == "chat"));
    }

    #[test]
    fn test_switch_channel_wire_shape() {
        let value: Value =
            serde_json::from_str(&Message::switch_channel("general").encode().unwrap()).unwrap();
        assert_eq!(value, json!({"type": "switch_channel", "channel_id": "general"}));
    }

    #[test]
    fn test_close_code_classification() {
        // テスト項目: 1000 と認証失敗コードは再接続しない、それ以外は再接続する
        assert!(!close_code::is_retryable(close_code::NORMAL));
        assert!(!close_code::is_retryable(close_code::UNAUTHORIZED));
        assert!(!close_code::is_retryable(close_code::FORBIDDEN));
        assert!(close_code::is_retryable(1001));
        assert!(close_code::is_retryable(1006));
        assert!(close_code::is_retryable(4000));
    }
}
