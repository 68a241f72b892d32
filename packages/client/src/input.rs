//! Parsing of lines typed into the CLI.

use roomcast_shared::{Message, kind};
use serde_json::json;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Chat(String),
    Switch(String),
    Reconnect,
    Quit,
    Help,
    Unknown(String),
}

pub const HELP: &str = "commands: /switch <channel>, /reconnect, /quit, /help; anything else is sent as chat";

impl Input {
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        let Some(command) = line.strip_prefix('/') else {
            return Some(Self::Chat(line.to_string()));
        };
        let (name, arg) = command
            .split_once(char::is_whitespace)
            .map_or((command, ""), |(name, arg)| (name, arg.trim()));
        let input = match (name, arg) {
            ("switch", channel) if !channel.is_empty() => Self::Switch(channel.to_string()),
            ("reconnect", "") => Self::Reconnect,
            ("quit" | "exit", "") => Self::Quit,
            ("help", _) => Self::Help,
            _ => Self::Unknown(line.to_string()),
        };
        Some(input)
    }
}

/// Chat message carrying `text`.
pub fn chat(text: &str) -> Message {
    Message::new(kind::CHAT).with_payload(json!({ "text": text }))
}

/// One-line rendering of an inbound message for the terminal.
pub fn render(message: &Message) -> String {
    let sender = message
        .extra
        .get("sender")
        .and_then(|s| s.get("display_name").filter(|n| !n.is_null()).or_else(|| s.get("user_id")))
        .and_then(|n| n.as_str())
        .unwrap_or("server");
    let channel = message
        .channel_id
        .as_deref()
        .map(|c| format!("#{c} "))
        .unwrap_or_default();
    match message.kind.as_str() {
        kind::CHAT => {
            let text = message
                .payload
                .as_ref()
                .and_then(|p| p.get("text"))
                .and_then(|t| t.as_str())
                .unwrap_or_default();
            format!("{channel}{sender}: {text}")
        }
        other => {
            let payload = message
                .payload
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_default();
            format!("{channel}[{other}] {sender} {payload}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        // テスト項目: 入力行がコマンドとチャットに振り分けられる
        assert_eq!(Input::parse("hello there"), Some(Input::Chat("hello there".to_string())));
        assert_eq!(Input::parse("/switch random"), Some(Input::Switch("random".to_string())));
        assert_eq!(Input::parse("/reconnect"), Some(Input::Reconnect));
        assert_eq!(Input::parse("/quit"), Some(Input::Quit));
        assert_eq!(Input::parse("  "), None);
        assert_eq!(Input::parse("/switch"), Some(Input::Unknown("/switch".to_string())));
        assert_eq!(Input::parse("/dance"), Some(Input::Unknown("/dance".to_string())));
    }

    #[test]
    fn test_render_chat_prefers_display_name() {
        let mut message = chat("hi").with_channel("general");
        message
            .extra
            .insert("sender".to_string(), json!({"user_id": "alice", "display_name": "Alice"}));

        assert_eq!(render(&message), "#general Alice: hi");
    }

    #[test]
    fn test_render_falls_back_to_user_id() {
        let mut message = chat("hi");
        message
            .extra
            .insert("sender".to_string(), json!({"user_id": "bob", "display_name": null}));

        assert_eq!(render(&message), "bob: hi");
    }
}
