//! Shared helpers for integration tests: an in-process server and a thin
//! WebSocket client.

#![allow(dead_code)]

use std::{net::SocketAddr, sync::Arc, time::Duration};

use clap::Parser;
use futures_util::{SinkExt, StreamExt};
use roomcast_server::{
    ServerConfig,
    domain::RoomId,
    ui::{self, state::AppState},
};
use serde_json::Value;
use tokio::{net::TcpStream, sync::oneshot, task::JoinHandle};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{Message, protocol::CloseFrame},
};

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Tokens accepted by a default test server.
pub const DEFAULT_TOKENS: [&str; 3] = ["alice-token=alice:Alice", "bob-token=bob:Bob", "carol-token=carol:Carol"];

const RECV_TIMEOUT: Duration = Duration::from_secs(2);

/// A server bound to an ephemeral port; stops when dropped.
pub struct TestServer {
    addr: SocketAddr,
    pub state: Arc<AppState>,
    shutdown: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl TestServer {
    /// Start with the default token table.
    pub async fn start() -> Self {
        Self::start_with_args(&[]).await
    }

    /// Start with extra command-line flags on top of the default tokens.
    pub async fn start_with_args(extra: &[&str]) -> Self {
        let mut args = vec!["roomcast-server".to_string()];
        for token in DEFAULT_TOKENS {
            args.push("--token".to_string());
            args.push(token.to_string());
        }
        args.extend(extra.iter().map(|a| a.to_string()));
        let config = ServerConfig::try_parse_from(args).expect("Invalid test config");
        Self::start_with_state(ui::build_state(&config)).await
    }

    pub async fn start_with_state(state: Arc<AppState>) -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind test listener");
        let addr = listener.local_addr().expect("No local address");
        let (shutdown, stopped) = oneshot::channel::<()>();
        let server_state = state.clone();
        let handle = tokio::spawn(async move {
            let shutdown = async {
                let _ = stopped.await;
            };
            ui::serve(listener, server_state, shutdown)
                .await
                .expect("Server failed");
        });
        Self {
            addr,
            state,
            shutdown: Some(shutdown),
            handle,
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn ws_url(&self, project: &str, token: &str, channel: Option<&str>) -> String {
        let mut url = format!("ws://{}/ws?project_id={}&token={}", self.addr, project, token);
        if let Some(channel) = channel {
            url.push_str(&format!("&channel_id={channel}"));
        }
        url
    }

    pub fn relay_url(&self) -> String {
        format!("ws://{}/relay", self.addr)
    }

    /// Wait until `room` has `count` members on this server.
    pub async fn wait_for_members(&self, room: &str, count: usize) {
        let room = RoomId::from_raw(room);
        tokio::time::timeout(RECV_TIMEOUT, async {
            while self.state.hub.member_count(&room).await != count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("Timed out waiting for room membership");
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        self.handle.abort();
    }
}

pub async fn connect(url: &str) -> WsStream {
    let (ws, _) = connect_async(url).await.expect("Failed to connect");
    ws
}

/// Connect and consume the `connected` greeting.
pub async fn connect_and_greet(url: &str) -> WsStream {
    let mut ws = connect(url).await;
    let greeting = recv_json(&mut ws).await;
    assert_eq!(greeting["type"], "connected", "unexpected first frame: {greeting}");
    ws
}

pub async fn send_json(ws: &mut WsStream, value: Value) {
    ws.send(Message::Text(value.to_string().into()))
        .await
        .expect("Failed to send");
}

/// Next text frame as JSON.
pub async fn recv_json(ws: &mut WsStream) -> Value {
    loop {
        let frame = tokio::time::timeout(RECV_TIMEOUT, ws.next())
            .await
            .expect("Timed out waiting for a frame")
            .expect("Stream ended")
            .expect("WebSocket error");
        match frame {
            Message::Text(text) => return serde_json::from_str(text.as_str()).expect("Invalid JSON"),
            Message::Close(frame) => panic!("Connection closed: {frame:?}"),
            _ => continue,
        }
    }
}

/// Next close frame; any text frame before it fails the test.
pub async fn recv_close(ws: &mut WsStream) -> Option<CloseFrame> {
    loop {
        let frame = tokio::time::timeout(RECV_TIMEOUT, ws.next())
            .await
            .expect("Timed out waiting for close")?;
        match frame {
            Ok(Message::Close(frame)) => return frame,
            Ok(Message::Text(text)) => panic!("Expected close, got text: {text}"),
            Ok(_) => continue,
            Err(_) => return None,
        }
    }
}

/// Assert that no text frame arrives within `wait`.
pub async fn assert_silent(ws: &mut WsStream, wait: Duration) {
    if let Ok(Some(Ok(Message::Text(text)))) = tokio::time::timeout(wait, ws.next()).await {
        panic!("Expected no message, got: {text}");
    }
}
