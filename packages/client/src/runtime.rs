//! Async driver for [`ConnectionManager`].
//!
//! One task owns the manager and consumes a single event stream: requests
//! from [`ClientHandle`]s plus socket and timer events produced by tasks it
//! spawned. Commands returned by the manager are executed right away, so the
//! manager itself never runs concurrently with anything.

use std::{collections::HashMap, time::Duration};

use futures_util::{SinkExt, StreamExt};
use roomcast_shared::Message;
use tokio::{
    sync::mpsc,
    task::{AbortHandle, JoinHandle},
};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{
        Message as WsMessage,
        protocol::{CloseFrame, frame::coding::CloseCode},
    },
};
use url::Url;

use crate::{
    backoff::Backoff,
    error::ClientError,
    manager::{ABNORMAL_CLOSURE, Command, ConnectionManager, Event, SocketId, TimerId},
    state::ConnectionState,
    target::ConnectTarget,
};

/// Close code seen when the server's close frame carried no status.
const NO_STATUS_RECEIVED: u16 = 1005;

/// What the application receives from a running client.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    Message(Message),
    State(ConnectionState),
}

/// Cheap handle for talking to the driver task.
#[derive(Debug, Clone)]
pub struct ClientHandle {
    requests: mpsc::UnboundedSender<Event>,
}

impl ClientHandle {
    fn request(&self, event: Event) -> Result<(), ClientError> {
        self.requests.send(event).map_err(|_| ClientError::Closed)
    }

    /// Send now, or after the next successful open.
    pub fn send(&self, message: Message) -> Result<(), ClientError> {
        self.request(Event::Send(message))
    }

    pub fn switch_channel(&self, channel_id: impl Into<String>) -> Result<(), ClientError> {
        self.request(Event::SwitchChannel(channel_id.into()))
    }

    /// Reset the backoff and connect again immediately.
    pub fn reconnect(&self) -> Result<(), ClientError> {
        self.request(Event::Reconnect)
    }

    /// Close with 1000 and stop the driver.
    pub fn shutdown(&self) -> Result<(), ClientError> {
        self.request(Event::Teardown)
    }
}

/// A running client.
pub struct Client {
    pub handle: ClientHandle,
    pub events: mpsc::UnboundedReceiver<ClientEvent>,
    pub driver: JoinHandle<()>,
}

impl Client {
    /// Spawn the driver and start connecting to `target`.
    pub fn start(target: ConnectTarget, backoff: Backoff) -> Self {
        let (requests_tx, requests) = mpsc::unbounded_channel();
        let (internal_tx, internal) = mpsc::unbounded_channel();
        let (app, events) = mpsc::unbounded_channel();

        let driver = Driver {
            manager: ConnectionManager::new(backoff),
            internal_tx,
            app,
            writers: HashMap::new(),
            timers: HashMap::new(),
        };
        let driver = tokio::spawn(driver.run(target, requests, internal));

        Self {
            handle: ClientHandle {
                requests: requests_tx,
            },
            events,
            driver,
        }
    }
}

struct Driver {
    manager: ConnectionManager,
    internal_tx: mpsc::UnboundedSender<Event>,
    app: mpsc::UnboundedSender<ClientEvent>,
    writers: HashMap<SocketId, mpsc::UnboundedSender<WsMessage>>,
    timers: HashMap<TimerId, AbortHandle>,
}

impl Driver {
    async fn run(
        mut self,
        target: ConnectTarget,
        mut requests: mpsc::UnboundedReceiver<Event>,
        mut internal: mpsc::UnboundedReceiver<Event>,
    ) {
        self.apply(Event::Enable(target));

        while self.manager.is_active() {
            let event = tokio::select! {
                request = requests.recv() => match request {
                    Some(event) => event,
                    // Every handle is gone
                    None => Event::Teardown,
                },
                Some(event) = internal.recv() => event,
            };
            self.apply(event);
        }

        for (_, timer) in self.timers.drain() {
            timer.abort();
        }
        tracing::debug!("client driver stopped");
    }

    fn apply(&mut self, event: Event) {
        match &event {
            Event::Closed { socket, .. } | Event::Errored { socket, .. } => {
                self.writers.remove(socket);
            }
            Event::RetryElapsed { timer } => {
                self.timers.remove(timer);
            }
            _ => {}
        }
        for command in self.manager.handle(event) {
            self.execute(command);
        }
    }

    fn execute(&mut self, command: Command) {
        match command {
            Command::Open { socket, url } => {
                tracing::info!(socket, %url, "connecting");
                let (tx, rx) = mpsc::unbounded_channel();
                self.writers.insert(socket, tx);
                tokio::spawn(run_socket(socket, url, rx, self.internal_tx.clone()));
            }
            Command::Transmit { socket, text } => match self.writers.get(&socket) {
                Some(writer) => {
                    if writer.send(WsMessage::Text(text.into())).is_err() {
                        tracing::warn!(socket, "socket task gone; message lost");
                    }
                }
                None => tracing::warn!(socket, "no writer for socket; message lost"),
            },
            Command::Close { socket, code } => {
                if let Some(writer) = self.writers.remove(&socket) {
                    let frame = CloseFrame {
                        code: CloseCode::from(code),
                        reason: "".into(),
                    };
                    let _ = writer.send(WsMessage::Close(Some(frame)));
                }
            }
            Command::ScheduleRetry { timer, delay } => {
                let events = self.internal_tx.clone();
                let task = tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = events.send(Event::RetryElapsed { timer });
                });
                self.timers.insert(timer, task.abort_handle());
            }
            Command::CancelRetry { timer } => {
                if let Some(task) = self.timers.remove(&timer) {
                    task.abort();
                }
            }
            Command::Deliver(message) => {
                let _ = self.app.send(ClientEvent::Message(message));
            }
            Command::StateChanged(state) => {
                tracing::info!(%state, "connection state");
                let _ = self.app.send(ClientEvent::State(state));
            }
        }
    }
}

/// Own one socket: connect, forward frames as events, write what the driver
/// queues, and report how it ended.
async fn run_socket(
    socket: SocketId,
    url: Url,
    mut outgoing: mpsc::UnboundedReceiver<WsMessage>,
    events: mpsc::UnboundedSender<Event>,
) {
    let stream = match connect_async(url.as_str()).await {
        Ok((stream, _response)) => stream,
        Err(e) => {
            let _ = events.send(Event::Errored {
                socket,
                error: e.to_string(),
            });
            return;
        }
    };
    let _ = events.send(Event::Opened { socket });

    let (mut sink, mut stream) = stream.split();
    let mut closing = false;
    let end = loop {
        tokio::select! {
            queued = outgoing.recv(), if !closing => {
                let message = queued.unwrap_or(WsMessage::Close(None));
                closing = matches!(message, WsMessage::Close(_));
                if let Err(e) = sink.send(message).await {
                    break Event::Errored { socket, error: e.to_string() };
                }
            }
            incoming = stream.next() => match incoming {
                Some(Ok(WsMessage::Text(text))) => {
                    let _ = events.send(Event::Frame { socket, text: text.as_str().to_owned() });
                }
                Some(Ok(WsMessage::Close(frame))) => {
                    let code = frame.map_or(NO_STATUS_RECEIVED, |f| u16::from(f.code));
                    break Event::Closed { socket, code };
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => break Event::Errored { socket, error: e.to_string() },
                None => break Event::Closed { socket, code: ABNORMAL_CLOSURE },
            },
        }
    };

    // Completes the close handshake when the server initiated it.
    let _ = sink.close().await;
    let _ = events.send(end);
}

/// Wait up to `timeout` for the next event matching `predicate`.
pub async fn wait_for<F>(
    events: &mut mpsc::UnboundedReceiver<ClientEvent>,
    timeout: Duration,
    mut predicate: F,
) -> Option<ClientEvent>
where
    F: FnMut(&ClientEvent) -> bool,
{
    tokio::time::timeout(timeout, async {
        while let Some(event) = events.recv().await {
            if predicate(&event) {
                return Some(event);
            }
        }
        None
    })
    .await
    .ok()
    .flatten()
}
