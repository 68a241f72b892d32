//! Connection lifecycle state machine.
//!
//! [`ConnectionManager`] owns no sockets or timers. It consumes [`Event`]s
//! (socket callbacks, timer expiry, application requests) and answers with
//! [`Command`]s for the driver to execute. Socket and timer events carry the
//! id they were issued with, so events from a superseded socket or a
//! cancelled timer are recognised and ignored. After [`Event::Teardown`]
//! every event is ignored.

use std::{collections::VecDeque, time::Duration};

use roomcast_shared::{Message, close_code};
use url::Url;

use crate::{
    backoff::Backoff,
    state::ConnectionState,
    target::ConnectTarget,
};

/// Identifies one socket opened by the driver.
pub type SocketId = u64;
/// Identifies one scheduled retry.
pub type TimerId = u64;

/// Close code reported when a socket ended without a close frame.
pub const ABNORMAL_CLOSURE: u16 = 1006;

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Start connecting to `target`, or switch to it if it differs.
    Enable(ConnectTarget),
    Opened { socket: SocketId },
    Frame { socket: SocketId, text: String },
    Closed { socket: SocketId, code: u16 },
    Errored { socket: SocketId, error: String },
    RetryElapsed { timer: TimerId },
    /// Application message to transmit.
    Send(Message),
    SwitchChannel(String),
    /// Drop the current socket and connect again right away.
    Reconnect,
    Teardown,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Open { socket: SocketId, url: Url },
    Transmit { socket: SocketId, text: String },
    Close { socket: SocketId, code: u16 },
    ScheduleRetry { timer: TimerId, delay: Duration },
    CancelRetry { timer: TimerId },
    /// Inbound message for the application.
    Deliver(Message),
    StateChanged(ConnectionState),
}

pub struct ConnectionManager {
    state: ConnectionState,
    /// Cleared by teardown; nothing is processed afterwards.
    active: bool,
    target: Option<ConnectTarget>,
    socket: Option<SocketId>,
    open: bool,
    retry: Option<TimerId>,
    next_id: u64,
    attempt: u32,
    pending: VecDeque<Message>,
    backoff: Backoff,
}

impl ConnectionManager {
    pub fn new(backoff: Backoff) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            active: true,
            target: None,
            socket: None,
            open: false,
            retry: None,
            next_id: 0,
            attempt: 0,
            pending: VecDeque::new(),
            backoff,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Consecutive failed attempts since the last successful open.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Messages waiting for the next open socket.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn target(&self) -> Option<&ConnectTarget> {
        self.target.as_ref()
    }

    pub fn handle(&mut self, event: Event) -> Vec<Command> {
        let mut out = Vec::new();
        if !self.active {
            tracing::trace!(?event, "ignoring event after teardown");
            return out;
        }

        match event {
            Event::Enable(target) => self.on_enable(target, &mut out),
            Event::Opened { socket } => {
                if self.is_current(socket) {
                    self.on_opened(socket, &mut out);
                }
            }
            Event::Frame { socket, text } => {
                if self.is_current(socket) {
                    self.on_frame(&text, &mut out);
                }
            }
            Event::Closed { socket, code } => {
                if self.is_current(socket) {
                    self.on_closed(code, &mut out);
                }
            }
            Event::Errored { socket, error } => {
                if self.is_current(socket) {
                    tracing::warn!(socket, "socket error: {}", error);
                    self.on_closed(ABNORMAL_CLOSURE, &mut out);
                }
            }
            Event::RetryElapsed { timer } => {
                if self.retry == Some(timer) {
                    self.retry = None;
                    self.connect(&mut out);
                }
            }
            Event::Send(message) => self.on_send(message, &mut out),
            Event::SwitchChannel(channel) => self.on_switch_channel(channel, &mut out),
            Event::Reconnect => self.on_reconnect(&mut out),
            Event::Teardown => self.on_teardown(&mut out),
        }
        out
    }

    fn is_current(&self, socket: SocketId) -> bool {
        let current = self.socket == Some(socket);
        if !current {
            tracing::trace!(socket, "ignoring event from stale socket");
        }
        current
    }

    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn set_state(&mut self, state: ConnectionState, out: &mut Vec<Command>) {
        if self.state != state {
            tracing::debug!(from = %self.state, to = %state, "connection state changed");
            self.state = state;
            out.push(Command::StateChanged(state));
        }
    }

    fn on_enable(&mut self, target: ConnectTarget, out: &mut Vec<Command>) {
        if self.target.as_ref() == Some(&target) && self.state != ConnectionState::Disconnected {
            return;
        }
        self.target = Some(target);
        self.attempt = 0;
        self.drop_socket(out);
        self.connect(out);
    }

    fn on_opened(&mut self, socket: SocketId, out: &mut Vec<Command>) {
        self.open = true;
        self.attempt = 0;
        self.set_state(ConnectionState::Connected, out);
        while let Some(message) = self.pending.pop_front() {
            transmit(socket, &message, out);
        }
    }

    fn on_frame(&mut self, text: &str, out: &mut Vec<Command>) {
        let messages = match Message::decode(text).and_then(Message::into_messages) {
            Ok(messages) => messages,
            Err(e) => {
                tracing::warn!("discarding undecodable frame: {}", e);
                return;
            }
        };
        out.extend(messages.into_iter().map(Command::Deliver));
    }

    fn on_closed(&mut self, code: u16, out: &mut Vec<Command>) {
        self.socket = None;
        self.open = false;
        if close_code::is_retryable(code) {
            self.schedule_retry(code, out);
        } else {
            if close_code::is_auth_failure(code) {
                tracing::warn!(code, "server rejected credentials; not retrying");
            } else {
                tracing::info!(code, "connection closed");
            }
            self.set_state(ConnectionState::Disconnected, out);
        }
    }

    fn schedule_retry(&mut self, code: u16, out: &mut Vec<Command>) {
        self.cancel_retry(out);
        let delay = self.backoff.delay(self.attempt);
        self.attempt = self.attempt.saturating_add(1);
        let timer = self.next_id();
        self.retry = Some(timer);
        tracing::info!(
            code,
            attempt = self.attempt,
            delay_ms = delay.as_millis() as u64,
            "connection lost; scheduling reconnect"
        );
        self.set_state(ConnectionState::Reconnecting, out);
        out.push(Command::ScheduleRetry { timer, delay });
    }

    fn cancel_retry(&mut self, out: &mut Vec<Command>) {
        if let Some(timer) = self.retry.take() {
            out.push(Command::CancelRetry { timer });
        }
    }

    /// Close the current socket cleanly; its later events become stale.
    fn drop_socket(&mut self, out: &mut Vec<Command>) {
        if let Some(socket) = self.socket.take() {
            out.push(Command::Close {
                socket,
                code: close_code::NORMAL,
            });
        }
        self.open = false;
    }

    fn connect(&mut self, out: &mut Vec<Command>) {
        self.cancel_retry(out);
        let Some(url) = self.target.as_ref().map(ConnectTarget::url) else {
            self.set_state(ConnectionState::Disconnected, out);
            return;
        };
        let socket = self.next_id();
        self.socket = Some(socket);
        self.open = false;
        self.set_state(ConnectionState::Connecting, out);
        out.push(Command::Open { socket, url });
    }

    fn on_send(&mut self, message: Message, out: &mut Vec<Command>) {
        match self.socket {
            Some(socket) if self.open => transmit(socket, &message, out),
            _ => {
                tracing::debug!(kind = %message.kind, queued = self.pending.len() + 1, "socket not open; queueing message");
                self.pending.push_back(message);
            }
        }
    }

    fn on_switch_channel(&mut self, channel: String, out: &mut Vec<Command>) {
        if let Some(target) = &mut self.target {
            target.channel_id = Some(channel.clone());
        }
        // Never queued: a later connection carries the channel in its URL.
        if let Some(socket) = self.socket.filter(|_| self.open) {
            transmit(socket, &Message::switch_channel(channel), out);
        }
    }

    fn on_reconnect(&mut self, out: &mut Vec<Command>) {
        if self.target.is_none() {
            tracing::warn!("reconnect requested before a target was set");
            return;
        }
        self.attempt = 0;
        self.drop_socket(out);
        self.connect(out);
    }

    fn on_teardown(&mut self, out: &mut Vec<Command>) {
        self.cancel_retry(out);
        self.drop_socket(out);
        self.pending.clear();
        self.set_state(ConnectionState::Disconnected, out);
        self.active = false;
    }
}

fn transmit(socket: SocketId, message: &Message, out: &mut Vec<Command>) {
    match message.encode() {
        Ok(text) => out.push(Command::Transmit { socket, text }),
        Err(e) => tracing::warn!(kind = %message.kind, "dropping unencodable message: {}", e),
    }
}
