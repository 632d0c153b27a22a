//! WebSocket broadcast transport.
//!
//! Connects to the relay server and exposes it as a [`BroadcastTransport`].
//! The platform socket runs on a background thread (native) or browser
//! callbacks (WASM); both queue [`SocketEvent`]s that are drained by polling.

use crate::config::RelayConfig;
use crate::error::{TransportError, TransportResult};
use crate::protocol::{ClientMessage, ServerMessage};
use crate::relay::{BroadcastTransport, ChannelId, ObserverId, PeerMessage, SyncPayload};

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

/// Events from the platform socket.
#[derive(Debug, Clone)]
pub enum SocketEvent {
    Connected,
    Disconnected,
    Message(ServerMessage),
    Error { message: String },
}

fn parse_server_message(text: &str) -> Option<ServerMessage> {
    match serde_json::from_str::<ServerMessage>(text) {
        Ok(msg) => Some(msg),
        Err(e) => {
            log::warn!("Failed to parse server message: {}", e);
            None
        }
    }
}

/// At most `max_chars` leading characters of `text`, cut on a char boundary.
fn log_preview(text: &str, max_chars: usize) -> &str {
    text.char_indices()
        .nth(max_chars)
        .map_or(text, |(end, _)| &text[..end])
}

// ============================================================================
// WASM WebSocket Client
// ============================================================================

#[cfg(target_arch = "wasm32")]
mod wasm_client {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;
    use wasm_bindgen::prelude::*;
    use wasm_bindgen::JsCast;
    use web_sys::{CloseEvent, ErrorEvent, MessageEvent, WebSocket};

    /// WebSocket client for WASM.
    ///
    /// Events are collected by browser callbacks and drained via `poll_events()`.
    pub struct WasmWebSocket {
        ws: Option<WebSocket>,
        state: ConnectionState,
        events: Rc<RefCell<Vec<SocketEvent>>>,
        // Closures must outlive the socket callbacks.
        _on_open: Option<Closure<dyn Fn()>>,
        _on_message: Option<Closure<dyn Fn(MessageEvent)>>,
        _on_close: Option<Closure<dyn Fn(CloseEvent)>>,
        _on_error: Option<Closure<dyn Fn(ErrorEvent)>>,
    }

    impl WasmWebSocket {
        pub fn new() -> Self {
            Self {
                ws: None,
                state: ConnectionState::Disconnected,
                events: Rc::new(RefCell::new(Vec::new())),
                _on_open: None,
                _on_message: None,
                _on_close: None,
                _on_error: None,
            }
        }

        pub fn connect(&mut self, url: &str) -> TransportResult<()> {
            if self.ws.is_some() {
                return Err(TransportError::Send("Already connected".to_string()));
            }

            let ws = WebSocket::new(url).map_err(|e| TransportError::InvalidUrl(format!("{:?}", e)))?;
            ws.set_binary_type(web_sys::BinaryType::Arraybuffer);
            self.state = ConnectionState::Connecting;

            let events_open = self.events.clone();
            let on_open = Closure::wrap(Box::new(move || {
                events_open.borrow_mut().push(SocketEvent::Connected);
            }) as Box<dyn Fn()>);
            ws.set_onopen(Some(on_open.as_ref().unchecked_ref()));

            let events_msg = self.events.clone();
            let on_message = Closure::wrap(Box::new(move |e: MessageEvent| {
                if let Ok(txt) = e.data().dyn_into::<js_sys::JsString>() {
                    let text: String = txt.into();
                    if let Some(msg) = parse_server_message(&text) {
                        events_msg.borrow_mut().push(SocketEvent::Message(msg));
                    }
                }
            }) as Box<dyn Fn(MessageEvent)>);
            ws.set_onmessage(Some(on_message.as_ref().unchecked_ref()));

            let events_close = self.events.clone();
            let on_close = Closure::wrap(Box::new(move |_e: CloseEvent| {
                events_close.borrow_mut().push(SocketEvent::Disconnected);
            }) as Box<dyn Fn(CloseEvent)>);
            ws.set_onclose(Some(on_close.as_ref().unchecked_ref()));

            let events_err = self.events.clone();
            let on_error = Closure::wrap(Box::new(move |_e: ErrorEvent| {
                events_err.borrow_mut().push(SocketEvent::Error {
                    message: "WebSocket error".to_string(),
                });
            }) as Box<dyn Fn(ErrorEvent)>);
            ws.set_onerror(Some(on_error.as_ref().unchecked_ref()));

            self.ws = Some(ws);
            self._on_open = Some(on_open);
            self._on_message = Some(on_message);
            self._on_close = Some(on_close);
            self._on_error = Some(on_error);
            Ok(())
        }

        pub fn disconnect(&mut self) {
            if let Some(ws) = self.ws.take() {
                let _ = ws.close();
            }
            self.state = ConnectionState::Disconnected;
            self._on_open = None;
            self._on_message = None;
            self._on_close = None;
            self._on_error = None;
        }

        pub fn send(&self, msg: &str) -> TransportResult<()> {
            match &self.ws {
                Some(ws) => {
                    log::debug!("WebSocket sending: {}", log_preview(msg, 100));
                    ws.send_with_str(msg)
                        .map_err(|e| TransportError::Send(format!("{:?}", e)))
                }
                None => Err(TransportError::NotConnected),
            }
        }

        pub fn poll_events(&mut self) -> Vec<SocketEvent> {
            let events = std::mem::take(&mut *self.events.borrow_mut());
            for event in &events {
                match event {
                    SocketEvent::Connected => self.state = ConnectionState::Connected,
                    SocketEvent::Disconnected => self.state = ConnectionState::Disconnected,
                    SocketEvent::Error { .. } => self.state = ConnectionState::Error,
                    SocketEvent::Message(_) => {}
                }
            }
            events
        }

        pub fn state(&self) -> ConnectionState {
            self.state
        }

        pub fn is_connected(&self) -> bool {
            self.state == ConnectionState::Connected
        }
    }

    impl Default for WasmWebSocket {
        fn default() -> Self {
            Self::new()
        }
    }

    impl Drop for WasmWebSocket {
        fn drop(&mut self) {
            self.disconnect();
        }
    }
}

#[cfg(target_arch = "wasm32")]
pub use wasm_client::WasmWebSocket;

// ============================================================================
// Native WebSocket Client
// ============================================================================

#[cfg(not(target_arch = "wasm32"))]
mod native_client {
    use super::*;
    use std::sync::mpsc::{Receiver, Sender, TryRecvError, channel};
    use std::thread::{self, JoinHandle};
    use std::time::Duration;
    use tungstenite::{Message, connect};
    use url::Url;

    /// Commands sent to the socket thread.
    enum WsCommand {
        Send(String),
        Close,
    }

    /// WebSocket client for native platforms.
    ///
    /// Uses a background thread for non-blocking operation.
    pub struct NativeWebSocket {
        state: ConnectionState,
        cmd_tx: Option<Sender<WsCommand>>,
        event_rx: Option<Receiver<SocketEvent>>,
        _thread: Option<JoinHandle<()>>,
    }

    impl NativeWebSocket {
        pub fn new() -> Self {
            Self {
                state: ConnectionState::Disconnected,
                cmd_tx: None,
                event_rx: None,
                _thread: None,
            }
        }

        /// Validate a relay URL.
        pub fn parse_url(url: &str) -> TransportResult<Url> {
            let parsed = Url::parse(url).map_err(|e| TransportError::InvalidUrl(e.to_string()))?;
            if parsed.scheme() != "ws" && parsed.scheme() != "wss" {
                return Err(TransportError::InvalidUrl(format!(
                    "unsupported scheme {}",
                    parsed.scheme()
                )));
            }
            Ok(parsed)
        }

        pub fn connect(&mut self, url: &str) -> TransportResult<()> {
            if self.cmd_tx.is_some() {
                return Err(TransportError::Send("Already connected".to_string()));
            }
            Self::parse_url(url)?;

            self.state = ConnectionState::Connecting;
            let (cmd_tx, cmd_rx) = channel::<WsCommand>();
            let (event_tx, event_rx) = channel::<SocketEvent>();
            let url = url.to_string();

            let handle = thread::spawn(move || {
                log::info!("WebSocket thread: connecting to {}", url);
                let (mut socket, response) = match connect(&url) {
                    Ok(connected) => connected,
                    Err(e) => {
                        log::error!("WebSocket connection failed: {}", e);
                        let _ = event_tx.send(SocketEvent::Error {
                            message: format!("Connection failed: {}", e),
                        });
                        return;
                    }
                };
                log::info!("WebSocket connected, status: {}", response.status());
                let _ = event_tx.send(SocketEvent::Connected);

                // Short read timeout so the loop can service outgoing commands.
                if let tungstenite::stream::MaybeTlsStream::Plain(tcp) = socket.get_mut() {
                    let _ = tcp.set_read_timeout(Some(Duration::from_millis(50)));
                    let _ = tcp.set_write_timeout(Some(Duration::from_secs(5)));
                }

                loop {
                    match cmd_rx.try_recv() {
                        Ok(WsCommand::Send(msg)) => {
                            log::debug!("WebSocket sending: {}", log_preview(&msg, 100));
                            if let Err(e) = socket.send(Message::Text(msg)) {
                                log::error!("WebSocket send error: {}", e);
                                break;
                            }
                        }
                        Ok(WsCommand::Close) => {
                            log::info!("WebSocket close requested");
                            let _ = socket.close(None);
                            break;
                        }
                        Err(TryRecvError::Disconnected) => break,
                        Err(TryRecvError::Empty) => {}
                    }

                    match socket.read() {
                        Ok(Message::Text(txt)) => {
                            if let Some(msg) = parse_server_message(&txt) {
                                let _ = event_tx.send(SocketEvent::Message(msg));
                            }
                        }
                        Ok(Message::Ping(data)) => {
                            let _ = socket.send(Message::Pong(data));
                        }
                        Ok(Message::Close(_)) => {
                            log::info!("WebSocket received close frame");
                            break;
                        }
                        Ok(_) => {}
                        Err(tungstenite::Error::Io(ref e))
                            if e.kind() == std::io::ErrorKind::WouldBlock
                                || e.kind() == std::io::ErrorKind::TimedOut =>
                        {
                            continue;
                        }
                        Err(e) => {
                            log::error!("WebSocket read error: {}", e);
                            break;
                        }
                    }
                }

                log::info!("WebSocket thread exiting");
                let _ = event_tx.send(SocketEvent::Disconnected);
            });

            self.cmd_tx = Some(cmd_tx);
            self.event_rx = Some(event_rx);
            self._thread = Some(handle);
            Ok(())
        }

        pub fn disconnect(&mut self) {
            if let Some(tx) = self.cmd_tx.take() {
                let _ = tx.send(WsCommand::Close);
            }
            self.event_rx = None;
            self._thread = None;
            self.state = ConnectionState::Disconnected;
        }

        pub fn send(&self, msg: &str) -> TransportResult<()> {
            match &self.cmd_tx {
                Some(tx) => tx
                    .send(WsCommand::Send(msg.to_string()))
                    .map_err(|e| TransportError::Send(e.to_string())),
                None => Err(TransportError::NotConnected),
            }
        }

        pub fn poll_events(&mut self) -> Vec<SocketEvent> {
            let mut events = Vec::new();
            if let Some(rx) = &self.event_rx {
                while let Ok(event) = rx.try_recv() {
                    match &event {
                        SocketEvent::Connected => self.state = ConnectionState::Connected,
                        SocketEvent::Disconnected => self.state = ConnectionState::Disconnected,
                        SocketEvent::Error { .. } => self.state = ConnectionState::Error,
                        SocketEvent::Message(_) => {}
                    }
                    events.push(event);
                }
            }
            events
        }

        pub fn state(&self) -> ConnectionState {
            self.state
        }

        pub fn is_connected(&self) -> bool {
            self.state == ConnectionState::Connected
        }
    }

    impl Default for NativeWebSocket {
        fn default() -> Self {
            Self::new()
        }
    }

    impl Drop for NativeWebSocket {
        fn drop(&mut self) {
            self.disconnect();
        }
    }
}

#[cfg(not(target_arch = "wasm32"))]
pub use native_client::NativeWebSocket;

/// Platform-specific WebSocket client type.
#[cfg(target_arch = "wasm32")]
pub type PlatformWebSocket = WasmWebSocket;

#[cfg(not(target_arch = "wasm32"))]
pub type PlatformWebSocket = NativeWebSocket;

// ============================================================================
// Broadcast transport over the relay
// ============================================================================

/// [`BroadcastTransport`] backed by the relay server.
///
/// Listened channels are joined once the socket connects. A dropped socket
/// is not reopened. Broadcasts while disconnected fail with
/// [`TransportError::NotConnected`]; there is no replay buffer.
pub struct WebSocketTransport {
    socket: PlatformWebSocket,
    observer: ObserverId,
    channels: Vec<ChannelId>,
}

impl WebSocketTransport {
    /// Start connecting to the relay described by `config`.
    pub fn connect(config: &RelayConfig, observer: ObserverId) -> TransportResult<Self> {
        let mut socket = PlatformWebSocket::new();
        socket.connect(&config.url)?;
        Ok(Self {
            socket,
            observer,
            channels: Vec::new(),
        })
    }

    pub fn state(&self) -> ConnectionState {
        self.socket.state()
    }

    pub fn channels(&self) -> &[ChannelId] {
        &self.channels
    }

    fn send(&self, msg: &ClientMessage) -> TransportResult<()> {
        let json = serde_json::to_string(msg)?;
        self.socket.send(&json)
    }

    fn join(&self, channel: &ChannelId) -> TransportResult<()> {
        self.send(&ClientMessage::Join {
            channel: channel.clone(),
            observer: self.observer.clone(),
        })
    }
}

impl BroadcastTransport for WebSocketTransport {
    fn observer(&self) -> &ObserverId {
        &self.observer
    }

    fn broadcast(&mut self, channel: &ChannelId, payload: &SyncPayload) -> TransportResult<()> {
        if !self.socket.is_connected() {
            return Err(TransportError::NotConnected);
        }
        self.send(&ClientMessage::Broadcast {
            channel: channel.clone(),
            payload: payload.clone(),
        })
    }

    fn poll_messages(&mut self) -> Vec<PeerMessage> {
        let mut messages = Vec::new();
        for event in self.socket.poll_events() {
            match event {
                SocketEvent::Connected => {
                    for channel in &self.channels {
                        if let Err(e) = self.join(channel) {
                            log::warn!("Failed to join {}: {}", channel, e);
                        }
                    }
                }
                SocketEvent::Disconnected => log::info!("Relay disconnected"),
                SocketEvent::Error { message } => log::warn!("Relay error: {}", message),
                SocketEvent::Message(ServerMessage::Joined { channel, peer_count }) => {
                    log::info!("Joined {} with {} peers", channel, peer_count);
                }
                SocketEvent::Message(ServerMessage::Error { message }) => {
                    log::warn!("Relay rejected message: {}", message);
                }
                SocketEvent::Message(msg) => {
                    if let Some(peer) = msg.into_peer_message() {
                        messages.push(peer);
                    }
                }
            }
        }
        messages
    }

    fn listen(&mut self, channel: &ChannelId) -> TransportResult<()> {
        if self.channels.contains(channel) {
            return Ok(());
        }
        self.channels.push(channel.clone());
        if self.socket.is_connected() {
            self.join(channel)?;
        }
        Ok(())
    }

    fn unlisten(&mut self, channel: &ChannelId) {
        let before = self.channels.len();
        self.channels.retain(|c| c != channel);
        if self.channels.len() != before && self.socket.is_connected() {
            let _ = self.send(&ClientMessage::Leave {
                channel: channel.clone(),
            });
        }
    }
}
