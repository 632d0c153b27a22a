//! Peer sync relay.
//!
//! Renderer-originated sync events go out to every peer on the document's
//! channel; payloads received from other peers are replayed into the local
//! renderer. Messages that originated from the local observer are dropped so
//! a client never re-applies its own transitions.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::TransportResult;

/// Opaque renderer-defined state transition, replicated verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SyncPayload(pub serde_json::Value);

impl SyncPayload {
    pub fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &serde_json::Value {
        &self.0
    }
}

/// Identity of one client participating in a room.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObserverId(String);

impl ObserverId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Fresh random identity.
    pub fn random() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObserverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Broadcast channel scoped to a single document instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(String);

impl ChannelId {
    const PREFIX: &'static str = "slide-sync";

    /// Channel for the document identified by `document_id`.
    pub fn for_document(document_id: &str) -> Self {
        Self(format!("{}:{}", Self::PREFIX, document_id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A message received from the broadcast transport.
#[derive(Debug, Clone, PartialEq)]
pub struct PeerMessage {
    pub channel: ChannelId,
    pub sender: ObserverId,
    pub payload: SyncPayload,
}

/// Best-effort, at-most-once broadcast between peers.
pub trait BroadcastTransport {
    /// Identity stamped on every message this transport sends.
    fn observer(&self) -> &ObserverId;

    /// Send `payload` to every peer listening on `channel`.
    fn broadcast(&mut self, channel: &ChannelId, payload: &SyncPayload) -> TransportResult<()>;

    /// Drain messages received since the last poll (non-blocking).
    fn poll_messages(&mut self) -> Vec<PeerMessage>;

    /// Start receiving messages for `channel`.
    fn listen(&mut self, channel: &ChannelId) -> TransportResult<()>;

    /// Stop receiving messages for `channel`.
    fn unlisten(&mut self, channel: &ChannelId);
}

/// Routes sync payloads between the local renderer and its peers.
#[derive(Debug, Clone)]
pub struct SyncRelay {
    channel: ChannelId,
    observer: ObserverId,
}

impl SyncRelay {
    pub fn new(channel: ChannelId, observer: ObserverId) -> Self {
        Self { channel, observer }
    }

    pub fn channel(&self) -> &ChannelId {
        &self.channel
    }

    pub fn observer(&self) -> &ObserverId {
        &self.observer
    }

    /// Forward a renderer-dispatched payload to all peers, unmodified.
    pub fn outbound<T: BroadcastTransport + ?Sized>(
        &self,
        transport: &mut T,
        payload: &SyncPayload,
    ) -> TransportResult<()> {
        transport.broadcast(&self.channel, payload)
    }

    /// Decide whether `message` should be replayed locally.
    ///
    /// Returns the payload for messages on this relay's channel that came
    /// from another observer.
    pub fn inbound<'a>(&self, message: &'a PeerMessage) -> Option<&'a SyncPayload> {
        if message.channel != self.channel {
            log::debug!("Ignoring sync on foreign channel {}", message.channel);
            return None;
        }
        if message.sender == self.observer {
            log::debug!("Dropping echoed sync from {}", message.sender);
            return None;
        }
        Some(&message.payload)
    }
}

#[derive(Default)]
struct BusState {
    endpoints: Vec<Endpoint>,
}

struct Endpoint {
    channels: Vec<ChannelId>,
    inbox: VecDeque<PeerMessage>,
}

/// In-process broadcast hub for tests and single-process embedding.
///
/// Every broadcast is delivered to every endpoint listening on the channel,
/// including the sender. Filtering echoes is the relay's job.
#[derive(Clone, Default)]
pub struct MemoryBus {
    state: Rc<RefCell<BusState>>,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a new endpoint for `observer`.
    pub fn connect(&self, observer: ObserverId) -> MemoryTransport {
        let mut state = self.state.borrow_mut();
        let index = state.endpoints.len();
        state.endpoints.push(Endpoint {
            channels: Vec::new(),
            inbox: VecDeque::new(),
        });
        MemoryTransport {
            bus: self.clone(),
            index,
            observer,
        }
    }

    /// Messages waiting across all endpoints.
    pub fn pending(&self) -> usize {
        self.state.borrow().endpoints.iter().map(|e| e.inbox.len()).sum()
    }
}

/// One endpoint on a [`MemoryBus`].
pub struct MemoryTransport {
    bus: MemoryBus,
    index: usize,
    observer: ObserverId,
}

impl BroadcastTransport for MemoryTransport {
    fn observer(&self) -> &ObserverId {
        &self.observer
    }

    fn broadcast(&mut self, channel: &ChannelId, payload: &SyncPayload) -> TransportResult<()> {
        let mut state = self.bus.state.borrow_mut();
        for endpoint in state.endpoints.iter_mut() {
            if endpoint.channels.contains(channel) {
                endpoint.inbox.push_back(PeerMessage {
                    channel: channel.clone(),
                    sender: self.observer.clone(),
                    payload: payload.clone(),
                });
            }
        }
        Ok(())
    }

    fn poll_messages(&mut self) -> Vec<PeerMessage> {
        let mut state = self.bus.state.borrow_mut();
        match state.endpoints.get_mut(self.index) {
            Some(endpoint) => endpoint.inbox.drain(..).collect(),
            None => Vec::new(),
        }
    }

    fn listen(&mut self, channel: &ChannelId) -> TransportResult<()> {
        let mut state = self.bus.state.borrow_mut();
        if let Some(endpoint) = state.endpoints.get_mut(self.index) {
            if !endpoint.channels.contains(channel) {
                endpoint.channels.push(channel.clone());
            }
        }
        Ok(())
    }

    fn unlisten(&mut self, channel: &ChannelId) {
        let mut state = self.bus.state.borrow_mut();
        if let Some(endpoint) = state.endpoints.get_mut(self.index) {
            endpoint.channels.retain(|c| c != channel);
        }
    }
}

impl Drop for MemoryTransport {
    fn drop(&mut self) {
        let mut state = self.bus.state.borrow_mut();
        if let Some(endpoint) = state.endpoints.get_mut(self.index) {
            endpoint.channels.clear();
            endpoint.inbox.clear();
        }
    }
}
