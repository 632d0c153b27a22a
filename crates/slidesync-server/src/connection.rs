//! Per-socket relay logic.

use slidesync_core::protocol::{ClientMessage, ServerMessage};
use slidesync_core::relay::{ChannelId, ObserverId};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::state::AppState;

/// Messages queued for delivery to this socket.
pub type Outbox = mpsc::UnboundedSender<ServerMessage>;

/// One connected client and the channels it has joined.
pub struct Connection {
    id: Uuid,
    state: Arc<AppState>,
    outbox: Outbox,
    observer: Option<ObserverId>,
    forwards: HashMap<ChannelId, JoinHandle<()>>,
}

impl Connection {
    pub fn new(state: Arc<AppState>, outbox: Outbox) -> Self {
        Self {
            id: Uuid::new_v4(),
            state,
            outbox,
            observer: None,
            forwards: HashMap::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn observer(&self) -> Option<&ObserverId> {
        self.observer.as_ref()
    }

    /// Handle one client message. Returns a direct reply, if any.
    pub fn handle(&mut self, msg: ClientMessage) -> Option<ServerMessage> {
        match msg {
            ClientMessage::Join { channel, observer } => self.join(channel, observer),
            ClientMessage::Leave { channel } => {
                self.leave(&channel);
                None
            }
            ClientMessage::Broadcast { channel, payload } => {
                let Some(observer) = self.observer.clone() else {
                    return Some(error("join a channel before broadcasting"));
                };
                if !self.forwards.contains_key(&channel) {
                    return Some(error(&format!("not joined to {}", channel)));
                }
                let reached = self.state.broadcast(
                    &channel,
                    &observer,
                    ServerMessage::Broadcast {
                        channel: channel.clone(),
                        from: observer.clone(),
                        payload,
                    },
                );
                debug!("Sync from {} on {} reached {} receivers", observer, channel, reached);
                None
            }
        }
    }

    fn join(&mut self, channel: ChannelId, observer: ObserverId) -> Option<ServerMessage> {
        match &self.observer {
            Some(existing) if *existing != observer => {
                return Some(error("observer identity cannot change on a connection"));
            }
            _ => self.observer = Some(observer.clone()),
        }

        if self.forwards.contains_key(&channel) {
            return Some(ServerMessage::Joined {
                peer_count: self.state.peer_count(&channel),
                channel,
            });
        }

        let (mut rx, peer_count) = self.state.join(&channel, self.id, &observer);
        let me = observer.clone();
        let outbox = self.outbox.clone();
        let forward = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    // Never echo back to the sender.
                    Ok((from, _)) if from == me => continue,
                    Ok((_, msg)) => {
                        if outbox.send(msg).is_err() {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("{} lagged, dropped {} messages", me, skipped);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });
        self.forwards.insert(channel.clone(), forward);

        self.state.broadcast(
            &channel,
            &observer,
            ServerMessage::PeerJoined {
                channel: channel.clone(),
                observer: observer.clone(),
            },
        );
        info!("{} joined {}", observer, channel);

        Some(ServerMessage::Joined { channel, peer_count })
    }

    fn leave(&mut self, channel: &ChannelId) {
        let Some(forward) = self.forwards.remove(channel) else {
            return;
        };
        forward.abort();
        if let Some(observer) = &self.observer {
            self.state.leave(channel, self.id);
            self.state.broadcast(
                channel,
                observer,
                ServerMessage::PeerLeft {
                    channel: channel.clone(),
                    observer: observer.clone(),
                },
            );
            info!("{} left {}", observer, channel);
        }
    }

    /// Leave every joined channel.
    pub fn leave_all(&mut self) {
        let channels: Vec<ChannelId> = self.forwards.keys().cloned().collect();
        for channel in channels {
            self.leave(&channel);
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.leave_all();
    }
}

fn error(message: &str) -> ServerMessage {
    ServerMessage::Error {
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use slidesync_core::relay::SyncPayload;
    use std::time::Duration;
    use tokio::sync::mpsc::UnboundedReceiver;
    use tokio::time::timeout;

    fn connect(state: &Arc<AppState>) -> (Connection, UnboundedReceiver<ServerMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Connection::new(state.clone(), tx), rx)
    }

    fn join(channel: &ChannelId, observer: &str) -> ClientMessage {
        ClientMessage::Join {
            channel: channel.clone(),
            observer: ObserverId::new(observer),
        }
    }

    async fn next(rx: &mut UnboundedReceiver<ServerMessage>) -> Option<ServerMessage> {
        timeout(Duration::from_millis(200), rx.recv()).await.ok().flatten()
    }

    #[tokio::test]
    async fn test_broadcast_reaches_peer_but_not_sender() {
        let state = Arc::new(AppState::new());
        let channel = ChannelId::for_document("deck");
        let (mut a, mut a_rx) = connect(&state);
        let (mut b, mut b_rx) = connect(&state);

        assert!(matches!(a.handle(join(&channel, "a")), Some(ServerMessage::Joined { peer_count: 1, .. })));
        assert!(matches!(b.handle(join(&channel, "b")), Some(ServerMessage::Joined { peer_count: 2, .. })));

        // a hears that b joined.
        assert!(matches!(next(&mut a_rx).await, Some(ServerMessage::PeerJoined { .. })));

        let payload = SyncPayload::new(json!({ "step": 4 }));
        assert!(a
            .handle(ClientMessage::Broadcast {
                channel: channel.clone(),
                payload: payload.clone(),
            })
            .is_none());

        match next(&mut b_rx).await {
            Some(ServerMessage::Broadcast { from, payload: got, .. }) => {
                assert_eq!(from, ObserverId::new("a"));
                assert_eq!(got, payload);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(next(&mut a_rx).await.is_none());
    }

    #[tokio::test]
    async fn test_channels_are_isolated() {
        let state = Arc::new(AppState::new());
        let deck = ChannelId::for_document("deck");
        let other = ChannelId::for_document("other");
        let (mut a, _a_rx) = connect(&state);
        let (mut b, mut b_rx) = connect(&state);
        a.handle(join(&deck, "a"));
        b.handle(join(&other, "b"));

        a.handle(ClientMessage::Broadcast {
            channel: deck,
            payload: SyncPayload::new(json!(1)),
        });

        assert!(next(&mut b_rx).await.is_none());
    }

    #[tokio::test]
    async fn test_broadcast_requires_join() {
        let state = Arc::new(AppState::new());
        let (mut a, _rx) = connect(&state);
        let reply = a.handle(ClientMessage::Broadcast {
            channel: ChannelId::for_document("deck"),
            payload: SyncPayload::new(json!(1)),
        });
        assert!(matches!(reply, Some(ServerMessage::Error { .. })));
    }

    #[tokio::test]
    async fn test_observer_identity_is_fixed() {
        let state = Arc::new(AppState::new());
        let (mut a, _rx) = connect(&state);
        a.handle(join(&ChannelId::for_document("one"), "a"));
        let reply = a.handle(join(&ChannelId::for_document("two"), "imposter"));
        assert!(matches!(reply, Some(ServerMessage::Error { .. })));
        assert_eq!(a.observer(), Some(&ObserverId::new("a")));
    }

    #[tokio::test]
    async fn test_leave_notifies_and_cleans_up() {
        let state = Arc::new(AppState::new());
        let channel = ChannelId::for_document("deck");
        let (mut a, mut a_rx) = connect(&state);
        let (mut b, _b_rx) = connect(&state);
        a.handle(join(&channel, "a"));
        b.handle(join(&channel, "b"));
        assert!(matches!(next(&mut a_rx).await, Some(ServerMessage::PeerJoined { .. })));

        drop(b);

        assert!(matches!(next(&mut a_rx).await, Some(ServerMessage::PeerLeft { .. })));
        assert_eq!(state.peer_count(&channel), 1);
        a.handle(ClientMessage::Leave { channel: channel.clone() });
        assert_eq!(state.channel_count(), 0);
    }

    #[tokio::test]
    async fn test_stale_connection_leaving_keeps_reconnected_peer() {
        let state = Arc::new(AppState::new());
        let channel = ChannelId::for_document("deck");
        let (mut stale, _stale_rx) = connect(&state);
        let (mut fresh, mut fresh_rx) = connect(&state);
        stale.handle(join(&channel, "a"));
        fresh.handle(join(&channel, "a"));

        drop(stale);
        assert_eq!(state.channel_count(), 1);

        let (mut b, _b_rx) = connect(&state);
        b.handle(join(&channel, "b"));
        let payload = SyncPayload::new(json!({ "step": 2 }));
        b.handle(ClientMessage::Broadcast {
            channel: channel.clone(),
            payload: payload.clone(),
        });

        let mut delivered = None;
        while let Some(msg) = next(&mut fresh_rx).await {
            if let ServerMessage::Broadcast { payload: got, .. } = msg {
                delivered = Some(got);
                break;
            }
        }
        assert_eq!(delivered, Some(payload));
    }
}
