//! Channel bookkeeping shared by all connections.

use dashmap::DashMap;
use slidesync_core::protocol::ServerMessage;
use slidesync_core::relay::{ChannelId, ObserverId};
use std::collections::HashMap;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Per-channel broadcast capacity.
pub const CHANNEL_CAPACITY: usize = 256;

/// A message on a channel, tagged with the observer that sent it.
pub type Envelope = (ObserverId, ServerMessage);

struct Room {
    tx: broadcast::Sender<Envelope>,
    /// Keyed by connection, so a reconnecting observer may briefly hold two
    /// entries.
    peers: HashMap<Uuid, ObserverId>,
}

impl Room {
    fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            tx,
            peers: HashMap::new(),
        }
    }
}

/// Active channels keyed by id.
#[derive(Default)]
pub struct AppState {
    rooms: DashMap<ChannelId, Room>,
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add connection `conn` speaking for `observer` to `channel`; returns
    /// its receiver and the peer count.
    pub fn join(
        &self,
        channel: &ChannelId,
        conn: Uuid,
        observer: &ObserverId,
    ) -> (broadcast::Receiver<Envelope>, usize) {
        let mut room = self.rooms.entry(channel.clone()).or_insert_with(Room::new);
        room.peers.insert(conn, observer.clone());
        (room.tx.subscribe(), room.peers.len())
    }

    /// Remove connection `conn` from `channel`, dropping the channel once no
    /// connection remains.
    pub fn leave(&self, channel: &ChannelId, conn: Uuid) {
        if let Some(mut room) = self.rooms.get_mut(channel) {
            room.peers.remove(&conn);
            if room.peers.is_empty() {
                drop(room);
                self.rooms.remove(channel);
            }
        }
    }

    /// Send `msg` to every subscriber of `channel`. Returns how many
    /// receivers it reached.
    pub fn broadcast(&self, channel: &ChannelId, from: &ObserverId, msg: ServerMessage) -> usize {
        match self.rooms.get(channel) {
            Some(room) => room.tx.send((from.clone(), msg)).unwrap_or(0),
            None => 0,
        }
    }

    pub fn peer_count(&self, channel: &ChannelId) -> usize {
        self.rooms.get(channel).map(|room| room.peers.len()).unwrap_or(0)
    }

    pub fn channel_count(&self) -> usize {
        self.rooms.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids() -> (ChannelId, ObserverId, ObserverId) {
        (
            ChannelId::for_document("deck"),
            ObserverId::new("a"),
            ObserverId::new("b"),
        )
    }

    #[test]
    fn test_join_counts_peers() {
        let state = AppState::new();
        let (channel, a, b) = ids();
        let conn_a = Uuid::new_v4();
        let (_rx_a, count) = state.join(&channel, conn_a, &a);
        assert_eq!(count, 1);
        let (_rx_b, count) = state.join(&channel, Uuid::new_v4(), &b);
        assert_eq!(count, 2);
        // Rejoining on the same connection does not double count.
        let (_rx_a2, count) = state.join(&channel, conn_a, &a);
        assert_eq!(count, 2);
    }

    #[test]
    fn test_empty_channel_removed() {
        let state = AppState::new();
        let (channel, a, b) = ids();
        let (conn_a, conn_b) = (Uuid::new_v4(), Uuid::new_v4());
        let _rx_a = state.join(&channel, conn_a, &a);
        let _rx_b = state.join(&channel, conn_b, &b);
        state.leave(&channel, conn_a);
        assert_eq!(state.peer_count(&channel), 1);
        state.leave(&channel, conn_b);
        assert_eq!(state.channel_count(), 0);
    }

    #[test]
    fn test_same_observer_on_two_connections() {
        let state = AppState::new();
        let (channel, a, _) = ids();
        let (stale, fresh) = (Uuid::new_v4(), Uuid::new_v4());
        let _rx_stale = state.join(&channel, stale, &a);
        let _rx_fresh = state.join(&channel, fresh, &a);

        state.leave(&channel, stale);

        assert_eq!(state.channel_count(), 1);
        assert_eq!(state.peer_count(&channel), 1);
    }

    #[test]
    fn test_broadcast_to_missing_channel() {
        let state = AppState::new();
        let (channel, a, _) = ids();
        let sent = state.broadcast(&channel, &a, ServerMessage::Error { message: "x".into() });
        assert_eq!(sent, 0);
    }

    #[tokio::test]
    async fn test_broadcast_tags_sender() {
        let state = AppState::new();
        let (channel, a, b) = ids();
        let (_rx_a, _) = state.join(&channel, Uuid::new_v4(), &a);
        let (mut rx_b, _) = state.join(&channel, Uuid::new_v4(), &b);

        let msg = ServerMessage::PeerLeft {
            channel: channel.clone(),
            observer: a.clone(),
        };
        assert_eq!(state.broadcast(&channel, &a, msg.clone()), 2);

        let (from, received) = rx_b.recv().await.expect("message");
        assert_eq!(from, a);
        assert_eq!(received, msg);
    }
}
