//! Relay wire messages.
//!
//! JSON text frames, tagged by `type`:
//! ```json
//! { "type": "join", "channel": "slide-sync:deck", "observer": "a1" }
//! { "type": "broadcast", "channel": "slide-sync:deck", "payload": { ... } }
//! ```

use serde::{Deserialize, Serialize};

use crate::relay::{ChannelId, ObserverId, PeerMessage, SyncPayload};

/// Messages sent to the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Start receiving broadcasts on a channel.
    Join { channel: ChannelId, observer: ObserverId },
    /// Stop receiving broadcasts on a channel.
    Leave { channel: ChannelId },
    /// Send a sync payload to everyone else on the channel.
    Broadcast { channel: ChannelId, payload: SyncPayload },
}

/// Messages received from the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Confirms a join.
    Joined { channel: ChannelId, peer_count: usize },
    /// Another observer joined a channel we are on.
    PeerJoined { channel: ChannelId, observer: ObserverId },
    /// Another observer left a channel we are on.
    PeerLeft { channel: ChannelId, observer: ObserverId },
    /// Sync payload from another observer.
    Broadcast {
        channel: ChannelId,
        from: ObserverId,
        payload: SyncPayload,
    },
    /// Protocol error.
    Error { message: String },
}

impl ServerMessage {
    /// The peer sync carried by this message, if any.
    pub fn into_peer_message(self) -> Option<PeerMessage> {
        match self {
            ServerMessage::Broadcast {
                channel,
                from,
                payload,
            } => Some(PeerMessage {
                channel,
                sender: from,
                payload,
            }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_client_message_serialize() {
        let msg = ClientMessage::Join {
            channel: ChannelId::for_document("deck"),
            observer: ObserverId::new("a1"),
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            value,
            json!({ "type": "join", "channel": "slide-sync:deck", "observer": "a1" })
        );
    }

    #[test]
    fn test_broadcast_payload_is_verbatim() {
        let payload = json!({ "kind": "animation", "step": [1, 2, { "x": null }] });
        let msg = ClientMessage::Broadcast {
            channel: ChannelId::for_document("deck"),
            payload: SyncPayload::new(payload.clone()),
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["payload"], payload);
    }

    #[test]
    fn test_server_message_deserialize() {
        let text = r#"{"type":"broadcast","channel":"slide-sync:deck","from":"b2","payload":{"step":3}}"#;
        let msg: ServerMessage = serde_json::from_str(text).unwrap();
        let peer = msg.into_peer_message().expect("peer message");
        assert_eq!(peer.sender, ObserverId::new("b2"));
        assert_eq!(peer.channel, ChannelId::for_document("deck"));
        assert_eq!(peer.payload, SyncPayload::new(json!({ "step": 3 })));
    }

    #[test]
    fn test_non_broadcast_has_no_peer_message() {
        let text = r#"{"type":"joined","channel":"slide-sync:deck","peer_count":2}"#;
        let msg: ServerMessage = serde_json::from_str(text).unwrap();
        assert!(matches!(msg, ServerMessage::Joined { peer_count: 2, .. }));
        assert!(msg.into_peer_message().is_none());
    }
}
