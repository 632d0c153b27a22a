//! SlideSync Core Library
//!
//! Keeps slide decks rendered inside a shared whiteboard in step across
//! clients: navigation against a slow renderer, peer replay of renderer
//! transitions, and alignment of the shared scene path with the current page.

pub mod config;
pub mod crdt;
pub mod disposer;
pub mod error;
pub mod navigation;
pub mod protocol;
pub mod readiness;
pub mod relay;
pub mod renderer;
pub mod scene;
pub mod session;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{RelayConfig, SessionConfig, SlideResource};
pub use crdt::CrdtRoom;
pub use disposer::Disposer;
pub use error::{ConfigError, RoomError, SessionError, TransportError};
pub use navigation::{NavigationState, Navigator, clamp_page};
pub use readiness::{Ready, ReadinessMonitor, ReadyInfo};
pub use relay::{
    BroadcastTransport, ChannelId, MemoryBus, MemoryTransport, ObserverId, PeerMessage,
    SyncPayload, SyncRelay,
};
pub use renderer::{
    ControllerRole, RendererEvent, RendererEvents, RendererOptions, SlideRenderer, Subscription,
};
pub use scene::{MemoryRoom, RoomState, SceneDescriptor, ScenePath, ScenePathType, SceneReconciler};
pub use session::{RenderSession, SessionEvent};
pub use transport::{ConnectionState, PlatformWebSocket, WebSocketTransport};
