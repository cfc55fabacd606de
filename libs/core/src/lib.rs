//! Rooom chat widget conversation engine.
//!
//! This crate holds the message contracts exchanged with the studio backend,
//! the conversation store that owns all widget state, the transport layer
//! (request/response API plus push channel), the keyword intent resolver, the
//! cross-frame bridge and the runtime controller tying them together.
pub mod bridge;
pub mod catalog;
pub mod config;
pub mod intent;
pub mod message;
pub mod sound;
pub mod state;
pub mod store;
pub mod transport;
pub mod widget;

pub use bridge::{
    BookingWidgetLoader, BridgeError, EmbedHost, FrameMessageEvent, FramePort, HostMessage,
    InMemoryEmbedHost, LoaderCallbacks, LoaderConfig, LoaderMessage, ParentBridge,
    RecordingFramePort, TargetOrigin, resolve_parent_origin,
};
pub use catalog::StudioCatalog;
pub use config::{
    ConfigError, MountTarget, PartialWidgetConfig, Position, Theme, TransportConfig, WidgetConfig,
};
pub use intent::{Intent, IntentResolver, resolve_intent};
pub use message::*;
pub use sound::{NoopSound, NotificationSound, SharedNotificationSound, SoundError};
pub use state::*;
pub use store::{AppendOutcome, ConversationSnapshot, ConversationStore, StoreEvent};
pub use transport::{
    ApiResponse, ChatApi, EventKind, HttpChatApi, MockChatApi, PushEvent, RealtimeChannel,
    SimulatedChannel, TransportError,
};
pub use widget::{Backend, ChatWidget};
