//! All I/O with the studio backend: request/response operations and the
//! push-event channel.

pub mod api;
pub mod channel;
pub mod error;
pub mod http;
pub mod latency;
pub mod mock;

pub use api::{
    ApiResponse, BookingConfirmation, ChatApi, InitConversation, PackCheckout, ProgressFn,
    SharedChatApi, UploadedFile, quick_action_phrase,
};
pub use channel::{
    EventHandler, EventKind, HandlerRegistry, PushEvent, RealtimeChannel, SharedRealtimeChannel,
    SimulatedChannel, Subscription,
};
pub use error::TransportError;
pub use http::HttpChatApi;
pub use latency::{Latency, NoLatency, Operation, SharedLatency, SimulatedLatency};
pub use mock::MockChatApi;

pub(crate) fn span_for(operation: &'static str, session_id: Option<&str>) -> tracing::Span {
    tracing::info_span!(
        "chat.transport",
        operation,
        session_id = session_id.unwrap_or("-")
    )
}
