//! Restricted-origin messaging between an embedded widget and its hosting
//! page.
//!
//! Two independent sides share this boundary: [`parent::ParentBridge`] lets
//! the chat widget announce lifecycle events to the page embedding it, and
//! [`loader::BookingWidgetLoader`] embeds the booking app in a frame and
//! relays its events back out. Neither side ever uses the wildcard origin.

use std::fmt;

use thiserror::Error;
use url::{Origin, Url};

pub mod loader;
pub mod parent;

pub use loader::{
    BookingWidgetLoader, EmbedHost, FrameHandle, FrameMessageEvent, InMemoryEmbedHost,
    ListenerId, LoaderCallbacks, LoaderConfig, LoaderMessage, MessageListener,
};
pub use parent::{FramePort, HostMessage, ParentBridge, RecordingFramePort};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BridgeError {
    #[error("wildcard target origin is not allowed")]
    Wildcard,
    #[error("origin is opaque: {0}")]
    OpaqueOrigin(String),
    #[error("invalid origin url {0}")]
    InvalidUrl(String),
    #[error("post failed: {0}")]
    Post(String),
}

/// A single concrete `scheme://host[:port]` origin.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TargetOrigin(String);

impl TargetOrigin {
    pub fn parse(raw: &str) -> Result<Self, BridgeError> {
        let raw = raw.trim();
        if raw == "*" {
            return Err(BridgeError::Wildcard);
        }
        let url = Url::parse(raw).map_err(|_| BridgeError::InvalidUrl(raw.to_string()))?;
        Self::from_url(&url)
    }

    pub fn from_url(url: &Url) -> Result<Self, BridgeError> {
        match url.origin() {
            origin @ Origin::Tuple(..) => Ok(Self(origin.ascii_serialization())),
            Origin::Opaque(_) => Err(BridgeError::OpaqueOrigin(url.to_string())),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Exact comparison against an `event.origin` string.
    pub fn matches(&self, origin: &str) -> bool {
        self.0 == origin
    }
}

impl fmt::Display for TargetOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The referrer's origin when it parses to a concrete origin, otherwise the
/// document's own origin.
pub fn resolve_parent_origin(referrer: Option<&str>, document_origin: &TargetOrigin) -> TargetOrigin {
    referrer
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .and_then(|r| match TargetOrigin::parse(r) {
            Ok(origin) => Some(origin),
            Err(err) => {
                tracing::debug!(target: "chat.bridge", error = %err, "referrer unusable, falling back to document origin");
                None
            }
        })
        .unwrap_or_else(|| document_origin.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc() -> TargetOrigin {
        TargetOrigin::parse("https://widget.rooom.app").unwrap()
    }

    #[test]
    fn origin_drops_path_and_query() {
        let origin = TargetOrigin::parse("https://studio.example.com:8443/page?x=1#top").unwrap();
        assert_eq!(origin.as_str(), "https://studio.example.com:8443");
    }

    #[test]
    fn default_port_is_elided() {
        let origin = TargetOrigin::parse("https://studio.example.com:443/").unwrap();
        assert_eq!(origin.as_str(), "https://studio.example.com");
    }

    #[test]
    fn wildcard_is_rejected() {
        assert_eq!(TargetOrigin::parse("*"), Err(BridgeError::Wildcard));
    }

    #[test]
    fn opaque_origin_is_rejected() {
        assert!(matches!(
            TargetOrigin::parse("data:text/html,hi"),
            Err(BridgeError::OpaqueOrigin(_))
        ));
    }

    #[test]
    fn referrer_origin_wins() {
        let origin = resolve_parent_origin(Some("https://studio.example.com/contact"), &doc());
        assert_eq!(origin.as_str(), "https://studio.example.com");
    }

    #[test]
    fn malformed_referrer_falls_back() {
        assert_eq!(resolve_parent_origin(Some("not a url"), &doc()), doc());
        assert_eq!(resolve_parent_origin(Some(""), &doc()), doc());
        assert_eq!(resolve_parent_origin(Some("*"), &doc()), doc());
        assert_eq!(resolve_parent_origin(None, &doc()), doc());
    }
}
