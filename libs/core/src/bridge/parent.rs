use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::bridge::{BridgeError, TargetOrigin};

/// Lifecycle notifications posted to the hosting page.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum HostMessage {
    #[serde(rename = "ROOOM_CHAT_READY", rename_all = "camelCase")]
    Ready { studio_id: String },
    #[serde(rename = "ROOOM_CHAT_OPEN")]
    Open,
    #[serde(rename = "ROOOM_CHAT_CLOSE")]
    Close,
}

/// The window the widget runs in.
pub trait FramePort: Send + Sync {
    /// True when running inside a parent frame.
    fn is_embedded(&self) -> bool;

    fn post_message(&self, message: &HostMessage, target: &TargetOrigin) -> Result<(), BridgeError>;
}

/// Records posted messages; used by the console app and tests.
#[derive(Default)]
pub struct RecordingFramePort {
    embedded: bool,
    posted: Mutex<Vec<(HostMessage, TargetOrigin)>>,
}

impl RecordingFramePort {
    pub fn embedded() -> Self {
        Self {
            embedded: true,
            posted: Mutex::default(),
        }
    }

    pub fn top_level() -> Self {
        Self::default()
    }

    pub fn posted(&self) -> Vec<(HostMessage, TargetOrigin)> {
        self.posted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl FramePort for RecordingFramePort {
    fn is_embedded(&self) -> bool {
        self.embedded
    }

    fn post_message(&self, message: &HostMessage, target: &TargetOrigin) -> Result<(), BridgeError> {
        self.posted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((message.clone(), target.clone()));
        Ok(())
    }
}

pub struct ParentBridge {
    port: Arc<dyn FramePort>,
    target: TargetOrigin,
}

impl ParentBridge {
    pub fn new(port: Arc<dyn FramePort>, target: TargetOrigin) -> Self {
        Self { port, target }
    }

    pub fn target(&self) -> &TargetOrigin {
        &self.target
    }

    pub fn ready(&self, studio_id: &str) {
        self.notify(HostMessage::Ready {
            studio_id: studio_id.to_string(),
        });
    }

    pub fn opened(&self) {
        self.notify(HostMessage::Open);
    }

    pub fn closed(&self) {
        self.notify(HostMessage::Close);
    }

    /// Posting failures are logged and dropped.
    pub fn notify(&self, message: HostMessage) {
        if !self.port.is_embedded() {
            return;
        }
        match self.port.post_message(&message, &self.target) {
            Ok(()) => debug!(target: "chat.bridge", origin = %self.target, ?message, "posted to host"),
            Err(err) => warn!(target: "chat.bridge", origin = %self.target, error = %err, "post to host failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn target() -> TargetOrigin {
        TargetOrigin::parse("https://studio.example.com").unwrap()
    }

    #[test]
    fn wire_shape() {
        let ready = serde_json::to_value(HostMessage::Ready {
            studio_id: "studio-1".into(),
        })
        .unwrap();
        assert_eq!(
            ready,
            json!({"type": "ROOOM_CHAT_READY", "payload": {"studioId": "studio-1"}})
        );
        assert_eq!(
            serde_json::to_value(HostMessage::Open).unwrap(),
            json!({"type": "ROOOM_CHAT_OPEN"})
        );
    }

    #[test]
    fn posts_only_when_embedded() {
        let top = Arc::new(RecordingFramePort::top_level());
        let bridge = ParentBridge::new(top.clone(), target());
        bridge.ready("studio-1");
        bridge.opened();
        assert!(top.posted().is_empty());

        let framed = Arc::new(RecordingFramePort::embedded());
        let bridge = ParentBridge::new(framed.clone(), target());
        bridge.ready("studio-1");
        bridge.opened();
        bridge.closed();
        let posted = framed.posted();
        assert_eq!(posted.len(), 3);
        assert!(posted.iter().all(|(_, origin)| origin.as_str() == "https://studio.example.com"));
        assert_eq!(posted[2].0, HostMessage::Close);
    }
}
