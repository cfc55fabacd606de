//! Terminal stand-ins for the browser capabilities the widget uses.

use std::io::{self, Write};

use rooom_core::bridge::{BridgeError, FramePort, HostMessage, TargetOrigin};
use rooom_core::sound::{NotificationSound, SoundError};

/// Rings the terminal bell.
pub struct TerminalBell;

impl NotificationSound for TerminalBell {
    fn play(&self) -> Result<(), SoundError> {
        let mut stderr = io::stderr().lock();
        stderr
            .write_all(b"\x07")
            .and_then(|_| stderr.flush())
            .map_err(|err| SoundError::Playback(err.to_string()))
    }
}

/// Prints host notifications to stderr as they would be posted to the
/// embedding page.
pub struct ConsoleFramePort {
    embedded: bool,
}

impl ConsoleFramePort {
    pub fn new(embedded: bool) -> Self {
        Self { embedded }
    }
}

impl FramePort for ConsoleFramePort {
    fn is_embedded(&self) -> bool {
        self.embedded
    }

    fn post_message(&self, message: &HostMessage, target: &TargetOrigin) -> Result<(), BridgeError> {
        let payload =
            serde_json::to_string(message).map_err(|err| BridgeError::Post(err.to_string()))?;
        eprintln!("[host {target}] {payload}");
        Ok(())
    }
}
