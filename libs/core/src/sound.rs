use std::sync::Arc;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SoundError {
    #[error("audio output unavailable")]
    Unavailable,
    #[error("audio playback failed: {0}")]
    Playback(String),
}

/// Short notification tone played when an assistant message arrives while
/// the window is not open. Playback is best-effort.
pub trait NotificationSound: Send + Sync {
    fn play(&self) -> Result<(), SoundError>;
}

pub type SharedNotificationSound = Arc<dyn NotificationSound>;

/// For hosts without an audio device.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopSound;

impl NotificationSound for NoopSound {
    fn play(&self) -> Result<(), SoundError> {
        Ok(())
    }
}
