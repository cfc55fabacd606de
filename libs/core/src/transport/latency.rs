use std::ops::RangeInclusive;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    Connect,
    InitConversation,
    /// The assistant "thinking" before a reply.
    Thinking,
    BookSlot,
    SelectPack,
    /// One 10% step of an upload.
    UploadChunk,
}

pub trait Latency: Send + Sync {
    fn delay(&self, operation: Operation) -> Duration;
}

pub type SharedLatency = Arc<dyn Latency>;

/// Zero delay everywhere; keeps tests deterministic.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoLatency;

impl Latency for NoLatency {
    fn delay(&self, _operation: Operation) -> Duration {
        Duration::ZERO
    }
}

/// Delays modelled on a real backend round trip, with a randomized
/// thinking time.
#[derive(Clone, Debug)]
pub struct SimulatedLatency {
    thinking_ms: RangeInclusive<u64>,
}

impl SimulatedLatency {
    pub fn new() -> Self {
        Self {
            thinking_ms: 1_000..=2_500,
        }
    }

    pub fn with_thinking_range(thinking_ms: RangeInclusive<u64>) -> Self {
        Self { thinking_ms }
    }
}

impl Default for SimulatedLatency {
    fn default() -> Self {
        Self::new()
    }
}

impl Latency for SimulatedLatency {
    fn delay(&self, operation: Operation) -> Duration {
        let millis = match operation {
            Operation::Connect => 300,
            Operation::InitConversation => 500,
            Operation::Thinking => {
                if self.thinking_ms.is_empty() {
                    0
                } else {
                    rand::rng().random_range(self.thinking_ms.clone())
                }
            }
            Operation::BookSlot => 800,
            Operation::SelectPack => 500,
            Operation::UploadChunk => 100,
        };
        Duration::from_millis(millis)
    }
}
