use std::fmt;

use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime, Time};
use uuid::Uuid;

/// Client-generated message identifier, unique per session.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for MessageId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for MessageId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sender {
    User,
    Ai,
    System,
}

impl Sender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sender::User => "user",
            Sender::Ai => "ai",
            Sender::System => "system",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingSlot {
    pub id: String,
    pub date: Date,
    pub start_time: Time,
    pub end_time: Time,
    pub resource_name: String,
    pub price: u32,
    pub available: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pack {
    pub id: String,
    pub name: String,
    pub description: String,
    pub price: u32,
    pub hours: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub savings: Option<u32>,
    #[serde(default)]
    pub popular: bool,
}

/// Closed set of actions a quick-action button can trigger.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKey {
    Booking,
    Pricing,
    Human,
}

impl ActionKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKey::Booking => "booking",
            ActionKey::Pricing => "pricing",
            ActionKey::Human => "human",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "booking" => Some(ActionKey::Booking),
            "pricing" => Some(ActionKey::Pricing),
            "human" => Some(ActionKey::Human),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuickAction {
    pub id: String,
    pub label: String,
    pub action: ActionKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

impl QuickAction {
    pub fn new(id: &str, label: &str, action: ActionKey, icon: Option<&str>) -> Self {
        Self {
            id: id.to_string(),
            label: label.to_string(),
            action,
            icon: icon.map(str::to_string),
        }
    }
}

/// The three actions offered on greeting and fallback replies.
pub fn default_quick_actions() -> Vec<QuickAction> {
    vec![
        QuickAction::new("qa-booking", "Reserver", ActionKey::Booking, Some("calendar")),
        QuickAction::new("qa-pricing", "Tarifs", ActionKey::Pricing, Some("tag")),
        QuickAction::new(
            "qa-human",
            "Parler a un conseiller",
            ActionKey::Human,
            Some("user"),
        ),
    ]
}

/// Variant-specific payload of a message. Fixed at creation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum MessageContent {
    Text {
        body: String,
    },
    BookingOffer {
        body: String,
        slots: Vec<BookingSlot>,
    },
    PackOffer {
        body: String,
        packs: Vec<Pack>,
    },
    QuickActions {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        body: Option<String>,
        actions: Vec<QuickAction>,
    },
    #[serde(rename_all = "camelCase")]
    Escalation {
        body: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        estimated_wait_minutes: Option<u32>,
    },
}

impl MessageContent {
    pub fn kind(&self) -> &'static str {
        match self {
            MessageContent::Text { .. } => "text",
            MessageContent::BookingOffer { .. } => "booking-offer",
            MessageContent::PackOffer { .. } => "pack-offer",
            MessageContent::QuickActions { .. } => "quick-actions",
            MessageContent::Escalation { .. } => "escalation",
        }
    }

    pub fn body(&self) -> Option<&str> {
        match self {
            MessageContent::Text { body }
            | MessageContent::BookingOffer { body, .. }
            | MessageContent::PackOffer { body, .. }
            | MessageContent::Escalation { body, .. } => Some(body),
            MessageContent::QuickActions { body, .. } => body.as_deref(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    /// Per-session ordering key stamped by the store on append; 0 until then.
    #[serde(default)]
    pub seq: u64,
    pub sender: Sender,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(default)]
    pub read: bool,
    pub content: MessageContent,
}

impl Message {
    fn new(sender: Sender, content: MessageContent) -> Self {
        Self {
            id: MessageId::new(),
            seq: 0,
            sender,
            created_at: OffsetDateTime::now_utc(),
            read: false,
            content,
        }
    }

    pub fn user_text(body: impl Into<String>) -> Self {
        Self::new(Sender::User, MessageContent::Text { body: body.into() })
    }

    pub fn ai_text(body: impl Into<String>) -> Self {
        Self::new(Sender::Ai, MessageContent::Text { body: body.into() })
    }

    pub fn booking_offer(body: impl Into<String>, slots: Vec<BookingSlot>) -> Self {
        Self::new(
            Sender::Ai,
            MessageContent::BookingOffer {
                body: body.into(),
                slots,
            },
        )
    }

    pub fn pack_offer(body: impl Into<String>, packs: Vec<Pack>) -> Self {
        Self::new(
            Sender::Ai,
            MessageContent::PackOffer {
                body: body.into(),
                packs,
            },
        )
    }

    pub fn quick_actions(body: Option<String>, actions: Vec<QuickAction>) -> Self {
        Self::new(Sender::Ai, MessageContent::QuickActions { body, actions })
    }

    /// Escalations are always emitted by the system sender.
    pub fn escalation(body: impl Into<String>, estimated_wait_minutes: Option<u32>) -> Self {
        Self::new(
            Sender::System,
            MessageContent::Escalation {
                body: body.into(),
                estimated_wait_minutes,
            },
        )
    }

    pub fn with_id(mut self, id: impl Into<MessageId>) -> Self {
        self.id = id.into();
        self
    }
}
