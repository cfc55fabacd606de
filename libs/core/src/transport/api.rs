use std::sync::Arc;

use async_trait::async_trait;
use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::message::{ActionKey, BookingSlot, Message, Pack};
use crate::state::FileUpload;
use crate::transport::error::TransportError;

/// Outcome of a request/response operation. Operations never fail with a
/// `Result::Err`; callers branch on `Data` versus `Error`.
///
/// Serializes as `{"data": ...}` or `{"error": "..."}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiResponse<T> {
    Data(T),
    Error(String),
}

impl<T> ApiResponse<T> {
    /// Converts a transport result, recording the failure.
    pub fn from_result(operation: &'static str, result: Result<T, TransportError>) -> Self {
        match result {
            Ok(data) => ApiResponse::Data(data),
            Err(err) => {
                counter!(
                    "rooom_chat_transport_errors_total",
                    "operation" => operation,
                    "kind" => err.kind()
                )
                .increment(1);
                warn!(target: "chat.transport", operation, error = %err, "operation failed");
                ApiResponse::Error(err.to_string())
            }
        }
    }

    pub fn is_data(&self) -> bool {
        matches!(self, ApiResponse::Data(_))
    }

    pub fn data(self) -> Option<T> {
        match self {
            ApiResponse::Data(data) => Some(data),
            ApiResponse::Error(_) => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            ApiResponse::Data(_) => None,
            ApiResponse::Error(message) => Some(message),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitConversation {
    pub session_id: String,
    pub messages: Vec<Message>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingConfirmation {
    pub booking_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackCheckout {
    pub redirect_url: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedFile {
    pub url: String,
}

/// Receives upload progress percentages, in emission order.
pub type ProgressFn<'a> = &'a (dyn Fn(u8) + Send + Sync);

/// Request/response operations against the studio backend.
#[async_trait]
pub trait ChatApi: Send + Sync {
    async fn init_conversation(
        &self,
        studio_id: &str,
        studio_name: &str,
    ) -> ApiResponse<InitConversation>;

    async fn send_message(
        &self,
        session_id: &str,
        text: &str,
        studio_name: &str,
    ) -> ApiResponse<Vec<Message>>;

    async fn handle_quick_action(
        &self,
        session_id: &str,
        action: ActionKey,
        studio_name: &str,
    ) -> ApiResponse<Vec<Message>>;

    async fn book_slot(
        &self,
        session_id: &str,
        slot: &BookingSlot,
    ) -> ApiResponse<BookingConfirmation>;

    async fn select_pack(&self, session_id: &str, pack: &Pack) -> ApiResponse<PackCheckout>;

    async fn upload_attachment(
        &self,
        session_id: &str,
        file: &FileUpload,
        progress: ProgressFn<'_>,
    ) -> ApiResponse<UploadedFile>;
}

pub type SharedChatApi = Arc<dyn ChatApi>;

/// Phrase sent on the visitor's behalf when a quick action is clicked.
pub fn quick_action_phrase(action: ActionKey) -> &'static str {
    match action {
        ActionKey::Booking => "Je voudrais réserver un créneau",
        ActionKey::Pricing => "Quels sont vos tarifs ?",
        ActionKey::Human => "Je voudrais parler à un conseiller",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intent::{Intent, resolve_intent};
    use serde_json::json;

    #[test]
    fn envelope_shapes() {
        let ok: ApiResponse<BookingConfirmation> = ApiResponse::Data(BookingConfirmation {
            booking_id: "BK-1".into(),
        });
        assert_eq!(
            serde_json::to_value(&ok).unwrap(),
            json!({"data": {"bookingId": "BK-1"}})
        );
        let err: ApiResponse<BookingConfirmation> =
            serde_json::from_value(json!({"error": "slot taken"})).unwrap();
        assert_eq!(err.error(), Some("slot taken"));
        assert!(!err.is_data());
    }

    #[test]
    fn phrases_resolve_to_their_own_intent() {
        assert_eq!(
            resolve_intent(quick_action_phrase(ActionKey::Booking)),
            Intent::Booking
        );
        assert_eq!(
            resolve_intent(quick_action_phrase(ActionKey::Pricing)),
            Intent::Pricing
        );
        assert_eq!(
            resolve_intent(quick_action_phrase(ActionKey::Human)),
            Intent::Human
        );
    }

    #[test]
    fn from_result_keeps_error_text() {
        let response: ApiResponse<()> =
            ApiResponse::from_result("book_slot", Err(TransportError::Rejected("nope".into())));
        assert_eq!(response.error(), Some("nope"));
    }
}
