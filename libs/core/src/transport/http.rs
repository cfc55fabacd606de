use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use metrics::histogram;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Url};
use security::{ANTI_FORGERY_HEADER, AntiForgery};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::Instrument;

use crate::message::{ActionKey, BookingSlot, Message, Pack};
use crate::state::{FileUpload, TypingState};
use crate::transport::api::{
    ApiResponse, BookingConfirmation, ChatApi, InitConversation, PackCheckout, ProgressFn,
    UploadedFile,
};
use crate::transport::channel::{PushEvent, SimulatedChannel};
use crate::transport::error::TransportError;
use crate::transport::span_for;

pub const FILENAME_HEADER: &str = "X-Filename";

pub struct HttpChatApi {
    client: Client,
    base_url: Url,
    timeout: Duration,
    anti_forgery: AntiForgery,
    typing: Option<TypingIndicator>,
}

struct TypingIndicator {
    channel: Arc<SimulatedChannel>,
    persona: String,
}

/// Publishes the idle state when the reply arrives or the call is dropped.
struct IdleOnDrop<'a>(&'a SimulatedChannel);

impl Drop for IdleOnDrop<'_> {
    fn drop(&mut self) {
        self.0.emit(PushEvent::Typing(TypingState::idle()));
    }
}

impl HttpChatApi {
    pub fn new(
        base_url: &str,
        timeout: Duration,
        anti_forgery: AntiForgery,
    ) -> Result<Self, TransportError> {
        let client = Client::builder().timeout(timeout).build()?;
        Self::with_client(client, base_url, timeout, anti_forgery)
    }

    pub fn with_client(
        client: Client,
        base_url: &str,
        timeout: Duration,
        anti_forgery: AntiForgery,
    ) -> Result<Self, TransportError> {
        // Endpoints are joined relative to the base, which must end in `/`.
        let base_url = if base_url.ends_with('/') {
            Url::parse(base_url)?
        } else {
            Url::parse(&format!("{base_url}/"))?
        };
        Ok(Self {
            client,
            base_url,
            timeout,
            anti_forgery,
            typing: None,
        })
    }

    /// Shows `persona` typing on `channel` while a message or quick action
    /// awaits its reply.
    pub fn with_typing(mut self, channel: Arc<SimulatedChannel>, persona: impl Into<String>) -> Self {
        self.typing = Some(TypingIndicator {
            channel,
            persona: persona.into(),
        });
        self
    }

    async fn typing_around<F: Future>(&self, call: F) -> F::Output {
        let Some(typing) = &self.typing else {
            return call.await;
        };
        typing
            .channel
            .emit(PushEvent::Typing(TypingState::typing(typing.persona.clone())));
        let _idle = IdleOnDrop(&typing.channel);
        call.await
    }

    fn endpoint(&self, path: &str) -> Result<Url, TransportError> {
        Ok(self.base_url.join(path)?)
    }

    fn session_path(session_id: &str, tail: &str) -> String {
        format!("conversations/{}/{tail}", urlencoding::encode(session_id))
    }

    fn map_send_error(&self, err: reqwest::Error) -> TransportError {
        if err.is_timeout() {
            TransportError::Timeout(self.timeout)
        } else {
            TransportError::Http(err)
        }
    }

    async fn post_json<B, T>(
        &self,
        operation: &'static str,
        path: &str,
        body: &B,
    ) -> Result<T, TransportError>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let url = self.endpoint(path)?;
        let started = Instant::now();
        let response = self
            .client
            .post(url)
            .header(ANTI_FORGERY_HEADER, self.anti_forgery.token())
            .json(body)
            .send()
            .await
            .map_err(|err| self.map_send_error(err))?;
        record_roundtrip(operation, &response, started);
        self.decode(response).await
    }

    async fn decode<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, TransportError> {
        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|err| self.map_send_error(err))?;
        if !status.is_success() {
            let message = serde_json::from_slice::<ApiResponse<serde_json::Value>>(&bytes)
                .ok()
                .and_then(|envelope| envelope.error().map(str::to_string))
                .unwrap_or_else(|| String::from_utf8_lossy(&bytes).trim().to_string());
            return Err(TransportError::Remote { status, message });
        }
        match serde_json::from_slice::<ApiResponse<T>>(&bytes)? {
            ApiResponse::Data(data) => Ok(data),
            ApiResponse::Error(message) => Err(TransportError::Rejected(message)),
        }
    }
}

fn record_roundtrip(operation: &'static str, response: &reqwest::Response, started: Instant) {
    histogram!(
        "rooom_chat_roundtrip_seconds",
        "operation" => operation,
        "status" => response.status().as_str().to_string()
    )
    .record(started.elapsed().as_secs_f64());
}

#[async_trait]
impl ChatApi for HttpChatApi {
    async fn init_conversation(
        &self,
        studio_id: &str,
        studio_name: &str,
    ) -> ApiResponse<InitConversation> {
        let body = json!({ "studioId": studio_id, "studioName": studio_name });
        let result = self
            .post_json("init_conversation", "conversations", &body)
            .instrument(span_for("init_conversation", None))
            .await;
        ApiResponse::from_result("init_conversation", result)
    }

    async fn send_message(
        &self,
        session_id: &str,
        text: &str,
        studio_name: &str,
    ) -> ApiResponse<Vec<Message>> {
        let body = json!({ "text": text, "studioName": studio_name });
        let result = self
            .typing_around(self.post_json(
                "send_message",
                &Self::session_path(session_id, "messages"),
                &body,
            ))
            .instrument(span_for("send_message", Some(session_id)))
            .await;
        ApiResponse::from_result("send_message", result)
    }

    async fn handle_quick_action(
        &self,
        session_id: &str,
        action: ActionKey,
        studio_name: &str,
    ) -> ApiResponse<Vec<Message>> {
        let body = json!({ "action": action, "studioName": studio_name });
        let result = self
            .typing_around(self.post_json(
                "quick_action",
                &Self::session_path(session_id, "quick-actions"),
                &body,
            ))
            .instrument(span_for("quick_action", Some(session_id)))
            .await;
        ApiResponse::from_result("quick_action", result)
    }

    async fn book_slot(
        &self,
        session_id: &str,
        slot: &BookingSlot,
    ) -> ApiResponse<BookingConfirmation> {
        let body = json!({ "slot": slot });
        let result = self
            .post_json(
                "book_slot",
                &Self::session_path(session_id, "bookings"),
                &body,
            )
            .instrument(span_for("book_slot", Some(session_id)))
            .await;
        ApiResponse::from_result("book_slot", result)
    }

    async fn select_pack(&self, session_id: &str, pack: &Pack) -> ApiResponse<PackCheckout> {
        let body = json!({ "pack": pack });
        let result = self
            .post_json("select_pack", &Self::session_path(session_id, "packs"), &body)
            .instrument(span_for("select_pack", Some(session_id)))
            .await;
        ApiResponse::from_result("select_pack", result)
    }

    async fn upload_attachment(
        &self,
        session_id: &str,
        file: &FileUpload,
        progress: ProgressFn<'_>,
    ) -> ApiResponse<UploadedFile> {
        let result = async {
            progress(0);
            let url = self.endpoint(&Self::session_path(session_id, "attachments"))?;
            let started = Instant::now();
            let response = self
                .client
                .post(url)
                .header(ANTI_FORGERY_HEADER, self.anti_forgery.token())
                .header(CONTENT_TYPE, file.mime_type.as_str())
                .header(FILENAME_HEADER, urlencoding::encode(&file.filename).into_owned())
                .body(file.bytes.clone())
                .send()
                .await
                .map_err(|err| self.map_send_error(err))?;
            record_roundtrip("upload_attachment", &response, started);
            let uploaded: UploadedFile = self.decode(response).await?;
            progress(100);
            Ok(uploaded)
        }
        .instrument(span_for("upload_attachment", Some(session_id)))
        .await;
        ApiResponse::from_result("upload_attachment", result)
    }
}
