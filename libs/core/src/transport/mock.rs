use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{Instrument, debug};
use url::Url;
use uuid::Uuid;

use crate::intent::IntentResolver;
use crate::message::{ActionKey, BookingSlot, Message, Pack};
use crate::state::{FileUpload, TypingState};
use crate::transport::api::{
    ApiResponse, BookingConfirmation, ChatApi, InitConversation, PackCheckout, ProgressFn,
    UploadedFile, quick_action_phrase,
};
use crate::transport::channel::{PushEvent, SimulatedChannel};
use crate::transport::error::TransportError;
use crate::transport::latency::{Operation, SharedLatency};
use crate::transport::span_for;

pub const DEFAULT_CHECKOUT_BASE: &str = "https://checkout.rooom.app/";

/// Percentage at which a forced upload failure is raised.
const FAILED_UPLOAD_AT: u8 = 50;

/// In-process backend used when no API base is configured. Bookings and
/// checkouts only return identifiers.
pub struct MockChatApi {
    resolver: IntentResolver,
    channel: Arc<SimulatedChannel>,
    latency: SharedLatency,
    persona: String,
    greeting: Option<String>,
    checkout_base: Url,
    failing_uploads: HashSet<String>,
    fail_init: bool,
    fail_replies: bool,
}

impl MockChatApi {
    pub fn new(
        resolver: IntentResolver,
        channel: Arc<SimulatedChannel>,
        latency: SharedLatency,
    ) -> Result<Self, TransportError> {
        Ok(Self {
            resolver,
            channel,
            latency,
            persona: "Assistant".to_string(),
            greeting: None,
            checkout_base: Url::parse(DEFAULT_CHECKOUT_BASE)?,
            failing_uploads: HashSet::new(),
            fail_init: false,
            fail_replies: false,
        })
    }

    /// Name shown in the typing indicator.
    pub fn with_persona(mut self, persona: impl Into<String>) -> Self {
        self.persona = persona.into();
        self
    }

    pub fn with_greeting(mut self, greeting: Option<String>) -> Self {
        self.greeting = greeting;
        self
    }

    pub fn with_checkout_base(mut self, base: Url) -> Self {
        self.checkout_base = base;
        self
    }

    /// Makes every upload of `filename` fail halfway through.
    pub fn fail_upload(mut self, filename: impl Into<String>) -> Self {
        self.failing_uploads.insert(filename.into());
        self
    }

    pub fn fail_init(mut self) -> Self {
        self.fail_init = true;
        self
    }

    /// Makes message sends, quick actions, bookings and checkouts fail.
    pub fn fail_replies(mut self) -> Self {
        self.fail_replies = true;
        self
    }

    async fn pause(&self, operation: Operation) {
        let delay = self.latency.delay(operation);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    fn unavailable(&self) -> TransportError {
        TransportError::Rejected("Le service est momentanément indisponible.".into())
    }

    async fn reply(&self, text: &str, studio_name: &str) -> Result<Vec<Message>, TransportError> {
        self.channel
            .emit(PushEvent::Typing(TypingState::typing(self.persona.clone())));
        self.pause(Operation::Thinking).await;
        self.channel.emit(PushEvent::Typing(TypingState::idle()));
        if self.fail_replies {
            return Err(self.unavailable());
        }
        Ok(self.resolver.respond(text, studio_name))
    }

    fn checkout_url(&self, session_id: &str, pack: &Pack) -> Result<String, TransportError> {
        let mut url = self.checkout_base.join(&format!("packs/{}", pack.id))?;
        url.query_pairs_mut().append_pair("session", session_id);
        Ok(url.to_string())
    }
}

#[async_trait]
impl ChatApi for MockChatApi {
    async fn init_conversation(
        &self,
        studio_id: &str,
        studio_name: &str,
    ) -> ApiResponse<InitConversation> {
        let result = async {
            self.pause(Operation::InitConversation).await;
            if self.fail_init {
                return Err(self.unavailable());
            }
            let session_id = format!("session_{}", Uuid::new_v4().simple());
            debug!(
                target: "chat.transport",
                studio_id,
                session_id = %session_id,
                "conversation started"
            );
            Ok(InitConversation {
                session_id,
                messages: self.resolver.welcome(studio_name, self.greeting.as_deref()),
            })
        }
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
        let result = self
            .reply(text, studio_name)
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
        let result = self
            .reply(quick_action_phrase(action), studio_name)
            .instrument(span_for("quick_action", Some(session_id)))
            .await;
        ApiResponse::from_result("quick_action", result)
    }

    async fn book_slot(
        &self,
        session_id: &str,
        slot: &BookingSlot,
    ) -> ApiResponse<BookingConfirmation> {
        let result = async {
            self.pause(Operation::BookSlot).await;
            if self.fail_replies {
                return Err(self.unavailable());
            }
            if !slot.available {
                return Err(TransportError::Rejected(
                    "Ce créneau n'est plus disponible.".into(),
                ));
            }
            let id = Uuid::new_v4().simple().to_string();
            Ok(BookingConfirmation {
                booking_id: format!("BK-{}", id[..8].to_ascii_uppercase()),
            })
        }
        .instrument(span_for("book_slot", Some(session_id)))
        .await;
        ApiResponse::from_result("book_slot", result)
    }

    async fn select_pack(&self, session_id: &str, pack: &Pack) -> ApiResponse<PackCheckout> {
        let result = async {
            self.pause(Operation::SelectPack).await;
            if self.fail_replies {
                return Err(self.unavailable());
            }
            Ok(PackCheckout {
                redirect_url: self.checkout_url(session_id, pack)?,
            })
        }
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
        let fails = self.failing_uploads.contains(&file.filename);
        let result = async {
            for step in 0..=10u8 {
                let percent = step * 10;
                progress(percent);
                if fails && percent == FAILED_UPLOAD_AT {
                    return Err(TransportError::Rejected(format!(
                        "Échec de l'envoi de {}",
                        file.filename
                    )));
                }
                if step < 10 {
                    self.pause(Operation::UploadChunk).await;
                }
            }
            Ok(UploadedFile {
                url: format!("blob:rooom/{}", Uuid::new_v4()),
            })
        }
        .instrument(span_for("upload_attachment", Some(session_id)))
        .await;
        ApiResponse::from_result("upload_attachment", result)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use super::*;
    use crate::catalog::StudioCatalog;
    use crate::message::MessageContent;
    use crate::transport::channel::{EventKind, RealtimeChannel};
    use crate::transport::latency::{NoLatency, SimulatedLatency};
    use time::macros::date;

    fn api(latency: SharedLatency) -> (MockChatApi, Arc<SimulatedChannel>) {
        let channel = Arc::new(SimulatedChannel::new(Arc::clone(&latency)));
        let resolver = IntentResolver::new(StudioCatalog::demo(date!(2024 - 05 - 01)));
        let api = MockChatApi::new(resolver, Arc::clone(&channel), latency)
            .unwrap()
            .with_persona("Lea");
        (api, channel)
    }

    #[tokio::test]
    async fn init_returns_greeting_and_default_actions() {
        let (api, _) = api(Arc::new(NoLatency));
        let init = api
            .init_conversation("studio-1", "Studio X")
            .await
            .data()
            .unwrap();
        assert!(init.session_id.starts_with("session_"));
        assert_eq!(init.messages.len(), 2);
        assert_eq!(init.messages[0].content.kind(), "text");
        let MessageContent::QuickActions { actions, .. } = &init.messages[1].content else {
            panic!("expected quick actions");
        };
        let labels: Vec<&str> = actions.iter().map(|a| a.label.as_str()).collect();
        assert_eq!(labels, ["Reserver", "Tarifs", "Parler a un conseiller"]);
    }

    #[tokio::test(start_paused = true)]
    async fn send_brackets_thinking_with_typing_events() {
        let (api, channel) = api(Arc::new(SimulatedLatency::new()));
        channel.connect().await.unwrap();
        let typing = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&typing);
        channel.on(
            EventKind::Typing,
            Arc::new(move |event| {
                if let PushEvent::Typing(state) = event {
                    sink.lock().unwrap().push((tokio::time::Instant::now(), state.clone()));
                }
            }),
        );

        let reply = api.send_message("s-1", "tarifs", "Studio X").await;
        let events = typing.lock().unwrap().clone();
        assert!(reply.is_data());
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].1, TypingState::typing("Lea"));
        assert_eq!(events[1].1, TypingState::idle());
        let thinking = events[1].0 - events[0].0;
        assert!(thinking >= Duration::from_millis(1_000));
        assert!(thinking <= Duration::from_millis(2_500));
    }

    #[tokio::test]
    async fn booking_an_unavailable_slot_is_rejected() {
        let (api, _) = api(Arc::new(NoLatency));
        let catalog = StudioCatalog::demo(date!(2024 - 05 - 01));
        let taken = catalog.slot("slot-4").unwrap();
        let response = api.book_slot("s-1", taken).await;
        assert_eq!(response.error(), Some("Ce créneau n'est plus disponible."));

        let open = catalog.slot("slot-1").unwrap();
        let booking = api.book_slot("s-1", open).await.data().unwrap();
        assert!(booking.booking_id.starts_with("BK-"));
        assert_eq!(booking.booking_id.len(), 11);
    }

    #[tokio::test]
    async fn select_pack_redirects_to_checkout() {
        let (api, _) = api(Arc::new(NoLatency));
        let catalog = StudioCatalog::demo(date!(2024 - 05 - 01));
        let pack = catalog.pack("pack-10h").unwrap();
        let checkout = api.select_pack("s-1", pack).await.data().unwrap();
        assert_eq!(
            checkout.redirect_url,
            "https://checkout.rooom.app/packs/pack-10h?session=s-1"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn upload_reports_progress_in_order() {
        let (api, _) = api(Arc::new(SimulatedLatency::new()));
        let seen = Mutex::new(Vec::new());
        let started = tokio::time::Instant::now();
        let file = FileUpload::new("mix.wav", "audio/wav", vec![0; 16]);
        let uploaded = api
            .upload_attachment("s-1", &file, &|p| seen.lock().unwrap().push(p))
            .await
            .data()
            .unwrap();
        assert!(uploaded.url.starts_with("blob:"));
        assert_eq!(
            *seen.lock().unwrap(),
            vec![0, 10, 20, 30, 40, 50, 60, 70, 80, 90, 100]
        );
        assert_eq!(started.elapsed(), Duration::from_secs(1));
    }

    #[tokio::test]
    async fn forced_upload_failure_stops_halfway() {
        let (api, _) = api(Arc::new(NoLatency));
        let api = api.fail_upload("broken.png");
        let seen = Mutex::new(Vec::new());
        let file = FileUpload::new("broken.png", "image/png", vec![1]);
        let response = api
            .upload_attachment("s-1", &file, &|p| seen.lock().unwrap().push(p))
            .await;
        assert!(response.error().is_some());
        assert_eq!(seen.lock().unwrap().last(), Some(&50));
    }
}
