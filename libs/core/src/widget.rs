use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::future::join_all;
use security::AntiForgery;
use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::bridge::ParentBridge;
use crate::catalog::StudioCatalog;
use crate::config::{TransportConfig, WidgetConfig};
use crate::intent::IntentResolver;
use crate::message::{ActionKey, BookingSlot, Message, Pack};
use crate::state::{
    Attachment, AttachmentId, ConnectionStatus, ConversationSession, FileUpload, TypingState,
    WindowState,
};
use crate::store::ConversationStore;
use crate::transport::{
    ApiResponse, BookingConfirmation, EventKind, HttpChatApi, MockChatApi, NoLatency, PushEvent,
    SharedChatApi, SharedLatency, SharedRealtimeChannel, SimulatedChannel, SimulatedLatency,
    Subscription, TransportError, quick_action_phrase,
};

pub const APOLOGY: &str =
    "Désolé, une erreur est survenue. Pouvez-vous reformuler ou réessayer dans un instant ?";
pub const INIT_FAILED: &str = "Impossible de démarrer la conversation.";
const NO_SESSION: &str = "Aucune conversation en cours.";

/// Request/response API plus the push channel it reports on.
pub struct Backend {
    pub api: SharedChatApi,
    pub channel: SharedRealtimeChannel,
}

impl Backend {
    /// In-process backend answering from the demo catalog.
    pub fn simulated(
        config: &WidgetConfig,
        transport: &TransportConfig,
        catalog: StudioCatalog,
    ) -> Result<Self, TransportError> {
        let latency: SharedLatency = if transport.simulated_latency {
            Arc::new(SimulatedLatency::new())
        } else {
            Arc::new(NoLatency)
        };
        let channel = Arc::new(SimulatedChannel::new(Arc::clone(&latency)));
        let mut api = MockChatApi::new(IntentResolver::new(catalog), Arc::clone(&channel), latency)?
            .with_persona(config.ai_name.clone())
            .with_greeting(config.greeting.clone());
        if let Some(base) = &transport.checkout_base {
            api = api.with_checkout_base(base.clone());
        }
        Ok(Self {
            api: Arc::new(api),
            channel,
        })
    }

    /// HTTP backend when `ROOOM_API_BASE` is set, simulated otherwise. The HTTP
    /// backend publishes its typing indicator on a local channel until a
    /// socket transport exists.
    pub fn from_config(
        config: &WidgetConfig,
        transport: &TransportConfig,
        anti_forgery: AntiForgery,
    ) -> Result<Self, TransportError> {
        match &transport.api_base {
            Some(base) => {
                let channel = Arc::new(SimulatedChannel::new(Arc::new(NoLatency)));
                let api =
                    HttpChatApi::new(base.as_str(), transport.request_timeout, anti_forgery)?
                        .with_typing(Arc::clone(&channel), config.ai_name.clone());
                Ok(Self {
                    api: Arc::new(api),
                    channel,
                })
            }
            None => {
                let today = OffsetDateTime::now_utc().date();
                Self::simulated(config, transport, StudioCatalog::demo(today))
            }
        }
    }
}

/// One mounted chat widget. Reset abandons the current session's in-flight
/// calls; teardown abandons all of them.
pub struct ChatWidget {
    config: WidgetConfig,
    store: Arc<ConversationStore>,
    api: SharedChatApi,
    channel: SharedRealtimeChannel,
    bridge: Option<ParentBridge>,
    request_timeout: Duration,
    cancel: CancellationToken,
    session_cancel: Mutex<CancellationToken>,
    subscriptions: Mutex<Vec<Subscription>>,
}

impl ChatWidget {
    pub fn new(config: WidgetConfig, store: Arc<ConversationStore>, backend: Backend) -> Self {
        let cancel = CancellationToken::new();
        Self {
            config,
            store,
            api: backend.api,
            channel: backend.channel,
            bridge: None,
            request_timeout: crate::config::DEFAULT_REQUEST_TIMEOUT,
            session_cancel: Mutex::new(cancel.child_token()),
            cancel,
            subscriptions: Mutex::new(Vec::new()),
        }
    }

    pub fn with_bridge(mut self, bridge: ParentBridge) -> Self {
        self.bridge = Some(bridge);
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn config(&self) -> &WidgetConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<ConversationStore> {
        &self.store
    }

    pub fn is_torn_down(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Connects the push channel, starts a session and announces readiness
    /// to the hosting page. Returns the session id on success.
    pub async fn mount(&self) -> Option<String> {
        self.subscribe_push_events();

        let connected = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return None,
            result = tokio::time::timeout(self.request_timeout, self.channel.connect()) => result,
        };
        match connected {
            Ok(Ok(())) => {}
            Ok(Err(err)) => warn!(target: "chat.widget", error = %err, "push channel unavailable"),
            Err(_) => warn!(target: "chat.widget", "push channel connect timed out"),
        }

        self.start_session().await
    }

    async fn start_session(&self) -> Option<String> {
        self.store.set_loading(true);
        let init = self
            .guarded(
                "init_conversation",
                self.api
                    .init_conversation(&self.config.studio_id, &self.config.studio_name),
            )
            .await?;
        self.store.set_loading(false);

        match init {
            ApiResponse::Data(init) => {
                self.store.append_messages(init.messages);
                self.store.set_session(Some(ConversationSession::new(
                    init.session_id.clone(),
                    self.config.studio_id.clone(),
                )));
                self.store.set_error(None);
                if let Some(bridge) = &self.bridge {
                    bridge.ready(&self.config.studio_id);
                }
                info!(
                    target: "chat.widget",
                    studio_id = %self.config.studio_id,
                    session_id = %init.session_id,
                    "session started"
                );
                Some(init.session_id)
            }
            ApiResponse::Error(err) => {
                warn!(target: "chat.widget", error = %err, "conversation init failed");
                self.store.set_error(Some(INIT_FAILED.to_string()));
                None
            }
        }
    }

    fn subscribe_push_events(&self) {
        let mut subscriptions = self
            .subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if !subscriptions.is_empty() {
            return;
        }
        for kind in [
            EventKind::Message,
            EventKind::Typing,
            EventKind::Connection,
            EventKind::Status,
        ] {
            let store = Arc::clone(&self.store);
            let cancel = self.cancel.clone();
            let subscription = self.channel.on(
                kind,
                Arc::new(move |event: &PushEvent| {
                    if cancel.is_cancelled() {
                        return;
                    }
                    apply_push_event(&store, event);
                }),
            );
            subscriptions.push(subscription);
        }
    }

    fn session_token(&self) -> CancellationToken {
        self.session_cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Runs a backend call under the session token and the request timeout.
    /// `None` means the session was reset or the widget torn down mid-flight.
    async fn guarded<T>(
        &self,
        operation: &'static str,
        call: impl Future<Output = ApiResponse<T>>,
    ) -> Option<ApiResponse<T>> {
        let session = self.session_token();
        tokio::select! {
            biased;
            _ = session.cancelled() => {
                debug!(target: "chat.widget", operation, "call abandoned");
                None
            }
            outcome = tokio::time::timeout(self.request_timeout, call) => Some(match outcome {
                Ok(response) => response,
                Err(_) => ApiResponse::from_result(
                    operation,
                    Err(TransportError::Timeout(self.request_timeout)),
                ),
            }),
        }
    }

    fn fail_gracefully(&self) {
        self.store.set_typing(TypingState::idle());
        self.store.append_message(Message::ai_text(APOLOGY));
    }

    fn active_session(&self) -> Option<String> {
        let session_id = self.store.session_id();
        if session_id.is_none() {
            debug!(target: "chat.widget", "no active session");
        }
        session_id
    }

    /// Sends the current input text.
    pub async fn send_input(&self) -> bool {
        let text = self.store.input();
        self.send(&text).await
    }

    /// Appends the visitor's message, clears the input and appends the reply.
    pub async fn send(&self, text: &str) -> bool {
        let text = text.trim();
        if text.is_empty() || self.is_torn_down() {
            return false;
        }
        let Some(session_id) = self.active_session() else {
            return false;
        };

        self.store.append_message(Message::user_text(text));
        self.store.clear_input();
        self.store.set_sending(true);
        let Some(response) = self
            .guarded(
                "send_message",
                self.api
                    .send_message(&session_id, text, &self.config.studio_name),
            )
            .await
        else {
            return false;
        };
        self.store.set_sending(false);
        self.apply_replies(response)
    }

    pub async fn quick_action(&self, action: ActionKey) -> bool {
        if self.is_torn_down() {
            return false;
        }
        let Some(session_id) = self.active_session() else {
            return false;
        };

        self.store
            .append_message(Message::user_text(quick_action_phrase(action)));
        self.store.set_sending(true);
        let Some(response) = self
            .guarded(
                "quick_action",
                self.api
                    .handle_quick_action(&session_id, action, &self.config.studio_name),
            )
            .await
        else {
            return false;
        };
        self.store.set_sending(false);
        self.apply_replies(response)
    }

    fn apply_replies(&self, response: ApiResponse<Vec<Message>>) -> bool {
        match response {
            ApiResponse::Data(messages) => {
                for message in messages {
                    self.store.append_message(message);
                }
                true
            }
            ApiResponse::Error(_) => {
                self.fail_gracefully();
                false
            }
        }
    }

    pub async fn book_slot(&self, slot: &BookingSlot) -> Option<BookingConfirmation> {
        let session_id = self.active_session()?;
        self.store.set_sending(true);
        let response = self
            .guarded("book_slot", self.api.book_slot(&session_id, slot))
            .await?;
        self.store.set_sending(false);
        match response {
            ApiResponse::Data(confirmation) => {
                self.store.append_message(Message::ai_text(format!(
                    "Votre réservation du {} ({} - {}) est confirmée. Référence : {}",
                    slot.date,
                    format_hm(slot.start_time),
                    format_hm(slot.end_time),
                    confirmation.booking_id
                )));
                Some(confirmation)
            }
            ApiResponse::Error(_) => {
                self.fail_gracefully();
                None
            }
        }
    }

    /// Returns the checkout URL the host should navigate to.
    pub async fn select_pack(&self, pack: &Pack) -> Option<String> {
        let session_id = self.active_session()?;
        self.store.set_sending(true);
        let response = self
            .guarded("select_pack", self.api.select_pack(&session_id, pack))
            .await?;
        self.store.set_sending(false);
        match response {
            ApiResponse::Data(checkout) => {
                self.store.append_message(Message::ai_text(format!(
                    "Parfait ! Je vous redirige vers le paiement du pack {}.",
                    pack.name
                )));
                Some(checkout.redirect_url)
            }
            ApiResponse::Error(_) => {
                self.fail_gracefully();
                None
            }
        }
    }

    /// Adds the files as pending attachments and uploads them concurrently.
    /// A failed upload only marks its own attachment.
    pub async fn attach_files(&self, files: Vec<FileUpload>) -> Vec<AttachmentId> {
        if !self.config.attachments_enabled || self.is_torn_down() {
            return Vec::new();
        }
        let pending: Vec<(AttachmentId, FileUpload)> = files
            .into_iter()
            .map(|file| {
                let attachment = Attachment::pending(&file);
                let id = attachment.id.clone();
                self.store.add_attachment(attachment);
                (id, file)
            })
            .collect();
        let ids = pending.iter().map(|(id, _)| id.clone()).collect();

        let Some(session_id) = self.active_session() else {
            for (id, _) in &pending {
                self.store.update_attachment(id, |a| {
                    a.uploading = false;
                    a.error = Some(NO_SESSION.to_string());
                });
            }
            return ids;
        };

        join_all(
            pending
                .iter()
                .map(|(id, file)| self.upload_one(&session_id, id, file)),
        )
        .await;
        ids
    }

    async fn upload_one(&self, session_id: &str, id: &AttachmentId, file: &FileUpload) {
        let store = Arc::clone(&self.store);
        let progress_id = id.clone();
        let progress = move |percent: u8| {
            store.update_attachment(&progress_id, |a| a.progress = percent);
        };
        let Some(response) = self
            .guarded(
                "upload_attachment",
                self.api.upload_attachment(session_id, file, &progress),
            )
            .await
        else {
            return;
        };
        self.store.update_attachment(id, |a| {
            a.uploading = false;
            match response {
                ApiResponse::Data(uploaded) => {
                    a.url = Some(uploaded.url);
                    a.progress = 100;
                    a.error = None;
                }
                ApiResponse::Error(err) => a.error = Some(err),
            }
        });
    }

    pub fn remove_attachment(&self, id: &AttachmentId) -> Option<Attachment> {
        self.store.remove_attachment(id)
    }

    pub fn open(&self) {
        self.store.open();
        self.notify_window(WindowState::Open);
    }

    pub fn close(&self) {
        self.store.close();
        self.notify_window(WindowState::Closed);
    }

    pub fn minimize(&self) {
        self.store.minimize();
        self.notify_window(WindowState::Minimized);
    }

    pub fn toggle(&self) -> WindowState {
        let window = self.store.toggle();
        self.notify_window(window);
        window
    }

    fn notify_window(&self, window: WindowState) {
        let Some(bridge) = &self.bridge else {
            return;
        };
        match window {
            WindowState::Open => bridge.opened(),
            WindowState::Closed => bridge.closed(),
            WindowState::Minimized => {}
        }
    }

    /// Abandons in-flight calls of the current session and clears the store.
    /// The widget has no session afterwards; see [`ChatWidget::restart`].
    pub fn reset(&self) {
        let previous = std::mem::replace(
            &mut *self
                .session_cancel
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
            self.cancel.child_token(),
        );
        previous.cancel();
        self.store.reset();
        info!(target: "chat.widget", studio_id = %self.config.studio_id, "conversation reset");
    }

    /// Resets and starts a fresh session on the same push channel.
    pub async fn restart(&self) -> Option<String> {
        if self.is_torn_down() {
            return None;
        }
        self.reset();
        self.start_session().await
    }

    /// Cancels in-flight calls, drops push subscriptions and disconnects.
    /// Safe to call more than once.
    pub fn teardown(&self) {
        if self.cancel.is_cancelled() {
            return;
        }
        self.cancel.cancel();
        let subscriptions = std::mem::take(
            &mut *self
                .subscriptions
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        for subscription in subscriptions {
            subscription.unsubscribe();
        }
        self.channel.disconnect();
        self.store.set_connection(ConnectionStatus::Disconnected);
        info!(target: "chat.widget", studio_id = %self.config.studio_id, "widget torn down");
    }
}

impl Drop for ChatWidget {
    fn drop(&mut self) {
        self.teardown();
    }
}

fn apply_push_event(store: &ConversationStore, event: &PushEvent) {
    match event {
        PushEvent::Message(message) => {
            store.append_message(message.clone());
        }
        PushEvent::Typing(typing) => store.set_typing(typing.clone()),
        PushEvent::Connection(status) => store.set_connection(*status),
        PushEvent::Status(status) => store.set_session_status(*status),
    }
}

fn format_hm(t: time::Time) -> String {
    format!("{:02}:{:02}", t.hour(), t.minute())
}

#[cfg(test)]
mod tests {
    use time::macros::date;

    use super::*;
    use crate::config::PartialWidgetConfig;
    use crate::message::{MessageContent, Sender};
    use crate::sound::NoopSound;
    use crate::transport::ChatApi;

    fn config() -> WidgetConfig {
        PartialWidgetConfig {
            studio_id: Some("studio-1".into()),
            studio_name: Some("Studio X".into()),
            ai_name: Some("Lea".into()),
            ..Default::default()
        }
        .resolve()
        .unwrap()
    }

    fn widget_with(api: impl FnOnce(Arc<SimulatedChannel>) -> MockChatApi) -> ChatWidget {
        let latency: SharedLatency = Arc::new(NoLatency);
        let channel = Arc::new(SimulatedChannel::new(latency));
        let api = api(Arc::clone(&channel));
        let store = Arc::new(ConversationStore::new(true, Arc::new(NoopSound)));
        ChatWidget::new(
            config(),
            store,
            Backend {
                api: Arc::new(api),
                channel,
            },
        )
    }

    fn mock(channel: Arc<SimulatedChannel>) -> MockChatApi {
        let resolver = IntentResolver::new(StudioCatalog::demo(date!(2024 - 05 - 01)));
        MockChatApi::new(resolver, channel, Arc::new(NoLatency))
            .unwrap()
            .with_persona("Lea")
    }

    #[tokio::test(start_paused = true)]
    async fn mount_hydrates_without_unread() {
        let widget = widget_with(mock);
        let session_id = widget.mount().await.unwrap();
        let snapshot = widget.store().snapshot();
        assert_eq!(snapshot.session_id(), Some(session_id.as_str()));
        assert_eq!(snapshot.messages.len(), 2);
        assert_eq!(snapshot.unread_count, 0);
        assert_eq!(snapshot.connection, ConnectionStatus::Connected);
        assert!(!snapshot.is_loading);
    }

    #[tokio::test(start_paused = true)]
    async fn init_failure_sets_store_error() {
        let widget = widget_with(|channel| mock(channel).fail_init());
        assert!(widget.mount().await.is_none());
        assert_eq!(widget.store().error().as_deref(), Some(INIT_FAILED));
        assert!(widget.store().session_id().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn send_appends_user_message_and_reply() {
        let widget = widget_with(mock);
        widget.mount().await.unwrap();
        widget.store().set_input("Quels sont vos tarifs ?");

        assert!(widget.send_input().await);
        let messages = widget.store().messages();
        assert_eq!(messages.len(), 5);
        assert_eq!(messages[2].sender, Sender::User);
        assert!(matches!(messages[4].content, MessageContent::PackOffer { .. }));
        assert!(widget.store().input().is_empty());
        assert!(!widget.store().typing().is_typing);
        let seqs: Vec<u64> = messages.iter().map(|m| m.seq).collect();
        assert!(seqs.windows(2).all(|w| w[0] < w[1]));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_send_appends_apology() {
        let widget = widget_with(|channel| mock(channel).fail_replies());
        widget.mount().await.unwrap();

        assert!(!widget.send("Bonjour").await);
        let last = widget.store().messages().pop().unwrap();
        assert_eq!(last.sender, Sender::Ai);
        assert_eq!(last.content.body(), Some(APOLOGY));
        assert!(!widget.store().typing().is_typing);
        assert!(!widget.store().snapshot().is_sending);
    }

    #[tokio::test(start_paused = true)]
    async fn send_without_session_is_ignored() {
        let widget = widget_with(mock);
        assert!(!widget.send("Bonjour").await);
        assert!(widget.store().messages().is_empty());
    }

    struct StalledApi;

    #[async_trait::async_trait]
    impl ChatApi for StalledApi {
        async fn init_conversation(
            &self,
            _studio_id: &str,
            _studio_name: &str,
        ) -> ApiResponse<crate::transport::InitConversation> {
            ApiResponse::Data(crate::transport::InitConversation {
                session_id: "session_stalled".into(),
                messages: Vec::new(),
            })
        }

        async fn send_message(&self, _: &str, _: &str, _: &str) -> ApiResponse<Vec<Message>> {
            std::future::pending().await
        }

        async fn handle_quick_action(
            &self,
            _: &str,
            _: ActionKey,
            _: &str,
        ) -> ApiResponse<Vec<Message>> {
            std::future::pending().await
        }

        async fn book_slot(&self, _: &str, _: &BookingSlot) -> ApiResponse<BookingConfirmation> {
            std::future::pending().await
        }

        async fn select_pack(
            &self,
            _: &str,
            _: &Pack,
        ) -> ApiResponse<crate::transport::PackCheckout> {
            std::future::pending().await
        }

        async fn upload_attachment(
            &self,
            _: &str,
            _: &FileUpload,
            _: crate::transport::ProgressFn<'_>,
        ) -> ApiResponse<crate::transport::UploadedFile> {
            std::future::pending().await
        }
    }

    fn stalled_widget() -> ChatWidget {
        let store = Arc::new(ConversationStore::new(true, Arc::new(NoopSound)));
        ChatWidget::new(
            config(),
            store,
            Backend {
                api: Arc::new(StalledApi),
                channel: Arc::new(SimulatedChannel::new(Arc::new(NoLatency))),
            },
        )
        .with_request_timeout(Duration::from_secs(2))
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_call_times_out_into_apology() {
        let widget = stalled_widget();
        widget.mount().await.unwrap();

        assert!(!widget.send("Bonjour").await);
        let last = widget.store().messages().pop().unwrap();
        assert_eq!(last.content.body(), Some(APOLOGY));
    }

    #[tokio::test(start_paused = true)]
    async fn teardown_cancels_in_flight_call() {
        let widget = Arc::new(stalled_widget().with_request_timeout(Duration::from_secs(60)));
        widget.mount().await.unwrap();

        let sending = tokio::spawn({
            let widget = Arc::clone(&widget);
            async move { widget.send("Bonjour").await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        let before = widget.store().messages().len();
        widget.teardown();

        assert!(!sending.await.unwrap());
        assert_eq!(widget.store().messages().len(), before);
        assert_eq!(widget.store().connection(), ConnectionStatus::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn reset_drops_replies_of_previous_session() {
        let latency: SharedLatency = Arc::new(SimulatedLatency::with_thinking_range(1_000..=1_000));
        let channel = Arc::new(SimulatedChannel::new(Arc::clone(&latency)));
        let store = Arc::new(ConversationStore::new(true, Arc::new(NoopSound)));
        let resolver = IntentResolver::new(StudioCatalog::demo(date!(2024 - 05 - 01)));
        let api = MockChatApi::new(resolver, Arc::clone(&channel), latency).unwrap();
        let widget = Arc::new(ChatWidget::new(
            config(),
            Arc::clone(&store),
            Backend {
                api: Arc::new(api),
                channel,
            },
        ));
        widget.mount().await.unwrap();

        let sending = tokio::spawn({
            let widget = Arc::clone(&widget);
            async move { widget.send("tarifs").await }
        });
        tokio::time::sleep(Duration::from_millis(100)).await;
        widget.reset();

        assert!(!sending.await.unwrap());
        tokio::time::sleep(Duration::from_secs(5)).await;
        let snapshot = store.snapshot();
        assert!(snapshot.messages.is_empty());
        assert_eq!(snapshot.unread_count, 0);
        assert!(snapshot.session_id().is_none());
        assert!(!snapshot.typing.is_typing);
        assert!(!snapshot.is_sending);
        assert!(!widget.is_torn_down());
    }

    #[tokio::test(start_paused = true)]
    async fn restart_starts_a_fresh_session() {
        let widget = widget_with(mock);
        let first = widget.mount().await.unwrap();
        assert!(widget.send("Bonjour").await);

        let second = widget.restart().await.unwrap();
        assert_ne!(first, second);
        let messages = widget.store().messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].seq, 1);
        assert_eq!(widget.store().session_id(), Some(second));
        assert!(widget.send("Quels sont vos tarifs ?").await);
    }

    #[tokio::test(start_paused = true)]
    async fn restart_after_teardown_does_nothing() {
        let widget = widget_with(mock);
        widget.mount().await.unwrap();
        widget.teardown();
        assert!(widget.restart().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn booking_confirms_with_reference() {
        let widget = widget_with(mock);
        widget.mount().await.unwrap();
        let catalog = StudioCatalog::demo(date!(2024 - 05 - 01));
        let slot = catalog.slot("slot-1").unwrap().clone();

        let confirmation = widget.book_slot(&slot).await.unwrap();
        assert!(confirmation.booking_id.starts_with("BK-"));
        let last = widget.store().messages().pop().unwrap();
        assert!(last.content.body().unwrap().contains(&confirmation.booking_id));
    }

    #[tokio::test(start_paused = true)]
    async fn unavailable_slot_falls_back_to_apology() {
        let widget = widget_with(mock);
        widget.mount().await.unwrap();
        let catalog = StudioCatalog::demo(date!(2024 - 05 - 01));
        let slot = catalog.slot("slot-4").unwrap().clone();

        assert!(widget.book_slot(&slot).await.is_none());
        assert_eq!(
            widget.store().messages().pop().unwrap().content.body(),
            Some(APOLOGY)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn pack_selection_returns_redirect() {
        let widget = widget_with(mock);
        widget.mount().await.unwrap();
        let catalog = StudioCatalog::demo(date!(2024 - 05 - 01));
        let pack = catalog.pack("pack-10h").unwrap().clone();

        let url = widget.select_pack(&pack).await.unwrap();
        assert!(url.starts_with("https://checkout.rooom.app/packs/pack-10h?session="));
    }

    #[tokio::test(start_paused = true)]
    async fn push_messages_reach_the_store() {
        let latency: SharedLatency = Arc::new(NoLatency);
        let channel = Arc::new(SimulatedChannel::new(latency));
        let store = Arc::new(ConversationStore::new(false, Arc::new(NoopSound)));
        let widget = ChatWidget::new(
            config(),
            Arc::clone(&store),
            Backend {
                api: Arc::new(mock(Arc::clone(&channel))),
                channel: channel.clone(),
            },
        );
        widget.mount().await.unwrap();

        channel.emit(PushEvent::Message(Message::ai_text("Un conseiller arrive")));
        assert_eq!(store.unread_count(), 1);

        widget.teardown();
        channel.emit(PushEvent::Message(Message::ai_text("ignored")));
        assert_eq!(store.messages().len(), 3);
    }
}
