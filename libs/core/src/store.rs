use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

use metrics::counter;
use tokio::sync::broadcast;
use tracing::debug;

use crate::message::{Message, MessageContent, MessageId, Sender};
use crate::sound::SharedNotificationSound;
use crate::state::{
    Attachment, AttachmentId, ConnectionStatus, ConversationSession, SessionStatus, TypingState,
    WindowState,
};

pub const STORE_EVENT_CAPACITY: usize = 256;

#[derive(Clone, Debug, PartialEq)]
pub enum StoreEvent {
    WindowChanged(WindowState),
    MessageAppended(Message),
    MessagesHydrated { count: usize },
    TypingChanged(TypingState),
    SessionChanged(Option<ConversationSession>),
    ConnectionChanged(ConnectionStatus),
    InputChanged,
    AttachmentsChanged,
    BusyChanged { loading: bool, sending: bool },
    ErrorChanged(Option<String>),
    SoundToggled(bool),
    Reset,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AppendOutcome {
    Appended { seq: u64 },
    /// A message with the same id is already in the log.
    Duplicate,
}

/// Point-in-time copy of the store, handed to renderers and tests.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConversationSnapshot {
    pub window: WindowState,
    pub messages: Vec<Message>,
    pub session: Option<ConversationSession>,
    pub typing: TypingState,
    pub connection: ConnectionStatus,
    pub input: String,
    pub attachments: Vec<Attachment>,
    pub unread_count: usize,
    pub is_loading: bool,
    pub is_sending: bool,
    pub error: Option<String>,
    pub sound_enabled: bool,
}

impl ConversationSnapshot {
    pub fn session_id(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.session_id.as_str())
    }
}

struct Inner {
    view: ConversationSnapshot,
    next_seq: u64,
    ids: HashSet<MessageId>,
}

impl Inner {
    fn new(sound_enabled: bool) -> Self {
        Self {
            view: ConversationSnapshot {
                sound_enabled,
                ..ConversationSnapshot::default()
            },
            next_seq: 1,
            ids: HashSet::new(),
        }
    }

    fn stamp(&mut self, message: &mut Message) -> Option<u64> {
        if !self.ids.insert(message.id.clone()) {
            return None;
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        message.seq = seq;
        Some(seq)
    }
}

/// Single writer of one widget's state. Events are broadcast under the lock,
/// in mutation order.
pub struct ConversationStore {
    inner: Mutex<Inner>,
    events: broadcast::Sender<StoreEvent>,
    sound: SharedNotificationSound,
}

impl ConversationStore {
    pub fn new(sound_enabled: bool, sound: SharedNotificationSound) -> Self {
        let (events, _) = broadcast::channel(STORE_EVENT_CAPACITY);
        Self {
            inner: Mutex::new(Inner::new(sound_enabled)),
            events,
            sound,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: StoreEvent) {
        // No receivers is fine; the store is usable headless.
        let _ = self.events.send(event);
    }

    pub fn snapshot(&self) -> ConversationSnapshot {
        self.lock().view.clone()
    }

    pub fn window(&self) -> WindowState {
        self.lock().view.window
    }

    /// Opens the window and marks the whole log as read.
    pub fn open(&self) {
        let mut inner = self.lock();
        for message in inner.view.messages.iter_mut() {
            message.read = true;
        }
        inner.view.unread_count = 0;
        inner.view.window = WindowState::Open;
        self.emit(StoreEvent::WindowChanged(WindowState::Open));
    }

    pub fn close(&self) {
        self.set_window(WindowState::Closed);
    }

    pub fn minimize(&self) {
        self.set_window(WindowState::Minimized);
    }

    pub fn toggle(&self) -> WindowState {
        match self.window() {
            WindowState::Closed | WindowState::Minimized => {
                self.open();
                WindowState::Open
            }
            WindowState::Open => {
                self.close();
                WindowState::Closed
            }
        }
    }

    fn set_window(&self, window: WindowState) {
        let mut inner = self.lock();
        inner.view.window = window;
        self.emit(StoreEvent::WindowChanged(window));
    }

    /// Appends one live message, updating unread accounting and playing the
    /// notification tone for assistant replies the visitor cannot see.
    pub fn append_message(&self, mut message: Message) -> AppendOutcome {
        let (seq, play_sound) = {
            let mut inner = self.lock();
            let Some(seq) = inner.stamp(&mut message) else {
                debug!(
                    target: "chat.store",
                    message_id = message.id.as_str(),
                    "ignoring duplicate message"
                );
                return AppendOutcome::Duplicate;
            };
            let is_open = inner.view.window == WindowState::Open;
            message.read = is_open || message.sender == Sender::User;
            if !message.read {
                inner.view.unread_count += 1;
            }
            if matches!(message.content, MessageContent::Escalation { .. }) {
                if let Some(session) = inner.view.session.as_mut() {
                    if session.status == SessionStatus::Active {
                        session.status = SessionStatus::WaitingForHuman;
                    }
                }
            }
            let play_sound = inner.view.sound_enabled && !is_open && message.sender == Sender::Ai;
            counter!("rooom_chat_messages_appended_total", "sender" => message.sender.as_str())
                .increment(1);
            inner.view.messages.push(message.clone());
            self.emit(StoreEvent::MessageAppended(message));
            (seq, play_sound)
        };

        if play_sound {
            if let Err(err) = self.sound.play() {
                debug!(target: "chat.store", error = %err, "notification sound failed");
            }
        }
        AppendOutcome::Appended { seq }
    }

    /// Bulk append used for history hydration. Hydrated messages count as
    /// already seen and never touch the unread counter.
    pub fn append_messages(&self, messages: impl IntoIterator<Item = Message>) -> usize {
        let mut inner = self.lock();
        let mut count = 0;
        for mut message in messages {
            if inner.stamp(&mut message).is_none() {
                continue;
            }
            message.read = true;
            inner.view.messages.push(message);
            count += 1;
        }
        self.emit(StoreEvent::MessagesHydrated { count });
        count
    }

    pub fn messages(&self) -> Vec<Message> {
        self.lock().view.messages.clone()
    }

    pub fn message(&self, id: &MessageId) -> Option<Message> {
        self.lock()
            .view
            .messages
            .iter()
            .find(|m| &m.id == id)
            .cloned()
    }

    pub fn unread_count(&self) -> usize {
        self.lock().view.unread_count
    }

    pub fn set_typing(&self, typing: TypingState) {
        let mut inner = self.lock();
        inner.view.typing = typing.clone();
        self.emit(StoreEvent::TypingChanged(typing));
    }

    pub fn typing(&self) -> TypingState {
        self.lock().view.typing.clone()
    }

    pub fn set_session(&self, session: Option<ConversationSession>) {
        let mut inner = self.lock();
        inner.view.session = session.clone();
        self.emit(StoreEvent::SessionChanged(session));
    }

    pub fn set_session_status(&self, status: SessionStatus) {
        let mut inner = self.lock();
        let Some(session) = inner.view.session.as_mut() else {
            return;
        };
        session.status = status;
        let session = session.clone();
        self.emit(StoreEvent::SessionChanged(Some(session)));
    }

    pub fn session(&self) -> Option<ConversationSession> {
        self.lock().view.session.clone()
    }

    pub fn session_id(&self) -> Option<String> {
        self.lock()
            .view
            .session
            .as_ref()
            .map(|s| s.session_id.clone())
    }

    pub fn set_connection(&self, status: ConnectionStatus) {
        let mut inner = self.lock();
        inner.view.connection = status;
        self.emit(StoreEvent::ConnectionChanged(status));
    }

    pub fn connection(&self) -> ConnectionStatus {
        self.lock().view.connection
    }

    pub fn set_input(&self, text: impl Into<String>) {
        let mut inner = self.lock();
        inner.view.input = text.into();
        self.emit(StoreEvent::InputChanged);
    }

    pub fn input(&self) -> String {
        self.lock().view.input.clone()
    }

    pub fn add_attachment(&self, attachment: Attachment) {
        let mut inner = self.lock();
        inner.view.attachments.push(attachment);
        self.emit(StoreEvent::AttachmentsChanged);
    }

    /// Applies `update` to the attachment in place. Returns false when the
    /// attachment was removed in the meantime.
    pub fn update_attachment(&self, id: &AttachmentId, update: impl FnOnce(&mut Attachment)) -> bool {
        let mut inner = self.lock();
        let Some(attachment) = inner.view.attachments.iter_mut().find(|a| &a.id == id) else {
            return false;
        };
        update(attachment);
        self.emit(StoreEvent::AttachmentsChanged);
        true
    }

    pub fn remove_attachment(&self, id: &AttachmentId) -> Option<Attachment> {
        let mut inner = self.lock();
        let index = inner.view.attachments.iter().position(|a| &a.id == id)?;
        let removed = inner.view.attachments.remove(index);
        self.emit(StoreEvent::AttachmentsChanged);
        Some(removed)
    }

    pub fn attachment(&self, id: &AttachmentId) -> Option<Attachment> {
        self.lock()
            .view
            .attachments
            .iter()
            .find(|a| &a.id == id)
            .cloned()
    }

    pub fn attachments(&self) -> Vec<Attachment> {
        self.lock().view.attachments.clone()
    }

    /// Empties the input text and the attachment list in one step.
    pub fn clear_input(&self) {
        let mut inner = self.lock();
        inner.view.input.clear();
        inner.view.attachments.clear();
        self.emit(StoreEvent::InputChanged);
        self.emit(StoreEvent::AttachmentsChanged);
    }

    pub fn set_loading(&self, loading: bool) {
        let mut inner = self.lock();
        inner.view.is_loading = loading;
        let sending = inner.view.is_sending;
        self.emit(StoreEvent::BusyChanged { loading, sending });
    }

    pub fn set_sending(&self, sending: bool) {
        let mut inner = self.lock();
        inner.view.is_sending = sending;
        let loading = inner.view.is_loading;
        self.emit(StoreEvent::BusyChanged { loading, sending });
    }

    pub fn set_error(&self, error: Option<String>) {
        let mut inner = self.lock();
        inner.view.error = error.clone();
        self.emit(StoreEvent::ErrorChanged(error));
    }

    pub fn error(&self) -> Option<String> {
        self.lock().view.error.clone()
    }

    pub fn set_sound_enabled(&self, enabled: bool) {
        let mut inner = self.lock();
        inner.view.sound_enabled = enabled;
        self.emit(StoreEvent::SoundToggled(enabled));
    }

    pub fn sound_enabled(&self) -> bool {
        self.lock().view.sound_enabled
    }

    /// Returns every conversation-scoped field to its initial value. The
    /// sound preference survives.
    pub fn reset(&self) {
        let mut inner = self.lock();
        let sound_enabled = inner.view.sound_enabled;
        *inner = Inner::new(sound_enabled);
        self.emit(StoreEvent::Reset);
    }
}
