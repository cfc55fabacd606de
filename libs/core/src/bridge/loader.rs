use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use metrics::counter;
use serde_json::Value;
use tracing::{debug, info, warn};
use url::Url;

use crate::bridge::{BridgeError, TargetOrigin};
use crate::config::Theme;

pub const DEFAULT_FRAME_HEIGHT: u32 = 600;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoaderConfig {
    pub widget_base: Url,
    pub studio_id: String,
    pub theme: Option<Theme>,
    pub accent_color: Option<String>,
    pub locale: Option<String>,
    pub services: Vec<String>,
    pub initial_height: u32,
}

impl LoaderConfig {
    pub fn new(widget_base: Url, studio_id: impl Into<String>) -> Self {
        Self {
            widget_base,
            studio_id: studio_id.into(),
            theme: None,
            accent_color: None,
            locale: None,
            services: Vec::new(),
            initial_height: DEFAULT_FRAME_HEIGHT,
        }
    }

    pub fn widget_url(&self) -> Url {
        let mut url = self.widget_base.clone();
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("studioId", &self.studio_id);
            if let Some(theme) = self.theme {
                query.append_pair("theme", theme.as_str());
            }
            if let Some(color) = &self.accent_color {
                query.append_pair("accentColor", color);
            }
            if let Some(locale) = &self.locale {
                query.append_pair("locale", locale);
            }
            if !self.services.is_empty() {
                query.append_pair("services", &self.services.join(","));
            }
        }
        url
    }

    pub fn widget_origin(&self) -> Result<TargetOrigin, BridgeError> {
        TargetOrigin::from_url(&self.widget_base)
    }
}

/// A `message` event as seen by the hosting page.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameMessageEvent {
    pub origin: String,
    pub data: Value,
}

impl FrameMessageEvent {
    pub fn new(origin: impl Into<String>, data: Value) -> Self {
        Self {
            origin: origin.into(),
            data,
        }
    }
}

pub const READY: &str = "ROOOM_READY";
pub const BOOKING_COMPLETE: &str = "ROOOM_BOOKING_COMPLETE";
pub const RESIZE: &str = "ROOOM_RESIZE";
pub const ERROR: &str = "ROOOM_ERROR";

#[derive(Clone, Debug, PartialEq)]
pub enum LoaderMessage {
    Ready,
    BookingComplete(Value),
    Resize { height: u32 },
    Error { message: String },
}

impl LoaderMessage {
    /// Dispatches on `data.type`; fields beyond what each type needs are
    /// ignored. `None` for unknown types or a resize without a usable height.
    pub fn from_data(data: &Value) -> Option<Self> {
        let payload = data.get("payload").unwrap_or(&Value::Null);
        match data.get("type")?.as_str()? {
            READY => Some(Self::Ready),
            BOOKING_COMPLETE => Some(Self::BookingComplete(payload.clone())),
            RESIZE => {
                let height = payload.get("height")?.as_f64()?;
                if !height.is_finite() || height < 0.0 {
                    return None;
                }
                Some(Self::Resize {
                    height: height.round().min(f64::from(u32::MAX)) as u32,
                })
            }
            ERROR => Some(Self::Error {
                message: payload
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            }),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameHandle(pub u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(pub u64);

pub type MessageListener = Arc<dyn Fn(&FrameMessageEvent) + Send + Sync>;

/// The page hosting the booking frame.
pub trait EmbedHost: Send + Sync {
    fn create_frame(&self, src: &Url, height: u32) -> Result<FrameHandle, BridgeError>;
    fn set_frame_height(&self, frame: FrameHandle, height: u32);
    fn remove_frame(&self, frame: FrameHandle);
    fn add_message_listener(&self, listener: MessageListener) -> ListenerId;
    fn remove_message_listener(&self, id: ListenerId);
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameInfo {
    pub src: Url,
    pub height: u32,
}

#[derive(Default)]
pub struct InMemoryEmbedHost {
    next_id: AtomicU64,
    frames: Mutex<BTreeMap<FrameHandle, FrameInfo>>,
    listeners: Mutex<BTreeMap<ListenerId, MessageListener>>,
}

impl InMemoryEmbedHost {
    pub fn new() -> Self {
        Self::default()
    }

    fn next(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Delivers an event to every registered listener.
    pub fn dispatch(&self, event: &FrameMessageEvent) {
        let listeners: Vec<MessageListener> = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        for listener in listeners {
            listener(event);
        }
    }

    pub fn frame(&self, frame: FrameHandle) -> Option<FrameInfo> {
        self.frames
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&frame)
            .cloned()
    }

    pub fn frame_count(&self) -> usize {
        self.frames.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl EmbedHost for InMemoryEmbedHost {
    fn create_frame(&self, src: &Url, height: u32) -> Result<FrameHandle, BridgeError> {
        let handle = FrameHandle(self.next());
        self.frames.lock().unwrap_or_else(PoisonError::into_inner).insert(
            handle,
            FrameInfo {
                src: src.clone(),
                height,
            },
        );
        Ok(handle)
    }

    fn set_frame_height(&self, frame: FrameHandle, height: u32) {
        if let Some(info) = self
            .frames
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(&frame)
        {
            info.height = height;
        }
    }

    fn remove_frame(&self, frame: FrameHandle) {
        self.frames
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&frame);
    }

    fn add_message_listener(&self, listener: MessageListener) -> ListenerId {
        let id = ListenerId(self.next());
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, listener);
        id
    }

    fn remove_message_listener(&self, id: ListenerId) {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
    }
}

type ReadyFn = Arc<dyn Fn() + Send + Sync>;
type BookingCompleteFn = Arc<dyn Fn(&Value) + Send + Sync>;
type ErrorFn = Arc<dyn Fn(&str) + Send + Sync>;

#[derive(Clone, Default)]
pub struct LoaderCallbacks {
    on_ready: Option<ReadyFn>,
    on_booking_complete: Option<BookingCompleteFn>,
    on_error: Option<ErrorFn>,
}

impl LoaderCallbacks {
    pub fn on_ready(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_ready = Some(Arc::new(f));
        self
    }

    pub fn on_booking_complete(mut self, f: impl Fn(&Value) + Send + Sync + 'static) -> Self {
        self.on_booking_complete = Some(Arc::new(f));
        self
    }

    pub fn on_error(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(f));
        self
    }
}

struct Mounted {
    frame: FrameHandle,
    listener: ListenerId,
}

/// Embeds the booking app in a frame and relays its events to host callbacks.
pub struct BookingWidgetLoader {
    host: Arc<dyn EmbedHost>,
    origin: TargetOrigin,
    mounted: Mutex<Option<Mounted>>,
}

impl BookingWidgetLoader {
    pub fn mount(
        host: Arc<dyn EmbedHost>,
        config: &LoaderConfig,
        callbacks: LoaderCallbacks,
    ) -> Result<Self, BridgeError> {
        let origin = config.widget_origin()?;
        let src = config.widget_url();
        let frame = host.create_frame(&src, config.initial_height)?;

        let weak_host: Weak<dyn EmbedHost> = Arc::downgrade(&host);
        let trusted = origin.clone();
        let listener = host.add_message_listener(Arc::new(move |event: &FrameMessageEvent| {
            handle_event(&trusted, &weak_host, frame, &callbacks, event);
        }));

        info!(target: "chat.bridge", %origin, studio_id = %config.studio_id, "booking widget mounted");
        Ok(Self {
            host,
            origin,
            mounted: Mutex::new(Some(Mounted { frame, listener })),
        })
    }

    pub fn origin(&self) -> &TargetOrigin {
        &self.origin
    }

    pub fn frame(&self) -> Option<FrameHandle> {
        self.mounted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|m| m.frame)
    }

    pub fn is_mounted(&self) -> bool {
        self.frame().is_some()
    }

    /// Removes the listener and the frame. Safe to call more than once.
    pub fn destroy(&self) {
        let mounted = self
            .mounted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(Mounted { frame, listener }) = mounted {
            self.host.remove_message_listener(listener);
            self.host.remove_frame(frame);
            debug!(target: "chat.bridge", origin = %self.origin, "booking widget destroyed");
        }
    }
}

impl Drop for BookingWidgetLoader {
    fn drop(&mut self) {
        self.destroy();
    }
}

fn handle_event(
    trusted: &TargetOrigin,
    host: &Weak<dyn EmbedHost>,
    frame: FrameHandle,
    callbacks: &LoaderCallbacks,
    event: &FrameMessageEvent,
) {
    if !trusted.matches(&event.origin) {
        counter!("rooom_chat_bridge_rejected_total", "reason" => "origin").increment(1);
        debug!(target: "chat.bridge", origin = %event.origin, "ignored message from untrusted origin");
        return;
    }
    let message = match LoaderMessage::from_data(&event.data) {
        Some(message) => message,
        None => {
            counter!("rooom_chat_bridge_rejected_total", "reason" => "shape").increment(1);
            debug!(target: "chat.bridge", "ignored unrecognised frame message");
            return;
        }
    };
    match message {
        LoaderMessage::Ready => {
            if let Some(f) = &callbacks.on_ready {
                f();
            }
        }
        LoaderMessage::BookingComplete(payload) => {
            if let Some(f) = &callbacks.on_booking_complete {
                f(&payload);
            }
        }
        LoaderMessage::Resize { height } => {
            if let Some(host) = host.upgrade() {
                host.set_frame_height(frame, height);
            }
        }
        LoaderMessage::Error { message } => {
            warn!(target: "chat.bridge", %message, "booking widget reported an error");
            if let Some(f) = &callbacks.on_error {
                f(&message);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use serde_json::json;

    use super::*;

    fn config() -> LoaderConfig {
        let mut config = LoaderConfig::new(
            Url::parse("https://book.rooom.app/embed").unwrap(),
            "studio-1",
        );
        config.theme = Some(Theme::Dark);
        config.accent_color = Some("#ff6600".into());
        config.locale = Some("fr".into());
        config.services = vec!["svc-1".into(), "svc-2".into()];
        config
    }

    #[test]
    fn widget_url_carries_config() {
        let url = config().widget_url();
        let pairs: BTreeMap<String, String> = url.query_pairs().into_owned().collect();
        assert_eq!(pairs["studioId"], "studio-1");
        assert_eq!(pairs["theme"], "dark");
        assert_eq!(pairs["accentColor"], "#ff6600");
        assert_eq!(pairs["locale"], "fr");
        assert_eq!(pairs["services"], "svc-1,svc-2");
        assert_eq!(url.path(), "/embed");
    }

    #[test]
    fn optional_fields_are_omitted() {
        let config = LoaderConfig::new(Url::parse("https://book.rooom.app/").unwrap(), "s");
        assert_eq!(config.widget_url().query(), Some("studioId=s"));
    }

    #[test]
    fn relays_trusted_events() {
        let host = Arc::new(InMemoryEmbedHost::new());
        let ready = Arc::new(AtomicUsize::new(0));
        let booked = Arc::new(Mutex::new(None));
        let errors = Arc::new(Mutex::new(Vec::new()));
        let callbacks = LoaderCallbacks::default()
            .on_ready({
                let ready = ready.clone();
                move || {
                    ready.fetch_add(1, Ordering::SeqCst);
                }
            })
            .on_booking_complete({
                let booked = booked.clone();
                move |payload| *booked.lock().unwrap() = Some(payload.clone())
            })
            .on_error({
                let errors = errors.clone();
                move |message| errors.lock().unwrap().push(message.to_string())
            });
        let loader = BookingWidgetLoader::mount(host.clone(), &config(), callbacks).unwrap();
        let frame = loader.frame().unwrap();
        let origin = "https://book.rooom.app";

        host.dispatch(&FrameMessageEvent::new(origin, json!({"type": "ROOOM_READY"})));
        host.dispatch(&FrameMessageEvent::new(
            origin,
            json!({"type": "ROOOM_BOOKING_COMPLETE", "payload": {"bookingId": "BK-1"}}),
        ));
        host.dispatch(&FrameMessageEvent::new(
            origin,
            json!({"type": "ROOOM_RESIZE", "payload": {"height": 842}}),
        ));
        host.dispatch(&FrameMessageEvent::new(
            origin,
            json!({"type": "ROOOM_ERROR", "payload": {"message": "slot taken"}}),
        ));

        assert_eq!(ready.load(Ordering::SeqCst), 1);
        assert_eq!(*booked.lock().unwrap(), Some(json!({"bookingId": "BK-1"})));
        assert_eq!(host.frame(frame).unwrap().height, 842);
        assert_eq!(*errors.lock().unwrap(), vec!["slot taken".to_string()]);
    }

    #[test]
    fn dispatch_follows_type_tag() {
        assert_eq!(
            LoaderMessage::from_data(&json!({"type": "ROOOM_READY", "payload": {"studioId": "s"}})),
            Some(LoaderMessage::Ready)
        );
        assert_eq!(
            LoaderMessage::from_data(&json!({"type": "ROOOM_BOOKING_COMPLETE"})),
            Some(LoaderMessage::BookingComplete(Value::Null))
        );
        assert_eq!(
            LoaderMessage::from_data(&json!({"type": "ROOOM_RESIZE", "payload": {"height": 842.5}})),
            Some(LoaderMessage::Resize { height: 843 })
        );
        assert_eq!(
            LoaderMessage::from_data(&json!({"type": "ROOOM_ERROR"})),
            Some(LoaderMessage::Error {
                message: String::new()
            })
        );
        assert_eq!(
            LoaderMessage::from_data(&json!({"type": "ROOOM_RESIZE", "payload": {"height": "tall"}})),
            None
        );
        assert_eq!(
            LoaderMessage::from_data(&json!({"type": "ROOOM_RESIZE", "payload": {"height": -5}})),
            None
        );
        assert_eq!(LoaderMessage::from_data(&json!({"type": "OTHER"})), None);
        assert_eq!(LoaderMessage::from_data(&json!("ROOOM_READY")), None);
    }

    #[test]
    fn loose_shapes_reach_callbacks() {
        let host = Arc::new(InMemoryEmbedHost::new());
        let ready = Arc::new(AtomicUsize::new(0));
        let booked = Arc::new(Mutex::new(Vec::new()));
        let callbacks = LoaderCallbacks::default()
            .on_ready({
                let ready = ready.clone();
                move || {
                    ready.fetch_add(1, Ordering::SeqCst);
                }
            })
            .on_booking_complete({
                let booked = booked.clone();
                move |payload| booked.lock().unwrap().push(payload.clone())
            });
        let loader = BookingWidgetLoader::mount(host.clone(), &config(), callbacks).unwrap();
        let frame = loader.frame().unwrap();
        let origin = "https://book.rooom.app";

        host.dispatch(&FrameMessageEvent::new(
            origin,
            json!({"type": "ROOOM_READY", "payload": {"studioId": "s"}}),
        ));
        host.dispatch(&FrameMessageEvent::new(
            origin,
            json!({"type": "ROOOM_BOOKING_COMPLETE"}),
        ));
        host.dispatch(&FrameMessageEvent::new(
            origin,
            json!({"type": "ROOOM_RESIZE", "payload": {"height": 842.5}}),
        ));

        assert_eq!(ready.load(Ordering::SeqCst), 1);
        assert_eq!(*booked.lock().unwrap(), vec![Value::Null]);
        assert_eq!(host.frame(frame).unwrap().height, 843);
    }

    #[test]
    fn spoofed_origin_fires_nothing() {
        let host = Arc::new(InMemoryEmbedHost::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let callbacks = LoaderCallbacks::default()
            .on_ready({
                let calls = calls.clone();
                move || {
                    calls.fetch_add(1, Ordering::SeqCst);
                }
            })
            .on_booking_complete({
                let calls = calls.clone();
                move |_| {
                    calls.fetch_add(1, Ordering::SeqCst);
                }
            });
        let loader = BookingWidgetLoader::mount(host.clone(), &config(), callbacks).unwrap();
        let frame = loader.frame().unwrap();

        for origin in [
            "https://evil.example.com",
            "https://book.rooom.app.evil.com",
            "http://book.rooom.app",
            "https://book.rooom.app:8443",
            "null",
        ] {
            host.dispatch(&FrameMessageEvent::new(origin, json!({"type": "ROOOM_READY"})));
            host.dispatch(&FrameMessageEvent::new(
                origin,
                json!({"type": "ROOOM_RESIZE", "payload": {"height": 1}}),
            ));
        }

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(host.frame(frame).unwrap().height, DEFAULT_FRAME_HEIGHT);
    }

    #[test]
    fn destroy_removes_frame_and_listener() {
        let host = Arc::new(InMemoryEmbedHost::new());
        let loader =
            BookingWidgetLoader::mount(host.clone(), &config(), LoaderCallbacks::default()).unwrap();
        assert_eq!(host.frame_count(), 1);
        assert_eq!(host.listener_count(), 1);

        loader.destroy();
        loader.destroy();
        assert!(!loader.is_mounted());
        assert_eq!(host.frame_count(), 0);
        assert_eq!(host.listener_count(), 0);
    }

    #[test]
    fn drop_cleans_up() {
        let host = Arc::new(InMemoryEmbedHost::new());
        {
            let _loader =
                BookingWidgetLoader::mount(host.clone(), &config(), LoaderCallbacks::default())
                    .unwrap();
        }
        assert_eq!(host.frame_count(), 0);
        assert_eq!(host.listener_count(), 0);
    }

    #[test]
    fn opaque_widget_base_is_rejected() {
        let host = Arc::new(InMemoryEmbedHost::new());
        let config = LoaderConfig::new(Url::parse("data:text/html,x").unwrap(), "s");
        let result = BookingWidgetLoader::mount(host.clone(), &config, LoaderCallbacks::default());
        assert!(matches!(result, Err(BridgeError::OpaqueOrigin(_))));
        assert_eq!(host.frame_count(), 0);
    }
}
