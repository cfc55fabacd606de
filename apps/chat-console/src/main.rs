mod command;
mod host;
mod render;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use rooom_core::bridge::{ParentBridge, TargetOrigin, resolve_parent_origin};
use rooom_core::config::{PartialWidgetConfig, TransportConfig};
use rooom_core::message::{BookingSlot, Message, MessageContent, Pack};
use rooom_core::state::FileUpload;
use rooom_core::store::{ConversationStore, StoreEvent};
use rooom_core::widget::{Backend, ChatWidget};
use security::{AntiForgery, MemorySessionStorage};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;

use crate::command::{Command, HELP};
use crate::host::{ConsoleFramePort, TerminalBell};

#[derive(Parser, Debug)]
#[command(author, version, about = "Rooom chat widget in the terminal")]
struct Cli {
    #[arg(long, default_value = "studio-1")]
    studio_id: String,
    #[arg(long)]
    studio_name: Option<String>,
    /// Assistant persona name
    #[arg(long)]
    ai_name: Option<String>,
    #[arg(long)]
    greeting: Option<String>,
    /// Disable the notification bell
    #[arg(long)]
    no_sound: bool,
    /// Print host notifications as if running inside a frame
    #[arg(long)]
    embedded: bool,
    /// Referrer of the embedding page
    #[arg(long)]
    referrer: Option<String>,
    #[arg(long, default_value = "https://widget.rooom.app")]
    document_origin: String,
    /// Start with the window closed
    #[arg(long)]
    closed: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    rooom_telemetry::install("rooom-chat-console");
    let cli = Cli::parse();

    let config = PartialWidgetConfig {
        studio_id: Some(cli.studio_id.clone()),
        studio_name: cli.studio_name.clone(),
        ai_name: cli.ai_name.clone(),
        greeting: cli.greeting.clone(),
        sound_enabled: cli.no_sound.then_some(false),
        ..Default::default()
    }
    .resolve()?;
    let transport = TransportConfig::from_env()?;
    let anti_forgery = AntiForgery::new(MemorySessionStorage::shared());
    let backend = Backend::from_config(&config, &transport, anti_forgery)
        .context("building chat backend")?;

    let document_origin =
        TargetOrigin::parse(&cli.document_origin).context("invalid --document-origin")?;
    let target = resolve_parent_origin(cli.referrer.as_deref(), &document_origin);
    let bridge = ParentBridge::new(Arc::new(ConsoleFramePort::new(cli.embedded)), target);

    let store = Arc::new(ConversationStore::new(
        config.sound_enabled,
        Arc::new(TerminalBell),
    ));
    let renderer = tokio::spawn(render_loop(store.subscribe(), config.ai_name.clone()));

    let widget = ChatWidget::new(config, Arc::clone(&store), backend)
        .with_bridge(bridge)
        .with_request_timeout(transport.request_timeout);
    if !cli.closed {
        widget.open();
    }
    if widget.mount().await.is_none() {
        eprintln!("{}", render::render_status(&store.snapshot()));
    }
    println!("{HELP}");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match command::parse(&line) {
            Ok(Some(Command::Quit)) => break,
            Ok(Some(command)) => run(&widget, command).await,
            Ok(None) => {}
            Err(usage) => eprintln!("{usage}"),
        }
    }

    widget.teardown();
    renderer.abort();
    Ok(())
}

async fn run(widget: &ChatWidget, command: Command) {
    let store = widget.store();
    match command {
        Command::Send(text) => {
            widget.send(&text).await;
        }
        Command::Action(action) => {
            widget.quick_action(action).await;
        }
        Command::Book(id) => match find_slot(&store.messages(), &id) {
            Some(slot) => {
                widget.book_slot(&slot).await;
            }
            None => eprintln!("no offered slot {id}"),
        },
        Command::Pack(id) => match find_pack(&store.messages(), &id) {
            Some(pack) => {
                if let Some(url) = widget.select_pack(&pack).await {
                    println!("→ {url}");
                }
            }
            None => eprintln!("no offered pack {id}"),
        },
        Command::Attach(paths) => {
            let mut files = Vec::new();
            for path in &paths {
                match read_upload(path).await {
                    Ok(file) => files.push(file),
                    Err(err) => eprintln!("{}: {err}", path.display()),
                }
            }
            widget.attach_files(files).await;
            println!("{}", render::render_status(&store.snapshot()));
        }
        Command::Detach(index) => {
            let id = store.attachments().get(index).map(|a| a.id.clone());
            match id {
                Some(id) => {
                    widget.remove_attachment(&id);
                }
                None => eprintln!("no attachment #{index}"),
            }
        }
        Command::Open => widget.open(),
        Command::Close => widget.close(),
        Command::Minimize => widget.minimize(),
        Command::Toggle => {
            widget.toggle();
        }
        Command::Sound(enabled) => store.set_sound_enabled(enabled),
        Command::Reset => {
            if widget.restart().await.is_none() {
                eprintln!("{}", render::render_status(&store.snapshot()));
            }
        }
        Command::Status => println!("{}", render::render_status(&store.snapshot())),
        Command::Help => println!("{HELP}"),
        Command::Quit => {}
    }
}

async fn render_loop(mut events: tokio::sync::broadcast::Receiver<StoreEvent>, ai_name: String) {
    loop {
        match events.recv().await {
            Ok(StoreEvent::WindowChanged(_)) => {}
            Ok(event) => {
                if let Some(line) = render::render_event(&event, &ai_name) {
                    println!("{line}");
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                tracing::debug!(target: "chat.console", skipped, "renderer lagged");
            }
            Err(RecvError::Closed) => break,
        }
    }
}

fn find_slot(messages: &[Message], id: &str) -> Option<BookingSlot> {
    messages.iter().rev().find_map(|m| match &m.content {
        MessageContent::BookingOffer { slots, .. } => slots.iter().find(|s| s.id == id).cloned(),
        _ => None,
    })
}

fn find_pack(messages: &[Message], id: &str) -> Option<Pack> {
    messages.iter().rev().find_map(|m| match &m.content {
        MessageContent::PackOffer { packs, .. } => packs.iter().find(|p| p.id == id).cloned(),
        _ => None,
    })
}

async fn read_upload(path: &Path) -> Result<FileUpload> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "fichier".to_string());
    Ok(FileUpload::new(filename, mime_for(path), bytes))
}

fn mime_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("pdf") => "application/pdf",
        Some("mp3") => "audio/mpeg",
        Some("wav") => "audio/wav",
        Some("txt") => "text/plain",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use rooom_core::catalog::StudioCatalog;
    use time::macros::date;

    use super::*;

    #[test]
    fn offered_items_are_found_in_latest_offer() {
        let catalog = StudioCatalog::demo(date!(2024 - 05 - 01));
        let messages = vec![
            Message::booking_offer("Créneaux", catalog.available_slots()),
            Message::pack_offer("Packs", catalog.packs().to_vec()),
        ];
        assert_eq!(find_slot(&messages, "slot-2").unwrap().price, 70);
        assert!(find_slot(&messages, "slot-4").is_none());
        assert!(find_pack(&messages, "pack-20h").is_some());
    }

    #[test]
    fn mime_from_extension() {
        assert_eq!(mime_for(Path::new("a/B.JPG")), "image/jpeg");
        assert_eq!(mime_for(Path::new("notes")), "application/octet-stream");
    }
}
