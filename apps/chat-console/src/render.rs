//! Plain-text rendering of store state.

use rooom_core::message::{Message, MessageContent, Sender};
use rooom_core::state::{Attachment, ConnectionStatus, TypingState, WindowState};
use rooom_core::store::{ConversationSnapshot, StoreEvent};

pub fn render_message(message: &Message, ai_name: &str) -> String {
    let who = match message.sender {
        Sender::User => "vous",
        Sender::Ai => ai_name,
        Sender::System => "système",
    };
    let mut out = format!("[{:>3}] {who}: ", message.seq);
    match &message.content {
        MessageContent::Text { body } => out.push_str(body),
        MessageContent::BookingOffer { body, slots } => {
            out.push_str(body);
            for slot in slots {
                out.push_str(&format!(
                    "\n        {} · {} {:02}:{:02}-{:02}:{:02} · {} · {} €{}",
                    slot.id,
                    slot.date,
                    slot.start_time.hour(),
                    slot.start_time.minute(),
                    slot.end_time.hour(),
                    slot.end_time.minute(),
                    slot.resource_name,
                    slot.price,
                    if slot.available { "" } else { " (complet)" },
                ));
            }
        }
        MessageContent::PackOffer { body, packs } => {
            out.push_str(body);
            for pack in packs {
                out.push_str(&format!(
                    "\n        {} · {} ({} h) · {} €",
                    pack.id, pack.name, pack.hours, pack.price
                ));
                if let Some(savings) = pack.savings {
                    out.push_str(&format!(" · -{savings} €"));
                }
                if pack.popular {
                    out.push_str(" ★");
                }
            }
        }
        MessageContent::QuickActions { body, actions } => {
            if let Some(body) = body {
                out.push_str(body);
            }
            let labels: Vec<String> = actions
                .iter()
                .map(|a| format!("[{}: /action {}]", a.label, a.action.as_str()))
                .collect();
            if body.is_some() {
                out.push(' ');
            }
            out.push_str(&labels.join(" "));
        }
        MessageContent::Escalation {
            body,
            estimated_wait_minutes,
        } => {
            out.push_str(body);
            if let Some(minutes) = estimated_wait_minutes {
                out.push_str(&format!(" (attente estimée : {minutes} min)"));
            }
        }
    }
    out
}

pub fn render_typing(typing: &TypingState) -> Option<String> {
    typing.is_typing.then(|| {
        format!(
            "… {} écrit",
            typing.typing_user.as_deref().unwrap_or("quelqu'un")
        )
    })
}

pub fn render_attachment(index: usize, attachment: &Attachment) -> String {
    let state = match (&attachment.error, attachment.uploading, &attachment.url) {
        (Some(err), _, _) => format!("erreur: {err}"),
        (None, true, _) => format!("{}%", attachment.progress),
        (None, false, Some(_)) => "envoyé".to_string(),
        (None, false, None) => "en attente".to_string(),
    };
    format!(
        "#{index} {} ({} octets) {state}",
        attachment.filename, attachment.size
    )
}

/// Bubble label with the unread badge.
pub fn render_badge(snapshot: &ConversationSnapshot) -> String {
    let window = match snapshot.window {
        WindowState::Open => "ouvert",
        WindowState::Closed => "fermé",
        WindowState::Minimized => "réduit",
    };
    if snapshot.unread_count > 0 {
        format!("[chat {window} · {} non lu(s)]", snapshot.unread_count)
    } else {
        format!("[chat {window}]")
    }
}

pub fn render_status(snapshot: &ConversationSnapshot) -> String {
    let connection = match snapshot.connection {
        ConnectionStatus::Connected => "connecté",
        ConnectionStatus::Connecting => "connexion…",
        ConnectionStatus::Disconnected => "déconnecté",
    };
    let mut lines = vec![format!(
        "{} · {connection} · session {}",
        render_badge(snapshot),
        snapshot.session_id().unwrap_or("-")
    )];
    lines.extend(
        snapshot
            .attachments
            .iter()
            .enumerate()
            .map(|(i, a)| render_attachment(i, a)),
    );
    if let Some(err) = &snapshot.error {
        lines.push(format!("erreur: {err}"));
    }
    lines.join("\n")
}

/// Line to print for a store event, if any.
pub fn render_event(event: &StoreEvent, ai_name: &str) -> Option<String> {
    match event {
        StoreEvent::MessageAppended(message) => Some(render_message(message, ai_name)),
        StoreEvent::TypingChanged(typing) => render_typing(typing),
        StoreEvent::ErrorChanged(Some(err)) => Some(format!("erreur: {err}")),
        StoreEvent::Reset => Some("--- conversation réinitialisée ---".to_string()),
        _ => None,
    }
}
