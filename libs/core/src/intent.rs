use serde::{Deserialize, Serialize};

use crate::catalog::StudioCatalog;
use crate::message::{Message, default_quick_actions};

/// Estimated wait announced on escalation, in minutes.
pub const ESCALATION_WAIT_MINUTES: u32 = 5;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Booking,
    Pricing,
    Availability,
    Human,
    Faq,
    General,
}

const KEYWORDS: &[(Intent, &[&str])] = &[
    (
        Intent::Booking,
        &["reserver", "reservation", "disponibilite", "creneau", "booker"],
    ),
    (
        Intent::Pricing,
        &["tarif", "prix", "cout", "pack", "forfait", "combien"],
    ),
    (
        Intent::Availability,
        &["disponible", "dispo", "libre", "quand", "horaire"],
    ),
    (
        Intent::Human,
        &["humain", "conseiller", "personne", "agent", "quelqu'un"],
    ),
    (
        Intent::Faq,
        &["comment", "pourquoi", "quoi", "equipement", "materiel"],
    ),
];

/// Classifies free text into an [`Intent`].
pub fn resolve_intent(text: &str) -> Intent {
    let folded = fold(text);
    KEYWORDS
        .iter()
        .find(|(_, words)| words.iter().any(|w| folded.contains(w)))
        .map(|(intent, _)| *intent)
        .unwrap_or(Intent::General)
}

/// Lowercases and strips the French diacritics the keyword tables omit.
fn fold(text: &str) -> String {
    text.chars()
        .flat_map(char::to_lowercase)
        .map(|c| match c {
            'à' | 'â' | 'ä' => 'a',
            'é' | 'è' | 'ê' | 'ë' => 'e',
            'î' | 'ï' => 'i',
            'ô' | 'ö' => 'o',
            'ù' | 'û' | 'ü' => 'u',
            'ç' => 'c',
            '’' => '\'',
            other => other,
        })
        .collect()
}

/// Produces the assistant's reply batch for a user message.
#[derive(Clone, Debug)]
pub struct IntentResolver {
    catalog: StudioCatalog,
}

impl IntentResolver {
    pub fn new(catalog: StudioCatalog) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &StudioCatalog {
        &self.catalog
    }

    pub fn respond(&self, text: &str, studio_name: &str) -> Vec<Message> {
        self.messages_for(resolve_intent(text), studio_name)
    }

    pub fn messages_for(&self, intent: Intent, studio_name: &str) -> Vec<Message> {
        match intent {
            Intent::Booking | Intent::Availability => vec![
                Message::ai_text(format!(
                    "Voici les prochains créneaux disponibles chez {studio_name}. \
                     Sélectionnez celui qui vous convient :"
                )),
                Message::booking_offer("Créneaux disponibles", self.catalog.available_slots()),
            ],
            Intent::Pricing => vec![
                Message::ai_text(format!(
                    "Voici les formules proposées par {studio_name}. \
                     Les packs d'heures vous font économiser sur chaque session :"
                )),
                Message::pack_offer("Nos packs d'heures", self.catalog.packs().to_vec()),
            ],
            Intent::Human => vec![Message::escalation(
                format!(
                    "Je vous mets en relation avec l'équipe de {studio_name}. \
                     Un conseiller va vous répondre dans quelques instants."
                ),
                Some(ESCALATION_WAIT_MINUTES),
            )],
            Intent::Faq => vec![Message::ai_text(format!(
                "Les studios de {studio_name} sont entièrement équipés : micros, \
                 interface audio, écoutes et traitement acoustique. Pour une question \
                 précise sur le matériel, un conseiller peut vous répondre."
            ))],
            Intent::General => vec![
                Message::ai_text(format!(
                    "Merci pour votre message ! Je peux vous aider à réserver un créneau, \
                     découvrir nos tarifs ou vous mettre en relation avec l'équipe de {studio_name}."
                )),
                Message::quick_actions(
                    Some("Que souhaitez-vous faire ?".to_string()),
                    default_quick_actions(),
                ),
            ],
        }
    }

    /// Greeting batch sent when a conversation starts.
    pub fn welcome(&self, studio_name: &str, greeting: Option<&str>) -> Vec<Message> {
        let greeting = greeting
            .filter(|g| !g.trim().is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| {
                format!(
                    "Bonjour ! Je suis l'assistant virtuel de {studio_name}. \
                     Comment puis-je vous aider aujourd'hui ?"
                )
            });
        vec![
            Message::ai_text(greeting),
            Message::quick_actions(None, default_quick_actions()),
        ]
    }
}
