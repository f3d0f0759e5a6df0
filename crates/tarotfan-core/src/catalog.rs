// ABOUTME: Card identities, prediction payloads and the catalog that pairs them by position.
// ABOUTME: Ships the built-in major arcana deck and loads alternative decks from JSON.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur when building or loading a catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog has no cards")]
    NoCards,

    #[error("catalog has no payloads")]
    NoPayloads,

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// What is printed on a card's face: a text symbol or an image reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Glyph {
    Symbol(String),
    Image(String),
}

/// An immutable card identity from the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardIdentity {
    pub name: String,
    pub ordinal: String,
    pub glyph: Glyph,
    pub subtitle: String,
}

/// The prediction text bound to a drawn card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    pub heading: String,
    pub body: String,
    pub advice: String,
}

/// A fixed, ordered catalog of card identities and their payloads.
///
/// The payload for catalog position `i` is `payloads[i]`. Positions past the
/// end of the payload list fall back to the first payload, so the same
/// identity always yields the same payload within one catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawCatalog")]
pub struct Catalog {
    cards: Vec<CardIdentity>,
    payloads: Vec<Payload>,
}

/// Unvalidated catalog shape as it appears in JSON.
#[derive(Deserialize)]
struct RawCatalog {
    cards: Vec<CardIdentity>,
    payloads: Vec<Payload>,
}

impl TryFrom<RawCatalog> for Catalog {
    type Error = CatalogError;

    fn try_from(raw: RawCatalog) -> Result<Self, Self::Error> {
        Catalog::new(raw.cards, raw.payloads)
    }
}

impl Catalog {
    pub fn new(cards: Vec<CardIdentity>, payloads: Vec<Payload>) -> Result<Self, CatalogError> {
        if cards.is_empty() {
            return Err(CatalogError::NoCards);
        }
        if payloads.is_empty() {
            return Err(CatalogError::NoPayloads);
        }
        Ok(Self { cards, payloads })
    }

    /// Parse a catalog from `{"cards": [...], "payloads": [...]}`.
    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        let raw: RawCatalog = serde_json::from_str(json)?;
        Self::try_from(raw)
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    pub fn cards(&self) -> &[CardIdentity] {
        &self.cards
    }

    pub fn card(&self, position: usize) -> Option<&CardIdentity> {
        self.cards.get(position)
    }

    /// Payload bound to a catalog position.
    pub fn payload_for(&self, position: usize) -> &Payload {
        self.payloads.get(position).unwrap_or(&self.payloads[0])
    }

    /// The built-in 22-card major arcana deck.
    pub fn major_arcana() -> Self {
        let cards = MAJOR_ARCANA
            .iter()
            .map(|(ordinal, name, symbol, subtitle, _)| CardIdentity {
                name: (*name).to_string(),
                ordinal: (*ordinal).to_string(),
                glyph: Glyph::Symbol((*symbol).to_string()),
                subtitle: (*subtitle).to_string(),
            })
            .collect();
        let payloads = MAJOR_ARCANA
            .iter()
            .map(|(_, name, _, _, (body, advice))| Payload {
                heading: format!("{name}: your year ahead"),
                body: (*body).to_string(),
                advice: (*advice).to_string(),
            })
            .collect();
        Self { cards, payloads }
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::major_arcana()
    }
}

type ArcanaRow = (
    &'static str,
    &'static str,
    &'static str,
    &'static str,
    (&'static str, &'static str),
);

#[rustfmt::skip]
const MAJOR_ARCANA: [ArcanaRow; 22] = [
    ("0", "The Fool", "✦", "New beginnings", (
        "A leap you have been postponing finally happens, and the ground turns out to be there.",
        "Pack light and say yes to the first honest invitation.",
    )),
    ("I", "The Magician", "∞", "Will and skill", (
        "The tools you need are already on your desk; the year rewards the one who starts.",
        "Finish one thing before you begin the next.",
    )),
    ("II", "The High Priestess", "☾", "Intuition", (
        "Quiet months teach you more than loud ones. A hunch proves right in autumn.",
        "Write down the first thought you have each morning.",
    )),
    ("III", "The Empress", "♀", "Abundance", (
        "Something you planted long ago bears fruit, and there is enough to share.",
        "Spend time somewhere green at least once a week.",
    )),
    ("IV", "The Emperor", "♂", "Structure", (
        "A steady routine becomes the frame for a bigger ambition.",
        "Decide your three rules for the year and keep them.",
    )),
    ("V", "The Hierophant", "☉", "Tradition", (
        "A mentor appears, or you become one. Old wisdom fits new problems.",
        "Ask the question you think is too basic.",
    )),
    ("VI", "The Lovers", "♡", "Choice", (
        "A decision of the heart clarifies what you actually value.",
        "Choose with your whole self, then stop re-choosing.",
    )),
    ("VII", "The Chariot", "⚔", "Momentum", (
        "Conflicting pulls line up behind one direction and you move fast.",
        "Keep both hands on the reins when things speed up.",
    )),
    ("VIII", "Strength", "∞", "Gentle courage", (
        "Patience wins an argument that force would have lost.",
        "Be kind to yourself on the days you fall short.",
    )),
    ("IX", "The Hermit", "☆", "Reflection", (
        "Time alone brings an answer nobody else could give you.",
        "Schedule an evening with no screens each month.",
    )),
    ("X", "Wheel of Fortune", "☸", "Turning points", (
        "Luck turns in your favour around mid-year; be ready when it does.",
        "Keep a small reserve so you can act on sudden chances.",
    )),
    ("XI", "Justice", "⚖", "Balance", (
        "What you gave returns in kind. A long-standing imbalance is corrected.",
        "Sign nothing you have not read twice.",
    )),
    ("XII", "The Hanged Man", "⚓", "New perspective", (
        "A pause you did not choose shows you the situation upside down, and that helps.",
        "When stuck, change the question rather than the answer.",
    )),
    ("XIII", "Death", "✝", "Transformation", (
        "An ending clears space for a chapter you will like better.",
        "Let go of one habit that belongs to an older you.",
    )),
    ("XIV", "Temperance", "⚗", "Moderation", (
        "Mixing two parts of your life produces something new and calm.",
        "Take the middle path when both extremes look tempting.",
    )),
    ("XV", "The Devil", "⛓", "Attachments", (
        "You notice a chain you have been wearing, and realise it unlocks from the inside.",
        "Name the thing you over-indulge in and halve it.",
    )),
    ("XVI", "The Tower", "⚡", "Sudden change", (
        "A shake-up topples a plan built on sand; what replaces it stands firmer.",
        "Do not patch what needs rebuilding.",
    )),
    ("XVII", "The Star", "★", "Hope", (
        "After a hard stretch, a calm and hopeful season arrives.",
        "Share your plans with one person who believes in you.",
    )),
    ("XVIII", "The Moon", "☽", "Illusion", (
        "Not everything is what it seems this year, and your dreams carry messages.",
        "Wait for daylight before deciding anything big.",
    )),
    ("XIX", "The Sun", "☀", "Joy", (
        "Warmth, success and visibility: this is a year to be seen.",
        "Celebrate small wins out loud.",
    )),
    ("XX", "Judgement", "♫", "Awakening", (
        "A call you ignored before comes back, and this time you answer.",
        "Forgive one old mistake, including your own.",
    )),
    ("XXI", "The World", "⊕", "Completion", (
        "A long journey closes its loop and a wider one opens.",
        "Travel somewhere you have never been, even if it is nearby.",
    )),
];
