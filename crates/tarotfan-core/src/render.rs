// ABOUTME: Pure description of how the fan and each card should look for a given state.
// ABOUTME: Hosts apply these views through the Stage trait; nothing here touches a real surface.

use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::card::{CardGeometry, CardMachine, CardPhase, FlightOrigin, Viewport};
use crate::catalog::Payload;
use crate::session::Session;

/// Z-index given to the selected card so it floats over the fan.
pub const SELECTED_Z_INDEX: i32 = 1000;

/// Host surface the table draws on. Implementations are thin: they measure
/// cards and write views, and hold no card logic of their own.
pub trait Stage: Send + Sync {
    fn viewport(&self) -> Viewport;

    /// Current on-screen geometry of a card, measured synchronously.
    fn capture_geometry(&self, instance_id: Ulid) -> Option<CardGeometry>;

    fn render(&self, view: &TableView);
}

/// Transform override applied to a card element.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Transform {
    /// No override; the card follows normal layout and stylesheet animation.
    LayoutFlow,
    /// Flight animation start point, from the captured fan position.
    FlightFrom(FlightOrigin),
    /// Final resting pose: centred, unrotated, full scale.
    FrozenCentered,
}

/// How a card face is shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FaceVisibility {
    /// Removed from rendering entirely.
    Hidden,
    /// Rendered but turned away, ready to be flipped in.
    RotatedAway,
    Shown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetailFace {
    pub visibility: FaceVisibility,
    pub content: Option<Payload>,
}

/// Everything a host needs to draw one card.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CardView {
    pub instance_id: Ulid,
    pub classes: Vec<&'static str>,
    pub z_index: Option<i32>,
    pub cursor_default: bool,
    pub transform: Transform,
    /// Running keyframe animations are cancelled.
    pub animation_suppressed: bool,
    pub back_face: FaceVisibility,
    pub identity_face: FaceVisibility,
    pub detail_face: DetailFace,
}

impl CardView {
    /// The payload surface is visible and can be exported.
    pub fn detail_visible(&self) -> bool {
        self.detail_face.visibility == FaceVisibility::Shown
    }
}

/// Everything a host needs to draw the fan.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableView {
    pub fan_classes: Vec<&'static str>,
    pub cards: Vec<CardView>,
}

/// Per-card facts that live on the session rather than the card.
#[derive(Debug, Clone, Copy)]
pub struct CardContext {
    pub is_selected: bool,
    /// The session currently accepts a selection.
    pub selectable: bool,
}

pub fn describe_card(card: &CardMachine, ctx: &CardContext) -> CardView {
    let phase = card.phase();
    let flipped = matches!(
        phase,
        CardPhase::Selecting | CardPhase::Revealed | CardPhase::RevealingDetail | CardPhase::DetailShown
    );
    let disabled = !ctx.selectable && !ctx.is_selected;

    let mut classes = vec!["fan-card"];
    if ctx.is_selected {
        classes.push("selected");
    }
    if card.not_selected() {
        classes.push("not-selected");
    }
    if flipped {
        classes.push("flipped");
    }
    if disabled {
        classes.push("disabled");
    }
    if phase == CardPhase::Returning {
        classes.push("returning");
    }
    if phase == CardPhase::DetailShown {
        classes.push("showing-prediction");
    }
    if phase == CardPhase::RevealingDetail {
        classes.push("flipping-to-prediction");
    }

    let transform = if card.pose_frozen() {
        Transform::FrozenCentered
    } else {
        match (phase, card.flight_origin()) {
            (CardPhase::Selecting, Some(origin)) => Transform::FlightFrom(*origin),
            _ => Transform::LayoutFlow,
        }
    };

    let detail_visibility = match phase {
        CardPhase::RevealingDetail => FaceVisibility::RotatedAway,
        CardPhase::DetailShown => FaceVisibility::Shown,
        _ => FaceVisibility::Hidden,
    };

    CardView {
        instance_id: card.instance_id(),
        classes,
        z_index: ctx.is_selected.then_some(SELECTED_Z_INDEX),
        cursor_default: disabled,
        transform,
        animation_suppressed: card.pose_frozen(),
        back_face: if phase == CardPhase::DetailShown {
            FaceVisibility::Hidden
        } else {
            FaceVisibility::Shown
        },
        identity_face: if card.identity_face_hidden() {
            FaceVisibility::Hidden
        } else {
            FaceVisibility::Shown
        },
        detail_face: DetailFace {
            visibility: detail_visibility,
            content: card.detail().cloned(),
        },
    }
}

pub fn describe_table(session: &Session) -> TableView {
    let mut fan_classes = vec!["cards-fan"];
    if session.shuffle_in_flight {
        fan_classes.push("shuffling");
    }
    if session.cards_changed {
        fan_classes.push("cards-changed");
    }

    let selectable = session.hand_unlocked && !session.shuffle_in_flight;
    let cards = session
        .hand
        .iter()
        .enumerate()
        .map(|(i, slot)| {
            let ctx = CardContext {
                is_selected: session.selected_index == Some(i),
                selectable,
            };
            describe_card(&slot.machine, &ctx)
        })
        .collect();

    TableView { fan_classes, cards }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::card::CardTimer;

    fn payload() -> Payload {
        Payload {
            heading: "Wheel of Fortune".to_string(),
            body: "Luck turns".to_string(),
            advice: "Be ready".to_string(),
        }
    }

    const SELECTED: CardContext = CardContext {
        is_selected: true,
        selectable: true,
    };

    #[test]
    fn idle_card_on_locked_table_is_disabled() {
        let card = CardMachine::new(Ulid::new());
        let view = describe_card(
            &card,
            &CardContext {
                is_selected: false,
                selectable: false,
            },
        );
        assert_eq!(view.classes, vec!["fan-card", "disabled"]);
        assert!(view.cursor_default);
        assert_eq!(view.transform, Transform::LayoutFlow);
        assert_eq!(view.detail_face.visibility, FaceVisibility::Hidden);
        assert!(!view.detail_visible());
    }

    #[test]
    fn selecting_card_starts_flight_from_captured_origin() {
        let origin = FlightOrigin {
            offset_x: 40.0,
            offset_y: 200.0,
            rotation_deg: 6.0,
        };
        let mut card = CardMachine::new(Ulid::new());
        card.select(Some(origin)).unwrap();
        let view = describe_card(&card, &SELECTED);
        assert_eq!(view.transform, Transform::FlightFrom(origin));
        assert_eq!(view.z_index, Some(SELECTED_Z_INDEX));
        assert!(view.classes.contains(&"flipped"));
        assert!(view.classes.contains(&"selected"));
    }

    #[test]
    fn detail_flip_shows_rotated_face_with_content_first() {
        let mut card = CardMachine::new(Ulid::new());
        card.select(None).unwrap();
        card.fire(CardTimer::FlightLanded).unwrap();
        card.reveal_detail(payload()).unwrap();

        let view = describe_card(&card, &SELECTED);
        assert_eq!(view.detail_face.visibility, FaceVisibility::RotatedAway);
        assert_eq!(view.detail_face.content, Some(payload()));
        assert_eq!(view.identity_face, FaceVisibility::Shown);
        assert!(view.classes.contains(&"flipping-to-prediction"));
        assert!(!view.detail_visible());
    }

    #[test]
    fn detail_shown_hides_identity_and_freezes_pose() {
        let mut card = CardMachine::new(Ulid::new());
        card.select(None).unwrap();
        card.fire(CardTimer::FlightLanded).unwrap();
        card.reveal_detail(payload()).unwrap();
        card.fire(CardTimer::DetailFlipped).unwrap();

        let view = describe_card(&card, &SELECTED);
        assert!(view.detail_visible());
        assert_eq!(view.identity_face, FaceVisibility::Hidden);
        assert_eq!(view.back_face, FaceVisibility::Hidden);
        assert_eq!(view.transform, Transform::FrozenCentered);
        assert!(view.animation_suppressed);
        assert!(view.classes.contains(&"showing-prediction"));
    }

    #[test]
    fn returned_card_renders_like_a_fresh_one() {
        let id = Ulid::new();
        let mut card = CardMachine::new(id);
        card.select(None).unwrap();
        card.fire(CardTimer::FlightLanded).unwrap();
        card.reveal_detail(payload()).unwrap();
        card.fire(CardTimer::DetailFlipped).unwrap();
        card.begin_return().unwrap();

        let returning = describe_card(&card, &SELECTED);
        assert_eq!(returning.transform, Transform::LayoutFlow);
        assert_eq!(returning.detail_face.content, None);
        assert!(returning.classes.contains(&"returning"));

        card.fire(CardTimer::ReturnLanded).unwrap();
        let ctx = CardContext {
            is_selected: false,
            selectable: false,
        };
        assert_eq!(
            describe_card(&card, &ctx),
            describe_card(&CardMachine::new(id), &ctx)
        );
    }
}
