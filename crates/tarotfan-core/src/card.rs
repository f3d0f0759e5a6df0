// ABOUTME: Per-card interaction state machine: select, flight, reveal, detail flip, return.
// ABOUTME: Transitions are explicit method calls and fixed-duration timers; illegal ones are errors.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use ulid::Ulid;

use crate::catalog::Payload;
use crate::timing::Timings;

/// Where the selected card settles, as a fraction of viewport height.
const OVERLAY_TOP_FRACTION: f64 = 0.25;

/// Errors raised by illegal card transitions.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CardError {
    #[error("cannot {action} while card is {from:?}")]
    IllegalTransition { from: CardPhase, action: &'static str },

    #[error("timer {timer:?} does not apply while card is {phase:?}")]
    StaleTimer { timer: CardTimer, phase: CardPhase },
}

/// The visible lifecycle of one card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CardPhase {
    /// Face down in the fan.
    Idle,
    /// Flying to the overlay and flipping face up.
    Selecting,
    /// Face up, waiting for a tap.
    Revealed,
    /// Flipping from the identity face to the detail face.
    RevealingDetail,
    /// Payload visible; stays here until a new reading.
    DetailShown,
    /// Flying back to the fan.
    Returning,
}

impl CardPhase {
    /// True while an animation owns the card and taps must be dropped.
    pub fn is_animating(self) -> bool {
        matches!(
            self,
            CardPhase::Selecting | CardPhase::RevealingDetail | CardPhase::Returning
        )
    }
}

/// Timers that complete the automatic transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CardTimer {
    FlightLanded,
    DetailFlipped,
    ReturnLanded,
}

/// On-screen box of a card, in viewport pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn center(&self) -> (f64, f64) {
        (self.left + self.width / 2.0, self.top + self.height / 2.0)
    }
}

/// Geometry captured from the host just before a card leaves the fan.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CardGeometry {
    pub rect: Rect,
    pub rotation_deg: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
}

/// Start point of the flight animation, relative to the overlay position
/// (horizontally centred, a quarter of the way down the viewport).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FlightOrigin {
    pub offset_x: f64,
    pub offset_y: f64,
    pub rotation_deg: f64,
}

impl FlightOrigin {
    pub fn from_geometry(geometry: &CardGeometry, viewport: &Viewport) -> Self {
        let (cx, cy) = geometry.rect.center();
        Self {
            offset_x: cx - viewport.width / 2.0,
            offset_y: cy - viewport.height * OVERLAY_TOP_FRACTION,
            rotation_deg: geometry.rotation_deg,
        }
    }
}

/// Action controls embedded in the detail face.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionControl {
    Share,
    NewReading,
}

/// What a tap landed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "control")]
pub enum TapTarget {
    Card,
    Control(ActionControl),
}

/// How a card answers a tap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TapResponse {
    /// Start the detail flip.
    RevealDetail,
    /// The tap hit an action control; it is stopped here.
    Suppressed,
    /// An animation is running; the tap is dropped.
    MidAnimation,
    /// Nothing to do in this phase.
    Ignored,
}

/// One card's state machine. Holds only what the renderer needs to draw the
/// card; the catalog data lives on the drawn card.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardMachine {
    instance_id: Ulid,
    phase: CardPhase,
    /// Consumed by the flight animation; cleared once the card lands.
    flight_origin: Option<FlightOrigin>,
    /// Text written into the detail face.
    detail: Option<Payload>,
    identity_face_hidden: bool,
    pose_frozen: bool,
    not_selected: bool,
}

impl CardMachine {
    pub fn new(instance_id: Ulid) -> Self {
        Self {
            instance_id,
            phase: CardPhase::Idle,
            flight_origin: None,
            detail: None,
            identity_face_hidden: false,
            pose_frozen: false,
            not_selected: false,
        }
    }

    pub fn instance_id(&self) -> Ulid {
        self.instance_id
    }

    pub fn phase(&self) -> CardPhase {
        self.phase
    }

    pub fn flight_origin(&self) -> Option<&FlightOrigin> {
        self.flight_origin.as_ref()
    }

    pub fn detail(&self) -> Option<&Payload> {
        self.detail.as_ref()
    }

    pub fn identity_face_hidden(&self) -> bool {
        self.identity_face_hidden
    }

    pub fn pose_frozen(&self) -> bool {
        self.pose_frozen
    }

    pub fn not_selected(&self) -> bool {
        self.not_selected
    }

    pub fn set_not_selected(&mut self, not_selected: bool) {
        self.not_selected = not_selected;
    }

    /// `Idle -> Selecting`. `origin` is the geometry captured before the card
    /// was lifted out of the fan; `None` means the host could not measure it
    /// and the flight starts from the overlay position.
    pub fn select(&mut self, origin: Option<FlightOrigin>) -> Result<(), CardError> {
        self.expect_phase(CardPhase::Idle, "select")?;
        self.phase = CardPhase::Selecting;
        self.flight_origin = origin;
        self.not_selected = false;
        Ok(())
    }

    pub fn tap_response(&self, target: TapTarget) -> TapResponse {
        if let TapTarget::Control(_) = target {
            return TapResponse::Suppressed;
        }
        match self.phase {
            CardPhase::Revealed => TapResponse::RevealDetail,
            CardPhase::Selecting | CardPhase::RevealingDetail => TapResponse::MidAnimation,
            CardPhase::Idle | CardPhase::DetailShown | CardPhase::Returning => TapResponse::Ignored,
        }
    }

    /// `Revealed -> RevealingDetail`. The payload is written into the detail
    /// face before the flip starts so the flip has content to reveal.
    pub fn reveal_detail(&mut self, payload: Payload) -> Result<(), CardError> {
        self.expect_phase(CardPhase::Revealed, "reveal detail")?;
        self.detail = Some(payload);
        self.phase = CardPhase::RevealingDetail;
        Ok(())
    }

    /// `DetailShown -> Returning`, on an external new-reading request.
    pub fn begin_return(&mut self) -> Result<(), CardError> {
        self.expect_phase(CardPhase::DetailShown, "return")?;
        self.phase = CardPhase::Returning;
        self.detail = None;
        self.identity_face_hidden = false;
        self.pose_frozen = false;
        self.flight_origin = None;
        Ok(())
    }

    /// The timer this card is waiting on, if any.
    pub fn pending_timer(&self, timings: &Timings) -> Option<(CardTimer, Duration)> {
        match self.phase {
            CardPhase::Selecting => Some((CardTimer::FlightLanded, timings.flight)),
            CardPhase::RevealingDetail => Some((CardTimer::DetailFlipped, timings.detail_flip)),
            CardPhase::Returning => Some((CardTimer::ReturnLanded, timings.return_flight)),
            CardPhase::Idle | CardPhase::Revealed | CardPhase::DetailShown => None,
        }
    }

    /// Apply a fired timer and return the phase it left the card in.
    pub fn fire(&mut self, timer: CardTimer) -> Result<CardPhase, CardError> {
        match (timer, self.phase) {
            (CardTimer::FlightLanded, CardPhase::Selecting) => {
                self.phase = CardPhase::Revealed;
                self.flight_origin = None;
            }
            (CardTimer::DetailFlipped, CardPhase::RevealingDetail) => {
                self.phase = CardPhase::DetailShown;
                self.identity_face_hidden = true;
                self.pose_frozen = true;
                self.flight_origin = None;
            }
            (CardTimer::ReturnLanded, CardPhase::Returning) => {
                *self = Self::new(self.instance_id);
            }
            (timer, phase) => return Err(CardError::StaleTimer { timer, phase }),
        }
        Ok(self.phase)
    }

    fn expect_phase(&self, expected: CardPhase, action: &'static str) -> Result<(), CardError> {
        if self.phase != expected {
            return Err(CardError::IllegalTransition {
                from: self.phase,
                action,
            });
        }
        Ok(())
    }
}
