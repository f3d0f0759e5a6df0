// ABOUTME: Defines the event envelope and payload variants emitted by the table actor.
// ABOUTME: Events are the facts the session state is folded from and the shell listens to.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::card::FlightOrigin;
use crate::catalog::Payload;
use crate::deck::DrawnCard;

/// An event envelope wrapping a timestamped, sequenced payload for one session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub event_id: u64,
    pub session_id: Ulid,
    pub timestamp: DateTime<Utc>,
    pub payload: EventPayload,
}

/// Everything that can happen at the table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EventPayload {
    ShuffleStarted {
        epoch: u64,
    },
    /// A new hand replaced the old one at the shuffle midpoint.
    HandDrawn {
        epoch: u64,
        hand: Vec<DrawnCard>,
    },
    ShuffleCompleted {
        epoch: u64,
    },
    CardSelected {
        index: usize,
        instance_id: Ulid,
        flight_origin: Option<FlightOrigin>,
        payload: Payload,
    },
    SelectionFlightCompleted {
        index: usize,
        instance_id: Ulid,
    },
    DetailRevealStarted {
        index: usize,
        instance_id: Ulid,
    },
    DetailRevealCompleted {
        index: usize,
        instance_id: Ulid,
    },
    ReturnStarted {
        index: usize,
        instance_id: Ulid,
    },
    ReturnCompleted {
        index: usize,
        instance_id: Ulid,
    },
    /// The session is back to its pre-shuffle locked state.
    SessionLocked,
}
