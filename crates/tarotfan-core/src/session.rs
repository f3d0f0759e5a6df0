// ABOUTME: Session state for one table: the hand, the selection, and shuffle bookkeeping.
// ABOUTME: The apply() method folds table events into state; card transitions happen here.

use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::card::{CardMachine, CardPhase, CardTimer};
use crate::catalog::Payload;
use crate::deck::DrawnCard;
use crate::event::{Event, EventPayload};

/// Coarse lifecycle of the whole table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionPhase {
    /// Waiting for a shuffle; selection is refused.
    Locked,
    Shuffling,
    /// Shuffled; exactly one selection may be made.
    Unlocked,
    Selected,
    /// The selected card is flying back; the table locks when it lands.
    ReturningToLocked,
}

/// A drawn card together with its state machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandSlot {
    pub card: DrawnCard,
    pub machine: CardMachine,
}

impl HandSlot {
    pub fn new(card: DrawnCard) -> Self {
        let machine = CardMachine::new(card.instance_id);
        Self { card, machine }
    }
}

/// The materialized state of a table session, built by applying events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub hand: Vec<HandSlot>,
    pub selected_index: Option<usize>,
    pub selected_payload: Option<Payload>,
    pub shuffle_in_flight: bool,
    pub hand_unlocked: bool,
    /// Set between the mid-shuffle swap and the end of the animation.
    pub cards_changed: bool,
    pub shuffle_epoch: u64,
    pub last_event_id: u64,
}

impl Session {
    /// A locked session holding the hand dealt at mount time.
    pub fn new(hand: Vec<DrawnCard>) -> Self {
        Self {
            hand: hand.into_iter().map(HandSlot::new).collect(),
            selected_index: None,
            selected_payload: None,
            shuffle_in_flight: false,
            hand_unlocked: false,
            cards_changed: false,
            shuffle_epoch: 0,
            last_event_id: 0,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        if self.shuffle_in_flight {
            return SessionPhase::Shuffling;
        }
        match self.selected_slot() {
            Some(slot) if slot.machine.phase() == CardPhase::Returning => {
                SessionPhase::ReturningToLocked
            }
            Some(_) => SessionPhase::Selected,
            None if self.hand_unlocked => SessionPhase::Unlocked,
            None => SessionPhase::Locked,
        }
    }

    pub fn selected_slot(&self) -> Option<&HandSlot> {
        self.selected_index.and_then(|i| self.hand.get(i))
    }

    /// Position of a card in the current hand by instance id.
    pub fn index_of(&self, instance_id: Ulid) -> Option<usize> {
        self.hand
            .iter()
            .position(|slot| slot.card.instance_id == instance_id)
    }

    /// Number of cards that have left the fan. Never more than one.
    pub fn active_card_count(&self) -> usize {
        self.hand
            .iter()
            .filter(|slot| slot.machine.phase() != CardPhase::Idle)
            .count()
    }

    /// Apply a single event to mutate this state. Events are produced by the
    /// actor after validation, so a transition that still fails here is
    /// logged as an anomaly and otherwise ignored.
    pub fn apply(&mut self, event: &Event) {
        self.last_event_id = event.event_id;

        match &event.payload {
            EventPayload::ShuffleStarted { epoch } => {
                self.shuffle_epoch = *epoch;
                self.shuffle_in_flight = true;
                self.cards_changed = false;
            }

            EventPayload::HandDrawn { hand, .. } => {
                self.hand = hand.iter().cloned().map(HandSlot::new).collect();
                self.selected_index = None;
                self.selected_payload = None;
                self.cards_changed = true;
            }

            EventPayload::ShuffleCompleted { .. } => {
                self.shuffle_in_flight = false;
                self.cards_changed = false;
                self.hand_unlocked = true;
            }

            EventPayload::CardSelected {
                index,
                flight_origin,
                payload,
                ..
            } => {
                self.selected_index = Some(*index);
                self.selected_payload = Some(payload.clone());
                for (i, slot) in self.hand.iter_mut().enumerate() {
                    slot.machine.set_not_selected(i != *index);
                }
                self.with_machine(*index, "select", |m| m.select(*flight_origin));
            }

            EventPayload::SelectionFlightCompleted { index, .. } => {
                self.with_machine(*index, "land flight", |m| {
                    m.fire(CardTimer::FlightLanded).map(|_| ())
                });
            }

            EventPayload::DetailRevealStarted { index, .. } => {
                match self.selected_payload.clone() {
                    Some(payload) => {
                        self.with_machine(*index, "reveal detail", |m| m.reveal_detail(payload));
                    }
                    None => tracing::warn!(index, "detail reveal without a bound payload"),
                }
            }

            EventPayload::DetailRevealCompleted { index, .. } => {
                self.with_machine(*index, "finish detail flip", |m| {
                    m.fire(CardTimer::DetailFlipped).map(|_| ())
                });
            }

            EventPayload::ReturnStarted { index, .. } => {
                self.with_machine(*index, "return", |m| m.begin_return());
            }

            EventPayload::ReturnCompleted { index, .. } => {
                self.with_machine(*index, "land return", |m| {
                    m.fire(CardTimer::ReturnLanded).map(|_| ())
                });
            }

            EventPayload::SessionLocked => {
                self.selected_index = None;
                self.selected_payload = None;
                self.hand_unlocked = false;
                for slot in &mut self.hand {
                    slot.machine.set_not_selected(false);
                }
            }
        }
    }

    fn with_machine<F>(&mut self, index: usize, action: &'static str, f: F)
    where
        F: FnOnce(&mut CardMachine) -> Result<(), crate::card::CardError>,
    {
        match self.hand.get_mut(index) {
            Some(slot) => {
                if let Err(e) = f(&mut slot.machine) {
                    tracing::warn!(index, action, error = %e, "card transition anomaly");
                }
            }
            None => tracing::warn!(index, action, "event refers to a card outside the hand"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;

    use super::*;
    use crate::catalog::Catalog;
    use crate::deck::Dealer;

    struct Replay {
        session: Session,
        dealer: Dealer,
        next_id: u64,
        session_id: Ulid,
    }

    impl Replay {
        fn new() -> Self {
            let mut dealer = Dealer::new(Arc::new(Catalog::major_arcana()), 6, Some(11)).unwrap();
            let session = Session::new(dealer.draw());
            Self {
                session,
                dealer,
                next_id: 1,
                session_id: Ulid::new(),
            }
        }

        fn push(&mut self, payload: EventPayload) {
            let event = Event {
                event_id: self.next_id,
                session_id: self.session_id,
                timestamp: Utc::now(),
                payload,
            };
            self.next_id += 1;
            self.session.apply(&event);
        }

        fn id(&self, index: usize) -> Ulid {
            self.session.hand[index].card.instance_id
        }

        fn shuffle(&mut self) {
            let epoch = self.session.shuffle_epoch + 1;
            self.push(EventPayload::ShuffleStarted { epoch });
            let hand = self.dealer.draw();
            self.push(EventPayload::HandDrawn { epoch, hand });
            self.push(EventPayload::ShuffleCompleted { epoch });
        }

        fn select(&mut self, index: usize) {
            let payload = self.session.hand[index].card.payload.clone();
            self.push(EventPayload::CardSelected {
                index,
                instance_id: self.id(index),
                flight_origin: None,
                payload,
            });
        }
    }

    #[test]
    fn new_session_is_locked() {
        let replay = Replay::new();
        assert_eq!(replay.session.phase(), SessionPhase::Locked);
        assert_eq!(replay.session.hand.len(), 6);
        assert_eq!(replay.session.active_card_count(), 0);
    }

    #[test]
    fn shuffle_phases_swap_then_unlock() {
        let mut replay = Replay::new();
        let old_ids: Vec<_> = (0..6).map(|i| replay.id(i)).collect();

        replay.push(EventPayload::ShuffleStarted { epoch: 1 });
        assert_eq!(replay.session.phase(), SessionPhase::Shuffling);
        assert!(!replay.session.cards_changed);

        let hand = replay.dealer.draw();
        replay.push(EventPayload::HandDrawn { epoch: 1, hand });
        assert!(replay.session.cards_changed);
        assert!(!replay.session.hand_unlocked, "unlock waits for the end");
        assert!(old_ids.iter().all(|id| replay.session.index_of(*id).is_none()));

        replay.push(EventPayload::ShuffleCompleted { epoch: 1 });
        assert_eq!(replay.session.phase(), SessionPhase::Unlocked);
        assert!(!replay.session.cards_changed);
    }

    #[test]
    fn selection_flags_every_other_card() {
        let mut replay = Replay::new();
        replay.shuffle();
        replay.select(2);

        assert_eq!(replay.session.phase(), SessionPhase::Selected);
        assert_eq!(replay.session.selected_index, Some(2));
        assert_eq!(
            replay.session.selected_payload.as_ref(),
            Some(&replay.session.hand[2].card.payload)
        );
        for (i, slot) in replay.session.hand.iter().enumerate() {
            assert_eq!(slot.machine.not_selected(), i != 2);
        }
        assert_eq!(replay.session.active_card_count(), 1);
    }

    #[test]
    fn full_reading_returns_to_locked() {
        let mut replay = Replay::new();
        replay.shuffle();
        replay.select(4);
        let id = replay.id(4);
        replay.push(EventPayload::SelectionFlightCompleted { index: 4, instance_id: id });
        replay.push(EventPayload::DetailRevealStarted { index: 4, instance_id: id });
        replay.push(EventPayload::DetailRevealCompleted { index: 4, instance_id: id });
        assert_eq!(replay.session.hand[4].machine.phase(), CardPhase::DetailShown);
        assert_eq!(
            replay.session.hand[4].machine.detail(),
            Some(&replay.session.hand[4].card.payload)
        );

        replay.push(EventPayload::ReturnStarted { index: 4, instance_id: id });
        assert_eq!(replay.session.phase(), SessionPhase::ReturningToLocked);
        assert!(
            replay.session.hand[0].machine.not_selected(),
            "other cards stay dimmed until the return lands"
        );

        replay.push(EventPayload::ReturnCompleted { index: 4, instance_id: id });
        replay.push(EventPayload::SessionLocked);
        assert_eq!(replay.session.phase(), SessionPhase::Locked);
        assert_eq!(replay.session.selected_index, None);
        assert!(replay.session.hand.iter().all(|s| !s.machine.not_selected()));
        assert_eq!(replay.session.active_card_count(), 0);
    }

    #[test]
    fn out_of_order_event_is_an_anomaly_not_a_panic() {
        let mut replay = Replay::new();
        let id = replay.id(0);
        let before = replay.session.hand[0].machine.clone();
        replay.push(EventPayload::DetailRevealCompleted { index: 0, instance_id: id });
        replay.push(EventPayload::ReturnStarted { index: 99, instance_id: id });
        assert_eq!(replay.session.hand[0].machine, before);
    }
}
