// ABOUTME: Async actor that owns one table session, its dealer, its timers and its stage.
// ABOUTME: Provides TableHandle for sending commands, subscribing to events, and reading state.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::{RwLock, broadcast, mpsc, oneshot};
use tokio::task::AbortHandle;
use ulid::Ulid;

use crate::card::{CardPhase, CardTimer, FlightOrigin, TapResponse, TapTarget};
use crate::catalog::Catalog;
use crate::command::Command;
use crate::deck::{Dealer, DeckError};
use crate::event::{Event, EventPayload};
use crate::render::{Stage, describe_table};
use crate::session::Session;
use crate::timing::{TableConfig, Timings, TimingsError};

/// Errors returned for rejected commands. A rejected command changes nothing.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("hand is locked until a shuffle completes")]
    HandLocked,

    #[error("a shuffle is in flight")]
    ShuffleInFlight,

    #[error("card {index} is already selected")]
    SelectionExists { index: usize },

    #[error("card index {index} is out of range for a hand of {len}")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("no card is selected")]
    NothingSelected,

    #[error("card {index} is busy ({phase:?})")]
    CardBusy { index: usize, phase: CardPhase },

    #[error("a reading is in progress; request a new reading first")]
    ReadingInProgress,

    #[error("invalid table config: {0}")]
    Config(#[from] TimingsError),

    #[error("deck error: {0}")]
    Deck(#[from] DeckError),

    #[error("actor channel closed")]
    ChannelClosed,
}

/// Message type sent through the command channel: a command paired with
/// a oneshot sender for the response.
type CommandMessage = (Command, oneshot::Sender<Result<Vec<Event>, SessionError>>);

/// Timers the actor schedules for itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum TableTimer {
    ShuffleMidpoint { epoch: u64 },
    ShuffleEnd { epoch: u64 },
    Card { instance_id: Ulid, timer: CardTimer },
}

/// Pending timers, each a sleeping task that posts back to the actor.
/// Dropping the set aborts every pending timer.
struct TimerSet {
    tx: mpsc::UnboundedSender<TableTimer>,
    pending: HashMap<TableTimer, AbortHandle>,
}

impl TimerSet {
    fn new(tx: mpsc::UnboundedSender<TableTimer>) -> Self {
        Self {
            tx,
            pending: HashMap::new(),
        }
    }

    fn schedule(&mut self, timer: TableTimer, after: Duration) {
        let tx = self.tx.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            // The actor may already be gone; nothing to deliver to then.
            let _ = tx.send(timer);
        });
        if let Some(previous) = self.pending.insert(timer, task.abort_handle()) {
            previous.abort();
        }
    }

    fn fired(&mut self, timer: &TableTimer) {
        self.pending.remove(timer);
    }

    /// Abort every timer owned by a card. Used when the hand is replaced.
    fn cancel_card_timers(&mut self) {
        self.pending.retain(|timer, handle| {
            let owned_by_card = matches!(timer, TableTimer::Card { .. });
            if owned_by_card {
                handle.abort();
            }
            !owned_by_card
        });
    }
}

impl Drop for TimerSet {
    fn drop(&mut self) {
        for (_, handle) in self.pending.drain() {
            handle.abort();
        }
    }
}

/// Public handle for interacting with a TableActor. Supports sending commands,
/// subscribing to events, and reading the current state. Dropping every
/// handle shuts the actor down and cancels its pending timers.
pub struct TableHandle {
    cmd_tx: mpsc::Sender<CommandMessage>,
    event_tx: broadcast::Sender<Event>,
    state: Arc<RwLock<Session>>,
    pub session_id: Ulid,
}

impl TableHandle {
    /// Send a command to the actor and await the resulting events.
    pub async fn send_command(&self, cmd: Command) -> Result<Vec<Event>, SessionError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send((cmd, tx))
            .await
            .map_err(|_| SessionError::ChannelClosed)?;
        rx.await.map_err(|_| SessionError::ChannelClosed)?
    }

    pub async fn start_shuffle(&self) -> Result<Vec<Event>, SessionError> {
        self.send_command(Command::StartShuffle).await
    }

    pub async fn select_card(&self, index: usize) -> Result<Vec<Event>, SessionError> {
        self.send_command(Command::SelectCard { index }).await
    }

    pub async fn tap_card(&self, index: usize, target: TapTarget) -> Result<Vec<Event>, SessionError> {
        self.send_command(Command::TapCard { index, target }).await
    }

    pub async fn request_new_reading(&self) -> Result<Vec<Event>, SessionError> {
        self.send_command(Command::RequestNewReading).await
    }

    /// Subscribe to the event broadcast stream.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Get a read-only reference to the shared state.
    pub async fn read_state(&self) -> tokio::sync::RwLockReadGuard<'_, Session> {
        self.state.read().await
    }
}

/// Spawn a new TableActor task and return the handle for interacting with it.
/// The initial hand is dealt immediately; the session starts locked.
pub fn spawn(
    config: TableConfig,
    catalog: Arc<Catalog>,
    stage: Arc<dyn Stage>,
) -> Result<TableHandle, SessionError> {
    config.validate()?;
    let mut dealer = Dealer::new(catalog, config.hand_size, config.seed)?;
    let state = Arc::new(RwLock::new(Session::new(dealer.draw())));

    let (cmd_tx, cmd_rx) = mpsc::channel::<CommandMessage>(64);
    let (event_tx, _) = broadcast::channel::<Event>(256);
    let (timer_tx, timer_rx) = mpsc::unbounded_channel();
    let session_id = Ulid::new();

    let handle = TableHandle {
        cmd_tx,
        event_tx: event_tx.clone(),
        state: Arc::clone(&state),
        session_id,
    };

    let actor = TableActor {
        state,
        cmd_rx,
        timer_rx,
        timers: TimerSet::new(timer_tx),
        event_tx,
        dealer,
        stage,
        timings: config.timings,
        next_event_id: 1,
        session_id,
    };

    tokio::spawn(actor.run());

    Ok(handle)
}

/// The internal actor that processes commands and timers in one loop.
struct TableActor {
    state: Arc<RwLock<Session>>,
    cmd_rx: mpsc::Receiver<CommandMessage>,
    timer_rx: mpsc::UnboundedReceiver<TableTimer>,
    timers: TimerSet,
    event_tx: broadcast::Sender<Event>,
    dealer: Dealer,
    stage: Arc<dyn Stage>,
    timings: Timings,
    next_event_id: u64,
    session_id: Ulid,
}

impl TableActor {
    async fn run(mut self) {
        self.render().await;

        loop {
            tokio::select! {
                msg = self.cmd_rx.recv() => {
                    let Some((cmd, reply_tx)) = msg else { break };
                    let result = self.process_command(cmd).await;
                    // Ignore send error; the caller may have dropped their receiver
                    let _ = reply_tx.send(result);
                }
                Some(timer) = self.timer_rx.recv() => {
                    self.process_timer(timer).await;
                }
            }
        }

        tracing::debug!(session_id = %self.session_id, "table actor shutting down");
    }

    async fn process_command(&mut self, cmd: Command) -> Result<Vec<Event>, SessionError> {
        let payloads = self.command_to_payloads(cmd).await?;
        Ok(self.commit(payloads).await)
    }

    /// Convert a command into event payloads, validating against the current
    /// state. Commands that are legal but have nothing to do produce no
    /// payloads.
    async fn command_to_payloads(&self, cmd: Command) -> Result<Vec<EventPayload>, SessionError> {
        let state = self.state.read().await;

        let payloads = match cmd {
            Command::StartShuffle => {
                if state.shuffle_in_flight {
                    tracing::debug!("shuffle already in flight, ignoring");
                    Vec::new()
                } else if state.selected_index.is_some() {
                    return Err(SessionError::ReadingInProgress);
                } else {
                    vec![EventPayload::ShuffleStarted {
                        epoch: state.shuffle_epoch + 1,
                    }]
                }
            }

            Command::SelectCard { index } => vec![self.selection(&state, index)?],

            Command::TapCard { index, target } => {
                let len = state.hand.len();
                let slot = state
                    .hand
                    .get(index)
                    .ok_or(SessionError::IndexOutOfRange { index, len })?;

                match state.selected_index {
                    None if target == TapTarget::Card => vec![self.selection(&state, index)?],
                    Some(selected) if selected == index => match slot.machine.tap_response(target) {
                        TapResponse::RevealDetail => vec![EventPayload::DetailRevealStarted {
                            index,
                            instance_id: slot.card.instance_id,
                        }],
                        response => {
                            tracing::debug!(index, ?response, "tap on selected card dropped");
                            Vec::new()
                        }
                    },
                    _ => {
                        tracing::debug!(index, "tap ignored");
                        Vec::new()
                    }
                }
            }

            Command::RequestNewReading => {
                let index = state.selected_index.ok_or(SessionError::NothingSelected)?;
                let slot = state
                    .hand
                    .get(index)
                    .ok_or(SessionError::NothingSelected)?;
                let phase = slot.machine.phase();
                if phase != CardPhase::DetailShown {
                    return Err(SessionError::CardBusy { index, phase });
                }
                vec![EventPayload::ReturnStarted {
                    index,
                    instance_id: slot.card.instance_id,
                }]
            }
        };

        Ok(payloads)
    }

    /// Validate a selection and capture the card's geometry before it leaves
    /// the fan.
    fn selection(&self, state: &Session, index: usize) -> Result<EventPayload, SessionError> {
        if state.shuffle_in_flight {
            return Err(SessionError::ShuffleInFlight);
        }
        if !state.hand_unlocked {
            return Err(SessionError::HandLocked);
        }
        if let Some(selected) = state.selected_index {
            return Err(SessionError::SelectionExists { index: selected });
        }
        let len = state.hand.len();
        let slot = state
            .hand
            .get(index)
            .ok_or(SessionError::IndexOutOfRange { index, len })?;
        let phase = slot.machine.phase();
        if phase != CardPhase::Idle {
            return Err(SessionError::CardBusy { index, phase });
        }

        let instance_id = slot.card.instance_id;
        let viewport = self.stage.viewport();
        let flight_origin = self
            .stage
            .capture_geometry(instance_id)
            .map(|geometry| FlightOrigin::from_geometry(&geometry, &viewport));
        if flight_origin.is_none() {
            tracing::debug!(index, "no geometry for selected card, flight starts centred");
        }

        Ok(EventPayload::CardSelected {
            index,
            instance_id,
            flight_origin,
            payload: slot.card.payload.clone(),
        })
    }

    async fn process_timer(&mut self, timer: TableTimer) {
        self.timers.fired(&timer);

        let payloads = {
            let state = self.state.read().await;
            match timer {
                TableTimer::ShuffleMidpoint { epoch } => {
                    if state.shuffle_in_flight && state.shuffle_epoch == epoch {
                        vec![EventPayload::HandDrawn {
                            epoch,
                            hand: self.dealer.draw(),
                        }]
                    } else {
                        tracing::warn!(epoch, "stale shuffle midpoint timer");
                        Vec::new()
                    }
                }

                TableTimer::ShuffleEnd { epoch } => {
                    if state.shuffle_in_flight && state.shuffle_epoch == epoch {
                        vec![EventPayload::ShuffleCompleted { epoch }]
                    } else {
                        tracing::warn!(epoch, "stale shuffle end timer");
                        Vec::new()
                    }
                }

                TableTimer::Card { instance_id, timer } => {
                    let Some(index) = state.index_of(instance_id) else {
                        tracing::debug!(%instance_id, "timer for a card no longer in the hand");
                        return;
                    };
                    let phase = state.hand[index].machine.phase();
                    match (timer, phase) {
                        (CardTimer::FlightLanded, CardPhase::Selecting) => {
                            vec![EventPayload::SelectionFlightCompleted { index, instance_id }]
                        }
                        (CardTimer::DetailFlipped, CardPhase::RevealingDetail) => {
                            vec![EventPayload::DetailRevealCompleted { index, instance_id }]
                        }
                        (CardTimer::ReturnLanded, CardPhase::Returning) => vec![
                            EventPayload::ReturnCompleted { index, instance_id },
                            EventPayload::SessionLocked,
                        ],
                        (timer, phase) => {
                            tracing::warn!(index, ?timer, ?phase, "card timer does not match phase");
                            Vec::new()
                        }
                    }
                }
            }
        };

        self.commit(payloads).await;
    }

    /// Stamp payloads into events, apply them, schedule follow-up timers,
    /// broadcast and re-render.
    async fn commit(&mut self, payloads: Vec<EventPayload>) -> Vec<Event> {
        if payloads.is_empty() {
            return Vec::new();
        }

        let now = Utc::now();
        let events: Vec<Event> = payloads
            .into_iter()
            .map(|payload| {
                let event_id = self.next_event_id;
                self.next_event_id += 1;
                Event {
                    event_id,
                    session_id: self.session_id,
                    timestamp: now,
                    payload,
                }
            })
            .collect();

        // Apply events to state under write lock
        {
            let mut state = self.state.write().await;
            for event in &events {
                state.apply(event);
                schedule_follow_up(&mut self.timers, &self.timings, &state, &event.payload);
            }
        }

        // Broadcast events to subscribers
        for event in &events {
            log_milestone(&event.payload);
            // Ignore broadcast errors (no active subscribers is fine)
            let _ = self.event_tx.send(event.clone());
        }

        self.render().await;
        events
    }

    async fn render(&self) {
        let state = self.state.read().await;
        self.stage.render(&describe_table(&state));
    }
}

/// Start the timers an event leaves pending.
fn schedule_follow_up(timers: &mut TimerSet, timings: &Timings, state: &Session, payload: &EventPayload) {
    match payload {
        EventPayload::ShuffleStarted { epoch } => {
            let epoch = *epoch;
            timers.schedule(TableTimer::ShuffleMidpoint { epoch }, timings.shuffle_midpoint);
            timers.schedule(TableTimer::ShuffleEnd { epoch }, timings.shuffle_end);
        }

        EventPayload::HandDrawn { .. } => timers.cancel_card_timers(),

        EventPayload::CardSelected { index, instance_id, .. }
        | EventPayload::DetailRevealStarted { index, instance_id }
        | EventPayload::ReturnStarted { index, instance_id } => {
            let pending = state
                .hand
                .get(*index)
                .and_then(|slot| slot.machine.pending_timer(timings));
            if let Some((timer, after)) = pending {
                timers.schedule(
                    TableTimer::Card {
                        instance_id: *instance_id,
                        timer,
                    },
                    after,
                );
            }
        }

        _ => {}
    }
}

fn log_milestone(payload: &EventPayload) {
    match payload {
        EventPayload::ShuffleCompleted { epoch } => tracing::info!(epoch, "shuffle complete, hand unlocked"),
        EventPayload::CardSelected { index, .. } => tracing::info!(index, "card selected"),
        EventPayload::DetailRevealCompleted { index, .. } => tracing::info!(index, "prediction revealed"),
        EventPayload::SessionLocked => tracing::info!("card returned, table locked"),
        other => tracing::debug!(?other, "table event"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::card::ActionControl;
    use crate::session::SessionPhase;
    use crate::testing::RecordingStage;
    use tokio::sync::mpsc::error::TryRecvError;

    const AFTER_SHUFFLE: Duration = Duration::from_millis(2100);
    const AFTER_FLIGHT: Duration = Duration::from_millis(650);
    const AFTER_FLIP: Duration = Duration::from_millis(950);
    const AFTER_RETURN: Duration = Duration::from_millis(1550);

    fn table(stage: Arc<RecordingStage>) -> TableHandle {
        let config = TableConfig {
            seed: Some(5),
            ..TableConfig::default()
        };
        spawn(config, Arc::new(Catalog::major_arcana()), stage).unwrap()
    }

    async fn shuffled(stage: Arc<RecordingStage>) -> TableHandle {
        let handle = table(stage);
        handle.start_shuffle().await.unwrap();
        tokio::time::sleep(AFTER_SHUFFLE).await;
        handle
    }

    async fn revealed(handle: &TableHandle, index: usize) {
        handle.select_card(index).await.unwrap();
        tokio::time::sleep(AFTER_FLIGHT).await;
        handle.tap_card(index, TapTarget::Card).await.unwrap();
        tokio::time::sleep(AFTER_FLIP).await;
    }

    #[tokio::test(start_paused = true)]
    async fn selection_is_rejected_before_shuffle() {
        let handle = table(Arc::new(RecordingStage::fixed()));
        let err = handle.select_card(0).await.unwrap_err();
        assert!(matches!(err, SessionError::HandLocked), "got: {err}");
        assert_eq!(handle.read_state().await.phase(), SessionPhase::Locked);
    }

    #[tokio::test(start_paused = true)]
    async fn shuffle_swaps_at_midpoint_and_unlocks_at_end() {
        let handle = table(Arc::new(RecordingStage::fixed()));
        let dealt: Vec<Ulid> = handle
            .read_state()
            .await
            .hand
            .iter()
            .map(|s| s.card.instance_id)
            .collect();

        let events = handle.start_shuffle().await.unwrap();
        assert!(matches!(events[0].payload, EventPayload::ShuffleStarted { epoch: 1 }));

        tokio::time::sleep(Duration::from_millis(999)).await;
        {
            let state = handle.read_state().await;
            assert_eq!(state.phase(), SessionPhase::Shuffling);
            assert_eq!(state.hand[0].card.instance_id, dealt[0], "no swap before midpoint");
        }

        tokio::time::sleep(Duration::from_millis(2)).await;
        {
            let state = handle.read_state().await;
            assert!(state.cards_changed);
            assert!(!state.hand_unlocked, "no unlock before the end");
            assert!(dealt.iter().all(|id| state.index_of(*id).is_none()));
        }

        tokio::time::sleep(Duration::from_millis(1100)).await;
        let state = handle.read_state().await;
        assert_eq!(state.phase(), SessionPhase::Unlocked);
        assert_eq!(state.hand.len(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_shuffle_is_ignored() {
        let handle = table(Arc::new(RecordingStage::fixed()));
        let mut rx = handle.subscribe();

        handle.start_shuffle().await.unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;
        let second = handle.start_shuffle().await.unwrap();
        assert!(second.is_empty());

        tokio::time::sleep(AFTER_SHUFFLE).await;
        let mut draws = 0;
        while let Ok(event) = rx.try_recv() {
            if let EventPayload::HandDrawn { epoch, .. } = event.payload {
                assert_eq!(epoch, 1);
                draws += 1;
            }
        }
        assert_eq!(draws, 1);
        assert_eq!(handle.read_state().await.phase(), SessionPhase::Unlocked);
    }

    #[tokio::test(start_paused = true)]
    async fn only_one_selection_succeeds() {
        let handle = shuffled(Arc::new(RecordingStage::fixed())).await;

        handle.select_card(2).await.unwrap();
        let err = handle.select_card(3).await.unwrap_err();
        assert!(matches!(err, SessionError::SelectionExists { index: 2 }), "got: {err}");

        let state = handle.read_state().await;
        assert_eq!(state.active_card_count(), 1);
        assert_eq!(state.hand[3].machine.phase(), CardPhase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn selected_card_flies_from_captured_geometry() {
        let stage = Arc::new(RecordingStage::fixed());
        let handle = shuffled(Arc::clone(&stage)).await;

        let events = handle.select_card(1).await.unwrap();
        match &events[0].payload {
            EventPayload::CardSelected { flight_origin, .. } => {
                let origin = flight_origin.expect("geometry was captured");
                assert_eq!(origin.offset_x, 160.0 - 500.0);
                assert_eq!(origin.offset_y, 600.0 - 200.0);
                assert_eq!(origin.rotation_deg, -10.0);
            }
            other => panic!("expected CardSelected, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn reading_reveals_the_payload_bound_at_draw_time() {
        let stage = Arc::new(RecordingStage::fixed());
        let handle = shuffled(Arc::clone(&stage)).await;
        revealed(&handle, 2).await;

        let state = handle.read_state().await;
        let slot = &state.hand[2];
        assert_eq!(slot.machine.phase(), CardPhase::DetailShown);
        assert_eq!(slot.machine.detail(), Some(&slot.card.payload));
        let catalog = Catalog::major_arcana();
        assert_eq!(&slot.card.payload, catalog.payload_for(slot.card.catalog_index));
        for (i, other) in state.hand.iter().enumerate() {
            assert_eq!(other.machine.not_selected(), i != 2);
        }

        let frame = stage.last_frame().expect("stage was rendered");
        assert!(frame.cards[2].detail_visible());
        assert!(frame.cards[0].classes.contains(&"not-selected"));
    }

    #[tokio::test(start_paused = true)]
    async fn taps_during_animations_and_on_controls_are_dropped() {
        let handle = shuffled(Arc::new(RecordingStage::fixed())).await;

        handle.select_card(0).await.unwrap();
        let mid_flight = handle.tap_card(0, TapTarget::Card).await.unwrap();
        assert!(mid_flight.is_empty());

        tokio::time::sleep(AFTER_FLIGHT).await;
        let control = handle
            .tap_card(0, TapTarget::Control(ActionControl::Share))
            .await
            .unwrap();
        assert!(control.is_empty());
        assert_eq!(handle.read_state().await.hand[0].machine.phase(), CardPhase::Revealed);

        handle.tap_card(0, TapTarget::Card).await.unwrap();
        let mid_flip = handle.tap_card(0, TapTarget::Card).await.unwrap();
        assert!(mid_flip.is_empty());
        assert_eq!(
            handle.read_state().await.hand[0].machine.phase(),
            CardPhase::RevealingDetail
        );
    }

    #[tokio::test(start_paused = true)]
    async fn tapping_an_idle_card_selects_it() {
        let handle = shuffled(Arc::new(RecordingStage::fixed())).await;
        let events = handle.tap_card(4, TapTarget::Card).await.unwrap();
        assert!(matches!(events[0].payload, EventPayload::CardSelected { index: 4, .. }));

        let ignored = handle.tap_card(1, TapTarget::Card).await.unwrap();
        assert!(ignored.is_empty(), "taps on other cards do nothing once one is selected");
    }

    #[tokio::test(start_paused = true)]
    async fn new_reading_returns_table_to_locked() {
        let handle = shuffled(Arc::new(RecordingStage::fixed())).await;
        revealed(&handle, 3).await;
        let mut rx = handle.subscribe();

        handle.request_new_reading().await.unwrap();
        assert_eq!(handle.read_state().await.phase(), SessionPhase::ReturningToLocked);

        tokio::time::sleep(Duration::from_millis(1400)).await;
        assert_eq!(handle.read_state().await.selected_index, Some(3));

        tokio::time::sleep(Duration::from_millis(150)).await;
        let state = handle.read_state().await;
        assert_eq!(state.phase(), SessionPhase::Locked);
        assert_eq!(state.selected_index, None);
        assert_eq!(state.active_card_count(), 0);
        assert!(state.hand.iter().all(|s| !s.machine.not_selected()));
        drop(state);

        let kinds: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|e| e.payload)
            .collect();
        assert!(matches!(kinds[0], EventPayload::ReturnStarted { index: 3, .. }));
        assert!(matches!(kinds[1], EventPayload::ReturnCompleted { index: 3, .. }));
        assert_eq!(kinds[2], EventPayload::SessionLocked);

        let err = handle.select_card(0).await.unwrap_err();
        assert!(matches!(err, SessionError::HandLocked));
    }

    #[tokio::test(start_paused = true)]
    async fn new_reading_needs_a_revealed_selection() {
        let handle = shuffled(Arc::new(RecordingStage::fixed())).await;
        assert!(matches!(
            handle.request_new_reading().await.unwrap_err(),
            SessionError::NothingSelected
        ));

        handle.select_card(1).await.unwrap();
        assert!(matches!(
            handle.request_new_reading().await.unwrap_err(),
            SessionError::CardBusy {
                index: 1,
                phase: CardPhase::Selecting
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn shuffle_is_refused_mid_reading() {
        let handle = shuffled(Arc::new(RecordingStage::fixed())).await;
        handle.select_card(0).await.unwrap();
        assert!(matches!(
            handle.start_shuffle().await.unwrap_err(),
            SessionError::ReadingInProgress
        ));
    }

    fn return_timer() -> TableTimer {
        TableTimer::Card {
            instance_id: Ulid::new(),
            timer: CardTimer::ReturnLanded,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_timer_set_never_delivers_pending_timers() {
        let (tx, mut timer_rx) = mpsc::unbounded_channel();
        let mut timers = TimerSet::new(tx);
        timers.schedule(return_timer(), Duration::from_millis(1500));

        drop(timers);
        tokio::time::sleep(AFTER_RETURN).await;

        assert!(matches!(
            timer_rx.try_recv(),
            Err(TryRecvError::Empty | TryRecvError::Disconnected)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_card_timers_spares_shuffle_timers() {
        let (tx, mut timer_rx) = mpsc::unbounded_channel();
        let mut timers = TimerSet::new(tx);
        timers.schedule(return_timer(), Duration::from_millis(1500));
        timers.schedule(TableTimer::ShuffleEnd { epoch: 1 }, Duration::from_millis(1500));

        timers.cancel_card_timers();
        tokio::time::sleep(AFTER_RETURN).await;

        assert_eq!(timer_rx.try_recv(), Ok(TableTimer::ShuffleEnd { epoch: 1 }));
        assert_eq!(timer_rx.try_recv(), Err(TryRecvError::Empty));
    }

    #[tokio::test(start_paused = true)]
    async fn live_timer_set_delivers_after_the_delay() {
        let (tx, mut timer_rx) = mpsc::unbounded_channel();
        let mut timers = TimerSet::new(tx);
        let timer = return_timer();
        timers.schedule(timer, Duration::from_millis(1500));

        tokio::time::sleep(Duration::from_millis(1400)).await;
        assert_eq!(timer_rx.try_recv(), Err(TryRecvError::Empty));
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(timer_rx.try_recv(), Ok(timer));
    }

    #[tokio::test(start_paused = true)]
    async fn out_of_range_index_is_rejected() {
        let handle = shuffled(Arc::new(RecordingStage::fixed())).await;
        assert!(matches!(
            handle.select_card(6).await.unwrap_err(),
            SessionError::IndexOutOfRange { index: 6, len: 6 }
        ));
        assert!(matches!(
            handle.tap_card(9, TapTarget::Card).await.unwrap_err(),
            SessionError::IndexOutOfRange { index: 9, len: 6 }
        ));
    }

    #[test]
    fn spawn_rejects_bad_config() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(async {
            let config = TableConfig {
                hand_size: 30,
                ..TableConfig::default()
            };
            let result = spawn(
                config,
                Arc::new(Catalog::major_arcana()),
                Arc::new(RecordingStage::fixed()),
            );
            assert!(matches!(result, Err(SessionError::Deck(_))));
        });
    }
}
