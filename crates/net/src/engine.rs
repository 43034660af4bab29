//! Session engine
//!
//! One task owns the room registry and handles every event in arrival
//! order: player messages, disconnects, timer fires and storage replies.
//! Handlers never await, so each one runs against a room without
//! interleaving. Timer events carry the round and phase they were armed
//! for; when the room has moved on they are dropped, which makes a timer
//! racing a player action into the same transition harmless.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use chrono::Utc;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, warn};

use memecard_core::invariants::assert_room_invariants;
use memecard_core::{
    Card, CardSource, ConnId, Error as CoreError, GameConfig, JoinOutcome, Player,
    Result as CoreResult, Room, RoomRegistry, RoomSnapshot, RoomStatus, RoundPhase,
    SubmittedCard,
};

use crate::error::{Error, Result};
use crate::protocol::{ClientMessage, PlayerInfo, ResultEntry, RevealedSubmission, ServerMessage};
use crate::sync::SyncHandle;
use crate::timers::{self, RoomTimers, TimerHandle};

/// Outbound queue of one connection
pub type Outbound = UnboundedSender<ServerMessage>;

const TICK: Duration = Duration::from_secs(1);

/// Round and phase a timer was armed for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerToken {
    pub round: u32,
    pub phase: RoundPhase,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// One second of countdown in Submitting or Voting
    Tick,
    RevealNext,
    BeginVoting,
    NextRound,
}

/// What to do once a room has been loaded from storage
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingAction {
    Join { conn: ConnId, name: String },
    Provision { conn: ConnId, name: String },
}

impl PendingAction {
    fn conn(&self) -> ConnId {
        match self {
            PendingAction::Join { conn, .. } | PendingAction::Provision { conn, .. } => *conn,
        }
    }
}

/// Everything the engine reacts to
#[derive(Debug)]
pub enum Event {
    Connected {
        conn: ConnId,
        tx: Outbound,
    },
    Disconnected(ConnId),
    Inbound {
        conn: ConnId,
        msg: ClientMessage,
    },
    Timer {
        code: String,
        token: TimerToken,
        kind: TimerKind,
    },
    GraceExpired {
        code: String,
        host_name: String,
        generation: u64,
    },
    CloseRoom {
        code: String,
    },
    Rehydrated {
        code: String,
        snapshot: Option<RoomSnapshot>,
        action: PendingAction,
    },
    Sweep,
    Shutdown,
}

/// Cloneable handle for feeding the engine
#[derive(Debug, Clone)]
pub struct EngineHandle {
    tx: UnboundedSender<Event>,
}

impl EngineHandle {
    /// Register a connection; it is greeted with its id
    pub fn connect(&self, conn: ConnId, tx: Outbound) -> Result<()> {
        self.post(Event::Connected { conn, tx })
    }

    pub fn send(&self, conn: ConnId, msg: ClientMessage) -> Result<()> {
        self.post(Event::Inbound { conn, msg })
    }

    pub fn disconnect(&self, conn: ConnId) -> Result<()> {
        self.post(Event::Disconnected(conn))
    }

    /// Run the staleness sweep now
    pub fn sweep(&self) -> Result<()> {
        self.post(Event::Sweep)
    }

    pub fn shutdown(&self) -> Result<()> {
        self.post(Event::Shutdown)
    }

    fn post(&self, event: Event) -> Result<()> {
        self.tx.send(event).map_err(|_| Error::EngineStopped)
    }
}

/// Live connections by id
#[derive(Debug, Default)]
struct Outbox {
    conns: HashMap<ConnId, Outbound>,
}

impl Outbox {
    fn register(&mut self, conn: ConnId, tx: Outbound) {
        self.conns.insert(conn, tx);
    }

    fn unregister(&mut self, conn: ConnId) {
        self.conns.remove(&conn);
    }

    fn contains(&self, conn: ConnId) -> bool {
        self.conns.contains_key(&conn)
    }

    fn send(&self, conn: ConnId, msg: ServerMessage) {
        if let Some(tx) = self.conns.get(&conn) {
            if tx.send(msg).is_err() {
                debug!(conn = %conn, "Dropping message for closed connection");
            }
        }
    }

    /// Every connected member of `room`
    fn broadcast(&self, room: &Room, msg: &ServerMessage) {
        for conn in room.connections() {
            self.send(conn, msg.clone());
        }
    }

    fn broadcast_except(&self, room: &Room, except: ConnId, msg: &ServerMessage) {
        for conn in room.connections().filter(|&c| c != except) {
            self.send(conn, msg.clone());
        }
    }
}

/// The room session engine. Owns every room; see the module docs.
pub struct Engine {
    config: GameConfig,
    registry: RoomRegistry,
    cards: Box<dyn CardSource>,
    sync: SyncHandle,
    outbox: Outbox,
    timers: HashMap<String, RoomTimers>,
    /// Rooms announced as closing after their host left
    closing: HashSet<String>,
    rng: StdRng,
    tx: UnboundedSender<Event>,
}

impl Engine {
    pub fn new(
        config: GameConfig,
        cards: Box<dyn CardSource>,
        sync: SyncHandle,
    ) -> (Self, EngineHandle, UnboundedReceiver<Event>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let engine = Self {
            config,
            registry: RoomRegistry::new(),
            cards,
            sync,
            outbox: Outbox::default(),
            timers: HashMap::new(),
            closing: HashSet::new(),
            rng: StdRng::from_entropy(),
            tx: tx.clone(),
        };
        (engine, EngineHandle { tx }, rx)
    }

    pub fn registry(&self) -> &RoomRegistry {
        &self.registry
    }

    /// Process events until shutdown. Returns the engine so its final
    /// state can be inspected.
    pub async fn run(mut self, mut rx: UnboundedReceiver<Event>) -> Self {
        let _sweep = timers::repeat(self.config.sweep_interval(), self.tx.clone(), || {
            Event::Sweep
        });
        info!("Engine started");

        while let Some(event) = rx.recv().await {
            if matches!(event, Event::Shutdown) {
                break;
            }
            self.handle(event);
        }

        self.timers.clear();
        info!(rooms = self.registry.len(), "Engine stopped");
        self
    }

    /// Apply one event
    pub fn handle(&mut self, event: Event) {
        match event {
            Event::Connected { conn, tx } => {
                debug!(conn = %conn, "Connection registered");
                self.outbox.register(conn, tx);
                self.outbox
                    .send(conn, ServerMessage::Connected { conn_id: conn });
            }
            Event::Disconnected(conn) => self.on_disconnect(conn),
            Event::Inbound { conn, msg } => self.on_message(conn, msg),
            Event::Timer { code, token, kind } => self.on_timer(&code, token, kind),
            Event::GraceExpired {
                code,
                host_name,
                generation,
            } => self.on_grace_expired(&code, &host_name, generation),
            Event::CloseRoom { code } => self.close_room(&code),
            Event::Rehydrated {
                code,
                snapshot,
                action,
            } => self.on_rehydrated(code, snapshot, action),
            Event::Sweep => self.sweep(),
            Event::Shutdown => {}
        }
    }

    fn on_message(&mut self, conn: ConnId, msg: ClientMessage) {
        let result = match msg {
            ClientMessage::CreateRoom { player_name } => self.create_room(conn, player_name),
            ClientMessage::JoinRoom {
                room_id,
                player_name,
            } => self.join_room(conn, room_id, player_name),
            ClientMessage::StartGame { room_id } => self.start_game(conn, &room_id),
            ClientMessage::StopGame { room_id } => self.stop_game(conn, &room_id),
            ClientMessage::SubmitCard { room_id, card_id } => {
                // Bad submissions change nothing and get no reply
                if let Err(e) = self.submit_card(conn, &room_id, &card_id) {
                    debug!(conn = %conn, room = %room_id, error = %e, "Submission ignored");
                }
                Ok(())
            }
            ClientMessage::VoteCard {
                room_id,
                target_player_id,
            } => self.vote(conn, &room_id, target_player_id),
            ClientMessage::KickPlayer {
                room_id,
                target_name,
            } => self.kick(conn, &room_id, &target_name),
            ClientMessage::LeaveRoom { room_id } => self.leave(conn, &room_id),
            ClientMessage::ChatMessage { room_id, text } => self.chat(conn, &room_id, text),
            ClientMessage::ProvisionRoom { player_name } => self.provision_room(conn, player_name),
            ClientMessage::ProvisionJoin {
                room_id,
                player_name,
            } => self.provision_join(conn, room_id, player_name),
            ClientMessage::Ping => {
                self.outbox.send(conn, ServerMessage::Pong);
                Ok(())
            }
        };

        if let Err(e) = result {
            self.reject(conn, e);
        }
    }

    /// Report a failed action to the actor only
    fn reject(&self, conn: ConnId, error: CoreError) {
        if error.is_precondition() {
            debug!(conn = %conn, error = %error, "Action rejected");
            self.outbox.send(conn, ServerMessage::error(error.to_string()));
        } else {
            warn!(conn = %conn, error = %error, "Action failed");
            self.outbox
                .send(conn, ServerMessage::error("Something went wrong, please try again"));
        }
    }

    // -- membership --

    fn create_room(&mut self, conn: ConnId, name: String) -> CoreResult<()> {
        self.ensure_unseated(conn)?;

        let code = self.registry.generate_code(&mut self.rng);
        let room = Room::new(
            code.clone(),
            Player::host(name, Some(conn)),
            self.config.max_players,
            self.config.win_score,
        );
        let room = self.registry.create(room)?;
        self.outbox.send(
            conn,
            ServerMessage::RoomCreated {
                room_id: code.clone(),
                players: PlayerInfo::list(room),
            },
        );

        info!(room = %code, conn = %conn, "Room created");
        self.persist(&code);
        Ok(())
    }

    fn join_room(&mut self, conn: ConnId, code: String, name: String) -> CoreResult<()> {
        self.ensure_unseated(conn)?;
        if self.closing.contains(&code) {
            return Err(CoreError::RoomNotFound(code));
        }

        if self.registry.contains(&code) {
            self.attach(conn, &code, &name)
        } else {
            self.rehydrate(code, PendingAction::Join { conn, name });
            Ok(())
        }
    }

    fn ensure_unseated(&self, conn: ConnId) -> CoreResult<()> {
        match self.registry.room_of(conn) {
            Some(code) => Err(CoreError::AlreadyInRoom(code.to_string())),
            None => Ok(()),
        }
    }

    /// Seat `conn` under `name` in a resident room
    fn attach(&mut self, conn: ConnId, code: &str, name: &str) -> CoreResult<()> {
        let room = self
            .registry
            .get_mut(code)
            .ok_or_else(|| CoreError::RoomNotFound(code.to_string()))?;
        let outcome = room.join(name, conn)?;

        self.outbox.broadcast(
            room,
            &ServerMessage::PlayerJoined {
                room_id: code.to_string(),
                players: PlayerInfo::list(room),
                new_player: name.to_string(),
            },
        );

        if let JoinOutcome::Reattached { mid_game } = outcome {
            if mid_game {
                self.outbox.send(conn, phase_snapshot(room, conn));
            }
            if room.is_host(conn) {
                let slots = self.timers.entry(code.to_string()).or_default();
                if slots.grace.take().is_some() {
                    info!(room = %code, host = %name, "Host reconnected within grace window");
                }
            }
        }

        self.persist(code);
        Ok(())
    }

    /// Load a room from storage, then carry on with `action`
    fn rehydrate(&self, code: String, action: PendingAction) {
        debug!(room = %code, "Room not resident; loading from storage");
        let reply = self.sync.load(&code);
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let snapshot = reply.await.unwrap_or(None);
            let _ = tx.send(Event::Rehydrated {
                code,
                snapshot,
                action,
            });
        });
    }

    fn on_rehydrated(&mut self, code: String, snapshot: Option<RoomSnapshot>, action: PendingAction) {
        let conn = action.conn();

        let Some(snapshot) = snapshot else {
            self.reject(conn, CoreError::RoomNotFound(code));
            return;
        };
        if self.closing.contains(&code) {
            self.reject(conn, CoreError::RoomNotFound(code));
            return;
        }

        self.registry.rehydrate(snapshot);

        let result = match action {
            PendingAction::Join { conn, name } => {
                if !self.outbox.contains(conn) {
                    debug!(room = %code, conn = %conn, "Connection left while room was loading");
                    return;
                }
                match self.ensure_unseated(conn) {
                    Ok(()) => self.attach(conn, &code, &name),
                    Err(e) => Err(e),
                }
            }
            PendingAction::Provision { conn, name } => self.provision_seat(conn, &code, &name),
        };

        if let Err(e) = result {
            self.reject(conn, e);
        }
    }

    fn leave(&mut self, conn: ConnId, code: &str) -> CoreResult<()> {
        let room = seated(&mut self.registry, &self.closing, conn, code)?;
        if room.is_host(conn) {
            self.host_departed(code);
        } else {
            self.remove_player(code, conn);
        }
        Ok(())
    }

    fn on_disconnect(&mut self, conn: ConnId) {
        self.outbox.unregister(conn);
        debug!(conn = %conn, "Connection closed");

        let Some(code) = self.registry.room_of(conn).map(str::to_string) else {
            return;
        };
        let Some(room) = self.registry.get_mut(&code) else {
            return;
        };

        if self.closing.contains(&code) {
            room.detach(conn);
            return;
        }

        if !room.is_host(conn) {
            self.remove_player(&code, conn);
            return;
        }

        let Some(host) = room.detach(conn) else {
            return;
        };
        let host_name = host.name.clone();
        info!(room = %code, host = %host_name, "Host disconnected; holding seat");

        let grace = self.config.host_grace();
        let tx = self.tx.clone();
        self.timers
            .entry(code.clone())
            .or_default()
            .arm_grace(|generation| {
                timers::once(
                    grace,
                    tx,
                    Event::GraceExpired {
                        code: code.clone(),
                        host_name,
                        generation,
                    },
                )
            });

        self.check_progress(&code);
        self.persist(&code);
    }

    fn on_grace_expired(&mut self, code: &str, host_name: &str, generation: u64) {
        if self.closing.contains(code) {
            return;
        }
        let current = self
            .timers
            .get(code)
            .is_some_and(|slots| slots.is_current_grace(generation));
        if !current {
            debug!(room = %code, generation, "Stale grace expiry ignored");
            return;
        }
        let Some(room) = self.registry.get(code) else {
            return;
        };
        match room.player_by_name(host_name) {
            Some(host) if host.is_host && host.is_pending() => {}
            _ => return,
        }

        info!(room = %code, host = %host_name, "Host did not return");
        self.host_departed(code);
    }

    /// Announce the room is closing and schedule the close
    fn host_departed(&mut self, code: &str) {
        let Some(room) = self.registry.get_mut(code) else {
            return;
        };
        if !self.closing.insert(code.to_string()) {
            return;
        }

        let host_name = room.host().map(|h| h.name.clone()).unwrap_or_default();
        if let Some(conn) = room.host().and_then(|h| h.conn) {
            room.detach(conn);
        }

        self.outbox.broadcast(
            room,
            &ServerMessage::HostLeft {
                host_name: host_name.clone(),
                message: format!("{host_name} left the room. The room will close shortly."),
            },
        );

        let slots = self.timers.entry(code.to_string()).or_default();
        slots.cancel_all();
        slots.close = Some(timers::once(
            self.config.host_close_delay(),
            self.tx.clone(),
            Event::CloseRoom {
                code: code.to_string(),
            },
        ));

        info!(room = %code, host = %host_name, "Host departed; closing room");
    }

    fn close_room(&mut self, code: &str) {
        if !self.closing.contains(code) {
            return;
        }
        if let Some(room) = self.registry.get(code) {
            self.outbox.broadcast(
                room,
                &ServerMessage::KickedToLobby {
                    reason: "host_left".into(),
                    message: "The host left, so the room was closed.".into(),
                },
            );
        }
        self.delete_room(code);
    }

    fn remove_player(&mut self, code: &str, conn: ConnId) {
        let Some(room) = self.registry.get_mut(code) else {
            return;
        };
        let Some(player) = room.remove(conn) else {
            return;
        };

        if room.is_empty() {
            self.delete_room(code);
            return;
        }

        self.outbox.broadcast(
            room,
            &ServerMessage::PlayerLeft {
                player_name: player.name,
                players: PlayerInfo::list(room),
            },
        );
        self.check_progress(code);
        self.persist(code);
    }

    fn kick(&mut self, conn: ConnId, code: &str, target: &str) -> CoreResult<()> {
        let room = seated(&mut self.registry, &self.closing, conn, code)?;
        let kicked = room.kick(conn, target)?;
        let kicked_by = room.player(conn).map(|p| p.name.clone()).unwrap_or_default();

        if let Some(target_conn) = kicked.conn {
            self.outbox.send(
                target_conn,
                ServerMessage::KickedToLobby {
                    reason: "kicked".into(),
                    message: format!("You were removed from the room by {kicked_by}"),
                },
            );
        }
        self.outbox.broadcast(
            room,
            &ServerMessage::PlayerKicked {
                kicked_player_name: kicked.name,
                kicked_by,
                players: PlayerInfo::list(room),
            },
        );

        if room.is_empty() {
            self.delete_room(code);
        } else {
            self.check_progress(code);
            self.persist(code);
        }
        Ok(())
    }

    fn provision_room(&mut self, conn: ConnId, name: String) -> CoreResult<()> {
        let code = self.registry.generate_code(&mut self.rng);
        let room = Room::new(
            code.clone(),
            Player::host(name, None),
            self.config.max_players,
            self.config.win_score,
        );
        let room = self.registry.create(room)?;
        self.outbox.send(
            conn,
            ServerMessage::Provisioned {
                room_id: code.clone(),
                players: PlayerInfo::list(room),
            },
        );

        info!(room = %code, "Room provisioned");
        self.persist(&code);
        Ok(())
    }

    fn provision_join(&mut self, conn: ConnId, code: String, name: String) -> CoreResult<()> {
        if self.closing.contains(&code) {
            return Err(CoreError::RoomNotFound(code));
        }
        if self.registry.contains(&code) {
            self.provision_seat(conn, &code, &name)
        } else {
            self.rehydrate(code, PendingAction::Provision { conn, name });
            Ok(())
        }
    }

    fn provision_seat(&mut self, conn: ConnId, code: &str, name: &str) -> CoreResult<()> {
        let room = self
            .registry
            .get_mut(code)
            .ok_or_else(|| CoreError::RoomNotFound(code.to_string()))?;
        room.provision(name)?;

        let players = PlayerInfo::list(room);
        self.outbox.broadcast(
            room,
            &ServerMessage::PlayerJoined {
                room_id: code.to_string(),
                players: players.clone(),
                new_player: name.to_string(),
            },
        );
        self.outbox.send(
            conn,
            ServerMessage::Provisioned {
                room_id: code.to_string(),
                players,
            },
        );

        self.persist(code);
        Ok(())
    }

    fn chat(&mut self, conn: ConnId, code: &str, text: String) -> CoreResult<()> {
        let room = seated(&mut self.registry, &self.closing, conn, code)?;
        let sender = room.player(conn).map(|p| p.name.clone()).unwrap_or_default();
        self.outbox.broadcast_except(
            room,
            conn,
            &ServerMessage::Chat {
                sender,
                text,
                timestamp: Utc::now(),
            },
        );
        Ok(())
    }

    // -- game flow --

    fn start_game(&mut self, conn: ConnId, code: &str) -> CoreResult<()> {
        let room = seated(&mut self.registry, &self.closing, conn, code)?;
        room.start_game(conn, self.config.min_players)?;

        self.outbox.broadcast(
            room,
            &ServerMessage::GameStarted {
                players: PlayerInfo::list(room),
                status: room.status,
            },
        );

        self.start_round(code);
        self.persist(code);
        Ok(())
    }

    fn stop_game(&mut self, conn: ConnId, code: &str) -> CoreResult<()> {
        let room = seated(&mut self.registry, &self.closing, conn, code)?;
        room.stop_game(conn)?;

        self.outbox.broadcast(
            room,
            &ServerMessage::GameStopped {
                players: PlayerInfo::list(room),
            },
        );
        if let Some(slots) = self.timers.get_mut(code) {
            slots.phase = None;
        }

        self.persist(code);
        Ok(())
    }

    /// Deal and open submissions
    fn start_round(&mut self, code: &str) {
        let Some(room) = self.registry.get_mut(code) else {
            return;
        };
        let Some(deal) = room.deal(self.cards.as_mut(), &self.config) else {
            return;
        };

        let players = PlayerInfo::list(room);
        for player in &room.players {
            if let Some(conn) = player.conn {
                self.outbox.send(
                    conn,
                    ServerMessage::NewRound {
                        round: deal.round,
                        caption: room.caption.clone(),
                        players: players.clone(),
                        time_left: room.countdown,
                        phase: room.phase,
                        cards: hand(player),
                    },
                );
            }
        }

        self.arm_countdown(
            code,
            TimerToken {
                round: deal.round,
                phase: RoundPhase::Submitting,
            },
        );
        self.persist(code);
    }

    fn submit_card(&mut self, conn: ConnId, code: &str, card_id: &str) -> CoreResult<()> {
        let room = seated(&mut self.registry, &self.closing, conn, code)?;
        let complete = room.submit(conn, card_id)?;

        let player_name = room
            .submission_of(conn)
            .map(|s| s.player_name.clone())
            .unwrap_or_default();
        self.outbox.broadcast(
            room,
            &ServerMessage::CardSubmitted {
                player_name,
                submissions_count: room.submissions.len(),
                total_players: room.connections().count(),
            },
        );

        if complete {
            self.begin_reveal(code);
        }
        self.persist(code);
        Ok(())
    }

    /// Close submissions. Reveals follow on the reveal cadence; with no
    /// submissions the next round is dealt after a short pause.
    fn begin_reveal(&mut self, code: &str) {
        let Some(room) = self.registry.get_mut(code) else {
            return;
        };
        let Some(order) = room.begin_reveal(&mut self.rng) else {
            return;
        };

        let token = TimerToken {
            round: room.round,
            phase: RoundPhase::Revealing,
        };
        let timer = if order.is_empty() {
            info!(room = %code, round = room.round, "No submissions; skipping round");
            timers::once(
                self.config.empty_round_pause(),
                self.tx.clone(),
                timer_event(code, token, TimerKind::NextRound),
            )
        } else {
            let owned = code.to_string();
            timers::repeat(self.config.reveal_interval(), self.tx.clone(), move || {
                timer_event(&owned, token, TimerKind::RevealNext)
            })
        };
        self.set_phase_timer(code, timer);
    }

    fn reveal_next(&mut self, code: &str) {
        let Some(room) = self.registry.get_mut(code) else {
            return;
        };
        let total = room.reveal_order.len();

        match room.next_reveal() {
            Some((index, submission)) => {
                self.outbox.broadcast(
                    room,
                    &ServerMessage::RevealSubmission {
                        caption: room.caption.clone(),
                        submission: RevealedSubmission::from(&submission),
                        current_index: index,
                        total_submissions: total,
                    },
                );
            }
            None => {
                let token = TimerToken {
                    round: room.round,
                    phase: RoundPhase::Revealing,
                };
                let timer = timers::once(
                    self.config.voting_pause(),
                    self.tx.clone(),
                    timer_event(code, token, TimerKind::BeginVoting),
                );
                self.set_phase_timer(code, timer);
            }
        }
    }

    fn begin_voting(&mut self, code: &str) {
        let Some(room) = self.registry.get_mut(code) else {
            return;
        };
        if !room.begin_voting(&self.config) {
            return;
        }

        self.outbox.broadcast(
            room,
            &ServerMessage::VotingPhase {
                caption: room.caption.clone(),
                submissions: room.reveal_order.iter().map(RevealedSubmission::from).collect(),
                time_left: room.countdown,
            },
        );

        let complete = room.votes_complete();
        let token = TimerToken {
            round: room.round,
            phase: RoundPhase::Voting,
        };
        self.arm_countdown(code, token);

        if complete {
            self.finish_round(code);
        }
    }

    fn vote(&mut self, conn: ConnId, code: &str, target: ConnId) -> CoreResult<()> {
        let room = seated(&mut self.registry, &self.closing, conn, code)?;
        let complete = room.vote(conn, target)?;

        let voter_name = room.player(conn).map(|p| p.name.clone()).unwrap_or_default();
        self.outbox.broadcast(
            room,
            &ServerMessage::VoteReceived {
                voter_name,
                votes_count: room.votes.len(),
                total_voters: room.eligible_voters(),
            },
        );

        if complete {
            self.finish_round(code);
        }
        self.persist(code);
        Ok(())
    }

    /// Score the round, then either end the game or schedule the next deal
    fn finish_round(&mut self, code: &str) {
        let Some(room) = self.registry.get_mut(code) else {
            return;
        };
        let Some(results) = room.finish_round() else {
            return;
        };

        let players = PlayerInfo::list(room);
        self.outbox.broadcast(
            room,
            &ServerMessage::RoundResults {
                round: results.round,
                results: ResultEntry::list(room, &results),
                winners: results.tally.winners.clone(),
                max_votes: results.tally.max_votes,
                players: players.clone(),
            },
        );

        let next = match results.game_winner {
            Some((winner, final_score)) => {
                self.outbox.broadcast(
                    room,
                    &ServerMessage::GameOver {
                        winner,
                        final_score,
                        players,
                    },
                );
                None
            }
            None => {
                let token = TimerToken {
                    round: results.round,
                    phase: RoundPhase::Results,
                };
                Some(timers::once(
                    self.config.results_pause(),
                    self.tx.clone(),
                    timer_event(code, token, TimerKind::NextRound),
                ))
            }
        };
        self.timers.entry(code.to_string()).or_default().phase = next;

        self.persist(code);
    }

    fn on_timer(&mut self, code: &str, token: TimerToken, kind: TimerKind) {
        if self.closing.contains(code) {
            return;
        }
        let Some(room) = self.registry.get_mut(code) else {
            return;
        };
        if room.status != RoomStatus::Playing
            || room.round != token.round
            || room.phase != token.phase
        {
            debug!(room = %code, ?kind, ?token, "Stale timer ignored");
            return;
        }

        match kind {
            TimerKind::Tick => {
                let Some(left) = room.tick(token.phase) else {
                    return;
                };
                self.outbox.broadcast(
                    room,
                    &ServerMessage::Countdown {
                        time_left: left,
                        phase: token.phase,
                    },
                );
                if left == 0 {
                    match token.phase {
                        RoundPhase::Submitting => self.begin_reveal(code),
                        RoundPhase::Voting => self.finish_round(code),
                        _ => {}
                    }
                }
            }
            TimerKind::RevealNext => self.reveal_next(code),
            TimerKind::BeginVoting => self.begin_voting(code),
            TimerKind::NextRound => self.start_round(code),
        }
    }

    /// Re-check completion after the set of connected players changed
    fn check_progress(&mut self, code: &str) {
        let Some(room) = self.registry.get(code) else {
            return;
        };
        if room.submissions_complete() {
            self.begin_reveal(code);
        } else if room.votes_complete() {
            self.finish_round(code);
        }
    }

    fn arm_countdown(&mut self, code: &str, token: TimerToken) {
        let owned = code.to_string();
        let timer = timers::repeat(TICK, self.tx.clone(), move || {
            timer_event(&owned, token, TimerKind::Tick)
        });
        self.set_phase_timer(code, timer);
    }

    fn set_phase_timer(&mut self, code: &str, timer: TimerHandle) {
        self.timers.entry(code.to_string()).or_default().phase = Some(timer);
    }

    // -- housekeeping --

    /// Reap idle rooms past the staleness cutoff, here and in storage
    fn sweep(&mut self) {
        let cutoff = Utc::now() - self.config.stale_after();

        for code in self.registry.stale(cutoff) {
            if self.closing.contains(&code) {
                continue;
            }
            if let Some(room) = self.registry.get(&code) {
                self.outbox.broadcast(
                    room,
                    &ServerMessage::RoomDeleted {
                        room_id: code.clone(),
                        reason: "inactive".into(),
                    },
                );
            }
            info!(room = %code, "Reaping stale room");
            self.delete_room(&code);
        }

        self.sync.reap(cutoff);
        self.sync.purge();
    }

    fn delete_room(&mut self, code: &str) {
        self.timers.remove(code);
        self.closing.remove(code);
        if self.registry.delete(code).is_some() {
            info!(room = %code, "Room deleted");
        }
        self.sync.delete(code);
    }

    fn persist(&self, code: &str) {
        if let Some(room) = self.registry.get(code) {
            assert_room_invariants(room);
            self.sync.upsert(room.snapshot());
        }
    }
}

/// The room `conn` is seated in, checked against the room it named
fn seated<'a>(
    registry: &'a mut RoomRegistry,
    closing: &HashSet<String>,
    conn: ConnId,
    code: &str,
) -> CoreResult<&'a mut Room> {
    if closing.contains(code) {
        return Err(CoreError::RoomNotFound(code.to_string()));
    }
    let room = registry
        .get_mut(code)
        .ok_or_else(|| CoreError::RoomNotFound(code.to_string()))?;
    if room.player(conn).is_none() {
        return Err(CoreError::PlayerNotFound(conn.to_string()));
    }
    Ok(room)
}

fn timer_event(code: &str, token: TimerToken, kind: TimerKind) -> Event {
    Event::Timer {
        code: code.to_string(),
        token,
        kind,
    }
}

fn hand(player: &Player) -> Vec<SubmittedCard> {
    player.hand.iter().map(Card::snapshot).collect()
}

fn phase_snapshot(room: &Room, conn: ConnId) -> ServerMessage {
    ServerMessage::PhaseSnapshot {
        room_id: room.code.clone(),
        status: room.status,
        phase: room.phase,
        round: room.round,
        caption: room.caption.clone(),
        time_left: room.countdown,
        players: PlayerInfo::list(room),
        cards: room.player(conn).map(hand).unwrap_or_default(),
        revealed: room
            .reveal_order
            .iter()
            .take(room.revealed)
            .map(RevealedSubmission::from)
            .collect(),
        has_submitted: room.submission_of(conn).is_some(),
        has_voted: room.vote_of(conn).is_some(),
    }
}
