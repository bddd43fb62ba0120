use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use tracing::{debug, info};

use crate::board::Board;
use crate::constants::{
    board_size_for, normalize_speed, tick_period, CHAT_LOG_CAPACITY, DEFAULT_MODE, DEFAULT_SPEED,
    DEFAULT_TARGET, LARGE_BOARD_SIZE,
};
use crate::piece::{Piece, PieceBag, Shape, SHAPE_COUNT};
use crate::rng::Rng;
use crate::server_utils::sanitize_chat_text;
use crate::spawn::place_piece;
use crate::types::{
    Action, ChatMessage, Delivery, GameConfig, GameMode, GameSettings, GravityDirection,
    MatchRecord, Owner, ParticipantView, Role, RoomStateView, ServerMessage, StateSnapshot,
    Stats, Winner,
};

const SYSTEM_NAME: &str = "System";
const UNKNOWN_NAME: &str = "???";

#[derive(Clone, Debug)]
pub struct Participant {
    pub id: String,
    pub role: Role,
    pub name: String,
    pub ready: bool,
    pub piece: Option<Piece>,
}

impl Participant {
    fn view(&self) -> ParticipantView {
        ParticipantView {
            id: self.id.clone(),
            role: self.role,
            name: self.name.clone(),
            ready: self.ready,
            piece: self.piece.as_ref().map(Piece::view),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RoomPhase {
    Lobby,
    Active,
    Ended,
}

/// One room's game state machine. Every operation is a precondition check
/// followed by a state change; rejected calls change nothing. Outbound
/// messages are queued and collected with [`Room::drain_deliveries`].
#[derive(Clone, Debug)]
pub struct Room {
    code: String,
    board: Board,
    participants: BTreeMap<String, Participant>,
    bags: PieceBag,
    config: GameConfig,
    chat: VecDeque<ChatMessage>,
    restart_votes: BTreeSet<Role>,
    rng: Rng,
    outbox: Vec<Delivery>,
    finished: Vec<MatchRecord>,
}

impl Room {
    pub fn new(code: impl Into<String>, seed: u32) -> Self {
        Self {
            code: code.into(),
            board: Board::square(LARGE_BOARD_SIZE),
            participants: BTreeMap::new(),
            bags: PieceBag::default(),
            config: GameConfig {
                mode: DEFAULT_MODE,
                target: DEFAULT_TARGET,
                speed: DEFAULT_SPEED,
                started_at_ms: 0,
                active: false,
                winner: None,
                board_size: LARGE_BOARD_SIZE,
            },
            chat: VecDeque::new(),
            restart_votes: BTreeSet::new(),
            rng: Rng::new(seed),
            outbox: Vec::new(),
            finished: Vec::new(),
        }
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn participant(&self, id: &str) -> Option<&Participant> {
        self.participants.get(id)
    }

    pub fn participant_ids(&self) -> Vec<String> {
        self.participants.keys().cloned().collect()
    }

    pub fn participant_count(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    pub fn restart_votes(&self) -> Vec<Role> {
        self.restart_votes.iter().copied().collect()
    }

    pub fn chat_log(&self) -> &VecDeque<ChatMessage> {
        &self.chat
    }

    pub fn tick_period(&self) -> Duration {
        tick_period(self.config.speed)
    }

    pub fn phase(&self) -> RoomPhase {
        if self.config.active {
            RoomPhase::Active
        } else if self.config.winner.is_some() {
            RoomPhase::Ended
        } else {
            RoomPhase::Lobby
        }
    }

    pub fn drain_deliveries(&mut self) -> Vec<Delivery> {
        std::mem::take(&mut self.outbox)
    }

    pub fn take_finished_matches(&mut self) -> Vec<MatchRecord> {
        std::mem::take(&mut self.finished)
    }

    pub fn broadcast(&mut self, message: ServerMessage) {
        let recipients = self.participant_ids();
        if recipients.is_empty() {
            return;
        }
        self.outbox.push(Delivery {
            recipients,
            message,
        });
    }

    pub fn send_to(&mut self, id: &str, message: ServerMessage) {
        self.outbox.push(Delivery {
            recipients: vec![id.to_string()],
            message,
        });
    }

    pub fn join(&mut self, id: &str, name: &str, now_ms: u64) -> Option<Role> {
        if self.participants.contains_key(id) {
            debug!(room = %self.code, participant = id, "join ignored: already present");
            return None;
        }
        let creating = self.seat_holders().is_empty();
        let role = self.free_seat();
        self.participants.insert(
            id.to_string(),
            Participant {
                id: id.to_string(),
                role,
                name: name.to_string(),
                ready: false,
                piece: None,
            },
        );
        if let Some(owner) = role.owner() {
            let piece = self.spawn_piece(owner, Some(id));
            if let Some(participant) = self.participants.get_mut(id) {
                participant.piece = Some(piece);
            }
        }
        info!(room = %self.code, participant = id, ?role, "participant joined");

        self.send_to(
            id,
            ServerMessage::Init {
                id: id.to_string(),
                role,
                room_code: self.code.clone(),
                is_host: role == Role::Primary,
                name: name.to_string(),
            },
        );
        let verb = if creating { "created" } else { "joined" };
        self.push_system_chat(format!("{name} {verb} the room"), now_ms);
        self.broadcast_room_state();
        Some(role)
    }

    pub fn toggle_ready(&mut self, id: &str) -> bool {
        let Some(participant) = self.participants.get_mut(id) else {
            return false;
        };
        if participant.role != Role::Secondary {
            debug!(room = %self.code, participant = id, "ready toggle ignored: not secondary");
            return false;
        }
        participant.ready = !participant.ready;
        self.broadcast_room_state();
        true
    }

    pub fn update_settings(&mut self, id: &str, settings: GameSettings) -> bool {
        if self.role_of(id) != Some(Role::Primary) || self.config.active {
            debug!(room = %self.code, participant = id, "settings update ignored");
            return false;
        }
        self.config.mode = settings.mode;
        self.config.target = settings.target;
        if settings.speed.is_some() {
            self.config.speed = normalize_speed(settings.speed);
        }
        self.broadcast_room_state();
        true
    }

    /// Returns `true` when a new game began; the caller then (re)starts the
    /// room's loop with [`Room::tick_period`].
    pub fn start_game(&mut self, id: &str, settings: GameSettings, now_ms: u64) -> bool {
        if self.role_of(id) != Some(Role::Primary) || self.config.active {
            debug!(room = %self.code, participant = id, "start ignored: not host or running");
            return false;
        }
        let seats = self.seat_holders();
        if seats.len() != 2 {
            debug!(room = %self.code, players = seats.len(), "start ignored: need two players");
            return false;
        }
        let guest_ready = self
            .participants
            .values()
            .any(|participant| participant.role == Role::Secondary && participant.ready);
        if !guest_ready {
            debug!(room = %self.code, "start ignored: secondary not ready");
            return false;
        }

        let size = board_size_for(settings.mode, settings.target);
        self.board = Board::square(size);
        self.bags.reset();
        for participant in self.participants.values_mut() {
            participant.piece = None;
        }
        for (player_id, owner) in seats {
            let piece = self.spawn_piece(owner, Some(&player_id));
            if let Some(participant) = self.participants.get_mut(&player_id) {
                participant.piece = Some(piece);
            }
        }
        self.config = GameConfig {
            mode: settings.mode,
            target: settings.target,
            speed: normalize_speed(settings.speed),
            started_at_ms: now_ms,
            active: true,
            winner: None,
            board_size: size,
        };
        self.restart_votes.clear();
        info!(
            room = %self.code,
            mode = ?settings.mode,
            target = settings.target,
            board = size,
            "game started"
        );
        self.broadcast_room_state();
        self.broadcast_state();
        true
    }

    pub fn apply_action(&mut self, id: &str, action: Action, now_ms: u64) -> bool {
        if !self.config.active {
            return false;
        }
        let Some(piece) = self.participants.get(id).and_then(|p| p.piece.as_ref()) else {
            return false;
        };
        let gravity = piece.gravity();

        match action {
            Action::Left | Action::Right | Action::Up | Action::Down => {
                if let Some((dx, dy)) = action.shift() {
                    self.try_shift(id, dx, dy);
                }
            }
            Action::Forward => {
                self.try_shift(id, gravity.0, gravity.1);
            }
            Action::Rotate => {
                self.try_rotate(id);
            }
            Action::Drop => {
                while self.try_shift(id, gravity.0, gravity.1) {}
                self.lock_piece(id, now_ms);
            }
        }
        self.broadcast_state();
        true
    }

    pub fn surrender(&mut self, id: &str, now_ms: u64) -> bool {
        if !self.config.active {
            return false;
        }
        let Some(owner) = self.role_of(id).and_then(Role::owner) else {
            return false;
        };
        info!(room = %self.code, participant = id, "participant surrendered");
        self.finish_game(owner.opponent().into(), now_ms);
        self.broadcast_state();
        true
    }

    pub fn request_restart(&mut self, id: &str) -> bool {
        let Some(role) = self.role_of(id) else {
            return false;
        };
        if role.is_spectator() || self.config.active {
            debug!(room = %self.code, participant = id, "restart request ignored");
            return false;
        }
        self.restart_votes.insert(role);
        self.broadcast(ServerMessage::RestartStatus {
            roles: self.restart_votes(),
        });
        if self.restart_consensus() {
            info!(room = %self.code, "restart consensus reached");
            self.return_to_lobby();
        }
        true
    }

    pub fn restart_consensus(&self) -> bool {
        let present: BTreeSet<Role> = self
            .participants
            .values()
            .map(|participant| participant.role)
            .filter(|role| !role.is_spectator())
            .collect();
        !present.is_empty() && present == self.restart_votes
    }

    pub fn reset_to_lobby(&mut self, id: &str) -> bool {
        if self.role_of(id) != Some(Role::Primary) {
            return false;
        }
        self.return_to_lobby();
        true
    }

    pub fn quick_chat(&mut self, id: &str, text: &str, now_ms: u64) -> bool {
        let Some(participant) = self.participants.get(id) else {
            return false;
        };
        let Some(text) = sanitize_chat_text(text) else {
            return false;
        };
        let message = ChatMessage {
            name: participant.name.clone(),
            role: Some(participant.role),
            text,
            time: now_ms,
        };
        self.push_chat(message);
        true
    }

    /// Removes the participant. The caller destroys the room when it is left
    /// empty.
    pub fn leave(&mut self, id: &str, now_ms: u64) -> bool {
        let Some(participant) = self.participants.remove(id) else {
            return false;
        };
        self.bags.forget(id);
        self.restart_votes.remove(&participant.role);
        info!(room = %self.code, participant = id, role = ?participant.role, "participant left");

        self.broadcast(ServerMessage::RestartStatus {
            roles: self.restart_votes(),
        });
        self.push_system_chat(format!("{} left the room", participant.name), now_ms);
        self.broadcast_room_state();
        true
    }

    /// One loop step: win check, gravity for every live piece, snapshot.
    pub fn tick(&mut self, now_ms: u64) {
        if self.config.active {
            let stats = self.board.stats();
            if let Some(winner) = self.evaluate_win(stats, now_ms) {
                self.finish_game(winner, now_ms);
            }
        }
        if self.config.active {
            for id in self.participant_ids() {
                if !self.config.active {
                    break;
                }
                let Some((dx, dy)) = self
                    .participants
                    .get(&id)
                    .and_then(|p| p.piece.as_ref())
                    .map(Piece::gravity)
                else {
                    continue;
                };
                if !self.try_shift(&id, dx, dy) {
                    self.lock_piece(&id, now_ms);
                }
            }
        }
        self.broadcast_state();
    }

    /// Spawns a piece without placing it. With no participant id the shape
    /// is drawn uniformly and no bag is touched.
    pub fn spawn_piece(&mut self, owner: Owner, participant_id: Option<&str>) -> Piece {
        let shape_index = match participant_id {
            Some(id) => self.bags.next(id, &mut self.rng),
            None => self.rng.pick_index(SHAPE_COUNT),
        };
        let taken: Vec<GravityDirection> = self
            .participants
            .values()
            .filter(|participant| Some(participant.id.as_str()) != participant_id)
            .filter_map(|participant| participant.piece.as_ref().map(|piece| piece.direction))
            .collect();
        place_piece(
            Shape::standard(shape_index),
            owner,
            &taken,
            self.board.rows(),
            self.board.cols(),
            &mut self.rng,
        )
    }

    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            board: self.board.to_rows(),
            participants: self.participant_views(),
            stats: self.board.stats(),
            config: self.config.clone(),
        }
    }

    pub fn room_state(&self) -> RoomStateView {
        RoomStateView {
            participants: self.participant_views(),
            config: self.config.clone(),
            participant_count: self.participants.len(),
        }
    }

    fn participant_views(&self) -> BTreeMap<String, ParticipantView> {
        self.participants
            .iter()
            .map(|(id, participant)| (id.clone(), participant.view()))
            .collect()
    }

    fn role_of(&self, id: &str) -> Option<Role> {
        self.participants.get(id).map(|participant| participant.role)
    }

    /// Non-spectators with their board tags, in id order.
    fn seat_holders(&self) -> Vec<(String, Owner)> {
        self.participants
            .values()
            .filter_map(|participant| {
                participant
                    .role
                    .owner()
                    .map(|owner| (participant.id.clone(), owner))
            })
            .collect()
    }

    fn free_seat(&self) -> Role {
        let taken = |role: Role| self.participants.values().any(|p| p.role == role);
        if !taken(Role::Primary) {
            Role::Primary
        } else if !taken(Role::Secondary) {
            Role::Secondary
        } else {
            Role::Spectator
        }
    }

    fn try_shift(&mut self, id: &str, dx: i32, dy: i32) -> bool {
        let board = &self.board;
        let Some(piece) = self.participants.get_mut(id).and_then(|p| p.piece.as_mut()) else {
            return false;
        };
        if !board.fits(piece, dx, dy, None) {
            return false;
        }
        piece.translate(dx, dy);
        true
    }

    fn try_rotate(&mut self, id: &str) -> bool {
        let board = &self.board;
        let Some(piece) = self.participants.get_mut(id).and_then(|p| p.piece.as_mut()) else {
            return false;
        };
        let rotated = piece.shape.rotated();
        if !board.fits(piece, 0, 0, Some(&rotated)) {
            return false;
        }
        piece.shape = rotated;
        true
    }

    /// Locks the participant's piece, clears full lines and respawns. A
    /// respawn that collides ends the game on perimeter score.
    fn lock_piece(&mut self, id: &str, now_ms: u64) {
        let Some(piece) = self.participants.get_mut(id).and_then(|p| p.piece.take()) else {
            return;
        };
        let cleared = self.board.lock(&piece);
        if !cleared.is_empty() {
            debug!(
                room = %self.code,
                rows = cleared.rows.len(),
                cols = cleared.cols.len(),
                "lines cleared"
            );
        }

        let next = self.spawn_piece(piece.owner, Some(id));
        if self.board.fits(&next, 0, 0, None) {
            if let Some(participant) = self.participants.get_mut(id) {
                participant.piece = Some(next);
            }
            return;
        }
        info!(room = %self.code, participant = id, "spawn blocked");
        let winner = self.board.stats().leader();
        self.finish_game(winner, now_ms);
    }

    fn evaluate_win(&self, stats: Stats, now_ms: u64) -> Option<Winner> {
        match self.config.mode {
            GameMode::Time => {
                let elapsed_ms = now_ms.saturating_sub(self.config.started_at_ms);
                (elapsed_ms >= u64::from(self.config.target) * 1000).then(|| stats.leader())
            }
            GameMode::Score => {
                if stats.primary_score >= self.config.target {
                    Some(Winner::Primary)
                } else if stats.secondary_score >= self.config.target {
                    Some(Winner::Secondary)
                } else {
                    None
                }
            }
        }
    }

    fn finish_game(&mut self, winner: Winner, now_ms: u64) {
        if !self.config.active {
            return;
        }
        self.config.active = false;
        self.config.winner = Some(winner);

        let stats = self.board.stats();
        let record = MatchRecord {
            time: format_timestamp(now_ms),
            room: self.code.clone(),
            mode: self.config.mode,
            target: self.config.target,
            winner,
            primary_name: self.seat_name(Role::Primary),
            secondary_name: self.seat_name(Role::Secondary),
            primary_score: stats.primary_score,
            secondary_score: stats.secondary_score,
        };
        info!(room = %self.code, ?winner, "game ended");
        self.finished.push(record);
    }

    fn seat_name(&self, role: Role) -> String {
        self.participants
            .values()
            .find(|participant| participant.role == role)
            .map(|participant| participant.name.clone())
            .unwrap_or_else(|| UNKNOWN_NAME.to_string())
    }

    fn return_to_lobby(&mut self) {
        self.config.active = false;
        self.config.winner = None;
        self.config.started_at_ms = 0;
        self.restart_votes.clear();
        self.broadcast(ServerMessage::RestartStatus { roles: Vec::new() });

        self.board.clear();
        for participant in self.participants.values_mut() {
            participant.piece = None;
        }
        self.broadcast_room_state();
        self.broadcast_state();
    }

    fn push_system_chat(&mut self, text: String, now_ms: u64) {
        self.push_chat(ChatMessage {
            name: SYSTEM_NAME.to_string(),
            role: None,
            text,
            time: now_ms,
        });
    }

    fn push_chat(&mut self, message: ChatMessage) {
        self.chat.push_back(message.clone());
        while self.chat.len() > CHAT_LOG_CAPACITY {
            self.chat.pop_front();
        }
        self.broadcast(ServerMessage::ChatMessage(message));
    }

    fn broadcast_room_state(&mut self) {
        self.broadcast(ServerMessage::RoomState(self.room_state()));
    }

    fn broadcast_state(&mut self) {
        self.broadcast(ServerMessage::State(self.snapshot()));
    }
}

fn format_timestamp(now_ms: u64) -> String {
    DateTime::<Utc>::from_timestamp_millis(now_ms as i64)
        .map(|at| at.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_default()
}
