use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::game_loop::GameLoop;
use crate::room::Room;
use crate::server_utils::is_valid_room_code;
use crate::types::Role;

/// A room plus the handle of its running loop, locked together so intents
/// and ticks serialize.
#[derive(Debug)]
pub struct RoomSlot {
    pub room: Room,
    game_loop: Option<GameLoop>,
}

impl RoomSlot {
    pub fn new(room: Room) -> Self {
        Self {
            room,
            game_loop: None,
        }
    }

    /// Replaces the running loop; the previous one stops when dropped.
    pub fn install_loop(&mut self, game_loop: GameLoop) {
        if let Some(previous) = self.game_loop.replace(game_loop) {
            debug!(room = %self.room.code(), generation = previous.generation(), "loop replaced");
        }
    }

    pub fn cancel_loop(&mut self) -> bool {
        self.game_loop.take().is_some()
    }

    pub fn loop_generation(&self) -> Option<u64> {
        self.game_loop.as_ref().map(GameLoop::generation)
    }
}

pub type SharedRoom = Arc<Mutex<RoomSlot>>;

/// Room code to room slot. Join and leave run under the map lock, so a room
/// is never destroyed while someone is joining it.
#[derive(Debug, Default)]
pub struct RoomRegistry {
    rooms: Mutex<HashMap<String, SharedRoom>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the room on first join. `None` when the code is malformed or
    /// the participant is already inside.
    pub async fn join(
        &self,
        code: &str,
        participant_id: &str,
        name: &str,
        now_ms: u64,
    ) -> Option<(SharedRoom, Role)> {
        if !is_valid_room_code(code) {
            debug!(code, "join ignored: malformed room code");
            return None;
        }
        let mut rooms = self.rooms.lock().await;
        let slot = rooms
            .entry(code.to_string())
            .or_insert_with(|| {
                info!(room = code, "room created");
                Arc::new(Mutex::new(RoomSlot::new(Room::new(code, rand::random()))))
            })
            .clone();

        let mut guard = slot.lock().await;
        let role = guard.room.join(participant_id, name, now_ms);
        if role.is_none() && guard.room.is_empty() {
            drop(guard);
            rooms.remove(code);
            return None;
        }
        drop(guard);
        role.map(|role| (slot, role))
    }

    /// Removes the participant. Returns the room while it still has
    /// occupants; an emptied room loses its loop and is dropped.
    pub async fn leave(&self, code: &str, participant_id: &str, now_ms: u64) -> Option<SharedRoom> {
        let mut rooms = self.rooms.lock().await;
        let slot = rooms.get(code).cloned()?;
        let mut guard = slot.lock().await;
        guard.room.leave(participant_id, now_ms);
        if !guard.room.is_empty() {
            drop(guard);
            return Some(slot);
        }
        guard.cancel_loop();
        drop(guard);
        rooms.remove(code);
        info!(room = code, "room destroyed");
        None
    }

    pub async fn get(&self, code: &str) -> Option<SharedRoom> {
        self.rooms.lock().await.get(code).cloned()
    }

    pub async fn len(&self) -> usize {
        self.rooms.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rooms.lock().await.is_empty()
    }

    /// Stops every loop and forgets every room.
    pub async fn shutdown(&self) {
        let mut rooms = self.rooms.lock().await;
        for slot in rooms.values() {
            slot.lock().await.cancel_loop();
        }
        let count = rooms.len();
        rooms.clear();
        info!(rooms = count, "registry shut down");
    }
}
