use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info};

use crate::broadcaster::{Broadcaster, OutboundMessage};
use crate::game_loop::spawn_game_loop;
use crate::registry::{RoomRegistry, SharedRoom};
use crate::server_protocol::{parse_client_message, ParsedClientMessage};
use crate::server_utils::{is_valid_room_code, now_ms};
use crate::types::ServerMessage;

#[derive(Clone, Debug)]
struct Session {
    name: String,
    room_code: Option<String>,
}

/// Connection-side entry point: maps socket events onto room operations and
/// flushes the resulting deliveries.
#[derive(Debug)]
pub struct SessionGateway {
    registry: RoomRegistry,
    broadcaster: Arc<Broadcaster>,
    sessions: Mutex<HashMap<String, Session>>,
}

impl Default for SessionGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionGateway {
    pub fn new() -> Self {
        Self {
            registry: RoomRegistry::new(),
            broadcaster: Arc::new(Broadcaster::new()),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &RoomRegistry {
        &self.registry
    }

    pub fn broadcaster(&self) -> &Arc<Broadcaster> {
        &self.broadcaster
    }

    pub async fn connect(&self, client_id: &str, tx: mpsc::Sender<OutboundMessage>, name: String) {
        self.broadcaster.register(client_id, tx).await;
        info!(client = client_id, name = %name, "client connected");
        self.sessions.lock().await.insert(
            client_id.to_string(),
            Session {
                name,
                room_code: None,
            },
        );
        self.broadcaster
            .send(client_id, &ServerMessage::Connected)
            .await;
    }

    pub async fn disconnect(&self, client_id: &str) {
        self.leave_current(client_id).await;
        self.sessions.lock().await.remove(client_id);
        self.broadcaster.unregister(client_id).await;
        info!(client = client_id, "client disconnected");
    }

    pub async fn room_of(&self, client_id: &str) -> Option<String> {
        self.sessions
            .lock()
            .await
            .get(client_id)
            .and_then(|session| session.room_code.clone())
    }

    pub async fn handle_text(&self, client_id: &str, raw: &str) {
        let Some(message) = parse_client_message(raw) else {
            debug!(client = client_id, "malformed message dropped");
            return;
        };

        match message {
            ParsedClientMessage::Join { room_code } => self.join(client_id, &room_code).await,
            ParsedClientMessage::Leave => self.leave_current(client_id).await,
            other => self.dispatch(client_id, other).await,
        }
    }

    async fn join(&self, client_id: &str, room_code: &str) {
        if !is_valid_room_code(room_code) {
            debug!(client = client_id, "join ignored: malformed room code");
            return;
        }
        let Some(name) = self
            .sessions
            .lock()
            .await
            .get(client_id)
            .map(|session| session.name.clone())
        else {
            return;
        };
        self.leave_current(client_id).await;

        let Some((slot, _role)) = self
            .registry
            .join(room_code, client_id, &name, now_ms())
            .await
        else {
            return;
        };
        if let Some(session) = self.sessions.lock().await.get_mut(client_id) {
            session.room_code = Some(room_code.to_string());
        }

        let mut guard = slot.lock().await;
        let records = self.broadcaster.recent_history().await;
        guard
            .room
            .send_to(client_id, ServerMessage::MatchHistory { records });
        self.broadcaster.flush(&mut guard.room).await;
    }

    async fn leave_current(&self, client_id: &str) {
        let room_code = self
            .sessions
            .lock()
            .await
            .get_mut(client_id)
            .and_then(|session| session.room_code.take());
        let Some(room_code) = room_code else {
            return;
        };
        if let Some(slot) = self.registry.leave(&room_code, client_id, now_ms()).await {
            let mut guard = slot.lock().await;
            self.broadcaster.flush(&mut guard.room).await;
        }
    }

    async fn current_slot(&self, client_id: &str) -> Option<SharedRoom> {
        let room_code = self.room_of(client_id).await?;
        self.registry.get(&room_code).await
    }

    async fn dispatch(&self, client_id: &str, message: ParsedClientMessage) {
        let Some(slot) = self.current_slot(client_id).await else {
            debug!(client = client_id, "message ignored: not in a room");
            return;
        };
        let mut guard = slot.lock().await;
        let now = now_ms();
        match message {
            ParsedClientMessage::ToggleReady => {
                guard.room.toggle_ready(client_id);
            }
            ParsedClientMessage::UpdateSettings(settings) => {
                guard.room.update_settings(client_id, settings);
            }
            ParsedClientMessage::StartGame(settings) => {
                if guard.room.start_game(client_id, settings, now) {
                    let period = guard.room.tick_period();
                    let game_loop = spawn_game_loop(&slot, period, self.broadcaster.clone());
                    guard.install_loop(game_loop);
                }
            }
            ParsedClientMessage::Action { action } => {
                guard.room.apply_action(client_id, action, now);
            }
            ParsedClientMessage::Surrender => {
                guard.room.surrender(client_id, now);
            }
            ParsedClientMessage::RequestRestart => {
                guard.room.request_restart(client_id);
            }
            ParsedClientMessage::ResetToLobby => {
                guard.room.reset_to_lobby(client_id);
            }
            ParsedClientMessage::QuickChat { text } => {
                guard.room.quick_chat(client_id, &text, now);
            }
            ParsedClientMessage::Join { .. } | ParsedClientMessage::Leave => {}
        }
        self.broadcaster.flush(&mut guard.room).await;
    }
}
