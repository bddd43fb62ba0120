use std::collections::HashMap;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{debug, error, warn};

use crate::match_history::{HistoryResponse, MatchHistory};
use crate::room::Room;
use crate::types::{Delivery, MatchRecord, ServerMessage};

pub const CLIENT_QUEUE_CAPACITY: usize = 256;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OutboundMessage {
    Text(String),
    Close { code: u16, reason: String },
}

/// Client channels plus the global match history. Room deliveries are routed
/// here after every mutation.
#[derive(Debug, Default)]
pub struct Broadcaster {
    clients: RwLock<HashMap<String, mpsc::Sender<OutboundMessage>>>,
    history: Mutex<MatchHistory>,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, client_id: &str, tx: mpsc::Sender<OutboundMessage>) {
        self.clients.write().await.insert(client_id.to_string(), tx);
    }

    pub async fn unregister(&self, client_id: &str) {
        self.clients.write().await.remove(client_id);
    }

    pub async fn client_count(&self) -> usize {
        self.clients.read().await.len()
    }

    pub async fn send(&self, client_id: &str, message: &ServerMessage) {
        let Some(payload) = encode(message) else {
            return;
        };
        let clients = self.clients.read().await;
        if let Some(tx) = clients.get(client_id) {
            push(client_id, tx, payload);
        }
    }

    pub async fn deliver(&self, delivery: &Delivery) {
        let Some(payload) = encode(&delivery.message) else {
            return;
        };
        let clients = self.clients.read().await;
        for client_id in &delivery.recipients {
            if let Some(tx) = clients.get(client_id) {
                push(client_id, tx, payload.clone());
            }
        }
    }

    /// Persists finished matches, announces them to the room, then sends
    /// everything the room queued.
    pub async fn flush(&self, room: &mut Room) {
        let finished = room.take_finished_matches();
        if !finished.is_empty() {
            let records = {
                let mut history = self.history.lock().await;
                for record in finished {
                    history.record(record);
                }
                history.recent(None)
            };
            room.broadcast(ServerMessage::MatchHistory { records });
        }
        for delivery in room.drain_deliveries() {
            self.deliver(&delivery).await;
        }
    }

    pub async fn recent_history(&self) -> Vec<MatchRecord> {
        self.history.lock().await.recent(None)
    }

    pub async fn history_response(&self, limit: Option<usize>) -> HistoryResponse {
        self.history.lock().await.build_response(limit)
    }

    pub async fn close_all(&self, code: u16, reason: &str) {
        let clients = self.clients.read().await;
        for (client_id, tx) in clients.iter() {
            push_message(
                client_id,
                tx,
                OutboundMessage::Close {
                    code,
                    reason: reason.to_string(),
                },
            );
        }
    }
}

fn encode(message: &ServerMessage) -> Option<String> {
    match serde_json::to_string(message) {
        Ok(payload) => Some(payload),
        Err(err) => {
            error!(error = %err, "failed to serialize outbound message");
            None
        }
    }
}

fn push(client_id: &str, tx: &mpsc::Sender<OutboundMessage>, payload: String) {
    push_message(client_id, tx, OutboundMessage::Text(payload));
}

fn push_message(client_id: &str, tx: &mpsc::Sender<OutboundMessage>, message: OutboundMessage) {
    match tx.try_send(message) {
        Ok(()) => {}
        Err(TrySendError::Full(_)) => {
            warn!(client = client_id, "client queue full, message dropped");
        }
        Err(TrySendError::Closed(_)) => {
            debug!(client = client_id, "client channel closed");
        }
    }
}
