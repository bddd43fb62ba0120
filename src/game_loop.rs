use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::debug;

use crate::broadcaster::Broadcaster;
use crate::registry::SharedRoom;
use crate::server_utils::now_ms;

static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

/// Handle to a room's tick task. Dropping it stops the task.
#[derive(Debug)]
pub struct GameLoop {
    generation: u64,
    _stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl GameLoop {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Starts the fixed-rate loop for one room. The task only holds a weak
/// reference, so a dropped room ends it as well.
pub fn spawn_game_loop(
    slot: &SharedRoom,
    period: Duration,
    broadcaster: Arc<Broadcaster>,
) -> GameLoop {
    let generation = NEXT_GENERATION.fetch_add(1, Ordering::Relaxed);
    let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
    let weak = Arc::downgrade(slot);

    let task = tokio::spawn(async move {
        let mut interval = time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                biased;
                _ = &mut stop_rx => break,
                _ = interval.tick() => {}
            }
            let Some(slot) = weak.upgrade() else {
                break;
            };
            let mut guard = slot.lock().await;
            if guard.loop_generation() != Some(generation) {
                break;
            }
            if guard.room.is_empty() {
                debug!(room = %guard.room.code(), "room empty, loop stopping");
                guard.cancel_loop();
                break;
            }
            guard.room.tick(now_ms());
            broadcaster.flush(&mut guard.room).await;
        }
        debug!(generation, "game loop finished");
    });

    GameLoop {
        generation,
        _stop: stop_tx,
        task,
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::{mpsc, Mutex};

    use super::*;
    use crate::broadcaster::OutboundMessage;
    use crate::registry::RoomSlot;
    use crate::room::Room;

    async fn room_with_client(broadcaster: &Broadcaster) -> (SharedRoom, mpsc::Receiver<OutboundMessage>) {
        let (tx, rx) = mpsc::channel(512);
        broadcaster.register("p1", tx).await;
        let mut room = Room::new("ROOM01", 4);
        room.join("p1", "Alice", 0);
        room.drain_deliveries();
        (Arc::new(Mutex::new(RoomSlot::new(room))), rx)
    }

    fn drain_states(rx: &mut mpsc::Receiver<OutboundMessage>) -> usize {
        let mut count = 0;
        while let Ok(OutboundMessage::Text(payload)) = rx.try_recv() {
            if payload.contains(r#""type":"state""#) {
                count += 1;
            }
        }
        count
    }

    #[tokio::test(start_paused = true)]
    async fn loop_broadcasts_each_period() {
        let broadcaster = Arc::new(Broadcaster::new());
        let (slot, mut rx) = room_with_client(&broadcaster).await;
        let game_loop = spawn_game_loop(&slot, Duration::from_millis(100), broadcaster.clone());
        slot.lock().await.install_loop(game_loop);

        time::sleep(Duration::from_millis(350)).await;
        assert_eq!(drain_states(&mut rx), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn replaced_loop_stops_ticking() {
        let broadcaster = Arc::new(Broadcaster::new());
        let (slot, mut rx) = room_with_client(&broadcaster).await;
        let first = spawn_game_loop(&slot, Duration::from_millis(100), broadcaster.clone());
        let first_generation = first.generation();
        slot.lock().await.install_loop(first);
        let second = spawn_game_loop(&slot, Duration::from_millis(1_000), broadcaster.clone());
        slot.lock().await.install_loop(second);
        assert_ne!(slot.lock().await.loop_generation(), Some(first_generation));

        time::sleep(Duration::from_millis(950)).await;
        assert_eq!(drain_states(&mut rx), 0);
        time::sleep(Duration::from_millis(100)).await;
        assert_eq!(drain_states(&mut rx), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_room_cancels_its_own_loop() {
        let broadcaster = Arc::new(Broadcaster::new());
        let (slot, _rx) = room_with_client(&broadcaster).await;
        let game_loop = spawn_game_loop(&slot, Duration::from_millis(100), broadcaster.clone());
        slot.lock().await.install_loop(game_loop);
        slot.lock().await.room.leave("p1", 0);

        time::sleep(Duration::from_millis(150)).await;
        assert!(slot.lock().await.loop_generation().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_handle_ends_the_task() {
        let broadcaster = Arc::new(Broadcaster::new());
        let (slot, mut rx) = room_with_client(&broadcaster).await;
        let game_loop = spawn_game_loop(&slot, Duration::from_millis(100), broadcaster.clone());
        slot.lock().await.install_loop(game_loop);
        assert!(slot.lock().await.cancel_loop());

        time::sleep(Duration::from_millis(500)).await;
        assert_eq!(drain_states(&mut rx), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn finished_flag_reflects_task_state() {
        let broadcaster = Arc::new(Broadcaster::new());
        let (slot, _rx) = room_with_client(&broadcaster).await;
        let game_loop = spawn_game_loop(&slot, Duration::from_millis(100), broadcaster);
        assert!(!game_loop.is_finished());
        drop(slot);
        time::sleep(Duration::from_millis(150)).await;
        assert!(game_loop.is_finished());
    }
}
