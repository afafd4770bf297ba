// FIFO matchmaking queue that pairs waiting players into battle rooms.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;

use crate::battle::RoomRegistry;
use crate::metrics;
use crate::passages;
use crate::protocol::{Matched, PlayerId, PlayerInfo, Role, ServerMessage, Waiting};

/// A player waiting in the queue. `conn_id` is the lobby connection;
/// `player_id` is the id the player will claim in the room, and is what the
/// opponent is told.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitingPlayer {
    pub conn_id: String,
    pub player_id: PlayerId,
    pub display_name: String,
}

/// Status of the matchmaking queue.
#[derive(Debug, Clone, Serialize)]
pub struct QueueStatus {
    pub depth: usize,
    pub players_online: usize,
}

#[derive(Debug, Default)]
struct Lobby {
    queue: VecDeque<WaitingPlayer>,
    connections: HashMap<String, UnboundedSender<ServerMessage>>,
}

/// Thread-safe FIFO matchmaker. Cloning shares the same queue.
#[derive(Debug, Clone)]
pub struct Matchmaker {
    inner: Arc<Mutex<Lobby>>,
    rooms: RoomRegistry,
}

impl Matchmaker {
    pub fn new(rooms: RoomRegistry) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Lobby::default())),
            rooms,
        }
    }

    /// Register a matchmaker connection so it can be counted and reached.
    pub fn connect(&self, conn_id: &str, tx: UnboundedSender<ServerMessage>) {
        let mut lobby = self.inner.lock().unwrap();
        lobby.connections.insert(conn_id.to_string(), tx);
    }

    /// Forget a closed connection, dropping it from the queue if present.
    pub fn disconnect(&self, conn_id: &str) {
        let mut lobby = self.inner.lock().unwrap();
        lobby.connections.remove(conn_id);
        if remove_waiting(&mut lobby.queue, conn_id) {
            tracing::info!(conn = %conn_id, "Player dropped from queue on disconnect");
        }
        metrics::QUEUE_DEPTH.set(lobby.queue.len() as i64);
    }

    /// Queue the player on `conn_id` and pair whoever can be paired.
    /// Joining twice keeps the original place in line. Without a
    /// `player_id` the connection id stands in for it.
    pub fn join_queue(&self, conn_id: &str, player_id: Option<&str>, display_name: &str) {
        let mut lobby = self.inner.lock().unwrap();

        if lobby.queue.iter().any(|p| p.conn_id == conn_id) {
            tracing::debug!(conn = %conn_id, "Already queued");
        } else {
            let display_name = match display_name.trim() {
                "" => "Anonymous",
                name => name,
            };
            let player_id = player_id.filter(|id| !id.is_empty()).unwrap_or(conn_id);
            lobby.queue.push_back(WaitingPlayer {
                conn_id: conn_id.to_string(),
                player_id: player_id.to_string(),
                display_name: display_name.to_string(),
            });
            tracing::info!(conn = %conn_id, player = %player_id, depth = lobby.queue.len(), "Player joined queue");
        }

        let waiting = ServerMessage::Waiting(Waiting {
            position: lobby.queue.len(),
            players_online: lobby.connections.len(),
        });
        if let Some(tx) = lobby.connections.get(conn_id) {
            let _ = tx.send(waiting);
        }

        self.try_match(&mut lobby);
        metrics::QUEUE_DEPTH.set(lobby.queue.len() as i64);
    }

    /// Leave the queue. Silent: a queued player was never matched.
    pub fn leave(&self, conn_id: &str) {
        let mut lobby = self.inner.lock().unwrap();
        if remove_waiting(&mut lobby.queue, conn_id) {
            tracing::info!(conn = %conn_id, "Player left queue");
        }
        metrics::QUEUE_DEPTH.set(lobby.queue.len() as i64);
    }

    pub fn depth(&self) -> usize {
        self.inner.lock().unwrap().queue.len()
    }

    pub fn status(&self) -> QueueStatus {
        let lobby = self.inner.lock().unwrap();
        QueueStatus {
            depth: lobby.queue.len(),
            players_online: lobby.connections.len(),
        }
    }

    /// Pair the two oldest waiters until fewer than two remain.
    fn try_match(&self, lobby: &mut Lobby) {
        while lobby.queue.len() >= 2 {
            let (Some(p1), Some(p2)) = (lobby.queue.pop_front(), lobby.queue.pop_front()) else {
                break;
            };

            let room_id = format!("battle-{}", uuid::Uuid::new_v4().simple());
            let passage = passages::random_passage(&mut rand::thread_rng());
            self.rooms.create(&room_id, passage);
            metrics::MATCHES_CREATED_TOTAL.inc();
            tracing::info!(room = %room_id, player1 = %p1.player_id, player2 = %p2.player_id, "Players matched");

            for (me, opponent, role) in [(&p1, &p2, Role::Player1), (&p2, &p1, Role::Player2)] {
                let Some(tx) = lobby.connections.get(&me.conn_id) else {
                    continue;
                };
                let _ = tx.send(ServerMessage::Matched(Matched {
                    room_id: room_id.clone(),
                    passage: passage.to_string(),
                    opponent: PlayerInfo {
                        id: opponent.player_id.clone(),
                        display_name: opponent.display_name.clone(),
                    },
                    your_role: role,
                }));
            }
        }
    }
}

fn remove_waiting(queue: &mut VecDeque<WaitingPlayer>, conn_id: &str) -> bool {
    let before = queue.len();
    queue.retain(|p| p.conn_id != conn_id);
    queue.len() != before
}
